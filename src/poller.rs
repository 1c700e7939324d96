use crate::config::Timings;
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PollState {
    #[default]
    Idle,
    Polling,
    /// Stopped after a connectivity failure; only an explicit refresh resumes.
    Suspended,
}

/// Polling lifecycle. Each suspension or unmount starts a new epoch so fetches
/// issued before it can be recognised and dropped when they finish.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PollController {
    state: PollState,
    epoch: u64,
}

impl PollController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_polling(&self) -> bool {
        self.state == PollState::Polling
    }

    /// `Idle -> Polling`. Returns false when already mounted.
    pub fn mount(&mut self) -> bool {
        if self.state != PollState::Idle {
            return false;
        }
        self.state = PollState::Polling;
        true
    }

    /// `Polling -> Suspended`.
    pub fn suspend(&mut self) -> bool {
        if self.state != PollState::Polling {
            return false;
        }
        self.state = PollState::Suspended;
        self.epoch += 1;
        true
    }

    /// `Suspended -> Polling`, the explicit user retry.
    pub fn resume(&mut self) -> bool {
        if self.state != PollState::Suspended {
            return false;
        }
        self.state = PollState::Polling;
        true
    }

    pub fn unmount(&mut self) {
        if self.state != PollState::Idle {
            self.state = PollState::Idle;
            self.epoch += 1;
        }
    }

    /// Whether a fetch issued during `epoch` may still be applied.
    pub fn accepts(&self, epoch: u64) -> bool {
        self.is_polling() && epoch == self.epoch
    }

    /// Tick length: faster while a send waits for its echo.
    pub fn interval(&self, sending: bool, timings: &Timings) -> Duration {
        if sending {
            timings.sending_poll_interval
        } else {
            timings.poll_interval
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        let mut poller = PollController::new();
        assert_eq!(poller.state(), PollState::Idle);
        assert!(!poller.resume());
        assert!(!poller.suspend());

        assert!(poller.mount());
        assert!(!poller.mount());
        assert!(poller.is_polling());

        assert!(poller.suspend());
        assert_eq!(poller.state(), PollState::Suspended);
        assert!(!poller.suspend());

        assert!(poller.resume());
        assert_eq!(poller.state(), PollState::Polling);

        poller.unmount();
        assert_eq!(poller.state(), PollState::Idle);
    }

    #[test]
    fn fetches_from_before_suspension_are_rejected() {
        let mut poller = PollController::new();
        poller.mount();
        let issued = poller.epoch();
        assert!(poller.accepts(issued));

        poller.suspend();
        assert!(!poller.accepts(issued));

        poller.resume();
        assert!(!poller.accepts(issued));
        assert!(poller.accepts(poller.epoch()));
    }

    #[test]
    fn interval_speeds_up_while_sending() {
        let poller = PollController::new();
        let timings = Timings::default();
        assert_eq!(poller.interval(false, &timings), Duration::from_secs(2));
        assert_eq!(poller.interval(true, &timings), Duration::from_secs(1));
    }
}
