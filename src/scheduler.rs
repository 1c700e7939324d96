//! Delayed tasks with cancellation handles, so a torn-down view never has a
//! timer fire into it.

use std::future::Future;
use std::time::Duration;
use tokio::task::AbortHandle;

#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: Vec<AbortHandle>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` after `delay` on the current tokio runtime.
    pub fn schedule<F>(&mut self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.prune();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        self.tasks.push(handle.abort_handle());
    }

    pub fn cancel_all(&mut self) {
        for handle in self.tasks.drain(..) {
            handle.abort();
        }
    }

    /// Timers that have not fired or been cancelled yet.
    pub fn pending(&mut self) -> usize {
        self.prune();
        self.tasks.len()
    }

    fn prune(&mut self) {
        self.tasks.retain(|handle| !handle.is_finished());
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
