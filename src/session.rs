//! The chat session: owns the message store, drives polling and the send
//! lifecycle, and publishes a snapshot for the view after every change.

use crate::config::SessionSettings;
use crate::error::SendRejected;
use crate::poller::{PollController, PollState};
use crate::presentation;
use crate::relay::OutboundRelay;
use crate::scheduler::Scheduler;
use crate::scroll::{ScrollAction, ScrollController, ScrollMetrics};
use crate::source::MessageSource;
use crate::store::{Banner, FetchOutcome, MessageStore};
use crate::timeline::DateGroup;
use crate::types::{Message, MessageId, MessageStatus};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

/// Everything the view renders, taken at one instant.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatSnapshot {
    /// Visible messages in store order (confirmed, then pending).
    pub messages: Vec<Message>,
    /// Renderable messages, ordered and grouped by local day.
    pub groups: Vec<DateGroup>,
    pub banner: Option<Banner>,
    pub loading: bool,
    pub connection_failed: bool,
    pub sending: bool,
    pub input_disabled: bool,
    pub poll_state: PollState,
    pub pinned_to_bottom: bool,
    pub pending_indicator_visible: bool,
    pub should_scroll_to_bottom: bool,
}

impl ChatSnapshot {
    fn capture(state: &SessionState) -> Self {
        let store = &state.store;
        let messages = store.visible_messages();
        let groups = presentation::build_timeline(&messages);
        Self {
            messages,
            groups,
            banner: store.banner(),
            loading: store.is_loading(),
            connection_failed: store.connection_failed(),
            sending: store.is_sending(),
            input_disabled: store.input_disabled(),
            poll_state: state.poller.state(),
            pinned_to_bottom: store.scroll().pinned_to_bottom(),
            pending_indicator_visible: store.scroll().pending_indicator_visible(),
            should_scroll_to_bottom: store.scroll().should_scroll_to_bottom(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

struct SessionState {
    store: MessageStore,
    poller: PollController,
    timers: Scheduler,
    poll_task: Option<AbortHandle>,
}

impl SessionState {
    fn stop_poll_task(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        self.stop_poll_task();
    }
}

struct Shared {
    state: Mutex<SessionState>,
    source: Arc<dyn MessageSource>,
    relay: Arc<dyn OutboundRelay>,
    settings: SessionSettings,
    updates: watch::Sender<ChatSnapshot>,
}

/// Cheap to clone; every clone drives the same session.
#[derive(Clone)]
pub struct ChatSession {
    shared: Arc<Shared>,
}

impl ChatSession {
    pub fn new(
        source: Arc<dyn MessageSource>,
        relay: Arc<dyn OutboundRelay>,
        settings: SessionSettings,
    ) -> Self {
        let state = SessionState {
            store: MessageStore::new(
                ScrollController::new(settings.scroll_threshold),
                settings.show_tool_annotations,
            ),
            poller: PollController::new(),
            timers: Scheduler::new(),
            poll_task: None,
        };
        let (updates, _) = watch::channel(ChatSnapshot::capture(&state));
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                source,
                relay,
                settings,
                updates,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.shared.updates.subscribe()
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.shared.updates.borrow().clone()
    }

    /// Seeds the list with messages fetched before the view mounted.
    pub fn hydrate(&self, messages: Vec<Message>) -> ScrollAction {
        let mut state = self.shared.lock();
        let action = state.store.hydrate(messages);
        self.shared.publish(&state);
        action
    }

    /// Starts polling with an immediate fetch. Mounting twice is a no-op.
    pub fn mount(&self) {
        let mut state = self.shared.lock();
        if !state.poller.mount() {
            return;
        }
        info!("chat mounted, polling started");
        self.shared.start_polling(&mut state, true);
        self.shared.publish(&state);
    }

    /// Stops polling and cancels every pending timer. Fetches still in flight
    /// are discarded when they land.
    pub fn unmount(&self) {
        let mut state = self.shared.lock();
        state.poller.unmount();
        state.stop_poll_task();
        state.timers.cancel_all();
        state.store.teardown();
        info!("chat unmounted, polling stopped");
        self.shared.publish(&state);
    }

    /// User-initiated retry. Resumes a suspended poller and fetches right away.
    pub async fn refresh(&self) -> Option<FetchOutcome> {
        {
            let mut state = self.shared.lock();
            if state.poller.resume() {
                info!("polling resumed by refresh");
                self.shared.start_polling(&mut state, false);
            }
            state.store.prepare_refresh();
            self.shared.publish(&state);
        }
        self.shared.fetch_once().await
    }

    /// One fetch outside the poll schedule. Returns `None` when polling is
    /// not active or the result arrived after it stopped.
    pub async fn fetch_now(&self) -> Option<FetchOutcome> {
        self.shared.fetch_once().await
    }

    /// Runs a send end to end: optimistic message, relay, confirming fetch,
    /// then the expiry timer for the optimistic copy.
    pub async fn send_message(&self, text: &str) -> Result<MessageStatus, SendRejected> {
        let ticket = {
            let mut state = self.shared.lock();
            match state.store.begin_send(text, OffsetDateTime::now_utc()) {
                Ok(ticket) => {
                    self.shared.publish(&state);
                    ticket
                }
                Err(SendRejected::Disconnected) => {
                    warn!("send blocked while the message store is unreachable");
                    self.shared.schedule_notice_restore(&mut state);
                    self.shared.publish(&state);
                    return Err(SendRejected::Disconnected);
                }
                Err(rejected) => {
                    debug!("send rejected: {rejected}");
                    return Err(rejected);
                }
            }
        };

        info!(temp_id = %ticket.temp_id, "relaying message to chatbot");
        let delivered = match self.shared.relay.send_outbound(&ticket.body).await {
            Ok(receipt) => {
                debug!(temp_id = %ticket.temp_id, response = %receipt.data, "chatbot accepted message");
                self.shared.fetch_once().await;
                true
            }
            Err(err) => {
                error!(temp_id = %ticket.temp_id, "failed to relay message: {err}");
                false
            }
        };

        let mut state = self.shared.lock();
        let status = state.store.complete_send(&ticket.temp_id, delivered);
        if state.poller.state() == PollState::Idle {
            // Torn down while the relay ran; nothing left to show it in.
            state.store.expire_pending(&ticket.temp_id);
        } else {
            let delay = self.shared.settings.timings.expiry_for(status);
            self.shared.schedule_expiry(&mut state, ticket.temp_id, delay);
        }
        self.shared.publish(&state);
        Ok(status)
    }

    /// Empties the local view only.
    pub fn clear(&self) {
        self.shared.update(|state| state.store.clear());
    }

    pub fn dismiss_error(&self) {
        self.shared.update(|state| state.store.dismiss_banner());
    }

    pub fn on_scroll(&self, metrics: ScrollMetrics) {
        self.shared.update(|state| {
            state.store.scroll_mut().on_scroll(metrics);
        });
    }

    pub fn jump_to_latest(&self) -> ScrollAction {
        self.shared
            .update(|state| state.store.scroll_mut().jump_to_latest())
    }

    /// The view finished the scroll it was asked for.
    pub fn scroll_completed(&self) {
        self.shared
            .update(|state| state.store.scroll_mut().scroll_completed());
    }

    /// Timers that have not fired yet.
    pub fn pending_timers(&self) -> usize {
        self.shared.lock().timers.pending()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &SessionState) {
        let next = ChatSnapshot::capture(state);
        self.updates.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn update<R>(&self, apply: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.lock();
        let result = apply(&mut state);
        self.publish(&state);
        result
    }

    fn start_polling(self: &Arc<Self>, state: &mut SessionState, immediate: bool) {
        state.stop_poll_task();
        let task = tokio::spawn(poll_loop(Arc::downgrade(self), immediate));
        state.poll_task = Some(task.abort_handle());
    }

    fn next_interval(&self) -> Option<Duration> {
        let state = self.lock();
        state.poller.is_polling().then(|| {
            state
                .poller
                .interval(state.store.is_sending(), &self.settings.timings)
        })
    }

    async fn fetch_once(&self) -> Option<FetchOutcome> {
        let (ticket, epoch) = {
            let mut state = self.lock();
            if !state.poller.is_polling() {
                return None;
            }
            let ticket = state.store.begin_fetch();
            self.publish(&state);
            (ticket, state.poller.epoch())
        };

        let result = self.source.fetch_messages(self.settings.fetch_limit).await;

        let mut state = self.lock();
        if !state.poller.accepts(epoch) {
            debug!(?ticket, "discarding fetch that finished after polling stopped");
            state.store.abandon_fetch(ticket);
            self.publish(&state);
            return None;
        }

        let outcome = match result {
            Ok(messages) => state.store.apply_fetch_result(ticket, messages),
            Err(err) => {
                let outcome = state.store.apply_fetch_error(ticket, &err);
                match outcome {
                    FetchOutcome::Failed { suspend: true } => {
                        warn!(code = err.code(), "message store unreachable, suspending polling: {err}");
                        state.poller.suspend();
                        state.stop_poll_task();
                    }
                    FetchOutcome::Failed { suspend: false } => {
                        error!(code = err.code(), "failed to fetch messages: {err}");
                    }
                    _ => {}
                }
                outcome
            }
        };
        self.publish(&state);
        Some(outcome)
    }

    fn schedule_expiry(self: &Arc<Self>, state: &mut SessionState, temp_id: MessageId, delay: Duration) {
        let weak = Arc::downgrade(self);
        state.timers.schedule(delay, async move {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let mut state = shared.lock();
            if state.store.expire_pending(&temp_id) {
                debug!(%temp_id, "optimistic message expired");
            }
            shared.publish(&state);
        });
    }

    fn schedule_notice_restore(self: &Arc<Self>, state: &mut SessionState) {
        let weak = Arc::downgrade(self);
        let delay = self.settings.timings.disconnected_notice;
        state.timers.schedule(delay, async move {
            if let Some(shared) = weak.upgrade() {
                shared.update(|state| state.store.restore_connection_banner());
            }
        });
    }
}

async fn poll_loop(session: Weak<Shared>, immediate: bool) {
    let mut first = immediate;
    loop {
        if !first {
            let Some(interval) = session.upgrade().and_then(|s| s.next_interval()) else {
                break;
            };
            tokio::time::sleep(interval).await;
        }
        first = false;

        let Some(shared) = session.upgrade() else {
            break;
        };
        if !shared.lock().poller.is_polling() {
            break;
        }
        // Ticks never wait on a slow fetch; sequencing drops late results.
        tokio::spawn(async move {
            shared.fetch_once().await;
        });
    }
}
