//! Integration tests for the chat session
//!
//! Drives polling, sends and timers against in-memory collaborators with
//! tokio's paused clock.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::macros::datetime;
use twiga_mirror::config::{SessionSettings, Timings};
use twiga_mirror::error::{FetchError, RelayError, SendRejected};
use twiga_mirror::poller::PollState;
use twiga_mirror::relay::{OutboundRelay, RelayReceipt};
use twiga_mirror::scroll::{ScrollAction, ScrollMetrics};
use twiga_mirror::session::ChatSession;
use twiga_mirror::source::MessageSource;
use twiga_mirror::store::{Banner, FetchOutcome};
use twiga_mirror::types::{Message, MessageStatus, Role};

// ============================================
// Fakes
// ============================================

#[derive(Default)]
struct SourceState {
    rows: Vec<Message>,
    error: Option<FetchError>,
    delay: Option<Duration>,
}

#[derive(Default)]
struct FakeSource {
    state: Mutex<SourceState>,
    calls: AtomicUsize,
}

impl FakeSource {
    fn with_rows(rows: Vec<Message>) -> Arc<Self> {
        let source = Self::default();
        source.set_rows(rows);
        Arc::new(source)
    }

    fn failing(error: FetchError) -> Arc<Self> {
        let source = Self::default();
        source.set_error(error);
        Arc::new(source)
    }

    fn set_rows(&self, rows: Vec<Message>) {
        let mut state = self.state.lock().unwrap();
        state.rows = rows;
        state.error = None;
    }

    fn set_error(&self, error: FetchError) {
        self.state.lock().unwrap().error = Some(error);
    }

    fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().unwrap().delay = delay;
    }

    fn push_user_row(&self, content: &str) {
        let mut state = self.state.lock().unwrap();
        let id = state.rows.len() as i64 + 100;
        state.rows.push(row(id, Role::User, content));
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageSource for FakeSource {
    async fn fetch_messages(&self, _limit: usize) -> Result<Vec<Message>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Captured at call time, so a slow call answers with what it saw.
        let (result, delay) = {
            let state = self.state.lock().unwrap();
            let result = match &state.error {
                Some(err) => Err(err.clone()),
                None => Ok(state.rows.clone()),
            };
            (result, state.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

enum RelayMode {
    /// Accepts and stores the text where the source will find it.
    Echo(Arc<FakeSource>),
    /// Accepts without the text ever showing up.
    Accept,
    Reject,
}

struct FakeRelay {
    mode: RelayMode,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeRelay {
    fn new(mode: RelayMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn slow(mode: RelayMode, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            mode,
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OutboundRelay for FakeRelay {
    async fn send_outbound(&self, body: &str) -> Result<RelayReceipt, RelayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.mode {
            RelayMode::Echo(source) => {
                source.push_user_row(body);
                Ok(RelayReceipt {
                    data: serde_json::json!({"status": "ok"}),
                })
            }
            RelayMode::Accept => Ok(RelayReceipt {
                data: serde_json::Value::Null,
            }),
            RelayMode::Reject => Err(RelayError::Rejected {
                status: 500,
                body: "internal error".into(),
            }),
        }
    }
}

// ============================================
// Helpers
// ============================================

fn row(id: i64, role: Role, content: &str) -> Message {
    Message::confirmed(id, role, content, datetime!(2024-03-05 09:00 UTC))
}

fn history() -> Vec<Message> {
    vec![
        row(1, Role::User, "Habari"),
        row(2, Role::Assistant, "Hello! How can I help?"),
    ]
}

fn session_with(source: Arc<FakeSource>, relay: Arc<FakeRelay>) -> ChatSession {
    ChatSession::new(source, relay, SessionSettings::default())
}

/// Poll interval long enough that no tick lands inside a test.
fn quiet_settings() -> SessionSettings {
    SessionSettings {
        timings: Timings {
            poll_interval: Duration::from_secs(600),
            sending_poll_interval: Duration::from_secs(600),
            ..Timings::default()
        },
        ..SessionSettings::default()
    }
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
    settle().await;
}

fn contents(session: &ChatSession) -> Vec<String> {
    session
        .snapshot()
        .messages
        .iter()
        .filter_map(|msg| msg.content.clone())
        .collect()
}

// ============================================
// Polling
// ============================================

mod polling_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_mount_fetches_immediately_then_every_interval() {
        let source = FakeSource::with_rows(history());
        let session = session_with(source.clone(), FakeRelay::new(RelayMode::Accept));

        session.mount();
        settle().await;
        assert_eq!(source.calls(), 1);
        assert_eq!(session.snapshot().poll_state, PollState::Polling);
        assert_eq!(contents(&session), ["Habari", "Hello! How can I help?"]);

        advance(Duration::from_millis(2100)).await;
        assert_eq!(source.calls(), 2);
        advance(Duration::from_secs(2)).await;
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connectivity_failure_suspends_until_refresh() {
        let source = FakeSource::failing(FetchError::connectivity("ECONNREFUSED"));
        let session = session_with(source.clone(), FakeRelay::new(RelayMode::Accept));

        session.mount();
        settle().await;
        let snapshot = session.snapshot();
        assert_eq!(snapshot.poll_state, PollState::Suspended);
        assert_eq!(snapshot.banner, Some(Banner::ConnectionLost));
        assert!(snapshot.connection_failed);
        assert!(snapshot.input_disabled);

        // No automatic retries while suspended.
        advance(Duration::from_secs(30)).await;
        assert_eq!(source.calls(), 1);

        source.set_rows(history());
        let outcome = session.refresh().await;
        assert!(matches!(outcome, Some(FetchOutcome::Applied { .. })));
        assert_eq!(source.calls(), 2);

        let snapshot = session.snapshot();
        assert_eq!(snapshot.poll_state, PollState::Polling);
        assert_eq!(snapshot.banner, None);
        assert!(!snapshot.input_disabled);

        advance(Duration::from_millis(2100)).await;
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generic_failure_keeps_polling() {
        let source = FakeSource::failing(FetchError::generic("relation \"messages\" does not exist"));
        let session = session_with(source.clone(), FakeRelay::new(RelayMode::Accept));

        session.mount();
        settle().await;
        let snapshot = session.snapshot();
        assert_eq!(snapshot.banner, Some(Banner::FetchFailed));
        assert_eq!(snapshot.poll_state, PollState::Polling);
        assert!(!snapshot.input_disabled);

        session.dismiss_error();
        assert_eq!(session.snapshot().banner, None);

        advance(Duration::from_millis(2100)).await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_speeds_up_while_a_send_is_unconfirmed() {
        let source = FakeSource::with_rows(history());
        let session = session_with(source.clone(), FakeRelay::new(RelayMode::Accept));

        session.mount();
        settle().await;
        assert_eq!(session.send_message("Niambie zaidi").await, Ok(MessageStatus::Sent));
        // Initial fetch plus the confirming fetch after the relay.
        assert_eq!(source.calls(), 2);
        assert!(session.snapshot().sending);

        // The tick already sleeping keeps its 2s; later ticks use 1s.
        advance(Duration::from_millis(2500)).await;
        assert_eq!(source.calls(), 3);
        advance(Duration::from_secs(3)).await;
        assert_eq!(source.calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_result_is_dropped_after_suspension() {
        let source = FakeSource::with_rows(history());
        let session = ChatSession::new(
            source.clone(),
            FakeRelay::new(RelayMode::Accept),
            quiet_settings(),
        );
        session.mount();
        settle().await;

        source.set_rows(vec![row(9, Role::Assistant, "late")]);
        source.set_delay(Some(Duration::from_secs(3)));
        let slow = {
            let session = session.clone();
            tokio::spawn(async move { session.fetch_now().await })
        };
        settle().await;

        source.set_delay(None);
        source.set_error(FetchError::connectivity("Connection terminated"));
        assert_eq!(
            session.fetch_now().await,
            Some(FetchOutcome::Failed { suspend: true })
        );

        assert_eq!(slow.await.unwrap(), None);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.banner, Some(Banner::ConnectionLost));
        assert_eq!(contents(&session), ["Habari", "Hello! How can I help?"]);
        assert!(!snapshot.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_older_fetch_never_overwrites_newer() {
        let source = FakeSource::with_rows(history());
        let session = ChatSession::new(
            source.clone(),
            FakeRelay::new(RelayMode::Accept),
            quiet_settings(),
        );
        session.mount();
        settle().await;

        source.set_rows(vec![row(1, Role::User, "old view")]);
        source.set_delay(Some(Duration::from_secs(3)));
        let slow = {
            let session = session.clone();
            tokio::spawn(async move { session.fetch_now().await })
        };
        settle().await;

        source.set_delay(None);
        let mut newer = history();
        newer.push(row(3, Role::User, "newest"));
        source.set_rows(newer);
        assert!(matches!(
            session.fetch_now().await,
            Some(FetchOutcome::Applied { .. })
        ));

        assert_eq!(slow.await.unwrap(), Some(FetchOutcome::Stale));
        assert_eq!(
            contents(&session),
            ["Habari", "Hello! How can I help?", "newest"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_rows_twice_change_nothing() {
        let source = FakeSource::with_rows(history());
        let session = ChatSession::new(
            source.clone(),
            FakeRelay::new(RelayMode::Accept),
            quiet_settings(),
        );
        session.mount();
        settle().await;
        session.scroll_completed();
        let before = session.snapshot();

        session.fetch_now().await;
        assert_eq!(session.snapshot(), before);
    }
}

// ============================================
// Sending
// ============================================

mod send_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_echoed_send_is_confirmed_and_deduplicated() {
        let source = FakeSource::with_rows(history());
        let relay = FakeRelay::new(RelayMode::Echo(source.clone()));
        let session = session_with(source.clone(), relay.clone());
        session.mount();
        settle().await;

        assert_eq!(session.send_message("  Nipe mfano  ").await, Ok(MessageStatus::Sent));
        assert_eq!(relay.calls(), 1);

        let snapshot = session.snapshot();
        let echoed: Vec<_> = snapshot
            .messages
            .iter()
            .filter(|msg| msg.content.as_deref() == Some("Nipe mfano"))
            .collect();
        assert_eq!(echoed.len(), 1);
        assert!(!echoed[0].is_temp);
        assert!(!snapshot.sending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfirmed_send_expires_after_ten_seconds() {
        let source = FakeSource::with_rows(history());
        let session = session_with(source.clone(), FakeRelay::new(RelayMode::Accept));
        session.mount();
        settle().await;

        session.send_message("hello?").await.unwrap();
        let temp = session
            .snapshot()
            .messages
            .into_iter()
            .find(|msg| msg.is_temp)
            .expect("optimistic message present");
        assert_eq!(temp.status, Some(MessageStatus::Sent));

        advance(Duration::from_secs(9)).await;
        assert!(contents(&session).contains(&"hello?".to_string()));
        assert!(session.snapshot().sending);

        advance(Duration::from_secs(2)).await;
        assert!(!contents(&session).contains(&"hello?".to_string()));
        assert!(!session.snapshot().sending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_send_shows_error_for_five_seconds() {
        let source = FakeSource::with_rows(history());
        let session = session_with(source.clone(), FakeRelay::new(RelayMode::Reject));
        session.mount();
        settle().await;

        assert_eq!(session.send_message("hi").await, Ok(MessageStatus::Error));
        let failed = session
            .snapshot()
            .messages
            .into_iter()
            .find(|msg| msg.is_temp)
            .expect("failed message still shown");
        assert_eq!(failed.status, Some(MessageStatus::Error));
        assert!(session.snapshot().input_disabled);

        advance(Duration::from_secs(4)).await;
        assert_eq!(session.snapshot().messages.len(), 3);

        advance(Duration::from_secs(2)).await;
        assert_eq!(session.snapshot().messages.len(), 2);
        assert!(!session.snapshot().input_disabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_send_while_in_flight_is_rejected() {
        let source = FakeSource::with_rows(history());
        let relay = FakeRelay::slow(RelayMode::Accept, Duration::from_secs(1));
        let session = session_with(source.clone(), relay.clone());
        session.mount();
        settle().await;

        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.send_message("first").await })
        };
        settle().await;
        assert!(session.snapshot().sending);

        assert_eq!(
            session.send_message("second").await,
            Err(SendRejected::InFlight)
        );
        assert_eq!(first.await.unwrap(), Ok(MessageStatus::Sent));
        assert_eq!(relay.calls(), 1);
        assert!(!contents(&session).contains(&"second".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_send_is_ignored() {
        let source = FakeSource::with_rows(history());
        let relay = FakeRelay::new(RelayMode::Accept);
        let session = session_with(source, relay.clone());
        session.mount();
        settle().await;

        assert_eq!(session.send_message("   ").await, Err(SendRejected::Empty));
        assert_eq!(relay.calls(), 0);
        assert_eq!(session.snapshot().messages.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnected_send_shows_notice_then_restores_banner() {
        let source = FakeSource::failing(FetchError::connectivity("ECONNREFUSED"));
        let relay = FakeRelay::new(RelayMode::Accept);
        let session = session_with(source, relay.clone());
        session.mount();
        settle().await;

        assert_eq!(
            session.send_message("hi").await,
            Err(SendRejected::Disconnected)
        );
        assert_eq!(relay.calls(), 0);
        assert_eq!(session.snapshot().banner, Some(Banner::SendBlocked));

        advance(Duration::from_millis(3100)).await;
        assert_eq!(session.snapshot().banner, Some(Banner::ConnectionLost));
    }
}

// ============================================
// Lifecycle and scrolling
// ============================================

mod lifecycle_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_unmount_cancels_polling_and_timers() {
        let source = FakeSource::with_rows(history());
        let session = session_with(source.clone(), FakeRelay::new(RelayMode::Reject));
        session.mount();
        settle().await;

        session.send_message("bye").await.unwrap();
        assert_eq!(session.pending_timers(), 1);

        session.unmount();
        assert_eq!(session.pending_timers(), 0);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.poll_state, PollState::Idle);
        assert!(!snapshot.sending);

        let calls = source.calls();
        advance(Duration::from_secs(20)).await;
        assert_eq!(source.calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_in_flight_at_unmount_is_discarded() {
        let source = FakeSource::with_rows(history());
        source.set_delay(Some(Duration::from_secs(1)));
        let session = session_with(source.clone(), FakeRelay::new(RelayMode::Accept));

        session.mount();
        settle().await;
        session.unmount();

        advance(Duration::from_secs(2)).await;
        let snapshot = session.snapshot();
        assert!(snapshot.messages.is_empty());
        assert!(!snapshot.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scrolled_up_reader_gets_indicator() {
        let source = FakeSource::with_rows(history());
        let session = ChatSession::new(
            source.clone(),
            FakeRelay::new(RelayMode::Accept),
            quiet_settings(),
        );
        assert_eq!(session.hydrate(history()), ScrollAction::ScrollToBottom);
        session.scroll_completed();
        session.mount();
        settle().await;

        session.on_scroll(ScrollMetrics {
            scroll_top: 0.0,
            scroll_height: 2000.0,
            client_height: 600.0,
        });
        assert!(!session.snapshot().pinned_to_bottom);

        source.push_user_row("new question");
        session.fetch_now().await;
        let snapshot = session.snapshot();
        assert!(snapshot.pending_indicator_visible);
        assert!(!snapshot.should_scroll_to_bottom);

        assert_eq!(session.jump_to_latest(), ScrollAction::ScrollToBottom);
        let snapshot = session.snapshot();
        assert!(!snapshot.pending_indicator_visible);
        assert!(snapshot.should_scroll_to_bottom);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_empties_view_until_next_fetch() {
        let source = FakeSource::with_rows(history());
        let session = ChatSession::new(
            source.clone(),
            FakeRelay::new(RelayMode::Accept),
            quiet_settings(),
        );
        session.mount();
        settle().await;

        session.clear();
        assert!(session.snapshot().is_empty());

        session.refresh().await;
        assert_eq!(session.snapshot().messages.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_updates() {
        let source = FakeSource::with_rows(history());
        let session = session_with(source, FakeRelay::new(RelayMode::Accept));
        let mut updates = session.subscribe();

        session.mount();
        settle().await;
        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().messages.len(), 2);
    }
}
