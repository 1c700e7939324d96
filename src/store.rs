//! Client-side message state: confirmed rows, optimistic sends, and the
//! flags the view renders from. Only its own methods mutate it.

use crate::dedup;
use crate::error::{FetchError, SendRejected};
use crate::presentation;
use crate::scroll::{ScrollAction, ScrollController};
use crate::timeline;
use crate::types::{Message, MessageId, MessageStatus, Role};
use time::OffsetDateTime;
use tracing::debug;

/// User-visible error line above the message list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Banner {
    ConnectionLost,
    FetchFailed,
    SendBlocked,
}

impl Banner {
    pub fn text(self) -> &'static str {
        match self {
            Banner::ConnectionLost => {
                "Database connection failed. Please check your database configuration."
            }
            Banner::FetchFailed => "An error occurred while fetching messages.",
            Banner::SendBlocked => {
                "Cannot send messages while disconnected from the database. Please restore connection and refresh."
            }
        }
    }
}

/// Identifies one issued fetch; later tickets supersede earlier ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(u64);

/// Handed to the relay step of a send.
#[derive(Clone, Debug, PartialEq)]
pub struct SendTicket {
    pub temp_id: MessageId,
    pub body: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A newer fetch already landed; nothing changed.
    Stale,
    Applied { scroll: ScrollAction },
    Failed { suspend: bool },
}

#[derive(Clone, Debug, PartialEq)]
struct SendSlot {
    temp_id: MessageId,
    content: String,
    relay_done: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MessageStore {
    confirmed: Vec<Message>,
    pending: Vec<Message>,
    loading: bool,
    banner: Option<Banner>,
    connection_failed: bool,
    send_slot: Option<SendSlot>,
    issued_seq: u64,
    applied_seq: u64,
    last_temp_id: i64,
    show_tool_annotations: bool,
    scroll: ScrollController,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new(ScrollController::default(), false)
    }
}

impl MessageStore {
    pub fn new(scroll: ScrollController, show_tool_annotations: bool) -> Self {
        Self {
            confirmed: Vec::new(),
            pending: Vec::new(),
            loading: false,
            banner: None,
            connection_failed: false,
            send_slot: None,
            issued_seq: 0,
            applied_seq: 0,
            last_temp_id: 0,
            show_tool_annotations,
            scroll,
        }
    }

    pub fn confirmed(&self) -> &[Message] {
        &self.confirmed
    }

    pub fn pending(&self) -> &[Message] {
        &self.pending
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn banner(&self) -> Option<Banner> {
        self.banner
    }

    pub fn connection_failed(&self) -> bool {
        self.connection_failed
    }

    /// True while a send occupies the single outbound slot.
    pub fn is_sending(&self) -> bool {
        self.send_slot.is_some()
    }

    pub fn input_disabled(&self) -> bool {
        self.connection_failed || self.is_sending()
    }

    pub fn scroll(&self) -> &ScrollController {
        &self.scroll
    }

    pub fn scroll_mut(&mut self) -> &mut ScrollController {
        &mut self.scroll
    }

    /// Confirmed then pending messages, restricted to the roles the chat shows.
    pub fn visible_messages(&self) -> Vec<Message> {
        self.confirmed
            .iter()
            .chain(self.pending.iter())
            .filter(|msg| self.is_visible_role(msg.role))
            .cloned()
            .collect()
    }

    /// Feeds the rendered row count and the newest confirmed row to the
    /// scroll controller.
    fn notify_scroll(&mut self) -> ScrollAction {
        let rendered = |msg: &&Message| self.is_visible_role(msg.role) && presentation::is_renderable(msg);
        let len = self
            .confirmed
            .iter()
            .chain(self.pending.iter())
            .filter(rendered)
            .count();
        let newest = self.confirmed.iter().filter(rendered).map(timeline::latest_key).max();
        self.scroll.on_messages_changed(len, newest)
    }

    fn is_visible_role(&self, role: Role) -> bool {
        role.is_conversational() || (self.show_tool_annotations && role == Role::Tool)
    }

    /// Loads a prefetched list before the first poll.
    pub fn hydrate(&mut self, confirmed: Vec<Message>) -> ScrollAction {
        if confirmed.is_empty() || !self.confirmed.is_empty() {
            return ScrollAction::None;
        }
        self.confirmed = confirmed;
        self.notify_scroll()
    }

    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.issued_seq += 1;
        self.loading = true;
        FetchTicket(self.issued_seq)
    }

    /// A fetch whose result will never be applied (e.g. polling stopped).
    pub fn abandon_fetch(&mut self, ticket: FetchTicket) {
        self.settle_loading(ticket);
    }

    pub fn apply_fetch_result(&mut self, ticket: FetchTicket, confirmed: Vec<Message>) -> FetchOutcome {
        if !self.accept(ticket) {
            return FetchOutcome::Stale;
        }

        self.confirmed = confirmed;
        self.banner = None;
        self.connection_failed = false;

        if !self.pending.is_empty() {
            self.pending = dedup::reconcile(&self.confirmed, &self.pending);
        }
        self.release_confirmed_send();

        FetchOutcome::Applied {
            scroll: self.notify_scroll(),
        }
    }

    pub fn apply_fetch_error(&mut self, ticket: FetchTicket, error: &FetchError) -> FetchOutcome {
        if !self.accept(ticket) {
            return FetchOutcome::Stale;
        }

        self.scroll.cancel_request();
        let suspend = error.is_connectivity();
        self.connection_failed = suspend;
        self.banner = Some(if suspend {
            Banner::ConnectionLost
        } else {
            Banner::FetchFailed
        });
        FetchOutcome::Failed { suspend }
    }

    fn accept(&mut self, ticket: FetchTicket) -> bool {
        self.settle_loading(ticket);
        if ticket.0 <= self.applied_seq {
            debug!(ticket = ticket.0, applied = self.applied_seq, "dropping stale fetch result");
            return false;
        }
        self.applied_seq = ticket.0;
        true
    }

    fn settle_loading(&mut self, ticket: FetchTicket) {
        if ticket.0 >= self.issued_seq {
            self.loading = false;
        }
    }

    fn release_confirmed_send(&mut self) {
        let confirmed = self.send_slot.as_ref().is_some_and(|slot| {
            slot.relay_done && dedup::is_confirmed(&self.confirmed, Some(&slot.content))
        });
        if confirmed {
            self.send_slot = None;
        }
    }

    /// Starts a send: validates, appends the optimistic message and claims
    /// the outbound slot.
    pub fn begin_send(&mut self, text: &str, now: OffsetDateTime) -> Result<SendTicket, SendRejected> {
        let body = text.trim();
        if body.is_empty() {
            return Err(SendRejected::Empty);
        }
        if self.connection_failed {
            self.banner = Some(Banner::SendBlocked);
            return Err(SendRejected::Disconnected);
        }
        if self.send_slot.is_some() {
            return Err(SendRejected::InFlight);
        }

        let temp_id = self.next_temp_id(now);
        self.pending
            .push(Message::optimistic(temp_id.clone(), body, now));
        self.send_slot = Some(SendSlot {
            temp_id: temp_id.clone(),
            content: body.to_string(),
            relay_done: false,
        });

        self.scroll.request_scroll();
        self.notify_scroll();

        Ok(SendTicket {
            temp_id,
            body: body.to_string(),
        })
    }

    // Submission time in milliseconds, bumped when two sends share a tick.
    fn next_temp_id(&mut self, now: OffsetDateTime) -> MessageId {
        let millis = (now.unix_timestamp_nanos() / 1_000_000) as i64;
        self.last_temp_id = millis.max(self.last_temp_id + 1);
        MessageId::Int(self.last_temp_id)
    }

    /// Records the relay result on the optimistic message and returns the
    /// status it ended in.
    pub fn complete_send(&mut self, temp_id: &MessageId, delivered: bool) -> MessageStatus {
        let status = if delivered {
            MessageStatus::Sent
        } else {
            MessageStatus::Error
        };
        if let Some(msg) = self.pending.iter_mut().find(|msg| &msg.id == temp_id) {
            msg.status = Some(status);
        }
        if let Some(slot) = self.send_slot.as_mut()
            && &slot.temp_id == temp_id
        {
            slot.relay_done = true;
        }
        if delivered {
            self.release_confirmed_send();
        }
        status
    }

    /// Drops an optimistic message whose display window ran out and frees the
    /// outbound slot if it belonged to that send.
    pub fn expire_pending(&mut self, temp_id: &MessageId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|msg| &msg.id != temp_id);
        if self
            .send_slot
            .as_ref()
            .is_some_and(|slot| &slot.temp_id == temp_id)
        {
            self.send_slot = None;
        }
        let removed = self.pending.len() != before;
        if removed {
            self.notify_scroll();
        }
        removed
    }

    /// Puts the connection banner back after the send-blocked notice.
    pub fn restore_connection_banner(&mut self) {
        if self.banner == Some(Banner::SendBlocked) {
            self.banner = self.connection_failed.then_some(Banner::ConnectionLost);
        }
    }

    pub fn dismiss_banner(&mut self) {
        self.banner = None;
    }

    /// User asked to retry; clears the disconnected flag ahead of the fetch.
    pub fn prepare_refresh(&mut self) {
        self.connection_failed = false;
        self.scroll.request_scroll();
    }

    /// Forgets optimistic messages when the view goes away. A send whose
    /// relay is still running keeps its slot until the relay returns.
    pub fn teardown(&mut self) {
        self.pending.clear();
        if self.send_slot.as_ref().is_some_and(|slot| slot.relay_done) {
            self.send_slot = None;
        }
    }

    /// Empties the local view. Server rows are untouched and return on the
    /// next fetch.
    pub fn clear(&mut self) {
        self.confirmed.clear();
        self.pending.clear();
        self.scroll.reset_count();
    }
}
