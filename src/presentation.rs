//! Render model for the chat list. Pure functions of store state; the Dioxus
//! views only map these onto markup.

use crate::timeline::{self, DateGroup};
use crate::types::{Message, MessageStatus, Role};
use time::{OffsetDateTime, UtcOffset};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BubbleSide {
    Outgoing,
    Incoming,
}

impl BubbleSide {
    pub fn css_class(self) -> &'static str {
        match self {
            BubbleSide::Outgoing => "outgoing",
            BubbleSide::Incoming => "incoming",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusGlyph {
    /// Single check at half opacity.
    Sending,
    /// Double check.
    Sent,
    /// Single check in the alert colour.
    Failed,
}

impl StatusGlyph {
    pub fn for_status(status: MessageStatus) -> Self {
        match status {
            MessageStatus::Sending => StatusGlyph::Sending,
            MessageStatus::Sent => StatusGlyph::Sent,
            MessageStatus::Error => StatusGlyph::Failed,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            StatusGlyph::Sending | StatusGlyph::Failed => "\u{2713}",
            StatusGlyph::Sent => "\u{2713}\u{2713}",
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            StatusGlyph::Sending => "status status-sending",
            StatusGlyph::Sent => "status status-sent",
            StatusGlyph::Failed => "status status-error",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BubbleBody {
    Text(String),
    ToolCall { label: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageView {
    pub key: String,
    pub side: BubbleSide,
    pub body: BubbleBody,
    pub time_label: String,
    pub status: Option<StatusGlyph>,
    pub is_temp: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DateGroupView {
    pub key: i64,
    pub label: String,
    pub messages: Vec<MessageView>,
}

/// Tool rows always render (as an annotation); every other role needs
/// non-blank content.
pub fn is_renderable(message: &Message) -> bool {
    message.role == Role::Tool
        || message
            .content
            .as_deref()
            .is_some_and(|content| !content.trim().is_empty())
}

pub fn build_timeline(visible: &[Message]) -> Vec<DateGroup> {
    build_timeline_in(visible, timeline::local_offset())
}

/// Filters, orders and groups the visible messages.
pub fn build_timeline_in(visible: &[Message], offset: UtcOffset) -> Vec<DateGroup> {
    let renderable: Vec<Message> = visible.iter().filter(|m| is_renderable(m)).cloned().collect();
    let sorted = timeline::sort_messages(renderable);
    timeline::group_by_date_in(&sorted, offset)
}

pub fn present(groups: &[DateGroup]) -> Vec<DateGroupView> {
    present_at(groups, OffsetDateTime::now_utc(), timeline::local_offset())
}

pub fn present_at(groups: &[DateGroup], now: OffsetDateTime, offset: UtcOffset) -> Vec<DateGroupView> {
    groups
        .iter()
        .map(|group| DateGroupView {
            key: group.date,
            label: timeline::format_date_divider(group.date, now, offset),
            messages: group
                .messages
                .iter()
                .map(|msg| message_view(msg, now, offset))
                .collect(),
        })
        .collect()
}

pub fn message_view(message: &Message, now: OffsetDateTime, offset: UtcOffset) -> MessageView {
    let outgoing = message.role == Role::User;
    let tool_name = message.tool_name.as_deref().filter(|name| !name.trim().is_empty());
    let body = match (message.role, tool_name, message.text()) {
        (Role::Tool, Some(name), _) => BubbleBody::ToolCall {
            label: format_tool_name(name),
        },
        (Role::Tool, None, None) => BubbleBody::ToolCall {
            label: "Tool".to_string(),
        },
        (_, _, text) => BubbleBody::Text(text.unwrap_or_default().to_string()),
    };
    let ts = timeline::canonical_timestamp_at(message, now);

    MessageView {
        key: format!(
            "{}-{}",
            message.id,
            if message.is_temp { "temp" } else { "real" }
        ),
        side: if outgoing {
            BubbleSide::Outgoing
        } else {
            BubbleSide::Incoming
        },
        body,
        time_label: timeline::format_message_time(ts, offset),
        status: outgoing.then(|| StatusGlyph::for_status(message.effective_status())),
        is_temp: message.is_temp,
    }
}

/// `search_knowledge_base` -> "Search Knowledge Base".
pub fn format_tool_name(raw: &str) -> String {
    raw.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => format!("{}{}", first.to_uppercase(), chars.as_str().to_lowercase()),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
