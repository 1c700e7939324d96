use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::System => "system",
        }
    }

    /// Roles shown in the chat view by default.
    pub fn is_conversational(self) -> bool {
        matches!(self, Role::User | Role::Assistant)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "tool" => Ok(Role::Tool),
            "system" => Ok(Role::System),
            other => Err(format!("unknown message role '{other}'")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server rows carry integer ids; optimistic messages use a synthetic one.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Int(i64),
    Text(String),
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Int(id) => write!(f, "{id}"),
            MessageId::Text(id) => f.write_str(id),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Error,
}

/// The shapes a creation time arrives in.
#[derive(Clone, Debug, PartialEq)]
pub enum CreatedAt {
    /// ISO-8601 / RFC 3339 text, or Postgres' `YYYY-MM-DD HH:MM:SS+TZ` rendering.
    Text(String),
    /// Milliseconds since the Unix epoch.
    EpochMillis(i64),
    DateTime(OffsetDateTime),
}

impl From<OffsetDateTime> for CreatedAt {
    fn from(value: OffsetDateTime) -> Self {
        CreatedAt::DateTime(value)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: Option<String>,
    pub tool_name: Option<String>,
    pub created_at: Option<CreatedAt>,
    /// Precomputed epoch seconds; wins over `created_at` when present.
    pub timestamp: Option<i64>,
    pub status: Option<MessageStatus>,
    pub is_temp: bool,
}

impl Message {
    /// A message as read back from the store.
    pub fn confirmed(id: i64, role: Role, content: impl Into<String>, created_at: OffsetDateTime) -> Self {
        Self {
            id: MessageId::Int(id),
            role,
            content: Some(content.into()),
            tool_name: None,
            created_at: Some(CreatedAt::DateTime(created_at)),
            timestamp: Some(created_at.unix_timestamp()),
            status: Some(MessageStatus::Sent),
            is_temp: false,
        }
    }

    /// A locally created user message that the server has not echoed back yet.
    pub fn optimistic(id: MessageId, content: impl Into<String>, now: OffsetDateTime) -> Self {
        Self {
            id,
            role: Role::User,
            content: Some(content.into()),
            tool_name: None,
            created_at: Some(CreatedAt::DateTime(now)),
            timestamp: Some(now.unix_timestamp()),
            status: Some(MessageStatus::Sending),
            is_temp: true,
        }
    }

    pub fn with_tool_name(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    /// Confirmed messages are implicitly sent.
    pub fn effective_status(&self) -> MessageStatus {
        self.status.unwrap_or(MessageStatus::Sent)
    }

    pub fn text(&self) -> Option<&str> {
        self.content.as_deref()
    }
}
