use super::MessageSource;
use crate::error::{ConfigError, FetchError};
use crate::types::{CreatedAt, Message, MessageId, MessageStatus, Role};
use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

const MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

const SELECT_RECENT: &str = r#"
    SELECT id, role, content, tool_name, created_at
    FROM messages
    ORDER BY created_at DESC
    LIMIT $1
"#;

const CONNECTION_MARKERS: &[&str] = &[
    "econnrefused",
    "connection refused",
    "connection terminated",
    "connection reset",
];

/// Reads the chatbot's `messages` table. The pool is created on first use, so
/// a database that is down at startup only fails the first fetch.
pub struct PgMessageSource {
    options: PgConnectOptions,
    pool: OnceCell<PgPool>,
}

impl PgMessageSource {
    pub fn new(database_url: &str) -> Result<Self, ConfigError> {
        let options = PgConnectOptions::from_str(database_url)
            .map_err(|e| ConfigError::invalid("DATABASE_URL", e.to_string()))?
            // Poolers in transaction mode reject prepared statements.
            .statement_cache_capacity(0);
        Ok(Self {
            options,
            pool: OnceCell::new(),
        })
    }

    async fn pool(&self) -> Result<&PgPool, FetchError> {
        self.pool
            .get_or_try_init(|| async {
                debug!("connecting to message database");
                PgPoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .acquire_timeout(ACQUIRE_TIMEOUT)
                    .idle_timeout(IDLE_TIMEOUT)
                    .connect_with(self.options.clone())
                    .await
                    .map_err(|e| classify(&e))
            })
            .await
    }
}

#[async_trait]
impl MessageSource for PgMessageSource {
    async fn fetch_messages(&self, limit: usize) -> Result<Vec<Message>, FetchError> {
        let pool = self.pool().await?;
        let rows = sqlx::query(SELECT_RECENT)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(pool)
            .await
            .map_err(|e| classify(&e))?;

        // The query takes the newest rows; hand them over oldest first.
        rows.iter()
            .rev()
            .map(message_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| FetchError::generic(format!("malformed message row: {e}")))
    }
}

fn message_from_row(row: &PgRow) -> Result<Message, sqlx::Error> {
    let id: i32 = row.try_get("id")?;
    let role_raw: String = row.try_get("role")?;
    let content: Option<String> = row.try_get("content")?;
    let tool_name: Option<String> = row.try_get("tool_name")?;
    let created_at: OffsetDateTime = row.try_get("created_at")?;

    let role = role_raw.parse::<Role>().unwrap_or_else(|err| {
        warn!(message_id = id, "{err}; hiding message");
        Role::System
    });

    Ok(Message {
        id: MessageId::Int(i64::from(id)),
        role,
        content,
        tool_name,
        created_at: Some(CreatedAt::DateTime(created_at)),
        timestamp: Some(created_at.unix_timestamp()),
        status: Some(MessageStatus::Sent),
        is_temp: false,
    })
}

/// Splits driver errors into "store unreachable" and everything else.
pub fn classify(err: &sqlx::Error) -> FetchError {
    let message = err.to_string();
    let unreachable = matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    ) || looks_like_connection_failure(&message);

    if unreachable {
        FetchError::connectivity(message)
    } else {
        FetchError::generic(message)
    }
}

pub fn looks_like_connection_failure(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    CONNECTION_MARKERS.iter().any(|marker| lower.contains(marker))
}
