use crate::error::ConfigError;
use crate::scroll::DEFAULT_BOTTOM_THRESHOLD;
use crate::types::MessageStatus;
use reqwest::Url;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_FETCH_LIMIT: usize = 100;
pub const DEFAULT_RECIPIENT_ID: &str = "255712345678";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ConfigError::invalid(
                "APP_ENV",
                format!("expected development, test or production, got '{other}'"),
            )),
        }
    }
}

/// Every delay the chat view uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timings {
    pub poll_interval: Duration,
    /// Faster polling while a send waits for its echo.
    pub sending_poll_interval: Duration,
    pub sent_expiry: Duration,
    pub error_expiry: Duration,
    /// How long the "cannot send while disconnected" notice stays up.
    pub disconnected_notice: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            sending_poll_interval: Duration::from_secs(1),
            sent_expiry: Duration::from_secs(10),
            error_expiry: Duration::from_secs(5),
            disconnected_notice: Duration::from_secs(3),
        }
    }
}

impl Timings {
    /// How long a settled optimistic message stays on screen.
    pub fn expiry_for(&self, status: MessageStatus) -> Duration {
        match status {
            MessageStatus::Error => self.error_expiry,
            MessageStatus::Sending | MessageStatus::Sent => self.sent_expiry,
        }
    }
}

/// Settings the chat session itself needs.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSettings {
    pub fetch_limit: usize,
    pub timings: Timings,
    pub scroll_threshold: f64,
    pub show_tool_annotations: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            fetch_limit: DEFAULT_FETCH_LIMIT,
            timings: Timings::default(),
            scroll_threshold: DEFAULT_BOTTOM_THRESHOLD,
            show_tool_annotations: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub environment: Environment,
    pub database_url: String,
    pub callback_url: Url,
    pub recipient_id: String,
    pub session: SessionSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Empty values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let environment = match get("APP_ENV") {
            Some(raw) => raw.parse()?,
            None => Environment::default(),
        };

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let database_url = normalize_database_url(&database_url)?;

        let callback_raw =
            get("CHATBOT_CALLBACK_URL").ok_or(ConfigError::Missing("CHATBOT_CALLBACK_URL"))?;
        let callback_url = Url::parse(callback_raw.trim())
            .map_err(|e| ConfigError::invalid("CHATBOT_CALLBACK_URL", e.to_string()))?;
        if !matches!(callback_url.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                "CHATBOT_CALLBACK_URL",
                format!("unsupported scheme '{}'", callback_url.scheme()),
            ));
        }

        let fetch_limit = match get("MESSAGE_FETCH_LIMIT") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(limit) if limit > 0 => limit,
                _ => {
                    return Err(ConfigError::invalid(
                        "MESSAGE_FETCH_LIMIT",
                        format!("expected a positive integer, got '{raw}'"),
                    ));
                }
            },
            None => DEFAULT_FETCH_LIMIT,
        };

        let recipient_id =
            get("WHATSAPP_RECIPIENT_ID").unwrap_or_else(|| DEFAULT_RECIPIENT_ID.to_string());

        let show_tool_annotations = get("CHAT_SHOW_TOOL_MESSAGES")
            .map(|raw| is_truthy(&raw))
            .unwrap_or(false);

        Ok(Self {
            environment,
            database_url,
            callback_url,
            recipient_id,
            session: SessionSettings {
                fetch_limit,
                show_tool_annotations,
                ..SessionSettings::default()
            },
        })
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Accepts the SQLAlchemy-style `postgresql+asyncpg:` scheme some
/// deployments share with the Python backend.
pub fn normalize_database_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    let cleaned = match trimmed.strip_prefix("postgresql+asyncpg:") {
        Some(rest) => format!("postgres:{rest}"),
        None => trimmed.to_string(),
    };
    let parsed =
        Url::parse(&cleaned).map_err(|e| ConfigError::invalid("DATABASE_URL", e.to_string()))?;
    if !matches!(parsed.scheme(), "postgres" | "postgresql") {
        return Err(ConfigError::invalid(
            "DATABASE_URL",
            format!("unsupported scheme '{}'", parsed.scheme()),
        ));
    }
    Ok(cleaned)
}
