/// Why a message fetch failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The store could not be reached at all.
    #[error("Database connection failed: {message}")]
    Connectivity { message: String },

    #[error("Database error: {message}")]
    Generic { message: String },
}

impl FetchError {
    const CONNECTIVITY_CODE: &'static str = "DATABASE_CONNECTION_ERROR";
    const GENERIC_CODE: &'static str = "DATABASE_ERROR";

    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
        }
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Connectivity { .. } => Self::CONNECTIVITY_CODE,
            Self::Generic { .. } => Self::GENERIC_CODE,
        }
    }
}

/// Failures of the outbound webhook call.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Relay request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Relay rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Reasons a send was refused before reaching the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendRejected {
    #[error("Message is empty")]
    Empty,

    #[error("A message is already being sent")]
    InFlight,

    #[error("Cannot send messages while disconnected from the database")]
    Disconnected,
}

impl SendRejected {
    /// Whether the composer should hand the text back for another try.
    pub fn keeps_draft(self) -> bool {
        !matches!(self, Self::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_codes() {
        let err = FetchError::connectivity("ECONNREFUSED");
        assert_eq!(err.code(), "DATABASE_CONNECTION_ERROR");
        assert!(err.is_connectivity());
        assert_eq!(FetchError::generic("x").code(), "DATABASE_ERROR");
    }

    #[test]
    fn refused_sends_keep_the_draft_unless_blank() {
        assert!(!SendRejected::Empty.keeps_draft());
        assert!(SendRejected::InFlight.keeps_draft());
        assert!(SendRejected::Disconnected.keeps_draft());
    }

    #[test]
    fn messages_are_readable() {
        let err = RelayError::Rejected {
            status: 502,
            body: "bad gateway".into(),
        };
        assert_eq!(err.to_string(), "Relay rejected message (502): bad gateway");
        assert_eq!(
            ConfigError::Missing("DATABASE_URL").to_string(),
            "Missing required environment variable DATABASE_URL"
        );
    }
}
