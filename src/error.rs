//! Error types for pacebot

use thiserror::Error;

/// Result type alias for pacebot operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pacebot
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Messaging platform API error
    #[error("platform error: {0}")]
    Platform(String),

    /// Message content could not be fetched from the platform
    #[error("content fetch error: {0}")]
    Content(String),

    /// AI backend returned a non-success status
    #[error("ai backend error ({status}): {message}")]
    AiStatus {
        /// HTTP status code from the backend
        status: u16,
        /// Truncated response body
        message: String,
    },

    /// AI backend transport or response-shape error
    #[error("ai backend error: {0}")]
    Ai(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error is a rate-limit response from the AI backend.
    ///
    /// Rate-limit failures get a distinct user-visible apology and stop
    /// processing for the event; other AI failures fall back to a
    /// generic reply text.
    #[must_use]
    pub const fn is_rate_limit(&self) -> bool {
        matches!(self, Self::AiStatus { status: 429, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_detection() {
        let err = Error::AiStatus {
            status: 429,
            message: "too many requests".into(),
        };
        assert!(err.is_rate_limit());

        let err = Error::AiStatus {
            status: 500,
            message: "boom".into(),
        };
        assert!(!err.is_rate_limit());

        assert!(!Error::Ai("timeout".into()).is_rate_limit());
    }
}
