//! Error types for traffic-spy-core

use crate::validate::ValidationError;
use thiserror::Error;

/// Main error type for the traffic-spy-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Payload or registration request failed validation
    #[error("invalid payload: {0}")]
    Validation(#[from] ValidationError),

    /// No source registered under this identifier
    #[error("source not found: {0}")]
    SourceNotFound(String),

    /// URL was never observed for the source
    #[error("url not found for source {identifier}: {url}")]
    UrlNotFound { identifier: String, url: String },

    /// Source identifier is already registered
    #[error("source already registered: {0}")]
    Conflict(String),

    /// Durable medium unavailable (lock timeout, busy or read-only database)
    #[error("storage error: {0}")]
    Storage(String),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// How the presentation layer should surface an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller's fault: validation failures and duplicate registrations
    Client,
    /// Unknown source or URL; rendered as an empty state
    NotFound,
    /// Storage and other internal failures
    Server,
}

impl Error {
    /// Classify this error for the caller.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::Conflict(_) => ErrorKind::Client,
            Error::SourceNotFound(_) | Error::UrlNotFound { .. } => ErrorKind::NotFound,
            _ => ErrorKind::Server,
        }
    }

    /// Whether the caller may retry the operation with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Database(_))
    }
}

/// Result type alias for traffic-spy-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = Error::Validation(ValidationError::MissingField("url"));
        assert_eq!(err.kind(), ErrorKind::Client);
        assert!(!err.is_retryable());

        assert_eq!(Error::Conflict("x".into()).kind(), ErrorKind::Client);
        assert_eq!(Error::SourceNotFound("x".into()).kind(), ErrorKind::NotFound);

        let err = Error::Storage("lock timeout".into());
        assert_eq!(err.kind(), ErrorKind::Server);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = Error::UrlNotFound {
            identifier: "jumpstartlab".into(),
            url: "http://jumpstartlab.com/blog".into(),
        };
        assert_eq!(
            err.to_string(),
            "url not found for source jumpstartlab: http://jumpstartlab.com/blog"
        );
    }
}
