//! Error types for resto-link.

use thiserror::Error;

/// Errors that can occur in resto-link operations.
#[derive(Error, Debug)]
pub enum RestoLinkError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("Server error ({status_code}): {message}")]
    ServerError { status_code: u16, message: String },

    #[error("Session error: {0}")]
    SessionError(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Result type for resto-link operations.
pub type Result<T> = std::result::Result<T, RestoLinkError>;

impl RestoLinkError {
    /// Whether a retry could plausibly succeed for this error.
    ///
    /// Transport-level failures (connect errors, timeouts) are retriable;
    /// authentication, configuration, and 4xx server errors are not.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::TimeoutError(_) | Self::WebSocketError(_) => true,
            Self::HttpError(e) => e.is_timeout() || e.is_connect(),
            Self::ServerError { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_classification() {
        assert!(RestoLinkError::TimeoutError("t".into()).is_retriable());
        assert!(RestoLinkError::ServerError { status_code: 503, message: "busy".into() }.is_retriable());
        assert!(!RestoLinkError::ServerError { status_code: 404, message: "nope".into() }.is_retriable());
        assert!(!RestoLinkError::AuthenticationError("bad token".into()).is_retriable());
        assert!(!RestoLinkError::ConfigurationError("missing url".into()).is_retriable());
    }
}
