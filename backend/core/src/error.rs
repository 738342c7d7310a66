use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for the vidwatch runtime.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("invalid value for '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("invalid proxy url: {0}")]
    InvalidProxyUrl(String),

    #[error("proxy unavailable: {0}")]
    ProxyUnavailable(String),

    #[error("navigation timed out: {0}")]
    NavigationTimeout(String),

    #[error("driver crashed: {0}")]
    DriverCrashed(String),

    #[error("a session is already running")]
    AlreadyRunning,

    #[error("unknown session: {0}")]
    UnknownSession(Uuid),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WatchError {
    /// Shorthand for a validation error naming the offending field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether the error is fatal to an in-flight session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DriverCrashed(_))
    }
}
