//! Unified error types for session expiry.
//!
//! Error codes:
//! - TIME_001: Unparseable activity time
//! - VALID_001: Invalid or missing event field
//! - PUB_001: Expiry publication failed
//! - CONN_001: Broker connection failed

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for session expiry.
#[derive(Debug, Error)]
pub enum Error {
    /// Activity time could not be normalized to a UTC timestamp.
    #[error("[TIME_001] invalid activity time {value:?}: {reason}")]
    InvalidActivityTime { value: String, reason: String },

    #[error("[VALID_001] validation error: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Handing a batch to the producer failed.
    #[error("[PUB_001] publish failed: {0}")]
    Publish(String),

    #[error("[CONN_001] connection error: {0}")]
    Connection(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn invalid_activity_time(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidActivityTime {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn publish(msg: impl Into<String>) -> Self {
        Self::Publish(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::InvalidActivityTime { .. } => Some("TIME_001"),
            Self::Validation(_) => Some("VALID_001"),
            Self::Publish(_) => Some("PUB_001"),
            Self::Connection(_) => Some("CONN_001"),
            Self::Serialization(_) | Self::Internal(_) => None,
        }
    }

    /// Whether the failure is local to one event rather than the whole cycle.
    pub fn is_per_event(&self) -> bool {
        matches!(self, Self::InvalidActivityTime { .. } | Self::Validation(_))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}
