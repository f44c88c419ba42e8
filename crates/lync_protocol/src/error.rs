//! Error types for protocol values.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while building or interpreting protocol values.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// An event payload failed validation.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// The core answered with `ok = false`.
    #[error("core rejected request: {0}")]
    Rejected(String),

    /// The core answered `ok` without data.
    #[error("core returned empty data")]
    EmptyResponse,

    /// JSON encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl ProtocolError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidEvent(message.into())
    }
}
