//! Error types for the sync engine.

use lync_protocol::ProtocolError;
use lync_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// No reply arrived within the request timeout.
    #[error("request timed out: {command}")]
    Timeout {
        /// Command that timed out.
        command: String,
    },

    /// The core explicitly rejected the request.
    #[error("core rejected request: {0}")]
    Rejected(String),

    /// The core answered without data.
    #[error("core returned empty data")]
    EmptyResponse,

    /// Encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// An event payload failed validation.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// The persisted store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Not connected.
    #[error("not connected to core")]
    NotConnected,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    ///
    /// Rejections count as retryable: the next sync cycle submits the event
    /// again until its retries run out.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout { .. }
            | SyncError::Rejected(_)
            | SyncError::EmptyResponse
            | SyncError::NotConnected => true,
            _ => false,
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidEvent(msg) => SyncError::InvalidEvent(msg),
            ProtocolError::Rejected(msg) => SyncError::Rejected(msg),
            ProtocolError::EmptyResponse => SyncError::EmptyResponse,
            ProtocolError::Codec(e) => SyncError::Codec(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Codec(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("bad origin").is_retryable());
        assert!(SyncError::Timeout {
            command: "syncEvent".into()
        }
        .is_retryable());
        assert!(SyncError::Rejected("Sync rejected".into()).is_retryable());
        assert!(!SyncError::InvalidEvent("amount".into()).is_retryable());
        assert!(!SyncError::Codec("eof".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::NotConnected;
        assert_eq!(err.to_string(), "not connected to core");

        let err = SyncError::Timeout {
            command: "getRoutes".into(),
        };
        assert!(err.to_string().contains("getRoutes"));
    }

    #[test]
    fn protocol_errors_convert() {
        let err: SyncError = ProtocolError::Rejected("Invalid SACCO Code".into()).into();
        assert!(matches!(err, SyncError::Rejected(ref m) if m == "Invalid SACCO Code"));

        let err: SyncError = ProtocolError::EmptyResponse.into();
        assert!(matches!(err, SyncError::EmptyResponse));
    }
}
