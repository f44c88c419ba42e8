//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The key is empty or contains characters the store cannot represent.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    /// A stored value could not be read back.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The store refuses writes.
    #[error("storage is read-only")]
    ReadOnly,
}
