//! Error types for the state store.

use thiserror::Error;

/// Main error type for row and state store operations.
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid version {requested} (latest committed is {latest})")]
    InvalidVersion { requested: u64, latest: u64 },

    #[error("Corrupt store data: {0}")]
    CorruptData(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Concurrent commit detected for version {version}")]
    ConcurrentCommit { version: u64 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Store directory is locked by another process")]
    Locked,
}

/// Result type for state store operations.
pub type Result<T> = std::result::Result<T, StateStoreError>;
