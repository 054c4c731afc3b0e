//! Error types for the cache layer.

use thiserror::Error;

/// Result type for cache operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in cache operations.
///
/// Every variant reaches the caller. A failed append means the attendance
/// event was not recorded.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An entry with this id is already in the log.
    #[error("duplicate log entry: {0}")]
    DuplicateEntry(String),

    /// A stored row could not be decoded.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The connection mutex was poisoned by a panicking thread.
    #[error("cache lock poisoned")]
    LockPoisoned,

    /// The writer thread is gone.
    #[error("cache writer stopped")]
    WriterClosed,

    /// A blocking read task failed to complete.
    #[error("cache task failed: {0}")]
    Task(String),
}
