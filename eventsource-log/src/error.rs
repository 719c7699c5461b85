//! Error types for the log collaborators.

use crate::traits::EventId;

/// Error type for allocator, store and broadcaster operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The backing service cannot be reached.
    #[error("{0} unavailable")]
    Unavailable(&'static str),

    /// SQLite failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// An event could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An event with this id is already stored.
    #[error("event {0} already stored")]
    DuplicateId(EventId),

    /// The broadcast channel was shut down.
    #[error("broadcast channel closed")]
    Closed,

    /// The subscriber fell behind and the channel dropped events it had not read.
    #[error("subscriber lagged by {0} events")]
    Lagged(u64),

    /// Filesystem failure, e.g. creating the database directory.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A schema migration failed.
    #[error("migration failed: {0}")]
    Migration(String),

    /// A blocking storage task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Task(String),
}

/// Result type alias for log operations.
pub type Result<T> = std::result::Result<T, Error>;
