use thiserror::Error;

/// Errors that may occur while interacting with the index storage.
///
/// This enum is used across all implementations of the storage traits.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Error reported by the database engine.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to obtain a connection from the read pool.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Failed to encode or decode a stored column.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The expected entry was not found in the database.
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// A write conflicted with an existing entry.
    #[error("conflict error: {0}")]
    Conflict(String),
}
