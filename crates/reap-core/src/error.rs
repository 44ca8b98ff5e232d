//! Error types for reap-core

use thiserror::Error;

/// Result type alias using reap-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in reap-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Folder or record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The maintenance pass was cancelled between chunks
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Whether this error came from the underlying store rather than the caller
    pub const fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Sqlite(_) | Self::Io(_) | Self::Serialization(_)
        )
    }
}
