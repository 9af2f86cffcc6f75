//! Error types for repository operations.

use thiserror::Error;

/// Errors that can occur while saving or loading snapshots.
#[derive(Debug, Error)]
pub enum Error {
    /// Native DB error.
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The storage backend could not run the request.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Unavailable(err.to_string())
    }
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, Error>;
