//! Error types for idlemmo-session

use idlemmo_core::PlayerId;
use thiserror::Error;

/// Result type for idlemmo-session operations
pub type Result<T> = std::result::Result<T, Error>;

/// How a caller should treat a session error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any mutation
    Validation,
    /// Rolled back because the inventory was full
    Capacity,
    /// Referenced item or slot does not exist
    NotFound,
    /// Storage, timeouts, or an actor that is gone
    Infrastructure,
}

/// Errors that can occur in idlemmo-session
#[derive(Debug, Error)]
pub enum Error {
    /// Domain rule rejected the command
    #[error(transparent)]
    Core(#[from] idlemmo_core::Error),

    /// Repository failure
    #[error("storage error: {0}")]
    Storage(#[from] idlemmo_db::Error),

    /// The target actor has stopped
    #[error("{0} mailbox closed")]
    MailboxClosed(&'static str),

    /// Snapshot load did not finish in time
    #[error("load timed out for player {0}")]
    LoadTimeout(PlayerId),

    /// Client payload could not be decoded
    #[error("invalid command payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// Session configuration could not be parsed
    #[error("config parse error: {0}")]
    Config(#[from] ron::error::SpannedError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Core(e) => match e.kind() {
                idlemmo_core::ErrorKind::Validation => ErrorKind::Validation,
                idlemmo_core::ErrorKind::Capacity => ErrorKind::Capacity,
                idlemmo_core::ErrorKind::NotFound => ErrorKind::NotFound,
            },
            Error::Decode(_) => ErrorKind::Validation,
            Error::Storage(_)
            | Error::MailboxClosed(_)
            | Error::LoadTimeout(_)
            | Error::Config(_)
            | Error::Io(_) => ErrorKind::Infrastructure,
        }
    }
}
