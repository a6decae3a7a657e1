//! Crate error type

use crate::store::StoreError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket bind or read failure
    #[error("Transport error: {0}")]
    Transport(std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Network already started")]
    AlreadyRunning,

    #[error("Task failed: {0}")]
    Task(String),
}

impl Error {
    /// Only transport failures end ingestion. Per-message framing, classify
    /// and decode failures never surface here; they are counted and logged
    /// by the processor.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}
