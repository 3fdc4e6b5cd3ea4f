//! Error types for savesync-core

use thiserror::Error;

/// Result type alias using savesync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in savesync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// No local or remote save exists for the requested context
    #[error("Save not found: {0}")]
    NotFound(String),

    /// Identity could not be parsed or no usable directory exists
    #[error("Path resolution failed: {0}")]
    PathResolution(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A sync for the same game and type is already queued or running
    #[error("Sync already in progress: {0}")]
    DuplicateInProgress(String),

    /// Queue entry failed past its retry budget
    #[error("Retries exhausted: {0}")]
    RetryExhausted(String),

    /// Local and remote histories diverged
    #[error("Sync conflict: {0}")]
    Conflict(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Zip archive error
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Remote save service error
    #[error("Remote error: {0}")]
    Remote(String),
}

impl From<walkdir::Error> for Error {
    fn from(error: walkdir::Error) -> Self {
        Self::Io(error.into())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::Io(std::io::Error::other(error))
    }
}
