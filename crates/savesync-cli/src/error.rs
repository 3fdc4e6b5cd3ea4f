use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] savesync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("No save found for {0}")]
    SaveNotFound(String),
    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(i64),
    #[error("Extraction failed: {0}")]
    ExtractFailed(String),
}
