//! Ingestion error types

use contracts::LidarError;
use thiserror::Error;

/// Errors of the acquisition worker lifecycle
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Worker thread could not be spawned
    #[error("failed to spawn acquisition worker: {message}")]
    SpawnFailed { message: String },

    /// Worker did not exit within the join timeout
    #[error("acquisition worker still running after {waited_ms}ms")]
    JoinTimeout { waited_ms: u64 },

    /// Worker thread panicked
    #[error("acquisition worker panicked: {message}")]
    Panicked { message: String },

    /// Worker was already joined
    #[error("acquisition worker already joined")]
    AlreadyJoined,
}

impl From<IngestionError> for LidarError {
    fn from(err: IngestionError) -> Self {
        match err {
            IngestionError::JoinTimeout { waited_ms } => LidarError::WorkerJoinTimeout { waited_ms },
            IngestionError::Panicked { message } => LidarError::WorkerPanicked { message },
            other => LidarError::link_io(other.to_string()),
        }
    }
}

/// Ingestion Result type alias
pub type Result<T> = std::result::Result<T, IngestionError>;
