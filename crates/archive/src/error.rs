//! Archive error types

use contracts::LidarError;
use thiserror::Error;

/// Archive-specific errors
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Archive file or directory could not be created
    #[error("failed to open archive '{path}': {message}")]
    Open { path: String, message: String },

    /// Record could not be written
    #[error("write failed for sink '{sink}': {message}")]
    Write { sink: String, message: String },

    /// Archive content does not follow the on-disk format
    #[error("malformed archive: {message}")]
    Format { message: String },

    /// Writer thread could not be started
    #[error("failed to spawn writer for sink '{sink}': {message}")]
    Spawn { sink: String, message: String },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    /// Create an open error
    pub fn open(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Open {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a write error
    pub fn write(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Write {
            sink: sink.into(),
            message: message.into(),
        }
    }

    /// Create a format error
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }
}

impl From<ArchiveError> for LidarError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Open { path, message } => LidarError::logging(path, message),
            ArchiveError::Io(e) => LidarError::Io(e),
            other => LidarError::logging("archive", other.to_string()),
        }
    }
}
