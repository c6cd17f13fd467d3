//! Error types for CLI operations.

use contracts::LidarError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Command server could not bind its listener
    #[error("Failed to bind command server on {addr}: {message}")]
    Bind { addr: String, message: String },

    /// Controller operation failed
    #[error("Controller error: {0}")]
    Controller(#[from] LidarError),

    /// Blocking controller task did not complete
    #[error("Controller task failed: {message}")]
    Task { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn bind(addr: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Bind {
            addr: addr.into(),
            message: message.into(),
        }
    }

    pub fn task(message: impl Into<String>) -> Self {
        Self::Task {
            message: message.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
