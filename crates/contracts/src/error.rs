//! Layered error definitions
//!
//! Categorized by source: link / state / worker / logging / config

use thiserror::Error;

use crate::{ControllerState, PacketKind};

/// Unified error type
#[derive(Debug, Error)]
pub enum LidarError {
    // ===== Link Errors =====
    /// Transport could not be established (bind / handshake)
    #[error("link init error for '{endpoint}': {message}")]
    LinkInit { endpoint: String, message: String },

    /// Fatal link failure (socket closed, device gone)
    #[error("link io error: {message}")]
    LinkIo { message: String },

    /// Malformed single packet, recoverable
    #[error("packet decode error ({kind:?}): {message}")]
    PacketDecode { kind: PacketKind, message: String },

    // ===== State Errors =====
    /// Operation not legal in the current controller state
    #[error("'{operation}' is not allowed in state {state}")]
    InvalidState {
        operation: &'static str,
        state: ControllerState,
    },

    // ===== Worker Errors =====
    /// Worker did not relinquish the link in time
    #[error("acquisition worker did not exit within {waited_ms}ms")]
    WorkerJoinTimeout { waited_ms: u64 },

    /// Worker thread panicked
    #[error("acquisition worker panicked: {message}")]
    WorkerPanicked { message: String },

    // ===== Logging Errors =====
    /// Archive could not be opened or written
    #[error("logging error at '{path}': {message}")]
    Logging { path: String, message: String },

    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LidarError {
    /// Create link init error
    pub fn link_init(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LinkInit {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create link io error
    pub fn link_io(message: impl Into<String>) -> Self {
        Self::LinkIo {
            message: message.into(),
        }
    }

    /// Create packet decode error
    pub fn packet_decode(kind: PacketKind, message: impl Into<String>) -> Self {
        Self::PacketDecode {
            kind,
            message: message.into(),
        }
    }

    /// Create invalid state error
    pub fn invalid_state(operation: &'static str, state: ControllerState) -> Self {
        Self::InvalidState { operation, state }
    }

    /// Create logging error
    pub fn logging(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Logging {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether the error only affects a single packet
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::PacketDecode { .. })
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, LidarError>;
