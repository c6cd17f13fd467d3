//! Controller lifecycle state and distance readings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Distance reported when no point lies in the elevation band (cm)
pub const NO_OBSTACLE_DISTANCE: f32 = 9999.0;

/// LiDAR controller lifecycle state
///
/// `Disconnected → Connected → Rotating → Streaming`, and back to
/// `Connected` on stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    /// No link handle
    #[default]
    Disconnected,
    /// Link initialized, sensor idle
    Connected,
    /// Rotation commanded, flush window in progress
    Rotating,
    /// Worker running, readings published
    Streaming,
}

impl ControllerState {
    /// Encode for atomic storage
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connected => 1,
            Self::Rotating => 2,
            Self::Streaming => 3,
        }
    }

    /// Decode from atomic storage
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connected,
            2 => Self::Rotating,
            3 => Self::Streaming,
            _ => Self::Disconnected,
        }
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Rotating => "rotating",
            Self::Streaming => "streaming",
        };
        f.write_str(name)
    }
}

/// Result of a nearest-obstacle query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceReading {
    /// Ring buffer not yet filled, no trustworthy estimate
    Unknown,
    /// Nothing inside the elevation band
    NoObstacle,
    /// Planar distance to the nearest point (cm)
    Distance(f32),
}

impl DistanceReading {
    /// Build from a ring buffer query result
    pub fn from_query(value: Option<f32>) -> Self {
        match value {
            None => Self::Unknown,
            Some(d) if d == NO_OBSTACLE_DISTANCE => Self::NoObstacle,
            Some(d) => Self::Distance(d),
        }
    }

    /// Numeric value, `NO_OBSTACLE_DISTANCE` for an empty band
    pub fn value(&self) -> Option<f32> {
        match self {
            Self::Unknown => None,
            Self::NoObstacle => Some(NO_OBSTACLE_DISTANCE),
            Self::Distance(d) => Some(*d),
        }
    }

    /// Whether an estimate is available
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}
