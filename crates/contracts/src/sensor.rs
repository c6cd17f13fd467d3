//! Sensor data model
//!
//! Packets and points as delivered by the sensor link, and robot-frame
//! points as stored by the obstacle buffer.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Kind of the packet most recently pulled from the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketKind {
    /// Nothing arrived within the pull timeout
    None,
    /// 3D point packet
    PointCloud,
    /// Inertial packet
    Imu,
    /// Firmware / hardware version packet
    Version,
    /// Recognized frame of an unsupported type
    Unknown,
}

impl PacketKind {
    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::PointCloud => "point_cloud",
            Self::Imu => "imu",
            Self::Version => "version",
            Self::Unknown => "unknown",
        }
    }
}

/// Point in the sensor frame (meters)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub intensity: f32,
    /// Seconds relative to the scan start
    pub time: f32,
    pub ring: u32,
}

/// Point in the robot frame (centimeters)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub intensity: f32,
    pub ring: u32,
    /// Seconds relative to the scan start
    pub time_offset: f32,
}

impl Point {
    /// Squared distance in the xy plane
    #[inline]
    pub fn planar_distance_sq(&self) -> f32 {
        self.x * self.x + self.y * self.y
    }
}

/// One decoded point packet
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointCloudBatch {
    /// Absolute sensor time of the scan (seconds)
    pub scan_timestamp: f64,

    /// Scan sequence number
    pub scan_id: u32,

    /// Number of laser rings in the packet
    pub ring_count: u32,

    /// Sensor-frame points
    pub points: Vec<RawPoint>,
}

/// One decoded inertial packet
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ImuSample {
    /// Sensor time (seconds)
    pub timestamp: f64,

    /// Packet sequence number
    pub seq: u32,

    /// Orientation quaternion (w, x, y, z)
    pub quaternion: [f32; 4],

    /// Angular velocity (rad/s)
    pub angular_velocity: [f32; 3],

    /// Linear acceleration (m/s²)
    pub linear_acceleration: [f32; 3],
}

/// Bytes of one pulled packet with the payload size its header declares
///
/// The declared size comes off the wire and may disagree with `bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub declared_size: u32,
    pub bytes: Bytes,
}

impl RawPacket {
    /// Packet whose header matches its payload length
    pub fn new(bytes: Bytes) -> Self {
        Self {
            declared_size: bytes.len() as u32,
            bytes,
        }
    }
}

/// Record type tag of the raw archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawRecordType {
    Point = 1,
    Imu = 2,
    Version = 3,
}

impl RawRecordType {
    /// Wire tag
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Parse a wire tag
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Point),
            2 => Some(Self::Imu),
            3 => Some(Self::Version),
            _ => None,
        }
    }

    /// Archive record type for a packet kind, if archived at all
    pub fn for_packet(kind: PacketKind) -> Option<Self> {
        match kind {
            PacketKind::PointCloud => Some(Self::Point),
            PacketKind::Imu => Some(Self::Imu),
            PacketKind::Version => Some(Self::Version),
            PacketKind::None | PacketKind::Unknown => None,
        }
    }
}
