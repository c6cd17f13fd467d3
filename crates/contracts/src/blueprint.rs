//! LidarBlueprint - Config Loader output
//!
//! Describes the full runtime configuration: sensor endpoint, controller
//! timing, mounting calibration, self-body exclusion, IMU summaries,
//! archival and the command server.
//!
//! Every section has defaults, so an empty file is a valid configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct LidarBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Sensor network endpoint
    #[serde(default)]
    #[validate(nested)]
    pub link: LinkEndpoint,

    /// Lifecycle timing and obstacle query settings
    #[serde(default)]
    #[validate(nested)]
    pub controller: ControllerConfig,

    /// Sensor mounting calibration
    #[serde(default)]
    #[validate(nested)]
    pub mounting: MountingConfig,

    /// Robot footprint excluded from obstacle detection
    #[serde(default)]
    pub exclusion: ExclusionBox,

    /// Inertial statistics
    #[serde(default)]
    #[validate(nested)]
    pub imu: ImuConfig,

    /// Raw and point-cloud archives
    #[serde(default)]
    #[validate(nested)]
    pub archive: ArchiveConfig,

    /// Line-oriented command server
    #[serde(default)]
    pub server: ServerConfig,
}

/// UDP endpoint pair of the sensor link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct LinkEndpoint {
    /// Sensor address
    #[serde(default = "default_lidar_ip")]
    #[validate(length(min = 1))]
    pub lidar_ip: String,

    /// Sensor port
    #[serde(default = "default_lidar_port")]
    pub lidar_port: u16,

    /// Local address to bind
    #[serde(default = "default_local_ip")]
    #[validate(length(min = 1))]
    pub local_ip: String,

    /// Local port to bind
    #[serde(default = "default_local_port")]
    pub local_port: u16,
}

impl Default for LinkEndpoint {
    fn default() -> Self {
        Self {
            lidar_ip: default_lidar_ip(),
            lidar_port: default_lidar_port(),
            local_ip: default_local_ip(),
            local_port: default_local_port(),
        }
    }
}

impl LinkEndpoint {
    /// Human-readable `sensor <- local` description
    pub fn describe(&self) -> String {
        format!(
            "{}:{} <- {}:{}",
            self.lidar_ip, self.lidar_port, self.local_ip, self.local_port
        )
    }
}

fn default_lidar_ip() -> String {
    "192.168.10.62".to_string()
}

fn default_lidar_port() -> u16 {
    6101
}

fn default_local_ip() -> String {
    "192.168.10.2".to_string()
}

fn default_local_port() -> u16 {
    6201
}

/// Controller timing and obstacle query band
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ControllerConfig {
    /// Drain-and-discard period after rotation start (ms)
    #[serde(default = "default_flush_window_ms")]
    pub flush_window_ms: u64,

    /// Upper bound on the worker join during stop (ms)
    #[serde(default = "default_join_timeout_ms")]
    #[validate(range(min = 1))]
    pub join_timeout_ms: u64,

    /// Packet pull timeout, bounds stop-flag latency (ms)
    #[serde(default = "default_pull_timeout_ms")]
    #[validate(range(min = 1))]
    pub pull_timeout_ms: u64,

    /// Obstacle ring buffer capacity (points)
    #[serde(default = "default_ring_capacity")]
    #[validate(range(min = 1))]
    pub ring_capacity: usize,

    /// Lower edge of the elevation band (cm, robot frame)
    #[serde(default = "default_z_min")]
    pub z_min: f32,

    /// Upper edge of the elevation band (cm, robot frame)
    #[serde(default = "default_z_max")]
    pub z_max: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            flush_window_ms: default_flush_window_ms(),
            join_timeout_ms: default_join_timeout_ms(),
            pull_timeout_ms: default_pull_timeout_ms(),
            ring_capacity: default_ring_capacity(),
            z_min: default_z_min(),
            z_max: default_z_max(),
        }
    }
}

fn default_flush_window_ms() -> u64 {
    2000
}

fn default_join_timeout_ms() -> u64 {
    3000
}

fn default_pull_timeout_ms() -> u64 {
    100
}

fn default_ring_capacity() -> usize {
    65536
}

fn default_z_min() -> f32 {
    -50.0
}

fn default_z_max() -> f32 {
    80.0
}

/// Rigid mounting transform: `T · S · M · Ry(pitch) · Rz(yaw)`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MountingConfig {
    /// Rotation about the sensor z axis (degrees)
    #[serde(default = "default_yaw_deg")]
    pub yaw_deg: f32,

    /// Rotation about the y axis (degrees)
    #[serde(default = "default_pitch_deg")]
    pub pitch_deg: f32,

    /// Flip the z axis (sensor mounted upside down)
    #[serde(default = "default_mirror_z")]
    pub mirror_z: bool,

    /// Uniform scale, 100 converts meters to centimeters
    #[serde(default = "default_scale")]
    #[validate(range(exclusive_min = 0.0))]
    pub scale: f32,

    /// Translation applied last (cm)
    #[serde(default = "default_translation")]
    pub translation: [f32; 3],
}

impl Default for MountingConfig {
    fn default() -> Self {
        Self {
            yaw_deg: default_yaw_deg(),
            pitch_deg: default_pitch_deg(),
            mirror_z: default_mirror_z(),
            scale: default_scale(),
            translation: default_translation(),
        }
    }
}

impl MountingConfig {
    /// Transform that leaves points untouched
    pub fn identity() -> Self {
        Self {
            yaw_deg: 0.0,
            pitch_deg: 0.0,
            mirror_z: false,
            scale: 1.0,
            translation: [0.0; 3],
        }
    }
}

fn default_yaw_deg() -> f32 {
    25.5
}

fn default_pitch_deg() -> f32 {
    47.5
}

fn default_mirror_z() -> bool {
    true
}

fn default_scale() -> f32 {
    100.0
}

fn default_translation() -> [f32; 3] {
    [0.0, 0.0, 90.0]
}

/// Axis-aligned chassis footprint in the robot frame (cm, open interval)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExclusionBox {
    #[serde(default = "default_box_x_min")]
    pub x_min: f32,
    #[serde(default = "default_box_x_max")]
    pub x_max: f32,
    #[serde(default = "default_box_y_min")]
    pub y_min: f32,
    #[serde(default = "default_box_y_max")]
    pub y_max: f32,
}

impl Default for ExclusionBox {
    fn default() -> Self {
        Self {
            x_min: default_box_x_min(),
            x_max: default_box_x_max(),
            y_min: default_box_y_min(),
            y_max: default_box_y_max(),
        }
    }
}

impl ExclusionBox {
    /// Whether `(x, y)` lies strictly inside the footprint
    #[inline]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x > self.x_min && x < self.x_max && y > self.y_min && y < self.y_max
    }
}

fn default_box_x_min() -> f32 {
    -50.0
}

fn default_box_x_max() -> f32 {
    15.0
}

fn default_box_y_min() -> f32 {
    -20.0
}

fn default_box_y_max() -> f32 {
    20.0
}

/// Inertial statistics settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ImuConfig {
    /// Summary cadence in sensor time (seconds)
    #[serde(default = "default_summary_interval_s")]
    #[validate(range(exclusive_min = 0.0))]
    pub summary_interval_s: f64,

    /// Reference gravity for the consistency residual (m/s²)
    #[serde(default = "default_gravity")]
    #[validate(range(exclusive_min = 0.0))]
    pub gravity: f64,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            summary_interval_s: default_summary_interval_s(),
            gravity: default_gravity(),
        }
    }
}

fn default_summary_interval_s() -> f64 {
    10.0
}

fn default_gravity() -> f64 {
    9.80665
}

/// Archive settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ArchiveConfig {
    /// Root directory of all archives
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Write the raw packet archive
    #[serde(default = "default_true")]
    pub raw_enabled: bool,

    /// Write point-cloud snapshots on ring buffer wraparound
    #[serde(default = "default_true")]
    pub snapshots_enabled: bool,

    /// Bounded queue depth per archive writer
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1))]
    pub queue_capacity: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            raw_enabled: true,
            snapshots_enabled: true,
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("/data/robot/lidar")
}

fn default_true() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    256
}

/// Command server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:9002".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let bp: LidarBlueprint = serde_json::from_str("{}").unwrap();
        assert_eq!(bp.controller.ring_capacity, 65536);
        assert_eq!(bp.controller.flush_window_ms, 2000);
        assert_eq!(bp.server.bind, "127.0.0.1:9002");
        assert!(bp.mounting.mirror_z);
        assert!(bp.validate().is_ok());
    }

    #[test]
    fn test_exclusion_box_is_open() {
        let b = ExclusionBox::default();
        assert!(b.contains(-30.0, 0.0));
        assert!(!b.contains(15.0, 0.0));
        assert!(!b.contains(0.0, 20.0));
        assert!(!b.contains(100.0, 0.0));
    }

    #[test]
    fn test_derived_validation_rejects_zero_capacity() {
        let mut bp = LidarBlueprint::default();
        bp.controller.ring_capacity = 0;
        assert!(bp.validate().is_err());
    }
}
