//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate configuration legality
//! - Generate `LidarBlueprint`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("lidar.toml")).unwrap();
//! println!("Sensor: {}", blueprint.link.describe());
//! ```

mod parser;
mod validator;

pub use contracts::LidarBlueprint;
pub use parser::ConfigFormat;

use contracts::LidarError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<LidarBlueprint, LidarError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<LidarBlueprint, LidarError> {
        Self::parse_and_validate(content, format)
    }

    /// Validate an in-memory blueprint (e.g. after CLI overrides)
    pub fn validate(blueprint: &LidarBlueprint) -> Result<(), LidarError> {
        validator::validate(blueprint)
    }

    /// Serialize LidarBlueprint to TOML string
    pub fn to_toml(blueprint: &LidarBlueprint) -> Result<String, LidarError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| LidarError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize LidarBlueprint to JSON string
    pub fn to_json(blueprint: &LidarBlueprint) -> Result<String, LidarError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| LidarError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, LidarError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| LidarError::config_parse("cannot determine file format from extension"))?;

        ConfigFormat::from_extension(ext)
            .ok_or_else(|| LidarError::config_parse(format!("unsupported config format: .{ext}")))
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, LidarError> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Parse and validate configuration content
    fn parse_and_validate(content: &str, format: ConfigFormat) -> Result<LidarBlueprint, LidarError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TOML: &str = r#"
[link]
lidar_ip = "192.168.10.62"
lidar_port = 6101
local_ip = "192.168.10.2"
local_port = 6201

[controller]
flush_window_ms = 2000
join_timeout_ms = 3000
ring_capacity = 65536
z_min = -50.0
z_max = 80.0

[mounting]
yaw_deg = 25.5
pitch_deg = 47.5
mirror_z = true
scale = 100.0
translation = [0.0, 0.0, 90.0]

[archive]
base_dir = "/tmp/lidar"
"#;

    #[test]
    fn test_load_from_str_toml() {
        let result = ConfigLoader::load_from_str(SAMPLE_TOML, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.link.lidar_port, 6101);
        assert_eq!(bp.archive.base_dir, std::path::PathBuf::from("/tmp/lidar"));
    }

    #[test]
    fn test_round_trip_toml() {
        let bp = ConfigLoader::load_from_str(SAMPLE_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.link, bp2.link);
        assert_eq!(bp.exclusion, bp2.exclusion);
        assert_eq!(bp.controller.ring_capacity, bp2.controller.ring_capacity);
    }

    #[test]
    fn test_round_trip_json() {
        let bp = ConfigLoader::load_from_str(SAMPLE_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(bp.link, bp2.link);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
[controller]
z_min = 100.0
z_max = 0.0
"#;
        let result = ConfigLoader::load_from_str(content, ConfigFormat::Toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("z_min"));
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let result = ConfigLoader::load_from_path(Path::new("lidar.yaml"));
        assert!(matches!(result, Err(LidarError::ConfigParse { .. })));
    }
}
