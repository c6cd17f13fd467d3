//! Configuration parsing
//!
//! TOML (primary) and JSON (optional) formats.

use contracts::{LidarBlueprint, LidarError};

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML (recommended)
    Toml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Infer format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Parse TOML configuration
pub fn parse_toml(content: &str) -> Result<LidarBlueprint, LidarError> {
    toml::from_str(content).map_err(|e| LidarError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse JSON configuration
pub fn parse_json(content: &str) -> Result<LidarBlueprint, LidarError> {
    serde_json::from_str(content).map_err(|e| LidarError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse configuration in the given format
pub fn parse(content: &str, format: ConfigFormat) -> Result<LidarBlueprint, LidarError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml_partial() {
        let content = r#"
[link]
lidar_ip = "10.0.0.5"

[controller]
flush_window_ms = 500
z_min = -20.0

[exclusion]
x_min = -60.0
"#;
        let result = parse_toml(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.link.lidar_ip, "10.0.0.5");
        assert_eq!(bp.link.lidar_port, 6101);
        assert_eq!(bp.controller.flush_window_ms, 500);
        assert_eq!(bp.controller.z_max, 80.0);
        assert_eq!(bp.exclusion.x_min, -60.0);
        assert_eq!(bp.exclusion.x_max, 15.0);
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "mounting": { "yaw_deg": 0.0, "pitch_deg": 0.0, "mirror_z": false },
            "server": { "bind": "0.0.0.0:9100" }
        }"#;
        let bp = parse_json(content).unwrap();
        assert!(!bp.mounting.mirror_z);
        assert_eq!(bp.mounting.scale, 100.0);
        assert_eq!(bp.server.bind, "0.0.0.0:9100");
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let content = "invalid toml [[[";
        let result = parse_toml(content);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, LidarError::ConfigParse { .. }));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("TOML"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("json"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
