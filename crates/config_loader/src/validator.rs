//! Configuration validation
//!
//! Rules:
//! - per-field ranges declared on the blueprint (`validator` derive)
//! - z_min <= z_max
//! - exclusion box x_min < x_max, y_min < y_max
//! - endpoint addresses are IP literals
//! - server bind address is a socket address
//! - calibration values are finite

use std::net::{IpAddr, SocketAddr};

use contracts::{LidarBlueprint, LidarError};
use validator::Validate;

/// Validate a LidarBlueprint
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(blueprint: &LidarBlueprint) -> Result<(), LidarError> {
    validate_fields(blueprint)?;
    validate_elevation_band(blueprint)?;
    validate_exclusion_box(blueprint)?;
    validate_mounting(blueprint)?;
    validate_endpoint(blueprint)?;
    validate_server(blueprint)?;
    Ok(())
}

/// Derived per-field rules
fn validate_fields(blueprint: &LidarBlueprint) -> Result<(), LidarError> {
    blueprint
        .validate()
        .map_err(|e| LidarError::config_validation("blueprint", e.to_string()))
}

fn validate_elevation_band(blueprint: &LidarBlueprint) -> Result<(), LidarError> {
    let c = &blueprint.controller;
    if !(c.z_min.is_finite() && c.z_max.is_finite()) || c.z_min > c.z_max {
        return Err(LidarError::config_validation(
            "controller.z_min / controller.z_max",
            format!(
                "z_min ({}) must be <= z_max ({}) and both finite",
                c.z_min, c.z_max
            ),
        ));
    }
    Ok(())
}

fn validate_exclusion_box(blueprint: &LidarBlueprint) -> Result<(), LidarError> {
    let b = &blueprint.exclusion;
    if b.x_min >= b.x_max {
        return Err(LidarError::config_validation(
            "exclusion.x_min / exclusion.x_max",
            format!("x_min ({}) must be < x_max ({})", b.x_min, b.x_max),
        ));
    }
    if b.y_min >= b.y_max {
        return Err(LidarError::config_validation(
            "exclusion.y_min / exclusion.y_max",
            format!("y_min ({}) must be < y_max ({})", b.y_min, b.y_max),
        ));
    }
    Ok(())
}

fn validate_mounting(blueprint: &LidarBlueprint) -> Result<(), LidarError> {
    let m = &blueprint.mounting;
    let finite = m.yaw_deg.is_finite()
        && m.pitch_deg.is_finite()
        && m.scale.is_finite()
        && m.translation.iter().all(|v| v.is_finite());
    if !finite {
        return Err(LidarError::config_validation(
            "mounting",
            "calibration values must be finite",
        ));
    }
    Ok(())
}

fn validate_endpoint(blueprint: &LidarBlueprint) -> Result<(), LidarError> {
    let link = &blueprint.link;
    for (field, value) in [("link.lidar_ip", &link.lidar_ip), ("link.local_ip", &link.local_ip)] {
        if value.parse::<IpAddr>().is_err() {
            return Err(LidarError::config_validation(
                field,
                format!("'{value}' is not an IP address"),
            ));
        }
    }
    Ok(())
}

fn validate_server(blueprint: &LidarBlueprint) -> Result<(), LidarError> {
    let bind = &blueprint.server.bind;
    if bind.parse::<SocketAddr>().is_err() {
        return Err(LidarError::config_validation(
            "server.bind",
            format!("'{bind}' is not a socket address"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&LidarBlueprint::default()).is_ok());
    }

    #[test]
    fn test_inverted_band_rejected() {
        let mut bp = LidarBlueprint::default();
        bp.controller.z_min = 10.0;
        bp.controller.z_max = -10.0;
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("z_min"));
    }

    #[test]
    fn test_degenerate_box_rejected() {
        let mut bp = LidarBlueprint::default();
        bp.exclusion.y_min = 20.0;
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("exclusion.y_min"));
    }

    #[test]
    fn test_bad_ip_rejected() {
        let mut bp = LidarBlueprint::default();
        bp.link.local_ip = "not-an-ip".to_string();
        let err = validate(&bp).unwrap_err();
        assert!(matches!(err, LidarError::ConfigValidation { .. }));
    }

    #[test]
    fn test_negative_scale_rejected() {
        let mut bp = LidarBlueprint::default();
        bp.mounting.scale = -1.0;
        assert!(validate(&bp).is_err());
    }
}
