//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::LidarBlueprint;
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    sensor: String,
    bind: String,
    ring_capacity: usize,
    z_band_cm: (f32, f32),
    archive_dir: String,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    sensor: blueprint.link.describe(),
                    bind: blueprint.server.bind.clone(),
                    ring_capacity: blueprint.controller.ring_capacity,
                    z_band_cm: (blueprint.controller.z_min, blueprint.controller.z_max),
                    archive_dir: blueprint.archive.base_dir.display().to_string(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &LidarBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();
    let c = &blueprint.controller;

    if c.flush_window_ms == 0 {
        warnings.push("controller.flush_window_ms is 0 - stale packets reach the buffer".to_string());
    }
    if c.join_timeout_ms < c.pull_timeout_ms {
        warnings.push(format!(
            "controller.join_timeout_ms ({}) is shorter than pull_timeout_ms ({}) - stop may time out",
            c.join_timeout_ms, c.pull_timeout_ms
        ));
    }
    if !blueprint.archive.raw_enabled && !blueprint.archive.snapshots_enabled {
        warnings.push("All archives disabled - nothing will be recorded".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Sensor: {}", summary.sensor);
            println!("  Listen: {}", summary.bind);
            println!("  Ring capacity: {}", summary.ring_capacity);
            println!(
                "  Elevation band: [{}, {}] cm",
                summary.z_band_cm.0, summary.z_band_cm.1
            );
            println!("  Archive: {}", summary.archive_dir);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
