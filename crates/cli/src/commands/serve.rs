//! `serve` command implementation.

use std::sync::Arc;

use anyhow::{Context, Result};
use archive::Archiver;
use config_loader::ConfigLoader;
use contracts::LidarBlueprint;
use controller::LidarController;
use ingestion::{MockConnector, SyntheticScene};
use tracing::{info, warn};

use crate::cli::ServeArgs;
use crate::error::CliError;
use crate::server::CommandServer;

/// Execute the `serve` command
pub async fn run_serve(args: &ServeArgs) -> Result<()> {
    let blueprint = load_blueprint(args)?;

    info!(
        sensor = %blueprint.link.describe(),
        bind = %blueprint.server.bind,
        archive_dir = %blueprint.archive.base_dir.display(),
        raw = blueprint.archive.raw_enabled,
        snapshots = blueprint.archive.snapshots_enabled,
        ring_capacity = blueprint.controller.ring_capacity,
        "Configuration loaded"
    );

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
        info!("Metrics endpoint available on port {}", args.metrics_port);
    }

    let scene = SyntheticScene {
        range_m: args.synthetic_range,
        ..Default::default()
    };
    let connector = Arc::new(MockConnector::synthetic(scene));
    info!(range_m = args.synthetic_range, "Using synthetic sensor link");

    let archiver = Arc::new(Archiver::open(&blueprint.archive));
    let controller = Arc::new(LidarController::new(
        &blueprint,
        connector,
        Arc::clone(&archiver),
    ));

    let server = CommandServer::bind(&blueprint.server.bind, Arc::clone(&controller)).await?;
    let trigger = server.shutdown_trigger();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Received shutdown signal, stopping command server...");
        trigger.fire();
    });

    server.run().await?;

    let result = tokio::task::spawn_blocking(move || {
        let result = controller.shutdown();
        archiver.shutdown();
        result
    })
    .await
    .map_err(|e| CliError::task(e.to_string()))?;
    if let Err(e) = result {
        warn!(error = %e, "Controller did not shut down cleanly");
    }

    info!("LiDAR core finished");
    Ok(())
}

fn load_blueprint(args: &ServeArgs) -> Result<LidarBlueprint> {
    let mut blueprint = match &args.config {
        Some(path) => {
            if !path.exists() {
                return Err(CliError::config_not_found(path.display().to_string()).into());
            }
            ConfigLoader::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => {
            info!("No configuration file given, using defaults");
            LidarBlueprint::default()
        }
    };

    if let Some(bind) = &args.bind {
        info!(bind = %bind, "Overriding listen address from CLI");
        blueprint.server.bind = bind.clone();
    }
    if let Some(dir) = &args.archive_dir {
        info!(dir = %dir.display(), "Overriding archive directory from CLI");
        blueprint.archive.base_dir = dir.clone();
    }
    if args.no_archive {
        blueprint.archive.raw_enabled = false;
        blueprint.archive.snapshots_enabled = false;
    }

    ConfigLoader::validate(&blueprint).context("Invalid configuration after CLI overrides")?;
    Ok(blueprint)
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn args() -> ServeArgs {
        ServeArgs {
            config: None,
            bind: None,
            archive_dir: None,
            no_archive: false,
            synthetic_range: 1.5,
            metrics_port: 0,
        }
    }

    #[test]
    fn test_defaults_without_config() {
        let bp = load_blueprint(&args()).unwrap();
        assert_eq!(bp.server.bind, "127.0.0.1:9002");
        assert!(bp.archive.raw_enabled);
    }

    #[test]
    fn test_cli_overrides_apply() {
        let mut a = args();
        a.bind = Some("0.0.0.0:7000".to_string());
        a.archive_dir = Some(PathBuf::from("/tmp/lidar"));
        a.no_archive = true;

        let bp = load_blueprint(&a).unwrap();
        assert_eq!(bp.server.bind, "0.0.0.0:7000");
        assert_eq!(bp.archive.base_dir, PathBuf::from("/tmp/lidar"));
        assert!(!bp.archive.raw_enabled);
        assert!(!bp.archive.snapshots_enabled);
    }

    #[test]
    fn test_missing_config_file_rejected() {
        let mut a = args();
        a.config = Some(PathBuf::from("/nonexistent/lidar.toml"));
        assert!(load_blueprint(&a).is_err());
    }

    #[test]
    fn test_config_file_loaded() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[server]\nbind = \"127.0.0.1:9100\"").unwrap();

        let mut a = args();
        a.config = Some(file.path().to_path_buf());
        let bp = load_blueprint(&a).unwrap();
        assert_eq!(bp.server.bind, "127.0.0.1:9100");
    }
}
