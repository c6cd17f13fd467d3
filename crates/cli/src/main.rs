//! # LiDAR Core CLI
//!
//! Command-line entry point.
//!
//! Provides:
//! - TCP command server around the LiDAR controller
//! - Configuration validation
//! - Raw archive inspection

mod cli;
mod commands;
mod error;
mod protocol;
mod server;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_inspect, run_serve, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    observability::init_with_config(&ObservabilityConfig::from_verbosity(
        cli.log_format.into(),
        cli.verbose,
        cli.quiet,
    ))?;

    info!(version = env!("CARGO_PKG_VERSION"), "LiDAR core starting");

    let result = match &cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Inspect(args) => run_inspect(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}
