//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// LiDAR core - sensor acquisition and obstacle distance server
#[derive(Parser, Debug)]
#[command(
    name = "lidar-core",
    author,
    version,
    about = "LiDAR acquisition and obstacle-distance server",
    long_about = "Owns the LiDAR link, streams point clouds into a rolling obstacle buffer \n\
                  and serves the nearest obstacle distance over a line-oriented TCP \n\
                  command interface."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "LIDAR_CORE_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "LIDAR_CORE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the TCP command server
    Serve(ServeArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Summarize a raw packet archive
    Inspect(InspectArgs),
}

/// Arguments for the `serve` command
#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    /// Path to configuration file (TOML or JSON); built-in defaults if absent
    #[arg(short, long, env = "LIDAR_CORE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the command server listen address
    #[arg(long, env = "LIDAR_CORE_BIND")]
    pub bind: Option<String>,

    /// Override the archive root directory
    #[arg(long, env = "LIDAR_CORE_ARCHIVE_DIR")]
    pub archive_dir: Option<PathBuf>,

    /// Disable raw and snapshot archives
    #[arg(long)]
    pub no_archive: bool,

    /// Wall range of the synthetic sensor scene (m)
    #[arg(long, default_value = "1.5", env = "LIDAR_CORE_SYNTHETIC_RANGE")]
    pub synthetic_range: f32,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "LIDAR_CORE_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "lidar.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `inspect` command
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Raw archive file (`raw-*.dat`)
    pub path: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
