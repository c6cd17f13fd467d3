//! # Observability
//!
//! Tracing + Prometheus metrics for the LiDAR core.
//!
//! ## Features
//!
//! - Tracing initialization (JSON/Pretty/Compact)
//! - Prometheus exporter
//! - Pipeline metric recorders and online statistics
//!
//! ## Example
//!
//! ```ignore
//! observability::init_with_config(&ObservabilityConfig::from_verbosity(LogFormat::Json, 1, false))?;
//!
//! observability::record_packet_received(PacketKind::PointCloud);
//! observability::record_nearest_distance(132.5);
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// Re-exports
pub use crate::metrics::{
    record_archive_dropped, record_archive_write, record_controller_state, record_decode_error,
    record_flush_discarded, record_imu_window, record_nearest_distance, record_packet_received,
    record_points, RunningStats, StatsSummary,
};

/// Log line layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, with thread and source location
    Json,
    #[default]
    Pretty,
    Compact,
}

/// Tracing setup of one process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset
    pub default_log_level: String,
    /// Keep warnings and errors only, ignoring `RUST_LOG`
    pub quiet: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self::from_verbosity(LogFormat::default(), 0, false)
    }
}

impl ObservabilityConfig {
    /// Config for a `-v` count: none is info, one is debug, more is trace
    pub fn from_verbosity(log_format: LogFormat, verbose: u8, quiet: bool) -> Self {
        let level = match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        Self {
            log_format,
            default_log_level: level.to_string(),
            quiet,
        }
    }

    /// Directive the filter starts from when the environment sets none
    pub fn base_directive(&self) -> &str {
        if self.quiet {
            "warn"
        } else {
            &self.default_log_level
        }
    }

    fn filter(&self) -> EnvFilter {
        if self.quiet {
            return EnvFilter::new(self.base_directive());
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.base_directive()))
    }
}

/// Install the global tracing subscriber
///
/// Fails if a subscriber is already installed.
pub fn init_with_config(config: &ObservabilityConfig) -> Result<()> {
    let layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(config.filter())
        .with(layer)
        .try_init()
        .context("tracing subscriber already installed")?;

    tracing::debug!(
        log_format = ?config.log_format,
        level = config.base_directive(),
        "tracing initialized"
    );
    Ok(())
}

/// Initialize only the Prometheus exporter
///
/// For binaries that set up tracing themselves.
pub fn init_metrics_only(port: u16) -> Result<()> {
    let builder = PrometheusBuilder::new();
    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port = port, "Prometheus metrics endpoint initialized");
    Ok(())
}
