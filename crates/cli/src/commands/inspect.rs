//! `inspect` command implementation.

use anyhow::{Context, Result};
use archive::RawLogSummary;
use contracts::RawRecordType;
use serde::Serialize;
use tracing::info;

use crate::cli::InspectArgs;

#[derive(Serialize)]
struct InspectReport {
    path: String,
    records: u64,
    point: u64,
    imu: u64,
    version: u64,
    payload_bytes: u64,
    span_s: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    trailing_error: Option<String>,
}

impl From<&RawLogSummary> for InspectReport {
    fn from(summary: &RawLogSummary) -> Self {
        Self {
            path: summary.path.display().to_string(),
            records: summary.records(),
            point: summary.count_of(RawRecordType::Point),
            imu: summary.count_of(RawRecordType::Imu),
            version: summary.count_of(RawRecordType::Version),
            payload_bytes: summary.payload_bytes,
            span_s: summary.span_s(),
            trailing_error: summary.trailing_error.clone(),
        }
    }
}

/// Execute the `inspect` command
pub fn run_inspect(args: &InspectArgs) -> Result<()> {
    info!(path = %args.path.display(), "Inspecting raw archive");

    let summary = RawLogSummary::scan(&args.path)
        .with_context(|| format!("Failed to read archive {}", args.path.display()))?;

    if args.json {
        let json = serde_json::to_string_pretty(&InspectReport::from(&summary))
            .context("Failed to serialize archive summary")?;
        println!("{}", json);
    } else {
        println!("{}", summary);
    }
    Ok(())
}
