//! # Archive
//!
//! Asynchronous persistence of acquisition output.
//!
//! - Raw packet archive (`L2RAW01` format) and its offline reader
//! - ASCII PLY snapshots of the obstacle buffer
//! - Each writer runs on its own thread behind a bounded, drop-on-full
//!   queue so disk stalls never reach the acquisition worker

pub mod error;
pub mod handle;
pub mod metrics;
pub mod raw;
pub mod reader;
pub mod recorder;
pub mod sink;
pub mod snapshot;

pub use error::ArchiveError;
pub use handle::ArchiveHandle;
pub use metrics::{ArchiveMetrics, ArchiveMetricsSnapshot};
pub use raw::{encode_record, raw_log_path, RawLogEntry, RawLogger, RAW_MAGIC, RECORD_HEADER_LEN};
pub use reader::{RawLogReader, RawLogSummary, RawRecord};
pub use recorder::Archiver;
pub use sink::ArchiveSink;
pub use snapshot::{write_ply, PointSnapshot, SnapshotWriter};
