//! Archiver - fans acquisition output out to the enabled archive writers

use contracts::{ArchiveConfig, Point, RawPacket, RawRecordType};
use tracing::{info, instrument, warn};

use crate::handle::ArchiveHandle;
use crate::metrics::ArchiveMetricsSnapshot;
use crate::raw::{RawLogEntry, RawLogger};
use crate::snapshot::{PointSnapshot, SnapshotWriter};

/// Raw and snapshot writers of one controller
///
/// Every method is non-blocking; a disabled archive accepts and discards.
#[derive(Default)]
pub struct Archiver {
    raw: Option<ArchiveHandle<RawLogEntry>>,
    snapshots: Option<ArchiveHandle<PointSnapshot>>,
}

impl Archiver {
    /// Start the writers enabled in `config`
    ///
    /// A writer that cannot start is logged and left out.
    #[instrument(name = "archiver_open", skip(config), fields(base_dir = %config.base_dir.display()))]
    pub fn open(config: &ArchiveConfig) -> Self {
        let raw = if config.raw_enabled {
            let logger = RawLogger::create(&config.base_dir);
            ArchiveHandle::spawn(logger, config.queue_capacity)
                .map_err(|e| warn!(error = %e, "raw archive writer not started"))
                .ok()
        } else {
            None
        };

        let snapshots = if config.snapshots_enabled {
            let writer = SnapshotWriter::new(&config.base_dir);
            ArchiveHandle::spawn(writer, config.queue_capacity)
                .map_err(|e| warn!(error = %e, "snapshot writer not started"))
                .ok()
        } else {
            None
        };

        info!(
            raw = raw.is_some(),
            snapshots = snapshots.is_some(),
            "archiver ready"
        );
        Self { raw, snapshots }
    }

    /// Archive that writes nothing
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Queue one raw packet; its declared size is checked by the writer
    pub fn record_raw(&self, record_type: RawRecordType, mono_ts_ns: u64, packet: RawPacket) -> bool {
        match &self.raw {
            Some(handle) => {
                handle.try_send(RawLogEntry::from_packet(record_type, mono_ts_ns, packet))
            }
            None => false,
        }
    }

    /// Queue a snapshot of the ring buffer
    pub fn record_snapshot(&self, points: Vec<Point>) -> bool {
        match &self.snapshots {
            Some(handle) => handle.try_send(PointSnapshot::now(points)),
            None => false,
        }
    }

    /// Whether snapshots are being written
    pub fn snapshots_enabled(&self) -> bool {
        self.snapshots.is_some()
    }

    /// Counters per writer
    pub fn metrics(&self) -> Vec<(String, ArchiveMetricsSnapshot)> {
        let mut out = Vec::with_capacity(2);
        if let Some(h) = &self.raw {
            out.push((h.name().to_string(), h.metrics().snapshot()));
        }
        if let Some(h) = &self.snapshots {
            out.push((h.name().to_string(), h.metrics().snapshot()));
        }
        out
    }

    /// Drain and stop every writer
    #[instrument(name = "archiver_shutdown", skip(self))]
    pub fn shutdown(&self) {
        if let Some(h) = &self.raw {
            h.shutdown();
        }
        if let Some(h) = &self.snapshots {
            h.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::RawLogSummary;
    use bytes::Bytes;
    use std::fs;
    use tempfile::tempdir;

    fn find_raw_file(base: &std::path::Path) -> std::path::PathBuf {
        let day = fs::read_dir(base)
            .unwrap()
            .filter_map(|e| e.ok())
            .find(|e| e.file_name() != "snapshots")
            .unwrap()
            .path();
        fs::read_dir(day).unwrap().next().unwrap().unwrap().path()
    }

    fn packet(bytes: &'static [u8]) -> RawPacket {
        RawPacket::new(Bytes::from_static(bytes))
    }

    #[test]
    fn test_raw_records_reach_disk() {
        let dir = tempdir().unwrap();
        let config = ArchiveConfig {
            base_dir: dir.path().to_path_buf(),
            snapshots_enabled: false,
            ..Default::default()
        };

        let archiver = Archiver::open(&config);
        assert!(archiver.record_raw(RawRecordType::Point, 1, packet(&[1, 2])));
        assert!(archiver.record_raw(RawRecordType::Imu, 2, packet(&[3])));
        archiver.shutdown();

        let summary = RawLogSummary::scan(&find_raw_file(dir.path())).unwrap();
        assert_eq!(summary.records(), 2);
        assert_eq!(summary.count_of(RawRecordType::Imu), 1);
    }

    #[test]
    fn test_declared_size_reaches_raw_writer() {
        let dir = tempdir().unwrap();
        let config = ArchiveConfig {
            base_dir: dir.path().to_path_buf(),
            snapshots_enabled: false,
            ..Default::default()
        };

        let archiver = Archiver::open(&config);
        let oversized = RawPacket {
            declared_size: 4096,
            bytes: Bytes::from_static(&[1, 2, 3]),
        };
        assert!(archiver.record_raw(RawRecordType::Point, 1, oversized));
        assert!(archiver.record_raw(RawRecordType::Point, 2, packet(&[4, 5, 6])));
        archiver.shutdown();

        let summary = RawLogSummary::scan(&find_raw_file(dir.path())).unwrap();
        assert_eq!(summary.records(), 1);
        assert_eq!(summary.first_ts_ns, Some(2));
    }

    #[test]
    fn test_disabled_archive_discards() {
        let archiver = Archiver::disabled();
        assert!(!archiver.record_raw(RawRecordType::Point, 1, packet(&[1])));
        assert!(!archiver.record_snapshot(vec![Point::default()]));
        assert!(archiver.metrics().is_empty());
        archiver.shutdown();
    }
}
