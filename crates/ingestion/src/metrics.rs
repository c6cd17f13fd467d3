//! Per-session acquisition counters

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use contracts::PacketKind;

/// Counters of one streaming session, shared with the controller
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    packets_received: AtomicU64,
    point_packets: AtomicU64,
    imu_packets: AtomicU64,
    version_packets: AtomicU64,
    unknown_packets: AtomicU64,
    decode_errors: AtomicU64,
    points_kept: AtomicU64,
    points_excluded: AtomicU64,
    snapshots: AtomicU64,
    distance_updates: AtomicU64,
}

impl IngestionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pulled packet (timeouts are not counted)
    pub fn record_packet(&self, kind: PacketKind) {
        let counter = match kind {
            PacketKind::None => return,
            PacketKind::PointCloud => &self.point_packets,
            PacketKind::Imu => &self.imu_packets,
            PacketKind::Version => &self.version_packets,
            PacketKind::Unknown => &self.unknown_packets,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_points(&self, kept: u64, excluded: u64) {
        self.points_kept.fetch_add(kept, Ordering::Relaxed);
        self.points_excluded.fetch_add(excluded, Ordering::Relaxed);
    }

    pub fn record_snapshot(&self) {
        self.snapshots.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_distance_update(&self) {
        self.distance_updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> SessionStats {
        SessionStats {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            point_packets: self.point_packets.load(Ordering::Relaxed),
            imu_packets: self.imu_packets.load(Ordering::Relaxed),
            version_packets: self.version_packets.load(Ordering::Relaxed),
            unknown_packets: self.unknown_packets.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            points_kept: self.points_kept.load(Ordering::Relaxed),
            points_excluded: self.points_excluded.load(Ordering::Relaxed),
            snapshots: self.snapshots.load(Ordering::Relaxed),
            distance_updates: self.distance_updates.load(Ordering::Relaxed),
        }
    }
}

/// Counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub packets_received: u64,
    pub point_packets: u64,
    pub imu_packets: u64,
    pub version_packets: u64,
    pub unknown_packets: u64,
    pub decode_errors: u64,
    pub points_kept: u64,
    pub points_excluded: u64,
    pub snapshots: u64,
    pub distance_updates: u64,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "packets={} (point={}, imu={}, version={}, unknown={}), decode_errors={}, points kept={} excluded={}, snapshots={}",
            self.packets_received,
            self.point_packets,
            self.imu_packets,
            self.version_packets,
            self.unknown_packets,
            self.decode_errors,
            self.points_kept,
            self.points_excluded,
            self.snapshots,
        )
    }
}
