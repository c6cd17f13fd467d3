//! # Integration Tests
//!
//! Cross-crate scenarios, no hardware required.
//!
//! Covers:
//! - Configuration round trip through the loader
//! - Controller + worker + archive end to end on a scripted link
//! - Self-body exclusion over the canonical mounting
//! - Synthetic scene streaming

#[cfg(test)]
mod config_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::LidarBlueprint;

    #[test]
    fn test_default_blueprint_round_trips_through_toml() {
        let toml = ConfigLoader::to_toml(&LidarBlueprint::default()).unwrap();
        let bp = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.controller.ring_capacity, 65536);
        assert_eq!(bp.server.bind, "127.0.0.1:9002");
        assert_eq!(bp.mounting.scale, 100.0);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use archive::{Archiver, RawLogSummary};
    use contracts::{
        ControllerState, DistanceReading, LidarBlueprint, MountingConfig, PointCloudBatch,
        RawPoint, RawRecordType,
    };
    use controller::LidarController;
    use ingestion::{MockConnector, MockScript, SyntheticScene};
    use tempfile::tempdir;

    fn scripted_blueprint(base: &Path) -> LidarBlueprint {
        let mut bp = LidarBlueprint::default();
        bp.mounting = MountingConfig::identity();
        bp.controller.flush_window_ms = 0;
        bp.controller.pull_timeout_ms = 5;
        bp.controller.ring_capacity = 3;
        bp.archive.base_dir = base.to_path_buf();
        bp
    }

    fn batch(points: &[(f32, f32, f32)]) -> PointCloudBatch {
        PointCloudBatch {
            points: points
                .iter()
                .map(|&(x, y, z)| RawPoint {
                    x,
                    y,
                    z,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    fn files_with_extension(dir: &Path, ext: &str) -> Vec<PathBuf> {
        let mut found = Vec::new();
        let Ok(entries) = std::fs::read_dir(dir) else {
            return found;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                found.extend(files_with_extension(&path, ext));
            } else if path.extension().is_some_and(|e| e == ext) {
                found.push(path);
            }
        }
        found
    }

    /// Three single-point batches at 200, 100 and 300 cm fill a 3-slot
    /// buffer; the nearest obstacle is 100 cm and every packet is archived.
    #[test]
    fn test_e2e_three_batches_nearest_and_archive() {
        let dir = tempdir().unwrap();
        let bp = scripted_blueprint(dir.path());
        let script = MockScript::new();
        let archiver = Arc::new(Archiver::open(&bp.archive));
        let controller = LidarController::new(
            &bp,
            Arc::new(MockConnector::new(script.clone())),
            Arc::clone(&archiver),
        );

        controller.start().unwrap();
        assert_eq!(controller.state(), ControllerState::Streaming);

        script.push_point_cloud(batch(&[(200.0, 0.0, 0.0)]));
        script.push_point_cloud(batch(&[(100.0, 0.0, 0.0)]));
        script.push_point_cloud(batch(&[(300.0, 0.0, 0.0)]));

        assert!(wait_until(Duration::from_secs(2), || controller
            .query_distance()
            .seq
            >= 3));
        assert_eq!(controller.distance(), DistanceReading::Distance(100.0));

        controller.stop().unwrap();
        assert_eq!(controller.state(), ControllerState::Connected);
        archiver.shutdown();

        let raw = files_with_extension(dir.path(), "dat");
        assert_eq!(raw.len(), 1);
        let summary = RawLogSummary::scan(&raw[0]).unwrap();
        assert_eq!(summary.count_of(RawRecordType::Point), 3);
        assert!(summary.trailing_error.is_none());

        // buffer wrapped once on the third point
        let snapshots = files_with_extension(&dir.path().join("snapshots"), "ply");
        assert_eq!(snapshots.len(), 1);
    }

    /// Each batch carries an obstacle at 100 cm and a return off the robot's
    /// own body; only the obstacle fills the buffer.
    #[test]
    fn test_e2e_self_body_returns_never_reported() {
        let dir = tempdir().unwrap();
        let bp = scripted_blueprint(dir.path());
        let script = MockScript::new();
        let controller = LidarController::new(
            &bp,
            Arc::new(MockConnector::new(script.clone())),
            Arc::new(Archiver::disabled()),
        );

        controller.start().unwrap();
        for _ in 0..3 {
            script.push_point_cloud(batch(&[(100.0, 0.0, 0.0), (-30.0, 0.0, 0.0)]));
        }

        assert!(wait_until(Duration::from_secs(2), || controller
            .query_distance()
            .seq
            >= 3));
        assert_eq!(controller.distance(), DistanceReading::Distance(100.0));

        controller.stop().unwrap();
        let stats = controller.session_stats().unwrap();
        assert_eq!(stats.points_kept, 3);
        assert_eq!(stats.points_excluded, 3);
    }

    #[test]
    fn test_unknown_until_buffer_full() {
        let dir = tempdir().unwrap();
        let mut bp = scripted_blueprint(dir.path());
        bp.controller.ring_capacity = 4;
        let script = MockScript::new();
        let controller = LidarController::new(
            &bp,
            Arc::new(MockConnector::new(script.clone())),
            Arc::new(Archiver::disabled()),
        );

        controller.start().unwrap();
        script.push_point_cloud(batch(&[(200.0, 0.0, 0.0), (150.0, 0.0, 0.0)]));
        script.push_point_cloud(batch(&[(180.0, 0.0, 0.0)]));
        assert!(wait_until(Duration::from_secs(2), || controller
            .query_distance()
            .seq
            >= 2));
        assert_eq!(controller.distance(), DistanceReading::Unknown);

        script.push_point_cloud(batch(&[(400.0, 0.0, 0.0)]));
        assert!(wait_until(Duration::from_secs(2), || controller
            .query_distance()
            .seq
            >= 3));
        assert_eq!(controller.distance(), DistanceReading::Distance(150.0));
        controller.stop().unwrap();
    }

    #[test]
    fn test_synthetic_scene_produces_estimate() {
        let dir = tempdir().unwrap();
        let mut bp = LidarBlueprint::default();
        bp.controller.flush_window_ms = 20;
        bp.controller.ring_capacity = 2000;
        bp.archive.base_dir = dir.path().to_path_buf();
        bp.archive.snapshots_enabled = false;

        let scene = SyntheticScene {
            period: Duration::from_millis(1),
            ..Default::default()
        };
        let archiver = Arc::new(Archiver::open(&bp.archive));
        let controller = LidarController::new(
            &bp,
            Arc::new(MockConnector::synthetic(scene)),
            Arc::clone(&archiver),
        );

        controller.start().unwrap();
        assert!(wait_until(Duration::from_secs(5), || controller
            .distance()
            .is_known()));
        let stats = controller.session_stats().unwrap();
        assert!(stats.point_packets > 0);

        controller.shutdown().unwrap();
        archiver.shutdown();
        assert_eq!(controller.state(), ControllerState::Disconnected);
        assert_eq!(controller.distance(), DistanceReading::Unknown);
    }
}

/// What the raw logger writes, the offline reader gives back.
#[cfg(test)]
mod raw_archive_tests {
    use archive::{RawLogEntry, RawLogReader, RawLogger};
    use bytes::Bytes;
    use contracts::RawRecordType;
    use tempfile::tempdir;

    #[test]
    fn test_logged_record_reads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.dat");
        let payload = Bytes::from_static(b"\x01\x02lidar\xff");

        {
            let mut logger = RawLogger::open_at(path.clone());
            let entry = RawLogEntry::new(RawRecordType::Point, 123_456_789, payload.clone());
            assert!(logger.append(&entry).unwrap());
        }

        let records: Vec<_> = RawLogReader::open(&path)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record_type(), Some(RawRecordType::Point));
        assert_eq!(records[0].mono_ts_ns, 123_456_789);
        assert_eq!(records[0].payload, payload);
    }
}

/// Status reads stay responsive while a start sits in its flush window.
#[cfg(test)]
mod concurrency_tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use archive::Archiver;
    use contracts::{ControllerState, DistanceReading, LidarBlueprint, MountingConfig};
    use controller::LidarController;
    use ingestion::{MockConnector, MockScript};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_queries_do_not_wait_for_flush_window() {
        let mut bp = LidarBlueprint::default();
        bp.mounting = MountingConfig::identity();
        bp.controller.flush_window_ms = 300;
        bp.controller.pull_timeout_ms = 5;

        let controller = Arc::new(LidarController::new(
            &bp,
            Arc::new(MockConnector::new(MockScript::new())),
            Arc::new(Archiver::disabled()),
        ));

        let starter = Arc::clone(&controller);
        let start = tokio::task::spawn_blocking(move || starter.start());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let began = Instant::now();
        for _ in 0..100 {
            assert_eq!(controller.distance(), DistanceReading::Unknown);
            let _ = controller.state();
        }
        assert!(began.elapsed() < Duration::from_millis(100));
        assert_eq!(controller.state(), ControllerState::Rotating);

        start.await.unwrap().unwrap();
        assert_eq!(controller.state(), ControllerState::Streaming);

        let stopper = Arc::clone(&controller);
        tokio::task::spawn_blocking(move || stopper.stop())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(controller.state(), ControllerState::Connected);
    }
}

#[cfg(test)]
mod exclusion_tests {
    use contracts::{ExclusionBox, MountingConfig, RawPoint};
    use nalgebra::Vector4;
    use perception::FrameTransform;

    fn raw(x: f32, y: f32, z: f32) -> RawPoint {
        RawPoint {
            x,
            y,
            z,
            ..Default::default()
        }
    }

    /// Whatever lands strictly inside the footprint is dropped, everything
    /// else is kept, over a sweep of sensor-frame points.
    #[test]
    fn test_canonical_mounting_never_keeps_footprint_points() {
        let footprint = ExclusionBox::default();
        let transform = FrameTransform::new(&MountingConfig::default(), footprint);
        let matrix = *transform.matrix();

        let mut kept = 0;
        let mut dropped = 0;
        for i in -20..=20 {
            for j in -20..=20 {
                for k in -4..=4 {
                    let p = raw(i as f32 * 0.05, j as f32 * 0.05, k as f32 * 0.1);
                    let q = matrix * Vector4::new(p.x, p.y, p.z, 1.0);
                    match transform.apply(&p) {
                        Some(point) => {
                            assert!(!footprint.contains(point.x, point.y));
                            assert!((point.x - q[0]).abs() < 1e-3);
                            kept += 1;
                        }
                        None => {
                            assert!(footprint.contains(q[0], q[1]));
                            dropped += 1;
                        }
                    }
                }
            }
        }
        assert!(kept > 0);
        assert!(dropped > 0);
    }

    #[test]
    fn test_footprint_boundary_is_kept() {
        let footprint = ExclusionBox::default();
        let transform = FrameTransform::new(&MountingConfig::identity(), footprint);

        assert!(transform.apply(&raw(-30.0, 0.0, 0.0)).is_none());
        assert!(transform.apply(&raw(footprint.x_max, 0.0, 0.0)).is_some());
        assert!(transform.apply(&raw(0.0, footprint.y_min, 0.0)).is_some());
        assert!(transform.apply(&raw(200.0, 0.0, 0.0)).is_some());
    }
}
