//! AcquisitionWorker - the packet pipeline thread
//!
//! One worker exists per streaming session. It owns the sensor link for the
//! whole session and hands it back through [`WorkerExit`] when it ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use archive::Archiver;
use contracts::{
    mono_now_ns, ImuConfig, LidarError, PacketKind, PointCloudBatch, RawRecordType, SensorLink,
};
use observability::{record_decode_error, record_nearest_distance, record_packet_received, record_points};
use perception::{FrameTransform, ImuStatistics, ObservationCell, ObstacleRingBuffer};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::error::{IngestionError, Result};
use crate::metrics::{IngestionMetrics, SessionStats};

/// Join poll period
const JOIN_POLL: Duration = Duration::from_millis(5);

/// Everything a worker needs besides the link
#[derive(Clone)]
pub struct WorkerContext {
    pub transform: FrameTransform,
    pub ring_capacity: usize,
    /// Elevation band `[z_min, z_max]` of the obstacle query (cm)
    pub z_band: (f32, f32),
    /// Upper bound on a single packet pull
    pub pull_timeout: Duration,
    pub imu: ImuConfig,
    pub observation: Arc<ObservationCell>,
    pub archive: Arc<Archiver>,
    pub metrics: Arc<IngestionMetrics>,
}

/// Why the worker loop ended
#[derive(Debug)]
pub enum ExitReason {
    /// Stop flag observed
    Stopped,
    /// The link failed; it must be re-initialized before reuse
    LinkFailed(LidarError),
}

/// What a finished worker returns to its owner
pub struct WorkerExit {
    pub link: Box<dyn SensorLink>,
    pub reason: ExitReason,
    pub stats: SessionStats,
}

impl std::fmt::Debug for WorkerExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerExit")
            .field("reason", &self.reason)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Packet pipeline state, lives on the worker thread
pub struct AcquisitionWorker {
    link: Box<dyn SensorLink>,
    ctx: WorkerContext,
    buffer: ObstacleRingBuffer,
    imu: ImuStatistics,
    stop: Arc<AtomicBool>,
}

impl AcquisitionWorker {
    pub fn new(link: Box<dyn SensorLink>, ctx: WorkerContext) -> Self {
        Self {
            buffer: ObstacleRingBuffer::new(ctx.ring_capacity),
            imu: ImuStatistics::new(&ctx.imu),
            link,
            ctx,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Move the worker onto its own thread
    ///
    /// If the thread cannot be created the link is lost with it.
    pub fn spawn(self) -> Result<WorkerHandle> {
        let stop = Arc::clone(&self.stop);
        let join = thread::Builder::new()
            .name("lidar-acquisition".to_string())
            .spawn(move || self.run())
            .map_err(|e| IngestionError::SpawnFailed {
                message: e.to_string(),
            })?;

        Ok(WorkerHandle {
            stop,
            join: Some(join),
            started: Instant::now(),
        })
    }

    /// Pull and dispatch packets until stopped or the link fails
    #[instrument(name = "acquisition_worker", skip_all)]
    pub fn run(mut self) -> WorkerExit {
        info!("acquisition worker started");

        let reason = loop {
            if self.stop.load(Ordering::Acquire) {
                break ExitReason::Stopped;
            }

            let kind = match self.link.pull_packet(self.ctx.pull_timeout) {
                Ok(kind) => kind,
                Err(e) => {
                    error!(error = %e, "link failed, acquisition worker exiting");
                    break ExitReason::LinkFailed(e);
                }
            };

            if let Err(e) = self.dispatch(kind) {
                error!(error = %e, "link failed while decoding, acquisition worker exiting");
                break ExitReason::LinkFailed(e);
            }
        };

        if matches!(reason, ExitReason::LinkFailed(_)) {
            // A failed link has no current estimate
            self.ctx.observation.reset();
        }

        let stats = self.ctx.metrics.snapshot();
        info!(reason = ?reason, stats = %stats, "acquisition worker stopped");

        WorkerExit {
            link: self.link,
            reason,
            stats,
        }
    }

    /// Handle one pulled packet
    ///
    /// Decode errors are absorbed here; only link failures are returned.
    fn dispatch(&mut self, kind: PacketKind) -> std::result::Result<(), LidarError> {
        if kind == PacketKind::None {
            return Ok(());
        }

        self.ctx.metrics.record_packet(kind);
        record_packet_received(kind);
        self.archive_last_packet(kind);

        let outcome = match kind {
            PacketKind::PointCloud => self.link.point_cloud().map(|batch| self.on_point_cloud(batch)),
            PacketKind::Imu => self.link.imu_sample().map(|sample| {
                self.imu.push(&sample);
            }),
            PacketKind::Version => Ok(()),
            PacketKind::Unknown => {
                trace!("unknown packet skipped");
                Ok(())
            }
            PacketKind::None => Ok(()),
        };

        match outcome {
            Err(e) if e.is_recoverable() => {
                self.ctx.metrics.record_decode_error();
                record_decode_error(kind);
                warn!(kind = kind.as_str(), error = %e, "packet decode failed, skipped");
                Ok(())
            }
            other => other,
        }
    }

    fn archive_last_packet(&self, kind: PacketKind) {
        let Some(record_type) = RawRecordType::for_packet(kind) else {
            return;
        };
        if let Some(packet) = self.link.last_packet() {
            self.ctx
                .archive
                .record_raw(record_type, mono_now_ns(), packet);
        }
    }

    fn on_point_cloud(&mut self, batch: PointCloudBatch) {
        let mut kept = 0u64;
        let mut excluded = 0u64;

        for raw in &batch.points {
            let Some(point) = self.ctx.transform.apply(raw) else {
                excluded += 1;
                continue;
            };
            kept += 1;

            // Full revolution written: hand a copy to the snapshot writer
            if self.buffer.push(point)
                && self.ctx.archive.snapshots_enabled()
                && self.ctx.archive.record_snapshot(self.buffer.snapshot())
            {
                self.ctx.metrics.record_snapshot();
            }
        }

        self.ctx.metrics.record_points(kept, excluded);
        record_points(kept as usize, excluded as usize);

        let (z_min, z_max) = self.ctx.z_band;
        let nearest = self.buffer.nearest_distance(z_min, z_max);
        let seq = self.ctx.observation.publish(nearest);
        self.ctx.metrics.record_distance_update();
        if let Some(d) = nearest {
            record_nearest_distance(d);
        }

        trace!(
            scan_id = batch.scan_id,
            kept,
            excluded,
            seq,
            nearest = ?nearest,
            "point batch processed"
        );
    }
}

/// Owner's handle on a running worker
pub struct WorkerHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<WorkerExit>>,
    started: Instant,
}

impl WorkerHandle {
    /// Ask the worker to exit at its next pull
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Whether a stop was requested, joined or not
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Whether the worker thread has returned
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map(|j| j.is_finished()).unwrap_or(true)
    }

    /// Time since spawn
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Wait at most `timeout` for the worker to exit
    ///
    /// On `JoinTimeout` the handle stays valid and may be joined again.
    pub fn join_timeout(&mut self, timeout: Duration) -> Result<WorkerExit> {
        let deadline = Instant::now() + timeout;
        let waited = Instant::now();

        loop {
            let Some(join) = self.join.as_ref() else {
                return Err(IngestionError::AlreadyJoined);
            };
            if join.is_finished() {
                break;
            }
            if Instant::now() >= deadline {
                return Err(IngestionError::JoinTimeout {
                    waited_ms: waited.elapsed().as_millis() as u64,
                });
            }
            thread::sleep(JOIN_POLL);
        }

        let join = self.join.take().ok_or(IngestionError::AlreadyJoined)?;
        join.join().map_err(|payload| IngestionError::Panicked {
            message: panic_message(payload.as_ref()),
        })
    }

    /// `request_stop` followed by `join_timeout`
    pub fn stop_and_join(&mut self, timeout: Duration) -> Result<WorkerExit> {
        self.request_stop();
        let exit = self.join_timeout(timeout)?;
        debug!(uptime_ms = self.uptime().as_millis() as u64, "acquisition worker joined");
        Ok(exit)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
