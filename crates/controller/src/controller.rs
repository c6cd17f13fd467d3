//! LidarController - link lifecycle and streaming state machine
//!
//! ```text
//! Disconnected --connect--> Connected --start--> Rotating --flush--> Streaming
//!       ^                       ^                                        |
//!       |                       +------------------stop------------------+
//!       +---- shutdown / link failure
//! ```
//!
//! Every lifecycle call takes the session lock, so `start`, `stop`,
//! `set_mode` and `shutdown` never interleave. The published state and the
//! latest observation live outside the lock and can always be read.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use archive::Archiver;
use contracts::{
    ControllerConfig, ControllerState, DistanceReading, ImuConfig, LidarBlueprint, LidarError,
    LinkConnector, LinkEndpoint, PacketKind, Result, SensorLink,
};
use ingestion::{
    AcquisitionWorker, ExitReason, IngestionError, IngestionMetrics, SessionStats, WorkerContext,
    WorkerExit, WorkerHandle,
};
use observability::{record_controller_state, record_flush_discarded};
use perception::{FrameTransform, Observation, ObservationCell};
use tracing::{debug, error, info, instrument, warn};

/// Resources guarded by the session lock
#[derive(Default)]
struct Session {
    /// Link handle while no worker owns it
    link: Option<Box<dyn SensorLink>>,
    /// Worker of the current streaming session
    worker: Option<WorkerHandle>,
    /// Counters of the current session
    metrics: Option<Arc<IngestionMetrics>>,
    /// Counters of the last finished session
    last_stats: Option<SessionStats>,
}

impl Session {
    fn has_link(&self) -> bool {
        self.link.is_some() || self.worker.is_some()
    }
}

/// Owner of the sensor link and the acquisition worker
pub struct LidarController {
    connector: Arc<dyn LinkConnector>,
    endpoint: LinkEndpoint,
    timing: ControllerConfig,
    imu: ImuConfig,
    transform: FrameTransform,
    archive: Arc<Archiver>,
    observation: Arc<ObservationCell>,
    state: AtomicU8,
    degraded: AtomicBool,
    session: Mutex<Session>,
}

impl LidarController {
    /// Create a disconnected controller
    pub fn new(
        blueprint: &LidarBlueprint,
        connector: Arc<dyn LinkConnector>,
        archive: Arc<Archiver>,
    ) -> Self {
        Self {
            connector,
            endpoint: blueprint.link.clone(),
            timing: blueprint.controller.clone(),
            imu: blueprint.imu.clone(),
            transform: FrameTransform::new(&blueprint.mounting, blueprint.exclusion),
            archive,
            observation: Arc::new(ObservationCell::new()),
            state: AtomicU8::new(ControllerState::Disconnected.as_u8()),
            degraded: AtomicBool::new(false),
            session: Mutex::new(Session::default()),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ControllerState {
        ControllerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether a worker failed or refused to stop since the last successful start
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// Latest published observation, never blocks
    pub fn query_distance(&self) -> Observation {
        self.observation.load()
    }

    /// Latest reading for the command interface, never blocks
    pub fn distance(&self) -> DistanceReading {
        self.observation.load().reading()
    }

    /// Counters of the running session, or of the last one
    pub fn session_stats(&self) -> Option<SessionStats> {
        let session = self.lock_session();
        session
            .metrics
            .as_ref()
            .map(|m| m.snapshot())
            .or(session.last_stats)
    }

    /// Initialize the link once; no-op while a handle exists
    #[instrument(name = "lidar_controller_connect", skip(self))]
    pub fn connect(&self) -> Result<()> {
        let mut session = self.lock_session();
        self.reap(&mut session);
        self.connect_locked(&mut session)
    }

    /// Start rotation and streaming; no-op while already streaming
    #[instrument(name = "lidar_controller_start", skip(self))]
    pub fn start(&self) -> Result<()> {
        let mut session = self.lock_session();
        self.reap(&mut session);

        match session.worker.as_ref().map(WorkerHandle::stop_requested) {
            Some(false) => {
                debug!("already streaming, start ignored");
                return Ok(());
            }
            // An earlier stop timed out: finish it before a fresh session
            Some(true) => self.stop_locked(&mut session)?,
            None => {}
        }

        self.connect_locked(&mut session)?;
        let Some(mut link) = session.link.take() else {
            return Err(LidarError::invalid_state("start", self.state()));
        };

        self.set_state(ControllerState::Rotating);
        if let Err(e) = link.start_rotation() {
            warn!(error = %e, "rotation start failed");
            session.link = Some(link);
            self.set_state(ControllerState::Connected);
            return Err(e);
        }

        match self.flush(link.as_mut()) {
            Ok(discarded) => debug!(discarded, "flush window elapsed"),
            Err(e) => {
                drop(link);
                self.degraded.store(true, Ordering::Release);
                self.observation.reset();
                self.set_state(ControllerState::Disconnected);
                error!(error = %e, "link failed during flush window, link dropped");
                return Err(e);
            }
        }

        self.observation.reset();
        let metrics = Arc::new(IngestionMetrics::new());
        let ctx = WorkerContext {
            transform: self.transform.clone(),
            ring_capacity: self.timing.ring_capacity,
            z_band: (self.timing.z_min, self.timing.z_max),
            pull_timeout: Duration::from_millis(self.timing.pull_timeout_ms),
            imu: self.imu.clone(),
            observation: Arc::clone(&self.observation),
            archive: Arc::clone(&self.archive),
            metrics: Arc::clone(&metrics),
        };

        match AcquisitionWorker::new(link, ctx).spawn() {
            Ok(worker) => {
                session.worker = Some(worker);
                session.metrics = Some(metrics);
                self.degraded.store(false, Ordering::Release);
                self.set_state(ControllerState::Streaming);
                info!("streaming started");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "acquisition worker not started, link dropped");
                self.degraded.store(true, Ordering::Release);
                self.set_state(ControllerState::Disconnected);
                Err(e.into())
            }
        }
    }

    /// Stop streaming and rotation, keeping the link; no-op when not streaming
    ///
    /// # Errors
    /// `WorkerJoinTimeout` if the worker does not exit within the join
    /// timeout. The controller is then degraded and a later `stop` retries.
    #[instrument(name = "lidar_controller_stop", skip(self))]
    pub fn stop(&self) -> Result<()> {
        let mut session = self.lock_session();
        self.stop_locked(&mut session)
    }

    /// Send a work-mode mask; only legal while connected and idle
    #[instrument(name = "lidar_controller_set_mode", skip(self))]
    pub fn set_mode(&self, mask: u32) -> Result<()> {
        let mut session = self.lock_session();
        self.reap(&mut session);

        let state = self.state();
        let link = match (state, session.link.as_mut()) {
            (ControllerState::Connected, Some(link)) => link,
            _ => return Err(LidarError::invalid_state("set_mode", state)),
        };

        link.set_work_mode(mask)?;
        info!(mask, "work mode set");
        Ok(())
    }

    /// Stop streaming and release the link
    #[instrument(name = "lidar_controller_shutdown", skip(self))]
    pub fn shutdown(&self) -> Result<()> {
        let mut session = self.lock_session();
        let result = self.stop_locked(&mut session);

        if session.link.take().is_some() {
            debug!("link released");
        }
        if session.worker.is_some() {
            warn!("acquisition worker still running at shutdown, detaching");
            session.worker = None;
        }
        session.metrics = None;
        self.observation.reset();
        self.set_state(ControllerState::Disconnected);
        info!("controller shut down");
        result
    }

    fn connect_locked(&self, session: &mut Session) -> Result<()> {
        if session.has_link() {
            return Ok(());
        }

        match self.connector.connect(&self.endpoint) {
            Ok(link) => {
                session.link = Some(link);
                self.set_state(ControllerState::Connected);
                info!(endpoint = %self.endpoint.describe(), "link initialized");
                Ok(())
            }
            Err(e) => {
                self.set_state(ControllerState::Disconnected);
                error!(endpoint = %self.endpoint.describe(), error = %e, "link initialization failed");
                Err(e)
            }
        }
    }

    fn stop_locked(&self, session: &mut Session) -> Result<()> {
        self.reap(session);

        let Some(worker) = session.worker.as_mut() else {
            debug!("not streaming, stop ignored");
            return Ok(());
        };

        let timeout = Duration::from_millis(self.timing.join_timeout_ms);
        match worker.stop_and_join(timeout) {
            Ok(exit) => {
                session.worker = None;
                self.finish_session(session, exit);
                Ok(())
            }
            Err(IngestionError::JoinTimeout { waited_ms }) => {
                self.degraded.store(true, Ordering::Release);
                error!(waited_ms, "acquisition worker did not stop in time");
                Err(LidarError::WorkerJoinTimeout { waited_ms })
            }
            Err(e) => {
                session.worker = None;
                session.metrics = None;
                self.degraded.store(true, Ordering::Release);
                self.observation.reset();
                self.set_state(ControllerState::Disconnected);
                error!(error = %e, "acquisition worker lost, link dropped");
                Err(e.into())
            }
        }
    }

    /// Collect a worker that exited on its own (link failure or panic)
    fn reap(&self, session: &mut Session) {
        let finished = session.worker.as_ref().map(|w| w.is_finished());
        if finished != Some(true) {
            return;
        }

        let Some(mut worker) = session.worker.take() else {
            return;
        };
        match worker.join_timeout(Duration::ZERO) {
            Ok(exit) => self.finish_session(session, exit),
            Err(e) => {
                session.metrics = None;
                self.degraded.store(true, Ordering::Release);
                self.observation.reset();
                self.set_state(ControllerState::Disconnected);
                error!(error = %e, "acquisition worker lost, link dropped");
            }
        }
    }

    fn finish_session(&self, session: &mut Session, exit: WorkerExit) {
        let WorkerExit {
            mut link,
            reason,
            stats,
        } = exit;

        session.metrics = None;
        session.last_stats = Some(stats);
        self.observation.reset();

        match reason {
            ExitReason::Stopped => {
                if let Err(e) = link.stop_rotation() {
                    warn!(error = %e, "rotation stop failed");
                }
                session.link = Some(link);
                self.set_state(ControllerState::Connected);
                info!(stats = %stats, "streaming stopped");
            }
            ExitReason::LinkFailed(e) => {
                drop(link);
                self.degraded.store(true, Ordering::Release);
                self.set_state(ControllerState::Disconnected);
                warn!(error = %e, stats = %stats, "link failed, next start re-initializes");
            }
        }
    }

    /// Drain and discard packets until the flush deadline
    ///
    /// Bounded by wall-clock time, so it ends even if nothing arrives. A link
    /// error ends the window and is returned.
    fn flush(&self, link: &mut dyn SensorLink) -> Result<u64> {
        link.clear_buffer();

        let window = Duration::from_millis(self.timing.flush_window_ms);
        let pull_timeout = Duration::from_millis(self.timing.pull_timeout_ms);
        let deadline = Instant::now() + window;
        let mut discarded = 0u64;

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match link.pull_packet(pull_timeout.min(deadline - now))? {
                PacketKind::None => {}
                _ => discarded += 1,
            }
        }

        record_flush_discarded(discarded);
        Ok(discarded)
    }

    fn set_state(&self, state: ControllerState) {
        let previous = ControllerState::from_u8(self.state.swap(state.as_u8(), Ordering::AcqRel));
        if previous != state {
            debug!(from = %previous, to = %state, "controller state changed");
            record_controller_state(state);
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for LidarController {
    fn drop(&mut self) {
        if self.state() == ControllerState::Disconnected && !self.lock_session().has_link() {
            return;
        }
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "controller shutdown on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{MountingConfig, PointCloudBatch, RawPoint};
    use ingestion::{MockConnector, MockScript};
    use std::thread;

    fn blueprint() -> LidarBlueprint {
        let mut bp = LidarBlueprint::default();
        bp.mounting = MountingConfig::identity();
        bp.controller.flush_window_ms = 0;
        bp.controller.join_timeout_ms = 1000;
        bp.controller.pull_timeout_ms = 5;
        bp.controller.ring_capacity = 3;
        bp
    }

    fn controller(bp: &LidarBlueprint) -> (LidarController, MockScript) {
        let script = MockScript::new();
        let connector = Arc::new(MockConnector::new(script.clone()));
        let controller = LidarController::new(bp, connector, Arc::new(Archiver::disabled()));
        (controller, script)
    }

    fn batch(x: f32) -> PointCloudBatch {
        PointCloudBatch {
            points: vec![RawPoint {
                x,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_connect_failure_stays_disconnected() {
        let (controller, script) = controller(&blueprint());
        script.fail_next_connects(1);

        let err = controller.connect().unwrap_err();
        assert!(matches!(err, LidarError::LinkInit { .. }));
        assert_eq!(controller.state(), ControllerState::Disconnected);

        controller.connect().unwrap();
        controller.connect().unwrap();
        assert_eq!(controller.state(), ControllerState::Connected);
        assert_eq!(script.probe().connects(), 2);
    }

    #[test]
    fn test_start_failure_reports_link_init() {
        let (controller, script) = controller(&blueprint());
        script.fail_next_connects(1);

        assert!(matches!(
            controller.start(),
            Err(LidarError::LinkInit { .. })
        ));
        assert_eq!(controller.state(), ControllerState::Disconnected);
        assert_eq!(script.probe().rotation_starts(), 0);
    }

    #[test]
    fn test_start_is_idempotent() {
        let (controller, script) = controller(&blueprint());

        controller.start().unwrap();
        controller.start().unwrap();

        assert_eq!(controller.state(), ControllerState::Streaming);
        assert_eq!(script.probe().rotation_starts(), 1);
        assert_eq!(script.probe().connects(), 1);
        controller.stop().unwrap();
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let (controller, script) = controller(&blueprint());
        controller.stop().unwrap();
        assert_eq!(controller.state(), ControllerState::Disconnected);

        controller.connect().unwrap();
        controller.stop().unwrap();
        assert_eq!(controller.state(), ControllerState::Connected);
        assert_eq!(script.probe().rotation_stops(), 0);
    }

    #[test]
    fn test_set_mode_rejected_while_streaming() {
        let (controller, script) = controller(&blueprint());

        let err = controller.set_mode(4).unwrap_err();
        assert!(matches!(
            err,
            LidarError::InvalidState {
                state: ControllerState::Disconnected,
                ..
            }
        ));

        controller.start().unwrap();
        let err = controller.set_mode(4).unwrap_err();
        assert!(matches!(
            err,
            LidarError::InvalidState {
                state: ControllerState::Streaming,
                ..
            }
        ));
        assert!(script.probe().work_modes().is_empty());

        controller.stop().unwrap();
        controller.set_mode(4).unwrap();
        assert_eq!(script.probe().work_modes(), vec![4]);
    }

    #[test]
    fn test_bounded_stop_without_packets() {
        let (controller, script) = controller(&blueprint());
        controller.start().unwrap();

        let began = Instant::now();
        controller.stop().unwrap();
        assert!(began.elapsed() < Duration::from_millis(1000));

        assert_eq!(controller.state(), ControllerState::Connected);
        assert_eq!(script.probe().rotation_stops(), 1);
        assert_eq!(controller.distance(), DistanceReading::Unknown);

        // link survives the cycle
        controller.start().unwrap();
        controller.stop().unwrap();
        assert_eq!(script.probe().connects(), 1);
        assert_eq!(script.probe().rotation_starts(), 2);
    }

    #[test]
    fn test_streaming_publishes_distance() {
        let (controller, script) = controller(&blueprint());
        controller.start().unwrap();

        script.push_point_cloud(batch(200.0));
        script.push_point_cloud(batch(100.0));
        script.push_point_cloud(batch(300.0));
        wait_until(|| controller.query_distance().seq >= 3);

        assert_eq!(controller.distance(), DistanceReading::Distance(100.0));
        controller.stop().unwrap();

        let stats = controller.session_stats().unwrap();
        assert_eq!(stats.point_packets, 3);
        assert_eq!(controller.distance(), DistanceReading::Unknown);
    }

    #[test]
    fn test_flush_window_ends_without_data() {
        let mut bp = blueprint();
        bp.controller.flush_window_ms = 60;
        let (controller, script) = controller(&bp);

        let began = Instant::now();
        controller.start().unwrap();
        let elapsed = began.elapsed();

        assert!(elapsed >= Duration::from_millis(60));
        assert!(elapsed < Duration::from_millis(1000));
        assert_eq!(script.probe().clear_calls(), 1);
        assert!(script.probe().pulls() > 0);
        controller.stop().unwrap();
    }

    #[test]
    fn test_link_failure_during_flush_fails_start() {
        let mut bp = blueprint();
        bp.controller.flush_window_ms = 400;
        let (controller, script) = controller(&bp);

        let injector = {
            let script = script.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                script.push_io_failure();
            })
        };

        let began = Instant::now();
        let err = controller.start().unwrap_err();
        injector.join().unwrap();

        assert!(matches!(err, LidarError::LinkIo { .. }));
        assert!(began.elapsed() < Duration::from_millis(400));
        assert_eq!(controller.state(), ControllerState::Disconnected);
        assert!(controller.is_degraded());
        assert_eq!(controller.distance(), DistanceReading::Unknown);

        // The failed link is gone, the next start connects again
        controller.start().unwrap();
        assert_eq!(script.probe().connects(), 2);
        assert_eq!(controller.state(), ControllerState::Streaming);
        assert!(!controller.is_degraded());
        controller.stop().unwrap();
    }

    #[test]
    fn test_start_after_timed_out_stop_streams_again() {
        let mut bp = blueprint();
        bp.controller.join_timeout_ms = 30;
        let (controller, script) = controller(&bp);

        controller.start().unwrap();
        script.set_pull_stall(Duration::from_millis(300));
        thread::sleep(Duration::from_millis(20));

        assert!(matches!(
            controller.stop(),
            Err(LidarError::WorkerJoinTimeout { .. })
        ));
        // Worker still stuck: start must not claim success
        assert!(matches!(
            controller.start(),
            Err(LidarError::WorkerJoinTimeout { .. })
        ));
        assert_eq!(script.probe().rotation_starts(), 1);

        script.set_pull_stall(Duration::ZERO);
        wait_until(|| controller.start().is_ok());
        assert_eq!(controller.state(), ControllerState::Streaming);
        assert_eq!(script.probe().rotation_starts(), 2);
        assert!(!controller.is_degraded());

        script.push_point_cloud(batch(200.0));
        script.push_point_cloud(batch(100.0));
        script.push_point_cloud(batch(300.0));
        wait_until(|| controller.query_distance().seq >= 3);
        assert_eq!(script.pending(), 0);
        assert_eq!(controller.distance(), DistanceReading::Distance(100.0));
        controller.stop().unwrap();
    }

    #[test]
    fn test_join_timeout_is_fatal_then_recoverable() {
        let mut bp = blueprint();
        bp.controller.join_timeout_ms = 30;
        let (controller, script) = controller(&bp);

        controller.start().unwrap();
        script.set_pull_stall(Duration::from_millis(400));
        thread::sleep(Duration::from_millis(20));

        let err = controller.stop().unwrap_err();
        assert!(matches!(err, LidarError::WorkerJoinTimeout { .. }));
        assert!(controller.is_degraded());

        script.set_pull_stall(Duration::ZERO);
        wait_until(|| controller.stop().is_ok());
        assert_eq!(controller.state(), ControllerState::Connected);
    }

    #[test]
    fn test_link_failure_forces_reinitialization() {
        let (controller, script) = controller(&blueprint());
        controller.start().unwrap();

        script.push_io_failure();
        wait_until(|| script.pending() == 0);
        thread::sleep(Duration::from_millis(30));

        controller.stop().unwrap();
        assert_eq!(controller.state(), ControllerState::Disconnected);
        assert!(controller.is_degraded());

        controller.start().unwrap();
        assert_eq!(script.probe().connects(), 2);
        assert_eq!(controller.state(), ControllerState::Streaming);
        assert!(!controller.is_degraded());
        controller.stop().unwrap();
    }

    #[test]
    fn test_shutdown_releases_link() {
        let (controller, script) = controller(&blueprint());
        controller.start().unwrap();
        controller.shutdown().unwrap();
        assert_eq!(controller.state(), ControllerState::Disconnected);

        controller.start().unwrap();
        assert_eq!(script.probe().connects(), 2);
        controller.shutdown().unwrap();
    }
}
