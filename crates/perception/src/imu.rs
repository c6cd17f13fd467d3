//! Inertial statistics over fixed windows of sensor time.
//!
//! Accumulates acceleration and angular-rate magnitudes and emits one
//! summary per `summary_interval_s` of *sensor* time. Host time is never
//! consulted, so replayed or delayed packets summarize identically.

use contracts::{ImuConfig, ImuSample};
use observability::{record_imu_window, RunningStats, StatsSummary};
use tracing::{debug, info};

/// Larger forward jumps are read as a counter going backwards (sensor reset)
const SEQ_GAP_LIMIT: u32 = u32::MAX / 2;

/// Summary of one statistics window
#[derive(Debug, Clone)]
pub struct ImuSummary {
    /// Sensor time of the first sample in the window (s)
    pub window_start: f64,
    /// Sensor time of the last sample in the window (s)
    pub window_end: f64,
    /// Per-axis linear acceleration (m/s²)
    pub accel: [StatsSummary; 3],
    /// Acceleration magnitude (m/s²)
    pub accel_norm: StatsSummary,
    /// Angular rate magnitude (rad/s)
    pub gyro_norm: StatsSummary,
    /// `| |a| - g |` (m/s²)
    pub gravity_residual: StatsSummary,
    /// Sequence numbers skipped inside the window
    pub seq_gaps: u64,
}

impl ImuSummary {
    /// Number of samples in the window
    pub fn samples(&self) -> u64 {
        self.accel_norm.count
    }
}

/// Windowed IMU accumulator owned by the acquisition worker
#[derive(Debug)]
pub struct ImuStatistics {
    interval_s: f64,
    gravity: f64,
    window_start: Option<f64>,
    last_timestamp: f64,
    last_seq: Option<u32>,
    seq_gaps: u64,
    accel: [RunningStats; 3],
    accel_norm: RunningStats,
    gyro_norm: RunningStats,
    gravity_residual: RunningStats,
}

impl ImuStatistics {
    pub fn new(config: &ImuConfig) -> Self {
        Self {
            interval_s: config.summary_interval_s,
            gravity: config.gravity,
            window_start: None,
            last_timestamp: 0.0,
            last_seq: None,
            seq_gaps: 0,
            accel: Default::default(),
            accel_norm: RunningStats::default(),
            gyro_norm: RunningStats::default(),
            gravity_residual: RunningStats::default(),
        }
    }

    /// Add a sample; returns a summary when the window closes
    ///
    /// The sample that closes a window is counted in the next one. A clock
    /// jump backwards discards the open window.
    pub fn push(&mut self, sample: &ImuSample) -> Option<ImuSummary> {
        let ts = sample.timestamp;
        let mut summary = None;

        match self.window_start {
            None => self.window_start = Some(ts),
            Some(start) if ts < self.last_timestamp => {
                debug!(
                    window_start = start,
                    last = self.last_timestamp,
                    timestamp = ts,
                    "IMU clock went backwards, window discarded"
                );
                self.reset_window(ts);
            }
            Some(start) if ts - start >= self.interval_s => {
                summary = Some(self.close_window());
                self.reset_window(ts);
            }
            Some(_) => {}
        }

        self.accumulate(sample);
        summary
    }

    /// Samples in the open window
    pub fn pending(&self) -> u64 {
        self.accel_norm.count()
    }

    fn accumulate(&mut self, sample: &ImuSample) {
        if let Some(prev) = self.last_seq {
            let expected = prev.wrapping_add(1);
            let skipped = sample.seq.wrapping_sub(expected);
            if skipped > SEQ_GAP_LIMIT {
                debug!(prev, seq = sample.seq, "IMU sequence restarted");
            } else {
                self.seq_gaps += skipped as u64;
            }
        }
        self.last_seq = Some(sample.seq);
        self.last_timestamp = sample.timestamp;

        let a = sample.linear_acceleration.map(f64::from);
        let w = sample.angular_velocity.map(f64::from);

        for (stats, value) in self.accel.iter_mut().zip(a) {
            stats.push(value);
        }

        let accel_norm = (a[0] * a[0] + a[1] * a[1] + a[2] * a[2]).sqrt();
        self.accel_norm.push(accel_norm);
        self.gyro_norm
            .push((w[0] * w[0] + w[1] * w[1] + w[2] * w[2]).sqrt());
        self.gravity_residual.push((accel_norm - self.gravity).abs());
    }

    fn close_window(&self) -> ImuSummary {
        let summary = ImuSummary {
            window_start: self.window_start.unwrap_or(self.last_timestamp),
            window_end: self.last_timestamp,
            accel: [
                StatsSummary::from(&self.accel[0]),
                StatsSummary::from(&self.accel[1]),
                StatsSummary::from(&self.accel[2]),
            ],
            accel_norm: StatsSummary::from(&self.accel_norm),
            gyro_norm: StatsSummary::from(&self.gyro_norm),
            gravity_residual: StatsSummary::from(&self.gravity_residual),
            seq_gaps: self.seq_gaps,
        };

        record_imu_window(
            summary.samples(),
            summary.accel_norm.mean,
            summary.gravity_residual.mean,
        );
        info!(
            samples = summary.samples(),
            window_start = summary.window_start,
            window_end = summary.window_end,
            seq_gaps = summary.seq_gaps,
            accel_norm = %summary.accel_norm,
            gyro_norm = %summary.gyro_norm,
            gravity_residual = %summary.gravity_residual,
            "IMU window summary"
        );

        summary
    }

    fn reset_window(&mut self, start: f64) {
        self.window_start = Some(start);
        self.seq_gaps = 0;
        for stats in &mut self.accel {
            stats.reset();
        }
        self.accel_norm.reset();
        self.gyro_norm.reset();
        self.gravity_residual.reset();
    }
}
