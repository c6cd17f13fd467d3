//! Acquisition metrics
//!
//! Prometheus counters/gauges for the LiDAR pipeline plus an online
//! statistics accumulator shared by the IMU summaries and session reports.

use contracts::{ControllerState, PacketKind};
use metrics::{counter, gauge, histogram};

/// Record a packet pulled from the sensor link
pub fn record_packet_received(kind: PacketKind) {
    counter!("lidar_packets_received_total", "kind" => kind.as_str()).increment(1);
}

/// Record a packet that failed to decode
pub fn record_decode_error(kind: PacketKind) {
    counter!("lidar_packet_decode_errors_total", "kind" => kind.as_str()).increment(1);
}

/// Record points of one batch kept / removed by the self-body filter
pub fn record_points(kept: usize, excluded: usize) {
    counter!("lidar_points_kept_total").increment(kept as u64);
    counter!("lidar_points_excluded_total").increment(excluded as u64);
}

/// Record the latest nearest-obstacle distance (cm)
pub fn record_nearest_distance(distance_cm: f32) {
    gauge!("lidar_nearest_distance_cm").set(distance_cm as f64);
    histogram!("lidar_nearest_distance_cm_hist").record(distance_cm as f64);
}

/// Record an IMU window summary
pub fn record_imu_window(samples: u64, accel_norm_mean: f64, gravity_residual_mean: f64) {
    counter!("lidar_imu_samples_total").increment(samples);
    gauge!("lidar_imu_accel_norm_mean").set(accel_norm_mean);
    gauge!("lidar_imu_gravity_residual_mean").set(gravity_residual_mean);
}

/// Record packets discarded during a flush window
pub fn record_flush_discarded(packets: u64) {
    counter!("lidar_flush_discarded_packets_total").increment(packets);
}

/// Record an archive record outcome
pub fn record_archive_write(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "lidar_archive_writes_total",
        "sink" => sink_name.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Record an archive record dropped because the queue was full
pub fn record_archive_dropped(sink_name: &str) {
    counter!("lidar_archive_dropped_total", "sink" => sink_name.to_string()).increment(1);
}

/// Record a controller state transition
pub fn record_controller_state(state: ControllerState) {
    gauge!("lidar_controller_state").set(state.as_u8() as f64);
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// Add a value
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// Sample count
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// Standard deviation
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Minimum
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Maximum
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Forget all samples
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
