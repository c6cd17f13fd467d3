//! # Perception
//!
//! Point processing for the LiDAR core.
//!
//! - [`FrameTransform`]: sensor frame (m) → robot frame (cm), self-body filter
//! - [`ObstacleRingBuffer`]: rolling point window, nearest-obstacle query
//! - [`ImuStatistics`]: windowed inertial summaries in sensor time
//! - [`ObservationCell`]: lock-free `(seq, distance)` publication
//!
//! ## Example
//!
//! ```ignore
//! use perception::{FrameTransform, ObstacleRingBuffer};
//!
//! let transform = FrameTransform::new(&blueprint.mounting, blueprint.exclusion);
//! let mut buffer = ObstacleRingBuffer::new(65536);
//!
//! for raw in &batch.points {
//!     if let Some(point) = transform.apply(raw) {
//!         buffer.push(point);
//!     }
//! }
//! let nearest = buffer.nearest_distance(-50.0, 80.0);
//! ```

mod buffer;
mod imu;
mod observation;
mod transform;

pub use buffer::ObstacleRingBuffer;
pub use imu::{ImuStatistics, ImuSummary};
pub use observation::{Observation, ObservationCell};
pub use transform::FrameTransform;
