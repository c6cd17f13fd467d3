//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the LiDAR core:
//! data model, sensor link abstraction, controller state and error taxonomy.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Units
//! - Sensor frame: meters, as delivered by the vendor driver
//! - Robot frame: centimeters, produced by the frame transform
//! - Sensor time: seconds (f64) from the LiDAR clock
//! - Host time: monotonic nanoseconds (u64), see [`mono_now_ns`]

mod blueprint;
mod clock;
mod error;
mod link;
mod sensor;
mod state;

pub use blueprint::*;
pub use clock::mono_now_ns;
pub use error::*;
pub use link::{LinkConnector, SensorLink};
pub use sensor::*;
pub use state::*;
