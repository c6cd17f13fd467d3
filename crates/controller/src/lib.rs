//! # Controller
//!
//! Lifecycle owner of the LiDAR link.
//!
//! Responsibilities:
//! - Initialize the sensor link once and reuse it across start/stop cycles
//! - Start rotation, flush stale packets and hand the link to the
//!   acquisition worker
//! - Stop with a bounded join and take the link back
//! - Serve the latest obstacle distance without blocking
//!
//! ## Example
//!
//! ```ignore
//! let controller = LidarController::new(&blueprint, connector, archiver);
//! controller.start()?;
//! println!("{:?}", controller.distance());
//! controller.stop()?;
//! ```

pub mod controller;

pub use controller::LidarController;
