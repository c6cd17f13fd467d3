//! # Ingestion
//!
//! Acquisition side of the LiDAR core.
//!
//! - [`AcquisitionWorker`]: dedicated thread pulling packets from the
//!   [`SensorLink`](contracts::SensorLink), feeding the frame transform,
//!   obstacle buffer, IMU statistics and archive
//! - [`IngestionMetrics`]: per-session counters
//! - [`mock`]: scripted and synthetic links for tests and hardware-free runs
//!
//! ## Example
//!
//! ```ignore
//! let worker = AcquisitionWorker::new(link, ctx).spawn()?;
//! // ...
//! let exit = worker.stop_and_join(Duration::from_secs(3))?;
//! let link = exit.link;
//! ```

pub mod error;
pub mod metrics;
pub mod mock;
pub mod worker;

pub use error::IngestionError;
pub use metrics::{IngestionMetrics, SessionStats};
pub use mock::{MockConnector, MockProbe, MockScript, MockSensorLink, ScriptedPacket, SyntheticScene};
pub use worker::{AcquisitionWorker, ExitReason, WorkerContext, WorkerExit, WorkerHandle};
