//! SensorLink trait - physical sensor connection abstraction
//!
//! Narrow contract over the vendor driver (UDP framing, packet decoding).
//! All calls are synchronous and may block; implementations are never
//! called concurrently, the controller's state machine guarantees that.

use std::time::Duration;

use crate::{ImuSample, LinkEndpoint, PacketKind, PointCloudBatch, RawPacket, Result};

/// Handle to an initialized sensor connection
///
/// Created once by a [`LinkConnector`] and reused across start/stop cycles.
/// Ownership moves between the controller (rotation, work mode) and the
/// acquisition worker (packet pull), never both at once.
///
/// # Example
///
/// ```ignore
/// let mut link = connector.connect(&endpoint)?;
/// link.start_rotation()?;
/// match link.pull_packet(Duration::from_millis(100))? {
///     PacketKind::PointCloud => handle(link.point_cloud()?),
///     _ => {}
/// }
/// link.stop_rotation()?;
/// ```
pub trait SensorLink: Send {
    /// Command the sensor to start spinning
    fn start_rotation(&mut self) -> Result<()>;

    /// Command the sensor to stop spinning
    fn stop_rotation(&mut self) -> Result<()>;

    /// Wait up to `timeout` for the next packet and parse its header
    ///
    /// Returns `PacketKind::None` on timeout. Errors are fatal
    /// (`LinkIo`): the transport is gone.
    fn pull_packet(&mut self, timeout: Duration) -> Result<PacketKind>;

    /// Decode the last pulled packet as a point cloud
    ///
    /// `PacketDecode` errors only affect the current packet.
    fn point_cloud(&mut self) -> Result<PointCloudBatch>;

    /// Decode the last pulled packet as an IMU sample
    fn imu_sample(&mut self) -> Result<ImuSample>;

    /// Payload of the last pulled packet and the size its header declares,
    /// for archival
    fn last_packet(&self) -> Option<RawPacket>;

    /// Send a work-mode configuration bitmask
    fn set_work_mode(&mut self, mode: u32) -> Result<()>;

    /// Drop whatever the driver has buffered
    fn clear_buffer(&mut self);
}

/// Factory performing the one-time link initialization
pub trait LinkConnector: Send + Sync {
    /// Bind the local socket and handshake with the sensor
    ///
    /// # Errors
    /// `LinkInit` if the transport cannot be established
    fn connect(&self, endpoint: &LinkEndpoint) -> Result<Box<dyn SensorLink>>;
}
