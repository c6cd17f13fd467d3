//! Mock sensor link
//!
//! Stands in for the vendor driver: tests script packet sequences and
//! inject failures through a shared [`MockScript`], and the server can run
//! without hardware on a [`SyntheticScene`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use contracts::{
    ImuSample, LidarError, LinkConnector, LinkEndpoint, PacketKind, PointCloudBatch, RawPacket,
    RawPoint, Result, SensorLink,
};
use tracing::{debug, trace};

/// One packet the mock link will deliver
#[derive(Debug, Clone)]
pub enum ScriptedPacket {
    PointCloud(PointCloudBatch),
    Imu(ImuSample),
    Version(Bytes),
    Unknown,
    /// Header of `kind` whose body fails to decode
    Corrupt(PacketKind),
    /// Corrupt body behind a header claiming `declared_size` payload bytes
    Misdeclared {
        kind: PacketKind,
        declared_size: u32,
    },
    /// Transport failure on pull
    IoFailure,
}

impl ScriptedPacket {
    fn kind(&self) -> PacketKind {
        match self {
            Self::PointCloud(_) => PacketKind::PointCloud,
            Self::Imu(_) => PacketKind::Imu,
            Self::Version(_) => PacketKind::Version,
            Self::Unknown => PacketKind::Unknown,
            Self::Corrupt(kind) | Self::Misdeclared { kind, .. } => *kind,
            Self::IoFailure => PacketKind::None,
        }
    }

    /// Frame as it comes off the wire: `payload_size u32 LE | payload`
    fn wire_frame(&self) -> Option<Bytes> {
        let body = match self {
            Self::PointCloud(batch) => encode_point_cloud(batch),
            Self::Imu(sample) => encode_imu(sample),
            Self::Version(bytes) => bytes.clone(),
            Self::Corrupt(_) | Self::Misdeclared { .. } => Bytes::from_static(&CORRUPT_BODY),
            Self::Unknown | Self::IoFailure => return None,
        };
        let declared = match self {
            Self::Misdeclared { declared_size, .. } => *declared_size,
            _ => body.len() as u32,
        };

        let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + body.len());
        frame.put_u32_le(declared);
        frame.put_slice(&body);
        Some(frame.freeze())
    }
}

const FRAME_HEADER_LEN: usize = 4;

const CORRUPT_BODY: [u8; 4] = [0xde, 0xad, 0xbe, 0xef];

/// Split a wire frame into its declared size and payload
fn parse_frame(mut frame: Bytes) -> Option<RawPacket> {
    if frame.len() < FRAME_HEADER_LEN {
        return None;
    }
    let declared_size = frame.get_u32_le();
    Some(RawPacket {
        declared_size,
        bytes: frame,
    })
}

/// Calls observed by the mock, for assertions
#[derive(Debug, Default)]
pub struct MockProbe {
    connects: AtomicU32,
    rotation_starts: AtomicU32,
    rotation_stops: AtomicU32,
    clear_calls: AtomicU32,
    pulls: AtomicU64,
    work_modes: Mutex<Vec<u32>>,
}

impl MockProbe {
    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn rotation_starts(&self) -> u32 {
        self.rotation_starts.load(Ordering::SeqCst)
    }

    pub fn rotation_stops(&self) -> u32 {
        self.rotation_stops.load(Ordering::SeqCst)
    }

    pub fn clear_calls(&self) -> u32 {
        self.clear_calls.load(Ordering::SeqCst)
    }

    pub fn pulls(&self) -> u64 {
        self.pulls.load(Ordering::SeqCst)
    }

    /// Work-mode masks sent, in order
    pub fn work_modes(&self) -> Vec<u32> {
        lock(&self.work_modes).clone()
    }
}

#[derive(Debug, Default)]
struct ScriptInner {
    queue: Mutex<VecDeque<ScriptedPacket>>,
    pull_stall_ms: AtomicU64,
    failing_connects: AtomicU32,
    reject_work_mode: AtomicBool,
    probe: MockProbe,
}

/// Shared packet script and fault switches
///
/// Cloning shares the script, so a test keeps one clone while the link
/// (or connector) owns another.
#[derive(Debug, Clone, Default)]
pub struct MockScript {
    inner: Arc<ScriptInner>,
}

impl MockScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, packet: ScriptedPacket) {
        lock(&self.inner.queue).push_back(packet);
    }

    pub fn push_point_cloud(&self, batch: PointCloudBatch) {
        self.push(ScriptedPacket::PointCloud(batch));
    }

    pub fn push_imu(&self, sample: ImuSample) {
        self.push(ScriptedPacket::Imu(sample));
    }

    pub fn push_version(&self, payload: Bytes) {
        self.push(ScriptedPacket::Version(payload));
    }

    pub fn push_unknown(&self) {
        self.push(ScriptedPacket::Unknown);
    }

    pub fn push_corrupt(&self, kind: PacketKind) {
        self.push(ScriptedPacket::Corrupt(kind));
    }

    /// Packet of `kind` whose header lies about its payload size
    pub fn push_misdeclared(&self, kind: PacketKind, declared_size: u32) {
        self.push(ScriptedPacket::Misdeclared {
            kind,
            declared_size,
        });
    }

    pub fn push_io_failure(&self) {
        self.push(ScriptedPacket::IoFailure);
    }

    /// Packets not yet pulled
    pub fn pending(&self) -> usize {
        lock(&self.inner.queue).len()
    }

    /// Make every pull block for `stall`, ignoring its timeout
    pub fn set_pull_stall(&self, stall: Duration) {
        self.inner
            .pull_stall_ms
            .store(stall.as_millis() as u64, Ordering::SeqCst);
    }

    /// Fail the next `n` connection attempts
    pub fn fail_next_connects(&self, n: u32) {
        self.inner.failing_connects.store(n, Ordering::SeqCst);
    }

    /// Reject work-mode commands
    pub fn reject_work_mode(&self, reject: bool) {
        self.inner.reject_work_mode.store(reject, Ordering::SeqCst);
    }

    pub fn probe(&self) -> &MockProbe {
        &self.inner.probe
    }

    fn pop(&self) -> Option<ScriptedPacket> {
        lock(&self.inner.queue).pop_front()
    }

    fn stall(&self) -> Duration {
        Duration::from_millis(self.inner.pull_stall_ms.load(Ordering::SeqCst))
    }
}

/// Parameters of the generated hardware-free scene
#[derive(Debug, Clone)]
pub struct SyntheticScene {
    /// Range of the surrounding wall in the sensor frame (m)
    pub range_m: f32,
    /// Points per generated packet
    pub points_per_packet: usize,
    /// Packets per full revolution
    pub packets_per_revolution: u32,
    /// Every n-th packet is inertial
    pub imu_every: u32,
    /// Time between packets
    pub period: Duration,
}

impl Default for SyntheticScene {
    fn default() -> Self {
        Self {
            range_m: 1.5,
            points_per_packet: 120,
            packets_per_revolution: 180,
            imu_every: 4,
            period: Duration::from_millis(5),
        }
    }
}

struct SceneState {
    scene: SyntheticScene,
    packet_no: u64,
    scan_id: u32,
    imu_seq: u32,
    sensor_time: f64,
}

impl SceneState {
    fn next_packet(&mut self) -> ScriptedPacket {
        self.packet_no += 1;
        self.sensor_time += self.scene.period.as_secs_f64();

        if self.scene.imu_every > 0 && self.packet_no % self.scene.imu_every as u64 == 0 {
            self.imu_seq = self.imu_seq.wrapping_add(1);
            return ScriptedPacket::Imu(ImuSample {
                timestamp: self.sensor_time,
                seq: self.imu_seq,
                quaternion: [1.0, 0.0, 0.0, 0.0],
                angular_velocity: [0.0, 0.0, 0.01],
                linear_acceleration: [0.0, 0.0, 9.81],
            });
        }

        let per_rev = self.scene.packets_per_revolution.max(1);
        let slice = (self.scan_id % per_rev) as f32;
        let n = self.scene.points_per_packet.max(1);
        let span = std::f32::consts::TAU / per_rev as f32;

        let points = (0..n)
            .map(|i| {
                let azimuth = (slice + i as f32 / n as f32) * span;
                let elevation = ((i % 16) as f32 - 8.0).to_radians() * 2.0;
                RawPoint {
                    x: self.scene.range_m * azimuth.cos() * elevation.cos(),
                    y: self.scene.range_m * azimuth.sin() * elevation.cos(),
                    z: self.scene.range_m * elevation.sin(),
                    intensity: 100.0,
                    time: i as f32 * 1e-5,
                    ring: (i % 16) as u32,
                }
            })
            .collect();

        let batch = PointCloudBatch {
            scan_timestamp: self.sensor_time,
            scan_id: self.scan_id,
            ring_count: 16,
            points,
        };
        self.scan_id = self.scan_id.wrapping_add(1);
        ScriptedPacket::PointCloud(batch)
    }
}

/// Sensor link backed by a script or a synthetic scene
pub struct MockSensorLink {
    script: MockScript,
    scene: Option<SceneState>,
    rotating: bool,
    current: Option<ScriptedPacket>,
    last_raw: Option<RawPacket>,
}

impl MockSensorLink {
    /// Link replaying `script`
    pub fn new(script: MockScript) -> Self {
        Self {
            script,
            scene: None,
            rotating: false,
            current: None,
            last_raw: None,
        }
    }

    /// Link generating `scene` while rotating; scripted packets take priority
    pub fn synthetic(script: MockScript, scene: SyntheticScene) -> Self {
        Self {
            scene: Some(SceneState {
                scene,
                packet_no: 0,
                scan_id: 0,
                imu_seq: 0,
                sensor_time: 0.0,
            }),
            ..Self::new(script)
        }
    }

    fn next_packet(&mut self, timeout: Duration) -> Option<ScriptedPacket> {
        if let Some(packet) = self.script.pop() {
            return Some(packet);
        }

        match self.scene.as_mut() {
            Some(state) if self.rotating => {
                thread::sleep(state.scene.period.min(timeout));
                Some(state.next_packet())
            }
            _ => {
                thread::sleep(timeout);
                None
            }
        }
    }

    fn decode_error(&self, expected: PacketKind) -> LidarError {
        let got = self
            .current
            .as_ref()
            .map(ScriptedPacket::kind)
            .unwrap_or(PacketKind::None);
        LidarError::packet_decode(expected, format!("malformed body (header said {got:?})"))
    }
}

impl SensorLink for MockSensorLink {
    fn start_rotation(&mut self) -> Result<()> {
        self.script
            .inner
            .probe
            .rotation_starts
            .fetch_add(1, Ordering::SeqCst);
        self.rotating = true;
        debug!("mock rotation started");
        Ok(())
    }

    fn stop_rotation(&mut self) -> Result<()> {
        self.script
            .inner
            .probe
            .rotation_stops
            .fetch_add(1, Ordering::SeqCst);
        self.rotating = false;
        debug!("mock rotation stopped");
        Ok(())
    }

    fn pull_packet(&mut self, timeout: Duration) -> Result<PacketKind> {
        self.script.inner.probe.pulls.fetch_add(1, Ordering::SeqCst);

        let stall = self.script.stall();
        if !stall.is_zero() {
            thread::sleep(stall);
        }

        self.current = None;
        self.last_raw = None;

        let Some(packet) = self.next_packet(timeout) else {
            return Ok(PacketKind::None);
        };

        if let ScriptedPacket::IoFailure = packet {
            return Err(LidarError::link_io("mock transport closed"));
        }

        let kind = packet.kind();
        self.last_raw = packet.wire_frame().and_then(parse_frame);
        self.current = Some(packet);
        trace!(kind = kind.as_str(), "mock packet pulled");
        Ok(kind)
    }

    fn point_cloud(&mut self) -> Result<PointCloudBatch> {
        match &self.current {
            Some(ScriptedPacket::PointCloud(batch)) => Ok(batch.clone()),
            _ => Err(self.decode_error(PacketKind::PointCloud)),
        }
    }

    fn imu_sample(&mut self) -> Result<ImuSample> {
        match &self.current {
            Some(ScriptedPacket::Imu(sample)) => Ok(*sample),
            _ => Err(self.decode_error(PacketKind::Imu)),
        }
    }

    fn last_packet(&self) -> Option<RawPacket> {
        self.last_raw.clone()
    }

    fn set_work_mode(&mut self, mode: u32) -> Result<()> {
        lock(&self.script.inner.probe.work_modes).push(mode);
        if self.script.inner.reject_work_mode.load(Ordering::SeqCst) {
            return Err(LidarError::link_io(format!("work mode {mode} rejected")));
        }
        Ok(())
    }

    fn clear_buffer(&mut self) {
        self.script
            .inner
            .probe
            .clear_calls
            .fetch_add(1, Ordering::SeqCst);
        lock(&self.script.inner.queue).clear();
        self.current = None;
        self.last_raw = None;
    }
}

/// Connector handing out mock links that share one script
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    script: MockScript,
    scene: Option<SyntheticScene>,
}

impl MockConnector {
    /// Connector for scripted links
    pub fn new(script: MockScript) -> Self {
        Self {
            script,
            scene: None,
        }
    }

    /// Connector for synthetic-scene links
    pub fn synthetic(scene: SyntheticScene) -> Self {
        Self {
            script: MockScript::new(),
            scene: Some(scene),
        }
    }

    pub fn script(&self) -> &MockScript {
        &self.script
    }
}

impl LinkConnector for MockConnector {
    fn connect(&self, endpoint: &LinkEndpoint) -> Result<Box<dyn SensorLink>> {
        let inner = &self.script.inner;
        inner.probe.connects.fetch_add(1, Ordering::SeqCst);

        let failing = inner.failing_connects.load(Ordering::SeqCst);
        if failing > 0 {
            inner.failing_connects.store(failing - 1, Ordering::SeqCst);
            return Err(LidarError::link_init(endpoint.describe(), "no handshake reply"));
        }

        debug!(endpoint = %endpoint.describe(), synthetic = self.scene.is_some(), "mock link connected");
        let link = match &self.scene {
            Some(scene) => MockSensorLink::synthetic(self.script.clone(), scene.clone()),
            None => MockSensorLink::new(self.script.clone()),
        };
        Ok(Box::new(link))
    }
}

/// Little-endian `x y z intensity time ring` records after a small header
fn encode_point_cloud(batch: &PointCloudBatch) -> Bytes {
    let mut buf = BytesMut::with_capacity(16 + batch.points.len() * 24);
    buf.put_f64_le(batch.scan_timestamp);
    buf.put_u32_le(batch.scan_id);
    buf.put_u32_le(batch.points.len() as u32);
    for p in &batch.points {
        buf.put_f32_le(p.x);
        buf.put_f32_le(p.y);
        buf.put_f32_le(p.z);
        buf.put_f32_le(p.intensity);
        buf.put_f32_le(p.time);
        buf.put_u32_le(p.ring);
    }
    buf.freeze()
}

fn encode_imu(sample: &ImuSample) -> Bytes {
    let mut buf = BytesMut::with_capacity(52);
    buf.put_f64_le(sample.timestamp);
    buf.put_u32_le(sample.seq);
    for v in sample
        .quaternion
        .iter()
        .chain(&sample.angular_velocity)
        .chain(&sample.linear_acceleration)
    {
        buf.put_f32_le(*v);
    }
    buf.freeze()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
