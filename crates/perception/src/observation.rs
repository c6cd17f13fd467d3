//! Latest-observation cell shared between the worker and readers.
//!
//! `(seq, distance)` is packed into a single `AtomicU64`: the sequence
//! number in the high half, the `f32` distance bits in the low half. A NaN
//! distance encodes "unknown". Readers never block and never see a pair
//! from two different writes.

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::DistanceReading;

/// Published nearest-obstacle estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Publication counter, 0 = never published since the last reset
    pub seq: u32,
    /// Nearest distance (cm), `None` while unknown
    pub distance: Option<f32>,
}

impl Observation {
    /// Reading for the command interface
    pub fn reading(&self) -> DistanceReading {
        DistanceReading::from_query(self.distance)
    }
}

/// Lock-free single-writer cell
#[derive(Debug)]
pub struct ObservationCell {
    packed: AtomicU64,
}

impl Default for ObservationCell {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservationCell {
    /// Create a cell holding an unknown reading
    pub fn new() -> Self {
        Self {
            packed: AtomicU64::new(pack(0, None)),
        }
    }

    /// Publish a new estimate, bumping the sequence number
    ///
    /// Only the acquisition worker writes, so load + store is sufficient.
    pub fn publish(&self, distance: Option<f32>) -> u32 {
        let (seq, _) = unpack(self.packed.load(Ordering::Relaxed));
        let next = seq.wrapping_add(1).max(1);
        self.packed.store(pack(next, distance), Ordering::Release);
        next
    }

    /// Latest estimate
    #[inline]
    pub fn load(&self) -> Observation {
        let (seq, distance) = unpack(self.packed.load(Ordering::Acquire));
        Observation { seq, distance }
    }

    /// Back to "unknown", sequence zero
    pub fn reset(&self) {
        self.packed.store(pack(0, None), Ordering::Release);
    }
}

#[inline]
fn pack(seq: u32, distance: Option<f32>) -> u64 {
    let bits = distance.unwrap_or(f32::NAN).to_bits();
    ((seq as u64) << 32) | bits as u64
}

#[inline]
fn unpack(packed: u64) -> (u32, Option<f32>) {
    let seq = (packed >> 32) as u32;
    let value = f32::from_bits(packed as u32);
    let distance = if value.is_nan() { None } else { Some(value) };
    (seq, distance)
}
