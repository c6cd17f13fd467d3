//! Fixed-capacity obstacle buffer with nearest-obstacle query.
//!
//! Points live in a `HeapRb` that overwrites the oldest entry once full.
//! A separate write cursor (modulo capacity) tells the caller when a full
//! revolution of the buffer has been written, which triggers snapshots.

use std::fmt;

use contracts::{Point, NO_OBSTACLE_DISTANCE};
use ringbuf::{traits::*, HeapRb};

/// Rolling window of the most recent robot-frame points
pub struct ObstacleRingBuffer {
    points: HeapRb<Point>,
    capacity: usize,
    cursor: usize,
    wraps: u64,
}

impl fmt::Debug for ObstacleRingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObstacleRingBuffer")
            .field("len", &self.points.occupied_len())
            .field("capacity", &self.capacity)
            .field("cursor", &self.cursor)
            .field("wraps", &self.wraps)
            .finish()
    }
}

impl ObstacleRingBuffer {
    /// Create an empty buffer holding at most `capacity` points
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: HeapRb::new(capacity),
            capacity,
            cursor: 0,
            wraps: 0,
        }
    }

    /// Store a point, overwriting the oldest one when full
    ///
    /// Returns `true` when this push wrapped the cursor back to zero on a
    /// full buffer.
    #[inline]
    pub fn push(&mut self, point: Point) -> bool {
        let _ = self.points.push_overwrite(point);
        self.cursor = (self.cursor + 1) % self.capacity;

        let wrapped = self.cursor == 0 && self.points.is_full();
        if wrapped {
            self.wraps += 1;
        }
        wrapped
    }

    /// Planar distance to the nearest point whose z lies in `[z_min, z_max]`
    ///
    /// - `None` until the buffer has been filled once
    /// - `Some(NO_OBSTACLE_DISTANCE)` when no point lies in the band
    pub fn nearest_distance(&self, z_min: f32, z_max: f32) -> Option<f32> {
        if !self.points.is_full() {
            return None;
        }

        let mut best_sq = f32::INFINITY;
        for p in self.points.iter() {
            if p.z < z_min || p.z > z_max {
                continue;
            }
            let d = p.planar_distance_sq();
            if d < best_sq {
                best_sq = d;
            }
        }

        if best_sq.is_finite() {
            Some(best_sq.sqrt())
        } else {
            Some(NO_OBSTACLE_DISTANCE)
        }
    }

    /// Drop every stored point
    pub fn clear(&mut self) {
        let _ = self.points.pop_iter().count();
        self.cursor = 0;
    }

    /// Copy of the stored points, oldest first
    pub fn snapshot(&self) -> Vec<Point> {
        self.points.iter().copied().collect()
    }

    /// Number of stored points
    #[inline]
    pub fn len(&self) -> usize {
        self.points.occupied_len()
    }

    /// Whether no point is stored
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether the buffer holds `capacity` points
    #[inline]
    pub fn is_full(&self) -> bool {
        self.points.is_full()
    }

    /// Maximum number of points
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of completed wraparounds
    #[inline]
    pub fn wraps(&self) -> u64 {
        self.wraps
    }
}
