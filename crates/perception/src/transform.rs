//! Sensor-to-robot frame transform with self-body exclusion.
//!
//! The matrix is composed once as `T · S · M · Ry(pitch) · Rz(yaw)`, so a
//! sensor point is first yawed, then pitched, mirrored, scaled (m → cm)
//! and finally translated into the robot frame.

use contracts::{ExclusionBox, MountingConfig, Point, RawPoint};
use nalgebra::{Matrix4, Rotation3, Vector3, Vector4};

/// Rigid mounting transform plus chassis footprint filter
#[derive(Debug, Clone)]
pub struct FrameTransform {
    matrix: Matrix4<f32>,
    exclusion: ExclusionBox,
}

impl FrameTransform {
    /// Compose the homogeneous matrix from the mounting calibration
    pub fn new(mounting: &MountingConfig, exclusion: ExclusionBox) -> Self {
        Self {
            matrix: compose(mounting),
            exclusion,
        }
    }

    /// Composed 4×4 matrix
    pub fn matrix(&self) -> &Matrix4<f32> {
        &self.matrix
    }

    /// Footprint in use
    pub fn exclusion(&self) -> &ExclusionBox {
        &self.exclusion
    }

    /// Transform one point into the robot frame
    ///
    /// Returns `None` when the result falls on the robot's own body.
    #[inline]
    pub fn apply(&self, raw: &RawPoint) -> Option<Point> {
        let q = self.matrix * Vector4::new(raw.x, raw.y, raw.z, 1.0);

        if self.exclusion.contains(q.x, q.y) {
            return None;
        }

        Some(Point {
            x: q.x,
            y: q.y,
            z: q.z,
            intensity: raw.intensity,
            ring: raw.ring,
            time_offset: raw.time,
        })
    }
}

fn compose(mounting: &MountingConfig) -> Matrix4<f32> {
    let rz = Rotation3::from_axis_angle(&Vector3::z_axis(), mounting.yaw_deg.to_radians());
    let ry = Rotation3::from_axis_angle(&Vector3::y_axis(), mounting.pitch_deg.to_radians());

    let mut mirror = Matrix4::<f32>::identity();
    if mounting.mirror_z {
        mirror[(2, 2)] = -1.0;
    }

    let mut scale = Matrix4::<f32>::identity();
    scale[(0, 0)] = mounting.scale;
    scale[(1, 1)] = mounting.scale;
    scale[(2, 2)] = mounting.scale;

    let [tx, ty, tz] = mounting.translation;
    let translation = Matrix4::new_translation(&Vector3::new(tx, ty, tz));

    translation * scale * mirror * ry.to_homogeneous() * rz.to_homogeneous()
}
