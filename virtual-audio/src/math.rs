//! Math types and scalar helpers shared by the mixer

pub use glam::{Quat, Vec3};

/// Position and orientation of the listening origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            position: Vec3::ZERO,
            rotation,
        }
    }

    /// Maps a point given relative to this pose into world space:
    /// `position + rotation * point`.
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * point
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Spherical position around the origin. Angles are in degrees, azimuth is
/// measured clockwise from +Z towards +X.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SphericalCoordinate {
    pub azimuth: f32,
    pub elevation: f32,
    pub distance: f32,
}

impl SphericalCoordinate {
    /// Converts a cartesian position. Azimuth is normalized to `[0, 360)`.
    pub fn from_position(pos: Vec3) -> Self {
        let mut azimuth = pos.x.atan2(pos.z).to_degrees();
        if azimuth < 0.0 {
            azimuth += 360.0;
        }
        // atan2 of -0.0 can round to exactly 360 after the shift
        if azimuth >= 360.0 {
            azimuth -= 360.0;
        }

        let horizontal = (pos.x * pos.x + pos.z * pos.z).sqrt();
        let elevation = pos.y.atan2(horizontal).to_degrees();

        Self {
            azimuth,
            elevation,
            distance: pos.length(),
        }
    }

    /// Signed azimuth offset of `self` relative to `other_azimuth`, wrapped to
    /// `[-180, 180]`.
    pub fn azimuth_difference_from(&self, other_azimuth: f32) -> f32 {
        let mut diff = self.azimuth - other_azimuth;
        if diff < -180.0 {
            diff += 360.0;
        }
        if diff > 180.0 {
            diff -= 360.0;
        }
        diff
    }
}

/// Linear interpolation with `t` clamped to `[0, 1]`.
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * clamp01(t)
}

/// Inverse of [`lerp`], clamped to `[0, 1]`. Returns 0 for an empty range.
#[inline]
pub fn inverse_lerp(a: f32, b: f32, value: f32) -> f32 {
    if a == b {
        return 0.0;
    }
    clamp01((value - a) / (b - a))
}

#[inline]
pub fn clamp01(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Relative float comparison used to detect integral resampling positions.
#[inline]
pub fn approximately(a: f32, b: f32) -> bool {
    (b - a).abs() < f32::max(1e-6 * a.abs().max(b.abs()), f32::EPSILON * 8.0)
}
