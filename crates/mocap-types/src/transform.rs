//! Rigid-body transform math.
//!
//! A minimal translation + quaternion representation, just enough to apply a
//! calibration offset to a raw capture pose before publication.
//!
//! # Example
//!
//! ```rust
//! use mocap_types::transform::{Transform3D, Vec3, Quaternion};
//!
//! let raw = Transform3D::new(Vec3::new(1.0, 2.0, 3.0), Quaternion::identity());
//! let calibrated = raw.compose(Transform3D::identity());
//! assert_eq!(calibrated.translation, Vec3::new(1.0, 2.0, 3.0));
//! ```

use serde::{Deserialize, Serialize};

/// A 3-D translation vector.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Create a new vector.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    /// Uniform scale, used for the millimeter-to-meter conversion.
    pub fn scale(self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor, self.z * factor)
    }
}

/// A unit quaternion representing a 3-D rotation (x, y, z, w convention on
/// the wire, matching the capture server's output order).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// The identity rotation (no rotation).
    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(v.x, v.y, v.z, 0.0);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

/// A rigid-body 3-D transform: rotation plus translation.
///
/// Represents the pose of frame B relative to frame A: to convert a point
/// expressed in frame B into frame A, rotate it by `rotation` then add
/// `translation`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

impl Transform3D {
    /// Create a transform from a translation and rotation.
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// The identity transform (no translation, no rotation).
    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// Compose two transforms: `self` applied first, then `other`.
    ///
    /// If `self` = T_A_B and `other` = T_B_C, the result is T_A_C.  The
    /// calibration offset composes on the right of the raw pose.
    pub fn compose(self, other: Self) -> Self {
        let translated = self.translation.add(self.rotation.rotate(other.translation));
        let rotated = self.rotation.mul(other.rotation);
        Self::new(translated, rotated)
    }
}

impl Default for Transform3D {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a.x - b.x).abs() < EPS && (a.y - b.y).abs() < EPS && (a.z - b.z).abs() < EPS
    }

    #[test]
    fn identity_compose_is_noop() {
        let t = Transform3D::new(Vec3::new(1.0, -2.0, 0.5), Quaternion::identity());
        let composed = t.compose(Transform3D::identity());
        assert!(approx(composed.translation, t.translation));
        assert_eq!(composed.rotation, t.rotation);
    }

    #[test]
    fn compose_chains_translations() {
        let a = Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity());
        let b = Transform3D::new(Vec3::new(0.5, 0.0, 0.0), Quaternion::identity());
        let c = a.compose(b);
        assert!(approx(c.translation, Vec3::new(1.5, 0.0, 0.0)));
    }

    #[test]
    fn rotation_applies_to_composed_translation() {
        // 90 degrees about Z: x axis maps onto y axis.
        let half = std::f64::consts::FRAC_PI_4;
        let rot_z90 = Quaternion::new(0.0, 0.0, half.sin(), half.cos());
        let a = Transform3D::new(Vec3::zero(), rot_z90);
        let b = Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity());
        let c = a.compose(b);
        assert!(approx(c.translation, Vec3::new(0.0, 1.0, 0.0)));
    }

    #[test]
    fn quaternion_rotate_unit_x_about_z() {
        let half = std::f64::consts::FRAC_PI_4;
        let q = Quaternion::new(0.0, 0.0, half.sin(), half.cos());
        let v = q.rotate(Vec3::new(1.0, 0.0, 0.0));
        assert!(approx(v, Vec3::new(0.0, 1.0, 0.0)));
    }

    #[test]
    fn scale_converts_millimeters_to_meters() {
        let mm = Vec3::new(1000.0, 2000.0, 3000.0);
        let m = mm.scale(1.0 / 1000.0);
        assert!(approx(m, Vec3::new(1.0, 2.0, 3.0)));
    }
}
