// Vector and Quaternion Math
// Shared 3D types for force, integration and attitude calculations

use serde::{Deserialize, Serialize};

// =============================================================================
// PHYSICAL CONSTANTS (SI Units)
// =============================================================================

/// Gravitational constant (m³/(kg·s²))
pub const G: f64 = 6.67430e-11;

// =============================================================================
// 3D VECTOR MATHEMATICS
// =============================================================================

/// A 3D vector. Planar (2D) scenarios simply keep `z == 0`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const UNIT_X: Vector3 = Vector3 { x: 1.0, y: 0.0, z: 0.0 };
    pub const UNIT_Y: Vector3 = Vector3 { x: 0.0, y: 1.0, z: 0.0 };
    pub const UNIT_Z: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 1.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn planar(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    pub fn zero() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    pub fn magnitude_squared(&self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    pub fn magnitude(&self) -> f64 {
        self.magnitude_squared().sqrt()
    }

    pub fn normalize(&self) -> Self {
        let mag = self.magnitude();
        if mag > 1e-15 {
            Self {
                x: self.x / mag,
                y: self.y / mag,
                z: self.z / mag,
            }
        } else {
            Self::zero()
        }
    }

    pub fn dot(&self, other: &Vector3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Vector3) -> Vector3 {
        Vector3 {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    pub fn scale(&self, s: f64) -> Self {
        Self {
            x: self.x * s,
            y: self.y * s,
            z: self.z * s,
        }
    }

    pub fn add(&self, other: &Vector3) -> Vector3 {
        Vector3 {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }

    pub fn sub(&self, other: &Vector3) -> Vector3 {
        Vector3 {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }

    pub fn negate(&self) -> Vector3 {
        self.scale(-1.0)
    }

    /// Any unit vector perpendicular to `self`
    pub fn any_orthogonal(&self) -> Vector3 {
        let axis = if self.x.abs() < 0.9 {
            Vector3::UNIT_X
        } else {
            Vector3::UNIT_Y
        };
        self.cross(&axis).normalize()
    }

    pub fn to_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

// =============================================================================
// QUATERNION (unit quaternions for attitude)
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quaternion {
    pub fn identity() -> Self {
        Self {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    /// Rotation of `angle` radians about `axis` (normalized internally).
    /// A zero axis yields the identity.
    pub fn from_axis_angle(axis: &Vector3, angle: f64) -> Self {
        let axis = axis.normalize();
        if axis.magnitude_squared() == 0.0 {
            return Self::identity();
        }
        let half = 0.5 * angle;
        let s = half.sin();
        Self {
            w: half.cos(),
            x: axis.x * s,
            y: axis.y * s,
            z: axis.z * s,
        }
    }

    /// Shortest-arc rotation taking direction `from` onto direction `to`
    pub fn from_two_vectors(from: &Vector3, to: &Vector3) -> Self {
        let a = from.normalize();
        let b = to.normalize();
        if a.magnitude_squared() == 0.0 || b.magnitude_squared() == 0.0 {
            return Self::identity();
        }

        let d = a.dot(&b);
        if d >= 1.0 - 1e-12 {
            return Self::identity();
        }
        if d <= -1.0 + 1e-12 {
            // Antiparallel: half turn about any perpendicular axis
            return Self::from_axis_angle(&a.any_orthogonal(), std::f64::consts::PI);
        }

        let c = a.cross(&b);
        Self {
            w: 1.0 + d,
            x: c.x,
            y: c.y,
            z: c.z,
        }
        .normalize()
    }

    pub fn norm(&self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn normalize(&self) -> Self {
        let n = self.norm();
        if n > 1e-15 {
            Self {
                w: self.w / n,
                x: self.x / n,
                y: self.y / n,
                z: self.z / n,
            }
        } else {
            Self::identity()
        }
    }

    pub fn conjugate(&self) -> Self {
        Self {
            w: self.w,
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }

    /// Hamilton product `self * other` (apply `other` first, then `self`)
    pub fn mul(&self, other: &Quaternion) -> Quaternion {
        Quaternion {
            w: self.w * other.w - self.x * other.x - self.y * other.y - self.z * other.z,
            x: self.w * other.x + self.x * other.w + self.y * other.z - self.z * other.y,
            y: self.w * other.y - self.x * other.z + self.y * other.w + self.z * other.x,
            z: self.w * other.z + self.x * other.y - self.y * other.x + self.z * other.w,
        }
    }

    /// Rotate a vector by this quaternion
    pub fn rotate(&self, v: &Vector3) -> Vector3 {
        // v' = v + 2w(q × v) + 2q × (q × v)
        let q = Vector3::new(self.x, self.y, self.z);
        let t = q.cross(v).scale(2.0);
        v.add(&t.scale(self.w)).add(&q.cross(&t))
    }

    /// Planar heading (radians from +X) of the body +X axis after rotation
    pub fn heading(&self) -> f64 {
        let forward = self.rotate(&Vector3::UNIT_X);
        forward.y.atan2(forward.x)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn assert_vec_close(a: Vector3, b: Vector3, tol: f64) {
        assert!(
            a.sub(&b).magnitude() < tol,
            "vectors differ: {:?} vs {:?}",
            a,
            b
        );
    }

    #[test]
    fn test_vector3_operations() {
        let v1 = Vector3::new(1.0, 2.0, 3.0);
        let v2 = Vector3::new(4.0, 5.0, 6.0);

        let sum = v1.add(&v2);
        assert!((sum.x - 5.0).abs() < 1e-10);
        assert!((sum.y - 7.0).abs() < 1e-10);
        assert!((sum.z - 9.0).abs() < 1e-10);

        assert!((v1.dot(&v2) - 32.0).abs() < 1e-10);

        let cross = v1.cross(&v2);
        assert_vec_close(cross, Vector3::new(-3.0, 6.0, -3.0), 1e-10);

        assert!((v1.magnitude_squared() - 14.0).abs() < 1e-12);
        assert_vec_close(v1.negate(), Vector3::new(-1.0, -2.0, -3.0), 1e-12);
    }

    #[test]
    fn test_normalize_zero_vector_is_zero() {
        assert_eq!(Vector3::zero().normalize(), Vector3::zero());
    }

    #[test]
    fn test_axis_angle_rotation_about_z() {
        let q = Quaternion::from_axis_angle(&Vector3::UNIT_Z, FRAC_PI_2);
        assert_vec_close(q.rotate(&Vector3::UNIT_X), Vector3::UNIT_Y, 1e-12);
        assert!((q.heading() - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_from_two_vectors_maps_direction() {
        let target = Vector3::new(-3.0, 4.0, 12.0);
        let q = Quaternion::from_two_vectors(&Vector3::UNIT_X, &target);
        assert_vec_close(q.rotate(&Vector3::UNIT_X), target.normalize(), 1e-12);

        // Antiparallel case still produces a valid half turn
        let flip = Quaternion::from_two_vectors(&Vector3::UNIT_X, &Vector3::new(-2.0, 0.0, 0.0));
        assert_vec_close(flip.rotate(&Vector3::UNIT_X), Vector3::new(-1.0, 0.0, 0.0), 1e-12);
    }

    #[test]
    fn test_quaternion_composition_order() {
        let a = Quaternion::from_axis_angle(&Vector3::UNIT_Z, FRAC_PI_2);
        let b = Quaternion::from_axis_angle(&Vector3::UNIT_Z, PI / 4.0);
        let combined = a.mul(&b);
        assert!((combined.heading() - 3.0 * PI / 4.0).abs() < 1e-12);
        assert!((combined.norm() - 1.0).abs() < 1e-12);

        let inverse = a.mul(&a.conjugate());
        assert!((inverse.w - 1.0).abs() < 1e-12);
    }
}
