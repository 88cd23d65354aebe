//! Quaternion value type used for device orientation.
//!
//! Components are stored scalar-first, `(w, x, y, z)`, which is also the order
//! the firmware writes them into the sensor record.

use std::f64::consts::FRAC_1_SQRT_2;
use std::ops::Mul;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// Pure quaternion (w = 0) carrying a 3-vector.
    pub const fn pure(v: [f64; 3]) -> Self {
        Self::new(0.0, v[0], v[1], v[2])
    }

    pub const fn from_array(q: [f64; 4]) -> Self {
        Self::new(q[0], q[1], q[2], q[3])
    }

    pub const fn to_array(self) -> [f64; 4] {
        [self.w, self.x, self.y, self.z]
    }

    /// Vector part `[x, y, z]`.
    pub const fn vector(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Hamilton product `self * rhs`. Not commutative.
    pub fn multiply(self, rhs: Quaternion) -> Quaternion {
        let (a0, a1, a2, a3) = (self.w, self.x, self.y, self.z);
        let (b0, b1, b2, b3) = (rhs.w, rhs.x, rhs.y, rhs.z);
        Quaternion {
            w: a0 * b0 - a1 * b1 - a2 * b2 - a3 * b3,
            x: a0 * b1 + a1 * b0 + a2 * b3 - a3 * b2,
            y: a0 * b2 - a1 * b3 + a2 * b0 + a3 * b1,
            z: a0 * b3 + a1 * b2 - a2 * b1 + a3 * b0,
        }
    }

    pub fn conjugate(self) -> Quaternion {
        Quaternion::new(self.w, -self.x, -self.y, -self.z)
    }

    pub fn norm(self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit quaternion in the same direction, or `None` for a zero quaternion.
    pub fn normalized(self) -> Option<Quaternion> {
        let n = self.norm();
        if n == 0.0 || !n.is_finite() {
            return None;
        }
        Some(Quaternion::new(self.w / n, self.x / n, self.y / n, self.z / n))
    }

    /// Sandwich product `self * v * conj(self)`.
    ///
    /// `v` should be a pure quaternion and `self` unit-norm; neither is checked.
    pub fn rotate(self, v: Quaternion) -> Quaternion {
        self.multiply(v).multiply(self.conjugate())
    }

    pub fn rotate_vector(self, v: [f64; 3]) -> [f64; 3] {
        self.rotate(Quaternion::pure(v)).vector()
    }

    /// Euler angles `[roll, pitch, yaw]` in degrees, aerospace ZYX order.
    ///
    ///   roll  = atan2(2(wx + yz), 1 - 2(x² + y²))
    ///   pitch = asin(2(wy - zx))
    ///   yaw   = atan2(2(wz + xy), 1 - 2(y² + z²))
    pub fn to_euler_deg(self) -> [f64; 3] {
        let Quaternion { w, x, y, z } = self;
        let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
        let pitch = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0).asin();
        let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));
        [roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees()]
    }

    /// 3x3 row-major rotation matrix. Assumes a unit quaternion.
    #[rustfmt::skip]
    pub fn to_rotation_matrix(self) -> [[f64; 3]; 3] {
        let Quaternion { w, x, y, z } = self;
        [
            [1.0 - 2.0*(y*y + z*z), 2.0*(x*y - z*w),       2.0*(x*z + y*w)],
            [2.0*(x*y + z*w),       1.0 - 2.0*(x*x + z*z), 2.0*(y*z - x*w)],
            [2.0*(x*z - y*w),       2.0*(y*z + x*w),       1.0 - 2.0*(x*x + y*y)],
        ]
    }
}

impl Mul for Quaternion {
    type Output = Quaternion;

    fn mul(self, rhs: Quaternion) -> Quaternion {
        self.multiply(rhs)
    }
}

impl From<[f64; 4]> for Quaternion {
    fn from(q: [f64; 4]) -> Self {
        Self::from_array(q)
    }
}

/// Remap from the board frame to a display frame with z up, y right and x
/// towards the viewer.
pub fn display_frame() -> Quaternion {
    let h = FRAC_1_SQRT_2;
    Quaternion::new(h, 0.0, h, 0.0) * Quaternion::new(-h, h, 0.0, 0.0)
}

/// Forward axis and up vector of the board in the display frame.
///
/// The board's reference axis is +x and its up vector +y.
pub fn display_axes(orientation: Quaternion) -> ([f64; 3], [f64; 3]) {
    let r = display_frame() * orientation;
    (r.rotate_vector([1.0, 0.0, 0.0]), r.rotate_vector([0.0, 1.0, 0.0]))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    fn assert_close(a: Quaternion, b: Quaternion, eps: f64) {
        for (x, y) in a.to_array().iter().zip(b.to_array().iter()) {
            assert!((x - y).abs() < eps, "{:?} != {:?}", a, b);
        }
    }

    fn samples() -> Vec<Quaternion> {
        [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.39, 0.0, 0.0, -0.92],
            [0.5, 0.5, 0.5, 0.5],
            [0.1, -0.7, 0.3, 0.2],
            [-0.994, 0.050, 0.097, -0.041],
            [0.3, 0.3, -0.3, 0.9],
        ]
        .iter()
        .map(|q| Quaternion::from_array(*q).normalized().unwrap())
        .collect()
    }

    #[test]
    fn test_identity_is_neutral() {
        for q in samples() {
            assert_close(Quaternion::IDENTITY * q, q, EPS);
            assert_close(q * Quaternion::IDENTITY, q, EPS);
        }
    }

    #[test]
    fn test_multiply_not_commutative() {
        let i = Quaternion::new(0.0, 1.0, 0.0, 0.0);
        let j = Quaternion::new(0.0, 0.0, 1.0, 0.0);
        assert_eq!(i * j, Quaternion::new(0.0, 0.0, 0.0, 1.0));
        assert_eq!(j * i, Quaternion::new(0.0, 0.0, 0.0, -1.0));
    }

    #[test]
    fn test_conjugate_involution() {
        for q in samples() {
            assert_eq!(q.conjugate().conjugate(), q);
        }
        let q = Quaternion::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(q.conjugate(), Quaternion::new(1.0, -2.0, -3.0, -4.0));
    }

    #[test]
    fn test_norm_is_multiplicative() {
        let qs = samples();
        for a in &qs {
            for b in &qs {
                let lhs = (*a * *b).norm();
                let rhs = a.norm() * b.norm();
                assert!((lhs - rhs).abs() < 1e-9);
            }
        }
        assert!((Quaternion::new(1.0, 2.0, 3.0, 4.0).norm() - 30f64.sqrt()).abs() < EPS);
    }

    #[test]
    fn test_rotate_identity_keeps_vector() {
        for v in [[1.0, 0.0, 0.0], [0.0, -2.5, 7.0], [3.0, 4.0, 5.0]] {
            let p = Quaternion::pure(v);
            assert_close(Quaternion::IDENTITY.rotate(p), p, EPS);
        }
    }

    #[test]
    fn test_rotate_quarter_turn_about_z() {
        let q = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let v = q.rotate_vector([1.0, 0.0, 0.0]);
        assert!(v[0].abs() < EPS);
        assert!((v[1] - 1.0).abs() < EPS);
        assert!(v[2].abs() < EPS);
    }

    #[test]
    fn test_nan_propagates() {
        let q = Quaternion::new(f64::NAN, 0.0, 0.0, 0.0);
        assert!((q * Quaternion::IDENTITY).w.is_nan());
        assert!(q.norm().is_nan());
        assert!(q.normalized().is_none());
    }

    #[test]
    fn test_normalized_zero() {
        assert!(Quaternion::new(0.0, 0.0, 0.0, 0.0).normalized().is_none());
        let q = Quaternion::new(2.0, 0.0, 0.0, 0.0).normalized().unwrap();
        assert_eq!(q, Quaternion::IDENTITY);
    }

    #[test]
    fn test_euler_identity() {
        let euler = Quaternion::IDENTITY.to_euler_deg();
        assert!(euler[0].abs() < 1e-10);
        assert!(euler[1].abs() < 1e-10);
        assert!(euler[2].abs() < 1e-10);
    }

    #[test]
    fn test_euler_yaw_quarter_turn() {
        let q = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let euler = q.to_euler_deg();
        assert!(euler[0].abs() < 1e-9);
        assert!(euler[1].abs() < 1e-9);
        assert!((euler[2] - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_rotation_matrix_matches_rotate() {
        for q in samples() {
            let m = q.to_rotation_matrix();
            let v = [0.3, -1.2, 2.0];
            let expected = q.rotate_vector(v);
            for row in 0..3 {
                let got = m[row][0] * v[0] + m[row][1] * v[1] + m[row][2] * v[2];
                assert!((got - expected[row]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_display_frame_is_unit() {
        assert!((display_frame().norm() - 1.0).abs() < EPS);
        let (axis, up) = display_axes(Quaternion::IDENTITY);
        let dot = axis[0] * up[0] + axis[1] * up[1] + axis[2] * up[2];
        assert!(dot.abs() < EPS);
    }
}
