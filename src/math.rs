//! 2D Math Primitives
//!
//! Small `Copy` value types used by every stage of the pipeline. All
//! transcendental functions route through `libm`, so results do not depend on
//! the host platform's math library and the module works under `no_std`.
//!
//! # Types
//!
//! - `Vec2` / `Vec3`: vectors with operator overloads
//! - `Rot`: rotation stored as a sine/cosine pair
//! - `Mat22` / `Mat33`: column-major matrices with singular-safe solves
//! - `Transform`: translation + rotation
//! - `Sweep`: interpolated pose over one time step, used by the TOI pass

use core::ops::{Add, AddAssign, Index, IndexMut, Mul, MulAssign, Neg, Sub, SubAssign};

/// Machine epsilon used by the solver tolerances
pub const EPSILON: f32 = f32::EPSILON;

/// Pi as f32
pub const PI: f32 = core::f32::consts::PI;

// ============================================================================
// Scalar helpers
// ============================================================================

/// Square root (libm)
#[inline]
#[must_use]
pub fn sqrt(x: f32) -> f32 {
    libm::sqrtf(x)
}

/// Sine (libm)
#[inline]
#[must_use]
pub fn sin(x: f32) -> f32 {
    libm::sinf(x)
}

/// Cosine (libm)
#[inline]
#[must_use]
pub fn cos(x: f32) -> f32 {
    libm::cosf(x)
}

/// Two-argument arctangent (libm)
#[inline]
#[must_use]
pub fn atan2(y: f32, x: f32) -> f32 {
    libm::atan2f(y, x)
}

/// Absolute value (libm)
#[inline]
#[must_use]
pub fn abs(x: f32) -> f32 {
    libm::fabsf(x)
}

/// Floor (libm)
#[inline]
#[must_use]
pub fn floor(x: f32) -> f32 {
    libm::floorf(x)
}

/// Clamp `a` into `[low, high]`
#[inline]
#[must_use]
pub fn clamp(a: f32, low: f32, high: f32) -> f32 {
    a.max(low).min(high)
}

/// True when `x` is neither NaN nor infinite
#[inline]
#[must_use]
pub fn is_valid(x: f32) -> bool {
    x.is_finite()
}

// ============================================================================
// Vec2
// ============================================================================

/// 2D column vector
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec2 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
}

impl Vec2 {
    /// Zero vector
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };
    /// Unit X
    pub const UNIT_X: Self = Self { x: 1.0, y: 0.0 };
    /// Unit Y
    pub const UNIT_Y: Self = Self { x: 0.0, y: 1.0 };

    /// Create a new vector
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Dot product
    #[inline]
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// 2D cross product (scalar z of the 3D cross)
    #[inline]
    #[must_use]
    pub fn cross(self, other: Self) -> f32 {
        self.x * other.y - self.y * other.x
    }

    /// `self x s` (vector crossed with an out-of-plane scalar)
    #[inline]
    #[must_use]
    pub fn cross_scalar(self, s: f32) -> Self {
        Self::new(s * self.y, -s * self.x)
    }

    /// `s x v` (out-of-plane scalar crossed with a vector)
    #[inline]
    #[must_use]
    pub fn scalar_cross(s: f32, v: Self) -> Self {
        Self::new(-s * v.y, s * v.x)
    }

    /// Euclidean length
    #[inline]
    #[must_use]
    pub fn length(self) -> f32 {
        sqrt(self.x * self.x + self.y * self.y)
    }

    /// Squared length
    #[inline]
    #[must_use]
    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    /// Normalize in place, returning the previous length.
    ///
    /// Vectors shorter than `EPSILON` are left untouched and `0.0` is returned.
    pub fn normalize(&mut self) -> f32 {
        let length = self.length();
        if length < EPSILON {
            return 0.0;
        }
        let inv = 1.0 / length;
        self.x *= inv;
        self.y *= inv;
        length
    }

    /// Normalized copy (zero vector stays zero)
    #[inline]
    #[must_use]
    pub fn normalized(self) -> Self {
        let mut v = self;
        v.normalize();
        v
    }

    /// Counter-clockwise perpendicular `(-y, x)`
    #[inline]
    #[must_use]
    pub fn skew(self) -> Self {
        Self::new(-self.y, self.x)
    }

    /// Component-wise absolute value
    #[inline]
    #[must_use]
    pub fn abs(self) -> Self {
        Self::new(abs(self.x), abs(self.y))
    }

    /// Component-wise minimum
    #[inline]
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y))
    }

    /// Component-wise maximum
    #[inline]
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y))
    }

    /// Distance between two points
    #[inline]
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }

    /// Squared distance between two points
    #[inline]
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f32 {
        (self - other).length_squared()
    }

    /// True when both components are finite
    #[inline]
    #[must_use]
    pub fn is_valid(self) -> bool {
        is_valid(self.x) && is_valid(self.y)
    }
}

impl Add for Vec2 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for Vec2 {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;
    #[inline]
    fn mul(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s)
    }
}

impl Mul<Vec2> for f32 {
    type Output = Vec2;
    #[inline]
    fn mul(self, v: Vec2) -> Vec2 {
        Vec2::new(self * v.x, self * v.y)
    }
}

impl AddAssign for Vec2 {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl SubAssign for Vec2 {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl MulAssign<f32> for Vec2 {
    #[inline]
    fn mul_assign(&mut self, s: f32) {
        self.x *= s;
        self.y *= s;
    }
}

impl Index<usize> for Vec2 {
    type Output = f32;
    #[inline]
    fn index(&self, i: usize) -> &f32 {
        match i {
            0 => &self.x,
            _ => &self.y,
        }
    }
}

impl IndexMut<usize> for Vec2 {
    #[inline]
    fn index_mut(&mut self, i: usize) -> &mut f32 {
        match i {
            0 => &mut self.x,
            _ => &mut self.y,
        }
    }
}

// ============================================================================
// Vec3
// ============================================================================

/// 3D vector, used by the 3x3 joint constraint blocks
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// Zero vector
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };

    /// Create a new vector
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Dot product
    #[inline]
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Cross product
    #[inline]
    #[must_use]
    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }
}

impl Add for Vec3 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;
    #[inline]
    fn mul(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }
}

impl AddAssign for Vec3 {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

// ============================================================================
// Rot
// ============================================================================

/// Rotation stored as sine and cosine of the angle
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rot {
    /// Sine
    pub s: f32,
    /// Cosine
    pub c: f32,
}

impl Default for Rot {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Rot {
    /// Identity rotation
    pub const IDENTITY: Self = Self { s: 0.0, c: 1.0 };

    /// Rotation from an angle in radians
    #[inline]
    #[must_use]
    pub fn new(angle: f32) -> Self {
        Self {
            s: sin(angle),
            c: cos(angle),
        }
    }

    /// Angle in radians
    #[inline]
    #[must_use]
    pub fn angle(self) -> f32 {
        atan2(self.s, self.c)
    }

    /// Rotated x-axis
    #[inline]
    #[must_use]
    pub fn x_axis(self) -> Vec2 {
        Vec2::new(self.c, self.s)
    }

    /// Rotated y-axis
    #[inline]
    #[must_use]
    pub fn y_axis(self) -> Vec2 {
        Vec2::new(-self.s, self.c)
    }

    /// Rotate a vector
    #[inline]
    #[must_use]
    pub fn mul_vec(self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x - self.s * v.y, self.s * v.x + self.c * v.y)
    }

    /// Inverse-rotate a vector
    #[inline]
    #[must_use]
    pub fn mul_t_vec(self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x + self.s * v.y, -self.s * v.x + self.c * v.y)
    }

    /// Compose two rotations: `self * other`
    #[inline]
    #[must_use]
    pub fn mul(self, other: Self) -> Self {
        Self {
            s: self.s * other.c + self.c * other.s,
            c: self.c * other.c - self.s * other.s,
        }
    }

    /// Relative rotation: `transpose(self) * other`
    #[inline]
    #[must_use]
    pub fn mul_t(self, other: Self) -> Self {
        Self {
            s: self.c * other.s - self.s * other.c,
            c: self.c * other.c + self.s * other.s,
        }
    }
}

// ============================================================================
// Mat22
// ============================================================================

/// 2x2 matrix stored column-major
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Mat22 {
    /// First column
    pub ex: Vec2,
    /// Second column
    pub ey: Vec2,
}

impl Mat22 {
    /// Build from two columns
    #[inline]
    #[must_use]
    pub const fn new(ex: Vec2, ey: Vec2) -> Self {
        Self { ex, ey }
    }

    /// Identity matrix
    #[inline]
    #[must_use]
    pub const fn identity() -> Self {
        Self::new(Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0))
    }

    /// Multiply by a vector
    #[inline]
    #[must_use]
    pub fn mul_vec(&self, v: Vec2) -> Vec2 {
        Vec2::new(
            self.ex.x * v.x + self.ey.x * v.y,
            self.ex.y * v.x + self.ey.y * v.y,
        )
    }

    /// Determinant
    #[inline]
    #[must_use]
    pub fn determinant(&self) -> f32 {
        self.ex.x * self.ey.y - self.ey.x * self.ex.y
    }

    /// Inverse. A singular matrix yields the zero matrix.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let (a, b, c, d) = (self.ex.x, self.ey.x, self.ex.y, self.ey.y);
        let mut det = a * d - b * c;
        if det != 0.0 {
            det = 1.0 / det;
        }
        Self::new(Vec2::new(det * d, -det * c), Vec2::new(-det * b, det * a))
    }

    /// Solve `A * x = b`. A singular matrix yields the zero vector.
    #[must_use]
    pub fn solve(&self, b: Vec2) -> Vec2 {
        let (a11, a12, a21, a22) = (self.ex.x, self.ey.x, self.ex.y, self.ey.y);
        let mut det = a11 * a22 - a12 * a21;
        if det != 0.0 {
            det = 1.0 / det;
        }
        Vec2::new(det * (a22 * b.x - a12 * b.y), det * (a11 * b.y - a21 * b.x))
    }
}

// ============================================================================
// Mat33
// ============================================================================

/// 3x3 matrix stored column-major
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Mat33 {
    /// First column
    pub ex: Vec3,
    /// Second column
    pub ey: Vec3,
    /// Third column
    pub ez: Vec3,
}

impl Mat33 {
    /// Build from three columns
    #[inline]
    #[must_use]
    pub const fn new(ex: Vec3, ey: Vec3, ez: Vec3) -> Self {
        Self { ex, ey, ez }
    }

    /// Multiply by a vector
    #[inline]
    #[must_use]
    pub fn mul_vec(&self, v: Vec3) -> Vec3 {
        self.ex * v.x + self.ey * v.y + self.ez * v.z
    }

    /// Multiply the upper 2x2 block by a vector
    #[inline]
    #[must_use]
    pub fn mul_vec22(&self, v: Vec2) -> Vec2 {
        Vec2::new(
            self.ex.x * v.x + self.ey.x * v.y,
            self.ex.y * v.x + self.ey.y * v.y,
        )
    }

    /// Solve `A * x = b` with the full 3x3 matrix. Singular yields zero.
    #[must_use]
    pub fn solve33(&self, b: Vec3) -> Vec3 {
        let mut det = self.ex.dot(self.ey.cross(self.ez));
        if det != 0.0 {
            det = 1.0 / det;
        }
        Vec3::new(
            det * b.dot(self.ey.cross(self.ez)),
            det * self.ex.dot(b.cross(self.ez)),
            det * self.ex.dot(self.ey.cross(b)),
        )
    }

    /// Solve with the upper 2x2 block only. Singular yields zero.
    #[must_use]
    pub fn solve22(&self, b: Vec2) -> Vec2 {
        let (a11, a12, a21, a22) = (self.ex.x, self.ey.x, self.ex.y, self.ey.y);
        let mut det = a11 * a22 - a12 * a21;
        if det != 0.0 {
            det = 1.0 / det;
        }
        Vec2::new(det * (a22 * b.x - a12 * b.y), det * (a11 * b.y - a21 * b.x))
    }

    /// Inverse of the upper 2x2 block embedded in a 3x3 (third row/column zero)
    #[must_use]
    pub fn get_inverse22(&self) -> Self {
        let (a, b, c, d) = (self.ex.x, self.ey.x, self.ex.y, self.ey.y);
        let mut det = a * d - b * c;
        if det != 0.0 {
            det = 1.0 / det;
        }
        Self::new(
            Vec3::new(det * d, -det * c, 0.0),
            Vec3::new(-det * b, det * a, 0.0),
            Vec3::ZERO,
        )
    }

    /// Inverse of a symmetric 3x3 matrix. Singular yields zero.
    #[must_use]
    pub fn get_sym_inverse33(&self) -> Self {
        let mut det = self.ex.dot(self.ey.cross(self.ez));
        if det != 0.0 {
            det = 1.0 / det;
        }

        let (a11, a12, a13) = (self.ex.x, self.ey.x, self.ez.x);
        let (a22, a23) = (self.ey.y, self.ez.y);
        let a33 = self.ez.z;

        let m11 = det * (a22 * a33 - a23 * a23);
        let m12 = det * (a13 * a23 - a12 * a33);
        let m13 = det * (a12 * a23 - a13 * a22);
        let m22 = det * (a11 * a33 - a13 * a13);
        let m23 = det * (a13 * a12 - a11 * a23);
        let m33 = det * (a11 * a22 - a12 * a12);

        Self::new(
            Vec3::new(m11, m12, m13),
            Vec3::new(m12, m22, m23),
            Vec3::new(m13, m23, m33),
        )
    }
}

// ============================================================================
// Transform
// ============================================================================

/// Rigid transform: translation followed by rotation
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Transform {
    /// Translation
    pub p: Vec2,
    /// Rotation
    pub q: Rot,
}

impl Transform {
    /// Identity transform
    pub const IDENTITY: Self = Self {
        p: Vec2::ZERO,
        q: Rot::IDENTITY,
    };

    /// Build from a position and an angle
    #[inline]
    #[must_use]
    pub fn new(p: Vec2, angle: f32) -> Self {
        Self { p, q: Rot::new(angle) }
    }

    /// Transform a point
    #[inline]
    #[must_use]
    pub fn mul_vec(&self, v: Vec2) -> Vec2 {
        Vec2::new(
            self.q.c * v.x - self.q.s * v.y + self.p.x,
            self.q.s * v.x + self.q.c * v.y + self.p.y,
        )
    }

    /// Inverse-transform a point
    #[inline]
    #[must_use]
    pub fn mul_t_vec(&self, v: Vec2) -> Vec2 {
        let px = v.x - self.p.x;
        let py = v.y - self.p.y;
        Vec2::new(self.q.c * px + self.q.s * py, -self.q.s * px + self.q.c * py)
    }

    /// Compose: `self * other`
    #[inline]
    #[must_use]
    pub fn mul(&self, other: &Self) -> Self {
        Self {
            q: self.q.mul(other.q),
            p: self.q.mul_vec(other.p) + self.p,
        }
    }

    /// Relative transform: `inverse(self) * other`
    #[inline]
    #[must_use]
    pub fn mul_t(&self, other: &Self) -> Self {
        Self {
            q: self.q.mul_t(other.q),
            p: self.q.mul_t_vec(other.p - self.p),
        }
    }
}

// ============================================================================
// Sweep
// ============================================================================

/// Motion of a body over one time step.
///
/// `c0, a0` is the pose at `alpha0`, `c, a` the pose at the end of the step.
/// Poses in between are linearly interpolated.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Sweep {
    /// Center of mass in body space
    pub local_center: Vec2,
    /// World center at `alpha0`
    pub c0: Vec2,
    /// World center at the end of the step
    pub c: Vec2,
    /// Angle at `alpha0`
    pub a0: f32,
    /// Angle at the end of the step
    pub a: f32,
    /// Fraction of the current step already consumed, in `[0, 1)`
    pub alpha0: f32,
}

impl Sweep {
    /// Interpolated transform at `beta` in `[0, 1]`.
    ///
    /// `beta = 0` yields exactly the pose at `c0, a0` and `beta = 1` the pose
    /// at `c, a`.
    #[must_use]
    pub fn get_transform(&self, beta: f32) -> Transform {
        let (center, angle) = if beta == 0.0 {
            (self.c0, self.a0)
        } else if beta == 1.0 {
            (self.c, self.a)
        } else {
            (
                self.c0 * (1.0 - beta) + self.c * beta,
                (1.0 - beta) * self.a0 + beta * self.a,
            )
        };
        let q = Rot::new(angle);
        Transform {
            p: center - q.mul_vec(self.local_center),
            q,
        }
    }

    /// Advance the start of the sweep to `alpha`, keeping the end pose.
    pub fn advance(&mut self, alpha: f32) {
        debug_assert!(self.alpha0 < 1.0);
        let beta = (alpha - self.alpha0) / (1.0 - self.alpha0);
        self.c0 += (self.c - self.c0) * beta;
        self.a0 += beta * (self.a - self.a0);
        self.alpha0 = alpha;
    }

    /// Wrap the angles into `[-pi, pi]` relative to `a0`.
    pub fn normalize(&mut self) {
        let two_pi = 2.0 * PI;
        let d = two_pi * floor(self.a0 / two_pi);
        self.a0 -= d;
        self.a -= d;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        abs(a - b) < 1e-5
    }

    #[test]
    fn test_vec2_cross_helpers() {
        let v = Vec2::new(2.0, 3.0);
        assert_eq!(v.cross_scalar(1.0), Vec2::new(3.0, -2.0));
        assert_eq!(Vec2::scalar_cross(1.0, v), Vec2::new(-3.0, 2.0));
        assert!(close(v.cross(Vec2::UNIT_X), -3.0));
    }

    #[test]
    fn test_normalize_short_vector() {
        let mut v = Vec2::new(1e-9, 0.0);
        assert_eq!(v.normalize(), 0.0);
        let mut w = Vec2::new(3.0, 4.0);
        assert!(close(w.normalize(), 5.0));
        assert!(close(w.length(), 1.0));
    }

    #[test]
    fn test_rot_roundtrip() {
        let q = Rot::new(0.7);
        let v = Vec2::new(1.5, -2.0);
        let back = q.mul_t_vec(q.mul_vec(v));
        assert!(close(back.x, v.x) && close(back.y, v.y));
        assert!(close(q.angle(), 0.7));
    }

    #[test]
    fn test_mat22_singular_solve_is_zero() {
        let m = Mat22::new(Vec2::new(1.0, 2.0), Vec2::new(2.0, 4.0));
        assert_eq!(m.solve(Vec2::new(1.0, 1.0)), Vec2::ZERO);
        assert_eq!(m.inverse(), Mat22::new(Vec2::ZERO, Vec2::ZERO));
    }

    #[test]
    fn test_mat22_solve() {
        let m = Mat22::new(Vec2::new(2.0, 0.0), Vec2::new(0.0, 4.0));
        let x = m.solve(Vec2::new(2.0, 2.0));
        assert!(close(x.x, 1.0) && close(x.y, 0.5));
    }

    #[test]
    fn test_mat33_solve33() {
        let m = Mat33::new(
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(0.0, 3.0, 0.0),
            Vec3::new(0.0, 0.0, 4.0),
        );
        let x = m.solve33(Vec3::new(2.0, 3.0, 4.0));
        assert!(close(x.x, 1.0) && close(x.y, 1.0) && close(x.z, 1.0));
        let inv = m.get_sym_inverse33();
        assert!(close(inv.ez.z, 0.25));
    }

    #[test]
    fn test_transform_mul_t_inverse() {
        let a = Transform::new(Vec2::new(1.0, 2.0), 0.3);
        let b = Transform::new(Vec2::new(-4.0, 0.5), -1.2);
        let rel = a.mul_t(&b);
        let back = a.mul(&rel);
        assert!(close(back.p.x, b.p.x) && close(back.p.y, b.p.y));
        assert!(close(back.q.angle(), b.q.angle()));
    }

    #[test]
    fn test_sweep_endpoints_exact() {
        let sweep = Sweep {
            local_center: Vec2::new(0.25, -0.5),
            c0: Vec2::new(1.0, 2.0),
            c: Vec2::new(3.0, -1.0),
            a0: 0.1,
            a: 0.9,
            alpha0: 0.0,
        };
        let xf0 = sweep.get_transform(0.0);
        let q0 = Rot::new(0.1);
        assert_eq!(xf0.q, q0);
        assert_eq!(xf0.p, sweep.c0 - q0.mul_vec(sweep.local_center));

        let xf1 = sweep.get_transform(1.0);
        let q1 = Rot::new(0.9);
        assert_eq!(xf1.q, q1);
        assert_eq!(xf1.p, sweep.c - q1.mul_vec(sweep.local_center));
    }

    #[test]
    fn test_sweep_advance() {
        let mut sweep = Sweep {
            local_center: Vec2::ZERO,
            c0: Vec2::ZERO,
            c: Vec2::new(10.0, 0.0),
            a0: 0.0,
            a: 1.0,
            alpha0: 0.0,
        };
        sweep.advance(0.5);
        assert!(close(sweep.c0.x, 5.0));
        assert!(close(sweep.a0, 0.5));
        assert!(close(sweep.alpha0, 0.5));
        assert_eq!(sweep.c, Vec2::new(10.0, 0.0));
    }

    #[test]
    fn test_sweep_normalize() {
        let mut sweep = Sweep {
            a0: 7.0,
            a: 7.5,
            ..Sweep::default()
        };
        sweep.normalize();
        assert!(sweep.a0 >= 0.0 && sweep.a0 < 2.0 * PI);
        assert!(close(sweep.a - sweep.a0, 0.5));
    }
}
