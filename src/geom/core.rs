//! Vectors, points, boxes and tolerances shared by every kernel module.

use std::ops::{Add, Div, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Shared `x, y, z` plumbing for [`Vec3`] and [`Point3`].
macro_rules! xyz_type {
    ($name:ident) => {
        impl $name {
            #[must_use]
            pub const fn new(x: f64, y: f64, z: f64) -> Self {
                Self { x, y, z }
            }

            #[must_use]
            pub const fn from_array([x, y, z]: [f64; 3]) -> Self {
                Self { x, y, z }
            }

            #[must_use]
            pub const fn to_array(self) -> [f64; 3] {
                [self.x, self.y, self.z]
            }

            /// Component along `axis` (0 = x, 1 = y, anything else = z).
            #[must_use]
            pub const fn coord(self, axis: u8) -> f64 {
                match axis {
                    0 => self.x,
                    1 => self.y,
                    _ => self.z,
                }
            }

            #[must_use]
            pub fn is_finite(self) -> bool {
                self.to_array().iter().all(|c| c.is_finite())
            }

            fn zip(self, o: Self, f: fn(f64, f64) -> f64) -> Self {
                Self::new(f(self.x, o.x), f(self.y, o.y), f(self.z, o.z))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new(0.0, 0.0, 0.0)
            }
        }

        impl From<[f64; 3]> for $name {
            fn from(arr: [f64; 3]) -> Self {
                Self::from_array(arr)
            }
        }

        impl From<$name> for [f64; 3] {
            fn from(v: $name) -> Self {
                v.to_array()
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

xyz_type!(Vec3);

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    pub const X: Self = Self::new(1.0, 0.0, 0.0);
    pub const Y: Self = Self::new(0.0, 1.0, 0.0);
    pub const Z: Self = Self::new(0.0, 0.0, 1.0);

    #[must_use]
    pub const fn dot(self, rhs: Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    #[must_use]
    pub const fn length_squared(self) -> f64 {
        self.dot(self)
    }

    #[must_use]
    pub fn length(self) -> f64 {
        self.length_squared().sqrt()
    }

    #[must_use]
    pub const fn cross(self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    /// Unit vector, or `None` for zero and non-finite input.
    #[must_use]
    pub fn normalized(self) -> Option<Self> {
        let len = self.length();
        (len.is_finite() && len > 0.0).then(|| self.mul_scalar(len.recip()))
    }

    #[must_use]
    pub const fn mul_scalar(self, s: f64) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }

    #[must_use]
    pub fn add(self, rhs: Self) -> Self {
        self.zip(rhs, |a, b| a + b)
    }

    #[must_use]
    pub fn sub(self, rhs: Self) -> Self {
        self.zip(rhs, |a, b| a - b)
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Vec3::add(self, rhs)
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Vec3::sub(self, rhs)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        self.mul_scalar(rhs)
    }
}

impl Mul<Vec3> for f64 {
    type Output = Vec3;
    fn mul(self, rhs: Vec3) -> Vec3 {
        rhs.mul_scalar(self)
    }
}

impl Div<f64> for Vec3 {
    type Output = Self;
    fn div(self, rhs: f64) -> Self {
        self.mul_scalar(rhs.recip())
    }
}

impl Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        self.mul_scalar(-1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

xyz_type!(Point3);

impl Point3 {
    pub const ORIGIN: Self = Self::new(0.0, 0.0, 0.0);

    /// Position vector from the origin.
    #[must_use]
    pub const fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    #[must_use]
    pub const fn add_vec(self, v: Vec3) -> Self {
        Self::new(self.x + v.x, self.y + v.y, self.z + v.z)
    }

    /// `self - rhs` as a displacement.
    #[must_use]
    pub const fn sub_point(self, rhs: Self) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    #[must_use]
    pub fn distance_to(self, other: Self) -> f64 {
        self.sub_point(other).length()
    }

    #[must_use]
    pub const fn distance_squared_to(self, other: Self) -> f64 {
        self.sub_point(other).length_squared()
    }
}

impl From<Vec3> for Point3 {
    fn from(v: Vec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl From<Point3> for Vec3 {
    fn from(p: Point3) -> Self {
        p.to_vec3()
    }
}

impl Add<Vec3> for Point3 {
    type Output = Self;
    fn add(self, rhs: Vec3) -> Self {
        self.add_vec(rhs)
    }
}

impl Sub for Point3 {
    type Output = Vec3;
    fn sub(self, rhs: Self) -> Vec3 {
        self.sub_point(rhs)
    }
}

/// Axis-aligned box. All predicates are inclusive: touching boxes overlap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min: Point3,
    pub max: Point3,
}

impl BBox {
    #[must_use]
    pub const fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    /// Box spanned by two opposite corners in any order.
    #[must_use]
    pub fn from_corners(a: Point3, b: Point3) -> Self {
        Self::new(a.zip(b, f64::min), a.zip(b, f64::max))
    }

    #[must_use]
    pub fn from_points(points: &[Point3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        Some(rest.iter().fold(Self::new(*first, *first), |b, &p| b.expand_point(p)))
    }

    #[must_use]
    pub const fn size(self) -> Vec3 {
        self.max.sub_point(self.min)
    }

    #[must_use]
    pub fn contains_point(self, p: Point3) -> bool {
        (0..3).all(|axis| self.min.coord(axis) <= p.coord(axis) && p.coord(axis) <= self.max.coord(axis))
    }

    /// Overlap on all three axes.
    #[must_use]
    pub fn intersects(self, other: Self) -> bool {
        (0..3).all(|axis| {
            self.min.coord(axis) <= other.max.coord(axis) && other.min.coord(axis) <= self.max.coord(axis)
        })
    }

    /// Common region, possibly flat when the boxes only touch.
    #[must_use]
    pub fn intersection(self, other: Self) -> Option<Self> {
        self.intersects(other)
            .then(|| Self::new(self.min.zip(other.min, f64::max), self.max.zip(other.max, f64::min)))
    }

    #[must_use]
    pub fn expand_point(self, p: Point3) -> Self {
        Self::new(self.min.zip(p, f64::min), self.max.zip(p, f64::max))
    }

    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self::new(self.min.zip(other.min, f64::min), self.max.zip(other.max, f64::max))
    }
}

/// Absolute comparison threshold.
///
/// The named constants are the thresholds the kernel uses internally; pick the
/// one matching the quantity being compared.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub eps: f64,
}

impl Tolerance {
    /// General point and length comparisons.
    pub const DEFAULT: Self = Self::new(1e-9);
    /// Zero-length vectors and collapsed edges.
    pub const ZERO_LENGTH: Self = Self::new(1e-12);
    /// Relative finite-difference step.
    pub const DERIVATIVE: Self = Self::new(1e-6);
    /// Gap at which an intersection seed is accepted.
    pub const INTERSECTION: Self = Self::new(1e-6);
    /// Gap every marched intersection point is refined to.
    pub const REFINE: Self = Self::new(1e-8);
    /// `|n1 x n2|` below which two surfaces count as tangent.
    pub const TANGENCY: Self = Self::new(1e-10);

    #[must_use]
    pub const fn new(eps: f64) -> Self {
        Self { eps }
    }

    #[must_use]
    pub const fn default_geom() -> Self {
        Self::DEFAULT
    }

    /// `eps` scaled by a domain span.
    #[must_use]
    pub fn relative_to(self, span: f64) -> f64 {
        self.eps * span.abs()
    }

    #[must_use]
    pub fn approx_eq_f64(self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.eps
    }

    #[must_use]
    pub fn approx_eq_point3(self, a: Point3, b: Point3) -> bool {
        self.is_zero_vec3(a.sub_point(b))
    }

    #[must_use]
    pub fn approx_eq_vec3(self, a: Vec3, b: Vec3) -> bool {
        self.is_zero_vec3(a.sub(b))
    }

    #[must_use]
    pub fn is_zero_vec3(self, v: Vec3) -> bool {
        v.length_squared() <= self.eps * self.eps
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cross_follows_right_hand_rule() {
        assert_eq!(Vec3::X.cross(Vec3::Y), Vec3::Z);
        assert_eq!(Vec3::Y.cross(Vec3::X), -Vec3::Z);
        assert_eq!(Vec3::new(3.0, 0.0, 4.0).length(), 5.0);
        assert_eq!(Vec3::ZERO.normalized(), None);
        assert_eq!(Vec3::new(f64::NAN, 0.0, 0.0).normalized(), None);
    }

    #[test]
    fn test_point_displacements() {
        let a = Point3::new(1.0, 2.0, 3.0);
        let b = Point3::new(4.0, 6.0, 3.0);
        assert_eq!(b - a, Vec3::new(3.0, 4.0, 0.0));
        assert_eq!(a + Vec3::new(3.0, 4.0, 0.0), b);
        assert_eq!(a.distance_to(b), 5.0);
        assert_eq!(a.distance_squared_to(b), 25.0);
        assert_eq!((a.coord(0), a.coord(1), a.coord(2)), (1.0, 2.0, 3.0));
        assert!(!Point3::new(0.0, f64::INFINITY, 0.0).is_finite());
    }

    #[test]
    fn test_touching_boxes_intersect_in_a_face() {
        let a = BBox::new(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 10.0));
        let b = BBox::new(Point3::new(10.0, 2.0, 2.0), Point3::new(12.0, 4.0, 4.0));
        let face = a.intersection(b).unwrap();
        assert_eq!(face.min, Point3::new(10.0, 2.0, 2.0));
        assert_eq!(face.max, Point3::new(10.0, 4.0, 4.0));
        assert_eq!(face.size().x, 0.0);
    }

    #[test]
    fn test_boxes_separated_on_one_axis() {
        let a = BBox::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let b = BBox::new(Point3::new(0.5, 0.5, 1.5), Point3::new(2.0, 2.0, 2.0));
        assert!(!a.intersects(b));
        assert_eq!(a.intersection(b), None);
    }

    #[test]
    fn test_box_construction() {
        let unit = BBox::new(Point3::ORIGIN, Point3::new(1.0, 1.0, 1.0));
        assert_eq!(
            BBox::from_corners(Point3::new(1.0, 0.0, 1.0), Point3::new(0.0, 1.0, 0.0)),
            unit
        );
        let pts = [Point3::new(0.5, 1.0, 0.0), Point3::ORIGIN, Point3::new(1.0, 0.0, 1.0)];
        assert_eq!(BBox::from_points(&pts), Some(unit));
        assert_eq!(BBox::from_points(&[]), None);
        assert!(unit.contains_point(Point3::new(1.0, 0.5, 0.0)));
        assert!(!unit.contains_point(Point3::new(1.0, 0.5, -0.1)));
        let far = BBox::new(Point3::new(2.0, 2.0, 2.0), Point3::new(3.0, 3.0, 3.0));
        assert_eq!(unit.union(far), BBox::new(Point3::ORIGIN, Point3::new(3.0, 3.0, 3.0)));
    }

    #[test]
    fn test_tolerance_comparisons() {
        let tol = Tolerance::new(1e-9);
        let a = Vec3::new(1.0, 2.0, 3.0);
        assert!(tol.approx_eq_vec3(a, Vec3::new(1.0 + 1e-10, 2.0, 3.0)));
        assert!(!tol.approx_eq_vec3(a, Vec3::new(1.0 + 1e-8, 2.0, 3.0)));
        assert!(tol.approx_eq_f64(0.1 + 0.2, 0.3));
        assert_eq!(Tolerance::DERIVATIVE.relative_to(-4.0), 4e-6);
    }
}
