use serde::{Deserialize, Serialize};

use super::basis::{HPoint4, basis_functions, find_span, homogeneous_derivatives, rational_derivatives};
use super::core::{Point3, Tolerance, Vec3};
use super::curve::{NurbsError, validate_axis, validate_weights};

/// A parametric surface patch `S(u, v)`.
///
/// Implementors clamp out-of-domain parameters. The default partials use
/// central differences; surfaces with a closed form override them.
pub trait Surface {
    fn point_at(&self, u: f64, v: f64) -> Point3;

    #[must_use]
    fn domain_u(&self) -> (f64, f64) {
        (0.0, 1.0)
    }

    #[must_use]
    fn domain_v(&self) -> (f64, f64) {
        (0.0, 1.0)
    }

    #[must_use]
    fn partial_derivatives_at(&self, u: f64, v: f64) -> (Vec3, Vec3) {
        let (u0, u1) = self.domain_u();
        let (v0, v1) = self.domain_v();
        let u = u.clamp(u0, u1);
        let v = v.clamp(v0, v1);

        let mut du = Vec3::ZERO;
        let mut dv = Vec3::ZERO;

        let h = Tolerance::DERIVATIVE.relative_to(u1 - u0);
        if h.is_finite() && h != 0.0 {
            let ua = (u - h).max(u0);
            let ub = (u + h).min(u1);
            if ua != ub {
                du = self
                    .point_at(ub, v)
                    .sub_point(self.point_at(ua, v))
                    .mul_scalar(1.0 / (ub - ua));
            }
        }

        let h = Tolerance::DERIVATIVE.relative_to(v1 - v0);
        if h.is_finite() && h != 0.0 {
            let va = (v - h).max(v0);
            let vb = (v + h).min(v1);
            if va != vb {
                dv = self
                    .point_at(u, vb)
                    .sub_point(self.point_at(u, va))
                    .mul_scalar(1.0 / (vb - va));
            }
        }

        (du, dv)
    }

    #[must_use]
    fn normal_at(&self, u: f64, v: f64) -> Option<Vec3> {
        let (du, dv) = self.partial_derivatives_at(u, v);
        du.cross(dv).normalized()
    }
}

impl<S: Surface + ?Sized> Surface for &S {
    fn point_at(&self, u: f64, v: f64) -> Point3 {
        (**self).point_at(u, v)
    }

    fn domain_u(&self) -> (f64, f64) {
        (**self).domain_u()
    }

    fn domain_v(&self) -> (f64, f64) {
        (**self).domain_v()
    }

    fn partial_derivatives_at(&self, u: f64, v: f64) -> (Vec3, Vec3) {
        (**self).partial_derivatives_at(u, v)
    }

    fn normal_at(&self, u: f64, v: f64) -> Option<Vec3> {
        (**self).normal_at(u, v)
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Plane
// ───────────────────────────────────────────────────────────────────────────

/// `origin + u * u_axis + v * v_axis` over `[0, 1]²`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneSurface {
    pub origin: Point3,
    pub u_axis: Vec3,
    pub v_axis: Vec3,
}

impl PlaneSurface {
    #[must_use]
    pub const fn new(origin: Point3, u_axis: Vec3, v_axis: Vec3) -> Self {
        Self {
            origin,
            u_axis,
            v_axis,
        }
    }
}

impl Surface for PlaneSurface {
    fn point_at(&self, u: f64, v: f64) -> Point3 {
        let u = u.clamp(0.0, 1.0);
        let v = v.clamp(0.0, 1.0);
        self.origin
            .add_vec(self.u_axis.mul_scalar(u))
            .add_vec(self.v_axis.mul_scalar(v))
    }

    fn partial_derivatives_at(&self, _u: f64, _v: f64) -> (Vec3, Vec3) {
        (self.u_axis, self.v_axis)
    }

    fn normal_at(&self, _u: f64, _v: f64) -> Option<Vec3> {
        self.u_axis.cross(self.v_axis).normalized()
    }
}

// ───────────────────────────────────────────────────────────────────────────
// NURBS surface
// ───────────────────────────────────────────────────────────────────────────

/// Tensor-product NURBS patch.
///
/// Control points are stored row-major in `v`: index `v * u_count + u`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NurbsSurface {
    degree_u: usize,
    degree_v: usize,
    u_count: usize,
    v_count: usize,
    control_points: Vec<Point3>,
    knots_u: Vec<f64>,
    knots_v: Vec<f64>,
    weights: Option<Vec<f64>>,
}

impl NurbsSurface {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        degree_u: usize,
        degree_v: usize,
        u_count: usize,
        v_count: usize,
        control_points: Vec<Point3>,
        knots_u: Vec<f64>,
        knots_v: Vec<f64>,
        weights: Option<Vec<f64>>,
    ) -> Result<Self, NurbsError> {
        validate_axis(degree_u, u_count, &knots_u)?;
        validate_axis(degree_v, v_count, &knots_v)?;

        let expected = u_count * v_count;
        if control_points.len() != expected {
            return Err(NurbsError::ControlGrid {
                expected,
                actual: control_points.len(),
            });
        }
        if control_points.iter().any(|p| !p.is_finite()) {
            return Err(NurbsError::InvalidWeights);
        }
        validate_weights(weights.as_deref(), expected)?;

        Ok(Self {
            degree_u,
            degree_v,
            u_count,
            v_count,
            control_points,
            knots_u,
            knots_v,
            weights,
        })
    }

    /// Degree-1 patch through four corners: `p00` at `(0,0)`, `p10` at `(1,0)`,
    /// `p01` at `(0,1)`, `p11` at `(1,1)`.
    pub fn bilinear(p00: Point3, p10: Point3, p01: Point3, p11: Point3) -> Result<Self, NurbsError> {
        Self::new(
            1,
            1,
            2,
            2,
            vec![p00, p10, p01, p11],
            vec![0.0, 0.0, 1.0, 1.0],
            vec![0.0, 0.0, 1.0, 1.0],
            None,
        )
    }

    #[must_use]
    pub const fn degrees(&self) -> (usize, usize) {
        (self.degree_u, self.degree_v)
    }

    #[must_use]
    pub const fn counts(&self) -> (usize, usize) {
        (self.u_count, self.v_count)
    }

    #[must_use]
    pub fn control_point(&self, u_index: usize, v_index: usize) -> Option<Point3> {
        if u_index >= self.u_count || v_index >= self.v_count {
            return None;
        }
        self.control_points.get(v_index * self.u_count + u_index).copied()
    }

    fn weight(&self, index: usize) -> f64 {
        self.weights.as_ref().map_or(1.0, |w| w[index])
    }

    fn homogeneous(&self, u_index: usize, v_index: usize) -> HPoint4 {
        let index = v_index * self.u_count + u_index;
        HPoint4::from_weighted(self.control_points[index], self.weight(index))
    }

    fn clamp_uv(&self, u: f64, v: f64) -> (f64, f64) {
        let (u0, u1) = self.domain_u();
        let (v0, v1) = self.domain_v();
        let u = if u.is_nan() { u0 } else { u.clamp(u0, u1) };
        let v = if v.is_nan() { v0 } else { v.clamp(v0, v1) };
        (u, v)
    }

    fn basis_u(&self, u: f64) -> (usize, Vec<f64>) {
        let span = find_span(self.u_count - 1, self.degree_u, u, &self.knots_u);
        (span, basis_functions(span, u, self.degree_u, &self.knots_u))
    }

    fn basis_v(&self, v: f64) -> (usize, Vec<f64>) {
        let span = find_span(self.v_count - 1, self.degree_v, v, &self.knots_v);
        (span, basis_functions(span, v, self.degree_v, &self.knots_v))
    }

    /// Homogeneous iso-curve control points at fixed `v`, one per `u` column.
    fn iso_u_points(&self, v: f64) -> Vec<HPoint4> {
        let (span_v, basis_v) = self.basis_v(v);
        (0..self.u_count)
            .map(|i| {
                basis_v.iter().enumerate().fold(HPoint4::ZERO, |acc, (l, &b)| {
                    acc.add(self.homogeneous(i, span_v - self.degree_v + l).mul_scalar(b))
                })
            })
            .collect()
    }

    /// Homogeneous iso-curve control points at fixed `u`, one per `v` row.
    fn iso_v_points(&self, u: f64) -> Vec<HPoint4> {
        let (span_u, basis_u) = self.basis_u(u);
        (0..self.v_count)
            .map(|j| {
                basis_u.iter().enumerate().fold(HPoint4::ZERO, |acc, (k, &b)| {
                    acc.add(self.homogeneous(span_u - self.degree_u + k, j).mul_scalar(b))
                })
            })
            .collect()
    }
}

impl Surface for NurbsSurface {
    fn point_at(&self, u: f64, v: f64) -> Point3 {
        let (u, v) = self.clamp_uv(u, v);
        let (span_u, basis_u) = self.basis_u(u);
        let (span_v, basis_v) = self.basis_v(v);

        let mut acc = HPoint4::ZERO;
        for (l, bv) in basis_v.iter().enumerate() {
            let row = span_v - self.degree_v + l;
            for (k, bu) in basis_u.iter().enumerate() {
                let col = span_u - self.degree_u + k;
                acc = acc.add(self.homogeneous(col, row).mul_scalar(bu * bv));
            }
        }

        acc.to_point3()
            .unwrap_or(self.control_points[(span_v - self.degree_v) * self.u_count + span_u - self.degree_u])
    }

    fn domain_u(&self) -> (f64, f64) {
        (self.knots_u[self.degree_u], self.knots_u[self.u_count])
    }

    fn domain_v(&self) -> (f64, f64) {
        (self.knots_v[self.degree_v], self.knots_v[self.v_count])
    }

    /// Exact partials from the two homogeneous iso-curves through `(u, v)`.
    fn partial_derivatives_at(&self, u: f64, v: f64) -> (Vec3, Vec3) {
        let (u, v) = self.clamp_uv(u, v);

        let along_u = homogeneous_derivatives(
            &self.iso_u_points(v),
            self.degree_u,
            &self.knots_u,
            u,
            1,
        );
        let along_v = homogeneous_derivatives(
            &self.iso_v_points(u),
            self.degree_v,
            &self.knots_v,
            v,
            1,
        );

        let du = rational_derivatives(&along_u).get(1).copied().unwrap_or(Vec3::ZERO);
        let dv = rational_derivatives(&along_v).get(1).copied().unwrap_or(Vec3::ZERO);
        (du, dv)
    }
}
