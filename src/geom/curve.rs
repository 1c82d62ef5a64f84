use serde::{Deserialize, Serialize};

use super::basis::{
    HPoint4, basis_functions, find_span, homogeneous_derivatives, is_non_decreasing,
    rational_derivatives,
};
use super::core::{Point3, Tolerance, Vec3};

/// Errors raised when building or editing NURBS geometry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NurbsError {
    #[error("nurbs degree must be >= 1")]
    ZeroDegree,

    #[error("nurbs requires more than {degree} control points, got {count}")]
    TooFewControlPoints { degree: usize, count: usize },

    #[error("nurbs knot length must be {expected}, got {actual}")]
    KnotCount { expected: usize, actual: usize },

    #[error("nurbs knots must be finite and non-decreasing")]
    KnotsNotMonotonic,

    #[error("nurbs weights must be finite, > 0 and one per control point")]
    InvalidWeights,

    #[error("nurbs control point count must be {expected}, got {actual}")]
    ControlGrid { expected: usize, actual: usize },

    #[error("parameter {u} is not strictly inside the domain [{start}, {end}]")]
    KnotOutsideDomain { u: f64, start: f64, end: f64 },

    #[error("knot {u} would reach multiplicity {multiplicity}, above degree + 1 = {limit}")]
    MultiplicityExceeded { u: f64, multiplicity: usize, limit: usize },
}

pub(crate) fn validate_axis(
    degree: usize,
    count: usize,
    knots: &[f64],
) -> Result<(), NurbsError> {
    if degree == 0 {
        return Err(NurbsError::ZeroDegree);
    }
    if count <= degree {
        return Err(NurbsError::TooFewControlPoints { degree, count });
    }
    let expected = count + degree + 1;
    if knots.len() != expected {
        return Err(NurbsError::KnotCount {
            expected,
            actual: knots.len(),
        });
    }
    if knots.iter().any(|k| !k.is_finite()) || !is_non_decreasing(knots) {
        return Err(NurbsError::KnotsNotMonotonic);
    }
    if knots[degree] >= knots[count] {
        return Err(NurbsError::KnotsNotMonotonic);
    }
    Ok(())
}

pub(crate) fn validate_weights(weights: Option<&[f64]>, count: usize) -> Result<(), NurbsError> {
    match weights {
        Some(w) if w.len() != count || w.iter().any(|w| !w.is_finite() || *w <= 0.0) => {
            Err(NurbsError::InvalidWeights)
        }
        _ => Ok(()),
    }
}

/// A non-uniform rational B-spline curve.
///
/// Construction through [`NurbsCurve3::new`] guarantees the knot, weight and
/// degree invariants, so evaluation never has to re-check them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NurbsCurve3 {
    degree: usize,
    control_points: Vec<Point3>,
    knots: Vec<f64>,
    weights: Option<Vec<f64>>,
}

impl NurbsCurve3 {
    pub fn new(
        degree: usize,
        control_points: Vec<Point3>,
        knots: Vec<f64>,
        weights: Option<Vec<f64>>,
    ) -> Result<Self, NurbsError> {
        validate_axis(degree, control_points.len(), &knots)?;
        validate_weights(weights.as_deref(), control_points.len())?;
        if control_points.iter().any(|p| !p.is_finite()) {
            return Err(NurbsError::InvalidWeights);
        }

        Ok(Self {
            degree,
            control_points,
            knots,
            weights,
        })
    }

    /// A clamped B-spline with uniformly spaced interior knots on `[0, 1]`.
    pub fn clamped_uniform(degree: usize, control_points: Vec<Point3>) -> Result<Self, NurbsError> {
        let count = control_points.len();
        if degree == 0 {
            return Err(NurbsError::ZeroDegree);
        }
        if count <= degree {
            return Err(NurbsError::TooFewControlPoints { degree, count });
        }
        let interior = count - degree - 1;
        let mut knots = vec![0.0; degree + 1];
        knots.extend((1..=interior).map(|i| i as f64 / (interior + 1) as f64));
        knots.extend(std::iter::repeat_n(1.0, degree + 1));
        Self::new(degree, control_points, knots, None)
    }

    #[must_use]
    pub const fn degree(&self) -> usize {
        self.degree
    }

    #[must_use]
    pub fn control_points(&self) -> &[Point3] {
        &self.control_points
    }

    #[must_use]
    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    #[must_use]
    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    /// Parameter domain `[knots[degree], knots[n + 1]]`.
    #[must_use]
    pub fn domain(&self) -> (f64, f64) {
        (self.knots[self.degree], self.knots[self.control_points.len()])
    }

    #[must_use]
    pub fn clamp_param(&self, u: f64) -> f64 {
        let (a, b) = self.domain();
        if u.is_nan() { a } else { u.clamp(a, b) }
    }

    #[must_use]
    pub fn knot_multiplicity(&self, u: f64, tol: Tolerance) -> usize {
        self.knots.iter().filter(|&&k| tol.approx_eq_f64(k, u)).count()
    }

    pub(crate) fn homogeneous_points(&self) -> Vec<HPoint4> {
        match &self.weights {
            Some(weights) => self
                .control_points
                .iter()
                .zip(weights)
                .map(|(p, &w)| HPoint4::from_weighted(*p, w))
                .collect(),
            None => self
                .control_points
                .iter()
                .map(|p| HPoint4::from_weighted(*p, 1.0))
                .collect(),
        }
    }

    fn from_homogeneous(
        degree: usize,
        points: &[HPoint4],
        knots: Vec<f64>,
        rational: bool,
    ) -> Result<Self, NurbsError> {
        let control_points = points
            .iter()
            .map(|h| h.to_point3().ok_or(NurbsError::InvalidWeights))
            .collect::<Result<Vec<_>, _>>()?;
        let weights = rational.then(|| points.iter().map(|h| h.w).collect());
        Self::new(degree, control_points, knots, weights)
    }

    /// Knot span and the `degree + 1` basis values active at `u` (clamped).
    #[must_use]
    pub fn basis_at(&self, u: f64) -> (usize, Vec<f64>) {
        let u = self.clamp_param(u);
        let n = self.control_points.len() - 1;
        let span = find_span(n, self.degree, u, &self.knots);
        (span, basis_functions(span, u, self.degree, &self.knots))
    }

    /// Evaluate the curve. `u` is clamped to the knot domain first.
    #[must_use]
    pub fn point_at(&self, u: f64) -> Point3 {
        let (span, basis) = self.basis_at(u);
        let p = self.degree;

        match &self.weights {
            Some(weights) => {
                let mut acc = HPoint4::ZERO;
                for (j, b) in basis.iter().enumerate() {
                    let index = span - p + j;
                    acc = acc.add(
                        HPoint4::from_weighted(self.control_points[index], weights[index])
                            .mul_scalar(*b),
                    );
                }
                acc.to_point3().unwrap_or(self.control_points[span - p])
            }
            None => {
                let mut acc = Vec3::ZERO;
                for (j, b) in basis.iter().enumerate() {
                    acc = acc.add(self.control_points[span - p + j].to_vec3().mul_scalar(*b));
                }
                acc.into()
            }
        }
    }

    /// Derivatives of orders `0..=order` at `u` (clamped).
    ///
    /// Index 0 holds the curve point as a position vector. Orders above the
    /// degree are zero.
    #[must_use]
    pub fn derivatives_at(&self, u: f64, order: usize) -> Vec<Vec3> {
        let u = self.clamp_param(u);
        let hders =
            homogeneous_derivatives(&self.homogeneous_points(), self.degree, &self.knots, u, order);
        rational_derivatives(&hders)
    }

    /// The `order`-th derivative at `u`; zero when `order > degree`.
    #[must_use]
    pub fn derivative_at(&self, u: f64, order: usize) -> Vec3 {
        if order > self.degree {
            return Vec3::ZERO;
        }
        self.derivatives_at(u, order)
            .pop()
            .unwrap_or(Vec3::ZERO)
    }

    #[must_use]
    pub fn tangent_at(&self, u: f64) -> Option<Vec3> {
        self.derivative_at(u, 1).normalized()
    }

    /// Insert `u` into the knot vector `times` times without changing the shape.
    ///
    /// Runs Boehm's single-knot insertion repeatedly in homogeneous space.
    pub fn insert_knot(&self, u: f64, times: usize) -> Result<Self, NurbsError> {
        let (start, end) = self.domain();
        if !(u > start && u < end) {
            return Err(NurbsError::KnotOutsideDomain { u, start, end });
        }
        if times == 0 {
            return Ok(self.clone());
        }

        let existing = self.knots.iter().filter(|&&k| k == u).count();
        let limit = self.degree + 1;
        if existing + times > limit {
            return Err(NurbsError::MultiplicityExceeded {
                u,
                multiplicity: existing + times,
                limit,
            });
        }

        let mut points = self.homogeneous_points();
        let mut knots = self.knots.clone();
        for _ in 0..times {
            (points, knots) = boehm_insert(&points, &knots, self.degree, u);
        }

        Self::from_homogeneous(self.degree, &points, knots, self.weights.is_some())
    }

    /// Split into two independent curves at `u`.
    ///
    /// `u` is raised to multiplicity `degree + 1`, which makes it a break point
    /// shared by the left curve's last and the right curve's first control point.
    pub fn split_at(&self, u: f64) -> Result<(Self, Self), NurbsError> {
        let (start, end) = self.domain();
        if !(u > start && u < end) {
            return Err(NurbsError::KnotOutsideDomain { u, start, end });
        }

        let existing = self.knots.iter().filter(|&&k| k == u).count();
        let refined = self.insert_knot(u, self.degree + 1 - existing)?;

        let first = refined
            .knots
            .iter()
            .position(|&k| k == u)
            .ok_or(NurbsError::KnotOutsideDomain { u, start, end })?;
        let p = self.degree;

        let left_knots = refined.knots[..first + p + 1].to_vec();
        let right_knots = refined.knots[first..].to_vec();
        let (left_points, right_points) = refined.control_points.split_at(first);
        let (left_weights, right_weights) = match &refined.weights {
            Some(w) => {
                let (l, r) = w.split_at(first);
                (Some(l.to_vec()), Some(r.to_vec()))
            }
            None => (None, None),
        };

        log::trace!("split nurbs curve at {u}: {first} + {} control points", right_points.len());

        Ok((
            Self::new(p, left_points.to_vec(), left_knots, left_weights)?,
            Self::new(p, right_points.to_vec(), right_knots, right_weights)?,
        ))
    }
}

/// One Boehm insertion of `u`: `alpha = (u - U[i]) / (U[i+p] - U[i])`.
fn boehm_insert(
    points: &[HPoint4],
    knots: &[f64],
    p: usize,
    u: f64,
) -> (Vec<HPoint4>, Vec<f64>) {
    let n = points.len() - 1;
    let k = find_span(n, p, u, knots);

    let mut new_knots = Vec::with_capacity(knots.len() + 1);
    new_knots.extend_from_slice(&knots[..=k]);
    new_knots.push(u);
    new_knots.extend_from_slice(&knots[k + 1..]);

    let mut new_points = Vec::with_capacity(points.len() + 1);
    new_points.extend_from_slice(&points[..=(k - p)]);
    for i in (k - p + 1)..=k {
        let denom = knots[i + p] - knots[i];
        let alpha = if denom == 0.0 { 0.0 } else { (u - knots[i]) / denom };
        new_points.push(points[i - 1].lerp(points[i], alpha));
    }
    new_points.extend_from_slice(&points[k..]);

    (new_points, new_knots)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quarter_circle() -> NurbsCurve3 {
        let w = std::f64::consts::FRAC_1_SQRT_2;
        NurbsCurve3::new(
            2,
            vec![
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
            Some(vec![1.0, w, 1.0]),
        )
        .unwrap()
    }

    #[test]
    fn new_rejects_bad_knot_count() {
        let err = NurbsCurve3::new(
            2,
            vec![Point3::ORIGIN, Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0)],
            vec![0.0, 0.0, 1.0, 1.0],
            None,
        )
        .unwrap_err();
        assert_eq!(err, NurbsError::KnotCount { expected: 6, actual: 4 });
    }

    #[test]
    fn new_rejects_non_positive_weight() {
        let err = NurbsCurve3::new(
            1,
            vec![Point3::ORIGIN, Point3::new(1.0, 0.0, 0.0)],
            vec![0.0, 0.0, 1.0, 1.0],
            Some(vec![1.0, 0.0]),
        )
        .unwrap_err();
        assert_eq!(err, NurbsError::InvalidWeights);
    }

    #[test]
    fn rational_quarter_circle_stays_on_circle() {
        let curve = quarter_circle();
        for i in 0..=20 {
            let p = curve.point_at(f64::from(i) / 20.0);
            let r = (p.x * p.x + p.y * p.y).sqrt();
            assert!((r - 1.0).abs() < 1e-12, "radius {r}");
        }
    }

    #[test]
    fn out_of_domain_parameter_is_clamped() {
        let curve = quarter_circle();
        assert_eq!(curve.point_at(-3.0), curve.point_at(0.0));
        assert_eq!(curve.point_at(7.0), curve.point_at(1.0));
        assert_eq!(curve.point_at(f64::NAN), curve.point_at(0.0));
    }

    #[test]
    fn boehm_insert_keeps_rational_shape() {
        let curve = quarter_circle();
        let refined = curve.insert_knot(0.3, 2).unwrap();
        assert_eq!(refined.control_points().len(), 5);
        assert_eq!(refined.knot_multiplicity(0.3, Tolerance::ZERO_LENGTH), 2);
        for i in 0..=40 {
            let u = f64::from(i) / 40.0;
            assert!(Tolerance::new(1e-12).approx_eq_point3(curve.point_at(u), refined.point_at(u)));
        }
    }

    #[test]
    fn derivative_above_degree_is_zero() {
        let curve = quarter_circle();
        assert_eq!(curve.derivative_at(0.5, 3), Vec3::ZERO);
    }

    #[test]
    fn quarter_circle_tangent_is_perpendicular_to_radius() {
        let curve = quarter_circle();
        for i in 1..10 {
            let u = f64::from(i) / 10.0;
            let p = curve.point_at(u).to_vec3();
            let d = curve.derivative_at(u, 1);
            assert!(p.dot(d).abs() < 1e-10);
        }
    }
}
