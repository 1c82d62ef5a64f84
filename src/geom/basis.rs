//! B-spline basis machinery shared by NURBS curves and surfaces.
//!
//! Rational geometry is handled in homogeneous space: a control point `P` with
//! weight `w` becomes `(w·P, w)`, every linear operation (evaluation, knot
//! insertion, differencing) runs on those 4D points, and the projection back to
//! 3D happens last.

use super::core::{Point3, Vec3};

pub(crate) fn is_non_decreasing(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] <= w[1])
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct HPoint4 {
    pub(crate) x: f64,
    pub(crate) y: f64,
    pub(crate) z: f64,
    pub(crate) w: f64,
}

impl HPoint4 {
    pub(crate) const ZERO: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    pub(crate) const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    pub(crate) const fn from_weighted(p: Point3, w: f64) -> Self {
        Self::new(p.x * w, p.y * w, p.z * w, w)
    }

    pub(crate) fn lerp(self, rhs: Self, t: f64) -> Self {
        let s = 1.0 - t;
        Self::new(
            self.x * s + rhs.x * t,
            self.y * s + rhs.y * t,
            self.z * s + rhs.z * t,
            self.w * s + rhs.w * t,
        )
    }

    pub(crate) const fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z, self.w + rhs.w)
    }

    pub(crate) const fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z, self.w - rhs.w)
    }

    pub(crate) const fn mul_scalar(self, s: f64) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s, self.w * s)
    }

    /// The weighted spatial part, without dividing by `w`.
    pub(crate) const fn xyz(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub(crate) fn to_point3(self) -> Option<Point3> {
        if self.w.is_finite() && self.w != 0.0 {
            Some(Point3::new(self.x / self.w, self.y / self.w, self.z / self.w))
        } else {
            None
        }
    }
}

/// Index of the knot span containing `u`, searched in `[p, n + 1)`.
///
/// `n` is the last control point index. Values at or beyond the end of the
/// domain map to the last non-empty span so the end point is reachable.
pub(crate) fn find_span(n: usize, p: usize, u: f64, knots: &[f64]) -> usize {
    if u >= knots[n + 1] {
        let mut span = n;
        while span > p && knots[span] >= knots[n + 1] {
            span -= 1;
        }
        return span;
    }
    if u <= knots[p] {
        let mut span = p;
        while span < n && knots[span + 1] <= knots[p] {
            span += 1;
        }
        return span;
    }

    let mut low = p;
    let mut high = n + 1;
    let mut mid = (low + high) / 2;
    while u < knots[mid] || u >= knots[mid + 1] {
        if u < knots[mid] {
            high = mid;
        } else {
            low = mid;
        }
        mid = (low + high) / 2;
    }
    mid
}

/// The `p + 1` non-zero basis functions `N[span-p..=span, p](u)`.
///
/// Triangular Cox–de Boor table; zero-width spans contribute nothing.
pub(crate) fn basis_functions(span: usize, u: f64, p: usize, knots: &[f64]) -> Vec<f64> {
    let mut n = vec![0.0; p + 1];
    let mut left = vec![0.0; p + 1];
    let mut right = vec![0.0; p + 1];
    n[0] = 1.0;

    for j in 1..=p {
        left[j] = u - knots[span + 1 - j];
        right[j] = knots[span + j] - u;
        let mut saved = 0.0;
        for r in 0..j {
            let denom = right[r + 1] + left[j - r];
            let temp = if denom == 0.0 { 0.0 } else { n[r] / denom };
            n[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        n[j] = saved;
    }

    n
}

/// Evaluate a (homogeneous) B-spline at an already clamped parameter.
pub(crate) fn eval_homogeneous(ctrl: &[HPoint4], p: usize, knots: &[f64], u: f64) -> HPoint4 {
    let n = ctrl.len() - 1;
    let span = find_span(n, p, u, knots);
    let basis = basis_functions(span, u, p, knots);
    basis
        .iter()
        .enumerate()
        .fold(HPoint4::ZERO, |acc, (j, &b)| {
            acc.add(ctrl[span - p + j].mul_scalar(b))
        })
}

/// Control points and knots of the first derivative (hodograph) of a B-spline.
///
/// `Q[i] = p · (P[i+1] - P[i]) / (U[i+p+1] - U[i+1])` on the knot vector with
/// its first and last knot removed. Degree drops by one.
pub(crate) fn hodograph(ctrl: &[HPoint4], p: usize, knots: &[f64]) -> (Vec<HPoint4>, Vec<f64>) {
    let scale = p as f64;
    let points = ctrl
        .windows(2)
        .enumerate()
        .map(|(i, pair)| {
            let width = knots[i + p + 1] - knots[i + 1];
            if width > 0.0 {
                pair[1].sub(pair[0]).mul_scalar(scale / width)
            } else {
                HPoint4::ZERO
            }
        })
        .collect();
    let trimmed = knots[1..knots.len() - 1].to_vec();
    (points, trimmed)
}

/// Homogeneous derivatives `0..=order` at `u`.
///
/// Orders above the degree are identically zero.
pub(crate) fn homogeneous_derivatives(
    ctrl: &[HPoint4],
    p: usize,
    knots: &[f64],
    u: f64,
    order: usize,
) -> Vec<HPoint4> {
    let mut result = Vec::with_capacity(order + 1);
    result.push(eval_homogeneous(ctrl, p, knots, u));

    let mut points = ctrl.to_vec();
    let mut knots = knots.to_vec();
    let mut degree = p;
    for _ in 1..=order {
        if degree == 0 || points.len() < 2 {
            result.push(HPoint4::ZERO);
            continue;
        }
        let (next_points, next_knots) = hodograph(&points, degree, &knots);
        points = next_points;
        knots = next_knots;
        degree -= 1;
        result.push(eval_homogeneous(&points, degree, &knots, u));
    }

    result
}

pub(crate) fn binomial(n: usize, k: usize) -> f64 {
    let k = k.min(n - k);
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

/// Project homogeneous derivatives to Euclidean curve derivatives.
///
/// `C(k) = (A(k) - Σ_{i=1..k} C(k,i) · w(i) · C(k-i)) / w`, where `A` is the
/// weighted spatial part and `w` the weight function.
pub(crate) fn rational_derivatives(hders: &[HPoint4]) -> Vec<Vec3> {
    let w0 = hders.first().map_or(0.0, |h| h.w);
    if !w0.is_finite() || w0 == 0.0 {
        return vec![Vec3::ZERO; hders.len()];
    }

    let mut ck: Vec<Vec3> = Vec::with_capacity(hders.len());
    for k in 0..hders.len() {
        let mut v = hders[k].xyz();
        for i in 1..=k {
            v = v.sub(ck[k - i].mul_scalar(binomial(k, i) * hders[i].w));
        }
        ck.push(v.mul_scalar(1.0 / w0));
    }
    ck
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_span_reaches_last_span_at_domain_end() {
        let knots = [0.0, 0.0, 0.0, 0.5, 1.0, 1.0, 1.0];
        assert_eq!(find_span(3, 2, 0.0, &knots), 2);
        assert_eq!(find_span(3, 2, 0.25, &knots), 2);
        assert_eq!(find_span(3, 2, 0.5, &knots), 3);
        assert_eq!(find_span(3, 2, 1.0, &knots), 3);
    }

    #[test]
    fn basis_functions_partition_unity() {
        let knots = [0.0, 0.0, 0.0, 0.0, 0.3, 0.7, 1.0, 1.0, 1.0, 1.0];
        for step in 0..=50 {
            let u = f64::from(step) / 50.0;
            let span = find_span(5, 3, u, &knots);
            let sum: f64 = basis_functions(span, u, 3, &knots).iter().sum();
            assert!((sum - 1.0).abs() < 1e-12, "u={u} sum={sum}");
        }
    }

    #[test]
    fn binomial_values() {
        assert_eq!(binomial(4, 0), 1.0);
        assert_eq!(binomial(4, 2), 6.0);
        assert_eq!(binomial(5, 5), 1.0);
    }
}
