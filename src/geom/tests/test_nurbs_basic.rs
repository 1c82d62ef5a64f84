use crate::geom::{NurbsCurve3, NurbsError, NurbsSurface, Point3, Surface, Tolerance, Vec3};

fn cubic() -> NurbsCurve3 {
    NurbsCurve3::new(
        3,
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 2.0, 0.0),
            Point3::new(3.0, 2.5, 1.0),
            Point3::new(4.0, 0.5, 1.0),
            Point3::new(6.0, 1.0, -1.0),
            Point3::new(7.0, 3.0, 0.0),
        ],
        vec![0.0, 0.0, 0.0, 0.0, 1.0, 2.5, 4.0, 4.0, 4.0, 4.0],
        Some(vec![1.0, 0.5, 2.0, 1.0, 1.5, 1.0]),
    )
    .unwrap()
}

fn samples(curve: &NurbsCurve3, count: usize) -> impl Iterator<Item = f64> {
    let (start, end) = curve.domain();
    (0..=count).map(move |i| start + (end - start) * i as f64 / count as f64)
}

#[test]
fn basis_functions_sum_to_one_everywhere() {
    let curve = cubic();
    for u in samples(&curve, 97) {
        let (_, basis) = curve.basis_at(u);
        assert_eq!(basis.len(), 4);
        let sum: f64 = basis.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9, "sum {sum} at u = {u}");
        assert!(basis.iter().all(|&b| b >= -1e-12));
    }
}

#[test]
fn rational_curve_interpolates_end_points() {
    let curve = cubic();
    let tol = Tolerance::new(1e-12);
    let points = curve.control_points();
    assert!(tol.approx_eq_point3(curve.point_at(0.0), points[0]));
    assert!(tol.approx_eq_point3(curve.point_at(4.0), points[5]));
}

#[test]
fn parameters_outside_domain_are_clamped() {
    let curve = cubic();
    assert_eq!(curve.point_at(-3.0), curve.point_at(0.0));
    assert_eq!(curve.point_at(9.0), curve.point_at(4.0));
}

#[test]
fn first_derivative_matches_central_difference() {
    let curve = cubic();
    let h = 1e-6;
    for u in [0.3, 1.0, 1.7, 2.5, 3.6] {
        let analytic = curve.derivative_at(u, 1);
        let plus = curve.point_at(u + h);
        let minus = curve.point_at(u - h);
        let numeric = plus.sub_point(minus).mul_scalar(0.5 / h);
        assert!(
            (analytic - numeric).length() < 1e-5 * (1.0 + analytic.length()),
            "u = {u}: {analytic:?} vs {numeric:?}"
        );
    }
}

#[test]
fn derivative_beyond_degree_is_zero() {
    let curve = cubic();
    assert_eq!(curve.derivative_at(1.3, 4), Vec3::ZERO);
}

#[test]
fn knot_insertion_keeps_the_shape() {
    let curve = cubic();
    let refined = curve.insert_knot(1.8, 2).unwrap();
    assert_eq!(refined.control_points().len(), curve.control_points().len() + 2);
    assert_eq!(refined.knots().len(), curve.knots().len() + 2);
    for u in samples(&curve, 40) {
        assert!(curve.point_at(u).distance_to(refined.point_at(u)) < 1e-9);
    }
}

#[test]
fn split_halves_reproduce_the_curve() {
    let curve = cubic();
    let (left, right) = curve.split_at(2.0).unwrap();
    assert_eq!(left.domain(), (0.0, 2.0));
    assert_eq!(right.domain(), (2.0, 4.0));
    for i in 0..=20 {
        let u = 2.0 * f64::from(i) / 20.0;
        assert!(left.point_at(u).distance_to(curve.point_at(u)) < 1e-9);
        assert!(right.point_at(u + 2.0).distance_to(curve.point_at(u + 2.0)) < 1e-9);
    }
    assert!(left.point_at(2.0).distance_to(right.point_at(2.0)) < 1e-12);
}

#[test]
fn split_outside_interior_is_rejected() {
    let curve = cubic();
    assert!(matches!(
        curve.split_at(4.0),
        Err(NurbsError::KnotOutsideDomain { .. })
    ));
}

#[test]
fn invalid_curves_are_rejected() {
    let points = vec![Point3::ORIGIN, Point3::new(1.0, 0.0, 0.0)];
    assert_eq!(
        NurbsCurve3::new(3, points.clone(), vec![0.0; 6], None),
        Err(NurbsError::TooFewControlPoints { degree: 3, count: 2 })
    );
    assert_eq!(
        NurbsCurve3::new(1, points.clone(), vec![0.0, 1.0, 0.5, 1.0], None),
        Err(NurbsError::KnotsNotMonotonic)
    );
    assert_eq!(
        NurbsCurve3::new(1, points, vec![0.0, 0.0, 1.0, 1.0], Some(vec![1.0, 0.0])),
        Err(NurbsError::InvalidWeights)
    );
}

#[test]
fn bilinear_surface_hits_corners_and_centre() {
    let surface = NurbsSurface::bilinear(
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(2.0, 0.0, 0.0),
        Point3::new(0.0, 2.0, 0.0),
        Point3::new(2.0, 2.0, 2.0),
    )
    .unwrap();
    assert_eq!(surface.point_at(0.0, 0.0), Point3::new(0.0, 0.0, 0.0));
    assert_eq!(surface.point_at(1.0, 1.0), Point3::new(2.0, 2.0, 2.0));
    let mid = surface.point_at(0.5, 0.5);
    assert!(mid.distance_to(Point3::new(1.0, 1.0, 0.5)) < 1e-12);
}

#[test]
fn surface_partials_match_finite_differences() {
    let points: Vec<Point3> = (0..4)
        .flat_map(|j| {
            (0..4).map(move |i| {
                let (x, y) = (f64::from(i), f64::from(j));
                Point3::new(x, y, 0.3 * (x * y).sin())
            })
        })
        .collect();
    let knots = vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
    let weights: Vec<f64> = (0..16).map(|k| 1.0 + 0.1 * f64::from(k % 3)).collect();
    let surface = NurbsSurface::new(3, 3, 4, 4, points, knots.clone(), knots, Some(weights)).unwrap();

    let h = 1e-6;
    for (u, v) in [(0.2, 0.3), (0.5, 0.5), (0.8, 0.1)] {
        let (su, sv) = surface.partial_derivatives_at(u, v);
        let nu = surface.point_at(u + h, v).sub_point(surface.point_at(u - h, v)).mul_scalar(0.5 / h);
        let nv = surface.point_at(u, v + h).sub_point(surface.point_at(u, v - h)).mul_scalar(0.5 / h);
        assert!((su - nu).length() < 1e-5, "su at ({u}, {v})");
        assert!((sv - nv).length() < 1e-5, "sv at ({u}, {v})");
    }
}
