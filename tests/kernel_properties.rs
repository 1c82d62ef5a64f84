use cam_kernel::geom::{
    BBox, BoundaryShape, CollisionZone, GeomMesh, IntersectionOptions, KdTree, KernelContext,
    LinearScan, MotionKind, NurbsCurve3, OffsetOptions, ParameterizeOptions, PlaneSurface, Point3,
    ShellOptions, SolveBudget, SpatialQuery, ToolGeometry, Toolpath, Vec3, check_tool_collision,
    create_shell, intersect_surfaces, offset_mesh, parameterize,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_point(rng: &mut StdRng) -> Point3 {
    Point3::new(
        rng.random_range(-100.0..100.0),
        rng.random_range(-100.0..100.0),
        rng.random_range(-100.0..100.0),
    )
}

fn unit_cube() -> GeomMesh {
    GeomMesh::from_flat(
        &[
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0,
        ],
        vec![
            0, 2, 1, 0, 3, 2, 4, 5, 6, 4, 6, 7, 0, 1, 5, 0, 5, 4, 3, 7, 6, 3, 6, 2, 0, 4, 7, 0,
            7, 3, 1, 2, 6, 1, 6, 5,
        ],
    )
    .unwrap()
}

#[test]
fn basis_partition_of_unity_on_random_curves() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        let degree = rng.random_range(1..=4);
        let count = degree + 1 + rng.random_range(0..6);
        let points = (0..count).map(|_| random_point(&mut rng)).collect();
        let curve = NurbsCurve3::clamped_uniform(degree, points).unwrap();
        for _ in 0..50 {
            let u = rng.random::<f64>();
            let (_, basis) = curve.basis_at(u);
            let sum: f64 = basis.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
        }
    }
}

#[test]
fn curves_interpolate_end_control_points() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..20 {
        let degree = rng.random_range(1..=5);
        let count = degree + 1 + rng.random_range(0..5);
        let points: Vec<Point3> = (0..count).map(|_| random_point(&mut rng)).collect();
        let weights = (0..count).map(|_| rng.random_range(0.2..3.0)).collect();
        let knots = NurbsCurve3::clamped_uniform(degree, points.clone())
            .unwrap()
            .knots()
            .to_vec();
        let curve = NurbsCurve3::new(degree, points.clone(), knots.clone(), Some(weights)).unwrap();

        let first = curve.point_at(knots[degree]);
        let last = curve.point_at(knots[count]);
        assert!(first.distance_to(points[0]) < 1e-9);
        assert!(last.distance_to(points[count - 1]) < 1e-9);
    }
}

#[test]
fn zero_offset_is_identity() {
    let cube = unit_cube();
    let (result, _) = offset_mesh(&cube, OffsetOptions::new(0.0)).unwrap();
    assert_eq!(result.positions, cube.positions);
    assert_eq!(result.indices, cube.indices);
}

#[test]
fn closed_cube_shell() {
    let (shell, diag) = create_shell(&unit_cube(), ShellOptions::new(0.1).cap_boundary(true)).unwrap();
    assert_eq!(shell.vertex_count(), 16);
    assert_eq!(diag.rim_triangle_count, 0);
}

#[test]
fn kd_tree_nearest_matches_linear_scan() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..100 {
        let points: Vec<Point3> = (0..100).map(|_| random_point(&mut rng)).collect();
        let query = random_point(&mut rng);

        let tree = KdTree::build(&points);
        let scan = LinearScan::new(&points);
        let a = tree.nearest(query).unwrap();
        let b = scan.nearest(query).unwrap();
        assert_eq!(a.index, b.index);
        assert!((a.distance - b.distance).abs() < 1e-9);

        let radius = rng.random_range(10.0..60.0);
        let ra: Vec<usize> = tree.within_radius(query, radius).iter().map(|n| n.index).collect();
        let rb: Vec<usize> = scan.within_radius(query, radius).iter().map(|n| n.index).collect();
        assert_eq!(ra, rb);

        let bbox = BBox::from_corners(random_point(&mut rng), random_point(&mut rng));
        assert_eq!(tree.range_query(bbox), scan.range_query(bbox));
    }
}

#[test]
fn box_collision_examples() {
    let tool = BBox::new(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 10.0));
    let near = [CollisionZone::new(
        "near",
        BBox::new(Point3::new(5.0, 5.0, 5.0), Point3::new(15.0, 15.0, 15.0)),
    )];
    let far = [CollisionZone::new(
        "far",
        BBox::new(Point3::new(20.0, 20.0, 20.0), Point3::new(30.0, 30.0, 30.0)),
    )];
    assert!(check_tool_collision(tool, &near));
    assert!(!check_tool_collision(tool, &far));
}

#[test]
fn parallel_planes_have_no_intersection() {
    let a = PlaneSurface::new(Point3::ORIGIN, Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0));
    let b = PlaneSurface::new(
        Point3::new(0.0, 0.0, 1.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
    );
    let result = intersect_surfaces(&a, &b, IntersectionOptions::default());
    assert!(result.curves.is_empty());
}

#[test]
fn disk_boundary_lands_on_target_shape() {
    let n = 6u32;
    let mut positions = Vec::new();
    let mut rng = StdRng::seed_from_u64(3);
    for j in 0..n {
        for i in 0..n {
            let interior = i > 0 && j > 0 && i < n - 1 && j < n - 1;
            let jitter = if interior { 0.2 } else { 0.0 };
            positions.push([
                f64::from(i) + rng.random_range(-jitter..=jitter),
                f64::from(j) + rng.random_range(-jitter..=jitter),
                rng.random_range(-0.5..0.5),
            ]);
        }
    }
    let mut indices = Vec::new();
    for j in 0..n - 1 {
        for i in 0..n - 1 {
            let a = j * n + i;
            indices.extend_from_slice(&[a, a + 1, a + n + 1, a, a + n + 1, a + n]);
        }
    }
    let mesh = GeomMesh::new(positions, indices);

    for shape in [BoundaryShape::Circle, BoundaryShape::Square] {
        let result = parameterize(&mesh, ParameterizeOptions::default().boundary_shape(shape)).unwrap();
        let count = result.boundary.len() as f64;
        for (k, &vertex) in result.boundary.iter().enumerate() {
            let uv = result.uvs[vertex as usize];
            let t = k as f64 / count;
            let target = match shape {
                BoundaryShape::Circle => {
                    let angle = std::f64::consts::TAU * t;
                    [angle.cos(), angle.sin()]
                }
                BoundaryShape::Square => {
                    let s = 4.0 * t;
                    match s {
                        s if s < 1.0 => [s, 0.0],
                        s if s < 2.0 => [1.0, s - 1.0],
                        s if s < 3.0 => [3.0 - s, 1.0],
                        s => [0.0, 4.0 - s],
                    }
                }
            };
            assert!((uv[0] - target[0]).abs() < 1e-9);
            assert!((uv[1] - target[1]).abs() < 1e-9);
        }
    }
}

#[test]
fn context_routes_operations_and_tools() {
    let mut ctx = KernelContext::new();
    ctx.reset_timing();
    ctx.register_tool("endmill-6", ToolGeometry::new(6.0, 25.0));
    ctx.add_zone(CollisionZone::new(
        "fixture",
        BBox::new(Point3::new(-50.0, -50.0, -20.0), Point3::new(50.0, 50.0, -5.0)),
    ));

    let mut toolpath = Toolpath::new();
    toolpath.push(Point3::new(0.0, 0.0, 50.0), MotionKind::Rapid);
    toolpath.push(Point3::new(0.0, 0.0, 2.0), MotionKind::Plunge);
    toolpath.push(Point3::new(20.0, 0.0, 2.0), MotionKind::Feed);
    assert!(!ctx.check_toolpath(&toolpath, "endmill-6", 1).unwrap().collided);

    toolpath.push(Point3::new(20.0, 0.0, -6.0), MotionKind::Plunge);
    let report = ctx.check_toolpath(&toolpath, "endmill-6", 1).unwrap();
    assert_eq!(report.first_contact().unwrap().point_index, 3);
    assert!(ctx.check_toolpath(&toolpath, "missing", 1).is_err());

    let tree = ctx.build_index(&[Point3::ORIGIN, Point3::new(1.0, 1.0, 1.0)]);
    assert_eq!(tree.len(), 2);

    let a = PlaneSurface::new(
        Point3::new(-1.0, -1.0, 0.0),
        Vec3::new(2.0, 0.0, 0.0),
        Vec3::new(0.0, 2.0, 0.0),
    );
    let b = PlaneSurface::new(
        Point3::new(-1.0, 0.0, -1.0),
        Vec3::new(2.0, 0.0, 0.0),
        Vec3::new(0.0, 0.0, 2.0),
    );
    let result = ctx.intersect(&a, &b, IntersectionOptions::default(), SolveBudget::new(100_000));
    assert_eq!(result.curves.len(), 1);

    #[cfg(feature = "kernel_metrics")]
    assert!(ctx.timing().is_some());
    #[cfg(not(feature = "kernel_metrics"))]
    assert!(ctx.timing().is_none());
}
