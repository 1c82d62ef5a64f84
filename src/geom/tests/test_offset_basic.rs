use crate::geom::{
    GeomMesh, NormalMode, OffsetError, OffsetOptions, ShellOptions, Tolerance, create_shell,
    offset_mesh,
};

fn unit_cube() -> GeomMesh {
    GeomMesh::new(
        vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.0, 1.0, 1.0],
        ],
        vec![
            0, 2, 1, 0, 3, 2, // bottom
            4, 5, 6, 4, 6, 7, // top
            0, 1, 5, 0, 5, 4, // front
            3, 7, 6, 3, 6, 2, // back
            0, 4, 7, 0, 7, 3, // left
            1, 2, 6, 1, 6, 5, // right
        ],
    )
}

fn grid(n: u32) -> GeomMesh {
    let mut positions = Vec::new();
    for j in 0..n {
        for i in 0..n {
            positions.push([f64::from(i), f64::from(j), 0.0]);
        }
    }
    let mut indices = Vec::new();
    for j in 0..n - 1 {
        for i in 0..n - 1 {
            let a = j * n + i;
            indices.extend_from_slice(&[a, a + 1, a + n + 1, a, a + n + 1, a + n]);
        }
    }
    GeomMesh::new(positions, indices)
}

fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

#[test]
fn cube_is_closed() {
    let diag = unit_cube().diagnostics(Tolerance::default_geom());
    assert!(diag.is_watertight());
    assert!(diag.is_manifold());
}

#[test]
fn zero_offset_returns_input() {
    let cube = unit_cube();
    let (result, diag) = offset_mesh(&cube, OffsetOptions::new(0.0)).unwrap();
    assert_eq!(result, cube);
    assert_eq!(diag.result_vertex_count, 8);
}

#[test]
fn cube_offset_moves_every_vertex_outward() {
    let cube = unit_cube();
    for mode in [NormalMode::Smooth, NormalMode::Flat] {
        let (result, diag) = offset_mesh(&cube, OffsetOptions::new(0.1).normal_mode(mode)).unwrap();
        assert_eq!(diag.degenerate_normal_count, 0);
        for (before, after) in cube.positions.iter().zip(&result.positions) {
            assert!((distance(*before, *after) - 0.1).abs() < 1e-12);
            let centre = [0.5, 0.5, 0.5];
            assert!(distance(*after, centre) > distance(*before, centre));
        }
    }
}

#[test]
fn negative_offset_moves_inward() {
    let cube = unit_cube();
    let (result, _) = offset_mesh(&cube, OffsetOptions::new(-0.1)).unwrap();
    let centre = [0.5, 0.5, 0.5];
    for (before, after) in cube.positions.iter().zip(&result.positions) {
        assert!(distance(*after, centre) < distance(*before, centre));
    }
}

#[test]
fn non_finite_distance_is_rejected() {
    for distance in [f64::NAN, f64::INFINITY] {
        assert!(matches!(
            offset_mesh(&unit_cube(), OffsetOptions::new(distance)),
            Err(OffsetError::InvalidDistance { .. })
        ));
    }
}

#[test]
fn closed_cube_shell_has_no_rims() {
    let (shell, diag) = create_shell(&unit_cube(), ShellOptions::new(0.1).cap_boundary(true)).unwrap();
    assert_eq!(shell.vertex_count(), 16);
    assert_eq!(shell.triangle_count(), 24);
    assert_eq!(diag.rim_triangle_count, 0);
    assert_eq!(diag.open_edge_count, 0);
    assert!(shell.diagnostics(Tolerance::default_geom()).is_watertight());
}

#[test]
fn open_grid_shell_is_stitched_closed() {
    let mesh = grid(3);
    let (shell, diag) = create_shell(&mesh, ShellOptions::new(0.2).cap_boundary(true)).unwrap();
    assert_eq!(diag.open_edge_count, 8);
    assert_eq!(diag.rim_triangle_count, 16);
    assert_eq!(shell.vertex_count(), 18);
    assert_eq!(shell.triangle_count(), 8 + 8 + 16);

    let check = shell.diagnostics(Tolerance::default_geom());
    assert!(check.is_watertight());
    assert!(check.is_manifold());

    for (i, p) in shell.positions.iter().enumerate() {
        let expected = if i < 9 { 0.1 } else { -0.1 };
        assert!((p[2] - expected).abs() < 1e-12);
    }
}

#[test]
fn uncapped_open_shell_warns() {
    let (shell, diag) = create_shell(&grid(2), ShellOptions::new(0.2)).unwrap();
    assert_eq!(shell.triangle_count(), 4);
    assert_eq!(diag.rim_triangle_count, 0);
    assert!(!diag.warnings.is_empty());
}

#[test]
fn invalid_thickness_is_rejected() {
    for thickness in [0.0, -1.0, f64::NAN] {
        assert!(matches!(
            create_shell(&unit_cube(), ShellOptions::new(thickness)),
            Err(OffsetError::InvalidThickness { .. })
        ));
    }
}
