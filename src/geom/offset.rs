//! Offsetting and shelling of triangle meshes along vertex normals.
//!
//! - [`offset_mesh`] moves every vertex by a signed distance along its normal.
//! - [`create_shell`] builds a two-sided shell of a given thickness, optionally
//!   stitching the open boundary between the outer and inner sheets.
//!
//! ```ignore
//! use cam_kernel::geom::{create_shell, ShellOptions};
//!
//! let (shell, diag) = create_shell(&mesh, ShellOptions::new(0.1).cap_boundary(true))?;
//! assert_eq!(diag.rim_triangle_count, 2 * diag.open_edge_count);
//! ```

use super::core::{Point3, Vec3};
use super::mesh::{GeomMesh, MeshError, NormalMode};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetOptions {
    /// Signed distance; negative moves against the normals.
    pub distance: f64,
    pub normal_mode: NormalMode,
}

impl OffsetOptions {
    #[must_use]
    pub const fn new(distance: f64) -> Self {
        Self {
            distance,
            normal_mode: NormalMode::Smooth,
        }
    }

    #[must_use]
    pub const fn normal_mode(mut self, mode: NormalMode) -> Self {
        self.normal_mode = mode;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShellOptions {
    /// Total wall thickness, split evenly on both sides of the input.
    pub thickness: f64,
    /// Stitch every one-sided edge with a rim quad.
    pub cap_boundary: bool,
    pub normal_mode: NormalMode,
}

impl ShellOptions {
    #[must_use]
    pub const fn new(thickness: f64) -> Self {
        Self {
            thickness,
            cap_boundary: false,
            normal_mode: NormalMode::Smooth,
        }
    }

    #[must_use]
    pub const fn cap_boundary(mut self, cap: bool) -> Self {
        self.cap_boundary = cap;
        self
    }

    #[must_use]
    pub const fn normal_mode(mut self, mode: NormalMode) -> Self {
        self.normal_mode = mode;
        self
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OffsetError {
    #[error("offset distance must be finite: {distance}")]
    InvalidDistance { distance: f64 },

    #[error("shell thickness must be finite and positive: {thickness}")]
    InvalidThickness { thickness: f64 },

    #[error("input mesh has no triangles")]
    EmptyMesh,

    #[error(transparent)]
    InvalidMesh(#[from] MeshError),

    /// Outer and inner copies together must stay addressable by `u32` indices.
    #[error("shell of {vertex_count} vertices exceeds u32 indexing")]
    TooManyVertices { vertex_count: usize },

    /// Shell capping needs every edge to border at most two triangles.
    #[error("cannot cap shell: {count} non-manifold edges")]
    NonManifoldEdges { count: usize },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OffsetDiagnostics {
    pub original_vertex_count: usize,
    pub original_triangle_count: usize,
    pub result_vertex_count: usize,
    pub result_triangle_count: usize,
    /// One-sided edges in the input.
    pub open_edge_count: usize,
    pub rim_triangle_count: usize,
    /// Vertices left in place because their normal vanished.
    pub degenerate_normal_count: usize,
    /// Heuristic: the distance exceeds half the estimated minimum feature size.
    pub potential_self_intersection: bool,
    pub warnings: Vec<String>,
}

/// Offset every vertex by `options.distance` along its normal.
///
/// A zero distance returns a copy of the input. Vertices without a usable
/// normal stay where they are and are counted in the diagnostics.
///
/// # Errors
/// Non-finite distance, an invalid mesh, or a mesh without triangles.
pub fn offset_mesh(
    mesh: &GeomMesh,
    options: OffsetOptions,
) -> Result<(GeomMesh, OffsetDiagnostics), OffsetError> {
    if !options.distance.is_finite() {
        return Err(OffsetError::InvalidDistance {
            distance: options.distance,
        });
    }
    mesh.validate()?;

    let mut diag = OffsetDiagnostics {
        original_vertex_count: mesh.vertex_count(),
        original_triangle_count: mesh.triangle_count(),
        ..OffsetDiagnostics::default()
    };

    if options.distance == 0.0 {
        diag.result_vertex_count = mesh.vertex_count();
        diag.result_triangle_count = mesh.triangle_count();
        return Ok((mesh.clone(), diag));
    }
    if mesh.triangle_count() == 0 {
        return Err(OffsetError::EmptyMesh);
    }

    let normals = mesh.vertex_normals(options.normal_mode);
    diag.open_edge_count = mesh.boundary_edges().len();
    check_feature_size(mesh, &normals, options.distance, &mut diag);

    let (positions, degenerate) = displace(&mesh.positions, &normals, options.distance);
    diag.degenerate_normal_count = degenerate;
    warn_degenerate(&mut diag);

    let result = GeomMesh {
        positions,
        indices: mesh.indices.clone(),
        uvs: mesh.uvs.clone(),
        normals: mesh.normals.clone(),
    };
    diag.result_vertex_count = result.vertex_count();
    diag.result_triangle_count = result.triangle_count();

    log::debug!(
        "offset mesh by {}: {} vertices, {} degenerate normals",
        options.distance,
        diag.result_vertex_count,
        diag.degenerate_normal_count
    );
    Ok((result, diag))
}

/// Build a closed-wall shell of `options.thickness` around a surface mesh.
///
/// The outer sheet sits at `+thickness / 2` with the input winding, the inner
/// sheet at `-thickness / 2` with reversed winding and indices shifted by the
/// outer vertex count. With `cap_boundary`, each one-sided edge `a -> b`
/// becomes the rim triangles `[b, a, a']` and `[b, a', b']`, where primes
/// denote inner copies.
///
/// # Errors
/// Invalid thickness or mesh, an empty mesh, too many vertices for `u32` shell
/// indices, or non-manifold edges when capping.
pub fn create_shell(
    mesh: &GeomMesh,
    options: ShellOptions,
) -> Result<(GeomMesh, OffsetDiagnostics), OffsetError> {
    if !options.thickness.is_finite() || options.thickness <= 0.0 {
        return Err(OffsetError::InvalidThickness {
            thickness: options.thickness,
        });
    }
    mesh.validate()?;
    if mesh.triangle_count() == 0 {
        return Err(OffsetError::EmptyMesh);
    }

    let boundary = mesh.boundary_edges();
    if options.cap_boundary {
        let non_manifold = mesh.non_manifold_edges();
        if !non_manifold.is_empty() {
            log::warn!("shell capping aborted: {} non-manifold edges", non_manifold.len());
            return Err(OffsetError::NonManifoldEdges {
                count: non_manifold.len(),
            });
        }
    }

    let mut diag = OffsetDiagnostics {
        original_vertex_count: mesh.vertex_count(),
        original_triangle_count: mesh.triangle_count(),
        open_edge_count: boundary.len(),
        ..OffsetDiagnostics::default()
    };

    let half = options.thickness * 0.5;
    let normals = mesh.vertex_normals(options.normal_mode);
    check_feature_size(mesh, &normals, half, &mut diag);

    let (mut positions, degenerate) = displace(&mesh.positions, &normals, half);
    let (inner, _) = displace(&mesh.positions, &normals, -half);
    positions.extend(inner);
    diag.degenerate_normal_count = degenerate;
    warn_degenerate(&mut diag);

    let shift = shell_index_shift(mesh.vertex_count())?;
    let mut indices = Vec::with_capacity(mesh.indices.len() * 2 + boundary.len() * 6);
    indices.extend_from_slice(&mesh.indices);
    for [a, b, c] in mesh.triangles() {
        indices.extend_from_slice(&[a + shift, c + shift, b + shift]);
    }

    if options.cap_boundary {
        for &(a, b) in &boundary {
            let (a_in, b_in) = (a + shift, b + shift);
            indices.extend_from_slice(&[b, a, a_in, b, a_in, b_in]);
        }
        diag.rim_triangle_count = boundary.len() * 2;
    } else if !boundary.is_empty() {
        diag.warnings
            .push(format!("shell left open along {} boundary edges", boundary.len()));
    }

    let result = GeomMesh::new(positions, indices);
    diag.result_vertex_count = result.vertex_count();
    diag.result_triangle_count = result.triangle_count();

    log::debug!(
        "shell thickness {}: {} vertices, {} triangles ({} rim)",
        options.thickness,
        diag.result_vertex_count,
        diag.result_triangle_count,
        diag.rim_triangle_count
    );
    Ok((result, diag))
}

/// Index offset of the inner copy; every shell index must stay below `2 * shift`.
fn shell_index_shift(vertex_count: usize) -> Result<u32, OffsetError> {
    u32::try_from(vertex_count)
        .ok()
        .filter(|&shift| shift <= 1 << 31)
        .ok_or(OffsetError::TooManyVertices { vertex_count })
}

fn displace(positions: &[[f64; 3]], normals: &[Option<Vec3>], distance: f64) -> (Vec<[f64; 3]>, usize) {
    let mut degenerate = 0;
    let moved = positions
        .iter()
        .zip(normals)
        .map(|(p, n)| match n {
            Some(n) => Point3::from_array(*p).add_vec(n.mul_scalar(distance)).to_array(),
            None => {
                degenerate += 1;
                *p
            }
        })
        .collect();
    (moved, degenerate)
}

fn warn_degenerate(diag: &mut OffsetDiagnostics) {
    if diag.degenerate_normal_count > 0 {
        log::warn!("{} vertices have degenerate normals", diag.degenerate_normal_count);
        diag.warnings.push(format!(
            "{} vertices with degenerate normals kept in place",
            diag.degenerate_normal_count
        ));
    }
}

fn check_feature_size(
    mesh: &GeomMesh,
    normals: &[Option<Vec3>],
    distance: f64,
    diag: &mut OffsetDiagnostics,
) {
    let min_feature_size = estimate_min_feature_size(mesh, normals);
    if distance.abs() > min_feature_size * 0.5 {
        diag.potential_self_intersection = true;
        diag.warnings.push(format!(
            "offset distance ({:.4}) exceeds half of min feature size ({:.4}); may self-intersect",
            distance.abs(),
            min_feature_size
        ));
    }
}

/// Smaller of the shortest edge and the tightest curvature radius, where the
/// radius across an edge is `edge_length / angle(n_a, n_b)`.
fn estimate_min_feature_size(mesh: &GeomMesh, normals: &[Option<Vec3>]) -> f64 {
    let mut min_edge = f64::MAX;
    let mut min_radius = f64::MAX;

    for [a, b, c] in mesh.triangles() {
        for (p, q) in [(a, b), (b, c), (c, a)] {
            let len = mesh.point(p).distance_to(mesh.point(q));
            if !(len.is_finite() && len > 0.0) {
                continue;
            }
            min_edge = min_edge.min(len);

            let (Some(np), Some(nq)) = (normals[p as usize], normals[q as usize]) else {
                continue;
            };
            let angle = np.dot(nq).clamp(-1.0, 1.0).acos();
            if angle > 1e-6 {
                min_radius = min_radius.min(len / angle);
            }
        }
    }

    let size = min_edge.min(min_radius);
    if size < f64::MAX { size } else { 1.0 }
}
