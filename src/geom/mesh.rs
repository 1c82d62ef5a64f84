use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::core::{Point3, Tolerance, Vec3};
use super::diagnostics::MeshDiagnostics;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeshError {
    #[error("flat vertex buffer length {len} is not a multiple of 3")]
    FlatLength { len: usize },

    #[error("mesh indices are not a triangle list (len {len} % 3 != 0)")]
    NotTriangleList { len: usize },

    #[error("vertex {index} has a non-finite coordinate")]
    NonFiniteVertex { index: usize },

    #[error("index {index} is out of bounds for {vertex_count} vertices")]
    IndexOutOfBounds { index: u32, vertex_count: usize },

    #[error("mesh attribute buffers do not match vertex count")]
    AttributeLength,
}

/// How per-vertex normals are derived from face normals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NormalMode {
    /// Area-weighted sum of adjacent face normals.
    #[default]
    Smooth,
    /// Average of unit face normals; every face counts equally.
    Flat,
}

/// Indexed triangle mesh.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeomMesh {
    pub positions: Vec<[f64; 3]>,
    pub indices: Vec<u32>,
    pub uvs: Option<Vec<[f64; 2]>>,
    pub normals: Option<Vec<[f64; 3]>>,
}

impl GeomMesh {
    #[must_use]
    pub fn new(positions: Vec<[f64; 3]>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            indices,
            uvs: None,
            normals: None,
        }
    }

    /// Build from a packed `[x0, y0, z0, x1, ...]` vertex buffer and validate.
    pub fn from_flat(vertices: &[f64], indices: Vec<u32>) -> Result<Self, MeshError> {
        if vertices.len() % 3 != 0 {
            return Err(MeshError::FlatLength {
                len: vertices.len(),
            });
        }
        let positions = vertices
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        let mesh = Self::new(positions, indices);
        mesh.validate()?;
        Ok(mesh)
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty() || self.positions.is_empty()
    }

    /// Position of vertex `index`. Panics if out of bounds; call [`validate`](Self::validate) first.
    #[must_use]
    pub fn point(&self, index: u32) -> Point3 {
        Point3::from_array(self.positions[index as usize])
    }

    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
    }

    /// `[x0, y0, z0, x1, y1, z1, ...]` view over `positions`.
    #[must_use]
    pub fn positions_flat(&self) -> &[f64] {
        self.positions.as_flattened()
    }

    pub fn validate(&self) -> Result<(), MeshError> {
        if self.indices.len() % 3 != 0 {
            return Err(MeshError::NotTriangleList {
                len: self.indices.len(),
            });
        }
        if let Some(index) = self
            .positions
            .iter()
            .position(|p| !p.iter().all(|c| c.is_finite()))
        {
            return Err(MeshError::NonFiniteVertex { index });
        }
        let vertex_count = self.positions.len();
        if let Some(&index) = self.indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(MeshError::IndexOutOfBounds {
                index,
                vertex_count,
            });
        }
        let n = self.positions.len();
        let attributes_ok = self.uvs.as_ref().is_none_or(|uvs| uvs.len() == n)
            && self.normals.as_ref().is_none_or(|normals| normals.len() == n);
        if !attributes_ok {
            return Err(MeshError::AttributeLength);
        }
        Ok(())
    }

    /// Unnormalized face normal `(b - a) × (c - a)`; its length is twice the area.
    #[must_use]
    pub fn face_normal(&self, tri: [u32; 3]) -> Vec3 {
        let a = self.point(tri[0]);
        let b = self.point(tri[1]);
        let c = self.point(tri[2]);
        b.sub_point(a).cross(c.sub_point(a))
    }

    /// Per-vertex unit normals; `None` where the accumulated normal vanishes
    /// (isolated vertices, cancelling faces).
    #[must_use]
    pub fn vertex_normals(&self, mode: NormalMode) -> Vec<Option<Vec3>> {
        let mut sums = vec![Vec3::ZERO; self.positions.len()];
        let mut counts = vec![0usize; self.positions.len()];

        for tri in self.triangles() {
            let face = self.face_normal(tri);
            let contribution = match mode {
                NormalMode::Smooth => face,
                NormalMode::Flat => match face.normalized() {
                    Some(unit) => unit,
                    None => continue,
                },
            };
            for &v in &tri {
                sums[v as usize] = sums[v as usize].add(contribution);
                counts[v as usize] += 1;
            }
        }

        sums.into_iter()
            .zip(counts)
            .map(|(sum, count)| match mode {
                NormalMode::Smooth => sum.normalized(),
                NormalMode::Flat if count > 0 => sum.mul_scalar(1.0 / count as f64).normalized(),
                NormalMode::Flat => None,
            })
            .collect()
    }

    /// Use count of every undirected edge, keyed `(min, max)`.
    #[must_use]
    pub fn edge_use_counts(&self) -> HashMap<(u32, u32), usize> {
        let mut counts = HashMap::new();
        for [a, b, c] in self.triangles() {
            for (p, q) in [(a, b), (b, c), (c, a)] {
                *counts.entry(undirected(p, q)).or_insert(0) += 1;
            }
        }
        counts
    }

    /// One-sided edges, directed as they appear in their only triangle.
    ///
    /// Sorted so the result does not depend on hash order.
    #[must_use]
    pub fn boundary_edges(&self) -> Vec<(u32, u32)> {
        let counts = self.edge_use_counts();
        let mut edges: Vec<(u32, u32)> = self
            .triangles()
            .flat_map(|[a, b, c]| [(a, b), (b, c), (c, a)])
            .filter(|&(p, q)| counts.get(&undirected(p, q)) == Some(&1))
            .collect();
        edges.sort_unstable();
        edges
    }

    #[must_use]
    pub fn non_manifold_edges(&self) -> Vec<(u32, u32)> {
        let mut edges: Vec<_> = self
            .edge_use_counts()
            .into_iter()
            .filter(|&(_, count)| count > 2)
            .map(|(edge, _)| edge)
            .collect();
        edges.sort_unstable();
        edges
    }

    /// Bounding-box diagonal, 0 for an empty mesh.
    #[must_use]
    pub fn extent(&self) -> f64 {
        let points: Vec<Point3> = self.positions.iter().map(|p| Point3::from_array(*p)).collect();
        super::core::BBox::from_points(&points).map_or(0.0, |b| b.size().length())
    }

    #[must_use]
    pub fn diagnostics(&self, tol: Tolerance) -> MeshDiagnostics {
        let counts = self.edge_use_counts();
        let degenerate = self
            .triangles()
            .filter(|&tri| tol.is_zero_vec3(self.face_normal(tri)))
            .count();

        let mut diag = MeshDiagnostics {
            vertex_count: self.vertex_count(),
            triangle_count: self.triangle_count(),
            open_edge_count: counts.values().filter(|&&c| c == 1).count(),
            non_manifold_edge_count: counts.values().filter(|&&c| c > 2).count(),
            degenerate_triangle_count: degenerate,
            ..MeshDiagnostics::default()
        };
        if diag.non_manifold_edge_count > 0 {
            diag.add_warning("mesh has non-manifold edges");
        }
        diag
    }
}

pub(crate) const fn undirected(a: u32, b: u32) -> (u32, u32) {
    if a <= b { (a, b) } else { (b, a) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> GeomMesh {
        GeomMesh::new(
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            vec![0, 1, 2, 0, 2, 3],
        )
    }

    #[test]
    fn test_from_flat_rejects_bad_buffers() {
        assert_eq!(
            GeomMesh::from_flat(&[0.0, 1.0], vec![]),
            Err(MeshError::FlatLength { len: 2 })
        );
        assert_eq!(
            GeomMesh::from_flat(&[0.0; 9], vec![0, 1, 3]),
            Err(MeshError::IndexOutOfBounds {
                index: 3,
                vertex_count: 3
            })
        );
    }

    #[test]
    fn test_quad_boundary_edges_follow_winding() {
        let edges = quad().boundary_edges();
        assert_eq!(edges, vec![(0, 1), (1, 2), (2, 3), (3, 0)]);
    }

    #[test]
    fn test_flat_and_smooth_normals_agree_on_plane() {
        let mesh = quad();
        for mode in [NormalMode::Smooth, NormalMode::Flat] {
            for n in mesh.vertex_normals(mode) {
                assert_eq!(n, Some(Vec3::Z));
            }
        }
    }

    #[test]
    fn test_flat_normals_weight_faces_equally() {
        // Large face facing +z, small face facing -y, hinged on edge 0-1.
        let mesh = GeomMesh::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 10.0, 0.0], [0.0, 0.0, 1.0]],
            vec![0, 1, 2, 0, 1, 3],
        );
        let flat = mesh.vertex_normals(NormalMode::Flat)[0].unwrap();
        let half = std::f64::consts::FRAC_1_SQRT_2;
        assert!((flat.y + half).abs() < 1e-12 && (flat.z - half).abs() < 1e-12);

        let smooth = mesh.vertex_normals(NormalMode::Smooth)[0].unwrap();
        let norm = 101.0_f64.sqrt();
        assert!((smooth.y + 1.0 / norm).abs() < 1e-12 && (smooth.z - 10.0 / norm).abs() < 1e-12);
    }

    #[test]
    fn test_isolated_vertex_has_no_normal() {
        let mut mesh = quad();
        mesh.positions.push([5.0, 5.0, 5.0]);
        assert_eq!(mesh.vertex_normals(NormalMode::Smooth)[4], None);
    }

    #[test]
    fn test_diagnostics_counts_open_edges() {
        let diag = quad().diagnostics(Tolerance::default_geom());
        assert_eq!(diag.open_edge_count, 4);
        assert_eq!(diag.non_manifold_edge_count, 0);
        assert_eq!(diag.degenerate_triangle_count, 0);
    }
}
