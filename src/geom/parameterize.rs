//! Boundary-fixed UV parameterization of disk-topology meshes.
//!
//! The single boundary loop is pinned to a convex target shape and the
//! interior solves the discrete Laplace equation
//! `sumW(v) * x(v) - Σ w(v, n) * x(n) = 0` for `u` and `v` separately.
//! With positive weights and a convex boundary the result is an embedding
//! (Tutte/Floater).

use std::collections::{HashMap, HashSet};
use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use super::budget::SolveBudget;
use super::diagnostics::SolveStatus;
use super::mesh::{GeomMesh, MeshError, undirected};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BoundaryShape {
    /// Unit circle at the origin.
    #[default]
    Circle,
    /// Unit square `[0, 1]²`, starting at the origin corner.
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BoundarySpacing {
    /// Equal parameter steps per boundary vertex.
    #[default]
    Uniform,
    /// Steps proportional to boundary edge length.
    ChordLength,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WeightType {
    /// `½ (cot α + cot β)` from the two angles opposite each edge.
    #[default]
    Cotangent,
    /// Every edge weighs 1 (Tutte embedding).
    Uniform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinearSolver {
    #[default]
    GaussSeidel,
    /// Requires a symmetric positive-definite system, i.e. positive weights.
    ConjugateGradient,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterizeOptions {
    pub weight_type: WeightType,
    pub boundary_shape: BoundaryShape,
    pub spacing: BoundarySpacing,
    pub solver: LinearSolver,
    pub max_iterations: usize,
    /// Gauss–Seidel: largest per-sweep change. Conjugate gradient: largest residual.
    pub tolerance: f64,
}

impl Default for ParameterizeOptions {
    fn default() -> Self {
        Self {
            weight_type: WeightType::Cotangent,
            boundary_shape: BoundaryShape::Circle,
            spacing: BoundarySpacing::Uniform,
            solver: LinearSolver::GaussSeidel,
            max_iterations: 500,
            tolerance: 1e-8,
        }
    }
}

impl ParameterizeOptions {
    #[must_use]
    pub const fn weight_type(mut self, weight_type: WeightType) -> Self {
        self.weight_type = weight_type;
        self
    }

    #[must_use]
    pub const fn boundary_shape(mut self, shape: BoundaryShape) -> Self {
        self.boundary_shape = shape;
        self
    }

    #[must_use]
    pub const fn spacing(mut self, spacing: BoundarySpacing) -> Self {
        self.spacing = spacing;
        self
    }

    #[must_use]
    pub const fn solver(mut self, solver: LinearSolver) -> Self {
        self.solver = solver;
        self
    }

    #[must_use]
    pub const fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub const fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParameterizeError {
    #[error(transparent)]
    InvalidMesh(#[from] MeshError),

    #[error("mesh has no boundary edges (closed surface)")]
    NoBoundary,

    #[error("mesh has {count} boundary loops, expected exactly one")]
    MultipleBoundaries { count: usize },

    #[error("boundary is not a simple loop at vertex {vertex}")]
    NonManifoldBoundary { vertex: u32 },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterizeDiagnostics {
    pub boundary_vertex_count: usize,
    pub interior_vertex_count: usize,
    /// Rows with vanishing weight sum; those vertices sit at the boundary centroid.
    pub singular_vertex_count: usize,
    /// Iterations of the slower of the two coordinate solves.
    pub iterations: usize,
    /// Final convergence measure, in the solver's own metric.
    pub residual: f64,
    pub status: SolveStatus,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameterization {
    /// One `(u, v)` per input vertex.
    pub uvs: Vec<[f64; 2]>,
    /// Ordered boundary loop (vertex indices).
    pub boundary: Vec<u32>,
    pub diagnostics: ParameterizeDiagnostics,
}

impl Parameterization {
    /// Copy of `mesh` carrying these UVs.
    #[must_use]
    pub fn apply_to(&self, mesh: &GeomMesh) -> GeomMesh {
        GeomMesh {
            uvs: Some(self.uvs.clone()),
            ..mesh.clone()
        }
    }
}

/// The mesh's single boundary loop, in triangle winding order.
///
/// The walk starts at the smallest vertex index that begins a boundary edge.
///
/// # Errors
/// No boundary, several disjoint loops, or a vertex where the boundary branches.
pub fn boundary_loop(mesh: &GeomMesh) -> Result<Vec<u32>, ParameterizeError> {
    mesh.validate()?;
    let edges = mesh.boundary_edges();
    if edges.is_empty() {
        return Err(ParameterizeError::NoBoundary);
    }

    let mut next: HashMap<u32, u32> = HashMap::with_capacity(edges.len());
    for &(a, b) in &edges {
        if next.insert(a, b).is_some() {
            return Err(ParameterizeError::NonManifoldBoundary { vertex: a });
        }
    }

    let mut loops: Vec<Vec<u32>> = Vec::new();
    let mut visited: HashSet<u32> = HashSet::with_capacity(edges.len());
    for &(start, _) in &edges {
        if visited.contains(&start) {
            continue;
        }
        let mut cycle = vec![start];
        visited.insert(start);
        let mut current = start;
        loop {
            let Some(&following) = next.get(&current) else {
                return Err(ParameterizeError::NonManifoldBoundary { vertex: current });
            };
            if following == start {
                break;
            }
            if !visited.insert(following) {
                return Err(ParameterizeError::NonManifoldBoundary { vertex: following });
            }
            cycle.push(following);
            current = following;
        }
        loops.push(cycle);
    }

    if loops.len() > 1 {
        return Err(ParameterizeError::MultipleBoundaries { count: loops.len() });
    }
    loops.pop().ok_or(ParameterizeError::NoBoundary)
}

/// Parameterize with an iteration budget of `options.max_iterations`.
///
/// # Errors
/// See [`boundary_loop`].
pub fn parameterize(
    mesh: &GeomMesh,
    options: ParameterizeOptions,
) -> Result<Parameterization, ParameterizeError> {
    parameterize_with_budget(mesh, options, SolveBudget::new(options.max_iterations))
}

/// Parameterize under an explicit budget; the budget's iteration cap wins over
/// `options.max_iterations`.
///
/// # Errors
/// See [`boundary_loop`].
pub fn parameterize_with_budget(
    mesh: &GeomMesh,
    options: ParameterizeOptions,
    budget: SolveBudget,
) -> Result<Parameterization, ParameterizeError> {
    let boundary = boundary_loop(mesh)?;
    let n = mesh.vertex_count();

    let targets = boundary_targets(mesh, &boundary, options.boundary_shape, options.spacing);
    let centroid = centroid(&targets);

    let mut fixed = vec![false; n];
    let mut u = vec![centroid[0]; n];
    let mut v = vec![centroid[1]; n];
    for (&vertex, target) in boundary.iter().zip(&targets) {
        fixed[vertex as usize] = true;
        u[vertex as usize] = target[0];
        v[vertex as usize] = target[1];
    }

    let neighbors = edge_weights(mesh, options.weight_type);
    let mut diag = ParameterizeDiagnostics {
        boundary_vertex_count: boundary.len(),
        interior_vertex_count: n - boundary.len(),
        ..ParameterizeDiagnostics::default()
    };

    for (vertex, row) in neighbors.iter().enumerate() {
        if fixed[vertex] {
            continue;
        }
        let sum: f64 = row.iter().map(|(_, w)| w).sum();
        if sum.abs() < 1e-12 {
            fixed[vertex] = true;
            diag.singular_vertex_count += 1;
        }
    }
    if diag.singular_vertex_count > 0 {
        log::warn!(
            "parameterization: {} singular rows held at the boundary centroid",
            diag.singular_vertex_count
        );
        diag.warnings.push(format!(
            "{} vertices with zero weight sum held at boundary centroid",
            diag.singular_vertex_count
        ));
    }

    let system = Laplacian {
        neighbors: &neighbors,
        fixed: &fixed,
    };
    let solve = |values: &mut [f64]| match options.solver {
        LinearSolver::GaussSeidel => system.gauss_seidel(values, options.tolerance, &budget),
        LinearSolver::ConjugateGradient => system.conjugate_gradient(values, options.tolerance, &budget),
    };
    let su = solve(&mut u);
    let sv = solve(&mut v);

    diag.iterations = su.iterations.max(sv.iterations);
    diag.residual = su.residual.max(sv.residual);
    diag.status = su.status.worst(sv.status);
    if !diag.status.is_converged() {
        log::warn!("parameterization stopped early: {}", diag.status);
        diag.warnings.push(format!("solver stopped early: {}", diag.status));
    }

    log::debug!(
        "parameterized {} vertices ({} boundary) in {} iterations",
        n,
        boundary.len(),
        diag.iterations
    );

    Ok(Parameterization {
        uvs: u.into_iter().zip(v).map(|(u, v)| [u, v]).collect(),
        boundary,
        diagnostics: diag,
    })
}

// ───────────────────────────────────────────────────────────────────────────
// Boundary mapping
// ───────────────────────────────────────────────────────────────────────────

fn boundary_targets(
    mesh: &GeomMesh,
    boundary: &[u32],
    shape: BoundaryShape,
    spacing: BoundarySpacing,
) -> Vec<[f64; 2]> {
    let count = boundary.len();
    let uniform = || (0..count).map(|i| i as f64 / count as f64).collect::<Vec<_>>();

    let params = match spacing {
        BoundarySpacing::Uniform => uniform(),
        BoundarySpacing::ChordLength => {
            let lengths: Vec<f64> = (0..count)
                .map(|i| mesh.point(boundary[i]).distance_to(mesh.point(boundary[(i + 1) % count])))
                .collect();
            let total: f64 = lengths.iter().sum();
            if total > 0.0 && total.is_finite() {
                let mut acc = 0.0;
                lengths
                    .iter()
                    .map(|len| {
                        let t = acc / total;
                        acc += len;
                        t
                    })
                    .collect()
            } else {
                uniform()
            }
        }
    };

    params.into_iter().map(|t| shape_point(shape, t)).collect()
}

/// Point at fraction `t ∈ [0, 1)` of the shape's perimeter, counter-clockwise.
fn shape_point(shape: BoundaryShape, t: f64) -> [f64; 2] {
    match shape {
        BoundaryShape::Circle => {
            let angle = TAU * t;
            [angle.cos(), angle.sin()]
        }
        BoundaryShape::Square => {
            let s = 4.0 * t;
            if s < 1.0 {
                [s, 0.0]
            } else if s < 2.0 {
                [1.0, s - 1.0]
            } else if s < 3.0 {
                [3.0 - s, 1.0]
            } else {
                [0.0, 4.0 - s]
            }
        }
    }
}

fn centroid(points: &[[f64; 2]]) -> [f64; 2] {
    let n = points.len().max(1) as f64;
    let (su, sv) = points.iter().fold((0.0, 0.0), |(su, sv), p| (su + p[0], sv + p[1]));
    [su / n, sv / n]
}

// ───────────────────────────────────────────────────────────────────────────
// Laplacian
// ───────────────────────────────────────────────────────────────────────────

/// Symmetric adjacency lists `(neighbor, weight)` per vertex.
fn edge_weights(mesh: &GeomMesh, weight_type: WeightType) -> Vec<Vec<(usize, f64)>> {
    let mut weights: HashMap<(u32, u32), f64> = HashMap::new();

    for [a, b, c] in mesh.triangles() {
        for (i, j, k) in [(a, b, c), (b, c, a), (c, a, b)] {
            let key = undirected(i, j);
            match weight_type {
                WeightType::Uniform => {
                    weights.insert(key, 1.0);
                }
                WeightType::Cotangent => {
                    let pk = mesh.point(k);
                    let e1 = mesh.point(i).sub_point(pk);
                    let e2 = mesh.point(j).sub_point(pk);
                    let cross = e1.cross(e2).length();
                    let cot = if cross > 1e-15 { e1.dot(e2) / cross } else { 0.0 };
                    *weights.entry(key).or_insert(0.0) += 0.5 * cot;
                }
            }
        }
    }

    let mut neighbors = vec![Vec::new(); mesh.vertex_count()];
    let mut entries: Vec<_> = weights.into_iter().collect();
    entries.sort_unstable_by_key(|&(key, _)| key);
    for ((a, b), w) in entries {
        neighbors[a as usize].push((b as usize, w));
        neighbors[b as usize].push((a as usize, w));
    }
    neighbors
}

struct SolveOutcome {
    iterations: usize,
    residual: f64,
    status: SolveStatus,
}

struct Laplacian<'a> {
    neighbors: &'a [Vec<(usize, f64)>],
    fixed: &'a [bool],
}

impl Laplacian<'_> {
    fn gauss_seidel(&self, x: &mut [f64], tolerance: f64, budget: &SolveBudget) -> SolveOutcome {
        let mut iteration = 0;
        let mut max_change = f64::INFINITY;

        loop {
            if let Some(status) = budget.exhausted(iteration) {
                return SolveOutcome {
                    iterations: iteration,
                    residual: max_change,
                    status,
                };
            }

            max_change = 0.0;
            for (vertex, row) in self.neighbors.iter().enumerate() {
                if self.fixed[vertex] {
                    continue;
                }
                let (sum_w, sum_wx) = row
                    .iter()
                    .fold((0.0, 0.0), |(sw, swx), &(n, w)| (sw + w, swx + w * x[n]));
                let updated = sum_wx / sum_w;
                max_change = f64::max(max_change, (updated - x[vertex]).abs());
                x[vertex] = updated;
            }
            iteration += 1;

            if !max_change.is_finite() {
                return SolveOutcome {
                    iterations: iteration,
                    residual: max_change,
                    status: SolveStatus::Diverged,
                };
            }
            log::trace!("gauss-seidel sweep {iteration}: max change {max_change:e}");
            if max_change < tolerance {
                return SolveOutcome {
                    iterations: iteration,
                    residual: max_change,
                    status: SolveStatus::Converged,
                };
            }
        }
    }

    /// `(A x)_i` over free rows; fixed columns are treated as zero.
    fn apply(&self, x: &[f64], out: &mut [f64]) {
        for (vertex, row) in self.neighbors.iter().enumerate() {
            if self.fixed[vertex] {
                out[vertex] = 0.0;
                continue;
            }
            out[vertex] = row.iter().fold(0.0, |acc, &(n, w)| {
                let off = if self.fixed[n] { 0.0 } else { w * x[n] };
                acc + w * x[vertex] - off
            });
        }
    }

    fn conjugate_gradient(&self, x: &mut [f64], tolerance: f64, budget: &SolveBudget) -> SolveOutcome {
        let n = x.len();
        // b_i = Σ_fixed w * x_fixed
        let b: Vec<f64> = (0..n)
            .map(|vertex| {
                if self.fixed[vertex] {
                    return 0.0;
                }
                self.neighbors[vertex]
                    .iter()
                    .filter(|(nb, _)| self.fixed[*nb])
                    .map(|&(nb, w)| w * x[nb])
                    .sum()
            })
            .collect();

        let mut ax = vec![0.0; n];
        self.apply(x, &mut ax);
        let mut r: Vec<f64> = b.iter().zip(&ax).map(|(b, ax)| b - ax).collect();
        let mut p = r.clone();
        let mut rr: f64 = r.iter().map(|v| v * v).sum();
        let mut ap = vec![0.0; n];
        let max_abs = |v: &[f64]| v.iter().fold(0.0_f64, |m, x| m.max(x.abs()));

        let mut iteration = 0;
        loop {
            let residual = max_abs(&r);
            if residual < tolerance {
                return SolveOutcome {
                    iterations: iteration,
                    residual,
                    status: SolveStatus::Converged,
                };
            }
            if let Some(status) = budget.exhausted(iteration) {
                return SolveOutcome {
                    iterations: iteration,
                    residual,
                    status,
                };
            }

            self.apply(&p, &mut ap);
            let pap: f64 = p.iter().zip(&ap).map(|(p, ap)| p * ap).sum();
            if !(pap.is_finite() && pap > 0.0) {
                return SolveOutcome {
                    iterations: iteration,
                    residual,
                    status: SolveStatus::Diverged,
                };
            }
            let alpha = rr / pap;
            for i in 0..n {
                if self.fixed[i] {
                    continue;
                }
                x[i] += alpha * p[i];
                r[i] -= alpha * ap[i];
            }
            let rr_next: f64 = r.iter().map(|v| v * v).sum();
            let beta = rr_next / rr;
            for i in 0..n {
                p[i] = r[i] + beta * p[i];
            }
            rr = rr_next;
            iteration += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 3x3 vertex grid on the unit square, one interior vertex (index 4).
    fn grid() -> GeomMesh {
        let mut positions = Vec::new();
        for j in 0..3 {
            for i in 0..3 {
                positions.push([f64::from(i) * 0.5, f64::from(j) * 0.5, 0.0]);
            }
        }
        let mut indices = Vec::new();
        for j in 0..2u32 {
            for i in 0..2u32 {
                let a = j * 3 + i;
                indices.extend_from_slice(&[a, a + 1, a + 4, a, a + 4, a + 3]);
            }
        }
        GeomMesh::new(positions, indices)
    }

    #[test]
    fn test_boundary_loop_walks_winding_order() {
        let boundary = boundary_loop(&grid()).unwrap();
        assert_eq!(boundary, vec![0, 1, 2, 5, 8, 7, 6, 3]);
    }

    #[test]
    fn test_closed_mesh_has_no_boundary() {
        let tetra = GeomMesh::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            vec![0, 2, 1, 0, 1, 3, 1, 2, 3, 0, 3, 2],
        );
        assert_eq!(boundary_loop(&tetra), Err(ParameterizeError::NoBoundary));
    }

    #[test]
    fn test_two_islands_are_rejected() {
        let mesh = GeomMesh::new(
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [5.0, 0.0, 0.0],
                [6.0, 0.0, 0.0],
                [5.0, 1.0, 0.0],
            ],
            vec![0, 1, 2, 3, 4, 5],
        );
        assert_eq!(
            boundary_loop(&mesh),
            Err(ParameterizeError::MultipleBoundaries { count: 2 })
        );
    }

    #[test]
    fn test_square_boundary_corners() {
        assert_eq!(shape_point(BoundaryShape::Square, 0.0), [0.0, 0.0]);
        assert_eq!(shape_point(BoundaryShape::Square, 0.25), [1.0, 0.0]);
        assert_eq!(shape_point(BoundaryShape::Square, 0.5), [1.0, 1.0]);
        assert_eq!(shape_point(BoundaryShape::Square, 0.75), [0.0, 1.0]);
    }

    #[test]
    fn test_symmetric_interior_lands_at_centre() {
        let result = parameterize(
            &grid(),
            ParameterizeOptions::default().boundary_shape(BoundaryShape::Square),
        )
        .unwrap();
        let centre = result.uvs[4];
        assert!((centre[0] - 0.5).abs() < 1e-7, "{centre:?}");
        assert!((centre[1] - 0.5).abs() < 1e-7, "{centre:?}");
        assert!(result.diagnostics.status.is_converged());
    }

    #[test]
    fn test_conjugate_gradient_matches_gauss_seidel() {
        let options = ParameterizeOptions::default().weight_type(WeightType::Uniform);
        let gs = parameterize(&grid(), options).unwrap();
        let cg = parameterize(&grid(), options.solver(LinearSolver::ConjugateGradient)).unwrap();
        for (a, b) in gs.uvs.iter().zip(&cg.uvs) {
            assert!((a[0] - b[0]).abs() < 1e-6 && (a[1] - b[1]).abs() < 1e-6);
        }
        assert!(cg.diagnostics.status.is_converged());
    }

    #[test]
    fn test_zero_iteration_budget_reports_limit() {
        let result = parameterize(&grid(), ParameterizeOptions::default().max_iterations(0)).unwrap();
        assert_eq!(result.diagnostics.status, SolveStatus::IterationLimit);
    }
}
