//! Numerical surface/surface intersection by seeding and marching.
//!
//! Both surfaces are reparameterized onto `[0, 1]²`. Seeds come from a coarse
//! sample grid and are pulled onto the intersection with a damped
//! minimum-norm Newton iteration on `F = S1(u1, v1) - S2(u2, v2)`:
//!
//! ```text
//! J = [S1u  S1v  -S2u  -S2v]          (3 x 4)
//! Δ = -Jᵀ (J Jᵀ + λI)⁻¹ F
//! ```
//!
//! Each seed not already covered by a traced curve is marched both ways along
//! `n1 × n2`, re-refining after every step. Visited cells are quantized
//! `(round(u1 / step), round(v1 / step))` keys, which detect closed loops and
//! stop traces from re-walking earlier curves.

use std::collections::HashMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::budget::SolveBudget;
use super::core::{Point3, Tolerance, Vec3};
use super::diagnostics::SolveStatus;
use super::kdtree::{KdTree, SpatialQuery};
use super::surface::Surface;

/// Sequence distance below which a nearby visited cell belongs to the
/// current neighbourhood of the trace rather than an earlier pass.
const RECENT_STEPS: i64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntersectionOptions {
    /// Seed acceptance gap.
    pub tolerance: f64,
    /// Gap every marched point is refined to.
    pub refine_tolerance: f64,
    /// Samples per parameter axis for the seed grid.
    pub grid_resolution: usize,
    /// Marching step, measured in the first surface's normalized parameters.
    pub step_size: f64,
    pub max_seed_iterations: usize,
    pub max_refine_iterations: usize,
    /// Step cap for one marching direction.
    pub max_steps: usize,
    /// Candidate pair distance; `None` derives it from the sample spacing.
    pub seed_radius: Option<f64>,
}

impl Default for IntersectionOptions {
    fn default() -> Self {
        Self {
            tolerance: Tolerance::INTERSECTION.eps,
            refine_tolerance: Tolerance::REFINE.eps,
            grid_resolution: 10,
            step_size: 0.01,
            max_seed_iterations: 20,
            max_refine_iterations: 20,
            max_steps: 10_000,
            seed_radius: None,
        }
    }
}

impl IntersectionOptions {
    #[must_use]
    pub const fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    #[must_use]
    pub const fn refine_tolerance(mut self, tolerance: f64) -> Self {
        self.refine_tolerance = tolerance;
        self
    }

    #[must_use]
    pub const fn grid_resolution(mut self, resolution: usize) -> Self {
        self.grid_resolution = resolution;
        self
    }

    #[must_use]
    pub const fn step_size(mut self, step: f64) -> Self {
        self.step_size = step;
        self
    }

    #[must_use]
    pub const fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    #[must_use]
    pub const fn seed_radius(mut self, radius: f64) -> Self {
        self.seed_radius = Some(radius);
        self
    }
}

/// A point on both surfaces, with normalized parameters on each.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntersectionPoint {
    pub u1: f64,
    pub v1: f64,
    pub u2: f64,
    pub v2: f64,
    pub point: Point3,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntersectionCurve {
    pub points: Vec<IntersectionPoint>,
    /// The trace returned to its own start.
    pub closed: bool,
}

impl IntersectionCurve {
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[must_use]
    pub fn length(&self) -> f64 {
        let open: f64 = self
            .points
            .windows(2)
            .map(|w| w[0].point.distance_to(w[1].point))
            .sum();
        match (self.closed, self.points.first(), self.points.last()) {
            (true, Some(first), Some(last)) => open + last.point.distance_to(first.point),
            _ => open,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntersectionDiagnostics {
    pub seed_radius: f64,
    pub candidate_pairs: usize,
    /// Candidates that refined below `tolerance`, after de-duplication.
    pub seeds: usize,
    pub traced_seeds: usize,
    pub boundary_stops: usize,
    pub closed_loops: usize,
    /// Traces stopped where the surfaces became tangent: `|n1 × n2|` fell
    /// below `sqrt(refine_tolerance)` or a corrected step collapsed.
    pub tangential_stops: usize,
    /// Traces stopped because a step failed to refine.
    pub unconverged_steps: usize,
    pub discarded_curves: usize,
    pub total_steps: usize,
    pub status: SolveStatus,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntersectionResult {
    pub curves: Vec<IntersectionCurve>,
    pub diagnostics: IntersectionDiagnostics,
}

/// Intersect two surfaces with a step budget of `options.max_steps` per direction.
#[must_use]
pub fn intersect_surfaces<A, B>(s1: &A, s2: &B, options: IntersectionOptions) -> IntersectionResult
where
    A: Surface + Sync + ?Sized,
    B: Surface + Sync + ?Sized,
{
    intersect_surfaces_with_budget(s1, s2, options, SolveBudget::new(usize::MAX))
}

/// Intersect under a global budget counted in marching steps.
///
/// On exhaustion the curves traced so far are returned and
/// `diagnostics.status` names the exhausted limit.
#[must_use]
pub fn intersect_surfaces_with_budget<A, B>(
    s1: &A,
    s2: &B,
    options: IntersectionOptions,
    budget: SolveBudget,
) -> IntersectionResult
where
    A: Surface + Sync + ?Sized,
    B: Surface + Sync + ?Sized,
{
    let pair = Pair {
        a: Patch::new(s1),
        b: Patch::new(s2),
    };
    let mut diag = IntersectionDiagnostics::default();

    let seeds = find_seeds(&pair, &options, &mut diag);
    let mut tracer = Tracer {
        pair: &pair,
        options: &options,
        budget: &budget,
        visited: HashMap::new(),
        diag,
    };

    let mut curves = Vec::new();
    for seed in seeds {
        if tracer.diag.status != SolveStatus::Converged {
            break;
        }
        if tracer.is_covered(seed) {
            continue;
        }
        let curve_id = tracer.diag.traced_seeds;
        match tracer.trace(seed, curve_id) {
            Some(curve) => curves.push(curve),
            None => tracer.diag.discarded_curves += 1,
        }
    }

    let mut diag = tracer.diag;
    if diag.tangential_stops > 0 {
        log::warn!("surface intersection: {} tangential stops", diag.tangential_stops);
        diag.warnings.push(format!(
            "{} traces stopped at tangential contact",
            diag.tangential_stops
        ));
    }
    if diag.unconverged_steps > 0 {
        log::warn!("surface intersection: {} unconverged steps", diag.unconverged_steps);
        diag.warnings.push(format!(
            "{} traces stopped on a step that did not refine",
            diag.unconverged_steps
        ));
    }
    log::debug!(
        "surface intersection: {} curves from {} seeds ({} candidates)",
        curves.len(),
        diag.seeds,
        diag.candidate_pairs
    );

    IntersectionResult {
        curves,
        diagnostics: diag,
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Normalized surfaces
// ───────────────────────────────────────────────────────────────────────────

/// A surface viewed through `[0, 1]²` parameters.
struct Patch<'a, S: ?Sized> {
    surface: &'a S,
    u0: f64,
    du: f64,
    v0: f64,
    dv: f64,
}

impl<'a, S: Surface + ?Sized> Patch<'a, S> {
    fn new(surface: &'a S) -> Self {
        let (u0, u1) = surface.domain_u();
        let (v0, v1) = surface.domain_v();
        Self {
            surface,
            u0,
            du: u1 - u0,
            v0,
            dv: v1 - v0,
        }
    }

    fn point(&self, u: f64, v: f64) -> Point3 {
        self.surface.point_at(self.u0 + u * self.du, self.v0 + v * self.dv)
    }

    fn partials(&self, u: f64, v: f64) -> (Vec3, Vec3) {
        let (su, sv) = self
            .surface
            .partial_derivatives_at(self.u0 + u * self.du, self.v0 + v * self.dv);
        (su.mul_scalar(self.du), sv.mul_scalar(self.dv))
    }

    fn normal(&self, u: f64, v: f64) -> Option<Vec3> {
        let (su, sv) = self.partials(u, v);
        su.cross(sv).normalized()
    }
}

struct Pair<'a, A: ?Sized, B: ?Sized> {
    a: Patch<'a, A>,
    b: Patch<'a, B>,
}

type Params = [f64; 4];

fn clamp_params(p: Params) -> Params {
    p.map(|x| x.clamp(0.0, 1.0))
}

fn on_boundary(p: Params) -> bool {
    p.iter().any(|&x| x <= 1e-9 || x >= 1.0 - 1e-9)
}

impl<A: Surface + ?Sized, B: Surface + ?Sized> Pair<'_, A, B> {
    fn residual(&self, p: Params) -> Vec3 {
        self.a.point(p[0], p[1]).sub_point(self.b.point(p[2], p[3]))
    }

    fn to_point(&self, p: Params) -> IntersectionPoint {
        let pa = self.a.point(p[0], p[1]);
        let pb = self.b.point(p[2], p[3]);
        IntersectionPoint {
            u1: p[0],
            v1: p[1],
            u2: p[2],
            v2: p[3],
            point: Point3::new((pa.x + pb.x) * 0.5, (pa.y + pb.y) * 0.5, (pa.z + pb.z) * 0.5),
        }
    }

    /// Damped minimum-norm Newton with backtracking, clamped to `[0, 1]⁴`.
    fn refine(&self, start: Params, tolerance: f64, max_iterations: usize) -> Option<(Params, f64)> {
        let mut p = clamp_params(start);
        let mut f = self.residual(p);
        let mut gap = f.length();

        for _ in 0..max_iterations {
            if gap < tolerance {
                return Some((p, gap));
            }
            if !gap.is_finite() {
                return None;
            }

            let (a_u, a_v) = self.a.partials(p[0], p[1]);
            let (b_u, b_v) = self.b.partials(p[2], p[3]);
            let columns = [a_u, a_v, b_u.mul_scalar(-1.0), b_v.mul_scalar(-1.0)];
            let delta = min_norm_step(&columns, f)?;

            let mut accepted = false;
            let mut alpha = 1.0;
            for _ in 0..6 {
                let trial = clamp_params([
                    p[0] + alpha * delta[0],
                    p[1] + alpha * delta[1],
                    p[2] + alpha * delta[2],
                    p[3] + alpha * delta[3],
                ]);
                let trial_f = self.residual(trial);
                let trial_gap = trial_f.length();
                if trial_gap < gap {
                    p = trial;
                    f = trial_f;
                    gap = trial_gap;
                    accepted = true;
                    break;
                }
                alpha *= 0.5;
            }
            if !accepted {
                break;
            }
        }

        (gap < tolerance).then_some((p, gap))
    }
}

/// `Δ = -Jᵀ (J Jᵀ + λI)⁻¹ F` for a 3 x 4 Jacobian given by its columns.
fn min_norm_step(columns: &[Vec3; 4], f: Vec3) -> Option<Params> {
    let mut jjt = [[0.0; 3]; 3];
    for c in columns {
        let c = c.to_array();
        for r in 0..3 {
            for s in 0..3 {
                jjt[r][s] += c[r] * c[s];
            }
        }
    }
    let trace = jjt[0][0] + jjt[1][1] + jjt[2][2];
    let lambda = 1e-12 * (1.0 + trace);
    for (r, row) in jjt.iter_mut().enumerate() {
        row[r] += lambda;
    }

    let y = solve3(jjt, f.to_array())?;
    let y = Vec3::from_array(y);
    Some(columns.map(|c| -c.dot(y)))
}

/// Gaussian elimination with partial pivoting.
fn solve3(mut m: [[f64; 3]; 3], mut b: [f64; 3]) -> Option<[f64; 3]> {
    for col in 0..3 {
        let pivot = (col..3).max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))?;
        let magnitude = m[pivot][col].abs();
        if magnitude.is_nan() || magnitude <= 1e-300 {
            return None;
        }
        m.swap(col, pivot);
        b.swap(col, pivot);
        for row in (col + 1)..3 {
            let factor = m[row][col] / m[col][col];
            for k in col..3 {
                m[row][k] -= factor * m[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0; 3];
    for row in (0..3).rev() {
        let tail: f64 = ((row + 1)..3).map(|k| m[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / m[row][row];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}

/// Least-squares `(du, dv)` with `du * Su + dv * Sv ≈ t`.
fn parameter_direction(su: Vec3, sv: Vec3, t: Vec3) -> Option<(f64, f64)> {
    let a = su.dot(su);
    let b = su.dot(sv);
    let c = sv.dot(sv);
    let det = a * c - b * b;
    if det.is_nan() || det.abs() <= 1e-24 {
        return None;
    }
    let rhs_u = su.dot(t);
    let rhs_v = sv.dot(t);
    Some(((c * rhs_u - b * rhs_v) / det, (a * rhs_v - b * rhs_u) / det))
}

// ───────────────────────────────────────────────────────────────────────────
// Seeding
// ───────────────────────────────────────────────────────────────────────────

fn sample_grid<S: Surface + ?Sized>(patch: &Patch<'_, S>, res: usize) -> (Vec<[f64; 2]>, Vec<Point3>, f64) {
    let denom = (res - 1) as f64;
    let mut params = Vec::with_capacity(res * res);
    let mut points = Vec::with_capacity(res * res);
    for j in 0..res {
        for i in 0..res {
            let (u, v) = (i as f64 / denom, j as f64 / denom);
            params.push([u, v]);
            points.push(patch.point(u, v));
        }
    }

    let mut spacing: f64 = 0.0;
    for j in 0..res {
        for i in 0..res {
            let here = points[j * res + i];
            if i + 1 < res {
                spacing = spacing.max(here.distance_to(points[j * res + i + 1]));
            }
            if j + 1 < res {
                spacing = spacing.max(here.distance_to(points[(j + 1) * res + i]));
            }
        }
    }
    (params, points, spacing)
}

fn find_seeds<A, B>(
    pair: &Pair<'_, A, B>,
    options: &IntersectionOptions,
    diag: &mut IntersectionDiagnostics,
) -> Vec<Params>
where
    A: Surface + Sync + ?Sized,
    B: Surface + Sync + ?Sized,
{
    let res = options.grid_resolution.max(2);
    let (params_a, points_a, spacing_a) = sample_grid(&pair.a, res);
    let (params_b, points_b, spacing_b) = sample_grid(&pair.b, res);

    let radius = options
        .seed_radius
        .unwrap_or_else(|| (10.0 * options.tolerance).max(spacing_a.max(spacing_b)));
    diag.seed_radius = radius;

    let tree = KdTree::build(&points_b);
    let candidates: Vec<Params> = points_a
        .iter()
        .zip(&params_a)
        .flat_map(|(point, pa)| {
            tree.within_radius(*point, radius)
                .into_iter()
                .map(|hit| [pa[0], pa[1], params_b[hit.index][0], params_b[hit.index][1]])
                .collect::<Vec<_>>()
        })
        .collect();
    diag.candidate_pairs = candidates.len();

    let mut refined = refine_candidates(pair, &candidates, options);

    refined.sort_by(|x, y| {
        x.iter()
            .zip(y)
            .map(|(a, b)| a.total_cmp(b))
            .find(|o| o.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut seeds: Vec<Params> = Vec::new();
    for p in refined {
        let duplicate = seeds.iter().any(|s| {
            (s[0] - p[0]).abs() <= options.tolerance && (s[1] - p[1]).abs() <= options.tolerance
        });
        if !duplicate {
            seeds.push(p);
        }
    }
    diag.seeds = seeds.len();
    log::trace!("intersection seeding: radius {radius}, {} seeds", seeds.len());
    seeds
}

cfg_if::cfg_if! {
    if #[cfg(feature = "parallel")] {
        fn refine_candidates<A, B>(
            pair: &Pair<'_, A, B>,
            candidates: &[Params],
            options: &IntersectionOptions,
        ) -> Vec<Params>
        where
            A: Surface + Sync + ?Sized,
            B: Surface + Sync + ?Sized,
        {
            candidates
                .par_iter()
                .filter_map(|c| pair.refine(*c, options.tolerance, options.max_seed_iterations))
                .map(|(p, _)| p)
                .collect()
        }
    } else {
        fn refine_candidates<A, B>(
            pair: &Pair<'_, A, B>,
            candidates: &[Params],
            options: &IntersectionOptions,
        ) -> Vec<Params>
        where
            A: Surface + Sync + ?Sized,
            B: Surface + Sync + ?Sized,
        {
            candidates
                .iter()
                .filter_map(|c| pair.refine(*c, options.tolerance, options.max_seed_iterations))
                .map(|(p, _)| p)
                .collect()
        }
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Marching
// ───────────────────────────────────────────────────────────────────────────

type CellKey = (i64, i64);

#[derive(Debug, Clone, Copy)]
struct Visit {
    curve: usize,
    seq: i64,
}

enum Revisit {
    None,
    OwnLoop,
    OtherCurve,
}

enum Stop {
    Boundary,
    Tangential,
    Unconverged,
    Loop,
    Merged,
    StepLimit,
    Budget,
}

struct Tracer<'p, 'a, A: ?Sized, B: ?Sized> {
    pair: &'p Pair<'a, A, B>,
    options: &'p IntersectionOptions,
    budget: &'p SolveBudget,
    visited: HashMap<CellKey, Visit>,
    diag: IntersectionDiagnostics,
}

impl<A: Surface + ?Sized, B: Surface + ?Sized> Tracer<'_, '_, A, B> {
    fn key(&self, p: Params) -> CellKey {
        let step = self.options.step_size;
        ((p[0] / step).round() as i64, (p[1] / step).round() as i64)
    }

    fn neighbourhood(key: CellKey) -> impl Iterator<Item = CellKey> {
        (-1..=1).flat_map(move |dj| (-1..=1).map(move |di| (key.0 + di, key.1 + dj)))
    }

    /// Seed lies in or next to a cell some earlier trace passed through.
    fn is_covered(&self, seed: Params) -> bool {
        Self::neighbourhood(self.key(seed)).any(|k| self.visited.contains_key(&k))
    }

    fn revisit(&self, key: CellKey, curve: usize, seq: i64) -> Revisit {
        let mut result = Revisit::None;
        for k in Self::neighbourhood(key) {
            match self.visited.get(&k) {
                Some(v) if v.curve != curve => return Revisit::OtherCurve,
                Some(v) if (v.seq - seq).abs() > RECENT_STEPS => result = Revisit::OwnLoop,
                _ => {}
            }
        }
        result
    }

    fn mark(&mut self, p: Params, curve: usize, seq: i64) {
        let key = self.key(p);
        self.visited.entry(key).or_insert(Visit { curve, seq });
    }

    fn trace(&mut self, seed: Params, curve: usize) -> Option<IntersectionCurve> {
        let opts = *self.options;
        let start = self
            .pair
            .refine(seed, opts.refine_tolerance, opts.max_refine_iterations)
            .map_or(seed, |(p, _)| p);

        self.diag.traced_seeds += 1;
        self.mark(start, curve, 0);

        let (forward, forward_stop) = self.march(start, 1.0, curve);
        let closed = matches!(forward_stop, Stop::Loop);
        let (backward, backward_stop) = if closed || matches!(forward_stop, Stop::Budget) {
            (Vec::new(), None)
        } else {
            let (points, stop) = self.march(start, -1.0, curve);
            (points, Some(stop))
        };
        let tangential = matches!(forward_stop, Stop::Tangential)
            || matches!(backward_stop, Some(Stop::Tangential));

        let mut params: Vec<Params> = backward.into_iter().rev().collect();
        params.push(start);
        params.extend(forward);

        if params.len() < 2 {
            return None;
        }
        // A trace that never left the first cell around a tangential contact
        // is a touch point, not a curve.
        let extent = params
            .iter()
            .map(|p| (p[0] - start[0]).hypot(p[1] - start[1]))
            .fold(0.0, f64::max);
        if tangential && extent < opts.step_size {
            log::trace!("dropping {} point trace at tangential contact", params.len());
            return None;
        }
        if closed {
            self.diag.closed_loops += 1;
        }
        Some(IntersectionCurve {
            points: params.into_iter().map(|p| self.pair.to_point(p)).collect(),
            closed,
        })
    }

    fn march(&mut self, start: Params, sign: f64, curve: usize) -> (Vec<Params>, Stop) {
        let opts = *self.options;
        let mut points = Vec::new();
        let mut current = start;
        let mut previous_tangent: Option<Vec3> = None;

        for step in 1..=opts.max_steps {
            if let Some(status) = self.budget.exhausted(self.diag.total_steps) {
                self.diag.status = status;
                return (points, Stop::Budget);
            }
            self.diag.total_steps += 1;

            let stop = match self.advance(current, sign, &mut previous_tangent) {
                Ok(Some((next, truncated))) => {
                    let seq = if sign < 0.0 { -(step as i64) } else { step as i64 };
                    match self.revisit(self.key(next), curve, seq) {
                        Revisit::OwnLoop => Some(Stop::Loop),
                        Revisit::OtherCurve => Some(Stop::Merged),
                        Revisit::None => {
                            self.mark(next, curve, seq);
                            points.push(next);
                            current = next;
                            if truncated {
                                Some(Stop::Boundary)
                            } else {
                                None
                            }
                        }
                    }
                }
                Ok(None) => Some(Stop::Boundary),
                Err(stop) => Some(stop),
            };

            if let Some(stop) = stop {
                match stop {
                    Stop::Boundary => self.diag.boundary_stops += 1,
                    Stop::Tangential => self.diag.tangential_stops += 1,
                    Stop::Unconverged => self.diag.unconverged_steps += 1,
                    Stop::Loop | Stop::Merged | Stop::StepLimit | Stop::Budget => {}
                }
                return (points, stop);
            }
        }

        log::trace!("intersection trace hit max_steps {}", opts.max_steps);
        (points, Stop::StepLimit)
    }

    /// One predictor/corrector step. The flag is set when the step was cut
    /// short at the parameter boundary. `Ok(None)` means the trace cannot
    /// move any further outward.
    fn advance(
        &self,
        p: Params,
        sign: f64,
        previous_tangent: &mut Option<Vec3>,
    ) -> Result<Option<(Params, bool)>, Stop> {
        let opts = self.options;
        let (Some(n1), Some(n2)) = (self.pair.a.normal(p[0], p[1]), self.pair.b.normal(p[2], p[3]))
        else {
            return Err(Stop::Tangential);
        };

        // Below this angle the refined points no longer pin down a direction.
        let min_sine = Tolerance::TANGENCY.eps.max(opts.refine_tolerance.sqrt());
        let raw = n1.cross(n2);
        if raw.length() < min_sine {
            return Err(Stop::Tangential);
        }
        let mut tangent = raw.mul_scalar(sign);
        if let Some(prev) = *previous_tangent {
            if prev.dot(tangent) < 0.0 {
                tangent = tangent.mul_scalar(-1.0);
            }
        }
        *previous_tangent = Some(tangent);

        let (a_u, a_v) = self.pair.a.partials(p[0], p[1]);
        let (b_u, b_v) = self.pair.b.partials(p[2], p[3]);
        let (Some((du1, dv1)), Some((du2, dv2))) = (
            parameter_direction(a_u, a_v, tangent),
            parameter_direction(b_u, b_v, tangent),
        ) else {
            return Err(Stop::Tangential);
        };

        let norm1 = du1.hypot(dv1);
        if norm1.is_nan() || norm1 <= 1e-15 {
            return Err(Stop::Tangential);
        }
        let scale = opts.step_size / norm1;
        let delta = [du1 * scale, dv1 * scale, du2 * scale, dv2 * scale];

        // Shorten the step so the prediction stays inside [0, 1]⁴.
        let mut fraction: f64 = 1.0;
        for (x, d) in p.iter().zip(&delta) {
            if *d > 0.0 && x + d > 1.0 {
                fraction = fraction.min((1.0 - x) / d);
            } else if *d < 0.0 && x + d < 0.0 {
                fraction = fraction.min(-x / d);
            }
        }
        if fraction * opts.step_size < 1e-9 {
            return Ok(None);
        }

        let predicted = [
            p[0] + fraction * delta[0],
            p[1] + fraction * delta[1],
            p[2] + fraction * delta[2],
            p[3] + fraction * delta[3],
        ];
        let (next, _) = self
            .pair
            .refine(predicted, opts.refine_tolerance, opts.max_refine_iterations)
            .ok_or(Stop::Unconverged)?;

        // The corrector cancelled most of the step: pinned against the
        // parameter boundary, or circling a tangential contact.
        let moved = (next[0] - p[0]).hypot(next[1] - p[1]);
        if moved < 0.5 * fraction * opts.step_size {
            return if on_boundary(next) { Ok(None) } else { Err(Stop::Tangential) };
        }
        Ok(Some((next, fraction < 1.0)))
    }
}
