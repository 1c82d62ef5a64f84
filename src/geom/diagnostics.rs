//! Outcome reporting shared by the kernel's operations.
//!
//! Iterative operations report a [`SolveStatus`]; mesh-producing operations
//! carry a [`MeshDiagnostics`] summary of the topology they produced. Both are
//! returned alongside results rather than raised as errors, because a partial
//! result is still usable by the caller.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How an iterative solve ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SolveStatus {
    /// Met its tolerance.
    #[default]
    Converged,
    /// Ran out of iterations; the best result so far is returned.
    IterationLimit,
    /// The caller's deadline passed; the best result so far is returned.
    DeadlineExpired,
    /// Produced non-finite values or grew without bound.
    Diverged,
}

impl SolveStatus {
    #[must_use]
    pub const fn is_converged(self) -> bool {
        matches!(self, Self::Converged)
    }

    /// The more severe of two statuses, for combining sub-solves.
    #[must_use]
    pub const fn worst(self, other: Self) -> Self {
        const fn rank(s: SolveStatus) -> u8 {
            match s {
                SolveStatus::Converged => 0,
                SolveStatus::IterationLimit => 1,
                SolveStatus::DeadlineExpired => 2,
                SolveStatus::Diverged => 3,
            }
        }
        if rank(other) > rank(self) { other } else { self }
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Converged => "converged",
            Self::IterationLimit => "iteration limit reached",
            Self::DeadlineExpired => "deadline expired",
            Self::Diverged => "diverged",
        };
        f.write_str(text)
    }
}

/// Topology summary of a triangle mesh.
///
/// - `open_edge_count`: edges used by exactly one triangle
/// - `non_manifold_edge_count`: edges used by three or more triangles
/// - `degenerate_triangle_count`: triangles with (near) zero area
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshDiagnostics {
    pub vertex_count: usize,
    pub triangle_count: usize,
    pub open_edge_count: usize,
    pub non_manifold_edge_count: usize,
    pub degenerate_triangle_count: usize,

    /// Populated only with the `kernel_metrics` feature.
    pub timing: Option<super::metrics::GeomTimingReport>,

    pub warnings: Vec<String>,
}

impl MeshDiagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// No open edges.
    #[must_use]
    pub fn is_watertight(&self) -> bool {
        self.open_edge_count == 0
    }

    #[must_use]
    pub fn is_manifold(&self) -> bool {
        self.non_manifold_edge_count == 0
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.is_manifold() && self.degenerate_triangle_count == 0 && self.warnings.is_empty()
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Topology problems as `(label, count)`, zero counts left out.
    fn issues(&self) -> impl Iterator<Item = (&'static str, usize)> {
        [
            ("open", self.open_edge_count),
            ("non-manifold", self.non_manifold_edge_count),
            ("degenerate", self.degenerate_triangle_count),
        ]
        .into_iter()
        .filter(|&(_, count)| count > 0)
    }

    /// One line, e.g. `"V:4 T:2 open:4"`.
    #[must_use]
    pub fn summary(&self) -> String {
        self.issues().fold(
            format!("V:{} T:{}", self.vertex_count, self.triangle_count),
            |mut line, (label, count)| {
                line.push_str(&format!(" {label}:{count}"));
                line
            },
        )
    }
}

impl fmt::Display for MeshDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())?;
        if let Some(timing) = &self.timing {
            write!(f, " ({:.3} ms)", timing.total_ms())?;
        }
        for warning in &self.warnings {
            write!(f, "\n  warning: {warning}")?;
        }
        Ok(())
    }
}
