//! Per-session kernel state: tolerance, timing and the tool/zone tables a
//! collision check resolves against.
//!
//! Nothing here is global. Callers create a [`KernelContext`], register tools
//! and fixture zones, and run operations through it so the time each one takes
//! lands in the matching [`TimingBucket`].

use std::collections::HashMap;

use super::budget::SolveBudget;
use super::collision::{CollisionZone, ToolGeometry, Toolpath, ToolpathCollisionReport, check_toolpath_collision};
use super::core::{Point3, Tolerance};
use super::diagnostics::MeshDiagnostics;
use super::intersect::{IntersectionOptions, IntersectionResult, intersect_surfaces_with_budget};
use super::kdtree::KdTree;
use super::mesh::GeomMesh;
use super::metrics::{GeomMetrics, GeomTimingReport, TimingBucket};
use super::offset::{OffsetDiagnostics, OffsetError, OffsetOptions, ShellOptions, create_shell, offset_mesh};
use super::parameterize::{Parameterization, ParameterizeError, ParameterizeOptions, parameterize_with_budget};
use super::surface::Surface;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("no tool registered under `{name}`")]
    UnknownTool { name: String },
}

#[derive(Debug, Clone)]
pub struct KernelContext {
    pub tolerance: Tolerance,
    pub metrics: GeomMetrics,
    tools: HashMap<String, ToolGeometry>,
    zones: Vec<CollisionZone>,
}

impl KernelContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tolerance: Tolerance::default_geom(),
            metrics: GeomMetrics::default(),
            tools: HashMap::new(),
            zones: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Register `tool` under `name`, returning the tool it replaced.
    pub fn register_tool(&mut self, name: impl Into<String>, tool: ToolGeometry) -> Option<ToolGeometry> {
        let name = name.into();
        log::debug!("registering tool `{name}` ({} x {})", tool.diameter, tool.length);
        self.tools.insert(name, tool)
    }

    #[must_use]
    pub fn tool(&self, name: &str) -> Option<ToolGeometry> {
        self.tools.get(name).copied()
    }

    /// Append a zone; returns its index in collision reports.
    pub fn add_zone(&mut self, zone: CollisionZone) -> usize {
        self.zones.push(zone);
        self.zones.len() - 1
    }

    #[must_use]
    pub fn zones(&self) -> &[CollisionZone] {
        &self.zones
    }

    pub fn clear_zones(&mut self) {
        self.zones.clear();
    }

    /// Timing accumulated since the last [`reset_timing`](Self::reset_timing);
    /// `None` unless built with `kernel_metrics`.
    #[must_use]
    pub fn timing(&self) -> Option<GeomTimingReport> {
        self.metrics.end()
    }

    pub fn reset_timing(&mut self) {
        self.metrics.begin();
    }

    /// Check `toolpath` for the tool registered as `tool_name` against every zone.
    ///
    /// # Errors
    /// [`ContextError::UnknownTool`] if no tool has that name.
    pub fn check_toolpath(
        &mut self,
        toolpath: &Toolpath,
        tool_name: &str,
        check_interval: usize,
    ) -> Result<ToolpathCollisionReport, ContextError> {
        let tool = self.tool(tool_name).ok_or_else(|| ContextError::UnknownTool {
            name: tool_name.to_string(),
        })?;
        let zones = &self.zones;
        Ok(self.metrics.time(TimingBucket::Collision, || {
            check_toolpath_collision(toolpath, tool, zones, check_interval)
        }))
    }

    pub fn intersect<A, B>(
        &mut self,
        s1: &A,
        s2: &B,
        options: IntersectionOptions,
        budget: SolveBudget,
    ) -> IntersectionResult
    where
        A: Surface + Sync + ?Sized,
        B: Surface + Sync + ?Sized,
    {
        self.metrics.time(TimingBucket::Intersection, || {
            intersect_surfaces_with_budget(s1, s2, options, budget)
        })
    }

    /// # Errors
    /// See [`offset_mesh`].
    pub fn offset(
        &mut self,
        mesh: &GeomMesh,
        options: OffsetOptions,
    ) -> Result<(GeomMesh, OffsetDiagnostics), OffsetError> {
        self.metrics.time(TimingBucket::Offset, || offset_mesh(mesh, options))
    }

    /// # Errors
    /// See [`create_shell`].
    pub fn shell(
        &mut self,
        mesh: &GeomMesh,
        options: ShellOptions,
    ) -> Result<(GeomMesh, OffsetDiagnostics), OffsetError> {
        self.metrics.time(TimingBucket::Offset, || create_shell(mesh, options))
    }

    /// # Errors
    /// See [`parameterize_with_budget`].
    pub fn parameterize(
        &mut self,
        mesh: &GeomMesh,
        options: ParameterizeOptions,
        budget: SolveBudget,
    ) -> Result<Parameterization, ParameterizeError> {
        self.metrics.time(TimingBucket::Parameterization, || {
            parameterize_with_budget(mesh, options, budget)
        })
    }

    pub fn build_index(&mut self, points: &[Point3]) -> KdTree {
        self.metrics.time(TimingBucket::SpatialIndex, || KdTree::build(points))
    }

    /// Mesh topology report at this context's tolerance, with timing attached
    /// when metrics are enabled.
    #[must_use]
    pub fn mesh_diagnostics(&self, mesh: &GeomMesh) -> MeshDiagnostics {
        let mut diag = mesh.diagnostics(self.tolerance);
        diag.timing = self.timing();
        diag
    }
}

impl Default for KernelContext {
    fn default() -> Self {
        Self::new()
    }
}
