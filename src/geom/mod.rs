mod basis;
mod budget;
mod collision;
mod context;
mod core;
mod curve;
mod diagnostics;
mod intersect;
mod kdtree;
mod mesh;
mod metrics;
mod offset;
mod parameterize;
mod surface;

pub use budget::SolveBudget;
pub use collision::{
    CollisionZone, MotionKind, PointContact, ToolGeometry, Toolpath, ToolpathCollisionReport,
    ToolpathPoint, ZoneContact, check_tool_collision, check_toolpath_collision, first_contact,
};
pub use context::{ContextError, KernelContext};
pub use core::{BBox, Point3, Tolerance, Vec3};
pub use curve::{NurbsCurve3, NurbsError};
pub use diagnostics::{MeshDiagnostics, SolveStatus};
pub use intersect::{
    IntersectionCurve, IntersectionDiagnostics, IntersectionOptions, IntersectionPoint,
    IntersectionResult, intersect_surfaces, intersect_surfaces_with_budget,
};
pub use kdtree::{KdTree, LinearScan, Neighbor, SpatialQuery};
pub use mesh::{GeomMesh, MeshError, NormalMode};
pub use metrics::{GeomMetrics, GeomTimingReport, TimingBucket};
pub use offset::{
    OffsetDiagnostics, OffsetError, OffsetOptions, ShellOptions, create_shell, offset_mesh,
};
pub use parameterize::{
    BoundaryShape, BoundarySpacing, LinearSolver, Parameterization, ParameterizeDiagnostics,
    ParameterizeError, ParameterizeOptions, WeightType, boundary_loop, parameterize,
    parameterize_with_budget,
};
pub use surface::{NurbsSurface, PlaneSurface, Surface};

#[cfg(test)]
mod tests;
