//! Computational geometry kernel for CAM toolpath generation.
//!
//! Everything lives under [`geom`]: NURBS curve and surface evaluation,
//! surface/surface intersection, mesh offsetting and shelling, boundary-fixed
//! mesh parameterization, a k-d tree for point queries and axis-aligned
//! collision checks along toolpaths.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod geom;
