//! Axis-aligned collision gating between a tool and machine zones.
//!
//! A toolpath is checked at a fixed sampling interval, but rapid moves and tool
//! changes are always checked. Each check tests the box swept by the tool from
//! the previous waypoint to the current one.

use serde::{Deserialize, Serialize};

use super::core::{BBox, Point3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MotionKind {
    /// Cutting move at feed rate.
    Feed,
    /// Vertical entry into stock.
    Plunge,
    /// Non-cutting positioning move at maximum speed.
    Rapid,
    /// Move to or from the tool change position.
    ToolChange,
}

impl MotionKind {
    /// Motions that are checked regardless of the sampling interval.
    #[must_use]
    pub const fn always_checked(self) -> bool {
        matches!(self, Self::Rapid | Self::ToolChange)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolpathPoint {
    /// Tool tip position.
    pub position: Point3,
    pub motion: MotionKind,
}

impl ToolpathPoint {
    #[must_use]
    pub const fn new(position: Point3, motion: MotionKind) -> Self {
        Self { position, motion }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Toolpath {
    pub points: Vec<ToolpathPoint>,
}

impl Toolpath {
    #[must_use]
    pub const fn new() -> Self {
        Self { points: Vec::new() }
    }

    pub fn push(&mut self, position: Point3, motion: MotionKind) {
        self.points.push(ToolpathPoint::new(position, motion));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[must_use]
    pub fn total_length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| w[0].position.distance_to(w[1].position))
            .sum()
    }
}

impl FromIterator<ToolpathPoint> for Toolpath {
    fn from_iter<I: IntoIterator<Item = ToolpathPoint>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

/// Cylindrical cutter approximated by its bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolGeometry {
    pub diameter: f64,
    /// Stick-out above the tip.
    pub length: f64,
}

impl ToolGeometry {
    #[must_use]
    pub const fn new(diameter: f64, length: f64) -> Self {
        Self { diameter, length }
    }

    #[must_use]
    pub fn radius(&self) -> f64 {
        self.diameter.abs() * 0.5
    }

    /// Box around the tool with its tip at `tip`: `±radius` in x/y,
    /// `tip.z ..= tip.z + length` in z.
    #[must_use]
    pub fn aabb_at(&self, tip: Point3) -> BBox {
        let r = self.radius();
        BBox::new(
            Point3::new(tip.x - r, tip.y - r, tip.z),
            Point3::new(tip.x + r, tip.y + r, tip.z + self.length.abs()),
        )
    }

    /// Box covering the tool at both ends of a straight move.
    #[must_use]
    pub fn swept_aabb(&self, from: Point3, to: Point3) -> BBox {
        self.aabb_at(from).union(self.aabb_at(to))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionZone {
    pub name: String,
    pub bbox: BBox,
}

impl CollisionZone {
    #[must_use]
    pub fn new(name: impl Into<String>, bbox: BBox) -> Self {
        Self {
            name: name.into(),
            bbox,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneContact {
    pub zone_index: usize,
    /// Intersection of the tool box and the zone box.
    pub overlap: BBox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointContact {
    pub point_index: usize,
    pub motion: MotionKind,
    pub zone_index: usize,
    pub zone_name: String,
    pub overlap: BBox,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolpathCollisionReport {
    pub collided: bool,
    pub contacts: Vec<PointContact>,
    /// Waypoints actually tested.
    pub checked_points: usize,
}

impl ToolpathCollisionReport {
    #[must_use]
    pub fn first_contact(&self) -> Option<&PointContact> {
        self.contacts.first()
    }
}

/// True if `tool_aabb` overlaps any zone on all three axes (touching counts).
#[must_use]
pub fn check_tool_collision(tool_aabb: BBox, zones: &[CollisionZone]) -> bool {
    zones.iter().any(|zone| zone.bbox.intersects(tool_aabb))
}

/// The lowest-index zone hit by `tool_aabb`.
#[must_use]
pub fn first_contact(tool_aabb: BBox, zones: &[CollisionZone]) -> Option<ZoneContact> {
    zone_contacts(tool_aabb, zones).next()
}

fn zone_contacts(tool_aabb: BBox, zones: &[CollisionZone]) -> impl Iterator<Item = ZoneContact> + '_ {
    zones.iter().enumerate().filter_map(move |(zone_index, zone)| {
        zone.bbox
            .intersection(tool_aabb)
            .map(|overlap| ZoneContact { zone_index, overlap })
    })
}

/// Test every `check_interval`-th waypoint plus every rapid and tool-change
/// waypoint. An interval of 0 is treated as 1.
#[must_use]
pub fn check_toolpath_collision(
    toolpath: &Toolpath,
    tool: ToolGeometry,
    zones: &[CollisionZone],
    check_interval: usize,
) -> ToolpathCollisionReport {
    let interval = check_interval.max(1);
    let mut report = ToolpathCollisionReport::default();

    for (i, point) in toolpath.points.iter().enumerate() {
        if i % interval != 0 && !point.motion.always_checked() {
            continue;
        }
        report.checked_points += 1;

        let from = if i == 0 {
            point.position
        } else {
            toolpath.points[i - 1].position
        };
        let swept = tool.swept_aabb(from, point.position);

        for contact in zone_contacts(swept, zones) {
            log::trace!("waypoint {i} ({:?}) hits zone {}", point.motion, contact.zone_index);
            report.contacts.push(PointContact {
                point_index: i,
                motion: point.motion,
                zone_index: contact.zone_index,
                zone_name: zones[contact.zone_index].name.clone(),
                overlap: contact.overlap,
            });
        }
    }

    report.collided = !report.contacts.is_empty();
    if report.collided {
        log::warn!(
            "toolpath collides: {} contacts over {} checked waypoints",
            report.contacts.len(),
            report.checked_points
        );
    } else {
        log::debug!("toolpath clear: {} waypoints checked", report.checked_points);
    }
    report
}
