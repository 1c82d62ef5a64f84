//! Static 3D k-d tree for nearest-neighbour and region queries.
//!
//! Nodes live in a flat arena with `u32` child links (`u32::MAX` = none). The
//! tree is immutable after [`KdTree::build`], so it can be shared across threads
//! without locking.
//!
//! Every query orders results by `(squared distance, input index)`, so equal
//! distances always resolve to the lower input index and the tree agrees with
//! [`LinearScan`] exactly.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::core::{BBox, Point3};

const NONE: u32 = u32::MAX;

/// A query hit: input index, the stored point and its Euclidean distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub index: usize,
    pub point: Point3,
    pub distance: f64,
}

/// Point-set queries shared by the k-d tree and the brute-force oracle.
pub trait SpatialQuery {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closest stored point, `None` for an empty set or a non-finite query.
    fn nearest(&self, query: Point3) -> Option<Neighbor>;

    /// Up to `k` closest points, ascending by distance.
    fn k_nearest(&self, query: Point3, k: usize) -> Vec<Neighbor>;

    /// Every point with `distance <= radius`, ascending by distance.
    fn within_radius(&self, query: Point3, radius: f64) -> Vec<Neighbor>;

    /// Input indices of every point inside `bbox` (inclusive), ascending.
    fn range_query(&self, bbox: BBox) -> Vec<usize>;
}

#[derive(Debug, Clone, Copy)]
struct KdNode {
    point: Point3,
    index: u32,
    axis: u8,
    left: u32,
    right: u32,
}

#[derive(Debug, Clone, Default)]
pub struct KdTree {
    nodes: Vec<KdNode>,
    root: Option<u32>,
}

/// Point count addressable by `u32` node indices; larger inputs are truncated.
fn indexable_len(len: usize) -> u32 {
    u32::try_from(len).unwrap_or_else(|_| {
        log::warn!("kd-tree input of {len} points truncated to {}", u32::MAX);
        u32::MAX
    })
}

impl KdTree {
    /// Build by median split on `depth % 3`.
    ///
    /// Non-finite points are left out of the tree; their indices are never
    /// returned.
    #[must_use]
    pub fn build(points: &[Point3]) -> Self {
        let mut order: Vec<u32> = (0..indexable_len(points.len()))
            .filter(|&i| points[i as usize].is_finite())
            .collect();

        let skipped = points.len() - order.len();
        if skipped > 0 {
            log::warn!("kd-tree build skipped {skipped} non-finite points");
        }

        let mut tree = Self {
            nodes: Vec::with_capacity(order.len()),
            root: None,
        };
        if !order.is_empty() {
            tree.root = Some(tree.build_node(points, &mut order, 0));
        }

        log::debug!("kd-tree built with {} nodes", tree.nodes.len());
        tree
    }

    fn build_node(&mut self, points: &[Point3], order: &mut [u32], depth: usize) -> u32 {
        let axis = (depth % 3) as u8;
        let mid = order.len() / 2;
        order.select_nth_unstable_by(mid, |&a, &b| {
            let ca = points[a as usize].coord(axis);
            let cb = points[b as usize].coord(axis);
            ca.total_cmp(&cb).then_with(|| a.cmp(&b))
        });

        let index = order[mid];
        let node_index = self.nodes.len() as u32;
        self.nodes.push(KdNode {
            point: points[index as usize],
            index,
            axis,
            left: NONE,
            right: NONE,
        });

        let (lower, rest) = order.split_at_mut(mid);
        let upper = &mut rest[1..];

        if !lower.is_empty() {
            let left = self.build_node(points, lower, depth + 1);
            self.nodes[node_index as usize].left = left;
        }
        if !upper.is_empty() {
            let right = self.build_node(points, upper, depth + 1);
            self.nodes[node_index as usize].right = right;
        }

        node_index
    }

    /// Depth of the deepest leaf; 0 for an empty tree.
    #[must_use]
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[KdNode], node: u32) -> usize {
            if node == NONE {
                return 0;
            }
            let n = nodes[node as usize];
            1 + walk(nodes, n.left).max(walk(nodes, n.right))
        }
        self.root.map_or(0, |root| walk(&self.nodes, root))
    }

    fn neighbor(&self, node: &KdNode, dist2: f64) -> Neighbor {
        Neighbor {
            index: node.index as usize,
            point: node.point,
            distance: dist2.sqrt(),
        }
    }

    fn nearest_from(&self, node: u32, query: Point3, best: &mut Option<Candidate>) {
        if node == NONE {
            return;
        }
        let n = &self.nodes[node as usize];
        let candidate = Candidate {
            dist2: n.point.distance_squared_to(query),
            node,
            index: n.index,
        };
        if best.is_none_or(|b| candidate < b) {
            *best = Some(candidate);
        }

        let diff = query.coord(n.axis) - n.point.coord(n.axis);
        let (near, far) = if diff < 0.0 { (n.left, n.right) } else { (n.right, n.left) };
        self.nearest_from(near, query, best);
        if best.is_none_or(|b| diff * diff <= b.dist2) {
            self.nearest_from(far, query, best);
        }
    }

    fn k_nearest_from(&self, node: u32, query: Point3, k: usize, heap: &mut BinaryHeap<Candidate>) {
        if node == NONE {
            return;
        }
        let n = &self.nodes[node as usize];
        let candidate = Candidate {
            dist2: n.point.distance_squared_to(query),
            node,
            index: n.index,
        };
        if heap.len() < k {
            heap.push(candidate);
        } else if heap.peek().is_some_and(|worst| candidate < *worst) {
            heap.pop();
            heap.push(candidate);
        }

        let diff = query.coord(n.axis) - n.point.coord(n.axis);
        let (near, far) = if diff < 0.0 { (n.left, n.right) } else { (n.right, n.left) };
        self.k_nearest_from(near, query, k, heap);
        let open = heap.len() < k || heap.peek().is_some_and(|worst| diff * diff <= worst.dist2);
        if open {
            self.k_nearest_from(far, query, k, heap);
        }
    }

    fn radius_from(&self, node: u32, query: Point3, r2: f64, out: &mut Vec<Candidate>) {
        if node == NONE {
            return;
        }
        let n = &self.nodes[node as usize];
        let dist2 = n.point.distance_squared_to(query);
        if dist2 <= r2 {
            out.push(Candidate {
                dist2,
                node,
                index: n.index,
            });
        }

        let diff = query.coord(n.axis) - n.point.coord(n.axis);
        let (near, far) = if diff < 0.0 { (n.left, n.right) } else { (n.right, n.left) };
        self.radius_from(near, query, r2, out);
        if diff * diff <= r2 {
            self.radius_from(far, query, r2, out);
        }
    }

    fn range_from(&self, node: u32, bbox: BBox, out: &mut Vec<usize>) {
        if node == NONE {
            return;
        }
        let n = &self.nodes[node as usize];
        if bbox.contains_point(n.point) {
            out.push(n.index as usize);
        }

        let split = n.point.coord(n.axis);
        if bbox.min.coord(n.axis) <= split {
            self.range_from(n.left, bbox, out);
        }
        if bbox.max.coord(n.axis) >= split {
            self.range_from(n.right, bbox, out);
        }
    }

    fn into_neighbors(&self, mut hits: Vec<Candidate>) -> Vec<Neighbor> {
        hits.sort_unstable();
        hits.into_iter()
            .map(|c| self.neighbor(&self.nodes[c.node as usize], c.dist2))
            .collect()
    }

    cfg_if::cfg_if! {
        if #[cfg(feature = "parallel")] {
            /// Nearest neighbour for many queries, split across the rayon pool.
            #[must_use]
            pub fn nearest_batch(&self, queries: &[Point3]) -> Vec<Option<Neighbor>> {
                queries.par_iter().map(|q| self.nearest(*q)).collect()
            }
        } else {
            /// Nearest neighbour for many queries.
            #[must_use]
            pub fn nearest_batch(&self, queries: &[Point3]) -> Vec<Option<Neighbor>> {
                queries.iter().map(|q| self.nearest(*q)).collect()
            }
        }
    }
}

impl SpatialQuery for KdTree {
    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn nearest(&self, query: Point3) -> Option<Neighbor> {
        let root = self.root?;
        if !query.is_finite() {
            return None;
        }
        let mut best = None;
        self.nearest_from(root, query, &mut best);
        best.map(|c| self.neighbor(&self.nodes[c.node as usize], c.dist2))
    }

    fn k_nearest(&self, query: Point3, k: usize) -> Vec<Neighbor> {
        let Some(root) = self.root else {
            return Vec::new();
        };
        if k == 0 || !query.is_finite() {
            return Vec::new();
        }
        let mut heap = BinaryHeap::with_capacity(k + 1);
        self.k_nearest_from(root, query, k, &mut heap);
        self.into_neighbors(heap.into_vec())
    }

    fn within_radius(&self, query: Point3, radius: f64) -> Vec<Neighbor> {
        let Some(root) = self.root else {
            return Vec::new();
        };
        if radius.is_nan() || radius < 0.0 || !query.is_finite() {
            return Vec::new();
        }
        let mut hits = Vec::new();
        self.radius_from(root, query, radius * radius, &mut hits);
        self.into_neighbors(hits)
    }

    fn range_query(&self, bbox: BBox) -> Vec<usize> {
        let Some(root) = self.root else {
            return Vec::new();
        };
        let mut out = Vec::new();
        self.range_from(root, bbox, &mut out);
        out.sort_unstable();
        out
    }
}

/// Brute-force reference over the same input, with identical tie rules.
#[derive(Debug, Clone, Default)]
pub struct LinearScan {
    points: Vec<Point3>,
}

impl LinearScan {
    #[must_use]
    pub fn new(points: &[Point3]) -> Self {
        Self {
            points: points.to_vec(),
        }
    }

    fn scored(&self, query: Point3) -> impl Iterator<Item = (f64, usize)> + '_ {
        self.points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_finite())
            .map(move |(i, p)| (p.distance_squared_to(query), i))
    }

    fn to_neighbor(&self, (dist2, index): (f64, usize)) -> Neighbor {
        Neighbor {
            index,
            point: self.points[index],
            distance: dist2.sqrt(),
        }
    }
}

fn by_distance_then_index(a: &(f64, usize), b: &(f64, usize)) -> Ordering {
    a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1))
}

impl SpatialQuery for LinearScan {
    fn len(&self) -> usize {
        self.points.iter().filter(|p| p.is_finite()).count()
    }

    fn nearest(&self, query: Point3) -> Option<Neighbor> {
        if !query.is_finite() {
            return None;
        }
        self.scored(query)
            .min_by(by_distance_then_index)
            .map(|hit| self.to_neighbor(hit))
    }

    fn k_nearest(&self, query: Point3, k: usize) -> Vec<Neighbor> {
        if !query.is_finite() {
            return Vec::new();
        }
        let mut all: Vec<_> = self.scored(query).collect();
        all.sort_by(by_distance_then_index);
        all.into_iter().take(k).map(|hit| self.to_neighbor(hit)).collect()
    }

    fn within_radius(&self, query: Point3, radius: f64) -> Vec<Neighbor> {
        if radius.is_nan() || radius < 0.0 || !query.is_finite() {
            return Vec::new();
        }
        let r2 = radius * radius;
        let mut hits: Vec<_> = self.scored(query).filter(|(d2, _)| *d2 <= r2).collect();
        hits.sort_by(by_distance_then_index);
        hits.into_iter().map(|hit| self.to_neighbor(hit)).collect()
    }

    fn range_query(&self, bbox: BBox) -> Vec<usize> {
        self.points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_finite() && bbox.contains_point(**p))
            .map(|(i, _)| i)
            .collect()
    }
}

/// Heap entry ordered by `(dist2, index)`; `BinaryHeap` keeps the worst on top.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    dist2: f64,
    node: u32,
    index: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist2
            .total_cmp(&other.dist2)
            .then_with(|| self.index.cmp(&other.index))
    }
}
