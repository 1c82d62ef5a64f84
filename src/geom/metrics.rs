//! Opt-in timing hooks for kernel operations.
//!
//! Timing is collected only with the `kernel_metrics` feature on a non-WASM
//! target. Otherwise every call is a pass-through and [`GeomMetrics::end`]
//! returns `None`.
//!
//! ```ignore
//! use cam_kernel::geom::{GeomMetrics, TimingBucket};
//!
//! let mut metrics = GeomMetrics::default();
//! metrics.begin();
//! let tree = metrics.time(TimingBucket::SpatialIndex, || KdTree::build(&points));
//! if let Some(report) = metrics.end() {
//!     log::debug!("kd-tree build took {} ns", report.spatial_index_ns);
//! }
//! ```

use serde::{Deserialize, Serialize};

/// Operation families that accumulate time separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimingBucket {
    /// Curve and surface evaluation, knot insertion, splitting.
    Evaluation,
    /// Seed search, refinement and marching.
    Intersection,
    /// Mesh offsetting and shelling.
    Offset,
    /// Boundary mapping and Laplacian solves.
    Parameterization,
    /// k-d tree builds and queries.
    SpatialIndex,
    /// Tool/zone and toolpath collision tests.
    Collision,
}

/// Cumulative nanoseconds per bucket.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeomTimingReport {
    pub evaluation_ns: u64,
    pub intersection_ns: u64,
    pub offset_ns: u64,
    pub parameterization_ns: u64,
    pub spatial_index_ns: u64,
    pub collision_ns: u64,
}

impl GeomTimingReport {
    #[must_use]
    pub fn total_ns(&self) -> u64 {
        self.evaluation_ns
            .saturating_add(self.intersection_ns)
            .saturating_add(self.offset_ns)
            .saturating_add(self.parameterization_ns)
            .saturating_add(self.spatial_index_ns)
            .saturating_add(self.collision_ns)
    }

    #[must_use]
    pub fn total_ms(&self) -> f64 {
        self.total_ns() as f64 / 1_000_000.0
    }

    fn bucket_mut(&mut self, bucket: TimingBucket) -> &mut u64 {
        match bucket {
            TimingBucket::Evaluation => &mut self.evaluation_ns,
            TimingBucket::Intersection => &mut self.intersection_ns,
            TimingBucket::Offset => &mut self.offset_ns,
            TimingBucket::Parameterization => &mut self.parameterization_ns,
            TimingBucket::SpatialIndex => &mut self.spatial_index_ns,
            TimingBucket::Collision => &mut self.collision_ns,
        }
    }

    /// Add `nanos` to `bucket`, saturating at `u64::MAX`.
    pub fn record(&mut self, bucket: TimingBucket, nanos: u64) {
        let slot = self.bucket_mut(bucket);
        *slot = slot.saturating_add(nanos);
    }
}

/// Accumulator wrapped around kernel calls with [`time`](Self::time).
#[derive(Debug, Default, Clone)]
pub struct GeomMetrics {
    #[cfg(all(feature = "kernel_metrics", not(target_arch = "wasm32")))]
    report: GeomTimingReport,
}

impl GeomMetrics {
    /// Reset all counters.
    pub fn begin(&mut self) {
        #[cfg(all(feature = "kernel_metrics", not(target_arch = "wasm32")))]
        {
            self.report = GeomTimingReport::default();
        }
    }

    #[must_use]
    pub fn end(&self) -> Option<GeomTimingReport> {
        #[cfg(all(feature = "kernel_metrics", not(target_arch = "wasm32")))]
        {
            Some(self.report.clone())
        }
        #[cfg(not(all(feature = "kernel_metrics", not(target_arch = "wasm32"))))]
        {
            None
        }
    }

    pub fn time<R>(&mut self, bucket: TimingBucket, f: impl FnOnce() -> R) -> R {
        #[cfg(all(feature = "kernel_metrics", not(target_arch = "wasm32")))]
        {
            let start = std::time::Instant::now();
            let result = f();
            let nanos = start.elapsed().as_nanos().min(u128::from(u64::MAX)) as u64;
            self.report.record(bucket, nanos);
            result
        }

        #[cfg(not(all(feature = "kernel_metrics", not(target_arch = "wasm32"))))]
        {
            let _ = bucket;
            f()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_report_total() {
        let mut report = GeomTimingReport::default();
        report.record(TimingBucket::Offset, 1000);
        report.record(TimingBucket::Collision, 2000);
        report.record(TimingBucket::Offset, 3000);
        assert_eq!(report.offset_ns, 4000);
        assert_eq!(report.total_ns(), 6000);
        assert!((report.total_ms() - 0.006).abs() < 1e-9);
    }

    #[test]
    fn test_record_saturates() {
        let mut report = GeomTimingReport::default();
        report.record(TimingBucket::Evaluation, u64::MAX);
        report.record(TimingBucket::Evaluation, 5);
        assert_eq!(report.evaluation_ns, u64::MAX);
    }

    #[test]
    fn test_time_returns_closure_result() {
        let mut metrics = GeomMetrics::default();
        metrics.begin();
        let result = metrics.time(TimingBucket::SpatialIndex, || 42);
        assert_eq!(result, 42);
        #[cfg(not(feature = "kernel_metrics"))]
        assert!(metrics.end().is_none());
    }
}
