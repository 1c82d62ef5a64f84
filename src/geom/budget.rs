use std::time::{Duration, Instant};

use super::diagnostics::SolveStatus;

/// Iteration and wall-clock limits for an iterative solver.
///
/// Budgets are checked between iterations; a solver that runs out returns its
/// best partial result tagged with the exhausted limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolveBudget {
    pub max_iterations: usize,
    pub deadline: Option<Instant>,
}

impl SolveBudget {
    #[must_use]
    pub const fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            deadline: None,
        }
    }

    #[must_use]
    pub const fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline `timeout` from now. An unrepresentable instant means no deadline.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    #[must_use]
    pub fn deadline_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// `Some(status)` once `iteration` (zero-based, about to run) may not proceed.
    #[must_use]
    pub fn exhausted(&self, iteration: usize) -> Option<SolveStatus> {
        if iteration >= self.max_iterations {
            Some(SolveStatus::IterationLimit)
        } else if self.deadline_expired() {
            Some(SolveStatus::DeadlineExpired)
        } else {
            None
        }
    }
}

impl Default for SolveBudget {
    fn default() -> Self {
        Self::new(500)
    }
}
