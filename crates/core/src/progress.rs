//! Progress and ETA estimation from polling attempts.
//!
//! The provider reports no intermediate progress, so progress is derived
//! from how much of the attempt budget has been spent.

use std::time::Duration;

use serde::Serialize;

/// Fractional progress and remaining-time estimate for one task.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ProgressEstimate {
    /// Completion fraction in `0.0..=1.0`.
    pub fraction: f64,
    /// Estimated time remaining, never negative.
    pub eta: Duration,
}

impl ProgressEstimate {
    /// Completion as a whole percentage (0-100).
    pub fn percent(&self) -> u8 {
        (self.fraction * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

/// Estimate progress after `attempts_done` of `attempt_budget` polls.
///
/// - `fraction = attempts_done / attempt_budget`, clamped to `0.0..=1.0`.
/// - `eta = (attempt_budget - attempts_done) * poll_interval`, floored at 0.
pub fn estimate(attempts_done: u32, attempt_budget: u32, poll_interval: Duration) -> ProgressEstimate {
    if attempt_budget == 0 {
        return ProgressEstimate {
            fraction: 1.0,
            eta: Duration::ZERO,
        };
    }
    let fraction = (attempts_done as f64 / attempt_budget as f64).clamp(0.0, 1.0);
    let remaining = attempt_budget.saturating_sub(attempts_done);
    ProgressEstimate {
        fraction,
        eta: poll_interval.saturating_mul(remaining),
    }
}

/// Per-task progress tracker.
///
/// Successive estimates never go backwards; [`begin`](Self::begin) resets
/// the tracker to zero for a new task.
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    attempt_budget: u32,
    poll_interval: Duration,
    current: ProgressEstimate,
}

impl ProgressEstimator {
    pub fn new(attempt_budget: u32, poll_interval: Duration) -> Self {
        Self {
            attempt_budget,
            poll_interval,
            current: ProgressEstimate {
                fraction: 0.0,
                eta: poll_interval.saturating_mul(attempt_budget),
            },
        }
    }

    /// Reset to zero for a new task running under the given budget.
    pub fn begin(&mut self, attempt_budget: u32, poll_interval: Duration) {
        *self = Self::new(attempt_budget, poll_interval);
    }

    /// Record that `attempts_done` polls have completed.
    pub fn record(&mut self, attempts_done: u32) -> ProgressEstimate {
        let next = estimate(attempts_done, self.attempt_budget, self.poll_interval);
        if next.fraction >= self.current.fraction {
            self.current = ProgressEstimate {
                fraction: next.fraction,
                eta: next.eta.min(self.current.eta),
            };
        }
        self.current
    }

    /// Jump to 100% once the task is terminal.
    pub fn finish(&mut self) -> ProgressEstimate {
        self.current = ProgressEstimate {
            fraction: 1.0,
            eta: Duration::ZERO,
        };
        self.current
    }

    pub fn current(&self) -> ProgressEstimate {
        self.current
    }
}
