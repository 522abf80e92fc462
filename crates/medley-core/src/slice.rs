//! Wall-clock budget tracking for time-sliced work.

use std::time::{Duration, Instant};

/// Default budget for a single slice of work.
pub const DEFAULT_SLICE_BUDGET: Duration = Duration::from_millis(5);

/// Tracks how much of a per-turn budget has been spent.
///
/// A slice always grants its first unit of work, even with a zero budget,
/// so every turn makes progress.
///
/// ```
/// use std::time::Duration;
/// use medley_core::TimeSlice;
///
/// let mut slice = TimeSlice::new(Duration::ZERO);
/// assert!(slice.has_time());
/// slice.record();
/// assert!(!slice.has_time());
/// ```
#[derive(Debug, Clone)]
pub struct TimeSlice {
    budget: Duration,
    started: Instant,
    units: usize,
}

impl TimeSlice {
    /// Start a slice with the given budget.
    pub fn new(budget: Duration) -> Self {
        Self {
            budget,
            started: Instant::now(),
            units: 0,
        }
    }

    /// Restart the clock and the unit counter.
    pub fn restart(&mut self) {
        self.started = Instant::now();
        self.units = 0;
    }

    /// The configured budget.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Time spent since the slice started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Units of work recorded in this slice.
    pub fn units(&self) -> usize {
        self.units
    }

    /// Record one completed unit of work.
    pub fn record(&mut self) {
        self.units += 1;
    }

    /// Returns `true` once the budget is spent and at least one unit ran.
    pub fn is_exhausted(&self) -> bool {
        self.units > 0 && self.elapsed() >= self.budget
    }

    /// Returns `true` if another unit of work may run in this slice.
    pub fn has_time(&self) -> bool {
        !self.is_exhausted()
    }
}

impl Default for TimeSlice {
    fn default() -> Self {
        Self::new(DEFAULT_SLICE_BUDGET)
    }
}
