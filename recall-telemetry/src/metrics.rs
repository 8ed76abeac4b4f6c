//! Lock-free and plain metric accumulators.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counts cache hits and misses across threads.
#[derive(Debug, Default)]
pub struct HitCounter {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl HitCounter {
    /// Creates a counter with zero observations.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Records a hit.
    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a miss.
    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of recorded hits.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Returns the number of recorded misses.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Returns `hits / (hits + misses)`, or `0.0` before any observation.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Running arithmetic mean over recorded samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunningMean {
    total: f64,
    samples: u64,
}

impl RunningMean {
    /// Creates an empty accumulator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            total: 0.0,
            samples: 0,
        }
    }

    /// Adds a sample.
    pub fn record(&mut self, value: f64) {
        self.total += value;
        self.samples += 1;
    }

    /// Number of samples recorded so far.
    #[must_use]
    pub const fn samples(&self) -> u64 {
        self.samples
    }

    /// Sum of all samples.
    #[must_use]
    pub const fn total(&self) -> f64 {
        self.total
    }

    /// Returns the mean, or `empty` when nothing has been recorded.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_or(&self, empty: f64) -> f64 {
        if self.samples == 0 {
            empty
        } else {
            self.total / self.samples as f64
        }
    }
}
