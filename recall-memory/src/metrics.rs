//! Cache and fallback accounting for the orchestrator.

use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use recall_telemetry::{HitCounter, RunningMean};
use serde::Serialize;

/// Point-in-time view of the orchestrator's counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// `hits / (hits + misses)`, `0.0` before the first lookup.
    pub cache_hit_rate: f64,
    /// Reads served from the cache.
    pub cache_hits: u64,
    /// Reads that fell back to the store.
    pub cache_misses: u64,
    /// Completed fallbacks.
    pub fallback_count: u64,
    /// Mean retained fraction per compaction, `1.0` before the first one.
    pub compression_ratio: f64,
    /// Mean fallback latency in milliseconds, `0.0` before the first one.
    pub avg_fallback_time_ms: f64,
}

#[derive(Debug, Default)]
struct FallbackTotals {
    latency_ms: RunningMean,
    ratio: RunningMean,
}

/// Monotonic counters; there is no reset.
#[derive(Debug, Default)]
pub(crate) struct MemoryMetrics {
    lookups: HitCounter,
    fallbacks: AtomicU64,
    totals: Mutex<FallbackTotals>,
}

impl MemoryMetrics {
    pub(crate) fn hit(&self) {
        self.lookups.hit();
    }

    pub(crate) fn miss(&self) {
        self.lookups.miss();
    }

    /// Records a completed fallback; `ratio` is `None` when the store had
    /// nothing to compact.
    pub(crate) fn record_fallback(&self, elapsed: Duration, ratio: Option<f64>) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        let mut totals = self.totals.lock().unwrap_or_else(PoisonError::into_inner);
        totals.latency_ms.record(elapsed.as_secs_f64() * 1000.0);
        if let Some(ratio) = ratio {
            totals.ratio.record(ratio);
        }
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        let totals = self.totals.lock().unwrap_or_else(PoisonError::into_inner);
        MetricsSnapshot {
            cache_hit_rate: self.lookups.hit_rate(),
            cache_hits: self.lookups.hits(),
            cache_misses: self.lookups.misses(),
            fallback_count: self.fallbacks.load(Ordering::Relaxed),
            compression_ratio: totals.ratio.mean_or(1.0),
            avg_fallback_time_ms: totals.latency_ms.mean_or(0.0),
        }
    }
}
