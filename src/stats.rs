//! Counters describing how requests were served.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of [`WorkerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Internal requests answered from the cache.
    pub cache_hits: u64,
    /// Internal requests that missed the cache.
    pub cache_misses: u64,
    /// Requests answered by the network.
    pub network_responses: u64,
    /// External requests answered from the cache after a network failure.
    pub cache_fallbacks: u64,
    /// Requests that produced no response at all.
    pub failed_fetches: u64,
    /// Successful background write-backs.
    pub write_backs: u64,
    /// Background write-backs that failed.
    pub write_back_failures: u64,
}

impl StatsSnapshot {
    /// Total requests that reached a terminal state.
    #[must_use]
    pub const fn total_requests(&self) -> u64 {
        self.cache_hits + self.network_responses + self.cache_fallbacks + self.failed_fetches
    }

    /// Share of internal requests served from the cache, in `0.0..=1.0`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}

/// Lock-free request counters shared by concurrent fetch events.
#[derive(Debug, Default)]
pub struct WorkerStats {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    network_responses: AtomicU64,
    cache_fallbacks: AtomicU64,
    failed_fetches: AtomicU64,
    write_backs: AtomicU64,
    write_back_failures: AtomicU64,
}

impl WorkerStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_network(&self) {
        self.network_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fallback(&self) {
        self.cache_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failed_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_back(&self, ok: bool) {
        if ok {
            self.write_backs.fetch_add(1, Ordering::Relaxed);
        } else {
            self.write_back_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Copies the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            network_responses: self.network_responses.load(Ordering::Relaxed),
            cache_fallbacks: self.cache_fallbacks.load(Ordering::Relaxed),
            failed_fetches: self.failed_fetches.load(Ordering::Relaxed),
            write_backs: self.write_backs.load(Ordering::Relaxed),
            write_back_failures: self.write_back_failures.load(Ordering::Relaxed),
        }
    }
}
