//! Atomic service counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters updated on the request path and by the reconciler.
///
/// All updates are relaxed atomic adds; a snapshot is not a consistent cut
/// across counters.
#[derive(Debug)]
pub struct ServiceMetrics {
    started_at: Instant,
    requests: AtomicU64,
    lookups: AtomicU64,
    store_errors: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    legacy_attempts: AtomicU64,
    legacy_failures: AtomicU64,
    legacy_fallbacks: AtomicU64,
    reconcile_queued: AtomicU64,
    reconcile_sent: AtomicU64,
    reconcile_failed: AtomicU64,
    reconcile_dropped: AtomicU64,
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMetrics {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            requests: AtomicU64::new(0),
            lookups: AtomicU64::new(0),
            store_errors: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            legacy_attempts: AtomicU64::new(0),
            legacy_failures: AtomicU64::new(0),
            legacy_fallbacks: AtomicU64::new(0),
            reconcile_queued: AtomicU64::new(0),
            reconcile_sent: AtomicU64::new(0),
            reconcile_failed: AtomicU64::new(0),
            reconcile_dropped: AtomicU64::new(0),
        }
    }

    /// A counted page view
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// A read-only totals lookup
    pub fn record_lookup(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    /// A request failed because the store was unavailable
    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Before-count served from cache
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Before-count had to be resolved from the provider
    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// One request to the legacy provider
    pub fn record_legacy_attempt(&self) {
        self.legacy_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// One failed request to the legacy provider
    pub fn record_legacy_failure(&self) {
        self.legacy_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Retries exhausted; zero was cached
    pub fn record_legacy_fallback(&self) {
        self.legacy_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Notification accepted by the reconciler queue
    pub fn record_reconcile_queued(&self) {
        self.reconcile_queued.fetch_add(1, Ordering::Relaxed);
    }

    /// Notification delivered to the provider
    pub fn record_reconcile_sent(&self) {
        self.reconcile_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Notification attempt failed
    pub fn record_reconcile_failed(&self) {
        self.reconcile_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Notifications discarded (queue full or abandoned at shutdown)
    pub fn record_reconcile_dropped(&self, count: u64) {
        self.reconcile_dropped.fetch_add(count, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime: self.started_at.elapsed(),
            requests: self.requests.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            legacy_attempts: self.legacy_attempts.load(Ordering::Relaxed),
            legacy_failures: self.legacy_failures.load(Ordering::Relaxed),
            legacy_fallbacks: self.legacy_fallbacks.load(Ordering::Relaxed),
            reconcile_queued: self.reconcile_queued.load(Ordering::Relaxed),
            reconcile_sent: self.reconcile_sent.load(Ordering::Relaxed),
            reconcile_failed: self.reconcile_failed.load(Ordering::Relaxed),
            reconcile_dropped: self.reconcile_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`ServiceMetrics`] at one instant
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub uptime: Duration,
    pub requests: u64,
    pub lookups: u64,
    pub store_errors: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub legacy_attempts: u64,
    pub legacy_failures: u64,
    pub legacy_fallbacks: u64,
    pub reconcile_queued: u64,
    pub reconcile_sent: u64,
    pub reconcile_failed: u64,
    pub reconcile_dropped: u64,
}

impl MetricsSnapshot {
    /// Share of before-count reads served from cache (0.0-1.0)
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = ServiceMetrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        metrics.record_cache_hit();
        metrics.record_reconcile_dropped(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests, 2);
        assert_eq!(snapshot.cache_hits, 2);
        assert_eq!(snapshot.reconcile_dropped, 3);
        assert!((snapshot.cache_hit_rate() - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_hit_rate() {
        assert_eq!(MetricsSnapshot::default().cache_hit_rate(), 0.0);
    }
}
