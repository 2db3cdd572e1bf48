//! Statistics tracking for the DNS server.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Atomic counters for tracking how queries were handled.
#[derive(Debug)]
pub struct Stats {
    pub requests: AtomicU64,
    pub cooked: AtomicU64,
    pub proxied: AtomicU64,
    pub dropped: AtomicU64,
    pub proxy_failures: AtomicU64,
    /// Cumulative handling time in microseconds for averaging.
    total_response_time_us: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            cooked: AtomicU64::new(0),
            proxied: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            proxy_failures: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
        }
    }

    pub fn record_cooked(&self, elapsed: Duration) {
        self.record(&self.cooked, elapsed);
    }

    pub fn record_proxied(&self, elapsed: Duration) {
        self.record(&self.proxied, elapsed);
    }

    pub fn record_dropped(&self, elapsed: Duration) {
        self.record(&self.dropped, elapsed);
    }

    /// A relay that failed; the query is also counted as dropped.
    pub fn record_proxy_failure(&self, elapsed: Duration) {
        self.proxy_failures.fetch_add(1, Ordering::Relaxed);
        self.record(&self.dropped, elapsed);
    }

    fn record(&self, counter: &AtomicU64, elapsed: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        counter.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Current counters, leaving them untouched.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot::new(
            self.requests.load(Ordering::Relaxed),
            self.cooked.load(Ordering::Relaxed),
            self.proxied.load(Ordering::Relaxed),
            self.dropped.load(Ordering::Relaxed),
            self.proxy_failures.load(Ordering::Relaxed),
            self.total_response_time_us.load(Ordering::Relaxed),
        )
    }

    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        StatsSnapshot::new(
            self.requests.swap(0, Ordering::Relaxed),
            self.cooked.swap(0, Ordering::Relaxed),
            self.proxied.swap(0, Ordering::Relaxed),
            self.dropped.swap(0, Ordering::Relaxed),
            self.proxy_failures.swap(0, Ordering::Relaxed),
            self.total_response_time_us.swap(0, Ordering::Relaxed),
        )
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub cooked: u64,
    pub proxied: u64,
    pub dropped: u64,
    pub proxy_failures: u64,
    pub avg_response_ms: f64,
}

impl StatsSnapshot {
    fn new(
        requests: u64,
        cooked: u64,
        proxied: u64,
        dropped: u64,
        proxy_failures: u64,
        total_us: u64,
    ) -> Self {
        let avg_response_ms = if requests > 0 {
            (total_us as f64 / requests as f64) / 1000.0
        } else {
            0.0
        };

        Self {
            requests,
            cooked,
            proxied,
            dropped,
            proxy_failures,
            avg_response_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_and_average() {
        let stats = Stats::new();
        stats.record_cooked(Duration::from_millis(2));
        stats.record_proxied(Duration::from_millis(4));
        stats.record_proxy_failure(Duration::from_millis(6));

        let snapshot = stats.snapshot();

        assert_eq!(snapshot.requests, 3);
        assert_eq!(snapshot.cooked, 1);
        assert_eq!(snapshot.proxied, 1);
        assert_eq!(snapshot.dropped, 1);
        assert_eq!(snapshot.proxy_failures, 1);
        assert!((snapshot.avg_response_ms - 4.0).abs() < 1e-9);
    }

    #[test]
    fn snapshot_and_reset_clears() {
        let stats = Stats::new();
        stats.record_dropped(Duration::from_micros(10));

        assert_eq!(stats.snapshot_and_reset().requests, 1);

        let after = stats.snapshot();
        assert_eq!(after.requests, 0);
        assert_eq!(after.dropped, 0);
        assert_eq!(after.avg_response_ms, 0.0);
    }
}
