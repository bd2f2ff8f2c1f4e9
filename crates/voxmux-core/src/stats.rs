use crate::cache::CacheStats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Live view of one backend
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackendStatus {
    pub name: String,
    pub enabled: bool,
    pub healthy: bool,
    /// `queue_depth / max_concurrency`
    pub load: f64,
    pub in_flight: usize,
    pub queue_depth: usize,
    pub max_concurrency: usize,
    pub queue_capacity: usize,
    pub dispatched: u64,
    pub rejected: u64,
    pub cancelled: u64,
}

/// Service-wide counters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorStats {
    pub uptime_secs: u64,
    pub total_requests: u64,
    pub cache_hits: u64,
    /// Requests answered by another request's synthesis
    pub joined_requests: u64,
    pub completed: u64,
    pub failures: BTreeMap<String, u64>,
    /// Completed syntheses per backend
    pub backend_usage: BTreeMap<String, u64>,
    /// Percentage of requests served from cache
    pub cache_hit_rate: f64,
    pub cache: CacheStats,
}

#[derive(Debug)]
pub(crate) struct StatsRecorder {
    started: Instant,
    total: AtomicU64,
    cache_hits: AtomicU64,
    joined: AtomicU64,
    completed: AtomicU64,
    failures: Mutex<BTreeMap<String, u64>>,
    usage: Mutex<BTreeMap<String, u64>>,
}

impl Default for StatsRecorder {
    fn default() -> Self {
        Self {
            started: Instant::now(),
            total: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            joined: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failures: Mutex::new(BTreeMap::new()),
            usage: Mutex::new(BTreeMap::new()),
        }
    }
}

impl StatsRecorder {
    pub(crate) fn request(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn joined(&self) {
        self.joined.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn backend_used(&self, backend: &str) {
        if let Ok(mut usage) = self.usage.lock() {
            *usage.entry(backend.to_string()).or_insert(0) += 1;
        }
    }

    pub(crate) fn failed(&self, kind: &str) {
        if let Ok(mut failures) = self.failures.lock() {
            *failures.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    pub(crate) fn snapshot(&self, cache: CacheStats) -> OrchestratorStats {
        let total = self.total.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_hit_rate = if total == 0 {
            0.0
        } else {
            cache_hits as f64 * 100.0 / total as f64
        };
        OrchestratorStats {
            uptime_secs: self.started.elapsed().as_secs(),
            total_requests: total,
            cache_hits,
            joined_requests: self.joined.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failures: self.failures.lock().map(|f| f.clone()).unwrap_or_default(),
            backend_usage: self.usage.lock().map(|u| u.clone()).unwrap_or_default(),
            cache_hit_rate,
            cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_is_a_percentage() {
        let stats = StatsRecorder::default();
        for _ in 0..4 {
            stats.request();
        }
        stats.cache_hit();
        stats.backend_used("edge");
        stats.backend_used("edge");
        stats.failed("timeout");

        let snapshot = stats.snapshot(CacheStats::default());
        assert_eq!(snapshot.total_requests, 4);
        assert!((snapshot.cache_hit_rate - 25.0).abs() < f64::EPSILON);
        assert_eq!(snapshot.backend_usage["edge"], 2);
        assert_eq!(snapshot.failures["timeout"], 1);
    }

    #[test]
    fn test_empty_stats_have_zero_hit_rate() {
        let snapshot = StatsRecorder::default().snapshot(CacheStats::default());
        assert_eq!(snapshot.cache_hit_rate, 0.0);
    }
}
