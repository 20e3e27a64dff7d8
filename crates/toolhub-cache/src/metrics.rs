//! Cache statistics and hit/miss counters

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of live entries
    pub item_count: usize,
    /// Reads that found a live entry
    pub hit_count: u64,
    /// Reads that found nothing or an expired entry
    pub miss_count: u64,
    /// Approximate bytes held in memory (memory backend)
    pub memory_usage_bytes: Option<u64>,
    /// Bytes on disk (disk backend)
    pub storage_usage_bytes: Option<u64>,
    /// Creation time of the oldest live entry
    pub oldest_entry: Option<DateTime<Utc>>,
    /// Creation time of the newest live entry
    pub newest_entry: Option<DateTime<Utc>>,
}

impl CacheStats {
    /// Fraction of reads that hit, `0.0` when nothing was read
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }

    /// Complement of [`hit_rate`](Self::hit_rate)
    pub fn miss_rate(&self) -> f64 {
        1.0 - self.hit_rate()
    }

    /// Total reads observed
    pub fn total_requests(&self) -> u64 {
        self.hit_count + self.miss_count
    }

    /// Widen the oldest/newest window to include `created_at`
    pub(crate) fn observe_entry(&mut self, created_at: DateTime<Utc>) {
        self.oldest_entry = Some(self.oldest_entry.map_or(created_at, |t| t.min(created_at)));
        self.newest_entry = Some(self.newest_entry.map_or(created_at, |t| t.max(created_at)));
    }
}

/// Thread-safe hit/miss counters shared by a storage backend
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    evictions: Arc<AtomicU64>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record entries dropped by capacity or expiry
    pub fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Stats with the counters filled in and everything else empty
    pub fn base_stats(&self) -> CacheStats {
        CacheStats {
            hit_count: self.hits(),
            miss_count: self.misses(),
            ..CacheStats::default()
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_without_requests() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
        assert_eq!(stats.miss_rate(), 1.0);
    }

    #[test]
    fn test_hit_rate_calculation() {
        let metrics = CacheMetrics::new();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();

        let stats = metrics.base_stats();
        assert_eq!(stats.hit_count, 3);
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.hit_rate(), 0.75);
        assert_eq!(stats.miss_rate(), 0.25);
        assert_eq!(stats.total_requests(), 4);
    }

    #[test]
    fn test_metrics_shared_across_clones() {
        let metrics = CacheMetrics::new();
        let clone = metrics.clone();
        clone.record_hit();
        clone.record_evictions(2);
        assert_eq!(metrics.hits(), 1);
        assert_eq!(metrics.evictions(), 2);

        metrics.reset();
        assert_eq!(clone.hits(), 0);
    }

    #[test]
    fn test_observe_entry_window() {
        let mut stats = CacheStats::default();
        let t1 = Utc::now();
        let t0 = t1 - chrono::Duration::seconds(5);
        stats.observe_entry(t1);
        stats.observe_entry(t0);
        assert_eq!(stats.oldest_entry, Some(t0));
        assert_eq!(stats.newest_entry, Some(t1));
    }
}
