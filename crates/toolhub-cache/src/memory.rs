//! In-memory cache storage

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::BoxStream;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    metrics::{CacheMetrics, CacheStats},
    storage::{CacheEntry, CacheStorage, KeyPattern},
    CacheError, Result,
};

/// Map-backed storage with optional default TTL and capacity bound
///
/// When a new key is inserted at capacity, expired entries are dropped
/// first and then the least recently used entry is evicted.
pub struct MemoryStorage {
    data: Arc<RwLock<HashMap<String, CacheEntry>>>,
    default_ttl: Option<Duration>,
    max_size: Option<usize>,
    metrics: CacheMetrics,
    closed: AtomicBool,
}

impl MemoryStorage {
    /// Unbounded storage whose entries never expire unless a TTL is given
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            default_ttl: None,
            max_size: None,
            metrics: CacheMetrics::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// TTL applied when `set` is called without one
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Maximum number of entries held at once
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size.max(1));
        self
    }

    /// Shared hit/miss counters
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(CacheError::Closed)
        } else {
            Ok(())
        }
    }

    /// Make room for one new entry. Caller holds the write lock.
    fn make_room(&self, data: &mut HashMap<String, CacheEntry>, max_size: usize) {
        if data.len() < max_size {
            return;
        }

        let now = Utc::now();
        let before = data.len();
        data.retain(|_, entry| !entry.is_expired_at(now));
        let expired = before - data.len();

        let mut evicted = 0;
        while data.len() >= max_size {
            let lru = data
                .iter()
                .min_by(|(ka, a), (kb, b)| a.last_used().cmp(&b.last_used()).then_with(|| ka.cmp(kb)))
                .map(|(key, _)| key.clone());
            match lru {
                Some(key) => {
                    data.remove(&key);
                    evicted += 1;
                }
                None => break,
            }
        }

        self.metrics.record_evictions(expired + evicted);
        debug!(expired, evicted, max_size, "Made room in memory cache");
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.ensure_open()?;
        let now = Utc::now();
        let mut data = self.data.write().await;

        match data.get_mut(key) {
            Some(entry) if !entry.is_expired_at(now) => {
                entry.record_access(now);
                self.metrics.record_hit();
                Ok(Some(entry.value.clone()))
            }
            Some(_) => {
                data.remove(key);
                self.metrics.record_miss();
                Ok(None)
            }
            None => {
                self.metrics.record_miss();
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> Result<()> {
        self.ensure_open()?;
        let entry = CacheEntry::new(value, ttl.or(self.default_ttl));
        let mut data = self.data.write().await;

        if let Some(max_size) = self.max_size {
            if !data.contains_key(key) {
                self.make_room(&mut data, max_size);
            }
        }
        data.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        let mut data = self.data.write().await;
        Ok(data.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        let data = self.data.read().await;
        Ok(data.get(key).map_or(false, |entry| !entry.is_expired()))
    }

    async fn clear(&self) -> Result<()> {
        self.ensure_open()?;
        self.data.write().await.clear();
        Ok(())
    }

    fn keys<'a>(&'a self, pattern: &'a str) -> BoxStream<'a, Result<String>> {
        Box::pin(async_stream::try_stream! {
            self.ensure_open()?;
            let pattern = KeyPattern::new(pattern)?;
            let now = Utc::now();
            let mut snapshot: Vec<String> = {
                let data = self.data.read().await;
                data.iter()
                    .filter(|(key, entry)| !entry.is_expired_at(now) && pattern.matches(key))
                    .map(|(key, _)| key.clone())
                    .collect()
            };
            snapshot.sort();

            for key in snapshot {
                yield key;
            }
        })
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        self.ensure_open()?;
        let now = Utc::now();
        let mut data = self.data.write().await;
        let before = data.len();
        data.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before - data.len();
        self.metrics.record_evictions(removed);
        Ok(removed)
    }

    async fn stats(&self) -> Result<CacheStats> {
        let now = Utc::now();
        let data = self.data.read().await;
        let mut stats = self.metrics.base_stats();
        let mut memory = 0u64;

        for (key, entry) in data.iter().filter(|(_, e)| !e.is_expired_at(now)) {
            stats.item_count += 1;
            memory += key.len() as u64 + entry.size_bytes.unwrap_or(0);
            stats.observe_entry(entry.created_at);
        }
        stats.memory_usage_bytes = Some(memory);
        Ok(stats)
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.data.write().await.clear();
            debug!("Memory cache closed");
        }
        Ok(())
    }
}
