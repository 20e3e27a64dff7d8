//! Cache storage abstraction and entry metadata

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};

use crate::{metrics::CacheStats, CacheError, Result};

/// A cached value with its lifecycle metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cached data
    pub value: serde_json::Value,
    /// When the entry was (last) written
    pub created_at: DateTime<Utc>,
    /// Lifetime in seconds; `None` never expires
    pub ttl_seconds: Option<u64>,
    /// Number of successful reads
    pub access_count: u64,
    /// Time of the last successful read
    pub last_accessed: Option<DateTime<Utc>>,
    /// Serialized size of the value
    pub size_bytes: Option<u64>,
}

impl CacheEntry {
    /// Create a new entry written now
    pub fn new(value: serde_json::Value, ttl: Option<Duration>) -> Self {
        Self::created_at(value, ttl, Utc::now())
    }

    /// Create an entry with an explicit creation time
    pub fn created_at(value: serde_json::Value, ttl: Option<Duration>, created_at: DateTime<Utc>) -> Self {
        let size_bytes = serde_json::to_string(&value).map(|s| s.len() as u64).ok();
        Self {
            value,
            created_at,
            ttl_seconds: ttl.map(ttl_to_seconds),
            access_count: 0,
            last_accessed: None,
            size_bytes,
        }
    }

    /// Expiration time, if the entry has a TTL
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.ttl_seconds
            .map(|ttl| self.created_at + chrono::Duration::seconds(ttl.min(i64::MAX as u64) as i64))
    }

    /// Whether the entry is expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map_or(false, |expires| now > expires)
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Get remaining TTL
    pub fn ttl_remaining(&self) -> Option<Duration> {
        let remaining = self.expires_at()? - Utc::now();
        remaining.to_std().ok()
    }

    /// Mark entry as accessed
    pub fn record_access(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.last_accessed = Some(now);
    }

    /// Most recent use, for eviction ordering
    pub(crate) fn last_used(&self) -> DateTime<Utc> {
        self.last_accessed.unwrap_or(self.created_at).max(self.created_at)
    }
}

/// TTLs have one-second granularity; sub-second remainders round up.
fn ttl_to_seconds(ttl: Duration) -> u64 {
    ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0)
}

/// Glob matcher over full cache keys
///
/// `*` matches any run of characters including `/` and `:`, so
/// `group/project:main:*` selects every file cached for that branch.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    pattern: Pattern,
}

impl KeyPattern {
    /// Compile a pattern
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Pattern::new(pattern).map_err(|e| CacheError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { pattern })
    }

    /// Whether `key` matches
    pub fn matches(&self, key: &str) -> bool {
        self.pattern.matches_with(
            key,
            MatchOptions {
                case_sensitive: true,
                require_literal_separator: false,
                require_literal_leading_dot: false,
            },
        )
    }
}

/// Cache storage trait
///
/// Implementations check expiry lazily on every read: an expired entry that
/// the sweep has not removed yet behaves as absent.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Retrieve a live value, counting a hit or a miss
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Store a value; `None` uses the storage's default TTL. Overwriting resets the TTL.
    async fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> Result<()>;

    /// Remove a value, reporting whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Check if a live value exists without touching statistics
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Clear all entries
    async fn clear(&self) -> Result<()>;

    /// Lazily enumerate live keys matching a glob pattern
    ///
    /// The sequence is detached from the storage lock, so callers may delete
    /// keys while iterating.
    fn keys<'a>(&'a self, pattern: &'a str) -> BoxStream<'a, Result<String>>;

    /// Remove every expired entry, returning how many were removed
    async fn cleanup_expired(&self) -> Result<usize>;

    /// Current statistics snapshot
    async fn stats(&self) -> Result<CacheStats>;

    /// Release resources; later calls are no-ops
    async fn close(&self) -> Result<()>;
}
