//! Disk-backed cache storage
//!
//! Each entry lives in its own JSON file named after the SHA-256 of its key.
//! The key is stored inside the file so the directory can be enumerated
//! without an index.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::{fs, sync::Mutex};
use tracing::{debug, warn};

use crate::{
    metrics::{CacheMetrics, CacheStats},
    storage::{CacheEntry, CacheStorage, KeyPattern},
    CacheError, Result,
};

const ENTRY_EXTENSION: &str = "json";

#[derive(Debug, Serialize, Deserialize)]
struct DiskRecord {
    key: String,
    entry: CacheEntry,
}

/// File-per-entry storage rooted at a directory
pub struct DiskStorage {
    base_path: PathBuf,
    default_ttl: Option<Duration>,
    metrics: CacheMetrics,
    /// Serializes read-modify-write cycles on entry files
    write_lock: Mutex<()>,
    closed: AtomicBool,
}

impl DiskStorage {
    /// Create new disk storage with base path
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            default_ttl: None,
            metrics: CacheMetrics::new(),
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// TTL applied when `set` is called without one
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

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

    /// Get file path for a key
    fn key_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.base_path
            .join(format!("{}.{}", hex::encode(digest), ENTRY_EXTENSION))
    }

    fn is_entry_file(path: &Path) -> bool {
        path.extension().map_or(false, |ext| ext == ENTRY_EXTENSION)
    }

    /// Ensure base directory exists
    async fn ensure_base_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.base_path).await?;
        Ok(())
    }

    /// Read a record, treating a missing or unreadable file as absent
    async fn read_record(path: &Path) -> Result<Option<DiskRecord>> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<DiskRecord>(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping corrupt cache file");
                Ok(None)
            }
        }
    }

    /// Write through a temporary file so readers never see a partial record
    async fn write_record(&self, path: &Path, record: &DiskRecord) -> Result<()> {
        let json = serde_json::to_vec(record).map_err(|e| CacheError::Serialization {
            message: e.to_string(),
        })?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn remove_file(path: &Path) -> Result<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Open the directory listing, or `None` when nothing was ever written
    async fn read_dir(&self) -> Result<Option<fs::ReadDir>> {
        match fs::read_dir(&self.base_path).await {
            Ok(dir) => Ok(Some(dir)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.ensure_open()?;
        let path = self.key_path(key);
        let _guard = self.write_lock.lock().await;

        let record = match Self::read_record(&path).await? {
            Some(record) if record.key == key => record,
            _ => {
                self.metrics.record_miss();
                return Ok(None);
            }
        };

        let now = Utc::now();
        if record.entry.is_expired_at(now) {
            Self::remove_file(&path).await?;
            self.metrics.record_miss();
            return Ok(None);
        }

        let mut record = record;
        record.entry.record_access(now);
        self.write_record(&path, &record).await?;
        self.metrics.record_hit();
        Ok(Some(record.entry.value))
    }

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> Result<()> {
        self.ensure_open()?;
        self.ensure_base_dir().await?;

        let record = DiskRecord {
            key: key.to_string(),
            entry: CacheEntry::new(value, ttl.or(self.default_ttl)),
        };
        let path = self.key_path(key);
        let _guard = self.write_lock.lock().await;
        self.write_record(&path, &record).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock().await;
        Self::remove_file(&self.key_path(key)).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(Self::read_record(&self.key_path(key))
            .await?
            .map_or(false, |r| r.key == key && !r.entry.is_expired()))
    }

    async fn clear(&self) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock().await;
        if let Some(mut dir) = self.read_dir().await? {
            while let Some(entry) = dir.next_entry().await? {
                let path = entry.path();
                if Self::is_entry_file(&path) {
                    Self::remove_file(&path).await?;
                }
            }
        }
        Ok(())
    }

    fn keys<'a>(&'a self, pattern: &'a str) -> BoxStream<'a, Result<String>> {
        Box::pin(async_stream::try_stream! {
            self.ensure_open()?;
            let pattern = KeyPattern::new(pattern)?;
            if let Some(mut dir) = self.read_dir().await? {
                while let Some(entry) = dir.next_entry().await? {
                    let path = entry.path();
                    if !Self::is_entry_file(&path) {
                        continue;
                    }
                    if let Some(record) = Self::read_record(&path).await? {
                        if !record.entry.is_expired() && pattern.matches(&record.key) {
                            yield record.key;
                        }
                    }
                }
            }
        })
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let mut removed = 0;

        if let Some(mut dir) = self.read_dir().await? {
            while let Some(entry) = dir.next_entry().await? {
                let path = entry.path();
                if !Self::is_entry_file(&path) {
                    continue;
                }
                if let Some(record) = Self::read_record(&path).await? {
                    if record.entry.is_expired_at(now) && Self::remove_file(&path).await? {
                        removed += 1;
                    }
                }
            }
        }

        self.metrics.record_evictions(removed);
        debug!(removed, path = %self.base_path.display(), "Swept disk cache");
        Ok(removed)
    }

    async fn stats(&self) -> Result<CacheStats> {
        let now = Utc::now();
        let mut stats = self.metrics.base_stats();
        let mut on_disk = 0u64;

        if let Some(mut dir) = self.read_dir().await? {
            while let Some(entry) = dir.next_entry().await? {
                let path = entry.path();
                if !Self::is_entry_file(&path) {
                    continue;
                }
                if let Ok(metadata) = entry.metadata().await {
                    on_disk += metadata.len();
                }
                if let Some(record) = Self::read_record(&path).await? {
                    if !record.entry.is_expired_at(now) {
                        stats.item_count += 1;
                        stats.observe_entry(record.entry.created_at);
                    }
                }
            }
        }

        stats.storage_usage_bytes = Some(on_disk);
        Ok(stats)
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(path = %self.base_path.display(), "Disk cache closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_disk_storage_basic_operations() {
        let temp_dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(temp_dir.path());

        storage
            .set("group/repo:main:rules/a.md", json!("content"), None)
            .await
            .unwrap();
        assert_eq!(
            storage.get("group/repo:main:rules/a.md").await.unwrap(),
            Some(json!("content"))
        );
        assert!(storage.exists("group/repo:main:rules/a.md").await.unwrap());

        assert!(storage.delete("group/repo:main:rules/a.md").await.unwrap());
        assert!(!storage.delete("group/repo:main:rules/a.md").await.unwrap());
        assert!(!storage.exists("group/repo:main:rules/a.md").await.unwrap());
    }

    #[tokio::test]
    async fn test_file_name_is_key_digest() {
        let temp_dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(temp_dir.path());
        storage.set("a:b:c", json!(1), None).await.unwrap();

        let expected = format!("{}.json", hex::encode(Sha256::digest(b"a:b:c")));
        assert!(temp_dir.path().join(expected).exists());
    }

    #[tokio::test]
    async fn test_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        DiskStorage::new(temp_dir.path())
            .set("k", json!({"n": 1}), None)
            .await
            .unwrap();

        let reopened = DiskStorage::new(temp_dir.path());
        assert_eq!(reopened.get("k").await.unwrap(), Some(json!({"n": 1})));
    }

    #[tokio::test]
    async fn test_get_records_access_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(temp_dir.path());
        storage.set("k", json!(1), None).await.unwrap();
        storage.get("k").await.unwrap();
        storage.get("k").await.unwrap();

        let record = DiskStorage::read_record(&storage.key_path("k"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.entry.access_count, 2);
        assert!(record.entry.last_accessed.is_some());
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(temp_dir.path().join("not-created"));

        assert_eq!(storage.get("k").await.unwrap(), None);
        let keys: Vec<String> = storage.keys("*").try_collect().await.unwrap();
        assert!(keys.is_empty());
        assert_eq!(storage.cleanup_expired().await.unwrap(), 0);
        assert_eq!(storage.stats().await.unwrap().item_count, 0);
    }

    #[tokio::test]
    async fn test_keys_enumerates_matching_entries() {
        let temp_dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(temp_dir.path());
        storage.set("r:main:a", json!(1), None).await.unwrap();
        storage.set("r:main:b", json!(2), None).await.unwrap();
        storage.set("r:dev:a", json!(3), None).await.unwrap();

        let mut keys: Vec<String> = storage.keys("r:main:*").try_collect().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["r:main:a", "r:main:b"]);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(temp_dir.path());
        storage.set("good", json!(1), None).await.unwrap();
        std::fs::write(temp_dir.path().join("deadbeef.json"), b"{not json").unwrap();

        let keys: Vec<String> = storage.keys("*").try_collect().await.unwrap();
        assert_eq!(keys, vec!["good"]);
        assert_eq!(storage.stats().await.unwrap().item_count, 1);
    }

    #[tokio::test]
    async fn test_expiry_and_cleanup() {
        let temp_dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(temp_dir.path());
        storage.set("a", json!(1), Some(Duration::from_secs(1))).await.unwrap();
        storage.set("b", json!(2), Some(Duration::from_secs(1))).await.unwrap();
        storage.set("c", json!(3), None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert!(!storage.exists("a").await.unwrap());
        assert_eq!(storage.cleanup_expired().await.unwrap(), 2);
        let keys: Vec<String> = storage.keys("*").try_collect().await.unwrap();
        assert_eq!(keys, vec!["c"]);
    }

    #[tokio::test]
    async fn test_clear_and_stats() {
        let temp_dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(temp_dir.path());
        storage.set("a", json!("x"), None).await.unwrap();
        storage.set("b", json!("y"), None).await.unwrap();
        storage.get("a").await.unwrap();
        storage.get("zzz").await.unwrap();

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.item_count, 2);
        assert_eq!(stats.hit_rate(), 0.5);
        assert!(stats.storage_usage_bytes.unwrap() > 0);

        storage.clear().await.unwrap();
        assert_eq!(storage.stats().await.unwrap().item_count, 0);
    }

    #[tokio::test]
    async fn test_closed_storage_rejects_writes() {
        let temp_dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(temp_dir.path());
        storage.close().await.unwrap();
        storage.close().await.unwrap();
        assert!(matches!(
            storage.set("k", json!(1), None).await,
            Err(CacheError::Closed)
        ));
    }
}
