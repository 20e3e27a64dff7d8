//! Repository-aware cache manager with background expiry

use std::{
    collections::BTreeMap,
    fmt::Display,
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument, Span};

use toolhub_config::{CacheBackend, CacheConfig, Repository};

use crate::{
    disk::DiskStorage,
    key::{CacheScope, RepositoryCacheKey},
    memory::MemoryStorage,
    metrics::CacheStats,
    storage::CacheStorage,
    CacheError, Result,
};

/// Timing knobs for [`CacheManager`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheManagerConfig {
    /// Period between background sweeps
    pub cleanup_interval: Duration,
    /// Wait after a failed sweep before trying again
    pub error_backoff: Duration,
}

impl Default for CacheManagerConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(300),
            error_backoff: Duration::from_secs(60),
        }
    }
}

/// Outcome of [`CacheManager::warm`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmReport {
    /// Repositories fetched and stored
    pub warmed: usize,
    /// Repositories that already had cached content
    pub skipped: usize,
    /// Repositories whose fetch or store failed
    pub failed: usize,
    /// One message per failure
    pub errors: Vec<String>,
}

/// Cached-file summary for one repository branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryCacheStats {
    pub repository: String,
    pub branch: String,
    pub cached_files: usize,
}

struct Sweeper {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns every cache entry lifetime and maps repository files onto keys
///
/// `start` spawns a sweep that removes expired entries every
/// `cleanup_interval`; `stop` cancels it, waits for it, then closes the
/// storage. Share it behind an `Arc`.
pub struct CacheManager {
    storage: Arc<dyn CacheStorage>,
    config: CacheManagerConfig,
    sweeper: Mutex<Option<Sweeper>>,
    stopped: AtomicBool,
    span: Span,
}

impl CacheManager {
    pub fn new(storage: Arc<dyn CacheStorage>, config: CacheManagerConfig) -> Self {
        Self {
            storage,
            config,
            sweeper: Mutex::new(None),
            stopped: AtomicBool::new(false),
            span: Span::none(),
        }
    }

    /// Build the backend described by the configuration
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        let storage: Arc<dyn CacheStorage> = match config.backend {
            CacheBackend::Memory => Arc::new(
                MemoryStorage::new()
                    .with_default_ttl(config.ttl())
                    .with_max_size(config.max_size),
            ),
            CacheBackend::File => {
                let path = config.storage_path.as_ref().ok_or_else(|| CacheError::Storage {
                    message: "file backend requires a storage_path".to_string(),
                })?;
                Arc::new(DiskStorage::new(path).with_default_ttl(config.ttl()))
            }
        };

        Ok(Self::new(
            storage,
            CacheManagerConfig {
                cleanup_interval: config.cleanup_interval(),
                ..CacheManagerConfig::default()
            },
        ))
    }

    /// Run log events and the sweep task inside `span`
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub fn config(&self) -> &CacheManagerConfig {
        &self.config
    }

    /// Start the background sweep. Starting twice is a no-op.
    pub async fn start(&self) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }

        let mut sweeper = self.sweeper.lock().await;
        if sweeper.is_some() {
            debug!(parent: &self.span, "Cache sweep already running");
            return Ok(());
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(
            sweep_loop(
                Arc::clone(&self.storage),
                self.config.clone(),
                token.clone(),
            )
            .instrument(self.span.clone()),
        );
        *sweeper = Some(Sweeper { token, handle });

        info!(
            parent: &self.span,
            interval_secs = self.config.cleanup_interval.as_secs(),
            "Cache manager started"
        );
        Ok(())
    }

    /// Stop the sweep and close the storage. Later calls do nothing.
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let Some(sweeper) = self.sweeper.lock().await.take() {
            sweeper.token.cancel();
            if let Err(e) = sweeper.handle.await {
                warn!(parent: &self.span, error = %e, "Cache sweep task ended abnormally");
            }
        }

        self.storage.close().await?;
        info!(parent: &self.span, "Cache manager stopped");
        Ok(())
    }

    /// Whether the background sweep is active
    pub async fn is_running(&self) -> bool {
        self.sweeper.lock().await.is_some()
    }

    fn file_key(scope: CacheScope, repository: &Repository, file_path: &str) -> Result<String> {
        RepositoryCacheKey::new(&repository.url, &repository.branch, file_path).map(|k| k.scoped_key(scope))
    }

    fn repository_pattern(repository: &Repository) -> String {
        RepositoryCacheKey::repository_pattern(&repository.url, &repository.branch)
    }

    /// Cached text of one synced repository file
    pub async fn get_file(&self, repository: &Repository, file_path: &str) -> Result<Option<String>> {
        self.get_scoped_file(CacheScope::Content, repository, file_path).await
    }

    /// Store one synced repository file; `ttl` overrides the storage default
    pub async fn set_file(
        &self,
        repository: &Repository,
        file_path: &str,
        content: &str,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.set_scoped_file(CacheScope::Content, repository, file_path, content, ttl)
            .await
    }

    /// Drop one synced repository file, reporting whether it was cached
    pub async fn invalidate_file(&self, repository: &Repository, file_path: &str) -> Result<bool> {
        self.invalidate_scoped_file(CacheScope::Content, repository, file_path)
            .await
    }

    pub async fn get_scoped_file(
        &self,
        scope: CacheScope,
        repository: &Repository,
        file_path: &str,
    ) -> Result<Option<String>> {
        let key = Self::file_key(scope, repository, file_path)?;
        let content = match self.storage.get(&key).await? {
            Some(serde_json::Value::String(content)) => Some(content),
            Some(_) => {
                return Err(CacheError::Deserialization {
                    message: format!("cached value for '{}' is not text", key),
                })
            }
            None => None,
        };

        debug!(
            parent: &self.span,
            repository = %repository.url,
            file = file_path,
            scope = ?scope,
            hit = content.is_some(),
            "Cache lookup"
        );
        Ok(content)
    }

    pub async fn set_scoped_file(
        &self,
        scope: CacheScope,
        repository: &Repository,
        file_path: &str,
        content: &str,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let key = Self::file_key(scope, repository, file_path)?;
        self.storage
            .set(&key, serde_json::Value::String(content.to_string()), ttl)
            .await?;
        debug!(parent: &self.span, key = %key, bytes = content.len(), "Cached file");
        Ok(())
    }

    pub async fn invalidate_scoped_file(
        &self,
        scope: CacheScope,
        repository: &Repository,
        file_path: &str,
    ) -> Result<bool> {
        let key = Self::file_key(scope, repository, file_path)?;
        let removed = self.storage.delete(&key).await?;
        if removed {
            debug!(parent: &self.span, key = %key, "Invalidated cached file");
        }
        Ok(removed)
    }

    /// Store a whole repository snapshot, returning how many files were written
    pub async fn cache_repository_content(
        &self,
        repository: &Repository,
        files: &BTreeMap<String, String>,
        ttl: Option<Duration>,
    ) -> Result<usize> {
        for (path, content) in files {
            self.set_file(repository, path, content, ttl).await?;
        }
        info!(
            parent: &self.span,
            repository = %repository.url,
            branch = %repository.branch,
            count = files.len(),
            "Cached repository content"
        );
        Ok(files.len())
    }

    /// Every live synced file of a repository branch, keyed by path
    pub async fn get_repository_content(&self, repository: &Repository) -> Result<BTreeMap<String, String>> {
        let keys: Vec<String> = self
            .storage
            .keys(&Self::repository_pattern(repository))
            .try_collect()
            .await?;

        let mut files = BTreeMap::new();
        for key in keys {
            let parsed = match RepositoryCacheKey::from_key(&key) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(parent: &self.span, key = %key, error = %e, "Skipping malformed cache key");
                    continue;
                }
            };
            match self.storage.get(&key).await {
                Ok(Some(serde_json::Value::String(content))) => {
                    files.insert(parsed.file_path, content);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(parent: &self.span, key = %key, error = %e, "Failed to read cached file");
                }
            }
        }

        debug!(
            parent: &self.span,
            repository = %repository.url,
            branch = %repository.branch,
            count = files.len(),
            "Read repository content from cache"
        );
        Ok(files)
    }

    /// Whether any synced file of the repository branch is cached
    ///
    /// Manifests and resource reads do not count.
    pub async fn has_repository_content(&self, repository: &Repository) -> Result<bool> {
        let pattern = Self::repository_pattern(repository);
        let mut keys = self.storage.keys(&pattern);
        Ok(keys.try_next().await?.is_some())
    }

    /// Remove every cached entry of a repository branch in all scopes
    pub async fn invalidate_repository(&self, repository: &Repository) -> Result<usize> {
        let mut invalidated = 0;
        for scope in CacheScope::ALL {
            let pattern = RepositoryCacheKey::scope_pattern(scope, &repository.url, &repository.branch);
            let keys: Vec<String> = self.storage.keys(&pattern).try_collect().await?;
            for key in keys {
                if self.storage.delete(&key).await? {
                    invalidated += 1;
                }
            }
        }

        info!(
            parent: &self.span,
            repository = %repository.url,
            branch = %repository.branch,
            count = invalidated,
            "Invalidated repository cache"
        );
        Ok(invalidated)
    }

    /// Populate the cache for repositories that have nothing cached yet
    ///
    /// Each repository is handled on its own: a failed fetch is recorded in
    /// the report and the rest carry on.
    pub async fn warm<F, Fut, E>(&self, repositories: &[Repository], fetch: F) -> WarmReport
    where
        F: Fn(Repository) -> Fut,
        Fut: Future<Output = std::result::Result<BTreeMap<String, String>, E>>,
        E: Display,
    {
        info!(parent: &self.span, repositories = repositories.len(), "Starting cache warm-up");
        let mut report = WarmReport::default();

        for repository in repositories {
            match self.has_repository_content(repository).await {
                Ok(true) => {
                    debug!(parent: &self.span, repository = %repository, "Already cached, skipping warm-up");
                    report.skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    report.errors.push(format!("{}: {}", repository, e));
                    continue;
                }
            }

            let outcome = match fetch(repository.clone()).await {
                Ok(files) => self
                    .cache_repository_content(repository, &files, None)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            match outcome {
                Ok(_) => report.warmed += 1,
                Err(message) => {
                    error!(parent: &self.span, repository = %repository, error = %message, "Failed to warm cache");
                    report.failed += 1;
                    report.errors.push(format!("{}: {}", repository, message));
                }
            }
        }

        info!(
            parent: &self.span,
            warmed = report.warmed,
            skipped = report.skipped,
            failed = report.failed,
            "Cache warm-up completed"
        );
        report
    }

    /// Count of synced files cached for a repository branch
    pub async fn repository_stats(&self, repository: &Repository) -> Result<RepositoryCacheStats> {
        let cached_files = self.count_keys(&Self::repository_pattern(repository)).await?;

        Ok(RepositoryCacheStats {
            repository: repository.url.clone(),
            branch: repository.branch.clone(),
            cached_files,
        })
    }

    /// Sweep expired entries now
    pub async fn cleanup_expired(&self) -> Result<usize> {
        let count = self.storage.cleanup_expired().await?;
        info!(parent: &self.span, count, "Manual cleanup completed");
        Ok(count)
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.storage.clear().await?;
        info!(parent: &self.span, "Cleared all cached data");
        Ok(())
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        self.storage.stats().await
    }

    /// Raw read for content that is not a repository file
    pub async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.storage.get(key).await
    }

    /// Raw write for content that is not a repository file
    pub async fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> Result<()> {
        self.storage.set(key, value, ttl).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.storage.delete(key).await
    }

    /// Number of live keys matching a glob
    pub async fn count_keys(&self, pattern: &str) -> Result<usize> {
        let mut keys = self.storage.keys(pattern);
        let mut count = 0;
        while let Some(item) = keys.next().await {
            item?;
            count += 1;
        }
        Ok(count)
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.token.cancel();
        }
    }
}

async fn sweep_loop(storage: Arc<dyn CacheStorage>, config: CacheManagerConfig, token: CancellationToken) {
    let mut delay = config.cleanup_interval;

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("Cache sweep shutting down");
                break;
            }
            _ = tokio::time::sleep(delay) => {
                match storage.cleanup_expired().await {
                    Ok(count) => {
                        if count > 0 {
                            info!(count, "Background cleanup completed");
                        }
                        delay = config.cleanup_interval;
                    }
                    Err(e) => {
                        error!(error = %e, backoff_secs = config.error_backoff.as_secs(), "Error in cleanup loop");
                        delay = config.error_backoff;
                    }
                }
            }
        }
    }
}
