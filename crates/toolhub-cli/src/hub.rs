//! Service facade over the content-sync pipeline
//!
//! [`ToolHub`] wires the remote client, the cache manager and the tool
//! manager together and exposes the operations a protocol server or the
//! `toolhub` binary calls.

use std::{collections::BTreeMap, sync::Arc};

use chrono::Utc;
use toolhub_cache::{CacheManager, CacheStats, WarmReport};
use toolhub_config::{AppConfig, ConfigManager, ConflictStrategy, Repository};
use toolhub_gitlab::{ConnectionStatus, ContentSource, GitLabClient};
use toolhub_tools::{Resolution, ResolvedTool, ToolManager};
use tracing::{debug, error, info, info_span, warn, Span};

use crate::{
    error::{HubError, Result},
    models::{bytes_to_mb, CacheStatus, InvalidationResult, RefreshResult, RepositoryInfo, RepositoryStatus},
};

pub struct ToolHub {
    config: AppConfig,
    cache: Arc<CacheManager>,
    source: Arc<dyn ContentSource>,
    tools: ToolManager,
    span: Span,
}

impl ToolHub {
    /// Assemble a hub from already constructed parts
    pub fn new(config: AppConfig, cache: Arc<CacheManager>, source: Arc<dyn ContentSource>) -> Self {
        let tools = ToolManager::new(&config, cache.clone(), source.clone());
        Self {
            config,
            cache,
            source,
            tools,
            span: Span::none(),
        }
    }

    /// Validate `config` and build the GitLab client and cache it describes
    pub fn from_config(config: AppConfig) -> Result<Self> {
        ConfigManager::validate(&config)?;

        let span = info_span!("toolhub", server = %config.server.name);
        let client = GitLabClient::from_config(&config.gitlab)?
            .with_span(info_span!(parent: &span, "gitlab"));
        let cache = CacheManager::from_config(&config.cache)?
            .with_span(info_span!(parent: &span, "cache"));

        Ok(Self::new(config, Arc::new(cache), Arc::new(client)).with_span(span))
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.tools = ToolManager::new(&self.config, self.cache.clone(), self.source.clone())
            .with_span(info_span!(parent: &span, "tools"));
        self.span = span;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// Start the cache sweep and warm the cache for every repository
    pub async fn start(&self) -> Result<WarmReport> {
        info!(parent: &self.span, repositories = self.config.gitlab.repositories.len(), "Starting toolhub");
        self.cache.start().await?;
        Ok(self.warm_cache().await)
    }

    /// Stop the cache sweep and close the store
    pub async fn stop(&self) -> Result<()> {
        info!(parent: &self.span, "Stopping toolhub");
        self.cache.stop().await?;
        Ok(())
    }

    /// Fetch content for every repository that has nothing cached yet
    pub async fn warm_cache(&self) -> WarmReport {
        let source = &self.source;
        let report = self
            .cache
            .warm(&self.config.gitlab.repositories, |repository| async move {
                source.fetch_repository_content(&repository).await
            })
            .await;

        if report.failed > 0 {
            warn!(parent: &self.span, failed = report.failed, "Cache warm-up finished with failures");
        }
        report
    }

    pub fn set_conflict_strategy(&mut self, strategy: ConflictStrategy) {
        self.config.tools.conflict_strategy = strategy;
        self.tools.set_conflict_strategy(strategy);
    }

    pub async fn load_all_tools(&self) -> Result<Vec<ResolvedTool>> {
        Ok(self.tools.load_all_tools().await?)
    }

    /// Resolved tools together with the conflicts found on the way
    pub async fn load_resolution(&self) -> Result<Resolution> {
        Ok(self.tools.load_resolution().await?)
    }

    pub async fn get_resource_content(&self, uri: &str) -> Result<String> {
        Ok(self.tools.get_resource_content(uri).await?)
    }

    /// Drop every cached file of one repository branch
    pub async fn invalidate_repository(&self, repository: &Repository) -> Result<usize> {
        Ok(self.cache.invalidate_repository(repository).await?)
    }

    pub async fn get_stats(&self) -> Result<CacheStats> {
        Ok(self.cache.stats().await?)
    }

    /// Synced files of one configured repository branch, keyed by path
    ///
    /// Reads the cache first and fetches on a miss, caching what it got. An
    /// unconfigured repository or a failed fetch yields an empty map.
    pub async fn get_repository_rules(&self, url: &str, branch: &str) -> BTreeMap<String, String> {
        debug!(parent: &self.span, repository = url, branch, "Getting repository rules");

        let Some(repository) = self.config.find_repository(url, branch) else {
            warn!(parent: &self.span, repository = url, branch, "Repository not found in configuration");
            return BTreeMap::new();
        };

        match self.cache.get_repository_content(repository).await {
            Ok(files) if !files.is_empty() => {
                debug!(parent: &self.span, repository = %repository, count = files.len(), "Returning cached rules");
                return files;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(parent: &self.span, repository = %repository, error = %e, "Failed to read cached rules");
            }
        }

        let files = match self.source.fetch_repository_content(repository).await {
            Ok(files) => files,
            Err(e) => {
                error!(parent: &self.span, repository = %repository, error = %e, "Failed to fetch rules");
                return BTreeMap::new();
            }
        };
        if let Err(e) = self.cache.cache_repository_content(repository, &files, None).await {
            warn!(parent: &self.span, repository = %repository, error = %e, "Failed to cache fetched rules");
        }

        debug!(parent: &self.span, repository = %repository, count = files.len(), "Fetched and cached rules");
        files
    }

    /// One synced file of a repository branch
    pub async fn get_specific_rule(&self, url: &str, branch: &str, file_path: &str) -> Option<String> {
        self.get_repository_rules(url, branch).await.remove(file_path)
    }

    /// Configured branches of `url`, or all repositories when `url` is `None`
    fn select(&self, url: Option<&str>) -> Vec<Repository> {
        match url {
            Some(url) => self.config.repositories_by_url(url).cloned().collect(),
            None => self.config.gitlab.repositories.clone(),
        }
    }

    /// Invalidate and re-fetch the content of one or all repositories
    ///
    /// An unknown url is reported in the result rather than as an error.
    /// Each repository is refreshed independently.
    pub async fn refresh_repositories(&self, url: Option<&str>) -> Result<RefreshResult> {
        info!(parent: &self.span, repository = ?url, "Refreshing repositories");

        let repositories = self.select(url);
        if repositories.is_empty() {
            if let Some(url) = url {
                return Ok(RefreshResult {
                    success: false,
                    repository: Some(url.to_string()),
                    updated_files: 0,
                    cached_files: 0,
                    errors: vec![HubError::RepositoryNotFound(url.to_string()).to_string()],
                });
            }
        }

        let mut updated_files = 0;
        let mut cached_files = 0;
        let mut errors = Vec::new();

        for repository in &repositories {
            match self.refresh_one(repository).await {
                Ok((fetched, cached)) => {
                    updated_files += fetched;
                    cached_files += cached;
                    info!(parent: &self.span, repository = %repository, count = fetched, "Refreshed repository");
                }
                Err(e) => {
                    error!(parent: &self.span, repository = %repository, error = %e, "Failed to refresh repository");
                    errors.push(format!("Failed to refresh {}: {}", repository, e));
                }
            }
        }

        Ok(RefreshResult {
            success: errors.is_empty(),
            repository: url.map(str::to_string),
            updated_files,
            cached_files,
            errors,
        })
    }

    async fn refresh_one(&self, repository: &Repository) -> Result<(usize, usize)> {
        self.cache.invalidate_repository(repository).await?;
        let files = self.source.fetch_repository_content(repository).await?;
        let cached = self.cache.cache_repository_content(repository, &files, None).await?;
        Ok((files.len(), cached))
    }

    /// Invalidate one repository's branches, or clear the whole cache
    pub async fn invalidate_cache(&self, url: Option<&str>) -> Result<InvalidationResult> {
        info!(parent: &self.span, repository = ?url, "Invalidating cache");

        let Some(url) = url else {
            self.cache.clear_all().await?;
            return Ok(InvalidationResult {
                success: true,
                repository: None,
                invalidated: None,
                cleared_all: true,
                error: None,
            });
        };

        let repositories = self.select(Some(url));
        if repositories.is_empty() {
            return Ok(InvalidationResult {
                success: false,
                repository: Some(url.to_string()),
                invalidated: Some(0),
                cleared_all: false,
                error: Some(HubError::RepositoryNotFound(url.to_string()).to_string()),
            });
        }

        let mut invalidated = 0;
        for repository in &repositories {
            invalidated += self.cache.invalidate_repository(repository).await?;
        }

        Ok(InvalidationResult {
            success: true,
            repository: Some(url.to_string()),
            invalidated: Some(invalidated),
            cleared_all: false,
            error: None,
        })
    }

    /// Check that each repository is reachable and count its cached files
    pub async fn repository_status(&self, url: Option<&str>) -> Vec<RepositoryStatus> {
        let mut statuses = Vec::new();

        for repository in self.select(url) {
            let checked = async {
                self.source.get_project(&repository.url).await?;
                let stats = self.cache.repository_stats(&repository).await?;
                Ok::<_, HubError>(stats.cached_files)
            }
            .await;

            let status = match checked {
                Ok(cached_files) => RepositoryStatus {
                    repository: repository.url.clone(),
                    branch: repository.branch.clone(),
                    accessible: true,
                    cached_files,
                    last_check: Utc::now(),
                    error: None,
                },
                Err(e) => {
                    error!(parent: &self.span, repository = %repository, error = %e, "Repository status check failed");
                    RepositoryStatus {
                        repository: repository.url.clone(),
                        branch: repository.branch.clone(),
                        accessible: false,
                        cached_files: 0,
                        last_check: Utc::now(),
                        error: Some(e.to_string()),
                    }
                }
            };
            debug!(parent: &self.span, repository = %repository, accessible = status.accessible, "Repository status checked");
            statuses.push(status);
        }

        statuses
    }

    /// Configured repositories with their project name and cached file count
    pub async fn list_repositories(&self) -> Vec<RepositoryInfo> {
        let mut infos = Vec::new();

        for repository in &self.config.gitlab.repositories {
            let cached_files = match self.cache.repository_stats(repository).await {
                Ok(stats) => stats.cached_files,
                Err(e) => {
                    error!(parent: &self.span, repository = %repository, error = %e, "Failed to get repository info");
                    continue;
                }
            };

            let (name, status) = match self.source.get_project(&repository.url).await {
                Ok(project) => (project.name, "accessible"),
                Err(_) => (repository.short_name().to_string(), "unknown"),
            };

            infos.push(RepositoryInfo {
                url: repository.url.clone(),
                branch: repository.branch.clone(),
                name,
                cached_files,
                status: status.to_string(),
            });
        }

        infos
    }

    pub async fn cache_status(&self) -> Result<CacheStatus> {
        let stats = self.cache.stats().await?;
        Ok(CacheStatus {
            backend: self.config.cache.backend.to_string(),
            item_count: stats.item_count,
            hit_rate: stats.hit_rate(),
            memory_usage_mb: bytes_to_mb(stats.memory_usage_bytes),
            storage_usage_mb: bytes_to_mb(stats.storage_usage_bytes),
        })
    }

    pub async fn probe_connection(&self) -> ConnectionStatus {
        self.source.probe_connection().await
    }
}
