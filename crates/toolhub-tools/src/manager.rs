//! Loads tool manifests from repositories and serves their resources

use std::{sync::Arc, time::Duration};

use toolhub_cache::{CacheManager, CacheScope};
use toolhub_config::{AppConfig, ConflictStrategy, Repository};
use toolhub_gitlab::ContentSource;
use tracing::{debug, error, info, warn, Span};

use crate::{
    error::ToolError,
    models::{ResolvedTool, ToolsSpecification},
    resolver::{Resolution, ToolResolver},
    resources, Result,
};

/// Tool registry backed by the cache and a content source
///
/// Manifests and resource reads are cached in their own scopes, apart from
/// the synced repository content. Lookups still fall back to synced content
/// before fetching, and invalidating a repository drops every scope.
pub struct ToolManager {
    repositories: Vec<Repository>,
    manifest_path: String,
    ttl: Option<Duration>,
    cache: Arc<CacheManager>,
    source: Arc<dyn ContentSource>,
    resolver: ToolResolver,
    span: Span,
}

impl ToolManager {
    pub fn new(config: &AppConfig, cache: Arc<CacheManager>, source: Arc<dyn ContentSource>) -> Self {
        Self {
            repositories: config.gitlab.repositories.clone(),
            manifest_path: config.tools.manifest_path.clone(),
            ttl: Some(config.cache.ttl()),
            cache,
            source,
            resolver: ToolResolver::new(config.tools.conflict_strategy),
            span: Span::none(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.resolver = self.resolver.with_span(span.clone());
        self.span = span;
        self
    }

    pub fn repositories(&self) -> &[Repository] {
        &self.repositories
    }

    pub fn conflict_strategy(&self) -> ConflictStrategy {
        self.resolver.strategy()
    }

    pub fn set_conflict_strategy(&mut self, strategy: ConflictStrategy) {
        self.resolver = ToolResolver::new(strategy).with_span(self.span.clone());
        info!(parent: &self.span, strategy = %strategy, "Conflict resolution strategy updated");
    }

    /// Resolved tools of every configured repository
    pub async fn load_all_tools(&self) -> Result<Vec<ResolvedTool>> {
        Ok(self.load_resolution().await?.tools)
    }

    /// Like [`load_all_tools`](Self::load_all_tools) but keeps the conflict records
    pub async fn load_resolution(&self) -> Result<Resolution> {
        info!(
            parent: &self.span,
            count = self.repositories.len(),
            "Loading tools from all repositories"
        );

        let mut specs = Vec::new();
        for repo in &self.repositories {
            match self.load_repository_tools(repo).await {
                Ok(Some(spec)) => {
                    debug!(parent: &self.span, repository = %repo, tool_count = spec.tools.len(), "Loaded tools");
                    specs.push((repo.clone(), spec));
                }
                Ok(None) => {
                    warn!(parent: &self.span, repository = %repo, "Repository has no tool manifest, skipping");
                }
                Err(e) => {
                    error!(parent: &self.span, repository = %repo, error = %e, "Failed to load tools from repository");
                }
            }
        }

        if specs.is_empty() {
            warn!(parent: &self.span, "No tool specifications loaded from any repository");
            return Ok(Resolution::default());
        }

        self.resolver.resolve(&specs)
    }

    /// Manifest of one repository, or `None` when it has none
    ///
    /// A cached manifest is used when it parses; otherwise it is fetched,
    /// validated and cached.
    pub async fn load_repository_tools(&self, repo: &Repository) -> Result<Option<ToolsSpecification>> {
        if let Some((scope, text)) = self.cached_text(CacheScope::Manifest, repo, &self.manifest_path).await {
            match ToolsSpecification::parse(&text, &repo.url) {
                Ok(spec) => {
                    debug!(parent: &self.span, repository = %repo, scope = ?scope, "Using cached tool specification");
                    return Ok(Some(spec));
                }
                Err(e) => {
                    warn!(parent: &self.span, repository = %repo, error = %e, "Discarding invalid cached manifest");
                    if let Err(e) = self.cache.invalidate_scoped_file(scope, repo, &self.manifest_path).await {
                        debug!(parent: &self.span, error = %e, "Failed to drop cached manifest");
                    }
                }
            }
        }

        let text = match self
            .source
            .get_file_decoded(&repo.url, &self.manifest_path, &repo.branch)
            .await
        {
            Ok(text) => text,
            Err(e) if e.is_not_found() => {
                debug!(parent: &self.span, repository = %repo, "Tool manifest not found");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let spec = ToolsSpecification::parse(&text, &repo.url)?;
        if let Err(e) = self
            .cache
            .set_scoped_file(CacheScope::Manifest, repo, &self.manifest_path, &text, self.ttl)
            .await
        {
            warn!(parent: &self.span, repository = %repo, error = %e, "Failed to cache tool manifest");
        }

        debug!(
            parent: &self.span,
            repository = %repo,
            tool_count = spec.tools.len(),
            "Loaded and cached tool specification"
        );
        Ok(Some(spec))
    }

    /// Text of the file a resource URI points at
    ///
    /// The repository branch must be configured and the file must be listed
    /// by one of its tools.
    pub async fn get_resource_content(&self, uri: &str) -> Result<String> {
        let target = resources::decode(uri)?;

        let repo = self
            .repositories
            .iter()
            .find(|r| r.url == target.repository && r.branch == target.branch)
            .ok_or_else(|| {
                ToolError::ResourceAccess(format!(
                    "Repository {}@{} not in configuration",
                    target.repository, target.branch
                ))
            })?;

        self.validate_resource_access(repo, &target.path).await?;

        if let Some((scope, content)) = self.cached_text(CacheScope::Resource, repo, &target.path).await {
            debug!(parent: &self.span, uri, scope = ?scope, "Using cached resource content");
            return Ok(content);
        }

        let content = self
            .source
            .get_file_decoded(&repo.url, &target.path, &repo.branch)
            .await?;
        if let Err(e) = self
            .cache
            .set_scoped_file(CacheScope::Resource, repo, &target.path, &content, self.ttl)
            .await
        {
            warn!(parent: &self.span, uri, error = %e, "Failed to cache resource content");
        }

        debug!(parent: &self.span, uri, size = content.len(), "Fetched and cached resource content");
        Ok(content)
    }

    /// Cached text from `scope`, then from synced content
    async fn cached_text(&self, scope: CacheScope, repo: &Repository, path: &str) -> Option<(CacheScope, String)> {
        for scope in [scope, CacheScope::Content] {
            match self.cache.get_scoped_file(scope, repo, path).await {
                Ok(Some(text)) => return Some((scope, text)),
                Ok(None) => {}
                Err(e) => {
                    debug!(parent: &self.span, repository = %repo, path, scope = ?scope, error = %e, "Cache read failed");
                }
            }
        }
        None
    }

    async fn validate_resource_access(&self, repo: &Repository, path: &str) -> Result<()> {
        let spec = self.load_repository_tools(repo).await?.ok_or_else(|| {
            ToolError::ResourceAccess(format!("No tool specification found for repository {}", repo))
        })?;

        match spec.tool_for_resource(path) {
            Some(tool) => {
                debug!(parent: &self.span, repository = %repo, path, tool = %tool.name, "Resource access validated");
                Ok(())
            }
            None => Err(ToolError::ResourceAccess(format!(
                "File {} not accessible: not listed in any tool's resources",
                path
            ))),
        }
    }
}
