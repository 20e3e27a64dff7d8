use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use toolhub_cache::{CacheManager, CacheManagerConfig, CacheScope, MemoryStorage};
use toolhub_config::{AppConfig, ConflictStrategy, Repository};
use toolhub_gitlab::{ConnectionStatus, ContentSource, GitLabError, ProjectInfo};
use toolhub_tools::{resources, ToolError, ToolManager};

/// In-memory repository contents keyed by (project, branch, path)
#[derive(Default)]
struct FakeSource {
    files: Mutex<HashMap<(String, String, String), String>>,
    fetches: AtomicUsize,
}

impl FakeSource {
    fn with_file(self, project: &str, branch: &str, path: &str, content: &str) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert((project.into(), branch.into(), path.into()), content.into());
        self
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn get_project(&self, project_path: &str) -> toolhub_gitlab::Result<ProjectInfo> {
        Err(GitLabError::Http {
            status: 404,
            message: format!("404 Project {} Not Found", project_path),
        })
    }

    async fn get_file_decoded(
        &self,
        project_path: &str,
        file_path: &str,
        reference: &str,
    ) -> toolhub_gitlab::Result<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.files
            .lock()
            .unwrap()
            .get(&(project_path.into(), reference.into(), file_path.into()))
            .cloned()
            .ok_or_else(|| GitLabError::Http {
                status: 404,
                message: "404 File Not Found".to_string(),
            })
    }

    async fn fetch_repository_content(
        &self,
        repository: &Repository,
    ) -> toolhub_gitlab::Result<BTreeMap<String, String>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .filter(|((p, b, _), _)| *p == repository.url && *b == repository.branch)
            .map(|((_, _, path), content)| (path.clone(), content.clone()))
            .collect())
    }

    async fn probe_connection(&self) -> ConnectionStatus {
        ConnectionStatus {
            connected: true,
            user: None,
            gitlab_version: None,
            error: None,
        }
    }
}

const ALPHA_TOOLS: &str = r#"{
    "tools": [
        {"name": "lint", "description": "Alpha lint rules", "resources": ["rules/lint.md"]},
        {"name": "style", "description": "Alpha style guide", "resources": ["docs/style.md"]}
    ]
}"#;

const BETA_TOOLS: &str = r#"{
    "tools": [
        {"name": "lint", "description": "Beta lint rules", "resources": ["lint/beta.md"]}
    ]
}"#;

fn config(repositories: &[&str]) -> AppConfig {
    let mut config = AppConfig::new("https://gitlab.example.com", "secret");
    for url in repositories {
        config.gitlab.repositories.push(Repository::new(*url));
    }
    config
}

fn cache() -> Arc<CacheManager> {
    Arc::new(CacheManager::new(
        Arc::new(MemoryStorage::new()),
        CacheManagerConfig::default(),
    ))
}

fn source() -> Arc<FakeSource> {
    Arc::new(
        FakeSource::default()
            .with_file("team/alpha", "main", "tools.json", ALPHA_TOOLS)
            .with_file("team/alpha", "main", "rules/lint.md", "# Lint\nNo tabs.")
            .with_file("team/alpha", "main", "secret.md", "hidden")
            .with_file("team/beta", "main", "tools.json", BETA_TOOLS),
    )
}

#[tokio::test]
async fn test_load_all_tools_prefixes_conflicts() {
    let manager = ToolManager::new(&config(&["team/alpha", "team/beta"]), cache(), source());

    let resolution = manager.load_resolution().await.unwrap();
    let names: Vec<_> = resolution.tools.iter().map(|t| t.resolved_name.as_str()).collect();
    assert_eq!(names, vec!["alpha:lint", "alpha:style", "beta:lint"]);

    assert_eq!(resolution.conflicts.len(), 1);
    assert_eq!(resolution.conflicts[0].name, "lint");
    assert_eq!(resolution.conflicts[0].strategy_applied, ConflictStrategy::Prefix);

    let style = resolution.tools.iter().find(|t| t.original_name == "style").unwrap();
    assert_eq!(
        style.resource_uris,
        vec![resources::encode("team/alpha", "main", "docs/style.md")]
    );
}

#[tokio::test]
async fn test_manifest_is_cached_after_first_load() {
    let source = source();
    let cache = cache();
    let manager = ToolManager::new(&config(&["team/alpha"]), cache.clone(), source.clone());

    manager.load_all_tools().await.unwrap();
    assert_eq!(source.fetches(), 1);

    manager.load_all_tools().await.unwrap();
    assert_eq!(source.fetches(), 1);

    let repo = Repository::new("team/alpha");
    assert!(cache
        .get_scoped_file(CacheScope::Manifest, &repo, "tools.json")
        .await
        .unwrap()
        .is_some());
    assert_eq!(cache.get_file(&repo, "tools.json").await.unwrap(), None);
}

#[tokio::test]
async fn test_cached_manifest_does_not_block_warm_up() {
    let source = source();
    let cache = cache();
    let manager = ToolManager::new(&config(&["team/alpha"]), cache.clone(), source.clone());
    let uri = resources::encode("team/alpha", "main", "rules/lint.md");
    manager.get_resource_content(&uri).await.unwrap();

    let repo = Repository::new("team/alpha");
    let report = cache
        .warm(&[repo.clone()], |r| {
            let source = source.clone();
            async move { source.fetch_repository_content(&r).await }
        })
        .await;
    assert_eq!(report.warmed, 1);
    assert_eq!(report.skipped, 0);
    assert_eq!(
        cache.get_file(&repo, "rules/lint.md").await.unwrap().as_deref(),
        Some("# Lint\nNo tabs.")
    );
    assert_eq!(cache.repository_stats(&repo).await.unwrap().cached_files, 3);
}

#[tokio::test]
async fn test_synced_content_serves_manifest_and_resources() {
    let source = source();
    let cache = cache();
    let repo = Repository::new("team/alpha");
    let files = source.fetch_repository_content(&repo).await.unwrap();
    cache.cache_repository_content(&repo, &files, None).await.unwrap();

    let manager = ToolManager::new(&config(&["team/alpha"]), cache.clone(), source.clone());
    assert_eq!(manager.load_all_tools().await.unwrap().len(), 2);
    let uri = resources::encode("team/alpha", "main", "rules/lint.md");
    assert_eq!(manager.get_resource_content(&uri).await.unwrap(), "# Lint\nNo tabs.");
    assert_eq!(source.fetches(), 0);
}

#[tokio::test]
async fn test_repository_without_manifest_is_skipped() {
    let manager = ToolManager::new(&config(&["team/alpha", "team/empty"]), cache(), source());

    let tools = manager.load_all_tools().await.unwrap();
    assert_eq!(tools.len(), 2);
    assert!(tools.iter().all(|t| t.repository == "team/alpha"));

    let missing = manager
        .load_repository_tools(&Repository::new("team/empty"))
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_invalid_manifest_is_skipped() {
    let source = Arc::new(
        FakeSource::default()
            .with_file("team/alpha", "main", "tools.json", ALPHA_TOOLS)
            .with_file("team/broken", "main", "tools.json", "{\"tools\": ["),
    );
    let manager = ToolManager::new(&config(&["team/broken", "team/alpha"]), cache(), source);

    let tools = manager.load_all_tools().await.unwrap();
    assert_eq!(tools.len(), 2);

    let err = manager
        .load_repository_tools(&Repository::new("team/broken"))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Specification { ref repository, .. } if repository == "team/broken"));
}

#[tokio::test]
async fn test_error_strategy_reports_conflict() {
    let mut manager = ToolManager::new(&config(&["team/alpha", "team/beta"]), cache(), source());
    manager.set_conflict_strategy(ConflictStrategy::Error);
    assert_eq!(manager.conflict_strategy(), ConflictStrategy::Error);

    let err = manager.load_all_tools().await.unwrap_err();
    match err {
        ToolError::Conflict { name, repositories } => {
            assert_eq!(name, "lint");
            assert_eq!(repositories, vec!["alpha", "beta"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_no_repositories_resolves_empty() {
    let manager = ToolManager::new(&config(&[]), cache(), source());
    let resolution = manager.load_resolution().await.unwrap();
    assert!(resolution.tools.is_empty());
    assert!(resolution.conflicts.is_empty());
}

#[tokio::test]
async fn test_get_resource_content_fetches_then_caches() {
    let source = source();
    let manager = ToolManager::new(&config(&["team/alpha"]), cache(), source.clone());
    let uri = resources::encode("team/alpha", "main", "rules/lint.md");

    let first = manager.get_resource_content(&uri).await.unwrap();
    assert_eq!(first, "# Lint\nNo tabs.");
    // manifest plus the file
    assert_eq!(source.fetches(), 2);

    let second = manager.get_resource_content(&uri).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(source.fetches(), 2);
}

#[tokio::test]
async fn test_get_resource_content_rejects_unlisted_file() {
    let manager = ToolManager::new(&config(&["team/alpha"]), cache(), source());
    let uri = resources::encode("team/alpha", "main", "secret.md");

    let err = manager.get_resource_content(&uri).await.unwrap_err();
    assert!(matches!(err, ToolError::ResourceAccess(ref message) if message.contains("secret.md")));
}

#[tokio::test]
async fn test_get_resource_content_rejects_unknown_repository() {
    let manager = ToolManager::new(&config(&["team/alpha"]), cache(), source());

    let other_repo = resources::encode("team/gamma", "main", "rules/lint.md");
    assert!(matches!(
        manager.get_resource_content(&other_repo).await,
        Err(ToolError::ResourceAccess(_))
    ));

    let other_branch = resources::encode("team/alpha", "develop", "rules/lint.md");
    assert!(matches!(
        manager.get_resource_content(&other_branch).await,
        Err(ToolError::ResourceAccess(_))
    ));
}

#[tokio::test]
async fn test_get_resource_content_rejects_malformed_uri() {
    let manager = ToolManager::new(&config(&["team/alpha"]), cache(), source());
    assert!(matches!(
        manager.get_resource_content("https://team/alpha/main/a.md").await,
        Err(ToolError::UriFormat(_))
    ));
}

#[tokio::test]
async fn test_listed_but_missing_file_propagates_not_found() {
    let source = Arc::new(FakeSource::default().with_file("team/beta", "main", "tools.json", BETA_TOOLS));
    let manager = ToolManager::new(&config(&["team/beta"]), cache(), source);
    let uri = resources::encode("team/beta", "main", "lint/beta.md");

    let err = manager.get_resource_content(&uri).await.unwrap_err();
    assert!(matches!(err, ToolError::GitLab(ref e) if e.is_not_found()));
}

#[tokio::test]
async fn test_invalidated_repository_reloads_manifest() {
    let source = source();
    let cache = cache();
    let manager = ToolManager::new(&config(&["team/alpha"]), cache.clone(), source.clone());

    manager.load_all_tools().await.unwrap();
    let uri = resources::encode("team/alpha", "main", "rules/lint.md");
    manager.get_resource_content(&uri).await.unwrap();
    assert_eq!(source.fetches(), 2);

    // manifest and resource scopes both go
    let removed = cache.invalidate_repository(&Repository::new("team/alpha")).await.unwrap();
    assert_eq!(removed, 2);

    manager.load_all_tools().await.unwrap();
    assert_eq!(source.fetches(), 3);
}
