use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use toolhub_cache::{CacheManager, CacheManagerConfig, MemoryStorage};
use toolhub_cli::{HubError, ToolHub};
use toolhub_config::{AppConfig, CacheBackend, ConflictStrategy, Repository};
use toolhub_gitlab::{ConnectionStatus, ContentSource, GitLabError, ProjectInfo};
use toolhub_tools::resources;

/// Serves fixed files for `team/alpha` and `team/beta`; `team/down` fails
#[derive(Default)]
struct StaticSource {
    fetches: AtomicUsize,
}

fn alpha_files() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "tools.json".to_string(),
            r#"{"tools":[{"name":"lint","description":"Lint","resources":["rules/.cursorrules"]}]}"#.to_string(),
        ),
        ("rules/.cursorrules".to_string(), "be nice".to_string()),
    ])
}

fn beta_files() -> BTreeMap<String, String> {
    BTreeMap::from([(
        "tools.json".to_string(),
        r#"{"tools":[{"name":"lint","description":"Beta lint"}]}"#.to_string(),
    )])
}

fn files_for(project: &str) -> Option<BTreeMap<String, String>> {
    match project {
        "team/alpha" => Some(alpha_files()),
        "team/beta" => Some(beta_files()),
        _ => None,
    }
}

fn unavailable() -> GitLabError {
    GitLabError::Http {
        status: 503,
        message: "Service Unavailable".to_string(),
    }
}

#[async_trait]
impl ContentSource for StaticSource {
    async fn get_project(&self, project_path: &str) -> toolhub_gitlab::Result<ProjectInfo> {
        files_for(project_path).ok_or_else(unavailable)?;
        let name = project_path.rsplit('/').next().unwrap_or(project_path);
        Ok(ProjectInfo {
            id: 1,
            name: name.to_uppercase(),
            path: name.to_string(),
            path_with_namespace: project_path.to_string(),
            default_branch: Some("main".to_string()),
            web_url: None,
            description: None,
            last_activity_at: None,
        })
    }

    async fn get_file_decoded(
        &self,
        project_path: &str,
        file_path: &str,
        _reference: &str,
    ) -> toolhub_gitlab::Result<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let files = files_for(project_path).ok_or_else(unavailable)?;
        files.get(file_path).cloned().ok_or(GitLabError::Http {
            status: 404,
            message: "404 File Not Found".to_string(),
        })
    }

    async fn fetch_repository_content(
        &self,
        repository: &Repository,
    ) -> toolhub_gitlab::Result<BTreeMap<String, String>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        files_for(&repository.url).ok_or_else(unavailable)
    }

    async fn probe_connection(&self) -> ConnectionStatus {
        ConnectionStatus {
            connected: true,
            user: Some("bot".to_string()),
            gitlab_version: Some("16.0.0".to_string()),
            error: None,
        }
    }
}

fn hub(repositories: &[&str]) -> (ToolHub, Arc<StaticSource>) {
    let mut config = AppConfig::new("https://gitlab.example.com", "secret");
    for url in repositories {
        config.gitlab.repositories.push(Repository::new(*url));
    }
    let source = Arc::new(StaticSource::default());
    let cache = Arc::new(CacheManager::new(
        Arc::new(MemoryStorage::new()),
        CacheManagerConfig::default(),
    ));
    (ToolHub::new(config, cache, source.clone()), source)
}

#[tokio::test]
async fn test_start_warms_cache_and_stop_is_idempotent() {
    let (hub, source) = hub(&["team/alpha", "team/down"]);

    let report = hub.start().await.unwrap();
    assert_eq!(report.warmed, 1);
    assert_eq!(report.failed, 1);
    assert!(hub.cache().is_running().await);
    assert_eq!(source.fetches.load(Ordering::SeqCst), 2);

    let stats = hub.get_stats().await.unwrap();
    assert_eq!(stats.item_count, 2);

    hub.stop().await.unwrap();
    hub.stop().await.unwrap();
    assert!(!hub.cache().is_running().await);
}

#[tokio::test]
async fn test_warmed_manifest_serves_tools_without_fetching() {
    let (hub, source) = hub(&["team/alpha"]);
    hub.warm_cache().await;
    let after_warm = source.fetches.load(Ordering::SeqCst);

    let tools = hub.load_all_tools().await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].resolved_name, "alpha:lint");

    let uri = resources::encode("team/alpha", "main", "rules/.cursorrules");
    assert_eq!(hub.get_resource_content(&uri).await.unwrap(), "be nice");
    assert_eq!(source.fetches.load(Ordering::SeqCst), after_warm);
}

#[tokio::test]
async fn test_loading_tools_does_not_block_warm_up() {
    let (hub, source) = hub(&["team/alpha"]);
    hub.load_all_tools().await.unwrap();
    assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

    let report = hub.warm_cache().await;
    assert_eq!(report.warmed, 1);
    assert_eq!(report.skipped, 0);

    let statuses = hub.repository_status(None).await;
    assert_eq!(statuses[0].cached_files, 2);
}

#[tokio::test]
async fn test_repository_rules_fetch_on_miss_then_hit() {
    let (hub, source) = hub(&["team/alpha"]);

    let rules = hub.get_repository_rules("team/alpha", "main").await;
    assert_eq!(rules, alpha_files());
    assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

    let again = hub.get_repository_rules("team/alpha", "main").await;
    assert_eq!(again, rules);
    assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(hub.get_stats().await.unwrap().item_count, 2);
}

#[tokio::test]
async fn test_repository_rules_served_from_warmed_cache() {
    let (hub, source) = hub(&["team/alpha"]);
    hub.warm_cache().await;
    let after_warm = source.fetches.load(Ordering::SeqCst);

    assert_eq!(
        hub.get_specific_rule("team/alpha", "main", "rules/.cursorrules").await.as_deref(),
        Some("be nice")
    );
    assert_eq!(hub.get_specific_rule("team/alpha", "main", "rules/missing.md").await, None);
    assert_eq!(source.fetches.load(Ordering::SeqCst), after_warm);
}

#[tokio::test]
async fn test_on_demand_reads_are_not_mistaken_for_synced_rules() {
    let (hub, _) = hub(&["team/alpha"]);
    let uri = resources::encode("team/alpha", "main", "rules/.cursorrules");
    hub.get_resource_content(&uri).await.unwrap();

    // nothing synced yet, so the rules come from a fresh fetch
    let rules = hub.get_repository_rules("team/alpha", "main").await;
    assert_eq!(rules.len(), 2);
}

#[tokio::test]
async fn test_repository_rules_unknown_or_failing_repository() {
    let (hub, source) = hub(&["team/alpha", "team/down"]);

    assert!(hub.get_repository_rules("team/zeta", "main").await.is_empty());
    assert!(hub.get_repository_rules("team/alpha", "develop").await.is_empty());
    assert_eq!(source.fetches.load(Ordering::SeqCst), 0);

    assert!(hub.get_repository_rules("team/down", "main").await.is_empty());
    assert_eq!(hub.get_specific_rule("team/down", "main", "tools.json").await, None);
}

#[tokio::test]
async fn test_refresh_all_repositories() {
    let (hub, _) = hub(&["team/alpha", "team/beta"]);

    let result = hub.refresh_repositories(None).await.unwrap();
    assert!(result.success);
    assert_eq!(result.repository, None);
    assert_eq!(result.updated_files, 3);
    assert_eq!(result.cached_files, 3);
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn test_refresh_isolates_failures() {
    let (hub, _) = hub(&["team/alpha", "team/down"]);

    let result = hub.refresh_repositories(None).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.updated_files, 2);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("Failed to refresh team/down@main"));
}

#[tokio::test]
async fn test_refresh_unknown_repository() {
    let (hub, source) = hub(&["team/alpha"]);

    let result = hub.refresh_repositories(Some("team/zeta")).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.repository.as_deref(), Some("team/zeta"));
    assert_eq!(result.errors, vec!["Repository team/zeta not found in configuration"]);
    assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalidate_cache() {
    let (hub, _) = hub(&["team/alpha", "team/beta"]);
    hub.refresh_repositories(None).await.unwrap();

    let one = hub.invalidate_cache(Some("team/alpha")).await.unwrap();
    assert!(one.success);
    assert_eq!(one.invalidated, Some(2));
    assert!(!one.cleared_all);

    let unknown = hub.invalidate_cache(Some("team/zeta")).await.unwrap();
    assert!(!unknown.success);
    assert_eq!(unknown.invalidated, Some(0));
    assert!(unknown.error.is_some());

    let all = hub.invalidate_cache(None).await.unwrap();
    assert!(all.success && all.cleared_all);
    assert_eq!(hub.get_stats().await.unwrap().item_count, 0);
}

#[tokio::test]
async fn test_invalidate_repository_counts_removed_files() {
    let (hub, _) = hub(&["team/alpha"]);
    hub.refresh_repositories(None).await.unwrap();

    let removed = hub.invalidate_repository(&Repository::new("team/alpha")).await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(hub.invalidate_repository(&Repository::new("team/alpha")).await.unwrap(), 0);
}

#[tokio::test]
async fn test_repository_status() {
    let (hub, _) = hub(&["team/alpha", "team/down"]);
    hub.refresh_repositories(Some("team/alpha")).await.unwrap();

    let statuses = hub.repository_status(None).await;
    assert_eq!(statuses.len(), 2);

    assert!(statuses[0].accessible);
    assert_eq!(statuses[0].cached_files, 2);
    assert!(statuses[0].error.is_none());

    assert!(!statuses[1].accessible);
    assert_eq!(statuses[1].cached_files, 0);
    assert!(statuses[1].error.as_deref().unwrap().contains("503"));

    assert_eq!(hub.repository_status(Some("team/down")).await.len(), 1);
    assert!(hub.repository_status(Some("team/zeta")).await.is_empty());
}

#[tokio::test]
async fn test_list_repositories_falls_back_to_short_name() {
    let (hub, _) = hub(&["team/alpha", "team/down"]);

    let infos = hub.list_repositories().await;
    assert_eq!(infos.len(), 2);
    assert_eq!(infos[0].name, "ALPHA");
    assert_eq!(infos[0].status, "accessible");
    assert_eq!(infos[1].name, "down");
    assert_eq!(infos[1].status, "unknown");
}

#[tokio::test]
async fn test_cache_status() {
    let (hub, _) = hub(&["team/alpha"]);
    hub.refresh_repositories(None).await.unwrap();
    hub.load_all_tools().await.unwrap();

    let status = hub.cache_status().await.unwrap();
    assert_eq!(status.backend, "memory");
    assert_eq!(status.item_count, 2);
    // manifest scope misses, synced content hits
    assert_eq!(status.hit_rate, 0.5);
    assert!(status.memory_usage_mb.unwrap() > 0.0);
    assert_eq!(status.storage_usage_mb, None);
}

#[tokio::test]
async fn test_set_conflict_strategy() {
    let (mut hub, _) = hub(&["team/alpha", "team/beta"]);

    hub.set_conflict_strategy(ConflictStrategy::Error);
    assert_eq!(hub.config().tools.conflict_strategy, ConflictStrategy::Error);
    assert!(matches!(hub.load_all_tools().await, Err(HubError::Tool(_))));

    hub.set_conflict_strategy(ConflictStrategy::Priority);
    let tools = hub.load_all_tools().await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].repository, "team/alpha");
}

#[tokio::test]
async fn test_from_config_validates() {
    let config = AppConfig::new("https://gitlab.example.com", "");
    assert!(matches!(ToolHub::from_config(config), Err(HubError::Config(_))));

    let mut config = AppConfig::new("https://gitlab.example.com", "secret");
    config.gitlab.repositories.push(Repository::new("team/alpha"));
    config.cache.backend = CacheBackend::File;
    let dir = tempfile::tempdir().unwrap();
    config.cache.storage_path = Some(dir.path().to_path_buf());

    let hub = ToolHub::from_config(config).unwrap();
    assert_eq!(hub.cache_status().await.unwrap().backend, "file");
}
