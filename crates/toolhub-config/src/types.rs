//! Core configuration types and data structures

use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Server identity
    #[serde(default)]
    pub server: ServerConfig,
    /// Remote content API configuration
    pub gitlab: GitLabConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Tool specification handling
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Create a configuration for the given instance and token with defaults elsewhere
    pub fn new(instance_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            server: ServerConfig::default(),
            gitlab: GitLabConfig::new(instance_url, token),
            cache: CacheConfig::default(),
            tools: ToolsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Find a configured repository by url and branch
    pub fn find_repository(&self, url: &str, branch: &str) -> Option<&Repository> {
        self.gitlab
            .repositories
            .iter()
            .find(|repo| repo.url == url && repo.branch == branch)
    }

    /// All configured repositories with the given url, in configured order
    pub fn repositories_by_url<'a>(&'a self, url: &'a str) -> impl Iterator<Item = &'a Repository> {
        self.gitlab.repositories.iter().filter(move |repo| repo.url == url)
    }
}

/// Server identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Name reported to clients
    #[serde(default = "default_server_name")]
    pub name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
        }
    }
}

/// One content source: a repository and the branch to read from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Repository {
    /// Project path, e.g. `group/project`. Stable join key across caching, fetching and resolution.
    pub url: String,
    /// Branch to read
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Glob patterns selecting the rule files to synchronize
    #[serde(default = "default_file_patterns")]
    pub file_patterns: Vec<String>,
}

impl Repository {
    /// Create a repository descriptor on the default branch with default patterns
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            branch: default_branch(),
            file_patterns: default_file_patterns(),
        }
    }

    /// Set the branch
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// Replace the file patterns
    pub fn with_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.file_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Last path segment of the url, used as a display name
    pub fn short_name(&self) -> &str {
        self.url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.url)
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.url, self.branch)
    }
}

/// Remote content API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GitLabConfig {
    /// Base url of the instance, e.g. `https://gitlab.example.com`
    pub instance_url: String,
    /// API token sent with every request
    pub token: String,
    /// Repositories to synchronize, in priority order
    #[serde(default)]
    pub repositories: Vec<Repository>,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries for rate-limited or transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff unit in milliseconds; attempt `n` waits `unit * 2^n`
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl GitLabConfig {
    /// Create a configuration with default timeouts and no repositories
    pub fn new(instance_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            instance_url: instance_url.into(),
            token: token.into(),
            repositories: Vec::new(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }

    /// Add a repository
    pub fn with_repository(mut self, repository: Repository) -> Self {
        self.repositories.push(repository);
        self
    }

    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Backoff unit
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Cache backend selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Process-local map
    #[default]
    Memory,
    /// One file per entry under `storage_path`
    File,
}

impl fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheBackend::Memory => write!(f, "memory"),
            CacheBackend::File => write!(f, "file"),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Backend to use
    #[serde(default)]
    pub backend: CacheBackend,
    /// Default TTL in seconds
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    /// Maximum number of entries
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Directory for the file backend
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
    /// Interval between background sweeps of expired entries
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            ttl_seconds: default_ttl_seconds(),
            max_size: default_max_size(),
            storage_path: None,
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl CacheConfig {
    /// Default TTL
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Sweep interval
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// How tool name collisions across repositories are handled
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    /// Rewrite every name to `{repository}:{name}`
    #[default]
    Prefix,
    /// First repository in configured order wins
    Priority,
    /// Abort on any collision
    Error,
    /// Unify colliding tools and union their resources
    Merge,
}

impl ConflictStrategy {
    /// Name used in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::Prefix => "prefix",
            ConflictStrategy::Priority => "priority",
            ConflictStrategy::Error => "error",
            ConflictStrategy::Merge => "merge",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prefix" => Ok(ConflictStrategy::Prefix),
            "priority" => Ok(ConflictStrategy::Priority),
            "error" => Ok(ConflictStrategy::Error),
            "merge" => Ok(ConflictStrategy::Merge),
            other => Err(ConfigError::Validation(format!(
                "Unknown conflict strategy '{}', expected one of prefix, priority, error, merge",
                other
            ))),
        }
    }
}

/// Tool specification handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    /// Strategy applied when the same tool name appears in several repositories
    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,
    /// Path of the tool manifest inside each repository
    #[serde(default = "default_manifest_path")]
    pub manifest_path: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            conflict_strategy: ConflictStrategy::default(),
            manifest_path: default_manifest_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `toolhub_cache=debug`
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value functions for serde
fn default_server_name() -> String {
    "toolhub".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_file_patterns() -> Vec<String> {
    vec![
        "**/*.cursorrules".to_string(),
        "**/*.copilot-instructions.md".to_string(),
        "**/.cursorrules".to_string(),
        "**/.copilot".to_string(),
    ]
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_ttl_seconds() -> u64 {
    3600
}

fn default_max_size() -> usize {
    1000
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

fn default_manifest_path() -> String {
    "tools.json".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
