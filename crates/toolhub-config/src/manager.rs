//! Configuration manager implementation

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use tracing::debug;

use crate::{
    error::{ConfigError, Result},
    types::{AppConfig, CacheBackend},
};

const DEFAULT_ENV_PREFIX: &str = "TOOLHUB";

/// Loads and validates [`AppConfig`] from a file layered under environment variables
pub struct ConfigManager {
    /// Configuration file path
    config_path: Option<PathBuf>,
    /// Environment prefix
    env_prefix: String,
}

impl ConfigManager {
    /// Create a manager that reads only from the environment
    pub fn new() -> Self {
        Self {
            config_path: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }

    /// Create with a config file path (YAML or TOML, chosen by extension)
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: Some(path.into()),
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }

    /// Override the environment prefix
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Configured file path, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Load and validate the configuration
    pub fn load(&self) -> Result<AppConfig> {
        let mut builder = Config::builder();

        if let Some(path) = &self.config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.display().to_string()));
            }
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path.clone()).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let app_config: AppConfig = builder.build()?.try_deserialize()?;
        Self::validate(&app_config)?;
        Ok(app_config)
    }

    /// Parse and validate a YAML document
    pub fn load_from_yaml_str(content: &str) -> Result<AppConfig> {
        let app_config: AppConfig = Config::builder()
            .add_source(File::from_str(content, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        Self::validate(&app_config)?;
        Ok(app_config)
    }

    /// Check values that serde alone cannot enforce
    pub fn validate(config: &AppConfig) -> Result<()> {
        let gitlab = &config.gitlab;

        if gitlab.token.trim().is_empty() {
            return Err(ConfigError::Validation("GitLab token is required".to_string()));
        }

        let instance = url::Url::parse(&gitlab.instance_url).map_err(|e| {
            ConfigError::Validation(format!(
                "Invalid instance_url '{}': {}",
                gitlab.instance_url, e
            ))
        })?;
        if !matches!(instance.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "instance_url must use http or https, got '{}'",
                instance.scheme()
            )));
        }

        if gitlab.repositories.is_empty() {
            return Err(ConfigError::Validation(
                "At least one GitLab repository must be configured".to_string(),
            ));
        }

        let mut seen = std::collections::BTreeSet::new();
        for repo in &gitlab.repositories {
            if !seen.insert((repo.url.as_str(), repo.branch.as_str())) {
                return Err(ConfigError::Validation(format!(
                    "Repository {} is configured more than once",
                    repo
                )));
            }
            if repo.url.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "Repository url must not be empty".to_string(),
                ));
            }
            if repo.branch.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Repository {} has an empty branch",
                    repo.url
                )));
            }
            // ':' separates the segments of a cache key
            if repo.url.contains(':') || repo.branch.contains(':') {
                return Err(ConfigError::Validation(format!(
                    "Repository {} must not contain ':' in its url or branch",
                    repo
                )));
            }
            if repo.file_patterns.iter().any(|p| p.trim().is_empty()) {
                return Err(ConfigError::Validation(format!(
                    "Repository {} has an empty file pattern",
                    repo.url
                )));
            }
        }

        if gitlab.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if config.cache.backend == CacheBackend::File && config.cache.storage_path.is_none() {
            return Err(ConfigError::Validation(
                "Storage path is required for file-based cache".to_string(),
            ));
        }

        if config.cache.max_size == 0 {
            return Err(ConfigError::Validation(
                "Cache max_size must be greater than 0".to_string(),
            ));
        }

        if config.cache.cleanup_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "Cache cleanup interval must be greater than 0".to_string(),
            ));
        }

        if config.tools.manifest_path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Tool manifest path must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
