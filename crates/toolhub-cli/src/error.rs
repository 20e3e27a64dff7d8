//! Facade error types

use thiserror::Error;
use toolhub_cache::CacheError;
use toolhub_config::ConfigError;
use toolhub_gitlab::GitLabError;
use toolhub_tools::ToolError;

/// Errors surfaced by [`ToolHub`](crate::ToolHub)
#[derive(Error, Debug)]
pub enum HubError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("GitLab error: {0}")]
    GitLab(#[from] GitLabError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Repository {0} not found in configuration")]
    RepositoryNotFound(String),
}

impl HubError {
    /// Message shown to a terminal user
    pub fn user_message(&self) -> String {
        match self {
            HubError::Config(e) => format!("{}\n\nCheck the configuration file and TOOLHUB__* variables.", e),
            HubError::RepositoryNotFound(url) => format!(
                "Repository '{}' is not configured.\n\nRun 'toolhub repos' to list configured repositories.",
                url
            ),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HubError>;
