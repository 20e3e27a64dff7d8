//! Tool layer errors

use thiserror::Error;
use toolhub_cache::CacheError;
use toolhub_gitlab::GitLabError;

/// Result type for tool operations
pub type Result<T> = std::result::Result<T, ToolError>;

#[derive(Debug, Error)]
pub enum ToolError {
    /// A tool manifest is malformed or violates its constraints
    #[error("Invalid tool specification in {repository}: {message}")]
    Specification { repository: String, message: String },

    /// The requested file is not exposed by any configured tool
    #[error("Resource access denied: {0}")]
    ResourceAccess(String),

    #[error("Invalid resource URI: {0}")]
    UriFormat(String),

    /// Two repositories define the same tool under the `error` strategy
    #[error("Tool '{name}' is defined in multiple repositories: {}", repositories.join(", "))]
    Conflict { name: String, repositories: Vec<String> },

    #[error(transparent)]
    GitLab(#[from] GitLabError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl ToolError {
    pub(crate) fn specification(repository: impl Into<String>, message: impl Into<String>) -> Self {
        ToolError::Specification {
            repository: repository.into(),
            message: message.into(),
        }
    }
}
