//! GitLab client error types

use std::time::Duration;

use thiserror::Error;

/// Result type for GitLab operations
pub type Result<T> = std::result::Result<T, GitLabError>;

/// Errors raised while talking to a GitLab instance
#[derive(Debug, Clone, Error)]
pub enum GitLabError {
    /// Connection failed or was reset
    #[error("Network error: {0}")]
    Network(String),

    /// Request did not complete in time
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Server answered 429
    #[error("Rate limited by GitLab")]
    RateLimited,

    /// Non-retryable error status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Retryable failures persisted past the retry budget
    #[error("Max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid file pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Failed to build HTTP client: {0}")]
    Build(String),
}

impl GitLabError {
    /// Whether the request may succeed if sent again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GitLabError::Network(_) | GitLabError::Timeout(_) | GitLabError::RateLimited
        )
    }

    /// Whether the server reported the resource as missing
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// HTTP status of a permanent error
    pub fn status(&self) -> Option<u16> {
        match self {
            GitLabError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify a transport failure
    pub(crate) fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            GitLabError::Timeout(timeout)
        } else if error.is_decode() || error.is_body() {
            GitLabError::Decode(error.to_string())
        } else if error.is_builder() {
            GitLabError::InvalidUrl(error.to_string())
        } else {
            GitLabError::Network(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(GitLabError::Network("reset".into()).is_retryable());
        assert!(GitLabError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(GitLabError::RateLimited.is_retryable());
        assert!(!GitLabError::Http {
            status: 500,
            message: "boom".into()
        }
        .is_retryable());
        assert!(!GitLabError::MaxRetriesExceeded {
            attempts: 4,
            last_error: "x".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_not_found() {
        let err = GitLabError::Http {
            status: 404,
            message: "404 File Not Found".into(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.status(), Some(404));
        assert!(!GitLabError::RateLimited.is_not_found());
    }

    #[test]
    fn test_display() {
        let err = GitLabError::MaxRetriesExceeded {
            attempts: 4,
            last_error: "Rate limited by GitLab".into(),
        };
        assert_eq!(
            err.to_string(),
            "Max retries exceeded after 4 attempts: Rate limited by GitLab"
        );
    }
}
