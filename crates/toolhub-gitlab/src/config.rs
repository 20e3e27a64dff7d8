//! Client configuration

use std::time::Duration;

use toolhub_config::GitLabConfig;

use crate::retry::RetryPolicy;

/// Connection settings for [`GitLabClient`](crate::GitLabClient)
#[derive(Debug, Clone)]
pub struct GitLabClientConfig {
    /// Instance root, e.g. `https://gitlab.com`
    pub instance_url: String,
    /// Personal or project access token
    pub token: String,
    /// Per-request timeout
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub user_agent: String,
}

impl GitLabClientConfig {
    pub fn new(instance_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            instance_url: instance_url.into(),
            token: token.into(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            user_agent: default_user_agent(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Base of every API path
    pub fn api_url(&self) -> String {
        format!("{}/api/v4", self.instance_url.trim_end_matches('/'))
    }
}

impl From<&GitLabConfig> for GitLabClientConfig {
    fn from(config: &GitLabConfig) -> Self {
        Self::new(&config.instance_url, &config.token)
            .with_timeout(config.timeout())
            .with_retry(RetryPolicy::new(config.max_retries, config.retry_backoff()))
    }
}

fn default_user_agent() -> String {
    format!("toolhub/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url_strips_trailing_slash() {
        let config = GitLabClientConfig::new("https://gitlab.example.com/", "t");
        assert_eq!(config.api_url(), "https://gitlab.example.com/api/v4");
    }

    #[test]
    fn test_from_app_config() {
        let mut gitlab = GitLabConfig::new("https://gitlab.example.com", "secret");
        gitlab.max_retries = 5;
        gitlab.retry_backoff_ms = 250;
        gitlab.timeout_secs = 12;

        let config = GitLabClientConfig::from(&gitlab);
        assert_eq!(config.timeout, Duration::from_secs(12));
        assert_eq!(config.retry, RetryPolicy::new(5, Duration::from_millis(250)));
        assert!(config.user_agent.starts_with("toolhub/"));
    }
}
