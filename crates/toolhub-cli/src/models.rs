//! Results returned by the facade handlers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of refreshing one or all repositories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshResult {
    pub success: bool,
    /// Requested repository url, `None` when all were refreshed
    pub repository: Option<String>,
    pub updated_files: usize,
    pub cached_files: usize,
    pub errors: Vec<String>,
}

/// Outcome of a cache invalidation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidationResult {
    pub success: bool,
    pub repository: Option<String>,
    /// Entries removed; unknown when the whole cache was cleared
    pub invalidated: Option<usize>,
    pub cleared_all: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reachability and cached content of one repository branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryStatus {
    pub repository: String,
    pub branch: String,
    pub accessible: bool,
    pub cached_files: usize,
    pub last_check: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub url: String,
    pub branch: String,
    /// Project name from the remote, else the last url segment
    pub name: String,
    pub cached_files: usize,
    /// `accessible` or `unknown`
    pub status: String,
}

/// Cache summary for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStatus {
    pub backend: String,
    pub item_count: usize,
    pub hit_rate: f64,
    pub memory_usage_mb: Option<f64>,
    pub storage_usage_mb: Option<f64>,
}

pub(crate) fn bytes_to_mb(bytes: Option<u64>) -> Option<f64> {
    bytes.filter(|b| *b > 0).map(|b| b as f64 / 1024.0 / 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_mb() {
        assert_eq!(bytes_to_mb(None), None);
        assert_eq!(bytes_to_mb(Some(0)), None);
        assert_eq!(bytes_to_mb(Some(2 * 1024 * 1024)), Some(2.0));
    }
}
