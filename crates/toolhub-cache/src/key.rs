//! Namespaced cache keys for repository content

use std::fmt;

use glob::Pattern;

use crate::{CacheError, Result};

/// Namespace a repository entry is cached under
///
/// Synced content keys are bare `url:branch:path`; the other scopes prepend
/// a tag ending in `::`. Url and branch are never empty, so no content key
/// can start with a scope tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheScope {
    /// Files synced by warm-up or refresh
    Content,
    /// Tool manifests read while loading tools
    Manifest,
    /// Files read on demand through resource URIs
    Resource,
}

impl CacheScope {
    pub const ALL: [CacheScope; 3] = [CacheScope::Content, CacheScope::Manifest, CacheScope::Resource];

    fn tag(self) -> &'static str {
        match self {
            CacheScope::Content => "",
            CacheScope::Manifest => "tools::",
            CacheScope::Resource => "resource::",
        }
    }
}

/// Key of one file cached from one branch of one repository
///
/// Rendered as `url:branch:file_path`. The file path is the last segment
/// and may itself contain `:`; the url and branch may not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepositoryCacheKey {
    pub repository_url: String,
    pub branch: String,
    pub file_path: String,
}

impl RepositoryCacheKey {
    /// Build a key, rejecting an empty url or branch or one that would break parsing
    pub fn new(
        repository_url: impl Into<String>,
        branch: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Result<Self> {
        let key = Self {
            repository_url: repository_url.into(),
            branch: branch.into(),
            file_path: file_path.into(),
        };
        if key.repository_url.is_empty()
            || key.branch.is_empty()
            || key.repository_url.contains(':')
            || key.branch.contains(':')
        {
            return Err(CacheError::InvalidKey { key: key.to_key() });
        }
        Ok(key)
    }

    pub fn to_key(&self) -> String {
        format!("{}:{}:{}", self.repository_url, self.branch, self.file_path)
    }

    /// Key of this file within `scope`
    pub fn scoped_key(&self, scope: CacheScope) -> String {
        format!("{}{}", scope.tag(), self.to_key())
    }

    /// Parse `url:branch:file_path`, splitting at the first two colons only
    pub fn from_key(key: &str) -> Result<Self> {
        let mut parts = key.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(url), Some(branch), Some(file_path)) => Ok(Self {
                repository_url: url.to_string(),
                branch: branch.to_string(),
                file_path: file_path.to_string(),
            }),
            _ => Err(CacheError::InvalidKey {
                key: key.to_string(),
            }),
        }
    }

    /// Glob matching every file key of one repository branch
    pub fn repository_pattern(repository_url: &str, branch: &str) -> String {
        format!(
            "{}:{}:*",
            Pattern::escape(repository_url),
            Pattern::escape(branch)
        )
    }

    /// Glob matching every key of one repository branch within `scope`
    pub fn scope_pattern(scope: CacheScope, repository_url: &str, branch: &str) -> String {
        format!("{}{}", scope.tag(), Self::repository_pattern(repository_url, branch))
    }
}

impl fmt::Display for RepositoryCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_key())
    }
}
