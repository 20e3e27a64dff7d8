//! GitLab API response models
//!
//! Only the fields toolhub reads are modelled; everything else in the
//! responses is ignored.

use serde::{Deserialize, Serialize};

/// `GET /projects/:id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub path: String,
    pub path_with_namespace: String,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub last_activity_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRef {
    pub id: String,
    #[serde(default)]
    pub short_id: Option<String>,
    #[serde(default)]
    pub committed_date: Option<String>,
}

/// `GET /projects/:id/repository/branches`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchInfo {
    pub name: String,
    #[serde(default)]
    pub commit: Option<CommitRef>,
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub default: bool,
}

/// Kind of a tree entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Blob,
    Tree,
    Commit,
}

/// `GET /projects/:id/repository/tree`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub path: String,
    #[serde(default)]
    pub mode: String,
}

impl TreeEntry {
    pub fn is_blob(&self) -> bool {
        self.entry_type == EntryType::Blob
    }
}

/// `GET /projects/:id/repository/files/:path`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileContent {
    pub file_name: String,
    pub file_path: String,
    #[serde(default)]
    pub size: u64,
    pub encoding: String,
    pub content: String,
    #[serde(default)]
    pub content_sha256: Option<String>,
    #[serde(rename = "ref", default)]
    pub reference: String,
    #[serde(default)]
    pub blob_id: Option<String>,
    #[serde(default)]
    pub last_commit_id: Option<String>,
}

/// A blob found by pattern discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: String,
    pub name: String,
    pub path: String,
    pub mode: String,
}

impl From<TreeEntry> for FileInfo {
    fn from(entry: TreeEntry) -> Self {
        Self {
            id: entry.id,
            name: entry.name,
            path: entry.path,
            mode: entry.mode,
        }
    }
}

/// Result of probing the API with the configured token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub gitlab_version: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Error body GitLab returns with 4xx/5xx statuses
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub message: serde_json::Value,
}

impl ApiErrorBody {
    /// `message` is usually a string but validation errors send an object
    pub fn message_text(&self) -> String {
        match &self.message {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
