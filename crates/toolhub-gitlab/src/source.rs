//! Abstraction over where repository content comes from

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use toolhub_config::Repository;

use crate::{
    models::{ConnectionStatus, ProjectInfo},
    Result,
};

/// Read-only access to repository content
///
/// [`GitLabClient`](crate::GitLabClient) is the production implementation.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn get_project(&self, project_path: &str) -> Result<ProjectInfo>;

    /// Text of one file at `reference`
    async fn get_file_decoded(&self, project_path: &str, file_path: &str, reference: &str) -> Result<String>;

    /// All files of the repository matching its patterns, keyed by path
    async fn fetch_repository_content(&self, repository: &Repository) -> Result<BTreeMap<String, String>>;

    async fn probe_connection(&self) -> ConnectionStatus;
}

#[async_trait]
impl<T: ContentSource + ?Sized> ContentSource for Arc<T> {
    async fn get_project(&self, project_path: &str) -> Result<ProjectInfo> {
        (**self).get_project(project_path).await
    }

    async fn get_file_decoded(&self, project_path: &str, file_path: &str, reference: &str) -> Result<String> {
        (**self).get_file_decoded(project_path, file_path, reference).await
    }

    async fn fetch_repository_content(&self, repository: &Repository) -> Result<BTreeMap<String, String>> {
        (**self).fetch_repository_content(repository).await
    }

    async fn probe_connection(&self) -> ConnectionStatus {
        (**self).probe_connection().await
    }
}
