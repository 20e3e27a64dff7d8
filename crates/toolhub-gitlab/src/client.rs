//! GitLab REST client

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::Engine;
use glob::{MatchOptions, Pattern};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Response, StatusCode,
};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, Span};

use toolhub_config::{GitLabConfig, Repository};

use crate::{
    config::GitLabClientConfig,
    error::{GitLabError, Result},
    models::{ApiErrorBody, BranchInfo, ConnectionStatus, FileContent, FileInfo, ProjectInfo, TreeEntry},
    source::ContentSource,
};

const PER_PAGE: &str = "100";
const NEXT_PAGE_HEADER: &str = "x-next-page";
const VERSION_HEADER: &str = "x-gitlab-version";

/// Matching follows shell conventions where `*` may cross `/`
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Client for the subset of the GitLab v4 API toolhub reads
pub struct GitLabClient {
    http: reqwest::Client,
    config: GitLabClientConfig,
    api_url: String,
    span: Span,
}

impl GitLabClient {
    pub fn new(config: GitLabClientConfig) -> Result<Self> {
        url::Url::parse(&config.instance_url)
            .map_err(|e| GitLabError::InvalidUrl(format!("{}: {}", config.instance_url, e)))?;

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|e| GitLabError::Build(format!("invalid token: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .build()
            .map_err(|e| GitLabError::Build(e.to_string()))?;

        Ok(Self {
            http,
            api_url: config.api_url(),
            config,
            span: Span::none(),
        })
    }

    pub fn from_config(config: &GitLabConfig) -> Result<Self> {
        Self::new(GitLabClientConfig::from(config))
    }

    /// Emit this client's log events inside `span`
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &GitLabClientConfig {
        &self.config
    }

    fn project_endpoint(project_path: &str) -> String {
        format!("projects/{}", urlencoding::encode(project_path))
    }

    /// GET with retries, returning the successful response
    async fn get(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Response> {
        let url = format!("{}/{}", self.api_url, endpoint.trim_start_matches('/'));
        self.config
            .retry
            .execute(|| self.send_once(&url, query))
            .await
    }

    async fn send_once(&self, url: &str, query: &[(&str, &str)]) -> Result<Response> {
        debug!(parent: &self.span, url, "GitLab API request");

        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| GitLabError::from_reqwest(e, self.config.timeout))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GitLabError::RateLimited);
        }
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.message_text())
                .unwrap_or_else(|_| format!("HTTP {}: {}", status.as_u16(), body));
            return Err(GitLabError::Http {
                status: status.as_u16(),
                message,
            });
        }

        debug!(parent: &self.span, status = status.as_u16(), "GitLab API request successful");
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = self.get(endpoint, query).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| GitLabError::Decode(e.to_string()))
    }

    /// Project metadata for `group/project`
    pub async fn get_project(&self, project_path: &str) -> Result<ProjectInfo> {
        self.get_json(&Self::project_endpoint(project_path), &[]).await
    }

    pub async fn get_branches(&self, project_path: &str) -> Result<Vec<BranchInfo>> {
        let endpoint = format!("{}/repository/branches", Self::project_endpoint(project_path));
        self.get_json(&endpoint, &[("per_page", PER_PAGE)]).await
    }

    /// Directory listing, following pagination until the last page
    pub async fn get_tree(
        &self,
        project_path: &str,
        reference: &str,
        path: &str,
        recursive: bool,
    ) -> Result<Vec<TreeEntry>> {
        let endpoint = format!("{}/repository/tree", Self::project_endpoint(project_path));
        let mut entries = Vec::new();
        let mut page = String::from("1");

        loop {
            let mut query = vec![("ref", reference), ("per_page", PER_PAGE), ("page", page.as_str())];
            if !path.is_empty() {
                query.push(("path", path));
            }
            if recursive {
                query.push(("recursive", "true"));
            }

            let response = self.get(&endpoint, &query).await?;
            let next_page = response
                .headers()
                .get(NEXT_PAGE_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string);

            let batch: Vec<TreeEntry> = response
                .json()
                .await
                .map_err(|e| GitLabError::Decode(e.to_string()))?;
            entries.extend(batch);

            match next_page {
                Some(next) => page = next,
                None => break,
            }
        }

        Ok(entries)
    }

    /// Raw file record as returned by the files API
    pub async fn get_file(&self, project_path: &str, file_path: &str, reference: &str) -> Result<FileContent> {
        let endpoint = format!(
            "{}/repository/files/{}",
            Self::project_endpoint(project_path),
            urlencoding::encode(file_path)
        );
        self.get_json(&endpoint, &[("ref", reference)]).await
    }

    /// File text; base64 payloads are decoded as UTF-8
    pub async fn get_file_decoded(&self, project_path: &str, file_path: &str, reference: &str) -> Result<String> {
        let file = self.get_file(project_path, file_path, reference).await?;
        decode_content(file)
    }

    /// Blobs whose path matches any of `patterns`, each reported once
    pub async fn find_files_by_pattern(
        &self,
        project_path: &str,
        patterns: &[String],
        reference: &str,
    ) -> Result<Vec<FileInfo>> {
        let compiled = compile_patterns(patterns)?;
        let tree = self.get_tree(project_path, reference, "", true).await?;
        let files = filter_blobs(tree, &compiled);

        info!(
            parent: &self.span,
            project = project_path,
            patterns = ?patterns,
            count = files.len(),
            "Found matching files"
        );
        Ok(files)
    }

    /// Fetch every matching file of a repository
    ///
    /// A file that fails to download is logged and left out; a failing
    /// discovery fails the whole call.
    pub async fn fetch_repository_content(&self, repository: &Repository) -> Result<BTreeMap<String, String>> {
        info!(
            parent: &self.span,
            repository = %repository.url,
            branch = %repository.branch,
            "Fetching repository content"
        );

        let files = self
            .find_files_by_pattern(&repository.url, &repository.file_patterns, &repository.branch)
            .await
            .map_err(|e| {
                error!(parent: &self.span, repository = %repository.url, error = %e, "File discovery failed");
                e
            })?;

        let mut content = BTreeMap::new();
        for file in files {
            match self
                .get_file_decoded(&repository.url, &file.path, &repository.branch)
                .await
            {
                Ok(text) => {
                    debug!(parent: &self.span, file = %file.path, size = text.len(), "Fetched file");
                    content.insert(file.path, text);
                }
                Err(e) => {
                    error!(parent: &self.span, file = %file.path, error = %e, "Failed to fetch file");
                }
            }
        }

        info!(
            parent: &self.span,
            repository = %repository.url,
            count = content.len(),
            "Fetched repository content"
        );
        Ok(content)
    }

    /// Check the token against `/user`; failures are reported, not raised
    pub async fn probe_connection(&self) -> ConnectionStatus {
        let response = match self.get("user", &[]).await {
            Ok(response) => response,
            Err(e) => {
                return ConnectionStatus {
                    connected: false,
                    user: None,
                    gitlab_version: None,
                    error: Some(e.to_string()),
                }
            }
        };

        let gitlab_version = response
            .headers()
            .get(VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let user = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|body| body.get("username").and_then(|u| u.as_str()).map(str::to_string));

        ConnectionStatus {
            connected: true,
            user,
            gitlab_version,
            error: None,
        }
    }
}

#[async_trait]
impl ContentSource for GitLabClient {
    async fn get_project(&self, project_path: &str) -> Result<ProjectInfo> {
        GitLabClient::get_project(self, project_path).await
    }

    async fn get_file_decoded(&self, project_path: &str, file_path: &str, reference: &str) -> Result<String> {
        GitLabClient::get_file_decoded(self, project_path, file_path, reference).await
    }

    async fn fetch_repository_content(&self, repository: &Repository) -> Result<BTreeMap<String, String>> {
        GitLabClient::fetch_repository_content(self, repository).await
    }

    async fn probe_connection(&self) -> ConnectionStatus {
        GitLabClient::probe_connection(self).await
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| GitLabError::InvalidPattern {
                pattern: p.clone(),
                message: e.to_string(),
            })
        })
        .collect()
}

/// Keep blobs matching at least one pattern, in tree order
fn filter_blobs(tree: Vec<TreeEntry>, patterns: &[Pattern]) -> Vec<FileInfo> {
    tree.into_iter()
        .filter(|entry| entry.is_blob())
        .filter(|entry| patterns.iter().any(|p| p.matches_with(&entry.path, MATCH_OPTIONS)))
        .map(FileInfo::from)
        .collect()
}

fn decode_content(file: FileContent) -> Result<String> {
    if file.encoding != "base64" {
        return Ok(file.content);
    }

    let compact: String = file.content.split_whitespace().collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| GitLabError::Decode(format!("{}: {}", file.file_path, e)))?;
    String::from_utf8(bytes).map_err(|e| GitLabError::Decode(format!("{}: {}", file.file_path, e)))
}
