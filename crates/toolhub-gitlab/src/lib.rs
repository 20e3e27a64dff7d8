//! GitLab content client for toolhub
//!
//! Reads projects, trees and files through the v4 REST API. Rate-limited
//! and transient network failures are retried with exponential backoff;
//! any other error status fails immediately.

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod retry;
pub mod source;

pub use client::GitLabClient;
pub use config::GitLabClientConfig;
pub use error::{GitLabError, Result};
pub use models::{BranchInfo, ConnectionStatus, EntryType, FileContent, FileInfo, ProjectInfo, TreeEntry};
pub use retry::RetryPolicy;
pub use source::ContentSource;
