//! `toolhub://` resource URIs
//!
//! A resource URI names one file of one repository branch:
//! `toolhub://<repository>/<branch>/<path>`. Repository and branch are
//! percent-encoded so that `group/project` or `feature/x` stay a single
//! segment. The path keeps its slashes and each of its segments is
//! percent-encoded, so every URI is plain ASCII.

use std::fmt;

use crate::{error::ToolError, Result};

pub const SCHEME: &str = "toolhub";
const PREFIX: &str = "toolhub://";

/// Decoded form of a resource URI
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceUri {
    pub repository: String,
    pub branch: String,
    pub path: String,
}

impl ResourceUri {
    pub fn new(repository: impl Into<String>, branch: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            branch: branch.into(),
            path: path.into(),
        }
    }

    pub fn parse(uri: &str) -> Result<Self> {
        decode(uri)
    }
}

impl fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(&self.repository, &self.branch, &self.path))
    }
}

/// Build a URI; surrounding `/` are trimmed from every component
pub fn encode(repository: &str, branch: &str, path: &str) -> String {
    let path: Vec<_> = path
        .trim_matches('/')
        .split('/')
        .map(urlencoding::encode)
        .collect();
    format!(
        "{}{}/{}/{}",
        PREFIX,
        urlencoding::encode(repository.trim_matches('/')),
        urlencoding::encode(branch.trim_matches('/')),
        path.join("/")
    )
}

/// Split a URI back into repository, branch and path
pub fn decode(uri: &str) -> Result<ResourceUri> {
    let rest = uri
        .strip_prefix(PREFIX)
        .ok_or_else(|| ToolError::UriFormat(format!("expected scheme '{}': {}", SCHEME, uri)))?;

    let mut parts = rest.splitn(3, '/');
    let repository = parts.next().unwrap_or_default();
    if repository.is_empty() {
        return Err(ToolError::UriFormat(format!("missing repository: {}", uri)));
    }

    let (branch, path) = match (parts.next(), parts.next()) {
        (Some(branch), Some(path)) => (branch, path),
        _ => {
            return Err(ToolError::UriFormat(format!(
                "URI must include branch and file path: {}",
                uri
            )))
        }
    };
    if branch.is_empty() {
        return Err(ToolError::UriFormat(format!("missing branch: {}", uri)));
    }
    if path.is_empty() {
        return Err(ToolError::UriFormat(format!("missing file path: {}", uri)));
    }

    let path = path
        .split('/')
        .map(|segment| percent_decode(segment, uri))
        .collect::<Result<Vec<_>>>()?
        .join("/");

    Ok(ResourceUri {
        repository: percent_decode(repository, uri)?,
        branch: percent_decode(branch, uri)?,
        path,
    })
}

fn percent_decode(segment: &str, uri: &str) -> Result<String> {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .map_err(|e| ToolError::UriFormat(format!("{}: {}", uri, e)))
}

/// Whether `uri` uses the toolhub scheme, well-formed or not
pub fn is_resource_uri(uri: &str) -> bool {
    uri.starts_with(PREFIX)
}

/// Whether `uri` decodes successfully
pub fn validate(uri: &str) -> bool {
    decode(uri).is_ok()
}
