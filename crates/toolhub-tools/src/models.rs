//! Tool specification models
//!
//! A repository publishes its tools in a JSON manifest (`tools.json`):
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "tools": [
//!     {
//!       "name": "lint-rules",
//!       "description": "Project lint conventions",
//!       "inputSchema": { "language": { "type": "string", "required": true } },
//!       "resources": ["rules/lint.md"]
//!     }
//!   ]
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use toolhub_config::ConflictStrategy;

use crate::{error::ToolError, Result};

/// One argument of a tool's input schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInput {
    #[serde(rename = "type")]
    pub input_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// A tool as declared in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema", default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<BTreeMap<String, ToolInput>>,
    /// Repository files this tool exposes
    #[serde(default)]
    pub resources: Vec<String>,
}

/// Parsed manifest of one repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsSpecification {
    pub tools: Vec<McpTool>,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl ToolsSpecification {
    /// Parse and validate a manifest read from `repository`
    pub fn parse(text: &str, repository: &str) -> Result<Self> {
        let spec: Self = serde_json::from_str(text)
            .map_err(|e| ToolError::specification(repository, e.to_string()))?;
        spec.validate(repository)?;
        Ok(spec)
    }

    /// Tool names are non-empty and unique; resource paths are non-empty
    pub fn validate(&self, repository: &str) -> Result<()> {
        let mut seen = BTreeSet::new();
        for tool in &self.tools {
            if tool.name.trim().is_empty() {
                return Err(ToolError::specification(repository, "tool name must not be empty"));
            }
            if !seen.insert(tool.name.as_str()) {
                return Err(ToolError::specification(
                    repository,
                    format!("duplicate tool name '{}'", tool.name),
                ));
            }
            if tool.resources.iter().any(|r| r.trim().is_empty()) {
                return Err(ToolError::specification(
                    repository,
                    format!("tool '{}' lists an empty resource path", tool.name),
                ));
            }
        }
        Ok(())
    }

    /// First tool listing `path` among its resources
    pub fn tool_for_resource(&self, path: &str) -> Option<&McpTool> {
        self.tools.iter().find(|t| t.resources.iter().any(|r| r == path))
    }
}

/// A tool after conflict resolution, ready to be exposed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTool {
    pub original_name: String,
    /// Unique across one resolution pass
    pub resolved_name: String,
    pub repository: String,
    pub branch: String,
    pub specification: McpTool,
    pub resource_uris: Vec<String>,
}

/// Record of one tool name claimed by several repositories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConflict {
    pub name: String,
    pub repositories: Vec<String>,
    pub strategy_applied: ConflictStrategy,
    pub resolution: String,
}
