//! Tool specifications for toolhub
//!
//! Each repository may publish a manifest describing the tools it offers
//! and the files they expose. This crate parses those manifests, resolves
//! tool names that collide across repositories and maps `toolhub://`
//! resource URIs onto cached repository files.

pub mod error;
pub mod manager;
pub mod models;
pub mod resolver;
pub mod resources;

pub use error::{Result, ToolError};
pub use manager::ToolManager;
pub use models::{McpTool, ResolvedTool, ToolConflict, ToolInput, ToolsSpecification};
pub use resolver::{Resolution, ToolResolver};
pub use resources::ResourceUri;
