//! Toolhub configuration
//!
//! Typed configuration for the content-sync pipeline: repository descriptors,
//! remote API settings, cache backend selection and conflict strategy. Values are
//! loaded from an optional YAML/TOML file layered under `TOOLHUB__*` environment
//! variables and validated once here, so downstream crates receive checked values.

pub mod error;
pub mod manager;
pub mod types;

pub use error::{ConfigError, Result};
pub use manager::ConfigManager;
pub use types::{
    AppConfig, CacheBackend, CacheConfig, ConflictStrategy, GitLabConfig, LoggingConfig,
    Repository, ServerConfig, ToolsConfig,
};
