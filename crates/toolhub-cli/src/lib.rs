// toolhub facade and command-line support

pub mod error;
pub mod hub;
pub mod logging;
pub mod models;

pub use error::{HubError, Result};
pub use hub::ToolHub;
pub use models::{CacheStatus, InvalidationResult, RefreshResult, RepositoryInfo, RepositoryStatus};
