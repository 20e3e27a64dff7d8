//! TTL cache for repository content
//!
//! Values are JSON documents keyed by strings. Repository files use the
//! namespaced key `url:branch:path` (see [`RepositoryCacheKey`]) so two
//! repositories that share a path never collide. Manifests and on-demand
//! resource reads live in their own [`CacheScope`]s. Expiry is checked lazily
//! on every read and swept periodically by [`CacheManager`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use toolhub_cache::{CacheManager, CacheManagerConfig, MemoryStorage};
//! use toolhub_config::Repository;
//!
//! # async fn demo() -> toolhub_cache::Result<()> {
//! let manager = CacheManager::new(Arc::new(MemoryStorage::new()), CacheManagerConfig::default());
//! manager.start().await?;
//! manager.set_file(&Repository::new("team/rules"), "a.md", "text", None).await?;
//! manager.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod disk;
pub mod error;
pub mod key;
pub mod manager;
pub mod memory;
pub mod metrics;
pub mod storage;

pub use disk::DiskStorage;
pub use error::{CacheError, Result};
pub use key::{CacheScope, RepositoryCacheKey};
pub use manager::{CacheManager, CacheManagerConfig, RepositoryCacheStats, WarmReport};
pub use memory::MemoryStorage;
pub use metrics::{CacheMetrics, CacheStats};
pub use storage::{CacheEntry, CacheStorage, KeyPattern};
