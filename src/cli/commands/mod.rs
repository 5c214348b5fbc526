//! CLI command implementations

pub mod clear;
pub mod config;
pub mod list;
pub mod remove;
pub mod resolve;

pub use clear::execute as clear;
pub use config::execute as config;
pub use list::execute as list;
pub use remove::execute as remove;
pub use resolve::execute as resolve;

use crate::cache::CacheStore;
use crate::config::{Config, ConfigManager};
use crate::error::CacheResult;
use tracing::debug;

/// Open the file cache configured in `config`
pub(crate) async fn open_store(config: &Config) -> CacheResult<CacheStore> {
    let dir = ConfigManager::cache_dir(config);
    debug!("Using file cache at {}", dir.display());
    CacheStore::open(&dir, config.cache.capacity).await
}
