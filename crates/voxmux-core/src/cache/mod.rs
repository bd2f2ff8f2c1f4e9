//! Content-addressed storage of synthesized audio

use crate::error::CacheError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod entry;
mod file;
mod key;
mod memory;
mod store;

pub use entry::CacheEntry;
pub use file::FileCacheBackend;
pub use key::{AUTO_BACKEND, CacheKey};
pub use memory::MemoryCacheBackend;
pub use store::{CacheStats, CacheStore};

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Current occupancy of a cache backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheUsage {
    pub entries: usize,
    pub size_bytes: u64,
    pub max_size_bytes: u64,
}

/// Storage behind a [`CacheStore`]
///
/// Implementations keep total stored bytes at or under their bound by evicting
/// least-recently-used entries inside `put`. Expiry is carried by the entry
/// itself; `get` returns whatever is stored and the store decides freshness.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Look up `key`, marking it most recently used
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<CacheEntry>>;

    /// Store `entry` under `key`, replacing any previous entry atomically
    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> CacheResult<()>;

    /// Remove `key`, returning whether it was present
    async fn delete(&self, key: &CacheKey) -> CacheResult<bool>;

    /// Remove every entry expired at `now`, returning how many were removed
    async fn purge_expired(&self, now: DateTime<Utc>) -> CacheResult<usize>;

    async fn clear(&self) -> CacheResult<()>;

    fn usage(&self) -> CacheUsage;
}
