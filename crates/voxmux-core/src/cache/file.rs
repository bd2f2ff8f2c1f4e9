use super::{CacheBackend, CacheEntry, CacheKey, CacheResult, CacheUsage};
use crate::error::CacheError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lru::LruCache;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

const ENTRY_EXTENSION: &str = "cache";

struct FileIndex {
    sizes: LruCache<CacheKey, u64>,
    total_bytes: u64,
}

impl FileIndex {
    fn insert(&mut self, key: CacheKey, size: u64) {
        if let Some(previous) = self.sizes.put(key, size) {
            self.total_bytes -= previous;
        }
        self.total_bytes += size;
    }

    fn remove(&mut self, key: &CacheKey) -> bool {
        match self.sizes.pop(key) {
            Some(size) => {
                self.total_bytes -= size;
                true
            }
            None => false,
        }
    }

    /// Pop least-recently-used keys until the total fits in `max`
    fn evict_to(&mut self, max: u64) -> Vec<CacheKey> {
        let mut evicted = Vec::new();
        while self.total_bytes > max {
            match self.sizes.pop_lru() {
                Some((key, size)) => {
                    self.total_bytes -= size;
                    evicted.push(key);
                }
                None => break,
            }
        }
        evicted
    }
}

/// Directory-backed cache, one JSON document per key
///
/// Files are named `<key>.cache`. Writes go to a temporary file in the same
/// directory and are renamed into place, so readers never see a partial entry.
/// Recency is tracked in memory and seeded from modification times on open.
pub struct FileCacheBackend {
    directory: PathBuf,
    max_size_bytes: u64,
    index: Mutex<FileIndex>,
}

impl FileCacheBackend {
    /// Open (creating if needed) a cache rooted at `directory`
    pub async fn open(directory: impl AsRef<Path>, max_size_bytes: u64) -> CacheResult<Self> {
        let directory = directory.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&directory).await?;

        let mut found: Vec<(SystemTime, CacheKey, u64)> = Vec::new();
        let mut entries = tokio::fs::read_dir(&directory).await?;
        while let Some(dir_entry) = entries.next_entry().await? {
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(CacheKey::parse)
            else {
                continue;
            };
            let meta = dir_entry.metadata().await?;
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((modified, key, meta.len()));
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));

        let mut index = FileIndex {
            sizes: LruCache::unbounded(),
            total_bytes: 0,
        };
        for (_, key, size) in found {
            index.insert(key, size);
        }
        let evicted = index.evict_to(max_size_bytes);
        log::debug!(
            "Opened file cache at {} with {} entries ({} bytes)",
            directory.display(),
            index.sizes.len(),
            index.total_bytes
        );

        let backend = Self {
            directory,
            max_size_bytes,
            index: Mutex::new(index),
        };
        backend.remove_files(&evicted).await;
        Ok(backend)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.directory
            .join(format!("{}.{}", key.as_str(), ENTRY_EXTENSION))
    }

    fn lock(&self) -> CacheResult<MutexGuard<'_, FileIndex>> {
        self.index.lock().map_err(|_| CacheError::Poisoned)
    }

    async fn remove_files(&self, keys: &[CacheKey]) {
        for key in keys {
            match tokio::fs::remove_file(self.path_for(key)).await {
                Ok(()) => log::debug!("Evicted cache file for {key}"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to remove cache file for {key}: {e}"),
            }
        }
    }

    /// Read and decode the file for `key`, with its size on disk
    async fn read_entry(&self, key: &CacheKey) -> CacheResult<Option<(CacheEntry, u64)>> {
        let bytes = match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry = serde_json::from_slice(&bytes)?;
        Ok(Some((entry, bytes.len() as u64)))
    }
}

#[async_trait]
impl CacheBackend for FileCacheBackend {
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<CacheEntry>> {
        let found = self.read_entry(key).await?;
        let mut index = self.lock()?;
        match found {
            Some((entry, size)) => {
                // Promote, or adopt a file written by another process
                if index.sizes.get(key).is_none() {
                    index.insert(key.clone(), size);
                }
                Ok(Some(entry))
            }
            None => {
                index.remove(key);
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> CacheResult<()> {
        let encoded = serde_json::to_vec(&entry)?;
        let size = encoded.len() as u64;
        if size > self.max_size_bytes {
            return Err(CacheError::EntryTooLarge {
                size,
                max: self.max_size_bytes,
            });
        }

        let tmp = self
            .directory
            .join(format!(".{}.{}.tmp", key.as_str(), uuid::Uuid::new_v4()));
        if let Err(e) = tokio::fs::write(&tmp, &encoded).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, self.path_for(key)).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        let evicted = {
            let mut index = self.lock()?;
            index.insert(key.clone(), size);
            index.evict_to(self.max_size_bytes)
        };
        self.remove_files(&evicted).await;
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> CacheResult<bool> {
        let indexed = self.lock()?.remove(key);
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(indexed),
            Err(e) => Err(e.into()),
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> CacheResult<usize> {
        let keys: Vec<CacheKey> = {
            let index = self.lock()?;
            index.sizes.iter().map(|(key, _)| key.clone()).collect()
        };

        let mut removed = 0;
        for key in keys {
            let stale = match self.read_entry(&key).await {
                Ok(Some((entry, _))) => entry.is_expired_at(now),
                Ok(None) => {
                    self.lock()?.remove(&key);
                    false
                }
                Err(CacheError::Corrupt(reason)) => {
                    log::warn!("Dropping corrupt cache file for {key}: {reason}");
                    true
                }
                Err(e) => return Err(e),
            };
            if stale && self.delete(&key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn clear(&self) -> CacheResult<()> {
        let keys: Vec<CacheKey> = {
            let mut index = self.lock()?;
            let keys = index.sizes.iter().map(|(key, _)| key.clone()).collect();
            index.sizes.clear();
            index.total_bytes = 0;
            keys
        };
        for key in keys {
            match tokio::fs::remove_file(self.path_for(&key)).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn usage(&self) -> CacheUsage {
        match self.index.lock() {
            Ok(index) => CacheUsage {
                entries: index.sizes.len(),
                size_bytes: index.total_bytes,
                max_size_bytes: self.max_size_bytes,
            },
            Err(_) => CacheUsage {
                max_size_bytes: self.max_size_bytes,
                ..Default::default()
            },
        }
    }
}
