use super::{CacheBackend, CacheEntry, CacheKey, CacheResult, CacheUsage};
use crate::error::CacheError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lru::LruCache;
use std::sync::{Mutex, MutexGuard};

struct MemoryState {
    entries: LruCache<CacheKey, CacheEntry>,
    total_bytes: u64,
}

/// In-process cache bounded by total audio bytes
pub struct MemoryCacheBackend {
    state: Mutex<MemoryState>,
    max_size_bytes: u64,
}

impl MemoryCacheBackend {
    pub fn new(max_size_bytes: u64) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                entries: LruCache::unbounded(),
                total_bytes: 0,
            }),
            max_size_bytes,
        }
    }

    fn lock(&self) -> CacheResult<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| CacheError::Poisoned)
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<CacheEntry>> {
        let mut state = self.lock()?;
        Ok(state.entries.get(key).cloned())
    }

    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> CacheResult<()> {
        let size = entry.size_bytes() as u64;
        if size > self.max_size_bytes {
            return Err(CacheError::EntryTooLarge {
                size,
                max: self.max_size_bytes,
            });
        }

        let mut state = self.lock()?;
        if let Some(previous) = state.entries.put(key.clone(), entry) {
            state.total_bytes -= previous.size_bytes() as u64;
        }
        state.total_bytes += size;

        // The entry just inserted is most recent and fits on its own
        while state.total_bytes > self.max_size_bytes {
            match state.entries.pop_lru() {
                Some((evicted, old)) => {
                    state.total_bytes -= old.size_bytes() as u64;
                    log::debug!("Evicted cache entry {evicted}");
                }
                None => break,
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> CacheResult<bool> {
        let mut state = self.lock()?;
        match state.entries.pop(key) {
            Some(old) => {
                state.total_bytes -= old.size_bytes() as u64;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> CacheResult<usize> {
        let mut state = self.lock()?;
        let expired: Vec<CacheKey> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            if let Some(old) = state.entries.pop(key) {
                state.total_bytes -= old.size_bytes() as u64;
            }
        }
        Ok(expired.len())
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut state = self.lock()?;
        state.entries.clear();
        state.total_bytes = 0;
        Ok(())
    }

    fn usage(&self) -> CacheUsage {
        match self.state.lock() {
            Ok(state) => CacheUsage {
                entries: state.entries.len(),
                size_bytes: state.total_bytes,
                max_size_bytes: self.max_size_bytes,
            },
            Err(_) => CacheUsage {
                max_size_bytes: self.max_size_bytes,
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use voxmux_speech::{AudioFormat, QualityTier, SynthesizedAudio};

    fn key(text: &str) -> CacheKey {
        CacheKey::compute(text, "v1", "edge", QualityTier::Medium, AudioFormat::Wav)
    }

    fn entry(size: usize, ttl: Duration) -> CacheEntry {
        CacheEntry::new(
            SynthesizedAudio::new(vec![7u8; size], 100, 22050),
            "edge",
            AudioFormat::Wav,
            Utc::now(),
            ttl,
        )
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = MemoryCacheBackend::new(1024);
        cache.put(&key("a"), entry(10, Duration::from_secs(60))).await.unwrap();

        let found = cache.get(&key("a")).await.unwrap().unwrap();
        assert_eq!(found.size_bytes(), 10);
        assert!(cache.get(&key("b")).await.unwrap().is_none());
        assert_eq!(cache.usage().size_bytes, 10);
    }

    #[tokio::test]
    async fn test_eviction_removes_least_recently_used() {
        let cache = MemoryCacheBackend::new(30);
        let ttl = Duration::from_secs(60);
        cache.put(&key("a"), entry(10, ttl)).await.unwrap();
        cache.put(&key("b"), entry(10, ttl)).await.unwrap();
        cache.put(&key("c"), entry(10, ttl)).await.unwrap();

        // Touch "a" so "b" becomes the oldest
        cache.get(&key("a")).await.unwrap();
        cache.put(&key("d"), entry(10, ttl)).await.unwrap();

        assert!(cache.get(&key("b")).await.unwrap().is_none());
        assert!(cache.get(&key("a")).await.unwrap().is_some());
        assert!(cache.get(&key("d")).await.unwrap().is_some());
        let usage = cache.usage();
        assert_eq!(usage.entries, 3);
        assert!(usage.size_bytes <= usage.max_size_bytes);
    }

    #[tokio::test]
    async fn test_replacing_a_key_adjusts_size() {
        let cache = MemoryCacheBackend::new(100);
        let ttl = Duration::from_secs(60);
        cache.put(&key("a"), entry(40, ttl)).await.unwrap();
        cache.put(&key("a"), entry(15, ttl)).await.unwrap();
        assert_eq!(cache.usage().size_bytes, 15);
        assert_eq!(cache.usage().entries, 1);
    }

    #[tokio::test]
    async fn test_oversized_entry_is_rejected() {
        let cache = MemoryCacheBackend::new(8);
        let err = cache
            .put(&key("a"), entry(9, Duration::from_secs(60)))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::EntryTooLarge { size: 9, max: 8 }));
        assert_eq!(cache.usage().entries, 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = MemoryCacheBackend::new(1024);
        cache.put(&key("old"), entry(4, Duration::ZERO)).await.unwrap();
        cache.put(&key("new"), entry(4, Duration::from_secs(60))).await.unwrap();

        let removed = cache.purge_expired(Utc::now()).await.unwrap();
        assert_eq!(removed, 1);
        assert!(cache.get(&key("old")).await.unwrap().is_none());
        assert_eq!(cache.usage().size_bytes, 4);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let cache = MemoryCacheBackend::new(1024);
        let ttl = Duration::from_secs(60);
        cache.put(&key("a"), entry(4, ttl)).await.unwrap();
        cache.put(&key("b"), entry(4, ttl)).await.unwrap();

        assert!(cache.delete(&key("a")).await.unwrap());
        assert!(!cache.delete(&key("a")).await.unwrap());
        cache.clear().await.unwrap();
        assert_eq!(cache.usage(), CacheUsage {
            entries: 0,
            size_bytes: 0,
            max_size_bytes: 1024
        });
    }
}
