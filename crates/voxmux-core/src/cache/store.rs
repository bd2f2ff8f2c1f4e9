use super::{CacheBackend, CacheEntry, CacheKey, FileCacheBackend, MemoryCacheBackend};
use crate::config::{CacheConfig, CacheStorage};
use crate::error::CacheError;
use crate::events::{EventBus, OrchestratorEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use voxmux_speech::{AudioFormat, SynthesizedAudio};

/// Point-in-time cache counters
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub entries: usize,
    pub size_bytes: u64,
    pub max_size_bytes: u64,
}

/// TTL-aware cache facade that never fails its caller
///
/// Backend errors are logged, counted and published as
/// [`OrchestratorEvent::CacheError`]; reads then behave as a miss and writes
/// are skipped.
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    enabled: bool,
    ttl: Duration,
    events: EventBus,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self {
            backend,
            enabled: true,
            ttl,
            events: EventBus::default(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Build the storage selected by `config`
    pub async fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        let backend: Arc<dyn CacheBackend> = match config.storage {
            CacheStorage::Memory => Arc::new(MemoryCacheBackend::new(config.max_size_bytes)),
            CacheStorage::File => {
                Arc::new(FileCacheBackend::open(&config.directory, config.max_size_bytes).await?)
            }
        };
        Ok(Self::new(backend, config.ttl()).with_enabled(config.enabled))
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.get_at(key, Utc::now()).await
    }

    /// Look up `key` as of `now`, counting a hit or a miss
    ///
    /// An expired entry is a miss. It stays stored until a fresh `put`
    /// replaces it or the sweeper purges it, so a lookup never removes an
    /// entry written after it read.
    pub async fn get_at(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<CacheEntry> {
        let found = self.lookup(key, now).await;
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Fresh entry for `key` without touching the hit and miss counters
    pub async fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.lookup(key, Utc::now()).await
    }

    async fn lookup(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<CacheEntry> {
        if !self.enabled {
            return None;
        }
        match self.backend.get(key).await {
            Ok(Some(entry)) if !entry.is_expired_at(now) => {
                log::debug!("Cache hit for {key}");
                Some(entry)
            }
            Ok(Some(_)) => {
                log::debug!("Cache entry for {key} expired");
                None
            }
            Ok(None) => None,
            Err(e) => {
                self.report("get", Some(key), &e);
                None
            }
        }
    }

    /// Store freshly synthesized audio under `key` with the configured TTL
    pub async fn put(
        &self,
        key: &CacheKey,
        audio: &SynthesizedAudio,
        backend: &str,
        format: AudioFormat,
    ) -> bool {
        let entry = CacheEntry::new(audio.clone(), backend, format, Utc::now(), self.ttl);
        self.insert(key, entry).await
    }

    /// Store a prepared entry, returning whether it was written
    pub async fn insert(&self, key: &CacheKey, entry: CacheEntry) -> bool {
        if !self.enabled {
            return false;
        }
        match self.backend.put(key, entry).await {
            Ok(()) => true,
            Err(e) => {
                self.report("put", Some(key), &e);
                false
            }
        }
    }

    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        match self.backend.delete(key).await {
            Ok(removed) => removed,
            Err(e) => {
                self.report("delete", Some(key), &e);
                false
            }
        }
    }

    /// Drop every expired entry, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        match self.backend.purge_expired(Utc::now()).await {
            Ok(removed) => {
                if removed > 0 {
                    log::debug!("Purged {removed} expired cache entries");
                }
                removed
            }
            Err(e) => {
                self.report("purge", None, &e);
                0
            }
        }
    }

    pub async fn clear(&self) -> bool {
        match self.backend.clear().await {
            Ok(()) => true,
            Err(e) => {
                self.report("clear", None, &e);
                false
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let usage = self.backend.usage();
        CacheStats {
            enabled: self.enabled,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            entries: usage.entries,
            size_bytes: usage.size_bytes,
            max_size_bytes: usage.max_size_bytes,
        }
    }

    /// Purge expired entries every `interval` until the handle is aborted
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.purge_expired().await;
            }
        })
    }

    fn report(&self, operation: &str, key: Option<&CacheKey>, error: &CacheError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        match key {
            Some(key) => log::warn!("Cache {operation} failed for {key}: {error}"),
            None => log::warn!("Cache {operation} failed: {error}"),
        }
        self.events.emit(OrchestratorEvent::CacheError {
            operation: operation.to_string(),
            key: key.cloned(),
            message: error.to_string(),
        });
    }
}
