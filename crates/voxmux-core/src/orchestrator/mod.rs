//! End-to-end request lifecycle: cache, de-duplication, selection, scheduling

mod builder;
mod state;

pub use builder::OrchestratorBuilder;
pub use state::RequestState;

use crate::cache::{CacheEntry, CacheKey, CacheStats, CacheStore};
use crate::config::VoxmuxConfig;
use crate::error::{Result, SynthesisError};
use crate::events::{BoxEventStream, EventBus, OrchestratorEvent};
use crate::registry::BackendRegistry;
use crate::request::SynthesisRequest;
use crate::scheduler::{ConcurrencyScheduler, QueueTask};
use crate::selector::BackendSelector;
use crate::single_flight::{Role, SingleFlightCoordinator};
use crate::stats::{BackendStatus, OrchestratorStats, StatsRecorder};
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use state::RequestTracker;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use voxmux_speech::{AudioMetadata, SynthesizedAudio, VoiceInfo};

pub const DEFAULT_STREAM_CHUNK_SIZE: usize = 4096;

/// Deadline used when a timeout is too large to add to the current instant
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Audio delivered to a caller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynthesisOutcome {
    pub audio: Bytes,
    pub metadata: AudioMetadata,
    /// Served from the cache without invoking a backend
    pub cached: bool,
    /// Backend that produced the audio
    pub backend: String,
    pub cache_key: CacheKey,
}

impl SynthesisOutcome {
    fn from_entry(key: CacheKey, entry: CacheEntry) -> Self {
        Self {
            audio: entry.audio.audio,
            metadata: entry.audio.metadata,
            cached: true,
            backend: entry.backend,
            cache_key: key,
        }
    }
}

pub(crate) struct Inner {
    config: VoxmuxConfig,
    registry: Arc<BackendRegistry>,
    selector: BackendSelector,
    scheduler: ConcurrencyScheduler,
    cache: Arc<CacheStore>,
    flights: SingleFlightCoordinator<SynthesisOutcome>,
    events: EventBus,
    stats: StatsRecorder,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Inner {
    fn stop_background(&self) {
        if let Ok(mut tasks) = self.background.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }

    /// Runs once per flight, on its own task
    async fn produce(
        self: Arc<Self>,
        request: SynthesisRequest,
        key: CacheKey,
        deadline: Instant,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<SynthesisOutcome> {
        let mut tracker = RequestTracker::resume(short(&key), RequestState::Joining);

        // Another flight may have filled the key since the caller's miss
        if let Some(entry) = self.cache.peek(&key).await {
            log::debug!("Flight for {key} found a fresh cache entry");
            tracker.advance(RequestState::Complete);
            self.stats.cache_hit();
            return Ok(SynthesisOutcome::from_entry(key, entry));
        }

        let result = tokio::select! {
            result = self.run_attempts(&request, &key, &mut tracker) => result,
            _ = tokio::time::sleep_until(deadline) => Err(SynthesisError::Timeout(timeout)),
            _ = cancel.cancelled() => Err(SynthesisError::Cancelled),
        };

        match result {
            Ok((audio, backend)) => {
                tracker.advance(RequestState::CacheWrite);
                self.cache
                    .put(&key, &audio, &backend, request.format())
                    .await;
                tracker.advance(RequestState::Complete);
                self.stats.backend_used(&backend);
                Ok(SynthesisOutcome {
                    audio: audio.audio,
                    metadata: audio.metadata,
                    cached: false,
                    backend,
                    cache_key: key,
                })
            }
            Err(e) => {
                log::debug!("Synthesis for {key} failed: {e}");
                tracker.fail();
                Err(e)
            }
        }
    }

    /// Select, enqueue and wait, falling back to other backends on failure
    async fn run_attempts(
        &self,
        request: &SynthesisRequest,
        key: &CacheKey,
        tracker: &mut RequestTracker,
    ) -> Result<(SynthesizedAudio, String)> {
        let max_attempts = self.config.scheduler.max_retry_attempts.max(1);
        let mut excluded: Vec<String> = Vec::new();
        let mut last_error: Option<String> = None;

        for attempt in 1..=max_attempts {
            tracker.advance(RequestState::Selecting);
            let snapshot = self.registry.snapshot();
            let backend = match self.selector.select(request, &snapshot, &excluded) {
                Ok(backend) => backend,
                Err(e) => {
                    return Err(match last_error {
                        Some(last_error) => SynthesisError::ServiceUnavailable {
                            attempts: attempt - 1,
                            last_error,
                        },
                        None => e,
                    });
                }
            };
            log::debug!("Attempt {attempt} for {key} on '{backend}'");

            let task = QueueTask::new(request.clone(), key.clone(), attempt);
            let mut handle = self.scheduler.enqueue(&backend, task)?;
            tracker.advance(RequestState::Queued);

            if handle.dispatched().await {
                tracker.advance(RequestState::Dispatched);
                tracker.advance(RequestState::Synthesizing);
            }
            match handle.wait().await {
                Ok(audio) => return Ok((audio, backend)),
                Err(e) => {
                    log::warn!("Attempt {attempt} on '{backend}' failed: {e}");
                    self.events.emit(OrchestratorEvent::BackendFailed {
                        backend: backend.clone(),
                        attempt,
                        message: e.to_string(),
                    });
                    last_error = Some(e.to_string());
                    excluded.push(backend);
                }
            }
        }

        Err(SynthesisError::ServiceUnavailable {
            attempts: max_attempts,
            last_error: last_error.unwrap_or_default(),
        })
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.stop_background();
    }
}

/// First characters of a key, for log lines
fn short(key: &CacheKey) -> String {
    key.as_str().chars().take(12).collect()
}

/// Routes synthesis requests across backends
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn config(&self) -> &VoxmuxConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.inner.registry
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.inner.cache
    }

    /// Synthesize with the configured request timeout
    pub async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisOutcome> {
        self.synthesize_with_cancel(request, None, CancellationToken::new())
            .await
    }

    pub async fn synthesize_within(
        &self,
        request: SynthesisRequest,
        timeout: Duration,
    ) -> Result<SynthesisOutcome> {
        self.synthesize_with_cancel(request, Some(timeout), CancellationToken::new())
            .await
    }

    /// Synthesize `request`, giving up after `timeout` or when `cancel` fires
    ///
    /// If this call started the shared synthesis, cancelling it cancels the
    /// synthesis for every joined caller. A joined caller's token only detaches
    /// that caller.
    pub async fn synthesize_with_cancel(
        &self,
        request: SynthesisRequest,
        timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> Result<SynthesisOutcome> {
        let inner = &self.inner;
        inner.stats.request();

        let checked = request.validate(&inner.config.limits).and_then(|()| {
            BackendSelector::check_format(request.format(), &inner.registry.snapshot())
        });
        if let Err(e) = checked {
            log::debug!("Rejected request: {e}");
            inner.stats.failed(e.kind());
            return Err(e);
        }

        let key = CacheKey::for_request(&request);
        let mut tracker = RequestTracker::new(short(&key));
        tracker.advance(RequestState::CacheCheck);

        if let Some(entry) = inner.cache.get(&key).await {
            tracker.advance(RequestState::CacheHit);
            tracker.advance(RequestState::Complete);
            inner.stats.cache_hit();
            inner.stats.completed();
            inner.events.emit(OrchestratorEvent::RequestCompleted {
                key: key.clone(),
                backend: entry.backend.clone(),
                cached: true,
            });
            return Ok(SynthesisOutcome::from_entry(key, entry));
        }
        tracker.advance(RequestState::CacheMiss);
        tracker.advance(RequestState::Joining);

        let timeout = timeout.unwrap_or_else(|| inner.config.scheduler.request_timeout());
        let now = Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or(now + FAR_FUTURE);

        let producer = {
            let inner = Arc::clone(inner);
            let key = key.clone();
            let cancel = cancel.clone();
            move || inner.produce(request, key, deadline, timeout, cancel)
        };

        let (result, role) = tokio::select! {
            (result, role) = inner.flights.join(&key, producer) => (result, Some(role)),
            _ = tokio::time::sleep_until(deadline) => (Err(SynthesisError::Timeout(timeout)), None),
            _ = cancel.cancelled() => (Err(SynthesisError::Cancelled), None),
        };

        if role == Some(Role::Follower) {
            inner.stats.joined();
        }
        match result {
            Ok(outcome) => {
                tracker.advance(RequestState::Complete);
                inner.stats.completed();
                inner.events.emit(OrchestratorEvent::RequestCompleted {
                    key,
                    backend: outcome.backend.clone(),
                    cached: outcome.cached,
                });
                Ok(outcome)
            }
            Err(e) => {
                tracker.fail();
                inner.stats.failed(e.kind());
                inner.events.emit(OrchestratorEvent::RequestFailed {
                    key,
                    error: e.clone(),
                });
                Err(e)
            }
        }
    }

    /// Synthesize and deliver the audio in chunks of `chunk_size` bytes
    ///
    /// The whole result is produced before the first chunk; a failure surfaces
    /// here rather than mid-stream, so partial audio is never emitted.
    pub async fn stream(
        &self,
        request: SynthesisRequest,
        chunk_size: usize,
    ) -> Result<BoxStream<'static, Bytes>> {
        let outcome = self.synthesize(request).await?;
        let chunk_size = if chunk_size == 0 {
            DEFAULT_STREAM_CHUNK_SIZE
        } else {
            chunk_size
        };

        let audio = outcome.audio;
        let chunks: Vec<Bytes> = (0..audio.len())
            .step_by(chunk_size)
            .map(|start| audio.slice(start..(start + chunk_size).min(audio.len())))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }

    /// Voices of one backend, or of every enabled backend when `backend` is `None`
    pub async fn list_voices(&self, backend: Option<&str>) -> Result<Vec<VoiceInfo>> {
        let registry = &self.inner.registry;
        let names = match backend {
            Some(name) => {
                if registry.backend(name).is_none() {
                    return Err(SynthesisError::Validation(format!(
                        "unknown backend '{name}'"
                    )));
                }
                vec![name.to_string()]
            }
            None => registry
                .list()
                .into_iter()
                .filter(|b| b.enabled)
                .map(|b| b.name)
                .collect(),
        };

        let mut voices = Vec::new();
        for name in names {
            let Some(engine) = registry.backend(&name) else {
                continue;
            };
            match engine.list_voices().await {
                Ok(list) => voices.extend(list),
                Err(e) => log::warn!("Listing voices of '{name}' failed: {e}"),
            }
        }
        Ok(voices)
    }

    pub fn backend_status(&self) -> Vec<BackendStatus> {
        self.inner.registry.status()
    }

    pub fn stats(&self) -> OrchestratorStats {
        self.inner.stats.snapshot(self.inner.cache.stats())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub async fn clear_cache(&self) -> bool {
        self.inner.cache.clear().await
    }

    /// Drop the cached result for `request`, if any
    pub async fn invalidate(&self, request: &SynthesisRequest) -> bool {
        self.inner
            .cache
            .invalidate(&CacheKey::for_request(request))
            .await
    }

    /// Stream of cache errors, backend failures and request outcomes
    pub fn subscribe_events(&self) -> BoxEventStream<OrchestratorEvent> {
        self.inner.events.subscribe()
    }

    /// Stop background tasks and shut every backend down
    pub async fn shutdown(&self) {
        self.inner.stop_background();
        self.inner.registry.shutdown_all().await;
        log::debug!("Orchestrator shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxmux_speech::{AudioFormat, SharedBackend};
    use voxmux_test_utils::MockBackend;

    #[tokio::test]
    async fn test_flight_serves_an_entry_written_after_the_miss() {
        let edge = Arc::new(MockBackend::new("edge"));
        let orchestrator = Orchestrator::builder()
            .backend(Arc::clone(&edge) as SharedBackend)
            .without_background_tasks()
            .build()
            .await
            .unwrap();
        let request = SynthesisRequest::new("Hello", "v1");
        let key = CacheKey::for_request(&request);

        // Left behind by a flight that finished after this request missed
        let earlier = SynthesizedAudio::new(b"earlier".to_vec(), 10, 22050);
        assert!(
            orchestrator
                .cache()
                .put(&key, &earlier, "edge", AudioFormat::Wav)
                .await
        );

        let timeout = Duration::from_secs(5);
        let outcome = Arc::clone(&orchestrator.inner)
            .produce(
                request,
                key,
                Instant::now() + timeout,
                timeout,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(outcome.cached);
        assert_eq!(outcome.audio.as_ref(), b"earlier");
        assert_eq!(edge.calls(), 0);
        assert_eq!(orchestrator.cache_stats().hits, 0);
    }
}
