use super::{Inner, Orchestrator};
use crate::cache::{CacheBackend, CacheStore};
use crate::config::{VoxmuxConfig, validate_config};
use crate::error::BuildError;
use crate::events::EventBus;
use crate::registry::BackendRegistry;
use crate::scheduler::ConcurrencyScheduler;
use crate::selector::BackendSelector;
use crate::single_flight::SingleFlightCoordinator;
use crate::stats::StatsRecorder;
use std::sync::{Arc, Mutex};
use voxmux_speech::SharedBackend;

/// Assembles an [`Orchestrator`] from configuration and backends
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: VoxmuxConfig,
    backends: Vec<SharedBackend>,
    cache_backend: Option<Arc<dyn CacheBackend>>,
    background_tasks: bool,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            background_tasks: true,
            ..Default::default()
        }
    }

    pub fn config(mut self, config: VoxmuxConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a backend. Registration order breaks load ties.
    pub fn backend(mut self, backend: SharedBackend) -> Self {
        self.backends.push(backend);
        self
    }

    pub fn backends(mut self, backends: impl IntoIterator<Item = SharedBackend>) -> Self {
        self.backends.extend(backends);
        self
    }

    /// Use `backend` instead of the storage named in the cache config
    pub fn cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.cache_backend = Some(backend);
        self
    }

    /// Skip the cache sweeper and health probe tasks
    pub fn without_background_tasks(mut self) -> Self {
        self.background_tasks = false;
        self
    }

    pub async fn build(self) -> Result<Orchestrator, BuildError> {
        let config = self.config;
        validate_config(&config)?;
        if self.backends.is_empty() {
            return Err(BuildError::NoBackends);
        }

        let mut registry = BackendRegistry::new(config.health.failure_threshold);
        for backend in self.backends {
            let settings = config.backend_settings(backend.name());
            registry.register(backend, settings)?;
        }
        let known = registry.names();
        for name in config.referenced_backends() {
            if !known.contains(&name) {
                log::warn!("Routing references backend '{name}' which is not registered");
            }
        }
        registry.initialize_all().await;
        let registry = Arc::new(registry);

        let events = EventBus::default();
        let cache = match self.cache_backend {
            Some(backend) => CacheStore::new(backend, config.cache.ttl())
                .with_enabled(config.cache.enabled),
            None => CacheStore::from_config(&config.cache).await?,
        };
        let cache = Arc::new(cache.with_events(events.clone()));

        let mut background = Vec::new();
        if self.background_tasks {
            if let (true, Some(interval)) = (cache.is_enabled(), config.cache.sweep_interval()) {
                background.push(cache.spawn_sweeper(interval));
            }
            if let Some(interval) = config.health.probe_interval() {
                background.push(registry.spawn_health_probe(interval));
            }
        }

        log::debug!(
            "Orchestrator ready with backends {:?} (primary '{}')",
            known,
            config.routing.primary_backend
        );

        Ok(Orchestrator {
            inner: Arc::new(Inner {
                scheduler: ConcurrencyScheduler::new(&registry, config.scheduler.cancel_grace()),
                selector: BackendSelector::new(config.routing.clone()),
                flights: SingleFlightCoordinator::new(),
                stats: StatsRecorder::default(),
                background: Mutex::new(background),
                registry,
                cache,
                events,
                config,
            }),
        })
    }
}
