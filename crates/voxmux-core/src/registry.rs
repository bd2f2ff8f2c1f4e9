use crate::config::BackendSettings;
use crate::error::BuildError;
use crate::stats::BackendStatus;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use voxmux_speech::{AudioFormat, HealthStatus, SharedBackend};

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Live load of one backend
///
/// Only the scheduler moves these counters, and only while holding the
/// backend's queue lock.
#[derive(Debug, Default)]
pub struct LoadCounters {
    in_flight: AtomicUsize,
    queue_depth: AtomicUsize,
    dispatched: AtomicU64,
    rejected: AtomicU64,
    cancelled: AtomicU64,
}

impl LoadCounters {
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::SeqCst)
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub(crate) fn start(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn finish(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn enqueued(&self) {
        self.queue_depth.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn dequeued(&self) {
        self.queue_depth.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn reject(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }
}

/// Health derived from consecutive failures and probes
#[derive(Debug)]
pub(crate) struct HealthState {
    name: String,
    healthy: AtomicBool,
    consecutive_failures: AtomicU32,
    threshold: u32,
}

impl HealthState {
    fn new(name: &str, threshold: u32) -> Self {
        Self {
            name: name.to_string(),
            healthy: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
            threshold: threshold.max(1),
        }
    }

    pub(crate) fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    pub(crate) fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub(crate) fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        if !self.healthy.swap(true, Ordering::SeqCst) {
            log::info!("Backend '{}' recovered", self.name);
        }
    }

    pub(crate) fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.threshold && self.healthy.swap(false, Ordering::SeqCst) {
            log::warn!(
                "Backend '{}' marked unhealthy after {failures} consecutive failures",
                self.name
            );
        }
    }

    pub(crate) fn set_healthy(&self, healthy: bool) {
        if healthy {
            self.record_success();
        } else if self.healthy.swap(false, Ordering::SeqCst) {
            log::warn!("Backend '{}' marked unhealthy", self.name);
        }
    }
}

/// Immutable view of one backend at snapshot time
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    pub name: String,
    pub enabled: bool,
    pub healthy: bool,
    pub max_concurrency: usize,
    pub queue_capacity: usize,
    pub in_flight: usize,
    pub queue_depth: usize,
    /// Registration order, lower is preferred
    pub priority: usize,
    pub consecutive_failures: u32,
    /// Formats the backend advertised at registration
    pub formats: Vec<AudioFormat>,
}

impl BackendDescriptor {
    pub fn is_available(&self) -> bool {
        self.enabled && self.healthy
    }

    pub fn supports(&self, format: AudioFormat) -> bool {
        self.formats.contains(&format)
    }

    /// `queue_depth / max_concurrency`
    pub fn load(&self) -> f64 {
        self.queue_depth as f64 / self.max_concurrency.max(1) as f64
    }
}

/// Point-in-time copy of every registered backend
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub backends: Vec<BackendDescriptor>,
}

impl RegistrySnapshot {
    pub fn get(&self, name: &str) -> Option<&BackendDescriptor> {
        self.backends.iter().find(|b| b.name == name)
    }
}

pub(crate) struct RegisteredBackend {
    pub(crate) backend: SharedBackend,
    pub(crate) settings: BackendSettings,
    pub(crate) formats: Vec<AudioFormat>,
    pub(crate) load: Arc<LoadCounters>,
    pub(crate) health: Arc<HealthState>,
}

impl RegisteredBackend {
    pub(crate) fn name(&self) -> &str {
        self.backend.name()
    }
}

/// The set of synthesis backends and their live health and load state
pub struct BackendRegistry {
    entries: Vec<RegisteredBackend>,
    failure_threshold: u32,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD)
    }
}

impl BackendRegistry {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            entries: Vec::new(),
            failure_threshold,
        }
    }

    /// Add a backend. Earlier registrations win load-score ties.
    pub fn register(
        &mut self,
        backend: SharedBackend,
        settings: BackendSettings,
    ) -> Result<(), BuildError> {
        let name = backend.name().to_string();
        if self.find(&name).is_some() {
            return Err(BuildError::DuplicateBackend(name));
        }
        let formats = backend.supported_formats();
        log::debug!(
            "Registered backend '{name}' (enabled: {}, concurrency: {}, queue: {}, formats: {formats:?})",
            settings.enabled,
            settings.max_concurrency,
            settings.queue_capacity
        );
        self.entries.push(RegisteredBackend {
            formats,
            health: Arc::new(HealthState::new(&name, self.failure_threshold)),
            load: Arc::new(LoadCounters::default()),
            backend,
            settings,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name().to_string()).collect()
    }

    pub fn backend(&self, name: &str) -> Option<SharedBackend> {
        self.find(name).map(|e| Arc::clone(&e.backend))
    }

    pub fn load(&self, name: &str) -> Option<Arc<LoadCounters>> {
        self.find(name).map(|e| Arc::clone(&e.load))
    }

    pub(crate) fn entries(&self) -> &[RegisteredBackend] {
        &self.entries
    }

    fn find(&self, name: &str) -> Option<&RegisteredBackend> {
        self.entries.iter().find(|e| e.name() == name)
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            backends: self
                .entries
                .iter()
                .enumerate()
                .map(|(priority, e)| BackendDescriptor {
                    name: e.name().to_string(),
                    enabled: e.settings.enabled,
                    healthy: e.health.is_healthy(),
                    max_concurrency: e.settings.max_concurrency,
                    queue_capacity: e.settings.queue_capacity,
                    in_flight: e.load.in_flight(),
                    queue_depth: e.load.queue_depth(),
                    priority,
                    consecutive_failures: e.health.consecutive_failures(),
                    formats: e.formats.clone(),
                })
                .collect(),
        }
    }

    /// Alias of [`BackendRegistry::snapshot`] returning just the descriptors
    pub fn list(&self) -> Vec<BackendDescriptor> {
        self.snapshot().backends
    }

    pub fn status(&self) -> Vec<BackendStatus> {
        self.entries
            .iter()
            .map(|e| {
                let load =
                    e.load.queue_depth() as f64 / e.settings.max_concurrency.max(1) as f64;
                BackendStatus {
                    name: e.name().to_string(),
                    enabled: e.settings.enabled,
                    healthy: e.health.is_healthy(),
                    load,
                    in_flight: e.load.in_flight(),
                    queue_depth: e.load.queue_depth(),
                    max_concurrency: e.settings.max_concurrency,
                    queue_capacity: e.settings.queue_capacity,
                    dispatched: e.load.dispatched(),
                    rejected: e.load.rejected(),
                    cancelled: e.load.cancelled(),
                }
            })
            .collect()
    }

    pub fn record_success(&self, name: &str) {
        if let Some(entry) = self.find(name) {
            entry.health.record_success();
        }
    }

    pub fn record_failure(&self, name: &str) {
        if let Some(entry) = self.find(name) {
            entry.health.record_failure();
        }
    }

    pub fn set_healthy(&self, name: &str, healthy: bool) {
        if let Some(entry) = self.find(name) {
            entry.health.set_healthy(healthy);
        }
    }

    /// Initialize every backend. A backend that fails stays registered but unhealthy.
    pub async fn initialize_all(&self) {
        for entry in &self.entries {
            match entry.backend.initialize().await {
                Ok(()) => log::debug!("Backend '{}' initialized", entry.name()),
                Err(e) => {
                    log::error!("Backend '{}' failed to initialize: {e}", entry.name());
                    entry.health.set_healthy(false);
                }
            }
        }
    }

    /// Run every backend's health check once and apply the result
    pub async fn probe_health(&self) {
        for entry in &self.entries {
            match entry.backend.health_check().await {
                HealthStatus::Healthy => entry.health.set_healthy(true),
                HealthStatus::Unhealthy(reason) => {
                    log::debug!("Probe of '{}' failed: {reason}", entry.name());
                    entry.health.set_healthy(false);
                }
            }
        }
    }

    /// Probe every `interval` until the handle is aborted or the registry is dropped
    pub fn spawn_health_probe(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.probe_health().await;
            }
        })
    }

    pub async fn shutdown_all(&self) {
        for entry in &self.entries {
            if let Err(e) = entry.backend.shutdown().await {
                log::warn!("Backend '{}' failed to shut down: {e}", entry.name());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxmux_test_utils::MockBackend;

    fn settings() -> BackendSettings {
        BackendSettings {
            enabled: true,
            max_concurrency: 2,
            queue_capacity: 4,
        }
    }

    fn registry(names: &[&str]) -> BackendRegistry {
        let mut registry = BackendRegistry::new(3);
        for name in names {
            registry
                .register(Arc::new(MockBackend::new(name)), settings())
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_snapshot_preserves_registration_order() {
        let registry = registry(&["edge", "piper", "xtts"]);
        let snapshot = registry.snapshot();
        let names: Vec<_> = snapshot.backends.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["edge", "piper", "xtts"]);
        assert_eq!(snapshot.get("xtts").unwrap().priority, 2);
        assert!(snapshot.backends.iter().all(|b| b.is_available()));
    }

    #[test]
    fn test_snapshot_carries_advertised_formats() {
        let mut registry = registry(&["edge"]);
        let piper =
            MockBackend::new("piper").with_formats(vec![AudioFormat::Wav, AudioFormat::Mp3]);
        registry.register(Arc::new(piper), settings()).unwrap();

        let snapshot = registry.snapshot();
        assert!(!snapshot.get("edge").unwrap().supports(AudioFormat::Mp3));
        assert!(snapshot.get("piper").unwrap().supports(AudioFormat::Mp3));
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let mut registry = registry(&["edge"]);
        let result = registry.register(Arc::new(MockBackend::new("edge")), settings());
        assert!(matches!(result, Err(BuildError::DuplicateBackend(name)) if name == "edge"));
    }

    #[test]
    fn test_consecutive_failures_flip_health() {
        let registry = registry(&["edge"]);
        registry.record_failure("edge");
        registry.record_failure("edge");
        assert!(registry.snapshot().get("edge").unwrap().healthy);

        registry.record_failure("edge");
        let edge = registry.snapshot().get("edge").unwrap().clone();
        assert!(!edge.healthy);
        assert_eq!(edge.consecutive_failures, 3);

        registry.record_success("edge");
        let edge = registry.snapshot().get("edge").unwrap().clone();
        assert!(edge.healthy);
        assert_eq!(edge.consecutive_failures, 0);
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let registry = registry(&["edge"]);
        registry.record_failure("edge");
        registry.record_failure("edge");
        registry.record_success("edge");
        registry.record_failure("edge");
        assert!(registry.snapshot().get("edge").unwrap().healthy);
    }

    #[tokio::test]
    async fn test_failed_initialization_marks_unhealthy() {
        let mut registry = BackendRegistry::default();
        registry
            .register(Arc::new(MockBackend::new("edge").with_init_failure()), settings())
            .unwrap();
        registry
            .register(Arc::new(MockBackend::new("piper")), settings())
            .unwrap();

        registry.initialize_all().await;
        let snapshot = registry.snapshot();
        assert!(!snapshot.get("edge").unwrap().healthy);
        assert!(snapshot.get("piper").unwrap().healthy);
    }

    #[tokio::test]
    async fn test_probe_follows_health_check() {
        let edge = Arc::new(MockBackend::new("edge").unhealthy());
        let mut registry = BackendRegistry::default();
        registry.register(edge.clone(), settings()).unwrap();

        registry.probe_health().await;
        assert!(!registry.snapshot().get("edge").unwrap().healthy);

        edge.set_healthy(true);
        registry.probe_health().await;
        assert!(registry.snapshot().get("edge").unwrap().healthy);
    }

    #[tokio::test]
    async fn test_spawned_probe_runs_periodically() {
        let edge = Arc::new(MockBackend::new("edge"));
        let mut registry = BackendRegistry::default();
        registry.register(edge.clone(), settings()).unwrap();
        let registry = Arc::new(registry);

        let probe = registry.spawn_health_probe(Duration::from_millis(20));
        edge.set_healthy(false);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!registry.snapshot().get("edge").unwrap().healthy);
        probe.abort();
    }
}
