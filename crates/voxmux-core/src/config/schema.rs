use crate::request::RequestLimits;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;
use voxmux_speech::QualityTier;

/// Top-level orchestrator configuration. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoxmuxConfig {
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub limits: RequestLimits,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub backends: BTreeMap<String, BackendOverride>,
}

impl VoxmuxConfig {
    /// Effective settings for the backend called `name`
    pub fn backend_settings(&self, name: &str) -> BackendSettings {
        let overrides = self.backends.get(name);
        BackendSettings {
            enabled: overrides.map(|o| o.enabled).unwrap_or(true),
            max_concurrency: overrides
                .and_then(|o| o.max_concurrency)
                .unwrap_or(self.scheduler.max_concurrency_per_backend),
            queue_capacity: overrides
                .and_then(|o| o.queue_capacity)
                .unwrap_or(self.scheduler.queue_capacity_per_backend),
        }
    }

    /// Every backend name routing refers to, in first-mention order
    pub fn referenced_backends(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut push = |name: &String| {
            if !names.contains(name) {
                names.push(name.clone());
            }
        };
        push(&self.routing.primary_backend);
        self.routing.fallback_backends.iter().for_each(&mut push);
        for tier in [QualityTier::Low, QualityTier::Medium, QualityTier::High] {
            if let Some(list) = self.routing.tier_priorities.get(&tier) {
                list.iter().for_each(&mut push);
            }
        }
        self.backends.keys().for_each(&mut push);
        names
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_primary_backend")]
    pub primary_backend: String,
    #[serde(default = "default_fallback_backends")]
    pub fallback_backends: Vec<String>,
    /// Replaces primary + fallbacks for requests of the given tier
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tier_priorities: HashMap<QualityTier, Vec<String>>,
}

impl RoutingConfig {
    /// Candidate order for a request of `tier`
    pub fn order_for(&self, tier: QualityTier) -> Vec<&str> {
        match self.tier_priorities.get(&tier) {
            Some(list) => list.iter().map(String::as_str).collect(),
            None => std::iter::once(self.primary_backend.as_str())
                .chain(self.fallback_backends.iter().map(String::as_str))
                .collect(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            primary_backend: default_primary_backend(),
            fallback_backends: default_fallback_backends(),
            tier_priorities: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency_per_backend: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity_per_backend: usize,
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
}

impl SchedulerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency_per_backend: default_max_concurrency(),
            queue_capacity_per_backend: default_queue_capacity(),
            max_retry_attempts: default_max_retry_attempts(),
            request_timeout_secs: default_request_timeout_secs(),
            cancel_grace_ms: default_cancel_grace_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStorage {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub storage: CacheStorage,
    #[serde(default = "default_cache_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,
    /// Zero disables the background sweep
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            storage: CacheStorage::default(),
            directory: default_cache_directory(),
            ttl_seconds: default_ttl_seconds(),
            max_size_bytes: default_max_size_bytes(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Consecutive backend errors before a backend is marked unhealthy
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Zero disables probing
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
}

impl HealthConfig {
    pub fn probe_interval(&self) -> Option<Duration> {
        (self.probe_interval_secs > 0).then(|| Duration::from_secs(self.probe_interval_secs))
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            probe_interval_secs: default_probe_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendOverride {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,
}

/// Resolved per-backend settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendSettings {
    pub enabled: bool,
    pub max_concurrency: usize,
    pub queue_capacity: usize,
}

fn default_true() -> bool {
    true
}

fn default_primary_backend() -> String {
    "edge".to_string()
}

fn default_fallback_backends() -> Vec<String> {
    vec!["piper".to_string()]
}

fn default_max_concurrency() -> usize {
    10
}

fn default_queue_capacity() -> usize {
    100
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_cancel_grace_ms() -> u64 {
    2000
}

fn default_cache_directory() -> PathBuf {
    PathBuf::from("cache")
}

fn default_ttl_seconds() -> u64 {
    3600
}

fn default_max_size_bytes() -> u64 {
    500 * 1024 * 1024
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_probe_interval_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_settings_fall_back_to_scheduler_defaults() {
        let mut config = VoxmuxConfig::default();
        config.backends.insert(
            "edge".to_string(),
            BackendOverride {
                enabled: true,
                max_concurrency: Some(2),
                queue_capacity: None,
            },
        );

        let edge = config.backend_settings("edge");
        assert_eq!(edge.max_concurrency, 2);
        assert_eq!(edge.queue_capacity, 100);

        let piper = config.backend_settings("piper");
        assert!(piper.enabled);
        assert_eq!(piper.max_concurrency, 10);
    }

    #[test]
    fn test_tier_priority_replaces_default_order() {
        let mut routing = RoutingConfig::default();
        assert_eq!(routing.order_for(QualityTier::High), vec!["edge", "piper"]);

        routing.tier_priorities.insert(
            QualityTier::High,
            vec!["xtts".to_string(), "edge".to_string()],
        );
        assert_eq!(routing.order_for(QualityTier::High), vec!["xtts", "edge"]);
        assert_eq!(routing.order_for(QualityTier::Low), vec!["edge", "piper"]);
    }

    #[test]
    fn test_referenced_backends_are_unique() {
        let mut config = VoxmuxConfig::default();
        config.routing.tier_priorities.insert(
            QualityTier::High,
            vec!["xtts".to_string(), "edge".to_string()],
        );
        assert_eq!(config.referenced_backends(), vec!["edge", "piper", "xtts"]);
    }
}
