use super::schema::VoxmuxConfig;
use crate::error::ConfigError;
use std::path::Path;

pub fn parse_yaml_file<P: AsRef<Path>>(path: P) -> Result<VoxmuxConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_yaml_str(&content)
}

pub fn parse_yaml_str(yaml: &str) -> Result<VoxmuxConfig, ConfigError> {
    // An empty document means "all defaults"
    if yaml.trim().is_empty() {
        return Ok(VoxmuxConfig::default());
    }
    let config: VoxmuxConfig = serde_yaml::from_str(yaml)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheStorage;
    use voxmux_speech::QualityTier;

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
routing:
  primary_backend: edge
  fallback_backends: [piper, xtts]
  tier_priorities:
    high: [xtts, edge, piper]
scheduler:
  max_concurrency_per_backend: 4
  queue_capacity_per_backend: 8
  max_retry_attempts: 2
  request_timeout_secs: 10
  cancel_grace_ms: 500
cache:
  enabled: true
  storage: file
  directory: /tmp/voxmux
  ttl_seconds: 60
  max_size_bytes: 1048576
  sweep_interval_secs: 0
health:
  failure_threshold: 5
  probe_interval_secs: 0
limits:
  max_text_chars: 200
backends:
  edge: { enabled: true, max_concurrency: 2, queue_capacity: 0 }
  xtts: { enabled: false }
"#;
        let config = parse_yaml_str(yaml).unwrap();
        assert_eq!(config.routing.fallback_backends, vec!["piper", "xtts"]);
        assert_eq!(
            config.routing.tier_priorities[&QualityTier::High],
            vec!["xtts", "edge", "piper"]
        );
        assert_eq!(config.scheduler.cancel_grace_ms, 500);
        assert_eq!(config.cache.storage, CacheStorage::File);
        assert_eq!(config.cache.sweep_interval(), None);
        assert_eq!(config.health.probe_interval(), None);
        assert_eq!(config.limits.max_text_chars, 200);
        assert_eq!(config.backend_settings("edge").queue_capacity, 0);
        assert!(!config.backend_settings("xtts").enabled);
    }

    #[test]
    fn test_missing_sections_take_defaults() {
        let config = parse_yaml_str("routing:\n  primary_backend: piper\n").unwrap();
        assert_eq!(config.routing.primary_backend, "piper");
        assert_eq!(config.routing.fallback_backends, vec!["piper"]);
        assert_eq!(config.scheduler.max_concurrency_per_backend, 10);
        assert_eq!(config.cache.max_size_bytes, 524_288_000);
        assert_eq!(config.health.failure_threshold, 3);
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(parse_yaml_str("").unwrap(), VoxmuxConfig::default());
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let result = parse_yaml_str("scheduler: [not, a, map]");
        assert!(matches!(result, Err(ConfigError::YamlError(_))));
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voxmux.yaml");
        std::fs::write(&path, "cache:\n  enabled: false\n").unwrap();
        let config = parse_yaml_file(&path).unwrap();
        assert!(!config.cache.enabled);
    }
}
