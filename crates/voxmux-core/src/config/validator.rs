use super::schema::VoxmuxConfig;
use crate::error::ConfigError;

/// Upper bound on `scheduler.request_timeout_secs` (one day)
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 86_400;

pub fn validate_config(config: &VoxmuxConfig) -> Result<(), ConfigError> {
    validate_routing(config)?;
    validate_scheduler(config)?;
    validate_cache(config)?;

    if config.health.failure_threshold == 0 {
        return Err(ConfigError::ValidationError(
            "health.failure_threshold must be at least 1".to_string(),
        ));
    }
    if config.limits.max_text_chars == 0 {
        return Err(ConfigError::ValidationError(
            "limits.max_text_chars must be at least 1".to_string(),
        ));
    }
    for (name, overrides) in &config.backends {
        if overrides.max_concurrency == Some(0) {
            return Err(ConfigError::ValidationError(format!(
                "backends.{name}.max_concurrency must be at least 1"
            )));
        }
    }
    Ok(())
}

fn validate_routing(config: &VoxmuxConfig) -> Result<(), ConfigError> {
    let routing = &config.routing;
    if routing.primary_backend.trim().is_empty() {
        return Err(ConfigError::MissingField(
            "routing.primary_backend".to_string(),
        ));
    }

    let mut order = vec![routing.primary_backend.clone()];
    order.extend(routing.fallback_backends.iter().cloned());
    ensure_unique("routing.fallback_backends", &order)?;

    for (tier, list) in &routing.tier_priorities {
        if list.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "routing.tier_priorities.{tier} cannot be empty"
            )));
        }
        ensure_unique(&format!("routing.tier_priorities.{tier}"), list)?;
    }
    Ok(())
}

fn ensure_unique(field: &str, names: &[String]) -> Result<(), ConfigError> {
    for (i, name) in names.iter().enumerate() {
        if name.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{field} contains an empty backend name"
            )));
        }
        if names[..i].contains(name) {
            return Err(ConfigError::ValidationError(format!(
                "{field} lists backend '{name}' more than once"
            )));
        }
    }
    Ok(())
}

fn validate_scheduler(config: &VoxmuxConfig) -> Result<(), ConfigError> {
    let scheduler = &config.scheduler;
    if scheduler.max_concurrency_per_backend == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.max_concurrency_per_backend must be at least 1".to_string(),
        ));
    }
    if scheduler.max_retry_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.max_retry_attempts must be at least 1".to_string(),
        ));
    }
    if scheduler.request_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.request_timeout_secs must be non-zero".to_string(),
        ));
    }
    if scheduler.request_timeout_secs > MAX_REQUEST_TIMEOUT_SECS {
        return Err(ConfigError::ValidationError(format!(
            "scheduler.request_timeout_secs must be at most {MAX_REQUEST_TIMEOUT_SECS}"
        )));
    }
    if scheduler.cancel_grace_ms == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.cancel_grace_ms must be non-zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_cache(config: &VoxmuxConfig) -> Result<(), ConfigError> {
    let cache = &config.cache;
    if cache.ttl_seconds == 0 {
        return Err(ConfigError::ValidationError(
            "cache.ttl_seconds must be at least 1".to_string(),
        ));
    }
    if cache.max_size_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "cache.max_size_bytes must be at least 1".to_string(),
        ));
    }
    if cache.directory.as_os_str().is_empty() {
        return Err(ConfigError::MissingField("cache.directory".to_string()));
    }
    Ok(())
}
