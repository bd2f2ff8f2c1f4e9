use serde::Serialize;
use serde::ser::SerializeStruct;
use std::time::Duration;
use thiserror::Error;

/// Caller-facing synthesis errors
///
/// `Clone` so a single outcome can be delivered to every request joined to the
/// same in-flight key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    /// Malformed or oversized request, rejected before any cache or registry access
    #[error("Validation error: {0}")]
    Validation(String),

    /// No enabled and healthy backend qualifies for the request
    #[error("No backend available")]
    NoBackendAvailable,

    /// Backend queue is at capacity
    #[error("Queue full for backend '{backend}'")]
    QueueFull { backend: String },

    /// Every attempt failed with a backend error
    #[error("Service unavailable after {attempts} attempt(s): {last_error}")]
    ServiceUnavailable { attempts: u32, last_error: String },

    /// Request deadline exceeded
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Caller cancelled the request
    #[error("Request cancelled")]
    Cancelled,
}

impl SynthesisError {
    /// Short stable label, used for statistics and events
    pub fn kind(&self) -> &'static str {
        match self {
            SynthesisError::Validation(_) => "validation",
            SynthesisError::NoBackendAvailable => "no_backend_available",
            SynthesisError::QueueFull { .. } => "queue_full",
            SynthesisError::ServiceUnavailable { .. } => "service_unavailable",
            SynthesisError::Timeout(_) => "timeout",
            SynthesisError::Cancelled => "cancelled",
        }
    }
}

impl Serialize for SynthesisError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("SynthesisError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Cache storage failures. Never surfaced to synthesis callers.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache entry is corrupt: {0}")]
    Corrupt(String),

    #[error("Cache entry of {size} bytes exceeds the {max} byte bound")]
    EntryTooLarge { size: u64, max: u64 },

    #[error("Cache lock poisoned")]
    Poisoned,
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Corrupt(err.to_string())
    }
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Errors raised while assembling an orchestrator
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Duplicate backend name: {0}")]
    DuplicateBackend(String),

    #[error("No backends registered")]
    NoBackends,
}

pub type Result<T> = std::result::Result<T, SynthesisError>;
