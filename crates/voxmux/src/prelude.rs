//! voxmux prelude: the types needed to configure and drive an orchestrator.

// Orchestration
pub use crate::core::orchestrator::{
    Orchestrator, OrchestratorBuilder, RequestState, SynthesisOutcome,
};
pub use crate::core::request::{Priority, RequestLimits, SynthesisRequest};

// Configuration
pub use crate::core::config::{VoxmuxConfig, parse_yaml_file, parse_yaml_str};

// Cache
pub use crate::core::cache::{CacheBackend, CacheKey, CacheStats};

// Observability
pub use crate::core::events::OrchestratorEvent;
pub use crate::core::stats::{BackendStatus, OrchestratorStats};

// Errors
pub use crate::core::error::{BuildError, SynthesisError};

// Backend abstractions
pub use crate::speech::{
    AudioFormat, BackendError, CancellationToken, HealthStatus, QualityTier, SharedBackend,
    SynthesisOptions, SynthesizedAudio, TTSBackend, VoiceInfo,
};
#[cfg(feature = "tone")]
pub use crate::speech::providers::tone::ToneBackend;

// Utils
pub use crate::init_logging;
