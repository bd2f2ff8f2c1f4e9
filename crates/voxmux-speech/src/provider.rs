use crate::error::BackendResult;
use crate::types::{AudioFormat, HealthStatus, SynthesisOptions, SynthesizedAudio, VoiceInfo};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Capability interface every synthesis engine implements
///
/// The orchestrator only talks to engines through this trait, so cloud APIs,
/// local models and test fakes are interchangeable.
#[async_trait]
pub trait TTSBackend: Send + Sync {
    /// Stable backend name used in configuration and routing
    fn name(&self) -> &str;

    /// Prepare the backend for use (required)
    ///
    /// Called once at startup. A failure leaves the backend registered but unhealthy.
    async fn initialize(&self) -> BackendResult<()>;

    /// Synthesize `text` with `voice_id` (required)
    ///
    /// # Arguments
    /// * `text` - Validated, trimmed input text
    /// * `voice_id` - Voice identifier, as listed by `list_voices`
    /// * `options` - Quality, format and sample rate
    /// * `cancel` - Cooperative cancellation signal; implementations should return
    ///   `BackendError::Cancelled` promptly once it fires
    ///
    /// # Returns
    /// Encoded audio and its metadata
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        options: &SynthesisOptions,
        cancel: CancellationToken,
    ) -> BackendResult<SynthesizedAudio>;

    /// List voices served by this backend (required)
    async fn list_voices(&self) -> BackendResult<Vec<VoiceInfo>>;

    /// Probe whether the backend can currently serve requests (required)
    async fn health_check(&self) -> HealthStatus;

    /// Release backend resources (optional)
    async fn shutdown(&self) -> BackendResult<()> {
        Ok(())
    }

    /// Get supported audio formats (default: WAV only)
    fn supported_formats(&self) -> Vec<AudioFormat> {
        vec![AudioFormat::Wav]
    }
}

/// Shared handle to a backend
pub type SharedBackend = Arc<dyn TTSBackend>;
