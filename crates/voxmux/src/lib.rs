// Re-export for convenience
pub use async_trait::async_trait;
pub use voxmux_core::{self as core, error as core_error};
pub use voxmux_speech::{self as speech, error as speech_error};
pub mod prelude;

#[inline]
/// Initialize logging using env_logger if the "logging" feature is enabled.
/// This is a no-op if the feature is not enabled.
pub fn init_logging() {
    #[cfg(feature = "logging")]
    {
        let _ = env_logger::try_init();
    }
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use std::sync::Arc;
    use voxmux_test_utils::MockBackend;

    #[tokio::test]
    async fn test_prelude_covers_a_round_trip() {
        init_logging();
        let orchestrator = Orchestrator::builder()
            .backend(Arc::new(MockBackend::new("edge")) as SharedBackend)
            .without_background_tasks()
            .build()
            .await
            .unwrap();

        let outcome = orchestrator
            .synthesize(SynthesisRequest::new("Hello", "v1").with_quality(QualityTier::High))
            .await
            .unwrap();
        assert_eq!(outcome.backend, "edge");
        assert!(!outcome.cached);
    }
}
