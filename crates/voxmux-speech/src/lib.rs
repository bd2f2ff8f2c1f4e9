//! # voxmux speech
//!
//! Synthesis backend abstractions for the voxmux orchestrator.
//!
//! Every engine (cloud API, local model, test fake) implements [`TTSBackend`], a
//! fixed capability interface, so the orchestrator can route, queue and retry
//! across backends without knowing what is behind them.
//!
//! ## Features
//!
//! - `tone`: deterministic sine-wave WAV backend used by the CLI and demos
//!
//! ## Example
//!
//! ```rust,ignore
//! use voxmux_speech::{SynthesisOptions, TTSBackend};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn speak(backend: &dyn TTSBackend, text: &str) {
//!     let audio = backend
//!         .synthesize(text, "v1", &SynthesisOptions::default(), CancellationToken::new())
//!         .await
//!         .unwrap();
//!     println!("{} bytes, {} ms", audio.metadata.size_bytes, audio.metadata.duration_ms);
//! }
//! ```

pub mod error;
mod provider;
pub mod types;

// Backend implementations
pub mod providers;

pub use error::{BackendError, BackendResult};
pub use provider::{SharedBackend, TTSBackend};
pub use types::{
    AudioFormat, AudioMetadata, HealthStatus, QualityTier, SynthesisOptions, SynthesizedAudio,
    VoiceInfo,
};

// Cancellation signal type used in the backend contract
pub use tokio_util::sync::CancellationToken;
