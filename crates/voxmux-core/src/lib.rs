//! # voxmux core
//!
//! Request orchestration for text-to-speech: a single entry point that accepts
//! synthesis requests, serves repeats from a content-addressed cache, collapses
//! identical in-flight requests into one synthesis, picks a backend by health
//! and load, and bounds the concurrency of every backend.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use voxmux_core::{Orchestrator, SynthesisRequest};
//!
//! async fn run(edge: voxmux_speech::SharedBackend) -> voxmux_core::Result<()> {
//!     let orchestrator = Orchestrator::builder()
//!         .backend(edge)
//!         .build()
//!         .await
//!         .expect("valid configuration");
//!
//!     let outcome = orchestrator
//!         .synthesize(SynthesisRequest::new("Hello there", "en-US-1"))
//!         .await?;
//!     println!("{} bytes from '{}'", outcome.audio.len(), outcome.backend);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod registry;
pub mod request;
pub mod scheduler;
pub mod selector;
pub mod single_flight;
pub mod stats;

pub use cache::{CacheKey, CacheStats, CacheStore};
pub use config::{VoxmuxConfig, parse_yaml_file, parse_yaml_str, validate_config};
pub use error::{BuildError, CacheError, ConfigError, Result, SynthesisError};
pub use events::OrchestratorEvent;
pub use orchestrator::{Orchestrator, OrchestratorBuilder, RequestState, SynthesisOutcome};
pub use registry::{BackendDescriptor, BackendRegistry, RegistrySnapshot};
pub use request::{Priority, RequestLimits, SynthesisRequest};
pub use stats::{BackendStatus, OrchestratorStats};
