//! Backend implementations shipped with the crate.
//!
//! Real engines live in their own crates; this module only carries the
//! deterministic reference backend used by the CLI and demos.

#[cfg(feature = "tone")]
pub mod tone;
