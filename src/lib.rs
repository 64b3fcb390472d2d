//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (`core-runtime`, `core-pipeline`). Host applications can
//! depend on `audio-pipeline-workspace` and enable the documented features
//! without wiring each crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_pipeline as pipeline;
#[cfg(feature = "desktop-shims")]
pub use core_runtime as runtime;
