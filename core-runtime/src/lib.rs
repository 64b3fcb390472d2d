//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the audio pipeline:
//! - Logging and tracing infrastructure
//! - Configuration management and capability wiring
//!
//! ## Overview
//!
//! This crate contains the ambient utilities the pipeline crates depend on.
//! It establishes the logging conventions (`tracing` with an optional host
//! [`LoggerSink`](bridge_traits::LoggerSink)) and the fail-fast
//! [`CoreConfig`](config::CoreConfig) that hands backends to the pipeline.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, PipelineConfig};
pub use error::{Error, Result};
