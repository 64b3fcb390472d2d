//! # Core Configuration Module
//!
//! Provides configuration management for the audio pipeline.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance holding the backend capabilities and buffer tunables the pipeline
//! needs. It enforces fail-fast validation so a missing backend is reported
//! when the configuration is built, not when the first file is opened.
//!
//! ## Required Capabilities
//!
//! - `AudioFileOpener` - Random-access file backend
//! - `StreamParserFactory` - Push-fed stream parsing backend
//! - `ConverterFactory` - Format conversion backend
//!
//! ## Optional Capabilities
//!
//! - `LoggerSink` - Mirror pipeline logs into the host logger
//!
//! When the `desktop-shims` feature is enabled, the `bridge-desktop`
//! implementations are injected for every required capability that was not
//! provided.
//!
//! ## Usage
//!
//! ### Basic Configuration with Desktop Defaults
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .buffer_size(256 * 1024)
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ### Configuration with Custom Backends
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .file_opener(Arc::new(MyFileOpener))
//!     .stream_parsers(Arc::new(MyParserFactory))
//!     .converters(Arc::new(MyConverterFactory))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{AudioFileOpener, ConverterFactory, LoggerSink, StreamParserFactory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Environment variable overriding [`PipelineConfig::buffer_size`], in KiB.
pub const BUFFER_SIZE_ENV: &str = "AUDIO_PIPELINE_BUFFER_SIZE_KB";

// ============================================================================
// Pipeline Configuration
// ============================================================================

/// Buffer sizing for pipeline streams.
///
/// # Example
///
/// ```
/// use core_runtime::config::PipelineConfig;
///
/// let config = PipelineConfig::default();
/// assert_eq!(config.buffer_size, 1024 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Capacity of each stream's shared buffer in bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Bytes requested from a byte source per push-fed read.
    #[serde(default = "default_stream_read_chunk")]
    pub stream_read_chunk: usize,

    /// Bytes peeked from a byte source to probe its format.
    #[serde(default = "default_probe_bytes")]
    pub probe_bytes: usize,

    /// Number of format summaries kept by the file reader cache.
    #[serde(default = "default_format_cache_entries")]
    pub format_cache_entries: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            stream_read_chunk: default_stream_read_chunk(),
            probe_bytes: default_probe_bytes(),
            format_cache_entries: default_format_cache_entries(),
        }
    }
}

impl PipelineConfig {
    /// Small buffers for interactive playback.
    pub fn low_latency() -> Self {
        Self {
            buffer_size: 64 * 1024,
            stream_read_chunk: 2 * 1024,
            ..Default::default()
        }
    }

    /// Large buffers for offline transcoding.
    pub fn high_throughput() -> Self {
        Self {
            buffer_size: 4 * 1024 * 1024,
            stream_read_chunk: 64 * 1024,
            ..Default::default()
        }
    }

    /// Defaults with the buffer size taken from [`BUFFER_SIZE_ENV`] when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = std::env::var(BUFFER_SIZE_ENV) {
            config.apply_buffer_size_kb(&value);
        }
        config
    }

    /// Apply a buffer size given in KiB. Invalid or zero values are ignored.
    pub fn apply_buffer_size_kb(&mut self, value: &str) {
        match value.trim().parse::<usize>() {
            Ok(kb) if kb > 0 => self.buffer_size = kb * 1024,
            _ => warn!(value, "Ignoring invalid {}", BUFFER_SIZE_ENV),
        }
    }

    /// Parse a configuration from JSON; missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid pipeline config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::Config("buffer_size must be > 0".to_string()));
        }

        if self.stream_read_chunk == 0 {
            return Err(Error::Config("stream_read_chunk must be > 0".to_string()));
        }

        if self.probe_bytes == 0 {
            return Err(Error::Config("probe_bytes must be > 0".to_string()));
        }

        if self.format_cache_entries == 0 {
            return Err(Error::Config(
                "format_cache_entries must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_buffer_size() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_stream_read_chunk() -> usize {
    4 * 1024
}

fn default_probe_bytes() -> usize {
    32 * 1024
}

fn default_format_cache_entries() -> usize {
    20
}

// ============================================================================
// Core Configuration
// ============================================================================

/// Core configuration for the audio pipeline.
///
/// This struct holds the backend capabilities and settings the pipeline
/// needs. Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Random-access file backend
    pub file_opener: Arc<dyn AudioFileOpener>,

    /// Push-fed stream parsing backend
    pub stream_parsers: Arc<dyn StreamParserFactory>,

    /// Format conversion backend
    pub converters: Arc<dyn ConverterFactory>,

    /// Host logger (optional)
    pub logger_sink: Option<Arc<dyn LoggerSink>>,

    /// Buffer tunables
    pub pipeline: PipelineConfig,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("file_opener", &"AudioFileOpener { ... }")
            .field("stream_parsers", &"StreamParserFactory { ... }")
            .field("converters", &"ConverterFactory { ... }")
            .field(
                "logger_sink",
                &self.logger_sink.as_ref().map(|_| "LoggerSink { ... }"),
            )
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn capability_missing(capability: &str, purpose: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is required for {}. \
             Desktop: ensure the 'desktop-shims' feature is enabled to use the bridge-desktop default. \
             Other hosts: inject a platform-native implementation.",
            capability, purpose
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_opener() -> Result<Arc<dyn AudioFileOpener>> {
    use bridge_desktop::SymphoniaFileOpener;

    let opener: Arc<dyn AudioFileOpener> = Arc::new(SymphoniaFileOpener::new());
    Ok(opener)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_opener() -> Result<Arc<dyn AudioFileOpener>> {
    Err(capability_missing("AudioFileOpener", "random-access file reads"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_stream_parsers() -> Result<Arc<dyn StreamParserFactory>> {
    use bridge_desktop::WaveStreamParserFactory;

    let parsers: Arc<dyn StreamParserFactory> = Arc::new(WaveStreamParserFactory::new());
    Ok(parsers)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_stream_parsers() -> Result<Arc<dyn StreamParserFactory>> {
    Err(capability_missing("StreamParserFactory", "push-fed stream parsing"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_converters() -> Result<Arc<dyn ConverterFactory>> {
    use bridge_desktop::DesktopConverterFactory;

    let converters: Arc<dyn ConverterFactory> = Arc::new(DesktopConverterFactory::new());
    Ok(converters)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_converters() -> Result<Arc<dyn ConverterFactory>> {
    Err(capability_missing("ConverterFactory", "format conversion"))
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Use this builder to incrementally set configuration options and then
/// call [`build`](Self::build) to validate and create the configuration.
#[derive(Default)]
pub struct CoreConfigBuilder {
    file_opener: Option<Arc<dyn AudioFileOpener>>,
    stream_parsers: Option<Arc<dyn StreamParserFactory>>,
    converters: Option<Arc<dyn ConverterFactory>>,
    logger_sink: Option<Arc<dyn LoggerSink>>,
    pipeline: Option<PipelineConfig>,
    buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the random-access file backend.
    pub fn file_opener(mut self, opener: Arc<dyn AudioFileOpener>) -> Self {
        self.file_opener = Some(opener);
        self
    }

    /// Sets the push-fed stream parsing backend.
    pub fn stream_parsers(mut self, parsers: Arc<dyn StreamParserFactory>) -> Self {
        self.stream_parsers = Some(parsers);
        self
    }

    /// Sets the conversion backend.
    pub fn converters(mut self, converters: Arc<dyn ConverterFactory>) -> Self {
        self.converters = Some(converters);
        self
    }

    /// Sets the host logger sink (optional).
    pub fn logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    /// Replaces the buffer tunables.
    ///
    /// Default: [`PipelineConfig::from_env`]
    pub fn pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Overrides only the shared buffer capacity in bytes.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .buffer_size(512 * 1024);
    /// ```
    pub fn buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = Some(bytes);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapabilityMissing`] if a required backend was not
    /// provided and no platform default is available, and
    /// [`Error::Config`] if a tunable is invalid.
    pub fn build(self) -> Result<CoreConfig> {
        let file_opener = match self.file_opener {
            Some(opener) => opener,
            None => provide_default_file_opener()?,
        };

        let stream_parsers = match self.stream_parsers {
            Some(parsers) => parsers,
            None => provide_default_stream_parsers()?,
        };

        let converters = match self.converters {
            Some(converters) => converters,
            None => provide_default_converters()?,
        };

        let mut pipeline = self.pipeline.unwrap_or_else(PipelineConfig::from_env);
        if let Some(bytes) = self.buffer_size {
            pipeline.buffer_size = bytes;
        }

        let config = CoreConfig {
            file_opener,
            stream_parsers,
            converters,
            logger_sink: self.logger_sink,
            pipeline,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pipeline_config() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer_size, 1024 * 1024);
        assert_eq!(config.stream_read_chunk, 4096);
        assert_eq!(config.probe_bytes, 32 * 1024);
        assert_eq!(config.format_cache_entries, 20);
    }

    #[test]
    fn test_presets() {
        let low = PipelineConfig::low_latency();
        let high = PipelineConfig::high_throughput();
        assert!(low.validate().is_ok());
        assert!(high.validate().is_ok());
        assert!(low.buffer_size < PipelineConfig::default().buffer_size);
        assert!(high.buffer_size > PipelineConfig::default().buffer_size);
    }

    #[test]
    fn test_buffer_size_override() {
        let mut config = PipelineConfig::default();
        config.apply_buffer_size_kb("256");
        assert_eq!(config.buffer_size, 256 * 1024);

        config.apply_buffer_size_kb("not-a-number");
        assert_eq!(config.buffer_size, 256 * 1024);

        config.apply_buffer_size_kb("0");
        assert_eq!(config.buffer_size, 256 * 1024);
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = PipelineConfig::from_json(r#"{ "buffer_size": 8192 }"#).unwrap();
        assert_eq!(config.buffer_size, 8192);
        assert_eq!(config.stream_read_chunk, 4096);

        assert!(PipelineConfig::from_json(r#"{ "buffer_size": 0 }"#).is_err());
        assert!(PipelineConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = PipelineConfig::default();
        assert!(config.validate().is_ok());

        config.buffer_size = 0;
        assert!(config.validate().is_err());
        config.buffer_size = 1024;

        config.stream_read_chunk = 0;
        assert!(config.validate().is_err());
    }
}
