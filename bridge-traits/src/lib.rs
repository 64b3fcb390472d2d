//! # Host Bridge Traits
//!
//! Capability interfaces the audio pipeline calls into, plus the format
//! types shared across that boundary.
//!
//! ## Overview
//!
//! The pipeline core never decodes, demuxes or touches the filesystem. Each
//! of those jobs is a black-box capability supplied by the host (or by the
//! `bridge-desktop` defaults):
//!
//! ### Sources
//! - [`AudioFileOpener`](audio_file::AudioFileOpener) /
//!   [`AudioFileService`](audio_file::AudioFileService) - random-access,
//!   packet-indexed reads of a complete file
//! - [`StreamParserFactory`](audio_stream::StreamParserFactory) /
//!   [`AudioStreamParser`](audio_stream::AudioStreamParser) - incremental
//!   parsing of pushed bytes with property discovery
//! - [`ByteSource`](io::ByteSource) - raw bytes for push-fed streams
//!
//! ### Conversion
//! - [`ConverterFactory`](converter::ConverterFactory) /
//!   [`AudioConverter`](converter::AudioConverter) - demand-driven format
//!   conversion through the [`ConverterInput`](converter::ConverterInput)
//!   callback
//!
//! ### Utilities
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with a descriptive error when a required capability
//! is missing:
//!
//! ```ignore
//! let opener = config.file_opener
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "AudioFileOpener".to_string(),
//!         message: "No file backend provided. \
//!                  Desktop: enable the desktop-shims feature.".to_string(),
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! All capabilities report [`BridgeError`](error::BridgeError). Backend
//! failures carry a [`StatusCode`](error::StatusCode) that the core keeps
//! when it wraps the error, so hosts see `"<message> (<code>)"`.
//!
//! ## Thread Safety
//!
//! Factories are `Send + Sync` so one configuration can be shared. Opened
//! files, parsers and converters are only `Send`: a pipeline is driven by
//! one thread at a time.

pub mod audio_file;
pub mod audio_stream;
pub mod converter;
pub mod error;
pub mod format;
pub mod io;
pub mod logging;
pub mod platform;

pub use error::{BridgeError, StatusCode};

// Re-export commonly used types
pub use audio_file::{AudioFileOpener, AudioFileService, PacketRead};
pub use audio_stream::{AudioStreamParser, StreamParserFactory, StreamParserListener, StreamProperty};
pub use converter::{AudioConverter, ConverterFactory, ConverterInput, InputPackets};
pub use format::{
    FileTypeHint, FormatFlags, FormatTag, FramePacketTranslation, PacketDescriptor, StreamFormat,
};
pub use io::ByteSource;
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
