//! # Desktop Bridge Implementations
//!
//! Default implementations of the audio bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `AudioFileOpener` using symphonia's demuxers (local paths and `file://` URLs)
//! - `StreamParserFactory` with an incremental RIFF/WAVE parser
//! - `ConverterFactory` that re-encodes PCM/G.711 directly and decodes
//!   compressed formats with symphonia
//! - `ByteSource` over any `std::io::Read`
//!
//! ## Feature Flags
//!
//! - `symphonia-backend`: Enable the symphonia file opener and decoders (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DesktopConverterFactory, SymphoniaFileOpener, WaveStreamParserFactory};
//! use core_runtime::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .file_opener(Arc::new(SymphoniaFileOpener::new()))
//!     .stream_parsers(Arc::new(WaveStreamParserFactory::new()))
//!     .converters(Arc::new(DesktopConverterFactory::new()))
//!     .build()?;
//! ```

mod converters;
mod filesystem;
mod pcm;
mod sample_converter;
mod wave;

#[cfg(feature = "symphonia-backend")]
mod format_detector;
#[cfg(feature = "symphonia-backend")]
mod symphonia_converter;
#[cfg(feature = "symphonia-backend")]
mod symphonia_file;

pub use converters::DesktopConverterFactory;
pub use filesystem::{resolve_locator, ReaderByteSource};
pub use pcm::PcmConverter;
pub use sample_converter::{PcmLayout, SampleEncoding};
pub use wave::{WaveStreamParser, WaveStreamParserFactory};

#[cfg(feature = "symphonia-backend")]
pub use format_detector::FormatDetector;
#[cfg(feature = "symphonia-backend")]
pub use symphonia_converter::SymphoniaConverter;
#[cfg(feature = "symphonia-backend")]
pub use symphonia_file::{SymphoniaAudioFile, SymphoniaFileOpener};
