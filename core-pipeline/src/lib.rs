//! # Audio Pull-Pipeline
//!
//! Demand-driven pipeline that turns audio files or pushed byte streams into
//! buffers of encoded packets, and optionally converts them to PCM.
//!
//! ## Overview
//!
//! This module handles:
//! - Random-access and push-fed packet sources over host capabilities
//! - Packet framing for variable-bitrate data
//! - Format probing and host-visible format summaries
//! - Format conversion through a converter backend
//! - Time-based seeking with converter reset
//! - A `std::io::Read` adapter and host providers with a probe cache

pub mod buffer;
pub mod error;
pub mod format;
pub mod framer;
pub mod position;
pub mod provider;
pub mod seek;
pub mod source;
pub mod stream;
pub mod transcode;

pub use buffer::SharedBuffer;
pub use error::{ErrorCategory, PipelineError, Result};
pub use format::{FileFormatSummary, FormatNegotiator};
pub use framer::PacketFramer;
pub use position::PositionState;
pub use provider::{AudioFileReader, FormatConversionProvider, TargetEncoding};
pub use seek::SeekCoordinator;
pub use source::{PipelineSource, PullSource, PushFedSource, RandomAccessSource, SidebandConfig};
pub use stream::PipelineStream;
pub use transcode::{EngineState, TargetFormat, TranscodeEngine, NOT_SPECIFIED};
