//! # Pull Sources
//!
//! Anything that can write the next chunk of encoded bytes into a
//! [`SharedBuffer`] on demand.
//!
//! ## Variants
//!
//! - [`RandomAccessSource`] - a complete file with a packet index; format and
//!   packet count are known at open and the source can seek
//! - [`PushFedSource`] - bytes arrive from outside; the format is discovered
//!   while parsing and the source cannot seek
//! - [`TranscodeEngine`] - converts another stream it owns
//!
//! [`PipelineSource`] is the tagged union the host adapter holds. Every
//! variant implements [`PullSource`], so the transcode engine treats its
//! upstream uniformly while seeking only ever reaches a random-access source.

mod push_fed;
mod random_access;

pub use push_fed::{PrefixedByteSource, PushFedSource};
pub use random_access::RandomAccessSource;

use bridge_traits::{FramePacketTranslation, PacketDescriptor, StreamFormat};
use bytes::Bytes;

use crate::buffer::SharedBuffer;
use crate::error::Result;
use crate::position::PositionState;
use crate::transcode::TranscodeEngine;

/// Codec initialization data ("magic cookie") owned by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidebandConfig(Bytes);

impl SidebandConfig {
    pub fn new(bytes: Bytes) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The pull contract shared by every source.
///
/// At most one `fill` may be in flight per source; callers serialize access.
pub trait PullSource {
    /// Format of the produced bytes, or `None` while still undiscovered.
    fn format(&self) -> Option<&StreamFormat>;

    /// Codec initialization data, if the source carries any.
    fn cookie(&self) -> Option<&SidebandConfig>;

    /// Total packets, when known.
    fn packet_count(&self) -> Option<u64>;

    /// Overwrite `buffer` with the next chunk and set its window to
    /// `(0, bytes_written)`.
    ///
    /// Returns the bytes written; zero means end of stream, which is not an
    /// error and is returned again on every later call.
    fn fill(&mut self, buffer: &mut SharedBuffer) -> Result<usize>;

    fn position(&self) -> &PositionState;

    /// Descriptors for the packets of the most recent fill (VBR only).
    fn descriptors(&self) -> Option<&[PacketDescriptor]>;

    fn is_seekable(&self) -> bool;

    /// Ask the backend which packet holds `frame`.
    fn frame_to_packet(&self, frame: i64) -> Result<FramePacketTranslation>;

    /// Reposition to `packet`; the next fill starts there.
    fn seek_to_packet(&mut self, packet: i64, frame_offset_in_packet: u32) -> Result<()>;

    /// Return and clear the frame offset recorded by the last seek.
    fn take_frame_offset(&mut self) -> u32;

    /// Total frames, when the packet count and packet layout are known.
    fn frame_count(&self) -> Option<i64> {
        let format = self.format()?;
        let packets = self.packet_count()?;
        Some(packets as i64 * format.frames_per_packet as i64)
    }

    /// Release backend resources. Safe to call more than once.
    fn close(&mut self) -> Result<()>;
}

/// Which kind of source a [`PipelineSource`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    RandomAccess,
    PushFed,
    Converter,
}

/// Tagged union over the source variants.
pub enum PipelineSource {
    RandomAccess(RandomAccessSource),
    PushFed(PushFedSource),
    Converter(Box<TranscodeEngine>),
}

impl PipelineSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::RandomAccess(_) => SourceKind::RandomAccess,
            Self::PushFed(_) => SourceKind::PushFed,
            Self::Converter(_) => SourceKind::Converter,
        }
    }

    fn inner(&self) -> &dyn PullSource {
        match self {
            Self::RandomAccess(source) => source,
            Self::PushFed(source) => source,
            Self::Converter(engine) => engine.as_ref(),
        }
    }

    fn inner_mut(&mut self) -> &mut dyn PullSource {
        match self {
            Self::RandomAccess(source) => source,
            Self::PushFed(source) => source,
            Self::Converter(engine) => engine.as_mut(),
        }
    }
}

impl PullSource for PipelineSource {
    fn format(&self) -> Option<&StreamFormat> {
        self.inner().format()
    }

    fn cookie(&self) -> Option<&SidebandConfig> {
        self.inner().cookie()
    }

    fn packet_count(&self) -> Option<u64> {
        self.inner().packet_count()
    }

    fn fill(&mut self, buffer: &mut SharedBuffer) -> Result<usize> {
        self.inner_mut().fill(buffer)
    }

    fn position(&self) -> &PositionState {
        self.inner().position()
    }

    fn descriptors(&self) -> Option<&[PacketDescriptor]> {
        self.inner().descriptors()
    }

    fn is_seekable(&self) -> bool {
        self.inner().is_seekable()
    }

    fn frame_to_packet(&self, frame: i64) -> Result<FramePacketTranslation> {
        self.inner().frame_to_packet(frame)
    }

    fn seek_to_packet(&mut self, packet: i64, frame_offset_in_packet: u32) -> Result<()> {
        self.inner_mut().seek_to_packet(packet, frame_offset_in_packet)
    }

    fn take_frame_offset(&mut self) -> u32 {
        self.inner_mut().take_frame_offset()
    }

    fn frame_count(&self) -> Option<i64> {
        self.inner().frame_count()
    }

    fn close(&mut self) -> Result<()> {
        self.inner_mut().close()
    }
}

impl From<RandomAccessSource> for PipelineSource {
    fn from(source: RandomAccessSource) -> Self {
        Self::RandomAccess(source)
    }
}

impl From<PushFedSource> for PipelineSource {
    fn from(source: PushFedSource) -> Self {
        Self::PushFed(source)
    }
}

impl From<TranscodeEngine> for PipelineSource {
    fn from(engine: TranscodeEngine) -> Self {
        Self::Converter(Box::new(engine))
    }
}
