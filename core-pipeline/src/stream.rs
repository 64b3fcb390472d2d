//! # Pipeline Stream
//!
//! Host-facing handle over a [`PipelineSource`] and the [`SharedBuffer`] it
//! fills. Implements [`std::io::Read`], so a pipeline can be consumed like
//! any other byte stream.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::io::Read;
//! use core_pipeline::{PipelineStream, TargetFormat};
//!
//! let stream = PipelineStream::open_random_access(opener.as_ref(), "song.m4a", hint, &config)?;
//! let target = TargetFormat::pcm_signed(44100.0, 2, 16, false);
//! let mut pcm = stream.convert(converters, &target, config.buffer_size)?;
//!
//! let mut bytes = Vec::new();
//! pcm.read_to_end(&mut bytes)?;
//! ```

use std::io::{self, Read};
use std::sync::Arc;
use std::time::Duration;

use bridge_traits::{
    AudioFileOpener, ByteSource, ConverterFactory, FileTypeHint, FramePacketTranslation,
    InputPackets, PacketDescriptor, StatusCode, StreamFormat, StreamParserFactory,
};
use core_runtime::config::PipelineConfig;
use tracing::{debug, trace};

use crate::buffer::SharedBuffer;
use crate::error::{PipelineError, Result};
use crate::format::{FileFormatSummary, FormatNegotiator};
use crate::seek::SeekCoordinator;
use crate::source::{PipelineSource, PullSource, PushFedSource, RandomAccessSource, SidebandConfig};
use crate::transcode::{TargetFormat, TranscodeEngine};

/// A pull source paired with its output buffer.
pub struct PipelineStream {
    source: PipelineSource,
    buffer: SharedBuffer,
    /// Rebased descriptors for a partially consumed VBR buffer.
    handoff: Vec<PacketDescriptor>,
    frame_position: Option<i64>,
    closed: bool,
}

impl PipelineStream {
    pub fn new(source: PipelineSource, buffer_capacity: usize) -> Self {
        Self {
            source,
            buffer: SharedBuffer::new(buffer_capacity),
            handoff: Vec::new(),
            frame_position: None,
            closed: false,
        }
    }

    /// Open a seekable stream over a complete file.
    pub fn open_random_access(
        opener: &dyn AudioFileOpener,
        locator: &str,
        hint: FileTypeHint,
        config: &PipelineConfig,
    ) -> Result<Self> {
        let source = RandomAccessSource::open(opener, locator, hint, config.buffer_size)?;
        Ok(Self::new(source.into(), config.buffer_size))
    }

    /// Open a stream that pulls container bytes from `bytes`.
    pub fn open_push_fed(
        parsers: &dyn StreamParserFactory,
        bytes: Box<dyn ByteSource>,
        hint: FileTypeHint,
        config: &PipelineConfig,
    ) -> Result<Self> {
        let source = PushFedSource::open(parsers, hint, Some(bytes), config.stream_read_chunk)?;
        Ok(Self::new(source.into(), config.buffer_size))
    }

    /// Open a stream the host feeds through [`parse`](Self::parse).
    pub fn open_parser(
        parsers: &dyn StreamParserFactory,
        hint: FileTypeHint,
        config: &PipelineConfig,
    ) -> Result<Self> {
        let source = PushFedSource::open(parsers, hint, None, config.stream_read_chunk)?;
        Ok(Self::new(source.into(), config.buffer_size))
    }

    /// Wrap this stream in a converter producing `target`.
    pub fn convert(
        self,
        converters: Arc<dyn ConverterFactory>,
        target: &TargetFormat,
        buffer_capacity: usize,
    ) -> Result<PipelineStream> {
        let mut engine = TranscodeEngine::new(converters);
        engine.configure(target, self)?;
        Ok(Self::new(engine.into(), buffer_capacity))
    }

    /// Push `raw` container bytes into a push-fed stream.
    pub fn parse(&mut self, raw: &[u8]) -> Result<()> {
        self.ensure_open()?;
        match &mut self.source {
            PipelineSource::PushFed(source) => source.parse(raw, &mut self.buffer),
            _ => Err(PipelineError::Unsupported(
                "Only push-fed streams accept raw bytes".to_string(),
            )),
        }
    }

    pub fn source(&self) -> &PipelineSource {
        &self.source
    }

    pub fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    pub fn format(&self) -> Option<&StreamFormat> {
        self.source.format()
    }

    pub fn cookie(&self) -> Option<&SidebandConfig> {
        self.source.cookie()
    }

    /// Refill the buffer from the source.
    ///
    /// Returns the bytes written; zero at end of stream.
    pub fn fill_buffer(&mut self) -> Result<usize> {
        self.ensure_open()?;
        let written = self.source.fill(&mut self.buffer)?;
        trace!(written, "Filled buffer");
        Ok(written)
    }

    /// Seek to `offset` from the start of the stream.
    pub fn seek(&mut self, offset: Duration) -> Result<FramePacketTranslation> {
        let micros = i64::try_from(offset.as_micros()).map_err(|_| {
            PipelineError::seek("Seek time out of range", StatusCode::INVALID_PACKET_OFFSET)
        })?;
        self.seek_micros(micros)
    }

    /// Seek to `micros` from the start of the stream. Buffered bytes are
    /// discarded.
    pub fn seek_micros(&mut self, micros: i64) -> Result<FramePacketTranslation> {
        self.ensure_open()?;
        let translation = SeekCoordinator::seek_to_time(&mut self.source, micros)?;

        self.buffer.clear();
        self.handoff.clear();
        self.frame_position = self
            .frame_rate()
            .map(|rate| (rate * micros as f64 / 1_000_000.0) as i64);
        debug!(micros, frame_position = ?self.frame_position, "Stream repositioned");
        Ok(translation)
    }

    pub fn is_seekable(&self) -> bool {
        !self.closed && self.source.is_seekable()
    }

    /// Length in frames, when the source knows it and frames have a fixed
    /// size.
    pub fn frame_length(&self) -> Option<i64> {
        let format = self.format()?;
        if format.bytes_per_frame == 0 {
            return None;
        }
        self.source.frame_count().filter(|frames| *frames > 0)
    }

    /// Frame reached by the last seek.
    pub fn frame_position(&self) -> Option<i64> {
        self.frame_position
    }

    /// Format summary for the stream as currently known.
    pub fn summary(&self) -> Result<FileFormatSummary> {
        FormatNegotiator::probe_source(&self.source)
    }

    /// Release the source. Later calls return `Ok(())`.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.buffer.clear();
        self.source.close()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(PipelineError::Closed)
        } else {
            Ok(())
        }
    }

    fn frame_rate(&self) -> Option<f64> {
        let format = self.format()?;
        (format.frames_per_packet > 0 && format.sample_rate > 0.0).then_some(format.sample_rate)
    }

    /// Fill until the format is known.
    pub(crate) fn discover_format(&mut self) -> Result<StreamFormat> {
        loop {
            if let Some(format) = self.format() {
                return Ok(*format);
            }
            if self.fill_buffer()? == 0 && self.format().is_none() {
                return Err(PipelineError::UnsupportedFormat {
                    message: "Stream ended before its format was known".to_string(),
                    code: StatusCode::UNSUPPORTED_DATA_FORMAT,
                });
            }
        }
    }

    /// Hand every unread packet to a converter and mark the buffer consumed.
    pub(crate) fn drain_packets(&mut self) -> InputPackets<'_> {
        if !self.buffer.has_remaining() {
            return InputPackets::end_of_stream();
        }

        let start = self.buffer.position();
        self.buffer.consume_all();
        self.handoff.clear();

        let packet_count = if start == 0 {
            if let Some(descriptors) = self.source.descriptors() {
                self.handoff.extend_from_slice(descriptors);
            }
            self.source.position().packets_since_last_fill().max(0) as u32
        } else if let Some(descriptors) = self.source.descriptors() {
            let offset = start as u64;
            self.handoff.extend(
                descriptors
                    .iter()
                    .filter(|d| d.start_offset >= offset)
                    .map(|d| PacketDescriptor::new(d.start_offset - offset, d.byte_size)),
            );
            self.handoff.len() as u32
        } else {
            let packet_size = self.format().map(|f| f.bytes_per_packet).unwrap_or(0) as usize;
            match packet_size {
                0 => 0,
                size => ((self.buffer.limit() - start) / size) as u32,
            }
        };

        let data = &self.buffer.filled()[start..];
        let descriptors = (!self.handoff.is_empty()).then_some(self.handoff.as_slice());
        InputPackets {
            data,
            packet_count,
            descriptors,
        }
    }

    pub(crate) fn take_frame_offset(&mut self) -> u32 {
        self.source.take_frame_offset()
    }
}

impl Read for PipelineStream {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let mut copied = 0;
        while copied < out.len() {
            if !self.buffer.has_remaining() && self.fill_buffer()? == 0 {
                break;
            }
            copied += self.buffer.read_into(&mut out[copied..]);
        }
        Ok(copied)
    }
}
