//! # Transcode Engine
//!
//! A pull source that owns an upstream [`PipelineStream`] and converts its
//! packets to a target format.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized --configure--> Configured --fill--> Streaming
//!                                   ^                   |
//!                                   +------ reset ------+   (after a seek)
//! any state --close--> Closed
//! ```
//!
//! The converter backend pulls input synchronously through
//! [`ConverterInput::supply`] while a fill is running. Each supply hands over
//! whatever the upstream buffer still holds, refilling it first when empty.

use std::sync::Arc;

use bridge_traits::{
    AudioConverter, BridgeError, ConverterFactory, ConverterInput, FormatFlags, FormatTag,
    FramePacketTranslation, InputPackets, PacketDescriptor, StatusCode, StreamFormat,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::buffer::SharedBuffer;
use crate::error::{PipelineError, Result};
use crate::position::PositionState;
use crate::source::{PullSource, SidebandConfig};
use crate::stream::PipelineStream;

/// Marker for a field the caller leaves unspecified.
pub const NOT_SPECIFIED: i32 = -1;

/// Requested output format.
///
/// Integer fields use [`NOT_SPECIFIED`] for "don't care"; they are
/// normalized to zero before the converter is created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetFormat {
    pub format_tag: FormatTag,
    pub sample_rate: f64,
    pub channels: i32,
    pub bits_per_channel: i32,
    pub bytes_per_frame: i32,
    pub bytes_per_packet: i32,
    pub frames_per_packet: i32,
    pub big_endian: bool,
}

impl TargetFormat {
    /// Signed, packed linear PCM with one frame per packet.
    pub fn pcm_signed(sample_rate: f64, channels: i32, bits_per_channel: i32, big_endian: bool) -> Self {
        let frame_size = if channels > 0 && bits_per_channel > 0 {
            (bits_per_channel + 7) / 8 * channels
        } else {
            NOT_SPECIFIED
        };
        Self {
            format_tag: FormatTag::LINEAR_PCM,
            sample_rate,
            channels,
            bits_per_channel,
            bytes_per_frame: frame_size,
            bytes_per_packet: frame_size,
            frames_per_packet: 1,
            big_endian,
        }
    }

    /// Normalize and validate into a backend format description.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidArgument`] if the frame size, packet size or
    /// sample size is not positive.
    pub fn to_stream_format(&self) -> Result<StreamFormat> {
        let mut flags = FormatFlags::NONE;
        if self.format_tag.is_linear_pcm() {
            flags = FormatFlags::SIGNED_INTEGER | FormatFlags::PACKED;
            if self.big_endian {
                flags.insert(FormatFlags::BIG_ENDIAN);
            }
        }

        let format = StreamFormat {
            sample_rate: self.sample_rate.max(0.0),
            format_tag: self.format_tag,
            flags,
            bytes_per_packet: normalize(self.bytes_per_packet),
            frames_per_packet: normalize(self.frames_per_packet),
            bytes_per_frame: normalize(self.bytes_per_frame),
            channels: normalize(self.channels),
            bits_per_channel: normalize(self.bits_per_channel),
        };

        if format.bytes_per_frame == 0 {
            return Err(PipelineError::InvalidArgument("frameSize must be positive".to_string()));
        }
        if format.bytes_per_packet == 0 {
            return Err(PipelineError::InvalidArgument(
                "bytesPerPacket must be positive".to_string(),
            ));
        }
        if format.bits_per_channel == 0 {
            return Err(PipelineError::InvalidArgument(
                "sampleSizeInBits must be positive".to_string(),
            ));
        }
        Ok(format)
    }
}

fn normalize(value: i32) -> u32 {
    value.max(0) as u32
}

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Configured,
    Streaming,
    Reset,
    Closed,
}

/// Converts an upstream stream into `target` on demand.
pub struct TranscodeEngine {
    state: EngineState,
    converters: Arc<dyn ConverterFactory>,
    upstream: Option<Box<PipelineStream>>,
    converter: Option<Box<dyn AudioConverter>>,
    source_format: Option<StreamFormat>,
    target: Option<StreamFormat>,
    position: PositionState,
    descriptors: Vec<PacketDescriptor>,
    /// Output bytes still to drop after a seek landed inside a packet.
    pending_skip: usize,
}

impl TranscodeEngine {
    pub fn new(converters: Arc<dyn ConverterFactory>) -> Self {
        Self {
            state: EngineState::Uninitialized,
            converters,
            upstream: None,
            converter: None,
            source_format: None,
            target: None,
            position: PositionState::new(),
            descriptors: Vec::new(),
            pending_skip: 0,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Format of the upstream packets being converted.
    pub fn source_format(&self) -> Option<&StreamFormat> {
        self.source_format.as_ref()
    }

    pub fn upstream(&self) -> Option<&PipelineStream> {
        self.upstream.as_deref()
    }

    /// Take ownership of `upstream` and build a converter to `target`.
    ///
    /// Fills the upstream until its format is known. On any failure the
    /// upstream is closed.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::InvalidArgument`] for a malformed target
    /// - [`PipelineError::UnsupportedFormat`] if the upstream ends before its
    ///   format is known or the codec cookie is rejected
    /// - [`PipelineError::UnsupportedConversion`] if no converter exists
    #[instrument(skip(self, upstream), fields(target = ?target.format_tag))]
    pub fn configure(&mut self, target: &TargetFormat, mut upstream: PipelineStream) -> Result<()> {
        match self.state {
            EngineState::Uninitialized => {}
            EngineState::Closed => return Err(PipelineError::Closed),
            _ => {
                return Err(PipelineError::InvalidArgument(
                    "Converter is already configured".to_string(),
                ))
            }
        }

        match self.build_converter(target, &mut upstream) {
            Ok((source_format, target_format, converter)) => {
                debug!(
                    from = ?source_format.format_tag,
                    to = ?target_format.format_tag,
                    sample_rate = target_format.sample_rate,
                    channels = target_format.channels,
                    bits = target_format.bits_per_channel,
                    "Converter configured"
                );
                self.source_format = Some(source_format);
                self.target = Some(target_format);
                self.converter = Some(converter);
                self.upstream = Some(Box::new(upstream));
                self.state = EngineState::Configured;
                Ok(())
            }
            Err(err) => {
                if let Err(close_err) = upstream.close() {
                    warn!("Failed to close upstream after configure error: {}", close_err);
                }
                Err(err)
            }
        }
    }

    fn build_converter(
        &self,
        target: &TargetFormat,
        upstream: &mut PipelineStream,
    ) -> Result<(StreamFormat, StreamFormat, Box<dyn AudioConverter>)> {
        let mut target_format = target.to_stream_format()?;
        let source_format = upstream.discover_format()?;

        let mut converter = self
            .converters
            .new_converter(&source_format, &target_format)
            .map_err(|e| PipelineError::UnsupportedConversion {
                message: "Failed to create converter".to_string(),
                code: e.code(),
            })?;

        if let Some(cookie) = upstream.cookie() {
            if let Err(e) = converter.set_decompression_cookie(cookie.as_bytes()) {
                converter.dispose();
                return Err(PipelineError::unsupported_format(
                    "Failed to set cookie from source",
                    &e,
                ));
            }
        }

        // Unspecified rate and channel count follow the source
        if target_format.sample_rate <= 0.0 {
            target_format.sample_rate = source_format.sample_rate;
        }
        if target_format.channels == 0 {
            target_format.channels = source_format.channels;
        }

        Ok((source_format, target_format, converter))
    }

    /// Discard converter state that depends on stream history.
    ///
    /// Format and cookie are kept; the next fill continues from wherever the
    /// upstream now stands.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_configured()?;
        if let Some(converter) = self.converter.as_mut() {
            converter
                .reset()
                .map_err(|e| PipelineError::conversion("Failed to reset converter", &e))?;
        }
        self.descriptors.clear();
        self.pending_skip = 0;
        self.state = EngineState::Reset;
        debug!("Converter reset");
        Ok(())
    }

    /// Seek the upstream to `micros` and reset the converter.
    pub fn seek_micros(&mut self, micros: i64) -> Result<FramePacketTranslation> {
        self.ensure_configured()?;
        let upstream = self.upstream.as_mut().ok_or(PipelineError::Closed)?;
        let translation = upstream.seek_micros(micros)?;
        self.reset()?;
        Ok(translation)
    }

    fn ensure_configured(&self) -> Result<()> {
        match self.state {
            EngineState::Closed => Err(PipelineError::Closed),
            EngineState::Uninitialized => Err(PipelineError::InvalidArgument(
                "Converter is not configured".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

impl PullSource for TranscodeEngine {
    fn format(&self) -> Option<&StreamFormat> {
        self.target.as_ref()
    }

    fn cookie(&self) -> Option<&SidebandConfig> {
        None
    }

    fn packet_count(&self) -> Option<u64> {
        self.frame_count().map(|frames| frames.max(0) as u64)
    }

    fn fill(&mut self, buffer: &mut SharedBuffer) -> Result<usize> {
        self.ensure_configured()?;
        let target = self.target.ok_or(PipelineError::Closed)?;
        let (Some(upstream), Some(converter)) = (self.upstream.as_mut(), self.converter.as_mut())
        else {
            return Err(PipelineError::Closed);
        };

        let max_packets = if target.bytes_per_packet > 0 {
            buffer.capacity() / target.bytes_per_packet as usize
        } else {
            0
        };
        if max_packets == 0 {
            return Err(PipelineError::CapacityExceeded {
                message: "Output buffer smaller than one packet".to_string(),
                needed: target.bytes_per_packet as usize,
                available: buffer.capacity(),
            });
        }
        let max_packets = max_packets.min(u32::MAX as usize) as u32;

        self.descriptors.clear();
        let mut input = UpstreamInput {
            upstream: upstream.as_mut(),
            failure: None,
        };
        let produced = match converter.fill_buffer(
            &mut input,
            buffer.storage_mut(),
            max_packets,
            &mut self.descriptors,
        ) {
            Ok(produced) => produced,
            Err(e) => {
                return Err(input
                    .failure
                    .take()
                    .unwrap_or_else(|| PipelineError::conversion("Failed to fill complex buffer", &e)))
            }
        };

        let limit = if target.bytes_per_packet > 0 {
            produced as usize * target.bytes_per_packet as usize
        } else {
            self.descriptors.iter().map(|d| d.byte_size as usize).sum()
        };
        self.position.record_fill(produced);
        buffer.set_window(0, limit);

        let skip_frames = upstream.take_frame_offset();
        if skip_frames > 0 {
            self.pending_skip += skip_frames as usize * target.bytes_per_frame as usize;
            debug!(skip_frames, "Skipping frames after seek");
        }
        // A skip larger than this fill carries over to the next one
        if self.pending_skip > 0 {
            let skipped = self.pending_skip.min(limit);
            buffer.set_position(skipped);
            self.pending_skip -= skipped;
        }

        self.state = EngineState::Streaming;
        Ok(limit)
    }

    fn position(&self) -> &PositionState {
        &self.position
    }

    fn descriptors(&self) -> Option<&[PacketDescriptor]> {
        (!self.descriptors.is_empty()).then_some(self.descriptors.as_slice())
    }

    fn is_seekable(&self) -> bool {
        self.upstream.as_ref().is_some_and(|up| up.is_seekable())
    }

    fn frame_to_packet(&self, frame: i64) -> Result<FramePacketTranslation> {
        let upstream = self.upstream.as_ref().ok_or(PipelineError::Closed)?;
        upstream.source().frame_to_packet(frame)
    }

    fn seek_to_packet(&mut self, _packet: i64, _frame_offset_in_packet: u32) -> Result<()> {
        Err(PipelineError::Unsupported(
            "Converted streams seek by time through their upstream".to_string(),
        ))
    }

    fn take_frame_offset(&mut self) -> u32 {
        self.position.take_frame_offset()
    }

    fn frame_count(&self) -> Option<i64> {
        self.upstream.as_ref()?.source().frame_count()
    }

    fn close(&mut self) -> Result<()> {
        if self.state == EngineState::Closed {
            return Ok(());
        }
        self.state = EngineState::Closed;

        if let Some(mut converter) = self.converter.take() {
            converter.dispose();
        }
        match self.upstream.take() {
            Some(mut upstream) => upstream.close(),
            None => Ok(()),
        }
    }
}

impl Drop for TranscodeEngine {
    fn drop(&mut self) {
        if let Some(mut converter) = self.converter.take() {
            converter.dispose();
        }
    }
}

/// Feeds the converter from the upstream stream during one fill.
///
/// Upstream failures are kept in `failure` so the engine can report them
/// instead of the converter's generic error.
struct UpstreamInput<'a> {
    upstream: &'a mut PipelineStream,
    failure: Option<PipelineError>,
}

impl ConverterInput for UpstreamInput<'_> {
    fn supply(&mut self) -> bridge_traits::error::Result<InputPackets<'_>> {
        if !self.upstream.buffer().has_remaining() {
            if let Err(err) = self.upstream.fill_buffer() {
                let bridge =
                    BridgeError::failed(err.to_string(), err.code().unwrap_or(StatusCode::GENERIC));
                self.failure = Some(err);
                return Err(bridge);
            }
        }
        Ok(self.upstream.drain_packets())
    }
}
