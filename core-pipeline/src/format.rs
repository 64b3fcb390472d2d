//! # Format Negotiation
//!
//! Derives a host-visible [`FileFormatSummary`] from a source's
//! [`StreamFormat`] and packet count.
//!
//! ## Derived Fields
//!
//! - `frame_rate = sample_rate / frames_per_packet`
//! - `duration_micros = frames_per_packet * packet_count * 1e6 / sample_rate`
//! - `bit_rate = 8 * bytes_per_packet * sample_rate / frames_per_packet`, or
//!   `-1` when either packet dimension varies
//!
//! Push-fed sources only know what the parser has announced so far; fields
//! they cannot derive stay at [`NOT_SPECIFIED`] (or NaN for a frame rate
//! computed over zero packets).

use bridge_traits::{
    AudioFileOpener, FileTypeHint, FormatTag, StatusCode, StreamFormat, StreamParserFactory,
};
use core_runtime::logging::redact_locator;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::buffer::SharedBuffer;
use crate::error::{PipelineError, Result};
use crate::source::{PipelineSource, PullSource, PushFedSource, RandomAccessSource};
use crate::transcode::NOT_SPECIFIED;

/// Everything the host learns about an audio resource without decoding it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileFormatSummary {
    pub format_tag: FormatTag,
    pub file_type: FileTypeHint,
    pub sample_rate: f32,
    pub bits_per_sample: i32,
    pub channels: i32,
    pub frame_size: i32,
    pub frame_rate: f32,
    pub frame_length: i64,
    pub big_endian: bool,
    pub duration_micros: i64,
    pub bit_rate: i32,
    pub is_vbr: bool,
    pub byte_length: i64,
}

impl FileFormatSummary {
    /// Duration, when known.
    pub fn duration(&self) -> Option<std::time::Duration> {
        u64::try_from(self.duration_micros)
            .ok()
            .map(std::time::Duration::from_micros)
    }
}

pub struct FormatNegotiator;

impl FormatNegotiator {
    /// Summary for a source with a complete packet index.
    pub fn summarize(format: &StreamFormat, packet_count: u64) -> FileFormatSummary {
        let fpp = format.frames_per_packet;
        let is_vbr = format.is_vbr() || fpp == 0;

        let frame_rate = if fpp == 0 {
            NOT_SPECIFIED as f32
        } else {
            (format.sample_rate / fpp as f64) as f32
        };
        let bit_rate = if is_vbr {
            NOT_SPECIFIED
        } else {
            (8.0 * format.bytes_per_packet as f64 * format.sample_rate / fpp as f64) as i32
        };

        FileFormatSummary {
            frame_rate: fallback_frame_rate(format, frame_rate),
            frame_length: packet_count as i64,
            duration_micros: duration_micros(format, packet_count),
            bit_rate,
            is_vbr,
            ..base_summary(format)
        }
    }

    /// Summary for a push-fed source, which may not know its packet count.
    pub fn summarize_streamed(format: &StreamFormat, packet_count: Option<u64>) -> FileFormatSummary {
        let mut summary = FileFormatSummary {
            frame_rate: fallback_frame_rate(format, NOT_SPECIFIED as f32),
            frame_length: NOT_SPECIFIED as i64,
            duration_micros: NOT_SPECIFIED as i64,
            bit_rate: NOT_SPECIFIED,
            is_vbr: format.is_vbr() || format.frames_per_packet == 0,
            ..base_summary(format)
        };

        if let Some(count) = packet_count {
            summary.frame_length = count as i64;
            summary.duration_micros = duration_micros(format, count);
            summary.frame_rate =
                fallback_frame_rate(format, (count as f64 * format.sample_rate / count as f64) as f32);
        }
        summary
    }

    /// Summarize whatever `source` currently knows.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnsupportedFormat`] if the source has not discovered
    /// its format yet.
    pub fn probe_source(source: &PipelineSource) -> Result<FileFormatSummary> {
        let format = source.format().ok_or_else(|| PipelineError::UnsupportedFormat {
            message: "Failed to get data format from stream".to_string(),
            code: StatusCode::UNSUPPORTED_DATA_FORMAT,
        })?;

        let summary = match source {
            PipelineSource::RandomAccess(file) => {
                let mut summary = Self::summarize(format, file.packet_count().unwrap_or(0));
                summary.byte_length = file.byte_length().map_or(NOT_SPECIFIED as i64, |len| len as i64);
                summary
            }
            PipelineSource::PushFed(stream) => Self::summarize_streamed(format, stream.packet_count()),
            PipelineSource::Converter(engine) => match engine.frame_count() {
                Some(frames) => Self::summarize(format, frames.max(0) as u64),
                None => Self::summarize_streamed(format, None),
            },
        };
        Ok(summary)
    }

    /// Open `locator`, summarize it and close it again.
    #[instrument(skip(opener), fields(locator = %redact_locator(locator)))]
    pub fn probe_locator(
        opener: &dyn AudioFileOpener,
        locator: &str,
        hint: FileTypeHint,
    ) -> Result<FileFormatSummary> {
        let mut source = PipelineSource::from(RandomAccessSource::open(opener, locator, hint, 0)?);
        let mut summary = Self::probe_source(&source)?;
        summary.file_type = hint;

        if let Err(err) = source.close() {
            warn!("Failed to close probed file: {}", err);
        }
        debug!(format = ?summary.format_tag, duration_micros = summary.duration_micros, "Probed file");
        Ok(summary)
    }

    /// Parse `initial` container bytes and summarize what they reveal.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnsupportedFormat`] if the parser rejects the bytes
    /// or they end before the format is announced.
    pub fn probe_bytes(
        parsers: &dyn StreamParserFactory,
        initial: &[u8],
        hint: FileTypeHint,
    ) -> Result<FileFormatSummary> {
        let mut source = PushFedSource::open(parsers, hint, None, initial.len())?;
        let mut scratch = SharedBuffer::new(initial.len());
        source.parse(initial, &mut scratch)?;

        let format = source.format().ok_or_else(|| PipelineError::UnsupportedFormat {
            message: "Failed to get data format from stream".to_string(),
            code: StatusCode::UNSUPPORTED_DATA_FORMAT,
        })?;
        let mut summary = Self::summarize_streamed(format, source.packet_count());
        summary.file_type = hint;

        source.close()?;
        debug!(format = ?summary.format_tag, bytes = initial.len(), "Probed stream head");
        Ok(summary)
    }
}

fn base_summary(format: &StreamFormat) -> FileFormatSummary {
    FileFormatSummary {
        format_tag: format.format_tag,
        file_type: FileTypeHint::UNKNOWN,
        sample_rate: format.sample_rate as f32,
        bits_per_sample: specified(format.bits_per_channel),
        channels: specified(format.channels),
        frame_size: specified(format.bytes_per_frame),
        frame_rate: NOT_SPECIFIED as f32,
        frame_length: NOT_SPECIFIED as i64,
        big_endian: format.format_tag.is_linear_pcm() && format.is_big_endian(),
        duration_micros: NOT_SPECIFIED as i64,
        bit_rate: NOT_SPECIFIED,
        is_vbr: false,
        byte_length: NOT_SPECIFIED as i64,
    }
}

fn specified(value: u32) -> i32 {
    if value == 0 {
        NOT_SPECIFIED
    } else {
        i32::try_from(value).unwrap_or(i32::MAX)
    }
}

fn duration_micros(format: &StreamFormat, packet_count: u64) -> i64 {
    if format.sample_rate <= 0.0 {
        return NOT_SPECIFIED as i64;
    }
    let micros = format.frames_per_packet as u128 * packet_count as u128 * 1_000_000;
    (micros as f64 / format.sample_rate) as i64
}

/// Uncompressed and companded formats play one frame per sample.
fn fallback_frame_rate(format: &StreamFormat, frame_rate: f32) -> f32 {
    let plain = matches!(
        format.format_tag,
        FormatTag::LINEAR_PCM | FormatTag::ULAW | FormatTag::ALAW
    );
    if plain && frame_rate == NOT_SPECIFIED as f32 {
        format.sample_rate as f32
    } else {
        frame_rate
    }
}
