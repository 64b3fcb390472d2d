//! Time-based seeking.
//!
//! A timestamp becomes a frame index (`sample_rate * micros / 1e6`), the
//! backend translates the frame into a packet plus an intra-packet offset,
//! and the source's position jumps there. A converting source forwards the
//! seek to its upstream and then resets its converter.

use bridge_traits::{FramePacketTranslation, StatusCode};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::source::{PipelineSource, PullSource, RandomAccessSource};

pub struct SeekCoordinator;

impl SeekCoordinator {
    /// Frame index for `micros` at `sample_rate`.
    pub fn target_frame(sample_rate: f64, micros: i64) -> i64 {
        ((sample_rate * micros as f64) as i64) / 1_000_000
    }

    /// Reposition `source` so the next fill starts at `micros`.
    ///
    /// The position is left unchanged when the translation fails.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::SeekError`] for a negative time or a frame the
    ///   backend cannot translate
    /// - [`PipelineError::Unsupported`] for push-fed sources
    pub fn seek_to_time(source: &mut PipelineSource, micros: i64) -> Result<FramePacketTranslation> {
        match source {
            PipelineSource::RandomAccess(source) => Self::seek_random_access(source, micros),
            PipelineSource::PushFed(_) => Err(PipelineError::Unsupported(
                "Seeking is not supported for push-fed streams".to_string(),
            )),
            PipelineSource::Converter(engine) => engine.seek_micros(micros),
        }
    }

    fn seek_random_access(
        source: &mut RandomAccessSource,
        micros: i64,
    ) -> Result<FramePacketTranslation> {
        if micros < 0 {
            return Err(PipelineError::seek(
                format!("Cannot seek to negative time {}us", micros),
                StatusCode::INVALID_PACKET_OFFSET,
            ));
        }

        let sample_rate = source.format().map(|f| f.sample_rate).unwrap_or_default();
        let frame = Self::target_frame(sample_rate, micros);
        let translation = source.frame_to_packet(frame)?;
        source.seek_to_packet(translation.packet, translation.frame_offset_in_packet)?;

        debug!(
            micros,
            frame,
            packet = translation.packet,
            offset = translation.frame_offset_in_packet,
            "Seek complete"
        );
        Ok(translation)
    }
}
