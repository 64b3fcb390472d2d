//! Converter factory for desktop builds.

use bridge_traits::{
    error::{BridgeError, Result},
    AudioConverter, ConverterFactory, StatusCode, StreamFormat,
};
use tracing::debug;

use crate::pcm::PcmConverter;
use crate::sample_converter::{PcmLayout, SampleEncoding};

#[cfg(feature = "symphonia-backend")]
use crate::format_detector::FormatDetector;
#[cfg(feature = "symphonia-backend")]
use crate::symphonia_converter::SymphoniaConverter;

/// Sample sizes the desktop converters can produce.
const OUTPUT_BITS: [u32; 4] = [8, 16, 24, 32];

/// Picks a converter by source format.
///
/// - Linear PCM and G.711 sources are re-encoded sample by sample
/// - Compressed sources go through a symphonia decoder
///
/// Targets must be packed signed-integer PCM. Sample rate and channel count
/// must match the source (zero means "same as source").
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopConverterFactory;

impl DesktopConverterFactory {
    pub fn new() -> Self {
        Self
    }
}

impl ConverterFactory for DesktopConverterFactory {
    fn new_converter(&self, from: &StreamFormat, to: &StreamFormat) -> Result<Box<dyn AudioConverter>> {
        debug!(from = %from.format_tag, to = %to.format_tag, "Creating converter");

        if PcmLayout::from_format(from).is_some() {
            return Ok(Box::new(PcmConverter::new(from, to)?));
        }

        #[cfg(feature = "symphonia-backend")]
        if FormatDetector::is_decodable(from.format_tag) {
            return Ok(Box::new(SymphoniaConverter::new(from, to)?));
        }

        Err(BridgeError::unsupported(
            format!("No converter from {} to {}", from.format_tag, to.format_tag),
            StatusCode::UNSUPPORTED_DATA_FORMAT,
        ))
    }
}

/// Output layout for converting `from` into `to`.
///
/// # Errors
///
/// Returns [`BridgeError::Unsupported`] when `to` is not signed-integer
/// linear PCM, would need resampling or channel mixing, or has a sample
/// size the converters cannot write.
pub(crate) fn target_layout(from: &StreamFormat, to: &StreamFormat) -> Result<PcmLayout> {
    let unsupported = |message: &str| BridgeError::unsupported(message, StatusCode::UNSUPPORTED_DATA_FORMAT);

    if !to.format_tag.is_linear_pcm() || to.is_float() {
        return Err(unsupported("Target must be signed integer PCM"));
    }
    if to.sample_rate != 0.0 && to.sample_rate != from.sample_rate {
        return Err(unsupported("Sample rate conversion is not supported"));
    }
    if to.channels != 0 && from.channels != 0 && to.channels != from.channels {
        return Err(unsupported("Channel count conversion is not supported"));
    }
    if !OUTPUT_BITS.contains(&to.bits_per_channel) {
        return Err(unsupported("Unsupported target sample size"));
    }

    let channels = if to.channels == 0 { from.channels } else { to.channels };
    if channels == 0 {
        return Err(unsupported("Channel count unknown"));
    }

    let layout = PcmLayout {
        encoding: SampleEncoding::Signed,
        bytes_per_sample: to.bits_per_channel.div_ceil(8) as usize,
        big_endian: to.is_big_endian(),
        channels: channels as usize,
    };
    if to.bytes_per_frame != 0 && to.bytes_per_frame as usize != layout.bytes_per_frame() {
        return Err(unsupported("Target frame size does not match its sample layout"));
    }
    Ok(layout)
}
