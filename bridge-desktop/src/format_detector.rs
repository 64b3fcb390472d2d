//! # Format Detection
//!
//! Maps between symphonia's codec and container identifiers and the
//! four-character tags used across the pipeline.

use std::path::Path;

use bridge_traits::{FileTypeHint, FormatFlags, FormatTag};
use symphonia::core::codecs::*;
use symphonia::core::probe::Hint;
use tracing::debug;

/// Sample layout of an uncompressed symphonia codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmCodecLayout {
    pub format_tag: FormatTag,
    pub bits: u32,
    pub flags: FormatFlags,
}

pub struct FormatDetector;

impl FormatDetector {
    /// Probe hint from the container type, falling back to the path
    /// extension.
    pub fn hint_for(file_type: FileTypeHint, path: Option<&Path>) -> Hint {
        let mut hint = Hint::new();
        let extension = file_type
            .extension()
            .or_else(|| path.and_then(|p| p.extension()).and_then(|ext| ext.to_str()));

        match extension {
            Some(extension) => {
                debug!("Setting probe hint extension: {}", extension);
                hint.with_extension(extension);
            }
            None => debug!("No file type hint, probe will auto-detect"),
        }
        hint
    }

    /// Pipeline tag for a symphonia codec.
    pub fn format_tag(codec: CodecType) -> FormatTag {
        if let Some(layout) = Self::pcm_layout(codec) {
            return layout.format_tag;
        }
        match codec {
            CODEC_TYPE_MP1 => FormatTag::MPEG_LAYER_1,
            CODEC_TYPE_MP2 => FormatTag::MPEG_LAYER_2,
            CODEC_TYPE_MP3 => FormatTag::MPEG_LAYER_3,
            CODEC_TYPE_AAC => FormatTag::MPEG4_AAC,
            CODEC_TYPE_ALAC => FormatTag::APPLE_LOSSLESS,
            CODEC_TYPE_FLAC => FormatTag::FLAC,
            CODEC_TYPE_VORBIS => FormatTag::VORBIS,
            CODEC_TYPE_OPUS => FormatTag::OPUS,
            CODEC_TYPE_ADPCM_IMA_WAV => FormatTag::MICROSOFT_IMA_ADPCM,
            _ => FormatTag::UNKNOWN,
        }
    }

    /// Symphonia codec able to decode a compressed pipeline tag.
    pub fn codec_type(tag: FormatTag) -> Option<CodecType> {
        let codec = match tag {
            FormatTag::MPEG_LAYER_1 => CODEC_TYPE_MP1,
            FormatTag::MPEG_LAYER_2 => CODEC_TYPE_MP2,
            FormatTag::MPEG_LAYER_3 => CODEC_TYPE_MP3,
            FormatTag::MPEG4_AAC => CODEC_TYPE_AAC,
            FormatTag::APPLE_LOSSLESS => CODEC_TYPE_ALAC,
            FormatTag::FLAC => CODEC_TYPE_FLAC,
            FormatTag::VORBIS => CODEC_TYPE_VORBIS,
            FormatTag::OPUS => CODEC_TYPE_OPUS,
            FormatTag::MICROSOFT_IMA_ADPCM => CODEC_TYPE_ADPCM_IMA_WAV,
            _ => return None,
        };
        Some(codec)
    }

    /// Byte layout of an interleaved PCM or G.711 codec.
    pub fn pcm_layout(codec: CodecType) -> Option<PcmCodecLayout> {
        let signed = FormatFlags::SIGNED_INTEGER | FormatFlags::PACKED;
        let signed_be = signed | FormatFlags::BIG_ENDIAN;
        let unsigned = FormatFlags::PACKED;
        let unsigned_be = unsigned | FormatFlags::BIG_ENDIAN;
        let float = FormatFlags::FLOAT | FormatFlags::PACKED;
        let float_be = float | FormatFlags::BIG_ENDIAN;

        let (format_tag, bits, flags) = match codec {
            CODEC_TYPE_PCM_U8 => (FormatTag::LINEAR_PCM, 8, unsigned),
            CODEC_TYPE_PCM_S8 => (FormatTag::LINEAR_PCM, 8, signed),
            CODEC_TYPE_PCM_S16LE => (FormatTag::LINEAR_PCM, 16, signed),
            CODEC_TYPE_PCM_S16BE => (FormatTag::LINEAR_PCM, 16, signed_be),
            CODEC_TYPE_PCM_U16LE => (FormatTag::LINEAR_PCM, 16, unsigned),
            CODEC_TYPE_PCM_U16BE => (FormatTag::LINEAR_PCM, 16, unsigned_be),
            CODEC_TYPE_PCM_S24LE => (FormatTag::LINEAR_PCM, 24, signed),
            CODEC_TYPE_PCM_S24BE => (FormatTag::LINEAR_PCM, 24, signed_be),
            CODEC_TYPE_PCM_U24LE => (FormatTag::LINEAR_PCM, 24, unsigned),
            CODEC_TYPE_PCM_U24BE => (FormatTag::LINEAR_PCM, 24, unsigned_be),
            CODEC_TYPE_PCM_S32LE => (FormatTag::LINEAR_PCM, 32, signed),
            CODEC_TYPE_PCM_S32BE => (FormatTag::LINEAR_PCM, 32, signed_be),
            CODEC_TYPE_PCM_U32LE => (FormatTag::LINEAR_PCM, 32, unsigned),
            CODEC_TYPE_PCM_U32BE => (FormatTag::LINEAR_PCM, 32, unsigned_be),
            CODEC_TYPE_PCM_F32LE => (FormatTag::LINEAR_PCM, 32, float),
            CODEC_TYPE_PCM_F32BE => (FormatTag::LINEAR_PCM, 32, float_be),
            CODEC_TYPE_PCM_F64LE => (FormatTag::LINEAR_PCM, 64, float),
            CODEC_TYPE_PCM_F64BE => (FormatTag::LINEAR_PCM, 64, float_be),
            CODEC_TYPE_PCM_ALAW => (FormatTag::ALAW, 8, FormatFlags::NONE),
            CODEC_TYPE_PCM_MULAW => (FormatTag::ULAW, 8, FormatFlags::NONE),
            _ => return None,
        };
        Some(PcmCodecLayout {
            format_tag,
            bits,
            flags,
        })
    }

    /// Whether this build links a decoder for `tag`.
    pub fn is_decodable(tag: FormatTag) -> bool {
        Self::codec_type(tag)
            .is_some_and(|codec| symphonia::default::get_codecs().get_codec(codec).is_some())
    }
}
