//! # Host Providers
//!
//! Entry points a host registers: [`AudioFileReader`] answers "what is this
//! file?" and opens streams, [`FormatConversionProvider`] lists and performs
//! conversions to signed PCM.

use std::num::NonZeroUsize;
use std::sync::Arc;

use bridge_traits::{ByteSource, FileTypeHint, FormatTag, StatusCode, StreamFormat};
use bytes::BytesMut;
use core_runtime::logging::redact_locator;
use core_runtime::CoreConfig;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{PipelineError, Result};
use crate::format::{FileFormatSummary, FormatNegotiator};
use crate::source::PrefixedByteSource;
use crate::stream::PipelineStream;
use crate::transcode::TargetFormat;

/// Map a MIME content type to a container hint.
pub fn hint_for_content_type(content_type: &str) -> FileTypeHint {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "audio/mpeg" => FileTypeHint::MP3,
        "audio/mp4" => FileTypeHint::M4A,
        "audio/vnd.wave" => FileTypeHint::WAVE,
        _ => FileTypeHint::UNKNOWN,
    }
}

/// Guess a container hint from the extension of a path or URL.
pub fn hint_for_locator(locator: &str) -> FileTypeHint {
    let path = locator.split(['?', '#']).next().unwrap_or_default();
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((_, extension)) => FileTypeHint::from_extension(extension),
        None => FileTypeHint::UNKNOWN,
    }
}

/// Probes and opens audio resources through the configured capabilities.
///
/// Probe results for locators are kept in a small LRU cache.
pub struct AudioFileReader {
    config: Arc<CoreConfig>,
    cache: Mutex<LruCache<String, FileFormatSummary>>,
}

impl AudioFileReader {
    pub fn new(config: Arc<CoreConfig>) -> Self {
        let entries = NonZeroUsize::new(config.pipeline.format_cache_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            cache: Mutex::new(LruCache::new(entries)),
        }
    }

    /// Format summary for the file at `locator`.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::NotFound`] if the file does not exist
    /// - [`PipelineError::UnsupportedFormat`] if it cannot be parsed
    #[instrument(skip(self), fields(locator = %redact_locator(locator)))]
    pub fn audio_file_format(&self, locator: &str) -> Result<FileFormatSummary> {
        if let Some(summary) = self.cache.lock().get(locator) {
            debug!("Format cache hit");
            return Ok(summary.clone());
        }

        let summary = FormatNegotiator::probe_locator(
            self.config.file_opener.as_ref(),
            locator,
            hint_for_locator(locator),
        )?;
        self.cache.lock().put(locator.to_string(), summary.clone());
        Ok(summary)
    }

    /// Format summary from the head of a stream.
    pub fn audio_file_format_from_bytes(
        &self,
        initial: &[u8],
        content_type: Option<&str>,
    ) -> Result<FileFormatSummary> {
        let hint = content_type.map_or(FileTypeHint::UNKNOWN, hint_for_content_type);
        FormatNegotiator::probe_bytes(self.config.stream_parsers.as_ref(), initial, hint)
    }

    /// Open a seekable stream over the file at `locator`.
    #[instrument(skip(self), fields(locator = %redact_locator(locator)))]
    pub fn open_stream(&self, locator: &str) -> Result<PipelineStream> {
        PipelineStream::open_random_access(
            self.config.file_opener.as_ref(),
            locator,
            hint_for_locator(locator),
            &self.config.pipeline,
        )
    }

    /// Probe the head of `bytes`, then open a push-fed stream that replays
    /// the probed bytes before continuing.
    #[instrument(skip(self, bytes))]
    pub fn open_byte_stream(
        &self,
        mut bytes: Box<dyn ByteSource>,
        content_type: Option<&str>,
    ) -> Result<(FileFormatSummary, PipelineStream)> {
        let limit = self.config.pipeline.probe_bytes;
        let mut head = BytesMut::with_capacity(limit);
        while head.len() < limit {
            let chunk = bytes
                .request_bytes(limit - head.len())
                .map_err(|e| PipelineError::io_failure("Failed to read stream bytes", &e))?;
            match chunk {
                Some(chunk) => head.extend_from_slice(&chunk),
                None => break,
            }
        }

        let summary = self.audio_file_format_from_bytes(&head, content_type)?;
        debug!(probed = head.len(), format = ?summary.format_tag, "Probed byte stream");

        let replay = PrefixedByteSource::new(head.freeze(), bytes);
        let stream = PipelineStream::open_push_fed(
            self.config.stream_parsers.as_ref(),
            Box::new(replay),
            summary.file_type,
            &self.config.pipeline,
        )?;
        Ok((summary, stream))
    }

    /// Drop every cached probe result.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.lock().len()
    }
}

/// Output encodings a conversion can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetEncoding {
    #[serde(rename = "PCM_SIGNED")]
    PcmSigned,
}

impl TargetEncoding {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PcmSigned => "PCM_SIGNED",
        }
    }
}

/// Sample sizes a conversion can produce.
pub const SUPPORTED_BITS: [i32; 4] = [8, 16, 24, 32];

/// Lists and performs conversions of pipeline streams to signed PCM.
pub struct FormatConversionProvider {
    config: Arc<CoreConfig>,
}

impl FormatConversionProvider {
    pub fn new(config: Arc<CoreConfig>) -> Self {
        Self { config }
    }

    pub fn target_encodings(&self) -> &'static [TargetEncoding] {
        &[TargetEncoding::PcmSigned]
    }

    /// Codecs the pipeline recognizes as conversion sources.
    pub fn source_encodings(&self) -> &'static [FormatTag] {
        FormatTag::CATALOGUE
    }

    pub fn is_conversion_supported(&self, target: &TargetFormat, source: &StreamFormat) -> bool {
        source.is_known()
            && target.format_tag.is_linear_pcm()
            && SUPPORTED_BITS.contains(&target.bits_per_channel)
    }

    /// Every signed PCM layout reachable from `source`: each supported
    /// sample size in both byte orders, keeping rate and channels.
    pub fn target_formats(&self, encoding: TargetEncoding, source: &StreamFormat) -> Vec<TargetFormat> {
        match encoding {
            TargetEncoding::PcmSigned => SUPPORTED_BITS
                .iter()
                .flat_map(|&bits| {
                    [true, false].map(|big_endian| {
                        TargetFormat::pcm_signed(source.sample_rate, source.channels as i32, bits, big_endian)
                    })
                })
                .collect(),
        }
    }

    /// 16-bit little-endian signed PCM at the source rate and channel count.
    pub fn default_target(&self, source: &StreamFormat) -> TargetFormat {
        TargetFormat::pcm_signed(source.sample_rate, source.channels as i32, 16, false)
    }

    /// Wrap `stream` in a converter producing `target`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnsupportedConversion`] if the target is not signed
    /// PCM with a supported sample size; otherwise whatever
    /// [`TranscodeEngine::configure`](crate::transcode::TranscodeEngine::configure)
    /// reports.
    pub fn convert(&self, mut stream: PipelineStream, target: &TargetFormat) -> Result<PipelineStream> {
        if let Some(source) = stream.format() {
            if !self.is_conversion_supported(target, source) {
                let err = PipelineError::UnsupportedConversion {
                    message: format!(
                        "Conversion from {} to {}-bit {} not supported",
                        source.format_tag, target.bits_per_channel, target.format_tag
                    ),
                    code: StatusCode::UNSUPPORTED_DATA_FORMAT,
                };
                stream.close()?;
                return Err(err);
            }
        }

        stream.convert(
            self.config.converters.clone(),
            target,
            self.config.pipeline.buffer_size,
        )
    }

    /// Convert `stream` to the default layout of `encoding`.
    pub fn convert_to_encoding(
        &self,
        mut stream: PipelineStream,
        encoding: TargetEncoding,
    ) -> Result<PipelineStream> {
        let Some(source) = stream.format().copied() else {
            stream.close()?;
            return Err(PipelineError::UnsupportedFormat {
                message: "Stream format is not known yet".to_string(),
                code: StatusCode::UNSUPPORTED_DATA_FORMAT,
            });
        };
        let target = match encoding {
            TargetEncoding::PcmSigned => self.default_target(&source),
        };
        self.convert(stream, &target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_for_content_type() {
        assert_eq!(hint_for_content_type("audio/mpeg"), FileTypeHint::MP3);
        assert_eq!(hint_for_content_type("audio/mp4; codecs=mp4a"), FileTypeHint::M4A);
        assert_eq!(hint_for_content_type("Audio/VND.Wave"), FileTypeHint::WAVE);
        assert_eq!(hint_for_content_type("text/plain"), FileTypeHint::UNKNOWN);
    }

    #[test]
    fn test_hint_for_locator() {
        assert_eq!(hint_for_locator("/music/a.wav"), FileTypeHint::WAVE);
        assert_eq!(hint_for_locator("file:///music/b.MP3"), FileTypeHint::MP3);
        assert_eq!(hint_for_locator("https://cdn/x/c.m4a?sig=1"), FileTypeHint::M4A);
        assert_eq!(hint_for_locator("/music.dir/noext"), FileTypeHint::UNKNOWN);
    }
}
