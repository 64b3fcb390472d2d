//! Host provider tests
//!
//! Covers:
//! - Probe caching in `AudioFileReader`
//! - Byte-stream probing with replay of the probed head
//! - Target listing and conversion in `FormatConversionProvider`

mod common;

use std::io::Read;
use std::sync::Arc;

use bridge_desktop::{DesktopConverterFactory, WaveStreamParserFactory};
use bridge_traits::{FileTypeHint, FormatTag, StatusCode, StreamFormat};
use common::{pcm_bytes, pcm_file, pipeline_config, wav_bytes, ChunkedBytes, MemoryOpener};
use core_pipeline::{
    AudioFileReader, ErrorCategory, FormatConversionProvider, PipelineError, PipelineStream,
    TargetEncoding, TargetFormat,
};
use core_runtime::config::PipelineConfig;
use core_runtime::CoreConfig;

fn core_config(opener: Arc<MemoryOpener>, pipeline: PipelineConfig) -> Arc<CoreConfig> {
    let config = CoreConfig::builder()
        .file_opener(opener)
        .stream_parsers(Arc::new(WaveStreamParserFactory::new()))
        .converters(Arc::new(DesktopConverterFactory::new()))
        .pipeline(pipeline)
        .build()
        .unwrap();
    Arc::new(config)
}

fn library() -> Arc<MemoryOpener> {
    Arc::new(
        MemoryOpener::default()
            .with_file("/music/a.wav", pcm_file(44100.0, 2, 44100))
            .with_file("/music/b.wav", pcm_file(8000.0, 1, 800))
            .with_file("/music/c.wav", pcm_file(22050.0, 1, 100)),
    )
}

// ============================================================================
// AudioFileReader
// ============================================================================

#[test]
fn test_probe_results_are_cached() {
    common::init_tracing();
    let opener = library();
    let reader = AudioFileReader::new(core_config(opener.clone(), pipeline_config(1024)));

    let first = reader.audio_file_format("/music/a.wav").unwrap();
    let second = reader.audio_file_format("/music/a.wav").unwrap();

    assert_eq!(first, second);
    assert_eq!(first.file_type, FileTypeHint::WAVE);
    assert_eq!(first.duration_micros, 1_000_000);
    assert_eq!(opener.open_count(), 1);
    assert_eq!(reader.cached_entries(), 1);

    reader.clear_cache();
    reader.audio_file_format("/music/a.wav").unwrap();
    assert_eq!(opener.open_count(), 2);
}

#[test]
fn test_cache_is_bounded() {
    let pipeline = PipelineConfig {
        format_cache_entries: 2,
        ..pipeline_config(1024)
    };
    let opener = library();
    let reader = AudioFileReader::new(core_config(opener.clone(), pipeline));

    for locator in ["/music/a.wav", "/music/b.wav", "/music/c.wav"] {
        reader.audio_file_format(locator).unwrap();
    }
    assert_eq!(reader.cached_entries(), 2);

    // Least recently used entry was evicted
    reader.audio_file_format("/music/a.wav").unwrap();
    assert_eq!(opener.open_count(), 4);
}

#[test]
fn test_missing_file_is_not_cached() {
    let reader = AudioFileReader::new(core_config(library(), pipeline_config(1024)));

    let err = reader.audio_file_format("/music/missing.wav").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::FileNotFound);
    assert_eq!(reader.cached_entries(), 0);
}

#[test]
fn test_open_stream_reads_packets() {
    let reader = AudioFileReader::new(core_config(library(), pipeline_config(64)));
    let mut stream = reader.open_stream("/music/b.wav").unwrap();

    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    assert_eq!(out, pcm_bytes(0..800, 1));
}

#[test]
fn test_byte_stream_replays_probed_head() {
    let pipeline = PipelineConfig {
        probe_bytes: 100,
        ..pipeline_config(256)
    };
    let reader = AudioFileReader::new(core_config(library(), pipeline));
    let wav = wav_bytes(8000, 2, 300);

    let (summary, mut stream) = reader
        .open_byte_stream(Box::new(ChunkedBytes::new(&wav, 30)), Some("audio/vnd.wave"))
        .unwrap();

    assert_eq!(summary.file_type, FileTypeHint::WAVE);
    assert_eq!(summary.format_tag, FormatTag::LINEAR_PCM);
    assert_eq!(summary.frame_length, 300);

    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    assert_eq!(out, pcm_bytes(0..300, 2));
}

#[test]
fn test_byte_stream_without_content_type() {
    let reader = AudioFileReader::new(core_config(library(), pipeline_config(256)));
    let wav = wav_bytes(8000, 1, 10);

    let (summary, _stream) = reader
        .open_byte_stream(Box::new(ChunkedBytes::new(&wav, 8)), None)
        .unwrap();
    assert_eq!(summary.file_type, FileTypeHint::UNKNOWN);
    assert_eq!(summary.channels, 1);
}

#[test]
fn test_head_with_unparseable_content_type() {
    let reader = AudioFileReader::new(core_config(library(), pipeline_config(256)));
    let wav = wav_bytes(8000, 1, 10);

    let err = reader
        .audio_file_format_from_bytes(&wav, Some("audio/mpeg"))
        .unwrap_err();
    assert_eq!(err.to_string(), "Failed to open audio stream (typ?)");
}

// ============================================================================
// FormatConversionProvider
// ============================================================================

#[test]
fn test_target_listing() {
    let provider = FormatConversionProvider::new(core_config(library(), pipeline_config(1024)));
    assert_eq!(provider.target_encodings(), &[TargetEncoding::PcmSigned]);
    assert_eq!(TargetEncoding::PcmSigned.name(), "PCM_SIGNED");
    assert!(provider.source_encodings().contains(&FormatTag::MPEG4_AAC));

    let source = StreamFormat::linear_pcm(44100.0, 2, 16, false);
    let targets = provider.target_formats(TargetEncoding::PcmSigned, &source);

    assert_eq!(targets.len(), 8);
    for bits in [8, 16, 24, 32] {
        for big_endian in [true, false] {
            assert!(targets
                .iter()
                .any(|t| t.bits_per_channel == bits && t.big_endian == big_endian));
        }
    }
    assert!(targets.iter().all(|t| t.channels == 2 && t.sample_rate == 44100.0));
}

#[test]
fn test_conversion_support() {
    let provider = FormatConversionProvider::new(core_config(library(), pipeline_config(1024)));
    let aac = StreamFormat {
        sample_rate: 44100.0,
        format_tag: FormatTag::MPEG4_AAC,
        frames_per_packet: 1024,
        channels: 2,
        ..Default::default()
    };

    assert!(provider.is_conversion_supported(&TargetFormat::pcm_signed(44100.0, 2, 16, false), &aac));
    assert!(!provider.is_conversion_supported(&TargetFormat::pcm_signed(44100.0, 2, 12, false), &aac));

    let unknown = StreamFormat {
        format_tag: FormatTag::from_fourcc(*b"zzzz"),
        ..aac
    };
    assert!(!provider.is_conversion_supported(&TargetFormat::pcm_signed(44100.0, 2, 16, false), &unknown));
}

#[test]
fn test_unsupported_target_closes_stream() {
    let file = pcm_file(44100.0, 2, 10);
    let closes = file.closes.clone();
    let opener = Arc::new(MemoryOpener::default().with_file("/music/d.wav", file));
    let config = core_config(opener, pipeline_config(1024));
    let provider = FormatConversionProvider::new(config.clone());

    let stream = AudioFileReader::new(config).open_stream("/music/d.wav").unwrap();
    let err = provider
        .convert(stream, &TargetFormat::pcm_signed(44100.0, 2, 12, false))
        .err()
        .unwrap();

    assert_eq!(
        err.to_string(),
        "Conversion from lpcm to 12-bit lpcm not supported (fmt?)"
    );
    assert_eq!(err.code(), Some(StatusCode::UNSUPPORTED_DATA_FORMAT));
    assert_eq!(closes.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn test_convert_to_default_encoding() {
    let config = core_config(library(), pipeline_config(64));
    let provider = FormatConversionProvider::new(config.clone());
    let stream = AudioFileReader::new(config).open_stream("/music/b.wav").unwrap();

    let mut pcm = provider
        .convert_to_encoding(stream, TargetEncoding::PcmSigned)
        .unwrap();
    let format = *pcm.format().unwrap();
    assert_eq!(format.bits_per_channel, 16);
    assert_eq!(format.channels, 1);
    assert!(!format.is_big_endian());

    let mut out = Vec::new();
    pcm.read_to_end(&mut out).unwrap();
    assert_eq!(out, pcm_bytes(0..800, 1));
}

#[test]
fn test_convert_before_format_is_known() {
    let config = core_config(library(), pipeline_config(64));
    let provider = FormatConversionProvider::new(config);
    let stream = PipelineStream::open_parser(
        &WaveStreamParserFactory::new(),
        FileTypeHint::WAVE,
        &pipeline_config(64),
    )
    .unwrap();

    let err = provider
        .convert_to_encoding(stream, TargetEncoding::PcmSigned)
        .err()
        .unwrap();
    assert!(matches!(err, PipelineError::UnsupportedFormat { .. }));
    assert_eq!(err.to_string(), "Stream format is not known yet (fmt?)");
}

#[test]
fn test_target_encoding_wire_name() {
    assert_eq!(
        serde_json::to_string(&TargetEncoding::PcmSigned).unwrap(),
        "\"PCM_SIGNED\""
    );
}
