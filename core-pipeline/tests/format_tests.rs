//! Format summary tests
//!
//! Covers derived fields for complete and streamed sources, probing by
//! locator and by stream head, and the serialized form hosts consume.

mod common;

use std::time::Duration;

use bridge_desktop::WaveStreamParserFactory;
use bridge_traits::{FileTypeHint, FormatTag, StatusCode, StreamFormat};
use common::{pcm_file, wav_bytes, MemoryOpener};
use core_pipeline::{ErrorCategory, FormatNegotiator, PipelineError, PipelineStream, NOT_SPECIFIED};

fn aac_format() -> StreamFormat {
    StreamFormat {
        sample_rate: 44100.0,
        format_tag: FormatTag::MPEG4_AAC,
        frames_per_packet: 1024,
        channels: 2,
        ..Default::default()
    }
}

// ============================================================================
// Derived fields
// ============================================================================

#[test]
fn test_cd_quality_pcm() {
    let format = StreamFormat::linear_pcm(44100.0, 2, 16, false);
    let summary = FormatNegotiator::summarize(&format, 44100);

    assert_eq!(summary.format_tag, FormatTag::LINEAR_PCM);
    assert_eq!(summary.sample_rate, 44100.0);
    assert_eq!(summary.bits_per_sample, 16);
    assert_eq!(summary.channels, 2);
    assert_eq!(summary.frame_size, 4);
    assert_eq!(summary.frame_rate, 44100.0);
    assert_eq!(summary.frame_length, 44100);
    assert_eq!(summary.bit_rate, 1_411_200);
    assert_eq!(summary.duration_micros, 1_000_000);
    assert_eq!(summary.duration(), Some(Duration::from_secs(1)));
    assert!(!summary.is_vbr);
    assert!(!summary.big_endian);

    let ten_seconds = FormatNegotiator::summarize(&format, 441_000);
    assert_eq!(ten_seconds.duration_micros, 10_000_000);
}

#[test]
fn test_big_endian_pcm() {
    let format = StreamFormat::linear_pcm(48000.0, 1, 24, true);
    let summary = FormatNegotiator::summarize(&format, 48000);

    assert!(summary.big_endian);
    assert_eq!(summary.frame_size, 3);
    assert_eq!(summary.bit_rate, 1_152_000);
}

#[test]
fn test_vbr_codec() {
    let summary = FormatNegotiator::summarize(&aac_format(), 431);

    assert!(summary.is_vbr);
    assert_eq!(summary.bit_rate, NOT_SPECIFIED);
    assert_eq!(summary.frame_size, NOT_SPECIFIED);
    assert_eq!(summary.bits_per_sample, NOT_SPECIFIED);
    assert!((summary.frame_rate - 43.066_406).abs() < 1e-3);
    assert_eq!(summary.frame_length, 431);
    assert_eq!(summary.duration_micros, 10_007_800);
}

#[test]
fn test_variable_frames_per_packet() {
    let format = StreamFormat {
        sample_rate: 48000.0,
        format_tag: FormatTag::OPUS,
        channels: 2,
        ..Default::default()
    };
    let summary = FormatNegotiator::summarize(&format, 50);

    assert_eq!(summary.frame_rate, NOT_SPECIFIED as f32);
    assert!(summary.is_vbr);
    assert_eq!(summary.bit_rate, NOT_SPECIFIED);
}

#[test]
fn test_streamed_without_packet_count() {
    let summary = FormatNegotiator::summarize_streamed(&StreamFormat::linear_pcm(8000.0, 1, 8, false), None);
    assert_eq!(summary.frame_length, NOT_SPECIFIED as i64);
    assert_eq!(summary.duration_micros, NOT_SPECIFIED as i64);
    assert_eq!(summary.duration(), None);
    assert_eq!(summary.bit_rate, NOT_SPECIFIED);
    // Plain PCM still reports one frame per sample
    assert_eq!(summary.frame_rate, 8000.0);

    let summary = FormatNegotiator::summarize_streamed(&aac_format(), None);
    assert_eq!(summary.frame_rate, NOT_SPECIFIED as f32);
    assert!(summary.is_vbr);
}

#[test]
fn test_streamed_with_packet_count() {
    let format = StreamFormat::linear_pcm(8000.0, 1, 16, false);
    let summary = FormatNegotiator::summarize_streamed(&format, Some(100));

    assert_eq!(summary.frame_length, 100);
    assert_eq!(summary.duration_micros, 12_500);
    assert_eq!(summary.bit_rate, NOT_SPECIFIED);
}

// ============================================================================
// Probing
// ============================================================================

#[test]
fn test_probe_locator_closes_file() {
    let file = pcm_file(8000.0, 2, 8000);
    let closes = file.closes.clone();
    let opener = MemoryOpener::default().with_file("/music/tone.wav", file);

    let summary = FormatNegotiator::probe_locator(&opener, "/music/tone.wav", FileTypeHint::WAVE).unwrap();

    assert_eq!(summary.file_type, FileTypeHint::WAVE);
    assert_eq!(summary.duration_micros, 1_000_000);
    assert_eq!(summary.byte_length, 32_000);
    assert_eq!(closes.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn test_probe_missing_locator() {
    let err = FormatNegotiator::probe_locator(&MemoryOpener::default(), "/music/gone.mp3", FileTypeHint::MP3)
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::FileNotFound);
}

#[test]
fn test_probe_stream_head() {
    let wav = wav_bytes(8000, 1, 100);
    let summary = FormatNegotiator::probe_bytes(&WaveStreamParserFactory::new(), &wav, FileTypeHint::WAVE).unwrap();

    assert_eq!(summary.format_tag, FormatTag::LINEAR_PCM);
    assert_eq!(summary.file_type, FileTypeHint::WAVE);
    assert_eq!(summary.frame_length, 100);
    assert_eq!(summary.duration_micros, 12_500);
    assert_eq!(summary.byte_length, NOT_SPECIFIED as i64);
}

#[test]
fn test_probe_truncated_head() {
    let wav = wav_bytes(8000, 1, 100);
    let err = FormatNegotiator::probe_bytes(&WaveStreamParserFactory::new(), &wav[..20], FileTypeHint::WAVE)
        .unwrap_err();

    assert_eq!(err.to_string(), "Failed to get data format from stream (fmt?)");
    assert_eq!(err.code(), Some(StatusCode::UNSUPPORTED_DATA_FORMAT));
}

#[test]
fn test_summary_before_format_is_known() {
    let stream = PipelineStream::open_parser(
        &WaveStreamParserFactory::new(),
        FileTypeHint::WAVE,
        &common::pipeline_config(1024),
    )
    .unwrap();

    let err = stream.summary().unwrap_err();
    assert!(matches!(err, PipelineError::UnsupportedFormat { .. }));
}

#[test]
fn test_summary_serializes_for_hosts() {
    let summary = FormatNegotiator::summarize(&StreamFormat::linear_pcm(44100.0, 2, 16, false), 44100);
    let json = serde_json::to_value(&summary).unwrap();

    assert_eq!(json["bit_rate"], 1_411_200);
    assert_eq!(json["duration_micros"], 1_000_000);
    assert_eq!(json["frame_size"], 4);
    assert_eq!(json["is_vbr"], false);
    assert_eq!(json["byte_length"], -1);
}
