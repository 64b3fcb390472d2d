//! Transcode engine tests
//!
//! Covers:
//! - PCM re-encoding through the desktop converters
//! - Engine lifecycle and configure failures
//! - Cookie forwarding and seek-driven resets
//! - Upstream failures surfacing through the converter

mod common;

use std::io::Read;
use std::sync::Arc;

use bridge_desktop::DesktopConverterFactory;
use bridge_traits::{
    error::Result as BridgeResult, AudioFileService, BridgeError, FramePacketTranslation,
    PacketDescriptor, PacketRead, StatusCode, StreamFormat,
};
use bytes::Bytes;
use common::{pcm_bytes, pcm_file, vbr_file, ExpandingFactory, MemoryFile};
use core_pipeline::{
    EngineState, ErrorCategory, PipelineError, PipelineStream, PullSource, RandomAccessSource,
    SharedBuffer, TargetFormat, TranscodeEngine, NOT_SPECIFIED,
};

fn stream_over(file: MemoryFile, capacity: usize) -> PipelineStream {
    let source = RandomAccessSource::from_file(Box::new(file), capacity).unwrap();
    PipelineStream::new(source.into(), capacity)
}

#[test]
fn test_pcm_byte_order_conversion() {
    common::init_tracing();
    let upstream = stream_over(pcm_file(44100.0, 2, 100), 64);
    let target = TargetFormat::pcm_signed(44100.0, 2, 16, true);

    let mut stream = upstream
        .convert(Arc::new(DesktopConverterFactory::new()), &target, 96)
        .unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();

    let expected: Vec<u8> = pcm_bytes(0..100, 2)
        .chunks(2)
        .flat_map(|s| [s[1], s[0]])
        .collect();
    assert_eq!(out, expected);
    assert!(stream.format().unwrap().is_big_endian());
}

#[test]
fn test_pcm_widening_to_24_bit() {
    let upstream = stream_over(pcm_file(8000.0, 1, 40), 32);
    let target = TargetFormat::pcm_signed(8000.0, 1, 24, false);

    let mut stream = upstream
        .convert(Arc::new(DesktopConverterFactory::new()), &target, 30)
        .unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();

    let expected: Vec<u8> = pcm_bytes(0..40, 1)
        .chunks(2)
        .flat_map(|s| [0, s[0], s[1]])
        .collect();
    assert_eq!(out, expected);
}

#[test]
fn test_engine_lifecycle() {
    let mut engine = TranscodeEngine::new(Arc::new(DesktopConverterFactory::new()));
    assert_eq!(engine.state(), EngineState::Uninitialized);
    assert!(engine.fill(&mut SharedBuffer::new(64)).is_err());

    let target = TargetFormat::pcm_signed(44100.0, 2, 16, false);
    engine.configure(&target, stream_over(pcm_file(44100.0, 2, 50), 64)).unwrap();
    assert_eq!(engine.state(), EngineState::Configured);
    assert_eq!(engine.source_format().unwrap().bits_per_channel, 16);

    let mut buffer = SharedBuffer::new(64);
    assert_eq!(engine.fill(&mut buffer).unwrap(), 64);
    assert_eq!(engine.state(), EngineState::Streaming);

    engine.reset().unwrap();
    assert_eq!(engine.state(), EngineState::Reset);

    let second = stream_over(pcm_file(44100.0, 2, 50), 64);
    let err = engine.configure(&target, second).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidArgument(_)));

    engine.close().unwrap();
    engine.close().unwrap();
    assert_eq!(engine.state(), EngineState::Closed);
    assert!(matches!(engine.fill(&mut buffer).unwrap_err(), PipelineError::Closed));
}

#[test]
fn test_invalid_target_closes_upstream() {
    let file = pcm_file(44100.0, 2, 10);
    let closes = file.closes.clone();
    let mut target = TargetFormat::pcm_signed(44100.0, 2, 16, false);
    target.bytes_per_frame = NOT_SPECIFIED;

    let err = stream_over(file, 64)
        .convert(Arc::new(DesktopConverterFactory::new()), &target, 64)
        .err()
        .unwrap();

    assert_eq!(err.to_string(), "frameSize must be positive");
    assert_eq!(err.category(), ErrorCategory::IllegalArgument);
    assert_eq!(closes.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn test_missing_converter_closes_upstream() {
    let file = pcm_file(44100.0, 2, 10);
    let closes = file.closes.clone();
    // Only mono targets are accepted by this factory
    let target = TargetFormat::pcm_signed(44100.0, 2, 16, false);

    let err = stream_over(file, 64)
        .convert(Arc::new(ExpandingFactory::new(1)), &target, 64)
        .err()
        .unwrap();

    assert_eq!(err.to_string(), "Failed to create converter (fmt?)");
    assert!(matches!(err, PipelineError::UnsupportedConversion { .. }));
    assert_eq!(err.category(), ErrorCategory::UnsupportedFormat);
    assert_eq!(closes.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn test_cookie_reaches_converter() {
    let factory = Arc::new(ExpandingFactory::new(4));
    let target = TargetFormat::pcm_signed(44100.0, 1, 16, false);

    let _stream = stream_over(vbr_file(&[5; 4], 4), 64)
        .convert(factory.clone(), &target, 64)
        .unwrap();

    assert_eq!(*factory.cookies.lock(), vec![vec![0x12, 0x10]]);
}

#[test]
fn test_seek_resets_converter_and_skips_frames() {
    let factory = Arc::new(ExpandingFactory::new(4));
    let target = TargetFormat::pcm_signed(44100.0, 1, 16, false);
    let mut stream = stream_over(vbr_file(&[5; 10], 4), 64)
        .convert(factory.clone(), &target, 128)
        .unwrap();

    assert_eq!(stream.frame_length(), Some(40));
    assert!(stream.is_seekable());

    // 227us at 44.1kHz is frame 10: packet 2, two frames in
    let translation = stream.seek_micros(227).unwrap();
    assert_eq!(
        translation,
        FramePacketTranslation {
            packet: 2,
            frame_offset_in_packet: 2,
        }
    );
    assert_eq!(factory.reset_count(), 1);
    assert_eq!(stream.frame_position(), Some(10));

    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    assert_eq!(out.len(), 30 * 2);
    assert_eq!(&out[..4], &[2, 0, 2, 0]);
    assert_eq!(&out[4..12], &[3, 0, 3, 0, 3, 0, 3, 0]);
}

#[test]
fn test_seek_skip_spans_small_output_buffers() {
    let target = TargetFormat::pcm_signed(44100.0, 1, 16, false);
    // Room for one output frame per fill, half the intra-packet skip
    let mut stream = stream_over(vbr_file(&[5; 10], 4), 64)
        .convert(Arc::new(ExpandingFactory::new(4)), &target, 2)
        .unwrap();

    stream.seek_micros(227).unwrap();

    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    assert_eq!(out.len(), 30 * 2);
    assert_eq!(&out[..8], &[2, 0, 2, 0, 3, 0, 3, 0]);
}

#[test]
fn test_unspecified_rate_and_channels_follow_source() {
    let mut target = TargetFormat::pcm_signed(44100.0, 2, 16, false);
    target.sample_rate = NOT_SPECIFIED as f64;
    target.channels = NOT_SPECIFIED;

    let mut stream = stream_over(pcm_file(44100.0, 2, 44100), 256)
        .convert(Arc::new(DesktopConverterFactory::new()), &target, 256)
        .unwrap();

    let format = stream.format().unwrap();
    assert_eq!(format.sample_rate, 44100.0);
    assert_eq!(format.channels, 2);

    let summary = stream.summary().unwrap();
    assert_eq!(summary.sample_rate, 44100.0);
    assert_eq!(summary.channels, 2);
    assert_eq!(summary.frame_rate, 44100.0);
    assert_eq!(summary.duration_micros, 1_000_000);

    stream.seek_micros(500_000).unwrap();
    assert_eq!(stream.frame_position(), Some(22050));
    let mut frame = [0u8; 4];
    stream.read_exact(&mut frame).unwrap();
    assert_eq!(frame.to_vec(), pcm_bytes(22050..22051, 2));
}

#[test]
fn test_fill_after_end_of_stream_is_repeatable() {
    let mut engine = TranscodeEngine::new(Arc::new(DesktopConverterFactory::new()));
    let target = TargetFormat::pcm_signed(44100.0, 2, 16, true);
    engine.configure(&target, stream_over(pcm_file(44100.0, 2, 30), 64)).unwrap();

    let mut buffer = SharedBuffer::new(64);
    let mut total = 0;
    loop {
        let written = engine.fill(&mut buffer).unwrap();
        if written == 0 {
            break;
        }
        total += written;
    }
    assert_eq!(total, 30 * 4);

    let end = engine.position().packet_position;
    for _ in 0..3 {
        assert_eq!(engine.fill(&mut buffer).unwrap(), 0);
        assert_eq!(engine.position().packet_position, end);
    }
}

#[test]
fn test_fill_into_buffer_smaller_than_packet() {
    let mut engine = TranscodeEngine::new(Arc::new(DesktopConverterFactory::new()));
    let target = TargetFormat::pcm_signed(44100.0, 2, 16, false);
    engine.configure(&target, stream_over(pcm_file(44100.0, 2, 10), 64)).unwrap();

    let err = engine.fill(&mut SharedBuffer::new(3)).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::CapacityExceeded {
            needed: 4,
            available: 3,
            ..
        }
    ));
    assert_eq!(engine.state(), EngineState::Configured);
}

#[test]
fn test_converted_summary_uses_upstream_frames() {
    let target = TargetFormat::pcm_signed(44100.0, 1, 16, false);
    let stream = stream_over(vbr_file(&[5; 10], 4), 64)
        .convert(Arc::new(ExpandingFactory::new(4)), &target, 64)
        .unwrap();

    let summary = stream.summary().unwrap();
    assert_eq!(summary.frame_length, 40);
    assert_eq!(summary.frame_size, 2);
    assert_eq!(summary.duration_micros, 907);
    assert!(!summary.is_vbr);
}

/// Serves a format but fails every read.
struct BrokenFile;

impl AudioFileService for BrokenFile {
    fn data_format(&self) -> BridgeResult<StreamFormat> {
        Ok(StreamFormat::linear_pcm(44100.0, 1, 16, false))
    }

    fn packet_count(&self) -> BridgeResult<u64> {
        Ok(1000)
    }

    fn packet_size_upper_bound(&self) -> BridgeResult<u32> {
        Ok(2)
    }

    fn magic_cookie(&self) -> BridgeResult<Option<Bytes>> {
        Ok(None)
    }

    fn read_packets(
        &mut self,
        _start_packet: i64,
        _max_packets: u32,
        _buffer: &mut [u8],
        _descriptors: &mut Vec<PacketDescriptor>,
    ) -> BridgeResult<PacketRead> {
        Err(BridgeError::failed("sector error", StatusCode::INVALID_FILE))
    }

    fn frame_to_packet(&self, frame: i64) -> BridgeResult<FramePacketTranslation> {
        Ok(FramePacketTranslation {
            packet: frame,
            frame_offset_in_packet: 0,
        })
    }

    fn close(&mut self) -> BridgeResult<()> {
        Ok(())
    }
}

#[test]
fn test_upstream_failure_is_reported() {
    let source = RandomAccessSource::from_file(Box::new(BrokenFile), 64).unwrap();
    let upstream = PipelineStream::new(source.into(), 64);
    let target = TargetFormat::pcm_signed(44100.0, 1, 16, true);

    let mut stream = upstream
        .convert(Arc::new(DesktopConverterFactory::new()), &target, 64)
        .unwrap();
    let err = stream.fill_buffer().unwrap_err();

    assert_eq!(err.to_string(), "Failed to read packets (dta?)");
    assert!(matches!(err, PipelineError::IoFailure { .. }));
}
