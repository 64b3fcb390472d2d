//! In-memory backends shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bridge_traits::{
    error::Result, AudioConverter, AudioFileOpener, AudioFileService, BridgeError, ByteSource,
    ConverterFactory, ConverterInput, FileTypeHint, FormatTag, FramePacketTranslation,
    PacketDescriptor, PacketRead, StatusCode, StreamFormat,
};
use bytes::Bytes;
use core_runtime::config::PipelineConfig;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("core_pipeline=debug")
        .with_test_writer()
        .try_init();
}

pub fn pipeline_config(buffer_size: usize) -> PipelineConfig {
    PipelineConfig {
        buffer_size,
        stream_read_chunk: 64,
        ..PipelineConfig::default()
    }
}

// ============================================================================
// Random-access file
// ============================================================================

/// A file held as a list of packets.
#[derive(Clone)]
pub struct MemoryFile {
    pub format: StreamFormat,
    pub packets: Vec<Vec<u8>>,
    pub cookie: Option<Bytes>,
    pub closes: Arc<AtomicUsize>,
}

impl MemoryFile {
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn total_frames(&self) -> i64 {
        self.packets.len() as i64 * self.format.frames_per_packet as i64
    }
}

/// 16-bit little-endian PCM where frame `i` holds the sample `i` in every
/// channel.
pub fn pcm_file(sample_rate: f64, channels: u32, frames: usize) -> MemoryFile {
    let packets = (0..frames)
        .map(|frame| {
            let sample = (frame as u16).to_le_bytes();
            sample.repeat(channels as usize)
        })
        .collect();
    MemoryFile {
        format: StreamFormat::linear_pcm(sample_rate, channels, 16, false),
        packets,
        cookie: None,
        closes: Arc::default(),
    }
}

/// Variable bitrate file; packet `i` is `sizes[i]` copies of the byte `i`.
pub fn vbr_file(sizes: &[usize], frames_per_packet: u32) -> MemoryFile {
    MemoryFile {
        format: StreamFormat {
            sample_rate: 44100.0,
            format_tag: FormatTag::MPEG4_AAC,
            frames_per_packet,
            channels: 2,
            ..Default::default()
        },
        packets: sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| vec![i as u8; size])
            .collect(),
        cookie: Some(Bytes::from_static(&[0x12, 0x10])),
        closes: Arc::default(),
    }
}

pub fn pcm_bytes(frames: std::ops::Range<usize>, channels: usize) -> Vec<u8> {
    frames
        .flat_map(|frame| (frame as u16).to_le_bytes().repeat(channels))
        .collect()
}

impl AudioFileService for MemoryFile {
    fn data_format(&self) -> Result<StreamFormat> {
        Ok(self.format)
    }

    fn packet_count(&self) -> Result<u64> {
        Ok(self.packets.len() as u64)
    }

    fn packet_size_upper_bound(&self) -> Result<u32> {
        Ok(self.packets.iter().map(|p| p.len() as u32).max().unwrap_or(0))
    }

    fn magic_cookie(&self) -> Result<Option<Bytes>> {
        Ok(self.cookie.clone())
    }

    fn read_packets(
        &mut self,
        start_packet: i64,
        max_packets: u32,
        buffer: &mut [u8],
        descriptors: &mut Vec<PacketDescriptor>,
    ) -> Result<PacketRead> {
        if start_packet < 0 {
            return Err(BridgeError::failed("negative packet", StatusCode::INVALID_PACKET_OFFSET));
        }

        let mut read = PacketRead::default();
        for packet in self.packets.iter().skip(start_packet as usize).take(max_packets as usize) {
            if read.bytes + packet.len() > buffer.len() {
                break;
            }
            buffer[read.bytes..read.bytes + packet.len()].copy_from_slice(packet);
            if self.format.is_vbr() {
                descriptors.push(PacketDescriptor::new(read.bytes as u64, packet.len() as u32));
            }
            read.bytes += packet.len();
            read.packets += 1;
        }
        Ok(read)
    }

    fn frame_to_packet(&self, frame: i64) -> Result<FramePacketTranslation> {
        if frame < 0 || frame > self.total_frames() {
            return Err(BridgeError::failed("frame out of range", StatusCode::INVALID_PACKET_OFFSET));
        }
        let fpp = self.format.frames_per_packet.max(1) as i64;
        Ok(FramePacketTranslation {
            packet: frame / fpp,
            frame_offset_in_packet: (frame % fpp) as u32,
        })
    }

    fn byte_length(&self) -> Option<u64> {
        Some(self.packets.iter().map(|p| p.len() as u64).sum())
    }

    fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Serves [`MemoryFile`]s by locator.
#[derive(Default)]
pub struct MemoryOpener {
    files: HashMap<String, MemoryFile>,
    opens: AtomicUsize,
}

impl MemoryOpener {
    pub fn with_file(mut self, locator: &str, file: MemoryFile) -> Self {
        self.files.insert(locator.to_string(), file);
        self
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl AudioFileOpener for MemoryOpener {
    fn open(&self, locator: &str, _hint: FileTypeHint) -> Result<Box<dyn AudioFileService>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match self.files.get(locator) {
            Some(file) => Ok(Box::new(file.clone())),
            None => Err(BridgeError::NotFound(locator.to_string())),
        }
    }
}

// ============================================================================
// Byte sources
// ============================================================================

/// Hands out fixed chunks, then reports end of stream.
pub struct ChunkedBytes {
    chunks: VecDeque<Bytes>,
}

impl ChunkedBytes {
    pub fn new(data: &[u8], chunk: usize) -> Self {
        Self {
            chunks: data.chunks(chunk).map(Bytes::copy_from_slice).collect(),
        }
    }
}

impl ByteSource for ChunkedBytes {
    fn request_bytes(&mut self, max_len: usize) -> Result<Option<Bytes>> {
        let Some(mut chunk) = self.chunks.pop_front() else {
            return Ok(None);
        };
        if chunk.len() > max_len {
            let rest = chunk.split_off(max_len);
            self.chunks.push_front(rest);
        }
        Ok(Some(chunk))
    }
}

/// Canonical 44-byte-header WAVE file with 16-bit PCM from [`pcm_bytes`].
pub fn wav_bytes(sample_rate: u32, channels: u16, frames: usize) -> Vec<u8> {
    let data = pcm_bytes(0..frames, channels as usize);
    let block_align = channels * 2;

    let mut out = Vec::with_capacity(44 + data.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&data);
    out
}

// ============================================================================
// Converters
// ============================================================================

/// Expands every input packet into `frames_per_packet` 16-bit mono frames
/// whose sample is the packet's first byte.
pub struct ExpandingFactory {
    pub frames_per_packet: u32,
    pub resets: Arc<AtomicUsize>,
    pub cookies: Arc<parking_lot::Mutex<Vec<Vec<u8>>>>,
}

impl ExpandingFactory {
    pub fn new(frames_per_packet: u32) -> Self {
        Self {
            frames_per_packet,
            resets: Arc::default(),
            cookies: Arc::default(),
        }
    }

    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

impl ConverterFactory for ExpandingFactory {
    fn new_converter(&self, from: &StreamFormat, to: &StreamFormat) -> Result<Box<dyn AudioConverter>> {
        if to.bits_per_channel != 16 || to.channels != 1 {
            return Err(BridgeError::unsupported("only 16-bit mono", StatusCode::UNSUPPORTED_DATA_FORMAT));
        }
        Ok(Box::new(ExpandingConverter {
            frames_per_packet: self.frames_per_packet,
            source_packet_size: from.bytes_per_packet as usize,
            pending: VecDeque::new(),
            resets: self.resets.clone(),
            cookies: self.cookies.clone(),
        }))
    }
}

struct ExpandingConverter {
    frames_per_packet: u32,
    source_packet_size: usize,
    pending: VecDeque<u8>,
    resets: Arc<AtomicUsize>,
    cookies: Arc<parking_lot::Mutex<Vec<Vec<u8>>>>,
}

impl AudioConverter for ExpandingConverter {
    fn set_decompression_cookie(&mut self, cookie: &[u8]) -> Result<()> {
        self.cookies.lock().push(cookie.to_vec());
        Ok(())
    }

    fn fill_buffer(
        &mut self,
        input: &mut dyn ConverterInput,
        output: &mut [u8],
        max_packets: u32,
        _descriptors: &mut Vec<PacketDescriptor>,
    ) -> Result<u32> {
        let wanted = (max_packets as usize * 2).min(output.len() / 2 * 2);
        while self.pending.len() < wanted {
            let packets = input.supply()?;
            if packets.is_end_of_stream() {
                break;
            }
            let starts: Vec<usize> = match packets.descriptors {
                Some(descriptors) => descriptors.iter().map(|d| d.start_offset as usize).collect(),
                None => (0..packets.packet_count as usize)
                    .map(|i| i * self.source_packet_size)
                    .collect(),
            };
            for start in starts {
                let sample = (packets.data[start] as i16).to_le_bytes();
                for _ in 0..self.frames_per_packet {
                    self.pending.extend(sample);
                }
            }
        }

        let count = self.pending.len().min(wanted);
        for (slot, byte) in output.iter_mut().zip(self.pending.drain(..count)) {
            *slot = byte;
        }
        Ok((count / 2) as u32)
    }

    fn reset(&mut self) -> Result<()> {
        self.pending.clear();
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
