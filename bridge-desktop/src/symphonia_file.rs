//! # Symphonia File Service
//!
//! Random-access [`AudioFileService`] over symphonia's demuxers.
//!
//! ## Packet Model
//!
//! - **PCM tracks** are constant bitrate with one frame per packet. The
//!   demuxer hands out blocks of many frames, so reads cut them into frames
//!   and carry the remainder over to the next read.
//! - **Compressed tracks** are variable bitrate. The file is scanned once at
//!   open to build a packet index (timestamp, duration, size), which answers
//!   packet counts, packet size bounds and frame-to-packet translation. The
//!   demuxer is then reopened for reading.

use std::fs::File;
use std::io::{Cursor, ErrorKind};
use std::path::PathBuf;

use bridge_traits::{
    error::{BridgeError, Result},
    AudioFileOpener, AudioFileService, FileTypeHint, FormatFlags, FramePacketTranslation,
    PacketDescriptor, PacketRead, StatusCode, StreamFormat,
};
use bytes::Bytes;
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::units::TimeBase;
use tracing::{debug, info, instrument, warn};

use crate::filesystem::resolve_locator;
use crate::format_detector::FormatDetector;

/// Opens local files and in-memory buffers with symphonia.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaFileOpener;

impl SymphoniaFileOpener {
    pub fn new() -> Self {
        Self
    }

    /// Open an in-memory file.
    pub fn open_bytes(&self, data: Bytes, hint: FileTypeHint) -> Result<SymphoniaAudioFile> {
        SymphoniaAudioFile::open(MediaOrigin::Memory(data), hint)
    }
}

impl AudioFileOpener for SymphoniaFileOpener {
    fn open(&self, locator: &str, hint: FileTypeHint) -> Result<Box<dyn AudioFileService>> {
        let path = resolve_locator(locator)?;
        Ok(Box::new(SymphoniaAudioFile::open(MediaOrigin::Path(path), hint)?))
    }
}

/// Where the file bytes come from; kept so the demuxer can be reopened.
#[derive(Debug, Clone)]
enum MediaOrigin {
    Path(PathBuf),
    Memory(Bytes),
}

impl MediaOrigin {
    fn stream(&self) -> Result<MediaSourceStream> {
        let source: Box<dyn MediaSource> = match self {
            Self::Path(path) => Box::new(File::open(path)?),
            Self::Memory(data) => Box::new(Cursor::new(data.clone())),
        };
        Ok(MediaSourceStream::new(source, Default::default()))
    }

    fn byte_length(&self) -> Option<u64> {
        match self {
            Self::Path(path) => std::fs::metadata(path).ok().map(|m| m.len()),
            Self::Memory(data) => Some(data.len() as u64),
        }
    }

    fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Path(path) => Some(path),
            Self::Memory(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PacketEntry {
    ts: u64,
    dur: u64,
    size: u32,
}

enum Layout {
    Pcm { bytes_per_frame: usize },
    Packets { index: Vec<PacketEntry> },
}

/// One open audio file.
pub struct SymphoniaAudioFile {
    origin: MediaOrigin,
    hint: FileTypeHint,
    reader: Option<Box<dyn FormatReader>>,
    track_id: u32,
    time_base: Option<TimeBase>,
    format: StreamFormat,
    cookie: Option<Bytes>,
    layout: Layout,
    total_frames: u64,
    /// Next packet the reader delivers (a frame index for PCM).
    cursor: u64,
    /// PCM bytes of frames starting at `cursor`.
    carry: Vec<u8>,
    /// Compressed packet read ahead while repositioning.
    peeked: Option<Packet>,
}

impl SymphoniaAudioFile {
    #[instrument(skip(origin, hint), fields(hint = %hint))]
    fn open(origin: MediaOrigin, hint: FileTypeHint) -> Result<Self> {
        let mut reader = probe(&origin, hint)?;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                BridgeError::unsupported("No supported audio tracks", StatusCode::UNSUPPORTED_FILE_TYPE)
            })?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params.sample_rate.filter(|rate| *rate > 0).ok_or_else(|| {
            BridgeError::unsupported("Missing sample rate", StatusCode::UNSUPPORTED_DATA_FORMAT)
        })?;
        let channels = params.channels.map(|c| c.count() as u32).unwrap_or(0);

        let mut file = if let Some(pcm) = FormatDetector::pcm_layout(params.codec) {
            if channels == 0 {
                return Err(BridgeError::unsupported(
                    "Missing channel layout",
                    StatusCode::UNSUPPORTED_DATA_FORMAT,
                ));
            }
            let bytes_per_frame = pcm.bits.div_ceil(8) * channels;
            Self {
                origin,
                hint,
                reader: Some(reader),
                track_id,
                time_base: params.time_base,
                format: StreamFormat {
                    sample_rate: sample_rate as f64,
                    format_tag: pcm.format_tag,
                    flags: pcm.flags,
                    bytes_per_packet: bytes_per_frame,
                    frames_per_packet: 1,
                    bytes_per_frame,
                    channels,
                    bits_per_channel: pcm.bits,
                },
                cookie: None,
                layout: Layout::Pcm {
                    bytes_per_frame: bytes_per_frame as usize,
                },
                total_frames: params.n_frames.unwrap_or(0),
                cursor: 0,
                carry: Vec::new(),
                peeked: None,
            }
        } else {
            let format_tag = FormatDetector::format_tag(params.codec);
            if !format_tag.is_known() {
                return Err(BridgeError::unsupported(
                    format!("Unsupported codec {:?}", params.codec),
                    StatusCode::UNSUPPORTED_DATA_FORMAT,
                ));
            }

            let index = scan_packets(reader.as_mut(), track_id)?;
            let frames_per_packet = index
                .iter()
                .map(|e| e.dur)
                .max()
                .or(params.max_frames_per_packet)
                .unwrap_or(0);
            let indexed_frames: u64 = index.iter().map(|e| e.dur).sum();

            Self {
                reader: Some(probe(&origin, hint)?),
                origin,
                hint,
                track_id,
                time_base: params.time_base,
                format: StreamFormat {
                    sample_rate: sample_rate as f64,
                    format_tag,
                    flags: FormatFlags::NONE,
                    bytes_per_packet: 0,
                    frames_per_packet: frames_per_packet.min(u32::MAX as u64) as u32,
                    bytes_per_frame: 0,
                    channels,
                    bits_per_channel: 0,
                },
                cookie: params.extra_data.as_deref().map(Bytes::copy_from_slice),
                layout: Layout::Packets { index },
                total_frames: params.n_frames.unwrap_or(indexed_frames),
                cursor: 0,
                carry: Vec::new(),
                peeked: None,
            }
        };

        if file.time_base.is_none() {
            file.time_base = Some(TimeBase::new(1, sample_rate));
        }

        info!(
            format = %file.format.format_tag,
            sample_rate,
            channels,
            frames = file.total_frames,
            "Opened audio file"
        );
        Ok(file)
    }

    fn reader(&mut self) -> Result<&mut Box<dyn FormatReader>> {
        self.reader
            .as_mut()
            .ok_or_else(|| BridgeError::failed("Audio file is closed", StatusCode::GENERIC))
    }

    /// Next packet of the selected track, or `None` at end of stream.
    fn next_packet(&mut self) -> Result<Option<Packet>> {
        if let Some(packet) = self.peeked.take() {
            return Ok(Some(packet));
        }
        let track_id = self.track_id;
        next_track_packet(self.reader()?.as_mut(), track_id)
    }

    fn frame_to_ts(&self, frame: u64) -> u64 {
        match self.time_base {
            Some(tb) if tb.numer > 0 && self.format.sample_rate > 0.0 => {
                ((frame as f64 * tb.denom as f64) / (tb.numer as f64 * self.format.sample_rate)) as u64
            }
            _ => frame,
        }
    }

    fn ts_to_frame(&self, ts: u64) -> u64 {
        match self.time_base {
            Some(tb) if tb.denom > 0 => {
                ((ts as f64 * tb.numer as f64 * self.format.sample_rate) / tb.denom as f64).round() as u64
            }
            _ => ts,
        }
    }

    /// Reopen the demuxer at the start of the file.
    fn rewind(&mut self) -> Result<()> {
        self.reader = Some(probe(&self.origin, self.hint)?);
        self.cursor = 0;
        self.carry.clear();
        self.peeked = None;
        Ok(())
    }

    /// Position a PCM track so `carry` starts at `frame`.
    fn seek_frame(&mut self, frame: u64, bytes_per_frame: usize) -> Result<()> {
        self.carry.clear();
        let track_id = self.track_id;
        let required = self.frame_to_ts(frame);
        let seeked = self.reader()?.seek(
            SeekMode::Accurate,
            SeekTo::TimeStamp {
                ts: required,
                track_id,
            },
        );

        let mut skip = match seeked {
            Ok(seeked) => {
                self.ts_to_frame(seeked.required_ts.saturating_sub(seeked.actual_ts)) as usize
                    * bytes_per_frame
            }
            Err(e) => {
                warn!("Demuxer seek failed, rereading from start: {}", e);
                self.rewind()?;
                frame as usize * bytes_per_frame
            }
        };

        while skip > 0 {
            let Some(packet) = self.next_packet()? else {
                break;
            };
            let data = packet.buf();
            if data.len() <= skip {
                skip -= data.len();
            } else {
                self.carry.extend_from_slice(&data[skip..]);
                skip = 0;
            }
        }

        self.cursor = frame;
        debug!(frame, "Repositioned PCM track");
        Ok(())
    }

    /// Position a compressed track so the next packet read is `packet`.
    fn seek_packet(&mut self, packet: u64, index_ts: u64) -> Result<()> {
        self.peeked = None;
        let track_id = self.track_id;
        let seeked = self.reader()?.seek(
            SeekMode::Accurate,
            SeekTo::TimeStamp {
                ts: index_ts,
                track_id,
            },
        );

        if let Err(e) = seeked {
            warn!("Demuxer seek failed, rereading from start: {}", e);
            self.rewind()?;
            for _ in 0..packet {
                if self.next_packet()?.is_none() {
                    break;
                }
            }
        } else {
            while let Some(next) = self.next_packet()? {
                if next.ts() >= index_ts {
                    self.peeked = Some(next);
                    break;
                }
            }
        }

        self.cursor = packet;
        debug!(packet, "Repositioned compressed track");
        Ok(())
    }

    fn read_pcm(
        &mut self,
        start: u64,
        max_packets: u32,
        buffer: &mut [u8],
        bytes_per_frame: usize,
    ) -> Result<PacketRead> {
        if self.total_frames > 0 && start >= self.total_frames {
            return Ok(PacketRead::default());
        }
        if start != self.cursor {
            self.seek_frame(start, bytes_per_frame)?;
        }

        let wanted = (max_packets as usize * bytes_per_frame).min(buffer.len() / bytes_per_frame * bytes_per_frame);
        while self.carry.len() < wanted {
            match self.next_packet()? {
                Some(packet) => self.carry.extend_from_slice(packet.buf()),
                None => break,
            }
        }

        let bytes = self.carry.len().min(wanted) / bytes_per_frame * bytes_per_frame;
        buffer[..bytes].copy_from_slice(&self.carry[..bytes]);
        self.carry.drain(..bytes);

        let packets = (bytes / bytes_per_frame) as u32;
        self.cursor += packets as u64;
        Ok(PacketRead { packets, bytes })
    }

    fn read_compressed(
        &mut self,
        start: u64,
        max_packets: u32,
        buffer: &mut [u8],
        descriptors: &mut Vec<PacketDescriptor>,
    ) -> Result<PacketRead> {
        let (count, start_ts) = match &self.layout {
            Layout::Packets { index } => (index.len() as u64, index.get(start as usize).map(|e| e.ts)),
            Layout::Pcm { .. } => (0, None),
        };
        let Some(start_ts) = start_ts else {
            return Ok(PacketRead::default());
        };
        if start != self.cursor {
            self.seek_packet(start, start_ts)?;
        }

        let mut read = PacketRead::default();
        while read.packets < max_packets && self.cursor < count {
            let Some(packet) = self.next_packet()? else {
                break;
            };
            let data = packet.buf();
            if read.bytes + data.len() > buffer.len() {
                self.peeked = Some(packet);
                break;
            }

            buffer[read.bytes..read.bytes + data.len()].copy_from_slice(data);
            descriptors.push(PacketDescriptor::new(read.bytes as u64, data.len() as u32));
            read.bytes += data.len();
            read.packets += 1;
            self.cursor += 1;
        }
        Ok(read)
    }
}

impl AudioFileService for SymphoniaAudioFile {
    fn data_format(&self) -> Result<StreamFormat> {
        Ok(self.format)
    }

    fn packet_count(&self) -> Result<u64> {
        Ok(match &self.layout {
            Layout::Pcm { .. } => self.total_frames,
            Layout::Packets { index } => index.len() as u64,
        })
    }

    fn packet_size_upper_bound(&self) -> Result<u32> {
        Ok(match &self.layout {
            Layout::Pcm { bytes_per_frame } => *bytes_per_frame as u32,
            Layout::Packets { index } => index.iter().map(|e| e.size).max().unwrap_or(0),
        })
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
        let start = u64::try_from(start_packet).map_err(|_| {
            BridgeError::failed("Negative packet index", StatusCode::INVALID_PACKET_OFFSET)
        })?;
        self.reader()?;

        match self.layout {
            Layout::Pcm { bytes_per_frame } => self.read_pcm(start, max_packets, buffer, bytes_per_frame),
            Layout::Packets { .. } => self.read_compressed(start, max_packets, buffer, descriptors),
        }
    }

    fn frame_to_packet(&self, frame: i64) -> Result<FramePacketTranslation> {
        let out_of_range = || {
            BridgeError::failed(
                format!("Frame {} outside the file", frame),
                StatusCode::INVALID_PACKET_OFFSET,
            )
        };
        let frame = u64::try_from(frame).map_err(|_| out_of_range())?;
        if frame > self.total_frames {
            return Err(out_of_range());
        }

        match &self.layout {
            Layout::Pcm { .. } => Ok(FramePacketTranslation {
                packet: frame as i64,
                frame_offset_in_packet: 0,
            }),
            Layout::Packets { index } => {
                let ts = self.frame_to_ts(frame);
                let packet = index.partition_point(|e| e.ts + e.dur <= ts);
                let offset = index
                    .get(packet)
                    .map_or(0, |e| frame.saturating_sub(self.ts_to_frame(e.ts)));
                Ok(FramePacketTranslation {
                    packet: packet as i64,
                    frame_offset_in_packet: offset.min(u32::MAX as u64) as u32,
                })
            }
        }
    }

    fn byte_length(&self) -> Option<u64> {
        self.origin.byte_length()
    }

    fn close(&mut self) -> Result<()> {
        if self.reader.take().is_some() {
            debug!(path = ?self.origin.path(), "Closed audio file");
        }
        self.carry.clear();
        self.peeked = None;
        Ok(())
    }
}

fn probe(origin: &MediaOrigin, hint: FileTypeHint) -> Result<Box<dyn FormatReader>> {
    let probed = symphonia::default::get_probe()
        .format(
            &FormatDetector::hint_for(hint, origin.path()),
            origin.stream()?,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| map_error("Failed to probe format", e))?;
    Ok(probed.format)
}

fn next_track_packet(reader: &mut dyn FormatReader, track_id: u32) -> Result<Option<Packet>> {
    loop {
        match reader.next_packet() {
            Ok(packet) if packet.track_id() == track_id => return Ok(Some(packet)),
            Ok(_) => continue,
            Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(SymphoniaError::ResetRequired) => return Ok(None),
            Err(e) => return Err(map_error("Failed to read packet", e)),
        }
    }
}

fn scan_packets(reader: &mut dyn FormatReader, track_id: u32) -> Result<Vec<PacketEntry>> {
    let mut index = Vec::new();
    while let Some(packet) = next_track_packet(reader, track_id)? {
        index.push(PacketEntry {
            ts: packet.ts(),
            dur: packet.dur(),
            size: packet.buf().len() as u32,
        });
    }
    debug!(packets = index.len(), "Indexed packets");
    Ok(index)
}

fn map_error(context: &str, err: SymphoniaError) -> BridgeError {
    match err {
        SymphoniaError::IoError(e) => BridgeError::failed(format!("{}: {}", context, e), StatusCode::GENERIC),
        SymphoniaError::Unsupported(what) => BridgeError::unsupported(
            format!("{}: unsupported {}", context, what),
            StatusCode::UNSUPPORTED_FILE_TYPE,
        ),
        SymphoniaError::DecodeError(what) => {
            BridgeError::failed(format!("{}: {}", context, what), StatusCode::INVALID_FILE)
        }
        SymphoniaError::SeekError(kind) => BridgeError::failed(
            format!("{}: {:?}", context, kind),
            StatusCode::INVALID_PACKET_OFFSET,
        ),
        other => BridgeError::failed(format!("{}: {}", context, other), StatusCode::UNSPECIFIED),
    }
}
