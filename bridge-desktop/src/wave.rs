//! Incremental RIFF/WAVE stream parser.
//!
//! Accepts container bytes in chunks of any size, announces the format once
//! the `fmt ` chunk and the `data` header have been seen, then reports whole
//! frames as constant-size packets. A partial frame at the end of a chunk is
//! held back until the next call.

use bridge_traits::{
    error::Result, AudioStreamParser, BridgeError, FileTypeHint, FormatFlags, FormatTag,
    StatusCode, StreamFormat, StreamParserFactory, StreamParserListener, StreamProperty,
};
use tracing::{debug, trace};

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
const WAVE_FORMAT_ALAW: u16 = 0x0006;
const WAVE_FORMAT_MULAW: u16 = 0x0007;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    RiffHeader,
    ChunkHeader,
    FormatChunk { size: usize },
    Skip { remaining: u64 },
    /// `remaining` is `None` when the header did not give a usable length.
    Data { remaining: Option<u64> },
    Done,
}

/// Parser state for one WAVE stream.
pub struct WaveStreamParser {
    state: ParseState,
    pending: Vec<u8>,
    format: Option<StreamFormat>,
}

impl WaveStreamParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::RiffHeader,
            pending: Vec::new(),
            format: None,
        }
    }

    fn begin_data(&mut self, size: u32, listener: &mut dyn StreamParserListener) -> Result<()> {
        let format = self.format.ok_or_else(|| {
            BridgeError::failed("data chunk before fmt chunk", StatusCode::INVALID_FILE)
        })?;

        listener.on_property(StreamProperty::DataFormat(format))?;
        let known = size != 0 && size != u32::MAX;
        if known {
            listener.on_property(StreamProperty::PacketCount(
                size as u64 / format.bytes_per_packet as u64,
            ))?;
        }
        listener.on_property(StreamProperty::ReadyToProducePackets)?;

        debug!(size, known, "WAVE data chunk");
        self.state = ParseState::Data {
            remaining: known.then_some(size as u64),
        };
        Ok(())
    }

    fn parse_pending(&mut self, cursor: &mut usize, listener: &mut dyn StreamParserListener) -> Result<()> {
        loop {
            let available = self.pending.len() - *cursor;
            match self.state {
                ParseState::RiffHeader => {
                    if available < 12 {
                        return Ok(());
                    }
                    let header = &self.pending[*cursor..*cursor + 12];
                    if &header[0..4] != b"RIFF" || &header[8..12] != b"WAVE" {
                        return Err(BridgeError::unsupported(
                            "Not a RIFF/WAVE stream",
                            StatusCode::UNSUPPORTED_FILE_TYPE,
                        ));
                    }
                    *cursor += 12;
                    self.state = ParseState::ChunkHeader;
                }
                ParseState::ChunkHeader => {
                    if available < 8 {
                        return Ok(());
                    }
                    let header = &self.pending[*cursor..*cursor + 8];
                    let id = [header[0], header[1], header[2], header[3]];
                    let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
                    trace!(chunk = %String::from_utf8_lossy(&id), size, "WAVE chunk");

                    match &id {
                        b"fmt " => self.state = ParseState::FormatChunk { size: size as usize },
                        b"data" => self.begin_data(size, listener)?,
                        _ => {
                            self.state = ParseState::Skip {
                                remaining: size as u64 + (size as u64 & 1),
                            }
                        }
                    }
                    *cursor += 8;
                }
                ParseState::FormatChunk { size } => {
                    let padded = size + (size & 1);
                    if available < padded {
                        return Ok(());
                    }
                    self.format = Some(parse_format_chunk(&self.pending[*cursor..*cursor + size])?);
                    *cursor += padded;
                    self.state = ParseState::ChunkHeader;
                }
                ParseState::Skip { remaining } => {
                    let skipped = remaining.min(available as u64);
                    *cursor += skipped as usize;
                    if skipped == remaining {
                        self.state = ParseState::ChunkHeader;
                    } else {
                        self.state = ParseState::Skip {
                            remaining: remaining - skipped,
                        };
                        return Ok(());
                    }
                }
                ParseState::Data { remaining } => {
                    let frame_size = self.format.map_or(1, |f| f.bytes_per_frame.max(1)) as usize;
                    let take = remaining.map_or(available, |r| r.min(available as u64) as usize);
                    let whole = take - take % frame_size;
                    if whole == 0 {
                        if remaining.is_some_and(|r| r < frame_size as u64) {
                            self.state = ParseState::Done;
                        }
                        return Ok(());
                    }

                    // Frames the listener refuses stay pending for the next call
                    listener.on_packets(
                        &self.pending[*cursor..*cursor + whole],
                        None,
                        (whole / frame_size) as u32,
                    )?;
                    *cursor += whole;
                    self.state = ParseState::Data {
                        remaining: remaining.map(|r| r - whole as u64),
                    };
                }
                ParseState::Done => {
                    *cursor = self.pending.len();
                    return Ok(());
                }
            }
        }
    }
}

impl Default for WaveStreamParser {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioStreamParser for WaveStreamParser {
    fn parse_bytes(&mut self, data: &[u8], listener: &mut dyn StreamParserListener) -> Result<()> {
        self.pending.extend_from_slice(data);
        let mut cursor = 0;
        // Bytes before `cursor` are consumed even when a callback fails
        let parsed = self.parse_pending(&mut cursor, listener);
        self.pending.drain(..cursor);
        parsed
    }

    fn close(&mut self) {
        self.pending.clear();
        self.state = ParseState::Done;
    }
}

fn parse_format_chunk(chunk: &[u8]) -> Result<StreamFormat> {
    if chunk.len() < 16 {
        return Err(BridgeError::failed("fmt chunk too short", StatusCode::INVALID_FILE));
    }
    let u16_at = |at: usize| u16::from_le_bytes([chunk[at], chunk[at + 1]]);

    let mut tag = u16_at(0);
    let channels = u16_at(2) as u32;
    let sample_rate = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
    let block_align = u16_at(12) as u32;
    let bits = u16_at(14) as u32;

    if tag == WAVE_FORMAT_EXTENSIBLE && chunk.len() >= 26 {
        tag = u16_at(24);
    }

    let (format_tag, flags) = match tag {
        WAVE_FORMAT_PCM if bits > 8 => (
            FormatTag::LINEAR_PCM,
            FormatFlags::SIGNED_INTEGER | FormatFlags::PACKED,
        ),
        WAVE_FORMAT_PCM => (FormatTag::LINEAR_PCM, FormatFlags::PACKED),
        WAVE_FORMAT_IEEE_FLOAT => (FormatTag::LINEAR_PCM, FormatFlags::FLOAT | FormatFlags::PACKED),
        WAVE_FORMAT_ALAW => (FormatTag::ALAW, FormatFlags::NONE),
        WAVE_FORMAT_MULAW => (FormatTag::ULAW, FormatFlags::NONE),
        other => {
            return Err(BridgeError::unsupported(
                format!("Unsupported WAVE format tag {:#06x}", other),
                StatusCode::UNSUPPORTED_DATA_FORMAT,
            ))
        }
    };

    if channels == 0 || block_align == 0 || sample_rate == 0 {
        return Err(BridgeError::failed(
            "fmt chunk has zero channels, block size or sample rate",
            StatusCode::INVALID_FILE,
        ));
    }

    Ok(StreamFormat {
        sample_rate: sample_rate as f64,
        format_tag,
        flags,
        bytes_per_packet: block_align,
        frames_per_packet: 1,
        bytes_per_frame: block_align,
        channels,
        bits_per_channel: bits,
    })
}

/// Creates [`WaveStreamParser`]s for WAVE or unhinted streams.
#[derive(Debug, Default, Clone, Copy)]
pub struct WaveStreamParserFactory;

impl WaveStreamParserFactory {
    pub fn new() -> Self {
        Self
    }
}

impl StreamParserFactory for WaveStreamParserFactory {
    fn open_stream(&self, hint: FileTypeHint) -> Result<Box<dyn AudioStreamParser>> {
        if hint != FileTypeHint::WAVE && hint != FileTypeHint::UNKNOWN {
            return Err(BridgeError::unsupported(
                format!("No stream parser for {}", hint),
                StatusCode::UNSUPPORTED_FILE_TYPE,
            ));
        }
        Ok(Box::new(WaveStreamParser::new()))
    }
}
