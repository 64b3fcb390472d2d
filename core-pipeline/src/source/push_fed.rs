//! Push-fed source: container bytes arrive in chunks and a stream parser
//! turns them into packets.
//!
//! Packets reported by the parser are appended to the destination buffer.
//! When the buffer is empty (`limit == 0`) the first packet starts a new
//! fill epoch: the framer drops old descriptors and the position records
//! where the epoch began.

use bridge_traits::{
    AudioStreamParser, BridgeError, ByteSource, FileTypeHint, FramePacketTranslation,
    PacketDescriptor, StatusCode, StreamFormat, StreamParserFactory, StreamParserListener,
    StreamProperty,
};
use bytes::Bytes;
use tracing::{debug, trace};

use super::{PullSource, SidebandConfig};
use crate::buffer::SharedBuffer;
use crate::error::{PipelineError, Result};
use crate::framer::PacketFramer;
use crate::position::PositionState;

/// Properties announced by the parser so far.
#[derive(Debug, Default)]
struct Discovered {
    format: Option<StreamFormat>,
    cookie: Option<SidebandConfig>,
    packet_count: Option<u64>,
    packet_size_upper_bound: Option<u32>,
    ready: bool,
}

/// A source whose bytes are pushed in rather than read by packet index.
///
/// Either owns a [`ByteSource`] it pulls from on [`fill`](PullSource::fill),
/// or is fed directly through [`parse`](PushFedSource::parse).
pub struct PushFedSource {
    parser: Box<dyn AudioStreamParser>,
    bytes: Option<Box<dyn ByteSource>>,
    discovered: Discovered,
    framer: PacketFramer,
    position: PositionState,
    read_chunk: usize,
    exhausted: bool,
    closed: bool,
}

impl PushFedSource {
    /// Open a parser for `hint`. `bytes` may be `None` when the host pushes
    /// chunks itself.
    pub fn open(
        parsers: &dyn StreamParserFactory,
        hint: FileTypeHint,
        bytes: Option<Box<dyn ByteSource>>,
        read_chunk: usize,
    ) -> Result<Self> {
        let parser = parsers
            .open_stream(hint)
            .map_err(|e| PipelineError::unsupported_format("Failed to open audio stream", &e))?;
        debug!(?hint, read_chunk, "Opened push-fed source");

        Ok(Self {
            parser,
            bytes,
            discovered: Discovered::default(),
            framer: PacketFramer::new(),
            position: PositionState::new(),
            read_chunk: read_chunk.max(1),
            exhausted: false,
            closed: false,
        })
    }

    /// Hand `raw` container bytes to the parser. Complete packets are
    /// appended to `buffer`.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::CapacityExceeded`] if the packets do not fit
    /// - [`PipelineError::UnsupportedFormat`] if the parser rejects the bytes
    pub fn parse(&mut self, raw: &[u8], buffer: &mut SharedBuffer) -> Result<()> {
        if self.closed {
            return Err(PipelineError::Closed);
        }

        let mut listener = ParseListener {
            discovered: &mut self.discovered,
            framer: &mut self.framer,
            position: &mut self.position,
            buffer,
            failure: None,
        };
        let outcome = self.parser.parse_bytes(raw, &mut listener);

        if let Some(err) = listener.failure.take() {
            return Err(err);
        }
        outcome.map_err(|e| PipelineError::unsupported_format("Failed to parse stream", &e))
    }

    /// Whether the parser reported it can produce packets.
    pub fn is_ready(&self) -> bool {
        self.discovered.ready
    }

    pub fn packet_size_upper_bound(&self) -> Option<u32> {
        self.discovered.packet_size_upper_bound
    }
}

impl PullSource for PushFedSource {
    fn format(&self) -> Option<&StreamFormat> {
        self.discovered.format.as_ref()
    }

    fn cookie(&self) -> Option<&SidebandConfig> {
        self.discovered.cookie.as_ref()
    }

    fn packet_count(&self) -> Option<u64> {
        self.discovered.packet_count
    }

    fn fill(&mut self, buffer: &mut SharedBuffer) -> Result<usize> {
        if self.closed {
            return Err(PipelineError::Closed);
        }

        buffer.clear();
        self.framer.reset();

        while !buffer.has_remaining() && !self.exhausted {
            let chunk = match self.bytes.as_mut() {
                Some(source) => source
                    .request_bytes(self.read_chunk)
                    .map_err(|e| PipelineError::io_failure("Failed to read stream bytes", &e))?,
                None => {
                    return Err(PipelineError::Unsupported(
                        "Source has no byte supplier; feed it with parse()".to_string(),
                    ))
                }
            };

            match chunk {
                Some(chunk) => {
                    trace!(len = chunk.len(), "Parsing chunk");
                    self.parse(&chunk, buffer)?;
                }
                None => {
                    debug!(packet = self.position.packet_position, "Byte source exhausted");
                    self.exhausted = true;
                }
            }
        }

        if !buffer.has_remaining() {
            self.position.mark_fill();
        }
        Ok(buffer.remaining())
    }

    fn position(&self) -> &PositionState {
        &self.position
    }

    fn descriptors(&self) -> Option<&[PacketDescriptor]> {
        (!self.framer.is_empty()).then(|| self.framer.descriptors())
    }

    fn is_seekable(&self) -> bool {
        false
    }

    fn frame_to_packet(&self, _frame: i64) -> Result<FramePacketTranslation> {
        Err(PipelineError::Unsupported(
            "Push-fed streams have no packet index".to_string(),
        ))
    }

    fn seek_to_packet(&mut self, _packet: i64, _frame_offset_in_packet: u32) -> Result<()> {
        Err(PipelineError::Unsupported(
            "Seeking is not supported for push-fed streams".to_string(),
        ))
    }

    fn take_frame_offset(&mut self) -> u32 {
        self.position.take_frame_offset()
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.parser.close();
            self.bytes = None;
        }
        Ok(())
    }
}

impl Drop for PushFedSource {
    fn drop(&mut self) {
        if !self.closed {
            self.parser.close();
        }
    }
}

/// Receives parser callbacks for one `parse` call.
///
/// A pipeline failure inside a callback is kept in `failure` and the parse
/// is aborted with a bridge error; the caller reports the kept error.
struct ParseListener<'a> {
    discovered: &'a mut Discovered,
    framer: &'a mut PacketFramer,
    position: &'a mut PositionState,
    buffer: &'a mut SharedBuffer,
    failure: Option<PipelineError>,
}

impl StreamParserListener for ParseListener<'_> {
    fn on_property(&mut self, property: StreamProperty) -> bridge_traits::error::Result<()> {
        match property {
            StreamProperty::DataFormat(format) => {
                debug!(format = ?format.format_tag, sample_rate = format.sample_rate, "Discovered stream format");
                self.discovered.format = Some(format);
            }
            StreamProperty::MagicCookie(bytes) => {
                debug!(len = bytes.len(), "Discovered magic cookie");
                self.discovered.cookie = Some(SidebandConfig::new(bytes));
            }
            StreamProperty::PacketCount(count) => self.discovered.packet_count = Some(count),
            StreamProperty::PacketSizeUpperBound(size) => {
                self.discovered.packet_size_upper_bound = Some(size)
            }
            StreamProperty::ReadyToProducePackets => self.discovered.ready = true,
        }
        Ok(())
    }

    fn on_packets(
        &mut self,
        data: &[u8],
        descriptors: Option<&[PacketDescriptor]>,
        packet_count: u32,
    ) -> bridge_traits::error::Result<()> {
        let new_epoch = self.buffer.limit() == 0;
        if new_epoch {
            self.framer.reset();
        }

        let appended = match descriptors {
            Some(descriptors) => self.framer.append_packets(self.buffer, data, descriptors),
            None => self.buffer.append(data),
        };
        if let Err(err) = appended {
            let bridge = BridgeError::failed(err.to_string(), StatusCode::BAD_PROPERTY_SIZE);
            self.failure = Some(err);
            return Err(bridge);
        }

        if new_epoch {
            self.position.mark_fill();
        }
        self.position.advance(packet_count);
        Ok(())
    }
}

/// Replays already consumed bytes before continuing with the inner source.
///
/// Used after probing the head of a stream so the parser still sees the
/// stream from its first byte.
pub struct PrefixedByteSource {
    prefix: Bytes,
    inner: Box<dyn ByteSource>,
}

impl PrefixedByteSource {
    pub fn new(prefix: Bytes, inner: Box<dyn ByteSource>) -> Self {
        Self { prefix, inner }
    }
}

impl ByteSource for PrefixedByteSource {
    fn request_bytes(&mut self, max_len: usize) -> bridge_traits::error::Result<Option<Bytes>> {
        if !self.prefix.is_empty() {
            let len = max_len.min(self.prefix.len()).max(1);
            return Ok(Some(self.prefix.split_to(len)));
        }
        self.inner.request_bytes(max_len)
    }
}
