//! Random-access audio file capability.
//!
//! A backend that can open a complete file and answer packet-indexed reads.
//! The core never parses containers itself; it only asks for packets.

use bytes::Bytes;

use crate::{
    error::Result,
    format::{FileTypeHint, FramePacketTranslation, PacketDescriptor, StreamFormat},
    platform::{PlatformSend, PlatformSendSync},
};

/// Outcome of a packet read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketRead {
    /// Number of whole packets written.
    pub packets: u32,
    /// Number of bytes written.
    pub bytes: usize,
}

impl PacketRead {
    pub fn is_end_of_stream(&self) -> bool {
        self.packets == 0
    }
}

/// An opened random-access audio file.
///
/// Implementations report the format and packet layout synchronously and
/// serve packet reads addressed by absolute packet index.
pub trait AudioFileService: PlatformSend {
    /// Format of the audio data in the file.
    fn data_format(&self) -> Result<StreamFormat>;

    /// Total number of packets in the file.
    fn packet_count(&self) -> Result<u64>;

    /// Largest packet in bytes. Equals `bytes_per_packet` for CBR data.
    fn packet_size_upper_bound(&self) -> Result<u32>;

    /// Codec initialization data, if the format carries any.
    fn magic_cookie(&self) -> Result<Option<Bytes>>;

    /// Read up to `max_packets` packets starting at `start_packet`.
    ///
    /// Only whole packets are written to `buffer`. For VBR data one
    /// descriptor per packet is pushed onto `descriptors`, with offsets
    /// relative to the start of `buffer`. Reading at or past the last packet
    /// returns zero packets rather than an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails or the first packet
    /// alone does not fit into `buffer`.
    fn read_packets(
        &mut self,
        start_packet: i64,
        max_packets: u32,
        buffer: &mut [u8],
        descriptors: &mut Vec<PacketDescriptor>,
    ) -> Result<PacketRead>;

    /// Translate an absolute frame into a packet index plus frame offset.
    fn frame_to_packet(&self, frame: i64) -> Result<FramePacketTranslation>;

    /// Size of the underlying file in bytes, when known.
    fn byte_length(&self) -> Option<u64> {
        None
    }

    /// Release the file handle. Further calls are undefined.
    fn close(&mut self) -> Result<()>;
}

/// Opens random-access audio files from a locator (path or `file://` URL).
pub trait AudioFileOpener: PlatformSendSync {
    /// # Errors
    ///
    /// Returns [`BridgeError::NotFound`](crate::BridgeError::NotFound) when the
    /// locator does not resolve to an existing file and
    /// [`BridgeError::Unsupported`](crate::BridgeError::Unsupported) when the
    /// container cannot be parsed.
    fn open(&self, locator: &str, hint: FileTypeHint) -> Result<Box<dyn AudioFileService>>;
}
