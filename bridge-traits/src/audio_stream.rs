//! Push-fed stream parsing capability.
//!
//! A stream parser receives arbitrary chunks of container bytes and reports
//! what it discovers through a [`StreamParserListener`]: first properties
//! (format, cookie, packet count), then packets as they become complete.

use bytes::Bytes;

use crate::{
    error::Result,
    format::{FileTypeHint, PacketDescriptor, StreamFormat},
    platform::{PlatformSend, PlatformSendSync},
};

/// A property discovered while parsing a stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamProperty {
    /// The stream's data format is now known.
    DataFormat(StreamFormat),
    /// Codec initialization data.
    MagicCookie(Bytes),
    /// Total packet count, when the container declares it up front.
    PacketCount(u64),
    /// Largest packet the stream may produce.
    PacketSizeUpperBound(u32),
    /// Headers are complete; packet callbacks follow.
    ReadyToProducePackets,
}

/// Receives parse results. Returning an error aborts the current parse call.
pub trait StreamParserListener {
    fn on_property(&mut self, property: StreamProperty) -> Result<()>;

    /// `descriptors` is `None` for CBR data. When present, offsets are
    /// relative to `data` and `descriptors.len() == packet_count`.
    fn on_packets(
        &mut self,
        data: &[u8],
        descriptors: Option<&[PacketDescriptor]>,
        packet_count: u32,
    ) -> Result<()>;
}

/// Incremental parser for one stream.
pub trait AudioStreamParser: PlatformSend {
    /// Feed the next chunk of raw container bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Unsupported`](crate::BridgeError::Unsupported)
    /// for malformed or unrecognised input, or whatever error the listener
    /// returned.
    fn parse_bytes(&mut self, data: &[u8], listener: &mut dyn StreamParserListener) -> Result<()>;

    /// Release parser state.
    fn close(&mut self) {}
}

/// Creates stream parsers for a container type.
pub trait StreamParserFactory: PlatformSendSync {
    fn open_stream(&self, hint: FileTypeHint) -> Result<Box<dyn AudioStreamParser>>;
}
