//! Demand-driven format converter capability.
//!
//! A converter is asked to produce up to N output packets. Whenever it runs
//! out of input it calls back into [`ConverterInput::supply`], synchronously,
//! zero or more times per [`AudioConverter::fill_buffer`] call.

use crate::{
    error::Result,
    format::{PacketDescriptor, StreamFormat},
    platform::{PlatformSend, PlatformSendSync},
};

/// Input handed to a converter by the demand callback.
#[derive(Debug, Clone, Copy)]
pub struct InputPackets<'a> {
    pub data: &'a [u8],
    pub packet_count: u32,
    /// Per-packet layout for VBR input; `None` for CBR.
    pub descriptors: Option<&'a [PacketDescriptor]>,
}

impl InputPackets<'static> {
    /// Zero packets: the upstream has no more data.
    pub fn end_of_stream() -> Self {
        Self {
            data: &[],
            packet_count: 0,
            descriptors: None,
        }
    }
}

impl InputPackets<'_> {
    pub fn is_end_of_stream(&self) -> bool {
        self.packet_count == 0 || self.data.is_empty()
    }
}

/// The input-demand callback.
pub trait ConverterInput {
    /// Supply the next span of input packets.
    ///
    /// The returned data must be fully consumed (or copied) by the converter
    /// before the next call.
    fn supply(&mut self) -> Result<InputPackets<'_>>;
}

/// Converts packets from one stream format into another.
pub trait AudioConverter: PlatformSend {
    /// Install codec initialization data from the source.
    fn set_decompression_cookie(&mut self, cookie: &[u8]) -> Result<()>;

    /// Produce up to `max_packets` output packets into `output`.
    ///
    /// Returns the number of packets written; zero means the input reached
    /// end-of-stream and nothing is pending. For VBR output, one descriptor
    /// per packet is pushed onto `descriptors`.
    fn fill_buffer(
        &mut self,
        input: &mut dyn ConverterInput,
        output: &mut [u8],
        max_packets: u32,
        descriptors: &mut Vec<PacketDescriptor>,
    ) -> Result<u32>;

    /// Drop decoder priming and any buffered input or output.
    fn reset(&mut self) -> Result<()>;

    /// Release backend resources.
    fn dispose(&mut self) {}
}

/// Creates converters between two formats.
pub trait ConverterFactory: PlatformSendSync {
    /// # Errors
    ///
    /// Returns [`BridgeError::Unsupported`](crate::BridgeError::Unsupported)
    /// when no converter bridges `from` to `to`.
    fn new_converter(&self, from: &StreamFormat, to: &StreamFormat) -> Result<Box<dyn AudioConverter>>;
}
