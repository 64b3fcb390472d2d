//! # Symphonia Decoding Converter
//!
//! Decodes compressed packets with symphonia and writes the result as signed
//! PCM. The decoder is created on first use so a decompression cookie set
//! after construction still reaches it.

use bridge_traits::{
    error::{BridgeError, Result},
    AudioConverter, ConverterInput, PacketDescriptor, StatusCode, StreamFormat,
};
use symphonia::core::audio::Channels;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;
use tracing::{debug, warn};

use crate::converters::target_layout;
use crate::format_detector::FormatDetector;
use crate::sample_converter::{PendingOutput, SampleConverter};

pub struct SymphoniaConverter {
    params: CodecParameters,
    decoder: Option<Box<dyn Decoder>>,
    bytes_per_packet: usize,
    bytes_per_sample: usize,
    big_endian: bool,
    channels: usize,
    pending: PendingOutput,
}

impl SymphoniaConverter {
    pub fn new(from: &StreamFormat, to: &StreamFormat) -> Result<Self> {
        let codec = FormatDetector::codec_type(from.format_tag).ok_or_else(|| {
            BridgeError::unsupported(
                format!("No decoder for {}", from.format_tag),
                StatusCode::UNSUPPORTED_DATA_FORMAT,
            )
        })?;
        let layout = target_layout(from, to)?;

        let mut params = CodecParameters::new();
        params.for_codec(codec).with_sample_rate(from.sample_rate as u32);
        if (1..=32).contains(&from.channels) {
            params.with_channels(Channels::from_bits_truncate(((1u64 << from.channels) - 1) as u32));
        }
        if from.frames_per_packet > 0 {
            params.with_max_frames_per_packet(from.frames_per_packet as u64);
        }
        if from.bits_per_channel > 0 {
            params.with_bits_per_sample(from.bits_per_channel);
        }

        Ok(Self {
            params,
            decoder: None,
            bytes_per_packet: from.bytes_per_packet as usize,
            bytes_per_sample: layout.bytes_per_sample,
            big_endian: layout.big_endian,
            channels: layout.channels,
            pending: PendingOutput::default(),
        })
    }

    fn ensure_decoder(&mut self) -> Result<()> {
        if self.decoder.is_none() {
            let decoder = symphonia::default::get_codecs()
                .make(&self.params, &DecoderOptions::default())
                .map_err(|e| {
                    BridgeError::unsupported(
                        format!("Failed to create decoder: {}", e),
                        StatusCode::UNSUPPORTED_DATA_FORMAT,
                    )
                })?;
            debug!(codec = ?self.params.codec, "Created decoder");
            self.decoder = Some(decoder);
        }
        Ok(())
    }

    fn decode_packet(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_decoder()?;
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(());
        };

        let packet = Packet::new_from_slice(0, 0, 0, data);
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let channels = decoded.spec().channels.count();
                if channels != self.channels {
                    return Err(BridgeError::failed(
                        format!("Decoder produced {} channels, expected {}", channels, self.channels),
                        StatusCode::UNSUPPORTED_DATA_FORMAT,
                    ));
                }
                SampleConverter::write_interleaved(
                    &decoded,
                    self.bytes_per_sample,
                    self.big_endian,
                    self.pending.buffer_mut(),
                );
                Ok(())
            }
            Err(SymphoniaError::DecodeError(e)) => {
                // Corrupt packets are skipped
                warn!("Skipping undecodable packet: {}", e);
                Ok(())
            }
            Err(e) => Err(BridgeError::failed(
                format!("Failed to decode packet: {}", e),
                StatusCode::INVALID_FILE,
            )),
        }
    }

    fn packet_spans(&self, data_len: usize, descriptors: Option<&[PacketDescriptor]>) -> Vec<(usize, usize)> {
        match descriptors {
            Some(descriptors) => descriptors
                .iter()
                .map(|d| (d.start_offset as usize, d.byte_size as usize))
                .collect(),
            None if self.bytes_per_packet > 0 => (0..data_len / self.bytes_per_packet)
                .map(|i| (i * self.bytes_per_packet, self.bytes_per_packet))
                .collect(),
            None => vec![(0, data_len)],
        }
    }
}

impl AudioConverter for SymphoniaConverter {
    fn set_decompression_cookie(&mut self, cookie: &[u8]) -> Result<()> {
        self.params.with_extra_data(cookie.to_vec().into_boxed_slice());
        self.decoder = None;
        Ok(())
    }

    fn fill_buffer(
        &mut self,
        input: &mut dyn ConverterInput,
        output: &mut [u8],
        max_packets: u32,
        _descriptors: &mut Vec<PacketDescriptor>,
    ) -> Result<u32> {
        let frame = self.bytes_per_sample * self.channels;
        let wanted = (max_packets as usize)
            .saturating_mul(frame)
            .min(output.len() / frame * frame);

        let mut written = self.pending.drain_into(&mut output[..wanted]);
        while written < wanted {
            let packets = input.supply()?;
            if packets.is_end_of_stream() {
                break;
            }

            for (start, len) in self.packet_spans(packets.data.len(), packets.descriptors) {
                let data = packets.data.get(start..start + len).ok_or_else(|| {
                    BridgeError::failed("Packet descriptor outside input", StatusCode::INVALID_PACKET_OFFSET)
                })?;
                self.decode_packet(data)?;
            }
            written += self.pending.drain_into(&mut output[written..wanted]);
        }

        Ok((written / frame) as u32)
    }

    fn reset(&mut self) -> Result<()> {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.reset();
        }
        self.pending.clear();
        Ok(())
    }

    fn dispose(&mut self) {
        self.decoder = None;
        self.pending.clear();
    }
}
