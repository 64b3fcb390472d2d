//! Sample-by-sample converter for uncompressed sources.

use bridge_traits::{
    error::{BridgeError, Result},
    AudioConverter, ConverterInput, PacketDescriptor, StatusCode, StreamFormat,
};
use tracing::trace;

use crate::converters::target_layout;
use crate::sample_converter::{convert_frames, PcmLayout, PendingOutput};

/// Re-encodes linear PCM, u-law or A-law input as signed PCM.
pub struct PcmConverter {
    from: PcmLayout,
    to: PcmLayout,
    pending: PendingOutput,
}

impl PcmConverter {
    pub fn new(from: &StreamFormat, to: &StreamFormat) -> Result<Self> {
        let source = PcmLayout::from_format(from).ok_or_else(|| {
            BridgeError::unsupported(
                format!("{} is not an uncompressed format", from.format_tag),
                StatusCode::UNSUPPORTED_DATA_FORMAT,
            )
        })?;
        let target = target_layout(from, to)?;
        if target.channels != source.channels {
            return Err(BridgeError::unsupported(
                "Channel count conversion is not supported",
                StatusCode::UNSUPPORTED_DATA_FORMAT,
            ));
        }

        Ok(Self {
            from: source,
            to: target,
            pending: PendingOutput::default(),
        })
    }
}

impl AudioConverter for PcmConverter {
    fn set_decompression_cookie(&mut self, _cookie: &[u8]) -> Result<()> {
        Ok(())
    }

    fn fill_buffer(
        &mut self,
        input: &mut dyn ConverterInput,
        output: &mut [u8],
        max_packets: u32,
        _descriptors: &mut Vec<PacketDescriptor>,
    ) -> Result<u32> {
        let frame = self.to.bytes_per_frame();
        let wanted = (max_packets as usize)
            .saturating_mul(frame)
            .min(output.len() / frame * frame);

        let mut written = self.pending.drain_into(&mut output[..wanted]);
        while written < wanted {
            let packets = input.supply()?;
            if packets.is_end_of_stream() {
                break;
            }
            let frames = convert_frames(packets.data, &self.from, &self.to, self.pending.buffer_mut());
            trace!(frames, "Converted input frames");
            written += self.pending.drain_into(&mut output[written..wanted]);
        }

        Ok((written / frame) as u32)
    }

    fn reset(&mut self) -> Result<()> {
        self.pending.clear();
        Ok(())
    }

    fn dispose(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::InputPackets;
    use std::collections::VecDeque;

    struct Chunks {
        chunks: VecDeque<Vec<u8>>,
        current: Vec<u8>,
        frame: u32,
    }

    impl ConverterInput for Chunks {
        fn supply(&mut self) -> Result<InputPackets<'_>> {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    self.current = chunk;
                    Ok(InputPackets {
                        data: &self.current,
                        packet_count: self.current.len() as u32 / self.frame,
                        descriptors: None,
                    })
                }
                None => Ok(InputPackets::end_of_stream()),
            }
        }
    }

    fn input(chunks: Vec<Vec<u8>>, frame: u32) -> Chunks {
        Chunks {
            chunks: chunks.into(),
            current: Vec::new(),
            frame,
        }
    }

    #[test]
    fn test_swaps_endianness_across_calls() {
        let from = StreamFormat::linear_pcm(8000.0, 1, 16, false);
        let to = StreamFormat::linear_pcm(8000.0, 1, 16, true);
        let mut converter = PcmConverter::new(&from, &to).unwrap();
        let mut source = input(vec![vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06]], 2);

        let mut out = [0u8; 4];
        let mut descriptors = Vec::new();
        let frames = converter.fill_buffer(&mut source, &mut out, 8, &mut descriptors).unwrap();
        assert_eq!(frames, 2);
        assert_eq!(out, [0x02, 0x01, 0x04, 0x03]);

        // Third frame was held back
        let frames = converter.fill_buffer(&mut source, &mut out, 8, &mut descriptors).unwrap();
        assert_eq!(frames, 1);
        assert_eq!(&out[..2], &[0x06, 0x05]);

        let frames = converter.fill_buffer(&mut source, &mut out, 8, &mut descriptors).unwrap();
        assert_eq!(frames, 0);
        assert!(descriptors.is_empty());
    }

    #[test]
    fn test_respects_max_packets() {
        let from = StreamFormat::linear_pcm(8000.0, 1, 8, false);
        let to = StreamFormat::linear_pcm(8000.0, 1, 16, false);
        let mut converter = PcmConverter::new(&from, &to).unwrap();
        let mut source = input(vec![vec![1, 2, 3, 4]], 1);

        let mut out = [0u8; 16];
        let frames = converter.fill_buffer(&mut source, &mut out, 3, &mut Vec::new()).unwrap();
        assert_eq!(frames, 3);
        assert_eq!(&out[..6], &[0, 1, 0, 2, 0, 3]);
    }

    #[test]
    fn test_reset_drops_pending() {
        let from = StreamFormat::linear_pcm(8000.0, 1, 16, false);
        let to = StreamFormat::linear_pcm(8000.0, 1, 16, false);
        let mut converter = PcmConverter::new(&from, &to).unwrap();
        let mut source = input(vec![vec![1, 0, 2, 0, 3, 0]], 2);

        let mut out = [0u8; 2];
        converter.fill_buffer(&mut source, &mut out, 1, &mut Vec::new()).unwrap();
        converter.reset().unwrap();

        let frames = converter.fill_buffer(&mut source, &mut out, 1, &mut Vec::new()).unwrap();
        assert_eq!(frames, 0);
    }

    #[test]
    fn test_rejects_compressed_source() {
        let mut from = StreamFormat::linear_pcm(44100.0, 2, 16, false);
        from.format_tag = bridge_traits::FormatTag::MPEG_LAYER_3;
        let to = StreamFormat::linear_pcm(44100.0, 2, 16, false);
        assert!(PcmConverter::new(&from, &to).is_err());
    }
}
