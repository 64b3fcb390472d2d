//! # Sample Format Converter
//!
//! Moves linear PCM samples between byte layouts.
//!
//! Every input sample is first widened to a left-justified `i32` (full
//! scale = `i32::MIN..=i32::MAX`), then narrowed to the target sample size by
//! keeping its high bytes. Unsigned 8-bit, IEEE float and G.711 companded
//! input are accepted; output is always signed integer.

use bridge_traits::{FormatTag, StreamFormat};

#[cfg(feature = "symphonia-backend")]
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
#[cfg(feature = "symphonia-backend")]
use symphonia::core::conv::IntoSample;
#[cfg(feature = "symphonia-backend")]
use symphonia::core::sample::Sample;

/// How one sample is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    Signed,
    Unsigned,
    Float,
    ULaw,
    ALaw,
}

/// Byte layout of interleaved samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmLayout {
    pub encoding: SampleEncoding,
    pub bytes_per_sample: usize,
    pub big_endian: bool,
    pub channels: usize,
}

impl PcmLayout {
    /// Layout of a plain PCM or G.711 format, or `None` for anything else.
    pub fn from_format(format: &StreamFormat) -> Option<Self> {
        let (encoding, bytes_per_sample) = match format.format_tag {
            FormatTag::ULAW => (SampleEncoding::ULaw, 1),
            FormatTag::ALAW => (SampleEncoding::ALaw, 1),
            FormatTag::LINEAR_PCM => {
                let bytes = format.bits_per_channel.div_ceil(8) as usize;
                let encoding = if format.is_float() {
                    SampleEncoding::Float
                } else if format.is_signed_integer() || bytes > 1 {
                    SampleEncoding::Signed
                } else {
                    SampleEncoding::Unsigned
                };
                (encoding, bytes)
            }
            _ => return None,
        };

        let supported = match encoding {
            SampleEncoding::Float => matches!(bytes_per_sample, 4 | 8),
            _ => (1..=4).contains(&bytes_per_sample),
        };
        (supported && format.channels > 0).then_some(Self {
            encoding,
            bytes_per_sample,
            big_endian: format.is_big_endian(),
            channels: format.channels as usize,
        })
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample * self.channels
    }
}

/// Widen one stored sample to a left-justified `i32`.
///
/// `bytes` must hold exactly `layout.bytes_per_sample` bytes.
pub fn decode_sample(bytes: &[u8], layout: &PcmLayout) -> i32 {
    match (layout.encoding, layout.bytes_per_sample) {
        (SampleEncoding::ULaw, _) => (ulaw_to_i16(bytes[0]) as i32) << 16,
        (SampleEncoding::ALaw, _) => (alaw_to_i16(bytes[0]) as i32) << 16,
        (SampleEncoding::Unsigned, 1) => ((bytes[0] as i32) - 128) << 24,
        (SampleEncoding::Signed, 1) => (bytes[0] as i8 as i32) << 24,
        (SampleEncoding::Float, 4) => {
            let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
            let value = if layout.big_endian {
                f32::from_be_bytes(raw)
            } else {
                f32::from_le_bytes(raw)
            };
            float_to_i32(value as f64)
        }
        (SampleEncoding::Float, _) => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[..8]);
            let value = if layout.big_endian {
                f64::from_be_bytes(raw)
            } else {
                f64::from_le_bytes(raw)
            };
            float_to_i32(value)
        }
        (encoding, width) => {
            let mut raw = [0u8; 4];
            if layout.big_endian {
                raw[..width].copy_from_slice(&bytes[..width]);
            } else {
                for (i, byte) in bytes[..width].iter().enumerate() {
                    raw[width - 1 - i] = *byte;
                }
            }
            let value = i32::from_be_bytes(raw);
            if encoding == SampleEncoding::Unsigned {
                value ^ i32::MIN
            } else {
                value
            }
        }
    }
}

/// Narrow a left-justified sample to `bytes_per_sample` signed bytes.
pub fn encode_sample(value: i32, bytes_per_sample: usize, big_endian: bool, out: &mut Vec<u8>) {
    let be = value.to_be_bytes();
    let high = &be[..bytes_per_sample.min(4)];
    if big_endian {
        out.extend_from_slice(high);
    } else {
        out.extend(high.iter().rev());
    }
}

fn float_to_i32(value: f64) -> i32 {
    (value.clamp(-1.0, 1.0) * i32::MAX as f64) as i32
}

/// G.711 mu-law expansion.
pub fn ulaw_to_i16(byte: u8) -> i16 {
    let u = !byte;
    let magnitude = ((((u & 0x0F) as i32) << 3) + 0x84) << ((u & 0x70) >> 4);
    if u & 0x80 != 0 {
        (0x84 - magnitude) as i16
    } else {
        (magnitude - 0x84) as i16
    }
}

/// G.711 A-law expansion.
pub fn alaw_to_i16(byte: u8) -> i16 {
    let a = byte ^ 0x55;
    let mut magnitude = ((a & 0x0F) as i32) << 4;
    match (a & 0x70) >> 4 {
        0 => magnitude += 8,
        1 => magnitude += 0x108,
        segment => {
            magnitude += 0x108;
            magnitude <<= segment - 1;
        }
    }
    if a & 0x80 != 0 {
        magnitude as i16
    } else {
        -magnitude as i16
    }
}

/// Re-encode interleaved frames from `from` into `to`, appending to `out`.
///
/// Returns the number of whole frames converted; a trailing partial frame
/// is ignored.
pub fn convert_frames(input: &[u8], from: &PcmLayout, to: &PcmLayout, out: &mut Vec<u8>) -> usize {
    let frame_bytes = from.bytes_per_frame();
    if frame_bytes == 0 {
        return 0;
    }
    let frames = input.len() / frame_bytes;
    out.reserve(frames * to.bytes_per_frame());

    for sample in input[..frames * frame_bytes].chunks_exact(from.bytes_per_sample) {
        encode_sample(decode_sample(sample, from), to.bytes_per_sample, to.big_endian, out);
    }
    frames
}

/// Converted output not yet handed to the caller.
#[derive(Debug, Default)]
pub struct PendingOutput {
    bytes: Vec<u8>,
    read: usize,
}

impl PendingOutput {
    pub fn buffer_mut(&mut self) -> &mut Vec<u8> {
        if self.read > 0 && self.read == self.bytes.len() {
            self.clear();
        }
        &mut self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len() - self.read
    }

    /// Copy as much as fits into `out`; returns the bytes copied.
    pub fn drain_into(&mut self, out: &mut [u8]) -> usize {
        let count = self.len().min(out.len());
        out[..count].copy_from_slice(&self.bytes[self.read..self.read + count]);
        self.read += count;
        if self.read == self.bytes.len() {
            self.clear();
        }
        count
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.read = 0;
    }
}

/// Interleaves decoder output into signed PCM bytes.
#[cfg(feature = "symphonia-backend")]
pub struct SampleConverter;

#[cfg(feature = "symphonia-backend")]
impl SampleConverter {
    /// Append `buffer` to `out` as interleaved `bytes_per_sample`-byte
    /// signed samples. Returns the number of frames written.
    pub fn write_interleaved(
        buffer: &AudioBufferRef<'_>,
        bytes_per_sample: usize,
        big_endian: bool,
        out: &mut Vec<u8>,
    ) -> usize {
        let mut samples = Vec::new();
        match buffer {
            AudioBufferRef::U8(buf) => Self::interleave(&**buf, &mut samples),
            AudioBufferRef::U16(buf) => Self::interleave(&**buf, &mut samples),
            AudioBufferRef::U24(buf) => Self::interleave(&**buf, &mut samples),
            AudioBufferRef::U32(buf) => Self::interleave(&**buf, &mut samples),
            AudioBufferRef::S8(buf) => Self::interleave(&**buf, &mut samples),
            AudioBufferRef::S16(buf) => Self::interleave(&**buf, &mut samples),
            AudioBufferRef::S24(buf) => Self::interleave(&**buf, &mut samples),
            AudioBufferRef::S32(buf) => Self::interleave(&**buf, &mut samples),
            AudioBufferRef::F32(buf) => Self::interleave(&**buf, &mut samples),
            AudioBufferRef::F64(buf) => Self::interleave(&**buf, &mut samples),
        }

        out.reserve(samples.len() * bytes_per_sample);
        for sample in &samples {
            encode_sample(*sample, bytes_per_sample, big_endian, out);
        }
        buffer.frames()
    }

    fn interleave<T>(buf: &AudioBuffer<T>, out: &mut Vec<i32>)
    where
        T: Sample + IntoSample<i32>,
    {
        let channels = buf.spec().channels.count();
        let frames = buf.frames();
        out.reserve(frames * channels);

        for frame in 0..frames {
            for channel in 0..channels {
                out.push(buf.chan(channel)[frame].into_sample());
            }
        }
    }
}
