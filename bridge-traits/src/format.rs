//! Stream format descriptions shared between the core and its backends.

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Four-character codes
// ============================================================================

fn write_fourcc(f: &mut fmt::Formatter<'_>, value: u32) -> fmt::Result {
    let bytes = value.to_be_bytes();
    if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        bytes.iter().try_for_each(|c| write!(f, "{}", *c as char))
    } else {
        write!(f, "0x{:08X}", value)
    }
}

/// Opaque codec identifier, packed as a big-endian four-character code.
///
/// The zero tag means "not yet known" and is what push-fed sources report
/// until their parser has discovered the data format.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FormatTag(pub u32);

impl FormatTag {
    pub const UNKNOWN: FormatTag = FormatTag(0);
    pub const LINEAR_PCM: FormatTag = FormatTag::from_fourcc(*b"lpcm");
    pub const AC3: FormatTag = FormatTag::from_fourcc(*b"ac-3");
    pub const AES3: FormatTag = FormatTag::from_fourcc(*b"aes3");
    pub const APPLE_IMA4: FormatTag = FormatTag::from_fourcc(*b"ima4");
    pub const MPEG4_AAC: FormatTag = FormatTag::from_fourcc(*b"aac ");
    pub const MPEG4_AAC_HE: FormatTag = FormatTag::from_fourcc(*b"aach");
    pub const MPEG4_AAC_HE_V2: FormatTag = FormatTag::from_fourcc(*b"aacp");
    pub const MPEG4_AAC_LD: FormatTag = FormatTag::from_fourcc(*b"aacl");
    pub const MPEG4_AAC_SCALABLE: FormatTag = FormatTag::from_fourcc(*b"aacs");
    pub const MPEG4_CELP: FormatTag = FormatTag::from_fourcc(*b"celp");
    pub const MPEG4_HVXC: FormatTag = FormatTag::from_fourcc(*b"hvxc");
    pub const MPEG4_TWINVQ: FormatTag = FormatTag::from_fourcc(*b"twvq");
    pub const MPEG_LAYER_1: FormatTag = FormatTag::from_fourcc(*b".mp1");
    pub const MPEG_LAYER_2: FormatTag = FormatTag::from_fourcc(*b".mp2");
    pub const MPEG_LAYER_3: FormatTag = FormatTag::from_fourcc(*b".mp3");
    pub const APPLE_LOSSLESS: FormatTag = FormatTag::from_fourcc(*b"alac");
    pub const ULAW: FormatTag = FormatTag::from_fourcc(*b"ulaw");
    pub const ALAW: FormatTag = FormatTag::from_fourcc(*b"alaw");
    pub const SOWT: FormatTag = FormatTag::from_fourcc(*b"sowt");
    pub const TWOS: FormatTag = FormatTag::from_fourcc(*b"twos");
    pub const AUDIBLE: FormatTag = FormatTag::from_fourcc(*b"AUDB");
    pub const ILBC: FormatTag = FormatTag::from_fourcc(*b"ilbc");
    pub const MICROSOFT_IMA_ADPCM: FormatTag = FormatTag(0x6D73_0011);
    pub const MICROSOFT_GSM: FormatTag = FormatTag(0x6D73_0031);
    pub const AMR: FormatTag = FormatTag::from_fourcc(*b"samr");
    pub const FLAC: FormatTag = FormatTag::from_fourcc(*b"flac");
    pub const VORBIS: FormatTag = FormatTag::from_fourcc(*b"vorb");
    pub const OPUS: FormatTag = FormatTag::from_fourcc(*b"opus");

    /// Every tag the pipeline knows by name.
    pub const CATALOGUE: &'static [FormatTag] = &[
        Self::MPEG_LAYER_1,
        Self::MPEG_LAYER_2,
        Self::MPEG_LAYER_3,
        Self::APPLE_LOSSLESS,
        Self::MPEG4_AAC,
        Self::MPEG4_AAC_HE,
        Self::MPEG4_AAC_HE_V2,
        Self::MPEG4_AAC_LD,
        Self::MPEG4_AAC_SCALABLE,
        Self::MPEG4_CELP,
        Self::MPEG4_HVXC,
        Self::MPEG4_TWINVQ,
        Self::ULAW,
        Self::ALAW,
        Self::SOWT,
        Self::TWOS,
        Self::LINEAR_PCM,
        Self::AUDIBLE,
        Self::ILBC,
        Self::APPLE_IMA4,
        Self::MICROSOFT_IMA_ADPCM,
        Self::MICROSOFT_GSM,
        Self::AES3,
        Self::AMR,
        Self::AC3,
        Self::FLAC,
        Self::VORBIS,
        Self::OPUS,
    ];

    pub const fn from_fourcc(chars: [u8; 4]) -> Self {
        FormatTag(u32::from_be_bytes(chars))
    }

    pub fn fourcc(&self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// `false` for the zero "not yet discovered" tag.
    pub fn is_known(&self) -> bool {
        self.0 != 0
    }

    pub fn is_linear_pcm(&self) -> bool {
        *self == Self::LINEAR_PCM
    }

    /// Look up a catalogue tag by its four-character name.
    pub fn parse(name: &str) -> Option<FormatTag> {
        let bytes: [u8; 4] = name.as_bytes().try_into().ok()?;
        let tag = FormatTag::from_fourcc(bytes);
        Self::CATALOGUE.contains(&tag).then_some(tag)
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_fourcc(f, self.0)
    }
}

impl fmt::Debug for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FormatTag(")?;
        write_fourcc(f, self.0)?;
        write!(f, ")")
    }
}

/// Container type hint handed to stream parsers and file openers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FileTypeHint(pub u32);

impl FileTypeHint {
    pub const UNKNOWN: FileTypeHint = FileTypeHint(0);
    pub const WAVE: FileTypeHint = FileTypeHint::from_fourcc(*b"WAVE");
    pub const AIFF: FileTypeHint = FileTypeHint::from_fourcc(*b"AIFF");
    pub const AIFC: FileTypeHint = FileTypeHint::from_fourcc(*b"AIFC");
    pub const MP3: FileTypeHint = FileTypeHint::from_fourcc(*b"MPG3");
    pub const M4A: FileTypeHint = FileTypeHint::from_fourcc(*b"m4af");
    pub const MP4: FileTypeHint = FileTypeHint::from_fourcc(*b"mp4f");
    pub const CAF: FileTypeHint = FileTypeHint::from_fourcc(*b"caff");
    pub const AAC_ADTS: FileTypeHint = FileTypeHint::from_fourcc(*b"adts");
    pub const FLAC: FileTypeHint = FileTypeHint::from_fourcc(*b"flac");
    pub const OGG: FileTypeHint = FileTypeHint::from_fourcc(*b"OggS");

    pub const fn from_fourcc(chars: [u8; 4]) -> Self {
        FileTypeHint(u32::from_be_bytes(chars))
    }

    pub fn is_known(&self) -> bool {
        self.0 != 0
    }

    /// Map a file extension (without the dot, any case) to a type hint.
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "wav" | "wave" => Self::WAVE,
            "aif" | "aiff" => Self::AIFF,
            "aifc" => Self::AIFC,
            "mp3" | "mpga" => Self::MP3,
            "m4a" | "m4b" => Self::M4A,
            "mp4" => Self::MP4,
            "caf" => Self::CAF,
            "aac" | "adts" => Self::AAC_ADTS,
            "flac" => Self::FLAC,
            "ogg" | "oga" | "opus" => Self::OGG,
            _ => Self::UNKNOWN,
        }
    }

    /// Preferred file extension for this container, if any.
    pub fn extension(&self) -> Option<&'static str> {
        match *self {
            Self::WAVE => Some("wav"),
            Self::AIFF => Some("aiff"),
            Self::AIFC => Some("aifc"),
            Self::MP3 => Some("mp3"),
            Self::M4A => Some("m4a"),
            Self::MP4 => Some("mp4"),
            Self::CAF => Some("caf"),
            Self::AAC_ADTS => Some("aac"),
            Self::FLAC => Some("flac"),
            Self::OGG => Some("ogg"),
            _ => None,
        }
    }
}

impl fmt::Display for FileTypeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_fourcc(f, self.0)
    }
}

impl fmt::Debug for FileTypeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileTypeHint(")?;
        write_fourcc(f, self.0)?;
        write!(f, ")")
    }
}

// ============================================================================
// Stream Format
// ============================================================================

/// Layout flags for linear PCM data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FormatFlags(pub u32);

impl FormatFlags {
    pub const NONE: FormatFlags = FormatFlags(0);
    pub const FLOAT: FormatFlags = FormatFlags(1 << 0);
    pub const BIG_ENDIAN: FormatFlags = FormatFlags(1 << 1);
    pub const SIGNED_INTEGER: FormatFlags = FormatFlags(1 << 2);
    pub const PACKED: FormatFlags = FormatFlags(1 << 3);

    pub fn contains(&self, other: FormatFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: FormatFlags) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for FormatFlags {
    type Output = FormatFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        FormatFlags(self.0 | rhs.0)
    }
}

/// Description of an audio stream's sample and packet layout.
///
/// `bytes_per_packet == 0` marks variable bit-rate data: packets have no
/// fixed stride and every read must carry [`PacketDescriptor`]s.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StreamFormat {
    pub sample_rate: f64,
    pub format_tag: FormatTag,
    pub flags: FormatFlags,
    pub bytes_per_packet: u32,
    pub frames_per_packet: u32,
    pub bytes_per_frame: u32,
    pub channels: u32,
    pub bits_per_channel: u32,
}

impl StreamFormat {
    /// Packed signed-integer linear PCM with one frame per packet.
    pub fn linear_pcm(sample_rate: f64, channels: u32, bits_per_channel: u32, big_endian: bool) -> Self {
        let bytes_per_frame = bits_per_channel.div_ceil(8) * channels;
        let mut flags = FormatFlags::SIGNED_INTEGER | FormatFlags::PACKED;
        if big_endian {
            flags.insert(FormatFlags::BIG_ENDIAN);
        }
        Self {
            sample_rate,
            format_tag: FormatTag::LINEAR_PCM,
            flags,
            bytes_per_packet: bytes_per_frame,
            frames_per_packet: 1,
            bytes_per_frame,
            channels,
            bits_per_channel,
        }
    }

    pub fn is_vbr(&self) -> bool {
        self.bytes_per_packet == 0
    }

    pub fn is_known(&self) -> bool {
        self.format_tag.is_known()
    }

    /// Big-endian only applies to linear PCM; compressed formats report `false`.
    pub fn is_big_endian(&self) -> bool {
        self.format_tag.is_linear_pcm() && self.flags.contains(FormatFlags::BIG_ENDIAN)
    }

    pub fn is_float(&self) -> bool {
        self.flags.contains(FormatFlags::FLOAT)
    }

    pub fn is_signed_integer(&self) -> bool {
        self.flags.contains(FormatFlags::SIGNED_INTEGER)
    }
}

/// Location of one packet inside a buffer epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PacketDescriptor {
    pub start_offset: u64,
    pub byte_size: u32,
}

impl PacketDescriptor {
    pub fn new(start_offset: u64, byte_size: u32) -> Self {
        Self {
            start_offset,
            byte_size,
        }
    }

    pub fn end_offset(&self) -> u64 {
        self.start_offset + self.byte_size as u64
    }
}

/// Result of translating an absolute frame number into packet coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FramePacketTranslation {
    pub packet: i64,
    pub frame_offset_in_packet: u32,
}
