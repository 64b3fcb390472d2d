use std::fmt;

use thiserror::Error;

/// Numeric status reported by a backend capability.
///
/// Backends describe failures with 32-bit codes that are usually four
/// printable ASCII characters packed big-endian (`'fmt?'`, `'typ?'`), but
/// may also be small negative numbers. `Display` renders the four-character
/// form when every byte is printable and falls back to the decimal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub i32);

impl StatusCode {
    /// Generic failure without a more specific code.
    pub const GENERIC: StatusCode = StatusCode(1);
    /// Requested file does not exist.
    pub const FILE_NOT_FOUND: StatusCode = StatusCode(-43);
    /// Read past the end of the data.
    pub const END_OF_FILE: StatusCode = StatusCode(-39);
    /// Unspecified backend error.
    pub const UNSPECIFIED: StatusCode = StatusCode::from_fourcc(*b"wht?");
    /// The container type is not recognised.
    pub const UNSUPPORTED_FILE_TYPE: StatusCode = StatusCode::from_fourcc(*b"typ?");
    /// The data format is not supported.
    pub const UNSUPPORTED_DATA_FORMAT: StatusCode = StatusCode::from_fourcc(*b"fmt?");
    /// The queried property is not available for this data.
    pub const UNSUPPORTED_PROPERTY: StatusCode = StatusCode::from_fourcc(*b"pty?");
    /// The data is malformed.
    pub const INVALID_FILE: StatusCode = StatusCode::from_fourcc(*b"dta?");
    /// A packet index or offset is out of range.
    pub const INVALID_PACKET_OFFSET: StatusCode = StatusCode::from_fourcc(*b"pck?");
    /// A caller-supplied buffer is too small.
    pub const BAD_PROPERTY_SIZE: StatusCode = StatusCode::from_fourcc(*b"!siz");

    /// Pack four ASCII characters into a status code.
    pub const fn from_fourcc(chars: [u8; 4]) -> Self {
        StatusCode(i32::from_be_bytes(chars))
    }

    /// The raw code value.
    pub fn value(&self) -> i32 {
        self.0
    }

    fn printable_chars(&self) -> Option<[u8; 4]> {
        let bytes = self.0.to_be_bytes();
        bytes
            .iter()
            .all(|b| b.is_ascii_graphic() || *b == b' ')
            .then_some(bytes)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.printable_chars() {
            Some(chars) => chars.iter().try_for_each(|c| write!(f, "{}", *c as char)),
            None => write!(f, "{}", self.0),
        }
    }
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("{message} ({code})")]
    Unsupported { message: String, code: StatusCode },

    #[error("{message} ({code})")]
    OperationFailed { message: String, code: StatusCode },

    #[error("End of stream")]
    EndOfStream,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn unsupported(message: impl Into<String>, code: StatusCode) -> Self {
        Self::Unsupported {
            message: message.into(),
            code,
        }
    }

    pub fn failed(message: impl Into<String>, code: StatusCode) -> Self {
        Self::OperationFailed {
            message: message.into(),
            code,
        }
    }

    /// Status code carried by this error.
    pub fn code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::FILE_NOT_FOUND,
            Self::Unsupported { code, .. } | Self::OperationFailed { code, .. } => *code,
            Self::EndOfStream => StatusCode::END_OF_FILE,
            Self::Io(err) => err
                .raw_os_error()
                .map(StatusCode)
                .unwrap_or(StatusCode::GENERIC),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
