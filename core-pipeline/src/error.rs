//! # Pipeline Error Types
//!
//! Error taxonomy for the buffered pull-pipeline.
//!
//! Errors raised by a backend keep the backend's [`StatusCode`] so hosts can
//! render `"<message> (<code>)"`. End-of-stream is never an error: fills
//! report it as a zero-byte result.

use bridge_traits::{BridgeError, StatusCode};
use thiserror::Error;

/// Host-facing error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The resource does not exist.
    FileNotFound,
    /// The data, codec or requested conversion is not supported.
    UnsupportedFormat,
    /// Reading, converting or buffering failed after a successful open.
    Io,
    /// A caller-supplied value violates a precondition.
    IllegalArgument,
}

/// Errors that can occur while building or driving a pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    // ========================================================================
    // Setup Errors
    // ========================================================================
    /// The locator does not resolve to an existing resource.
    #[error("{0}")]
    NotFound(String),

    /// Codec or container unrecognized or malformed.
    #[error("{message} ({code})")]
    UnsupportedFormat { message: String, code: StatusCode },

    /// No converter bridges the source and target formats.
    #[error("{message} ({code})")]
    UnsupportedConversion { message: String, code: StatusCode },

    /// Caller-supplied configuration violates a precondition.
    #[error("{0}")]
    InvalidArgument(String),

    // ========================================================================
    // Streaming Errors
    // ========================================================================
    /// Read failure after the resource was opened.
    #[error("{message} ({code})")]
    IoFailure { message: String, code: StatusCode },

    /// The converter backend failed mid-fill.
    #[error("{message} ({code})")]
    ConversionError { message: String, code: StatusCode },

    /// The destination buffer cannot hold the incoming data.
    #[error("{message}: need {needed} bytes, {available} available")]
    CapacityExceeded {
        message: String,
        needed: usize,
        available: usize,
    },

    // ========================================================================
    // Control Errors
    // ========================================================================
    /// A timestamp could not be translated into a packet position.
    #[error("{message} ({code})")]
    SeekError { message: String, code: StatusCode },

    /// The operation is not available for this source.
    #[error("{0}")]
    Unsupported(String),

    /// The stream was closed.
    #[error("Stream is closed")]
    Closed,
}

impl PipelineError {
    pub fn unsupported_format(message: impl Into<String>, source: &BridgeError) -> Self {
        Self::UnsupportedFormat {
            message: message.into(),
            code: source.code(),
        }
    }

    pub fn io_failure(message: impl Into<String>, source: &BridgeError) -> Self {
        Self::IoFailure {
            message: message.into(),
            code: source.code(),
        }
    }

    pub fn conversion(message: impl Into<String>, source: &BridgeError) -> Self {
        Self::ConversionError {
            message: message.into(),
            code: source.code(),
        }
    }

    pub fn seek(message: impl Into<String>, code: StatusCode) -> Self {
        Self::SeekError {
            message: message.into(),
            code,
        }
    }

    /// Map an open failure: missing files stay `NotFound`, anything else is
    /// an unsupported format carrying the backend code.
    pub fn from_open(message: impl Into<String>, source: BridgeError) -> Self {
        match source {
            BridgeError::NotFound(what) => Self::NotFound(what),
            other => Self::unsupported_format(message, &other),
        }
    }

    /// Category the host should surface this error as.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound(_) => ErrorCategory::FileNotFound,
            Self::UnsupportedFormat { .. }
            | Self::UnsupportedConversion { .. }
            | Self::SeekError { .. } => ErrorCategory::UnsupportedFormat,
            Self::InvalidArgument(_) => ErrorCategory::IllegalArgument,
            Self::IoFailure { .. }
            | Self::ConversionError { .. }
            | Self::CapacityExceeded { .. }
            | Self::Unsupported(_)
            | Self::Closed => ErrorCategory::Io,
        }
    }

    /// Diagnostic code, when the error originated in a backend.
    pub fn code(&self) -> Option<StatusCode> {
        match self {
            Self::UnsupportedFormat { code, .. }
            | Self::UnsupportedConversion { code, .. }
            | Self::IoFailure { code, .. }
            | Self::ConversionError { code, .. }
            | Self::SeekError { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<PipelineError> for std::io::Error {
    fn from(err: PipelineError) -> Self {
        let kind = match err.category() {
            ErrorCategory::FileNotFound => std::io::ErrorKind::NotFound,
            ErrorCategory::UnsupportedFormat => std::io::ErrorKind::InvalidData,
            ErrorCategory::IllegalArgument => std::io::ErrorKind::InvalidInput,
            ErrorCategory::Io => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_with_code() {
        let err = PipelineError::IoFailure {
            message: "Failed to read packets".to_string(),
            code: StatusCode::from_fourcc(*b"dta?"),
        };
        assert_eq!(err.to_string(), "Failed to read packets (dta?)");
        assert_eq!(err.category(), ErrorCategory::Io);
    }

    #[test]
    fn test_from_open_keeps_not_found() {
        let err = PipelineError::from_open(
            "Failed to open audio file",
            BridgeError::NotFound("/music/missing.wav".to_string()),
        );
        assert!(matches!(err, PipelineError::NotFound(_)));
        assert_eq!(err.category(), ErrorCategory::FileNotFound);
        assert_eq!(err.code(), None);
    }

    #[test]
    fn test_from_open_wraps_other_failures() {
        let err = PipelineError::from_open(
            "Failed to open audio file",
            BridgeError::unsupported("bad header", StatusCode::UNSUPPORTED_FILE_TYPE),
        );
        assert_eq!(err.to_string(), "Failed to open audio file (typ?)");
        assert_eq!(err.category(), ErrorCategory::UnsupportedFormat);
    }

    #[test]
    fn test_io_error_kind() {
        let io: std::io::Error = PipelineError::InvalidArgument("frameSize must be positive".into()).into();
        assert_eq!(io.kind(), std::io::ErrorKind::InvalidInput);
    }
}
