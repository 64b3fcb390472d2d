//! Byte source capability for push-fed pipelines.

use bytes::Bytes;

use crate::{error::Result, platform::PlatformSend};

/// Supplies raw container bytes on request.
pub trait ByteSource: PlatformSend {
    /// Return up to `max_len` bytes, or `None` once the source is exhausted.
    ///
    /// An empty chunk is allowed and does not mean end of stream.
    fn request_bytes(&mut self, max_len: usize) -> Result<Option<Bytes>>;
}
