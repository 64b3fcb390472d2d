//! Local locator resolution and `std::io::Read` byte sources.

use std::io::{ErrorKind, Read};
use std::path::PathBuf;

use bridge_traits::{
    error::{BridgeError, Result},
    ByteSource, StatusCode,
};
use bytes::Bytes;
use tracing::debug;

/// Resolve a plain path or `file://` URL to an existing local file.
///
/// # Errors
///
/// - [`BridgeError::NotFound`] if nothing exists at the path
/// - [`BridgeError::Unsupported`] for non-file URL schemes
pub fn resolve_locator(locator: &str) -> Result<PathBuf> {
    let path = if let Some(rest) = locator.strip_prefix("file://") {
        // file://localhost/x and file:///x both name /x
        let rest = rest.strip_prefix("localhost").unwrap_or(rest);
        PathBuf::from(percent_decode(rest))
    } else if locator.contains("://") {
        return Err(BridgeError::unsupported(
            format!("Unsupported locator scheme: {}", locator.split("://").next().unwrap_or_default()),
            StatusCode::UNSUPPORTED_FILE_TYPE,
        ));
    } else {
        PathBuf::from(locator)
    };

    if !path.is_file() {
        debug!(path = ?path, "Locator does not resolve to a file");
        return Err(BridgeError::NotFound(locator.to_string()));
    }
    Ok(path)
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let high = (bytes[i + 1] as char).to_digit(16);
            let low = (bytes[i + 2] as char).to_digit(16);
            if let (Some(high), Some(low)) = (high, low) {
                out.push((high * 16 + low) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Pulls bytes from any reader on demand.
pub struct ReaderByteSource<R> {
    reader: R,
    finished: bool,
}

impl<R: Read + Send> ReaderByteSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            finished: false,
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read + Send> ByteSource for ReaderByteSource<R> {
    fn request_bytes(&mut self, max_len: usize) -> Result<Option<Bytes>> {
        if self.finished {
            return Ok(None);
        }

        let mut chunk = vec![0u8; max_len.max(1)];
        let read = loop {
            match self.reader.read(&mut chunk) {
                Ok(read) => break read,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(BridgeError::Io(e)),
            }
        };

        if read == 0 {
            self.finished = true;
            return Ok(None);
        }
        chunk.truncate(read);
        Ok(Some(Bytes::from(chunk)))
    }
}
