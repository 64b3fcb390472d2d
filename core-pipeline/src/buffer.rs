//! # Shared Byte Buffer
//!
//! Fixed-capacity byte region shared between a pipeline stage (writer) and
//! the host (reader), with a `(position, limit)` cursor.
//!
//! ## Design
//!
//! - **Capacity**: Fixed at creation, never grows
//! - **Window**: Bytes in `[position, limit)` are unread; a fill resets the
//!   window to `(0, bytes_written)`
//! - **Append**: Push-fed stages may accumulate data at `limit` until the
//!   capacity is reached; overflowing is an error, never a truncation
//!
//! ## Usage
//!
//! ```rust
//! use core_pipeline::buffer::SharedBuffer;
//!
//! let mut buffer = SharedBuffer::new(8);
//! buffer.append(&[1, 2, 3]).unwrap();
//!
//! let mut out = [0u8; 2];
//! assert_eq!(buffer.read_into(&mut out), 2);
//! assert_eq!(buffer.remaining(), 1);
//! ```

use crate::error::{PipelineError, Result};

/// Byte buffer with an externally visible read window.
#[derive(Debug, Clone)]
pub struct SharedBuffer {
    data: Box<[u8]>,
    position: usize,
    limit: usize,
}

impl SharedBuffer {
    /// Create an empty buffer of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            position: 0,
            limit: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Unread bytes in the window.
    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    pub fn has_remaining(&self) -> bool {
        self.position < self.limit
    }

    /// Space left after `limit`.
    pub fn spare_capacity(&self) -> usize {
        self.capacity() - self.limit
    }

    /// Set the window. `limit` is clamped to the capacity and `position`
    /// to `limit`.
    pub fn set_window(&mut self, position: usize, limit: usize) {
        self.limit = limit.min(self.capacity());
        self.position = position.min(self.limit);
    }

    /// Move the read cursor, clamped to `limit`.
    pub fn set_position(&mut self, position: usize) {
        self.position = position.min(self.limit);
    }

    /// Empty the window.
    pub fn clear(&mut self) {
        self.position = 0;
        self.limit = 0;
    }

    /// Mark every unread byte as consumed.
    pub fn consume_all(&mut self) {
        self.position = self.limit;
    }

    /// The unread bytes.
    pub fn unread(&self) -> &[u8] {
        &self.data[self.position..self.limit]
    }

    /// Everything written in the current epoch, read or not.
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.limit]
    }

    /// The whole backing region, for stages that overwrite it on fill.
    pub fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Copy `bytes` in at `limit` and extend the window to cover them,
    /// rewinding `position` to the start of the epoch.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::CapacityExceeded`] when fewer than
    /// `bytes.len()` bytes are free; the buffer is left untouched.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let available = self.spare_capacity();
        if available < bytes.len() {
            return Err(PipelineError::CapacityExceeded {
                message: "Native buffer too small".to_string(),
                needed: bytes.len(),
                available,
            });
        }

        let start = self.limit;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        self.set_window(0, start + bytes.len());
        Ok(())
    }

    /// Copy unread bytes into `out` and advance `position`.
    ///
    /// Returns the number of bytes copied.
    pub fn read_into(&mut self, out: &mut [u8]) -> usize {
        let count = self.remaining().min(out.len());
        out[..count].copy_from_slice(&self.data[self.position..self.position + count]);
        self.position += count;
        count
    }
}
