//! Packet framing for push-fed buffers.
//!
//! Keeps one [`PacketDescriptor`] per packet held in the current buffer
//! epoch. Offsets are relative to the start of the epoch and recomputed as a
//! running sum on every append, so whatever offsets a parser reported for
//! its own chunk are discarded.

use bridge_traits::PacketDescriptor;

use crate::buffer::SharedBuffer;
use crate::error::Result;

/// Growable, index-aligned packet descriptor list.
#[derive(Debug, Clone, Default)]
pub struct PacketFramer {
    descriptors: Vec<PacketDescriptor>,
}

impl PacketFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append packet bytes to `buffer` and their descriptors to the list.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityExceeded`](crate::PipelineError::CapacityExceeded)
    /// when `buffer` cannot take `new_bytes`. Neither the buffer nor the
    /// descriptor list changes in that case.
    pub fn append_packets(
        &mut self,
        buffer: &mut SharedBuffer,
        new_bytes: &[u8],
        new_descriptors: &[PacketDescriptor],
    ) -> Result<()> {
        buffer.append(new_bytes)?;

        self.descriptors.reserve(new_descriptors.len());
        self.descriptors.extend_from_slice(new_descriptors);
        self.recompute_offsets();
        Ok(())
    }

    fn recompute_offsets(&mut self) {
        let mut offset = 0u64;
        for descriptor in &mut self.descriptors {
            descriptor.start_offset = offset;
            offset += descriptor.byte_size as u64;
        }
    }

    /// Drop every descriptor. Called when the buffer epoch restarts.
    pub fn reset(&mut self) {
        self.descriptors.clear();
    }

    pub fn descriptors(&self) -> &[PacketDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Bytes covered by the descriptors.
    pub fn total_bytes(&self) -> u64 {
        self.descriptors.last().map(|d| d.end_offset()).unwrap_or(0)
    }
}
