//! Packet position bookkeeping.

/// Where a source stands in its packet sequence.
///
/// `packet_position` only moves backwards on seek. Every fill first records
/// the current position in `last_fill_packet_position`, so the packets
/// delivered by the most recent fill are
/// `packet_position - last_fill_packet_position`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PositionState {
    pub packet_position: i64,
    pub last_fill_packet_position: i64,
    pub frame_offset_in_packet: u32,
}

impl PositionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packets delivered since the last fill began.
    pub fn packets_since_last_fill(&self) -> i64 {
        self.packet_position - self.last_fill_packet_position
    }

    /// Start a new fill epoch.
    pub fn mark_fill(&mut self) {
        self.last_fill_packet_position = self.packet_position;
    }

    /// Record `packets` more packets in the current epoch.
    pub fn advance(&mut self, packets: u32) {
        self.packet_position += packets as i64;
    }

    /// A complete fill: new epoch holding exactly `packets` packets.
    pub fn record_fill(&mut self, packets: u32) {
        self.mark_fill();
        self.advance(packets);
    }

    /// Jump to `packet`, remembering how many frames of it to skip.
    pub fn seek(&mut self, packet: i64, frame_offset_in_packet: u32) {
        self.packet_position = packet;
        self.frame_offset_in_packet = frame_offset_in_packet;
    }

    /// Return and clear the pending intra-packet frame offset.
    pub fn take_frame_offset(&mut self) -> u32 {
        std::mem::take(&mut self.frame_offset_in_packet)
    }
}
