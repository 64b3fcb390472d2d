//! Random-access source backed by an [`AudioFileService`].

use bridge_traits::{
    AudioFileOpener, AudioFileService, BridgeError, FileTypeHint, FramePacketTranslation,
    PacketDescriptor, StatusCode, StreamFormat,
};
use core_runtime::logging::redact_locator;
use tracing::{debug, instrument, warn};

use super::{PullSource, SidebandConfig};
use crate::buffer::SharedBuffer;
use crate::error::{PipelineError, Result};
use crate::position::PositionState;

/// Everything learned about a file while opening it.
struct FileLayout {
    format: StreamFormat,
    packet_count: u64,
    packet_size_upper_bound: u32,
    cookie: Option<SidebandConfig>,
}

/// A complete file read packet-by-packet.
///
/// Each fill reads as many whole packets as fit in the destination buffer,
/// starting at the current packet position. The file handle is released on
/// [`close`](PullSource::close) or drop.
pub struct RandomAccessSource {
    file: Box<dyn AudioFileService>,
    format: StreamFormat,
    cookie: Option<SidebandConfig>,
    packet_count: u64,
    packet_size_upper_bound: u32,
    packets_per_read: u32,
    descriptors: Vec<PacketDescriptor>,
    position: PositionState,
    closed: bool,
}

impl RandomAccessSource {
    /// Open `locator` through `opener` and size reads for a buffer of
    /// `buffer_capacity` bytes.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::NotFound`] if the locator does not resolve
    /// - [`PipelineError::UnsupportedFormat`] if the file cannot be opened or
    ///   its format, packet count or packet size cannot be queried
    #[instrument(skip(opener), fields(locator = %redact_locator(locator)))]
    pub fn open(
        opener: &dyn AudioFileOpener,
        locator: &str,
        hint: FileTypeHint,
        buffer_capacity: usize,
    ) -> Result<Self> {
        let file = opener
            .open(locator, hint)
            .map_err(|e| PipelineError::from_open("Failed to open audio file", e))?;
        Self::from_file(file, buffer_capacity)
    }

    /// Wrap an already opened file. The file is closed if setup fails.
    pub fn from_file(mut file: Box<dyn AudioFileService>, buffer_capacity: usize) -> Result<Self> {
        let layout = match describe(file.as_ref()) {
            Ok(layout) => layout,
            Err(err) => {
                if let Err(close_err) = file.close() {
                    warn!("Failed to close audio file after setup error: {}", close_err);
                }
                return Err(err);
            }
        };

        let packets_per_read = packets_per_read(buffer_capacity, layout.packet_size_upper_bound);
        debug!(
            format = ?layout.format.format_tag,
            packets = layout.packet_count,
            upper_bound = layout.packet_size_upper_bound,
            packets_per_read,
            "Opened random-access source"
        );

        Ok(Self {
            file,
            format: layout.format,
            cookie: layout.cookie,
            packet_count: layout.packet_count,
            packet_size_upper_bound: layout.packet_size_upper_bound,
            packets_per_read,
            descriptors: Vec::with_capacity(packets_per_read as usize),
            position: PositionState::new(),
            closed: false,
        })
    }

    /// Largest packet the file can contain.
    pub fn packet_size_upper_bound(&self) -> u32 {
        self.packet_size_upper_bound
    }

    /// Packets read per fill for the capacity given at open.
    pub fn packets_per_read(&self) -> u32 {
        self.packets_per_read
    }

    /// Size of the underlying resource, when the backend knows it.
    pub fn byte_length(&self) -> Option<u64> {
        self.file.byte_length()
    }
}

fn describe(file: &dyn AudioFileService) -> Result<FileLayout> {
    let format = file
        .data_format()
        .map_err(|e| PipelineError::unsupported_format("Failed to get data format", &e))?;
    let packet_count = file
        .packet_count()
        .map_err(|e| PipelineError::unsupported_format("Failed to get packet count", &e))?;
    let packet_size_upper_bound = if format.is_vbr() {
        file.packet_size_upper_bound()
            .map_err(|e| PipelineError::unsupported_format("Failed to get maximum packet size", &e))?
    } else {
        format.bytes_per_packet
    };

    let cookie = match file.magic_cookie() {
        Ok(cookie) => cookie.map(SidebandConfig::new),
        Err(BridgeError::Unsupported { code, .. }) if code == StatusCode::UNSUPPORTED_PROPERTY => None,
        Err(e) => return Err(PipelineError::unsupported_format("Failed to get magic cookie", &e)),
    };

    Ok(FileLayout {
        format,
        packet_count,
        packet_size_upper_bound,
        cookie,
    })
}

fn packets_per_read(capacity: usize, upper_bound: u32) -> u32 {
    if upper_bound == 0 {
        return 0;
    }
    (capacity / upper_bound as usize).min(u32::MAX as usize) as u32
}

impl PullSource for RandomAccessSource {
    fn format(&self) -> Option<&StreamFormat> {
        Some(&self.format)
    }

    fn cookie(&self) -> Option<&SidebandConfig> {
        self.cookie.as_ref()
    }

    fn packet_count(&self) -> Option<u64> {
        Some(self.packet_count)
    }

    fn fill(&mut self, buffer: &mut SharedBuffer) -> Result<usize> {
        if self.closed {
            return Err(PipelineError::Closed);
        }

        let max_packets = packets_per_read(buffer.capacity(), self.packet_size_upper_bound);
        if max_packets == 0 {
            return Err(PipelineError::CapacityExceeded {
                message: "Buffer smaller than one packet".to_string(),
                needed: self.packet_size_upper_bound as usize,
                available: buffer.capacity(),
            });
        }

        self.descriptors.clear();
        let read = self
            .file
            .read_packets(
                self.position.packet_position,
                max_packets,
                buffer.storage_mut(),
                &mut self.descriptors,
            )
            .map_err(|e| PipelineError::io_failure("Failed to read packets", &e))?;

        self.position.record_fill(read.packets);
        buffer.set_window(0, read.bytes);

        if read.is_end_of_stream() {
            debug!(packet = self.position.packet_position, "End of file");
        }
        Ok(read.bytes)
    }

    fn position(&self) -> &PositionState {
        &self.position
    }

    fn descriptors(&self) -> Option<&[PacketDescriptor]> {
        self.format.is_vbr().then_some(self.descriptors.as_slice())
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn frame_to_packet(&self, frame: i64) -> Result<FramePacketTranslation> {
        self.file
            .frame_to_packet(frame)
            .map_err(|e| PipelineError::seek("Failed to translate frame to packet", e.code()))
    }

    fn seek_to_packet(&mut self, packet: i64, frame_offset_in_packet: u32) -> Result<()> {
        if self.closed {
            return Err(PipelineError::Closed);
        }
        if packet < 0 || packet as u64 > self.packet_count {
            return Err(PipelineError::seek(
                format!("Packet {} outside 0..={}", packet, self.packet_count),
                StatusCode::INVALID_PACKET_OFFSET,
            ));
        }

        self.position.seek(packet, frame_offset_in_packet);
        self.descriptors.clear();
        debug!(packet, frame_offset_in_packet, "Seeked random-access source");
        Ok(())
    }

    fn take_frame_offset(&mut self) -> u32 {
        self.position.take_frame_offset()
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.file
            .close()
            .map_err(|e| PipelineError::io_failure("Failed to close audio file", &e))
    }
}

impl Drop for RandomAccessSource {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("{}", err);
        }
    }
}
