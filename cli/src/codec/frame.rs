//! Binary header codec for the video frame stream.
//!
//! Each frame on the wire is a fixed 40-byte little-endian header followed
//! immediately by `payload_size` bytes of pixel data. There are no
//! delimiters between frames; the magic marker is the only sync point.
//!
//! ```text
//! offset  size  field
//!      0     4  magic         0x5342544C ("LTBS" on the wire)
//!      4     2  version       1
//!      6     2  header_size   >= 40
//!      8     4  width
//!     12     4  height
//!     16     4  stride        bytes per row
//!     20     4  format        1 = packed RGBA
//!     24     8  pts           presentation timestamp, nanoseconds
//!     32     4  payload_size
//!     36     4  frame_id
//! ```

use bytes::Bytes;

use crate::constants::{FRAME_FORMAT_RGBA, FRAME_HEADER_SIZE, FRAME_MAGIC, FRAME_VERSION};

/// Magic marker as it appears in the byte stream.
pub const MAGIC_BYTES: [u8; 4] = FRAME_MAGIC.to_le_bytes();

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Sync marker; must equal [`FRAME_MAGIC`].
    pub magic: u32,
    /// Header layout version.
    pub version: u16,
    /// Total header length in bytes, including any trailing extension.
    pub header_size: u16,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Bytes per row.
    pub stride: u32,
    /// Pixel format code.
    pub format: u32,
    /// Presentation timestamp in nanoseconds.
    pub pts: u64,
    /// Number of pixel bytes following the header.
    pub payload_size: u32,
    /// Producer-assigned sequence number.
    pub frame_id: u32,
}

impl FrameHeader {
    /// Build a current-version RGBA header for the given geometry.
    pub fn rgba(width: u32, height: u32, stride: u32, pts: u64, frame_id: u32) -> Self {
        Self {
            magic: FRAME_MAGIC,
            version: FRAME_VERSION,
            header_size: FRAME_HEADER_SIZE as u16,
            width,
            height,
            stride,
            format: FRAME_FORMAT_RGBA,
            pts,
            payload_size: stride.saturating_mul(height),
            frame_id,
        }
    }

    /// Parse a header from the first 40 bytes of `buf`.
    ///
    /// Returns `None` if fewer than 40 bytes are available. No field is
    /// validated here; see [`FrameHeader::is_supported`].
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let b = buf.get(..FRAME_HEADER_SIZE)?;
        let u16_at = |o: usize| u16::from_le_bytes([b[o], b[o + 1]]);
        let u32_at = |o: usize| u32::from_le_bytes([b[o], b[o + 1], b[o + 2], b[o + 3]]);
        let mut pts = [0u8; 8];
        pts.copy_from_slice(&b[24..32]);

        Some(Self {
            magic: u32_at(0),
            version: u16_at(4),
            header_size: u16_at(6),
            width: u32_at(8),
            height: u32_at(12),
            stride: u32_at(16),
            format: u32_at(20),
            pts: u64::from_le_bytes(pts),
            payload_size: u32_at(32),
            frame_id: u32_at(36),
        })
    }

    /// Encode into the fixed 40-byte wire representation.
    ///
    /// `header_size` is written as stored; a producer that announces a
    /// larger header is responsible for writing the extension bytes.
    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut out = [0u8; FRAME_HEADER_SIZE];
        out[0..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..6].copy_from_slice(&self.version.to_le_bytes());
        out[6..8].copy_from_slice(&self.header_size.to_le_bytes());
        out[8..12].copy_from_slice(&self.width.to_le_bytes());
        out[12..16].copy_from_slice(&self.height.to_le_bytes());
        out[16..20].copy_from_slice(&self.stride.to_le_bytes());
        out[20..24].copy_from_slice(&self.format.to_le_bytes());
        out[24..32].copy_from_slice(&self.pts.to_le_bytes());
        out[32..36].copy_from_slice(&self.payload_size.to_le_bytes());
        out[36..40].copy_from_slice(&self.frame_id.to_le_bytes());
        out
    }

    /// Whether the version and header size describe a layout we can read.
    pub fn is_supported(&self) -> bool {
        self.magic == FRAME_MAGIC
            && self.version == FRAME_VERSION
            && usize::from(self.header_size) >= FRAME_HEADER_SIZE
    }

    /// Whether the payload is packed RGBA (the only renderable format).
    pub fn is_rgba(&self) -> bool {
        self.format == FRAME_FORMAT_RGBA
    }

    /// Total bytes this frame occupies on the wire.
    pub fn wire_len(&self) -> usize {
        usize::from(self.header_size) + self.payload_size as usize
    }

    /// Geometry portion of the header.
    pub fn video_info(&self) -> VideoInfo {
        VideoInfo {
            width: self.width,
            height: self.height,
            stride: self.stride,
            format: self.format,
        }
    }
}

/// Frame geometry; a change here means the render target must be resized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VideoInfo {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bytes per row.
    pub stride: u32,
    /// Pixel format code.
    pub format: u32,
}

/// One complete video frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePacket {
    /// Decoded header.
    pub header: FrameHeader,
    /// Raw pixel bytes, exactly `header.payload_size` long.
    pub payload: Bytes,
}

impl FramePacket {
    /// Build an RGBA packet, deriving the payload size from `payload`.
    pub fn rgba(width: u32, height: u32, stride: u32, pts: u64, frame_id: u32, payload: Bytes) -> Self {
        let mut header = FrameHeader::rgba(width, height, stride, pts, frame_id);
        header.payload_size = payload.len() as u32;
        Self { header, payload }
    }

    /// Encode header and payload into one contiguous wire buffer.
    pub fn encode(&self) -> Vec<u8> {
        let extension = usize::from(self.header.header_size).saturating_sub(FRAME_HEADER_SIZE);
        let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + extension + self.payload.len());
        buf.extend_from_slice(&self.header.encode());
        buf.resize(buf.len() + extension, 0);
        buf.extend_from_slice(&self.payload);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_bytes_on_wire() {
        assert_eq!(&MAGIC_BYTES, b"LTBS");
    }

    #[test]
    fn test_header_field_offsets() {
        let header = FrameHeader {
            magic: FRAME_MAGIC,
            version: 1,
            header_size: 40,
            width: 0x0102_0304,
            height: 720,
            stride: 5120,
            format: 1,
            pts: 0x1122_3344_5566_7788,
            payload_size: 3_686_400,
            frame_id: 9,
        };
        let bytes = header.encode();
        assert_eq!(&bytes[0..4], b"LTBS");
        assert_eq!(&bytes[4..6], &[1, 0]);
        assert_eq!(&bytes[6..8], &[40, 0]);
        assert_eq!(&bytes[8..12], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[24..32], &0x1122_3344_5566_7788u64.to_le_bytes());
        assert_eq!(&bytes[36..40], &[9, 0, 0, 0]);
        assert_eq!(FrameHeader::decode(&bytes), Some(header));
    }

    #[test]
    fn test_decode_needs_full_header() {
        let bytes = FrameHeader::rgba(2, 2, 8, 0, 1).encode();
        assert!(FrameHeader::decode(&bytes[..39]).is_none());
        assert!(FrameHeader::decode(&bytes).is_some());
    }

    #[test]
    fn test_supported_rejects_old_version_and_short_header() {
        let mut header = FrameHeader::rgba(2, 2, 8, 0, 1);
        assert!(header.is_supported());
        header.version = 2;
        assert!(!header.is_supported());
        header.version = 1;
        header.header_size = 39;
        assert!(!header.is_supported());
    }

    #[test]
    fn test_packet_encode_pads_extended_header() {
        let mut packet = FramePacket::rgba(1, 1, 4, 0, 1, Bytes::from_static(&[1, 2, 3, 4]));
        packet.header.header_size = 48;
        let wire = packet.encode();
        assert_eq!(wire.len(), 48 + 4);
        assert_eq!(&wire[40..48], &[0u8; 8]);
        assert_eq!(&wire[48..], &[1, 2, 3, 4]);
        assert_eq!(packet.header.wire_len(), wire.len());
    }
}
