//! Incremental frame decoder with magic-marker resynchronization.
//!
//! The frame stream has no delimiters, so a corrupted or truncated write
//! leaves the reader somewhere in the middle of pixel data. The decoder
//! recovers by scanning for the next magic marker and validating the header
//! that follows it.
//!
//! # States
//!
//! ```text
//!            magic + valid header
//! SeekingMagic ───────────────────> HaveHeader(h)
//!      ▲                                 │
//!      └──── header_size + payload ──────┘
//!            bytes consumed
//! ```
//!
//! Each [`FrameDecoder::feed`] call does work bounded by the bytes supplied.

use bytes::{Buf, BytesMut};

use crate::codec::frame::{FrameHeader, FramePacket, VideoInfo, MAGIC_BYTES};
use crate::constants::{FRAME_HEADER_SIZE, MAX_FRAME_PAYLOAD};

const MAGIC_LEN: usize = MAGIC_BYTES.len();

/// A frame ready for the render path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Set when geometry differs from the previous emitted frame.
    pub info_changed: Option<VideoInfo>,
    /// The frame itself.
    pub packet: FramePacket,
}

/// Counters for diagnosing a noisy stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Frames emitted.
    pub frames: u64,
    /// Complete frames consumed but not emitted (non-RGBA).
    pub skipped_format: u64,
    /// Bytes thrown away while searching for a marker.
    pub discarded_bytes: u64,
    /// Marker matches whose header failed validation.
    pub false_positives: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    SeekingMagic,
    HaveHeader(FrameHeader),
}

/// Byte-stream to frame decoder.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    state: DecodeState,
    last_info: Option<VideoInfo>,
    stats: DecoderStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a new decoder with an empty buffer.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
            state: DecodeState::SeekingMagic,
            last_info: None,
            stats: DecoderStats::default(),
        }
    }

    /// Feed bytes and return every frame completed by them.
    ///
    /// Incomplete data is buffered for the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<DecodedFrame> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();

        loop {
            match self.state {
                DecodeState::SeekingMagic => {
                    if !self.seek_header() {
                        break;
                    }
                }
                DecodeState::HaveHeader(header) => {
                    let total = header.wire_len();
                    if self.buf.len() < total {
                        break;
                    }
                    let mut frame = self.buf.split_to(total).freeze();
                    frame.advance(usize::from(header.header_size));
                    self.state = DecodeState::SeekingMagic;

                    if !header.is_rgba() {
                        self.stats.skipped_format += 1;
                        log::debug!(
                            "[FrameTransport] Skipping frame {} with format {}",
                            header.frame_id,
                            header.format
                        );
                        continue;
                    }

                    let info = header.video_info();
                    let info_changed = (self.last_info != Some(info)).then_some(info);
                    self.last_info = Some(info);
                    self.stats.frames += 1;
                    out.push(DecodedFrame {
                        info_changed,
                        packet: FramePacket {
                            header,
                            payload: frame,
                        },
                    });
                }
            }
        }

        out
    }

    /// Try to move from `SeekingMagic` to `HaveHeader`.
    ///
    /// Returns `false` when more input is needed.
    fn seek_header(&mut self) -> bool {
        if self.buf.len() < MAGIC_LEN {
            return false;
        }

        if self.buf[..MAGIC_LEN] != MAGIC_BYTES {
            match find_magic(&self.buf[1..]) {
                Some(offset) => self.discard(offset + 1),
                None => {
                    let keep = partial_magic_suffix(&self.buf);
                    self.discard(self.buf.len() - keep);
                    return false;
                }
            }
        }

        if self.buf.len() < FRAME_HEADER_SIZE {
            return false;
        }

        match FrameHeader::decode(&self.buf) {
            Some(header) if header.is_supported() && header.payload_size <= MAX_FRAME_PAYLOAD => {
                self.state = DecodeState::HaveHeader(header);
            }
            _ => {
                self.stats.false_positives += 1;
                self.discard(MAGIC_LEN);
            }
        }
        true
    }

    fn discard(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.stats.discarded_bytes += n as u64;
        self.buf.advance(n);
    }

    /// Counters since creation.
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

fn find_magic(haystack: &[u8]) -> Option<usize> {
    haystack.windows(MAGIC_LEN).position(|w| w == MAGIC_BYTES)
}

/// Length of the longest proper prefix of the marker that ends `buf`.
fn partial_magic_suffix(buf: &[u8]) -> usize {
    (1..MAGIC_LEN)
        .rev()
        .find(|&n| buf.len() >= n && buf[buf.len() - n..] == MAGIC_BYTES[..n])
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn rgba_frame(width: u32, height: u32, id: u32, fill: u8) -> Vec<u8> {
        let stride = width * 4;
        let payload = vec![fill; (stride * height) as usize];
        FramePacket::rgba(width, height, stride, u64::from(id) * 1000, id, Bytes::from(payload)).encode()
    }

    #[test]
    fn test_single_frame() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&rgba_frame(2, 2, 1, 7));
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.packet.header.frame_id, 1);
        assert_eq!(frame.packet.payload.len(), 16);
        assert!(frame.packet.payload.iter().all(|b| *b == 7));
        assert_eq!(
            frame.info_changed,
            Some(VideoInfo { width: 2, height: 2, stride: 8, format: 1 })
        );
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_byte_at_a_time() {
        let wire = rgba_frame(3, 1, 5, 1);
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for byte in &wire {
            frames.extend(decoder.feed(std::slice::from_ref(byte)));
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].packet.header.frame_id, 5);
        assert_eq!(decoder.stats().discarded_bytes, 0);
    }

    #[test]
    fn test_resync_after_garbage() {
        let mut wire = vec![0xAB; 37];
        wire.extend_from_slice(b"LT"); // stray partial marker
        wire.extend_from_slice(&[0x00; 11]);
        wire.extend_from_slice(&rgba_frame(2, 1, 9, 3));

        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&wire);
        assert_eq!(frames.len(), 1);
        let header = frames[0].packet.header;
        assert_eq!((header.width, header.height, header.frame_id), (2, 1, 9));
        assert_eq!(decoder.stats().discarded_bytes, 50);
    }

    #[test]
    fn test_marker_split_across_reads() {
        let wire = rgba_frame(1, 1, 2, 0);
        let mut decoder = FrameDecoder::new();

        let mut first = vec![0xEE; 10];
        first.extend_from_slice(&wire[..3]);
        assert!(decoder.feed(&first).is_empty());
        assert_eq!(decoder.buffered(), 3);

        let frames = decoder.feed(&wire[3..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].packet.header.frame_id, 2);
    }

    #[test]
    fn test_false_positive_header_is_skipped() {
        // Marker followed by a bogus version, then a real frame.
        let mut bogus = FrameHeader::rgba(2, 2, 8, 0, 1);
        bogus.version = 9;
        let mut wire = bogus.encode().to_vec();
        wire.extend_from_slice(&rgba_frame(1, 1, 2, 0));

        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&wire);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].packet.header.frame_id, 2);
        assert_eq!(decoder.stats().false_positives, 1);
    }

    #[test]
    fn test_oversized_payload_is_false_positive() {
        let mut huge = FrameHeader::rgba(1, 1, 4, 0, 1);
        huge.payload_size = MAX_FRAME_PAYLOAD + 1;
        let mut wire = huge.encode().to_vec();
        wire.extend_from_slice(&rgba_frame(1, 1, 3, 0));

        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&wire);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].packet.header.frame_id, 3);
    }

    #[test]
    fn test_non_rgba_consumed_silently() {
        let mut other = FramePacket::rgba(1, 1, 4, 0, 1, Bytes::from_static(&[0, 0, 0, 0]));
        other.header.format = 2;
        let mut wire = other.encode();
        wire.extend_from_slice(&rgba_frame(1, 1, 2, 0));

        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&wire);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].packet.header.frame_id, 2);
        assert_eq!(decoder.stats().skipped_format, 1);
        assert_eq!(decoder.stats().discarded_bytes, 0);
    }

    #[test]
    fn test_info_change_only_on_geometry_change() {
        let mut wire = rgba_frame(2, 2, 1, 0);
        wire.extend_from_slice(&rgba_frame(2, 2, 2, 0));
        wire.extend_from_slice(&rgba_frame(4, 2, 3, 0));

        let frames = FrameDecoder::new().feed(&wire);
        let changes: Vec<bool> = frames.iter().map(|f| f.info_changed.is_some()).collect();
        assert_eq!(changes, vec![true, false, true]);
    }

    #[test]
    fn test_extended_header_payload_offset() {
        let mut packet = FramePacket::rgba(1, 1, 4, 0, 4, Bytes::from_static(&[9, 8, 7, 6]));
        packet.header.header_size = 56;
        let frames = FrameDecoder::new().feed(&packet.encode());
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].packet.payload[..], &[9, 8, 7, 6]);
    }

    #[test]
    fn test_random_corruption_resyncs() {
        use crate::constants::FRAME_VERSION;
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0x7462_7264);
        let noise = |rng: &mut StdRng| match rng.random::<u8>() {
            b if b == MAGIC_BYTES[0] => 0xFF,
            b => b,
        };

        let mut wire = Vec::new();
        let mut expected = Vec::new();
        let mut bad_markers = 0u64;
        for id in 1..=60u32 {
            match rng.random_range(0..4) {
                0 => {
                    let len = rng.random_range(1..200);
                    wire.extend((0..len).map(|_| noise(&mut rng)));
                }
                1 => {
                    // Header cut off before its payload size, then padding
                    // that makes the announced size absurd.
                    let cut = rng.random_range(MAGIC_LEN..=32);
                    wire.extend_from_slice(&FrameHeader::rgba(2, 2, 8, 0, id).encode()[..cut]);
                    wire.extend_from_slice(&[0xFF; FRAME_HEADER_SIZE]);
                    bad_markers += 1;
                }
                2 => {
                    let mut header = FrameHeader::rgba(2, 2, 8, 0, id);
                    header.version = FRAME_VERSION + rng.random_range(1..100);
                    wire.extend_from_slice(&header.encode());
                    bad_markers += 1;
                }
                _ => {
                    // Lone marker running straight into the next frame.
                    wire.extend_from_slice(&MAGIC_BYTES);
                    bad_markers += 1;
                }
            }
            let (width, height) = (rng.random_range(1..6), rng.random_range(1..6));
            wire.extend(rgba_frame(width, height, id, 0));
            expected.push(id);
        }

        let mut decoder = FrameDecoder::new();
        let mut ids = Vec::new();
        let mut rest = &wire[..];
        while !rest.is_empty() {
            let n = rng.random_range(1..=97).min(rest.len());
            let (chunk, tail) = rest.split_at(n);
            ids.extend(decoder.feed(chunk).iter().map(|f| f.packet.header.frame_id));
            rest = tail;
        }

        assert_eq!(ids, expected);
        let stats = decoder.stats();
        assert!(bad_markers > 0);
        assert_eq!(stats.false_positives, bad_markers);
        assert_eq!(stats.frames, 60);
        assert!(stats.discarded_bytes > 0);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_partial_suffix() {
        assert_eq!(partial_magic_suffix(b"xxLTB"), 3);
        assert_eq!(partial_magic_suffix(b"xxL"), 1);
        assert_eq!(partial_magic_suffix(b"xxT"), 0);
    }
}
