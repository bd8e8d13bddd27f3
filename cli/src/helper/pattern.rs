//! Synthetic RGBA test pattern.

use bytes::Bytes;

use crate::codec::frame::FramePacket;

/// Eight vertical colour bars with a sweep line that moves one column per
/// frame, so consecutive frames are distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestPattern {
    width: u32,
    height: u32,
}

const BARS: [[u8; 3]; 8] = [
    [235, 235, 235],
    [235, 235, 16],
    [16, 235, 235],
    [16, 235, 16],
    [235, 16, 235],
    [235, 16, 16],
    [16, 16, 235],
    [16, 16, 16],
];

impl TestPattern {
    /// Pattern of the given size; zero dimensions become 1.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row.
    pub fn stride(&self) -> u32 {
        self.width * 4
    }

    /// Render frame number `index` as an RGBA frame packet.
    pub fn render(&self, index: u32, pts: u64) -> FramePacket {
        let width = self.width as usize;
        let stride = self.stride() as usize;
        let sweep = index as usize % width;

        let mut row = vec![0u8; stride];
        for (x, pixel) in row.chunks_exact_mut(4).enumerate() {
            let [r, g, b] = if x == sweep {
                [255, 255, 255]
            } else {
                BARS[x * BARS.len() / width]
            };
            pixel.copy_from_slice(&[r, g, b, 255]);
        }

        let mut payload = Vec::with_capacity(stride * self.height as usize);
        for _ in 0..self.height {
            payload.extend_from_slice(&row);
        }

        FramePacket::rgba(
            self.width,
            self.height,
            self.stride(),
            pts,
            index,
            Bytes::from(payload),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_matches_header() {
        let pattern = TestPattern::new(64, 36);
        let frame = pattern.render(3, 1_000);
        assert_eq!(frame.header.width, 64);
        assert_eq!(frame.header.height, 36);
        assert_eq!(frame.header.stride, 256);
        assert_eq!(frame.header.frame_id, 3);
        assert_eq!(frame.payload.len(), 256 * 36);
        assert!(frame.header.is_rgba());
    }

    #[test]
    fn test_sweep_line_moves() {
        let pattern = TestPattern::new(16, 2);
        let a = pattern.render(0, 0);
        let b = pattern.render(1, 0);
        assert_ne!(a.payload, b.payload);
        // Column 1 is white only in frame 1.
        assert_eq!(&b.payload[4..8], &[255, 255, 255, 255]);
        assert_ne!(&a.payload[4..8], &[255, 255, 255, 255]);
    }

    #[test]
    fn test_zero_size_is_clamped() {
        let pattern = TestPattern::new(0, 0);
        assert_eq!(pattern.render(0, 0).payload.len(), 4);
    }
}
