//! Layout geometry to backend pixel rectangles.
//!
//! The UI lays out in logical pixels; backends place their surface in
//! device pixels. Translation scales, subtracts occlusion insets, clamps to
//! the content bounds, and rounds. The translator remembers the last rect
//! it sent so unchanged layouts cost nothing.

use crate::constants::HIDDEN_VIEWPORT_OFFSET;

/// A rectangle in logical (unscaled) pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LogicalRect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

impl LogicalRect {
    /// Construct from components.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }
}

/// Edges covered by overlays (logical pixels).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Insets {
    /// Covered from the top.
    pub top: f64,
    /// Covered from the right.
    pub right: f64,
    /// Covered from the bottom.
    pub bottom: f64,
    /// Covered from the left.
    pub left: f64,
}

/// Where the video should appear, as laid out by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LayoutGeometry {
    /// Content area of the window.
    pub bounds: LogicalRect,
    /// Device pixels per logical pixel.
    pub scale: f64,
    /// Parts of the content area hidden behind overlays.
    pub insets: Insets,
    /// Explicit video area for window-embedded backends; `None` fills the
    /// bounds.
    pub target: Option<LogicalRect>,
    /// Video should not be visible.
    pub hidden: bool,
}

impl LayoutGeometry {
    /// Whether every coordinate is a finite number.
    fn is_finite(&self) -> bool {
        let rect_ok = |r: &LogicalRect| [r.x, r.y, r.width, r.height].iter().all(|v| v.is_finite());
        let i = &self.insets;
        rect_ok(&self.bounds)
            && self.target.as_ref().is_none_or(rect_ok)
            && [i.top, i.right, i.bottom, i.left].iter().all(|v| v.is_finite())
    }
}

/// Backend-native placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewportRect {
    /// Left edge, device pixels.
    pub x: i32,
    /// Top edge, device pixels.
    pub y: i32,
    /// Width, device pixels; at least 1.
    pub width: i32,
    /// Height, device pixels; at least 1.
    pub height: i32,
    /// Surface is parked off-screen.
    pub hidden: bool,
}

impl ViewportRect {
    /// The off-screen 1×1 placement used for hidden video.
    pub const HIDDEN: Self = Self {
        x: HIDDEN_VIEWPORT_OFFSET,
        y: HIDDEN_VIEWPORT_OFFSET,
        width: 1,
        height: 1,
        hidden: true,
    };
}

/// Convert layout geometry to a device-pixel rect.
pub fn translate(geometry: &LayoutGeometry) -> ViewportRect {
    if geometry.hidden || !geometry.is_finite() {
        return ViewportRect::HIDDEN;
    }

    let scale = if geometry.scale.is_finite() && geometry.scale > 0.0 {
        geometry.scale
    } else {
        1.0
    };

    let b = geometry.bounds;
    let i = geometry.insets;
    let left = b.x + i.left.max(0.0);
    let top = b.y + i.top.max(0.0);
    let right = (b.x + b.width - i.right.max(0.0)).max(left);
    let bottom = (b.y + b.height - i.bottom.max(0.0)).max(top);

    let t = geometry.target.unwrap_or(b);
    let x0 = t.x.clamp(left, right);
    let y0 = t.y.clamp(top, bottom);
    let x1 = (t.x + t.width.max(0.0)).clamp(x0, right);
    let y1 = (t.y + t.height.max(0.0)).clamp(y0, bottom);

    // Extents are computed in i64 so huge finite bounds cannot overflow.
    let px = |v: f64| (v * scale).round() as i64;
    let to_i32 = |v: i64| v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
    let (x, y) = (px(x0), px(y0));
    ViewportRect {
        x: to_i32(x),
        y: to_i32(y),
        width: to_i32((px(x1) - x).max(1)),
        height: to_i32((px(y1) - y).max(1)),
        hidden: false,
    }
}

/// Deduplicating translator for one backend.
#[derive(Debug, Clone, Default)]
pub struct ViewportTranslator {
    last_sent: Option<ViewportRect>,
}

impl ViewportTranslator {
    /// Translator with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate and return the rect only if it differs from the last one
    /// sent.
    pub fn update(&mut self, geometry: &LayoutGeometry) -> Option<ViewportRect> {
        self.offer(translate(geometry))
    }

    /// Return `rect` if it differs from the last one sent, remembering it.
    pub fn offer(&mut self, rect: ViewportRect) -> Option<ViewportRect> {
        if self.last_sent == Some(rect) {
            return None;
        }
        self.last_sent = Some(rect);
        Some(rect)
    }

    /// Forget the last rect so the next update is sent (failed send or new
    /// backend).
    pub fn invalidate(&mut self) {
        self.last_sent = None;
    }

    /// Last rect handed out.
    pub fn last_sent(&self) -> Option<ViewportRect> {
        self.last_sent
    }
}
