// Fits the 720x1280 logical canvas into whatever the window currently is.
// Visual: the poster stays centered and uniformly scaled as you resize the window.

use crate::layout::{POSTER_HEIGHT, POSTER_WIDTH, Position};

/// Lower bound so a collapsed window never yields a zero or negative scale.
pub const MIN_SCALE: f32 = 0.1;
pub const DEFAULT_PADDING: f32 = 20.0;

/// A point in window pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
}

impl ScreenPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Display-time transform: logical -> screen is `offset + p * scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportTransform {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl ViewportTransform {
    /// No scaling, no translation: what export renders with.
    pub const fn identity() -> Self {
        Self { scale: 1.0, offset_x: 0.0, offset_y: 0.0 }
    }

    pub fn to_logical(&self, p: ScreenPoint) -> Position {
        Position::new((p.x - self.offset_x) / self.scale, (p.y - self.offset_y) / self.scale)
    }

    pub fn to_screen(&self, p: Position) -> ScreenPoint {
        ScreenPoint::new(self.offset_x + p.x * self.scale, self.offset_y + p.y * self.scale)
    }
}

/// `max(0.1, min(availW/720, availH/1280))` with `avail = container - padding`.
pub fn compute_scale(container_w: f32, container_h: f32, padding: f32) -> f32 {
    let avail_w = container_w - padding;
    let avail_h = container_h - padding;
    let scale_w = avail_w / POSTER_WIDTH as f32;
    let scale_h = avail_h / POSTER_HEIGHT as f32;
    scale_w.min(scale_h).max(MIN_SCALE)
}

/// Watches the container size and keeps the current transform.
#[derive(Debug, Clone)]
pub struct ViewportScaler {
    padding: f32,
    container: Option<(usize, usize)>,
    transform: ViewportTransform,
}

impl ViewportScaler {
    pub fn new(padding: f32) -> Self {
        Self { padding, container: None, transform: ViewportTransform::identity() }
    }

    /// Pure: the transform for a container of this size.
    pub fn transform_for(&self, width: usize, height: usize) -> ViewportTransform {
        let (w, h) = (width as f32, height as f32);
        let scale = compute_scale(w, h, self.padding);
        ViewportTransform {
            scale,
            offset_x: (w - POSTER_WIDTH as f32 * scale) / 2.0,
            offset_y: (h - POSTER_HEIGHT as f32 * scale) / 2.0,
        }
    }

    /// Feed the latest observed container size. Returns true when it changed.
    pub fn observe(&mut self, width: usize, height: usize) -> bool {
        if self.container == Some((width, height)) {
            return false;
        }
        self.container = Some((width, height));
        self.transform = self.transform_for(width, height);
        tracing::debug!(width, height, scale = self.transform.scale, "viewport rescaled");
        true
    }

    pub fn transform(&self) -> ViewportTransform {
        self.transform
    }

    pub fn scale(&self) -> f32 {
        self.transform.scale
    }
}

impl Default for ViewportScaler {
    fn default() -> Self {
        Self::new(DEFAULT_PADDING)
    }
}
