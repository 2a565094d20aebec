// Window + software drawing utilities for the editor.
// Visual effects provided here:
// 1) A resizable window showing the poster, centered and scaled to fit.
// 2) A ring around the element under (or held by) the mouse, plus its resize handle.
// 3) The 5x7 bitmap font for the hint bar and notice banners.

use image::RgbaImage;
use minifb::{Key, KeyRepeat, MouseButton, MouseMode, Window, WindowOptions};

use crate::error::Error;
use crate::font::{self, GLYPH_W};
use crate::hit::Bounds;
use crate::types::FrameBuffer;
use crate::viewport::{ScreenPoint, ViewportTransform};

/// What the left button did since the previous frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseEdge {
    Pressed,
    Held,
    Released,
    Up,
}

pub struct Drawer {
    window: Window, // the on-screen window you see
    left_was_down: bool,
}

impl Drawer {
    /// Create a resizable window.
    /// Visual: a new empty window appears with your chosen title.
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self, Error> {
        let options = WindowOptions { resize: true, ..WindowOptions::default() };
        let mut window = Window::new(title, width, height, options)
            .map_err(|e| Error::WindowInit(e.to_string()))?;
        window.set_target_fps(60);
        Ok(Self { window, left_was_down: false })
    }

    /// Push the pixels for this frame to the screen.
    /// Visual: the window immediately displays the new image.
    pub fn present(&mut self, framebuffer: &FrameBuffer) -> Result<(), Error> {
        self.window
            .update_with_buffer(&framebuffer.pixels, framebuffer.width, framebuffer.height)
            .map_err(|e| Error::WindowUpdate(e.to_string()))?;
        Ok(())
    }

    /// Returns false when the user closes the window (so we can stop the loop).
    pub fn is_open(&self) -> bool {
        self.window.is_open()
    }

    /// True while ESC is held down (we'll exit when this is pressed).
    pub fn esc_pressed(&self) -> bool {
        self.window.is_key_down(Key::Escape)
    }

    /// Current client-area size; changes when the user drags the window edge.
    pub fn size(&self) -> (usize, usize) {
        self.window.get_size()
    }

    /// Mouse position in window pixels; keeps reporting outside the window
    /// so a drag can carry an element off the canvas.
    pub fn mouse_pos(&self) -> Option<ScreenPoint> {
        self.window
            .get_mouse_pos(MouseMode::Pass)
            .map(|(x, y)| ScreenPoint::new(x, y))
    }

    /// Left button edge since last call. Call exactly once per frame.
    pub fn poll_left(&mut self) -> MouseEdge {
        let down = self.window.get_mouse_down(MouseButton::Left);
        let edge = match (self.left_was_down, down) {
            (false, true) => MouseEdge::Pressed,
            (true, true) => MouseEdge::Held,
            (true, false) => MouseEdge::Released,
            (false, false) => MouseEdge::Up,
        };
        self.left_was_down = down;
        edge
    }

    /// Visual: one action per key press (holding the key doesn't repeat it).
    pub fn pressed_once(&self, key: Key) -> bool {
        self.window.is_key_pressed(key, KeyRepeat::No)
    }

    pub fn shift_down(&self) -> bool {
        self.window.is_key_down(Key::LeftShift) || self.window.is_key_down(Key::RightShift)
    }
}

/* ---------- Software drawing: pixels, lines, rectangles, blits ---------- */

/// Put a pixel on the framebuffer if (x,y) is inside bounds.
#[inline]
fn put_pixel(fb: &mut FrameBuffer, x: i32, y: i32, color: u32) {
    if x < 0 || y < 0 {
        return;
    }
    let (x, y) = (x as usize, y as usize);
    if x >= fb.width || y >= fb.height {
        return;
    }
    let idx = y * fb.width + x;
    fb.pixels[idx] = color;
}

/// Draw a thin line between (x0,y0) and (x1,y1) using Bresenham.
/// Visual: a straight 1-pixel line appears on top of the poster.
pub fn draw_line(fb: &mut FrameBuffer, x0: i32, y0: i32, x1: i32, y1: i32, color: u32) {
    let (mut x0, mut y0, x1, y1) = (x0, y0, x1, y1);
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        put_pixel(fb, x0, y0, color);
        if x0 == x1 && y0 == y1 { break; }
        let e2 = 2 * err;
        if e2 >= dy { err += dy; x0 += sx; }
        if e2 <= dx { err += dx; y0 += sy; }
    }
}

pub fn fill_rect(fb: &mut FrameBuffer, x: i32, y: i32, w: i32, h: i32, color: u32) {
    for yy in y.max(0)..(y + h).min(fb.height as i32) {
        for xx in x.max(0)..(x + w).min(fb.width as i32) {
            fb.pixels[yy as usize * fb.width + xx as usize] = color;
        }
    }
}

/// Copy `img` into the framebuffer with its top-left at (x,y), dropping alpha.
/// Visual: the scaled poster appears centered in the gray backdrop.
pub fn blit(fb: &mut FrameBuffer, img: &RgbaImage, x: i32, y: i32) {
    for (ix, iy, p) in img.enumerate_pixels() {
        let (px, py) = (x + ix as i32, y + iy as i32);
        put_pixel(fb, px, py, ((p[0] as u32) << 16) | ((p[1] as u32) << 8) | p[2] as u32);
    }
}

/// Outline of an element's (possibly rotated) box, mapped to the screen.
/// Visual: a blue ring follows the element while you drag it.
pub fn draw_selection(fb: &mut FrameBuffer, bounds: &Bounds, rotation_deg: f32, view: &ViewportTransform, color: u32) {
    let center = bounds.center();
    let (sin, cos) = rotation_deg.to_radians().sin_cos();
    let corner = |x: f32, y: f32| {
        let (dx, dy) = (x - center.x, y - center.y);
        let p = crate::layout::Position::new(center.x + dx * cos - dy * sin, center.y + dx * sin + dy * cos);
        let s = view.to_screen(p);
        (s.x.round() as i32, s.y.round() as i32)
    };
    let pts = [
        corner(bounds.x, bounds.y),
        corner(bounds.x + bounds.w, bounds.y),
        corner(bounds.x + bounds.w, bounds.y + bounds.h),
        corner(bounds.x, bounds.y + bounds.h),
    ];
    for i in 0..4 {
        let (a, b) = (pts[i], pts[(i + 1) % 4]);
        draw_line(fb, a.0, a.1, b.0, b.1, color);
    }

    // resize handle: small square centered on the handle box
    let handle = bounds.handle();
    let (hx, hy) = corner(handle.x + handle.w / 2.0, handle.y + handle.h / 2.0);
    let half = ((handle.w * view.scale) / 2.0).clamp(3.0, 8.0) as i32;
    fill_rect(fb, hx - half, hy - half, half * 2, half * 2, 0x00_FF_FF_FF);
    fill_rect(fb, hx - half + 1, hy - half + 1, half * 2 - 2, half * 2 - 2, color);
}

/* ---------- 5x7 bitmap text (glyphs shared with the poster renderer) ---------- */

/// Draw a single 5x7 character at (x,y).
/// Visual: a tiny glyph appears with a 1-pixel black shadow for contrast.
fn draw_char_5x7(fb: &mut FrameBuffer, x: i32, y: i32, ch: char, color: u32) {
    let rows = font::glyph5x7(ch);
    // Shadow pass: offset by (1,1) in black to improve readability
    for (ry, rowbits) in rows.iter().enumerate() {
        for rx in 0..GLYPH_W {
            if (rowbits & (1 << (GLYPH_W - 1 - rx))) != 0 {
                put_pixel(fb, x + rx as i32 + 1, y + ry as i32 + 1, 0x00000000);
            }
        }
    }

    // Foreground pass: actual glyph in chosen color
    for (ry, rowbits) in rows.iter().enumerate() {
        for rx in 0..GLYPH_W {
            if (rowbits & (1 << (GLYPH_W - 1 - rx))) != 0 {
                put_pixel(fb, x + rx as i32, y + ry as i32, color);
            }
        }
    }
}

/// Draw a text string using 5x7 glyphs.
/// Visual: a compact HUD string appears; each glyph is 5x7 with 1-pixel spacing.
pub fn draw_text_5x7(fb: &mut FrameBuffer, mut x: i32, y: i32, text: &str, color: u32) {
    for ch in text.chars() {
        draw_char_5x7(fb, x, y, ch, color);
        x += 6; // 5 pixels glyph width + 1 pixel spacing
    }
}

/// Pixel width of `text` in the HUD font.
pub fn text_width_5x7(text: &str) -> i32 {
    text.chars().count() as i32 * 6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blit_clips_at_the_edges() {
        let mut fb = FrameBuffer::new(4, 4);
        let img = RgbaImage::from_pixel(3, 3, image::Rgba([0x12, 0x34, 0x56, 255]));
        blit(&mut fb, &img, 2, -1);
        assert_eq!(fb.pixels[2], 0x123456);
        assert_eq!(fb.pixels[4 + 3], 0x123456);
        assert_eq!(fb.pixels[0], 0);
        assert_eq!(fb.pixels[3 * 4 + 3], 0);
    }

    #[test]
    fn hud_text_lights_glyph_pixels() {
        let mut fb = FrameBuffer::new(20, 10);
        draw_text_5x7(&mut fb, 0, 0, "I", 0xFFFFFF);
        // 'I' top row is .XXX.
        assert_eq!(fb.pixels[1], 0xFFFFFF);
        assert_eq!(fb.pixels[0], 0);
        assert_eq!(text_width_5x7("abc"), 18);
    }
}
