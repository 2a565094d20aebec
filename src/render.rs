//! Software rasterizer for the poster. The preview and the PNG export both
//! come from [`render_poster`], always at the full 720x1280 logical size.
//!
//! Every element is painted into its own straight-alpha layer in its local,
//! unrotated frame, then composited onto the canvas with rotation about the
//! element's box center and the element's opacity. A layer only covers the
//! part of the element that can land on the canvas (plus filter margin), so
//! an element resized far past the edges costs no more than a full-canvas one.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::assets::ImageResolver;
use crate::font::{self, CELL_W, GLYPH_H, GLYPH_W};
use crate::hit;
use crate::layout::{DecorationStyle, Element, LayoutModel, POSTER_HEIGHT, POSTER_WIDTH, Position, Style, TextAlign, TextStyle};
use crate::types::{Color, Mask};
use crate::vision;

/// Top/bottom strength of the darkening overlay (black alpha); clear at 50%.
const OVERLAY_TOP: f32 = 0.20;
const OVERLAY_BOTTOM: f32 = 0.40;

/// `0 2px 4px rgba(0,0,0,0.3)`
const SHADOW_DY: i64 = 2;
const SHADOW_SIGMA: f32 = 2.0;
const SHADOW_ALPHA: f32 = 0.3;
/// Layer margin so the shadow has room to spread.
const TEXT_PAD: f32 = 8.0;

/// Sun geometry on a 200-unit viewbox.
const SUN_VIEWBOX: f32 = 200.0;
const SUN_DISC_R: f32 = 40.0;
const SUN_GLOW_SIGMA: f32 = 4.0;

/// Integer box `[x0,x1) x [y0,y1)` in canvas units, in an element's unrotated frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    x0: i64,
    y0: i64,
    x1: i64,
    y1: i64,
}

impl Span {
    /// Smallest span holding the float box, never empty.
    fn covering(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        let (x0, y0) = (x0.floor() as i64, y0.floor() as i64);
        Self { x0, y0, x1: (x1.ceil() as i64).max(x0.saturating_add(1)), y1: (y1.ceil() as i64).max(y0.saturating_add(1)) }
    }

    fn width(&self) -> u32 {
        (self.x1 - self.x0).clamp(0, u32::MAX as i64) as u32
    }

    fn height(&self) -> u32 {
        (self.y1 - self.y0).clamp(0, u32::MAX as i64) as u32
    }

    fn grow(&self, by: i64) -> Self {
        Self {
            x0: self.x0.saturating_sub(by),
            y0: self.y0.saturating_sub(by),
            x1: self.x1.saturating_add(by),
            y1: self.y1.saturating_add(by),
        }
    }

    fn intersect(&self, other: &Span) -> Option<Span> {
        let out = Span {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        };
        (out.x0 < out.x1 && out.y0 < out.y1).then_some(out)
    }

    fn shifted(&self, dx: i64, dy: i64) -> Self {
        Self { x0: self.x0 + dx, y0: self.y0 + dy, x1: self.x1 + dx, y1: self.y1 + dy }
    }
}

/// How much of each element to rasterize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extent {
    /// Only what can reach the canvas.
    Visible,
    /// The whole element box.
    #[cfg_attr(not(test), allow(dead_code))]
    Full,
}

impl Extent {
    /// The part of `full` to paint for an element rotated by `rotation_deg`
    /// about `pivot`. `margin` is how far filters read past a pixel.
    fn window(self, full: Span, pivot: Position, rotation_deg: f32, margin: i64) -> Option<Span> {
        match self {
            Extent::Full => Some(full),
            Extent::Visible => visible_reach(pivot, rotation_deg).grow(margin).intersect(&full),
        }
    }
}

/// The canvas carried back into an element's unrotated frame: every point
/// of the element that can land on the canvas lies inside.
fn visible_reach(pivot: Position, rotation_deg: f32) -> Span {
    let (cw, ch) = (POSTER_WIDTH as f32, POSTER_HEIGHT as f32);
    if rotation_deg.rem_euclid(360.0) == 0.0 {
        return Span { x0: 0, y0: 0, x1: POSTER_WIDTH as i64, y1: POSTER_HEIGHT as i64 };
    }
    let (sin, cos) = (-rotation_deg.to_radians()).sin_cos();
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (f32::MAX, f32::MAX, f32::MIN, f32::MIN);
    for (x, y) in [(0.0, 0.0), (cw, 0.0), (0.0, ch), (cw, ch)] {
        let (dx, dy) = (x - pivot.x, y - pivot.y);
        let (rx, ry) = (pivot.x + dx * cos - dy * sin, pivot.y + dx * sin + dy * cos);
        min_x = min_x.min(rx);
        min_y = min_y.min(ry);
        max_x = max_x.max(rx);
        max_y = max_y.max(ry);
    }
    Span::covering(min_x, min_y, max_x, max_y)
}

/// Pixels a bilinear lookup may touch beyond the sample point.
const SAMPLE_MARGIN: i64 = 2;

/// How far three box passes of `sigma` spread, plus sampling slack.
fn blur_margin(sigma: f32) -> i64 {
    3 * vision::box_radius_for_sigma(sigma) as i64 + SAMPLE_MARGIN
}

/// A painted element waiting to be composited.
struct Layer {
    pixels: RgbaImage,
    /// Canvas position of the layer's top-left pixel.
    origin_x: i64,
    origin_y: i64,
    /// Rotation center in canvas units.
    pivot: Position,
}

/// Paint the whole poster. Missing background → plain white.
pub fn render_poster(model: &LayoutModel, background: Option<&RgbaImage>, images: &dyn ImageResolver) -> RgbaImage {
    paint(model, background, images, Extent::Visible)
}

fn paint(model: &LayoutModel, background: Option<&RgbaImage>, images: &dyn ImageResolver, extent: Extent) -> RgbaImage {
    let (w, h) = (POSTER_WIDTH, POSTER_HEIGHT);
    let mut canvas = RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]));

    if let Some(bg) = background {
        let fitted = fit_cover(bg, w, h);
        let layer = Layer { pixels: fitted, origin_x: 0, origin_y: 0, pivot: Position::new(0.0, 0.0) };
        composite(&mut canvas, &layer, 0.0, 1.0);
    }
    apply_overlay(&mut canvas);

    for element in model.paint_order() {
        let Some(layer) = element_layer(element, images, extent) else { continue };
        composite(&mut canvas, &layer, element.style.rotation(), element.style.opacity().clamp(0.0, 1.0));
    }
    canvas
}

/// Scale `src` to fill `w`x`h` keeping aspect, then center-crop.
pub fn fit_cover(src: &RgbaImage, w: u32, h: u32) -> RgbaImage {
    let (sw, sh) = src.dimensions();
    if sw == 0 || sh == 0 || w == 0 || h == 0 {
        return RgbaImage::new(w, h);
    }
    let scale = (w as f32 / sw as f32).max(h as f32 / sh as f32);
    let rw = ((sw as f32 * scale).ceil() as u32).max(w);
    let rh = ((sh as f32 * scale).ceil() as u32).max(h);
    let resized = imageops::resize(src, rw, rh, FilterType::Triangle);
    imageops::crop_imm(&resized, (rw - w) / 2, (rh - h) / 2, w, h).to_image()
}

/// Black gradient: 20% at the top, clear at the middle, 40% at the bottom.
fn apply_overlay(canvas: &mut RgbaImage) {
    let h = canvas.height() as f32;
    for (_, y, p) in canvas.enumerate_pixels_mut() {
        let t = (y as f32 + 0.5) / h;
        let a = if t < 0.5 { OVERLAY_TOP * (1.0 - t / 0.5) } else { OVERLAY_BOTTOM * ((t - 0.5) / 0.5) };
        for c in 0..3 {
            p[c] = (p[c] as f32 * (1.0 - a)).round() as u8;
        }
    }
}

fn element_layer(element: &Element, images: &dyn ImageResolver, extent: Extent) -> Option<Layer> {
    let rotation = element.style.rotation();
    match &element.style {
        Style::Text(style) => {
            let text = element.content.as_deref().unwrap_or("");
            text_layer(text, style, element.position, rotation, extent)
        }
        Style::Image(style) => {
            let source = element.content.as_deref().filter(|c| !c.is_empty())?;
            let img = images.resolve(source)?;
            let bounds = hit::element_bounds(element, images.aspect(source))?;
            let (w, h) = ((style.width.round() as u32).max(1), (bounds.h.round() as u32).max(1));
            let (ox, oy) = (element.position.x.round() as i64, element.position.y.round() as i64);
            let full = Span { x0: ox, y0: oy, x1: ox + w as i64, y1: oy + h as i64 };
            let pivot = bounds.center();
            let window = extent.window(full, pivot, rotation, SAMPLE_MARGIN)?;
            Some(Layer {
                pixels: scaled_part(img, w, h, window.shifted(-ox, -oy)),
                origin_x: window.x0,
                origin_y: window.y0,
                pivot,
            })
        }
        Style::Decoration(style) => sun_layer(style, element.position, rotation, extent),
    }
}

/// `img` as if resized to `w`x`h`, but only the `part` of it (layer pixels).
fn scaled_part(img: &RgbaImage, w: u32, h: u32, part: Span) -> RgbaImage {
    let (pw, ph) = (part.width(), part.height());
    if (part.x0, part.y0, pw, ph) == (0, 0, w, h) {
        return imageops::resize(img, w, h, FilterType::Triangle);
    }
    let (sw, sh) = img.dimensions();
    if sw == 0 || sh == 0 {
        return RgbaImage::new(pw, ph);
    }
    let (kx, ky) = (sw as f32 / w as f32, sh as f32 / h as f32);
    if kx >= 1.0 && ky >= 1.0 {
        // shrinking: crop the source first, a source pixel is under one layer pixel
        let sx0 = ((part.x0 as f32 * kx).floor() as u32).min(sw - 1);
        let sy0 = ((part.y0 as f32 * ky).floor() as u32).min(sh - 1);
        let sx1 = ((part.x1 as f32 * kx).ceil() as u32).clamp(sx0 + 1, sw);
        let sy1 = ((part.y1 as f32 * ky).ceil() as u32).clamp(sy0 + 1, sh);
        let piece = imageops::crop_imm(img, sx0, sy0, sx1 - sx0, sy1 - sy0).to_image();
        return imageops::resize(&piece, pw, ph, FilterType::Triangle);
    }
    // growing: look each layer pixel up in the source
    RgbaImage::from_fn(pw, ph, |x, y| {
        let u = ((part.x0 + x as i64) as f32 + 0.5) * kx - 0.5;
        let v = ((part.y0 + y as i64) as f32 + 0.5) * ky - 0.5;
        sample_edge_clamped(img, u, v)
    })
}

/// Straight-alpha bilinear lookup; coordinates past the border repeat the edge.
fn sample_edge_clamped(img: &RgbaImage, u: f32, v: f32) -> Rgba<u8> {
    let (w, h) = (img.width() as f32, img.height() as f32);
    let (u, v) = (u.clamp(0.0, w - 1.0), v.clamp(0.0, h - 1.0));
    let (x0, y0) = (u.floor() as u32, v.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(img.width() - 1), (y0 + 1).min(img.height() - 1));
    let (fx, fy) = (u - x0 as f32, v - y0 as f32);
    let (a, b, c, d) = (img.get_pixel(x0, y0), img.get_pixel(x1, y0), img.get_pixel(x0, y1), img.get_pixel(x1, y1));
    let mut out = [0u8; 4];
    for i in 0..4 {
        let top = a[i] as f32 * (1.0 - fx) + b[i] as f32 * fx;
        let bottom = c[i] as f32 * (1.0 - fx) + d[i] as f32 * fx;
        out[i] = (top * (1.0 - fy) + bottom * fy).round() as u8;
    }
    Rgba(out)
}

/// Add the area of `[x0,x1)x[y0,y1)` falling in each pixel to `mask`.
fn fill_rect_coverage(mask: &mut Mask, x0: f32, y0: f32, x1: f32, y1: f32) {
    let px0 = x0.floor().max(0.0) as usize;
    let py0 = y0.floor().max(0.0) as usize;
    let px1 = (x1.ceil().max(0.0) as usize).min(mask.width);
    let py1 = (y1.ceil().max(0.0) as usize).min(mask.height);
    for py in py0..py1 {
        let cover_y = (y1.min(py as f32 + 1.0) - y0.max(py as f32)).max(0.0);
        if cover_y == 0.0 { continue; }
        for px in px0..px1 {
            let cover_x = (x1.min(px as f32 + 1.0) - x0.max(px as f32)).max(0.0);
            let a = &mut mask.alpha[py * mask.width + px];
            *a = (*a + cover_x * cover_y).min(1.0);
        }
    }
}

/// Extra dot growth per side for heavy weights, as a fraction of a dot.
fn weight_growth(style: &TextStyle) -> f32 {
    match style.font_weight {
        w if w >= 800 => 0.25,
        _ if style.is_bold() => 0.15,
        _ => 0.0,
    }
}

fn text_layer(text: &str, style: &TextStyle, pos: Position, rotation: f32, extent: Extent) -> Option<Layer> {
    let fs = style.font_size.max(0.0);
    let (block_w, block_h) = font::measure_text(text, fs, style.line_height);
    let full = Span::covering(pos.x - TEXT_PAD, pos.y - TEXT_PAD, pos.x + block_w + TEXT_PAD, pos.y + block_h + TEXT_PAD);
    let pivot = Position::new(pos.x + block_w / 2.0, pos.y + block_h / 2.0);
    let window = extent.window(full, pivot, rotation, blur_margin(SHADOW_SIGMA) + SHADOW_DY)?;
    let (w, h) = (window.width(), window.height());
    // block top-left in window pixels
    let (ox, oy) = (pos.x - window.x0 as f32, pos.y - window.y0 as f32);

    let dot = font::dot_size(fs);
    let grow = dot * weight_growth(style);
    let line_box = fs * style.line_height;
    let half_leading = (line_box - fs) / 2.0;
    let cell = CELL_W * dot;
    let inside = |lo: f32, hi: f32, limit: u32| hi + grow > 0.0 && lo - grow < limit as f32;

    let mut cov = Mask::new(w as usize, h as usize);
    for (i, line) in text.split('\n').enumerate() {
        let y0 = oy + i as f32 * line_box + half_leading;
        if !inside(y0, y0 + GLYPH_H as f32 * dot, h) { continue; }
        let lw = font::line_width(line, fs);
        let shift = match style.align {
            TextAlign::Left => 0.0,
            TextAlign::Center => (block_w - lw) / 2.0,
            TextAlign::Right => block_w - lw,
        };
        let x0 = ox + shift;
        for (j, ch) in line.chars().enumerate() {
            let cx = x0 + j as f32 * cell;
            if !inside(cx, cx + GLYPH_W as f32 * dot, w) { continue; }
            let glyph = font::glyph5x7(ch);
            for (r, bits) in glyph.iter().enumerate().take(GLYPH_H) {
                for c in 0..GLYPH_W {
                    if (bits >> (GLYPH_W - 1 - c)) & 1 == 0 { continue; }
                    let dx = cx + c as f32 * dot;
                    let dy = y0 + r as f32 * dot;
                    fill_rect_coverage(&mut cov, dx - grow, dy - grow, dx + dot + grow, dy + dot + grow);
                }
            }
        }
    }

    /* shadow: the glyph mask pushed down, darkened and softened */
    let mut shadow = RgbaImage::new(w, h);
    for y in 0..h {
        let sy = y as i64 - SHADOW_DY;
        if sy < 0 { continue; }
        for x in 0..w {
            let a = cov.alpha[sy as usize * w as usize + x as usize] * SHADOW_ALPHA;
            if a > 0.0 {
                shadow.put_pixel(x, y, Rgba([0, 0, 0, (a * 255.0).round() as u8]));
            }
        }
    }
    // pure black layer, so straight and premultiplied coincide
    let shadow = vision::gaussian_blur_rgba(&shadow, SHADOW_SIGMA).unwrap_or(shadow);

    let Color { r, g, b } = style.color;
    let mut pixels = RgbaImage::new(w, h);
    for (x, y, p) in pixels.enumerate_pixels_mut() {
        let ca = cov.alpha[y as usize * w as usize + x as usize];
        let sa = shadow.get_pixel(x, y)[3] as f32 / 255.0;
        let out_a = ca + sa * (1.0 - ca);
        if out_a <= 0.0 { continue; }
        // shadow contributes black, so color is just scaled by the text share
        let k = ca / out_a;
        *p = Rgba([
            (r as f32 * k).round() as u8,
            (g as f32 * k).round() as u8,
            (b as f32 * k).round() as u8,
            (out_a * 255.0).round() as u8,
        ]);
    }

    Some(Layer { pixels, origin_x: window.x0, origin_y: window.y0, pivot })
}

fn segment_distance(px: f32, py: f32, a: (f32, f32), b: (f32, f32)) -> f32 {
    let (vx, vy) = (b.0 - a.0, b.1 - a.1);
    let len2 = vx * vx + vy * vy;
    let t = if len2 > 0.0 { (((px - a.0) * vx + (py - a.1) * vy) / len2).clamp(0.0, 1.0) } else { 0.0 };
    let (cx, cy) = (a.0 + t * vx, a.1 + t * vy);
    ((px - cx).powi(2) + (py - cy).powi(2)).sqrt()
}

/// Point at `radius` from the viewbox center along `degrees` (0 = straight up).
fn polar(degrees: f32, radius: f32) -> (f32, f32) {
    let (sin, cos) = degrees.to_radians().sin_cos();
    (SUN_VIEWBOX / 2.0 + radius * sin, SUN_VIEWBOX / 2.0 - radius * cos)
}

fn sun_layer(style: &DecorationStyle, pos: Position, rotation: f32, extent: Extent) -> Option<Layer> {
    let size = style.size.max(1.0);
    let s = size / SUN_VIEWBOX;
    let glow_sigma = SUN_GLOW_SIGMA * s;
    let pad = (3.0 * glow_sigma).ceil() + 2.0;
    let dim = (size + 2.0 * pad).ceil() as i64;
    let (fx, fy) = ((pos.x - pad).round() as i64, (pos.y - pad).round() as i64);
    let full = Span { x0: fx, y0: fy, x1: fx + dim, y1: fy + dim };
    let pivot = Position::new(pos.x + size / 2.0, pos.y + size / 2.0);
    let window = extent.window(full, pivot, rotation, blur_margin(glow_sigma))?;
    let (w, h) = (window.width(), window.height());
    // window's top-left inside the full sun box
    let (skip_x, skip_y) = ((window.x0 - fx) as f32, (window.y0 - fy) as f32);

    // (from, to) end points per ray family
    let thick: Vec<_> = (0..8).map(|k| (polar(45.0 * k as f32, 80.0), polar(45.0 * k as f32, 50.0))).collect();
    let thin: Vec<_> = (0..8)
        .map(|k| {
            let deg = 22.5 + 45.0 * k as f32;
            (polar(deg, 90.0), polar(deg, 65.0))
        })
        .collect();

    /* 1) shape coverage, sampled at pixel centers in viewbox units */
    let mut cov = Mask::new(w as usize, h as usize);
    let aa = 0.5 / s; // half a pixel, in viewbox units
    let edge = |d: f32| ((d * s) + 0.5).clamp(0.0, 1.0);
    for y in 0..h {
        for x in 0..w {
            let vx = ((x as f32 + 0.5) + skip_x - pad) / s;
            let vy = ((y as f32 + 0.5) + skip_y - pad) / s;
            let center_d = ((vx - 100.0).powi(2) + (vy - 100.0).powi(2)).sqrt();
            let mut a = edge(SUN_DISC_R - center_d);
            if center_d < 90.0 + 4.0 + aa {
                for &(p, q) in &thick {
                    a = a.max(edge(4.0 - segment_distance(vx, vy, p, q)));
                }
                for &(p, q) in &thin {
                    a = a.max(edge(2.0 - segment_distance(vx, vy, p, q)) * 0.8);
                }
            }
            cov.alpha[y as usize * w as usize + x as usize] = a;
        }
    }

    /* 2) glow: blurred copy merged under the crisp shape */
    let mut alpha_img = RgbaImage::new(w, h);
    for (x, y, p) in alpha_img.enumerate_pixels_mut() {
        let a = cov.alpha[y as usize * w as usize + x as usize];
        *p = Rgba([0, 0, 0, (a * 255.0).round() as u8]);
    }
    let glow = vision::gaussian_blur_rgba(&alpha_img, glow_sigma).unwrap_or(alpha_img);

    let Color { r, g, b } = style.color;
    let mut pixels = RgbaImage::new(w, h);
    for (x, y, p) in pixels.enumerate_pixels_mut() {
        let src = cov.alpha[y as usize * w as usize + x as usize];
        let ga = glow.get_pixel(x, y)[3] as f32 / 255.0;
        let a = src + ga * (1.0 - src);
        if a > 0.0 {
            *p = Rgba([r, g, b, (a * 255.0).round() as u8]);
        }
    }

    Some(Layer { pixels, origin_x: window.x0, origin_y: window.y0, pivot })
}

#[inline]
fn blend_px(dst: &mut Rgba<u8>, rgb: [f32; 3], a: f32) {
    let inv = 1.0 - a;
    for c in 0..3 {
        dst[c] = (rgb[c] * a + dst[c] as f32 * inv).round().clamp(0.0, 255.0) as u8;
    }
}

/// Premultiplied bilinear sample; `None` when fully transparent.
fn sample_bilinear(img: &RgbaImage, u: f32, v: f32) -> Option<([f32; 3], f32)> {
    let (w, h) = (img.width() as i64, img.height() as i64);
    let (x0, y0) = (u.floor(), v.floor());
    let (fx, fy) = (u - x0, v - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);
    let mut acc = [0.0f32; 4];
    for (dx, dy, wgt) in [(0, 0, (1.0 - fx) * (1.0 - fy)), (1, 0, fx * (1.0 - fy)), (0, 1, (1.0 - fx) * fy), (1, 1, fx * fy)] {
        let (x, y) = (x0 + dx, y0 + dy);
        if wgt <= 0.0 || x < 0 || y < 0 || x >= w || y >= h { continue; }
        let p = img.get_pixel(x as u32, y as u32);
        let a = p[3] as f32 / 255.0 * wgt;
        for c in 0..3 { acc[c] += p[c] as f32 * a; }
        acc[3] += a;
    }
    if acc[3] <= 0.0 {
        return None;
    }
    Some(([acc[0] / acc[3], acc[1] / acc[3], acc[2] / acc[3]], acc[3]))
}

/// Source-over `layer` onto the opaque canvas.
fn composite(canvas: &mut RgbaImage, layer: &Layer, rotation_deg: f32, opacity: f32) {
    if opacity <= 0.0 {
        return;
    }
    let (cw, ch) = (canvas.width() as i64, canvas.height() as i64);

    if rotation_deg.rem_euclid(360.0) == 0.0 {
        for (lx, ly, p) in layer.pixels.enumerate_pixels() {
            let a = p[3] as f32 / 255.0 * opacity;
            if a <= 0.0 { continue; }
            let (x, y) = (layer.origin_x + lx as i64, layer.origin_y + ly as i64);
            if x < 0 || y < 0 || x >= cw || y >= ch { continue; }
            blend_px(canvas.get_pixel_mut(x as u32, y as u32), [p[0] as f32, p[1] as f32, p[2] as f32], a);
        }
        return;
    }

    let (sin, cos) = rotation_deg.to_radians().sin_cos();
    let Position { x: px, y: py } = layer.pivot;
    let (lw, lh) = (layer.pixels.width() as f32, layer.pixels.height() as f32);
    let (ox, oy) = (layer.origin_x as f32, layer.origin_y as f32);

    /* canvas-space bounding box of the rotated layer */
    let corners = [(ox, oy), (ox + lw, oy), (ox, oy + lh), (ox + lw, oy + lh)];
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (f32::MAX, f32::MAX, f32::MIN, f32::MIN);
    for (x, y) in corners {
        let (dx, dy) = (x - px, y - py);
        let (rx, ry) = (px + dx * cos - dy * sin, py + dx * sin + dy * cos);
        min_x = min_x.min(rx);
        min_y = min_y.min(ry);
        max_x = max_x.max(rx);
        max_y = max_y.max(ry);
    }
    let x0 = (min_x.floor() as i64).max(0);
    let y0 = (min_y.floor() as i64).max(0);
    let x1 = (max_x.ceil() as i64).min(cw);
    let y1 = (max_y.ceil() as i64).min(ch);

    for y in y0..y1 {
        for x in x0..x1 {
            // inverse-rotate the pixel center back into the layer
            let (dx, dy) = (x as f32 + 0.5 - px, y as f32 + 0.5 - py);
            let u = px + dx * cos + dy * sin - ox - 0.5;
            let v = py - dx * sin + dy * cos - oy - 0.5;
            let Some((rgb, a)) = sample_bilinear(&layer.pixels, u, v) else { continue };
            blend_px(canvas.get_pixel_mut(x as u32, y as u32), rgb, a * opacity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use chrono::NaiveDate;

    use crate::assets::AssetCache;
    use crate::layout::{ElementId, ElementPatch, ImageStyle};

    fn text_el(content: &str, color: Color) -> Element {
        Element {
            id: ElementId::from("t"),
            content: Some(content.into()),
            position: Position::new(100.0, 100.0),
            z_index: 1,
            style: Style::Text(TextStyle {
                font_size: 80.0,
                color,
                font_family: "sans-serif".into(),
                align: TextAlign::Left,
                line_height: 1.0,
                font_weight: 400,
                opacity: None,
                rotation: None,
            }),
        }
    }

    fn logo_el(rotation: f32) -> Element {
        Element {
            id: ElementId::from("logo"),
            content: Some("logo".into()),
            position: Position::new(200.0, 300.0),
            z_index: 1,
            style: Style::Image(ImageStyle { width: 100.0, rotation }),
        }
    }

    fn two_tone_cache() -> AssetCache {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        img.put_pixel(1, 0, Rgba([0, 0, 255, 255]));
        let mut cache = AssetCache::new();
        cache.insert("logo", Ok(img));
        cache
    }

    fn max_channel_diff(a: &RgbaImage, b: &RgbaImage) -> u8 {
        a.pixels()
            .zip(b.pixels())
            .flat_map(|(p, q)| (0..4).map(move |c| p[c].abs_diff(q[c])))
            .max()
            .unwrap_or(0)
    }

    fn halves_cache(w: u32, h: u32) -> AssetCache {
        let img = RgbaImage::from_fn(w, h, |x, _| {
            if x < w / 2 { Rgba([255, 0, 0, 255]) } else { Rgba([0, 0, 255, 255]) }
        });
        let mut cache = AssetCache::new();
        cache.insert("logo", Ok(img));
        cache
    }

    #[test]
    fn empty_poster_is_white_under_the_overlay() {
        let out = render_poster(&LayoutModel::new(), None, &AssetCache::new());
        assert_eq!(out.dimensions(), (720, 1280));
        let top = out.get_pixel(10, 0)[0];
        let mid = out.get_pixel(10, 640)[0];
        let bottom = out.get_pixel(10, 1279)[0];
        assert!((top as i32 - 204).abs() <= 1, "top {top}");
        assert!(mid >= 254, "mid {mid}");
        assert!((bottom as i32 - 153).abs() <= 1, "bottom {bottom}");
    }

    #[test]
    fn cover_fit_fills_and_crops() {
        let wide = RgbaImage::from_pixel(400, 100, Rgba([9, 9, 9, 255]));
        let out = fit_cover(&wide, 720, 1280);
        assert_eq!(out.dimensions(), (720, 1280));
        assert_eq!(out.get_pixel(0, 0).0, [9, 9, 9, 255]);
    }

    #[test]
    fn text_lands_on_its_glyph_dots() {
        let mut m = LayoutModel::new();
        m.insert(text_el("I", Color::rgb(255, 0, 0)));
        let out = render_poster(&m, None, &AssetCache::new());
        // 'I' top row lights columns 1..=3; dot = 10 units
        assert_eq!(out.get_pixel(115, 105).0, [255, 0, 0, 255]);
        let gap = out.get_pixel(105, 105);
        assert!(gap[1] > 150, "left of the stroke stays background: {gap:?}");
    }

    #[test]
    fn sun_center_takes_its_color() {
        let mut m = LayoutModel::new();
        m.insert(Element {
            id: ElementId::from("sun"),
            content: Some("sun".into()),
            position: Position::new(0.0, 400.0),
            z_index: 1,
            style: Style::Decoration(DecorationStyle {
                size: 200.0,
                color: Color::rgb(0, 255, 0),
                opacity: 1.0,
                rotation: 0.0,
            }),
        });
        let out = render_poster(&m, None, &AssetCache::new());
        assert_eq!(out.get_pixel(100, 500).0, [0, 255, 0, 255]);
    }

    #[test]
    fn rotation_turns_the_logo_around_its_center() {
        let cache = two_tone_cache();
        for (rotation, expect_red) in [(0.0, true), (180.0, false)] {
            let mut m = LayoutModel::new();
            m.insert(logo_el(rotation));
            let out = render_poster(&m, None, &cache);
            let p = out.get_pixel(205, 325);
            assert_eq!(p[0] > p[2], expect_red, "rotation {rotation}: {p:?}");
        }
    }

    #[test]
    fn unresolved_logo_is_skipped() {
        let mut m = LayoutModel::new();
        m.insert(logo_el(0.0));
        let plain = render_poster(&LayoutModel::new(), None, &AssetCache::new());
        let out = render_poster(&m, None, &AssetCache::new());
        assert_eq!(out, plain);
    }

    #[test]
    fn huge_proverb_only_paints_what_the_canvas_shows() {
        let mut m = LayoutModel::default_poster(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        let id = ElementId::from("proverb");
        let grown = m.get(&id).unwrap().style.size_patch(1500.0);
        m.update(&id, ElementPatch::style(grown)).unwrap();

        let cache = AssetCache::new();
        let layer = element_layer(m.get(&id).unwrap(), &cache, Extent::Visible).unwrap();
        let margin = blur_margin(SHADOW_SIGMA) + SHADOW_DY;
        assert!(layer.pixels.width() as i64 <= POSTER_WIDTH as i64 + 2 * margin, "{:?}", layer.pixels.dimensions());
        assert!(layer.pixels.height() as i64 <= POSTER_HEIGHT as i64 + 2 * margin, "{:?}", layer.pixels.dimensions());

        let started = Instant::now();
        let out = render_poster(&m, None, &cache);
        assert_eq!(out.dimensions(), (720, 1280));
        assert!(started.elapsed() < Duration::from_secs(20), "render took {:?}", started.elapsed());
    }

    #[test]
    fn clipped_layers_match_whole_layers_on_canvas() {
        let mut m = LayoutModel::new();
        let mut text = text_el("MORNING\nLIGHT", Color::rgb(250, 200, 40));
        text.position = Position::new(-300.0, 100.0);
        if let Style::Text(t) = &mut text.style {
            t.font_size = 120.0;
            t.rotation = Some(30.0);
        }
        m.insert(text);
        m.insert(Element {
            id: ElementId::from("sun"),
            content: Some("sun".into()),
            position: Position::new(600.0, 1150.0),
            z_index: 2,
            style: Style::Decoration(DecorationStyle {
                size: 200.0,
                color: Color::rgb(0xdf, 0xff, 0x00),
                opacity: 0.9,
                rotation: 0.0,
            }),
        });

        let cache = AssetCache::new();
        for id in ["t", "sun"] {
            let el = m.get(&id.into()).unwrap();
            let cut = element_layer(el, &cache, Extent::Visible).unwrap();
            let whole = element_layer(el, &cache, Extent::Full).unwrap();
            assert!(cut.pixels.width() < whole.pixels.width(), "{id} was not cut");
        }
        let clipped = paint(&m, None, &cache, Extent::Visible);
        let whole = paint(&m, None, &cache, Extent::Full);
        assert!(max_channel_diff(&clipped, &whole) <= 1);
    }

    #[test]
    fn upscaled_logo_off_the_left_edge_keeps_both_halves() {
        let cache = two_tone_cache();
        let mut logo = logo_el(0.0);
        logo.position = Position::new(-300.0, 300.0);
        if let Style::Image(i) = &mut logo.style {
            i.width = 1000.0;
        }
        let layer = element_layer(&logo, &cache, Extent::Visible).unwrap();
        assert_eq!(layer.origin_x, -SAMPLE_MARGIN);
        assert_eq!(layer.pixels.width() as i64, 700 + SAMPLE_MARGIN);

        let mut m = LayoutModel::new();
        m.insert(logo);
        let out = render_poster(&m, None, &cache);
        let (left, right) = (out.get_pixel(20, 400), out.get_pixel(680, 400));
        assert!(left[0] > left[2], "left {left:?}");
        assert!(right[2] > right[0], "right {right:?}");
    }

    #[test]
    fn shrunk_logo_off_the_left_edge_shows_its_right_half() {
        let cache = halves_cache(200, 100);
        let mut logo = logo_el(0.0);
        logo.position = Position::new(-50.0, 300.0);
        let layer = element_layer(&logo, &cache, Extent::Visible).unwrap();
        assert_eq!(layer.pixels.width() as i64, 50 + SAMPLE_MARGIN);

        let mut m = LayoutModel::new();
        m.insert(logo);
        let out = render_poster(&m, None, &cache);
        let p = out.get_pixel(25, 320);
        assert!(p[2] > 150 && p[0] < 60, "{p:?}");
    }
}
