// Blur + blend primitives on RGBA buffers.
// Visual expectation: blurred patches melt into the picture instead of showing hard edges.
use std::sync::OnceLock;

use image::{Rgba, RgbaImage};

use crate::error::PixelError;
use crate::types::Mask;

/// Resolution of the linear -> sRGB encode table.
const ENCODE_STEPS: usize = 4096;

/// Transfer curve in both directions, built on first use and shared after.
struct SrgbCurve {
    decode: [f32; 256],
    encode: [u8; ENCODE_STEPS],
}

fn srgb_curve() -> &'static SrgbCurve {
    static CURVE: OnceLock<SrgbCurve> = OnceLock::new();
    CURVE.get_or_init(|| SrgbCurve {
        decode: std::array::from_fn(|v| {
            let c = v as f32 / 255.0;
            if c <= 0.04045 { c / 12.92 } else { ((c + 0.055) / 1.055).powf(2.4) }
        }),
        encode: std::array::from_fn(|i| {
            let l = i as f32 / (ENCODE_STEPS - 1) as f32;
            let c = if l <= 0.003_130_8 { 12.92 * l } else { 1.055 * l.powf(1.0 / 2.4) - 0.055 };
            (c * 255.0).round().clamp(0.0, 255.0) as u8
        }),
    })
}

/// One sRGB channel moved from `under` toward `over` by `a`, mixed in linear light.
/// Visual: a half-covered edge reads as a true 50% mix, not a dark fringe.
pub fn mix_srgb(under: u8, over: u8, a: f32) -> u8 {
    let curve = srgb_curve();
    let lin = a * curve.decode[over as usize] + (1.0 - a) * curve.decode[under as usize];
    curve.encode[(lin.clamp(0.0, 1.0) * (ENCODE_STEPS - 1) as f32).round() as usize]
}

/// Box radius whose three-pass repeat approximates a Gaussian of `sigma`.
/// Visual: bigger sigma = softer, wider spread.
pub fn box_radius_for_sigma(sigma: f32) -> usize {
    if sigma <= 0.0 { return 0; }
    // ideal box width for n=3 passes: sqrt(12σ²/n + 1)
    let width = (12.0 * sigma * sigma / 3.0 + 1.0).sqrt();
    ((width - 1.0) / 2.0).round().max(1.0) as usize
}

/// One horizontal + vertical box blur over all four channels (edges extended).
/// Channels are blurred independently, so feed it premultiplied data when alpha varies.
pub fn box_blur_rgba(
    src: &RgbaImage,      // input
    tmp: &mut RgbaImage,  // horizontal pass result (scratch)
    dst: &mut RgbaImage,  // final blurred output
    radius: usize,        // blur amount; bigger = softer (and slightly slower)
) -> Result<(), PixelError> {
    if src.dimensions() != dst.dimensions() {
        return Err(PixelError::SizeMismatch("box_blur: src↔dst"));
    }
    if src.dimensions() != tmp.dimensions() {
        return Err(PixelError::SizeMismatch("box_blur: tmp"));
    }
    let (w, h) = (src.width() as i32, src.height() as i32);
    if w == 0 || h == 0 { return Ok(()); }
    let r = radius as i32;
    let win = (2 * r + 1) as u32; // window width for averaging (constant everywhere)

    /* ---- Pass 1: Horizontal (store averaged rows in tmp) ---- */
    for y in 0..h as u32 {
        // Edge pixel value at x=0 (we "extend" edges to avoid dark borders)
        let p0 = src.get_pixel(0, y).0;
        let mut sum = [0u32; 4];
        for c in 0..4 { sum[c] = p0[c] as u32 * (r as u32 + 1); }

        // Prime the right side of the initial window [0..r]
        for x in 1..=r {
            let p = src.get_pixel(x.min(w - 1) as u32, y).0;
            for c in 0..4 { sum[c] += p[c] as u32; }
        }

        // Slide the window across the row
        for x in 0..w {
            let mut out = [0u8; 4];
            for c in 0..4 { out[c] = (sum[c] / win) as u8; }
            tmp.put_pixel(x as u32, y, Rgba(out));

            // Update sums for next column (add right, remove left)
            let p_sub = src.get_pixel((x - r).max(0) as u32, y).0;
            let p_add = src.get_pixel((x + r + 1).min(w - 1) as u32, y).0;
            for c in 0..4 { sum[c] = sum[c] + p_add[c] as u32 - p_sub[c] as u32; }
        }
    }

    /* ---- Pass 2: Vertical (read tmp, write dst) ---- */
    for x in 0..w as u32 {
        let p0 = tmp.get_pixel(x, 0).0;
        let mut sum = [0u32; 4];
        for c in 0..4 { sum[c] = p0[c] as u32 * (r as u32 + 1); }

        for y in 1..=r {
            let p = tmp.get_pixel(x, y.min(h - 1) as u32).0;
            for c in 0..4 { sum[c] += p[c] as u32; }
        }

        for y in 0..h {
            let mut out = [0u8; 4];
            for c in 0..4 { out[c] = (sum[c] / win) as u8; }
            dst.put_pixel(x, y as u32, Rgba(out));

            let p_sub = tmp.get_pixel(x, (y - r).max(0) as u32).0;
            let p_add = tmp.get_pixel(x, (y + r + 1).min(h - 1) as u32).0;
            for c in 0..4 { sum[c] = sum[c] + p_add[c] as u32 - p_sub[c] as u32; }
        }
    }

    Ok(())
}

/// Three box passes ≈ Gaussian blur with standard deviation `sigma`.
pub fn gaussian_blur_rgba(src: &RgbaImage, sigma: f32) -> Result<RgbaImage, PixelError> {
    let radius = box_radius_for_sigma(sigma);
    let mut a = src.clone();
    if radius == 0 { return Ok(a); }
    let (w, h) = src.dimensions();
    let mut tmp = RgbaImage::new(w, h);
    let mut b = RgbaImage::new(w, h);
    for _ in 0..3 {
        box_blur_rgba(&a, &mut tmp, &mut b, radius)?;
        std::mem::swap(&mut a, &mut b);
    }
    Ok(a)
}

/// Convert straight alpha to premultiplied in place.
pub fn premultiply(img: &mut RgbaImage) {
    for p in img.pixels_mut() {
        let a = p[3] as u32;
        for c in 0..3 { p[c] = ((p[c] as u32 * a + 127) / 255) as u8; }
    }
}

/// Split a premultiplied layer into straight color (`sink`) and coverage (`mask`).
/// Visual: the blurred patch's color, plus how strongly it covers each pixel.
pub fn unpremultiply_into(layer: &RgbaImage) -> (RgbaImage, Mask) {
    let (w, h) = layer.dimensions();
    let mut sink = RgbaImage::new(w, h);
    let mut mask = Mask::new(w as usize, h as usize);
    for (x, y, p) in layer.enumerate_pixels() {
        let a = p[3] as u32;
        let idx = y as usize * w as usize + x as usize;
        mask.alpha[idx] = a as f32 / 255.0;
        if a == 0 { continue; }
        let mut out = [0u8, 0, 0, 255];
        for c in 0..3 { out[c] = ((p[c] as u32 * 255 + a / 2) / a).min(255) as u8; }
        sink.put_pixel(x, y, Rgba(out));
    }
    (sink, mask)
}

/// Mix `sink` into `fg` by `mask`, in linear light. Alpha mixes linearly.
pub fn blend_linear_in_place(
    fg: &mut RgbaImage,
    sink: &RgbaImage,
    mask: &Mask,
) -> Result<(), PixelError> {
    if fg.dimensions() != sink.dimensions() {
        return Err(PixelError::SizeMismatch("blend: fg↔sink"));
    }
    if mask.width != fg.width() as usize || mask.height != fg.height() as usize {
        return Err(PixelError::SizeMismatch("blend: mask"));
    }

    for (i, (pf, ps)) in fg.pixels_mut().zip(sink.pixels()).enumerate() {
        let a = mask.alpha[i];
        if a <= 0.0 { continue; }            // visual: keep the original pixel
        if a >= 1.0 {                        // visual: fully covered by the patch
            *pf = *ps;
            continue;
        }

        let inv = 1.0 - a;
        for c in 0..3 { pf[c] = mix_srgb(pf[c], ps[c], a); }
        pf[3] = (a * ps[3] as f32 + inv * pf[3] as f32).round().clamp(0.0, 255.0) as u8;
    }
    Ok(())
}
