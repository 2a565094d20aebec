//! Best-effort removal of the generation provider's bottom-right watermark.
//!
//! The mark is covered by a blurred copy of the area just above it, then
//! tinted toward the local average color with a soft vertical gradient. A
//! visible seam is acceptable; failing is not, so every public entry point
//! hands back the original input when anything goes wrong.

use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};

use crate::assets;
use crate::error::PixelError;
use crate::vision;

/// Watermark box as a fraction of the image.
const MARK_W_FRAC: f32 = 0.26;
const MARK_H_FRAC: f32 = 0.12;
const MARGIN_FRAC: f32 = 0.02;
/// Donor sits this many mark-heights above the mark.
const DONOR_LIFT: f32 = 1.2;
/// CSS-style blur spreads (standard deviation, px).
const PATCH_BLUR: f32 = 18.0;
const TINT_BLUR: f32 = 10.0;
/// Color sample band inside the mark: starts 20% down, 60% tall.
const SAMPLE_TOP: f32 = 0.2;
const SAMPLE_HEIGHT: f32 = 0.6;
const TINT_TOP_ALPHA: f32 = 0.55;
const TINT_BOTTOM_ALPHA: f32 = 0.85;
const TINT_BOTTOM_LIFT: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Where the mark is and where its cover comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatermarkRegion {
    pub dest: Rect,
    pub donor: Rect,
}

fn round_u32(v: f32) -> u32 {
    v.round().max(0.0) as u32
}

/// Destination + donor rectangles for a `w`x`h` image, clamped to the image.
/// `None` when the mark rounds away to nothing.
pub fn watermark_region(w: u32, h: u32) -> Option<WatermarkRegion> {
    let margin_x = round_u32(w as f32 * MARGIN_FRAC);
    let margin_y = round_u32(h as f32 * MARGIN_FRAC);
    let mark_w = round_u32(w as f32 * MARK_W_FRAC).min(w);
    let mark_h = round_u32(h as f32 * MARK_H_FRAC).min(h);
    if mark_w == 0 || mark_h == 0 {
        return None;
    }
    let dest_x = w.saturating_sub(mark_w + margin_x);
    let dest_y = h.saturating_sub(mark_h + margin_y);

    let mut src_x = dest_x;
    let mut src_y = dest_y.saturating_sub(round_u32(mark_h as f32 * DONOR_LIFT));
    if src_x + mark_w > w { src_x = w.saturating_sub(mark_w); }
    if src_y + mark_h > h { src_y = h.saturating_sub(mark_h); }

    Some(WatermarkRegion {
        dest: Rect { x: dest_x, y: dest_y, w: mark_w, h: mark_h },
        donor: Rect { x: src_x, y: src_y, w: mark_w, h: mark_h },
    })
}

/// The destination rect grown by `pad` on every side, clamped to the image.
fn padded(rect: Rect, pad: u32, w: u32, h: u32) -> Rect {
    let x0 = rect.x.saturating_sub(pad);
    let y0 = rect.y.saturating_sub(pad);
    let x1 = (rect.x + rect.w + pad).min(w);
    let y1 = (rect.y + rect.h + pad).min(h);
    Rect { x: x0, y: y0, w: x1 - x0, h: y1 - y0 }
}

/// Blur a premultiplied `layer` covering `window` and blend it over `img` there.
fn composite_blurred(
    img: &mut RgbaImage,
    window: Rect,
    layer: &RgbaImage,
    sigma: f32,
) -> Result<(), PixelError> {
    let blurred = vision::gaussian_blur_rgba(layer, sigma)?;
    let (sink, mask) = vision::unpremultiply_into(&blurred);
    let mut fg = image::imageops::crop_imm(img, window.x, window.y, window.w, window.h).to_image();
    vision::blend_linear_in_place(&mut fg, &sink, &mask)?;
    image::imageops::replace(img, &fg, window.x as i64, window.y as i64);
    Ok(())
}

/// Mean RGBA over the sample band of `dest`.
fn sample_mean(img: &RgbaImage, dest: Rect) -> Result<[u8; 4], PixelError> {
    let band_h = round_u32(dest.h as f32 * SAMPLE_HEIGHT).max(1);
    let band_y = dest.y + round_u32(dest.h as f32 * SAMPLE_TOP);
    let y1 = (band_y + band_h).min(img.height());
    let x1 = (dest.x + dest.w).min(img.width());
    if band_y >= y1 || dest.x >= x1 {
        return Err(PixelError::EmptyRegion);
    }

    let mut sum = [0u64; 4];
    let mut count = 0u64;
    for y in band_y..y1 {
        for x in dest.x..x1 {
            let p = img.get_pixel(x, y);
            for c in 0..4 { sum[c] += p[c] as u64; }
            count += 1;
        }
    }
    let mut mean = [0u8; 4];
    for c in 0..4 { mean[c] = ((sum[c] as f64 / count as f64).round()) as u8; }
    Ok(mean)
}

/// Cover the watermark in place.
pub fn inpaint(img: &mut RgbaImage) -> Result<WatermarkRegion, PixelError> {
    let (w, h) = img.dimensions();
    let region = watermark_region(w, h).ok_or(PixelError::EmptyRegion)?;
    let WatermarkRegion { dest, donor } = region;

    /* 1) Donor patch through a strong blur.
       Visual: the sky/grass above the mark slides down over it, softly. */
    let pad = 2 * vision::box_radius_for_sigma(PATCH_BLUR) as u32;
    let window = padded(dest, pad, w, h);
    let mut layer = RgbaImage::new(window.w, window.h);
    let patch = image::imageops::crop_imm(img, donor.x, donor.y, donor.w, donor.h).to_image();
    image::imageops::replace(&mut layer, &patch, (dest.x - window.x) as i64, (dest.y - window.y) as i64);
    composite_blurred(img, window, &layer, PATCH_BLUR)?;

    /* 2) Average color of the freshly covered area. */
    let [r, g, b, _a] = sample_mean(img, dest)?;

    /* 3) Vertical tint gradient under a lighter blur.
       Visual: any leftover ghost of the mark fades into the local color. */
    let pad = 2 * vision::box_radius_for_sigma(TINT_BLUR) as u32;
    let window = padded(dest, pad, w, h);
    let mut layer = RgbaImage::new(window.w, window.h);
    let lift = |v: u8| v.saturating_add(TINT_BOTTOM_LIFT);
    let top = [r as f32, g as f32, b as f32, TINT_TOP_ALPHA];
    let bottom = [lift(r) as f32, lift(g) as f32, lift(b) as f32, TINT_BOTTOM_ALPHA];
    for row in 0..dest.h {
        let t = if dest.h > 1 { row as f32 / (dest.h - 1) as f32 } else { 0.0 };
        let mix = |c: usize| top[c] + (bottom[c] - top[c]) * t;
        let alpha = mix(3);
        let px = Rgba([
            (mix(0) * alpha).round() as u8,
            (mix(1) * alpha).round() as u8,
            (mix(2) * alpha).round() as u8,
            (alpha * 255.0).round() as u8,
        ]);
        let ly = dest.y - window.y + row;
        for col in 0..dest.w {
            layer.put_pixel(dest.x - window.x + col, ly, px);
        }
    }
    composite_blurred(img, window, &layer, TINT_BLUR)?;

    Ok(region)
}

fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, PixelError> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .map_err(|e| PixelError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

fn try_remove_watermark(bytes: &[u8]) -> Result<Vec<u8>, PixelError> {
    let mut img = image::load_from_memory(bytes)
        .map_err(|e| PixelError::Decode(e.to_string()))?
        .to_rgba8();
    inpaint(&mut img)?;
    encode_png(&img)
}

/// Encoded image in, PNG out. Falls back to the exact input bytes on any failure.
pub fn remove_watermark(bytes: &[u8]) -> Vec<u8> {
    match try_remove_watermark(bytes) {
        Ok(out) => out,
        Err(e) => {
            tracing::debug!(error = %e, "watermark removal skipped, keeping original");
            bytes.to_vec()
        }
    }
}

/// Same as [`remove_watermark`] for a `data:` URL; returns the input string on failure.
pub fn remove_watermark_data_url(url: &str) -> String {
    let Some((_mime, bytes)) = assets::decode_data_url(url) else {
        return url.to_string();
    };
    match try_remove_watermark(&bytes) {
        Ok(png) => assets::encode_data_url("image/png", &png),
        Err(e) => {
            tracing::debug!(error = %e, "watermark removal skipped, keeping original");
            url.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_image(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |_, y| {
            let v = (y * 255 / h.max(1)) as u8;
            Rgba([v, 128, 255 - v, 255])
        })
    }

    #[test]
    fn region_matches_poster_sized_image() {
        let r = watermark_region(720, 1280).unwrap();
        // 26% x 12% with a 2% margin: 187x154 at (519, 1100)
        assert_eq!(r.dest, Rect { x: 519, y: 1100, w: 187, h: 154 });
        assert_eq!(r.donor, Rect { x: 519, y: 915, w: 187, h: 154 });
    }

    #[test]
    fn region_clamps_on_tiny_images() {
        for (w, h) in [(1, 1), (2, 3), (4, 4), (8, 2), (10, 10)] {
            if let Some(r) = watermark_region(w, h) {
                assert!(r.dest.x + r.dest.w <= w && r.dest.y + r.dest.h <= h);
                assert!(r.donor.x + r.donor.w <= w && r.donor.y + r.donor.h <= h);
            }
        }
        assert!(watermark_region(1, 1).is_none());
    }

    #[test]
    fn inpaint_changes_only_near_the_mark() {
        let mut img = gradient_image(200, 300);
        let before = img.clone();
        let region = inpaint(&mut img).unwrap();
        assert_eq!(region, watermark_region(200, 300).unwrap());
        assert_ne!(img, before);
        // far top-left corner is untouched
        assert_eq!(img.get_pixel(0, 0), before.get_pixel(0, 0));
    }

    #[test]
    fn small_images_never_panic() {
        for (w, h) in [(1, 1), (3, 3), (5, 40), (40, 5), (17, 9)] {
            let img = gradient_image(w, h);
            let png = encode_png(&img).unwrap();
            let out = remove_watermark(&png);
            assert!(!out.is_empty());
        }
    }

    #[test]
    fn undecodable_input_comes_back_byte_identical() {
        let junk = b"definitely not an image".to_vec();
        assert_eq!(remove_watermark(&junk), junk);
        let url = "data:image/png;base64,AAAA";
        assert_eq!(remove_watermark_data_url(url), url);
        assert_eq!(remove_watermark_data_url("https://example.com/x.png"), "https://example.com/x.png");
    }

    #[test]
    fn data_url_output_is_png() {
        let png = encode_png(&gradient_image(100, 100)).unwrap();
        let url = assets::encode_data_url("image/jpeg", &png);
        let out = remove_watermark_data_url(&url);
        assert!(out.starts_with("data:image/png;base64,"));
    }
}
