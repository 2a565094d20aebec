// Core pixel + color types shared by the preview window, the renderer and the inpainter.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// What the window shows this frame.
#[derive(Clone)]
pub struct FrameBuffer {
    pub width: usize,      // window width in screen pixels
    pub height: usize,     // window height in screen pixels
    pub pixels: Vec<u32>,  // each entry is 0x00RRGGBB for minifb
}

impl FrameBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, pixels: vec![0u32; width * height] }
    }

    /// Reallocate when the window changes size. Returns true if it did.
    pub fn resize(&mut self, width: usize, height: usize) -> bool {
        if self.width == width && self.height == height {
            return false;
        }
        self.width = width;
        self.height = height;
        self.pixels = vec![0u32; width * height];
        true
    }

    pub fn fill(&mut self, color: u32) {
        for p in &mut self.pixels { *p = color; }
    }
}

/// Alpha mask in [0,1] per pixel; 1 = take the patch, 0 = keep the original.
/// Visual: unseen directly; it decides how softly a patch melts into the picture.
pub struct Mask {
    pub width: usize,
    pub height: usize,
    pub alpha: Vec<f32>,   // length = width * height, values clamped to [0.0, 1.0]
}

impl Mask {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, alpha: vec![0.0; width * height] }
    }
}

/// Opaque sRGB color, stored in snapshots as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color { r: 0xff, g: 0xff, b: 0xff };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Accepts `#rgb` and `#rrggbb` (leading `#` optional).
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.trim().trim_start_matches('#');
        let nibble = |c: u8| (c as char).to_digit(16).map(|d| d as u8);
        match hex.len() {
            3 => {
                let b = hex.as_bytes();
                let (r, g, bl) = (nibble(b[0])?, nibble(b[1])?, nibble(b[2])?);
                Some(Self::rgb(r * 17, g * 17, bl * 17))
            }
            6 => {
                let v = u32::from_str_radix(hex, 16).ok()?;
                Some(Self::rgb((v >> 16) as u8, (v >> 8) as u8, v as u8))
            }
            _ => None,
        }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Color::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid color `{s}`")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_long_hex() {
        assert_eq!(Color::from_hex("#fff"), Some(Color::WHITE));
        assert_eq!(Color::from_hex("#dfff00"), Some(Color::rgb(0xdf, 0xff, 0x00)));
        assert_eq!(Color::from_hex("nope"), None);
    }

    #[test]
    fn color_serializes_as_hex_string() {
        let json = serde_json::to_string(&Color::rgb(1, 2, 3)).unwrap();
        assert_eq!(json, "\"#010203\"");
        let back: Color = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Color::rgb(1, 2, 3));
    }
}
