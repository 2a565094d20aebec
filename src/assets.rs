//! Turning image references (data URLs, http URLs, file paths) into pixels.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::RgbaImage;

use crate::error::AssetError;

/// Split `data:<mime>;base64,<payload>` into mime + bytes.
pub fn decode_data_url(url: &str) -> Option<(String, Vec<u8>)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    let bytes = STANDARD.decode(payload.trim()).ok()?;
    Some((mime.to_string(), bytes))
}

pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Guess a mime type from a file extension, for building data URLs.
pub fn mime_for_path(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "image/png",
    }
}

/// Read a local image into a self-contained data URL (what the logo stores).
pub fn file_to_data_url(path: &Path) -> Result<String, AssetError> {
    let bytes = std::fs::read(path)
        .map_err(|source| AssetError::Read { path: path.display().to_string(), source })?;
    // reject non-images up front so the snapshot never holds junk
    image::load_from_memory(&bytes).map_err(|e| AssetError::Decode(e.to_string()))?;
    Ok(encode_data_url(mime_for_path(path), &bytes))
}

/// Raw bytes for any supported reference. Blocks on HTTP.
pub fn load_bytes(source: &str, timeout: Duration) -> Result<Vec<u8>, AssetError> {
    if source.starts_with("data:") {
        return decode_data_url(source).map(|(_, b)| b).ok_or(AssetError::BadDataUrl);
    }
    if source.starts_with("http://") || source.starts_with("https://") {
        let fetch_err = |message: String| AssetError::Fetch { url: source.to_string(), message };
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| fetch_err(e.to_string()))?;
        let res = client.get(source).send().map_err(|e| fetch_err(e.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            return Err(fetch_err(format!("HTTP {status}")));
        }
        return res.bytes().map(|b| b.to_vec()).map_err(|e| fetch_err(e.to_string()));
    }
    std::fs::read(source).map_err(|source_err| AssetError::Read { path: source.to_string(), source: source_err })
}

pub fn decode(bytes: &[u8]) -> Result<RgbaImage, AssetError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgba8())
        .map_err(|e| AssetError::Decode(e.to_string()))
}

pub fn load_image(source: &str, timeout: Duration) -> Result<RgbaImage, AssetError> {
    decode(&load_bytes(source, timeout)?)
}

/// Anything that can hand the renderer decoded pixels for a reference.
pub trait ImageResolver {
    fn resolve(&self, source: &str) -> Option<&RgbaImage>;

    /// height / width of the referenced image, if loaded.
    fn aspect(&self, source: &str) -> Option<f32> {
        self.resolve(source)
            .filter(|img| img.width() > 0)
            .map(|img| img.height() as f32 / img.width() as f32)
    }
}

#[derive(Debug)]
pub enum AssetState {
    Ready(RgbaImage),
    Failed(String),
}

/// Decoded images keyed by their reference string.
#[derive(Debug, Default)]
pub struct AssetCache {
    images: HashMap<String, AssetState>,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: &str, result: Result<RgbaImage, AssetError>) {
        let state = match result {
            Ok(img) => AssetState::Ready(img),
            Err(e) => {
                tracing::warn!(source = %short(source), error = %e, "image failed to load");
                AssetState::Failed(e.to_string())
            }
        };
        self.images.insert(source.to_string(), state);
    }

    pub fn contains(&self, source: &str) -> bool {
        self.images.contains_key(source)
    }

    pub fn failure(&self, source: &str) -> Option<&str> {
        match self.images.get(source) {
            Some(AssetState::Failed(msg)) => Some(msg),
            _ => None,
        }
    }

    /// Load synchronously if not cached yet (CLI export path).
    pub fn load_blocking(&mut self, source: &str, timeout: Duration) -> Option<&RgbaImage> {
        if !self.contains(source) {
            let result = load_image(source, timeout);
            self.insert(source, result);
        }
        self.resolve(source)
    }

    /// Drop everything not in `keep` (old backgrounds, replaced logos).
    pub fn retain_sources(&mut self, keep: &HashSet<&str>) {
        self.images.retain(|k, _| keep.contains(k.as_str()));
    }
}

impl ImageResolver for AssetCache {
    fn resolve(&self, source: &str) -> Option<&RgbaImage> {
        match self.images.get(source) {
            Some(AssetState::Ready(img)) => Some(img),
            _ => None,
        }
    }
}

/// Loads references on worker threads so the window never stalls on HTTP.
pub struct AssetLoader {
    tx: Sender<(String, Result<RgbaImage, AssetError>)>,
    rx: Receiver<(String, Result<RgbaImage, AssetError>)>,
    pending: HashSet<String>,
    timeout: Duration,
}

impl AssetLoader {
    pub fn new(timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx, pending: HashSet::new(), timeout }
    }

    /// Kick off a load unless it's cached or already in flight.
    pub fn request(&mut self, source: &str, cache: &AssetCache) {
        if cache.contains(source) || self.pending.contains(source) {
            return;
        }
        self.pending.insert(source.to_string());
        let tx = self.tx.clone();
        let owned = source.to_string();
        let timeout = self.timeout;
        thread::spawn(move || {
            let result = load_image(&owned, timeout);
            // receiver gone means the editor closed; nothing to do
            let _ = tx.send((owned, result));
        });
    }

    /// Move finished loads into the cache. Returns how many landed.
    pub fn poll(&mut self, cache: &mut AssetCache) -> usize {
        let mut landed = 0;
        while let Ok((source, result)) = self.rx.try_recv() {
            self.pending.remove(&source);
            cache.insert(&source, result);
            landed += 1;
        }
        landed
    }

    pub fn is_loading(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Log-friendly prefix of a (possibly huge) data URL.
pub fn short(source: &str) -> &str {
    match source.char_indices().nth(48) {
        Some((i, _)) => &source[..i],
        None => source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(w, h, image::Rgba([1, 2, 3, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn data_url_roundtrip() {
        let url = encode_data_url("image/png", b"abc");
        assert_eq!(url, "data:image/png;base64,YWJj");
        let (mime, bytes) = decode_data_url(&url).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, b"abc");
        assert!(decode_data_url("data:image/png,raw").is_none());
        assert!(decode_data_url("https://x").is_none());
    }

    #[test]
    fn cache_resolves_ready_images_and_reports_aspect() {
        let mut cache = AssetCache::new();
        let url = encode_data_url("image/png", &png_bytes(4, 2));
        assert!(cache.load_blocking(&url, Duration::from_secs(1)).is_some());
        assert_eq!(cache.aspect(&url), Some(0.5));

        cache.insert("broken", Err(AssetError::BadDataUrl));
        assert!(cache.resolve("broken").is_none());
        assert!(cache.failure("broken").is_some());
    }

    #[test]
    fn file_to_data_url_rejects_non_images() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("logo.png");
        std::fs::write(&good, png_bytes(2, 2)).unwrap();
        assert!(file_to_data_url(&good).unwrap().starts_with("data:image/png;base64,"));

        let bad = dir.path().join("notes.txt");
        std::fs::write(&bad, "hello").unwrap();
        assert!(matches!(file_to_data_url(&bad), Err(AssetError::Decode(_))));
    }

    #[test]
    fn loader_delivers_results_into_cache() {
        let mut cache = AssetCache::new();
        let mut loader = AssetLoader::new(Duration::from_secs(1));
        let url = encode_data_url("image/png", &png_bytes(3, 3));
        loader.request(&url, &cache);
        assert!(loader.is_loading());
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while loader.poll(&mut cache) == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(cache.resolve(&url).is_some());
        assert!(!loader.is_loading());
    }
}
