//! Writing the finished poster to disk as a PNG.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use image::{ImageFormat, RgbaImage};
use tempfile::NamedTempFile;

use crate::assets::ImageResolver;
use crate::error::ExportError;
use crate::layout::{LayoutModel, Style};
use crate::render;

/// `morning-poster-YYYY-MM-DD.png`
pub fn default_file_name(date: NaiveDate) -> String {
    format!("morning-poster-{}.png", date.format("%Y-%m-%d"))
}

/// Every image the poster references must be decoded before we paint,
/// otherwise the export would silently drop it.
fn check_assets(model: &LayoutModel, background: Option<&str>, images: &dyn ImageResolver) -> Result<(), ExportError> {
    let referenced = model
        .iter()
        .filter(|e| matches!(e.style, Style::Image(_)))
        .filter_map(|e| e.content.as_deref())
        .filter(|c| !c.is_empty())
        .chain(background.filter(|b| !b.is_empty()));
    for source in referenced {
        if images.resolve(source).is_none() {
            return Err(ExportError::MissingAsset(crate::assets::short(source).to_string()));
        }
    }
    Ok(())
}

/// Full-resolution render of the poster, independent of any window.
pub fn compose(model: &LayoutModel, background: Option<&str>, images: &dyn ImageResolver) -> Result<RgbaImage, ExportError> {
    check_assets(model, background, images)?;
    let bg = background.and_then(|b| images.resolve(b));
    Ok(render::render_poster(model, bg, images))
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, ExportError> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .map_err(|e| ExportError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

/// Write `bytes` next to `path` and rename into place; a failure leaves no file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    let write_err = |source: std::io::Error| ExportError::Write { path: path.display().to_string(), source };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut tmp = NamedTempFile::new_in(&dir).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Render, encode and write. Returns the number of bytes written.
pub fn export_png(
    model: &LayoutModel,
    background: Option<&str>,
    images: &dyn ImageResolver,
    path: &Path,
) -> Result<usize, ExportError> {
    let img = compose(model, background, images)?;
    let png = encode_png(&img)?;
    write_atomic(path, &png)?;
    tracing::info!(path = %path.display(), bytes = png.len(), "poster exported");
    Ok(png.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetCache;
    use crate::layout::ElementPatch;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 9).unwrap()
    }

    #[test]
    fn file_name_carries_the_date() {
        assert_eq!(default_file_name(today()), "morning-poster-2025-03-09.png");
    }

    #[test]
    fn export_writes_a_full_size_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let model = LayoutModel::default_poster(today());
        export_png(&model, None, &AssetCache::new(), &path).unwrap();
        let back = image::open(&path).unwrap();
        assert_eq!((back.width(), back.height()), (720, 1280));
    }

    #[test]
    fn missing_logo_fails_without_leaving_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let mut model = LayoutModel::default_poster(today());
        model
            .update(&"logo".into(), ElementPatch::content(Some("nowhere/logo.png".into())))
            .unwrap();
        let err = export_png(&model, None, &AssetCache::new(), &path).unwrap_err();
        assert!(matches!(err, ExportError::MissingAsset(_)));
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn unwritable_destination_is_an_export_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("out.png");
        let err = export_png(&LayoutModel::new(), None, &AssetCache::new(), &path).unwrap_err();
        assert!(matches!(err, ExportError::Write { .. }));
    }
}
