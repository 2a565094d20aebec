//! Snapshot store: the whole editor state in one JSON file.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::PersistError;
use crate::layout::LayoutModel;

/// Stock photo used until the first generated background arrives.
pub const DEFAULT_BACKGROUND: &str =
    "https://images.unsplash.com/photo-1470252649378-9c29740c9fa8?q=80&w=1470&auto=format&fit=crop";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Background reference (usually a data URL after generation).
    pub background: String,
    pub elements: LayoutModel,
}

impl Snapshot {
    pub fn fresh(today: chrono::NaiveDate) -> Self {
        Self { background: DEFAULT_BACKGROUND.to_string(), elements: LayoutModel::default_poster(today) }
    }
}

/// `<data dir>/morning-poster/state.json`, or `./state.json` without a data dir.
pub fn default_state_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("morning-poster"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("state.json")
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored snapshot. Missing or unreadable data means "start fresh".
    pub fn load(&self) -> Option<Snapshot> {
        match self.try_load() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring stored state");
                None
            }
        }
    }

    fn try_load(&self) -> Result<Option<Snapshot>, PersistError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Replace the stored snapshot (temp file + rename).
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), PersistError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer(&mut tmp, snapshot)?;
        tmp.flush()?;
        tmp.persist(&self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 7).unwrap()
    }

    #[test]
    fn missing_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("state.json"));
        assert!(store.load().is_none());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested").join("state.json"));
        let snap = Snapshot::fresh(day());
        store.save(&snap).unwrap();
        assert_eq!(store.load(), Some(snap));
    }

    #[test]
    fn corrupt_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(SnapshotStore::new(&path).load().is_none());
    }

    #[test]
    fn snapshot_json_uses_wire_field_names() {
        let json = serde_json::to_value(Snapshot::fresh(day())).unwrap();
        assert!(json["background"].as_str().unwrap().starts_with("https://"));
        let proverb = &json["elements"]["proverb"];
        assert_eq!(proverb["zIndex"], 20);
        assert_eq!(proverb["style"]["kind"], "text");
        assert_eq!(proverb["style"]["fontSize"], 32.0);
    }
}
