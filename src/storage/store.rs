//! Generic atomic JSON record store: one file per record under a directory,
//! written via temp-file + rename so a crash mid-write never corrupts the
//! previous version (see SPEC_FULL.md §4.1).

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{AiError, AiResult};

/// Write `value` to `path` atomically: serialize to a sibling `.tmp` file,
/// fsync it, then rename over the target. A reader never observes a
/// partially-written file.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> AiResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(value)?;
    {
        let mut f = File::create(&tmp_path)?;
        f.write_all(json.as_bytes())?;
        f.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load a JSON record, quarantining the file if it fails to parse.
///
/// A leftover `.tmp` sibling with no corresponding target means a previous
/// write was interrupted before rename — the target (if present) remains
/// the authoritative version and the stale temp file is simply ignored.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> AiResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    match serde_json::from_str::<T>(&content) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            quarantine(path)?;
            tracing::warn!(path = %path.display(), error = %e, "corrupt record quarantined");
            Err(AiError::Corruption(format!("{}: {}", path.display(), e)))
        }
    }
}

fn quarantine(path: &Path) -> AiResult<()> {
    let suffix = crate::time_utils::to_iso8601(&crate::time_utils::now()).replace(':', "-");
    let quarantined = path.with_extension(format!("corrupt.{}", suffix));
    fs::rename(path, quarantined)?;
    Ok(())
}

/// List the ids (file stems) of every `.json` record directly under `dir`.
pub fn list_ids(dir: &Path) -> AiResult<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
    }
    Ok(ids)
}

pub fn delete(path: &Path) -> AiResult<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StoreStats {
    pub record_count: usize,
    pub total_bytes: u64,
}

pub fn stats(dir: &Path) -> AiResult<StoreStats> {
    if !dir.exists() {
        return Ok(StoreStats::default());
    }
    let mut stats = StoreStats::default();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            stats.record_count += 1;
            stats.total_bytes += entry.metadata()?.len();
        }
    }
    Ok(stats)
}

/// Resolve every stored path referencing this dir so callers can pick a
/// base directory once and not restate it per-record helper.
pub fn record_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{}.json", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Dummy {
        value: u32,
    }

    #[test]
    fn write_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.json");
        atomic_write_json(&path, &Dummy { value: 7 }).unwrap();
        let loaded: Dummy = load_json(&path).unwrap().unwrap();
        assert_eq!(loaded, Dummy { value: 7 });
    }

    #[test]
    fn load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let loaded: Option<Dummy> = load_json(&path).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn corrupt_file_is_quarantined_not_fatal_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, b"{not json").unwrap();
        let result: AiResult<Option<Dummy>> = load_json(&path);
        assert!(result.is_err());
        assert!(!path.exists());
        let quarantined: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().to_string_lossy().contains("corrupt"))
            .collect();
        assert_eq!(quarantined.len(), 1);
    }

    #[test]
    fn list_ids_returns_stems() {
        let dir = tempfile::tempdir().unwrap();
        atomic_write_json(&dir.path().join("a.json"), &Dummy { value: 1 }).unwrap();
        atomic_write_json(&dir.path().join("b.json"), &Dummy { value: 2 }).unwrap();
        let mut ids = list_ids(dir.path()).unwrap();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }
}
