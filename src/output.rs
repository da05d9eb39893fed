use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{SynthError, SynthResult};

/// UTC timestamp used in every generated identifier
pub fn run_stamp() -> String {
    Utc::now().format("%m_%d_%y_%H_%M_%S").to_string()
}

pub fn make_directory(directory: &Path) -> SynthResult<()> {
    fs::create_dir_all(directory).map_err(|e| SynthError::write(directory.display().to_string(), e))
}

/// Pretty-print `data` as JSON, creating the parent directory first
pub fn save_json<T: Serialize + ?Sized>(data: &T, json_path: &Path, data_flag: &str) -> SynthResult<()> {
    if let Some(parent) = json_path.parent() {
        make_directory(parent)?;
    }

    let content = serde_json::to_string_pretty(data)
        .map_err(|e| SynthError::write(json_path.display().to_string(), e))?;
    fs::write(json_path, content).map_err(|e| SynthError::write(json_path.display().to_string(), e))?;

    info!("💾 {} saved to {}", data_flag, json_path.display());
    Ok(())
}

pub fn save_text(content: &str, path: &Path) -> SynthResult<()> {
    if let Some(parent) = path.parent() {
        make_directory(parent)?;
    }
    fs::write(path, content).map_err(|e| SynthError::write(path.display().to_string(), e))
}

/// Files produced for one generated item, all sharing the same base name.
///
/// The directory exists as soon as the set is created, so every artifact
/// write below only has to worry about its own file.
#[derive(Debug, Clone)]
pub struct ArtifactSet {
    pub id: String,
    pub dir: PathBuf,
}

impl ArtifactSet {
    /// New set under `parent` with id `<prefix>_<timestamp>_<8 hex chars>`
    pub fn create(parent: &Path, prefix: &str) -> SynthResult<Self> {
        let unique = uuid::Uuid::new_v4().simple().to_string();
        let id = format!("{}_{}_{}", prefix, run_stamp(), &unique[..8]);
        Self::with_id(parent, id)
    }

    pub fn with_id(parent: &Path, id: impl Into<String>) -> SynthResult<Self> {
        let id = id.into();
        let dir = parent.join(&id);
        make_directory(&dir)?;
        Ok(Self { id, dir })
    }

    /// `<dir>/<id>.<extension>`
    pub fn path(&self, extension: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", self.id, extension))
    }

    pub fn images_dir(&self) -> PathBuf {
        self.dir.join("images")
    }

    pub fn write_json<T: Serialize + ?Sized>(&self, data: &T) -> SynthResult<PathBuf> {
        let path = self.path("json");
        save_json(data, &path, &self.id)?;
        Ok(path)
    }

    pub fn write_html(&self, html: &str) -> SynthResult<PathBuf> {
        let path = self.path("html");
        save_text(html, &path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn artifact_set_shares_base_name() {
        let temp_dir = tempdir().unwrap();
        let set = ArtifactSet::create(temp_dir.path(), "AVM").unwrap();

        assert!(set.dir.is_dir());
        assert!(set.id.starts_with("AVM_"));
        assert_eq!(set.id.rsplit('_').next().unwrap().len(), 8);

        let json = set.write_json(&serde_json::json!({"a": 1})).unwrap();
        let html = set.write_html("<html></html>").unwrap();
        assert_eq!(json.file_stem(), html.file_stem());
        assert_eq!(json.file_stem().unwrap().to_string_lossy(), set.id);
    }

    #[test]
    fn save_json_creates_missing_parents() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("deep").join("nested").join("data.json");
        save_json(&vec![1, 2, 3], &path, "numbers").unwrap();
        let back: Vec<i32> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }

    #[test]
    fn run_stamp_has_six_parts() {
        assert_eq!(run_stamp().split('_').count(), 6);
    }
}
