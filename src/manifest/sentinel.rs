//! Source tag sentinel: `.imageintact_source`.
//!
//! Marks a directory as a backup source so the coordinator can refuse to use
//! it as a destination. Reading, writing, and checking are exposed
//! separately since the manifest builder only ever writes (tagging a fresh
//! source on request) while the coordinator only ever reads (validating a
//! destination).

use crate::utils::errors::{BackupError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

pub const SENTINEL_FILE_NAME: &str = ".imageintact_source";

/// Quarantine directory name. This crate never creates or populates it; the
/// constant exists so a wrapping layer can agree on the path with the core.
pub const QUARANTINE_DIR_NAME: &str = ".imageintact_quarantine";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSentinel {
    pub source_id: Uuid,
    pub tagged_date: DateTime<Utc>,
    pub app_version: String,
}

impl SourceSentinel {
    pub fn new(app_version: impl Into<String>) -> Self {
        Self {
            source_id: Uuid::new_v4(),
            tagged_date: Utc::now(),
            app_version: app_version.into(),
        }
    }
}

fn sentinel_path(root: &Path) -> std::path::PathBuf {
    root.join(SENTINEL_FILE_NAME)
}

/// True if `root` carries a source sentinel.
pub fn is_tagged_source(root: &Path) -> bool {
    sentinel_path(root).is_file()
}

/// Read and parse the sentinel at `root`, if present.
pub fn read_sentinel(root: &Path) -> Result<Option<SourceSentinel>> {
    let path = sentinel_path(root);
    if !path.is_file() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path).map_err(|e| BackupError::io(&path, e))?;
    let sentinel: SourceSentinel = serde_json::from_str(&content)?;
    Ok(Some(sentinel))
}

/// Write a fresh sentinel tagging `root` as a source.
pub fn write_sentinel(root: &Path, app_version: &str) -> Result<SourceSentinel> {
    let sentinel = SourceSentinel::new(app_version);
    let path = sentinel_path(root);
    let content = serde_json::to_string_pretty(&sentinel)?;
    std::fs::write(&path, content).map_err(|e| BackupError::io(&path, e))?;
    Ok(sentinel)
}

/// Refuse to use `root` as a destination if it is a tagged source.
pub fn guard_not_a_source(root: &Path) -> Result<()> {
    if is_tagged_source(root) {
        return Err(BackupError::Policy(format!(
            "{} is tagged as a backup source and cannot be used as a destination",
            root.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn untagged_directory_is_not_a_source() {
        let dir = TempDir::new().unwrap();
        assert!(!is_tagged_source(dir.path()));
        assert!(read_sentinel(dir.path()).unwrap().is_none());
        assert!(guard_not_a_source(dir.path()).is_ok());
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let written = write_sentinel(dir.path(), "1.0.0").unwrap();
        let read = read_sentinel(dir.path()).unwrap().unwrap();
        assert_eq!(written.source_id, read.source_id);
        assert_eq!(read.app_version, "1.0.0");
    }

    #[test]
    fn tagged_source_cannot_be_a_destination() {
        let dir = TempDir::new().unwrap();
        write_sentinel(dir.path(), "1.0.0").unwrap();
        let result = guard_not_a_source(dir.path());
        assert!(matches!(result, Err(BackupError::Policy(_))));
    }
}
