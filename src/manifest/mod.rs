//! Manifest construction: the content-addressed inventory of what a backup
//! run will attempt.
//!
//! Grounded on the teacher's `fs::walker` traversal, generalized to filter by
//! the classifier and to checksum in batches via the batch file processor
//! rather than one file at a time.

use crate::batch::BatchProcessor;
use crate::classify::{self, FileType};
use crate::config::FileTypeFilter;
use crate::fs::walker::{self, WalkOptions};
use crate::utils::errors::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

pub mod sentinel;

/// One entry in the backup manifest: a source file, its relative path for
/// mirroring under each destination, its size, and its expected checksum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileManifestEntry {
    pub source_path: PathBuf,
    pub relative_path: PathBuf,
    pub size: u64,
    pub checksum: String,
    pub file_type: String,
}

/// Options controlling which source entries are retained.
#[derive(Debug, Clone)]
pub struct ManifestOptions {
    pub exclude_cache_files: bool,
    pub skip_hidden_files: bool,
    pub file_type_filter: FileTypeFilter,
}

impl Default for ManifestOptions {
    fn default() -> Self {
        Self {
            exclude_cache_files: true,
            skip_hidden_files: true,
            file_type_filter: FileTypeFilter::All,
        }
    }
}

fn is_allowed(file_type: FileType, filter: &FileTypeFilter, ext: Option<&str>) -> bool {
    if file_type == FileType::Unsupported {
        return false;
    }
    match filter {
        FileTypeFilter::All => true,
        FileTypeFilter::Raw => file_type == FileType::Raw,
        FileTypeFilter::Photos => matches!(file_type, FileType::Raw | FileType::StandardImage),
        FileTypeFilter::Videos => file_type == FileType::Video,
        FileTypeFilter::Custom(exts) => ext.map(|e| exts.contains(e)).unwrap_or(false),
    }
}

/// Build the manifest for `source_root`, checksumming retained files in
/// batches via `processor`. Aborts (returning `Cancelled`) if `cancel` fires
/// at any point; no partial manifest is surfaced on cancellation.
pub async fn build_manifest(
    source_root: &Path,
    options: &ManifestOptions,
    processor: &BatchProcessor,
    cancel: &CancellationToken,
) -> Result<Vec<FileManifestEntry>> {
    if !source_root.exists() {
        return Err(BackupError::NotFound(source_root.to_path_buf()));
    }

    let walk_options = WalkOptions {
        follow_links: false,
        max_depth: None,
        skip_hidden_files: options.skip_hidden_files,
    };

    let source_root_owned = source_root.to_path_buf();
    let candidates = tokio::task::spawn_blocking(move || {
        walker::walk_directory(&source_root_owned, &walk_options)
    })
    .await
    .map_err(|_| BackupError::Cancelled)?
    .map_err(|e| BackupError::io(source_root, e))?;

    if cancel.is_cancelled() {
        return Err(BackupError::Cancelled);
    }

    let mut retained = Vec::new();
    for file in candidates {
        if options.exclude_cache_files && classify::is_cache_path(&file.path) {
            continue;
        }

        let file_type = classify::classify(&file.path);
        let ext = file
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        if !is_allowed(file_type, &options.file_type_filter, ext.as_deref()) {
            continue;
        }

        retained.push((file, file_type));
    }

    if cancel.is_cancelled() {
        return Err(BackupError::Cancelled);
    }

    let paths: Vec<PathBuf> = retained.iter().map(|(f, _)| f.path.clone()).collect();
    let checksums = processor.checksum_batched(&paths, cancel).await?;

    let mut entries = Vec::with_capacity(retained.len());
    for ((file, file_type), checksum) in retained.into_iter().zip(checksums.into_iter()) {
        let checksum = match checksum {
            Some(c) => c,
            None => continue,
        };
        entries.push(FileManifestEntry {
            source_path: file.path,
            relative_path: file.relative_path,
            size: file.size,
            checksum,
            file_type: file_type.as_str().to_string(),
        });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::fs;
    use tempfile::TempDir;

    fn processor() -> BatchProcessor {
        BatchProcessor::new(&EngineConfig::default())
    }

    #[tokio::test]
    async fn empty_source_yields_empty_manifest() {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let entries = build_manifest(
            dir.path(),
            &ManifestOptions::default(),
            &processor(),
            &cancel,
        )
        .await
        .unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn five_small_files_are_all_retained_with_checksums() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.nef"), b"aaaaaaaaaaa").unwrap();
        fs::write(dir.path().join("b.cr2"), b"bbbbbbbbbbb").unwrap();
        fs::write(dir.path().join("c.jpeg"), b"cccccccccc").unwrap();
        fs::write(dir.path().join("d.mov"), b"dddddddddd").unwrap();
        fs::write(dir.path().join("e.xmp"), b"eeeeeeeeeee").unwrap();

        let cancel = CancellationToken::new();
        let entries = build_manifest(
            dir.path(),
            &ManifestOptions::default(),
            &processor(),
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(entries.len(), 5);
        assert!(entries.iter().all(|e| !e.checksum.is_empty()));
    }

    #[tokio::test]
    async fn unsupported_extensions_are_excluded() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        fs::write(dir.path().join("photo.nef"), b"raw").unwrap();

        let cancel = CancellationToken::new();
        let entries = build_manifest(
            dir.path(),
            &ManifestOptions::default(),
            &processor(),
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].relative_path, PathBuf::from("photo.nef"));
    }

    #[tokio::test]
    async fn cache_paths_are_excluded_when_enabled() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("Catalog.lrdata")).unwrap();
        fs::write(dir.path().join("Catalog.lrdata/preview.jpg"), b"x").unwrap();
        fs::write(dir.path().join("keep.nef"), b"keep").unwrap();

        let cancel = CancellationToken::new();
        let entries = build_manifest(
            dir.path(),
            &ManifestOptions::default(),
            &processor(),
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].relative_path, PathBuf::from("keep.nef"));
    }

    #[tokio::test]
    async fn nested_structure_preserves_relative_paths() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("2024/January")).unwrap();
        fs::write(dir.path().join("root.nef"), b"r").unwrap();
        fs::write(dir.path().join("2024/year.nef"), b"y").unwrap();
        fs::write(dir.path().join("2024/January/month.nef"), b"m").unwrap();

        let cancel = CancellationToken::new();
        let mut entries = build_manifest(
            dir.path(),
            &ManifestOptions::default(),
            &processor(),
            &cancel,
        )
        .await
        .unwrap();
        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        let names: Vec<_> = entries
            .iter()
            .map(|e| e.relative_path.to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(
            names,
            vec!["2024/January/month.nef", "2024/year.nef", "root.nef"]
        );
    }

    #[tokio::test]
    async fn missing_source_root_is_not_found() {
        let cancel = CancellationToken::new();
        let result = build_manifest(
            Path::new("/nonexistent/source/root"),
            &ManifestOptions::default(),
            &processor(),
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(BackupError::NotFound(_))));
    }

    #[tokio::test]
    async fn cancellation_before_checksumming_aborts() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.nef"), b"a").unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = build_manifest(
            dir.path(),
            &ManifestOptions::default(),
            &processor(),
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(BackupError::Cancelled)));
    }
}
