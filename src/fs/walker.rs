//! Deterministic directory traversal.
//!
//! Ordering matters here: the manifest builder needs a stable, repeatable
//! walk order so two runs over an unchanged source produce identical
//! manifests. `WalkDir::sort_by` gives a sort within each directory; combined
//! with depth-first descent that yields a total order across the whole tree.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub follow_links: bool,
    pub max_depth: Option<usize>,

    /// Skip entries whose final path component starts with `.`, or matches
    /// `._*`, `.DS_Store`, `Thumbs.db`.
    pub skip_hidden_files: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            follow_links: false,
            max_depth: None,
            skip_hidden_files: true,
        }
    }
}

/// Information about a file discovered during walking.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub size: u64,
    pub is_dir: bool,
    pub is_symlink: bool,
    pub depth: usize,
}

impl FileInfo {
    /// Build from a `DirEntry`, resolving symlinks to their target for the
    /// real size. Returns `None` for symlinks to directories or broken
    /// symlinks, both of which are skipped rather than surfaced as errors.
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Option<Self>> {
        let raw_metadata = entry.metadata()?;
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        let is_symlink = raw_metadata.is_symlink();

        let (size, is_dir) = if is_symlink {
            match std::fs::metadata(&path) {
                Ok(resolved) => {
                    if resolved.is_dir() {
                        return Ok(None);
                    }
                    (resolved.len(), false)
                }
                Err(_) => return Ok(None),
            }
        } else {
            (raw_metadata.len(), raw_metadata.is_dir())
        };

        Ok(Some(Self {
            path,
            relative_path,
            size,
            is_dir,
            is_symlink,
            depth: entry.depth(),
        }))
    }
}

/// True if the final path component looks like a hidden/junk file the
/// manifest builder should never consider.
pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.') || name.starts_with("._") || name == ".DS_Store" || name == "Thumbs.db"
}

fn should_skip_hidden(entry: &DirEntry, skip_hidden: bool) -> bool {
    skip_hidden && is_hidden_name(&entry.file_name().to_string_lossy())
}

/// Walk a directory tree in deterministic order, collecting every file.
pub fn walk_directory(root: &Path, options: &WalkOptions) -> std::io::Result<Vec<FileInfo>> {
    let mut files = Vec::new();
    walk_directory_with_callback(root, options, |info| files.push(info.clone()))?;
    Ok(files)
}

/// Walk a directory tree in deterministic order, invoking `callback` per file.
pub fn walk_directory_with_callback<F>(
    root: &Path,
    options: &WalkOptions,
    mut callback: F,
) -> std::io::Result<()>
where
    F: FnMut(&FileInfo),
{
    let mut walker = WalkDir::new(root)
        .follow_links(options.follow_links)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()));

    if let Some(max_depth) = options.max_depth {
        walker = walker.max_depth(max_depth);
    }

    for entry in walker {
        let entry = entry?;

        if should_skip_hidden(&entry, options.skip_hidden_files) {
            continue;
        }

        if entry.file_type().is_dir() {
            continue;
        }

        if let Some(file_info) = FileInfo::from_entry(&entry, root)? {
            callback(&file_info);
        }
    }

    Ok(())
}
