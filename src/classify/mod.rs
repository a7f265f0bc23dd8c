//! File-type classification for photographic archives.
//!
//! Pure, side-effect free mapping from a path to a coarse file-type tag, plus
//! cache-path detection so the manifest builder can skip known photo-tool
//! scratch directories. Extension lists follow the same conventions the pack's
//! photo-cataloging tools use (RAW formats, standard raster images, sidecar
//! metadata, video containers).

use std::path::Path;

/// Coarse classification of a source entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Raw,
    StandardImage,
    Video,
    Sidecar,
    Catalog,
    Unsupported,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Raw => "raw",
            FileType::StandardImage => "standard_image",
            FileType::Video => "video",
            FileType::Sidecar => "sidecar",
            FileType::Catalog => "catalog",
            FileType::Unsupported => "unsupported",
        }
    }
}

const RAW_EXTENSIONS: &[&str] = &[
    "arw", "cr2", "cr3", "nef", "dng", "raf", "orf", "rw2", "pef", "srw", "x3f", "erf", "3fr",
];

const STANDARD_IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "heic", "heif", "tiff", "tif", "bmp",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    "mov", "mp4", "m4v", "avi", "mts", "m2ts", "mkv", "wmv",
];

const SIDECAR_EXTENSIONS: &[&str] = &["xmp", "xml", "thm", "aae"];

const CATALOG_EXTENSIONS: &[&str] = &["lrcat", "cosessiondb", "ccc"];

/// Well-known cache directory fragments emitted by common photo tools.
const CACHE_PATH_FRAGMENTS: &[&str] = &[
    ".lrdata",
    "CaptureOne/Cache",
    ".BridgeCache",
    ".BridgeCacheT",
    "Lightroom Catalog Previews.lrdata",
    ".photoslibrary/resources/derivatives",
];

fn extension_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Classify a path by extension. Pure and side-effect free.
pub fn classify(path: &Path) -> FileType {
    let Some(ext) = extension_lower(path) else {
        return FileType::Unsupported;
    };
    let ext = ext.as_str();

    if RAW_EXTENSIONS.contains(&ext) {
        FileType::Raw
    } else if STANDARD_IMAGE_EXTENSIONS.contains(&ext) {
        FileType::StandardImage
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        FileType::Video
    } else if SIDECAR_EXTENSIONS.contains(&ext) {
        FileType::Sidecar
    } else if CATALOG_EXTENSIONS.contains(&ext) {
        FileType::Catalog
    } else {
        FileType::Unsupported
    }
}

/// True if `path` falls under a well-known photo-tool cache directory.
pub fn is_cache_path(path: &Path) -> bool {
    let path_str = path.to_string_lossy();
    CACHE_PATH_FRAGMENTS
        .iter()
        .any(|fragment| path_str.contains(fragment))
}

/// Extension set for a named filter preset, used by `FileTypeFilter::Raw` etc.
pub fn extensions_for_preset(preset: &str) -> Vec<&'static str> {
    match preset {
        "raw" => RAW_EXTENSIONS.to_vec(),
        "photos" => RAW_EXTENSIONS
            .iter()
            .chain(STANDARD_IMAGE_EXTENSIONS.iter())
            .copied()
            .collect(),
        "videos" => VIDEO_EXTENSIONS.to_vec(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn classifies_raw_extensions_case_insensitively() {
        assert_eq!(classify(&PathBuf::from("img.NEF")), FileType::Raw);
        assert_eq!(classify(&PathBuf::from("img.cr2")), FileType::Raw);
    }

    #[test]
    fn classifies_standard_images() {
        assert_eq!(classify(&PathBuf::from("photo.jpeg")), FileType::StandardImage);
        assert_eq!(classify(&PathBuf::from("photo.PNG")), FileType::StandardImage);
    }

    #[test]
    fn classifies_video_and_sidecar() {
        assert_eq!(classify(&PathBuf::from("clip.mov")), FileType::Video);
        assert_eq!(classify(&PathBuf::from("meta.xmp")), FileType::Sidecar);
    }

    #[test]
    fn unsupported_without_extension_or_unknown_extension() {
        assert_eq!(classify(&PathBuf::from("README")), FileType::Unsupported);
        assert_eq!(classify(&PathBuf::from("notes.txt")), FileType::Unsupported);
    }

    #[test]
    fn detects_cache_paths() {
        assert!(is_cache_path(&PathBuf::from(
            "/Users/me/Pictures/Catalog.lrdata/x.dat"
        )));
        assert!(is_cache_path(&PathBuf::from(
            "/Users/me/Library/CaptureOne/Cache/thumb.jpg"
        )));
        assert!(!is_cache_path(&PathBuf::from("/Users/me/Pictures/a.nef")));
    }

    #[test]
    fn preset_extension_sets() {
        assert!(extensions_for_preset("raw").contains(&"nef"));
        assert!(extensions_for_preset("photos").contains(&"jpeg"));
        assert!(extensions_for_preset("videos").contains(&"mov"));
        assert!(extensions_for_preset("all").is_empty());
    }
}
