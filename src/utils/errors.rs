//! Error taxonomy for the backup engine.

use std::path::PathBuf;
use thiserror::Error;

/// Every failure mode the engine can produce, per the error handling design.
///
/// `Cancelled` is never converted to another kind — cooperative cancellation
/// always surfaces as itself, not as a failure.
#[derive(Error, Debug)]
pub enum BackupError {
    /// Observed at any cooperative cancellation point.
    #[error("operation cancelled")]
    Cancelled,

    /// A source or destination path was missing when required.
    #[error("not found: {0}")]
    NotFound(PathBuf),

    /// Open/read/write/copy/remove failed; carries the underlying OS error.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Verification computed a digest different from the manifest's.
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Destination rejected the write for space reasons.
    #[error("insufficient space writing {path}")]
    QuotaOrSpace { path: PathBuf },

    /// Read/write/metadata permission denied.
    #[error("permission denied: {0}")]
    Permission(PathBuf),

    /// A refusal to act, e.g. using a tagged source as a destination.
    #[error("policy violation: {0}")]
    Policy(String),

    /// Sentinel/config (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

/// OS error codes that mean "no space left on this volume". `io::ErrorKind`
/// has no stable variant for this, so the raw platform code is checked
/// directly: `ENOSPC`/`EDQUOT` on Unix, `ERROR_DISK_FULL`/
/// `ERROR_HANDLE_DISK_FULL` on Windows.
fn is_out_of_space(source: &std::io::Error) -> bool {
    matches!(source.raw_os_error(), Some(28) | Some(122) | Some(112) | Some(39))
}

impl BackupError {
    /// Wrap a raw I/O error with the path that triggered it.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => BackupError::NotFound(path.into()),
            std::io::ErrorKind::PermissionDenied => BackupError::Permission(path.into()),
            _ if is_out_of_space(&source) => BackupError::QuotaOrSpace { path: path.into() },
            _ => BackupError::Io {
                path: path.into(),
                source,
            },
        }
    }

    /// True if this error represents cooperative cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BackupError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_space_os_errors_map_to_quota_or_space() {
        let enospc = std::io::Error::from_raw_os_error(28);
        assert!(matches!(
            BackupError::io("/dest/a.nef", enospc),
            BackupError::QuotaOrSpace { .. }
        ));
    }

    #[test]
    fn not_found_and_permission_still_take_priority_over_kind() {
        let not_found = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(
            BackupError::io("/src/a.nef", not_found),
            BackupError::NotFound(_)
        ));

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(
            BackupError::io("/src/a.nef", denied),
            BackupError::Permission(_)
        ));
    }

    #[test]
    fn unrelated_io_errors_stay_generic() {
        let other = std::io::Error::new(std::io::ErrorKind::Other, "weird");
        assert!(matches!(
            BackupError::io("/src/a.nef", other),
            BackupError::Io { .. }
        ));
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
