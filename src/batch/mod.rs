//! Batch file processor: path cache, buffer pool, and batched checksum/copy
//! helpers shared by the manifest builder and the destination queues.

use crate::checksum::{self, BufferPool, ChecksumHints};
use crate::config::EngineConfig;
use crate::utils::errors::{BackupError, Result};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Bounded FIFO cache of directories known to already exist, so repeated
/// writes under the same parent don't re-issue `create_dir_all`. Evicts the
/// oldest 25% of entries on overflow rather than a single entry at a time.
struct PathCache {
    capacity: usize,
    order: VecDeque<PathBuf>,
    present: HashSet<PathBuf>,
}

impl PathCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            present: HashSet::new(),
        }
    }

    fn contains(&self, path: &Path) -> bool {
        self.present.contains(path)
    }

    fn insert(&mut self, path: PathBuf) {
        if self.present.contains(&path) {
            return;
        }
        if self.order.len() >= self.capacity {
            let evict_count = (self.capacity / 4).max(1);
            for _ in 0..evict_count {
                if let Some(evicted) = self.order.pop_front() {
                    self.present.remove(&evicted);
                } else {
                    break;
                }
            }
        }
        self.present.insert(path.clone());
        self.order.push_back(path);
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

pub struct BatchProcessor {
    path_cache: Mutex<PathCache>,
    buffer_pool: std::sync::Arc<BufferPool>,
    checksum_batch_size: usize,
}

impl BatchProcessor {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            path_cache: Mutex::new(PathCache::new(config.path_cache_capacity)),
            buffer_pool: BufferPool::new(config.buffer_pool_capacity),
            checksum_batch_size: config.checksum_batch_size,
        }
    }

    /// Ensure the parent directory of `path` exists, consulting and updating
    /// the path cache to avoid redundant filesystem calls.
    pub fn ensure_parent_dir(&self, path: &Path) -> Result<()> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        if parent.as_os_str().is_empty() {
            return Ok(());
        }

        {
            let cache = self.path_cache.lock().unwrap();
            if cache.contains(parent) {
                return Ok(());
            }
        }

        std::fs::create_dir_all(parent).map_err(|e| BackupError::io(parent, e))?;

        let mut cache = self.path_cache.lock().unwrap();
        cache.insert(parent.to_path_buf());
        Ok(())
    }

    #[cfg(test)]
    fn path_cache_len(&self) -> usize {
        self.path_cache.lock().unwrap().len()
    }

    /// Checksum `paths` in batches of up to `checksum_batch_size`, checking
    /// `cancel` once per file and once between batches. A per-file checksum
    /// failure is recorded as `None` at that index rather than aborting the
    /// whole batch; cancellation aborts the whole operation.
    pub async fn checksum_batched(
        &self,
        paths: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<Vec<Option<String>>> {
        let mut results = Vec::with_capacity(paths.len());

        for batch in paths.chunks(self.checksum_batch_size) {
            if cancel.is_cancelled() {
                return Err(BackupError::Cancelled);
            }

            for path in batch {
                if cancel.is_cancelled() {
                    return Err(BackupError::Cancelled);
                }

                let path = path.clone();
                let cancel = cancel.clone();
                let pool = self.buffer_pool.clone();
                let digest = tokio::task::spawn_blocking(move || {
                    checksum::checksum_file(&path, &cancel, Some(&pool), ChecksumHints::default())
                })
                .await
                .map_err(|_| BackupError::Cancelled)?;

                match digest {
                    Ok(d) => results.push(Some(d)),
                    Err(BackupError::Cancelled) => return Err(BackupError::Cancelled),
                    Err(_) => results.push(None),
                }
            }
        }

        Ok(results)
    }

    /// Copy `src` to `dst`, creating the parent directory chain if needed.
    /// On any failure after a partial write, the partial destination file is
    /// removed before the error is surfaced.
    pub async fn copy_file(
        &self,
        src: &Path,
        dst: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        if cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }

        self.ensure_parent_dir(dst)?;

        let src_owned = src.to_path_buf();
        let dst_owned = dst.to_path_buf();
        let result = tokio::fs::copy(&src_owned, &dst_owned)
            .await
            .map_err(|e| BackupError::io(src, e));

        match result {
            Ok(bytes) => Ok(bytes),
            Err(err) => {
                if dst_owned.exists() {
                    let _ = std::fs::remove_file(&dst_owned);
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[tokio::test]
    async fn checksum_batched_matches_single_file_digest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.nef");
        fs::write(&path, b"hello world").unwrap();

        let processor = BatchProcessor::new(&config());
        let cancel = CancellationToken::new();
        let results = processor
            .checksum_batched(&[path.clone()], &cancel)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].is_some());
    }

    #[tokio::test]
    async fn checksum_batched_records_missing_file_as_none() {
        let processor = BatchProcessor::new(&config());
        let cancel = CancellationToken::new();
        let results = processor
            .checksum_batched(&[PathBuf::from("/nonexistent/file.nef")], &cancel)
            .await
            .unwrap();

        assert_eq!(results, vec![None]);
    }

    #[tokio::test]
    async fn checksum_batched_aborts_on_cancellation() {
        let processor = BatchProcessor::new(&config());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = processor
            .checksum_batched(&[PathBuf::from("anything")], &cancel)
            .await;
        assert!(matches!(result, Err(BackupError::Cancelled)));
    }

    #[tokio::test]
    async fn copy_file_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("source.nef");
        fs::write(&src, b"raw bytes").unwrap();
        let dst = dir.path().join("nested/deep/destination.nef");

        let processor = BatchProcessor::new(&config());
        let cancel = CancellationToken::new();
        let bytes = processor.copy_file(&src, &dst, &cancel).await.unwrap();

        assert_eq!(bytes, 9);
        assert_eq!(fs::read(&dst).unwrap(), b"raw bytes");
    }

    #[test]
    fn path_cache_evicts_oldest_quarter_on_overflow() {
        let mut cache = PathCache::new(4);
        cache.insert(PathBuf::from("/a"));
        cache.insert(PathBuf::from("/b"));
        cache.insert(PathBuf::from("/c"));
        cache.insert(PathBuf::from("/d"));
        assert_eq!(cache.len(), 4);

        cache.insert(PathBuf::from("/e"));
        assert_eq!(cache.len(), 4);
        assert!(!cache.contains(Path::new("/a")));
        assert!(cache.contains(Path::new("/e")));
    }

    #[test]
    fn ensure_parent_dir_populates_cache() {
        let dir = TempDir::new().unwrap();
        let processor = BatchProcessor::new(&config());
        let target = dir.path().join("sub/file.nef");

        assert_eq!(processor.path_cache_len(), 0);
        processor.ensure_parent_dir(&target).unwrap();
        assert!(target.parent().unwrap().is_dir());
        assert_eq!(processor.path_cache_len(), 1);
    }
}
