//! Backup coordinator: owns one `DestinationQueue` per destination, fans a
//! single manifest out to all of them, and aggregates their progress into one
//! status map and one set of global totals.
//!
//! Grounded on the teacher's executor, which owned a single progress
//! broadcast over one destination; generalized here to own N destinations
//! behind one `CancellationToken` hierarchy (coordinator parent, queue
//! children) and one serialized status map, per the source's cyclic
//! coordinator/queue relationship redesigned as one-way ownership (§9).

use crate::batch::BatchProcessor;
use crate::destination::{
    DestinationConfig, DestinationQueue, DestinationStatus, ProgressCallback, VerifyCallback,
};
use crate::events::{Event, EventSink, EventType, NoopSink, Severity};
use crate::manifest::sentinel;
use crate::manifest::FileManifestEntry;
use crate::utils::errors::{BackupError, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(100);
const MONITOR_INTERVAL: Duration = Duration::from_millis(250);

/// One destination to back up to, named the way a wrapper names it (a label
/// for status reporting, not a filesystem concept).
pub struct DestinationSpec {
    pub name: String,
    pub config: DestinationConfig,
}

#[derive(Debug, Clone)]
pub struct CollectedFailure {
    pub destination: String,
    pub relative_path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct GlobalProgress {
    pub total_bytes_to_copy: u64,
    pub total_bytes_copied: u64,
    pub combined_speed: f64,
    pub overall_progress: f64,
}

#[derive(Debug, Clone)]
pub struct BackupSummary {
    pub status_message: String,
    pub per_destination: Vec<(String, DestinationStatus)>,
    pub collected_failures: Vec<CollectedFailure>,
    pub cancelled: bool,
    pub duration: Duration,
}

impl BackupSummary {
    /// Map a finished summary to the exit code a wrapping CLI should use.
    /// 0 = all verified, 1 = completed with failures, 2 = cancelled.
    /// 3 (unrecoverable setup error) is returned directly by `start_backup`,
    /// never derived here.
    pub fn exit_code(&self) -> i32 {
        if self.cancelled {
            2
        } else if !self.collected_failures.is_empty() {
            1
        } else {
            0
        }
    }
}

struct RunState {
    manifest: Vec<FileManifestEntry>,
    queues: Vec<(String, Arc<DestinationQueue>)>,
    status: Arc<StdMutex<HashMap<String, DestinationStatus>>>,
    progress: Arc<StdMutex<GlobalProgress>>,
    poll_handles: Vec<JoinHandle<()>>,
    monitor_handle: Option<JoinHandle<()>>,
    started_at: Instant,
    cancel: CancellationToken,
    session_id: Uuid,
}

/// Owns the full lifecycle of one backup run at a time; a second
/// `start_backup` call while one is already running is a no-op.
pub struct BackupCoordinator {
    processor: Arc<BatchProcessor>,
    event_sink: Arc<dyn EventSink>,
    is_running: AtomicBool,
    state: AsyncMutex<Option<RunState>>,
}

impl BackupCoordinator {
    pub fn new(processor: Arc<BatchProcessor>) -> Self {
        Self {
            processor,
            event_sink: Arc::new(NoopSink),
            is_running: AtomicBool::new(false),
            state: AsyncMutex::new(None),
        }
    }

    pub fn with_event_sink(processor: Arc<BatchProcessor>, event_sink: Arc<dyn EventSink>) -> Self {
        Self {
            processor,
            event_sink,
            is_running: AtomicBool::new(false),
            state: AsyncMutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Start a backup of `manifest` to every destination in `destinations`.
    /// Re-entry while already running returns `Ok(())` without effect.
    pub async fn start_backup(
        self: &Arc<Self>,
        manifest: Vec<FileManifestEntry>,
        destinations: Vec<DestinationSpec>,
    ) -> Result<()> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        for spec in &destinations {
            if let Err(e) = sentinel::guard_not_a_source(&spec.config.destination_root) {
                self.is_running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }

        let session_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let total = manifest.len();
        let total_source_bytes: u64 = manifest.iter().map(|e| e.size).sum();

        self.event_sink.emit({
            let mut event = Event::new(session_id, EventType::ManifestBuilt, Severity::Info);
            event
                .metadata
                .insert("file_count".to_string(), total.to_string());
            event.file_size = Some(total_source_bytes);
            event
        });
        self.event_sink.emit({
            let mut event = Event::new(session_id, EventType::SessionStart, Severity::Info);
            event
                .metadata
                .insert("destination_count".to_string(), destinations.len().to_string());
            event.file_size = Some(total_source_bytes);
            event
        });

        let status: Arc<StdMutex<HashMap<String, DestinationStatus>>> =
            Arc::new(StdMutex::new(HashMap::new()));
        let progress = Arc::new(StdMutex::new(GlobalProgress::default()));

        let mut queues = Vec::with_capacity(destinations.len());
        for spec in destinations {
            let empty_status = DestinationStatus {
                total,
                completed: 0,
                bytes_transferred: 0,
                bytes_total: manifest.iter().map(|e| e.size).sum(),
                verified: 0,
                is_verifying: false,
                failed: Vec::new(),
                current_speed: 0.0,
                average_speed: 0.0,
                current_speed_label: crate::throughput::format_speed(0.0),
                eta: None,
            };
            status
                .lock()
                .unwrap()
                .insert(spec.name.clone(), empty_status);

            let queue = DestinationQueue::new(
                manifest.clone(),
                spec.config,
                self.processor.clone(),
                &cancel,
                self.event_sink.clone(),
                session_id,
                spec.name.clone(),
            );

            let progress_status = status.clone();
            let progress_name = spec.name.clone();
            let progress_cb: ProgressCallback = Arc::new(move |snapshot| {
                progress_status
                    .lock()
                    .unwrap()
                    .insert(progress_name.clone(), snapshot);
            });
            queue.set_progress_callback(Some(progress_cb));

            let verify_status = status.clone();
            let verify_name = spec.name.clone();
            let verify_cb: VerifyCallback = Arc::new(move |verified, _total| {
                if let Some(entry) = verify_status.lock().unwrap().get_mut(&verify_name) {
                    entry.verified = verified;
                }
            });
            queue.set_verify_callback(Some(verify_cb));

            queue.start().await;
            queues.push((spec.name, queue));
        }

        let mut poll_handles = Vec::with_capacity(queues.len());
        for (_, queue) in &queues {
            let queue = queue.clone();
            let cancel = cancel.clone();
            poll_handles.push(tokio::spawn(async move {
                loop {
                    if queue.is_complete().await {
                        return;
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            queue.stop().await;
                            return;
                        }
                        _ = tokio::time::sleep(QUEUE_POLL_INTERVAL) => {}
                    }
                }
            }));
        }

        let monitor_handle = {
            let queues_for_monitor: Vec<_> = queues.iter().map(|(n, q)| (n.clone(), q.clone())).collect();
            let status = status.clone();
            let progress = progress.clone();
            let cancel = cancel.clone();
            let destination_count = queues_for_monitor.len().max(1) as f64;
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(MONITOR_INTERVAL) => {}
                    }

                    let mut total_bytes_to_copy = 0u64;
                    let mut total_bytes_copied = 0u64;
                    let mut combined_speed = 0.0;
                    let mut progress_sum = 0.0f64;

                    for (name, queue) in &queues_for_monitor {
                        let snapshot = queue.status().await;
                        total_bytes_to_copy += snapshot.bytes_total;
                        total_bytes_copied += snapshot.bytes_transferred;
                        combined_speed += snapshot.current_speed;
                        progress_sum += (snapshot.completed + snapshot.verified) as f64;
                        status.lock().unwrap().insert(name.clone(), snapshot);
                    }

                    let denominator = (total.max(1) as f64) * destination_count * 2.0;
                    let overall_progress = (progress_sum / denominator).clamp(0.0, 1.0);

                    *progress.lock().unwrap() = GlobalProgress {
                        total_bytes_to_copy,
                        total_bytes_copied,
                        combined_speed,
                        overall_progress,
                    };

                    let all_complete = {
                        let map = status.lock().unwrap();
                        queues_for_monitor
                            .iter()
                            .all(|(name, _)| map.get(name).map(|s| s.is_complete()).unwrap_or(false))
                    };
                    if all_complete {
                        return;
                    }
                }
            })
        };

        let run_state = RunState {
            manifest,
            queues,
            status,
            progress,
            poll_handles,
            monitor_handle: Some(monitor_handle),
            started_at: Instant::now(),
            cancel,
            session_id,
        };

        *self.state.lock().await = Some(run_state);
        Ok(())
    }

    /// Idempotent; calling this before cleanup completes is a no-op beyond
    /// raising the flag a second time.
    pub fn cancel_backup(&self) {
        if let Ok(guard) = self.state.try_lock() {
            if let Some(state) = guard.as_ref() {
                state.cancel.cancel();
            }
        }
    }

    pub async fn global_progress(&self) -> Option<GlobalProgress> {
        let guard = self.state.lock().await;
        guard
            .as_ref()
            .map(|state| state.progress.lock().unwrap().clone())
    }

    pub async fn status_snapshot(&self) -> Vec<(String, DestinationStatus)> {
        let guard = self.state.lock().await;
        match guard.as_ref() {
            Some(state) => state
                .status
                .lock()
                .unwrap()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Wait for every queue to report complete (polling this coordinator's
    /// own status map), or return as soon as cancellation has been observed
    /// by all background tasks.
    pub async fn wait_until_done(&self) {
        loop {
            let mut guard = self.state.lock().await;
            let Some(state) = guard.as_mut() else { return };
            if let Some(handle) = state.monitor_handle.as_mut() {
                if handle.is_finished() {
                    return;
                }
            } else {
                return;
            }
            drop(guard);
            tokio::time::sleep(QUEUE_POLL_INTERVAL).await;
        }
    }

    /// Collect completed/failed per destination, tear down every queue in
    /// parallel, and clear run state. Safe to call more than once: a second
    /// call with no active run returns an empty, non-cancelled summary.
    pub async fn finalize_backup(&self) -> BackupSummary {
        let run_state = self.state.lock().await.take();
        let Some(state) = run_state else {
            return BackupSummary {
                status_message: "no active backup".to_string(),
                per_destination: Vec::new(),
                collected_failures: Vec::new(),
                cancelled: false,
                duration: Duration::from_secs(0),
            };
        };

        for handle in &state.poll_handles {
            handle.abort();
        }
        if let Some(handle) = &state.monitor_handle {
            handle.abort();
        }

        let stops: Vec<_> = state
            .queues
            .iter()
            .map(|(_, queue)| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.stop().await })
            })
            .collect();
        for stop in stops {
            let _ = stop.await;
        }

        let mut per_destination = Vec::with_capacity(state.queues.len());
        let mut collected_failures = Vec::new();
        let mut total_failed = 0usize;
        {
            let map = state.status.lock().unwrap();
            for (name, _) in &state.queues {
                if let Some(snapshot) = map.get(name) {
                    for (relative_path, error) in &snapshot.failed {
                        collected_failures.push(CollectedFailure {
                            destination: name.clone(),
                            relative_path: relative_path.clone(),
                            error: error.clone(),
                        });
                    }
                    total_failed += snapshot.failed.len();
                    per_destination.push((name.clone(), snapshot.clone()));
                }
            }
        }

        let cancelled = state.cancel.is_cancelled();
        let status_message = if cancelled {
            format!(
                "cancelled after {} destination(s), {} failure(s) recorded",
                per_destination.len(),
                total_failed
            )
        } else if total_failed > 0 {
            format!(
                "completed with {} failure(s) across {} destination(s)",
                total_failed,
                per_destination.len()
            )
        } else {
            format!(
                "{} file(s) verified across {} destination(s)",
                state.manifest.len(),
                per_destination.len()
            )
        };

        self.event_sink.emit({
            let mut event = Event::new(state.session_id, EventType::SessionComplete, Severity::Info);
            event
                .metadata
                .insert("status".to_string(), status_message.clone());
            event
        });
        if cancelled {
            self.event_sink.emit(Event::new(
                state.session_id,
                EventType::Cancellation,
                Severity::Info,
            ));
        }

        self.is_running.store(false, Ordering::SeqCst);

        BackupSummary {
            status_message,
            per_destination,
            collected_failures,
            cancelled,
            duration: state.started_at.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::fs;
    use tempfile::TempDir;

    fn entry(relative_path: &str, source_path: PathBuf, size: u64, checksum: &str) -> FileManifestEntry {
        FileManifestEntry {
            source_path,
            relative_path: PathBuf::from(relative_path),
            size,
            checksum: checksum.to_string(),
            file_type: "raw".to_string(),
        }
    }

    fn dest_config(root: PathBuf) -> DestinationConfig {
        DestinationConfig {
            destination_root: root,
            organization_folder: None,
            min_workers: 1,
            max_workers: 2,
            initial_workers: 1,
            max_resident_memory_mb: 750,
        }
    }

    #[tokio::test]
    async fn backs_up_to_two_destinations_and_finalizes() {
        let src_dir = TempDir::new().unwrap();
        let dst_a = TempDir::new().unwrap();
        let dst_b = TempDir::new().unwrap();
        let src_path = src_dir.path().join("a.nef");
        fs::write(&src_path, b"hello world").unwrap();

        let cancel = CancellationToken::new();
        let checksum = crate::checksum::checksum_file(
            &src_path,
            &cancel,
            None,
            crate::checksum::ChecksumHints::default(),
        )
        .unwrap();
        let manifest = vec![entry("a.nef", src_path, 11, &checksum)];

        let engine_config = EngineConfig::default();
        let processor = Arc::new(BatchProcessor::new(&engine_config));
        let coordinator = Arc::new(BackupCoordinator::new(processor));

        let destinations = vec![
            DestinationSpec {
                name: "dest-a".to_string(),
                config: dest_config(dst_a.path().to_path_buf()),
            },
            DestinationSpec {
                name: "dest-b".to_string(),
                config: dest_config(dst_b.path().to_path_buf()),
            },
        ];

        coordinator
            .start_backup(manifest, destinations)
            .await
            .unwrap();
        assert!(coordinator.is_running());

        let mut summary = None;
        for _ in 0..200 {
            let snapshot = coordinator.status_snapshot().await;
            if snapshot.len() == 2 && snapshot.iter().all(|(_, s)| s.is_complete()) {
                summary = Some(coordinator.finalize_backup().await);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let summary = summary.expect("backup did not complete in time");
        assert_eq!(summary.exit_code(), 0);
        assert!(summary.collected_failures.is_empty());
        assert!(!coordinator.is_running());
        assert!(dst_a.path().join("a.nef").is_file());
        assert!(dst_b.path().join("a.nef").is_file());
    }

    #[tokio::test]
    async fn refuses_a_tagged_source_as_destination() {
        let dst = TempDir::new().unwrap();
        sentinel::write_sentinel(dst.path(), "1.0.0").unwrap();

        let engine_config = EngineConfig::default();
        let processor = Arc::new(BatchProcessor::new(&engine_config));
        let coordinator = Arc::new(BackupCoordinator::new(processor));

        let destinations = vec![DestinationSpec {
            name: "dest-a".to_string(),
            config: dest_config(dst.path().to_path_buf()),
        }];

        let result = coordinator.start_backup(Vec::new(), destinations).await;
        assert!(matches!(result, Err(BackupError::Policy(_))));
        assert!(!coordinator.is_running());
    }

    #[tokio::test]
    async fn reentry_while_running_is_a_no_op() {
        let src_dir = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let src_path = src_dir.path().join("a.nef");
        fs::write(&src_path, b"x").unwrap();

        let cancel = CancellationToken::new();
        let checksum = crate::checksum::checksum_file(
            &src_path,
            &cancel,
            None,
            crate::checksum::ChecksumHints::default(),
        )
        .unwrap();
        let manifest = vec![entry("a.nef", src_path, 1, &checksum)];

        let engine_config = EngineConfig::default();
        let processor = Arc::new(BatchProcessor::new(&engine_config));
        let coordinator = Arc::new(BackupCoordinator::new(processor));

        let destinations = vec![DestinationSpec {
            name: "dest-a".to_string(),
            config: dest_config(dst.path().to_path_buf()),
        }];
        coordinator
            .start_backup(manifest.clone(), destinations)
            .await
            .unwrap();

        let second = coordinator.start_backup(manifest, Vec::new()).await;
        assert!(second.is_ok());

        coordinator.finalize_backup().await;
    }

    #[test]
    fn exit_code_maps_cancelled_failed_and_success() {
        let base = BackupSummary {
            status_message: String::new(),
            per_destination: Vec::new(),
            collected_failures: Vec::new(),
            cancelled: false,
            duration: Duration::from_secs(0),
        };
        assert_eq!(base.exit_code(), 0);

        let mut failed = base.clone();
        failed.collected_failures.push(CollectedFailure {
            destination: "dest-a".to_string(),
            relative_path: PathBuf::from("a.nef"),
            error: "boom".to_string(),
        });
        assert_eq!(failed.exit_code(), 1);

        let mut cancelled = base;
        cancelled.cancelled = true;
        assert_eq!(cancelled.exit_code(), 2);
    }
}
