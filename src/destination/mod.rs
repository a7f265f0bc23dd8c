//! Destination queue: the per-destination actor owning tasks, workers,
//! progress, and verification for one output root.
//!
//! The owner task is the single writer for every piece of mutable state
//! (counters, `failed[]`, the priority queue itself); workers and the
//! verification driver only ever ask for work or report outcomes through
//! the mailbox. This mirrors the teacher's `executor::BackupExecutor`
//! progress-broadcast task, generalized from "read shared atomics" to
//! "own every mutation".

use crate::batch::BatchProcessor;
use crate::events::{Event, EventSink, EventType, Severity};
use crate::manifest::FileManifestEntry;
use crate::queue::{PriorityQueue, Task};
use crate::utils::errors::BackupError;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::System;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::throughput::{self, ThroughputMonitor, WorkerRecommendation};

const PROGRESS_THROTTLE: Duration = Duration::from_millis(100);
const MAX_ATTEMPTS: u32 = 3;
const WORKER_MANAGER_INTERVAL: Duration = Duration::from_secs(5);
const VERIFICATION_POLL_INTERVAL: Duration = Duration::from_millis(100);
const VERIFYING_TRANSITION_DELAY: Duration = Duration::from_millis(200);

/// Per-destination progress/verification snapshot exposed to callers and
/// callbacks.
#[derive(Debug, Clone)]
pub struct DestinationStatus {
    pub total: usize,
    pub completed: usize,
    pub bytes_transferred: u64,
    pub bytes_total: u64,
    pub verified: usize,
    pub is_verifying: bool,
    pub failed: Vec<(PathBuf, String)>,
    pub current_speed: f64,
    pub average_speed: f64,
    /// `current_speed` rendered as the spec's fixed `%.1f MB/s` string.
    pub current_speed_label: String,
    /// Estimated time to completion, rendered via `throughput::format_duration`.
    /// `None` once nothing remains to copy, or before any throughput data exists.
    pub eta: Option<String>,
}

impl DestinationStatus {
    pub fn is_complete(&self) -> bool {
        (self.verified + self.failed.len()) >= self.total && !self.is_verifying
    }
}

pub type ProgressCallback = Arc<dyn Fn(DestinationStatus) + Send + Sync>;
pub type VerifyCallback = Arc<dyn Fn(usize, usize) + Send + Sync>; // (verified, total)

pub struct DestinationConfig {
    pub destination_root: PathBuf,
    pub organization_folder: Option<String>,
    pub min_workers: usize,
    pub max_workers: usize,
    pub initial_workers: usize,
    pub max_resident_memory_mb: u64,
}

/// Identity used to stamp events this queue emits; the destination name is
/// the label a coordinator knows it by, not a filesystem concept.
#[derive(Clone)]
struct EventContext {
    sink: Arc<dyn EventSink>,
    session_id: Uuid,
    destination_name: String,
}

impl EventContext {
    fn emit(&self, event_type: EventType, severity: Severity, build: impl FnOnce(&mut Event)) {
        let mut event = Event::new(self.session_id, event_type, severity);
        event
            .metadata
            .insert("destination".to_string(), self.destination_name.clone());
        build(&mut event);
        self.sink.emit(event);
    }
}

#[derive(Debug)]
enum ReportedOutcome {
    Success { bytes: u64 },
    Skipped { reason: String },
    Failed { reason: String },
    Cancelled,
}

#[derive(Debug)]
enum VerifyResult {
    Match,
    Mismatch(String),
    Missing(String),
    Error(String),
}

enum OwnerMessage {
    AddTasks(Vec<FileManifestEntry>),
    Dequeue {
        reply: oneshot::Sender<Option<Task>>,
    },
    ReportOutcome {
        task: Task,
        outcome: ReportedOutcome,
    },
    SetVerifying(bool),
    VerifyReport {
        relative_path: PathBuf,
        result: VerifyResult,
    },
    GetStatus {
        reply: oneshot::Sender<DestinationStatus>,
    },
    SetProgressCallback(Option<ProgressCallback>),
    SetVerifyCallback(Option<VerifyCallback>),
    WorkerSpawned,
    WorkerExited,
    ManagerSnapshot {
        reply: oneshot::Sender<(usize, WorkerRecommendation)>,
    },
}

struct OwnerState {
    queue: PriorityQueue,
    total: usize,
    completed: usize,
    bytes_transferred: u64,
    bytes_total: u64,
    verified: usize,
    is_verifying: bool,
    failed: Vec<(PathBuf, String)>,
    monitor: ThroughputMonitor,
    progress_callback: Option<ProgressCallback>,
    verify_callback: Option<VerifyCallback>,
    last_progress_emit: std::time::Instant,
    worker_count: usize,
    destination_root: PathBuf,
    organization_folder: Option<String>,
    events: EventContext,
}

impl OwnerState {
    fn status(&self) -> DestinationStatus {
        let current_speed = self.monitor.current_speed();
        let bytes_remaining = self.bytes_total.saturating_sub(self.bytes_transferred);
        let eta = self
            .monitor
            .eta_seconds(bytes_remaining)
            .map(|seconds| throughput::format_duration(seconds.round() as u64));

        DestinationStatus {
            total: self.total,
            completed: self.completed,
            bytes_transferred: self.bytes_transferred,
            bytes_total: self.bytes_total,
            verified: self.verified,
            is_verifying: self.is_verifying,
            failed: self.failed.clone(),
            current_speed,
            average_speed: self.monitor.average_speed(),
            current_speed_label: throughput::format_speed(current_speed),
            eta,
        }
    }

    fn maybe_emit_progress(&mut self, force: bool) {
        let Some(cb) = self.progress_callback.clone() else {
            return;
        };
        let now = std::time::Instant::now();
        if !force && now.duration_since(self.last_progress_emit) < PROGRESS_THROTTLE {
            return;
        }
        self.last_progress_emit = now;
        cb(self.status());
    }
}

async fn run_owner(mut state: OwnerState, mut rx: mpsc::Receiver<OwnerMessage>) {
    while let Some(message) = rx.recv().await {
        match message {
            OwnerMessage::AddTasks(entries) => {
                state.queue.enqueue_multiple(&entries);
            }
            OwnerMessage::Dequeue { reply } => {
                let task = state.queue.dequeue();
                let _ = reply.send(task);
            }
            OwnerMessage::ReportOutcome { task, outcome } => {
                let dest_path =
                    destination_path_for_parts(&state.destination_root, &state.organization_folder, &task.relative_path);
                match outcome {
                    ReportedOutcome::Success { bytes } => {
                        state.completed += 1;
                        state.bytes_transferred += bytes;
                        state.monitor.record(bytes);
                        state.events.emit(EventType::Copy, Severity::Info, |e| {
                            e.source_path = Some(task.source_path.display().to_string());
                            e.destination_path = Some(dest_path.display().to_string());
                            e.file_size = Some(bytes);
                            e.checksum = Some(task.checksum.clone());
                        });
                    }
                    ReportedOutcome::Skipped { reason } => {
                        state.completed += 1;
                        info!(relative_path = %task.relative_path.display(), %reason, "skipped");
                        state.events.emit(EventType::Skip, Severity::Info, |e| {
                            e.source_path = Some(task.source_path.display().to_string());
                            e.destination_path = Some(dest_path.display().to_string());
                            e.error = Some(reason);
                        });
                    }
                    ReportedOutcome::Failed { reason } => {
                        if task.attempt_count < MAX_ATTEMPTS {
                            state.queue.enqueue_retry(task);
                        } else {
                            state.events.emit(EventType::CopyError, Severity::Error, |e| {
                                e.source_path = Some(task.source_path.display().to_string());
                                e.destination_path = Some(dest_path.display().to_string());
                                e.error = Some(reason.clone());
                            });
                            state.failed.push((task.relative_path.clone(), reason));
                            state.completed += 1;
                        }
                    }
                    ReportedOutcome::Cancelled => {
                        state.queue.enqueue(task);
                    }
                }
                let force = state.completed >= state.total;
                state.maybe_emit_progress(force);
            }
            OwnerMessage::SetVerifying(flag) => {
                state.is_verifying = flag;
                state.maybe_emit_progress(true);
            }
            OwnerMessage::VerifyReport {
                relative_path,
                result,
            } => {
                match result {
                    VerifyResult::Match => {
                        state.verified += 1;
                        state.events.emit(EventType::Verify, Severity::Info, |e| {
                            e.destination_path = Some(
                                destination_path_for_parts(
                                    &state.destination_root,
                                    &state.organization_folder,
                                    &relative_path,
                                )
                                .display()
                                .to_string(),
                            );
                        });
                    }
                    VerifyResult::Mismatch(reason)
                    | VerifyResult::Missing(reason)
                    | VerifyResult::Error(reason) => {
                        state.events.emit(EventType::VerifyMismatch, Severity::Error, |e| {
                            e.destination_path = Some(
                                destination_path_for_parts(
                                    &state.destination_root,
                                    &state.organization_folder,
                                    &relative_path,
                                )
                                .display()
                                .to_string(),
                            );
                            e.error = Some(reason.clone());
                        });
                        state.failed.push((relative_path, reason));
                    }
                }
                if let Some(cb) = state.verify_callback.clone() {
                    cb(state.verified, state.total);
                }
            }
            OwnerMessage::GetStatus { reply } => {
                let _ = reply.send(state.status());
            }
            OwnerMessage::SetProgressCallback(cb) => state.progress_callback = cb,
            OwnerMessage::SetVerifyCallback(cb) => state.verify_callback = cb,
            OwnerMessage::WorkerSpawned => state.worker_count += 1,
            OwnerMessage::WorkerExited => {
                state.worker_count = state.worker_count.saturating_sub(1);
            }
            OwnerMessage::ManagerSnapshot { reply } => {
                let recommendation = state.monitor.worker_recommendation();
                let _ = reply.send((state.worker_count, recommendation));
            }
        }
    }
}

fn destination_path_for(
    config: &DestinationConfig,
    relative_path: &std::path::Path,
) -> PathBuf {
    destination_path_for_parts(&config.destination_root, &config.organization_folder, relative_path)
}

fn destination_path_for_parts(
    destination_root: &std::path::Path,
    organization_folder: &Option<String>,
    relative_path: &std::path::Path,
) -> PathBuf {
    match organization_folder {
        Some(folder) => destination_root.join(folder).join(relative_path),
        None => destination_root.join(relative_path),
    }
}

async fn worker_loop(
    sender: mpsc::Sender<OwnerMessage>,
    processor: Arc<BatchProcessor>,
    destination_root: PathBuf,
    organization_folder: Option<String>,
    cancel: CancellationToken,
) {
    let _ = sender.send(OwnerMessage::WorkerSpawned).await;
    worker_loop_body(&sender, processor, destination_root, organization_folder, &cancel).await;
    let _ = sender.send(OwnerMessage::WorkerExited).await;
}

async fn worker_loop_body(
    sender: &mpsc::Sender<OwnerMessage>,
    processor: Arc<BatchProcessor>,
    destination_root: PathBuf,
    organization_folder: Option<String>,
    cancel: &CancellationToken,
) {
    let config = DestinationConfig {
        destination_root,
        organization_folder,
        min_workers: 0,
        max_workers: 0,
        initial_workers: 0,
        max_resident_memory_mb: 0,
    };

    loop {
        if cancel.is_cancelled() {
            return;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        if sender
            .send(OwnerMessage::Dequeue { reply: reply_tx })
            .await
            .is_err()
        {
            return;
        }
        let Ok(maybe_task) = reply_rx.await else {
            return;
        };
        let Some(task) = maybe_task else {
            return;
        };

        if cancel.is_cancelled() {
            let _ = sender
                .send(OwnerMessage::ReportOutcome {
                    task,
                    outcome: ReportedOutcome::Cancelled,
                })
                .await;
            return;
        }

        let dest_path = destination_path_for(&config, &task.relative_path);
        let outcome = process_task(&processor, &task, &dest_path, cancel).await;
        let is_cancelled_outcome = matches!(outcome, ReportedOutcome::Cancelled);

        if sender
            .send(OwnerMessage::ReportOutcome { task, outcome })
            .await
            .is_err()
        {
            return;
        }

        if is_cancelled_outcome {
            return;
        }
    }
}

async fn process_task(
    processor: &BatchProcessor,
    task: &Task,
    dest_path: &std::path::Path,
    cancel: &CancellationToken,
) -> ReportedOutcome {
    if cancel.is_cancelled() {
        return ReportedOutcome::Cancelled;
    }

    if let Ok(metadata) = tokio::fs::metadata(dest_path).await {
        if metadata.len() == task.size {
            let existing_path = dest_path.to_path_buf();
            let existing_cancel = cancel.clone();
            let digest = tokio::task::spawn_blocking(move || {
                crate::checksum::checksum_file(
                    &existing_path,
                    &existing_cancel,
                    None,
                    crate::checksum::ChecksumHints::default(),
                )
            })
            .await;

            match digest {
                Ok(Ok(checksum)) if checksum == task.checksum => {
                    return ReportedOutcome::Skipped {
                        reason: "already exists with matching checksum".to_string(),
                    };
                }
                Ok(Err(BackupError::Cancelled)) => return ReportedOutcome::Cancelled,
                _ => {
                    if let Err(e) = tokio::fs::remove_file(dest_path).await {
                        return ReportedOutcome::Failed {
                            reason: format!("failed to remove mismatched destination: {e}"),
                        };
                    }
                }
            }
        }
    }

    match processor
        .copy_file(&task.source_path, dest_path, cancel)
        .await
    {
        Ok(bytes) => ReportedOutcome::Success { bytes },
        Err(BackupError::Cancelled) => ReportedOutcome::Cancelled,
        Err(e) => ReportedOutcome::Failed {
            reason: e.to_string(),
        },
    }
}

fn current_rss_mb() -> u64 {
    let mut system = System::new();
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0;
    };
    system.refresh_process(pid);
    system
        .process(pid)
        .map(|p| p.memory() / (1024 * 1024))
        .unwrap_or(0)
}

async fn worker_count_manager(
    sender: mpsc::Sender<OwnerMessage>,
    spawn_worker: Arc<dyn Fn() + Send + Sync>,
    min_workers: usize,
    max_workers: usize,
    max_resident_memory_mb: u64,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(WORKER_MANAGER_INTERVAL) => {}
        }

        if current_rss_mb() > max_resident_memory_mb {
            warn!("memory governor: RSS above threshold, skipping worker growth this round");
            continue;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        if sender
            .send(OwnerMessage::ManagerSnapshot { reply: reply_tx })
            .await
            .is_err()
        {
            return;
        }
        let Ok((current, recommendation)) = reply_rx.await else {
            return;
        };

        // Growth is the only pre-emptive action the manager takes; a
        // Shrink recommendation is left to natural drain (§9) — workers
        // simply stop getting new tasks once the queue empties.
        let _ = min_workers;
        if recommendation == WorkerRecommendation::Grow && current < max_workers {
            spawn_worker();
        }
    }
}

async fn verification_driver(
    sender: mpsc::Sender<OwnerMessage>,
    destination_root: PathBuf,
    organization_folder: Option<String>,
    entries: Vec<FileManifestEntry>,
    cancel: CancellationToken,
) {
    let config = DestinationConfig {
        destination_root,
        organization_folder,
        min_workers: 0,
        max_workers: 0,
        initial_workers: 0,
        max_resident_memory_mb: 0,
    };

    loop {
        if cancel.is_cancelled() {
            return;
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        if sender
            .send(OwnerMessage::GetStatus { reply: reply_tx })
            .await
            .is_err()
        {
            return;
        }
        let Ok(status) = reply_rx.await else { return };
        if status.completed >= status.total {
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(VERIFICATION_POLL_INTERVAL) => {}
        }
    }

    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(VERIFYING_TRANSITION_DELAY) => {}
    }
    if sender
        .send(OwnerMessage::SetVerifying(true))
        .await
        .is_err()
    {
        return;
    }

    for entry in &entries {
        if cancel.is_cancelled() {
            break;
        }

        let dest_path = destination_path_for(&config, &entry.relative_path);
        if !dest_path.is_file() {
            let _ = sender
                .send(OwnerMessage::VerifyReport {
                    relative_path: entry.relative_path.clone(),
                    result: VerifyResult::Missing("File missing after copy".to_string()),
                })
                .await;
            continue;
        }

        let path_for_checksum = dest_path.clone();
        let checksum_cancel = cancel.clone();
        let digest = tokio::task::spawn_blocking(move || {
            crate::checksum::checksum_file(
                &path_for_checksum,
                &checksum_cancel,
                None,
                crate::checksum::ChecksumHints::default(),
            )
        })
        .await;

        let result = match digest {
            Ok(Ok(checksum)) if checksum == entry.checksum => VerifyResult::Match,
            Ok(Ok(_)) => VerifyResult::Mismatch("Checksum mismatch".to_string()),
            Ok(Err(BackupError::Cancelled)) => break,
            Ok(Err(e)) => VerifyResult::Error(e.to_string()),
            Err(_) => VerifyResult::Error("verification task panicked".to_string()),
        };

        let _ = sender
            .send(OwnerMessage::VerifyReport {
                relative_path: entry.relative_path.clone(),
                result,
            })
            .await;
    }

    let _ = sender
        .send(OwnerMessage::SetVerifying(false))
        .await;
}

/// The per-destination actor handle. Construction spawns no background
/// tasks; call `start()` to begin processing.
pub struct DestinationQueue {
    sender: mpsc::Sender<OwnerMessage>,
    cancel: CancellationToken,
    entries: Vec<FileManifestEntry>,
    processor: Arc<BatchProcessor>,
    config: Arc<DestinationConfig>,
    owner_handle: AsyncMutex<Option<JoinHandle<()>>>,
    background_handles: AsyncMutex<Vec<JoinHandle<()>>>,
    worker_handles: AsyncMutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl DestinationQueue {
    pub fn new(
        entries: Vec<FileManifestEntry>,
        config: DestinationConfig,
        processor: Arc<BatchProcessor>,
        parent_cancel: &CancellationToken,
        event_sink: Arc<dyn EventSink>,
        session_id: Uuid,
        destination_name: impl Into<String>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(256);
        let bytes_total = entries.iter().map(|e| e.size).sum();
        let total = entries.len();

        let state = OwnerState {
            queue: PriorityQueue::new(),
            total,
            completed: 0,
            bytes_transferred: 0,
            bytes_total,
            verified: 0,
            is_verifying: false,
            failed: Vec::new(),
            monitor: ThroughputMonitor::new(),
            progress_callback: None,
            verify_callback: None,
            last_progress_emit: std::time::Instant::now(),
            worker_count: 0,
            destination_root: config.destination_root.clone(),
            organization_folder: config.organization_folder.clone(),
            events: EventContext {
                sink: event_sink,
                session_id,
                destination_name: destination_name.into(),
            },
        };

        let owner_handle = tokio::spawn(run_owner(state, rx));
        let cancel = parent_cancel.child_token();

        Arc::new(Self {
            sender: tx,
            cancel,
            entries,
            processor,
            config: Arc::new(config),
            owner_handle: AsyncMutex::new(Some(owner_handle)),
            background_handles: AsyncMutex::new(Vec::new()),
            worker_handles: AsyncMutex::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }

    pub fn set_progress_callback(&self, cb: Option<ProgressCallback>) {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let _ = sender.send(OwnerMessage::SetProgressCallback(cb)).await;
        });
    }

    pub fn set_verify_callback(&self, cb: Option<VerifyCallback>) {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let _ = sender.send(OwnerMessage::SetVerifyCallback(cb)).await;
        });
    }

    /// Enqueue every entry and begin processing with `initial_workers`
    /// workers, plus the worker-count manager and verification driver.
    pub async fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let _ = self
            .sender
            .send(OwnerMessage::AddTasks(self.entries.clone()))
            .await;

        let mut workers = self.worker_handles.lock().await;
        for _ in 0..self.config.initial_workers {
            workers.push(self.spawn_worker());
        }
        drop(workers);

        let spawn_ref = self.clone();
        let spawn_worker: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
            let spawn_ref = spawn_ref.clone();
            tokio::spawn(async move {
                let handle = spawn_ref.spawn_worker();
                spawn_ref.worker_handles.lock().await.push(handle);
            });
        });

        let manager_handle = tokio::spawn(worker_count_manager(
            self.sender.clone(),
            spawn_worker,
            self.config.min_workers,
            self.config.max_workers,
            self.config.max_resident_memory_mb,
            self.cancel.clone(),
        ));

        let verify_handle = tokio::spawn(verification_driver(
            self.sender.clone(),
            self.config.destination_root.clone(),
            self.config.organization_folder.clone(),
            self.entries.clone(),
            self.cancel.clone(),
        ));

        let mut background = self.background_handles.lock().await;
        background.push(manager_handle);
        background.push(verify_handle);
    }

    fn spawn_worker(&self) -> JoinHandle<()> {
        tokio::spawn(worker_loop(
            self.sender.clone(),
            self.processor.clone(),
            self.config.destination_root.clone(),
            self.config.organization_folder.clone(),
            self.cancel.clone(),
        ))
    }

    fn fallback_status(&self) -> DestinationStatus {
        DestinationStatus {
            total: self.entries.len(),
            completed: 0,
            bytes_transferred: 0,
            bytes_total: 0,
            verified: 0,
            is_verifying: false,
            failed: Vec::new(),
            current_speed: 0.0,
            average_speed: 0.0,
            current_speed_label: throughput::format_speed(0.0),
            eta: None,
        }
    }

    pub async fn status(&self) -> DestinationStatus {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .sender
            .send(OwnerMessage::GetStatus { reply: reply_tx })
            .await
            .is_err()
        {
            return self.fallback_status();
        }
        reply_rx.await.unwrap_or_else(|_| self.fallback_status())
    }

    pub async fn is_complete(&self) -> bool {
        self.status().await.is_complete()
    }

    /// Raise the cancel flag, abort background helper tasks, clear
    /// callbacks, and return promptly. Workers observe cancellation at their
    /// next loop boundary or the next checksum chunk boundary.
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.set_progress_callback(None);
        self.set_verify_callback(None);

        let mut background = self.background_handles.lock().await;
        for handle in background.drain(..) {
            handle.abort();
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

    #[tokio::test]
    async fn copies_a_single_small_file_and_verifies() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let src_path = src_dir.path().join("a.nef");
        fs::write(&src_path, b"hello world").unwrap();

        let cancel = CancellationToken::new();
        let engine_config = EngineConfig::default();
        let processor = Arc::new(BatchProcessor::new(&engine_config));

        let checksum = crate::checksum::checksum_file(
            &src_path,
            &cancel,
            None,
            crate::checksum::ChecksumHints::default(),
        )
        .unwrap();

        let entries = vec![entry("a.nef", src_path.clone(), 11, &checksum)];
        let config = DestinationConfig {
            destination_root: dst_dir.path().to_path_buf(),
            organization_folder: None,
            min_workers: 1,
            max_workers: 2,
            initial_workers: 1,
            max_resident_memory_mb: 750,
        };

        let queue = DestinationQueue::new(
            entries,
            config,
            processor,
            &cancel,
            Arc::new(crate::events::NoopSink),
            Uuid::new_v4(),
            "dest-1",
        );
        queue.start().await;

        for _ in 0..200 {
            if queue.is_complete().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let status = queue.status().await;
        assert_eq!(status.verified, 1);
        assert!(status.failed.is_empty());
        assert!(dst_dir.path().join("a.nef").is_file());

        queue.stop().await;
    }
}
