//! Priority queue for per-destination task scheduling.
//!
//! Score favors high-priority, small, old, rarely-retried tasks, but the
//! score is recomputed at dequeue time from wall-clock age rather than
//! cached, so a task enqueued long ago keeps rising in priority even while
//! the queue sits idle.

use crate::manifest::FileManifestEntry;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Normal,
    High,
    /// Part of the data model's ordered priority scale; no current
    /// assignment rule produces this, but the type itself is spec.
    Critical,
}

impl Priority {
    fn rank(self) -> u32 {
        match self {
            Priority::Low => 1,
            Priority::Normal => 2,
            Priority::High => 3,
            Priority::Critical => 4,
        }
    }

    /// Priority assignment by file size (§4.8).
    pub fn for_size(size: u64) -> Priority {
        const KB: u64 = 1024;
        const MB: u64 = 1024 * 1024;
        if size < 100 * KB {
            Priority::High
        } else if size < 10 * MB {
            Priority::High
        } else if size < 100 * MB {
            Priority::Normal
        } else {
            Priority::Low
        }
    }
}

/// A manifest entry in execution form: priority and attempt state, plus the
/// bookkeeping needed to recompute its score over time.
#[derive(Debug, Clone)]
pub struct Task {
    pub relative_path: PathBuf,
    pub source_path: PathBuf,
    pub size: u64,
    pub checksum: String,
    pub priority: Priority,
    pub attempt_count: u32,
    enqueued_at: Instant,
    sequence: u64,
}

impl Task {
    pub fn from_entry(entry: &FileManifestEntry, sequence: u64) -> Self {
        Self {
            relative_path: entry.relative_path.clone(),
            source_path: entry.source_path.clone(),
            size: entry.size,
            checksum: entry.checksum.clone(),
            priority: Priority::for_size(entry.size),
            attempt_count: 0,
            enqueued_at: Instant::now(),
            sequence,
        }
    }

    fn score(&self, now: Instant) -> f64 {
        let age_seconds = now.duration_since(self.enqueued_at).as_secs_f64();
        let size_mb = (self.size as f64 / (1024.0 * 1024.0)).max(1.0);
        self.priority.rank() as f64 * 10000.0 + 1000.0 / size_mb + age_seconds
            - 500.0 * self.attempt_count as f64
    }
}

/// Ordered sequence of tasks retrieved in decreasing score, ties broken by
/// insertion order (earlier first).
pub struct PriorityQueue {
    tasks: Vec<Task>,
    next_sequence: AtomicU64,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            next_sequence: AtomicU64::new(0),
        }
    }

    fn next_sequence(&self) -> u64 {
        self.next_sequence.fetch_add(1, Ordering::Relaxed)
    }

    pub fn enqueue_entry(&mut self, entry: &FileManifestEntry) {
        let sequence = self.next_sequence();
        self.tasks.push(Task::from_entry(entry, sequence));
    }

    pub fn enqueue(&mut self, mut task: Task) {
        task.sequence = self.next_sequence();
        task.enqueued_at = Instant::now();
        self.tasks.push(task);
    }

    pub fn enqueue_multiple(&mut self, entries: &[FileManifestEntry]) {
        for entry in entries {
            self.enqueue_entry(entry);
        }
    }

    /// Re-enqueue a task after a failed attempt, bumping its attempt count
    /// and resetting its age so it re-enters the pool at the back of its
    /// priority band rather than jumping the queue on recency alone.
    pub fn enqueue_retry(&mut self, mut task: Task) {
        task.attempt_count += 1;
        task.sequence = self.next_sequence();
        task.enqueued_at = Instant::now();
        self.tasks.push(task);
    }

    /// Remove and return the highest-scoring task, if any.
    pub fn dequeue(&mut self) -> Option<Task> {
        if self.tasks.is_empty() {
            return None;
        }
        let now = Instant::now();
        let mut best_idx = 0;
        let mut best_score = self.tasks[0].score(now);
        let mut best_sequence = self.tasks[0].sequence;

        for (idx, task) in self.tasks.iter().enumerate().skip(1) {
            let score = task.score(now);
            if score > best_score || (score == best_score && task.sequence < best_sequence) {
                best_idx = idx;
                best_score = score;
                best_sequence = task.sequence;
            }
        }

        Some(self.tasks.remove(best_idx))
    }

    pub fn count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Snapshot of all tasks currently queued, for verification/inspection.
    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks.clone()
    }
}

impl Default for PriorityQueue {
    fn default() -> Self {
        Self::new()
    }
}
