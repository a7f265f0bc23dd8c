//! Throughput monitoring: current/average speed, ETA, and worker-count
//! recommendations for a single destination queue.
//!
//! The formatting helpers follow the teacher's `transfer::progress` style
//! (`format_bytes`/`format_speed`/`format_duration`), just generalized to
//! live alongside the ring-buffer sampler rather than a single-file tracker.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const MAX_SAMPLES: usize = 30;
const CURRENT_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    bytes: u64,
}

/// Whether the worker-count manager should grow, shrink, or hold the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerRecommendation {
    Grow,
    Shrink,
    Hold,
}

pub struct ThroughputMonitor {
    started_at: Instant,
    total_bytes: u64,
    samples: VecDeque<Sample>,
}

impl ThroughputMonitor {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_bytes: 0,
            samples: VecDeque::with_capacity(MAX_SAMPLES),
        }
    }

    /// Reset the start time to now, for monitors constructed ahead of the
    /// first byte actually moving.
    pub fn start(&mut self) {
        self.started_at = Instant::now();
        self.total_bytes = 0;
        self.samples.clear();
    }

    /// Record that `bytes` more were transferred, at the current time.
    pub fn record(&mut self, bytes: u64) {
        self.total_bytes += bytes;
        if self.samples.len() >= MAX_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample {
            at: Instant::now(),
            bytes,
        });
    }

    /// Bytes per second over the last 5 seconds of recorded samples.
    pub fn current_speed(&self) -> f64 {
        let now = Instant::now();
        let window_bytes: u64 = self
            .samples
            .iter()
            .filter(|s| now.duration_since(s.at) <= CURRENT_WINDOW)
            .map(|s| s.bytes)
            .sum();
        window_bytes as f64 / CURRENT_WINDOW.as_secs_f64()
    }

    /// Bytes per second averaged over the whole run.
    pub fn average_speed(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.total_bytes as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Estimated seconds remaining, or `None` if average speed is zero.
    pub fn eta_seconds(&self, bytes_remaining: u64) -> Option<f64> {
        let avg = self.average_speed();
        if avg > 0.0 {
            Some(bytes_remaining as f64 / avg)
        } else {
            None
        }
    }

    /// Recommend growing, shrinking, or holding the worker pool, based on
    /// how current speed compares to the run's average.
    pub fn worker_recommendation(&self) -> WorkerRecommendation {
        let avg = self.average_speed();
        if avg <= 0.0 {
            return WorkerRecommendation::Hold;
        }
        let ratio = self.current_speed() / avg;
        if ratio > 1.2 {
            WorkerRecommendation::Grow
        } else if ratio < 0.8 {
            WorkerRecommendation::Shrink
        } else {
            WorkerRecommendation::Hold
        }
    }
}

impl Default for ThroughputMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Format bytes as a human-readable string, e.g. "1.00 MB".
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format a speed in bytes/second as a fixed `%.1f MB/s` string — the unit
/// never adapts, per spec.
pub fn format_speed(bytes_per_second: f64) -> String {
    format!("{:.1} MB/s", bytes_per_second / (1024.0 * 1024.0))
}

pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
