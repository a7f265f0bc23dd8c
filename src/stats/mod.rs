//! Statistics aggregator: rolls up a finished backup into a single summary.
//!
//! The source-side totals (`total_processed`, per-file-type counts) are
//! counted once from the manifest, never once per destination — a
//! five-file manifest copied to three destinations still reports
//! `total_processed = 5`.

use crate::destination::DestinationStatus;
use crate::manifest::FileManifestEntry;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct FileTypeOutcome {
    pub successes: usize,
    pub success_bytes: u64,
    pub failures: usize,
    pub failure_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct PerDestinationStats {
    pub name: String,
    pub completed: usize,
    pub verified: usize,
    pub failed: usize,
    pub bytes_transferred: u64,
    pub average_speed: f64,
}

#[derive(Debug, Clone)]
pub struct BackupStatistics {
    pub total_processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes_processed: u64,
    pub duration: Duration,
    pub per_file_type: HashMap<String, FileTypeOutcome>,
    pub per_destination: Vec<PerDestinationStats>,
    pub excluded_cache_count: usize,
    pub excluded_hidden_count: usize,
}

impl BackupStatistics {
    /// `processed / (processed + failed) * 100`, defaulting to 100 when
    /// there is nothing to divide by.
    pub fn success_rate(&self) -> f64 {
        let denominator = self.total_processed + self.failed;
        if denominator == 0 {
            100.0
        } else {
            (self.total_processed as f64 / denominator as f64) * 100.0
        }
    }

    pub fn average_throughput_mb_s(&self) -> f64 {
        let seconds = self.duration.as_secs_f64();
        if seconds > 0.0 {
            (self.bytes_processed as f64 / (1024.0 * 1024.0)) / seconds
        } else {
            0.0
        }
    }
}

/// Build a `BackupStatistics` from a finished manifest and the final status
/// of each destination queue.
pub fn aggregate(
    entries: &[FileManifestEntry],
    destinations: &[(String, DestinationStatus)],
    duration: Duration,
    excluded_cache_count: usize,
    excluded_hidden_count: usize,
) -> BackupStatistics {
    let mut per_file_type: HashMap<String, FileTypeOutcome> = HashMap::new();
    let mut bytes_processed = 0u64;

    let failed_paths: std::collections::HashSet<_> = destinations
        .iter()
        .flat_map(|(_, status)| status.failed.iter().map(|(p, _)| p.clone()))
        .collect();

    for entry in entries {
        let outcome = per_file_type.entry(entry.file_type.clone()).or_default();
        if failed_paths.contains(&entry.relative_path) {
            outcome.failures += 1;
            outcome.failure_bytes += entry.size;
        } else {
            outcome.successes += 1;
            outcome.success_bytes += entry.size;
            bytes_processed += entry.size;
        }
    }

    let failed = entries
        .iter()
        .filter(|e| failed_paths.contains(&e.relative_path))
        .count();
    let total_processed = entries.len().saturating_sub(failed);

    let per_destination = destinations
        .iter()
        .map(|(name, status)| PerDestinationStats {
            name: name.clone(),
            completed: status.completed,
            verified: status.verified,
            failed: status.failed.len(),
            bytes_transferred: status.bytes_transferred,
            average_speed: status.average_speed,
        })
        .collect();

    BackupStatistics {
        total_processed,
        skipped: 0,
        failed,
        bytes_processed,
        duration,
        per_file_type,
        per_destination,
        excluded_cache_count,
        excluded_hidden_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn entry(relative_path: &str, size: u64, file_type: &str) -> FileManifestEntry {
        FileManifestEntry {
            source_path: PathBuf::from(relative_path),
            relative_path: PathBuf::from(relative_path),
            size,
            checksum: "deadbeef".to_string(),
            file_type: file_type.to_string(),
        }
    }

    fn status(total: usize, verified: usize, failed: Vec<(PathBuf, String)>) -> DestinationStatus {
        DestinationStatus {
            total,
            completed: total,
            bytes_transferred: 0,
            bytes_total: 0,
            verified,
            is_verifying: false,
            failed,
            current_speed: 0.0,
            average_speed: 10.0,
            current_speed_label: "0.0 MB/s".to_string(),
            eta: None,
        }
    }

    #[test]
    fn success_rate_defaults_to_100_with_no_data() {
        let stats = aggregate(&[], &[], Duration::from_secs(0), 0, 0);
        assert_eq!(stats.success_rate(), 100.0);
    }

    #[test]
    fn all_successes_yield_full_success_rate() {
        let entries = vec![entry("a.nef", 100, "raw"), entry("b.nef", 200, "raw")];
        let destinations = vec![("dest-1".to_string(), status(2, 2, vec![]))];
        let stats = aggregate(&entries, &destinations, Duration::from_secs(1), 0, 0);

        assert_eq!(stats.total_processed, 2);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.success_rate(), 100.0);
        assert_eq!(stats.bytes_processed, 300);
    }

    #[test]
    fn failures_reduce_success_rate_but_never_multiply_by_destination_count() {
        let entries = vec![entry("a.nef", 100, "raw"), entry("b.nef", 200, "raw")];
        let failed = vec![(PathBuf::from("a.nef"), "mismatch".to_string())];
        let destinations = vec![
            ("dest-1".to_string(), status(2, 1, failed.clone())),
            ("dest-2".to_string(), status(2, 1, failed)),
        ];
        let stats = aggregate(&entries, &destinations, Duration::from_secs(1), 0, 0);

        // a.nef failed at both destinations, but is still counted once on
        // the source side.
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total_processed, 1);
        assert_eq!(stats.per_destination.len(), 2);
    }

    #[test]
    fn per_file_type_breakdown_tracks_bytes() {
        let entries = vec![entry("a.nef", 100, "raw"), entry("b.jpeg", 50, "standard_image")];
        let stats = aggregate(&entries, &[], Duration::from_secs(1), 0, 0);

        let raw = &stats.per_file_type["raw"];
        assert_eq!(raw.successes, 1);
        assert_eq!(raw.success_bytes, 100);

        let images = &stats.per_file_type["standard_image"];
        assert_eq!(images.successes, 1);
        assert_eq!(images.success_bytes, 50);
    }

    #[test]
    fn average_throughput_is_zero_for_zero_duration() {
        let entries = vec![entry("a.nef", 100, "raw")];
        let stats = aggregate(&entries, &[], Duration::from_secs(0), 0, 0);
        assert_eq!(stats.average_throughput_mb_s(), 0.0);
    }
}
