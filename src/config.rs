//! Configuration for the backup engine.
//!
//! Loads from a TOML file with serde defaults; every field here can also be
//! constructed directly by an embedding application without touching disk.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Which file types a backup should include.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileTypeFilter {
    All,
    Raw,
    Photos,
    Videos,
    Custom(HashSet<String>),
}

impl Default for FileTypeFilter {
    fn default() -> Self {
        FileTypeFilter::All
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    pub filters: FilterConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Excludes cache subtrees listed by the classifier.
    #[serde(default = "default_true")]
    pub exclude_cache_files: bool,

    /// Skips entries whose final path component starts with `.` or matches
    /// `._*`, `.DS_Store`, `Thumbs.db`.
    #[serde(default = "default_true")]
    pub skip_hidden_files: bool,

    #[serde(default)]
    pub file_type_filter: FileTypeFilter,

    /// If set, every destination path is prefixed by this subfolder.
    #[serde(default)]
    pub organization_folder: Option<String>,

    /// Advisory only; the core never calls platform sleep APIs itself.
    #[serde(default)]
    pub prevent_sleep_during_backup: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            exclude_cache_files: true,
            skip_hidden_files: true,
            file_type_filter: FileTypeFilter::All,
            organization_folder: None,
            prevent_sleep_during_backup: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Tunables for the destination queue and batch processor (§4.6 / §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_initial_workers")]
    pub initial_workers: usize,
    #[serde(default = "default_max_resident_memory_mb")]
    pub max_resident_memory_mb: u64,
    #[serde(default = "default_manifest_batch_size")]
    pub manifest_batch_size: usize,
    #[serde(default = "default_checksum_batch_size")]
    pub checksum_batch_size: usize,
    #[serde(default = "default_path_cache_capacity")]
    pub path_cache_capacity: usize,
    #[serde(default = "default_buffer_pool_capacity")]
    pub buffer_pool_capacity: usize,
    #[serde(default = "default_buffer_size_bytes")]
    pub buffer_size_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_workers: default_min_workers(),
            max_workers: default_max_workers(),
            initial_workers: default_initial_workers(),
            max_resident_memory_mb: default_max_resident_memory_mb(),
            manifest_batch_size: default_manifest_batch_size(),
            checksum_batch_size: default_checksum_batch_size(),
            path_cache_capacity: default_path_cache_capacity(),
            buffer_pool_capacity: default_buffer_pool_capacity(),
            buffer_size_bytes: default_buffer_size_bytes(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_min_workers() -> usize {
    1
}

fn default_max_workers() -> usize {
    4
}

fn default_initial_workers() -> usize {
    2
}

fn default_max_resident_memory_mb() -> u64 {
    750
}

fn default_manifest_batch_size() -> usize {
    50
}

fn default_checksum_batch_size() -> usize {
    50
}

fn default_path_cache_capacity() -> usize {
    1000
}

fn default_buffer_pool_capacity() -> usize {
    4
}

fn default_buffer_size_bytes() -> usize {
    4 * 1024 * 1024
}

impl BackupConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BackupConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            filters: FilterConfig::default(),
            log: LogConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filters_match_spec() {
        let config = BackupConfig::default();
        assert!(config.filters.exclude_cache_files);
        assert!(config.filters.skip_hidden_files);
        assert_eq!(config.filters.file_type_filter, FileTypeFilter::All);
        assert!(config.filters.organization_folder.is_none());
    }

    #[test]
    fn default_engine_tunables_match_spec() {
        let engine = EngineConfig::default();
        assert_eq!(engine.min_workers, 1);
        assert_eq!(engine.max_workers, 4);
        assert_eq!(engine.initial_workers, 2);
        assert_eq!(engine.max_resident_memory_mb, 750);
    }

    #[test]
    fn parses_from_toml() {
        let toml_str = r#"
            [filters]
            exclude_cache_files = false
            organization_folder = "2024 Shoot"
        "#;
        let config: BackupConfig = toml::from_str(toml_str).unwrap();
        assert!(!config.filters.exclude_cache_files);
        assert!(config.filters.skip_hidden_files);
        assert_eq!(
            config.filters.organization_folder.as_deref(),
            Some("2024 Shoot")
        );
    }
}
