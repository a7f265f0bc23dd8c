//! Verified multi-destination backup execution engine for photographic
//! archives.
//!
//! Scans a source directory into a content-addressed manifest, then runs one
//! adaptive worker pool per destination to copy and verify every file by
//! SHA-256. This crate is a library: it has no UI, no bookmark/preference
//! persistence, no sleep-prevention, no notifications, and no event-log
//! persistence — those are an embedding application's job.

pub mod batch;
pub mod checksum;
pub mod classify;
pub mod config;
pub mod coordinator;
pub mod destination;
pub mod events;
pub mod fs;
pub mod manifest;
pub mod queue;
pub mod stats;
pub mod throughput;
pub mod utils;

pub use config::BackupConfig;
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;
