//! Streaming SHA-256 checksum engine with adaptive chunking and cooperative
//! cancellation.
//!
//! Empty files short-circuit to a fixed sentinel rather than hashing zero
//! bytes, since an empty SHA-256 digest carries no useful identity for a
//! backup manifest entry.

use crate::utils::errors::{BackupError, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Expected checksum for a zero-length file, and the value a manifest entry
/// carries for such files instead of a real digest.
pub const EMPTY_FILE_SENTINEL: &str = "empty-file-0-bytes";

/// Files at or below this size may be read whole; larger files must stream.
const WHOLE_READ_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Choose a streaming chunk size based on file size (§4.1). A likely-remote
/// source gets a quarter-sized chunk: smaller reads keep a single slow
/// network call from blocking a worker for multiple seconds, at the cost of
/// more round trips.
fn chunk_size_for(file_size: u64, likely_remote: bool) -> usize {
    const MIB: u64 = 1024 * 1024;
    let base = match file_size {
        n if n <= 16 * MIB => 256 * 1024,
        n if n <= 128 * MIB => 1024 * 1024,
        n if n <= 512 * MIB => 2 * 1024 * 1024,
        _ => 4 * 1024 * 1024,
    };
    if likely_remote {
        (base / 4).max(64 * 1024)
    } else {
        base
    }
}

/// A bounded free-list of reusable chunk buffers, keyed loosely by the chunk
/// size the checksum engine wants. Buffers are dropped rather than grown past
/// capacity on return, per the borrow/return discipline used throughout the
/// engine.
pub struct BufferPool {
    capacity: usize,
    buffers: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            buffers: Mutex::new(Vec::with_capacity(capacity)),
        })
    }

    /// Borrow a buffer sized at least `len`, reusing a pooled one if available.
    pub fn take(&self, len: usize) -> Vec<u8> {
        let mut pool = self.buffers.lock().unwrap();
        match pool.pop() {
            Some(mut buf) if buf.capacity() >= len => {
                buf.clear();
                buf.resize(len, 0);
                buf
            }
            _ => vec![0u8; len],
        }
    }

    /// Return a buffer for reuse. Dropped silently if the pool is full.
    pub fn give(&self, buf: Vec<u8>) {
        let mut pool = self.buffers.lock().unwrap();
        if pool.len() < self.capacity {
            pool.push(buf);
        }
    }
}

/// Hints the caller can pass to the checksum engine about the file it is
/// about to hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChecksumHints {
    /// The source volume may be network-mounted; the engine still produces a
    /// true SHA-256 regardless, but may use this to bias buffer sizing.
    pub likely_remote: bool,
}

/// Compute the SHA-256 hex digest of `path`, streaming for large files and
/// checking `cancel` between chunks.
///
/// This is synchronous/blocking I/O by design — callers on an async runtime
/// should invoke it via `spawn_blocking`.
pub fn checksum_file(
    path: &Path,
    cancel: &CancellationToken,
    pool: Option<&BufferPool>,
    hints: ChecksumHints,
) -> Result<String> {
    let metadata = std::fs::metadata(path).map_err(|e| BackupError::io(path, e))?;
    let size = metadata.len();

    if size == 0 {
        return Ok(EMPTY_FILE_SENTINEL.to_string());
    }

    let mut file = std::fs::File::open(path).map_err(|e| BackupError::io(path, e))?;

    // A likely-remote source skips the whole-read fast path even for small
    // files: one big blocking read over a slow mount defeats the point of
    // checking `cancel` at all, so such files always stream in small chunks.
    if size <= WHOLE_READ_THRESHOLD && !hints.likely_remote {
        let mut buf = Vec::with_capacity(size as usize);
        file.read_to_end(&mut buf)
            .map_err(|e| BackupError::io(path, e))?;
        let mut hasher = Sha256::new();
        hasher.update(&buf);
        return Ok(hex::encode(hasher.finalize()));
    }

    let chunk_size = chunk_size_for(size, hints.likely_remote);
    let mut hasher = Sha256::new();
    let mut chunk = match pool {
        Some(pool) => pool.take(chunk_size),
        None => vec![0u8; chunk_size],
    };

    loop {
        if cancel.is_cancelled() {
            if let Some(pool) = pool {
                pool.give(chunk);
            }
            return Err(BackupError::Cancelled);
        }

        let read = file
            .read(&mut chunk)
            .map_err(|e| BackupError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&chunk[..read]);
    }

    if let Some(pool) = pool {
        pool.give(chunk);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// `hex` is a single-purpose dependency the teacher's crate does not carry;
/// rather than add it, encode manually the way the `sha2::Digest` output
/// (a fixed-size byte array) is trivially turned into lowercase hex.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        use std::fmt::Write;
        let bytes = bytes.as_ref();
        let mut out = String::with_capacity(bytes.len() * 2);
        for byte in bytes {
            write!(out, "{:02x}", byte).expect("writing to a String never fails");
        }
        out
    }
}
