//! Typed error kinds for the core pipeline, mirroring the distinctions the
//! spec draws between transient, recoverable and fatal failures.
//!
//! Binaries still bottom out in `anyhow::Result` (as the teacher's `main`
//! functions do), but library code returns these so callers can match on
//! the kind instead of string-sniffing an opaque error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Timeouts, 5xx, TCP resets. Caller may retry.
    #[error("transient network error fetching {url}: {source}")]
    Transient {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    /// 404, or the server returned 200 to a ranged request. Not fatal: the
    /// caller maps this to a dropped record.
    #[error("range unavailable for {url} ({reason})")]
    Unavailable { url: String, reason: String },

    /// Decompression failure or a broken multipart response body.
    #[error("corrupt payload at {context}: {source}")]
    Corrupt {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    /// Malformed corpus file: unclosed/mismatched tags, bad escaping, etc.
    #[error("parse error in {file} at line {line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    /// A gap was found while coalescing clusters into a FileRange. Fatal
    /// for the run: the top-level index is corrupt or mismatched.
    #[error("range discontinuity in {file}: expected offset {expected}, found {found}")]
    RangeDiscontinuity {
        file: String,
        expected: usize,
        found: usize,
    },

    /// Too many consecutive URL mismatches while pairing records with
    /// their index entries. Fatal for the current shard only.
    #[error("pairing failed for shard {shard} after {mismatches} mismatches")]
    PairingFailed { shard: String, mismatches: usize },

    /// Usage/validation errors, fatal at start-up before any work begins.
    #[error("usage error: {0}")]
    Usage(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Maps a [`CoreError`] to the process exit codes from spec §6:
/// 0 success, 1 usage/validation, 2 unrecoverable I/O, 130 on signal.
pub fn exit_code_for(err: &CoreError) -> i32 {
    match err {
        CoreError::Usage(_) => 1,
        CoreError::RangeDiscontinuity { .. } | CoreError::Corrupt { .. } => 2,
        _ => 2,
    }
}
