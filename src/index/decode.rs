//! Decompression of a downloaded index byte range.
//!
//! A range is a concatenation of independent zlib streams, one per
//! 3,000-line cluster (spec §4.A, §6). The decoder repeatedly
//! constructs a new inflater over whatever tail remains until nothing is
//! left, then yields the decompressed lines.

use std::io::Read;

use flate2::read::MultiGzDecoder;

use crate::error::CoreError;
use crate::index::entry::{splitext_stem, IndexEntry};

/// Decompresses a multi-stream-gzip index range into its constituent
/// `IndexEntry` lines. `flate2`'s `MultiGzDecoder` already loops over
/// concatenated gzip members internally, which is the Rust-idiomatic
/// equivalent of the teacher's own `GzDecoder::read_to_end` and of the
/// Python side's explicit `zlib.decompressobj` loop over
/// `dobj.unused_data` (S2). `index_file` is the shard this range was
/// fetched from, stamped onto every resulting entry's `index_file`
/// field.
pub fn decode_index_range(range: &[u8], index_file: &str) -> Result<Vec<IndexEntry>, CoreError> {
    let mut decoder = MultiGzDecoder::new(range);
    let mut buffer = Vec::new();
    decoder.read_to_end(&mut buffer).map_err(|e| CoreError::Corrupt {
        context: "index range".to_string(),
        source: e.into(),
    })?;

    let stem = splitext_stem(index_file);
    let text = String::from_utf8_lossy(&buffer);
    let mut entries = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match IndexEntry::parse_line(line, &stem) {
            Ok(entry) => entries.push(entry),
            Err(e) => tracing::warn!("Skipping malformed index line: {}", e),
        }
    }
    Ok(entries)
}

/// Decompresses a range into raw non-empty, trimmed lines without
/// parsing them as `IndexEntry`s. Useful for S2-style tests and for
/// `IndexDeduper`, which works on lines, not on parsed records.
pub fn decode_index_range_lines(range: &[u8]) -> Result<Vec<String>, CoreError> {
    let mut decoder = MultiGzDecoder::new(range);
    let mut buffer = Vec::new();
    decoder.read_to_end(&mut buffer).map_err(|e| CoreError::Corrupt {
        context: "index range".to_string(),
        source: e.into(),
    })?;
    let text = String::from_utf8_lossy(&buffer);
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}
