//! Component D (RecordPairer): joins a stream of downloaded WARC
//! records with the index entries that drove their download, in index
//! order (spec §4.D).
//!
//! A single forward pass: the index stream is the driver, the record
//! stream is advanced until a matching URL turns up. Matching happens
//! on percent-decoded URLs (spec §9's open question, resolved in favor
//! of decoded comparison) because archive records and index entries
//! don't always agree on encoding.

use percent_encoding::percent_decode_str;

use crate::error::CoreError;
use crate::index::IndexEntry;

/// A downloaded WARC response record, reduced to what pairing needs:
/// its target URL, the WARC record's own header fields (serialized,
/// becomes `Document.meta["request"]` per spec §3/§6 — the original
/// `cc_corpus` project's "request" section is actually the enclosing
/// WARC record header, not an HTTP request), and the raw HTTP
/// header+payload bytes, still undivided (component E does that split).
pub struct RawRecord {
    pub target_uri: String,
    pub warc_header: String,
    pub bytes: Vec<u8>,
}

fn decoded(url: &str) -> String {
    percent_decode_str(url).decode_utf8_lossy().into_owned()
}

/// Pairs `entries` (the driver) against `records`, advancing the record
/// stream until each entry's URL is found. After three consecutive
/// mismatches the shard is considered unrecoverable and
/// [`CoreError::PairingFailed`] is returned.
pub fn pair_records(
    shard_name: &str,
    entries: &[IndexEntry],
    records: Vec<RawRecord>,
) -> Result<Vec<(IndexEntry, RawRecord)>, CoreError> {
    let mut records = records.into_iter().peekable();
    let mut pairs = Vec::with_capacity(entries.len());
    let mut mismatches = 0usize;

    for entry in entries {
        let wanted = decoded(&entry.url);
        let mut found = None;

        // Advance through the record stream looking for a match; records
        // that don't match any entry (out-of-order or orphaned) are
        // simply skipped, per spec §4.D.
        while let Some(record) = records.peek() {
            if decoded(&record.target_uri) == wanted {
                found = records.next();
                break;
            }
            records.next();
        }

        match found {
            Some(record) => {
                mismatches = 0;
                pairs.push((entry.clone(), record));
            }
            None => {
                mismatches += 1;
                if mismatches > 3 {
                    return Err(CoreError::PairingFailed {
                        shard: shard_name.to_string(),
                        mismatches,
                    });
                }
            }
        }
    }

    Ok(pairs)
}
