//! One URL in the archive, as read from a decompressed index-file line.

use serde::{Deserialize, Serialize};
use serde_aux::prelude::deserialize_number_from_string;

use crate::error::CoreError;

/// The raw JSON metadata object that follows the SURT and timestamp on
/// each index line. Field names match the archive's own JSON, which is
/// why some are string-typed numbers (generalizes the teacher's
/// `CdxMetadata`, adding the fields spec §3's `IndexEntry` needs:
/// `mime` and a `warc_file`/`offset`/`length` consistent with the rest
/// of the model).
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RawMetadata {
    pub url: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub status: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub length: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub offset: usize,
    pub filename: String,
    #[serde(default, rename = "mime")]
    pub mime: Option<String>,
    pub languages: Option<String>,
}

/// One URL in the archive: `{surt, timestamp, url, index_file,
/// warc_file, offset, length, status, mime}` (spec §3). `index_file` is
/// the owning shard's basename with its extension stripped (`op.
/// splitext(index_file)[0]` in `remove_boilerplate.py`), the value
/// written out as the corpus record's `index="…"` attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub surt: String,
    pub timestamp: String,
    pub url: String,
    pub index_file: String,
    pub warc_file: String,
    pub offset: usize,
    pub length: usize,
    pub status: usize,
    pub mime: Option<String>,
    pub languages: Option<String>,
}

impl IndexEntry {
    /// Parses one decompressed index line: `surt timestamp json`
    /// (space-separated, JSON last), per spec §6. `index_file` is the
    /// basename (extension stripped) of the shard this line was read
    /// from, stamped onto every entry the shard yields.
    pub fn parse_line(line: &str, index_file: &str) -> Result<IndexEntry, CoreError> {
        let mut parts = line.splitn(3, ' ');
        let surt = parts
            .next()
            .ok_or_else(|| CoreError::Usage("empty index line".to_string()))?
            .to_string();
        let timestamp = parts
            .next()
            .ok_or_else(|| CoreError::Usage(format!("missing timestamp in line: {line}")))?
            .to_string();
        let json_str = parts
            .next()
            .ok_or_else(|| CoreError::Usage(format!("missing JSON in line: {line}")))?;
        let meta: RawMetadata = serde_json::from_str(json_str)
            .map_err(|e| CoreError::Usage(format!("malformed index JSON: {e}")))?;

        Ok(IndexEntry {
            surt,
            timestamp,
            url: meta.url,
            index_file: index_file.to_string(),
            warc_file: meta.filename,
            offset: meta.offset,
            length: meta.length,
            status: meta.status,
            mime: meta.mime,
            languages: meta.languages,
        })
    }
}

/// `op.splitext(path)[0]`: the basename with its last extension, if
/// any, removed.
pub fn splitext_stem(path: &str) -> String {
    std::path::Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_line() {
        let line = r#"hu,elte)/ 20240722120756 {"url":"http://elte.hu/","mime":"text/html","status":"200","length":"689","offset":"3499","filename":"crawl.warc.gz","languages":"eng"}"#;
        let entry = IndexEntry::parse_line(line, "cdx-00000").unwrap();
        assert_eq!(entry.surt, "hu,elte)/");
        assert_eq!(entry.timestamp, "20240722120756");
        assert_eq!(entry.url, "http://elte.hu/");
        assert_eq!(entry.status, 200);
        assert_eq!(entry.length, 689);
        assert_eq!(entry.offset, 3499);
        assert_eq!(entry.warc_file, "crawl.warc.gz");
        assert_eq!(entry.mime.as_deref(), Some("text/html"));
        assert_eq!(entry.index_file, "cdx-00000");
    }

    #[test]
    fn rejects_a_line_missing_json() {
        assert!(IndexEntry::parse_line("hu,elte)/ 20240722120756", "cdx-00000").is_err());
    }

    #[test]
    fn splitext_stem_strips_last_extension_only() {
        assert_eq!(splitext_stem("cdx-00000.gz"), "cdx-00000");
        assert_eq!(splitext_stem("cluster.idx"), "cluster");
        assert_eq!(splitext_stem("no_extension"), "no_extension");
    }
}
