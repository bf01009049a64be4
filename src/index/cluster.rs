//! The top-level index (`cluster.idx`): one line per cluster, pointing at
//! a byte range inside a compressed per-index ("cdx") file.

use crate::error::CoreError;

/// A 3,000-line section of a per-dump URL index (spec GLOSSARY).
///
/// Attributes per spec §3: a sort-key prefix (reversed-domain SURT
/// string), the archive-index-file name, and a byte offset/length pair
/// into that file. `timestamp` is carried along because the on-disk
/// format (spec §6) includes it as the second tab field, even though the
/// formal data model only calls out the four load-bearing attributes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cluster {
    pub surt: String,
    pub timestamp: String,
    pub file_name: String,
    pub offset: usize,
    pub length: usize,
}

impl Cluster {
    /// Parses one `cluster.idx` line: `surt timestamp index-file offset
    /// length [...]`, tab-separated. Trailing fields are ignored.
    pub fn from_line(line: &str) -> Result<Cluster, CoreError> {
        let mut fields = line.split('\t');
        let usage = "expected 'surt<TAB>timestamp<TAB>file<TAB>offset<TAB>length'";
        let surt = fields
            .next()
            .ok_or_else(|| CoreError::Usage(usage.to_string()))?
            .to_string();
        let timestamp = fields
            .next()
            .ok_or_else(|| CoreError::Usage(usage.to_string()))?
            .to_string();
        let file_name = fields
            .next()
            .ok_or_else(|| CoreError::Usage(usage.to_string()))?
            .to_string();
        let offset: usize = fields
            .next()
            .ok_or_else(|| CoreError::Usage(usage.to_string()))?
            .parse()
            .map_err(|_| CoreError::Usage(format!("bad offset in line: {line}")))?;
        let length: usize = fields
            .next()
            .ok_or_else(|| CoreError::Usage(usage.to_string()))?
            .parse()
            .map_err(|_| CoreError::Usage(format!("bad length in line: {line}")))?;

        Ok(Cluster {
            surt,
            timestamp,
            file_name,
            offset,
            length,
        })
    }

    /// The reversed-domain token list (the part of `surt` before the
    /// first `)`), e.g. `"hu,elte)/some/path"` -> `["hu", "elte"]`.
    pub fn domain_tokens(&self) -> Vec<&str> {
        let prefix = match self.surt.find(')') {
            Some(idx) => &self.surt[..idx],
            None => &self.surt[..],
        };
        prefix.split(',').collect()
    }
}

/// Enumerates the clusters (lines) in a `cluster.idx` file already read
/// into memory.
pub fn parse_cluster_idx(contents: &str) -> Vec<Cluster> {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|line| match Cluster::from_line(line) {
            Ok(c) => Some(c),
            Err(e) => {
                tracing::warn!("Skipping malformed cluster.idx line: {}", e);
                None
            }
        })
        .collect()
}
