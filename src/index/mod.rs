//! Component A (IndexResolver): turning URL patterns into the precise
//! set of archive byte ranges that need downloading.

pub mod cluster;
pub mod decode;
pub mod entry;
pub mod pattern;
pub mod resolver;

pub use cluster::{parse_cluster_idx, Cluster};
pub use decode::{decode_index_range, decode_index_range_lines};
pub use entry::{splitext_stem, IndexEntry, RawMetadata};
pub use pattern::compare_inverse_surt_lists;
pub use resolver::{
    collect_clusters_from_index, find_pattern_in_index, ranges_from_clusters, resolve_patterns,
    FileRange,
};

/// Parses a dotted/slash URL pattern (e.g. a TLD like `"hu"`, or a
/// hostname like `"elte.hu"`) into the reversed-domain token list the
/// resolver compares against cluster prefixes, e.g. `"elte.hu"` ->
/// `["hu", "elte"]`.
pub fn pattern_to_tokens(pattern: &str) -> Vec<String> {
    pattern
        .trim_end_matches('/')
        .split('.')
        .rev()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_to_tokens_reverses_hostname() {
        assert_eq!(pattern_to_tokens("elte.hu"), vec!["hu", "elte"]);
        assert_eq!(pattern_to_tokens("hu"), vec!["hu"]);
    }
}
