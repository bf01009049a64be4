//! Component A: turns URL patterns into a duplicate-free,
//! file-offset-ordered sequence of [`FileRange`]s covering every index
//! page that could contain a matching URL.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::error::CoreError;
use crate::index::cluster::Cluster;
use crate::index::pattern::compare_inverse_surt_lists;

/// A contiguous span inside an archive file (spec §3). Produced by
/// merging adjacent [`Cluster`] offsets belonging to the same file;
/// contiguity is an invariant enforced by [`ranges_from_clusters`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRange {
    pub file: String,
    pub offset: usize,
    pub length: usize,
}

/// Finds all clusters whose domain-token prefix is compatible with
/// `pattern`, per spec §4.A step 1-2:
///
/// - keep the last cluster strictly *less than* the pattern (URLs for
///   the pattern may start partway through it);
/// - keep every cluster *equal to* the pattern or prefixed by it;
/// - stop at the first cluster strictly greater than the pattern.
pub fn find_pattern_in_index<'a>(
    pattern: &[&str],
    clusters: impl Iterator<Item = &'a Cluster>,
) -> Vec<&'a Cluster> {
    let mut last_lesser: Option<&Cluster> = None;
    let mut matches = Vec::new();

    for cluster in clusters {
        let tokens = cluster.domain_tokens();
        match compare_inverse_surt_lists(pattern, &tokens) {
            Ordering::Greater => {
                last_lesser = Some(cluster);
            }
            Ordering::Equal => {
                if let Some(prev) = last_lesser.take() {
                    matches.push(prev);
                }
                matches.push(cluster);
            }
            Ordering::Less => {
                if let Some(prev) = last_lesser.take() {
                    matches.push(prev);
                }
                break;
            }
        }
    }

    matches
}

/// Unions the matches for every pattern and sorts by `(file, offset)`,
/// per spec §4.A step 3. Clusters are deduplicated across patterns.
pub fn collect_clusters_from_index<'a>(
    patterns: &[Vec<String>],
    clusters: &'a [Cluster],
) -> Vec<&'a Cluster> {
    let mut seen: BTreeSet<(String, usize, usize)> = BTreeSet::new();
    let mut out = Vec::new();

    for pattern in patterns {
        let pattern_refs: Vec<&str> = pattern.iter().map(String::as_str).collect();
        for cluster in find_pattern_in_index(&pattern_refs, clusters.iter()) {
            let key = (cluster.file_name.clone(), cluster.offset, cluster.length);
            if seen.insert(key) {
                out.push(cluster);
            }
        }
    }

    out.sort_by(|a, b| (a.file_name.as_str(), a.offset).cmp(&(b.file_name.as_str(), b.offset)));
    out
}

/// Coalesces a sequence of same-file clusters, already sorted by
/// `(file, offset)`, into contiguous [`FileRange`]s. Fails with
/// [`CoreError::RangeDiscontinuity`] if a cluster's offset does not
/// immediately follow the previous one in the same file — that would
/// mean the top-level index itself is corrupt or mismatched (spec §7).
pub fn ranges_from_clusters(clusters: &[&Cluster]) -> Result<Vec<FileRange>, CoreError> {
    let mut ranges: Vec<FileRange> = Vec::new();

    for cluster in clusters {
        match ranges.last_mut() {
            Some(range) if range.file == cluster.file_name => {
                let expected_offset = range.offset + range.length;
                if cluster.offset != expected_offset {
                    return Err(CoreError::RangeDiscontinuity {
                        file: cluster.file_name.clone(),
                        expected: expected_offset,
                        found: cluster.offset,
                    });
                }
                range.length += cluster.length;
            }
            _ => ranges.push(FileRange {
                file: cluster.file_name.clone(),
                offset: cluster.offset,
                length: cluster.length,
            }),
        }
    }

    Ok(ranges)
}

/// End-to-end component A entry point: patterns + the parsed top-level
/// index in, file ranges out.
pub fn resolve_patterns(
    patterns: &[Vec<String>],
    clusters: &[Cluster],
) -> Result<Vec<FileRange>, CoreError> {
    let collected = collect_clusters_from_index(patterns, clusters);
    ranges_from_clusters(&collected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(surt: &str, file_name: &str, offset: usize, length: usize) -> Cluster {
        Cluster {
            surt: surt.to_string(),
            timestamp: "20240101000000".to_string(),
            file_name: file_name.to_string(),
            offset,
            length,
        }
    }

    /// S1: three clusters `hu,`, `hu,elte`, `hu,z` should all be
    /// returned for the pattern `["hu"]`.
    #[test]
    fn s1_pattern_hu_returns_three_clusters() {
        let clusters = vec![
            cluster("hu,)/", "f1", 0, 100),
            cluster("hu,elte)/", "f1", 100, 100),
            cluster("hu,z)/", "f1", 200, 100),
            cluster("id,)/", "f1", 300, 100),
        ];
        let pattern = vec!["hu".to_string()];
        let result = resolve_patterns(&[pattern], &clusters).unwrap();
        // all four clusters are contiguous in f1, but only the first three
        // belong to the matched set, so they form one range of 300 bytes.
        assert_eq!(result, vec![FileRange { file: "f1".to_string(), offset: 0, length: 300 }]);
    }

    /// S1 (continued): for `["hu", "elte"]`, the resolver must include
    /// the cluster *before* the first `hu,elte` cluster.
    #[test]
    fn s1_pattern_hu_elte_includes_preceding_cluster() {
        let clusters = vec![
            cluster("hu,)/", "f1", 0, 100),
            cluster("hu,elte)/", "f1", 100, 100),
            cluster("hu,z)/", "f1", 200, 100),
            cluster("id,)/", "f1", 300, 100),
        ];
        let pattern = vec!["hu".to_string(), "elte".to_string()];
        let pattern_refs: Vec<&str> = pattern.iter().map(String::as_str).collect();
        let matched = find_pattern_in_index(&pattern_refs, clusters.iter());
        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0].surt, "hu,)/");
        assert_eq!(matched[1].surt, "hu,elte)/");
    }

    #[test]
    fn discontinuous_clusters_are_an_error() {
        let a = cluster("hu,)/", "f1", 0, 100);
        let b = cluster("hu,elte)/", "f1", 150, 100);
        let err = ranges_from_clusters(&[&a, &b]).unwrap_err();
        assert!(matches!(err, CoreError::RangeDiscontinuity { .. }));
    }

    #[test]
    fn separate_files_produce_separate_ranges() {
        let a = cluster("hu,)/", "f1", 0, 100);
        let b = cluster("id,)/", "f2", 0, 50);
        let ranges = ranges_from_clusters(&[&a, &b]).unwrap();
        assert_eq!(ranges.len(), 2);
    }
}
