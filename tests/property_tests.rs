//! Property-based coverage of a few of the invariants spec §8 calls
//! out explicitly: FileRange contiguity and MinHash signature shape.
//! Teacher's own test suite is entirely example-based; `proptest` is
//! grounded in the pack's wider testing idiom rather than anything the
//! teacher itself uses, chosen because these two invariants are
//! naturally quantified over arbitrary inputs rather than a handful of
//! fixed cases.

use proptest::prelude::*;

use cc_corpus_pipeline::index::resolver::{ranges_from_clusters, FileRange};
use cc_corpus_pipeline::index::Cluster;
use cc_corpus_pipeline::minhash::{minhash, Permutations};

fn cluster_chain(lengths: &[usize]) -> Vec<Cluster> {
    let mut offset = 0usize;
    lengths
        .iter()
        .enumerate()
        .map(|(i, &length)| {
            let cluster = Cluster {
                surt: format!("com,example{i})/"),
                timestamp: "20240101000000".to_string(),
                file_name: "f.idx".to_string(),
                offset,
                length,
            };
            offset += length;
            cluster
        })
        .collect()
}

proptest! {
    /// Invariant 2 (spec §8): any chain of same-file clusters whose
    /// offsets immediately follow one another coalesces into exactly
    /// one contiguous FileRange spanning their total length.
    #[test]
    fn contiguous_clusters_always_coalesce_into_one_range(
        lengths in prop::collection::vec(1usize..500, 1..20)
    ) {
        let clusters = cluster_chain(&lengths);
        let refs: Vec<&Cluster> = clusters.iter().collect();
        let ranges = ranges_from_clusters(&refs).unwrap();

        let total: usize = lengths.iter().sum();
        prop_assert_eq!(ranges, vec![FileRange { file: "f.idx".to_string(), offset: 0, length: total }]);
    }

    /// Introducing a single extra byte of gap between two clusters
    /// always surfaces as a RangeDiscontinuity, never as a silently
    /// wrong range.
    #[test]
    fn a_gap_is_always_reported_as_a_discontinuity(
        lengths in prop::collection::vec(1usize..200, 2..10),
        gap_index in 1usize..8,
    ) {
        let mut clusters = cluster_chain(&lengths);
        let gap_index = gap_index.min(clusters.len() - 1);
        for cluster in clusters.iter_mut().skip(gap_index) {
            cluster.offset += 1;
        }
        let refs: Vec<&Cluster> = clusters.iter().collect();
        prop_assert!(ranges_from_clusters(&refs).is_err());
    }

    /// A MinHash signature always has exactly as many permutation
    /// slots as the permutation family it was built from, regardless
    /// of input text (including empty strings and strings shorter than
    /// the shingle width).
    #[test]
    fn minhash_signature_width_matches_permutation_count(
        text in ".{0,200}",
        num_perm in 1usize..64,
    ) {
        let perms = Permutations::new(num_perm, 7);
        let signature = minhash(&text, &perms, 5);
        prop_assert_eq!(signature.signature.len(), num_perm);
    }

    /// Jaccard similarity of a signature with itself is always 1.0
    /// (every permutation slot trivially agrees with itself).
    #[test]
    fn self_jaccard_is_always_one(text in ".{1,200}", num_perm in 1usize..64) {
        let perms = Permutations::new(num_perm, 13);
        let signature = minhash(&text, &perms, 5);
        prop_assert!((signature.jaccard(&signature) - 1.0).abs() < f64::EPSILON);
    }
}
