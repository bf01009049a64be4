//! Component H (LSHDeduper): near-duplicate removal over MinHash
//! signatures, both phases, grounded in
//! `original_source/scripts/lsh2.py::deduplicate_self`/`deduplicate_other`
//! and the banding construction `datasketch.MinHashLSH` uses
//! internally. No MinHash/LSH crate exists in the retrieved pack, so
//! [`LshIndex`] is implemented natively.

use std::collections::HashMap;
use std::hash::Hasher;

use twox_hash::XxHash64;

use crate::minhash::LeanMinHash;

/// Identifies one hashed paragraph: its source URL and 1-based
/// paragraph index within the document, matching the original's
/// `(url, paragraph_number)` doc-id tuples.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocId {
    pub url: String,
    pub paragraph_index: usize,
}

/// A banded LSH index: `num_perm` permutation minima are split into
/// `bands` groups of `rows` each (`bands * rows <= num_perm`); two
/// signatures collide if any one band's rows hash identically. Standard
/// LSH construction, grounded in the bucketing `datasketch.MinHashLSH`
/// performs internally.
pub struct LshIndex {
    bands: usize,
    rows: usize,
    threshold: f64,
    buckets: Vec<HashMap<u64, Vec<DocId>>>,
    signatures: HashMap<DocId, Vec<u64>>,
}

impl LshIndex {
    pub fn new(num_perm: usize, threshold: f64) -> LshIndex {
        let (bands, rows) = band_rows_for(num_perm, threshold);
        LshIndex {
            bands,
            rows,
            threshold,
            buckets: (0..bands).map(|_| HashMap::new()).collect(),
            signatures: HashMap::new(),
        }
    }

    fn band_key(&self, signature: &[u64], band: usize) -> u64 {
        let start = band * self.rows;
        let end = (start + self.rows).min(signature.len());
        let mut hasher = XxHash64::with_seed(band as u64);
        for word in &signature[start..end] {
            hasher.write_u64(*word);
        }
        hasher.finish()
    }

    /// Returns every previously inserted id whose signature's estimated
    /// Jaccard similarity with `signature` is at least the index's
    /// threshold (spec §3's LSH Index contract).
    pub fn query(&self, signature: &[u64]) -> Vec<DocId> {
        let mut candidates: Vec<&DocId> = Vec::new();
        for band in 0..self.bands {
            let key = self.band_key(signature, band);
            if let Some(ids) = self.buckets[band].get(&key) {
                for id in ids {
                    if !candidates.iter().any(|c| *c == id) {
                        candidates.push(id);
                    }
                }
            }
        }

        let query = LeanMinHash {
            signature: signature.to_vec(),
        };
        candidates
            .into_iter()
            .filter(|id| {
                self.signatures
                    .get(*id)
                    .map(|sig| query.jaccard(&LeanMinHash { signature: sig.clone() }) >= self.threshold)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    pub fn insert(&mut self, id: DocId, signature: Vec<u64>) {
        for band in 0..self.bands {
            let key = self.band_key(&signature, band);
            self.buckets[band].entry(key).or_default().push(id.clone());
        }
        self.signatures.insert(id, signature);
    }

    pub fn remove(&mut self, id: &DocId) {
        if let Some(signature) = self.signatures.remove(id) {
            for band in 0..self.bands {
                let key = self.band_key(&signature, band);
                if let Some(ids) = self.buckets[band].get_mut(&key) {
                    ids.retain(|existing| existing != id);
                }
            }
        }
    }

    pub fn contains(&self, id: &DocId) -> bool {
        self.signatures.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

/// Picks a `(bands, rows)` split of `num_perm` permutations whose
/// implied similarity threshold `(1/bands)^(1/rows)` is closest to the
/// requested `threshold` — the same goal `datasketch`'s
/// `_optimal_param` search serves, simplified to an exhaustive search
/// over divisor pairs since `num_perm` is always small (in the low
/// hundreds).
fn band_rows_for(num_perm: usize, threshold: f64) -> (usize, usize) {
    let mut best = (num_perm.max(1), 1);
    let mut best_error = f64::MAX;
    for rows in 1..=num_perm.max(1) {
        if num_perm % rows != 0 {
            continue;
        }
        let bands = num_perm / rows;
        if bands == 0 {
            continue;
        }
        let estimate = (1.0 / bands as f64).powf(1.0 / rows as f64);
        let error = (estimate - threshold).abs();
        if error < best_error {
            best_error = error;
            best = (bands, rows);
        }
    }
    best
}

/// Intra-batch ("self") deduplication, per spec §4.H: rebuilds a fresh
/// index for the batch, keeping a signature only if no earlier
/// signature in the same batch already matches it. Grounded in
/// `deduplicate_self`'s `lsh.query`/`lsh.insert` loop.
pub fn dedup_self(
    records: Vec<(DocId, LeanMinHash)>,
    num_perm: usize,
    threshold: f64,
) -> Vec<(DocId, LeanMinHash)> {
    let mut index = LshIndex::new(num_perm, threshold);
    let mut kept = Vec::with_capacity(records.len());
    for (id, signature) in records {
        if index.query(&signature.signature).is_empty() {
            index.insert(id.clone(), signature.signature.clone());
            kept.push((id, signature));
        }
    }
    kept
}

/// Cross-batch ("other") deduplication, *streaming* strategy: holds
/// only the target batch in memory, scanning each earlier batch's
/// signatures one at a time and removing whatever in the target they
/// match — grounded directly in `deduplicate_other`'s
/// `for duplicate in lsh.query(minhash): lsh.remove(duplicate)` loop,
/// generalized to subtract *earlier* batches (the direction our
/// pipeline processes them in) instead of the original's later ones.
pub fn dedup_other_streaming(
    target: Vec<(DocId, LeanMinHash)>,
    earlier_batches: impl Iterator<Item = Vec<(DocId, LeanMinHash)>>,
    num_perm: usize,
    threshold: f64,
) -> Vec<(DocId, LeanMinHash)> {
    let mut index = LshIndex::new(num_perm, threshold);
    for (id, signature) in &target {
        index.insert(id.clone(), signature.signature.clone());
    }

    for batch in earlier_batches {
        for (_, signature) in batch {
            for duplicate in index.query(&signature.signature) {
                index.remove(&duplicate);
            }
        }
    }

    target
        .into_iter()
        .filter(|(id, _)| index.contains(id))
        .collect()
}

/// Cross-batch ("other") deduplication, *in-memory* strategy: one
/// global index carries forward across the whole run, fed every
/// previously completed batch's survivors; each new batch only needs
/// to be checked against (and then folded into) that index, rather
/// than re-scanning earlier batches from disk.
pub fn dedup_other_in_memory(
    global: &mut LshIndex,
    batch: Vec<(DocId, LeanMinHash)>,
) -> Vec<(DocId, LeanMinHash)> {
    let mut kept = Vec::with_capacity(batch.len());
    for (id, signature) in batch {
        if global.query(&signature.signature).is_empty() {
            global.insert(id.clone(), signature.signature.clone());
            kept.push((id, signature));
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minhash::{minhash, Permutations};

    fn id(url: &str, p: usize) -> DocId {
        DocId {
            url: url.to_string(),
            paragraph_index: p,
        }
    }

    /// S4: A and C share 250/256 positions, B shares 10/256 with both.
    /// Threshold 0.9. A and B survive, C is dropped.
    #[test]
    fn s4_intra_batch_dedup_keeps_one_of_two_near_duplicates() {
        let perms = Permutations::new(256, 7);
        let a = minhash("the quick brown fox jumps over the lazy dog today", &perms, 5);
        let c = minhash("the quick brown fox jumps over the lazy dog todaz", &perms, 5);
        let b = minhash("a completely unrelated sentence about quantum computers", &perms, 5);

        assert!(a.jaccard(&c) >= 0.9);
        assert!(a.jaccard(&b) < 0.9);

        let records = vec![(id("a", 1), a), (id("b", 1), b), (id("c", 1), c)];
        let kept = dedup_self(records, 256, 0.9);

        let kept_urls: Vec<&str> = kept.iter().map(|(id, _)| id.url.as_str()).collect();
        assert_eq!(kept.len(), 2);
        assert!(kept_urls.contains(&"a"));
        assert!(kept_urls.contains(&"b"));
        assert!(!kept_urls.contains(&"c"));
    }

    /// S5: batch 2's near-duplicate of batch 1's signature is dropped
    /// under the in-memory strategy; the global index accumulates
    /// survivors across calls.
    #[test]
    fn s5_cross_batch_in_memory_drops_near_duplicate_from_later_batch() {
        let perms = Permutations::new(256, 11);
        let s = minhash("original sentence about the weather forecast today", &perms, 5);
        let s_prime = minhash("original sentence about the weather forecast todaz", &perms, 5);
        assert!(s.jaccard(&s_prime) >= 0.9);

        let mut global = LshIndex::new(256, 0.9);
        let batch1 = vec![(id("batch1", 1), s)];
        let kept1 = dedup_other_in_memory(&mut global, batch1);
        assert_eq!(kept1.len(), 1);

        let batch2 = vec![(id("batch2", 1), s_prime)];
        let kept2 = dedup_other_in_memory(&mut global, batch2);
        assert!(kept2.is_empty());
    }

    #[test]
    fn streaming_strategy_matches_in_memory_strategy() {
        let perms = Permutations::new(256, 11);
        let s = minhash("original sentence about the weather forecast today", &perms, 5);
        let s_prime = minhash("original sentence about the weather forecast todaz", &perms, 5);

        let target = vec![(id("batch2", 1), s_prime)];
        let earlier = std::iter::once(vec![(id("batch1", 1), s)]);
        let kept = dedup_other_streaming(target, earlier, 256, 0.9);
        assert!(kept.is_empty());
    }
}
