//! Component G (MinHasher): per-paragraph MinHash signatures, grounded
//! in `original_source/scripts/minhash.py`'s `shinglize`/`process_file`
//! and in how `datasketch`'s `MinHash`/`LeanMinHash` build a signature
//! internally (one base hash per shingle, `P` independent affine
//! permutations of it, minimum kept per permutation). No MinHash/LSH
//! crate exists anywhere in the retrieved pack, so the construction is
//! implemented natively on top of `twox-hash`, a real fast-hash crate,
//! in place of Python's MD5-based default.

use twox_hash::XxHash64;
use std::hash::Hasher;

/// Large prime `datasketch` also uses for its permutation space
/// (`(1 << 61) - 1`, a Mersenne prime comfortably larger than any
/// `u32` base hash).
const MERSENNE_PRIME: u64 = (1u64 << 61) - 1;

/// Default character n-gram width (`original_source/scripts/minhash.py`'s
/// `--n` default).
pub const DEFAULT_SHINGLE_SIZE: usize = 5;
/// Default number of permutations (`--permutations` default).
pub const DEFAULT_NUM_PERMUTATIONS: usize = 256;

/// A seeded family of `num_permutations` independent affine hash
/// functions `(a * x + b) mod prime`, shared across every document so
/// signatures are directly comparable.
#[derive(Clone)]
pub struct Permutations {
    coefficients: Vec<(u64, u64)>,
}

impl Permutations {
    /// Builds `count` permutations from `seed`, the same way
    /// `datasketch.MinHash.__init__` draws `(a, b)` pairs from a seeded
    /// RNG (here, `rand`'s `StdRng` for reproducibility across runs
    /// given the same seed, spec §8 invariant 5's resumability).
    pub fn new(count: usize, seed: u64) -> Permutations {
        use rand::{Rng, SeedableRng};
        use rand::rngs::StdRng;

        let mut rng = StdRng::seed_from_u64(seed);
        let coefficients = (0..count)
            .map(|_| {
                let a = rng.gen_range(1..MERSENNE_PRIME);
                let b = rng.gen_range(0..MERSENNE_PRIME);
                (a, b)
            })
            .collect();
        Permutations { coefficients }
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }
}

/// A fixed-width MinHash signature: one minimum per permutation,
/// serialized into the `.minhashes` batch file (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeanMinHash {
    pub signature: Vec<u64>,
}

impl LeanMinHash {
    /// Estimated Jaccard similarity between two signatures: the
    /// fraction of permutation slots that agree, same estimator
    /// `datasketch.MinHash.jaccard` uses.
    pub fn jaccard(&self, other: &LeanMinHash) -> f64 {
        debug_assert_eq!(self.signature.len(), other.signature.len());
        if self.signature.is_empty() {
            return 0.0;
        }
        let matches = self
            .signature
            .iter()
            .zip(&other.signature)
            .filter(|(a, b)| a == b)
            .count();
        matches as f64 / self.signature.len() as f64
    }
}

fn shinglize(text: &str, n: usize) -> impl Iterator<Item = &str> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let len = chars.len();
    let count = if len >= n { len - n + 1 } else { 0 };
    (0..count)
        .map(move |i| {
            let start = chars[i].0;
            let end = chars.get(i + n).map(|(idx, _)| *idx).unwrap_or(text.len());
            &text[start..end]
        })
}

/// Computes the MinHash signature of `text` using character
/// `n`-grams, per spec §4.G. The base hash of each shingle is XxHash64
/// (seeded at 0, matching `datasketch`'s own fixed base-hash seed);
/// each permutation's minimum is tracked independently.
pub fn minhash(text: &str, permutations: &Permutations, n: usize) -> LeanMinHash {
    let mut mins = vec![u64::MAX; permutations.len()];

    // Text shorter than one shingle never updates any slot, leaving the
    // signature at its initial maximum — the same behavior as
    // `datasketch.MinHash` when `update` is never called.
    for shingle in shinglize(text, n) {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(shingle.as_bytes());
        let base = hasher.finish() % MERSENNE_PRIME;

        for (slot, (a, b)) in mins.iter_mut().zip(&permutations.coefficients) {
            let permuted = a.wrapping_mul(base).wrapping_add(*b) % MERSENNE_PRIME;
            if permuted < *slot {
                *slot = permuted;
            }
        }
    }

    LeanMinHash { signature: mins }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_yields_identical_signature() {
        let perms = Permutations::new(64, 42);
        let a = minhash("the quick brown fox jumps over the lazy dog", &perms, 5);
        let b = minhash("the quick brown fox jumps over the lazy dog", &perms, 5);
        assert_eq!(a, b);
    }

    #[test]
    fn similar_text_has_high_estimated_jaccard() {
        let perms = Permutations::new(128, 1);
        let a = minhash("the quick brown fox jumps over the lazy dog", &perms, 5);
        let b = minhash("the quick brown fox jumps over the lazy cat", &perms, 5);
        assert!(a.jaccard(&b) > 0.5);
    }

    #[test]
    fn unrelated_text_has_low_estimated_jaccard() {
        let perms = Permutations::new(128, 1);
        let a = minhash("the quick brown fox jumps over the lazy dog", &perms, 5);
        let b = minhash("completely different content about quantum physics", &perms, 5);
        assert!(a.jaccard(&b) < 0.3);
    }

    #[test]
    fn shingles_are_character_ngrams() {
        let grams: Vec<&str> = shinglize("hello", 3).collect();
        assert_eq!(grams, vec!["hel", "ell", "llo"]);
    }
}
