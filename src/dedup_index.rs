//! Component C (IndexDeduper): drops repeat URLs inside and across
//! index shards before they reach the downloader, per spec §4.C.
//!
//! Generalizes `original_source/deduplicate_index_urls.py`
//! (`uniq_record`/`file_to_dict`/`filter_file`) into a two-phase
//! structure with no process-wide mutable map: each shard builds its own
//! local map (no sharing between worker tasks), then a single-writer
//! sequential merge produces the global winners (spec §5's "Shared
//! resource policy").

use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use crate::index::IndexEntry;

/// Which occurrence of a repeated URL to keep (spec §4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Default)]
pub enum KeepPolicy {
    /// Retain the entry with the larger byte length.
    #[default]
    Biggest,
    /// Retain the one with the lexicographically larger WARC file name.
    /// WARC names embed a dump date, so this approximates recency; the
    /// exact semantics are an open question the spec explicitly leaves
    /// unresolved (spec §9), so this preserves the observed Python
    /// behavior (plain string comparison) rather than inventing a real
    /// date comparator.
    Latest,
}

/// The key a URL is deduplicated under: either the URL string itself,
/// or a 64-bit hash of it, trading exactness for bounded memory (spec
/// §4.C/§9's explicit hash-mode flag — "operators accept the
/// theoretical collision risk, documented and measured"). Only the
/// `Hashed` variant carries that risk; `Exact` can never collide two
/// distinct URLs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UrlKey {
    Exact(String),
    Hashed(u64),
}

impl UrlKey {
    fn for_url(url: &str, use_hash: bool) -> UrlKey {
        if use_hash {
            let mut hasher = XxHash64::default();
            url.hash(&mut hasher);
            UrlKey::Hashed(hasher.finish())
        } else {
            UrlKey::Exact(url.to_string())
        }
    }
}

/// One shard's worth of winning entries, keyed by URL (or its hash).
/// Kept independent per shard during the in-file phase so no lock is
/// ever needed across tasks.
#[derive(Default)]
pub struct ShardWinners {
    winners: HashMap<UrlKey, IndexEntry>,
    use_hash: bool,
}

impl ShardWinners {
    pub fn new(use_hash: bool) -> Self {
        ShardWinners {
            winners: HashMap::new(),
            use_hash,
        }
    }

    /// Folds one entry into the shard map, keeping whichever of the two
    /// candidates the policy prefers.
    pub fn offer(&mut self, entry: IndexEntry, policy: KeepPolicy) {
        let key = UrlKey::for_url(&entry.url, self.use_hash);
        match self.winners.get(&key) {
            Some(existing) if !prefers_new(existing, &entry, policy) => {}
            _ => {
                self.winners.insert(key, entry);
            }
        }
    }

    pub fn into_winners(self) -> HashMap<UrlKey, IndexEntry> {
        self.winners
    }
}

/// True if `candidate` should replace `incumbent` under `policy`.
fn prefers_new(incumbent: &IndexEntry, candidate: &IndexEntry, policy: KeepPolicy) -> bool {
    match policy {
        KeepPolicy::Biggest => candidate.length > incumbent.length,
        KeepPolicy::Latest => candidate.warc_file > incumbent.warc_file,
    }
}

/// In-file phase: builds one shard's local winner map from its decoded
/// index lines, after subtracting the pre-seeded skip set of URLs
/// downloaded in a previous run.
pub fn dedup_shard(
    entries: impl IntoIterator<Item = IndexEntry>,
    policy: KeepPolicy,
    use_hash: bool,
    skip_urls: &HashSet<String>,
) -> ShardWinners {
    let mut shard = ShardWinners::new(use_hash);
    for entry in entries {
        if skip_urls.contains(&entry.url) {
            continue;
        }
        shard.offer(entry, policy);
    }
    shard
}

/// Cross-file phase: the single-writer sequential merge of per-shard
/// winner maps into one global map (spec §5: "sequentially merged,
/// single writer").
#[derive(Default)]
pub struct GlobalWinners {
    winners: HashMap<UrlKey, IndexEntry>,
}

impl GlobalWinners {
    pub fn new() -> Self {
        GlobalWinners::default()
    }

    pub fn merge_shard(&mut self, shard: HashMap<UrlKey, IndexEntry>, policy: KeepPolicy) {
        for (key, entry) in shard {
            match self.winners.get(&key) {
                Some(existing) if !prefers_new(existing, &entry, policy) => {}
                _ => {
                    self.winners.insert(key, entry);
                }
            }
        }
    }

    /// True if `entry` is the global winner for its URL — i.e. its
    /// `(warc, offset, length)` matches the one retained after the
    /// merge (spec §4.C's second pass rule).
    pub fn is_winner(&self, entry: &IndexEntry, use_hash: bool) -> bool {
        let key = UrlKey::for_url(&entry.url, use_hash);
        match self.winners.get(&key) {
            Some(winner) => {
                winner.warc_file == entry.warc_file
                    && winner.offset == entry.offset
                    && winner.length == entry.length
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.winners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.winners.is_empty()
    }
}

/// Final pass: filters a shard's entries down to just the global
/// winners, preserving shard order.
pub fn filter_shard_to_winners<'a>(
    entries: impl IntoIterator<Item = &'a IndexEntry>,
    global: &GlobalWinners,
    use_hash: bool,
) -> Vec<&'a IndexEntry> {
    entries
        .into_iter()
        .filter(|entry| global.is_winner(entry, use_hash))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, warc: &str, offset: usize, length: usize) -> IndexEntry {
        IndexEntry {
            surt: url.to_string(),
            timestamp: "20240101000000".to_string(),
            url: url.to_string(),
            index_file: "cdx-00000".to_string(),
            warc_file: warc.to_string(),
            offset,
            length,
            status: 200,
            mime: Some("text/html".to_string()),
            languages: Some("eng".to_string()),
        }
    }

    #[test]
    fn biggest_policy_keeps_the_longer_entry() {
        let skip = HashSet::new();
        let shard = dedup_shard(
            vec![
                entry("http://x/", "a.warc.gz", 0, 100),
                entry("http://x/", "b.warc.gz", 0, 500),
            ],
            KeepPolicy::Biggest,
            false,
            &skip,
        );
        let winners = shard.into_winners();
        assert_eq!(winners.len(), 1);
        let winner = winners.values().next().unwrap();
        assert_eq!(winner.warc_file, "b.warc.gz");
    }

    #[test]
    fn latest_policy_keeps_lexicographically_larger_warc_name() {
        let skip = HashSet::new();
        let shard = dedup_shard(
            vec![
                entry("http://x/", "CC-MAIN-2020", 0, 500),
                entry("http://x/", "CC-MAIN-2024", 0, 100),
            ],
            KeepPolicy::Latest,
            false,
            &skip,
        );
        let winner = shard.into_winners().into_values().next().unwrap();
        assert_eq!(winner.warc_file, "CC-MAIN-2024");
    }

    #[test]
    fn skip_set_drops_matches_before_either_phase() {
        let mut skip = HashSet::new();
        skip.insert("http://x/".to_string());
        let shard = dedup_shard(
            vec![entry("http://x/", "a.warc.gz", 0, 100)],
            KeepPolicy::Biggest,
            false,
            &skip,
        );
        assert!(shard.into_winners().is_empty());
    }

    #[test]
    fn exact_mode_never_collides_distinct_urls() {
        let skip = HashSet::new();
        let shard = dedup_shard(
            vec![
                entry("http://a/", "a.warc.gz", 0, 100),
                entry("http://b/", "b.warc.gz", 0, 100),
            ],
            KeepPolicy::Biggest,
            false,
            &skip,
        );
        assert_eq!(shard.into_winners().len(), 2);
    }

    #[test]
    fn invariant_one_entry_per_url_after_merge() {
        let skip = HashSet::new();
        let shard_a = dedup_shard(
            vec![entry("http://x/", "a.warc.gz", 0, 100)],
            KeepPolicy::Biggest,
            false,
            &skip,
        );
        let shard_b = dedup_shard(
            vec![entry("http://x/", "b.warc.gz", 0, 900)],
            KeepPolicy::Biggest,
            false,
            &skip,
        );

        let mut global = GlobalWinners::new();
        global.merge_shard(shard_a.into_winners(), KeepPolicy::Biggest);
        global.merge_shard(shard_b.into_winners(), KeepPolicy::Biggest);

        assert_eq!(global.len(), 1);
        let candidate = entry("http://x/", "b.warc.gz", 0, 900);
        assert!(global.is_winner(&candidate, false));
        let loser = entry("http://x/", "a.warc.gz", 0, 100);
        assert!(!global.is_winner(&loser, false));
    }
}
