//! The fixed-size worker pool that drives concurrent range fetches
//! (spec §4.B / §5).
//!
//! Producers group input [`FileRange`]s by file so a single worker reads
//! one file in monotonically increasing offset order (spec §5's
//! ordering guarantee); a bounded channel caps how far the producer can
//! run ahead of the workers (spec §5 back-pressure).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::fetch::client::FetchClient;
use crate::fetch::retry::{fetch_with_retry, FetchResult, RetryPolicy};
use crate::index::FileRange;

/// One completed fetch, correlated back to its input position (spec
/// §4.B: "results are correlated to inputs by input position, not by
/// completion time").
pub struct FetchedRange {
    pub index: usize,
    pub range: FileRange,
    pub result: Result<FetchResult, String>,
}

/// Runs `ranges` through `worker_count` workers, grouped by file so each
/// worker's GETs against one file are monotonic in offset. Returns
/// results in input order, regardless of completion order.
pub async fn fetch_ranges(
    client: Arc<dyn FetchClient>,
    ranges: Vec<FileRange>,
    worker_count: usize,
    policy: RetryPolicy,
    stop: Arc<AtomicBool>,
) -> Vec<FetchedRange> {
    // Group by file, preserving each range's original index so results
    // can be reassembled in input order afterwards.
    let mut by_file: BTreeMap<String, Vec<(usize, FileRange)>> = BTreeMap::new();
    for (index, range) in ranges.into_iter().enumerate() {
        by_file
            .entry(range.file.clone())
            .or_default()
            .push((index, range));
    }
    for group in by_file.values_mut() {
        group.sort_by_key(|(_, r)| r.offset);
    }

    let queue_capacity = (worker_count * 2).max(1);
    let (tx, rx) = mpsc::channel::<(usize, FileRange)>(queue_capacity);
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    let mut workers = JoinSet::new();
    for _ in 0..worker_count.max(1) {
        let client = Arc::clone(&client);
        let rx = Arc::clone(&rx);
        let stop = Arc::clone(&stop);
        workers.spawn(async move {
            let mut out = Vec::new();
            loop {
                if stop.load(AtomicOrdering::Relaxed) {
                    break;
                }
                let item = {
                    let mut guard = rx.lock().await;
                    guard.recv().await
                };
                let Some((index, range)) = item else {
                    break;
                };
                let result =
                    fetch_with_retry(client.as_ref(), &range.file, range.offset, range.length, policy)
                        .await;
                out.push(FetchedRange { index, range, result });
            }
            out
        });
    }

    // Producer: feed one file's ranges at a time, in file order, so a
    // worker's queue position reflects a single forward pass per file.
    let producer = {
        let tx = tx.clone();
        async move {
            for (_, group) in by_file {
                for item in group {
                    if tx.send(item).await.is_err() {
                        return;
                    }
                }
            }
        }
    };
    drop(tx);
    producer.await;

    let mut all_results = Vec::new();
    while let Some(joined) = workers.join_next().await {
        if let Ok(mut results) = joined {
            all_results.append(&mut results);
        }
    }

    all_results.sort_by_key(|r| r.index);
    all_results
}
