//! `resolve`: Component A (IndexResolver) + Component C (IndexDeduper).
//!
//! Downloads the top-level `cluster.idx`, resolves the requested URL
//! patterns into `FileRange`s, fetches and decodes each range through
//! the shared `RangeFetcher` worker pool, deduplicates the resulting
//! `IndexEntry`s, and publishes the winners in batches onto the queue
//! `fetch` consumes (spec §4.A/§4.C/§5, mirroring the teacher's
//! `batcher` binary).

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use cc_corpus_pipeline::dedup_index::{
    dedup_shard, filter_shard_to_winners, GlobalWinners, KeepPolicy, UrlKey,
};
use cc_corpus_pipeline::fetch::{fetch_ranges, FetchClient, FetchResult, HttpRangeClient, RetryPolicy};
use cc_corpus_pipeline::index::{
    self, decode_index_range, parse_cluster_idx, resolve_patterns, IndexEntry,
};
use cc_corpus_pipeline::rabbitmq::{
    publish_batch, rabbitmq_channel_with_queue, rabbitmq_connection, BATCH_SIZE,
    CC_QUEUE_NAME_INDEX_BATCHES, DEFAULT_AMQP_ADDR,
};
use cc_corpus_pipeline::telemetry::{
    install_signal_stop_flag, run_metrics_server, setup_tracing, LogLevel, EXIT_CODE_SIGNAL,
};
use cc_corpus_pipeline::utility::download_text;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Where to cache the downloaded top-level index file.
    #[arg(long, default_value = "./data/cluster.idx")]
    cluster_idx_path: PathBuf,

    /// Base URL the top-level index and per-index files live under.
    #[arg(
        long,
        default_value = "https://data.commoncrawl.org/cc-index/collections/CC-MAIN-2024-30/indexes"
    )]
    index_base_url: String,

    /// A URL pattern to resolve, e.g. `hu` or `elte.hu`. Repeatable.
    #[arg(long = "pattern", required = true)]
    patterns: Vec<String>,

    /// Number of concurrent range-fetch workers (spec §5's fetch pool).
    #[arg(long, default_value_t = 8)]
    processes: usize,

    /// Maximum attempts per ranged request before giving up (spec §7).
    #[arg(long, default_value_t = 5)]
    retry: u32,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Which duplicate to keep per URL (spec §4.C).
    #[arg(long, value_enum, default_value_t = KeepPolicy::Biggest)]
    keep: KeepPolicy,

    /// Dedup by URL hash instead of the URL string itself.
    #[arg(long)]
    hash_urls: bool,

    /// A file of URLs (one per line) already downloaded in a previous
    /// run, to exclude before either dedup phase.
    #[arg(long)]
    skip_urls_file: Option<PathBuf>,

    #[arg(long, default_value_t = 9000)]
    metrics_port: u16,

    /// AMQP broker address the index-batch queue is published to.
    #[arg(long, default_value = DEFAULT_AMQP_ADDR)]
    amqp_addr: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    setup_tracing(args.log_level);
    tokio::task::spawn(run_metrics_server(args.metrics_port));
    let stop = install_signal_stop_flag();

    match run(args, Arc::clone(&stop)).await {
        Ok(()) if stop.load(std::sync::atomic::Ordering::Relaxed) => {
            std::process::exit(EXIT_CODE_SIGNAL)
        }
        Ok(()) => {}
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(1);
        }
    }
}

async fn run(args: Args, stop: Arc<AtomicBool>) -> Result<()> {
    let http = reqwest::Client::new();

    let cluster_idx_text = obtain_cluster_idx(&http, &args.cluster_idx_path, &args.index_base_url).await?;
    let clusters = parse_cluster_idx(&cluster_idx_text);
    tracing::info!("{} clusters loaded from top-level index", clusters.len());

    let patterns: Vec<Vec<String>> = args
        .patterns
        .iter()
        .map(|p| index::pattern_to_tokens(p))
        .collect();
    let ranges = resolve_patterns(&patterns, &clusters)
        .context("failed to resolve URL patterns against the top-level index")?;
    tracing::info!("{} file ranges to fetch", ranges.len());

    let skip_urls = match &args.skip_urls_file {
        Some(path) => load_skip_urls(path)?,
        None => HashSet::new(),
    };

    let client: Arc<dyn FetchClient> = Arc::new(HttpRangeClient::new(
        args.index_base_url.clone(),
        Duration::from_secs(30),
    ));
    let fetched = fetch_ranges(
        client,
        ranges.clone(),
        args.processes,
        RetryPolicy {
            max_attempts: args.retry,
            ..RetryPolicy::default()
        },
        Arc::clone(&stop),
    )
    .await;

    let mut shard_entries: Vec<Vec<IndexEntry>> = Vec::new();
    let mut shard_winner_maps: Vec<HashMap<UrlKey, IndexEntry>> = Vec::new();

    for fetched_range in &fetched {
        let body = match &fetched_range.result {
            Ok(FetchResult::Bytes(bytes)) => bytes,
            Ok(FetchResult::NotFound) => {
                tracing::warn!("index range for {} was not found, skipping", fetched_range.range.file);
                continue;
            }
            Err(reason) => {
                tracing::warn!(
                    "giving up on index range for {}: {}",
                    fetched_range.range.file,
                    reason
                );
                continue;
            }
        };

        let entries = match decode_index_range(body, &fetched_range.range.file) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("corrupt index range in {}: {}", fetched_range.range.file, e);
                continue;
            }
        };

        let shard = dedup_shard(entries.clone(), args.keep, args.hash_urls, &skip_urls);
        shard_winner_maps.push(shard.into_winners());
        shard_entries.push(entries);
    }

    let mut global = GlobalWinners::new();
    for winners in shard_winner_maps {
        global.merge_shard(winners, args.keep);
    }
    tracing::info!("{} distinct URLs survive deduplication", global.len());

    let rabbit_conn = rabbitmq_connection(&args.amqp_addr)
        .await
        .with_context(|| "RabbitMQ is not available")?;
    let (channel, _queue) = rabbitmq_channel_with_queue(&rabbit_conn, CC_QUEUE_NAME_INDEX_BATCHES).await?;

    let mut published = 0usize;
    for entries in &shard_entries {
        let winners = filter_shard_to_winners(entries.iter(), &global, args.hash_urls);
        for batch in winners.chunks(BATCH_SIZE) {
            let owned: Vec<IndexEntry> = batch.iter().map(|e| (*e).clone()).collect();
            publish_batch(&channel, CC_QUEUE_NAME_INDEX_BATCHES, &owned).await;
            published += owned.len();
        }
    }
    tracing::info!("published {} index entries for fetching", published);

    Ok(())
}

async fn obtain_cluster_idx(http: &reqwest::Client, cache_path: &PathBuf, base_url: &str) -> Result<String> {
    if let Ok(cached) = std::fs::read_to_string(cache_path) {
        tracing::info!("using cached top-level index at {}", cache_path.display());
        return Ok(cached);
    }

    tracing::info!("downloading top-level index from {}", base_url);
    let url = format!("{}/cluster.idx", base_url.trim_end_matches('/'));
    let text = download_text(http, &url).await?;

    if let Some(parent) = cache_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    std::fs::write(cache_path, &text)
        .with_context(|| format!("failed to cache top-level index at {}", cache_path.display()))?;

    Ok(text)
}

fn load_skip_urls(path: &PathBuf) -> Result<HashSet<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read skip-urls file {}", path.display()))?;
    Ok(text.lines().map(|line| line.trim().to_string()).collect())
}
