//! `lsh-dedup`: Component H (LSHDeduper), both phases (spec §4.H).
//!
//! Stage one (intra-batch/"self"): each `MinHashBatch` under
//! `--input-dir` is deduplicated independently against its own fresh
//! LSH index, in parallel across batches (spec §5's CPU pool), and
//! written to `--self-dir`. Stage two (cross-batch/"other") then runs
//! `--self-dir`'s batches, in order, through one of the two strategies
//! spec §4.H describes, writing the final survivors to `--output-dir`
//! and marking each finished batch with a `<NNNN>.done` sentinel so a
//! rerun skips batches already completed (spec §3/§6's state machine).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use cc_corpus_pipeline::batch::{
    is_done, list_minhash_batches, mark_done, MinhashBatchReader, MinhashBatchWriter, MinhashRecord,
};
use cc_corpus_pipeline::lsh::{dedup_other_in_memory, dedup_other_streaming, dedup_self, DocId, LshIndex};
use cc_corpus_pipeline::minhash::{LeanMinHash, DEFAULT_NUM_PERMUTATIONS};
use cc_corpus_pipeline::telemetry::{
    install_signal_stop_flag, run_metrics_server, setup_tracing, LogLevel, EXIT_CODE_SIGNAL,
};

/// Number of digits in a batch's zero-padded filename stem, matching
/// `BatchSequencer`'s fixed width.
const BATCH_DIGITS: usize = 4;

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum Strategy {
    Streaming,
    InMemory,
}

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Directory of MinHash batch files (`minhash`'s output).
    #[arg(long)]
    input_dir: PathBuf,

    /// Directory for the intermediate self-deduped batches.
    #[arg(long)]
    self_dir: PathBuf,

    /// Directory for the final cross-batch-deduped batches.
    #[arg(long)]
    output_dir: PathBuf,

    /// Number of permutations in each signature (must match `minhash`'s
    /// `--permutations`).
    #[arg(long, default_value_t = DEFAULT_NUM_PERMUTATIONS)]
    num_perm: usize,

    /// Estimated Jaccard similarity threshold above which two
    /// signatures are considered duplicates (spec §4.H's *t*).
    #[arg(long, default_value_t = 0.9)]
    threshold: f64,

    /// Cross-batch strategy (spec §4.H: "choose one of two strategies
    /// by memory budget").
    #[arg(long, value_enum, default_value_t = Strategy::InMemory)]
    strategy: Strategy,

    /// Number of CPU-pool worker threads for the self-dedup stage.
    #[arg(long, default_value_t = 0)]
    processes: usize,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    #[arg(long, default_value_t = 9003)]
    metrics_port: u16,
}

fn main() {
    let args = Args::parse();
    setup_tracing(args.log_level);

    let rt = tokio::runtime::Runtime::new().expect("failed to start tokio runtime");
    rt.spawn(run_metrics_server(args.metrics_port));
    let stop = {
        let _guard = rt.enter();
        install_signal_stop_flag()
    };

    match run(args, Arc::clone(&stop)) {
        Ok(()) if stop.load(Ordering::Relaxed) => std::process::exit(EXIT_CODE_SIGNAL),
        Ok(()) => {}
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(1);
        }
    }
}

fn run(args: Args, stop: Arc<AtomicBool>) -> Result<()> {
    std::fs::create_dir_all(&args.self_dir)
        .with_context(|| format!("failed to create self-dedup dir {}", args.self_dir.display()))?;
    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("failed to create output dir {}", args.output_dir.display()))?;

    if args.processes > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.processes)
            .build_global()
            .ok();
    }

    let batches = list_minhash_batches(&args.input_dir, BATCH_DIGITS)
        .with_context(|| format!("failed to list batches in {}", args.input_dir.display()))?;
    tracing::info!("{} minhash batches to deduplicate", batches.len());

    self_dedup_all(&args, &batches, &stop)?;

    if stop.load(Ordering::Relaxed) {
        tracing::warn!("stopping before cross-batch dedup; self-deduped batches are left in --self-dir");
        return Ok(());
    }

    match args.strategy {
        Strategy::InMemory => cross_batch_in_memory(&args, &batches, &stop)?,
        Strategy::Streaming => cross_batch_streaming(&args, &batches, &stop)?,
    }

    Ok(())
}

fn doc_id(record: &MinhashRecord) -> DocId {
    DocId {
        url: record.url.clone(),
        paragraph_index: record.paragraph_index,
    }
}

fn flatten(groups: &[(String, Vec<MinhashRecord>)]) -> Vec<(DocId, LeanMinHash)> {
    groups
        .iter()
        .flat_map(|(_, records)| {
            records.iter().map(|r| {
                (
                    doc_id(r),
                    LeanMinHash {
                        signature: r.signature.clone(),
                    },
                )
            })
        })
        .collect()
}

/// Writes the subset of `groups` whose doc-id is in `kept`, preserving
/// each group's source-file grouping (spec §4.H: "write a new batch
/// preserving the source-file grouping").
fn write_filtered_batch(
    out_dir: &Path,
    batch_number: u32,
    groups: &[(String, Vec<MinhashRecord>)],
    kept: &HashSet<DocId>,
) -> Result<()> {
    let mut writer = MinhashBatchWriter::new_at(out_dir, usize::MAX, batch_number.saturating_sub(1));
    for (source_file, records) in groups {
        let filtered: Vec<MinhashRecord> = records
            .iter()
            .filter(|r| kept.contains(&doc_id(r)))
            .cloned()
            .collect();
        if !filtered.is_empty() {
            writer.write_file_results(source_file, &filtered)?;
        }
    }
    writer.close()?;
    Ok(())
}

fn progress_bar(len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
            .expect("valid progress bar template")
            .progress_chars("##-"),
    );
    bar
}

/// Stage one: dedups each batch against a fresh index of its own,
/// independently and in parallel (spec §4.H "self" phase, spec §5's
/// thread-confined intra-batch LSH index).
fn self_dedup_all(args: &Args, batches: &[u32], stop: &Arc<AtomicBool>) -> Result<()> {
    let progress = progress_bar(batches.len() as u64);
    let failures: Vec<(u32, anyhow::Error)> = batches
        .par_iter()
        .filter_map(|&batch_number| {
            if stop.load(Ordering::Relaxed) {
                return None;
            }
            let result = self_dedup_batch(args, batch_number);
            progress.inc(1);
            result.err().map(|e| (batch_number, e))
        })
        .collect();
    progress.finish();

    for (batch_number, err) in &failures {
        tracing::warn!("self-dedup failed for batch {}: {:#}", batch_number, err);
    }
    tracing::info!("self-dedup finished: {}/{} batches ok", batches.len() - failures.len(), batches.len());
    Ok(())
}

fn self_dedup_batch(args: &Args, batch_number: u32) -> Result<()> {
    let groups = MinhashBatchReader::read(&args.input_dir, batch_number, BATCH_DIGITS, args.num_perm)
        .with_context(|| format!("failed to read minhash batch {}", batch_number))?;

    let flat = flatten(&groups);
    let kept = dedup_self(flat, args.num_perm, args.threshold);
    let kept_ids: HashSet<DocId> = kept.into_iter().map(|(id, _)| id).collect();

    write_filtered_batch(&args.self_dir, batch_number, &groups, &kept_ids)
        .with_context(|| format!("failed to write self-deduped batch {}", batch_number))
}

/// Stage two, in-memory strategy: a single global index processed
/// sequentially, batch by batch (spec §5: "the LSH index is ...
/// serialized behind a single ... task that owns it").
fn cross_batch_in_memory(args: &Args, batches: &[u32], stop: &Arc<AtomicBool>) -> Result<()> {
    let mut global = LshIndex::new(args.num_perm, args.threshold);
    let progress = progress_bar(batches.len() as u64);

    for &batch_number in batches {
        if stop.load(Ordering::Relaxed) {
            tracing::warn!("stopping after in-flight batch; remaining batches are left undone");
            break;
        }
        let marker = done_marker_path(&args.output_dir, batch_number);
        if is_done(&marker) {
            // Already processed in a previous run: fold its survivors
            // into the global index so later batches still see them,
            // without re-querying (they already won their slot).
            let groups = MinhashBatchReader::read(&args.output_dir, batch_number, BATCH_DIGITS, args.num_perm)
                .with_context(|| format!("failed to reload completed batch {}", batch_number))?;
            for (id, signature) in flatten(&groups) {
                global.insert(id, signature.signature);
            }
            progress.inc(1);
            continue;
        }

        let groups = MinhashBatchReader::read(&args.self_dir, batch_number, BATCH_DIGITS, args.num_perm)
            .with_context(|| format!("failed to read self-deduped batch {}", batch_number))?;
        let flat = flatten(&groups);
        let kept = dedup_other_in_memory(&mut global, flat);
        let kept_ids: HashSet<DocId> = kept.into_iter().map(|(id, _)| id).collect();

        write_filtered_batch(&args.output_dir, batch_number, &groups, &kept_ids)
            .with_context(|| format!("failed to write deduped batch {}", batch_number))?;
        mark_done(&marker)
            .with_context(|| format!("failed to mark batch {} done", batch_number))?;
        progress.inc(1);
    }
    progress.finish();
    tracing::info!("cross-batch (in-memory) dedup finished: {} batches", batches.len());
    Ok(())
}

/// Stage two, streaming strategy: holds only the target batch in
/// memory, scanning each already-completed earlier batch from disk
/// (spec §4.H: "load it into L, then scan every earlier batch ...").
fn cross_batch_streaming(args: &Args, batches: &[u32], stop: &Arc<AtomicBool>) -> Result<()> {
    let progress = progress_bar(batches.len() as u64);

    for &batch_number in batches {
        if stop.load(Ordering::Relaxed) {
            tracing::warn!("stopping after in-flight batch; remaining batches are left undone");
            break;
        }
        let marker = done_marker_path(&args.output_dir, batch_number);
        if is_done(&marker) {
            progress.inc(1);
            continue;
        }

        let groups = MinhashBatchReader::read(&args.self_dir, batch_number, BATCH_DIGITS, args.num_perm)
            .with_context(|| format!("failed to read self-deduped batch {}", batch_number))?;
        let target = flatten(&groups);

        let earlier_batch_numbers: Vec<u32> = batches.iter().copied().filter(|&n| n < batch_number).collect();
        let output_dir = args.output_dir.clone();
        let num_perm = args.num_perm;
        let earlier_batches = earlier_batch_numbers.into_iter().map(move |n| {
            MinhashBatchReader::read(&output_dir, n, BATCH_DIGITS, num_perm)
                .map(|groups| flatten(&groups))
                .unwrap_or_default()
        });

        let kept = dedup_other_streaming(target, earlier_batches, args.num_perm, args.threshold);
        let kept_ids: HashSet<DocId> = kept.into_iter().map(|(id, _)| id).collect();

        write_filtered_batch(&args.output_dir, batch_number, &groups, &kept_ids)
            .with_context(|| format!("failed to write deduped batch {}", batch_number))?;
        mark_done(&marker)
            .with_context(|| format!("failed to mark batch {} done", batch_number))?;
        progress.inc(1);
    }
    progress.finish();
    tracing::info!("cross-batch (streaming) dedup finished: {} batches", batches.len());
    Ok(())
}

fn done_marker_path(output_dir: &Path, batch_number: u32) -> PathBuf {
    output_dir.join(format!("{:0width$}.done", batch_number, width = BATCH_DIGITS))
}
