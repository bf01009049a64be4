//! `minhash`: Component G (MinHasher). Reads corpus files from
//! `--input-dir`, computes a MinHash signature per paragraph and writes
//! the resulting signatures to rotating `MinHashBatch` files in
//! `--output-dir` (spec §3/§4.G).
//!
//! One CPU-pool task per input file, sized by `--processes`, the same
//! `rayon`-driven worker-pool shape as the teacher's sibling host-mapper
//! example; a single driver task collects each file's signatures in
//! file order and feeds them to the batch writer (spec §5's CPU-pool /
//! driver split).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use cc_corpus_pipeline::batch::{MinhashBatchWriter, MinhashRecord};
use cc_corpus_pipeline::corpus::CorpusReader;
use cc_corpus_pipeline::minhash::{minhash, Permutations, DEFAULT_NUM_PERMUTATIONS, DEFAULT_SHINGLE_SIZE};
use cc_corpus_pipeline::telemetry::{
    install_signal_stop_flag, run_metrics_server, setup_tracing, LogLevel, EXIT_CODE_SIGNAL,
};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Directory of corpus batch files (`fetch`'s output).
    #[arg(long)]
    input_dir: PathBuf,

    /// Where MinHash batch files are written.
    #[arg(long)]
    output_dir: PathBuf,

    /// Number of signatures per output batch file.
    #[arg(long, default_value_t = 100_000)]
    batch_size: usize,

    /// Character n-gram width (spec §4.G).
    #[arg(long, default_value_t = DEFAULT_SHINGLE_SIZE)]
    shingle_size: usize,

    /// Number of permutations, i.e. signature width (spec §4.G).
    #[arg(long, default_value_t = DEFAULT_NUM_PERMUTATIONS)]
    permutations: usize,

    /// Seed for the permutation family, kept fixed across runs so
    /// signatures from different invocations stay comparable.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Number of CPU-pool worker threads (spec §5's CPU pool).
    #[arg(long, default_value_t = 0)]
    processes: usize,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    #[arg(long, default_value_t = 9002)]
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
    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("failed to create output dir {}", args.output_dir.display()))?;

    if args.processes > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.processes)
            .build_global()
            .ok();
    }

    let mut input_files: Vec<PathBuf> = std::fs::read_dir(&args.input_dir)
        .with_context(|| format!("failed to read input dir {}", args.input_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    input_files.sort();
    tracing::info!("{} corpus files to minhash", input_files.len());

    let permutations = Permutations::new(args.permutations, args.seed);

    let progress = ProgressBar::new(input_files.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
            .expect("valid progress bar template")
            .progress_chars("##-"),
    );

    let (tx, rx) = channel::<(String, Vec<MinhashRecord>)>();
    let writer_thread = {
        let output_dir = args.output_dir.clone();
        let batch_size = args.batch_size;
        std::thread::spawn(move || -> Result<u64> {
            let mut writer = MinhashBatchWriter::new(output_dir, batch_size);
            for (source_file, records) in rx.iter() {
                writer.write_file_results(&source_file, &records)?;
            }
            writer.close()?;
            Ok(writer.total_written())
        })
    };

    input_files.par_iter().for_each_with(tx, |tx, path| {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();
        match minhash_file(path, &permutations, args.shingle_size) {
            Ok(records) => {
                if tx.send((file_name, records)).is_err() {
                    tracing::warn!("minhash writer thread gone, dropping remaining results");
                }
            }
            Err(e) => tracing::warn!("failed to minhash {}: {}", path.display(), e),
        }
        progress.inc(1);
    });
    progress.finish();

    // Dropping `tx` (consumed by `for_each_with` above) closes the
    // channel, so the writer thread's `rx.iter()` loop ends on its own
    // and it flushes/closes its batch files before this joins it —
    // whether the pool above ran to completion or stopped early.
    let total_written = writer_thread
        .join()
        .map_err(|_| anyhow::anyhow!("minhash writer thread panicked"))??;
    if stop.load(Ordering::Relaxed) {
        tracing::warn!("stopping after in-flight files; remaining input files were skipped");
    }
    tracing::info!("minhash finished: {} signatures written", total_written);
    Ok(())
}

/// Minhashes every paragraph in one corpus file, in document/paragraph
/// order, matching the order [`MinhashBatchWriter::write_file_results`]
/// records in `.files` (spec §4.G's "signatures are written in order").
fn minhash_file(path: &PathBuf, permutations: &Permutations, n: usize) -> Result<Vec<MinhashRecord>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read corpus file {}", path.display()))?;
    let file_label = path.display().to_string();
    let documents = CorpusReader::parse(&file_label, &contents)
        .with_context(|| format!("failed to parse corpus file {}", file_label))?;

    let mut records = Vec::new();
    for document in documents {
        let url = document.attrs.get("url").cloned().unwrap_or_default();
        for (paragraph_index, paragraph) in document.paragraphs.iter().enumerate().map(|(i, p)| (i + 1, p)) {
            let signature = minhash(paragraph, permutations, n);
            records.push(MinhashRecord {
                signature: signature.signature,
                url: url.clone(),
                paragraph_index,
            });
        }
    }
    Ok(records)
}
