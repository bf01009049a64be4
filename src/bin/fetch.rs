//! `fetch`: Component B (RangeFetcher) + Component D (RecordPairer) +
//! Component E (BoilerplateExtractor) + Component F (BatchWriter).
//!
//! Consumes the `IndexEntry` batches `resolve` published, downloads the
//! underlying WARC byte ranges, pairs each downloaded record back to
//! the entry that requested it, extracts the surviving content
//! paragraphs and writes the result to rotating corpus batch files.
//! Mirrors the teacher's `worker` binary, generalized onto the
//! `cc_index_batches` queue instead of raw CDX lines.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::StreamExt;

use cc_corpus_pipeline::batch::CorpusBatchWriter;
use cc_corpus_pipeline::corpus::Document;
use cc_corpus_pipeline::extract::{extract_paragraphs, BoilerplateRemover, HeuristicRemover, PyTrafilaturaRemover};
use cc_corpus_pipeline::fetch::{fetch_ranges, FetchClient, FetchResult, HttpRangeClient, RetryPolicy};
use cc_corpus_pipeline::index::{FileRange, IndexEntry};
use cc_corpus_pipeline::pairer::{pair_records, RawRecord};
use cc_corpus_pipeline::rabbitmq::{
    ack_quietly, rabbitmq_channel_with_queue, rabbitmq_connection, rabbitmq_consumer,
    CC_QUEUE_NAME_INDEX_BATCHES, DEFAULT_AMQP_ADDR,
};
use cc_corpus_pipeline::telemetry::{
    install_signal_stop_flag, run_metrics_server, setup_tracing, LogLevel, EXIT_CODE_SIGNAL,
};
use cc_corpus_pipeline::utility::host_of;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Base URL the archive's WARC files live under.
    #[arg(long, default_value = "https://data.commoncrawl.org")]
    archive_base_url: String,

    /// Where finished corpus batch files are written.
    #[arg(long, default_value = "./data/corpus")]
    output_dir: PathBuf,

    /// Number of documents per output batch file (spec §3/§4.F).
    #[arg(long, default_value_t = 1000)]
    batch_size: usize,

    /// Number of concurrent range-fetch workers (spec §5's fetch pool).
    #[arg(long, default_value_t = 8)]
    processes: usize,

    /// Maximum attempts per ranged request before giving up (spec §7).
    #[arg(long, default_value_t = 5)]
    retry: u32,

    /// Use the Python `trafilatura` boilerplate remover instead of the
    /// native heuristic one.
    #[arg(long)]
    trafilatura: bool,

    /// Target language passed to `trafilatura`, when enabled.
    #[arg(long, default_value = "en")]
    language: String,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    #[arg(long, default_value_t = 9001)]
    metrics_port: u16,

    /// AMQP broker address the index-batch queue is consumed from.
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
    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("failed to create output dir {}", args.output_dir.display()))?;

    let remover: Arc<dyn BoilerplateRemover> = if args.trafilatura {
        Arc::new(PyTrafilaturaRemover {
            language: args.language.clone(),
        })
    } else {
        Arc::new(HeuristicRemover::default())
    };

    let client: Arc<dyn FetchClient> = Arc::new(HttpRangeClient::new(
        args.archive_base_url.clone(),
        Duration::from_secs(60),
    ));
    let rabbit_conn = rabbitmq_connection(&args.amqp_addr)
        .await
        .with_context(|| "RabbitMQ is not available")?;
    let (channel, _queue) = rabbitmq_channel_with_queue(&rabbit_conn, CC_QUEUE_NAME_INDEX_BATCHES).await?;
    let mut consumer = rabbitmq_consumer(&channel, CC_QUEUE_NAME_INDEX_BATCHES, "fetch").await?;

    let mut writer = CorpusBatchWriter::new(&args.output_dir, args.batch_size);
    let mut total_documents = 0u64;
    let mut total_batches = 0u64;

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                tracing::warn!("failed to receive delivery: {}", e);
                continue;
            }
        };

        let entries: Vec<IndexEntry> = match serde_json::from_slice(&delivery.data) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("dropping malformed batch: {}", e);
                ack_quietly(&delivery).await;
                continue;
            }
        };
        total_batches += 1;

        let documents = fetch_and_extract_batch(
            entries,
            Arc::clone(&client),
            args.processes,
            args.retry,
            Arc::clone(&stop),
            remover.as_ref(),
        )
        .await;

        for document in &documents {
            if let Err(e) = writer.write(document) {
                tracing::warn!("failed to write document: {}", e);
            }
        }
        total_documents += documents.len() as u64;

        ack_quietly(&delivery).await;
        tracing::info!(
            "batch {}: {} documents extracted ({} total)",
            total_batches,
            documents.len(),
            total_documents
        );

        if stop.load(std::sync::atomic::Ordering::Relaxed) {
            tracing::warn!("stopping after in-flight batch; remaining queued batches are discarded");
            break;
        }
    }

    writer.close().ok();
    tracing::info!(
        "fetch finished: {} documents across {} batches",
        total_documents,
        total_batches
    );
    Ok(())
}

/// Groups a batch's entries by WARC file, fetches each file's coalesced
/// byte ranges, pairs the downloaded bytes back to their entries and
/// extracts content paragraphs, per spec §4.B/§4.D/§4.E.
async fn fetch_and_extract_batch(
    entries: Vec<IndexEntry>,
    client: Arc<dyn FetchClient>,
    workers: usize,
    max_attempts: u32,
    stop: Arc<AtomicBool>,
    remover: &dyn BoilerplateRemover,
) -> Vec<Document> {
    let mut by_file: HashMap<String, Vec<IndexEntry>> = HashMap::new();
    for entry in entries {
        by_file.entry(entry.warc_file.clone()).or_default().push(entry);
    }

    // One FileRange per archive entry (no cross-entry coalescing); the
    // fetch pool's own file-grouping still orders each file's GETs
    // monotonically by offset (spec §5).
    let ranges: Vec<FileRange> = by_file
        .values()
        .flatten()
        .map(|e| FileRange {
            file: e.warc_file.clone(),
            offset: e.offset,
            length: e.length,
        })
        .collect();

    let policy = RetryPolicy {
        max_attempts,
        ..RetryPolicy::default()
    };
    let fetched = fetch_ranges(client, ranges, workers, policy, stop).await;

    // Reassemble per-file ordered (entry, bytes) pairs; `fetch_ranges`
    // already returns results in input order, and input order here is
    // `by_file.values().flatten()`'s own order.
    let mut per_file_records: HashMap<String, Vec<RawRecord>> = HashMap::new();
    for fetched_range in &fetched {
        let bytes = match &fetched_range.result {
            Ok(FetchResult::Bytes(bytes)) => bytes.to_vec(),
            Ok(FetchResult::NotFound) => continue,
            Err(reason) => {
                tracing::warn!(
                    "giving up on {}: {}",
                    fetched_range.range.file,
                    reason
                );
                continue;
            }
        };
        let records = parse_warc_records(&bytes, &fetched_range.range.file);
        per_file_records
            .entry(fetched_range.range.file.clone())
            .or_default()
            .extend(records);
    }

    let mut documents = Vec::new();
    for (file, entries) in by_file {
        let records = per_file_records.remove(&file).unwrap_or_default();
        let pairs = match pair_records(&file, &entries, records) {
            Ok(pairs) => pairs,
            Err(e) => {
                tracing::warn!("pairing failed for {}: {}", file, e);
                continue;
            }
        };

        for (entry, record) in pairs {
            let payload_type = entry.mime.clone().unwrap_or_else(|| "text/html".to_string());
            let Some(paragraphs) =
                extract_paragraphs(&record.bytes, &payload_type, &entry.url, remover)
            else {
                continue;
            };
            let response_header = cc_corpus_pipeline::extract::split_header_payload(&record.bytes)
                .map(|(header, _)| String::from_utf8_lossy(header).trim().to_string())
                .unwrap_or_default();
            documents.push(build_document(&entry, &record.warc_header, &response_header, paragraphs));
        }
    }

    documents
}

/// Parses the already-decompressed bytes of one WARC range into
/// response records, reduced to what pairing needs (spec §4.D).
fn parse_warc_records(bytes: &[u8], file: &str) -> Vec<RawRecord> {
    use std::io::Read;

    use flate2::read::MultiGzDecoder;
    use warc::{WarcHeader, WarcReader};

    let mut decoder = MultiGzDecoder::new(bytes);
    let mut decompressed = Vec::new();
    if let Err(e) = decoder.read_to_end(&mut decompressed) {
        tracing::warn!("failed to gunzip WARC range from {}: {}", file, e);
        return Vec::new();
    }

    let mut records = Vec::new();
    let reader = WarcReader::new(decompressed.as_slice());
    for parsed in reader.iter_records() {
        let record = match parsed {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("malformed WARC record in {}: {}", file, e);
                continue;
            }
        };
        if record.header(WarcHeader::WarcType).as_deref() != Some("response") {
            continue;
        }
        let Some(target_uri) = record.header(WarcHeader::TargetURI).map(|c| c.into_owned()) else {
            continue;
        };
        records.push(RawRecord {
            target_uri,
            warc_header: format_warc_header(&record),
            bytes: record.body().to_vec(),
        });
    }
    records
}

/// Serializes the WARC record's own header fields into a text block,
/// the source of `Document.meta["request"]` (spec §3/§6) — the
/// original `cc_corpus` project writes the enclosing WARC record's
/// serialized header there (`remove_boilerplate.py::process_record`'s
/// `warc.header.write_to(bio)`), not an HTTP request. Built from
/// `WarcHeader::WarcType`/`TargetURI`, the only two fields the teacher's
/// own `worker.rs` reads off a parsed record; the crate exposes no
/// raw-header passthrough to go further than that without guessing at
/// field names the teacher never touches.
fn format_warc_header(record: &warc::Record<warc::BufferedBody>) -> String {
    use warc::WarcHeader;

    [
        (WarcHeader::WarcType, "WARC-Type"),
        (WarcHeader::TargetURI, "WARC-Target-URI"),
    ]
    .into_iter()
    .filter_map(|(header, label)| record.header(header).map(|value| format!("{label}: {value}")))
    .collect::<Vec<_>>()
    .join("\r\n")
}

/// Assembles a corpus [`Document`] from a paired index entry and its
/// extracted paragraphs, populating the attrs spec §3/§6 requires, plus
/// the original request/response headers under `meta` (spec §3:
/// "meta carries the original request/response headers" — per
/// `original_source/scripts/remove_boilerplate.py::process_record`,
/// `request` is the enclosing WARC record's own serialized header and
/// `response` is the HTTP response header block).
fn build_document(
    entry: &IndexEntry,
    warc_header: &str,
    response_header: &str,
    paragraphs: Vec<String>,
) -> Document {
    let mut document = Document::new();
    document.attrs.insert("domain".to_string(), host_of(&entry.url));
    document
        .attrs
        .insert("index".to_string(), entry.index_file.clone());
    document.attrs.insert("url".to_string(), entry.url.clone());
    document
        .attrs
        .insert("warc-file".to_string(), entry.warc_file.clone());
    document
        .attrs
        .insert("offset".to_string(), entry.offset.to_string());
    document
        .attrs
        .insert("length".to_string(), entry.length.to_string());
    document
        .attrs
        .insert("response".to_string(), entry.status.to_string());
    if let Some(mime) = &entry.mime {
        document.attrs.insert("mime-type".to_string(), mime.clone());
    }
    document.meta.insert("request".to_string(), warc_header.to_string());
    document.meta.insert("response".to_string(), response_header.to_string());
    document.paragraphs = paragraphs;
    document
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, warc_file: &str) -> IndexEntry {
        IndexEntry {
            surt: url.to_string(),
            timestamp: "20240101000000".to_string(),
            url: url.to_string(),
            index_file: "cdx-00000".to_string(),
            warc_file: warc_file.to_string(),
            offset: 0,
            length: 10,
            status: 200,
            mime: Some("text/html".to_string()),
            languages: None,
        }
    }

    #[test]
    fn build_document_populates_spec_attrs() {
        let document = build_document(
            &entry("http://a.example.com/page", "f.warc.gz"),
            "WARC-Type: response\r\nWARC-Target-URI: http://a.example.com/page",
            "HTTP/1.1 200 OK\r\nContent-Type: text/html",
            vec!["hi".to_string()],
        );
        assert_eq!(document.attrs.get("url").unwrap(), "http://a.example.com/page");
        assert_eq!(document.attrs.get("domain").unwrap(), "a.example.com");
        assert_eq!(document.attrs.get("index").unwrap(), "cdx-00000");
        assert_eq!(document.attrs.get("warc-file").unwrap(), "f.warc.gz");
        assert_eq!(document.attrs.get("response").unwrap(), "200");
        assert!(document.attrs.get("status").is_none());
        assert_eq!(document.attrs.get("mime-type").unwrap(), "text/html");
        assert_eq!(document.paragraphs, vec!["hi".to_string()]);
        assert_eq!(
            document.meta.get("request").unwrap(),
            "WARC-Type: response\r\nWARC-Target-URI: http://a.example.com/page"
        );
        assert_eq!(document.meta.get("response").unwrap(), "HTTP/1.1 200 OK\r\nContent-Type: text/html");
    }
}
