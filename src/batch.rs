//! Component F (BatchWriter) and its MinHash counterpart (component
//! G/H support), per spec §4.F/§3.
//!
//! Both generalize `cc_corpus/io.py::BatchWriterBase` and
//! `cc_corpus/deduplication.py::BatchWriter`'s rotate-on-count
//! behaviour, but replace the original's "open eagerly, delete if
//! empty on close" approach with a lazy writer: a batch's files are
//! opened only on its first write, so an empty batch simply never
//! creates a file (spec §9 redesign note, spec §8 invariant 6).

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::corpus::Document;

/// Shared rotate-on-count bookkeeping used by both writers below.
struct BatchSequencer {
    out_dir: PathBuf,
    name_prefix: String,
    digits: usize,
    batch_size: usize,
    batch: u32,
    written_in_batch: usize,
    pub total_written: u64,
}

impl BatchSequencer {
    fn new(out_dir: impl Into<PathBuf>, name_prefix: impl Into<String>, digits: usize, batch_size: usize) -> Self {
        BatchSequencer::starting_at(out_dir, name_prefix, digits, batch_size, 0)
    }

    fn starting_at(
        out_dir: impl Into<PathBuf>,
        name_prefix: impl Into<String>,
        digits: usize,
        batch_size: usize,
        start_batch: u32,
    ) -> Self {
        BatchSequencer {
            out_dir: out_dir.into(),
            name_prefix: name_prefix.into(),
            digits,
            batch_size: batch_size.max(1),
            batch: start_batch,
            written_in_batch: 0,
            total_written: 0,
        }
    }

    fn needs_rotation(&self) -> bool {
        self.written_in_batch >= self.batch_size
    }

    fn advance(&mut self) -> PathBuf {
        self.total_written += self.written_in_batch as u64;
        self.written_in_batch = 0;
        self.batch += 1;
        self.out_dir.join(format!(
            "{}{:0width$}",
            self.name_prefix,
            self.batch,
            width = self.digits
        ))
    }

    fn record_write(&mut self) {
        self.written_in_batch += 1;
    }

    fn finish(&mut self) {
        self.total_written += self.written_in_batch as u64;
        self.written_in_batch = 0;
    }
}

/// Writes serialized [`Document`]s to `<prefix><NNNN><suffix>` files,
/// rotating after `batch_size` documents. The file is opened lazily on
/// the first write of a batch, never on rotation alone, so a run that
/// produces zero documents for a batch leaves no empty file behind.
pub struct CorpusBatchWriter {
    sequencer: BatchSequencer,
    suffix: String,
    current: Option<BufWriter<File>>,
}

impl CorpusBatchWriter {
    pub fn new(out_dir: impl Into<PathBuf>, batch_size: usize) -> CorpusBatchWriter {
        CorpusBatchWriter {
            sequencer: BatchSequencer::new(out_dir, "", 4, batch_size),
            suffix: ".txt".to_string(),
            current: None,
        }
    }

    pub fn with_prefix_and_suffix(
        out_dir: impl Into<PathBuf>,
        batch_size: usize,
        name_prefix: impl Into<String>,
        suffix: impl Into<String>,
    ) -> CorpusBatchWriter {
        CorpusBatchWriter {
            sequencer: BatchSequencer::new(out_dir, name_prefix, 4, batch_size),
            suffix: suffix.into(),
            current: None,
        }
    }

    pub fn write(&mut self, document: &Document) -> io::Result<()> {
        if self.current.is_none() || self.sequencer.needs_rotation() {
            self.rotate()?;
        }
        let writer = self.current.as_mut().expect("file opened by rotate");
        writeln!(writer, "{document}")?;
        self.sequencer.record_write();
        Ok(())
    }

    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut writer) = self.current.take() {
            writer.flush()?;
        }
        let stem = self.sequencer.advance();
        let path = stem.with_extension(self.suffix.trim_start_matches('.'));
        let file = File::create(&path)?;
        self.current = Some(BufWriter::new(file));
        Ok(())
    }

    /// Flushes and drops the open file handle. Safe to call more than
    /// once: a second call is a no-op.
    pub fn close(&mut self) -> io::Result<()> {
        if let Some(mut writer) = self.current.take() {
            writer.flush()?;
        }
        self.sequencer.finish();
        Ok(())
    }

    pub fn total_written(&self) -> u64 {
        self.sequencer.total_written
    }
}

impl Drop for CorpusBatchWriter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// One MinHash signature, paired with the document it came from. The
/// signature itself is a fixed-width vector of permutation minima
/// (spec §3's `MinHashBatch`, built by [`crate::minhash`]).
#[derive(Clone)]
pub struct MinhashRecord {
    pub signature: Vec<u64>,
    pub url: String,
    pub paragraph_index: usize,
}

/// Writes the three parallel files making up a `MinHashBatch` (spec
/// §3): `.minhashes` (binary signatures), `.doc_ids` (tab-separated
/// `url \t paragraph_index`), `.files` (per-source-file offsets).
/// Offsets are monotone across the batch's lifetime, matching the
/// original's `mh_offset`/`di_offset` bookkeeping in
/// `cc_corpus/deduplication.py::BatchWriter`.
pub struct MinhashBatchWriter {
    sequencer: BatchSequencer,
    current: Option<MinhashFiles>,
}

struct MinhashFiles {
    minhashes: BufWriter<File>,
    doc_ids: BufWriter<File>,
    files: BufWriter<File>,
    minhash_offset: u64,
    doc_id_offset: u64,
}

impl MinhashBatchWriter {
    pub fn new(out_dir: impl Into<PathBuf>, batch_size: usize) -> MinhashBatchWriter {
        MinhashBatchWriter {
            sequencer: BatchSequencer::new(out_dir, "", 4, batch_size),
            current: None,
        }
    }

    /// Like [`MinhashBatchWriter::new`], but numbers the first batch
    /// `start_batch + 1` instead of `1`. Used by the LSH deduplication
    /// stages (spec §4.H) to write self-deduped/cross-batch-deduped
    /// output under the same `<NNNN>` numbering their source batches
    /// used, rather than always restarting from batch 1.
    pub fn new_at(out_dir: impl Into<PathBuf>, batch_size: usize, start_batch: u32) -> MinhashBatchWriter {
        MinhashBatchWriter {
            sequencer: BatchSequencer::starting_at(out_dir, "", 4, batch_size, start_batch),
            current: None,
        }
    }

    /// Writes every signature minhashed from one source file, along
    /// with the `.files` index line describing where they landed.
    pub fn write_file_results(
        &mut self,
        source_file: &str,
        records: &[MinhashRecord],
    ) -> io::Result<()> {
        if self.current.is_none() || self.sequencer.needs_rotation() {
            self.rotate()?;
        }
        let files = self.current.as_mut().expect("file opened by rotate");

        writeln!(
            files.files,
            "{}\t{}\t{}\t{}",
            source_file,
            records.len(),
            files.minhash_offset,
            files.doc_id_offset
        )?;

        for record in records {
            for word in &record.signature {
                files.minhashes.write_all(&word.to_le_bytes())?;
                files.minhash_offset += 8;
            }
            let line = format!("{}\t{}\n", record.url, record.paragraph_index);
            files.doc_ids.write_all(line.as_bytes())?;
            files.doc_id_offset += line.len() as u64;
        }

        for _ in records {
            self.sequencer.record_write();
        }
        Ok(())
    }

    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut files) = self.current.take() {
            files.minhashes.flush()?;
            files.doc_ids.flush()?;
            files.files.flush()?;
        }
        let stem = self.sequencer.advance();
        let minhashes = File::create(stem.with_extension("minhashes"))?;
        let doc_ids = File::create(stem.with_extension("doc_ids"))?;
        let files = File::create(stem.with_extension("files"))?;
        self.current = Some(MinhashFiles {
            minhashes: BufWriter::new(minhashes),
            doc_ids: BufWriter::new(doc_ids),
            files: BufWriter::new(files),
            minhash_offset: 0,
            doc_id_offset: 0,
        });
        Ok(())
    }

    pub fn close(&mut self) -> io::Result<()> {
        if let Some(mut files) = self.current.take() {
            files.minhashes.flush()?;
            files.doc_ids.flush()?;
            files.files.flush()?;
        }
        self.sequencer.finish();
        Ok(())
    }

    pub fn total_written(&self) -> u64 {
        self.sequencer.total_written
    }
}

impl Drop for MinhashBatchWriter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Writes a done marker at `marker_path`, per spec §3/§6's
/// batch-directory state machine (`empty -> self-deduped -> [in
/// other-queue] -> done`). Batches here share one flat output
/// directory (matching `<N>.minhashes` etc. in spec §3) rather than one
/// subdirectory per batch, so the marker is named `<NNNN>.done`
/// alongside the batch's three files instead of living inside a
/// per-batch `DONE.txt`; callers pass the full path.
pub fn mark_done(marker_path: &Path) -> io::Result<()> {
    fs::write(marker_path, b"")
}

pub fn is_done(marker_path: &Path) -> bool {
    marker_path.is_file()
}

/// Lists the batch numbers present in `dir`, discovered from its
/// `<NNNN>.files` sidecar files (the cheapest of the three to parse as
/// text), sorted ascending so callers can process batches in the order
/// spec §4.H's "earliest-inserted signature wins" rule depends on.
pub fn list_minhash_batches(dir: &Path, digits: usize) -> io::Result<Vec<u32>> {
    let mut batches = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("files") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if stem.len() == digits {
                if let Ok(n) = stem.parse::<u32>() {
                    batches.push(n);
                }
            }
        }
    }
    batches.sort_unstable();
    Ok(batches)
}

/// Reads back a `MinhashBatchWriter`-produced batch, grouped by source
/// file in the order `.files` recorded them, per spec §3/§6 ("`.files`
/// is text; the other two are binary and must be read sequentially by
/// following offsets").
pub struct MinhashBatchReader;

impl MinhashBatchReader {
    pub fn read(
        dir: &Path,
        batch_number: u32,
        digits: usize,
        num_perm: usize,
    ) -> io::Result<Vec<(String, Vec<MinhashRecord>)>> {
        let stem = dir.join(format!("{:0width$}", batch_number, width = digits));
        let files_text = fs::read_to_string(stem.with_extension("files"))?;
        let minhashes = fs::read(stem.with_extension("minhashes"))?;
        let doc_ids_text = fs::read_to_string(stem.with_extension("doc_ids"))?;
        let doc_id_lines: Vec<&str> = doc_ids_text.lines().collect();

        let signature_bytes = num_perm * 8;
        let mut result = Vec::new();
        let mut doc_id_cursor = 0usize;

        for line in files_text.lines() {
            let mut parts = line.splitn(4, '\t');
            let source_file = parts.next().unwrap_or_default().to_string();
            let count: usize = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
            let minhash_offset: usize = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);

            let mut records = Vec::with_capacity(count);
            for i in 0..count {
                let start = minhash_offset + i * signature_bytes;
                let mut signature = Vec::with_capacity(num_perm);
                for word in 0..num_perm {
                    let word_start = start + word * 8;
                    let bytes: [u8; 8] = minhashes
                        .get(word_start..word_start + 8)
                        .and_then(|s| s.try_into().ok())
                        .unwrap_or([0; 8]);
                    signature.push(u64::from_le_bytes(bytes));
                }

                let doc_line = doc_id_lines.get(doc_id_cursor + i).copied().unwrap_or_default();
                let (url, paragraph_index) = match doc_line.split_once('\t') {
                    Some((url, idx)) => (url.to_string(), idx.parse().unwrap_or(0)),
                    None => (doc_line.to_string(), 0),
                };
                records.push(MinhashRecord {
                    signature,
                    url,
                    paragraph_index,
                });
            }
            doc_id_cursor += count;
            result.push((source_file, records));
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use tempfile::tempdir;

    fn doc(url: &str) -> Document {
        let mut attrs = IndexMap::new();
        attrs.insert("url".to_string(), url.to_string());
        Document {
            attrs,
            meta: IndexMap::new(),
            paragraphs: vec!["hello".to_string()],
        }
    }

    #[test]
    fn rotates_after_batch_size_documents() {
        let dir = tempdir().unwrap();
        let mut writer = CorpusBatchWriter::new(dir.path(), 2);
        writer.write(&doc("http://a/")).unwrap();
        writer.write(&doc("http://b/")).unwrap();
        writer.write(&doc("http://c/")).unwrap();
        writer.close().unwrap();

        let mut names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, vec!["0001.txt", "0002.txt"]);
    }

    #[test]
    fn never_writing_leaves_no_file_on_disk() {
        let dir = tempdir().unwrap();
        let mut writer = CorpusBatchWriter::new(dir.path(), 2);
        writer.close().unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn double_close_is_safe() {
        let dir = tempdir().unwrap();
        let mut writer = CorpusBatchWriter::new(dir.path(), 2);
        writer.write(&doc("http://a/")).unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
        assert_eq!(writer.total_written(), 1);
    }

    #[test]
    fn minhash_batch_writes_three_parallel_files_with_monotone_offsets() {
        let dir = tempdir().unwrap();
        let mut writer = MinhashBatchWriter::new(dir.path(), 100);
        let records = vec![
            MinhashRecord {
                signature: vec![1, 2, 3],
                url: "http://a/".to_string(),
                paragraph_index: 0,
            },
            MinhashRecord {
                signature: vec![4, 5, 6],
                url: "http://a/".to_string(),
                paragraph_index: 1,
            },
        ];
        writer.write_file_results("a.txt", &records).unwrap();
        writer.close().unwrap();

        let files_contents = fs::read_to_string(dir.path().join("0001.files")).unwrap();
        assert!(files_contents.starts_with("a.txt\t2\t0\t0"));
        let minhashes = fs::read(dir.path().join("0001.minhashes")).unwrap();
        assert_eq!(minhashes.len(), 2 * 3 * 8);
    }

    #[test]
    fn minhash_batch_round_trips_through_reader() {
        let dir = tempdir().unwrap();
        let mut writer = MinhashBatchWriter::new(dir.path(), 100);
        let records = vec![
            MinhashRecord {
                signature: vec![1, 2, 3],
                url: "http://a/".to_string(),
                paragraph_index: 0,
            },
            MinhashRecord {
                signature: vec![4, 5, 6],
                url: "http://a/".to_string(),
                paragraph_index: 1,
            },
        ];
        writer.write_file_results("a.txt", &records).unwrap();
        writer
            .write_file_results(
                "b.txt",
                &[MinhashRecord {
                    signature: vec![7, 8, 9],
                    url: "http://b/".to_string(),
                    paragraph_index: 0,
                }],
            )
            .unwrap();
        writer.close().unwrap();

        let batches = list_minhash_batches(dir.path(), 4).unwrap();
        assert_eq!(batches, vec![1]);

        let groups = MinhashBatchReader::read(dir.path(), 1, 4, 3).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "a.txt");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[0].1[0].signature, vec![1, 2, 3]);
        assert_eq!(groups[0].1[1].url, "http://a/");
        assert_eq!(groups[0].1[1].paragraph_index, 1);
        assert_eq!(groups[1].0, "b.txt");
        assert_eq!(groups[1].1[0].signature, vec![7, 8, 9]);
        assert_eq!(groups[1].1[0].url, "http://b/");
    }

    #[test]
    fn new_at_starts_numbering_from_the_given_batch() {
        let dir = tempdir().unwrap();
        let mut writer = MinhashBatchWriter::new_at(dir.path(), 100, 5);
        writer
            .write_file_results(
                "a.txt",
                &[MinhashRecord {
                    signature: vec![1],
                    url: "http://a/".to_string(),
                    paragraph_index: 0,
                }],
            )
            .unwrap();
        writer.close().unwrap();
        assert!(dir.path().join("0006.files").is_file());
    }
}
