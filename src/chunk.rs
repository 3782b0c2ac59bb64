//! Bounded-memory batching of input pairs into sorted chunk files
//!
//! The [`Chunker`] pulls one record from each mate stream per pair, tags and
//! encodes the pair into a pre-allocated [`PairBatch`] slot, and whenever the
//! batch is full (or input ends) sorts it by tag and spills it to a temporary
//! chunk file. Chunk files use the same fixed-stride pair layout as the
//! datastore itself and are read back with a [`ChunkReader`] during the merge.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use log::{info, warn};
use tempfile::NamedTempFile;

use crate::{
    encode::{Encoded, Encoder},
    error::{ReadError, Result},
    record::{write_tag, PairBatch, RecordConfig, SIZE_TAG},
    source::ReadSource,
    tag::{TagExtractor, NO_TAG},
    Policy,
};

/// Buffer size for reading chunk files during the merge
const CHUNK_BUFFER_SIZE: usize = 64 * 1024;

/// Counters describing what happened to the input pairs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkStats {
    /// Pairs pulled from the inputs
    pub pairs_read: u64,
    /// Pairs written to chunk files
    pub pairs_kept: u64,
    /// Pairs excluded because their tag was [`NO_TAG`]
    pub invalid_tags: u64,
    /// Pairs excluded by the invalid-nucleotide policy
    pub invalid_sequences: u64,
    /// Reads shortened to the maximum read length
    pub truncated_reads: u64,
}

/// A sorted, spilled batch of pairs
///
/// The underlying temporary file is deleted when this value is dropped.
#[derive(Debug)]
pub struct ChunkFile {
    file: NamedTempFile,
    num_pairs: u64,
}
impl ChunkFile {
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    #[must_use]
    pub fn num_pairs(&self) -> u64 {
        self.num_pairs
    }

    /// Opens an independent read handle positioned at the first record
    pub fn open(&self, config: RecordConfig) -> Result<ChunkReader<BufReader<File>>> {
        let handle = self.file.reopen()?;
        ChunkReader::new(BufReader::with_capacity(CHUNK_BUFFER_SIZE, handle), config)
    }
}

/// Consumes paired inputs and spills them as tag-sorted chunk files
pub struct Chunker<E: TagExtractor> {
    config: RecordConfig,
    extractor: E,
    encoder: Encoder,
    batch: PairBatch,
    temp_dir: Option<PathBuf>,
    chunks: Vec<ChunkFile>,
    stats: ChunkStats,
}
impl<E: TagExtractor> Chunker<E> {
    /// Creates a chunker whose batches hold at most `batch_size` pairs
    ///
    /// The batch arena is allocated up front.
    pub fn new(
        config: RecordConfig,
        batch_size: usize,
        extractor: E,
        policy: Policy,
        temp_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            config,
            extractor,
            encoder: Encoder::with_policy(config, policy),
            batch: PairBatch::new(config, batch_size),
            temp_dir,
            chunks: Vec::new(),
            stats: ChunkStats::default(),
        }
    }

    /// Consumes both inputs entirely and returns the spilled chunks
    ///
    /// Both inputs are read in lockstep. If one ends before the other, the
    /// remaining records of the longer input are ignored.
    pub fn run<S1: ReadSource, S2: ReadSource>(
        mut self,
        mut source1: S1,
        mut source2: S2,
    ) -> Result<(Vec<ChunkFile>, ChunkStats)> {
        loop {
            let (read1, read2) = match (source1.next_read()?, source2.next_read()?) {
                (Some(read1), Some(read2)) => (read1, read2),
                (None, None) => break,
                (Some(_), None) | (None, Some(_)) => {
                    warn!(
                        "Paired inputs have different lengths: stopping after {} pairs, remaining records are ignored",
                        self.stats.pairs_read
                    );
                    break;
                }
            };
            self.stats.pairs_read += 1;

            let tag = self.extractor.extract(read1.id);
            if tag == NO_TAG {
                self.stats.invalid_tags += 1;
                continue;
            }
            if self.fill_slot(tag, read1.seq, read2.seq)? && self.batch.is_full() {
                self.spill()?;
            }
        }
        if !self.batch.is_empty() {
            self.spill()?;
        }

        if self.stats.invalid_sequences > 0 {
            warn!(
                "Excluded {} pairs containing invalid nucleotides",
                self.stats.invalid_sequences
            );
        }
        info!(
            "Chunked {} pairs into {} chunks ({} kept, {} without a valid tag)",
            self.stats.pairs_read,
            self.chunks.len(),
            self.stats.pairs_kept,
            self.stats.invalid_tags
        );
        Ok((self.chunks, self.stats))
    }

    /// Encodes a pair into the next free slot and claims it
    ///
    /// Returns `false` if the pair was excluded by the policy; the slot is then
    /// left unclaimed and is overwritten by the next pair.
    fn fill_slot(&mut self, tag: u32, seq1: &[u8], seq2: &[u8]) -> Result<bool> {
        let Some(slot) = self.batch.next_slot() else {
            return Ok(false);
        };
        let Encoded::Stored {
            len: len1,
            truncated: truncated1,
        } = self.encoder.encode_into(seq1, &mut slot.seq1)?
        else {
            self.stats.invalid_sequences += 1;
            return Ok(false);
        };
        let Encoded::Stored {
            len: len2,
            truncated: truncated2,
        } = self.encoder.encode_into(seq2, &mut slot.seq2)?
        else {
            self.stats.invalid_sequences += 1;
            return Ok(false);
        };
        slot.tag = tag;
        slot.len1 = len1;
        slot.len2 = len2;
        self.batch.commit();

        self.stats.pairs_kept += 1;
        self.stats.truncated_reads += u64::from(truncated1) + u64::from(truncated2);
        Ok(true)
    }

    /// Sorts the current batch by tag and writes it to a new chunk file
    fn spill(&mut self) -> Result<()> {
        self.batch.sort();

        let mut builder = tempfile::Builder::new();
        builder.prefix("lrseq-chunk-").suffix(".tmp");
        let mut file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        {
            let mut writer = BufWriter::new(file.as_file_mut());
            for record in self.batch.iter() {
                record.write_bytes(&mut writer)?;
            }
            writer.flush()?;
        }

        let num_pairs = self.batch.len() as u64;
        info!(
            "Spilled chunk {} with {} pairs ({} bytes per pair) to {}",
            self.chunks.len(),
            num_pairs,
            self.config.pair_size(),
            file.path().display()
        );
        self.chunks.push(ChunkFile { file, num_pairs });
        self.batch.clear();
        Ok(())
    }
}

/// Reads a tag, distinguishing a clean end of stream from a truncated record
fn read_tag<R: Read>(reader: &mut R) -> Result<Option<u32>> {
    let mut buf = [0u8; SIZE_TAG];
    let mut filled = 0;
    while filled < SIZE_TAG {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    match filled {
        0 => Ok(None),
        SIZE_TAG => Ok(Some(LittleEndian::read_u32(&buf))),
        n => Err(ReadError::PartialRecord(n).into()),
    }
}

/// Sequential reader over a chunk file with a one-tag lookahead
///
/// The tag of the upcoming record is read ahead so the merge can compare
/// chunks without consuming record bodies.
pub struct ChunkReader<R: Read> {
    inner: R,
    /// Reusable buffer for one record body (everything after the tag)
    body: Vec<u8>,
    /// Tag of the upcoming record, `None` once the chunk is exhausted
    tag: Option<u32>,
}
impl<R: Read> ChunkReader<R> {
    pub fn new(inner: R, config: RecordConfig) -> Result<Self> {
        let mut reader = Self {
            inner,
            body: vec![0; config.body_size()],
            tag: None,
        };
        reader.advance()?;
        Ok(reader)
    }

    /// Tag of the upcoming record
    #[must_use]
    pub fn peek_tag(&self) -> Option<u32> {
        self.tag
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.tag.is_none()
    }

    fn advance(&mut self) -> Result<()> {
        self.tag = read_tag(&mut self.inner)?;
        Ok(())
    }

    /// Copies every consecutive record tagged `tag` to `writer`
    ///
    /// Each copied record's tag is appended to `tags`. Returns the number of
    /// records copied.
    pub fn drain_run<W: Write>(
        &mut self,
        tag: u32,
        writer: &mut W,
        tags: &mut Vec<u32>,
    ) -> Result<u64> {
        let mut copied = 0;
        while self.tag == Some(tag) {
            self.inner.read_exact(&mut self.body)?;
            write_tag(writer, tag)?;
            writer.write_all(&self.body)?;
            tags.push(tag);
            copied += 1;
            self.advance()?;
        }
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySource;
    use crate::tag::FnTagExtractor;
    use crate::Error;

    /// Tags are taken verbatim from a decimal read identifier
    fn numeric_tag(id: &[u8]) -> u32 {
        std::str::from_utf8(id)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(NO_TAG)
    }

    fn sources(tags: &[u32]) -> (InMemorySource, InMemorySource) {
        let mut r1 = InMemorySource::default();
        let mut r2 = InMemorySource::default();
        for (i, tag) in tags.iter().enumerate() {
            let seq = [b"ACGT"[i % 4]; 10];
            r1.push(tag.to_string().as_bytes(), &seq);
            r2.push(tag.to_string().as_bytes(), &seq);
        }
        (r1, r2)
    }

    fn chunk_tags(chunk: &ChunkFile, config: RecordConfig) -> anyhow::Result<Vec<u32>> {
        let mut reader = chunk.open(config)?;
        let mut tags = Vec::new();
        let mut sink = Vec::new();
        while let Some(tag) = reader.peek_tag() {
            reader.drain_run(tag, &mut sink, &mut tags)?;
        }
        assert_eq!(sink.len(), tags.len() * config.pair_size());
        Ok(tags)
    }

    #[test]
    fn test_batches_are_sorted_and_spilled() -> anyhow::Result<()> {
        let config = RecordConfig::new(32);
        let (r1, r2) = sources(&[9, 4, 7, 1, 3]);
        let chunker = Chunker::new(
            config,
            2,
            FnTagExtractor(numeric_tag),
            Policy::default(),
            None,
        );
        let (chunks, stats) = chunker.run(r1, r2)?;

        assert_eq!(chunks.len(), 3);
        assert_eq!(stats.pairs_read, 5);
        assert_eq!(stats.pairs_kept, 5);
        assert_eq!(chunk_tags(&chunks[0], config)?, vec![4, 9]);
        assert_eq!(chunk_tags(&chunks[1], config)?, vec![1, 7]);
        assert_eq!(chunk_tags(&chunks[2], config)?, vec![3]);
        assert_eq!(
            chunks.iter().map(ChunkFile::num_pairs).sum::<u64>(),
            stats.pairs_kept
        );
        Ok(())
    }

    #[test]
    fn test_sentinel_tags_do_not_occupy_slots() -> anyhow::Result<()> {
        let config = RecordConfig::new(32);
        let (r1, r2) = sources(&[5, 0, 2, 0]);
        let chunker = Chunker::new(
            config,
            2,
            FnTagExtractor(numeric_tag),
            Policy::default(),
            None,
        );
        let (chunks, stats) = chunker.run(r1, r2)?;

        assert_eq!(chunks.len(), 1);
        assert_eq!(stats.invalid_tags, 2);
        assert_eq!(chunk_tags(&chunks[0], config)?, vec![2, 5]);
        Ok(())
    }

    #[test]
    fn test_mismatched_inputs_are_truncated() -> anyhow::Result<()> {
        let config = RecordConfig::new(32);
        let (r1, _) = sources(&[3, 2, 1]);
        let (_, r2) = sources(&[3, 2]);
        let chunker = Chunker::new(
            config,
            10,
            FnTagExtractor(numeric_tag),
            Policy::default(),
            None,
        );
        let (chunks, stats) = chunker.run(r1, r2)?;
        assert_eq!(stats.pairs_read, 2);
        assert_eq!(chunk_tags(&chunks[0], config)?, vec![2, 3]);
        Ok(())
    }

    #[test]
    fn test_invalid_sequences_follow_policy() -> anyhow::Result<()> {
        let config = RecordConfig::new(8);
        let mut r1 = InMemorySource::default();
        let mut r2 = InMemorySource::default();
        r1.push(b"1", b"ACGT");
        r2.push(b"1", b"ACNT");
        r1.push(b"2", b"ACGTACGTACGT");
        r2.push(b"2", b"ACGT");

        let chunker = Chunker::new(
            config,
            4,
            FnTagExtractor(numeric_tag),
            Policy::IgnoreSequence,
            None,
        );
        let (chunks, stats) = chunker.run(r1, r2)?;
        assert_eq!(stats.invalid_sequences, 1);
        assert_eq!(stats.truncated_reads, 1);
        assert_eq!(chunk_tags(&chunks[0], config)?, vec![2]);
        Ok(())
    }

    #[test]
    fn test_chunks_are_removed_on_drop() -> anyhow::Result<()> {
        let config = RecordConfig::new(32);
        let dir = tempfile::tempdir()?;
        let (r1, r2) = sources(&[1, 2, 3]);
        let chunker = Chunker::new(
            config,
            1,
            FnTagExtractor(numeric_tag),
            Policy::default(),
            Some(dir.path().to_path_buf()),
        );
        let (chunks, _) = chunker.run(r1, r2)?;
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 3);
        drop(chunks);
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }

    /// Collects the level and message of every record logged by this module
    struct CaptureLogger(parking_lot::Mutex<Vec<(log::Level, String)>>);
    impl log::Log for CaptureLogger {
        fn enabled(&self, _metadata: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            if record.target() == "lrseq::chunk" {
                self.0.lock().push((record.level(), record.args().to_string()));
            }
        }

        fn flush(&self) {}
    }

    static LOGGER: CaptureLogger = CaptureLogger(parking_lot::const_mutex(Vec::new()));

    #[test]
    fn test_spills_are_logged_at_info() -> anyhow::Result<()> {
        // only this test installs a logger
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Trace);

        let config = RecordConfig::new(32);
        let (r1, r2) = sources(&[4, 2, 8]);
        let chunker = Chunker::new(
            config,
            2,
            FnTagExtractor(numeric_tag),
            Policy::default(),
            None,
        );
        let (chunks, _) = chunker.run(r1, r2)?;
        assert_eq!(chunks.len(), 2);

        let spills = LOGGER
            .0
            .lock()
            .iter()
            .filter(|(_, message)| message.starts_with("Spilled chunk"))
            .map(|(level, _)| *level)
            .collect::<Vec<_>>();
        assert!(spills.len() >= 2);
        assert!(spills.iter().all(|&level| level == log::Level::Info));
        Ok(())
    }

    #[test]
    fn test_partial_record_is_detected() {
        let config = RecordConfig::new(32);
        let data = vec![1u8, 0];
        let result = ChunkReader::new(data.as_slice(), config);
        assert!(matches!(
            result,
            Err(Error::ReadError(ReadError::PartialRecord(2)))
        ));
    }
}
