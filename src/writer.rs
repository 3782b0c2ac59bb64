//! Datastore construction
//!
//! Building a datastore is a single-threaded pipeline:
//!
//! 1. The paired inputs are consumed in bounded batches and spilled to
//!    tag-sorted chunk files (see [`Chunker`]).
//! 2. The header is written, followed by the pair count and a zeroed
//!    placeholder the size of the tag index.
//! 3. The chunks are merged straight into the record region following the
//!    placeholder, collecting the tag of every emitted pair.
//! 4. The writer seeks back and overwrites the placeholder with the real tag
//!    index.
//!
//! The output is only a valid datastore once the build has completed. An
//! interrupted build leaves a partial file behind; write to a temporary path
//! and rename it if atomicity is needed.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use log::{debug, info};

use crate::{
    chunk::{ChunkFile, ChunkStats, Chunker},
    error::{BuilderError, Result, WriteError},
    merge::merge_chunks,
    record::RecordConfig,
    source::ReadSource,
    tag::TagExtractor,
    LinkedReadsDatastore, LinkedReadsHeader, Policy,
};

/// Default number of pairs held in memory per batch
pub const DEFAULT_BATCH_SIZE: usize = 1_000_000;

/// Largest accepted maximum read length in bases
///
/// Every batch slot is allocated at this size, so the arena grows with it.
pub const MAX_READ_LENGTH: u64 = 1 << 20;

/// Number of tags serialized at a time when patching the tag index
const TAG_BLOCK: usize = 16 * 1024;

/// Summary of a completed build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    /// Pairs pulled from the inputs
    pub pairs_read: u64,
    /// Pairs stored in the datastore
    pub pairs_stored: u64,
    /// Pairs excluded because their barcode could not be parsed
    pub invalid_tags: u64,
    /// Pairs excluded by the invalid-nucleotide policy
    pub invalid_sequences: u64,
    /// Reads shortened to the maximum read length
    pub truncated_reads: u64,
    /// Number of chunk files merged
    pub chunks: usize,
}
impl BuildSummary {
    fn new(stats: ChunkStats, chunks: usize) -> Self {
        Self {
            pairs_read: stats.pairs_read,
            pairs_stored: stats.pairs_kept,
            invalid_tags: stats.invalid_tags,
            invalid_sequences: stats.invalid_sequences,
            truncated_reads: stats.truncated_reads,
            chunks,
        }
    }

    /// Number of reads stored in the datastore
    #[must_use]
    pub fn total_reads(&self) -> u64 {
        2 * self.pairs_stored
    }
}

/// Builder for configuring and running a datastore build
///
/// # Examples
///
/// ```no_run
/// # use lrseq::{fastq_source, LinkedReadsBuilder, Result, TenxTagExtractor};
/// # fn main() -> Result<()> {
/// let datastore = LinkedReadsBuilder::default()
///     .name("sample")
///     .max_read_length(150)
///     .batch_size(500_000)
///     .build(
///         "sample.lrds",
///         fastq_source("sample_R1.fastq.gz")?,
///         fastq_source("sample_R2.fastq.gz")?,
///         TenxTagExtractor,
///     )?;
/// println!("{} reads", datastore.total_reads());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct LinkedReadsBuilder {
    /// Default display name stored in the header
    name: Option<String>,
    /// Required maximum read length; longer reads are truncated
    max_read_length: Option<u64>,
    /// Pairs held in memory per batch
    batch_size: Option<usize>,
    /// Directory for chunk files
    temp_dir: Option<PathBuf>,
    /// Policy for handling invalid nucleotides
    policy: Option<Policy>,
}
impl LinkedReadsBuilder {
    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn max_read_length(mut self, max_read_length: u64) -> Self {
        self.max_read_length = Some(max_read_length);
        self
    }

    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    #[must_use]
    pub fn temp_dir<P: Into<PathBuf>>(mut self, temp_dir: P) -> Self {
        self.temp_dir = Some(temp_dir.into());
        self
    }

    #[must_use]
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = Some(policy);
        self
    }

    fn header(&self) -> Result<LinkedReadsHeader> {
        let Some(max_read_length) = self.max_read_length else {
            return Err(BuilderError::MissingMaxReadLength.into());
        };
        if max_read_length == 0 || max_read_length > MAX_READ_LENGTH {
            return Err(BuilderError::InvalidMaxReadLength.into());
        }
        LinkedReadsHeader::new(self.name.as_deref().unwrap_or_default(), max_read_length)
    }

    fn resolved_batch_size(&self) -> Result<usize> {
        match self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE) {
            0 => Err(BuilderError::InvalidBatchSize.into()),
            n => Ok(n),
        }
    }

    /// Builds a datastore at `path` and opens it
    ///
    /// `source1` and `source2` provide the first and second reads of each pair
    /// in the same order. The tag of a pair is extracted from the identifier of
    /// its first read.
    pub fn build<P, S1, S2, E>(
        &self,
        path: P,
        source1: S1,
        source2: S2,
        extractor: E,
    ) -> Result<LinkedReadsDatastore>
    where
        P: AsRef<Path>,
        S1: ReadSource,
        S2: ReadSource,
        E: TagExtractor,
    {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        let summary = self.write(&mut writer, source1, source2, extractor)?;
        writer.flush()?;
        drop(writer);

        info!(
            "Built {} with {} reads from {} input pairs",
            path.display(),
            summary.total_reads(),
            summary.pairs_read
        );
        LinkedReadsDatastore::open(path, None)
    }

    /// Runs the build pipeline into any seekable sink
    pub fn write<W, S1, S2, E>(
        &self,
        writer: &mut W,
        source1: S1,
        source2: S2,
        extractor: E,
    ) -> Result<BuildSummary>
    where
        W: Write + Seek,
        S1: ReadSource,
        S2: ReadSource,
        E: TagExtractor,
    {
        let header = self.header()?;
        let config = RecordConfig::from_header(&header);
        let chunker = Chunker::new(
            config,
            self.resolved_batch_size()?,
            extractor,
            self.policy.unwrap_or_default(),
            self.temp_dir.clone(),
        );
        let (chunks, stats) = chunker.run(source1, source2)?;
        write_datastore(writer, &header, &chunks, stats.pairs_kept)?;
        Ok(BuildSummary::new(stats, chunks.len()))
    }
}

/// Writes the header, reserves the tag index, merges the chunks and patches the index
fn write_datastore<W: Write + Seek>(
    writer: &mut W,
    header: &LinkedReadsHeader,
    chunks: &[ChunkFile],
    num_pairs: u64,
) -> Result<()> {
    let config = RecordConfig::from_header(header);

    header.write_bytes(writer)?;
    writer.write_u64::<LittleEndian>(num_pairs)?;
    let index_offset = writer.stream_position()?;
    io::copy(&mut io::repeat(0).take(4 * num_pairs), writer)?;
    debug!(
        "Reserved tag index of {} pairs at byte {}",
        num_pairs, index_offset
    );

    let mut readers = chunks
        .iter()
        .map(|chunk| chunk.open(config))
        .collect::<Result<Vec<_>>>()?;
    let tags = merge_chunks(&mut readers, writer)?;
    if tags.len() as u64 != num_pairs {
        return Err(WriteError::PairCountMismatch {
            expected: num_pairs,
            got: tags.len() as u64,
        }
        .into());
    }

    let end = writer.stream_position()?;
    writer.seek(SeekFrom::Start(index_offset))?;
    write_tag_index(writer, &tags)?;
    writer.seek(SeekFrom::Start(end))?;
    writer.flush()?;
    Ok(())
}

/// Writes the tag index as little-endian u32s
fn write_tag_index<W: Write>(writer: &mut W, tags: &[u32]) -> Result<()> {
    let mut buffer = vec![0u8; 4 * TAG_BLOCK.min(tags.len())];
    for block in tags.chunks(TAG_BLOCK) {
        let bytes = &mut buffer[..4 * block.len()];
        LittleEndian::write_u32_into(block, bytes);
        writer.write_all(bytes)?;
    }
    Ok(())
}
