//! Random access to a built datastore
//!
//! A datastore is opened by memory-mapping the file, validating the header and
//! loading the complete tag index. Reads are then located with fixed-stride
//! offset arithmetic:
//!
//! - reads are numbered from 1, pair `p` (0-based) holding reads `2p + 1` and `2p + 2`
//! - record size = `4 + 2 * (8 + C)` bytes, `C` being the encoded capacity
//! - read slot start = `data_offset + p * record size + 4 + mate * (8 + C)`

use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use log::debug;
use memmap2::Mmap;

use crate::{
    encode::decode_payload,
    error::{ReadError, Result},
    record::{RecordConfig, SIZE_LEN, SIZE_TAG},
    utils::expected_file_size,
    LinkedReadsHeader,
};

/// Resolves a 1-based read ordinal into a 0-based pair index and mate (0 or 1)
#[must_use]
pub fn pair_of(ordinal: u64) -> (usize, usize) {
    let zero_based = ordinal - 1;
    ((zero_based / 2) as usize, (zero_based % 2) as usize)
}

/// A reference to one pair record in a memory-mapped datastore
#[derive(Clone, Copy)]
pub struct RefPair<'a> {
    /// 0-based pair index
    index: usize,
    /// Serialized pair record
    buffer: &'a [u8],
    config: RecordConfig,
}
impl<'a> RefPair<'a> {
    fn new(index: usize, buffer: &'a [u8], config: RecordConfig) -> Self {
        debug_assert_eq!(buffer.len(), config.pair_size());
        Self {
            index,
            buffer,
            config,
        }
    }

    /// 0-based index of the pair
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Read ordinals of the two mates
    #[must_use]
    pub fn ordinals(&self) -> (u64, u64) {
        let first = 2 * self.index as u64 + 1;
        (first, first + 1)
    }

    #[must_use]
    pub fn tag(&self) -> u32 {
        LittleEndian::read_u32(&self.buffer[..SIZE_TAG])
    }

    fn slot(&self, mate: usize) -> &'a [u8] {
        let start = SIZE_TAG + mate * self.config.read_size();
        &self.buffer[start..start + self.config.read_size()]
    }

    fn mate_len(&self, mate: usize) -> u64 {
        LittleEndian::read_u64(&self.slot(mate)[..SIZE_LEN])
    }

    /// Number of bases stored for read 1
    #[must_use]
    pub fn len1(&self) -> u64 {
        self.mate_len(0)
    }

    /// Number of bases stored for read 2
    #[must_use]
    pub fn len2(&self) -> u64 {
        self.mate_len(1)
    }

    fn decode_mate(&self, mate: usize, ebuf: &mut Vec<u64>, dbuf: &mut Vec<u8>) -> Result<()> {
        let len = self.mate_len(mate);
        if len > self.config.max_read_length() {
            return Err(ReadError::CorruptRecord {
                ordinal: 2 * self.index as u64 + 1 + mate as u64,
                len,
                max: self.config.max_read_length(),
            }
            .into());
        }
        decode_payload(&self.slot(mate)[SIZE_LEN..], len as usize, ebuf, dbuf)
    }

    /// Decodes read 1 into `dbuf`, replacing its contents
    pub fn decode_r1(&self, dbuf: &mut Vec<u8>) -> Result<()> {
        self.decode_mate(0, &mut Vec::new(), dbuf)
    }

    /// Decodes read 2 into `dbuf`, replacing its contents
    pub fn decode_r2(&self, dbuf: &mut Vec<u8>) -> Result<()> {
        self.decode_mate(1, &mut Vec::new(), dbuf)
    }
}

/// An open, read-only linked-reads datastore
///
/// The file is memory-mapped and never modified, so any number of handles
/// (and threads) may read the same datastore concurrently.
///
/// # Examples
///
/// ```no_run
/// use lrseq::{LinkedReadsDatastore, Result};
///
/// fn main() -> Result<()> {
///     let datastore = LinkedReadsDatastore::open("sample.lrds", None)?;
///
///     // reads are numbered 1..=total_reads
///     let sequence = datastore.get_sequence(3)?;
///     let tag = datastore.get_tag(3)?;
///
///     // all reads sharing that tag are stored contiguously
///     let reads = datastore.tag_reads(tag);
///     assert!(reads.contains(&3));
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct LinkedReadsDatastore {
    /// Path of the datastore file
    path: PathBuf,

    /// Display name, either from the header or overridden at open time
    name: String,

    /// Header of the datastore
    header: LinkedReadsHeader,

    /// Record layout derived from the header
    config: RecordConfig,

    /// Byte offset of the first pair record
    data_offset: usize,

    /// Tag of every pair in stored order
    tags: Vec<u32>,

    /// Memory mapped file contents, wrapped in Arc for thread-safe sharing
    mmap: Arc<Mmap>,
}
impl LinkedReadsDatastore {
    /// Opens a datastore, optionally overriding its display name
    ///
    /// The name override only affects this handle; the file is not modified.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The file cannot be opened or is not a regular file
    /// * The header fails validation (magic number, datastore type, format version)
    /// * The file size does not match the size implied by the header and tag index
    pub fn open<P: AsRef<Path>>(path: P, name: Option<&str>) -> Result<Self> {
        let path = path.as_ref();

        // Verify input file is a file before attempting to map
        let file = File::open(path)?;
        if !file.metadata()?.is_file() {
            return Err(ReadError::IncompatibleFile.into());
        }

        // Safety: the file is open and datastores are never modified once built
        let mmap = unsafe { Mmap::map(&file)? };

        let mut cursor: &[u8] = &mmap;
        let header = LinkedReadsHeader::from_reader(&mut cursor)?;
        let config = RecordConfig::from_header(&header);

        let num_pairs = cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| ReadError::FileTruncation(mmap.len()))?;
        let index_bytes = num_pairs
            .checked_mul(4)
            .and_then(|n| usize::try_from(n).ok())
            .filter(|&n| n <= cursor.len())
            .ok_or(ReadError::FileTruncation(mmap.len()))?;
        let mut tags = vec![0u32; index_bytes / 4];
        LittleEndian::read_u32_into(&cursor[..index_bytes], &mut tags);

        let data_offset = mmap.len() - cursor.len() + index_bytes;
        let expected = expected_file_size(header.name.len(), tags.len(), header.max_read_length);
        if expected != Some(mmap.len()) {
            return Err(ReadError::FileTruncation(mmap.len()).into());
        }
        debug!(
            "Opened {}: {} pairs, records start at byte {}",
            path.display(),
            tags.len(),
            data_offset
        );

        Ok(Self {
            path: path.to_path_buf(),
            name: name.map_or_else(|| header.name.clone(), str::to_string),
            header,
            config,
            data_offset,
            tags,
            mmap: Arc::new(mmap),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Display name of this handle
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Overrides the display name of this handle without modifying the file
    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    #[must_use]
    pub fn header(&self) -> &LinkedReadsHeader {
        &self.header
    }

    #[must_use]
    pub fn max_read_length(&self) -> u64 {
        self.header.max_read_length
    }

    #[must_use]
    pub fn config(&self) -> RecordConfig {
        self.config
    }

    /// Byte offset of the first pair record
    #[must_use]
    pub fn data_offset(&self) -> usize {
        self.data_offset
    }

    #[must_use]
    pub fn num_pairs(&self) -> usize {
        self.tags.len()
    }

    /// Total number of reads (two per pair)
    #[must_use]
    pub fn total_reads(&self) -> u64 {
        2 * self.tags.len() as u64
    }

    /// Tag of every pair in stored (non-decreasing) order
    #[must_use]
    pub fn tags(&self) -> &[u32] {
        &self.tags
    }

    fn check_ordinal(&self, ordinal: u64) -> Result<()> {
        if ordinal == 0 || ordinal > self.total_reads() {
            return Err(ReadError::OutOfRange {
                requested_index: ordinal,
                max_index: self.total_reads(),
            }
            .into());
        }
        Ok(())
    }

    /// Returns the tag of the pair a read belongs to
    pub fn get_tag(&self, ordinal: u64) -> Result<u32> {
        self.check_ordinal(ordinal)?;
        let (pair, _) = pair_of(ordinal);
        Ok(self.tags[pair])
    }

    /// Decodes the sequence of a read into `dbuf`, replacing its contents
    pub fn decode_sequence(&self, ordinal: u64, dbuf: &mut Vec<u8>) -> Result<()> {
        self.check_ordinal(ordinal)?;
        let (pair, mate) = pair_of(ordinal);
        let start = self.data_offset + self.config.read_offset(pair, mate);

        let len = LittleEndian::read_u64(&self.mmap[start..start + SIZE_LEN]);
        if len > self.config.max_read_length() {
            return Err(ReadError::CorruptRecord {
                ordinal,
                len,
                max: self.config.max_read_length(),
            }
            .into());
        }
        let payload = &self.mmap[start + SIZE_LEN..start + self.config.read_size()];
        decode_payload(payload, len as usize, &mut Vec::new(), dbuf)
    }

    /// Returns the decoded sequence of a read
    pub fn get_sequence(&self, ordinal: u64) -> Result<Vec<u8>> {
        let mut dbuf = Vec::new();
        self.decode_sequence(ordinal, &mut dbuf)?;
        Ok(dbuf)
    }

    /// Returns a reference to a pair record (0-based pair index)
    pub fn get_pair(&self, index: usize) -> Result<RefPair<'_>> {
        if index >= self.num_pairs() {
            return Err(ReadError::OutOfRange {
                requested_index: 2 * index as u64 + 1,
                max_index: self.total_reads(),
            }
            .into());
        }
        let lbound = self.data_offset + self.config.pair_offset(index);
        let rbound = lbound + self.config.pair_size();
        Ok(RefPair::new(index, &self.mmap[lbound..rbound], self.config))
    }

    /// Ordinal range of every read carrying `tag`
    ///
    /// The range is empty if no pair carries the tag.
    #[must_use]
    pub fn tag_reads(&self, tag: u32) -> Range<u64> {
        let pairs = self.tag_pairs(tag);
        (2 * pairs.start as u64 + 1)..(2 * pairs.end as u64 + 1)
    }

    /// 0-based pair range of every pair carrying `tag`
    #[must_use]
    pub fn tag_pairs(&self, tag: u32) -> Range<usize> {
        let start = self.tags.partition_point(|&t| t < tag);
        let end = self.tags.partition_point(|&t| t <= tag);
        start..end
    }
}
