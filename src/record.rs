//! Pair records and the fixed-stride layout they are serialized with
//!
//! A pair record is serialized identically in chunk files and in the datastore:
//!
//! | Field | Size (bytes) |
//! | ----- | ------------ |
//! | tag   | 4            |
//! | len1  | 8            |
//! | seq1  | C            |
//! | len2  | 8            |
//! | seq2  | C            |
//!
//! where `C` is the encoded capacity of a sequence slot.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::{error::Result, header::encoded_capacity, LinkedReadsHeader};

/// Size of the tag field preceding every pair record
pub const SIZE_TAG: usize = 4;

/// Size of the length field preceding every sequence slot
pub const SIZE_LEN: usize = 8;

/// Writes a tag to the writer in little-endian format
pub fn write_tag<W: Write>(writer: &mut W, tag: u32) -> Result<()> {
    writer.write_u32::<LittleEndian>(tag)?;
    Ok(())
}

/// Writes a buffer of u64 values to a writer in little-endian format
///
/// Each u64 in the buffer contains up to 32 nucleotides in 2-bit format.
pub fn write_buffer<W: Write>(writer: &mut W, ebuf: &[u64]) -> Result<()> {
    ebuf.iter()
        .try_for_each(|&x| writer.write_u64::<LittleEndian>(x))?;
    Ok(())
}

/// Configuration for the pair record layout
///
/// Translates between read lengths in bases and the byte strides of the
/// serialized records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordConfig {
    /// Maximum number of bases stored per read
    max_read_length: u64,
    /// Number of u64 words in a sequence slot (each word stores 32 nucleotides)
    words: usize,
}
impl RecordConfig {
    #[must_use]
    pub fn new(max_read_length: u64) -> Self {
        Self {
            max_read_length,
            words: max_read_length.div_ceil(32) as usize,
        }
    }

    #[must_use]
    pub fn from_header(header: &LinkedReadsHeader) -> Self {
        Self::new(header.max_read_length)
    }

    #[must_use]
    pub fn max_read_length(&self) -> u64 {
        self.max_read_length
    }

    /// Number of u64 words in a sequence slot
    #[must_use]
    pub fn words(&self) -> usize {
        self.words
    }

    /// Encoded capacity `C` of a sequence slot in bytes
    #[must_use]
    pub fn capacity(&self) -> usize {
        encoded_capacity(self.max_read_length) as usize
    }

    /// Bytes occupied by one read: length field + sequence slot
    #[must_use]
    pub fn read_size(&self) -> usize {
        SIZE_LEN + self.capacity()
    }

    /// Bytes following the tag of a pair record (both reads)
    #[must_use]
    pub fn body_size(&self) -> usize {
        2 * self.read_size()
    }

    /// Bytes occupied by one full pair record: tag + both reads
    #[must_use]
    pub fn pair_size(&self) -> usize {
        SIZE_TAG + self.body_size()
    }

    /// Byte offset of a pair record relative to the start of the record region
    #[must_use]
    pub fn pair_offset(&self, pair_index: usize) -> usize {
        pair_index * self.pair_size()
    }

    /// Byte offset of a read slot (its length field) relative to the start of the record region
    ///
    /// `mate` is 0 for read 1 and 1 for read 2. The tag of every preceding pair
    /// as well as the tag of this pair is accounted for.
    #[must_use]
    pub fn read_offset(&self, pair_index: usize, mate: usize) -> usize {
        self.pair_offset(pair_index) + SIZE_TAG + mate * self.read_size()
    }
}

/// A reusable slot holding one pair of encoded reads and their shared tag
///
/// The sequence buffers are allocated once at their full capacity and are
/// overwritten in place for every pair assigned to the slot.
#[derive(Debug, Clone)]
pub struct PairRecord {
    /// Shared barcode tag
    pub tag: u32,
    /// Number of valid bases in the primary read
    pub len1: u64,
    /// Number of valid bases in the secondary read
    pub len2: u64,
    /// Encoded primary read (2-bit packed, zero padded to capacity)
    pub seq1: Vec<u64>,
    /// Encoded secondary read (2-bit packed, zero padded to capacity)
    pub seq2: Vec<u64>,
}
impl PairRecord {
    #[must_use]
    pub fn new(config: RecordConfig) -> Self {
        Self {
            tag: 0,
            len1: 0,
            len2: 0,
            seq1: Vec::with_capacity(config.words()),
            seq2: Vec::with_capacity(config.words()),
        }
    }

    /// Writes the record in its fixed-stride serialized form
    ///
    /// The sequence buffers must already be padded to the configured capacity.
    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_tag(writer, self.tag)?;
        writer.write_u64::<LittleEndian>(self.len1)?;
        write_buffer(writer, &self.seq1)?;
        writer.write_u64::<LittleEndian>(self.len2)?;
        write_buffer(writer, &self.seq2)?;
        Ok(())
    }
}

/// An arena of pre-allocated pair slots making up one in-memory batch
///
/// Peak memory is bounded by the batch capacity, independent of the total
/// number of pairs being processed.
#[derive(Debug)]
pub struct PairBatch {
    slots: Vec<PairRecord>,
    filled: usize,
}
impl PairBatch {
    #[must_use]
    pub fn new(config: RecordConfig, capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| PairRecord::new(config)).collect(),
            filled: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.filled
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.filled == self.slots.len()
    }

    /// The slot the next pair is written into
    ///
    /// Writing into the slot does not claim it: a pair only becomes part of the
    /// batch once [`PairBatch::commit`] is called, otherwise the slot is
    /// overwritten by the next pair.
    pub fn next_slot(&mut self) -> Option<&mut PairRecord> {
        self.slots.get_mut(self.filled)
    }

    /// Claims the slot last returned by [`PairBatch::next_slot`]
    pub fn commit(&mut self) {
        debug_assert!(self.filled < self.slots.len());
        self.filled += 1;
    }

    /// Sorts the filled slots by tag
    ///
    /// Only the slot handles are moved; no sequence buffer is reallocated.
    pub fn sort(&mut self) {
        self.slots[..self.filled].sort_unstable_by_key(|record| record.tag);
    }

    /// Iterates over the filled slots
    pub fn iter(&self) -> impl Iterator<Item = &PairRecord> {
        self.slots[..self.filled].iter()
    }

    /// Releases all slots for reuse by the next batch
    pub fn clear(&mut self) {
        self.filled = 0;
    }
}
