//! Header module for the lrseq library
//!
//! This module provides the header structure and functionality for linked-reads datastores.
//! The header identifies the file as a linked-reads datastore and records the sizing
//! information (maximum read length and encoded slot capacity) that the fixed-stride
//! record layout depends on.

use std::io::{BufRead, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{HeaderError, Result, WriteError};

/// Magic number shared by every datastore kind: "DS" in ASCII (little-endian byte order)
pub const MAGIC: u16 = 0x5344;

/// Current format version of the linked-reads datastore
pub const FORMAT: u16 = 1;

/// Size of the fixed-width fields of the header in bytes
///
/// magic (2) + type (2) + version (2) + nul terminator (1) + max read length (8) + capacity (8)
pub const SIZE_HEADER_FIXED: usize = 23;

/// Type discriminant distinguishing sibling datastore kinds sharing the same magic number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum DatastoreKind {
    PairedReads = 1,
    LinkedReads = 2,
    LongReads = 3,
}
impl DatastoreKind {
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::PairedReads),
            2 => Some(Self::LinkedReads),
            3 => Some(Self::LongReads),
            _ => None,
        }
    }
}
impl From<DatastoreKind> for u16 {
    fn from(kind: DatastoreKind) -> Self {
        kind as u16
    }
}

/// Number of bytes needed to store `max_read_length` bases as 2-bit packed u64 words
#[must_use]
pub fn encoded_capacity(max_read_length: u64) -> u64 {
    8 * max_read_length.div_ceil(32)
}

/// Header of a linked-reads datastore
///
/// Serialized layout (little-endian):
///
/// | Field              | Size (bytes) |
/// | ------------------ | ------------ |
/// | magic              | 2            |
/// | datastore type     | 2            |
/// | format version     | 2            |
/// | display name       | len + 1 (nul)|
/// | max read length    | 8            |
/// | encoded capacity   | 8            |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedReadsHeader {
    /// Magic number to identify the file format
    pub magic: u16,

    /// Datastore type discriminant
    pub kind: u16,

    /// Version of the file format
    pub format: u16,

    /// Default display name of the datastore
    pub name: String,

    /// Maximum number of bases stored per read
    pub max_read_length: u64,

    /// Bytes reserved for each encoded sequence slot
    pub capacity: u64,
}
impl LinkedReadsHeader {
    /// Creates a new header for a datastore storing reads of at most `max_read_length` bases
    ///
    /// Fails if the display name contains a nul byte, which would corrupt the
    /// nul-terminated on-disk representation.
    pub fn new(name: &str, max_read_length: u64) -> Result<Self> {
        if name.as_bytes().contains(&0) {
            return Err(WriteError::InvalidName(name.to_string()).into());
        }
        Ok(Self {
            magic: MAGIC,
            kind: DatastoreKind::LinkedReads.into(),
            format: FORMAT,
            name: name.to_string(),
            max_read_length,
            capacity: encoded_capacity(max_read_length),
        })
    }

    /// Size of the serialized header in bytes
    #[must_use]
    pub fn size(&self) -> usize {
        SIZE_HEADER_FIXED + self.name.len()
    }

    /// Writes the header to a writer
    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<LittleEndian>(self.magic)?;
        writer.write_u16::<LittleEndian>(self.kind)?;
        writer.write_u16::<LittleEndian>(self.format)?;
        writer.write_all(self.name.as_bytes())?;
        writer.write_u8(0)?;
        writer.write_u64::<LittleEndian>(self.max_read_length)?;
        writer.write_u64::<LittleEndian>(self.capacity)?;
        Ok(())
    }

    /// Reads and validates a header from a reader
    ///
    /// Fields are validated as they are read: a wrong magic number, datastore
    /// type, or format version fails immediately without consuming anything
    /// past the offending field.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * Reading from the reader fails (typically an I/O error)
    /// * The magic number, datastore type, or format version is incorrect
    /// * The display name is unterminated or not UTF-8
    /// * The encoded capacity is inconsistent with the maximum read length
    pub fn from_reader<R: BufRead>(reader: &mut R) -> Result<Self> {
        let magic = reader.read_u16::<LittleEndian>()?;
        if magic != MAGIC {
            return Err(HeaderError::InvalidMagicNumber(magic).into());
        }
        let kind = reader.read_u16::<LittleEndian>()?;
        if DatastoreKind::from_u16(kind) != Some(DatastoreKind::LinkedReads) {
            return Err(HeaderError::InvalidDatastoreType(kind).into());
        }
        let format = reader.read_u16::<LittleEndian>()?;
        if format != FORMAT {
            return Err(HeaderError::InvalidFormatVersion(format).into());
        }

        let mut name = Vec::new();
        reader.read_until(0, &mut name)?;
        if name.pop() != Some(0) {
            return Err(HeaderError::InvalidName.into());
        }
        let Ok(name) = String::from_utf8(name) else {
            return Err(HeaderError::InvalidName.into());
        };

        let max_read_length = reader.read_u64::<LittleEndian>()?;
        let capacity = reader.read_u64::<LittleEndian>()?;
        let expected = encoded_capacity(max_read_length);
        if capacity != expected {
            return Err(HeaderError::InvalidCapacity {
                expected,
                found: capacity,
            }
            .into());
        }

        Ok(Self {
            magic,
            kind,
            format,
            name,
            max_read_length,
            capacity,
        })
    }
}
