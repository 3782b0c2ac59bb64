//! Sequential read inputs
//!
//! The builder consumes two synchronized [`ReadSource`]s, one per mate. Record
//! parsing is delegated to the source: FASTQ input goes through [`seq_io`], and
//! (compressed) files are opened with [`niffler`].

use std::io::Read;
use std::path::Path;

use seq_io::fastq::{self, Record};

use crate::error::Result;

/// A borrowed view of one input record
#[derive(Debug, Clone, Copy)]
pub struct SourceRead<'a> {
    /// Full identifier line (without the leading marker)
    pub id: &'a [u8],
    /// Nucleotide sequence
    pub seq: &'a [u8],
}

/// A sequential reader yielding one record at a time
pub trait ReadSource {
    /// Returns the next record, or `None` once the stream is exhausted
    fn next_read(&mut self) -> Result<Option<SourceRead<'_>>>;
}

impl<S: ReadSource + ?Sized> ReadSource for &mut S {
    fn next_read(&mut self) -> Result<Option<SourceRead<'_>>> {
        (**self).next_read()
    }
}

/// A [`ReadSource`] over FASTQ records parsed by [`seq_io`]
///
/// The identifier and sequence of the current record are copied into reusable
/// buffers.
pub struct FastqSource<R: Read> {
    reader: fastq::Reader<R>,
    id: Vec<u8>,
    seq: Vec<u8>,
}
impl<R: Read> FastqSource<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: fastq::Reader::new(inner),
            id: Vec::new(),
            seq: Vec::new(),
        }
    }
}
impl<R: Read> ReadSource for FastqSource<R> {
    fn next_read(&mut self) -> Result<Option<SourceRead<'_>>> {
        match self.reader.next() {
            Some(Ok(record)) => {
                self.id.clear();
                self.id.extend_from_slice(record.head());
                self.seq.clear();
                self.seq.extend_from_slice(record.seq());
            }
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(None),
        }
        Ok(Some(SourceRead {
            id: &self.id,
            seq: &self.seq,
        }))
    }
}

/// Opens a plain or compressed FASTQ file as a [`ReadSource`]
pub fn fastq_source<P: AsRef<Path>>(path: P) -> Result<FastqSource<Box<dyn Read>>> {
    let (handle, _format) = niffler::from_path(path)?;
    let handle: Box<dyn Read> = Box::new(handle);
    Ok(FastqSource::new(handle))
}

/// An in-memory [`ReadSource`] over owned `(id, sequence)` records
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    records: Vec<(Vec<u8>, Vec<u8>)>,
    pos: usize,
}
impl InMemorySource {
    #[must_use]
    pub fn new(records: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        Self { records, pos: 0 }
    }

    pub fn push(&mut self, id: &[u8], seq: &[u8]) {
        self.records.push((id.to_vec(), seq.to_vec()));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
impl ReadSource for InMemorySource {
    fn next_read(&mut self) -> Result<Option<SourceRead<'_>>> {
        if self.pos >= self.records.len() {
            return Ok(None);
        }
        self.pos += 1;
        let (id, seq) = &self.records[self.pos - 1];
        Ok(Some(SourceRead { id, seq }))
    }
}
