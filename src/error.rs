/// Custom Result type for lrseq operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the lrseq library, encompassing all possible error cases
/// that can occur while building or reading a linked-reads datastore.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub enum Error {
    /// Errors related to the container header (format compatibility)
    HeaderError(#[from] HeaderError),
    /// Errors that occur during read operations
    ReadError(#[from] ReadError),
    /// Errors that occur during write operations
    WriteError(#[from] WriteError),
    /// Errors in the datastore builder configuration
    BuilderError(#[from] BuilderError),
    /// Standard I/O errors from the Rust standard library
    IoError(#[from] std::io::Error),
    /// UTF-8 encoding/decoding errors
    Utf8Error(#[from] std::str::Utf8Error),
    /// Errors from the bitnuc nucleotide processing library
    BitnucError(#[from] bitnuc::NucleotideError),
    /// Errors raised while parsing FASTQ input
    FastqError(#[from] seq_io::fastq::Error),
    /// Errors raised while opening (possibly compressed) input files
    NifflerError(#[from] niffler::Error),
    /// Generic errors that can occur in any part of the system
    AnyhowError(#[from] anyhow::Error),
}
impl Error {
    /// Checks if the error is a header (format compatibility) error
    #[must_use]
    pub fn is_format_error(&self) -> bool {
        matches!(self, Self::HeaderError(_))
    }

    /// Checks if the error is an out-of-range read ordinal
    #[must_use]
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, Self::ReadError(ReadError::OutOfRange { .. }))
    }
}

/// Errors specific to processing and validating the datastore header
#[derive(thiserror::Error, Debug)]
pub enum HeaderError {
    /// The magic number in the header does not match the expected value
    ///
    /// # Arguments
    /// * `u16` - The invalid magic number that was found
    #[error("Invalid magic number: {0:#06x}")]
    InvalidMagicNumber(u16),

    /// The datastore type discriminant does not identify a linked-reads datastore
    ///
    /// # Arguments
    /// * `u16` - The type discriminant that was found
    #[error("Invalid datastore type: {0} (expected linked reads)")]
    InvalidDatastoreType(u16),

    /// The format version in the header is not supported
    ///
    /// # Arguments
    /// * `u16` - The unsupported version number that was found
    #[error("Invalid format version: {0}")]
    InvalidFormatVersion(u16),

    /// The display name is not nul-terminated or not valid UTF-8
    #[error("Invalid display name in header")]
    InvalidName,

    /// The encoded capacity does not match the maximum read length
    #[error("Invalid encoded capacity: {found} (expected {expected} for the maximum read length)")]
    InvalidCapacity { expected: u64, found: u64 },
}

/// Errors that can occur while reading datastore or chunk data
#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    /// The file being read is not a regular file (e.g., it might be a directory or special file)
    #[error("File is not regular")]
    IncompatibleFile,

    /// The file appears to be truncated or corrupted
    ///
    /// # Arguments
    /// * `usize` - The size of the file in bytes
    #[error(
        "Number of bytes in file does not match expectation - possibly truncated at byte pos {0}"
    )]
    FileTruncation(usize),

    /// Attempted to access a read ordinal outside `[1, total_reads]`
    #[error("Requested read ordinal ({requested_index}) is out of record range (1..={max_index})")]
    OutOfRange {
        requested_index: u64,
        max_index: u64,
    },

    /// A stored sequence length exceeds the configured maximum read length
    #[error("Corrupt record at read ordinal {ordinal}: length {len} exceeds maximum {max}")]
    CorruptRecord { ordinal: u64, len: u64, max: u64 },

    /// A partial record was encountered at the end of a chunk file
    ///
    /// # Arguments
    /// * `usize` - The number of bytes read in the partial record
    #[error("Partial record at end of stream ({0} bytes)")]
    PartialRecord(usize),

    /// A worker thread panicked during parallel processing
    #[error("Worker thread panicked during parallel processing")]
    WorkerPanic,
}

/// Errors that can occur while writing a datastore
#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    /// The display name contains an interior nul byte
    #[error("Display name contains a nul byte: {0:?}")]
    InvalidName(String),

    /// The merge emitted a different number of pairs than was reserved in the tag index
    #[error("Merged pair count ({got}) does not match the reserved tag index ({expected})")]
    PairCountMismatch { expected: u64, got: u64 },

    /// The sequence contains invalid nucleotide characters
    ///
    /// # Arguments
    /// * `String` - Description of the invalid nucleotides found
    #[error("Invalid nucleotides found in sequence: {0}")]
    InvalidNucleotideSequence(String),
}

/// Errors in the configuration of a datastore build
#[derive(thiserror::Error, Debug)]
pub enum BuilderError {
    #[error("Missing maximum read length")]
    MissingMaxReadLength,

    #[error("Maximum read length must be greater than zero")]
    InvalidMaxReadLength,

    #[error("Batch size must be greater than zero")]
    InvalidBatchSize,
}
