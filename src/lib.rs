//! # lrseq
//!
//! An indexed, barcode-sorted binary datastore for linked paired-end reads.
//!
//! A datastore is built once from two synchronized read streams (read 1 and
//! read 2 of every pair). Each pair is assigned a 32-bit tag derived from its
//! barcode, and pairs are stored grouped by tag in a single immutable file that
//! supports constant-time random access to any read.
//!
//! Construction is an external sort: pairs are accumulated in bounded batches,
//! sorted by tag and spilled to temporary chunk files, which are then k-way
//! merged into the final container.
//!
//! ## File layout
//!
//! All integers are little-endian. `C` is the encoded capacity of a sequence
//! slot, `8 * ceil(max_read_length / 32)` bytes.
//!
//! | field            | size                 |
//! | ---------------- | -------------------- |
//! | magic (`DS`)     | 2                    |
//! | datastore type   | 2                    |
//! | format version   | 2                    |
//! | display name     | variable, nul-terminated |
//! | max read length  | 8                    |
//! | encoded capacity | 8                    |
//! | pair count `N`   | 8                    |
//! | tag index        | `4 * N`              |
//! | pair records     | `N * (4 + 2 * (8 + C))` |
//!
//! Each pair record holds the tag followed by the length and 2-bit encoded
//! payload of each read. Reads are numbered from 1: pair `p` (0-based) holds
//! reads `2p + 1` and `2p + 2`.
//!
//! ## Example
//!
//! ```no_run
//! use lrseq::{fastq_source, LinkedReadsBuilder, Result, TenxTagExtractor};
//!
//! fn main() -> Result<()> {
//!     let datastore = LinkedReadsBuilder::default()
//!         .name("sample")
//!         .max_read_length(150)
//!         .build(
//!             "sample.lrds",
//!             fastq_source("sample_R1.fastq.gz")?,
//!             fastq_source("sample_R2.fastq.gz")?,
//!             TenxTagExtractor,
//!         )?;
//!
//!     for ordinal in 1..=datastore.total_reads() {
//!         let tag = datastore.get_tag(ordinal)?;
//!         let sequence = datastore.get_sequence(ordinal)?;
//!         println!("{tag}\t{}", std::str::from_utf8(&sequence)?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod chunk;
mod encode;
mod error;
pub mod header;
pub mod merge;
mod parallel;
mod policy;
mod reader;
pub mod record;
mod source;
mod tag;
mod utils;
mod writer;

pub use error::{BuilderError, Error, HeaderError, ReadError, Result, WriteError};
pub use header::{DatastoreKind, LinkedReadsHeader};
pub use parallel::{ParallelProcessor, ParallelReader};
pub use policy::Policy;
pub use reader::{LinkedReadsDatastore, RefPair};
pub use record::RecordConfig;
pub use source::{fastq_source, FastqSource, InMemorySource, ReadSource, SourceRead};
pub use tag::{
    encode_barcode, DelimitedTagExtractor, FnTagExtractor, TagExtractor, TenxTagExtractor,
    BARCODE_LENGTH, NO_TAG,
};
pub use utils::expected_file_size;
pub use writer::{BuildSummary, LinkedReadsBuilder, DEFAULT_BATCH_SIZE, MAX_READ_LENGTH};

/// Seed for the random number generator used by [`Policy::RandomDraw`]
pub const RNG_SEED: u64 = 42;
