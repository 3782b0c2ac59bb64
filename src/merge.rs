//! Streaming k-way merge of sorted chunk files
//!
//! All chunks are open at once, each with a one-tag lookahead. The smallest
//! upcoming tag is selected, then every chunk holding that tag (in chunk order)
//! has its whole consecutive run of records with that tag copied to the output.
//! Only one record body per chunk is buffered at a time.

use std::io::{Read, Write};

use log::debug;

use crate::{chunk::ChunkReader, error::Result};

/// Merges tag-sorted chunks into `writer`, returning the emitted tags in order
///
/// Records sharing a tag are emitted grouped by chunk, in the order the chunks
/// are given; no further ordering is applied within a tag.
pub fn merge_chunks<R: Read, W: Write>(
    chunks: &mut [ChunkReader<R>],
    writer: &mut W,
) -> Result<Vec<u32>> {
    let mut tags = Vec::new();
    let mut runs = 0usize;
    while let Some(min) = chunks.iter().filter_map(ChunkReader::peek_tag).min() {
        for chunk in chunks.iter_mut() {
            if chunk.peek_tag() == Some(min) {
                chunk.drain_run(min, writer, &mut tags)?;
                runs += 1;
            }
        }
    }
    debug!(
        "Merged {} chunks: {} pairs in {} runs",
        chunks.len(),
        tags.len(),
        runs
    );
    Ok(tags)
}
