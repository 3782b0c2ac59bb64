use crate::header::SIZE_HEADER_FIXED;
use crate::record::RecordConfig;

/// Calculates the number of expected bytes in a linked-reads datastore
///
/// Returns `None` if the size does not fit in a `usize`.
#[must_use]
pub fn expected_file_size(name_len: usize, num_pairs: usize, max_read_length: u64) -> Option<usize> {
    let config = RecordConfig::new(max_read_length);

    // fixed header fields (nul terminator included) + name
    let header_size = SIZE_HEADER_FIXED.checked_add(name_len)?;

    // pair count + one u32 tag per pair
    let index_size = num_pairs.checked_mul(4)?.checked_add(8)?;

    let records_size = num_pairs.checked_mul(config.pair_size())?;

    header_size.checked_add(index_size)?.checked_add(records_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PairRecord;
    use crate::LinkedReadsHeader;
    use byteorder::{LittleEndian, WriteBytesExt};

    /// Serializes a datastore with `num_pairs` empty pairs
    fn serialized_len(name: &str, num_pairs: usize, max_read_length: u64) -> anyhow::Result<usize> {
        let header = LinkedReadsHeader::new(name, max_read_length)?;
        let config = RecordConfig::from_header(&header);
        let mut buffer = Vec::new();
        header.write_bytes(&mut buffer)?;
        assert_eq!(buffer.len(), header.size());

        buffer.write_u64::<LittleEndian>(num_pairs as u64)?;
        for _ in 0..num_pairs {
            buffer.write_u32::<LittleEndian>(1)?;
        }
        let mut record = PairRecord::new(config);
        record.tag = 1;
        record.seq1.resize(config.words(), 0);
        record.seq2.resize(config.words(), 0);
        for _ in 0..num_pairs {
            record.write_bytes(&mut buffer)?;
        }
        Ok(buffer.len())
    }

    #[test]
    fn test_expected_file_size_matches_written_bytes() -> anyhow::Result<()> {
        for (name, num_pairs, max_read_length) in
            [("", 0, 32), ("", 1, 4), ("name", 3, 32), ("", 1, 33), ("sample", 5, 150)]
        {
            assert_eq!(
                expected_file_size(name.len(), num_pairs, max_read_length),
                Some(serialized_len(name, num_pairs, max_read_length)?),
                "name {name:?}, {num_pairs} pairs, max length {max_read_length}"
            );
        }
        Ok(())
    }

    #[test]
    fn test_expected_file_size_overflow() {
        assert_eq!(expected_file_size(0, 2, u64::MAX), None);
        assert_eq!(expected_file_size(0, usize::MAX, 32), None);
        assert!(expected_file_size(0, 0, u64::MAX).is_some());
    }
}
