//! Sequence encoding boundary
//!
//! Reads are stored as 2-bit packed nucleotides (see [`bitnuc`]) in fixed-capacity
//! slots of u64 words. Reads longer than the configured maximum length are
//! truncated before encoding; the unused words of a slot are zero padding.

use byteorder::{ByteOrder, LittleEndian};
use rand::{rngs::SmallRng, SeedableRng};

use crate::{error::Result, record::RecordConfig, Policy, RNG_SEED};

/// Outcome of encoding one read into a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoded {
    /// The read was stored with this many bases
    Stored { len: u64, truncated: bool },
    /// The read contained invalid nucleotides and the policy excludes it
    Skipped,
}

/// Encodes nucleotide reads into fixed-capacity 2-bit slots
///
/// Invalid nucleotides are handled according to the configured [`Policy`].
/// The rewrite buffer is reused across calls.
pub struct Encoder {
    config: RecordConfig,

    /// Temporary buffer for sequences rewritten by the policy
    ibuf: Vec<u8>,

    /// Policy for handling invalid nucleotides during encoding
    policy: Policy,

    /// Random number generator for the `RandomDraw` policy
    /// Seeded with `RNG_SEED` for reproducibility
    rng: SmallRng,
}
impl Encoder {
    #[cfg(test)]
    #[must_use]
    pub fn new(config: RecordConfig) -> Self {
        Self::with_policy(config, Policy::default())
    }

    #[must_use]
    pub fn with_policy(config: RecordConfig, policy: Policy) -> Self {
        Self {
            config,
            ibuf: Vec::new(),
            policy,
            rng: SmallRng::seed_from_u64(RNG_SEED),
        }
    }

    /// Encodes a read into `slot`, truncating it to the maximum read length
    ///
    /// On success the slot holds exactly [`RecordConfig::words`] words.
    pub fn encode_into(&mut self, sequence: &[u8], slot: &mut Vec<u64>) -> Result<Encoded> {
        let max = self.config.max_read_length() as usize;
        let truncated = sequence.len() > max;
        let sequence = &sequence[..sequence.len().min(max)];

        slot.clear();
        if !sequence.is_empty() && bitnuc::encode(sequence, slot).is_err() {
            slot.clear();
            if !self.policy.handle(sequence, &mut self.ibuf, &mut self.rng)? {
                return Ok(Encoded::Skipped);
            }
            bitnuc::encode(&self.ibuf, slot)?;
        }
        slot.resize(self.config.words(), 0);

        Ok(Encoded::Stored {
            len: sequence.len() as u64,
            truncated,
        })
    }
}

/// Decodes a serialized sequence slot payload into `dbuf`
///
/// Only the first `ceil(len / 32)` words of the payload are read; the rest of
/// the slot is padding. `ebuf` is a reusable word buffer.
pub fn decode_payload(
    payload: &[u8],
    len: usize,
    ebuf: &mut Vec<u64>,
    dbuf: &mut Vec<u8>,
) -> Result<()> {
    dbuf.clear();
    if len == 0 {
        return Ok(());
    }
    let words = len.div_ceil(32);
    ebuf.clear();
    ebuf.resize(words, 0);
    LittleEndian::read_u64_into(&payload[..words * 8], ebuf);
    bitnuc::decode(ebuf, len, dbuf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::write_buffer;

    fn roundtrip(encoder: &mut Encoder, sequence: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut slot = Vec::new();
        let Encoded::Stored { len, .. } = encoder.encode_into(sequence, &mut slot)? else {
            anyhow::bail!("sequence was skipped");
        };
        let mut payload = Vec::new();
        write_buffer(&mut payload, &slot)?;
        let mut dbuf = Vec::new();
        decode_payload(&payload, len as usize, &mut Vec::new(), &mut dbuf)?;
        Ok(dbuf)
    }

    #[test]
    fn test_short_read_is_padded() -> anyhow::Result<()> {
        let config = RecordConfig::new(100);
        let mut encoder = Encoder::new(config);
        let mut slot = Vec::new();
        let outcome = encoder.encode_into(b"ACGTACGT", &mut slot)?;
        assert_eq!(
            outcome,
            Encoded::Stored {
                len: 8,
                truncated: false
            }
        );
        assert_eq!(slot.len(), config.words());
        assert!(slot[1..].iter().all(|&w| w == 0));
        assert_eq!(roundtrip(&mut encoder, b"ACGTACGT")?, b"ACGTACGT");
        Ok(())
    }

    #[test]
    fn test_long_read_is_truncated() -> anyhow::Result<()> {
        let mut encoder = Encoder::new(RecordConfig::new(40));
        let sequence = b"ACGT".repeat(15);
        let mut slot = Vec::new();
        let outcome = encoder.encode_into(&sequence, &mut slot)?;
        assert_eq!(
            outcome,
            Encoded::Stored {
                len: 40,
                truncated: true
            }
        );
        assert_eq!(roundtrip(&mut encoder, &sequence)?, &sequence[..40]);
        Ok(())
    }

    #[test]
    fn test_empty_read() -> anyhow::Result<()> {
        let config = RecordConfig::new(16);
        let mut encoder = Encoder::new(config);
        let mut slot = vec![7];
        let outcome = encoder.encode_into(b"", &mut slot)?;
        assert_eq!(
            outcome,
            Encoded::Stored {
                len: 0,
                truncated: false
            }
        );
        assert_eq!(slot, vec![0; config.words()]);
        assert!(roundtrip(&mut encoder, b"")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_invalid_nucleotides_follow_policy() -> anyhow::Result<()> {
        let config = RecordConfig::new(32);
        let mut ignoring = Encoder::new(config);
        let mut slot = Vec::new();
        assert_eq!(ignoring.encode_into(b"ACGNT", &mut slot)?, Encoded::Skipped);

        let mut replacing = Encoder::with_policy(config, Policy::SetToC);
        assert_eq!(roundtrip(&mut replacing, b"ACGNT")?, b"ACGCT");
        Ok(())
    }
}
