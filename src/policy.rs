use rand::Rng;

use crate::{error::WriteError, Result};

/// Policy for handling reads containing symbols other than `A`, `C`, `G`, `T`
///
/// The 2-bit encoding cannot represent such symbols, so a read containing them
/// either excludes its whole pair from the datastore or is rewritten before
/// encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Policy {
    /// Exclude the pair from the datastore
    #[default]
    IgnoreSequence,
    /// Fail the build
    BreakOnInvalid,
    /// Replace each invalid symbol with a random nucleotide
    RandomDraw,
    SetToA,
    SetToC,
    SetToG,
    SetToT,
}
impl Policy {
    fn fill_with_known(sequence: &[u8], val: u8, ibuf: &mut Vec<u8>) {
        ibuf.extend(sequence.iter().map(|&n| match n {
            b'A' | b'C' | b'G' | b'T' => n,
            _ => val,
        }));
    }

    fn fill_with_random<R: Rng>(sequence: &[u8], rng: &mut R, ibuf: &mut Vec<u8>) {
        ibuf.extend(sequence.iter().map(|&n| match n {
            b'A' | b'C' | b'G' | b'T' => n,
            _ => b"ACGT"[rng.random_range(0..4)],
        }));
    }

    /// Convert the sequence according to the policy
    ///
    /// First clears the input buffer to ensure that it is empty.
    ///
    /// Returns a boolean indicating whether the sequence should be processed further.
    /// Returns an error if the build should be broken on invalid nucleotides.
    ///
    /// # Arguments
    /// * `sequence` - The sequence to be converted
    /// * `ibuf` - The buffer to store the converted sequence
    /// * `rng` - The random number generator
    pub fn handle<R: Rng>(&self, sequence: &[u8], ibuf: &mut Vec<u8>, rng: &mut R) -> Result<bool> {
        ibuf.clear();
        match self {
            Self::IgnoreSequence => Ok(false),
            Self::BreakOnInvalid => {
                let seq_str = std::str::from_utf8(sequence)?.to_string();
                Err(WriteError::InvalidNucleotideSequence(seq_str).into())
            }
            Self::RandomDraw => {
                Self::fill_with_random(sequence, rng, ibuf);
                Ok(true)
            }
            Self::SetToA => {
                Self::fill_with_known(sequence, b'A', ibuf);
                Ok(true)
            }
            Self::SetToC => {
                Self::fill_with_known(sequence, b'C', ibuf);
                Ok(true)
            }
            Self::SetToG => {
                Self::fill_with_known(sequence, b'G', ibuf);
                Ok(true)
            }
            Self::SetToT => {
                Self::fill_with_known(sequence, b'T', ibuf);
                Ok(true)
            }
        }
    }
}
