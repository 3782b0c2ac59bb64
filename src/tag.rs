//! Barcode tag extraction
//!
//! Every pair is assigned a 32-bit tag derived from the identifier of its first
//! read. How the barcode is embedded in the identifier depends on the library
//! preparation, so extraction is a pluggable [`TagExtractor`].
//!
//! The tag [`NO_TAG`] marks a pair whose barcode could not be parsed; such pairs
//! are never stored.

use auto_impl::auto_impl;
use memchr::{memmem, memrchr};

/// Reserved tag for pairs without a valid barcode
pub const NO_TAG: u32 = 0;

/// Number of barcode bases packed into a tag
pub const BARCODE_LENGTH: usize = 16;

/// Computes the tag of a pair from the identifier of its first read
///
/// Implemented for references, boxes and `Arc`s of extractors. Closures can be
/// used through [`FnTagExtractor`].
#[auto_impl(&, Box, Arc)]
pub trait TagExtractor {
    /// Returns the tag encoded in `id`, or [`NO_TAG`] if there is none
    fn extract(&self, id: &[u8]) -> u32;
}

/// Packs the first [`BARCODE_LENGTH`] bases of `bases` into a tag
///
/// Returns [`NO_TAG`] if fewer bases are available or any of them is not one of
/// `A`, `C`, `G`, `T`. Note that the all-`A` barcode also packs to [`NO_TAG`].
#[must_use]
pub fn encode_barcode(bases: &[u8]) -> u32 {
    let Some(barcode) = bases.get(..BARCODE_LENGTH) else {
        return NO_TAG;
    };
    let mut packed = Vec::with_capacity(1);
    match bitnuc::encode(barcode, &mut packed) {
        Ok(()) => packed.first().map_or(NO_TAG, |&word| word as u32),
        Err(_) => NO_TAG,
    }
}

/// Adapts a closure `Fn(&[u8]) -> u32` into a [`TagExtractor`]
#[derive(Debug, Clone, Copy)]
pub struct FnTagExtractor<F>(pub F);
impl<F: Fn(&[u8]) -> u32> TagExtractor for FnTagExtractor<F> {
    fn extract(&self, id: &[u8]) -> u32 {
        (self.0)(id)
    }
}

/// Extracts 10x Genomics style barcodes stored as a `BX:Z:` comment field
///
/// e.g. `@read1 BX:Z:ACGTACGTACGTACGT-1`
#[derive(Debug, Clone, Copy, Default)]
pub struct TenxTagExtractor;
impl TagExtractor for TenxTagExtractor {
    fn extract(&self, id: &[u8]) -> u32 {
        const FIELD: &[u8] = b"BX:Z:";
        memmem::find(id, FIELD).map_or(NO_TAG, |pos| encode_barcode(&id[pos + FIELD.len()..]))
    }
}

/// Extracts barcodes appended to the read name after a delimiter
///
/// The barcode follows the last occurrence of the delimiter, e.g.
/// `@read1_ACGTACGTACGTACGT` with the default `_` delimiter.
#[derive(Debug, Clone, Copy)]
pub struct DelimitedTagExtractor {
    delimiter: u8,
}
impl DelimitedTagExtractor {
    #[must_use]
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }
}
impl Default for DelimitedTagExtractor {
    fn default() -> Self {
        Self::new(b'_')
    }
}
impl TagExtractor for DelimitedTagExtractor {
    fn extract(&self, id: &[u8]) -> u32 {
        // only the read name takes part, comments are ignored
        let name = id.split(|&b| b == b' ').next().unwrap_or(id);
        memrchr(self.delimiter, name).map_or(NO_TAG, |pos| encode_barcode(&name[pos + 1..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_encode_barcode() {
        let a = encode_barcode(b"ACGTACGTACGTACGT");
        let b = encode_barcode(b"ACGTACGTACGTACGA");
        assert_ne!(a, NO_TAG);
        assert_ne!(a, b);
        // only the first 16 bases count
        assert_eq!(a, encode_barcode(b"ACGTACGTACGTACGT-1"));
        assert_eq!(encode_barcode(b"ACGTACGT"), NO_TAG);
        assert_eq!(encode_barcode(b"ACGTACGTNCGTACGT"), NO_TAG);
        assert_eq!(encode_barcode(b"AAAAAAAAAAAAAAAA"), NO_TAG);
    }

    #[test]
    fn test_tenx_extractor() {
        let extractor = TenxTagExtractor;
        let tag = extractor.extract(b"read1 BX:Z:ACGTACGTACGTACGT-1");
        assert_eq!(tag, encode_barcode(b"ACGTACGTACGTACGT"));
        assert_eq!(extractor.extract(b"read1"), NO_TAG);
        assert_eq!(extractor.extract(b"read1 BX:Z:ACG"), NO_TAG);
    }

    #[test]
    fn test_delimited_extractor() {
        let extractor = DelimitedTagExtractor::default();
        let tag = extractor.extract(b"run_7_TTTTACGTACGTACGT 1:N:0");
        assert_eq!(tag, encode_barcode(b"TTTTACGTACGTACGT"));
        assert_eq!(extractor.extract(b"nodelimiter"), NO_TAG);

        let colon = DelimitedTagExtractor::new(b':');
        assert_eq!(
            colon.extract(b"x:TTTTACGTACGTACGT"),
            encode_barcode(b"TTTTACGTACGTACGT")
        );
    }

    #[test]
    fn test_proxies() {
        fn tag_of<E: TagExtractor>(extractor: E) -> u32 {
            extractor.extract(b"read1 BX:Z:CCCCACGTACGTACGT")
        }
        let expected = encode_barcode(b"CCCCACGTACGTACGT");
        assert_eq!(tag_of(&TenxTagExtractor), expected);
        assert_eq!(tag_of(Arc::new(TenxTagExtractor)), expected);
        let boxed: Box<dyn TagExtractor> = Box::new(TenxTagExtractor);
        assert_eq!(tag_of(boxed), expected);
        assert_eq!(tag_of(FnTagExtractor(|id: &[u8]| id.len() as u32)), 27);
    }
}
