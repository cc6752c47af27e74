//! ByteRange resolution for PDF signatures.
//!
//! PDF digital signatures use a ByteRange array to specify which portions
//! of the document are covered by the signature. The signature itself is
//! stored in a placeholder that is excluded from the signed bytes.
//!
//! ## ByteRange Format
//!
//! The ByteRange is an array of four integers:
//! `[offset1, length1, offset2, length2]`
//!
//! Where:
//! - `offset1` = 0 (start of file)
//! - `length1` = byte offset of the `<` opening the signature value
//! - `offset2` = byte offset just past the closing `>`
//! - `length2` = remaining bytes to end of file
//!
//! The placeholder array is written with fixed-width `9…9` integers and
//! rewritten in place once the offsets are known. The rewrite pads with
//! spaces before `]` so the file length never changes.

use crate::config::SignerConfig;
use crate::error::{Error, Result};
use crate::parser::find_subsequence;

/// Location of the two placeholders inside a prepared file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignaturePlaceholder {
    /// Offset of the `[` opening the /ByteRange array
    pub byte_range_offset: usize,
    /// Length of the array text through `]`
    pub byte_range_len: usize,
    /// Offset of the `<` opening the /Contents hex string
    pub contents_offset: usize,
    /// Length of the hex string including `<` and `>`
    pub contents_len: usize,
}

impl SignaturePlaceholder {
    /// Number of hex digits the /Contents field holds.
    pub fn hex_capacity(&self) -> usize {
        self.contents_len.saturating_sub(2)
    }
}

/// The two signed spans of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Start of the first span (always 0)
    pub start1: usize,
    /// Length of the first span
    pub len1: usize,
    /// Start of the second span
    pub start2: usize,
    /// Length of the second span
    pub len2: usize,
}

impl ByteRange {
    /// As the four integers written into /ByteRange.
    pub fn as_array(&self) -> [u64; 4] {
        [self.start1 as u64, self.len1 as u64, self.start2 as u64, self.len2 as u64]
    }

    /// Borrow the two signed spans from `pdf_data`.
    pub fn spans<'a>(&self, pdf_data: &'a [u8]) -> Result<[&'a [u8]; 2]> {
        let end1 = self.start1.checked_add(self.len1);
        let end2 = self.start2.checked_add(self.len2);
        match (end1, end2) {
            (Some(end1), Some(end2)) if end1 <= pdf_data.len() && end2 <= pdf_data.len() => {
                Ok([&pdf_data[self.start1..end1], &pdf_data[self.start2..end2]])
            },
            _ => Err(Error::MalformedDocument(format!(
                "ByteRange {:?} exceeds file size {}",
                self.as_array(),
                pdf_data.len()
            ))),
        }
    }

    /// Parse the four integers of a /ByteRange array.
    pub fn from_values(values: &[i64]) -> Result<Self> {
        match values {
            [a, b, c, d] if [a, b, c, d].iter().all(|v| **v >= 0) => Ok(Self {
                start1: *a as usize,
                len1: *b as usize,
                start2: *c as usize,
                len2: *d as usize,
            }),
            _ => Err(Error::MalformedDocument(format!(
                "ByteRange must hold four non-negative integers, got {:?}",
                values
            ))),
        }
    }

    /// Check that the ranges start at 0, end at EOF, do not overlap, and
    /// leave exactly one gap.
    pub fn validate(&self, file_size: usize) -> Result<()> {
        if self.start1 != 0 {
            return Err(Error::MalformedDocument(format!("ByteRange must start at 0, got {}", self.start1)));
        }
        if self.start2.checked_add(self.len2) != Some(file_size) {
            return Err(Error::MalformedDocument(format!(
                "ByteRange must end at file size {}, got {}",
                file_size,
                self.start2.saturating_add(self.len2)
            )));
        }
        if self.len1 > self.start2 {
            return Err(Error::MalformedDocument(format!(
                "ByteRange first range ({}) overlaps with second range start ({})",
                self.len1, self.start2
            )));
        }
        Ok(())
    }
}

/// Finds the placeholders in a prepared file and rewrites /ByteRange in place.
#[derive(Debug, Clone, Copy)]
pub struct ByteRangeResolver<'c> {
    config: &'c SignerConfig,
}

impl<'c> ByteRangeResolver<'c> {
    /// Create a resolver for placeholders written with `config`.
    pub fn new(config: &'c SignerConfig) -> Self {
        Self { config }
    }

    /// Placeholder array text as written by the injector.
    pub fn placeholder_text(&self) -> String {
        let max = self.config.max_byte_range_value();
        format!("[0 {} {} {}]", max, max, max)
    }

    /// Scan `pdf_data` from `search_from` for the /ByteRange and /Contents
    /// placeholders.
    pub fn locate(&self, pdf_data: &[u8], search_from: usize) -> Result<SignaturePlaceholder> {
        let appended = pdf_data
            .get(search_from..)
            .ok_or_else(|| Error::Signing(format!("update offset {} beyond file end", search_from)))?;

        let array = self.placeholder_text();
        let needle = format!("/ByteRange {}", array);
        let key_pos = find_subsequence(appended, needle.as_bytes())
            .ok_or_else(|| Error::Signing("ByteRange placeholder not found in update".into()))?;
        let byte_range_offset = search_from + key_pos + b"/ByteRange ".len();
        let byte_range_len = array.len();

        // Keys are written sorted, so /Contents follows /ByteRange in the same
        // dictionary. Matching the full zero run skips look-alikes in text values.
        let after_array = byte_range_offset + byte_range_len;
        let contents_len = self.config.contents_field_len();
        let mut contents_needle = Vec::with_capacity(contents_len + 10);
        contents_needle.extend_from_slice(b"/Contents <");
        contents_needle.resize(contents_needle.len() + contents_len - 2, b'0');
        contents_needle.push(b'>');
        let contents_key = find_subsequence(&pdf_data[after_array..], &contents_needle).ok_or_else(|| {
            Error::Signing(format!(
                "Contents placeholder of {} zero hex digits not found in update",
                contents_len - 2
            ))
        })?;
        let contents_offset = after_array + contents_key + b"/Contents ".len();

        log::debug!(
            "Placeholders: ByteRange at {} ({} bytes), Contents at {} ({} bytes)",
            byte_range_offset,
            byte_range_len,
            contents_offset,
            contents_len
        );

        Ok(SignaturePlaceholder {
            byte_range_offset,
            byte_range_len,
            contents_offset,
            contents_len,
        })
    }

    /// Compute the signed spans and overwrite the /ByteRange placeholder
    /// with them, keeping the file length unchanged.
    ///
    /// # Errors
    ///
    /// [`Error::ByteRangeOverflow`] when the formatted array does not fit
    /// into the placeholder.
    pub fn resolve(&self, pdf_data: &mut [u8], placeholder: &SignaturePlaceholder) -> Result<ByteRange> {
        let start2 = placeholder.contents_offset + placeholder.contents_len;
        if start2 > pdf_data.len()
            || placeholder.byte_range_offset + placeholder.byte_range_len > placeholder.contents_offset
        {
            return Err(Error::Signing("placeholder offsets outside the prepared file".into()));
        }

        let range = ByteRange {
            start1: 0,
            len1: placeholder.contents_offset,
            start2,
            len2: pdf_data.len() - start2,
        };

        let text = format_byte_range(&range, placeholder.byte_range_len)?;
        pdf_data[placeholder.byte_range_offset..placeholder.byte_range_offset + placeholder.byte_range_len]
            .copy_from_slice(&text);

        log::debug!("ByteRange resolved to {:?}", range.as_array());
        Ok(range)
    }
}

/// Format `range` as `[0 A B C` padded with spaces and closed with `]` to
/// exactly `width` bytes.
///
/// ```
/// use pdf_signer::signatures::{format_byte_range, ByteRange};
///
/// let range = ByteRange { start1: 0, len1: 10, start2: 30, len2: 5 };
/// assert_eq!(format_byte_range(&range, 16).unwrap(), b"[0 10 30 5     ]");
/// assert!(format_byte_range(&range, 8).is_err());
/// ```
pub fn format_byte_range(range: &ByteRange, width: usize) -> Result<Vec<u8>> {
    let [a, b, c, d] = range.as_array();
    let mut text = format!("[{} {} {} {}", a, b, c, d).into_bytes();
    let needed = text.len() + 1;
    if needed > width {
        return Err(Error::ByteRangeOverflow {
            needed,
            available: width,
        });
    }
    text.resize(width - 1, b' ');
    text.push(b']');
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Build `prefix /ByteRange [..]/Contents <00..> suffix` the way the
    /// injector lays out a signature dictionary.
    fn prepared(config: &SignerConfig, prefix: usize, suffix: usize) -> Vec<u8> {
        let resolver = ByteRangeResolver::new(config);
        let mut out = vec![b'%'; prefix];
        out.extend_from_slice(b"<</ByteRange ");
        out.extend_from_slice(resolver.placeholder_text().as_bytes());
        out.extend_from_slice(b"/Contents <");
        out.extend(std::iter::repeat(b'0').take(config.signature_size * 2));
        out.extend_from_slice(b">/Type /Sig>>");
        out.extend(std::iter::repeat(b'x').take(suffix));
        out
    }

    #[test]
    fn test_placeholder_text_width() {
        let config = SignerConfig::default();
        assert_eq!(
            ByteRangeResolver::new(&config).placeholder_text(),
            "[0 9999999999 9999999999 9999999999]"
        );
    }

    #[test]
    fn test_locate_and_resolve() {
        let config = SignerConfig::default().with_signature_size(16);
        let mut data = prepared(&config, 100, 50);
        let original_len = data.len();
        let resolver = ByteRangeResolver::new(&config);

        let placeholder = resolver.locate(&data, 90).unwrap();
        assert_eq!(data[placeholder.contents_offset], b'<');
        assert_eq!(placeholder.contents_len, 34);
        assert_eq!(placeholder.hex_capacity(), 32);

        let range = resolver.resolve(&mut data, &placeholder).unwrap();
        assert_eq!(data.len(), original_len);
        assert_eq!(range.len1, placeholder.contents_offset);
        assert_eq!(range.start2, placeholder.contents_offset + 34);
        assert_eq!(range.start2 + range.len2, data.len());
        range.validate(data.len()).unwrap();

        let array_text = &data[placeholder.byte_range_offset..placeholder.byte_range_offset + placeholder.byte_range_len];
        let (_, parsed) = crate::parser::parse_object(array_text).unwrap();
        let values: Vec<i64> = parsed.as_array().unwrap().iter().filter_map(|v| v.as_integer()).collect();
        assert_eq!(ByteRange::from_values(&values).unwrap(), range);
    }

    #[test]
    fn test_locate_ignores_bytes_before_update() {
        let config = SignerConfig::default().with_signature_size(4);
        let data = prepared(&config, 10, 0);
        assert!(ByteRangeResolver::new(&config).locate(&data, 30).is_err());
    }

    #[test]
    fn test_locate_rejects_tampered_contents() {
        let config = SignerConfig::default().with_signature_size(4);
        let mut data = prepared(&config, 0, 0);
        let pos = find_subsequence(&data, b"<0000").unwrap();
        data[pos + 2] = b'A';
        assert!(ByteRangeResolver::new(&config).locate(&data, 0).is_err());
    }

    #[test]
    fn test_overflow_with_narrow_digits() {
        let config = SignerConfig::default()
            .with_signature_size(8)
            .with_byte_range_digits(1);
        let mut data = prepared(&config, 20, 20);
        let resolver = ByteRangeResolver::new(&config);
        let placeholder = resolver.locate(&data, 0).unwrap();
        let err = resolver.resolve(&mut data, &placeholder).unwrap_err();
        assert!(matches!(err, Error::ByteRangeOverflow { available: 9, .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::ByteRangeOverflow);
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let range = ByteRange { start1: 1, len1: 10, start2: 20, len2: 5 };
        assert!(range.validate(25).is_err());
        let range = ByteRange { start1: 0, len1: 10, start2: 20, len2: 4 };
        assert!(range.validate(25).is_err());
        let range = ByteRange { start1: 0, len1: 30, start2: 20, len2: 5 };
        assert!(range.validate(25).is_err());
        assert!(ByteRange::from_values(&[0, 1, 2]).is_err());
        assert!(ByteRange::from_values(&[0, -1, 2, 3]).is_err());
    }

    #[test]
    fn test_spans_out_of_bounds() {
        let range = ByteRange { start1: 0, len1: 10, start2: 20, len2: 50 };
        assert!(range.spans(&[0u8; 30]).is_err());
    }

    proptest! {
        #[test]
        fn prop_resolve_preserves_length_and_covers_all_but_contents(
            prefix in 0usize..5000,
            suffix in 0usize..5000,
            signature_size in 1usize..256,
            digits in 5usize..=18,
        ) {
            let config = SignerConfig::default()
                .with_signature_size(signature_size)
                .with_byte_range_digits(digits);
            let mut data = prepared(&config, prefix, suffix);
            let before = data.clone();
            let resolver = ByteRangeResolver::new(&config);

            let placeholder = resolver.locate(&data, 0).unwrap();
            let range = resolver.resolve(&mut data, &placeholder).unwrap();

            prop_assert_eq!(data.len(), before.len());
            prop_assert!(range.validate(data.len()).is_ok());
            prop_assert_eq!(range.len2 + range.len1 + placeholder.contents_len, data.len());
            prop_assert_eq!(&data[range.len1..range.start2], &before[range.len1..range.start2]);
            prop_assert_eq!(data[range.len1], b'<');
            prop_assert_eq!(data[range.start2 - 1], b'>');
            // Only the ByteRange text changed
            let br = placeholder.byte_range_offset..placeholder.byte_range_offset + placeholder.byte_range_len;
            prop_assert_eq!(&data[..br.start], &before[..br.start]);
            prop_assert_eq!(&data[br.end..], &before[br.end..]);
        }

        #[test]
        fn prop_format_is_exact_width_or_overflow(
            len1 in 0usize..100_000_000,
            gap in 2usize..100_000,
            len2 in 0usize..100_000_000,
            width in 4usize..64,
        ) {
            let range = ByteRange { start1: 0, len1, start2: len1 + gap, len2 };
            match format_byte_range(&range, width) {
                Ok(text) => {
                    prop_assert_eq!(text.len(), width);
                    prop_assert_eq!(text.last(), Some(&b']'));
                },
                Err(Error::ByteRangeOverflow { needed, available }) => {
                    prop_assert!(needed > available);
                    prop_assert_eq!(available, width);
                },
                Err(other) => prop_assert!(false, "unexpected error {}", other),
            }
        }
    }
}
