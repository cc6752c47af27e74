//! Writes the DER signature into the reserved `/Contents` hex string.

use super::byterange::SignaturePlaceholder;
use crate::error::{Error, Result};

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Overwrite the placeholder digits with the uppercase hex of `signature`,
/// padding the remainder with `0`. The buffer length never changes.
///
/// # Errors
///
/// [`Error::PlaceholderTooSmall`] when the signature needs more bytes than
/// the placeholder reserves. The buffer is left untouched in that case.
pub fn splice_signature(pdf_data: &mut [u8], placeholder: &SignaturePlaceholder, signature: &[u8]) -> Result<()> {
    let available = placeholder.hex_capacity() / 2;
    if signature.len() > available {
        return Err(Error::PlaceholderTooSmall {
            needed: signature.len(),
            available,
        });
    }

    let start = placeholder.contents_offset;
    let end = start + placeholder.contents_len;
    let field = pdf_data
        .get_mut(start..end)
        .ok_or_else(|| Error::Signing(format!("Contents placeholder {}..{} beyond file end", start, end)))?;
    if field.first() != Some(&b'<') || field.last() != Some(&b'>') {
        return Err(Error::Signing(format!("no hex string delimiters at Contents offset {}", start)));
    }

    let digits = &mut field[1..placeholder.contents_len - 1];
    for (pair, byte) in digits.chunks_exact_mut(2).zip(signature) {
        pair[0] = HEX_DIGITS[(byte >> 4) as usize];
        pair[1] = HEX_DIGITS[(byte & 0x0F) as usize];
    }
    digits[signature.len() * 2..].fill(b'0');

    log::debug!(
        "Spliced {} signature bytes into {} reserved at {}",
        signature.len(),
        available,
        start
    );
    Ok(())
}
