//! Signer configuration.
//!
//! The two reserved widths decide whether a signature fits into the file:
//!
//! * `signature_size` is the number of DER bytes reserved for the CMS blob.
//!   `/Contents` occupies `2 * signature_size + 2` bytes in the file. A CMS
//!   blob larger than this fails with [`Error::PlaceholderTooSmall`]; long
//!   certificate chains are the usual cause.
//! * `byte_range_digits` is the width of each `/ByteRange` integer
//!   placeholder. Files whose offsets need more digits fail with
//!   [`Error::ByteRangeOverflow`].

use crate::error::{Error, Result};
use crate::signatures::{DigestAlgorithm, SignatureSubFilter};

/// Default number of bytes reserved for the DER-encoded signature.
pub const DEFAULT_SIGNATURE_SIZE: usize = 8192;

/// Default width of each /ByteRange integer.
pub const DEFAULT_BYTE_RANGE_DIGITS: usize = 10;

/// Widest /ByteRange placeholder that still fits an `i64`.
pub const MAX_BYTE_RANGE_DIGITS: usize = 18;

/// Environment variable overriding `signature_size` in the binary.
pub const ENV_SIGNATURE_SIZE: &str = "PDF_SIGNER_SIGNATURE_SIZE";

/// Signing configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SignerConfig {
    /// Bytes reserved for the DER-encoded CMS signature.
    pub signature_size: usize,

    /// Digits reserved for each /ByteRange integer.
    pub byte_range_digits: usize,

    /// Digest applied to the signed byte ranges.
    pub digest_algorithm: DigestAlgorithm,

    /// /SubFilter written into the signature dictionary.
    pub sub_filter: SignatureSubFilter,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SignerConfig {
    /// Create new configuration with defaults.
    pub fn new() -> Self {
        Self {
            signature_size: DEFAULT_SIGNATURE_SIZE,
            byte_range_digits: DEFAULT_BYTE_RANGE_DIGITS,
            digest_algorithm: DigestAlgorithm::Sha256,
            sub_filter: SignatureSubFilter::Pkcs7Detached,
        }
    }

    /// Set the reserved signature size in bytes.
    pub fn with_signature_size(mut self, size: usize) -> Self {
        self.signature_size = size;
        self
    }

    /// Set the /ByteRange digit width.
    pub fn with_byte_range_digits(mut self, digits: usize) -> Self {
        self.byte_range_digits = digits;
        self
    }

    /// Set the digest algorithm.
    pub fn with_digest_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = algorithm;
        self
    }

    /// Set the /SubFilter.
    pub fn with_sub_filter(mut self, sub_filter: SignatureSubFilter) -> Self {
        self.sub_filter = sub_filter;
        self
    }

    /// Apply `PDF_SIGNER_SIGNATURE_SIZE` if it is set.
    pub fn with_env_overrides(self) -> Result<Self> {
        match std::env::var(ENV_SIGNATURE_SIZE) {
            Ok(value) => {
                let size = value.trim().parse::<usize>().map_err(|_| {
                    Error::InvalidRequest(format!("{} must be a byte count, got {:?}", ENV_SIGNATURE_SIZE, value))
                })?;
                Ok(self.with_signature_size(size))
            },
            Err(_) => Ok(self),
        }
    }

    /// Length of the /Contents hex string including `<` and `>`.
    pub fn contents_field_len(&self) -> usize {
        self.signature_size * 2 + 2
    }

    /// Largest value a /ByteRange integer can hold.
    pub fn max_byte_range_value(&self) -> u64 {
        10u64.pow(self.byte_range_digits as u32) - 1
    }

    /// Check the reserved widths.
    pub fn validate(&self) -> Result<()> {
        if self.signature_size == 0 {
            return Err(Error::InvalidRequest("signature_size must be positive".into()));
        }
        if !(1..=MAX_BYTE_RANGE_DIGITS).contains(&self.byte_range_digits) {
            return Err(Error::InvalidRequest(format!(
                "byte_range_digits must be within 1..={}, got {}",
                MAX_BYTE_RANGE_DIGITS, self.byte_range_digits
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SignerConfig::default();
        assert_eq!(config.signature_size, 8192);
        assert_eq!(config.byte_range_digits, 10);
        assert_eq!(config.contents_field_len(), 16386);
        assert_eq!(config.max_byte_range_value(), 9_999_999_999);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = SignerConfig::new()
            .with_signature_size(4096)
            .with_byte_range_digits(12)
            .with_digest_algorithm(DigestAlgorithm::Sha512);
        assert_eq!(config.signature_size, 4096);
        assert_eq!(config.byte_range_digits, 12);
        assert_eq!(config.digest_algorithm, DigestAlgorithm::Sha512);
    }

    #[test]
    fn test_validate_rejects_bad_widths() {
        assert!(SignerConfig::new().with_signature_size(0).validate().is_err());
        assert!(SignerConfig::new().with_byte_range_digits(0).validate().is_err());
        assert!(SignerConfig::new().with_byte_range_digits(19).validate().is_err());
        assert!(SignerConfig::new().with_byte_range_digits(18).validate().is_ok());
    }
}
