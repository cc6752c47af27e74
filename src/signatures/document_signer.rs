//! The end-to-end signing pipeline.
//!
//! Reader, injector, resolver, signer and splicer run in sequence on one
//! buffer. The prepared buffer is only handed back after the splice, so a
//! failure at any stage returns no bytes at all.

use super::byterange::ByteRangeResolver;
use super::credentials::with_pkcs12;
use super::placeholder::PlaceholderInjector;
use super::signer::DetachedSigner;
use super::splicer::splice_signature;
use super::types::SignatureRequest;
use crate::config::SignerConfig;
use crate::document::PdfDocument;
use crate::error::{Error, Result};
use chrono::{SubsecRound, Utc};

/// Sign `pdf` with the key and certificate in the PKCS#12 bundle `p12`,
/// using the default configuration.
///
/// ```no_run
/// use pdf_signer::{sign, SignatureRequest};
///
/// let pdf = std::fs::read("contract.pdf")?;
/// let bundle = std::fs::read("signer.p12")?;
/// let request = SignatureRequest::default().with_reason("Approved");
/// let signed = sign(&pdf, &bundle, None, &request)?;
/// std::fs::write("contract-signed.pdf", signed)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn sign(pdf: &[u8], p12: &[u8], passphrase: Option<&str>, request: &SignatureRequest) -> Result<Vec<u8>> {
    DocumentSigner::new(SignerConfig::default()).sign(pdf, p12, passphrase, request)
}

/// Signs documents with a fixed configuration. Holds no per-document
/// state, so one instance can serve concurrent calls.
#[derive(Debug, Clone, Default)]
pub struct DocumentSigner {
    config: SignerConfig,
}

impl DocumentSigner {
    /// Create a signer with `config`.
    pub fn new(config: SignerConfig) -> Self {
        Self { config }
    }

    /// The configuration in use.
    pub fn config(&self) -> &SignerConfig {
        &self.config
    }

    /// Sign one document.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedDocument`] (or a reader variant) for unreadable,
    ///   encrypted or already signed input
    /// - [`Error::InvalidCredentialBundle`] for a bundle that cannot be
    ///   decrypted or lacks a key or certificate
    /// - [`Error::InvalidRequest`] for a bad configuration, rectangle or page
    /// - [`Error::PlaceholderTooSmall`] / [`Error::ByteRangeOverflow`] when
    ///   the reserved widths are too narrow
    /// - [`Error::Signing`] when the key is unusable or CMS encoding fails
    pub fn sign(&self, pdf: &[u8], p12: &[u8], passphrase: Option<&str>, request: &SignatureRequest) -> Result<Vec<u8>> {
        self.config.validate()?;
        request.rect.normalized()?;

        let mut doc = PdfDocument::parse(pdf)?;
        if doc.is_signed()? {
            return Err(Error::MalformedDocument("document is already signed".into()));
        }
        let signing_time = request
            .signing_time
            .unwrap_or_else(|| Utc::now().trunc_subsecs(0));

        with_pkcs12(p12, passphrase, |credentials| {
            let projected = credentials.estimated_signature_size()?;
            let prepared = PlaceholderInjector::new(&self.config).inject(&mut doc, request, signing_time, Some(projected))?;
            let prepared_len = prepared.bytes.len();
            let mut bytes = prepared.bytes;

            let resolver = ByteRangeResolver::new(&self.config);
            let placeholder = resolver.locate(&bytes, prepared.update_start)?;
            let range = resolver.resolve(&mut bytes, &placeholder)?;

            let [span1, span2] = range.spans(&bytes)?;
            let signature = DetachedSigner::new(self.config.digest_algorithm).sign_spans(
                &[span1, span2],
                credentials,
                signing_time,
            )?;
            splice_signature(&mut bytes, &placeholder, &signature)?;

            if bytes.len() != prepared_len {
                return Err(Error::Signing(format!(
                    "signed length {} differs from prepared length {}",
                    bytes.len(),
                    prepared_len
                )));
            }

            log::info!(
                "Signed {} -> {} bytes: field {:?}, signature {} ({} of {} bytes reserved), ByteRange {:?}",
                pdf.len(),
                bytes.len(),
                prepared.field_name,
                prepared.signature_ref,
                signature.len(),
                self.config.signature_size,
                range.as_array()
            );
            Ok(bytes)
        })
    }
}
