//! PDF Digital Signatures module.
//!
//! This module provides functionality for creating and verifying detached
//! CMS signatures in PDF documents according to ISO 32000-1 section 12.8.
//!
//! ## Pipeline
//!
//! - **Placeholder injection**: append a signature dictionary, widget and
//!   AcroForm as an incremental update, reserving `/Contents` and `/ByteRange`
//! - **ByteRange resolution**: locate the placeholders and rewrite
//!   `/ByteRange` in place without changing the file length
//! - **Credential extraction**: decrypt the PKCS#12 bundle for one operation
//! - **Signing**: hash both ranges and build a detached `SignedData`
//! - **Splicing**: hex-encode the signature into the reserved `/Contents`
//!
//! ## Signature Types Supported
//!
//! - PKCS#7 detached signatures (adbe.pkcs7.detached)
//! - PAdES basic signatures (ETSI.CAdES.detached)
//!
//! ## PDF Specification Reference
//!
//! - ISO 32000-1:2008 Section 12.8 - Digital Signatures
//! - RFC 5652 - Cryptographic Message Syntax

mod byterange;
mod credentials;
mod document_signer;
mod placeholder;
mod signer;
mod splicer;
mod types;
mod verifier;

pub use byterange::{format_byte_range, ByteRange, ByteRangeResolver, SignaturePlaceholder};
pub use credentials::{with_pkcs12, KeyMaterial, SigningCredentials};
pub use document_signer::{sign, DocumentSigner};
pub use placeholder::{pdf_date, PlaceholderInjector, PreparedPdf, SIGNATURE_FILTER};
pub use signer::DetachedSigner;
pub use splicer::splice_signature;
pub use types::{
    DigestAlgorithm, SignatureFields, SignatureInfo, SignatureRequest, SignatureSubFilter, VerificationResult,
    VerificationStatus, WidgetRect,
};
pub use verifier::{verify_pdf, SignatureVerifier};
