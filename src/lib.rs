// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::too_many_arguments)]
#![allow(clippy::enum_variant_names)]
#![allow(clippy::should_implement_trait)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]

//! # PDF Signer
//!
//! Embeds detached PKCS#7/CMS signatures into existing PDF documents using
//! the key and certificate chain of a PKCS#12 bundle.
//!
//! ## Core Features
//!
//! ### Reading
//! - **Object model**: classic cross-reference tables, cross-reference
//!   streams, hybrid files, `/Prev` chains and object streams
//! - **Document structure**: catalog, page tree and AcroForm lookup
//!
//! ### Signing
//! - **Incremental update**: original bytes are never rewritten
//! - **Two-pass placeholders**: `/Contents` and `/ByteRange` are reserved at
//!   fixed width and patched in place, so the file length never changes
//! - **Detached CMS**: SHA-256/384/512 with RSA PKCS#1 v1.5, leaf certificate
//!   and chain embedded
//! - **Scoped key material**: decrypted keys are zeroed when the signing
//!   operation ends
//!
//! ### Verification
//! - ByteRange coverage, message digest, RSA signature and certificate
//!   validity checks for signatures written by this crate or by others
//!
//! ## Quick Start
//!
//! ```no_run
//! use pdf_signer::{DocumentSigner, SignatureRequest, SignerConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pdf = std::fs::read("contract.pdf")?;
//! let bundle = std::fs::read("signer.p12")?;
//!
//! let signer = DocumentSigner::new(SignerConfig::default().with_signature_size(16 * 1024));
//! let request = SignatureRequest::default()
//!     .with_name("Ada Lovelace")
//!     .with_reason("Approved");
//! let signed = signer.sign(&pdf, &bundle, Some("passphrase"), &request)?;
//!
//! let results = pdf_signer::signatures::verify_pdf(&signed)?;
//! assert!(results[0].status.is_ok());
//! # Ok(())
//! # }
//! ```
//!
//! ## License
//!
//! Licensed under either of:
//!
//! * Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
//! * MIT license ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]

// Error handling
pub mod error;

// Core PDF parsing
pub mod document;
pub mod lexer;
pub mod object;
pub mod objstm;
pub mod parser;
pub mod xref;

// Stream decoders
pub mod decoders;

// Object serialization and AcroForm building
pub mod writer;

// Incremental updates
pub mod editor;

// Digital signatures
pub mod signatures;

// Configuration
pub mod config;

// Re-exports
pub use config::SignerConfig;
pub use document::PdfDocument;
pub use error::{Error, ErrorKind, Result};
pub use signatures::{sign, DocumentSigner, SignatureRequest, VerificationStatus};

// Version info
/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
