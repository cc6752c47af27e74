//! Error types for the PDF signer.
//!
//! Low-level reader failures keep their own variants so diagnostics stay
//! precise, while [`Error::kind`] folds every variant onto the small set of
//! failure classes a caller has to distinguish.

/// Result type alias for signer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while reading, preparing or signing a PDF.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Invalid PDF header (expected '%PDF-')
    #[error("Invalid PDF header: {0}")]
    InvalidHeader(String),

    /// Parse error at specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where error occurred
        offset: usize,
        /// Reason for parse failure
        reason: String,
    },

    /// Invalid cross-reference table
    #[error("Invalid cross-reference table")]
    InvalidXref,

    /// Referenced object not found in cross-reference table
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// Circular reference detected in object graph
    #[error("Circular reference detected: object {0}")]
    CircularReference(crate::object::ObjectRef),

    /// Recursion depth limit exceeded
    #[error("Recursion depth limit exceeded (max: {0})")]
    RecursionLimitExceeded(u32),

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The input PDF is unparsable, encrypted, already signed or otherwise unsupported
    #[error("Malformed or unsupported document: {0}")]
    MalformedDocument(String),

    /// The PKCS#12 bundle is corrupt, has no key, or the passphrase is wrong
    #[error("Invalid credential bundle: {0}")]
    InvalidCredentialBundle(String),

    /// The /ByteRange values do not fit into the reserved placeholder text
    #[error("ByteRange overflow: needs {needed} bytes, placeholder holds {available}")]
    ByteRangeOverflow {
        /// Bytes required by the formatted array
        needed: usize,
        /// Bytes reserved by the placeholder
        available: usize,
    },

    /// The encoded signature does not fit into the reserved /Contents field
    #[error("Signature placeholder too small: needs {needed} bytes, {available} reserved")]
    PlaceholderTooSmall {
        /// Bytes the signature needs
        needed: usize,
        /// Bytes the placeholder reserves
        available: usize,
    },

    /// A cryptographic operation failed
    #[error("Signing failed: {0}")]
    Signing(String),

    /// The signature request or signer configuration is invalid
    #[error("Invalid signature request: {0}")]
    InvalidRequest(String),
}

/// Failure classes surfaced to callers of the signing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unparsable, encrypted, already-signed or otherwise unsupported PDF
    MalformedDocument,
    /// Bad passphrase, corrupt bundle or missing key
    InvalidCredentialBundle,
    /// File offsets exceed the reserved /ByteRange digit width
    ByteRangeOverflow,
    /// Signature exceeds the reserved /Contents width
    PlaceholderTooSmall,
    /// Cryptographic failure
    Signing,
    /// Rejected request parameters
    InvalidRequest,
}

impl ErrorKind {
    /// Whether the failure points at the signer itself (sizing or crypto)
    /// rather than at the caller's input.
    pub fn is_internal(self) -> bool {
        matches!(
            self,
            ErrorKind::ByteRangeOverflow | ErrorKind::PlaceholderTooSmall | ErrorKind::Signing
        )
    }

    /// Whether the failure is caused by the caller's input.
    pub fn is_client_error(self) -> bool {
        !self.is_internal()
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::MalformedDocument => "malformed-document",
            ErrorKind::InvalidCredentialBundle => "invalid-credential-bundle",
            ErrorKind::ByteRangeOverflow => "byte-range-overflow",
            ErrorKind::PlaceholderTooSmall => "placeholder-too-small",
            ErrorKind::Signing => "signing",
            ErrorKind::InvalidRequest => "invalid-request",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidHeader(_)
            | Error::ParseError { .. }
            | Error::InvalidXref
            | Error::ObjectNotFound(..)
            | Error::InvalidObjectType { .. }
            | Error::CircularReference(_)
            | Error::RecursionLimitExceeded(_)
            | Error::Decode(_)
            | Error::Io(_)
            | Error::MalformedDocument(_) => ErrorKind::MalformedDocument,
            Error::InvalidCredentialBundle(_) => ErrorKind::InvalidCredentialBundle,
            Error::ByteRangeOverflow { .. } => ErrorKind::ByteRangeOverflow,
            Error::PlaceholderTooSmall { .. } => ErrorKind::PlaceholderTooSmall,
            Error::Signing(_) => ErrorKind::Signing,
            Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }
}
