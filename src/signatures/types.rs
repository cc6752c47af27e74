//! Digital signature types and data structures.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use der::oid::ObjectIdentifier;
use serde::{Deserialize, Serialize};
use sha2::Digest;

/// Digest algorithm used for signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    /// SHA-256 (recommended)
    #[default]
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl DigestAlgorithm {
    /// OID of this digest algorithm.
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            DigestAlgorithm::Sha256 => ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1"),
            DigestAlgorithm::Sha384 => ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2"),
            DigestAlgorithm::Sha512 => ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3"),
        }
    }

    /// Map a digest OID back to the algorithm.
    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        [DigestAlgorithm::Sha256, DigestAlgorithm::Sha384, DigestAlgorithm::Sha512]
            .into_iter()
            .find(|alg| alg.oid() == *oid)
    }

    /// Get the name of this algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Digest length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha384 => 48,
            DigestAlgorithm::Sha512 => 64,
        }
    }

    /// Hash the concatenation of `parts` in order.
    pub fn digest(&self, parts: &[&[u8]]) -> Vec<u8> {
        fn run<D: Digest>(parts: &[&[u8]]) -> Vec<u8> {
            let mut hasher = D::new();
            for part in parts {
                hasher.update(part);
            }
            hasher.finalize().to_vec()
        }
        match self {
            DigestAlgorithm::Sha256 => run::<sha2::Sha256>(parts),
            DigestAlgorithm::Sha384 => run::<sha2::Sha384>(parts),
            DigestAlgorithm::Sha512 => run::<sha2::Sha512>(parts),
        }
    }
}

/// Signature sub-filter type (signature format).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SignatureSubFilter {
    /// adbe.pkcs7.detached - PKCS#7 detached signature
    #[default]
    Pkcs7Detached,
    /// ETSI.CAdES.detached - same detached CMS structure, PAdES name
    CadesDetached,
}

impl SignatureSubFilter {
    /// Get the PDF name for this sub-filter.
    pub fn as_pdf_name(&self) -> &'static str {
        match self {
            SignatureSubFilter::Pkcs7Detached => "adbe.pkcs7.detached",
            SignatureSubFilter::CadesDetached => "ETSI.CAdES.detached",
        }
    }

    /// Parse a PDF name into a sub-filter type.
    pub fn from_pdf_name(name: &str) -> Option<Self> {
        match name {
            "adbe.pkcs7.detached" => Some(SignatureSubFilter::Pkcs7Detached),
            "ETSI.CAdES.detached" => Some(SignatureSubFilter::CadesDetached),
            _ => None,
        }
    }
}

/// Widget rectangle in default user space, corners `(x1, y1)` and `(x2, y2)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WidgetRect {
    /// First corner x
    pub x1: f64,
    /// First corner y
    pub y1: f64,
    /// Second corner x
    pub x2: f64,
    /// Second corner y
    pub y2: f64,
}

impl Default for WidgetRect {
    fn default() -> Self {
        Self::new(50.0, 200.0, 150.0, 250.0)
    }
}

impl WidgetRect {
    /// Create a rectangle from two corners.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// The all-zero rectangle of an invisible signature.
    pub fn invisible() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }

    /// Whether this is the invisible-signature rectangle.
    pub fn is_invisible(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2].iter().all(|v| *v == 0.0)
    }

    /// Width of the normalized rectangle.
    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).abs()
    }

    /// Height of the normalized rectangle.
    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).abs()
    }

    /// Validate and order the corners so that `x1 < x2` and `y1 < y2`.
    ///
    /// Inverted corners are swapped. Non-finite coordinates and zero-width
    /// or zero-height rectangles are rejected, except the all-zero
    /// rectangle which marks an invisible signature.
    pub fn normalized(&self) -> Result<Self> {
        let coords = [self.x1, self.y1, self.x2, self.y2];
        if coords.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidRequest(format!(
                "widget rectangle has a non-finite coordinate: {:?}",
                coords
            )));
        }
        if self.is_invisible() {
            return Ok(Self::invisible());
        }
        if self.x1 == self.x2 || self.y1 == self.y2 {
            return Err(Error::InvalidRequest(format!(
                "widget rectangle [{} {} {} {}] has zero width or height",
                self.x1, self.y1, self.x2, self.y2
            )));
        }
        Ok(Self::new(
            self.x1.min(self.x2),
            self.y1.min(self.y2),
            self.x1.max(self.x2),
            self.y1.max(self.y2),
        ))
    }
}

/// Metadata for one signature, immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignatureRequest {
    /// Reason for signing
    pub reason: String,
    /// Contact information
    pub contact_info: String,
    /// Name of the signer
    pub name: String,
    /// Signing location
    pub location: String,
    /// Widget rectangle
    pub rect: WidgetRect,
    /// Zero-based page that receives the widget
    pub page: usize,
    /// Signing time for /M and the CMS signing-time attribute; `None` uses
    /// the current time
    pub signing_time: Option<DateTime<Utc>>,
}

impl Default for SignatureRequest {
    fn default() -> Self {
        Self {
            reason: "The user is declaring consent.".to_string(),
            contact_info: "default@example.com".to_string(),
            name: "John Doe".to_string(),
            location: "Default Location".to_string(),
            rect: WidgetRect::default(),
            page: 0,
            signing_time: None,
        }
    }
}

impl SignatureRequest {
    /// Set the reason for signing.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Set the contact information.
    pub fn with_contact_info(mut self, contact_info: impl Into<String>) -> Self {
        self.contact_info = contact_info.into();
        self
    }

    /// Set the signer name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the signing location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Set the widget rectangle.
    pub fn with_rect(mut self, rect: WidgetRect) -> Self {
        self.rect = rect;
        self
    }

    /// Set the page that receives the widget.
    pub fn with_page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    /// Pin the signing time (for reproducible output).
    pub fn with_signing_time(mut self, time: DateTime<Utc>) -> Self {
        self.signing_time = Some(time);
        self
    }
}

/// Flat form-field shape of a request (`widgetRectX1` ... `widgetRectY2`).
///
/// ```
/// use pdf_signer::signatures::{SignatureFields, SignatureRequest};
///
/// let fields: SignatureFields = serde_json::from_str(r#"{"name": "Ada", "widgetRectX2": 300}"#)?;
/// let request = SignatureRequest::from(fields);
/// assert_eq!(request.name, "Ada");
/// assert_eq!(request.rect.x2, 300.0);
/// assert_eq!(request.location, "Default Location");
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignatureFields {
    /// Reason for signing
    pub reason: String,
    /// Contact information
    pub contact_info: String,
    /// Name of the signer
    pub name: String,
    /// Signing location
    pub location: String,
    /// Rectangle x1
    pub widget_rect_x1: f64,
    /// Rectangle y1
    pub widget_rect_y1: f64,
    /// Rectangle x2
    pub widget_rect_x2: f64,
    /// Rectangle y2
    pub widget_rect_y2: f64,
    /// Zero-based page
    pub page: usize,
    /// Optional fixed signing time
    pub signing_time: Option<DateTime<Utc>>,
}

impl Default for SignatureFields {
    fn default() -> Self {
        SignatureRequest::default().into()
    }
}

impl From<SignatureRequest> for SignatureFields {
    fn from(req: SignatureRequest) -> Self {
        Self {
            reason: req.reason,
            contact_info: req.contact_info,
            name: req.name,
            location: req.location,
            widget_rect_x1: req.rect.x1,
            widget_rect_y1: req.rect.y1,
            widget_rect_x2: req.rect.x2,
            widget_rect_y2: req.rect.y2,
            page: req.page,
            signing_time: req.signing_time,
        }
    }
}

impl From<SignatureFields> for SignatureRequest {
    fn from(fields: SignatureFields) -> Self {
        Self {
            reason: fields.reason,
            contact_info: fields.contact_info,
            name: fields.name,
            location: fields.location,
            rect: WidgetRect::new(
                fields.widget_rect_x1,
                fields.widget_rect_y1,
                fields.widget_rect_x2,
                fields.widget_rect_y2,
            ),
            page: fields.page,
            signing_time: fields.signing_time,
        }
    }
}

/// Information about an existing signature in a PDF.
#[derive(Debug, Clone, Default)]
pub struct SignatureInfo {
    /// Partial name of the signature field
    pub field_name: Option<String>,
    /// Name of the signer from /Name
    pub signer_name: Option<String>,
    /// Raw /M value
    pub signing_time: Option<String>,
    /// Reason for signing
    pub reason: Option<String>,
    /// Signing location
    pub location: Option<String>,
    /// Contact information
    pub contact_info: Option<String>,
    /// Signature sub-filter type
    pub sub_filter: Option<SignatureSubFilter>,
    /// Whether the signature covers the whole document
    pub covers_whole_document: bool,
    /// Byte range of the signed data
    pub byte_range: Vec<i64>,
    /// Certificate subject common name
    pub certificate_cn: Option<String>,
    /// Certificate issuer
    pub certificate_issuer: Option<String>,
    /// Certificate validity start
    pub valid_from: Option<String>,
    /// Certificate validity end
    pub valid_to: Option<String>,
}

/// Result of signature verification.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    /// Overall verification status
    pub status: VerificationStatus,
    /// Signature information
    pub signature_info: SignatureInfo,
    /// Verification messages (errors, warnings)
    pub messages: Vec<String>,
    /// Whether bytes outside the signed ranges follow the signature
    pub document_modified: bool,
    /// Whether the certificate is trusted
    pub certificate_trusted: bool,
    /// Whether the certificate has expired
    pub certificate_expired: bool,
    /// Whether the recomputed digest matches the signed digest
    pub digest_matches: bool,
    /// Whether the RSA signature over the signed attributes verifies
    pub signature_valid: bool,
}

impl Default for VerificationResult {
    fn default() -> Self {
        Self {
            status: VerificationStatus::Unknown,
            signature_info: SignatureInfo::default(),
            messages: Vec::new(),
            document_modified: false,
            certificate_trusted: false,
            certificate_expired: false,
            digest_matches: false,
            signature_valid: false,
        }
    }
}

/// Verification status of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    /// Signature is valid
    Valid,
    /// Signature is invalid (cryptographically)
    Invalid,
    /// Signature validity is unknown (e.g., unsupported format)
    Unknown,
    /// Signature is valid but the certificate is untrusted, expired, or the
    /// document changed after signing
    ValidWithWarnings,
}

impl VerificationStatus {
    /// Check if the status indicates a valid signature.
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationStatus::Valid)
    }

    /// Check if the status indicates any form of validity (including warnings).
    pub fn is_ok(&self) -> bool {
        matches!(self, VerificationStatus::Valid | VerificationStatus::ValidWithWarnings)
    }
}
