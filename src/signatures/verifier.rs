//! PDF signature verification.
//!
//! This module handles verification of existing digital signatures in PDF
//! documents: ByteRange coverage, the CMS message digest, the RSA signature
//! over the signed attributes and the signer certificate.

use super::byterange::ByteRange;
use super::signer::OID_MESSAGE_DIGEST;
use super::types::{
    DigestAlgorithm, SignatureInfo, SignatureSubFilter, VerificationResult, VerificationStatus,
};
use crate::document::{decode_text_string, PdfDocument};
use crate::error::{Error, Result};
use crate::object::Object;
use crate::parser::decode_hex;
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier, SignerInfo};
use der::asn1::OctetString;
use der::oid::ObjectIdentifier;
use der::{Decode, Encode, Reader, SliceReader};
use pkcs8::DecodePublicKey;
use rsa::pkcs1v15::VerifyingKey;
use rsa::RsaPublicKey;
use signature::Verifier;
use x509_cert::Certificate;
use x509_parser::prelude::*;

/// id-signedData
const OID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");

/// Signature algorithms accepted in a SignerInfo: rsaEncryption and
/// sha{256,384,512}WithRSAEncryption.
const RSA_SIGNATURE_OIDS: [ObjectIdentifier; 4] = [
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1"),
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11"),
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12"),
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13"),
];

/// Verify every signature in `pdf_data` without trusted roots.
pub fn verify_pdf(pdf_data: &[u8]) -> Result<Vec<VerificationResult>> {
    SignatureVerifier::new().verify_document(pdf_data)
}

/// Verifier for PDF digital signatures.
#[derive(Debug, Clone, Default)]
pub struct SignatureVerifier {
    /// Trusted root certificates (DER-encoded)
    trusted_roots: Vec<Vec<u8>>,
}

impl SignatureVerifier {
    /// Create a new signature verifier.
    pub fn new() -> Self {
        Self {
            trusted_roots: Vec::new(),
        }
    }

    /// Add a trusted root certificate.
    pub fn add_trusted_root(&mut self, cert_der: Vec<u8>) {
        self.trusted_roots.push(cert_der);
    }

    /// Add multiple trusted root certificates.
    pub fn add_trusted_roots(&mut self, certs: Vec<Vec<u8>>) {
        self.trusted_roots.extend(certs);
    }

    /// Verify all filled signature fields of a document, in field order.
    pub fn verify_document(&self, pdf_data: &[u8]) -> Result<Vec<VerificationResult>> {
        let mut doc = PdfDocument::parse(pdf_data)?;
        let mut results = Vec::new();
        for (name, field) in doc.signature_fields()? {
            let Some(value) = field.get("V").filter(|v| !v.is_null()) else {
                continue;
            };
            let sig_dict = doc.resolve(value)?;
            let mut result = self.verify(pdf_data, &sig_dict)?;
            result.signature_info.field_name = Some(name);
            results.push(result);
        }
        log::debug!("Verified {} signatures", results.len());
        Ok(results)
    }

    /// Extract signature information from a signature dictionary.
    pub fn extract_signature_info(&self, sig_dict: &Object) -> Result<SignatureInfo> {
        let dict = sig_dict.as_dict().ok_or_else(|| Error::InvalidObjectType {
            expected: "Dictionary".to_string(),
            found: sig_dict.type_name().to_string(),
        })?;
        let text = |key: &str| dict.get(key).and_then(Object::as_string).map(decode_text_string);

        let byte_range: Vec<i64> = dict
            .get("ByteRange")
            .and_then(Object::as_array)
            .map(|values| values.iter().filter_map(Object::as_integer).collect())
            .unwrap_or_default();

        Ok(SignatureInfo {
            signer_name: text("Name"),
            signing_time: text("M"),
            reason: text("Reason"),
            location: text("Location"),
            contact_info: text("ContactInfo"),
            sub_filter: dict
                .get("SubFilter")
                .and_then(Object::as_name)
                .and_then(SignatureSubFilter::from_pdf_name),
            byte_range,
            ..SignatureInfo::default()
        })
    }

    /// Verify one signature dictionary against the file it came from.
    ///
    /// Failures of the signature itself are reported in the result; only
    /// a non-dictionary `sig_dict` is an error.
    pub fn verify(&self, pdf_data: &[u8], sig_dict: &Object) -> Result<VerificationResult> {
        let mut result = VerificationResult {
            signature_info: self.extract_signature_info(sig_dict)?,
            ..VerificationResult::default()
        };

        if result.signature_info.sub_filter.is_none() {
            result.status = VerificationStatus::Unknown;
            result.messages.push("Unsupported or missing /SubFilter".to_string());
            return Ok(result);
        }

        let range = match self.check_byte_range(pdf_data, &mut result) {
            Ok(range) => range,
            Err(e) => {
                result.status = VerificationStatus::Invalid;
                result.messages.push(format!("ByteRange validation failed: {}", e));
                return Ok(result);
            },
        };

        let check = decode_hex(&pdf_data[range.len1 + 1..range.start2 - 1])
            .and_then(|contents| self.verify_cms(&contents, &range, pdf_data));
        let check = match check {
            Ok(check) => check,
            Err(e) => {
                result.status = VerificationStatus::Invalid;
                result.messages.push(format!("Signature verification failed: {}", e));
                return Ok(result);
            },
        };

        result.digest_matches = check.digest_matches;
        result.signature_valid = check.signature_valid;
        if !check.digest_matches {
            result.messages.push("Digest of the signed ranges does not match".to_string());
        }
        if !check.signature_valid {
            result.messages.push("RSA signature over signed attributes is invalid".to_string());
        }

        match X509Certificate::from_der(&check.signer_cert) {
            Ok((_, cert)) => {
                let info = &mut result.signature_info;
                info.certificate_cn = cert
                    .subject()
                    .iter_common_name()
                    .next()
                    .and_then(|cn| cn.as_str().ok())
                    .map(str::to_string);
                info.certificate_issuer = Some(cert.issuer().to_string());
                info.valid_from = Some(cert.validity().not_before.to_string());
                info.valid_to = Some(cert.validity().not_after.to_string());
                result.certificate_expired = !cert.validity().is_valid();
            },
            Err(e) => result.messages.push(format!("Signer certificate unreadable: {}", e)),
        }
        if result.certificate_expired {
            result.messages.push("Certificate has expired".to_string());
        }

        result.certificate_trusted = check
            .embedded_certs
            .iter()
            .any(|cert| self.is_certificate_trusted(cert));
        if !result.certificate_trusted {
            result.messages.push("Certificate is not trusted".to_string());
        }

        result.status = if !(check.digest_matches && check.signature_valid) {
            VerificationStatus::Invalid
        } else if result.certificate_trusted && !result.certificate_expired && !result.document_modified {
            VerificationStatus::Valid
        } else {
            VerificationStatus::ValidWithWarnings
        };
        Ok(result)
    }

    /// Quick check if a signature appears valid (without full cryptographic verification).
    pub fn quick_check(&self, sig_dict: &Object) -> Result<bool> {
        let info = self.extract_signature_info(sig_dict)?;
        Ok(info.byte_range.len() == 4 && info.sub_filter.is_some())
    }

    /// Check if a certificate is in the trusted roots.
    fn is_certificate_trusted(&self, cert_der: &[u8]) -> bool {
        self.trusted_roots.iter().any(|root| root == cert_der)
    }

    /// The ranges must start at 0 and leave exactly one `<…>` hex string
    /// uncovered. Bytes after the second range mean a later revision.
    fn check_byte_range(&self, pdf_data: &[u8], result: &mut VerificationResult) -> Result<ByteRange> {
        let range = ByteRange::from_values(&result.signature_info.byte_range)?;
        let covered_end = range
            .start2
            .checked_add(range.len2)
            .filter(|end| *end <= pdf_data.len())
            .ok_or_else(|| Error::MalformedDocument("ByteRange extends past end of file".into()))?;
        range.validate(covered_end)?;

        let gap = &pdf_data[range.len1..range.start2];
        let is_hex_string = gap.len() >= 2
            && gap[0] == b'<'
            && gap[gap.len() - 1] == b'>'
            && gap[1..gap.len() - 1].iter().all(u8::is_ascii_hexdigit);
        if !is_hex_string {
            return Err(Error::MalformedDocument(
                "bytes excluded by ByteRange are not exactly the /Contents hex string".into(),
            ));
        }

        result.signature_info.covers_whole_document = covered_end == pdf_data.len();
        result.document_modified = !result.signature_info.covers_whole_document;
        if result.document_modified {
            result.messages.push(format!(
                "{} bytes were appended after the signed revision",
                pdf_data.len() - covered_end
            ));
        }
        Ok(range)
    }

    fn verify_cms(&self, contents: &[u8], range: &ByteRange, pdf_data: &[u8]) -> Result<CmsCheck> {
        let cms_err = |e: der::Error| Error::Signing(format!("invalid CMS structure: {}", e));

        // DER blob followed by the zero padding of the placeholder
        let mut reader = SliceReader::new(contents).map_err(cms_err)?;
        let content_info = ContentInfo::decode(&mut reader).map_err(cms_err)?;
        let used = usize::try_from(reader.position()).map_err(cms_err)?;
        if contents[used..].iter().any(|b| *b != 0) {
            return Err(Error::Signing("non-zero bytes after the CMS structure".into()));
        }
        if content_info.content_type != OID_SIGNED_DATA {
            return Err(Error::Signing(format!(
                "content type {} is not signedData",
                content_info.content_type
            )));
        }
        let signed_data =
            SignedData::from_der(&content_info.content.to_der().map_err(cms_err)?).map_err(cms_err)?;
        if signed_data.encap_content_info.econtent.is_some() {
            return Err(Error::Signing("signature is not detached".into()));
        }

        let signer_info = signed_data
            .signer_infos
            .0
            .iter()
            .next()
            .ok_or_else(|| Error::Signing("SignedData has no signer".into()))?;
        let digest_algorithm = DigestAlgorithm::from_oid(&signer_info.digest_alg.oid).ok_or_else(|| {
            Error::Signing(format!("unsupported digest algorithm {}", signer_info.digest_alg.oid))
        })?;
        if !RSA_SIGNATURE_OIDS.contains(&signer_info.signature_algorithm.oid) {
            return Err(Error::Signing(format!(
                "unsupported signature algorithm {}",
                signer_info.signature_algorithm.oid
            )));
        }

        let embedded: Vec<&Certificate> = signed_data
            .certificates
            .iter()
            .flat_map(|set| set.0.iter())
            .filter_map(|choice| match choice {
                CertificateChoices::Certificate(cert) => Some(cert),
                _ => None,
            })
            .collect();
        let signer_cert = find_signer_certificate(signer_info, &embedded)?;

        let [span1, span2] = range.spans(pdf_data)?;
        let computed = digest_algorithm.digest(&[span1, span2]);
        let signed_attrs = signer_info
            .signed_attrs
            .as_ref()
            .ok_or_else(|| Error::Signing("signer info has no signed attributes".into()))?;
        let message_digest = signed_attrs
            .iter()
            .find(|attr| attr.oid == OID_MESSAGE_DIGEST)
            .and_then(|attr| attr.values.iter().next())
            .ok_or_else(|| Error::Signing("message-digest attribute missing".into()))?;
        let message_digest = OctetString::from_der(&message_digest.to_der().map_err(cms_err)?).map_err(cms_err)?;

        let public_key = RsaPublicKey::from_public_key_der(
            &signer_cert
                .tbs_certificate
                .subject_public_key_info
                .to_der()
                .map_err(cms_err)?,
        )
        .map_err(|e| Error::Signing(format!("signer certificate has no RSA key: {}", e)))?;
        let signed_attrs_der = signed_attrs.to_der().map_err(cms_err)?;
        let signature_valid = verify_rsa(
            digest_algorithm,
            public_key,
            &signed_attrs_der,
            signer_info.signature.as_bytes(),
        );

        let mut embedded_certs = Vec::with_capacity(embedded.len());
        for cert in &embedded {
            embedded_certs.push(cert.to_der().map_err(cms_err)?);
        }

        Ok(CmsCheck {
            digest_matches: message_digest.as_bytes() == computed.as_slice(),
            signature_valid,
            signer_cert: signer_cert.to_der().map_err(cms_err)?,
            embedded_certs,
        })
    }
}

/// Outcome of the cryptographic checks on one CMS blob.
struct CmsCheck {
    digest_matches: bool,
    signature_valid: bool,
    signer_cert: Vec<u8>,
    embedded_certs: Vec<Vec<u8>>,
}

fn find_signer_certificate<'c>(signer_info: &SignerInfo, embedded: &[&'c Certificate]) -> Result<&'c Certificate> {
    let SignerIdentifier::IssuerAndSerialNumber(id) = &signer_info.sid else {
        return Err(Error::Signing("only issuer-and-serial signer identifiers are supported".into()));
    };
    embedded
        .iter()
        .copied()
        .find(|cert| cert.tbs_certificate.issuer == id.issuer && cert.tbs_certificate.serial_number == id.serial_number)
        .ok_or_else(|| Error::Signing("signer certificate not embedded".into()))
}

fn verify_rsa(digest_algorithm: DigestAlgorithm, key: RsaPublicKey, message: &[u8], signature: &[u8]) -> bool {
    let Ok(signature) = rsa::pkcs1v15::Signature::try_from(signature) else {
        return false;
    };
    match digest_algorithm {
        DigestAlgorithm::Sha256 => VerifyingKey::<sha2::Sha256>::new(key).verify(message, &signature),
        DigestAlgorithm::Sha384 => VerifyingKey::<sha2::Sha384>::new(key).verify(message, &signature),
        DigestAlgorithm::Sha512 => VerifyingKey::<sha2::Sha512>::new(key).verify(message, &signature),
    }
    .is_ok()
}
