//! Detached CMS signing.
//!
//! Produces a DER `ContentInfo` wrapping a `SignedData` with no
//! encapsulated content. The signer info references the leaf certificate by
//! issuer and serial number, and the signed attributes carry the content
//! type, the message digest of the signed byte ranges and the signing time.
//! The signature is RSA PKCS#1 v1.5 over the DER of the signed attributes,
//! which makes the output deterministic for a fixed signing time.

use super::credentials::SigningCredentials;
use super::types::DigestAlgorithm;
use crate::error::{Error, Result};
use chrono::{DateTime, Datelike, Timelike, Utc};
use cms::builder::{SignedDataBuilder, SignerInfoBuilder};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::signed_data::{EncapsulatedContentInfo, SignerIdentifier};
use der::asn1::{Any, GeneralizedTime, SetOfVec, UtcTime};
use der::oid::ObjectIdentifier;
use der::{Decode, Encode};
use rsa::pkcs1v15::SigningKey;
use signature::Keypair;
use spki::{AlgorithmIdentifierOwned, DynSignatureAlgorithmIdentifier, EncodePublicKey};
use x509_cert::attr::Attribute;
use x509_cert::time::Time;
use x509_cert::Certificate;

/// id-data
pub const OID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");

/// id-signingTime
pub const OID_SIGNING_TIME: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.5");

/// id-messageDigest
pub const OID_MESSAGE_DIGEST: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");

/// Creates detached CMS signatures over PDF byte ranges.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedSigner {
    digest_algorithm: DigestAlgorithm,
}

impl DetachedSigner {
    /// Create a signer using `digest_algorithm`.
    pub fn new(digest_algorithm: DigestAlgorithm) -> Self {
        Self { digest_algorithm }
    }

    /// Digest algorithm in use.
    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest_algorithm
    }

    /// Hash `spans` in order and sign the digest.
    pub fn sign_spans(
        &self,
        spans: &[&[u8]],
        credentials: &SigningCredentials,
        signing_time: DateTime<Utc>,
    ) -> Result<Vec<u8>> {
        let digest = self.digest_algorithm.digest(spans);
        self.sign_digest(&digest, credentials, signing_time)
    }

    /// Build the DER `SignedData` for a precomputed content digest.
    ///
    /// # Errors
    ///
    /// [`Error::Signing`] when the key does not match the certificate, the
    /// certificate cannot be decoded, or the CMS builder rejects the input.
    pub fn sign_digest(
        &self,
        digest: &[u8],
        credentials: &SigningCredentials,
        signing_time: DateTime<Utc>,
    ) -> Result<Vec<u8>> {
        if digest.len() != self.digest_algorithm.output_len() {
            return Err(Error::Signing(format!(
                "{} digest must be {} bytes, got {}",
                self.digest_algorithm.name(),
                self.digest_algorithm.output_len(),
                digest.len()
            )));
        }

        let key = credentials.rsa_private_key()?;
        let leaf = Certificate::from_der(credentials.certificate())
            .map_err(|e| Error::Signing(format!("invalid signing certificate: {}", e)))?;
        let mut chain = Vec::with_capacity(credentials.chain().len());
        for der in credentials.chain() {
            chain.push(
                Certificate::from_der(der)
                    .map_err(|e| Error::Signing(format!("invalid chain certificate: {}", e)))?,
            );
        }
        let signing_time_attr = signing_time_attribute(&signing_time)?;

        let der = match self.digest_algorithm {
            DigestAlgorithm::Sha256 => build_signed_data(
                &SigningKey::<sha2::Sha256>::new(key),
                self.digest_algorithm,
                digest,
                leaf,
                chain,
                signing_time_attr,
            ),
            DigestAlgorithm::Sha384 => build_signed_data(
                &SigningKey::<sha2::Sha384>::new(key),
                self.digest_algorithm,
                digest,
                leaf,
                chain,
                signing_time_attr,
            ),
            DigestAlgorithm::Sha512 => build_signed_data(
                &SigningKey::<sha2::Sha512>::new(key),
                self.digest_algorithm,
                digest,
                leaf,
                chain,
                signing_time_attr,
            ),
        }?;

        log::debug!(
            "CMS SignedData: {} bytes, {} with RSA, {} certificates",
            der.len(),
            self.digest_algorithm.name(),
            credentials.chain().len() + 1
        );
        Ok(der)
    }
}

fn build_signed_data<S>(
    signer: &S,
    digest_algorithm: DigestAlgorithm,
    digest: &[u8],
    leaf: Certificate,
    chain: Vec<Certificate>,
    signing_time: Attribute,
) -> Result<Vec<u8>>
where
    S: Keypair + DynSignatureAlgorithmIdentifier + signature::Signer<rsa::pkcs1v15::Signature>,
    S::VerifyingKey: EncodePublicKey,
{
    let cms_err = |e: cms::builder::Error| Error::Signing(format!("CMS construction failed: {:?}", e));

    let content = EncapsulatedContentInfo {
        econtent_type: OID_DATA,
        econtent: None,
    };
    let digest_id = AlgorithmIdentifierOwned {
        oid: digest_algorithm.oid(),
        parameters: None,
    };
    let sid = SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
        issuer: leaf.tbs_certificate.issuer.clone(),
        serial_number: leaf.tbs_certificate.serial_number.clone(),
    });

    let mut signer_info =
        SignerInfoBuilder::new(signer, sid, digest_id.clone(), &content, Some(digest)).map_err(cms_err)?;
    signer_info.add_signed_attribute(signing_time).map_err(cms_err)?;

    let mut builder = SignedDataBuilder::new(&content);
    builder.add_digest_algorithm(digest_id).map_err(cms_err)?;
    builder
        .add_certificate(CertificateChoices::Certificate(leaf))
        .map_err(cms_err)?;
    for cert in chain {
        builder
            .add_certificate(CertificateChoices::Certificate(cert))
            .map_err(cms_err)?;
    }
    builder
        .add_signer_info::<S, rsa::pkcs1v15::Signature>(signer_info)
        .map_err(cms_err)?;

    builder
        .build()
        .map_err(cms_err)?
        .to_der()
        .map_err(|e| Error::Signing(format!("CMS encoding failed: {}", e)))
}

/// `signingTime` attribute: UTCTime for 1950..2050, GeneralizedTime otherwise.
fn signing_time_attribute(time: &DateTime<Utc>) -> Result<Attribute> {
    let der_err = |e: der::Error| Error::Signing(format!("signing time not encodable: {}", e));

    let year = u16::try_from(time.year())
        .map_err(|_| Error::Signing(format!("signing time year {} out of range", time.year())))?;
    let date_time = der::DateTime::new(
        year,
        time.month() as u8,
        time.day() as u8,
        time.hour() as u8,
        time.minute() as u8,
        time.second() as u8,
    )
    .map_err(der_err)?;
    let value = if (1950..2050).contains(&year) {
        Time::UtcTime(UtcTime::from_date_time(date_time).map_err(der_err)?)
    } else {
        Time::GeneralTime(GeneralizedTime::from_date_time(date_time))
    };

    let mut values = SetOfVec::new();
    values.insert(Any::encode_from(&value).map_err(der_err)?).map_err(der_err)?;
    Ok(Attribute {
        oid: OID_SIGNING_TIME,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::credentials::KeyMaterial;
    use chrono::TimeZone;
    use cms::content_info::ContentInfo;
    use cms::signed_data::SignedData;
    use der::Tagged;
    use openssl::asn1::Asn1Time;
    use openssl::bn::BigNum;
    use openssl::hash::MessageDigest;
    use openssl::pkey::PKey;
    use openssl::rsa::Rsa;
    use openssl::x509::{X509NameBuilder, X509};

    fn credentials() -> SigningCredentials {
        let rsa = Rsa::generate(2048).unwrap();
        let key_der = rsa.private_key_to_der().unwrap();
        let pkey = PKey::from_rsa(rsa).unwrap();
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "CMS Test").unwrap();
        let name = name.build();
        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        builder
            .set_serial_number(&BigNum::from_u32(42).unwrap().to_asn1_integer().unwrap())
            .unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&pkey).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(10).unwrap()).unwrap();
        builder.sign(&pkey, MessageDigest::sha256()).unwrap();
        SigningCredentials::new(builder.build().to_der().unwrap(), Vec::new(), KeyMaterial::new(key_der))
    }

    fn time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_signed_data_structure() {
        let creds = credentials();
        let signer = DetachedSigner::default();
        let der = signer.sign_spans(&[b"span a", b"span b"], &creds, time()).unwrap();

        let content_info = ContentInfo::from_der(&der).unwrap();
        let signed_data = SignedData::from_der(&content_info.content.to_der().unwrap()).unwrap();
        assert!(signed_data.encap_content_info.econtent.is_none());
        assert_eq!(signed_data.signer_infos.0.len(), 1);
        assert_eq!(signed_data.certificates.map(|c| c.0.len()), Some(1));

        let info = signed_data.signer_infos.0.get(0).unwrap();
        let attrs = info.signed_attrs.as_ref().unwrap();
        let digest_attr = attrs.iter().find(|a| a.oid == OID_MESSAGE_DIGEST).unwrap();
        let value = digest_attr.values.get(0).unwrap();
        let expected = DigestAlgorithm::Sha256.digest(&[b"span a", b"span b"]);
        assert_eq!(value.value(), &expected[..]);
        assert!(attrs.iter().any(|a| a.oid == OID_SIGNING_TIME));
    }

    #[test]
    fn test_deterministic_for_fixed_time() {
        let creds = credentials();
        let signer = DetachedSigner::new(DigestAlgorithm::Sha384);
        let a = signer.sign_spans(&[b"abc"], &creds, time()).unwrap();
        let b = signer.sign_spans(&[b"abc"], &creds, time()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_wrong_digest_length() {
        let creds = credentials();
        let err = DetachedSigner::default().sign_digest(&[0u8; 20], &creds, time()).unwrap_err();
        assert!(matches!(err, Error::Signing(_)));
    }

    #[test]
    fn test_signing_time_encoding() {
        let utc = signing_time_attribute(&time()).unwrap();
        assert_eq!(utc.values.get(0).unwrap().tag(), der::Tag::UtcTime);
        let late = Utc.with_ymd_and_hms(2051, 1, 1, 0, 0, 0).unwrap();
        let generalized = signing_time_attribute(&late).unwrap();
        assert_eq!(generalized.values.get(0).unwrap().tag(), der::Tag::GeneralizedTime);
    }
}
