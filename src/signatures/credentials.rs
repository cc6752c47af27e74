//! PKCS#12 credential extraction.
//!
//! A bundle is decrypted with OpenSSL and split into the leaf certificate,
//! the chain and the RSA private key. The key leaves OpenSSL as PKCS#1 DER
//! inside [`KeyMaterial`], which zeroes its buffer when dropped. Use
//! [`with_pkcs12`] to keep the decrypted key inside one closure.

use crate::error::{Error, Result};
use openssl::pkcs12::Pkcs12;
use openssl::pkey::Id;
use pkcs1::DecodeRsaPrivateKey;
use pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use x509_parser::prelude::*;
use zeroize::{ZeroizeOnDrop, Zeroizing};

/// Fixed CMS overhead besides certificates and the signature value:
/// SignerInfo, signed attributes, algorithm identifiers and DER headers.
const CMS_OVERHEAD: usize = 1024;

/// Owned secret bytes, zeroed on drop.
pub struct KeyMaterial(Zeroizing<Vec<u8>>);

impl KeyMaterial {
    /// Take ownership of `bytes`.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Borrow the secret bytes.
    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    /// Length of the secret.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl ZeroizeOnDrop for KeyMaterial {}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyMaterial([REDACTED])")
    }
}

/// Leaf certificate, chain and private key of one bundle.
pub struct SigningCredentials {
    certificate: Vec<u8>,
    chain: Vec<Vec<u8>>,
    private_key: KeyMaterial,
}

impl std::fmt::Debug for SigningCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCredentials")
            .field("certificate_len", &self.certificate.len())
            .field("chain_len", &self.chain.len())
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

impl SigningCredentials {
    /// Assemble credentials from DER parts.
    ///
    /// `private_key` is a PKCS#1 `RSAPrivateKey`.
    pub fn new(certificate: Vec<u8>, chain: Vec<Vec<u8>>, private_key: KeyMaterial) -> Self {
        Self {
            certificate,
            chain,
            private_key,
        }
    }

    /// Decrypt a PKCS#12 bundle. A missing passphrase means the empty one.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCredentialBundle`] for a wrong passphrase, corrupt
    /// ASN.1 or a bundle without key or certificate;
    /// [`Error::Signing`] for a key that is not RSA.
    pub fn from_pkcs12(der: &[u8], passphrase: Option<&str>) -> Result<Self> {
        let bundle = Pkcs12::from_der(der)
            .map_err(|e| Error::InvalidCredentialBundle(format!("not a PKCS#12 structure: {}", e)))?;
        let parsed = bundle.parse2(passphrase.unwrap_or("")).map_err(|e| {
            Error::InvalidCredentialBundle(format!("cannot decrypt bundle (wrong passphrase?): {}", e))
        })?;

        let pkey = parsed
            .pkey
            .ok_or_else(|| Error::InvalidCredentialBundle("bundle contains no private key".into()))?;
        let cert = parsed
            .cert
            .ok_or_else(|| Error::InvalidCredentialBundle("bundle contains no certificate".into()))?;

        if pkey.id() != Id::RSA {
            return Err(Error::Signing(format!(
                "unsupported private key type {:?}, only RSA keys can sign",
                pkey.id()
            )));
        }
        let private_key = KeyMaterial::new(
            pkey.rsa()
                .and_then(|rsa| rsa.private_key_to_der())
                .map_err(|e| Error::InvalidCredentialBundle(format!("unreadable private key: {}", e)))?,
        );

        let certificate = cert
            .to_der()
            .map_err(|e| Error::InvalidCredentialBundle(format!("unreadable certificate: {}", e)))?;
        let mut chain = Vec::new();
        if let Some(ca) = parsed.ca {
            for extra in ca.iter() {
                chain.push(
                    extra
                        .to_der()
                        .map_err(|e| Error::InvalidCredentialBundle(format!("unreadable chain certificate: {}", e)))?,
                );
            }
        }

        log::debug!(
            "PKCS#12 bundle: leaf certificate {} bytes, {} chain certificates",
            certificate.len(),
            chain.len()
        );

        Ok(Self::new(certificate, chain, private_key))
    }

    /// Leaf certificate (DER).
    pub fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    /// Chain certificates (DER) in bundle order.
    pub fn chain(&self) -> &[Vec<u8>] {
        &self.chain
    }

    /// Decode the private key and check that it belongs to the leaf
    /// certificate.
    pub fn rsa_private_key(&self) -> Result<RsaPrivateKey> {
        let key = RsaPrivateKey::from_pkcs1_der(self.private_key.expose())
            .map_err(|e| Error::Signing(format!("invalid RSA private key: {}", e)))?;
        if self.certificate_public_key()? != RsaPublicKey::from(&key) {
            return Err(Error::Signing("private key does not match the signing certificate".into()));
        }
        Ok(key)
    }

    /// Modulus length of the private key in bytes.
    pub fn key_size(&self) -> Result<usize> {
        Ok(self.certificate_public_key()?.size())
    }

    /// Upper estimate of the DER size of a detached signature made with
    /// these credentials.
    pub fn estimated_signature_size(&self) -> Result<usize> {
        let certificates: usize = self.certificate.len() + self.chain.iter().map(Vec::len).sum::<usize>();
        Ok(certificates + self.key_size()? + CMS_OVERHEAD)
    }

    /// Subject common name of the leaf certificate, if present.
    pub fn subject_common_name(&self) -> Option<String> {
        let (_, cert) = X509Certificate::from_der(&self.certificate).ok()?;
        let cn = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_string);
        cn
    }

    fn certificate_public_key(&self) -> Result<RsaPublicKey> {
        let (_, cert) = X509Certificate::from_der(&self.certificate)
            .map_err(|e| Error::Signing(format!("invalid signing certificate: {}", e)))?;
        RsaPublicKey::from_public_key_der(cert.public_key().raw)
            .map_err(|e| Error::Signing(format!("signing certificate has no RSA public key: {}", e)))
    }
}

/// Decrypt `der` and run `f` with the credentials. The key material is
/// zeroed when this returns, whether `f` succeeded or not.
///
/// ```no_run
/// use pdf_signer::signatures::with_pkcs12;
///
/// let bundle = std::fs::read("signer.p12")?;
/// let cn = with_pkcs12(&bundle, Some("secret"), |creds| Ok(creds.subject_common_name()))?;
/// println!("{:?}", cn);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn with_pkcs12<T>(
    der: &[u8],
    passphrase: Option<&str>,
    f: impl FnOnce(&SigningCredentials) -> Result<T>,
) -> Result<T> {
    let credentials = SigningCredentials::from_pkcs12(der, passphrase)?;
    let result = f(&credentials);
    drop(credentials);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::asn1::Asn1Time;
    use openssl::bn::BigNum;
    use openssl::hash::MessageDigest;
    use openssl::pkey::PKey;
    use openssl::rsa::Rsa;
    use openssl::x509::{X509NameBuilder, X509};

    fn self_signed_bundle(passphrase: &str) -> Vec<u8> {
        let rsa = Rsa::generate(2048).unwrap();
        let pkey = PKey::from_rsa(rsa).unwrap();
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "Unit Signer").unwrap();
        let name = name.build();
        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(7).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&pkey).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(30).unwrap()).unwrap();
        builder.sign(&pkey, MessageDigest::sha256()).unwrap();
        let cert = builder.build();
        Pkcs12::builder()
            .name("unit")
            .pkey(&pkey)
            .cert(&cert)
            .build2(passphrase)
            .unwrap()
            .to_der()
            .unwrap()
    }

    #[test]
    fn test_from_pkcs12_extracts_parts() {
        let bundle = self_signed_bundle("pw");
        let creds = SigningCredentials::from_pkcs12(&bundle, Some("pw")).unwrap();
        assert!(!creds.certificate().is_empty());
        assert!(creds.chain().is_empty());
        assert_eq!(creds.key_size().unwrap(), 256);
        assert_eq!(creds.subject_common_name().as_deref(), Some("Unit Signer"));
        assert!(creds.rsa_private_key().is_ok());
        assert!(creds.estimated_signature_size().unwrap() > creds.certificate().len() + 256);
    }

    #[test]
    fn test_wrong_passphrase() {
        let bundle = self_signed_bundle("right");
        let err = SigningCredentials::from_pkcs12(&bundle, Some("wrong")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidCredentialBundle);
    }

    #[test]
    fn test_empty_passphrase_default() {
        let bundle = self_signed_bundle("");
        assert!(SigningCredentials::from_pkcs12(&bundle, None).is_ok());
    }

    #[test]
    fn test_corrupt_bundle() {
        let err = SigningCredentials::from_pkcs12(b"\x30\x03\x02\x01", None).unwrap_err();
        assert!(matches!(err, Error::InvalidCredentialBundle(_)));
    }

    #[test]
    fn test_mismatched_key_rejected() {
        let bundle = self_signed_bundle("");
        let creds = SigningCredentials::from_pkcs12(&bundle, None).unwrap();
        let other = Rsa::generate(2048).unwrap().private_key_to_der().unwrap();
        let mixed = SigningCredentials::new(creds.certificate().to_vec(), Vec::new(), KeyMaterial::new(other));
        assert!(matches!(mixed.rsa_private_key(), Err(Error::Signing(_))));
    }

    fn assert_zeroize_on_drop<T: ZeroizeOnDrop>(_: &T) {}

    #[test]
    fn test_key_material_zeroizes_on_drop() {
        let key = KeyMaterial::new(vec![0xAB; 32]);
        assert_zeroize_on_drop(&key);
        assert_eq!(key.expose(), &[0xAB; 32][..]);
        assert_eq!(key.len(), 32);
    }

    #[test]
    fn test_debug_redacts_key() {
        let creds = SigningCredentials::new(vec![1, 2], Vec::new(), KeyMaterial::new(vec![0xAA; 4]));
        let text = format!("{:?}", creds);
        assert!(text.contains("[REDACTED]"));
        assert!(!text.contains("170"));
        assert_eq!(format!("{:?}", KeyMaterial::new(vec![1])), "KeyMaterial([REDACTED])");
    }

    #[test]
    fn test_with_pkcs12_propagates_closure_error() {
        let bundle = self_signed_bundle("");
        let result: Result<()> = with_pkcs12(&bundle, None, |_| Err(Error::Signing("boom".into())));
        assert!(matches!(result, Err(Error::Signing(_))));
    }
}
