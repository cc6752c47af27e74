//! Shared fixtures: openssl-generated PKCS#12 bundles and hand-assembled PDFs.

#![allow(dead_code)]

use lazy_static::lazy_static;
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::stack::Stack;
use openssl::x509::extension::BasicConstraints;
use openssl::x509::{X509Name, X509NameBuilder, X509};

/// Passphrase of [`PROTECTED`].
pub const PASSPHRASE: &str = "correct horse";

/// A PKCS#12 bundle plus the DER of its certificates.
pub struct Bundle {
    pub p12: Vec<u8>,
    pub leaf_der: Vec<u8>,
    pub root_der: Vec<u8>,
}

lazy_static! {
    /// Self-signed RSA-2048 certificate, empty passphrase.
    pub static ref SELF_SIGNED: Bundle = self_signed_bundle("Test Signer", "", 365);
    /// Same shape, protected by [`PASSPHRASE`].
    pub static ref PROTECTED: Bundle = self_signed_bundle("Protected Signer", PASSPHRASE, 365);
    /// Leaf issued by a test CA, the CA included as chain.
    pub static ref CA_ISSUED: Bundle = ca_issued_bundle();
    /// Self-signed certificate that expired yesterday.
    pub static ref EXPIRED: Bundle = self_signed_bundle("Expired Signer", "", -1);
}

fn name(cn: &str) -> X509Name {
    let mut builder = X509NameBuilder::new().unwrap();
    builder.append_entry_by_text("CN", cn).unwrap();
    builder.append_entry_by_text("O", "pdf_signer tests").unwrap();
    builder.build()
}

fn certificate(
    subject: &X509Name,
    issuer: &X509Name,
    key: &PKey<Private>,
    signer: &PKey<Private>,
    serial: u32,
    days: i32,
    is_ca: bool,
) -> X509 {
    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    builder
        .set_serial_number(&BigNum::from_u32(serial).unwrap().to_asn1_integer().unwrap())
        .unwrap();
    builder.set_subject_name(subject).unwrap();
    builder.set_issuer_name(issuer).unwrap();
    builder.set_pubkey(key).unwrap();
    if days >= 0 {
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(days as u32).unwrap())
            .unwrap();
    } else {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        builder.set_not_before(&Asn1Time::from_unix(now - 10 * 86400).unwrap()).unwrap();
        builder
            .set_not_after(&Asn1Time::from_unix(now + days as i64 * 86400).unwrap())
            .unwrap();
    }
    if is_ca {
        builder
            .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
    }
    builder.sign(signer, MessageDigest::sha256()).unwrap();
    builder.build()
}

fn rsa_key() -> PKey<Private> {
    PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
}

fn self_signed_bundle(cn: &str, passphrase: &str, days: i32) -> Bundle {
    let key = rsa_key();
    let subject = name(cn);
    let cert = certificate(&subject, &subject, &key, &key, 1, days, false);
    let p12 = Pkcs12::builder()
        .name(cn)
        .pkey(&key)
        .cert(&cert)
        .build2(passphrase)
        .unwrap()
        .to_der()
        .unwrap();
    let der = cert.to_der().unwrap();
    Bundle {
        p12,
        leaf_der: der.clone(),
        root_der: der,
    }
}

fn ca_issued_bundle() -> Bundle {
    let ca_key = rsa_key();
    let ca_name = name("Test Root CA");
    let ca = certificate(&ca_name, &ca_name, &ca_key, &ca_key, 100, 3650, true);

    let leaf_key = rsa_key();
    let leaf = certificate(&name("Issued Signer"), &ca_name, &leaf_key, &ca_key, 101, 365, false);

    let mut chain = Stack::new().unwrap();
    chain.push(ca.clone()).unwrap();
    let p12 = Pkcs12::builder()
        .name("issued")
        .pkey(&leaf_key)
        .cert(&leaf)
        .ca(chain)
        .build2("")
        .unwrap()
        .to_der()
        .unwrap();
    Bundle {
        p12,
        leaf_der: leaf.to_der().unwrap(),
        root_der: ca.to_der().unwrap(),
    }
}

/// Assemble a PDF with a classic xref table from object bodies numbered
/// from 1. `trailer_extra` is spliced into the trailer dictionary.
pub fn build_pdf(objects: &[&str], trailer_extra: &str) -> Vec<u8> {
    let mut out = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R {} >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            trailer_extra,
            xref
        )
        .as_bytes(),
    );
    out
}

/// Minimal one-page document with a content stream and an /Info dictionary.
pub fn minimal_pdf() -> Vec<u8> {
    build_pdf(
        &[
            "<< /Type /Catalog /Pages 2 0 R >>",
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R >>",
            "<< /Length 42 >>\nstream\nBT /F1 24 Tf 72 720 Td (Hello World) Tj ET\nendstream",
            "<< /Producer (fixture) >>",
        ],
        "/Info 5 0 R /ID [<0123456789ABCDEF0123456789ABCDEF> <0123456789ABCDEF0123456789ABCDEF>]",
    )
}

/// Three-page document with a nested page tree.
pub fn three_page_pdf() -> Vec<u8> {
    build_pdf(
        &[
            "<< /Type /Catalog /Pages 2 0 R >>",
            "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 3 >>",
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>",
            "<< /Type /Pages /Parent 2 0 R /Kids [5 0 R 6 0 R] /Count 2 >>",
            "<< /Type /Page /Parent 4 0 R /MediaBox [0 0 612 792] >>",
            "<< /Type /Page /Parent 4 0 R /MediaBox [0 0 612 792] /Annots [] >>",
        ],
        "",
    )
}

/// Document with an indirect AcroForm holding one text field.
pub fn acroform_pdf() -> Vec<u8> {
    build_pdf(
        &[
            "<< /Type /Catalog /Pages 2 0 R /AcroForm 4 0 R >>",
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Annots [5 0 R] >>",
            "<< /Fields [5 0 R] /DA (/Helv 0 Tf 0 g) >>",
            "<< /Type /Annot /Subtype /Widget /FT /Tx /T (email) /Rect [10 10 200 30] /P 3 0 R >>",
        ],
        "",
    )
}

/// Document whose only cross-reference section is an uncompressed xref stream.
pub fn xref_stream_pdf() -> Vec<u8> {
    let bodies = [
        "<< /Type /Catalog /Pages 2 0 R >>",
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 300 300] >>",
    ];
    let mut out = b"%PDF-1.5\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in bodies.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref_offset = out.len();
    offsets.push(xref_offset);

    // W [1 4 2]: type, offset, generation
    let mut data = vec![0u8, 0, 0, 0, 0, 0xFF, 0xFF];
    for offset in &offsets {
        data.push(1);
        data.extend_from_slice(&(*offset as u32).to_be_bytes());
        data.extend_from_slice(&[0, 0]);
    }
    out.extend_from_slice(
        format!(
            "4 0 obj\n<< /Type /XRef /Size 5 /W [1 4 2] /Root 1 0 R /Length {} >>\nstream\n",
            data.len()
        )
        .as_bytes(),
    );
    out.extend_from_slice(&data);
    out.extend_from_slice(format!("\nendstream\nendobj\nstartxref\n{}\n%%EOF\n", xref_offset).as_bytes());
    out
}

/// Document with an /Encrypt dictionary in the trailer.
pub fn encrypted_pdf() -> Vec<u8> {
    build_pdf(
        &[
            "<< /Type /Catalog /Pages 2 0 R >>",
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>",
            "<< /Filter /Standard /V 2 /R 3 /Length 128 /P -4 /O <00> /U <00> >>",
        ],
        "/Encrypt 4 0 R",
    )
}
