//! Reader tests: cross-reference formats, page tree and form lookup,
//! and the shape of the incremental update a signature leaves behind.

mod common;

use common::*;
use pdf_signer::document::PdfDocument;
use pdf_signer::object::{Object, ObjectRef};
use pdf_signer::signatures::SignatureRequest;
use pdf_signer::xref::XRefFormat;
use pdf_signer::ErrorKind;

#[test]
fn test_classic_table() {
    let pdf = minimal_pdf();
    let mut doc = PdfDocument::parse(&pdf).unwrap();
    assert_eq!(doc.version(), (1, 7));
    assert_eq!(doc.xref_format(), XRefFormat::Table);
    assert_eq!(doc.highest_object_number(), 5);
    assert_eq!(doc.page_count().unwrap(), 1);
    assert_eq!(doc.page_ref(0).unwrap(), ObjectRef::new(3, 0));
    assert!(!doc.is_signed().unwrap());
    assert!(doc.acroform().unwrap().is_none());
}

#[test]
fn test_xref_stream() {
    let pdf = xref_stream_pdf();
    let mut doc = PdfDocument::parse(&pdf).unwrap();
    assert_eq!(doc.version(), (1, 5));
    assert_eq!(doc.xref_format(), XRefFormat::Stream);
    assert_eq!(doc.page_count().unwrap(), 1);
    let page = doc.load_object(ObjectRef::new(3, 0)).unwrap();
    assert_eq!(page.as_dict().unwrap().get("Type").and_then(Object::as_name), Some("Page"));
}

#[test]
fn test_nested_page_tree() {
    let pdf = three_page_pdf();
    let mut doc = PdfDocument::parse(&pdf).unwrap();
    assert_eq!(doc.page_count().unwrap(), 3);
    assert_eq!(doc.page_ref(0).unwrap(), ObjectRef::new(3, 0));
    assert_eq!(doc.page_ref(1).unwrap(), ObjectRef::new(5, 0));
    assert_eq!(doc.page_ref(2).unwrap(), ObjectRef::new(6, 0));
    assert_eq!(doc.page_ref(3).unwrap_err().kind(), ErrorKind::MalformedDocument);
}

#[test]
fn test_cyclic_page_tree() {
    let pdf = build_pdf(
        &[
            "<< /Type /Catalog /Pages 2 0 R >>",
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
            "<< /Type /Pages /Parent 2 0 R /Kids [2 0 R] /Count 1 >>",
        ],
        "",
    );
    let mut doc = PdfDocument::parse(&pdf).unwrap();
    assert!(doc.page_ref(0).is_err());
}

#[test]
fn test_acroform_fields() {
    let pdf = acroform_pdf();
    let mut doc = PdfDocument::parse(&pdf).unwrap();
    let form = doc.acroform().unwrap().unwrap();
    assert_eq!(form.reference, Some(ObjectRef::new(4, 0)));
    assert_eq!(doc.field_names().unwrap(), vec!["email".to_string()]);
    assert!(doc.signature_fields().unwrap().is_empty());
}

#[test]
fn test_missing_pages_rejected() {
    let pdf = build_pdf(&["<< /Type /Catalog >>"], "");
    let err = PdfDocument::parse(&pdf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedDocument);
}

#[test]
fn test_bad_header_rejected() {
    let mut pdf = minimal_pdf();
    pdf[..5].copy_from_slice(b"%PS-A");
    assert!(PdfDocument::parse(&pdf).is_err());
}

#[test]
fn test_encrypted_rejected() {
    let pdf = encrypted_pdf();
    let err = PdfDocument::parse(&pdf).unwrap_err();
    assert!(err.to_string().contains("encrypted"));
}

#[test]
fn test_signed_revision_chains_to_original() {
    let input = minimal_pdf();
    let original = PdfDocument::parse(&input).unwrap();
    let original_startxref = original.startxref();

    let request = SignatureRequest::default().with_signing_time(chrono::Utc::now());
    let signed = pdf_signer::sign(&input, &SELF_SIGNED.p12, None, &request).unwrap();
    let mut doc = PdfDocument::parse(&signed).unwrap();

    let trailer = doc.trailer();
    assert_eq!(trailer.get("Prev").and_then(Object::as_integer), Some(original_startxref as i64));
    assert_eq!(trailer.get("Root"), original.trailer().get("Root"));
    assert_eq!(trailer.get("Info"), original.trailer().get("Info"));
    assert_eq!(trailer.get("ID"), original.trailer().get("ID"));
    assert_eq!(
        trailer.get("Size").and_then(Object::as_integer),
        Some(doc.highest_object_number() as i64 + 1)
    );
    assert!(doc.highest_object_number() > original.highest_object_number());

    // Untouched objects still resolve through the /Prev chain
    let content = doc.load_object(ObjectRef::new(4, 0)).unwrap();
    assert!(matches!(content, Object::Stream { .. }));

    let page_ref = doc.page_ref(0).unwrap();
    let page = doc.load_object(page_ref).unwrap();
    let annots = page.as_dict().unwrap().get("Annots").and_then(Object::as_array).unwrap();
    assert_eq!(annots.len(), 1);

    let form = doc.acroform().unwrap().unwrap();
    assert_eq!(form.dict.get("SigFlags").and_then(Object::as_integer), Some(3));
}
