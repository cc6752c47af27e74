//! Signature placeholder injection.
//!
//! Appends one incremental update to an unsigned document carrying:
//!
//! - a signature dictionary whose `/Contents` is a run of zero bytes
//!   (hex-encoded, `2 * signature_size` digits) and whose `/ByteRange` holds
//!   four `9…9` integers of fixed width,
//! - a signature field merged with its widget annotation,
//! - a new revision of the target page with the widget in `/Annots`,
//! - a new or augmented AcroForm with `/SigFlags 3`.
//!
//! The original bytes are copied unchanged; only the resolver and splicer
//! touch the update afterwards, and neither changes its length.

use super::types::SignatureRequest;
use crate::config::SignerConfig;
use crate::document::{ExistingAcroForm, PdfDocument};
use crate::editor::IncrementalUpdate;
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::writer::{AcroFormBuilder, ObjectSerializer, SigFlags};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// /Filter of every signature dictionary written.
pub const SIGNATURE_FILTER: &str = "Adobe.PPKLite";

/// Annotation flag: print the widget.
const ANNOT_FLAG_PRINT: i64 = 4;

/// A document with its signature placeholders, ready for resolution.
#[derive(Debug, Clone)]
pub struct PreparedPdf {
    /// Original bytes followed by the update
    pub bytes: Vec<u8>,
    /// Offset of the first byte of the update
    pub update_start: usize,
    /// Signature dictionary object
    pub signature_ref: ObjectRef,
    /// Merged signature field and widget annotation
    pub widget_ref: ObjectRef,
    /// Partial name given to the new field
    pub field_name: String,
}

/// Builds the placeholder objects and appends them as an incremental update.
#[derive(Debug, Clone, Copy)]
pub struct PlaceholderInjector<'c> {
    config: &'c SignerConfig,
}

impl<'c> PlaceholderInjector<'c> {
    /// Create an injector reserving the widths in `config`.
    pub fn new(config: &'c SignerConfig) -> Self {
        Self { config }
    }

    /// Append the signature placeholders to `doc`.
    ///
    /// `projected_signature_size` is the expected DER size of the signature
    /// when the credentials are already known; a projection beyond the
    /// reserved `signature_size` fails before anything is written.
    ///
    /// # Errors
    ///
    /// - [`Error::PlaceholderTooSmall`] for an oversized projection
    /// - [`Error::InvalidRequest`] for a degenerate rectangle or a page
    ///   index beyond the page count
    /// - [`Error::MalformedDocument`] when the page or form structures do
    ///   not have the expected shape
    pub fn inject(
        &self,
        doc: &mut PdfDocument<'_>,
        request: &SignatureRequest,
        signing_time: DateTime<Utc>,
        projected_signature_size: Option<usize>,
    ) -> Result<PreparedPdf> {
        if let Some(projected) = projected_signature_size {
            if projected > self.config.signature_size {
                return Err(Error::PlaceholderTooSmall {
                    needed: projected,
                    available: self.config.signature_size,
                });
            }
        }

        let rect = request.rect.normalized()?;
        let page_count = doc.page_count()?;
        if request.page >= page_count {
            return Err(Error::InvalidRequest(format!(
                "page index {} out of range, document has {} pages",
                request.page, page_count
            )));
        }
        let page_ref = doc.page_ref(request.page)?;
        let mut page = doc.load_object(page_ref)?.expect_dict()?.clone();
        let field_name = next_field_name(&doc.field_names()?);

        let mut update = IncrementalUpdate::new(doc);
        let signature_ref = update.allocate();
        let widget_ref = update.allocate();
        update.set_object(
            signature_ref,
            Object::Dictionary(self.signature_dictionary(request, signing_time)),
        );

        let mut widget = Dictionary::new();
        widget.insert("Type".into(), ObjectSerializer::name("Annot"));
        widget.insert("Subtype".into(), ObjectSerializer::name("Widget"));
        widget.insert("FT".into(), ObjectSerializer::name("Sig"));
        widget.insert("F".into(), Object::Integer(ANNOT_FLAG_PRINT));
        widget.insert("T".into(), ObjectSerializer::text_string(&field_name));
        widget.insert("V".into(), Object::Reference(signature_ref));
        widget.insert("P".into(), Object::Reference(page_ref));
        widget.insert("Rect".into(), ObjectSerializer::rect(rect.x1, rect.y1, rect.x2, rect.y2));
        if !rect.is_invisible() {
            let appearance = update.add_object(empty_appearance(rect.width(), rect.height()));
            widget.insert(
                "AP".into(),
                ObjectSerializer::dict(vec![("N", Object::Reference(appearance))]),
            );
        }
        update.set_object(widget_ref, Object::Dictionary(widget));

        // Page annotations, inline or as an indirect array
        match page.get("Annots").cloned() {
            None | Some(Object::Null) => {
                page.insert("Annots".into(), Object::Array(vec![Object::Reference(widget_ref)]));
                update.set_object(page_ref, Object::Dictionary(page));
            },
            Some(Object::Array(mut annots)) => {
                annots.push(Object::Reference(widget_ref));
                page.insert("Annots".into(), Object::Array(annots));
                update.set_object(page_ref, Object::Dictionary(page));
            },
            Some(Object::Reference(annots_ref)) => {
                let mut annots = match doc.load_object(annots_ref)? {
                    Object::Array(annots) => annots,
                    other => {
                        return Err(Error::MalformedDocument(format!(
                            "page /Annots {} is a {}, expected an array",
                            annots_ref,
                            other.type_name()
                        )))
                    },
                };
                annots.push(Object::Reference(widget_ref));
                update.set_object(annots_ref, Object::Array(annots));
            },
            Some(other) => {
                return Err(Error::MalformedDocument(format!(
                    "page /Annots is a {}, expected an array",
                    other.type_name()
                )))
            },
        }

        let flags = SigFlags::SIGNATURES_EXIST | SigFlags::APPEND_ONLY;
        match doc.acroform()? {
            Some(ExistingAcroForm {
                reference: Some(form_ref),
                dict,
            }) => {
                let fields = existing_fields(doc, &dict)?;
                let mut form = AcroFormBuilder::from_existing(&dict, fields).with_sig_flags(flags);
                form.add_field(widget_ref);
                update.set_object(form_ref, Object::Dictionary(form.build()));
            },
            existing => {
                // Inline or missing: the catalog gets a new revision pointing
                // at an indirect AcroForm
                let mut form = match existing {
                    Some(ExistingAcroForm { dict, .. }) => {
                        let fields = existing_fields(doc, &dict)?;
                        AcroFormBuilder::from_existing(&dict, fields)
                    },
                    None => AcroFormBuilder::new(),
                }
                .with_sig_flags(flags);
                form.add_field(widget_ref);
                let form_ref = update.add_object(Object::Dictionary(form.build()));

                let catalog_ref = doc.catalog_ref()?;
                let mut catalog = doc.catalog()?;
                catalog.insert("AcroForm".into(), Object::Reference(form_ref));
                update.set_object(catalog_ref, Object::Dictionary(catalog));
            },
        }

        let written = update.write()?;
        log::debug!(
            "Injected field {:?}: signature {}, widget {}, page {} ({}), {} bytes appended",
            field_name,
            signature_ref,
            widget_ref,
            request.page,
            page_ref,
            written.bytes.len() - written.update_start
        );

        Ok(PreparedPdf {
            bytes: written.bytes,
            update_start: written.update_start,
            signature_ref,
            widget_ref,
            field_name,
        })
    }

    /// The /Sig dictionary with zeroed /Contents and `9…9` /ByteRange.
    fn signature_dictionary(&self, request: &SignatureRequest, signing_time: DateTime<Utc>) -> Dictionary {
        let max = Object::Integer(self.config.max_byte_range_value() as i64);
        let mut dict = Dictionary::new();
        dict.insert("Type".into(), ObjectSerializer::name("Sig"));
        dict.insert("Filter".into(), ObjectSerializer::name(SIGNATURE_FILTER));
        dict.insert(
            "SubFilter".into(),
            ObjectSerializer::name(self.config.sub_filter.as_pdf_name()),
        );
        dict.insert(
            "ByteRange".into(),
            Object::Array(vec![Object::Integer(0), max.clone(), max.clone(), max]),
        );
        dict.insert("Contents".into(), Object::String(vec![0u8; self.config.signature_size]));
        dict.insert("Reason".into(), ObjectSerializer::text_string(&request.reason));
        dict.insert("ContactInfo".into(), ObjectSerializer::text_string(&request.contact_info));
        dict.insert("Name".into(), ObjectSerializer::text_string(&request.name));
        dict.insert("Location".into(), ObjectSerializer::text_string(&request.location));
        dict.insert("M".into(), Object::String(pdf_date(&signing_time).into_bytes()));
        dict
    }
}

/// Format a time as a PDF date string, `D:YYYYMMDDHHmmSS+00'00'`.
///
/// ```
/// use chrono::TimeZone;
/// use pdf_signer::signatures::pdf_date;
///
/// let t = chrono::Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
/// assert_eq!(pdf_date(&t), "D:20240309140500+00'00'");
/// ```
pub fn pdf_date(time: &DateTime<Utc>) -> String {
    time.format("D:%Y%m%d%H%M%S+00'00'").to_string()
}

/// First `SignatureN` not already taken. At most `existing.len()` names
/// can be taken, so the search ends by `Signature{existing.len() + 1}`.
fn next_field_name(existing: &[String]) -> String {
    let taken: HashSet<&str> = existing.iter().map(String::as_str).collect();
    let mut n = 1;
    loop {
        let name = format!("Signature{}", n);
        if !taken.contains(name.as_str()) {
            return name;
        }
        n += 1;
    }
}

/// Resolved /Fields array of an existing AcroForm.
fn existing_fields(doc: &mut PdfDocument<'_>, form: &Dictionary) -> Result<Vec<Object>> {
    match form.get("Fields") {
        None => Ok(Vec::new()),
        Some(fields) => match doc.resolve(fields)? {
            Object::Array(fields) => Ok(fields),
            Object::Null => Ok(Vec::new()),
            other => Err(Error::MalformedDocument(format!(
                "AcroForm /Fields is a {}, expected an array",
                other.type_name()
            ))),
        },
    }
}

/// Blank form XObject used as the widget's normal appearance.
fn empty_appearance(width: f64, height: f64) -> Object {
    let mut dict = Dictionary::new();
    dict.insert("Type".into(), ObjectSerializer::name("XObject"));
    dict.insert("Subtype".into(), ObjectSerializer::name("Form"));
    dict.insert("BBox".into(), ObjectSerializer::rect(0.0, 0.0, width, height));
    dict.insert("Resources".into(), Object::Dictionary(Dictionary::new()));
    Object::Stream {
        dict,
        data: bytes::Bytes::new(),
    }
}
