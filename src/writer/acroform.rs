//! AcroForm dictionary for signature fields.
//!
//! The AcroForm dictionary (ISO 32000-1:2008 section 12.7.2) lives in the
//! document catalog and lists the document's form fields. Signing either
//! creates one or augments the existing one, preserving every entry it
//! already carries.
//!
//! # Example
//!
//! ```
//! use pdf_signer::object::ObjectRef;
//! use pdf_signer::writer::{AcroFormBuilder, SigFlags};
//!
//! let mut form = AcroFormBuilder::new().with_sig_flags(SigFlags::SIGNATURES_EXIST | SigFlags::APPEND_ONLY);
//! form.add_field(ObjectRef::new(12, 0));
//! let dict = form.build();
//! assert_eq!(dict.get("SigFlags").and_then(|f| f.as_integer()), Some(3));
//! ```

use crate::object::{Dictionary, Object, ObjectRef};

bitflags::bitflags! {
    /// Document-level signature flags (ISO 32000-1 Table 219).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SigFlags: u32 {
        /// The document contains at least one signature field
        const SIGNATURES_EXIST = 1;
        /// The document must be saved with incremental updates only
        const APPEND_ONLY = 1 << 1;
    }
}

/// Builder for the document-level AcroForm dictionary.
#[derive(Debug, Clone)]
pub struct AcroFormBuilder {
    /// Entries carried over from an existing AcroForm
    base: Dictionary,
    /// Field array, existing fields first
    fields: Vec<Object>,
    sig_flags: SigFlags,
}

impl Default for AcroFormBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AcroFormBuilder {
    /// Create an empty AcroForm.
    pub fn new() -> Self {
        Self {
            base: Dictionary::new(),
            fields: Vec::new(),
            sig_flags: SigFlags::empty(),
        }
    }

    /// Start from an existing AcroForm dictionary. `fields` is its resolved
    /// /Fields array (which may have been stored indirectly).
    pub fn from_existing(dict: &Dictionary, fields: Vec<Object>) -> Self {
        let sig_flags = dict
            .get("SigFlags")
            .and_then(Object::as_integer)
            .map(|f| SigFlags::from_bits_truncate(f.clamp(0, u32::MAX as i64) as u32))
            .unwrap_or_else(SigFlags::empty);
        Self {
            base: dict.clone(),
            fields,
            sig_flags,
        }
    }

    /// Add a field reference.
    pub fn add_field(&mut self, field_ref: ObjectRef) {
        self.fields.push(Object::Reference(field_ref));
    }

    /// Add signature flags to those already present.
    pub fn with_sig_flags(mut self, flags: SigFlags) -> Self {
        self.sig_flags |= flags;
        self
    }

    /// Current signature flags.
    pub fn sig_flags(&self) -> SigFlags {
        self.sig_flags
    }

    /// Number of fields.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Build the AcroForm dictionary.
    pub fn build(&self) -> Dictionary {
        let mut dict = self.base.clone();
        dict.insert("Fields".to_string(), Object::Array(self.fields.clone()));
        if self.sig_flags.is_empty() {
            dict.remove("SigFlags");
        } else {
            dict.insert("SigFlags".to_string(), Object::Integer(self.sig_flags.bits() as i64));
        }
        dict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_acroform() {
        let mut form = AcroFormBuilder::new().with_sig_flags(SigFlags::all());
        form.add_field(ObjectRef::new(5, 0));
        let dict = form.build();
        assert_eq!(
            dict.get("Fields"),
            Some(&Object::Array(vec![Object::Reference(ObjectRef::new(5, 0))]))
        );
        assert_eq!(dict.get("SigFlags"), Some(&Object::Integer(3)));
    }

    #[test]
    fn test_augment_existing_preserves_entries() {
        let mut existing = Dictionary::new();
        existing.insert("DA".into(), Object::String(b"/Helv 0 Tf 0 g".to_vec()));
        existing.insert("NeedAppearances".into(), Object::Boolean(true));
        let old_field = Object::Reference(ObjectRef::new(9, 0));

        let mut form = AcroFormBuilder::from_existing(&existing, vec![old_field.clone()])
            .with_sig_flags(SigFlags::SIGNATURES_EXIST | SigFlags::APPEND_ONLY);
        form.add_field(ObjectRef::new(20, 0));
        let dict = form.build();

        assert_eq!(dict.get("NeedAppearances"), Some(&Object::Boolean(true)));
        assert!(dict.contains_key("DA"));
        let fields = dict.get("Fields").and_then(Object::as_array).unwrap();
        assert_eq!(fields[0], old_field);
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn test_existing_flags_are_merged() {
        let mut existing = Dictionary::new();
        existing.insert("SigFlags".into(), Object::Integer(2));
        let form = AcroFormBuilder::from_existing(&existing, Vec::new())
            .with_sig_flags(SigFlags::SIGNATURES_EXIST);
        assert_eq!(form.sig_flags(), SigFlags::all());
    }

    #[test]
    fn test_empty_flags_omitted() {
        let dict = AcroFormBuilder::new().build();
        assert!(!dict.contains_key("SigFlags"));
    }
}
