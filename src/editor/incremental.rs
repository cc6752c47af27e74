//! Incremental-update writer.
//!
//! Appends new and replaced objects after the original bytes, followed by a
//! cross-reference section that covers only those objects and a trailer that
//! chains to the previous section via `/Prev`. Bytes of the original file are
//! never altered.

use crate::document::PdfDocument;
use crate::error::Result;
use crate::object::{Dictionary, Object, ObjectRef};
use crate::writer::ObjectSerializer;
use crate::xref::XRefFormat;
use indexmap::IndexMap;
use std::io::Write;

/// Trailer keys carried over from the previous revision.
const CARRIED_TRAILER_KEYS: [&str; 3] = ["Root", "Info", "ID"];

/// The original file plus one appended revision.
#[derive(Debug, Clone)]
pub struct WrittenUpdate {
    /// Original bytes followed by the update
    pub bytes: Vec<u8>,
    /// Offset of the first byte written by the update
    pub update_start: usize,
    /// Offset of the new cross-reference section
    pub xref_offset: usize,
    /// Byte offset of every object written, in write order
    pub offsets: Vec<(ObjectRef, usize)>,
}

/// Objects queued for one incremental update.
#[derive(Debug)]
pub struct IncrementalUpdate<'a> {
    original: &'a [u8],
    prev_xref: u64,
    format: XRefFormat,
    previous_trailer: Dictionary,
    next_id: u32,
    objects: IndexMap<ObjectRef, Object>,
}

impl<'a> IncrementalUpdate<'a> {
    /// Start an update on top of `doc`. New objects are numbered after the
    /// highest object number already in use.
    pub fn new(doc: &PdfDocument<'a>) -> Self {
        Self {
            original: doc.data(),
            prev_xref: doc.startxref(),
            format: doc.xref_format(),
            previous_trailer: doc.trailer().clone(),
            next_id: doc.highest_object_number() + 1,
            objects: IndexMap::new(),
        }
    }

    /// Reserve a fresh object number.
    pub fn allocate(&mut self) -> ObjectRef {
        let reference = ObjectRef::new(self.next_id, 0);
        self.next_id += 1;
        reference
    }

    /// Queue a new object and return its reference.
    pub fn add_object(&mut self, obj: Object) -> ObjectRef {
        let reference = self.allocate();
        self.objects.insert(reference, obj);
        reference
    }

    /// Queue a value for an allocated reference, or a new revision of an
    /// existing object.
    pub fn set_object(&mut self, reference: ObjectRef, obj: Object) {
        self.objects.insert(reference, obj);
    }

    /// Number of queued objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Append the queued objects, the cross-reference section and the trailer.
    pub fn write(mut self) -> Result<WrittenUpdate> {
        let serializer = ObjectSerializer::compact();
        let mut out = Vec::with_capacity(self.original.len() + 32 * 1024);
        out.extend_from_slice(self.original);
        if !matches!(out.last(), Some(b'\n') | Some(b'\r')) {
            out.push(b'\n');
        }
        let update_start = out.len();

        let mut offsets = Vec::with_capacity(self.objects.len() + 1);
        for (reference, obj) in &self.objects {
            offsets.push((*reference, out.len()));
            out.extend_from_slice(&serializer.serialize_indirect(reference.id, reference.gen, obj)?);
        }

        let xref_offset = out.len();
        match self.format {
            XRefFormat::Table => self.write_xref_table(&mut out, &offsets, &serializer)?,
            XRefFormat::Stream => {
                let stream_ref = self.allocate();
                offsets.push((stream_ref, xref_offset));
                self.write_xref_stream(&mut out, stream_ref, &offsets, &serializer)?;
            },
        }
        write!(out, "startxref\n{}\n%%EOF\n", xref_offset)?;

        log::debug!(
            "Incremental update: {} objects at {}..{}, {:?} xref at {}",
            offsets.len(),
            update_start,
            out.len(),
            self.format,
            xref_offset
        );

        Ok(WrittenUpdate {
            bytes: out,
            update_start,
            xref_offset,
            offsets,
        })
    }

    fn trailer_base(&self) -> Dictionary {
        let mut trailer = Dictionary::new();
        for key in CARRIED_TRAILER_KEYS {
            if let Some(value) = self.previous_trailer.get(key) {
                trailer.insert(key.to_string(), value.clone());
            }
        }
        let previous_size = self
            .previous_trailer
            .get("Size")
            .and_then(Object::as_integer)
            .unwrap_or(0);
        trailer.insert(
            "Size".to_string(),
            Object::Integer(previous_size.max(self.next_id as i64)),
        );
        trailer.insert("Prev".to_string(), Object::Integer(self.prev_xref as i64));
        trailer
    }

    fn write_xref_table(
        &self,
        out: &mut Vec<u8>,
        offsets: &[(ObjectRef, usize)],
        serializer: &ObjectSerializer,
    ) -> Result<()> {
        out.extend_from_slice(b"xref\n");
        for run in subsections(offsets) {
            writeln!(out, "{} {}", run[0].0.id, run.len())?;
            for (reference, offset) in &run {
                write!(out, "{:010} {:05} n \n", offset, reference.gen)?;
            }
        }
        out.extend_from_slice(b"trailer\n");
        serializer.write_dictionary_to(out, &self.trailer_base())?;
        out.push(b'\n');
        Ok(())
    }

    /// Uncompressed `/Type /XRef` stream with `/W [1 N 2]`, where N is at
    /// least 4 and grows for offsets beyond 4 GiB.
    fn write_xref_stream(
        &self,
        out: &mut Vec<u8>,
        stream_ref: ObjectRef,
        offsets: &[(ObjectRef, usize)],
        serializer: &ObjectSerializer,
    ) -> Result<()> {
        let max_offset = offsets.iter().map(|(_, o)| *o).max().unwrap_or(0) as u64;
        let offset_width = (8 - (max_offset.leading_zeros() / 8) as usize).max(4);

        let mut index = Vec::new();
        let mut data = Vec::with_capacity(offsets.len() * (3 + offset_width));
        for run in subsections(offsets) {
            index.push(Object::Integer(run[0].0.id as i64));
            index.push(Object::Integer(run.len() as i64));
            for (reference, offset) in &run {
                data.push(1u8);
                data.extend_from_slice(&(*offset as u64).to_be_bytes()[8 - offset_width..]);
                data.extend_from_slice(&reference.gen.to_be_bytes());
            }
        }

        let mut dict = self.trailer_base();
        dict.insert("Type".to_string(), Object::Name("XRef".to_string()));
        dict.insert(
            "W".to_string(),
            Object::Array(vec![
                Object::Integer(1),
                Object::Integer(offset_width as i64),
                Object::Integer(2),
            ]),
        );
        dict.insert("Index".to_string(), Object::Array(index));

        let stream = Object::Stream {
            dict,
            data: bytes::Bytes::from(data),
        };
        out.extend_from_slice(&serializer.serialize_indirect(stream_ref.id, stream_ref.gen, &stream)?);
        Ok(())
    }
}

/// Sort entries by object number and split them into runs of consecutive numbers.
fn subsections(offsets: &[(ObjectRef, usize)]) -> Vec<Vec<(ObjectRef, usize)>> {
    let mut sorted = offsets.to_vec();
    sorted.sort_by_key(|(reference, _)| reference.id);
    sorted.dedup_by_key(|(reference, _)| reference.id);

    let mut runs: Vec<Vec<(ObjectRef, usize)>> = Vec::new();
    for entry in sorted {
        match runs.last_mut() {
            Some(run) if run.last().is_some_and(|(last, _)| last.id + 1 == entry.0.id) => run.push(entry),
            _ => runs.push(vec![entry]),
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xref::{parse_xref, XRefEntry};

    fn minimal_pdf() -> Vec<u8> {
        let mut out = b"%PDF-1.4\n".to_vec();
        let o1 = out.len();
        out.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
        let o2 = out.len();
        out.extend_from_slice(b"2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n");
        let xref = out.len();
        out.extend_from_slice(
            format!(
                "xref\n0 3\n0000000000 65535 f \n{:010} 00000 n \n{:010} 00000 n \ntrailer\n<< /Size 3 /Root 1 0 R /ID [<AA> <BB>] >>\nstartxref\n{}\n%%EOF",
                o1, o2, xref
            )
            .as_bytes(),
        );
        out
    }

    #[test]
    fn test_subsections_group_consecutive_numbers() {
        let entries = vec![
            (ObjectRef::new(5, 0), 50),
            (ObjectRef::new(1, 0), 10),
            (ObjectRef::new(4, 0), 40),
            (ObjectRef::new(2, 0), 20),
        ];
        let runs = subsections(&entries);
        let ids: Vec<Vec<u32>> = runs
            .iter()
            .map(|run| run.iter().map(|(r, _)| r.id).collect())
            .collect();
        assert_eq!(ids, vec![vec![1, 2], vec![4, 5]]);
    }

    #[test]
    fn test_append_preserves_original_and_chains_prev() {
        let original = minimal_pdf();
        let doc = PdfDocument::parse(&original).unwrap();
        let mut update = IncrementalUpdate::new(&doc);
        let new_ref = update.add_object(Object::Integer(42));
        assert_eq!(new_ref, ObjectRef::new(3, 0));
        update.set_object(ObjectRef::new(1, 0), Object::Integer(7));
        let written = update.write().unwrap();

        // Input lacked a trailing EOL
        assert_eq!(written.update_start, original.len() + 1);
        assert_eq!(&written.bytes[..original.len()], &original[..]);

        let tail = String::from_utf8_lossy(&written.bytes[written.update_start..]).into_owned();
        assert!(tail.contains("xref\n1 1\n"));
        assert!(tail.contains("3 1\n"));
        assert!(tail.contains("/Prev"));
        assert!(tail.contains("/ID [<AA> <BB>]"));
        assert!(tail.ends_with("%%EOF\n"));

        let xref = parse_xref(&written.bytes, written.xref_offset as u64).unwrap();
        let (_, offset3) = written.offsets.iter().find(|(r, _)| r.id == 3).unwrap();
        assert_eq!(xref.get(3), Some(&XRefEntry::uncompressed(*offset3 as u64, 0)));
        // Object 2 comes from the original section
        assert!(xref.get(2).is_some());
        assert_eq!(xref.trailer().and_then(|t| t.get("Size")), Some(&Object::Integer(4)));
    }

    #[test]
    fn test_written_update_reparses() {
        let original = minimal_pdf();
        let doc = PdfDocument::parse(&original).unwrap();
        let mut update = IncrementalUpdate::new(&doc);
        update.set_object(
            ObjectRef::new(1, 0),
            ObjectSerializer::dict(vec![
                ("Type", ObjectSerializer::name("Catalog")),
                ("Pages", Object::Reference(ObjectRef::new(2, 0))),
                ("Lang", ObjectSerializer::text_string("en")),
            ]),
        );
        let written = update.write().unwrap();
        let mut reparsed = PdfDocument::parse(&written.bytes).unwrap();
        assert_eq!(
            reparsed.catalog().unwrap().get("Lang"),
            Some(&Object::String(b"en".to_vec()))
        );
    }

    #[test]
    fn test_xref_stream_layout() {
        let original = minimal_pdf();
        let doc = PdfDocument::parse(&original).unwrap();
        let mut update = IncrementalUpdate::new(&doc);
        update.format = XRefFormat::Stream;
        update.add_object(Object::Null);
        let written = update.write().unwrap();

        let xref = parse_xref(&written.bytes, written.xref_offset as u64).unwrap();
        assert_eq!(xref.format(), XRefFormat::Stream);
        // The stream covers itself
        assert_eq!(xref.get(4), Some(&XRefEntry::uncompressed(written.xref_offset as u64, 0)));
        let trailer = xref.trailer().unwrap();
        assert_eq!(trailer.get("Size"), Some(&Object::Integer(5)));
        assert!(trailer.get("Root").is_some());
    }
}
