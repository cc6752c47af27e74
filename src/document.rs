//! PDF document reader.
//!
//! [`PdfDocument`] borrows the raw bytes of an existing PDF and resolves just
//! enough of the object graph to sign it: the trailer, the catalog, the page
//! tree and an optional AcroForm. Nothing is re-serialized; objects are loaded
//! lazily through the cross-reference table and cached.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::objstm::parse_object_stream;
use crate::parser::parse_indirect_object;
use crate::xref::{find_xref_offset, parse_xref, CrossRefTable, XRefEntryType, XRefFormat};
use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};

/// Maximum depth of nested object loads (object streams, page trees).
const MAX_RECURSION_DEPTH: u32 = 100;

/// Maximum depth of page-tree and field-tree walks.
const MAX_TREE_DEPTH: usize = 64;

/// How far into the file the `%PDF-` marker may appear.
const HEADER_SEARCH_WINDOW: usize = 1024;

lazy_static! {
    static ref RE_HEADER: regex::bytes::Regex = regex::bytes::Regex::new(r"%PDF-([0-9])\.([0-9])").unwrap();
}

/// AcroForm dictionary found in the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingAcroForm {
    /// Indirect reference, or `None` when the dictionary is inline in the catalog
    pub reference: Option<ObjectRef>,
    /// The resolved AcroForm dictionary
    pub dict: Dictionary,
}

/// Read-only view of an existing PDF.
///
/// # Example
///
/// ```no_run
/// use pdf_signer::document::PdfDocument;
///
/// let bytes = std::fs::read("input.pdf")?;
/// let mut doc = PdfDocument::parse(&bytes)?;
/// println!("PDF {}.{} with {} pages", doc.version().0, doc.version().1, doc.page_count()?);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct PdfDocument<'a> {
    data: &'a [u8],
    version: (u8, u8),
    xref: CrossRefTable,
    trailer: Dictionary,
    startxref: u64,
    /// Cache for loaded objects to avoid re-parsing
    object_cache: HashMap<ObjectRef, Object>,
    /// Parsed object streams keyed by stream object number
    objstm_cache: HashMap<u32, HashMap<u32, Object>>,
    /// Objects currently being resolved (cycle detection)
    resolving_stack: HashSet<ObjectRef>,
    recursion_depth: u32,
}

impl std::fmt::Debug for PdfDocument<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("version", &self.version)
            .field("len", &self.data.len())
            .field("startxref", &self.startxref)
            .field("xref_entries", &self.xref.len())
            .field("cached_objects", &self.object_cache.len())
            .finish_non_exhaustive()
    }
}

impl<'a> PdfDocument<'a> {
    /// Parse the header, the cross-reference chain and the trailer, and make
    /// sure the catalog resolves.
    ///
    /// # Errors
    ///
    /// Fails when the header, `startxref`, cross-reference data or trailer
    /// is missing or unreadable, when `/Root` does not resolve to a catalog,
    /// and when the document is encrypted.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let version = parse_header(data)?;
        let startxref = find_xref_offset(data)?;
        let xref = parse_xref(data, startxref)?;
        let trailer = xref
            .trailer()
            .cloned()
            .ok_or_else(|| Error::MalformedDocument("no trailer dictionary".into()))?;

        log::debug!(
            "Parsed PDF {}.{}: {} bytes, startxref {}, {} xref entries ({:?})",
            version.0,
            version.1,
            data.len(),
            startxref,
            xref.len(),
            xref.format()
        );

        let mut doc = Self {
            data,
            version,
            xref,
            trailer,
            startxref,
            object_cache: HashMap::new(),
            objstm_cache: HashMap::new(),
            resolving_stack: HashSet::new(),
            recursion_depth: 0,
        };

        if doc.is_encrypted() {
            return Err(Error::MalformedDocument("encrypted documents are not supported".into()));
        }
        if doc.is_linearized() {
            log::debug!("Linearized input; update chains to the final startxref");
        }

        let catalog = doc.catalog()?;
        if !catalog.contains_key("Pages") {
            return Err(Error::MalformedDocument("catalog has no /Pages".into()));
        }

        Ok(doc)
    }

    /// Raw input bytes.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Header version `(major, minor)`.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Trailer of the newest cross-reference section.
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// Offset named by the final `startxref`.
    pub fn startxref(&self) -> u64 {
        self.startxref
    }

    /// Syntax of the newest cross-reference section.
    pub fn xref_format(&self) -> XRefFormat {
        self.xref.format()
    }

    /// Whether the trailer carries an /Encrypt entry.
    pub fn is_encrypted(&self) -> bool {
        self.trailer.contains_key("Encrypt")
    }

    fn is_linearized(&self) -> bool {
        let head = &self.data[..self.data.len().min(HEADER_SEARCH_WINDOW)];
        crate::parser::find_subsequence(head, b"/Linearized").is_some()
    }

    /// Highest object number in use, from the xref or the trailer /Size.
    pub fn highest_object_number(&self) -> u32 {
        let from_size = self
            .trailer
            .get("Size")
            .and_then(Object::as_integer)
            .map(|size| size.saturating_sub(1).clamp(0, u32::MAX as i64) as u32)
            .unwrap_or(0);
        from_size.max(self.xref.max_object_number())
    }

    /// Load an indirect object through the cross-reference table.
    pub fn load_object(&mut self, obj_ref: ObjectRef) -> Result<Object> {
        if self.recursion_depth >= MAX_RECURSION_DEPTH {
            return Err(Error::RecursionLimitExceeded(MAX_RECURSION_DEPTH));
        }
        if self.resolving_stack.contains(&obj_ref) {
            log::error!("Circular reference detected for object {}", obj_ref);
            return Err(Error::CircularReference(obj_ref));
        }
        if let Some(cached) = self.object_cache.get(&obj_ref) {
            return Ok(cached.clone());
        }

        let entry = self
            .xref
            .get(obj_ref.id)
            .cloned()
            .ok_or(Error::ObjectNotFound(obj_ref.id, obj_ref.gen))?;

        self.resolving_stack.insert(obj_ref);
        self.recursion_depth += 1;

        let result = match entry.entry_type {
            XRefEntryType::Uncompressed => self.load_uncompressed_object(obj_ref, entry.offset),
            XRefEntryType::Compressed => {
                self.load_compressed_object(obj_ref, entry.offset as u32, entry.generation)
            },
            XRefEntryType::Free => Err(Error::ObjectNotFound(obj_ref.id, obj_ref.gen)),
        };

        self.recursion_depth -= 1;
        self.resolving_stack.remove(&obj_ref);

        let object = result?;
        self.object_cache.insert(obj_ref, object.clone());
        Ok(object)
    }

    fn load_uncompressed_object(&mut self, obj_ref: ObjectRef, offset: u64) -> Result<Object> {
        let start = usize::try_from(offset)
            .ok()
            .filter(|&start| start < self.data.len())
            .ok_or_else(|| {
                Error::MalformedDocument(format!("object {} offset {} beyond end of file", obj_ref, offset))
            })?;

        let (found, object, _) = parse_indirect_object(&self.data[start..]).map_err(|e| {
            Error::MalformedDocument(format!("object {} at offset {}: {}", obj_ref, offset, e))
        })?;

        // Stale offsets (e.g. a linearized file edited without a rebuild) land on the wrong object
        if found != obj_ref {
            return Err(Error::MalformedDocument(format!(
                "xref offset {} points at object {} instead of {}",
                offset, found, obj_ref
            )));
        }
        Ok(object)
    }

    fn load_compressed_object(&mut self, obj_ref: ObjectRef, stream_num: u32, index: u16) -> Result<Object> {
        log::debug!("Object {} is compressed in stream {} (index {})", obj_ref, stream_num, index);

        if !self.objstm_cache.contains_key(&stream_num) {
            let stream = self.load_object(ObjectRef::new(stream_num, 0))?;
            let objects = parse_object_stream(&stream)?;
            self.objstm_cache.insert(stream_num, objects);
        }

        self.objstm_cache
            .get(&stream_num)
            .and_then(|objects| objects.get(&obj_ref.id))
            .cloned()
            .ok_or(Error::ObjectNotFound(obj_ref.id, obj_ref.gen))
    }

    /// Follow a reference; direct objects are returned as-is.
    pub fn resolve(&mut self, obj: &Object) -> Result<Object> {
        match obj {
            Object::Reference(r) => self.load_object(*r),
            other => Ok(other.clone()),
        }
    }

    /// Resolve `obj` and require a dictionary (streams yield their dictionary).
    pub fn resolve_dict(&mut self, obj: &Object) -> Result<Dictionary> {
        let resolved = self.resolve(obj)?;
        Ok(resolved.expect_dict()?.clone())
    }

    /// Reference to the document catalog (trailer /Root).
    pub fn catalog_ref(&self) -> Result<ObjectRef> {
        self.trailer
            .get("Root")
            .ok_or_else(|| Error::MalformedDocument("trailer missing /Root".into()))?
            .as_reference()
            .ok_or_else(|| Error::MalformedDocument("/Root is not a reference".into()))
    }

    /// The document catalog.
    pub fn catalog(&mut self) -> Result<Dictionary> {
        let root = self.catalog_ref()?;
        let catalog = self.load_object(root)?;
        catalog
            .as_dict()
            .cloned()
            .ok_or_else(|| Error::MalformedDocument("/Root is not a dictionary".into()))
    }

    fn pages_root(&mut self) -> Result<ObjectRef> {
        self.catalog()?
            .get("Pages")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::MalformedDocument("catalog /Pages is not a reference".into()))
    }

    /// Number of pages, from the page-tree root /Count.
    pub fn page_count(&mut self) -> Result<usize> {
        let root = self.pages_root()?;
        let node = self.load_object(root)?;
        node.expect_dict()?
            .get("Count")
            .and_then(Object::as_integer)
            .filter(|count| *count >= 0)
            .map(|count| count as usize)
            .ok_or_else(|| Error::MalformedDocument("page tree root has no /Count".into()))
    }

    /// Reference to the page at zero-based `page_index`.
    pub fn page_ref(&mut self, page_index: usize) -> Result<ObjectRef> {
        let root = self.pages_root()?;
        let mut visited = HashSet::new();
        let mut seen = 0;
        self.find_page(root, page_index, &mut seen, &mut visited, 0)?
            .ok_or_else(|| Error::MalformedDocument(format!("page {} not found in page tree", page_index)))
    }

    fn find_page(
        &mut self,
        node_ref: ObjectRef,
        target: usize,
        seen: &mut usize,
        visited: &mut HashSet<ObjectRef>,
        depth: usize,
    ) -> Result<Option<ObjectRef>> {
        if depth > MAX_TREE_DEPTH {
            return Err(Error::RecursionLimitExceeded(MAX_TREE_DEPTH as u32));
        }
        if !visited.insert(node_ref) {
            return Err(Error::CircularReference(node_ref));
        }

        let node = self.load_object(node_ref)?;
        let dict = node.expect_dict()?;
        match dict.get("Type").and_then(Object::as_name) {
            Some("Pages") => {
                let kids = dict
                    .get("Kids")
                    .and_then(Object::as_array)
                    .cloned()
                    .ok_or_else(|| Error::MalformedDocument("page tree node missing /Kids".into()))?;

                for kid in kids.iter().filter_map(Object::as_reference) {
                    if let Some(found) = self.find_page(kid, target, seen, visited, depth + 1)? {
                        return Ok(Some(found));
                    }
                }
                Ok(None)
            },
            // Leaf pages occasionally omit /Type
            Some("Page") | None => {
                if *seen == target {
                    Ok(Some(node_ref))
                } else {
                    *seen += 1;
                    Ok(None)
                }
            },
            Some(other) => Err(Error::MalformedDocument(format!("unknown page tree node type /{}", other))),
        }
    }

    /// The AcroForm dictionary, if the catalog has one.
    pub fn acroform(&mut self) -> Result<Option<ExistingAcroForm>> {
        let catalog = self.catalog()?;
        match catalog.get("AcroForm") {
            None | Some(Object::Null) => Ok(None),
            Some(Object::Reference(r)) => {
                let dict = self.load_object(*r)?.expect_dict()?.clone();
                Ok(Some(ExistingAcroForm {
                    reference: Some(*r),
                    dict,
                }))
            },
            Some(Object::Dictionary(dict)) => Ok(Some(ExistingAcroForm {
                reference: None,
                dict: dict.clone(),
            })),
            Some(other) => Err(Error::MalformedDocument(format!(
                "/AcroForm is a {}, expected a dictionary",
                other.type_name()
            ))),
        }
    }

    /// Fully qualified names of all form fields.
    pub fn field_names(&mut self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        self.walk_fields(&mut |name, _| names.push(name.to_string()))?;
        Ok(names)
    }

    /// Whether the document already carries a signature: /SigFlags bit 1 or a
    /// filled /FT /Sig field.
    pub fn is_signed(&mut self) -> Result<bool> {
        if let Some(form) = self.acroform()? {
            let flags = form.dict.get("SigFlags").and_then(Object::as_integer).unwrap_or(0);
            if flags & 1 != 0 {
                return Ok(true);
            }
        }

        let mut signed = false;
        self.walk_fields(&mut |_, field| {
            let is_sig = field.get("FT").and_then(Object::as_name) == Some("Sig");
            let has_value = field.get("V").is_some_and(|v| !v.is_null());
            signed |= is_sig && has_value;
        })?;
        Ok(signed)
    }

    /// Signature field dictionaries (`/FT /Sig`) with their names.
    pub fn signature_fields(&mut self) -> Result<Vec<(String, Dictionary)>> {
        let mut fields = Vec::new();
        self.walk_fields(&mut |name, field| {
            if field.get("FT").and_then(Object::as_name) == Some("Sig") {
                fields.push((name.to_string(), field.clone()));
            }
        })?;
        Ok(fields)
    }

    fn walk_fields(&mut self, visit: &mut dyn FnMut(&str, &Dictionary)) -> Result<()> {
        let Some(form) = self.acroform()? else {
            return Ok(());
        };
        let fields = match form.dict.get("Fields") {
            Some(obj) => self.resolve(obj)?,
            None => return Ok(()),
        };
        let mut visited = HashSet::new();
        for field in fields.as_array().cloned().unwrap_or_default() {
            self.walk_field(&field, "", None, visit, &mut visited, 0)?;
        }
        Ok(())
    }

    fn walk_field(
        &mut self,
        field: &Object,
        parent_name: &str,
        inherited_ft: Option<&Object>,
        visit: &mut dyn FnMut(&str, &Dictionary),
        visited: &mut HashSet<ObjectRef>,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_TREE_DEPTH {
            return Err(Error::RecursionLimitExceeded(MAX_TREE_DEPTH as u32));
        }
        if let Object::Reference(r) = field {
            if !visited.insert(*r) {
                return Err(Error::CircularReference(*r));
            }
        }

        let mut dict = self.resolve_dict(field)?;
        if !dict.contains_key("FT") {
            if let Some(ft) = inherited_ft {
                dict.insert("FT".to_string(), ft.clone());
            }
        }

        let partial = dict
            .get("T")
            .and_then(Object::as_string)
            .map(decode_text_string);
        let name = match (partial, parent_name.is_empty()) {
            (Some(partial), true) => partial,
            (Some(partial), false) => format!("{}.{}", parent_name, partial),
            (None, _) => parent_name.to_string(),
        };

        let kids = dict.get("Kids").and_then(Object::as_array).cloned();
        // Kids without /T are widgets of this field, not child fields
        let child_fields: Vec<Object> = match kids {
            Some(kids) => {
                let mut children = Vec::new();
                for kid in kids {
                    if self.resolve_dict(&kid)?.contains_key("T") {
                        children.push(kid);
                    }
                }
                children
            },
            None => Vec::new(),
        };

        if child_fields.is_empty() {
            if !name.is_empty() {
                visit(&name, &dict);
            }
            return Ok(());
        }

        let ft = dict.get("FT").cloned();
        for kid in child_fields {
            self.walk_field(&kid, &name, ft.as_ref(), visit, visited, depth + 1)?;
        }
        Ok(())
    }
}

/// Parse the `%PDF-M.m` header. Up to 1 KiB of leading garbage is tolerated.
///
/// ```
/// # use pdf_signer::document::parse_header;
/// assert_eq!(parse_header(b"%PDF-1.7\n").unwrap(), (1, 7));
/// assert!(parse_header(b"GIF89a").is_err());
/// ```
pub fn parse_header(data: &[u8]) -> Result<(u8, u8)> {
    let window = &data[..data.len().min(HEADER_SEARCH_WINDOW)];
    let caps = RE_HEADER
        .captures(window)
        .ok_or_else(|| Error::InvalidHeader("no %PDF-M.m marker in the first 1024 bytes".to_string()))?;

    let digit = |i: usize| caps.get(i).map(|m| m.as_bytes()[0] - b'0').unwrap_or(0);
    let (major, minor) = (digit(1), digit(2));
    if major == 0 || major > 2 {
        return Err(Error::InvalidHeader(format!("unsupported version {}.{}", major, minor)));
    }
    Ok((major, minor))
}

/// Decode a PDF text string (UTF-16BE with BOM, UTF-8 with BOM, else Latin-1).
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(utf8) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(utf8).into_owned();
    }
    bytes.iter().map(|&b| b as char).collect()
}
