//! Cross-reference table parser.
//!
//! The xref maps object numbers to byte offsets. Both classic tables and
//! cross-reference streams (PDF 1.5+) are read, including hybrid files
//! (`/XRefStm`) and `/Prev` chains left behind by earlier incremental updates.

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::{Dictionary, Object};
use crate::parser::{parse_indirect_object, parse_object, rfind_subsequence};
use std::collections::{HashMap, HashSet};

/// Longest `/Prev` chain followed before giving up.
const MAX_PREV_CHAIN: u32 = 100;

/// Cross-reference table entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntryType {
    /// Entry for a free object
    Free,
    /// Entry for an uncompressed object at a byte offset
    Uncompressed,
    /// Entry for an object stored in an object stream
    Compressed,
}

/// Cross-reference table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XRefEntry {
    /// Type of entry
    pub entry_type: XRefEntryType,
    /// Byte offset (uncompressed) or object stream number (compressed)
    pub offset: u64,
    /// Generation number (uncompressed) or index within stream (compressed)
    pub generation: u16,
}

impl XRefEntry {
    /// Uncompressed object at `offset`.
    pub fn uncompressed(offset: u64, generation: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Uncompressed,
            offset,
            generation,
        }
    }

    /// Object number `index` inside object stream `stream_obj_num`.
    pub fn compressed(stream_obj_num: u64, index: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Compressed,
            offset: stream_obj_num,
            generation: index,
        }
    }

    /// Free entry.
    pub fn free(next_free: u64, generation: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Free,
            offset: next_free,
            generation,
        }
    }

    /// Whether the entry points at a live object.
    pub fn in_use(&self) -> bool {
        self.entry_type != XRefEntryType::Free
    }
}

/// Syntax of a cross-reference section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefFormat {
    /// `xref` keyword followed by fixed-width rows and a `trailer` dictionary
    Table,
    /// `/Type /XRef` stream object
    Stream,
}

/// Merged cross-reference information for a whole file.
#[derive(Debug, Clone)]
pub struct CrossRefTable {
    entries: HashMap<u32, XRefEntry>,
    trailer: Option<Dictionary>,
    format: XRefFormat,
}

impl CrossRefTable {
    /// Create a new empty cross-reference table.
    pub fn new(format: XRefFormat) -> Self {
        Self {
            entries: HashMap::new(),
            trailer: None,
            format,
        }
    }

    /// Set the trailer dictionary.
    pub fn set_trailer(&mut self, trailer: Dictionary) {
        self.trailer = Some(trailer);
    }

    /// Trailer of the newest section.
    pub fn trailer(&self) -> Option<&Dictionary> {
        self.trailer.as_ref()
    }

    /// Format of the newest section.
    pub fn format(&self) -> XRefFormat {
        self.format
    }

    /// Add an entry to the table.
    pub fn add_entry(&mut self, object_number: u32, entry: XRefEntry) {
        self.entries.insert(object_number, entry);
    }

    /// Get an entry by object number.
    pub fn get(&self, object_number: u32) -> Option<&XRefEntry> {
        self.entries.get(&object_number)
    }

    /// Highest object number with an entry of any kind.
    pub fn max_object_number(&self) -> u32 {
        self.entries.keys().copied().max().unwrap_or(0)
    }

    /// Merge an older section; entries already present win.
    pub fn merge_older(&mut self, older: CrossRefTable) {
        for (num, entry) in older.entries {
            self.entries.entry(num).or_insert(entry);
        }
        if self.trailer.is_none() {
            self.trailer = older.trailer;
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Find the offset named by the last `startxref` keyword.
pub fn find_xref_offset(data: &[u8]) -> Result<u64> {
    let window_start = data.len().saturating_sub(4096);
    let tail = &data[window_start..];
    let pos = rfind_subsequence(tail, b"startxref").ok_or(Error::InvalidXref)?;

    match token(&tail[pos + b"startxref".len()..]) {
        Ok((_, Token::Integer(offset))) if offset >= 0 && (offset as usize) < data.len() => {
            Ok(offset as u64)
        },
        _ => Err(Error::InvalidXref),
    }
}

/// Parse the cross-reference chain starting at `offset`.
pub fn parse_xref(data: &[u8], offset: u64) -> Result<CrossRefTable> {
    let mut visited = HashSet::new();
    parse_xref_chain(data, offset, 0, &mut visited)
}

fn parse_xref_chain(
    data: &[u8],
    offset: u64,
    depth: u32,
    visited: &mut HashSet<u64>,
) -> Result<CrossRefTable> {
    if depth > MAX_PREV_CHAIN {
        return Err(Error::RecursionLimitExceeded(MAX_PREV_CHAIN));
    }
    if !visited.insert(offset) {
        return Err(Error::MalformedDocument(format!(
            "cross-reference /Prev chain loops back to offset {}",
            offset
        )));
    }

    let mut xref = parse_xref_section(data, offset)?;
    let trailer = xref.trailer().cloned().unwrap_or_default();

    // Hybrid-reference files keep compressed objects in a side xref stream
    if let Some(stm_offset) = trailer.get("XRefStm").and_then(Object::as_integer) {
        log::debug!("Following /XRefStm at offset {}", stm_offset);
        match parse_xref_stream(data, stm_offset as u64) {
            Ok(side) => {
                for (num, entry) in side.entries {
                    xref.entries.entry(num).or_insert(entry);
                }
            },
            Err(e) => log::warn!("Ignoring unreadable /XRefStm section: {}", e),
        }
    }

    if let Some(prev) = trailer.get("Prev").and_then(Object::as_integer) {
        if prev < 0 || prev as usize >= data.len() {
            return Err(Error::MalformedDocument(format!("/Prev offset {} out of range", prev)));
        }
        log::debug!("Following /Prev from {} to {}", offset, prev);
        let older = parse_xref_chain(data, prev as u64, depth + 1, visited)?;
        xref.merge_older(older);
    }

    Ok(xref)
}

/// Parse one section (table or stream) without following /Prev.
pub fn parse_xref_section(data: &[u8], offset: u64) -> Result<CrossRefTable> {
    let start = offset as usize;
    if start >= data.len() {
        return Err(Error::InvalidXref);
    }
    let section = &data[start..];
    let body = trim_leading_whitespace(section);

    if body.starts_with(b"xref") {
        log::debug!("Classic xref table at offset {}", offset);
        parse_traditional_xref(body)
    } else if body.first().is_some_and(u8::is_ascii_digit) {
        log::debug!("Cross-reference stream at offset {}", offset);
        parse_xref_stream(data, offset)
    } else {
        Err(Error::InvalidXref)
    }
}

fn trim_leading_whitespace(input: &[u8]) -> &[u8] {
    let skip = input
        .iter()
        .take_while(|&&c| crate::lexer::is_whitespace(c))
        .count();
    &input[skip..]
}

/// Parse a classic table starting at the `xref` keyword, including its trailer.
///
/// ```text
/// xref
/// 0 3
/// 0000000000 65535 f
/// 0000000017 00000 n
/// 0000000081 00000 n
/// trailer
/// << /Size 3 /Root 1 0 R >>
/// ```
fn parse_traditional_xref(input: &[u8]) -> Result<CrossRefTable> {
    let mut xref = CrossRefTable::new(XRefFormat::Table);
    let mut rest = &input[b"xref".len()..];

    loop {
        // Anything but a subsection header ends the table (normally `trailer`)
        let (after, start) = match token(rest) {
            Ok((after, Token::Integer(start))) if (0..=u32::MAX as i64).contains(&start) => (after, start as u32),
            _ => break,
        };
        let (after, count) = match token(after) {
            Ok((after, Token::Integer(count))) if count >= 0 => (after, count as u32),
            _ => return Err(Error::InvalidXref),
        };
        if count > 10_000_000 {
            return Err(Error::MalformedDocument("xref subsection count exceeds limit".into()));
        }

        rest = after;
        for i in 0..count {
            let (after, offset) = match token(rest) {
                Ok((after, Token::Integer(v))) if v >= 0 => (after, v as u64),
                _ => return Err(Error::InvalidXref),
            };
            let (after, generation) = match token(after) {
                Ok((after, Token::Integer(v))) if (0..=u16::MAX as i64).contains(&v) => (after, v as u16),
                _ => return Err(Error::InvalidXref),
            };
            let (after, flag) = crate::lexer::bare_word(after).map_err(|_| Error::InvalidXref)?;
            let entry = match flag {
                b"n" => XRefEntry::uncompressed(offset, generation),
                b"f" => XRefEntry::free(offset, generation),
                other => {
                    return Err(Error::ParseError {
                        offset: 0,
                        reason: format!(
                            "invalid xref entry flag {:?}",
                            String::from_utf8_lossy(other)
                        ),
                    })
                },
            };
            xref.add_entry(subsection_number(start, i)?, entry);
            rest = after;
        }
    }

    let (after, word) = crate::lexer::bare_word(rest).map_err(|_| Error::InvalidXref)?;
    if word != b"trailer" {
        return Err(Error::InvalidXref);
    }
    let (_, trailer) = parse_object(after).map_err(|_| Error::InvalidXref)?;
    match trailer {
        Object::Dictionary(dict) => xref.set_trailer(dict),
        _ => return Err(Error::InvalidXref),
    }

    Ok(xref)
}

/// Parse a `/Type /XRef` stream object located at `offset`.
fn parse_xref_stream(data: &[u8], offset: u64) -> Result<CrossRefTable> {
    let start = offset as usize;
    if start >= data.len() {
        return Err(Error::InvalidXref);
    }
    let (_, obj, _) = parse_indirect_object(&data[start..])?;
    let dict = match &obj {
        Object::Stream { dict, .. } => dict,
        _ => return Err(Error::MalformedDocument("xref stream is not a stream".into())),
    };
    if dict.get("Type").and_then(Object::as_name) != Some("XRef") {
        return Err(Error::MalformedDocument("expected /Type /XRef".into()));
    }

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(Object::as_array)
        .map(|w| {
            w.iter()
                .filter_map(Object::as_integer)
                .map(|v| v.max(0) as usize)
                .collect()
        })
        .unwrap_or_default();
    if widths.len() != 3 || widths.iter().any(|&w| w > 8) {
        return Err(Error::MalformedDocument("invalid /W array in xref stream".into()));
    }
    let (w1, w2, w3) = (widths[0], widths[1], widths[2]);
    let row = w1 + w2 + w3;

    let size = dict
        .get("Size")
        .and_then(Object::as_integer)
        .ok_or_else(|| Error::MalformedDocument("xref stream missing /Size".into()))?;
    let ranges: Vec<(u32, u32)> = match dict.get("Index").and_then(Object::as_array) {
        Some(index) => index
            .chunks(2)
            .map(|pair| match pair {
                [a, b] => match (a.as_integer().and_then(to_u32), b.as_integer().and_then(to_u32)) {
                    (Some(first), Some(count)) => Ok((first, count)),
                    _ => Err(Error::MalformedDocument(format!("invalid /Index pair {:?} in xref stream", pair))),
                },
                _ => Err(Error::MalformedDocument("odd-length /Index array in xref stream".into())),
            })
            .collect::<Result<_>>()?,
        None => vec![(0, to_u32(size).unwrap_or(0))],
    };

    let decoded = obj.decode_stream_data()?;
    let mut xref = CrossRefTable::new(XRefFormat::Stream);
    let mut rows = decoded.chunks_exact(row.max(1));

    for (first, count) in ranges {
        for i in 0..count {
            let entry = rows
                .next()
                .ok_or_else(|| Error::MalformedDocument("truncated xref stream data".into()))?;
            let kind = if w1 == 0 { 1 } else { read_int(&entry[..w1]) };
            let field2 = read_int(&entry[w1..w1 + w2]);
            let field3 = read_int(&entry[w1 + w2..]);
            let parsed = match kind {
                0 => XRefEntry::free(field2, field3 as u16),
                1 => XRefEntry::uncompressed(field2, field3 as u16),
                2 => XRefEntry::compressed(field2, field3 as u16),
                // Unknown types are to be treated as references to null
                _ => continue,
            };
            xref.add_entry(subsection_number(first, i)?, parsed);
        }
    }

    xref.set_trailer(dict.clone());
    Ok(xref)
}

/// Object number `offset` places after the first number of a subsection.
fn subsection_number(first: u32, offset: u32) -> Result<u32> {
    first.checked_add(offset).ok_or_else(|| {
        Error::MalformedDocument(format!("xref subsection starting at {} overflows object numbers", first))
    })
}

fn to_u32(value: i64) -> Option<u32> {
    u32::try_from(value).ok()
}

/// Big-endian integer from a field of an xref stream row.
fn read_int(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}
