//! Object stream parsing (PDF 1.5+).
//!
//! Object streams (/Type /ObjStm) pack several objects into one compressed
//! stream:
//!
//! ```text
//! N 0 obj
//! << /Type /ObjStm /N 2 /First 9 /Filter /FlateDecode >>
//! stream
//! 10 0 11 15            % pairs of (object number, offset relative to /First)
//! << /Type /Catalog >>  % object 10
//! [1 2 3]               % object 11
//! endstream
//! endobj
//! ```

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::Object;
use crate::parser::parse_object;
use std::collections::HashMap;

/// Upper bound on /N, far above anything a real writer produces.
const MAX_OBJECTS_PER_STREAM: i64 = 1_000_000;

/// Parse an object stream and return every object it contains, keyed by
/// object number.
pub fn parse_object_stream(stream_obj: &Object) -> Result<HashMap<u32, Object>> {
    let dict = stream_obj.as_dict().ok_or_else(|| Error::InvalidObjectType {
        expected: "Stream".to_string(),
        found: stream_obj.type_name().to_string(),
    })?;

    if let Some(kind) = dict.get("Type").and_then(Object::as_name) {
        if kind != "ObjStm" {
            return Err(Error::MalformedDocument(format!(
                "expected /Type /ObjStm, found /{}",
                kind
            )));
        }
    }

    let count = dict
        .get("N")
        .and_then(Object::as_integer)
        .filter(|n| (0..=MAX_OBJECTS_PER_STREAM).contains(n))
        .ok_or_else(|| Error::MalformedDocument("object stream has invalid /N".into()))?
        as usize;
    let first = dict
        .get("First")
        .and_then(Object::as_integer)
        .filter(|f| *f >= 0)
        .ok_or_else(|| Error::MalformedDocument("object stream has invalid /First".into()))?
        as usize;

    let data = stream_obj.decode_stream_data()?;
    if first > data.len() {
        return Err(Error::MalformedDocument("object stream /First beyond data".into()));
    }

    let offsets = parse_offset_table(&data[..first], count)?;
    let body = &data[first..];
    let mut objects = HashMap::with_capacity(offsets.len());

    for (obj_num, offset) in offsets {
        if offset >= body.len() {
            log::warn!("Object {} offset {} beyond object stream body", obj_num, offset);
            continue;
        }
        match parse_object(&body[offset..]) {
            Ok((_, obj)) => {
                objects.insert(obj_num, obj);
            },
            Err(e) => log::warn!("Failed to parse object {} in object stream: {:?}", obj_num, e),
        }
    }

    Ok(objects)
}

fn parse_offset_table(header: &[u8], count: usize) -> Result<Vec<(u32, usize)>> {
    let mut pairs = Vec::with_capacity(count);
    let mut rest = header;
    for _ in 0..count {
        let (after, num) = match token(rest) {
            Ok((after, Token::Integer(n))) if n >= 0 => (after, n as u32),
            _ => return Err(Error::MalformedDocument("truncated object stream header".into())),
        };
        let (after, offset) = match token(after) {
            Ok((after, Token::Integer(o))) if o >= 0 => (after, o as usize),
            _ => return Err(Error::MalformedDocument("truncated object stream header".into())),
        };
        pairs.push((num, offset));
        rest = after;
    }
    Ok(pairs)
}
