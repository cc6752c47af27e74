//! Stream decoders needed to read cross-reference and object streams.
//!
//! Only FlateDecode (optionally with a PNG or TIFF predictor) is supported:
//! the signer never touches page content, and xref/object streams are always
//! Flate-compressed or stored raw in practice.

use crate::error::{Error, Result};
use crate::object::Object;

mod flate;
mod predictor;

pub use flate::FlateDecoder;
pub use predictor::{decode_predictor, DecodeParams};

/// Upper bound on decoded stream size.
const MAX_DECODED_SIZE: usize = 100 * 1024 * 1024;

/// Trait for PDF stream decoders.
pub trait StreamDecoder {
    /// Decode the input data.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Name of the filter this decoder implements (e.g. "FlateDecode").
    fn name(&self) -> &str;
}

/// Decode stream data through a filter chain, then undo the predictor.
pub fn decode_stream(
    data: &[u8],
    filters: &[String],
    params: Option<&DecodeParams>,
) -> Result<Vec<u8>> {
    let mut current = data.to_vec();
    for filter in filters {
        current = match filter.as_str() {
            "FlateDecode" | "Fl" => FlateDecoder.decode(&current)?,
            other => return Err(Error::Decode(format!("unsupported filter /{}", other))),
        };
        if current.len() > MAX_DECODED_SIZE {
            return Err(Error::Decode(format!(
                "decoded stream exceeds {} bytes",
                MAX_DECODED_SIZE
            )));
        }
    }

    match params {
        Some(params) if params.predictor > 1 => decode_predictor(&current, params),
        _ => Ok(current),
    }
}

impl DecodeParams {
    /// Read decode parameters from a /DecodeParms entry (dictionary or first
    /// dictionary of an array).
    pub fn from_object(obj: &Object) -> Option<Self> {
        let dict = match obj {
            Object::Dictionary(d) => d,
            Object::Array(items) => items.iter().find_map(|item| match item {
                Object::Dictionary(d) => Some(d),
                _ => None,
            })?,
            _ => return None,
        };

        let get = |key: &str, default: i64| {
            dict.get(key)
                .and_then(Object::as_integer)
                .unwrap_or(default)
        };

        Some(DecodeParams {
            predictor: get("Predictor", 1),
            columns: get("Columns", 1).max(1) as usize,
            colors: get("Colors", 1).max(1) as usize,
            bits_per_component: get("BitsPerComponent", 8).max(1) as usize,
        })
    }
}
