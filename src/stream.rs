//! Stream payload extraction.
//!
//! Given the stream dictionary and payload offset of an indirect object,
//! determines the payload length (following an indirect `/Length` through
//! a [`LengthResolver`]) and returns the raw bytes. Filters are not
//! interpreted.

use crate::error::{Error, Result};
use crate::lexer::skip_ws;
use crate::object::{Dictionary, Object, ObjectRef};
use bytes::Bytes;

/// Resolves an indirect `/Length` value.
///
/// Implemented by the document model; tests can supply a map.
pub trait LengthResolver {
    /// Return the integer stored at `r`.
    fn resolve_length(&self, r: ObjectRef) -> Result<i64>;
}

/// Declared payload length of a stream.
pub fn declared_length(
    dict: &Dictionary,
    dict_offset: usize,
    resolver: &dyn LengthResolver,
) -> Result<usize> {
    let length = match dict.get("Length") {
        Some(Object::Integer(n)) => *n,
        Some(Object::Reference(r)) => resolver.resolve_length(*r)?,
        Some(other) => {
            return Err(Error::MalformedObject {
                offset: dict_offset,
                reason: format!("stream /Length is a {}", other.type_name()),
            })
        },
        None => {
            return Err(Error::MalformedObject {
                offset: dict_offset,
                reason: "stream dictionary has no /Length".to_string(),
            })
        },
    };

    usize::try_from(length).map_err(|_| Error::MalformedObject {
        offset: dict_offset,
        reason: format!("negative stream /Length {}", length),
    })
}

/// Extract the payload that starts at `data_offset`.
///
/// `data` is the whole document buffer; the returned [`Bytes`] shares it.
///
/// # Errors
///
/// - `TruncatedStream` if the declared length runs past the end of `data`
/// - `MalformedObject` if `/Length` is missing or invalid, or `endstream`
///   does not follow the payload
pub fn extract_stream(
    data: &Bytes,
    dict: &Dictionary,
    data_offset: usize,
    resolver: &dyn LengthResolver,
) -> Result<Bytes> {
    let length = declared_length(dict, data_offset, resolver)?;
    let available = data.len().saturating_sub(data_offset);

    if length > available {
        return Err(Error::TruncatedStream {
            offset: data_offset,
            declared: length,
            available,
        });
    }

    let end = data_offset + length;
    let rest = skip_ws(&data[end..]);
    if !rest.starts_with(b"endstream") {
        return Err(Error::MalformedObject {
            offset: data.len() - rest.len(),
            reason: "expected 'endstream' after stream payload".to_string(),
        });
    }

    Ok(data.slice(data_offset..end))
}
