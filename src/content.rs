//! Content stream scanner.
//!
//! Content streams use postfix notation: operands precede the operator.
//!
//! ```text
//! q 800 0 0 1200 0 0 cm /Im0 Do Q
//! ```
//!
//! Only the syntax is read; operators are not interpreted.

use crate::error::{Error, Result};
use crate::lexer::{is_regular, skip_ws};
use crate::object::Object;
use crate::parser::parse_object;

/// One operator with the operands that preceded it.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Operands in stream order
    pub operands: Vec<Object>,
    /// Operator keyword
    pub operator: String,
}

fn is_operator_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'\'' || c == b'"' || c == b'*'
}

/// Split a content stream into operations.
///
/// Inline image data (`BI ... ID <bytes> EI`) is skipped as a whole and
/// reported as a single `BI` operation.
///
/// ```
/// use pdfimage::content::parse_operations;
///
/// let ops = parse_operations(b"q 10 0 0 20 5 5 cm /Im1 Do Q").unwrap();
/// assert_eq!(ops.len(), 4);
/// assert_eq!(ops[1].operator, "cm");
/// assert_eq!(ops[2].operands.len(), 1);
/// ```
pub fn parse_operations(data: &[u8]) -> Result<Vec<Operation>> {
    let mut operations = Vec::new();
    let mut operands = Vec::new();
    let mut pos = 0;

    loop {
        pos = data.len() - skip_ws(&data[pos..]).len();
        if pos >= data.len() {
            break;
        }

        if is_operator_start(data[pos]) {
            let len = data[pos..].iter().take_while(|&&c| is_regular(c)).count();
            let word = String::from_utf8_lossy(&data[pos..pos + len]).into_owned();

            if !matches!(word.as_str(), "true" | "false" | "null") {
                pos += len;
                if word == "BI" {
                    pos = skip_inline_image(data, pos)?;
                }
                operations.push(Operation {
                    operands: std::mem::take(&mut operands),
                    operator: word,
                });
                continue;
            }
        }

        let (obj, end) = parse_object(data, pos)?;
        operands.push(obj);
        pos = end;
    }

    if !operands.is_empty() {
        log::warn!("Content stream ends with {} dangling operands", operands.len());
    }

    Ok(operations)
}

/// Skip from after `BI` to just past the matching `EI`.
fn skip_inline_image(data: &[u8], start: usize) -> Result<usize> {
    let boundary = |i: usize| data.get(i).map_or(true, |&c| !is_regular(c));

    let id = (start..data.len().saturating_sub(1))
        .find(|&i| &data[i..i + 2] == b"ID" && !is_regular(data[i - 1]) && boundary(i + 2))
        .ok_or_else(|| Error::MalformedObject {
            offset: start,
            reason: "inline image without ID".to_string(),
        })?;

    let body = id + 3;
    (body..data.len().saturating_sub(1))
        .find(|&i| &data[i..i + 2] == b"EI" && !is_regular(data[i - 1]) && boundary(i + 2))
        .map(|i| i + 2)
        .ok_or_else(|| Error::MalformedObject {
            offset: body,
            reason: "inline image without EI".to_string(),
        })
}
