//! Object parser.
//!
//! Combines tokens from the [`Lexer`] into complete objects (arrays,
//! dictionaries, indirect references) and reads indirect-object bodies.
//!
//! # Architecture
//!
//! The parser is recursive descent over a lexer cursor:
//! 1. Read a token
//! 2. Based on its type, decide how to continue
//! 3. For composite types (arrays, dicts), recursively parse the contents
//!
//! Every function takes the whole input buffer plus a starting offset and
//! returns the offset just past what it consumed, so errors always carry
//! absolute byte positions.

use crate::error::{Error, Result};
use crate::lexer::{Lexer, Spanned, Token};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::parser_config::ParserOptions;

/// Decode escape sequences in literal strings.
///
/// Supported escapes:
///
/// - `\n` → Line Feed (0x0A)
/// - `\r` → Carriage Return (0x0D)
/// - `\t` → Horizontal Tab (0x09)
/// - `\b` → Backspace (0x08)
/// - `\f` → Form Feed (0x0C)
/// - `\(` → Left Parenthesis
/// - `\)` → Right Parenthesis
/// - `\\` → Backslash
/// - `\ddd` → Byte with octal code (1-3 digits)
/// - `\<newline>` → Line continuation (elided)
///
/// Unknown escapes drop the backslash.
///
/// # Examples
///
/// ```
/// # use pdfimage::parser::decode_literal_string_escapes;
/// let decoded = decode_literal_string_escapes(b"Section \\247 71.01");
/// assert_eq!(decoded, b"Section \xa7 71.01");
/// ```
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] != b'\\' {
            result.push(raw[i]);
            i += 1;
            continue;
        }
        if i + 1 >= raw.len() {
            // Trailing lone backslash
            i += 1;
            continue;
        }

        match raw[i + 1] {
            b'n' => result.push(b'\n'),
            b'r' => result.push(b'\r'),
            b't' => result.push(b'\t'),
            b'b' => result.push(0x08),
            b'f' => result.push(0x0C),
            b'(' | b')' | b'\\' => result.push(raw[i + 1]),
            b'\n' => {},
            b'\r' => {
                if raw.get(i + 2) == Some(&b'\n') {
                    i += 1;
                }
            },
            b'0'..=b'7' => {
                let mut value = 0u32;
                let mut len = 0;
                while len < 3 {
                    match raw.get(i + 1 + len) {
                        Some(&d @ b'0'..=b'7') => {
                            value = value * 8 + (d - b'0') as u32;
                            len += 1;
                        },
                        _ => break,
                    }
                }
                // High-order overflow is ignored
                result.push((value & 0xFF) as u8);
                i += 1 + len;
                continue;
            },
            other => result.push(other),
        }
        i += 2;
    }

    result
}

/// Decode the body of a hex string.
///
/// Whitespace is skipped; an odd trailing digit is padded with a zero low
/// nibble. The lexer only admits hex digits and whitespace, anything else
/// is skipped here.
///
/// ```
/// use pdfimage::parser::decode_hex;
///
/// assert_eq!(decode_hex(b"48656C6C6F"), b"Hello");
/// assert_eq!(decode_hex(b"4 8 6"), vec![0x48, 0x60]);
/// ```
pub fn decode_hex(hex_bytes: &[u8]) -> Vec<u8> {
    let nibbles: Vec<u8> = hex_bytes
        .iter()
        .filter_map(|&c| (c as char).to_digit(16).map(|d| d as u8))
        .collect();

    nibbles
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => hi << 4 | lo,
            [hi] => hi << 4,
            _ => 0,
        })
        .collect()
}

/// Parsed body of an indirect object.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// A single value followed by `endobj`
    Value(Object),
    /// A stream dictionary followed by the stream keyword
    Stream {
        /// Stream dictionary
        dict: Dictionary,
        /// Offset of the first payload byte
        data_offset: usize,
    },
}

/// An indirect object as it appears at its offset, references unresolved.
#[derive(Debug, Clone, PartialEq)]
pub struct IndirectObject {
    /// Identifier from the `id gen obj` header
    pub id: ObjectRef,
    /// The object body
    pub body: Body,
}

/// Recursive-descent reader over a lexer cursor.
struct ObjectReader<'a> {
    lexer: Lexer<'a>,
    max_nesting: usize,
}

impl<'a> ObjectReader<'a> {
    fn new(data: &'a [u8], offset: usize, options: &ParserOptions) -> Self {
        Self {
            lexer: Lexer::at(data, offset),
            max_nesting: options.max_nesting,
        }
    }

    fn end_of_input(&self, reason: &str) -> Error {
        Error::MalformedObject {
            offset: self.lexer.data().len(),
            reason: reason.to_string(),
        }
    }

    fn expect_token(&mut self, what: &str) -> Result<Spanned<'a>> {
        self.lexer
            .next_token()?
            .ok_or_else(|| self.end_of_input(&format!("unexpected end of input, expected {}", what)))
    }

    fn read_value(&mut self, depth: usize) -> Result<Object> {
        let Spanned { offset, token } = self.expect_token("an object")?;

        match token {
            Token::Integer(n) => Ok(self.maybe_reference(n)),
            Token::Real(r) => Ok(Object::Real(r)),
            Token::True => Ok(Object::Boolean(true)),
            Token::False => Ok(Object::Boolean(false)),
            Token::Null => Ok(Object::Null),
            Token::LiteralString(raw) => Ok(Object::String(decode_literal_string_escapes(raw))),
            Token::HexString(raw) => Ok(Object::String(decode_hex(raw))),
            Token::Name(name) => Ok(Object::Name(name)),
            Token::ArrayStart => self.read_array(offset, depth + 1),
            Token::DictStart => self.read_dictionary(offset, depth + 1).map(Object::Dictionary),
            other => Err(Error::MalformedObject {
                offset,
                reason: format!("unexpected token {:?}", other),
            }),
        }
    }

    /// `id gen R` lookahead: two integers followed by `R` collapse into a
    /// reference. Anything else leaves the cursor after the first integer.
    fn maybe_reference(&mut self, id: i64) -> Object {
        let mut probe = self.lexer.clone();
        let gen = match probe.next_token() {
            Ok(Some(Spanned {
                token: Token::Integer(gen),
                ..
            })) => gen,
            _ => return Object::Integer(id),
        };
        let is_ref = matches!(probe.next_token(), Ok(Some(Spanned { token: Token::R, .. })));

        match (is_ref, u32::try_from(id), u16::try_from(gen)) {
            (true, Ok(id), Ok(gen)) => {
                self.lexer = probe;
                Object::Reference(ObjectRef::new(id, gen))
            },
            _ => Object::Integer(id),
        }
    }

    fn check_depth(&self, offset: usize, depth: usize) -> Result<()> {
        if depth > self.max_nesting {
            return Err(Error::MalformedObject {
                offset,
                reason: format!("nesting deeper than {} levels", self.max_nesting),
            });
        }
        Ok(())
    }

    fn read_array(&mut self, start: usize, depth: usize) -> Result<Object> {
        self.check_depth(start, depth)?;
        let mut items = Vec::new();

        loop {
            match self.lexer.peek_token()? {
                None => {
                    return Err(self.end_of_input(&format!("unclosed array starting at byte {}", start)))
                },
                Some(Spanned {
                    token: Token::ArrayEnd,
                    ..
                }) => {
                    self.lexer.next_token()?;
                    return Ok(Object::Array(items));
                },
                Some(_) => items.push(self.read_value(depth)?),
            }
        }
    }

    fn read_dictionary(&mut self, start: usize, depth: usize) -> Result<Dictionary> {
        self.check_depth(start, depth)?;
        let mut dict = Dictionary::new();

        loop {
            let Spanned { offset, token } = match self.lexer.next_token()? {
                Some(tok) => tok,
                None => {
                    return Err(
                        self.end_of_input(&format!("unclosed dictionary starting at byte {}", start))
                    )
                },
            };

            match token {
                Token::DictEnd => return Ok(dict),
                Token::Name(key) => {
                    let value = self.read_value(depth)?;
                    if dict.insert(key.clone(), value).is_some() {
                        log::debug!("Duplicate key /{} at byte {}, keeping the later value", key, offset);
                    }
                },
                other => {
                    return Err(Error::MalformedObject {
                        offset,
                        reason: format!("dictionary key must be a name, found {:?}", other),
                    })
                },
            }
        }
    }

    fn read_header(&mut self) -> Result<ObjectRef> {
        let Spanned { offset, token } = self.expect_token("object number")?;
        let id = match token {
            Token::Integer(n) => u32::try_from(n).map_err(|_| Error::MalformedObject {
                offset,
                reason: format!("object number {} out of range", n),
            })?,
            other => {
                return Err(Error::MalformedObject {
                    offset,
                    reason: format!("expected object number, found {:?}", other),
                })
            },
        };

        let Spanned { offset, token } = self.expect_token("generation number")?;
        let gen = match token {
            Token::Integer(n) => u16::try_from(n).map_err(|_| Error::MalformedObject {
                offset,
                reason: format!("generation number {} out of range", n),
            })?,
            other => {
                return Err(Error::MalformedObject {
                    offset,
                    reason: format!("expected generation number, found {:?}", other),
                })
            },
        };

        let Spanned { offset, token } = self.expect_token("'obj'")?;
        if token != Token::ObjStart {
            return Err(Error::MalformedObject {
                offset,
                reason: format!("expected 'obj', found {:?}", token),
            });
        }

        Ok(ObjectRef::new(id, gen))
    }

    /// Offset of the payload after a `stream` keyword at `keyword_end`.
    fn stream_data_offset(&self, keyword_end: usize) -> Result<usize> {
        let data = self.lexer.data();
        match &data[keyword_end..] {
            [b'\r', b'\n', ..] => Ok(keyword_end + 2),
            [b'\n', ..] => Ok(keyword_end + 1),
            [b'\r', ..] => {
                log::warn!("Stream keyword at byte {} followed by a bare CR", keyword_end);
                Ok(keyword_end + 1)
            },
            _ => Err(Error::MalformedObject {
                offset: keyword_end,
                reason: "stream keyword must be followed by an end-of-line marker".to_string(),
            }),
        }
    }
}

/// Parse exactly one object starting at `offset`.
///
/// Returns the object and the offset just past it.
///
/// # Example
///
/// ```
/// use pdfimage::object::{Object, ObjectRef};
/// use pdfimage::parser::parse_object;
///
/// let (obj, end) = parse_object(b"[ 1 2 /Name 4 0 R ]", 0).unwrap();
/// assert_eq!(end, 19);
/// let items = obj.as_array().unwrap();
/// assert_eq!(items[3], Object::Reference(ObjectRef::new(4, 0)));
/// ```
///
/// # Errors
///
/// `MalformedToken` from the lexer, or `MalformedObject` for unclosed
/// containers, non-name dictionary keys and stray keywords.
pub fn parse_object(data: &[u8], offset: usize) -> Result<(Object, usize)> {
    parse_object_with(data, offset, &ParserOptions::default())
}

/// [`parse_object`] with explicit limits.
pub fn parse_object_with(
    data: &[u8],
    offset: usize,
    options: &ParserOptions,
) -> Result<(Object, usize)> {
    let mut reader = ObjectReader::new(data, offset, options);
    let obj = reader.read_value(0)?;
    Ok((obj, reader.lexer.position()))
}

/// Parse an `id gen obj` header at `offset`.
///
/// Returns the identifier and the offset just past `obj`.
pub fn parse_object_header(data: &[u8], offset: usize) -> Result<(ObjectRef, usize)> {
    let mut reader = ObjectReader::new(data, offset, &ParserOptions::default());
    let id = reader.read_header()?;
    Ok((id, reader.lexer.position()))
}

/// Parse a full indirect object at `offset`.
pub fn parse_indirect_object(data: &[u8], offset: usize) -> Result<IndirectObject> {
    parse_indirect_object_with(data, offset, &ParserOptions::default())
}

/// [`parse_indirect_object`] with explicit limits.
///
/// A dictionary followed by `stream` yields [`Body::Stream`] with the
/// payload offset; the payload itself is left to the stream extractor.
pub fn parse_indirect_object_with(
    data: &[u8],
    offset: usize,
    options: &ParserOptions,
) -> Result<IndirectObject> {
    let mut reader = ObjectReader::new(data, offset, options);
    let id = reader.read_header()?;
    let value = reader.read_value(0)?;

    let Spanned {
        offset: tok_offset,
        token,
    } = reader.expect_token("'endobj'")?;

    let body = match (token, value) {
        (Token::ObjEnd, value) => Body::Value(value),
        (Token::StreamStart, Object::Dictionary(dict)) => {
            let data_offset = reader.stream_data_offset(reader.lexer.position())?;
            Body::Stream { dict, data_offset }
        },
        (Token::StreamStart, value) => {
            return Err(Error::MalformedObject {
                offset: tok_offset,
                reason: format!("stream keyword after a {} instead of a dictionary", value.type_name()),
            })
        },
        (other, _) => {
            return Err(Error::MalformedObject {
                offset: tok_offset,
                reason: format!("expected 'endobj', found {:?}", other),
            })
        },
    };

    Ok(IndirectObject { id, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &[u8]) -> Object {
        parse_object(input, 0).unwrap().0
    }

    fn dict(entries: &[(&str, Object)]) -> Object {
        Object::Dictionary(entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    // ========================================================================
    // Primitive Type Tests
    // ========================================================================

    #[test]
    fn test_parse_primitives() {
        assert_eq!(parse(b"null"), Object::Null);
        assert_eq!(parse(b"true"), Object::Boolean(true));
        assert_eq!(parse(b"false"), Object::Boolean(false));
        assert_eq!(parse(b"-42"), Object::Integer(-42));
        assert_eq!(parse(b"3.25"), Object::Real(3.25));
        assert_eq!(parse(b"/Type"), Object::name("Type"));
    }

    #[test]
    fn test_parse_returns_end_offset() {
        let (obj, end) = parse_object(b"  /Page  /Next", 0).unwrap();
        assert_eq!(obj, Object::name("Page"));
        assert_eq!(end, 7);
        let (obj, _) = parse_object(b"  /Page  /Next", end).unwrap();
        assert_eq!(obj, Object::name("Next"));
    }

    // ========================================================================
    // String Tests
    // ========================================================================

    #[test]
    fn test_literal_and_hex_normalize() {
        assert_eq!(parse(b"(Hello)"), parse(b"<48656C6C6F>"));
    }

    #[test]
    fn test_escape_sequences() {
        assert_eq!(parse(b"(a\\nb)"), Object::String(b"a\nb".to_vec()));
        assert_eq!(parse(b"(\\(x\\))"), Object::String(b"(x)".to_vec()));
        assert_eq!(parse(b"(\\\\)"), Object::String(b"\\".to_vec()));
        assert_eq!(parse(b"(\\b\\f\\t\\r)"), Object::String(vec![8, 12, 9, 13]));
    }

    #[test]
    fn test_escape_sequence_octal() {
        assert_eq!(decode_literal_string_escapes(b"\\101"), b"A");
        assert_eq!(decode_literal_string_escapes(b"\\53"), b"+");
        assert_eq!(decode_literal_string_escapes(b"\\0"), b"\0");
        assert_eq!(decode_literal_string_escapes(b"\\1234"), b"S4");
        assert_eq!(decode_literal_string_escapes(b"\\18"), b"\x018");
    }

    #[test]
    fn test_escape_sequence_line_continuation() {
        assert_eq!(decode_literal_string_escapes(b"ab\\\ncd"), b"abcd");
        assert_eq!(decode_literal_string_escapes(b"ab\\\r\ncd"), b"abcd");
        assert_eq!(decode_literal_string_escapes(b"ab\\\rcd"), b"abcd");
    }

    #[test]
    fn test_unknown_escape_drops_backslash() {
        assert_eq!(decode_literal_string_escapes(b"\\q"), b"q");
    }

    #[test]
    fn test_nested_parentheses() {
        assert_eq!(parse(b"(a (b) c)"), Object::String(b"a (b) c".to_vec()));
    }

    #[test]
    fn test_decode_hex_odd_and_whitespace() {
        assert_eq!(decode_hex(b"901FA"), vec![0x90, 0x1F, 0xA0]);
        assert_eq!(decode_hex(b"48 65\n6C"), b"Hel");
        assert_eq!(decode_hex(b""), Vec::<u8>::new());
    }

    // ========================================================================
    // Reference Lookahead Tests
    // ========================================================================

    #[test]
    fn test_parse_indirect_reference() {
        assert_eq!(parse(b"10 2 R"), Object::Reference(ObjectRef::new(10, 2)));
    }

    #[test]
    fn test_two_integers_without_r_stay_integers() {
        let (obj, end) = parse_object(b"10 20 30", 0).unwrap();
        assert_eq!(obj, Object::Integer(10));
        assert_eq!(end, 2);
    }

    #[test]
    fn test_array_of_integers_and_references() {
        assert_eq!(
            parse(b"[1 2 3 0 R 4]"),
            Object::Array(vec![
                Object::Integer(1),
                Object::Integer(2),
                Object::Reference(ObjectRef::new(3, 0)),
                Object::Integer(4),
            ])
        );
    }

    #[test]
    fn test_out_of_range_reference_parts_are_integers() {
        // Negative id cannot be a reference, leaving a stray R
        let err = parse_object(b"[-1 0 R]", 0).unwrap_err();
        assert!(matches!(err, Error::MalformedObject { offset: 6, .. }));
        // Generation beyond u16
        let err = parse_object(b"[1 70000 R]", 0).unwrap_err();
        assert!(matches!(err, Error::MalformedObject { .. }));
    }

    // ========================================================================
    // Array and Dictionary Tests
    // ========================================================================

    #[test]
    fn test_parse_nested_structure() {
        let obj = parse(b"<< /Type /Page /MediaBox [0 0 612 792] /Res << /A 1 0 R >> >>");
        assert_eq!(
            obj,
            dict(&[
                ("Type", Object::name("Page")),
                (
                    "MediaBox",
                    Object::Array(vec![
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(612),
                        Object::Integer(792),
                    ])
                ),
                ("Res", dict(&[("A", Object::Reference(ObjectRef::new(1, 0)))])),
            ])
        );
    }

    #[test]
    fn test_dictionary_preserves_order_and_unknown_keys() {
        let obj = parse(b"<< /Zed 1 /Alpha 2 /Custom#20Key (v) >>");
        let keys: Vec<&String> = obj.as_dict().unwrap().keys().collect();
        assert_eq!(keys, vec!["Zed", "Alpha", "Custom Key"]);
    }

    #[test]
    fn test_duplicate_key_later_wins() {
        let obj = parse(b"<< /A 1 /B 2 /A 3 >>");
        assert_eq!(obj.get("A"), Some(&Object::Integer(3)));
        assert_eq!(obj.as_dict().unwrap().len(), 2);
    }

    #[test]
    fn test_unclosed_array() {
        let err = parse_object(b"[1 2", 0).unwrap_err();
        match err {
            Error::MalformedObject { offset, reason } => {
                assert_eq!(offset, 4);
                assert!(reason.contains("unclosed array"));
            },
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_unclosed_dictionary() {
        let err = parse_object(b"<< /A 1", 0).unwrap_err();
        assert!(matches!(err, Error::MalformedObject { offset: 7, .. }));
    }

    #[test]
    fn test_non_name_key() {
        let err = parse_object(b"<< 1 2 >>", 0).unwrap_err();
        assert!(matches!(err, Error::MalformedObject { offset: 3, .. }));
    }

    #[test]
    fn test_missing_value() {
        let err = parse_object(b"<< /A >>", 0).unwrap_err();
        assert!(matches!(err, Error::MalformedObject { offset: 6, .. }));
    }

    #[test]
    fn test_nested_error_carries_inner_offset() {
        let err = parse_object(b"[ [ (ok) ] << /K (unterminated >> ]", 0).unwrap_err();
        assert!(matches!(err, Error::MalformedToken { offset: 17, .. }));
    }

    #[test]
    fn test_nesting_limit() {
        let options = ParserOptions::default().with_max_nesting(3);
        assert!(parse_object_with(b"[[[1]]]", 0, &options).is_ok());
        let err = parse_object_with(b"[[[[1]]]]", 0, &options).unwrap_err();
        assert!(matches!(err, Error::MalformedObject { offset: 3, .. }));
    }

    // ========================================================================
    // Indirect Object Tests
    // ========================================================================

    #[test]
    fn test_parse_object_header() {
        let (id, end) = parse_object_header(b"12 3 obj\n<<>>", 0).unwrap();
        assert_eq!(id, ObjectRef::new(12, 3));
        assert_eq!(end, 8);
    }

    #[test]
    fn test_header_requires_obj_keyword() {
        assert!(parse_object_header(b"12 3 R", 0).is_err());
        assert!(parse_object_header(b"xref", 0).is_err());
    }

    #[test]
    fn test_parse_indirect_value() {
        let obj = parse_indirect_object(b"4 0 obj\n(text)\nendobj\n", 0).unwrap();
        assert_eq!(obj.id, ObjectRef::new(4, 0));
        assert_eq!(obj.body, Body::Value(Object::String(b"text".to_vec())));
    }

    #[test]
    fn test_parse_indirect_stream() {
        let input = b"5 0 obj\n<< /Length 3 >>\nstream\r\nabc\nendstream\nendobj\n";
        let obj = parse_indirect_object(input, 0).unwrap();
        match obj.body {
            Body::Stream { dict, data_offset } => {
                assert_eq!(dict.get("Length"), Some(&Object::Integer(3)));
                assert_eq!(&input[data_offset..data_offset + 3], b"abc");
            },
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_stream_keyword_requires_eol() {
        let err = parse_indirect_object(b"5 0 obj << >> stream abc", 0).unwrap_err();
        assert!(matches!(err, Error::MalformedObject { .. }));
    }

    #[test]
    fn test_missing_endobj() {
        let err = parse_indirect_object(b"1 0 obj 5 6 endobj", 0).unwrap_err();
        assert!(matches!(err, Error::MalformedObject { offset: 10, .. }));
    }

    #[test]
    fn test_stream_after_non_dictionary() {
        let err = parse_indirect_object(b"1 0 obj [1] stream\n", 0).unwrap_err();
        assert!(matches!(err, Error::MalformedObject { .. }));
    }
}
