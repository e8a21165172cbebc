//! Lexer (tokenizer) for the object syntax.
//!
//! The token combinators are plain nom parsers over byte slices. [`Lexer`]
//! wraps them in a cursor over the whole input so that every token carries
//! its absolute byte offset and scanning can restart from any position.
//!
//! # Syntax overview
//!
//! - Numbers: integers (42, -123) and reals (3.14, -2.5, .5)
//! - Strings: literal `(Hello)` and hexadecimal `<48656C6C6F>`
//! - Names: `/Type`, `/A#20B`
//! - Keywords: `true`, `false`, `null`, `obj`, `endobj`, `stream`, `endstream`, `R`
//! - Delimiters: `[`, `]`, `<<`, `>>`
//!
//! Whitespace (NUL, TAB, LF, FF, CR, SP) and comments (`%` to end of line)
//! separate tokens and are never emitted.

use crate::error::{Error, Result};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while},
    character::complete::{char, digit1, one_of},
    combinator::{map, opt, value},
    multi::many0,
    sequence::{delimited, preceded},
    IResult,
};

/// Token types recognized by the lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer number (e.g., 42, -123)
    Integer(i64),

    /// Real (floating-point) number (e.g., 3.14, -2.5, .5)
    Real(f64),

    /// Literal string body, escapes still encoded
    LiteralString(&'a [u8]),

    /// Hexadecimal string body, whitespace preserved
    HexString(&'a [u8]),

    /// Name with `#xx` escapes decoded
    Name(String),

    /// Boolean true keyword
    True,

    /// Boolean false keyword
    False,

    /// Null keyword
    Null,

    /// Array start delimiter [
    ArrayStart,

    /// Array end delimiter ]
    ArrayEnd,

    /// Dictionary start delimiter <<
    DictStart,

    /// Dictionary end delimiter >>
    DictEnd,

    /// Indirect object start keyword "obj"
    ObjStart,

    /// Indirect object end keyword "endobj"
    ObjEnd,

    /// Stream start keyword "stream"
    StreamStart,

    /// Stream end keyword "endstream"
    StreamEnd,

    /// Reference keyword "R" (used in "10 0 R")
    R,
}

/// Whitespace bytes: NUL, TAB, LF, FF, CR, SP.
pub fn is_whitespace(c: u8) -> bool {
    matches!(c, 0x00 | b'\t' | b'\n' | 0x0C | b'\r' | b' ')
}

/// Delimiter bytes.
pub fn is_delimiter(c: u8) -> bool {
    matches!(c, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

/// Regular bytes: anything that is neither whitespace nor a delimiter.
pub fn is_regular(c: u8) -> bool {
    !is_whitespace(c) && !is_delimiter(c)
}

fn fail(input: &[u8], kind: nom::error::ErrorKind) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, kind))
}

/// Parse at least one whitespace byte.
fn whitespace(input: &[u8]) -> IResult<&[u8], ()> {
    let (remaining, ws) = take_while(is_whitespace)(input)?;
    if ws.is_empty() {
        return Err(fail(input, nom::error::ErrorKind::Space));
    }
    Ok((remaining, ()))
}

/// Parse a comment (% to end of line).
fn comment(input: &[u8]) -> IResult<&[u8], ()> {
    value((), preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n')))(input)
}

/// Skip all whitespace and comments.
pub(crate) fn skip_ws(input: &[u8]) -> &[u8] {
    let mut remaining = input;
    loop {
        if let Ok((rest, _)) = whitespace(remaining) {
            remaining = rest;
            continue;
        }
        if let Ok((rest, _)) = comment(remaining) {
            remaining = rest;
            continue;
        }
        return remaining;
    }
}

/// Succeeds when the input is at a token boundary.
fn boundary(input: &[u8]) -> IResult<&[u8], ()> {
    match input.first() {
        Some(&c) if is_regular(c) => Err(fail(input, nom::error::ErrorKind::Verify)),
        _ => Ok((input, ())),
    }
}

/// Parse an integer or real number.
///
/// Accepts an optional sign, and reals may start or end with the decimal
/// point (`.5`, `5.`).
fn parse_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let start = input;
    let (input, sign) = opt(one_of("+-"))(input)?;
    let (input, int_part) = opt(digit1)(input)?;
    let (input, frac_part) = opt(preceded(char('.'), opt(digit1)))(input)?;

    let has_digits = int_part.is_some() || matches!(frac_part, Some(Some(_)));
    if !has_digits {
        return Err(fail(start, nom::error::ErrorKind::Digit));
    }
    let (input, _) = boundary(input)?;

    let mut text = String::new();
    if sign == Some('-') {
        text.push('-');
    }
    // digit1 only yields ASCII digits
    text.extend(int_part.unwrap_or(b"0").iter().map(|&b| b as char));

    match frac_part {
        Some(frac) => {
            text.push('.');
            text.extend(frac.unwrap_or(b"0").iter().map(|&b| b as char));
            let num: f64 = text
                .parse()
                .map_err(|_| fail(start, nom::error::ErrorKind::Float))?;
            Ok((input, Token::Real(num)))
        },
        None => {
            let num: i64 = text
                .parse()
                .map_err(|_| fail(start, nom::error::ErrorKind::Digit))?;
            Ok((input, Token::Integer(num)))
        },
    }
}

/// Parse a literal string enclosed in parentheses.
///
/// Balanced nested parentheses are counted by depth; escaped parentheses
/// do not count. The raw body is returned with escapes still encoded.
fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (remaining, _) = char('(')(input)?;
    let mut depth = 1;
    let mut pos = 0;

    while depth > 0 && pos < remaining.len() {
        match remaining[pos] {
            b'\\' => {
                // Skip the backslash and the byte it escapes
                pos += 2;
            },
            b'(' => {
                depth += 1;
                pos += 1;
            },
            b')' => {
                depth -= 1;
                pos += 1;
            },
            _ => pos += 1,
        }
    }

    if depth != 0 {
        return Err(fail(input, nom::error::ErrorKind::Tag));
    }

    Ok((&remaining[pos..], Token::LiteralString(&remaining[..pos - 1])))
}

/// Parse a hexadecimal string enclosed in angle brackets.
///
/// Only hex digits and whitespace may appear between `<` and `>`.
fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    if input.starts_with(b"<<") {
        return Err(fail(input, nom::error::ErrorKind::Tag));
    }

    delimited(
        char('<'),
        map(
            take_while(|c: u8| c.is_ascii_hexdigit() || is_whitespace(c)),
            Token::HexString,
        ),
        char('>'),
    )(input)
}

/// Decode `#xx` escape sequences in a raw name.
///
/// Bytes map one-to-one onto chars U+0000..=U+00FF. Invalid escapes are
/// kept literally.
///
/// # Examples
///
/// ```
/// # use pdfimage::lexer::decode_name_escapes;
/// assert_eq!(decode_name_escapes(b"A#20B#23C"), "A B#C");
/// assert_eq!(decode_name_escapes(b"Type"), "Type");
/// assert_eq!(decode_name_escapes(b"A#"), "A#");
/// ```
pub fn decode_name_escapes(raw: &[u8]) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] == b'#' && i + 2 < raw.len() {
            let hex = &raw[i + 1..i + 3];
            if let Some(byte) = hex_pair(hex[0], hex[1]) {
                result.push(byte as char);
                i += 3;
                continue;
            }
        }
        result.push(raw[i] as char);
        i += 1;
    }

    result
}

fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    let hi = (hi as char).to_digit(16)?;
    let lo = (lo as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}

/// Parse a name starting with /.
///
/// The name runs until whitespace or a delimiter. An empty name (`/`
/// followed by a separator) is valid.
fn parse_name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    preceded(
        char('/'),
        map(take_while(is_regular), |bytes: &[u8]| {
            Token::Name(decode_name_escapes(bytes))
        }),
    )(input)
}

/// Match a keyword only when it ends at a token boundary, so that
/// `nullable` is not read as `null` followed by garbage.
fn keyword<'a>(
    word: &'static [u8],
    tok: Token<'static>,
) -> impl Fn(&'a [u8]) -> IResult<&'a [u8], Token<'a>> {
    move |input: &'a [u8]| {
        let (rest, _) = tag(word)(input)?;
        let (rest, _) = boundary(rest)?;
        Ok((rest, tok.clone()))
    }
}

/// Parse keywords and delimiters.
///
/// `<<` is checked before `<` (hex strings) and `>>` before `>`.
fn parse_keyword(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    alt((
        keyword(b"false", Token::False),
        keyword(b"true", Token::True),
        keyword(b"null", Token::Null),
        keyword(b"obj", Token::ObjStart),
        keyword(b"endobj", Token::ObjEnd),
        keyword(b"endstream", Token::StreamEnd),
        keyword(b"stream", Token::StreamStart),
        keyword(b"R", Token::R),
        value(Token::DictStart, tag(b"<<")),
        value(Token::DictEnd, tag(b">>")),
        value(Token::ArrayStart, tag(b"[")),
        value(Token::ArrayEnd, tag(b"]")),
    ))(input)
}

/// Parse one token with no leading whitespace.
fn token_body(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    alt((
        parse_keyword,
        parse_name,
        parse_number,
        parse_literal_string,
        parse_hex_string,
    ))(input)
}

/// Parse a single token after skipping whitespace and comments.
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    token_body(skip_ws(input))
}

/// Parse tokens until the input is exhausted or a token fails.
pub fn tokens(input: &[u8]) -> IResult<&[u8], Vec<Token<'_>>> {
    many0(token)(input)
}

/// A token together with the absolute offset of its first byte.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<'a> {
    /// Byte offset of the token in the lexer's input
    pub offset: usize,
    /// The token
    pub token: Token<'a>,
}

/// Restartable cursor over a byte buffer.
///
/// Tokenization is stateless given a position: seeking to any earlier
/// offset and scanning again yields the same tokens.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Create a lexer positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Create a lexer positioned at `offset`.
    pub fn at(data: &'a [u8], offset: usize) -> Self {
        Self {
            data,
            pos: offset.min(data.len()),
        }
    }

    /// The whole input buffer.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Current byte offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move the cursor to `offset`.
    pub fn seek(&mut self, offset: usize) {
        self.pos = offset.min(self.data.len());
    }

    /// Skip whitespace and comments; returns the new position.
    pub fn skip_whitespace(&mut self) -> usize {
        let rest = skip_ws(&self.data[self.pos..]);
        self.pos = self.data.len() - rest.len();
        self.pos
    }

    /// Produce the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Result<Option<Spanned<'a>>> {
        let start = self.skip_whitespace();
        let input = &self.data[start..];
        if input.is_empty() {
            return Ok(None);
        }

        match token_body(input) {
            Ok((rest, token)) => {
                self.pos = self.data.len() - rest.len();
                Ok(Some(Spanned {
                    offset: start,
                    token,
                }))
            },
            Err(_) => Err(Error::MalformedToken {
                offset: start,
                reason: describe_failure(input),
            }),
        }
    }

    /// Look at the next token without consuming it.
    pub fn peek_token(&self) -> Result<Option<Spanned<'a>>> {
        self.clone().next_token()
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Spanned<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_token() {
            Ok(Some(tok)) => Some(Ok(tok)),
            Ok(None) => None,
            Err(e) => {
                // Fuse after the first error
                self.pos = self.data.len();
                Some(Err(e))
            },
        }
    }
}

fn describe_failure(input: &[u8]) -> String {
    match input[0] {
        b'(' => "unterminated literal string".to_string(),
        b'<' => "invalid hex string".to_string(),
        b')' => "unbalanced ')'".to_string(),
        b'>' => "unexpected '>'".to_string(),
        b'{' | b'}' => format!("unexpected '{}'", input[0] as char),
        b'0'..=b'9' | b'+' | b'-' | b'.' => "invalid number".to_string(),
        _ => {
            let word: Vec<u8> = input.iter().copied().take_while(|&c| is_regular(c)).take(16).collect();
            format!("unrecognized keyword '{}'", String::from_utf8_lossy(&word))
        },
    }
}
