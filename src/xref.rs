//! Cross-reference table reader.
//!
//! The xref table maps object numbers to byte offsets in the file,
//! enabling random access to objects. Only classic tables are read:
//! cross-reference streams, `/Prev` chains and encryption are reported as
//! [`Error::UnsupportedFeature`].

use crate::error::{Error, Result};
use crate::lexer::{is_regular, skip_ws, Lexer, Token};
use crate::object::{Dictionary, Object};
use crate::parser::{parse_object_header, parse_object_with};
use crate::parser_config::ParserOptions;
use std::collections::BTreeMap;

/// Cross-reference table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XRefEntry {
    /// Byte offset (in-use) or next free object number (free)
    pub offset: u64,
    /// Generation number
    pub generation: u16,
    /// Whether the object is in use
    pub in_use: bool,
}

impl XRefEntry {
    /// Create a new cross-reference entry.
    pub fn new(offset: u64, generation: u16, in_use: bool) -> Self {
        Self {
            offset,
            generation,
            in_use,
        }
    }

    /// Create an in-use entry.
    pub fn uncompressed(offset: u64, generation: u16) -> Self {
        Self::new(offset, generation, true)
    }

    /// Create a free entry.
    pub fn free(next_free: u64, generation: u16) -> Self {
        Self::new(next_free, generation, false)
    }
}

/// Cross-reference table that maps object numbers to their locations.
#[derive(Debug, Clone, Default)]
pub struct CrossRefTable {
    entries: BTreeMap<u32, XRefEntry>,
    trailer: Option<Dictionary>,
}

impl CrossRefTable {
    /// Create a new empty cross-reference table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the trailer dictionary.
    pub fn set_trailer(&mut self, trailer: Dictionary) {
        self.trailer = Some(trailer);
    }

    /// Get the trailer dictionary if present.
    pub fn trailer(&self) -> Option<&Dictionary> {
        self.trailer.as_ref()
    }

    /// Add an entry; a later entry for the same number replaces the earlier one.
    pub fn add_entry(&mut self, object_number: u32, entry: XRefEntry) {
        self.entries.insert(object_number, entry);
    }

    /// Get an entry by object number.
    pub fn get(&self, object_number: u32) -> Option<&XRefEntry> {
        self.entries.get(&object_number)
    }

    /// Check if an object number has any entry, free or in use.
    pub fn contains(&self, object_number: u32) -> bool {
        self.entries.contains_key(&object_number)
    }

    /// Byte offset of an in-use object. Free entries yield `None`.
    pub fn offset_of(&self, object_number: u32) -> Option<u64> {
        self.entries
            .get(&object_number)
            .filter(|e| e.in_use)
            .map(|e| e.offset)
    }

    /// All object numbers in the table, ascending.
    pub fn all_object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    /// In-use object numbers, ascending.
    pub fn in_use_object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries
            .iter()
            .filter(|(_, e)| e.in_use)
            .map(|(&n, _)| n)
    }

    /// Get the number of entries in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Check the `%PDF-M.m` header and return `(major, minor)`.
pub fn check_header(data: &[u8]) -> Result<(u8, u8)> {
    let found = || {
        let end = data.len().min(8);
        String::from_utf8_lossy(&data[..end]).into_owned()
    };

    match data {
        [b'%', b'P', b'D', b'F', b'-', major @ b'0'..=b'9', b'.', minor @ b'0'..=b'9', ..] => {
            Ok((major - b'0', minor - b'0'))
        },
        _ => Err(Error::InvalidHeader(found())),
    }
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Find the byte offset of the xref table.
///
/// Searches the final `tail_window` bytes for the last `startxref` keyword
/// and reads the offset that follows it.
///
/// # Errors
///
/// `MalformedXref` if the keyword is missing, the offset is not a
/// non-negative integer, or it lies outside the input.
pub fn find_xref_offset(data: &[u8], tail_window: usize) -> Result<usize> {
    let tail_start = data.len().saturating_sub(tail_window);
    let tail = &data[tail_start..];

    if rfind(tail, b"%%EOF").is_none() {
        log::warn!("No %%EOF marker in the last {} bytes", tail.len());
    }

    let keyword = rfind(tail, b"startxref").ok_or_else(|| {
        Error::MalformedXref(format!("'startxref' not found in the last {} bytes", tail.len()))
    })?;

    let after = tail_start + keyword + b"startxref".len();
    let offset = match Lexer::at(data, after).next_token() {
        Ok(Some(tok)) => match tok.token {
            Token::Integer(n) => usize::try_from(n).ok(),
            _ => None,
        },
        _ => None,
    }
    .ok_or_else(|| Error::MalformedXref(format!("invalid offset after 'startxref' at byte {}", after)))?;

    if offset >= data.len() {
        return Err(Error::MalformedXref(format!(
            "startxref offset {} is beyond the end of the input ({} bytes)",
            offset,
            data.len()
        )));
    }

    log::debug!("startxref points at byte {}", offset);
    Ok(offset)
}

/// Byte cursor for the fixed-width table syntax.
struct TableCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> TableCursor<'a> {
    fn skip_ws(&mut self) {
        let rest = skip_ws(&self.data[self.pos..]);
        self.pos = self.data.len() - rest.len();
    }

    fn at_keyword(&self, word: &[u8]) -> bool {
        let rest = &self.data[self.pos..];
        rest.starts_with(word) && rest.get(word.len()).map_or(true, |&c| !is_regular(c))
    }

    fn skip_spaces(&mut self) {
        while matches!(self.data.get(self.pos), Some(b' ')) {
            self.pos += 1;
        }
    }

    /// Exactly `width` ASCII digits, or any run of digits when `width` is 0.
    fn digits(&mut self, width: usize) -> Option<u64> {
        let rest = &self.data[self.pos..];
        let len = rest.iter().take_while(|c| c.is_ascii_digit()).count();
        if len == 0 || (width > 0 && len != width) {
            return None;
        }
        let value = rest[..len]
            .iter()
            .try_fold(0u64, |acc, &d| acc.checked_mul(10)?.checked_add((d - b'0') as u64))?;
        self.pos += len;
        Some(value)
    }

    fn error(&self, what: &str) -> Error {
        Error::MalformedXref(format!("{} at byte {}", what, self.pos))
    }
}

/// Parse one `offset gen n|f` record.
fn read_entry(cursor: &mut TableCursor<'_>) -> Result<XRefEntry> {
    cursor.skip_ws();
    let offset = cursor
        .digits(10)
        .ok_or_else(|| cursor.error("expected 10-digit entry offset"))?;
    if cursor.data.get(cursor.pos) != Some(&b' ') {
        return Err(cursor.error("expected space after entry offset"));
    }
    cursor.pos += 1;

    let generation = cursor
        .digits(5)
        .ok_or_else(|| cursor.error("expected 5-digit generation"))?;
    let generation =
        u16::try_from(generation).map_err(|_| cursor.error("generation number out of range"))?;
    if cursor.data.get(cursor.pos) != Some(&b' ') {
        return Err(cursor.error("expected space after generation"));
    }
    cursor.pos += 1;

    let in_use = match cursor.data.get(cursor.pos) {
        Some(b'n') => true,
        Some(b'f') => false,
        _ => return Err(cursor.error("expected entry type 'n' or 'f'")),
    };
    cursor.pos += 1;
    if cursor.data.get(cursor.pos).is_some_and(|&c| is_regular(c)) {
        return Err(cursor.error("unexpected bytes after entry type"));
    }

    Ok(XRefEntry::new(offset, generation, in_use))
}

/// Parse the classic table and trailer at `offset`.
///
/// Sub-sections are merged in the order read; a later entry for the same
/// object number wins. The trailer is checked for `/Size` and `/Root`.
pub fn parse_xref(data: &[u8], offset: usize, options: &ParserOptions) -> Result<CrossRefTable> {
    let mut cursor = TableCursor { data, pos: offset };
    cursor.skip_ws();

    if !cursor.at_keyword(b"xref") {
        if parse_object_header(data, offset).is_ok() {
            return Err(Error::UnsupportedFeature(format!(
                "cross-reference stream at byte {}",
                offset
            )));
        }
        return Err(cursor.error("expected 'xref' keyword"));
    }
    cursor.pos += b"xref".len();
    log::debug!("Reading classic xref table at byte {}", offset);

    let mut table = CrossRefTable::new();
    loop {
        cursor.skip_ws();
        if cursor.at_keyword(b"trailer") {
            cursor.pos += b"trailer".len();
            break;
        }
        if cursor.pos >= data.len() {
            return Err(cursor.error("missing 'trailer' keyword"));
        }

        let start = cursor
            .digits(0)
            .ok_or_else(|| cursor.error("expected sub-section start"))?;
        cursor.skip_spaces();
        let count = cursor
            .digits(0)
            .ok_or_else(|| cursor.error("expected sub-section count"))?;
        log::debug!("xref sub-section start={} count={}", start, count);

        for i in 0..count {
            let entry = read_entry(&mut cursor)?;
            let number = start
                .checked_add(i)
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| cursor.error("object number out of range"))?;
            table.add_entry(number, entry);
        }
    }

    let trailer = match parse_object_with(data, cursor.pos, options)? {
        (Object::Dictionary(dict), _) => dict,
        (other, _) => {
            return Err(Error::MalformedXref(format!(
                "trailer is a {} instead of a dictionary",
                other.type_name()
            )))
        },
    };
    check_trailer(&trailer)?;
    table.set_trailer(trailer);

    log::debug!("xref table has {} entries", table.len());
    Ok(table)
}

fn check_trailer(trailer: &Dictionary) -> Result<()> {
    if trailer.contains_key("Encrypt") {
        return Err(Error::UnsupportedFeature("encrypted document".to_string()));
    }
    if trailer.contains_key("Prev") {
        return Err(Error::UnsupportedFeature(
            "incremental update (/Prev trailer chain)".to_string(),
        ));
    }
    if trailer.contains_key("XRefStm") {
        log::warn!("Ignoring /XRefStm in hybrid trailer; using the classic table only");
    }
    if trailer.get("Size").and_then(Object::as_integer).is_none() {
        return Err(Error::MalformedXref("trailer has no integer /Size".to_string()));
    }
    if trailer.get("Root").and_then(Object::as_reference).is_none() {
        return Err(Error::MalformedXref("trailer has no /Root reference".to_string()));
    }
    Ok(())
}

/// Check that every in-use entry points at its own `id gen obj` header.
pub fn verify_entries(data: &[u8], table: &CrossRefTable) -> Result<()> {
    for (&number, entry) in table.entries.iter().filter(|(_, e)| e.in_use) {
        let mismatch = || {
            Error::MalformedXref(format!(
                "entry for object {} points at byte {}, which does not hold '{} {} obj'",
                number, entry.offset, number, entry.generation
            ))
        };

        let offset = usize::try_from(entry.offset).map_err(|_| mismatch())?;
        if offset >= data.len() {
            return Err(mismatch());
        }
        let (found, _) = parse_object_header(data, offset).map_err(|_| mismatch())?;
        if found.id != number || found.gen != entry.generation {
            return Err(mismatch());
        }
    }
    Ok(())
}

/// Locate, parse and verify the cross-reference table of a document.
pub fn read_xref(data: &[u8], options: &ParserOptions) -> Result<CrossRefTable> {
    let offset = find_xref_offset(data, options.tail_window)?;
    let table = parse_xref(data, offset, options)?;
    verify_entries(data, &table)?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Build a document whose table covers `sections`; ids with a body
    /// get in-use entries, all others free entries.
    fn document(objects: &[(u32, &str)], sections: &[(u32, u32)], trailer: &str) -> Vec<u8> {
        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = HashMap::new();
        for (id, body) in objects {
            offsets.insert(*id, out.len());
            out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", id, body).as_bytes());
        }
        let xref = out.len();
        out.extend_from_slice(b"xref\n");
        for &(start, count) in sections {
            out.extend_from_slice(format!("{} {}\n", start, count).as_bytes());
            for id in start..start + count {
                match offsets.get(&id) {
                    Some(off) => out.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes()),
                    None => out.extend_from_slice(b"0000000000 65535 f \n"),
                }
            }
        }
        out.extend_from_slice(format!("trailer\n{}\nstartxref\n{}\n%%EOF\n", trailer, xref).as_bytes());
        out
    }

    fn simple() -> Vec<u8> {
        document(
            &[(1, "<< /Type /Catalog >>"), (2, "42")],
            &[(0, 3)],
            "<< /Size 3 /Root 1 0 R >>",
        )
    }

    // ========================================================================
    // Table Tests
    // ========================================================================

    #[test]
    fn test_xref_entry_creation() {
        let entry = XRefEntry::new(1234, 0, true);
        assert_eq!(entry.offset, 1234);
        assert_eq!(entry.generation, 0);
        assert!(entry.in_use);
        assert!(!XRefEntry::free(0, 65535).in_use);
    }

    #[test]
    fn test_cross_ref_table_add_and_get() {
        let mut table = CrossRefTable::new();
        assert!(table.is_empty());
        table.add_entry(5, XRefEntry::uncompressed(100, 0));
        table.add_entry(6, XRefEntry::free(0, 1));
        assert_eq!(table.len(), 2);
        assert!(table.contains(6));
        assert_eq!(table.offset_of(5), Some(100));
        assert_eq!(table.offset_of(6), None);
        assert_eq!(table.in_use_object_numbers().collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn test_later_entry_wins() {
        let mut table = CrossRefTable::new();
        table.add_entry(3, XRefEntry::free(0, 0));
        table.add_entry(3, XRefEntry::uncompressed(77, 0));
        assert_eq!(table.offset_of(3), Some(77));
    }

    // ========================================================================
    // Header and startxref
    // ========================================================================

    #[test]
    fn test_check_header() {
        assert_eq!(check_header(b"%PDF-1.7\n").unwrap(), (1, 7));
        assert!(matches!(check_header(b"GIF89a"), Err(Error::InvalidHeader(_))));
        assert!(matches!(check_header(b"%PDF-"), Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn test_find_xref_offset_valid() {
        let data = simple();
        let offset = find_xref_offset(&data, 1024).unwrap();
        assert!(data[offset..].starts_with(b"xref"));
    }

    #[test]
    fn test_find_xref_offset_no_startxref() {
        let err = find_xref_offset(b"%PDF-1.4\n%%EOF\n", 1024).unwrap_err();
        assert!(matches!(err, Error::MalformedXref(_)));
    }

    #[test]
    fn test_find_xref_offset_outside_window() {
        let mut data = simple();
        data.extend(std::iter::repeat(b' ').take(2000));
        assert!(find_xref_offset(&data, 1024).is_err());
        assert!(find_xref_offset(&data, 4096).is_ok());
    }

    #[test]
    fn test_missing_eof_marker_is_tolerated() {
        let mut data = simple();
        let len = data.len();
        data.truncate(len - b"%%EOF\n".len());
        assert!(read_xref(&data, &ParserOptions::default()).is_ok());
    }

    #[test]
    fn test_startxref_beyond_input() {
        let err = find_xref_offset(b"startxref\n999999\n%%EOF", 1024).unwrap_err();
        assert!(matches!(err, Error::MalformedXref(_)));
    }

    // ========================================================================
    // Table Parsing
    // ========================================================================

    #[test]
    fn test_parse_xref_single_subsection() {
        let data = simple();
        let table = read_xref(&data, &ParserOptions::default()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.offset_of(0), None);
        assert_eq!(table.offset_of(1), Some(9));
        assert!(table.offset_of(2).is_some());
        assert_eq!(
            table.trailer().and_then(|t| t.get("Size")),
            Some(&Object::Integer(3))
        );
    }

    #[test]
    fn test_parse_xref_multiple_subsections() {
        let data = document(
            &[(1, "1"), (2, "2"), (3, "3"), (10, "10"), (11, "11")],
            &[(1, 3), (10, 2)],
            "<< /Size 12 /Root 1 0 R >>",
        );
        let table = read_xref(&data, &ParserOptions::default()).unwrap();
        let ids: Vec<u32> = table.in_use_object_numbers().collect();
        assert_eq!(ids, vec![1, 2, 3, 10, 11]);
        assert_eq!(table.offset_of(4), None);
        assert_eq!(table.offset_of(9), None);
        assert_eq!(table.offset_of(12), None);
    }

    #[test]
    fn test_crlf_entries() {
        let text = String::from_utf8(simple())
            .unwrap()
            .replace(" n \n", " n\r\n")
            .replace(" f \n", " f\r\n");
        let table = read_xref(text.as_bytes(), &ParserOptions::default()).unwrap();
        assert_eq!(table.in_use_object_numbers().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_malformed_entry() {
        let data = simple();
        let text = String::from_utf8(data).unwrap().replacen("00000 n", "0000 n", 1);
        let err = read_xref(text.as_bytes(), &ParserOptions::default()).unwrap_err();
        assert!(matches!(err, Error::MalformedXref(_)));
    }

    #[test]
    fn test_offset_not_matching_header() {
        let data = simple();
        let text = String::from_utf8(data).unwrap().replacen("0000000009 00000 n", "0000000010 00000 n", 1);
        let err = read_xref(text.as_bytes(), &ParserOptions::default()).unwrap_err();
        assert!(matches!(err, Error::MalformedXref(msg) if msg.contains("object 1")));
    }

    #[test]
    fn test_missing_root() {
        let data = document(&[(1, "<< >>")], &[(0, 2)], "<< /Size 2 >>");
        let err = read_xref(&data, &ParserOptions::default()).unwrap_err();
        assert!(matches!(err, Error::MalformedXref(_)));
    }

    // ========================================================================
    // Unsupported Variants
    // ========================================================================

    #[test]
    fn test_prev_is_unsupported() {
        let data = document(&[(1, "<< >>")], &[(0, 2)], "<< /Size 2 /Root 1 0 R /Prev 9 >>");
        let err = read_xref(&data, &ParserOptions::default()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFeature(_)));
    }

    #[test]
    fn test_encrypt_is_unsupported() {
        let data = document(
            &[(1, "<< >>"), (2, "<< /Filter /Standard >>")],
            &[(0, 3)],
            "<< /Size 3 /Root 1 0 R /Encrypt 2 0 R >>",
        );
        let err = read_xref(&data, &ParserOptions::default()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFeature(msg) if msg.contains("encrypted")));
    }

    #[test]
    fn test_xrefstm_is_ignored() {
        let data = document(&[(1, "<< >>")], &[(0, 2)], "<< /Size 2 /Root 1 0 R /XRefStm 500 >>");
        assert!(read_xref(&data, &ParserOptions::default()).is_ok());
    }

    #[test]
    fn test_xref_stream_is_unsupported() {
        let mut data = b"%PDF-1.5\n".to_vec();
        let offset = data.len();
        data.extend_from_slice(b"7 0 obj\n<< /Type /XRef /Size 8 /Length 0 >>\nstream\n\nendstream\nendobj\n");
        data.extend_from_slice(format!("startxref\n{}\n%%EOF\n", offset).as_bytes());
        let err = read_xref(&data, &ParserOptions::default()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFeature(msg) if msg.contains("cross-reference stream")));
    }
}
