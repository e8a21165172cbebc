//! Object serialization.
//!
//! Turns [`Object`] values into the byte syntax the reader accepts.
//! Dictionary entries are written in stored order so that output is
//! reproducible for a given graph.

use crate::object::{Dictionary, Object};
use std::io::{self, Write};

/// Serializer for object values.
#[derive(Debug, Clone, Default)]
pub struct ObjectSerializer {
    /// Whether to use compact formatting (minimal whitespace)
    compact: bool,
}

impl ObjectSerializer {
    /// Create a new object serializer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compact serializer (minimal whitespace).
    pub fn compact() -> Self {
        Self { compact: true }
    }

    /// Serialize an object to bytes.
    pub fn serialize(&self, obj: &Object) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_object(&mut buf, obj)?;
        Ok(buf)
    }

    /// Serialize an object to a string (for debugging).
    pub fn serialize_to_string(&self, obj: &Object) -> String {
        match self.serialize(obj) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => format!("<unserializable: {}>", e),
        }
    }

    /// Write an indirect object definition.
    ///
    /// Format: `{id} {gen} obj\n{object}\nendobj\n`
    pub fn write_indirect<W: Write>(
        &self,
        w: &mut W,
        id: u32,
        gen: u16,
        obj: &Object,
    ) -> io::Result<()> {
        writeln!(w, "{} {} obj", id, gen)?;
        self.write_object(w, obj)?;
        write!(w, "\nendobj\n")
    }

    /// Write any object value.
    pub fn write_object<W: Write>(&self, w: &mut W, obj: &Object) -> io::Result<()> {
        match obj {
            Object::Null => write!(w, "null"),
            Object::Boolean(b) => write!(w, "{}", b),
            Object::Integer(i) => write!(w, "{}", i),
            Object::Real(r) => write_real(w, *r),
            Object::String(s) => write_string(w, s),
            Object::Name(n) => write_name(w, n),
            Object::Array(items) => self.write_array(w, items),
            Object::Dictionary(dict) => self.write_dictionary(w, dict),
            Object::Stream { dict, data } => self.write_stream(w, dict, data),
            Object::Reference(r) => write!(w, "{} {} R", r.id, r.gen),
        }
    }

    fn write_array<W: Write>(&self, w: &mut W, items: &[Object]) -> io::Result<()> {
        write!(w, "[")?;
        for (i, obj) in items.iter().enumerate() {
            if i > 0 {
                write!(w, " ")?;
            }
            self.write_object(w, obj)?;
        }
        write!(w, "]")
    }

    fn write_dictionary<W: Write>(&self, w: &mut W, dict: &Dictionary) -> io::Result<()> {
        write!(w, "<<")?;
        for (key, value) in dict {
            if self.compact {
                write!(w, " ")?;
            } else {
                write!(w, "\n  ")?;
            }
            write_name(w, key)?;
            write!(w, " ")?;
            self.write_object(w, value)?;
        }
        if !dict.is_empty() {
            if self.compact {
                write!(w, " ")?;
            } else {
                writeln!(w)?;
            }
        }
        write!(w, ">>")
    }

    /// `/Length` always reflects the payload actually written; a stale or
    /// indirect value in `dict` is replaced.
    fn write_stream<W: Write>(&self, w: &mut W, dict: &Dictionary, data: &[u8]) -> io::Result<()> {
        let mut dict = dict.clone();
        dict.insert("Length".to_string(), Object::Integer(data.len() as i64));

        self.write_dictionary(w, &dict)?;
        write!(w, "\nstream\n")?;
        w.write_all(data)?;
        write!(w, "\nendstream")
    }
}

/// Reals are always written with a decimal point so they read back as reals.
fn write_real<W: Write>(w: &mut W, value: f64) -> io::Result<()> {
    if !value.is_finite() {
        log::warn!("Writing non-finite real {} as 0.0", value);
        return write!(w, "0.0");
    }
    // f64 Display never uses exponent notation
    let formatted = value.to_string();
    if formatted.contains('.') {
        write!(w, "{}", formatted)
    } else {
        write!(w, "{}.0", formatted)
    }
}

/// Literal syntax for printable data, hex syntax otherwise.
fn write_string<W: Write>(w: &mut W, data: &[u8]) -> io::Result<()> {
    let is_printable = data
        .iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..=0x7E).contains(&b));

    if is_printable {
        write!(w, "(")?;
        for &byte in data {
            match byte {
                b'(' => write!(w, "\\(")?,
                b')' => write!(w, "\\)")?,
                b'\\' => write!(w, "\\\\")?,
                b'\n' => write!(w, "\\n")?,
                b'\r' => write!(w, "\\r")?,
                b'\t' => write!(w, "\\t")?,
                _ => w.write_all(&[byte])?,
            }
        }
        write!(w, ")")
    } else {
        write!(w, "<")?;
        for byte in data {
            write!(w, "{:02X}", byte)?;
        }
        write!(w, ">")
    }
}

/// Names start with `/`; anything outside the regular printable range is
/// written as `#xx`.
///
/// Each char in U+0000..=U+00FF stands for one byte, mirroring how the
/// reader decodes names. Wider chars have no byte and are an
/// `InvalidInput` error.
fn write_name<W: Write>(w: &mut W, name: &str) -> io::Result<()> {
    let bytes = name
        .chars()
        .map(u8::try_from)
        .collect::<std::result::Result<Vec<u8>, _>>()
        .map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("name {:?} has characters above U+00FF", name),
            )
        })?;

    write!(w, "/")?;
    for byte in bytes {
        write_name_byte(w, byte)?;
    }
    Ok(())
}

fn write_name_byte<W: Write>(w: &mut W, byte: u8) -> io::Result<()> {
    if is_plain_name_byte(byte) {
        w.write_all(&[byte])
    } else {
        write!(w, "#{:02X}", byte)
    }
}

fn is_plain_name_byte(byte: u8) -> bool {
    (0x21..=0x7E).contains(&byte) && !b"()<>[]{}/%#".contains(&byte)
}
