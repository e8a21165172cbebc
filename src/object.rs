//! Object value types shared by the reader and the writer.

use bytes::Bytes;
use indexmap::IndexMap;

/// Dictionary keyed by name.
///
/// Insertion order is preserved so that serialization is deterministic;
/// equality ignores order.
pub type Dictionary = IndexMap<String, Object>;

/// Object value representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real (floating-point) value
    Real(f64),
    /// String (byte array). Literal and hex syntax decode to the same value.
    String(Vec<u8>),
    /// Name (without the leading `/`).
    ///
    /// Each source byte maps to one char in U+0000..=U+00FF so that names
    /// survive a read/write cycle byte for byte.
    Name(String),
    /// Array of objects
    Array(Vec<Object>),
    /// Dictionary (key-value pairs)
    Dictionary(Dictionary),
    /// Stream (dictionary + raw, still-encoded payload)
    Stream {
        /// Stream dictionary
        dict: Dictionary,
        /// Stream data exactly as stored
        data: Bytes,
    },
    /// Indirect object reference
    Reference(ObjectRef),
}

/// Reference to an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

impl From<ObjectRef> for Object {
    fn from(r: ObjectRef) -> Self {
        Object::Reference(r)
    }
}

impl From<Dictionary> for Object {
    fn from(d: Dictionary) -> Self {
        Object::Dictionary(d)
    }
}

impl Object {
    /// Get the type name of this object (without data).
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(_) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream { .. } => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    /// Build a name object.
    pub fn name(s: &str) -> Object {
        Object::Name(s.to_string())
    }

    /// Build a stream object.
    pub fn stream(dict: Dictionary, data: impl Into<Bytes>) -> Object {
        Object::Stream {
            dict,
            data: data.into(),
        }
    }

    /// Try to cast to integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to cast to real.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Either numeric kind as `f64`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(n) => Some(n),
            _ => None,
        }
    }

    /// Try to cast to string bytes.
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to cast to dictionary. Streams expose their stream dictionary.
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Try to cast to reference.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Stream payload, if this is a stream.
    pub fn stream_data(&self) -> Option<&Bytes> {
        match self {
            Object::Stream { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Check if object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// Look up a key when this is a dictionary or stream.
    pub fn get(&self, key: &str) -> Option<&Object> {
        self.as_dict().and_then(|d| d.get(key))
    }

    /// Check the `/Type` entry of a dictionary or stream.
    pub fn has_type(&self, type_name: &str) -> bool {
        self.get("Type").and_then(Object::as_name) == Some(type_name)
    }

    /// Visit every reference directly or transitively contained in this value,
    /// in stored order. References are not followed.
    pub fn for_each_reference(&self, f: &mut impl FnMut(ObjectRef)) {
        match self {
            Object::Reference(r) => f(*r),
            Object::Array(items) => items.iter().for_each(|o| o.for_each_reference(f)),
            Object::Dictionary(dict) | Object::Stream { dict, .. } => {
                dict.values().for_each(|o| o.for_each_reference(f))
            },
            _ => {},
        }
    }

    /// Return a copy with every reference rewritten by `map`.
    pub fn map_references(&self, map: &mut impl FnMut(ObjectRef) -> ObjectRef) -> Object {
        match self {
            Object::Reference(r) => Object::Reference(map(*r)),
            Object::Array(items) => {
                Object::Array(items.iter().map(|o| o.map_references(map)).collect())
            },
            Object::Dictionary(dict) => Object::Dictionary(map_dict(dict, map)),
            Object::Stream { dict, data } => Object::Stream {
                dict: map_dict(dict, map),
                data: data.clone(),
            },
            other => other.clone(),
        }
    }
}

fn map_dict(dict: &Dictionary, map: &mut impl FnMut(ObjectRef) -> ObjectRef) -> Dictionary {
    dict.iter()
        .map(|(k, v)| (k.clone(), v.map_references(map)))
        .collect()
}
