//! Error types for the library.
//!
//! Every failure carries enough context (byte offsets, object ids) to be
//! diagnosed without re-scanning the input.

use crate::object::ObjectRef;

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while reading, composing or writing documents.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A byte sequence matched no token production
    #[error("Malformed token at byte {offset}: {reason}")]
    MalformedToken {
        /// Byte offset where the token starts
        offset: usize,
        /// What was wrong with it
        reason: String,
    },

    /// Tokens did not form a valid object
    #[error("Malformed object at byte {offset}: {reason}")]
    MalformedObject {
        /// Byte offset where the problem was detected
        offset: usize,
        /// Reason for the parse failure
        reason: String,
    },

    /// Invalid cross-reference table or trailer
    #[error("Malformed cross-reference table: {0}")]
    MalformedXref(String),

    /// Declared stream length runs past the end of the input
    #[error("Truncated stream at byte {offset}: declared {declared} bytes, {available} available")]
    TruncatedStream {
        /// Byte offset of the first payload byte
        offset: usize,
        /// Length declared by the stream dictionary
        declared: usize,
        /// Bytes actually remaining in the input
        available: usize,
    },

    /// Object graph contains a cycle on the active resolution path
    #[error("Cyclic reference detected: object {0}")]
    CyclicReference(ObjectRef),

    /// Valid document using a variant this reader does not handle
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// Overlay geometry does not match its payload
    #[error("Geometry mismatch: {0}")]
    GeometryMismatch(String),

    /// Caller-supplied configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Invalid document header (expected '%PDF-')
    #[error("Invalid PDF header: expected '%PDF-M.m', found '{0}'")]
    InvalidHeader(String),

    /// Referenced object not present in the cross-reference table
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Resolution chain deeper than the configured limit
    #[error("Recursion depth limit exceeded (max: {0})")]
    RecursionLimitExceeded(u32),

    /// Output graph references an object it does not contain
    #[error("Dangling reference in output graph: {0}")]
    DanglingReference(ObjectRef),

    /// Output graph object that would not read back as written
    #[error("Cannot write object {handle} of the output graph: {reason}")]
    UnwritableObject {
        /// Graph handle of the offending object
        handle: ObjectRef,
        /// What is wrong with it
        reason: String,
    },

    /// A page part payload could not be interpreted
    #[error("Invalid page part: {0}")]
    InvalidPart(String),

    /// Pixel codec failure
    #[error("Image error: {0}")]
    Image(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Byte offset attached to a parse-layer error, if any.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Error::MalformedToken { offset, .. }
            | Error::MalformedObject { offset, .. }
            | Error::TruncatedStream { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}
