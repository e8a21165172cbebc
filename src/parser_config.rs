//! Parser limits.
//!
//! Every limit is a guard against hostile or corrupt input rather than a
//! format rule; the defaults accept any document produced by a sane writer.
//!
//! # Example
//!
//! ```
//! use pdfimage::parser_config::ParserOptions;
//!
//! let options = ParserOptions::default()
//!     .with_max_nesting(32)
//!     .with_tail_window(4096);
//! assert_eq!(options.max_nesting, 32);
//! ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserOptions {
    /// Maximum array/dictionary nesting depth.
    ///
    /// Deeper input fails with `MalformedObject` instead of overflowing
    /// the stack.
    pub max_nesting: usize,

    /// Maximum length of a chain of indirect references followed by one
    /// full resolution (`RecursionLimitExceeded` beyond it).
    pub max_resolution_depth: u32,

    /// Number of trailing bytes searched for `startxref`.
    pub tail_window: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            max_nesting: 100,
            max_resolution_depth: 256,
            tail_window: 1024,
        }
    }
}

impl ParserOptions {
    /// Create options with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum nesting depth.
    pub fn with_max_nesting(mut self, depth: usize) -> Self {
        self.max_nesting = depth;
        self
    }

    /// Set the maximum resolution depth.
    pub fn with_max_resolution_depth(mut self, depth: u32) -> Self {
        self.max_resolution_depth = depth;
        self
    }

    /// Set the size of the trailing window searched for `startxref`.
    pub fn with_tail_window(mut self, bytes: usize) -> Self {
        self.tail_window = bytes;
        self
    }
}
