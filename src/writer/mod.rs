//! Writing module for generating files from an object graph.
//!
//! ## Architecture
//!
//! ```text
//! PagePart[]
//!     ↓
//! [PageComposer] (parts → object graph)
//!     ↓
//! [ObjectGraph] (caller handles, unnumbered)
//!     ↓
//! [PdfWriter] (numbering, offsets, xref, trailer)
//!     ↓
//! [ObjectSerializer] (object syntax)
//!     ↓
//! bytes
//! ```
//!
//! ## Example
//!
//! ```
//! use pdfimage::object::{Dictionary, Object};
//! use pdfimage::writer::{ObjectGraph, PdfWriter};
//!
//! let mut graph = ObjectGraph::new();
//! let mut catalog = Dictionary::new();
//! catalog.insert("Type".to_string(), Object::name("Catalog"));
//! let root = graph.add(Object::Dictionary(catalog));
//!
//! let bytes = PdfWriter::new().write(&graph, root, None).unwrap();
//! assert!(bytes.starts_with(b"%PDF-1.7"));
//! ```
//!
//! [PageComposer]: crate::compose::PageComposer

mod object_serializer;
mod pdf_writer;

pub use object_serializer::ObjectSerializer;
pub use pdf_writer::{format_date, Numbering, ObjectGraph, PdfWriter, PdfWriterConfig};
