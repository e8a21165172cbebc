//! Page composition.
//!
//! Builds an output object graph from page parts: each page is one
//! bilevel (JBIG2) image filling the page, with color or grayscale overlays
//! drawn on top of it.
//!
//! ## Architecture
//!
//! ```text
//! PartSource (memory / zip archive)
//!     ↓
//! PagePart[] (BilevelRegion + Overlays)
//!     ↓
//! [PageComposer] (geometry, XObjects, content streams)
//!     ↓
//! ComposedDocument (ObjectGraph + root)
//!     ↓
//! [PdfWriter]
//! ```
//!
//! ## Example
//!
//! ```
//! use pdfimage::compose::{BilevelRegion, PageComposer, PagePart};
//! use pdfimage::config::ComposerConfig;
//!
//! let parts = vec![PagePart::new("p0", BilevelRegion::new(1700, 2200, vec![0u8; 4]))];
//! let composer = PageComposer::new(ComposerConfig::default()).unwrap();
//! let bytes = composer.compose(&parts, None).unwrap().to_bytes().unwrap();
//! assert!(bytes.starts_with(b"%PDF-"));
//! ```

pub mod geometry;
pub mod jbig2;
pub mod part;
pub mod placement;
pub mod source;

pub use geometry::{check_aspect, PageGeometry, Placement, Rect};
pub use jbig2::{bilevel_xobject, PageInfo};
pub use part::{BilevelRegion, Overlay, OverlayOrigin, PagePart};
pub use placement::image_placements;
#[cfg(feature = "archive")]
pub use source::ZipPartSource;
pub use source::{MemoryParts, PartSource};

use crate::config::{ComposerConfig, OVERSAMPLE_FACTORS};
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::writer::{ObjectGraph, PdfWriter};
use bytes::Bytes;
use std::fmt::Write as _;
use std::path::Path;

/// Procedure sets advertised by every page.
const PROC_SET: [&str; 4] = ["PDF", "ImageB", "ImageC", "ImageI"];

/// Integral values print without a fraction, others with at most four
/// decimals.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let formatted = format!("{:.4}", value);
        formatted.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn number_object(value: f64) -> Object {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        Object::Integer(value as i64)
    } else {
        Object::Real(value)
    }
}

fn dict(entries: Vec<(&str, Object)>) -> Object {
    Object::Dictionary(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

/// Object graph of a composed document, ready to be written.
#[derive(Debug, Clone)]
pub struct ComposedDocument {
    graph: ObjectGraph,
    root: ObjectRef,
    info: Option<ObjectRef>,
    pages: Vec<ObjectRef>,
}

impl ComposedDocument {
    /// The object graph.
    pub fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    /// Handle of the catalog.
    pub fn root(&self) -> ObjectRef {
        self.root
    }

    /// Handle of the info dictionary, when a title was configured.
    pub fn info(&self) -> Option<ObjectRef> {
        self.info
    }

    /// Handles of the page objects in page order.
    pub fn pages(&self) -> &[ObjectRef] {
        &self.pages
    }

    /// Serialize with `writer`.
    pub fn write(&self, writer: &PdfWriter) -> Result<Vec<u8>> {
        writer.write(&self.graph, self.root, self.info)
    }

    /// Serialize with default writer settings.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.write(&PdfWriter::new())
    }

    /// Serialize to a file with default writer settings.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        PdfWriter::new().save(path, &self.graph, self.root, self.info)
    }
}

/// Turns page parts into a document.
#[derive(Debug, Clone)]
pub struct PageComposer {
    config: ComposerConfig,
}

impl PageComposer {
    /// Create a composer; the configuration is validated here.
    pub fn new(config: ComposerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration in use.
    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Geometry of the page built from `region`.
    pub fn geometry(&self, region: &BilevelRegion) -> Result<PageGeometry> {
        let oversample = region.oversample.unwrap_or(self.config.oversample);
        if !OVERSAMPLE_FACTORS.contains(&oversample) {
            return Err(Error::InvalidConfiguration(format!(
                "oversample factor {} is not one of {:?}",
                oversample, OVERSAMPLE_FACTORS
            )));
        }
        if region.width == 0 || region.height == 0 {
            return Err(Error::InvalidPart(format!(
                "bilevel region is {}x{} pixels",
                region.width, region.height
            )));
        }
        Ok(PageGeometry::new(
            region.width,
            region.height,
            oversample,
            self.config.units_per_pixel(),
        ))
    }

    /// Read every part from `source` and compose them.
    pub fn compose_source(&self, source: &dyn PartSource) -> Result<ComposedDocument> {
        let parts = (0..source.page_count())
            .map(|i| source.part(i))
            .collect::<Result<Vec<_>>>()?;
        self.compose(&parts, source.globals())
    }

    /// Compose `parts` into one page each, in the given order.
    ///
    /// `globals` is the JBIG2 symbol dictionary shared by all regions.
    ///
    /// # Errors
    ///
    /// - `InvalidConfiguration` for an empty part list or an unsupported
    ///   oversampling factor
    /// - `GeometryMismatch` when an overlay image does not fit its rectangle
    pub fn compose(&self, parts: &[PagePart], globals: Option<Bytes>) -> Result<ComposedDocument> {
        if parts.is_empty() {
            return Err(Error::InvalidConfiguration("no page parts to compose".to_string()));
        }

        let mut graph = ObjectGraph::new();
        let catalog = graph.reserve();
        let pages_node = graph.reserve();

        let proc_set = graph.add(Object::Array(PROC_SET.iter().map(|n| Object::name(n)).collect()));
        let globals = globals.map(|data| graph.add(Object::stream(Dictionary::new(), data)));

        let mut pages = Vec::with_capacity(parts.len());
        for part in parts {
            let page = self.compose_page(&mut graph, part, pages_node, proc_set, globals)?;
            pages.push(page);
        }

        graph.set(
            pages_node,
            dict(vec![
                ("Type", Object::name("Pages")),
                ("Kids", Object::Array(pages.iter().map(|&p| p.into()).collect())),
                ("Count", Object::Integer(pages.len() as i64)),
            ]),
        )?;
        graph.set(
            catalog,
            dict(vec![("Type", Object::name("Catalog")), ("Pages", pages_node.into())]),
        )?;

        let info = self.config.title.as_ref().map(|title| {
            graph.add(dict(vec![("Title", Object::String(title.as_bytes().to_vec()))]))
        });

        log::info!("Composed {} pages", pages.len());
        Ok(ComposedDocument {
            graph,
            root: catalog,
            info,
            pages,
        })
    }

    fn compose_page(
        &self,
        graph: &mut ObjectGraph,
        part: &PagePart,
        parent: ObjectRef,
        proc_set: ObjectRef,
        globals: Option<ObjectRef>,
    ) -> Result<ObjectRef> {
        let geometry = self.geometry(&part.region)?;
        let (width, height) = geometry.page_size();

        let mut xobjects = Dictionary::new();
        let mut content = String::new();

        let background = graph.add(bilevel_xobject(&part.region, globals));
        xobjects.insert("Im0".to_string(), background.into());
        // Writing into a String cannot fail
        let _ = writeln!(
            content,
            "q {} 0 0 {} 0 0 cm /Im0 Do Q",
            format_number(width),
            format_number(height)
        );

        for overlay in &part.overlays {
            if overlay.origin == OverlayOrigin::Detected && !self.config.auto_pictures {
                log::debug!(
                    "Page {}: skipping detected picture at {:?}",
                    part.id,
                    overlay.rect
                );
                continue;
            }
            if !geometry.contains(&overlay.rect) {
                log::warn!(
                    "Page {}: overlay {:?} extends past the {}x{} region",
                    part.id,
                    overlay.rect,
                    part.region.width,
                    part.region.height
                );
            }
            check_aspect(
                &overlay.rect,
                overlay.image.width,
                overlay.image.height,
                self.config.aspect_tolerance,
            )
            .map_err(|e| match e {
                Error::GeometryMismatch(msg) => {
                    Error::GeometryMismatch(format!("page {}: {}", part.id, msg))
                },
                other => other,
            })?;

            let name = format!("Im{}", xobjects.len());
            let image = graph.add(overlay.image.to_xobject(self.config.interpolate));
            xobjects.insert(name.clone(), image.into());

            let m = geometry.to_user_space(&overlay.rect);
            let _ = writeln!(
                content,
                "q {} 0 0 {} {} {} cm /{} Do Q",
                format_number(m[0]),
                format_number(m[3]),
                format_number(m[4]),
                format_number(m[5]),
                name
            );
        }

        log::debug!(
            "Page {}: {}x{} units, {} images",
            part.id,
            format_number(width),
            format_number(height),
            xobjects.len()
        );

        let contents = graph.add(Object::stream(Dictionary::new(), content.into_bytes()));
        let resources = dict(vec![
            ("ProcSet", proc_set.into()),
            ("XObject", Object::Dictionary(xobjects)),
        ]);
        Ok(graph.add(dict(vec![
            ("Type", Object::name("Page")),
            ("Parent", parent.into()),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    number_object(width),
                    number_object(height),
                ]),
            ),
            ("Resources", resources),
            ("Contents", contents.into()),
        ])))
    }
}
