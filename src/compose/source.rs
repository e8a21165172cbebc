//! Where page parts come from.
//!
//! The composer reads parts through [`PartSource`], so it does not care
//! whether the encoder output is already in memory or still staged in an
//! archive.

use super::part::PagePart;
use crate::error::{Error, Result};
use bytes::Bytes;

/// Supplies page parts in page order.
pub trait PartSource {
    /// Number of pages.
    fn page_count(&self) -> usize;

    /// Part for page `index` (0-based).
    fn part(&self, index: usize) -> Result<PagePart>;

    /// Shared JBIG2 symbol dictionary, if the encoder produced one.
    fn globals(&self) -> Option<Bytes>;
}

/// Parts already held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryParts {
    parts: Vec<PagePart>,
    globals: Option<Bytes>,
}

impl MemoryParts {
    /// Wrap parts in page order.
    pub fn new(parts: Vec<PagePart>) -> Self {
        Self {
            parts,
            globals: None,
        }
    }

    /// Attach the shared symbol dictionary.
    pub fn with_globals(mut self, globals: impl Into<Bytes>) -> Self {
        self.globals = Some(globals.into());
        self
    }
}

impl PartSource for MemoryParts {
    fn page_count(&self) -> usize {
        self.parts.len()
    }

    fn part(&self, index: usize) -> Result<PagePart> {
        self.parts.get(index).cloned().ok_or_else(|| {
            Error::InvalidPart(format!("page {} requested, {} available", index, self.parts.len()))
        })
    }

    fn globals(&self) -> Option<Bytes> {
        self.globals.clone()
    }
}

#[cfg(feature = "archive")]
pub use archive::ZipPartSource;

#[cfg(feature = "archive")]
mod archive {
    use super::{PagePart, PartSource};
    use crate::compose::part::BilevelRegion;
    use crate::error::{Error, Result};
    use bytes::Bytes;
    use std::io::{Read, Seek};
    use std::path::Path;

    /// Encoder output staged in a zip archive.
    ///
    /// The archive holds `<base>.sym` (the symbol dictionary) and
    /// `<base>.0000`, `<base>.0001`, ... (one page stream each). Pages are
    /// taken in numeric suffix order, starting at zero, up to the first gap.
    #[derive(Debug, Clone)]
    pub struct ZipPartSource {
        pages: Vec<(String, Bytes)>,
        globals: Option<Bytes>,
        oversample: Option<u32>,
    }

    fn zip_error(e: zip::result::ZipError) -> Error {
        Error::InvalidPart(format!("unreadable part archive: {}", e))
    }

    fn page_number(name: &str) -> Option<u32> {
        let (_, suffix) = name.rsplit_once('.')?;
        if suffix.len() >= 4 && suffix.bytes().all(|b| b.is_ascii_digit()) {
            suffix.parse().ok()
        } else {
            None
        }
    }

    impl ZipPartSource {
        /// Read an archive file.
        pub fn open(path: impl AsRef<Path>) -> Result<Self> {
            let file = std::fs::File::open(path)?;
            Self::from_reader(file)
        }

        /// Read an archive from any seekable reader.
        pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
            let mut archive = zip::ZipArchive::new(reader).map_err(zip_error)?;
            let mut numbered = Vec::new();
            let mut globals = None;

            for i in 0..archive.len() {
                let mut entry = archive.by_index(i).map_err(zip_error)?;
                if entry.is_dir() {
                    continue;
                }
                let name = entry.name().to_string();
                let mut data = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut data)?;

                if name.ends_with(".sym") {
                    if globals.is_some() {
                        log::warn!("Archive has several symbol files; using {}", name);
                    }
                    globals = Some(Bytes::from(data));
                } else if let Some(number) = page_number(&name) {
                    numbered.push((number, name, Bytes::from(data)));
                } else {
                    log::debug!("Ignoring archive entry {}", name);
                }
            }

            numbered.sort_by_key(|(number, ..)| *number);
            let mut pages = Vec::with_capacity(numbered.len());
            for (expected, (number, name, data)) in numbered.into_iter().enumerate() {
                if number as usize != expected {
                    log::warn!("Archive has no page {}; ignoring {} and later entries", expected, name);
                    break;
                }
                pages.push((name, data));
            }

            if globals.is_none() {
                log::debug!("Archive has no symbol file");
            }
            log::info!("Loaded {} page parts from archive", pages.len());

            Ok(Self {
                pages,
                globals,
                oversample: None,
            })
        }

        /// Record the oversampling factor the encoder ran with.
        pub fn with_oversample(mut self, factor: u32) -> Self {
            self.oversample = Some(factor);
            self
        }
    }

    impl PartSource for ZipPartSource {
        fn page_count(&self) -> usize {
            self.pages.len()
        }

        fn part(&self, index: usize) -> Result<PagePart> {
            let (name, data) = self.pages.get(index).ok_or_else(|| {
                Error::InvalidPart(format!("page {} requested, {} available", index, self.pages.len()))
            })?;
            let mut region = BilevelRegion::from_jbig2(data.clone())
                .map_err(|e| Error::InvalidPart(format!("{}: {}", name, e)))?;
            if let Some(factor) = self.oversample {
                region = region.with_oversample(factor);
            }
            Ok(PagePart::new(name.clone(), region))
        }

        fn globals(&self) -> Option<Bytes> {
            self.globals.clone()
        }
    }
}
