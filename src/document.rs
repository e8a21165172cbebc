//! Document model.
//!
//! [`Document`] owns the raw bytes of a document together with its
//! verified cross-reference table and trailer, and resolves objects on
//! demand:
//!
//! - [`Document::resolve_shallow`] parses the body at an object's offset
//!   without following any reference inside it
//! - [`Document::get`] does the same but materializes stream payloads
//! - [`Document::resolve`] replaces every reachable reference with its
//!   target, failing with `CyclicReference` when an object is reached
//!   again on the active path
//!
//! Stream objects are cached per object number for the lifetime of the
//! document. The cache is guarded by a mutex so a document can be shared
//! between threads.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::parser::{parse_indirect_object_with, Body};
use crate::parser_config::ParserOptions;
use crate::stream::{extract_stream, LengthResolver};
use crate::xref::{check_header, read_xref, CrossRefTable};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

/// Cache slot for one stream object. A missing slot means unresolved.
#[derive(Debug)]
enum CacheState {
    /// Payload being extracted by the given thread
    Resolving(ThreadId),
    /// Fully materialized stream object
    Resolved(Object),
}

#[derive(Debug, Default)]
struct StreamCache {
    slots: Mutex<HashMap<u32, CacheState>>,
    ready: Condvar,
}

impl StreamCache {
    fn lock(&self) -> MutexGuard<'_, HashMap<u32, CacheState>> {
        // Slots are only written whole, so a poisoned map is still consistent
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A parsed document with lazily resolved objects.
///
/// # Example
///
/// ```no_run
/// use pdfimage::document::Document;
///
/// let doc = Document::open("scan.pdf")?;
/// println!("version {}.{}", doc.version().0, doc.version().1);
/// let catalog = doc.root()?;
/// println!("catalog: {:?}", catalog);
/// # Ok::<(), pdfimage::error::Error>(())
/// ```
pub struct Document {
    /// Whole input; stream payloads are slices of it
    data: Bytes,
    /// Version from the header (major, minor)
    version: (u8, u8),
    /// Verified cross-reference table
    xref: CrossRefTable,
    /// Trailer dictionary
    trailer: Dictionary,
    /// Parser limits
    options: ParserOptions,
    /// Materialized stream objects
    stream_cache: StreamCache,
    /// Number of payload extractions performed
    stream_extractions: AtomicUsize,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("version", &self.version)
            .field("size", &self.data.len())
            .field("xref_entries", &self.xref.len())
            .field("cached_streams", &self.stream_cache.lock().len())
            .finish_non_exhaustive()
    }
}

impl Document {
    /// Open a document from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the header is invalid,
    /// or the cross-reference table cannot be found, parsed or verified.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, ParserOptions::default())
    }

    /// Open a document from a file path with explicit parser limits.
    pub fn open_with_options(path: impl AsRef<Path>, options: ParserOptions) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Opening {}", path.display());
        let data = std::fs::read(path)?;
        Self::with_options(data, options)
    }

    /// Parse a document held in memory.
    pub fn from_bytes(data: impl Into<Bytes>) -> Result<Self> {
        Self::with_options(data, ParserOptions::default())
    }

    /// Parse a document held in memory with explicit parser limits.
    pub fn with_options(data: impl Into<Bytes>, options: ParserOptions) -> Result<Self> {
        let data = data.into();
        let version = check_header(&data)?;
        let xref = read_xref(&data, &options)?;
        let trailer = xref
            .trailer()
            .cloned()
            .ok_or_else(|| Error::MalformedXref("missing trailer".to_string()))?;

        log::info!(
            "Loaded document: version {}.{}, {} xref entries, {} bytes",
            version.0,
            version.1,
            xref.len(),
            data.len()
        );

        Ok(Self {
            data,
            version,
            xref,
            trailer,
            options,
            stream_cache: StreamCache::default(),
            stream_extractions: AtomicUsize::new(0),
        })
    }

    /// Version from the header as (major, minor).
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// The trailer dictionary. It is not stored at any object number.
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// The cross-reference table.
    pub fn xref(&self) -> &CrossRefTable {
        &self.xref
    }

    /// Raw document bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Byte offset of an in-use object.
    pub fn offset_of(&self, id: u32) -> Option<u64> {
        self.xref.offset_of(id)
    }

    /// In-use object numbers, ascending.
    pub fn object_ids(&self) -> Vec<u32> {
        self.xref.in_use_object_numbers().collect()
    }

    /// Reference stored under the trailer's `/Root` key.
    pub fn root_ref(&self) -> Result<ObjectRef> {
        self.trailer
            .get("Root")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::MalformedXref("trailer has no /Root reference".to_string()))
    }

    /// The document catalog, one level deep.
    pub fn root(&self) -> Result<Object> {
        self.get(self.root_ref()?)
    }

    /// Parse the body at `r`'s offset without following references.
    ///
    /// Stream objects come back as [`Body::Stream`] with the payload left
    /// in place.
    pub fn resolve_shallow(&self, r: ObjectRef) -> Result<Body> {
        let entry = self
            .xref
            .get(r.id)
            .filter(|e| e.in_use && e.generation == r.gen)
            .ok_or(Error::ObjectNotFound(r.id, r.gen))?;

        let offset = usize::try_from(entry.offset).map_err(|_| Error::ObjectNotFound(r.id, r.gen))?;
        let obj = parse_indirect_object_with(&self.data, offset, &self.options)?;
        if obj.id != r {
            return Err(Error::MalformedXref(format!(
                "object at byte {} is {}, expected {}",
                offset, obj.id, r
            )));
        }
        Ok(obj.body)
    }

    /// Resolve `r` one level deep, materializing stream payloads.
    ///
    /// References inside the returned value are left as they are.
    pub fn get(&self, r: ObjectRef) -> Result<Object> {
        log::debug!("Loading object {}", r);
        let current = self
            .xref
            .get(r.id)
            .is_some_and(|e| e.in_use && e.generation == r.gen);
        if current {
            if let Some(CacheState::Resolved(obj)) = self.stream_cache.lock().get(&r.id) {
                log::debug!("  → Stream {} found in cache", r);
                return Ok(obj.clone());
            }
        }

        match self.resolve_shallow(r)? {
            Body::Value(obj) => Ok(obj),
            Body::Stream { dict, data_offset } => self.load_stream(r, dict, data_offset),
        }
    }

    /// Follow `obj` one level if it is a reference.
    pub fn deref(&self, obj: &Object) -> Result<Object> {
        match obj {
            Object::Reference(r) => self.get(*r),
            other => Ok(other.clone()),
        }
    }

    /// Fully resolve the object at `r`.
    ///
    /// Every reference reachable from it is replaced by its target. Fails
    /// as a whole if any reachable object fails; no partial result is
    /// returned.
    pub fn resolve(&self, r: ObjectRef) -> Result<Object> {
        let mut active = HashSet::new();
        self.resolve_ref(r, &mut active, 0)
    }

    /// Fully resolve every reference inside `obj`.
    pub fn resolve_value(&self, obj: &Object) -> Result<Object> {
        let mut active = HashSet::new();
        self.resolve_inner(obj, &mut active, 0)
    }

    /// Drop every materialized stream; the next access re-reads payloads.
    pub fn invalidate_stream_cache(&self) {
        let mut slots = self.stream_cache.lock();
        slots.retain(|_, state| matches!(state, CacheState::Resolving(_)));
        log::debug!("Stream cache invalidated");
    }

    /// Number of stream payload extractions performed so far.
    pub fn stream_extractions(&self) -> usize {
        self.stream_extractions.load(Ordering::Relaxed)
    }

    /// References of all leaf pages, in page-tree order.
    pub fn page_refs(&self) -> Result<Vec<ObjectRef>> {
        let root = self.root()?;
        let pages = root
            .get("Pages")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::MalformedObject {
                offset: self.root_ref().ok().and_then(|r| self.offset_of(r.id)).unwrap_or(0) as usize,
                reason: "catalog has no /Pages reference".to_string(),
            })?;

        let mut pages_out = Vec::new();
        let mut visited = HashSet::new();
        self.collect_pages(pages, &mut visited, &mut pages_out)?;
        Ok(pages_out)
    }

    fn collect_pages(
        &self,
        node_ref: ObjectRef,
        visited: &mut HashSet<u32>,
        out: &mut Vec<ObjectRef>,
    ) -> Result<()> {
        if !visited.insert(node_ref.id) {
            log::warn!("Page tree revisits object {}", node_ref);
            return Err(Error::CyclicReference(node_ref));
        }

        let node = self.get(node_ref)?;
        if !node.has_type("Pages") {
            out.push(node_ref);
            return Ok(());
        }

        let kids = self.deref(node.get("Kids").unwrap_or(&Object::Null))?;
        for kid in kids.as_array().map(Vec::as_slice).unwrap_or_default() {
            match kid.as_reference() {
                Some(r) => self.collect_pages(r, visited, out)?,
                None => log::warn!("Skipping direct object in /Kids of {}", node_ref),
            }
        }
        Ok(())
    }

    fn resolve_ref(&self, r: ObjectRef, active: &mut HashSet<u32>, depth: u32) -> Result<Object> {
        let max = self.options.max_resolution_depth;
        if depth > max {
            log::error!("Resolution depth limit exceeded ({}) at object {}", max, r);
            return Err(Error::RecursionLimitExceeded(max));
        }
        if !active.insert(r.id) {
            log::warn!("Circular reference detected at object {} (depth {})", r, depth);
            return Err(Error::CyclicReference(r));
        }

        let result = self
            .get(r)
            .and_then(|obj| self.resolve_inner(&obj, active, depth));
        active.remove(&r.id);
        result
    }

    fn resolve_inner(&self, obj: &Object, active: &mut HashSet<u32>, depth: u32) -> Result<Object> {
        match obj {
            Object::Reference(r) => self.resolve_ref(*r, active, depth + 1),
            Object::Array(items) => items
                .iter()
                .map(|item| self.resolve_inner(item, active, depth))
                .collect::<Result<Vec<_>>>()
                .map(Object::Array),
            Object::Dictionary(dict) => self.resolve_dict(dict, active, depth).map(Object::Dictionary),
            Object::Stream { dict, data } => Ok(Object::Stream {
                dict: self.resolve_dict(dict, active, depth)?,
                data: data.clone(),
            }),
            other => Ok(other.clone()),
        }
    }

    fn resolve_dict(
        &self,
        dict: &Dictionary,
        active: &mut HashSet<u32>,
        depth: u32,
    ) -> Result<Dictionary> {
        dict.iter()
            .map(|(k, v)| Ok((k.clone(), self.resolve_inner(v, active, depth)?)))
            .collect()
    }

    /// Materialize a stream object through the cache.
    ///
    /// A thread that finds the slot claimed by another thread waits for
    /// it; finding its own claim means the payload depends on itself.
    fn load_stream(&self, r: ObjectRef, dict: Dictionary, data_offset: usize) -> Result<Object> {
        let me = thread::current().id();
        {
            let mut slots = self.stream_cache.lock();
            loop {
                let owner = match slots.get(&r.id) {
                    Some(CacheState::Resolved(obj)) => {
                        log::debug!("  → Stream {} found in cache", r);
                        return Ok(obj.clone());
                    },
                    Some(CacheState::Resolving(owner)) => Some(*owner),
                    None => None,
                };

                match owner {
                    Some(owner) if owner == me => {
                        log::warn!("Stream {} depends on itself", r);
                        return Err(Error::CyclicReference(r));
                    },
                    Some(_) => {
                        slots = self
                            .stream_cache
                            .ready
                            .wait(slots)
                            .unwrap_or_else(PoisonError::into_inner);
                    },
                    None => {
                        slots.insert(r.id, CacheState::Resolving(me));
                        break;
                    },
                }
            }
        }

        self.stream_extractions.fetch_add(1, Ordering::Relaxed);
        let result = extract_stream(&self.data, &dict, data_offset, self)
            .map(|payload| Object::Stream { dict, data: payload });

        let mut slots = self.stream_cache.lock();
        match &result {
            Ok(obj) => {
                log::debug!("  → Stream {} extracted ({} bytes)", r, obj.stream_data().map_or(0, Bytes::len));
                slots.insert(r.id, CacheState::Resolved(obj.clone()));
            },
            Err(e) => {
                log::debug!("  → Stream {} failed: {}", r, e);
                slots.remove(&r.id);
            },
        }
        self.stream_cache.ready.notify_all();
        result
    }
}

impl LengthResolver for Document {
    fn resolve_length(&self, r: ObjectRef) -> Result<i64> {
        match self.resolve_shallow(r)? {
            Body::Value(Object::Integer(n)) => Ok(n),
            other => Err(Error::MalformedObject {
                offset: self.offset_of(r.id).unwrap_or(0) as usize,
                reason: format!(
                    "indirect stream length {} is not an integer: {:?}",
                    r,
                    match other {
                        Body::Value(v) => v.type_name(),
                        Body::Stream { .. } => "Stream",
                    }
                ),
            }),
        }
    }
}
