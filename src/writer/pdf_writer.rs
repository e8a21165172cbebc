//! Document writer.
//!
//! Numbers the objects of an [`ObjectGraph`] and assembles a complete
//! file: header, body, cross-reference table, and trailer.

use super::object_serializer::ObjectSerializer;
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use std::collections::HashMap;
use std::io::Write;

/// Caller-built set of objects to serialize.
///
/// Objects reference each other through the handles returned by
/// [`add`](Self::add) and [`reserve`](Self::reserve). Handles are not the
/// ids that end up in the file; the writer renumbers everything.
#[derive(Debug, Clone, Default)]
pub struct ObjectGraph {
    slots: Vec<Option<Object>>,
}

impl ObjectGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object and return its handle.
    pub fn add(&mut self, obj: Object) -> ObjectRef {
        self.slots.push(Some(obj));
        ObjectRef::new(self.slots.len() as u32, 0)
    }

    /// Reserve a handle to be filled later with [`set`](Self::set).
    ///
    /// Lets parents and children reference each other.
    pub fn reserve(&mut self) -> ObjectRef {
        self.slots.push(None);
        ObjectRef::new(self.slots.len() as u32, 0)
    }

    /// Store `obj` under a handle from this graph.
    pub fn set(&mut self, handle: ObjectRef, obj: Object) -> Result<()> {
        let slot = self.slot_mut(handle).ok_or(Error::DanglingReference(handle))?;
        *slot = Some(obj);
        Ok(())
    }

    /// Object stored under `handle`, if any.
    pub fn get(&self, handle: ObjectRef) -> Option<&Object> {
        if handle.gen != 0 || handle.id == 0 {
            return None;
        }
        self.slots.get(handle.id as usize - 1)?.as_ref()
    }

    /// Number of handles issued.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no handle was issued.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot_mut(&mut self, handle: ObjectRef) -> Option<&mut Option<Object>> {
        if handle.gen != 0 || handle.id == 0 {
            return None;
        }
        self.slots.get_mut(handle.id as usize - 1)
    }

    /// Handles of filled slots in insertion order.
    fn handles(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| ObjectRef::new(i as u32 + 1, 0))
    }
}

/// Output ids assigned to graph handles.
#[derive(Debug, Clone, Default)]
pub struct Numbering {
    order: Vec<ObjectRef>,
    ids: HashMap<ObjectRef, u32>,
}

impl Numbering {
    /// Output id of `handle`.
    pub fn id_of(&self, handle: ObjectRef) -> Option<u32> {
        self.ids.get(&handle).copied()
    }

    /// Handles in output id order; the first one gets id 1.
    pub fn order(&self) -> &[ObjectRef] {
        &self.order
    }

    /// Number of numbered objects.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing was numbered.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn assign(&mut self, handle: ObjectRef) -> bool {
        if self.ids.contains_key(&handle) {
            return false;
        }
        self.order.push(handle);
        self.ids.insert(handle, self.order.len() as u32);
        true
    }

    fn remap(&self, handle: ObjectRef) -> ObjectRef {
        // Every reachable handle is numbered before remapping starts; a
        // stream's /Length may still point nowhere, and is rewritten anyway.
        ObjectRef::new(self.ids.get(&handle).copied().unwrap_or(0), 0)
    }
}

/// Configuration for document output.
#[derive(Debug, Clone)]
pub struct PdfWriterConfig {
    /// Version written in the header (e.g., "1.7")
    pub version: String,
    /// Minimal whitespace inside dictionaries
    pub compact: bool,
    /// Write the binary marker comment after the header
    pub binary_marker: bool,
    /// `/Producer` entry for the info dictionary
    pub producer: Option<String>,
    /// Add a `/CreationDate` entry to the info dictionary
    pub creation_date: bool,
}

impl Default for PdfWriterConfig {
    fn default() -> Self {
        Self {
            version: "1.7".to_string(),
            compact: false,
            binary_marker: true,
            producer: None,
            creation_date: false,
        }
    }
}

impl PdfWriterConfig {
    /// Set the header version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Use compact formatting.
    pub fn with_compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    /// Write or omit the binary marker line.
    pub fn with_binary_marker(mut self, enable: bool) -> Self {
        self.binary_marker = enable;
        self
    }

    /// Set the producer name.
    pub fn with_producer(mut self, producer: impl Into<String>) -> Self {
        self.producer = Some(producer.into());
        self
    }

    /// Stamp the info dictionary with the current local time.
    pub fn with_creation_date(mut self, enable: bool) -> Self {
        self.creation_date = enable;
        self
    }
}

/// Date string in `D:YYYYMMDDHHmmSS` form.
pub fn format_date(time: &chrono::NaiveDateTime) -> String {
    time.format("D:%Y%m%d%H%M%S").to_string()
}

/// Serializes an [`ObjectGraph`] to a complete file.
#[derive(Debug, Clone, Default)]
pub struct PdfWriter {
    config: PdfWriterConfig,
}

impl PdfWriter {
    /// Create a writer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with custom configuration.
    pub fn with_config(config: PdfWriterConfig) -> Self {
        Self { config }
    }

    /// Writer configuration.
    pub fn config(&self) -> &PdfWriterConfig {
        &self.config
    }

    /// Assign output ids.
    ///
    /// Depth-first from `root`, children in stored order, each object
    /// numbered on first encounter; then the same from `info`; then any
    /// remaining objects in insertion order.
    ///
    /// # Errors
    ///
    /// `DanglingReference` for a reachable reference with no object behind it.
    pub fn number(
        &self,
        graph: &ObjectGraph,
        root: ObjectRef,
        info: Option<ObjectRef>,
    ) -> Result<Numbering> {
        let mut numbering = Numbering::default();

        number_from(graph, root, &mut numbering)?;
        if let Some(info) = info {
            number_from(graph, info, &mut numbering)?;
        }
        let reachable = numbering.len();

        for handle in graph.handles() {
            number_from(graph, handle, &mut numbering)?;
        }
        if numbering.len() > reachable {
            log::debug!(
                "{} graph objects are unreachable from the root; numbered last",
                numbering.len() - reachable
            );
        }

        Ok(numbering)
    }

    /// Serialize `graph` with `root` as the catalog.
    ///
    /// The graph is validated completely before any byte is produced.
    pub fn write(
        &self,
        graph: &ObjectGraph,
        root: ObjectRef,
        info: Option<ObjectRef>,
    ) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.write_to(&mut output, graph, root, info)?;
        Ok(output)
    }

    /// Serialize `graph` into `out`.
    pub fn write_to<W: Write>(
        &self,
        out: &mut W,
        graph: &ObjectGraph,
        root: ObjectRef,
        info: Option<ObjectRef>,
    ) -> Result<()> {
        let numbering = self.number(graph, root, info)?;
        let serializer = if self.config.compact {
            ObjectSerializer::compact()
        } else {
            ObjectSerializer::new()
        };

        let mut objects: Vec<Object> = Vec::with_capacity(numbering.len() + 1);
        for &handle in numbering.order() {
            let obj = graph.get(handle).ok_or(Error::DanglingReference(handle))?;
            objects.push(obj.map_references(&mut |r| numbering.remap(r)));
        }

        let mut info_id = info.and_then(|r| numbering.id_of(r));
        let stamp = self.info_entries();
        if !stamp.is_empty() {
            match info_id {
                Some(id) => {
                    let slot = &mut objects[id as usize - 1];
                    match slot {
                        Object::Dictionary(dict) => dict.extend(stamp),
                        other => log::warn!(
                            "Info object is a {}, not stamping producer/date",
                            other.type_name()
                        ),
                    }
                },
                None => {
                    objects.push(Object::Dictionary(stamp));
                    info_id = Some(objects.len() as u32);
                },
            }
        }

        let root_id = numbering.remap(root).id;
        log::debug!("Writing {} objects, root {}", objects.len(), root_id);

        let mut output: Vec<u8> = Vec::new();
        writeln!(output, "%PDF-{}", self.config.version)?;
        if self.config.binary_marker {
            output.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        }

        let mut offsets = Vec::with_capacity(objects.len());
        for (i, obj) in objects.iter().enumerate() {
            offsets.push(output.len());
            serializer.write_indirect(&mut output, i as u32 + 1, 0, obj)?;
        }

        let xref_start = output.len();
        writeln!(output, "xref")?;
        writeln!(output, "0 {}", objects.len() + 1)?;
        // Object 0 is always free; entries are exactly 20 bytes
        output.extend_from_slice(b"0000000000 65535 f \n");
        for offset in &offsets {
            write!(output, "{:010} 00000 n \n", offset)?;
        }

        let mut trailer = Dictionary::new();
        trailer.insert("Size".to_string(), Object::Integer(objects.len() as i64 + 1));
        trailer.insert("Root".to_string(), Object::Reference(ObjectRef::new(root_id, 0)));
        if let Some(id) = info_id {
            trailer.insert("Info".to_string(), Object::Reference(ObjectRef::new(id, 0)));
        }

        writeln!(output, "trailer")?;
        serializer.write_object(&mut output, &Object::Dictionary(trailer))?;
        writeln!(output)?;
        writeln!(output, "startxref")?;
        writeln!(output, "{}", xref_start)?;
        writeln!(output, "%%EOF")?;

        out.write_all(&output)?;
        Ok(())
    }

    /// Serialize `graph` to a file.
    pub fn save(
        &self,
        path: impl AsRef<std::path::Path>,
        graph: &ObjectGraph,
        root: ObjectRef,
        info: Option<ObjectRef>,
    ) -> Result<()> {
        let bytes = self.write(graph, root, info)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    fn info_entries(&self) -> Dictionary {
        let mut entries = Dictionary::new();
        if let Some(producer) = &self.config.producer {
            entries.insert("Producer".to_string(), Object::String(producer.as_bytes().to_vec()));
        }
        if self.config.creation_date {
            let date = format_date(&chrono::Local::now().naive_local());
            entries.insert("CreationDate".to_string(), Object::String(date.into_bytes()));
        }
        entries
    }
}

fn number_from(graph: &ObjectGraph, start: ObjectRef, numbering: &mut Numbering) -> Result<()> {
    let mut stack = vec![start];
    while let Some(handle) = stack.pop() {
        let obj = graph.get(handle).ok_or(Error::DanglingReference(handle))?;
        if !numbering.assign(handle) {
            continue;
        }
        if let Some(reason) = unwritable_reason(obj) {
            return Err(Error::UnwritableObject { handle, reason });
        }

        let mut children = Vec::new();
        match obj {
            // /Length is rewritten from the payload, so its target is not a child
            Object::Stream { dict, .. } => dict
                .iter()
                .filter(|(key, _)| key.as_str() != "Length")
                .for_each(|(_, value)| value.for_each_reference(&mut |r| children.push(r))),
            other => other.for_each_reference(&mut |r| children.push(r)),
        }
        // Reversed so the first child is popped first
        stack.extend(children.into_iter().rev());
    }
    Ok(())
}

/// Why `obj` cannot be an indirect object body that reads back unchanged.
///
/// Streams are only allowed at the top level, and names must fit one byte
/// per character.
fn unwritable_reason(obj: &Object) -> Option<String> {
    match obj {
        Object::Stream { dict, .. } => dict_reason(dict),
        other => nested_reason(other),
    }
}

fn nested_reason(obj: &Object) -> Option<String> {
    match obj {
        Object::Stream { .. } => Some("stream nested inside another value".to_string()),
        Object::Name(name) => name_reason(name),
        Object::Array(items) => items.iter().find_map(nested_reason),
        Object::Dictionary(dict) => dict_reason(dict),
        _ => None,
    }
}

fn dict_reason(dict: &Dictionary) -> Option<String> {
    dict.iter()
        .find_map(|(key, value)| name_reason(key).or_else(|| nested_reason(value)))
}

fn name_reason(name: &str) -> Option<String> {
    name.chars()
        .find(|&c| u32::from(c) > 0xFF)
        .map(|c| format!("name {:?} has character {:?} above U+00FF", name, c))
}
