//! Reading image placements back from a page.

use super::geometry::Placement;
use crate::content::parse_operations;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::object::Object;
use flate2::read::ZlibDecoder;
use std::io::Read;

const IDENTITY: [f64; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// `m` applied before `ctm`.
fn concat(m: &[f64; 6], ctm: &[f64; 6]) -> [f64; 6] {
    [
        m[0] * ctm[0] + m[1] * ctm[2],
        m[0] * ctm[1] + m[1] * ctm[3],
        m[2] * ctm[0] + m[3] * ctm[2],
        m[2] * ctm[1] + m[3] * ctm[3],
        m[4] * ctm[0] + m[5] * ctm[2] + ctm[4],
        m[4] * ctm[1] + m[5] * ctm[3] + ctm[5],
    ]
}

/// Every XObject drawn by `page`, with the transformation in effect.
///
/// `page` is a page dictionary from `doc`; its `/Contents` may be one
/// stream or an array of streams, uncompressed or `FlateDecode`.
pub fn image_placements(doc: &Document, page: &Object) -> Result<Vec<Placement>> {
    let content = page_content(doc, page)?;
    let mut placements = Vec::new();
    let mut ctm = IDENTITY;
    let mut saved = Vec::new();

    for op in parse_operations(&content)? {
        match op.operator.as_str() {
            "q" => saved.push(ctm),
            "Q" => match saved.pop() {
                Some(previous) => ctm = previous,
                None => log::warn!("Unbalanced Q in page content"),
            },
            "cm" => {
                let numbers: Vec<f64> = op.operands.iter().filter_map(Object::as_number).collect();
                match <[f64; 6]>::try_from(numbers.as_slice()) {
                    Ok(m) if op.operands.len() == 6 => ctm = concat(&m, &ctm),
                    _ => log::warn!("Ignoring cm with operands {:?}", op.operands),
                }
            },
            "Do" => match op.operands.first().and_then(Object::as_name) {
                Some(name) => placements.push(Placement {
                    name: name.to_string(),
                    matrix: ctm,
                }),
                None => log::warn!("Ignoring Do without a name operand"),
            },
            _ => {},
        }
    }

    Ok(placements)
}

fn page_content(doc: &Document, page: &Object) -> Result<Vec<u8>> {
    let contents = match page.get("Contents") {
        Some(c) => doc.deref(c)?,
        None => return Ok(Vec::new()),
    };

    let streams = match contents {
        Object::Array(items) => items
            .iter()
            .map(|item| doc.deref(item))
            .collect::<Result<Vec<_>>>()?,
        single => vec![single],
    };

    let mut content = Vec::new();
    for stream in &streams {
        let data = stream.stream_data().ok_or_else(|| {
            Error::UnsupportedFeature(format!("page content is a {}", stream.type_name()))
        })?;
        if !content.is_empty() {
            content.push(b'\n');
        }
        content.extend_from_slice(&decode_content(stream, data)?);
    }
    Ok(content)
}

fn decode_content(stream: &Object, data: &[u8]) -> Result<Vec<u8>> {
    let filters: Vec<&str> = match stream.get("Filter") {
        None => Vec::new(),
        Some(Object::Name(name)) => vec![name.as_str()],
        Some(Object::Array(items)) => items.iter().filter_map(Object::as_name).collect(),
        Some(other) => {
            return Err(Error::UnsupportedFeature(format!(
                "content stream /Filter is a {}",
                other.type_name()
            )))
        },
    };

    let mut decoded = data.to_vec();
    for filter in filters {
        if filter != "FlateDecode" {
            return Err(Error::UnsupportedFeature(format!(
                "content stream filter {}",
                filter
            )));
        }
        let mut output = Vec::new();
        ZlibDecoder::new(decoded.as_slice()).read_to_end(&mut output)?;
        decoded = output;
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Dictionary, ObjectRef};
    use crate::writer::{ObjectGraph, PdfWriter};
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn document_with_contents(streams: Vec<Object>) -> (Document, Object) {
        let mut graph = ObjectGraph::new();
        let refs: Vec<Object> = streams.into_iter().map(|s| graph.add(s).into()).collect();
        let contents = if refs.len() == 1 {
            refs[0].clone()
        } else {
            Object::Array(refs)
        };

        let mut page = Dictionary::new();
        page.insert("Type".to_string(), Object::name("Page"));
        page.insert("Contents".to_string(), contents);
        let page = graph.add(Object::Dictionary(page));

        let mut catalog = Dictionary::new();
        catalog.insert("Type".to_string(), Object::name("Catalog"));
        catalog.insert("Page".to_string(), page.into());
        let root = graph.add(Object::Dictionary(catalog));

        let doc = Document::from_bytes(PdfWriter::new().write(&graph, root, None).unwrap()).unwrap();
        let catalog = doc.root().unwrap();
        let page = doc.deref(catalog.get("Page").unwrap()).unwrap();
        (doc, page)
    }

    fn plain(content: &[u8]) -> Object {
        Object::stream(Dictionary::new(), content.to_vec())
    }

    #[test]
    fn test_nested_transforms() {
        let (doc, page) = document_with_contents(vec![plain(
            b"q 800 0 0 1200 0 0 cm /Im0 Do Q\nq 2 0 0 2 10 20 cm q 5 0 0 4 1 1 cm /Im1 Do Q Q\n",
        )]);
        let placements = image_placements(&doc, &page).unwrap();
        assert_eq!(placements.len(), 2);
        assert_eq!(placements[0].name, "Im0");
        assert_eq!(placements[0].matrix, [800.0, 0.0, 0.0, 1200.0, 0.0, 0.0]);
        assert_eq!(placements[1].name, "Im1");
        assert_eq!(placements[1].matrix, [10.0, 0.0, 0.0, 8.0, 12.0, 22.0]);
    }

    #[test]
    fn test_content_array_and_flate() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"/Im1 Do Q").unwrap();
        let mut dict = Dictionary::new();
        dict.insert("Filter".to_string(), Object::name("FlateDecode"));
        let compressed = Object::stream(dict, encoder.finish().unwrap());

        let (doc, page) = document_with_contents(vec![plain(b"q 3 0 0 3 0 0 cm"), compressed]);
        let placements = image_placements(&doc, &page).unwrap();
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].matrix, [3.0, 0.0, 0.0, 3.0, 0.0, 0.0]);
    }

    #[test]
    fn test_unsupported_filter() {
        let mut dict = Dictionary::new();
        dict.insert("Filter".to_string(), Object::name("LZWDecode"));
        let (doc, page) = document_with_contents(vec![Object::stream(dict, b"x".to_vec())]);
        assert!(matches!(
            image_placements(&doc, &page),
            Err(Error::UnsupportedFeature(_))
        ));
    }

    #[test]
    fn test_page_without_contents() {
        let mut graph = ObjectGraph::new();
        let root = graph.add(Object::Dictionary(Dictionary::new()));
        let doc = Document::from_bytes(PdfWriter::new().write(&graph, root, None).unwrap()).unwrap();
        let page = doc.get(ObjectRef::new(1, 0)).unwrap();
        assert!(image_placements(&doc, &page).unwrap().is_empty());
    }
}
