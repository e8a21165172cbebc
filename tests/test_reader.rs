//! Reading hand-built documents: cross-reference fidelity, cycles, caching.

use pdfimage::document::Document;
use pdfimage::object::{Object, ObjectRef};
use pdfimage::{Error, ParserOptions};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

/// Assemble a document from object bodies, with the given xref
/// subsections, computing every offset.
fn document(objects: &[(u32, &str)], sections: &[(u32, u32)], trailer: &str) -> Vec<u8> {
    let mut out = b"%PDF-1.5\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = HashMap::new();
    for (id, body) in objects {
        offsets.insert(*id, out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", id, body).as_bytes());
    }
    let xref = out.len();
    out.extend_from_slice(b"xref\n");
    for &(start, count) in sections {
        out.extend_from_slice(format!("{} {}\n", start, count).as_bytes());
        for id in start..start + count {
            match offsets.get(&id) {
                Some(off) => out.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes()),
                None => out.extend_from_slice(b"0000000000 65535 f \n"),
            }
        }
    }
    out.extend_from_slice(format!("trailer\n{}\nstartxref\n{}\n%%EOF\n", trailer, xref).as_bytes());
    out
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_xref_subsections_map_exact_offsets() {
    init_logging();
    let bytes = document(
        &[
            (1, "<< /Type /Catalog /Pages 2 0 R >>"),
            (2, "<< /Type /Pages /Kids [] /Count 0 >>"),
            (3, "(three)"),
            (10, "[10 0 R]"),
            (11, "<< /Length 5 >>\nstream\nhello\nendstream"),
        ],
        &[(1, 3), (10, 2)],
        "<< /Size 12 /Root 1 0 R >>",
    );
    let doc = Document::from_bytes(bytes.clone()).unwrap();

    assert_eq!(doc.object_ids(), vec![1, 2, 3, 10, 11]);
    for id in doc.object_ids() {
        let offset = doc.offset_of(id).unwrap() as usize;
        let header = format!("{} 0 obj", id);
        assert!(bytes[offset..].starts_with(header.as_bytes()), "object {}", id);
    }
    assert!(doc.offset_of(5).is_none());

    assert_eq!(doc.get(ObjectRef::new(3, 0)).unwrap(), Object::String(b"three".to_vec()));
    let stream = doc.get(ObjectRef::new(11, 0)).unwrap();
    assert_eq!(stream.stream_data().map(|d| &d[..]), Some(&b"hello"[..]));
}

#[test]
fn test_missing_object_is_not_found() {
    let bytes = document(&[(1, "<< /Type /Catalog >>")], &[(0, 2)], "<< /Size 2 /Root 1 0 R >>");
    let doc = Document::from_bytes(bytes).unwrap();
    assert!(matches!(doc.get(ObjectRef::new(7, 0)), Err(Error::ObjectNotFound(7, 0))));
}

#[test]
fn test_self_referencing_array_resolves_shallow() {
    let bytes = document(
        &[(1, "<< /Type /Catalog >>"), (10, "[10 0 R]")],
        &[(0, 2), (10, 1)],
        "<< /Size 11 /Root 1 0 R >>",
    );
    let doc = Document::from_bytes(bytes).unwrap();
    assert_eq!(
        doc.get(ObjectRef::new(10, 0)).unwrap(),
        Object::Array(vec![Object::Reference(ObjectRef::new(10, 0))])
    );
    assert!(matches!(
        doc.resolve(ObjectRef::new(10, 0)),
        Err(Error::CyclicReference(r)) if r.id == 10
    ));
}

#[test]
fn test_two_object_cycle_detected() {
    init_logging();
    let bytes = document(
        &[
            (1, "<< /Type /Catalog /A 2 0 R >>"),
            (2, "<< /Next 3 0 R >>"),
            (3, "<< /Next 2 0 R >>"),
        ],
        &[(0, 4)],
        "<< /Size 4 /Root 1 0 R >>",
    );
    let doc = Document::from_bytes(bytes).unwrap();

    // Each side is fine on its own
    assert!(doc.get(ObjectRef::new(2, 0)).is_ok());
    assert!(doc.get(ObjectRef::new(3, 0)).is_ok());

    let err = doc.resolve(ObjectRef::new(1, 0)).unwrap_err();
    assert!(matches!(err, Error::CyclicReference(r) if r.id == 2));
}

#[test]
fn test_shared_child_is_not_a_cycle() {
    let bytes = document(
        &[
            (1, "<< /Type /Catalog /Left 2 0 R /Right 2 0 R >>"),
            (2, "<< /Leaf true >>"),
        ],
        &[(0, 3)],
        "<< /Size 3 /Root 1 0 R >>",
    );
    let doc = Document::from_bytes(bytes).unwrap();
    let resolved = doc.resolve(ObjectRef::new(1, 0)).unwrap();
    assert_eq!(resolved.get("Left"), resolved.get("Right"));
    assert_eq!(resolved.get("Left").and_then(|o| o.get("Leaf")), Some(&Object::Boolean(true)));
}

#[test]
fn test_resolution_depth_limit() {
    let objects: Vec<(u32, String)> = (1..=6)
        .map(|id| (id, format!("<< /Next {} 0 R >>", id + 1)))
        .chain(std::iter::once((7, "null".to_string())))
        .collect();
    let borrowed: Vec<(u32, &str)> = objects.iter().map(|(id, s)| (*id, s.as_str())).collect();
    let bytes = document(&borrowed, &[(0, 8)], "<< /Size 8 /Root 1 0 R >>");

    let doc = Document::with_options(bytes.clone(), ParserOptions::new().with_max_resolution_depth(3)).unwrap();
    assert!(matches!(
        doc.resolve(ObjectRef::new(1, 0)),
        Err(Error::RecursionLimitExceeded(3))
    ));

    let doc = Document::from_bytes(bytes).unwrap();
    assert!(doc.resolve(ObjectRef::new(1, 0)).is_ok());
}

#[test]
fn test_indirect_length_and_cache() {
    let bytes = document(
        &[
            (1, "<< /Type /Catalog >>"),
            (2, "<< /Length 3 0 R >>\nstream\nabcdefgh\nendstream"),
            (3, "8"),
        ],
        &[(0, 4)],
        "<< /Size 4 /Root 1 0 R >>",
    );
    let doc = Arc::new(Document::from_bytes(bytes).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let doc = Arc::clone(&doc);
            std::thread::spawn(move || doc.get(ObjectRef::new(2, 0)).unwrap())
        })
        .collect();
    let results: Vec<Object> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(results.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(results[0].stream_data().map(|d| &d[..]), Some(&b"abcdefgh"[..]));
    assert_eq!(doc.stream_extractions(), 1);

    doc.invalidate_stream_cache();
    assert_eq!(doc.get(ObjectRef::new(2, 0)).unwrap(), results[0]);
    assert_eq!(doc.stream_extractions(), 2);
}

#[test]
fn test_full_resolution_is_idempotent() {
    let bytes = document(
        &[
            (1, "<< /Type /Catalog /Content 2 0 R /Again 2 0 R >>"),
            (2, "<< /Length 3 0 R /Kind /Data >>\nstream\n0123456789\nendstream"),
            (3, "10"),
        ],
        &[(0, 4)],
        "<< /Size 4 /Root 1 0 R >>",
    );
    let doc = Document::from_bytes(bytes).unwrap();

    let first = doc.resolve(ObjectRef::new(1, 0)).unwrap();
    assert_eq!(doc.stream_extractions(), 1);
    assert_eq!(
        first.get("Content").and_then(Object::stream_data).map(|d| &d[..]),
        Some(&b"0123456789"[..])
    );

    let second = doc.resolve(ObjectRef::new(1, 0)).unwrap();
    assert_eq!(first, second);
    assert_eq!(doc.stream_extractions(), 1);
}

#[test]
fn test_structural_failures() {
    // encrypted
    let bytes = document(
        &[(1, "<< /Type /Catalog >>")],
        &[(0, 2)],
        "<< /Size 2 /Root 1 0 R /Encrypt << /Filter /Standard >> >>",
    );
    assert!(matches!(Document::from_bytes(bytes), Err(Error::UnsupportedFeature(_))));

    // chained trailer
    let bytes = document(
        &[(1, "<< /Type /Catalog >>")],
        &[(0, 2)],
        "<< /Size 2 /Root 1 0 R /Prev 9 >>",
    );
    assert!(matches!(Document::from_bytes(bytes), Err(Error::UnsupportedFeature(_))));

    // bad header
    assert!(matches!(
        Document::from_bytes(b"%!PS-Adobe\n".to_vec()),
        Err(Error::InvalidHeader(_))
    ));
}

#[test]
fn test_truncated_stream_reports_offset() {
    let bytes = document(
        &[
            (1, "<< /Type /Catalog >>"),
            (2, "<< /Length 500 >>\nstream\nshort\nendstream"),
        ],
        &[(0, 3)],
        "<< /Size 3 /Root 1 0 R >>",
    );
    let doc = Document::from_bytes(bytes).unwrap();
    match doc.get(ObjectRef::new(2, 0)) {
        Err(Error::TruncatedStream { declared, .. }) => assert_eq!(declared, 500),
        other => panic!("expected TruncatedStream, got {:?}", other),
    }
}

#[test]
fn test_open_from_file() {
    let bytes = document(&[(1, "<< /Type /Catalog >>")], &[(0, 2)], "<< /Size 2 /Root 1 0 R >>");
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();

    let doc = Document::open(file.path()).unwrap();
    assert_eq!(doc.version(), (1, 5));
    assert!(doc.root().unwrap().has_type("Catalog"));
}
