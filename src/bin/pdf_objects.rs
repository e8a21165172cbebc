//! Object-level inspection
//!
//! Prints the version, the trailer, and every in-use object of a file.
//!
//! Usage:
//!   cargo run --bin pdf_objects -- file.pdf
//!   cargo run --bin pdf_objects -- file.pdf --pages

use pdfimage::document::Document;
use pdfimage::object::{Object, ObjectRef};
use pdfimage::parser::Body;
use pdfimage::writer::ObjectSerializer;
use std::path::PathBuf;
use std::process::ExitCode;

struct InspectConfig {
    path: PathBuf,
    pages: bool,
}

impl InspectConfig {
    fn from_args() -> Option<Self> {
        let mut path = None;
        let mut pages = false;

        for arg in std::env::args().skip(1) {
            match arg.as_str() {
                "--pages" => pages = true,
                _ if path.is_none() => path = Some(PathBuf::from(arg)),
                other => eprintln!("Ignoring extra argument {}", other),
            }
        }

        path.map(|path| Self { path, pages })
    }
}

fn describe(doc: &Document, r: ObjectRef) -> String {
    match doc.resolve_shallow(r) {
        Ok(Body::Value(obj)) => match obj.get("Type").and_then(Object::as_name) {
            Some(type_name) => format!("{} /{}", obj.type_name(), type_name),
            None => obj.type_name().to_string(),
        },
        Ok(Body::Stream { dict, data_offset }) => {
            let subtype = dict.get("Subtype").and_then(Object::as_name).unwrap_or("-");
            format!("stream /{} (payload at byte {})", subtype, data_offset)
        },
        Err(e) => format!("error: {}", e),
    }
}

fn run(config: &InspectConfig) -> pdfimage::Result<()> {
    let doc = Document::open(&config.path)?;
    let serializer = ObjectSerializer::compact();
    let (major, minor) = doc.version();

    println!("version {}.{}", major, minor);
    println!(
        "trailer {}",
        serializer.serialize_to_string(&Object::Dictionary(doc.trailer().clone()))
    );

    for id in doc.object_ids() {
        let Some(entry) = doc.xref().get(id) else {
            continue;
        };
        let r = ObjectRef::new(id, entry.generation);
        println!("{:>6} {:>5} @{:<10} {}", id, entry.generation, entry.offset, describe(&doc, r));
    }

    if config.pages {
        for (i, page) in doc.page_refs()?.iter().enumerate() {
            println!("page {} -> {}", i + 1, page);
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let Some(config) = InspectConfig::from_args() else {
        eprintln!("Usage: pdf_objects <file.pdf> [--pages]");
        return ExitCode::from(2);
    };

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            if let Some(offset) = e.offset() {
                eprintln!("  at byte {}", offset);
            }
            ExitCode::FAILURE
        },
    }
}
