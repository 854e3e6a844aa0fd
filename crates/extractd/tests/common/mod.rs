//! Shared fixtures for integration tests.

#![allow(dead_code)]

use extractd::core::ServiceConfig;
use extractd::core::config::PdfConfig;
use extractd::fork::ForkCommand;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use std::path::{Path, PathBuf};
use std::time::Duration;

const RTF_PREFIX: &str = r"{\rtf1 Hello{\*\pad ";
const RTF_SUFFIX: &str = r"}\par}";

/// An RTF document of exactly `len` bytes whose visible text is "Hello".
pub fn rtf_of_len(len: usize) -> Vec<u8> {
    let overhead = RTF_PREFIX.len() + RTF_SUFFIX.len();
    assert!(len >= overhead, "RTF fixture needs at least {overhead} bytes");
    let doc = format!("{}{}{}", RTF_PREFIX, "x".repeat(len - overhead), RTF_SUFFIX);
    assert_eq!(doc.len(), len);
    doc.into_bytes()
}

/// Configuration with the pure-Rust PDF engine and spills confined to `temp_dir`.
pub fn test_config(temp_dir: &Path, max_in_memory: usize, max_file: u64) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.ingest.max_in_memory_bytes = max_in_memory;
    config.ingest.max_file_size_bytes = max_file;
    config.ingest.pool_capacity = 2;
    config.ingest.temp_dir = Some(temp_dir.to_path_buf());
    config.pdf = PdfConfig {
        engine: "lopdf".to_string(),
        ..Default::default()
    };
    config
}

/// A worker stand-in: `/bin/sh -c <script>` receiving `-` or a path as `$1`.
pub fn shell_worker(script: &str) -> ForkCommand {
    ForkCommand {
        program: PathBuf::from("/bin/sh"),
        args: vec!["-c".to_string(), script.to_string(), "sh".to_string()],
        deadline: Duration::from_secs(30),
        grace: Duration::from_secs(1),
    }
}

/// Files currently in `dir`.
pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect()
}

/// A one-page PDF showing `text` in Courier.
pub fn pdf_with_text(text: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![72.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}
