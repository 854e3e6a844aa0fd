//! Pure-Rust PDF engine built on lopdf.

use super::backend::PdfBackendDescriptor;
use super::engine::{ParsedPdf, PdfEngine, decode_text_string, insert_metadata};
use super::error::Result;
use crate::document::{Metadata, PageText};
use lopdf::{Document, Object};
use std::path::Path;

const INFO_KEYS: [(&[u8], &str); 8] = [
    (b"Title", "title"),
    (b"Author", "author"),
    (b"Subject", "subject"),
    (b"Keywords", "keywords"),
    (b"Creator", "creator"),
    (b"Producer", "producer"),
    (b"CreationDate", "created"),
    (b"ModDate", "modified"),
];

#[derive(Debug, Default)]
pub struct LopdfEngine;

impl LopdfEngine {
    pub fn new() -> Self {
        Self
    }
}

impl PdfEngine for LopdfEngine {
    fn descriptor(&self) -> PdfBackendDescriptor {
        PdfBackendDescriptor {
            name: "lopdf".to_string(),
            description: "lopdf pure-Rust PDF parser".to_string(),
            library_path: None,
            owns_library_file: false,
        }
    }

    fn exclusive(&self) -> bool {
        false
    }

    fn load(&self, bytes: &[u8]) -> Result<ParsedPdf> {
        let document = Document::load_mem(bytes)?;
        parse_document(&document)
    }

    fn open(&self, path: &Path) -> Result<ParsedPdf> {
        let document = Document::load(path)?;
        parse_document(&document)
    }
}

fn parse_document(document: &Document) -> Result<ParsedPdf> {
    let pages = document.get_pages();
    let mut parsed = Vec::with_capacity(pages.len());
    for (number, page_id) in pages {
        let text = match document.extract_text(&[number]) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!("Page {} text extraction failed: {}", number, e);
                String::new()
            }
        };
        let may_contain_images = document
            .get_page_images(page_id)
            .map(|images| !images.is_empty())
            .unwrap_or(false);
        parsed.push(PageText::new(text.trim_end().to_string(), may_contain_images));
    }

    Ok(ParsedPdf {
        pages: parsed,
        metadata: info_metadata(document),
    })
}

fn info_metadata(document: &Document) -> Metadata {
    let mut metadata = Metadata::new();
    let info = match document.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => document.get_dictionary(*id).ok(),
        Ok(Object::Dictionary(dict)) => Some(dict),
        _ => None,
    };
    let Some(info) = info else {
        return metadata;
    };

    for (key, name) in INFO_KEYS {
        if let Ok(Object::String(bytes, _)) = info.get(key) {
            insert_metadata(&mut metadata, name, &decode_text_string(bytes));
        }
    }
    metadata
}
