//! Native PDF engine backed by pdfium.
//!
//! pdfium keeps global library state, so the engine reports itself as exclusive
//! and a fresh binding is created for each parse from the resolved library path.

use super::backend::PdfBackendDescriptor;
use super::bindings::bind_pdfium;
use super::engine::{ParsedPdf, PdfEngine, insert_metadata};
use super::error::{PdfError, Result};
use crate::document::{Metadata, PageText};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};

const METADATA_TAGS: [(PdfDocumentMetadataTagType, &str); 8] = [
    (PdfDocumentMetadataTagType::Title, "title"),
    (PdfDocumentMetadataTagType::Author, "author"),
    (PdfDocumentMetadataTagType::Subject, "subject"),
    (PdfDocumentMetadataTagType::Keywords, "keywords"),
    (PdfDocumentMetadataTagType::Creator, "creator"),
    (PdfDocumentMetadataTagType::Producer, "producer"),
    (PdfDocumentMetadataTagType::CreationDate, "created"),
    (PdfDocumentMetadataTagType::ModificationDate, "modified"),
];

pub struct PdfiumEngine {
    library_path: Option<PathBuf>,
    owns_library_file: bool,
}

impl PdfiumEngine {
    /// Bind the library once up front so a missing engine fails at startup.
    pub fn new(library_path: Option<&Path>) -> Result<Self> {
        let binding = bind_pdfium(library_path)?;
        drop(binding.bindings);
        Ok(Self {
            library_path: binding.library_path,
            owns_library_file: binding.owns_library_file,
        })
    }

    fn pdfium(&self) -> Result<Pdfium> {
        let bindings = match &self.library_path {
            Some(path) => Pdfium::bind_to_library(path)
                .map_err(|e| PdfError::EngineUnavailable(format!("Failed to bind pdfium: {}", e)))?,
            None => bind_pdfium(None)?.bindings,
        };
        Ok(Pdfium::new(bindings))
    }
}

impl PdfEngine for PdfiumEngine {
    fn descriptor(&self) -> PdfBackendDescriptor {
        PdfBackendDescriptor {
            name: "pdfium".to_string(),
            description: "pdfium native PDF library".to_string(),
            library_path: self.library_path.clone(),
            owns_library_file: self.owns_library_file,
        }
    }

    fn exclusive(&self) -> bool {
        true
    }

    fn load(&self, bytes: &[u8]) -> Result<ParsedPdf> {
        let pdfium = self.pdfium()?;
        let document = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(map_load_error)?;
        parse_document(&document)
    }

    fn open(&self, path: &Path) -> Result<ParsedPdf> {
        let pdfium = self.pdfium()?;
        let document = pdfium.load_pdf_from_file(path, None).map_err(map_load_error)?;
        parse_document(&document)
    }
}

fn map_load_error(e: PdfiumError) -> PdfError {
    let err_msg = e.to_string();
    if err_msg.contains("password") || err_msg.contains("Password") {
        PdfError::PasswordRequired
    } else {
        PdfError::InvalidPdf(err_msg)
    }
}

fn parse_document(document: &PdfDocument<'_>) -> Result<ParsedPdf> {
    let mut pages = Vec::with_capacity(document.pages().len() as usize);
    for (index, page) in document.pages().iter().enumerate() {
        let text = page
            .text()
            .map_err(|e| PdfError::TextExtractionFailed(format!("Page {} text extraction failed: {}", index, e)))?
            .all();
        let may_contain_images = page.objects().iter().any(|object| object.as_image_object().is_some());
        pages.push(PageText::new(text.trim_end().to_string(), may_contain_images));
    }

    let mut metadata = Metadata::new();
    let tags = document.metadata();
    for (tag, name) in METADATA_TAGS {
        if let Some(value) = tags.get(tag) {
            insert_metadata(&mut metadata, name, &value.value());
        }
    }

    Ok(ParsedPdf { pages, metadata })
}
