//! The uniform document abstraction produced by the factory.
//!
//! Every format collaborator yields a [`Document`]. Paginated formats expose
//! per-page text through [`Document::text_of_page`]; everything else reports
//! [`NOT_PAGINATED`] and fails page access instead of returning empty text.
//!
//! A document is backed by exactly one resource: in-memory bytes (pooled or
//! owned), a file on disk, or a live worker process. [`Document::close`]
//! releases in-memory resources deterministically; spilled temp files are
//! reported by [`Document::temp_file`] so the owner can delete them after close.

mod backing;

pub use backing::Backing;

use crate::core::io::write_output;
use crate::{ExtractdError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tokio::io::AsyncWrite;

/// Document metadata, surfaced as response headers and cached with the text.
pub type Metadata = HashMap<String, String>;

/// Page count reported by documents without page structure.
pub const NOT_PAGINATED: i32 = -1;

/// Native text of one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageText {
    pub text: String,
    /// Whether the page holds image objects that OCR could read.
    pub may_contain_images: bool,
}

impl PageText {
    pub fn new(text: impl Into<String>, may_contain_images: bool) -> Self {
        Self {
            text: text.into(),
            may_contain_images,
        }
    }
}

#[async_trait]
pub trait Document: Send + Sync {
    /// MIME type of the underlying format.
    fn mime_type(&self) -> &str;

    /// Write the document's full text to `out`.
    async fn stream_text(&mut self, out: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<()>;

    /// Number of pages, or [`NOT_PAGINATED`].
    fn page_count(&self) -> i32 {
        NOT_PAGINATED
    }

    /// Text of page `index` (zero based).
    fn text_of_page(&self, _index: usize) -> Result<PageText> {
        Err(ExtractdError::NotPaginated)
    }

    /// In-memory payload, if the document is memory backed.
    fn raw_data(&self) -> Option<&[u8]>;

    /// On-disk payload, if the document is file backed.
    fn source_path(&self) -> Option<&Path>;

    fn metadata(&self) -> &Metadata;

    /// Spilled temp file that must be removed once the document is closed.
    fn temp_file(&self) -> Option<&Path> {
        None
    }

    /// True when the text stream already went through dehyphenation.
    fn is_dehyphenated(&self) -> bool {
        false
    }

    /// Release the backing resource. Calling it twice is harmless.
    fn close(&mut self);
}

/// Document without page structure: the whole text is known up front.
#[derive(Debug)]
pub struct TextDocument {
    mime_type: &'static str,
    text: String,
    metadata: Metadata,
    backing: Backing,
}

impl TextDocument {
    pub fn new(mime_type: &'static str, text: String, mut metadata: Metadata, backing: Backing) -> Self {
        metadata
            .entry("content-type".to_string())
            .or_insert_with(|| mime_type.to_string());
        Self {
            mime_type,
            text,
            metadata,
            backing,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[async_trait]
impl Document for TextDocument {
    fn mime_type(&self) -> &str {
        self.mime_type
    }

    async fn stream_text(&mut self, out: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<()> {
        write_output(out, self.text.as_bytes()).await?;
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            write_output(out, b"\n").await?;
        }
        Ok(())
    }

    fn raw_data(&self) -> Option<&[u8]> {
        self.backing.bytes()
    }

    fn source_path(&self) -> Option<&Path> {
        self.backing.path()
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn temp_file(&self) -> Option<&Path> {
        self.backing.temp_file()
    }

    fn close(&mut self) {
        self.backing.release();
    }
}

/// Document with per-page text, extracted eagerly.
#[derive(Debug)]
pub struct PagedDocument {
    mime_type: &'static str,
    pages: Vec<PageText>,
    metadata: Metadata,
    backing: Backing,
}

impl PagedDocument {
    pub fn new(mime_type: &'static str, pages: Vec<PageText>, mut metadata: Metadata, backing: Backing) -> Self {
        metadata
            .entry("content-type".to_string())
            .or_insert_with(|| mime_type.to_string());
        metadata.insert("pages".to_string(), pages.len().to_string());
        Self {
            mime_type,
            pages,
            metadata,
            backing,
        }
    }
}

#[async_trait]
impl Document for PagedDocument {
    fn mime_type(&self) -> &str {
        self.mime_type
    }

    async fn stream_text(&mut self, out: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<()> {
        for page in &self.pages {
            write_output(out, page.text.as_bytes()).await?;
            write_output(out, b"\n").await?;
        }
        Ok(())
    }

    fn page_count(&self) -> i32 {
        i32::try_from(self.pages.len()).unwrap_or(i32::MAX)
    }

    fn text_of_page(&self, index: usize) -> Result<PageText> {
        self.pages.get(index).cloned().ok_or_else(|| {
            ExtractdError::validation(format!(
                "page index {} out of range for {} pages",
                index,
                self.pages.len()
            ))
        })
    }

    fn raw_data(&self) -> Option<&[u8]> {
        self.backing.bytes()
    }

    fn source_path(&self) -> Option<&Path> {
        self.backing.path()
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn temp_file(&self) -> Option<&Path> {
        self.backing.temp_file()
    }

    fn close(&mut self) {
        self.backing.release();
    }
}
