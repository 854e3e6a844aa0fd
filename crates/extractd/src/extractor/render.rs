//! Producing the final text stream of a document.
//!
//! Paginated documents are written page by page. A page without native text
//! that may hold images is sent through OCR when a backend is configured, and
//! every page ends with a newline either way. The output passes through the
//! dehyphenation stage unless the document already did that itself.

use crate::core::io::write_output;
use crate::core::mime::PDF_MIME_TYPE;
use crate::document::{Document, NOT_PAGINATED};
use crate::ocr::OcrBackend;
use crate::pdf::PdfImageIndex;
use crate::text::{Dehyphenator, Outcome};
use crate::{ExtractdError, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Render `document` into `out` and hand the writer back once everything is flushed.
pub async fn render<W>(document: &mut dyn Document, ocr: Option<&dyn OcrBackend>, out: W) -> Result<W>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    if document.is_dehyphenated() {
        let mut out = out;
        document.stream_text(&mut out).await?;
        out.flush().await.map_err(ExtractdError::Output)?;
        return Ok(out);
    }

    let mut stage = Dehyphenator::spawn(out);
    let produced = write_pages(document, ocr, stage.input()).await;
    let finished = stage.finish().await;

    match (produced, finished) {
        (_, Err(e)) => Err(e),
        (Err(e), Ok(_)) => Err(e),
        (Ok(()), Ok((out, outcome))) => {
            if outcome == Outcome::Passthrough {
                tracing::debug!(mime_type = document.mime_type(), "dehyphenation fell back to passthrough");
            }
            Ok(out)
        }
    }
}

async fn write_pages(
    document: &mut dyn Document,
    ocr: Option<&dyn OcrBackend>,
    out: &mut (dyn AsyncWrite + Send + Unpin),
) -> Result<()> {
    let page_count = document.page_count();
    if page_count == NOT_PAGINATED {
        return document.stream_text(out).await;
    }

    let mut images = PageImages::default();
    for index in 0..usize::try_from(page_count).unwrap_or(0) {
        let page = document.text_of_page(index)?;
        write_output(out, page.text.as_bytes()).await?;

        if let Some(ocr) = ocr
            && page.may_contain_images
            && page.text.trim().is_empty()
        {
            let mut first = true;
            for image in images.for_page(&*document, index).await {
                match ocr.recognize(&image).await {
                    Ok(text) if !text.trim().is_empty() => {
                        if !first {
                            write_output(out, b"\n").await?;
                        }
                        write_output(out, text.trim_end().as_bytes()).await?;
                        first = false;
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(page = index, backend = ocr.name(), "OCR failed: {}", e),
                }
            }
        }

        write_output(out, b"\n").await?;
    }
    Ok(())
}

/// Images of the current document, loaded on first use.
#[derive(Default)]
enum PageImages {
    #[default]
    Unloaded,
    Pdf(PdfImageIndex),
    Unavailable,
}

impl PageImages {
    async fn for_page(&mut self, document: &dyn Document, index: usize) -> Vec<Vec<u8>> {
        let mime_type = document.mime_type();

        if mime_type.starts_with("image/") {
            return match payload(document).await {
                Ok(bytes) => vec![bytes],
                Err(e) => {
                    tracing::warn!(page = index, "Could not read image payload: {}", e);
                    Vec::new()
                }
            };
        }

        if mime_type != PDF_MIME_TYPE {
            tracing::debug!(mime_type, page = index, "no image extraction for this format");
            return Vec::new();
        }

        if matches!(self, PageImages::Unloaded) {
            *self = match load_pdf_images(document).await {
                Ok(index) => PageImages::Pdf(index),
                Err(e) => {
                    tracing::warn!("PDF image extraction failed: {}", e);
                    PageImages::Unavailable
                }
            };
        }

        match self {
            PageImages::Pdf(images) => images.images(index).iter().map(|image| image.data.clone()).collect(),
            _ => Vec::new(),
        }
    }
}

async fn payload(document: &dyn Document) -> Result<Vec<u8>> {
    if let Some(bytes) = document.raw_data() {
        return Ok(bytes.to_vec());
    }
    match document.source_path() {
        Some(path) => Ok(tokio::fs::read(path).await?),
        None => Err(ExtractdError::validation("document has neither bytes nor a path")),
    }
}

async fn load_pdf_images(document: &dyn Document) -> Result<PdfImageIndex> {
    let bytes = payload(document).await?;
    let index = tokio::task::spawn_blocking(move || PdfImageIndex::load(&bytes))
        .await
        .map_err(|e| ExtractdError::Other(format!("image extraction task failed: {}", e)))??;
    Ok(index)
}
