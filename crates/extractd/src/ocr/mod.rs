//! OCR backends used when a page has no native text but carries images.
//!
//! The pipeline treats every OCR failure as a per-image warning, so backends
//! report errors as [`ExtractdError::Ocr`](crate::ExtractdError::Ocr) and never
//! need to recover on their own.

pub mod tesseract;

pub use tesseract::TesseractCli;

use crate::Result;
use crate::core::config::OcrConfig;
use async_trait::async_trait;
use std::sync::Arc;

/// Recognizes text in a single encoded image (PNG, JPEG, TIFF, ...).
#[async_trait]
pub trait OcrBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn recognize(&self, image: &[u8]) -> Result<String>;
}

/// The configured backend, or `None` when OCR is disabled.
pub fn from_config(config: &OcrConfig) -> Option<Arc<dyn OcrBackend>> {
    config
        .enabled
        .then(|| Arc::new(TesseractCli::from_config(config)) as Arc<dyn OcrBackend>)
}
