//! PDF text extraction.
//!
//! Two engines are available: `lopdf` (pure Rust, always built) and `pdfium`
//! (native, behind the `pdfium` feature). [`PdfBackend`] wraps the selected
//! engine with the single-use guard native engines need.

pub mod backend;
pub mod engine;
pub mod error;
pub mod images;
pub mod lopdf_engine;

#[cfg(feature = "pdfium")]
mod bindings;
#[cfg(feature = "bundled-pdfium")]
mod bundled;
#[cfg(feature = "pdfium")]
pub mod pdfium_engine;

pub use backend::{EngineGuard, PdfBackend, PdfBackendDescriptor, PdfLoad};
pub use engine::{ParsedPdf, PdfEngine};
pub use error::PdfError;
pub use images::{PageImage, PdfImageIndex};
pub use lopdf_engine::LopdfEngine;
