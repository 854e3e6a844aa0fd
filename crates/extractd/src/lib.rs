//! extractd - document text extraction service
//!
//! extractd fetches documents by URL, extracts their plain text and metadata and
//! streams the result back while caching it in the background. PDF, DOCX, PPTX,
//! RTF, legacy Word and (with OCR) scanned images are supported.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use extractd::core::ServiceConfig;
//! use extractd::factory::{DocumentFactory, IngestMode, UNKNOWN_SIZE};
//!
//! # async fn example() -> extractd::Result<()> {
//! let factory = DocumentFactory::new(&ServiceConfig::default())?;
//! let mut input = tokio::io::stdin();
//! let mut document = factory
//!     .ingest_stream(&mut input, UNKNOWN_SIZE, "stdin", IngestMode::InProcess)
//!     .await?;
//! println!("{} pages", document.page_count());
//! document.close();
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Factory** (`factory`): size-routed ingestion into pooled buffers or temp files, then format dispatch
//! - **PDF** (`pdf`): runtime-selected engine behind a non-blocking exclusivity guard
//! - **Fork** (`fork`): worker processes speaking a header-line-plus-text protocol
//! - **Extractor** (`extractor`): conditional fetch, OCR interleave, dehyphenation and cache hand-off
//! - **Cache** (`cache`): no-op and filesystem backends
//! - **API** (`api`): Axum HTTP server

#![deny(unsafe_code)]

pub mod cache;
pub mod core;
pub mod document;
pub mod error;
pub mod extraction;
pub mod extractor;
pub mod factory;
pub mod fork;
pub mod ocr;
pub mod pdf;
pub mod text;
pub mod utils;

#[cfg(feature = "api")]
pub mod api;

pub use error::{ExtractdError, Result};
