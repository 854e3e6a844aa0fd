//! The extraction pipeline.
//!
//! [`Extractor::doc_from_url`] ties the pieces together for one request:
//!
//! 1. look up cached metadata and turn it into conditional-request validators
//! 2. fetch; on "not modified" answer from the cache, falling back to an
//!    unconditional fetch when the cached copy cannot be read
//! 3. ingest through the [`DocumentFactory`], in a worker process when the
//!    declared size is above the fork threshold
//! 4. announce headers, then render the text into the caller's writer while
//!    keeping a copy
//! 5. hand the finished extraction to the post-processing worker
//!
//! A failed write to the caller's writer aborts the request and nothing is
//! cached.
//!
//! # Example
//!
//! ```rust,no_run
//! use extractd::core::ServiceConfig;
//! use extractd::extractor::{ExtractParams, Extractor, HeaderSink};
//! use extractd::document::Metadata;
//!
//! struct Print;
//!
//! impl HeaderSink for Print {
//!     fn send_headers(&mut self, status: u16, metadata: &Metadata) {
//!         eprintln!("{status} {metadata:?}");
//!     }
//! }
//!
//! # async fn example() -> extractd::Result<()> {
//! let extractor = Extractor::new(&ServiceConfig::default())?;
//! let params = ExtractParams::new("https://example.com/report.pdf");
//! extractor.doc_from_url(&params, tokio::io::stdout(), &mut Print).await?;
//! extractor.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod fetch;
pub mod postprocess;
pub mod render;
pub mod status;

pub use fetch::{FetchOutcome, FetchedBody, Fetcher, Validators};
pub use postprocess::PostProcessor;
pub use render::render;

use crate::cache::{self, Cache, ExtractedDocument};
use crate::core::config::{IngestConfig, ServiceConfig};
use crate::core::io::write_output;
use crate::document::{Document, Metadata};
use crate::factory::{DocumentFactory, IngestMode, UNKNOWN_SIZE};
use crate::ocr::{self, OcrBackend};
use crate::text::TeeWriter;
use crate::{ExtractdError, Result};
use postprocess::release;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

pub const METADATA_LOOKUP_TIMEOUT: Duration = Duration::from_secs(1);
pub const CACHED_TEXT_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-request options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractParams {
    pub url: String,
    /// Skip the cache for both lookup and save.
    pub no_cache: bool,
    /// Answer a validated cache hit with headers only.
    pub silent: bool,
}

impl ExtractParams {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Receives the response status and metadata before any body byte is written.
pub trait HeaderSink: Send {
    fn send_headers(&mut self, status: u16, metadata: &Metadata);
}

pub struct Extractor {
    factory: Arc<DocumentFactory>,
    fetcher: Fetcher,
    cache: Arc<dyn Cache>,
    post: PostProcessor,
    ocr: Option<Arc<dyn OcrBackend>>,
    ingest: IngestConfig,
}

impl Extractor {
    /// Build every collaborator from configuration. Must be called inside a Tokio runtime.
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let factory = Arc::new(DocumentFactory::new(config)?);
        let cache = cache::from_config(&config.cache)?;
        Self::from_parts(config, factory, cache, ocr::from_config(&config.ocr))
    }

    pub fn from_parts(
        config: &ServiceConfig,
        factory: Arc<DocumentFactory>,
        cache: Arc<dyn Cache>,
        ocr: Option<Arc<dyn OcrBackend>>,
    ) -> Result<Self> {
        Ok(Self {
            fetcher: Fetcher::new(&config.fetch)?,
            post: PostProcessor::spawn(Arc::clone(&cache), config.cache.queue_capacity),
            factory,
            cache,
            ocr,
            ingest: config.ingest.clone(),
        })
    }

    pub fn factory(&self) -> &Arc<DocumentFactory> {
        &self.factory
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    /// Extract the document at `params.url` into `out`.
    ///
    /// Returns the status that was announced to `headers`. Errors carry their own
    /// status through [`ExtractdError::status_code`].
    pub async fn doc_from_url<W>(&self, params: &ExtractParams, out: W, headers: &mut dyn HeaderSink) -> Result<u16>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let url = params.url.as_str();
        let use_cache = !params.no_cache;
        let mut out = out;

        let cached_metadata = if use_cache { self.cached_metadata(url).await } else { None };
        let validators = cached_metadata
            .as_ref()
            .map(Validators::from_metadata)
            .unwrap_or_default();

        let mut outcome = self.fetcher.fetch(url, &validators).await?;
        if matches!(outcome, FetchOutcome::NotModified) {
            if let Some(metadata) = cached_metadata
                && let Some(status) = self.serve_cached(params, metadata, &mut out, headers).await?
            {
                return Ok(status);
            }
            tracing::info!(url, "cached copy unusable; fetching unconditionally");
            outcome = self.fetcher.fetch(url, &Validators::default()).await?;
        }
        let FetchOutcome::Body(body) = outcome else {
            return Err(ExtractdError::fetch(
                Some(status::NOT_MODIFIED),
                "origin answered not modified to an unconditional request",
            ));
        };

        let FetchedBody {
            content_length,
            metadata: transport_metadata,
            mut reader,
        } = body;

        let mode = if self.ingest.exceeds_fork_threshold(content_length) {
            if self.factory.can_fork() {
                IngestMode::Fork
            } else {
                tracing::warn!(url, ?content_length, "above fork threshold but forking is unavailable");
                IngestMode::InProcess
            }
        } else {
            IngestMode::InProcess
        };
        let declared = content_length
            .and_then(|len| i64::try_from(len).ok())
            .unwrap_or(UNKNOWN_SIZE);

        let mut document = self.factory.ingest_stream(&mut reader, declared, url, mode).await?;
        drop(reader);

        let mut metadata = document.metadata().clone();
        metadata.extend(transport_metadata);
        headers.send_headers(status::OK, &metadata);

        if !use_cache {
            let result = render(document.as_mut(), self.ocr.as_deref(), out).await;
            release(document.as_mut()).await;
            return result.map(|_| status::OK);
        }

        match render(document.as_mut(), self.ocr.as_deref(), TeeWriter::new(out)).await {
            Ok(tee) => {
                let (_, text) = tee.into_parts();
                tracing::info!(url, bytes = text.len(), mime_type = document.mime_type(), "extracted");
                self.post.submit(ExtractedDocument {
                    url: params.url.clone(),
                    metadata,
                    text,
                    document,
                });
                Ok(status::OK)
            }
            Err(e) => {
                if e.is_output_failure() {
                    tracing::info!(url, "client went away mid-stream; result not cached");
                }
                release(document.as_mut()).await;
                Err(e)
            }
        }
    }

    /// Extract a local file into `out` without touching the cache. Returns the document metadata.
    pub async fn doc_from_path<W>(&self, path: &Path, out: W) -> Result<Metadata>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let mut document = self.factory.ingest_path(path, &path.display().to_string()).await?;
        let metadata = document.metadata().clone();
        let result = render(document.as_mut(), self.ocr.as_deref(), out).await;
        release(document.as_mut()).await;
        result.map(|_| metadata)
    }

    /// Flush pending cache saves and release process-wide resources.
    pub async fn shutdown(&self) {
        self.post.shutdown().await;
        self.factory.shutdown();
    }

    async fn cached_metadata(&self, url: &str) -> Option<Metadata> {
        match timeout(METADATA_LOOKUP_TIMEOUT, self.cache.get_metadata(url)).await {
            Ok(Ok(metadata)) => metadata,
            Ok(Err(e)) => {
                tracing::warn!(url, "cache metadata lookup failed: {}", e);
                None
            }
            Err(_) => {
                tracing::warn!(url, "cache metadata lookup timed out");
                None
            }
        }
    }

    /// Answer from the cache. `Ok(None)` means the cached text could not be read
    /// and nothing was sent yet.
    async fn serve_cached<W>(
        &self,
        params: &ExtractParams,
        metadata: Metadata,
        out: &mut W,
        headers: &mut dyn HeaderSink,
    ) -> Result<Option<u16>>
    where
        W: AsyncWrite + Send + Unpin,
    {
        if params.silent {
            headers.send_headers(status::NOT_MODIFIED, &metadata);
            return Ok(Some(status::NOT_MODIFIED));
        }

        let mut text = Vec::new();
        match timeout(CACHED_TEXT_TIMEOUT, self.cache.stream_cached_text(&params.url, &mut text)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(url = %params.url, "cached text unreadable: {}", e);
                return Ok(None);
            }
            Err(_) => {
                tracing::warn!(url = %params.url, "cached text read timed out");
                return Ok(None);
            }
        }

        headers.send_headers(status::OK, &metadata);
        write_output(out, &text).await?;
        out.flush().await.map_err(ExtractdError::Output)?;
        tracing::debug!(url = %params.url, bytes = text.len(), "served from cache");
        Ok(Some(status::OK))
    }
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor")
            .field("factory", &self.factory)
            .field("cache", &self.cache.name())
            .field("ocr", &self.ocr.as_ref().map(|ocr| ocr.name().to_string()))
            .finish()
    }
}
