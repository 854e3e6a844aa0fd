//! Document factory: size-based ingestion routing and format dispatch.
//!
//! An input of declared or unknown size ends up in one of three places:
//!
//! - a pooled buffer, for known sizes up to `max_in_memory_bytes`
//! - a temp file, for known sizes above it
//! - a pooled buffer first, for unknown sizes, spilling to a temp file only when
//!   the stream outgrows the buffer
//!
//! Heap growth per in-flight request is therefore bounded by the buffer size no
//! matter how large the payload is. The resulting [`Backing`] is then sniffed and
//! handed to the matching collaborator, or to a worker process when forking is
//! requested or the exclusive PDF engine is busy.

use crate::core::config::{FormatsConfig, IngestConfig, ServiceConfig};
use crate::core::io::{TempFile, fill_buffer, remove_temp_file, temp_file_path};
use crate::core::mime::{Format, detect_format};
use crate::document::{Backing, Document};
use crate::error::SNIPPET_LEN;
use crate::extraction::{image, legacy_word, office, rtf};
use crate::fork::{ForkCommand, ForkedDocument};
use crate::pdf::{PdfBackend, PdfLoad};
use crate::utils::pool::BufferPool;
use crate::{ExtractdError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

const SPILL_CHUNK: usize = 64 * 1024;

/// Size value meaning "unknown" for [`DocumentFactory::ingest_stream`].
pub const UNKNOWN_SIZE: i64 = -1;

/// Where extraction runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IngestMode {
    #[default]
    InProcess,
    /// Delegate the whole extraction to a worker process.
    Fork,
}

pub struct DocumentFactory {
    ingest: IngestConfig,
    formats: FormatsConfig,
    pool: BufferPool,
    backend: Arc<PdfBackend>,
    fork: Option<ForkCommand>,
    ocr_enabled: bool,
}

impl DocumentFactory {
    /// Build a factory from configuration, loading the PDF engine.
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        config.validate()?;
        let backend = Arc::new(PdfBackend::select(&config.pdf)?);
        Ok(Self::with_backend(config, backend))
    }

    /// Build a factory around an already selected backend.
    pub fn with_backend(config: &ServiceConfig, backend: Arc<PdfBackend>) -> Self {
        let fork = match ForkCommand::from_config(config) {
            Ok(command) => Some(command),
            Err(e) => {
                tracing::warn!("Worker forking unavailable: {}", e);
                None
            }
        };
        Self {
            ingest: config.ingest.clone(),
            formats: config.formats.clone(),
            pool: BufferPool::new(config.ingest.pool_capacity, config.ingest.max_in_memory_bytes),
            backend,
            fork,
            ocr_enabled: config.ocr.enabled,
        }
    }

    pub fn with_fork_command(mut self, command: ForkCommand) -> Self {
        self.fork = Some(command);
        self
    }

    /// Disable delegation to worker processes. Used inside the worker itself.
    pub fn without_fork(mut self) -> Self {
        self.fork = None;
        self
    }

    pub fn backend(&self) -> &Arc<PdfBackend> {
        &self.backend
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn ingest_config(&self) -> &IngestConfig {
        &self.ingest
    }

    pub fn ocr_enabled(&self) -> bool {
        self.ocr_enabled
    }

    pub fn can_fork(&self) -> bool {
        self.fork.is_some()
    }

    /// Ingest a stream of `declared_size` bytes, or [`UNKNOWN_SIZE`].
    ///
    /// Oversized and empty declarations fail before any byte is read.
    pub async fn ingest_stream<R>(
        &self,
        reader: &mut R,
        declared_size: i64,
        origin: &str,
        mode: IngestMode,
    ) -> Result<Box<dyn Document>>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let limit = self.ingest.max_file_size_bytes;
        if let Ok(declared) = u64::try_from(declared_size)
            && declared > limit
        {
            return Err(ExtractdError::TooLarge { declared, limit });
        }
        if declared_size == 0 {
            return Err(ExtractdError::ZeroLength);
        }

        let backing = match u64::try_from(declared_size) {
            Err(_) => self.read_unknown(reader, origin).await?,
            Ok(declared) if declared > self.ingest.max_in_memory_bytes as u64 => {
                tracing::debug!(origin, declared, "streaming large payload to disk");
                Backing::TempFile(self.spill(reader, &[], Some(declared), origin).await?)
            }
            Ok(declared) => self.read_known(reader, declared as usize).await?,
        };

        self.build(backing, origin, mode).await
    }

    /// Ingest an in-memory payload.
    pub async fn ingest_bytes(&self, data: Vec<u8>, origin: &str) -> Result<Box<dyn Document>> {
        if data.is_empty() {
            return Err(ExtractdError::ZeroLength);
        }
        let limit = self.ingest.max_file_size_bytes;
        if data.len() as u64 > limit {
            return Err(ExtractdError::TooLarge {
                declared: data.len() as u64,
                limit,
            });
        }
        self.build(Backing::Owned(data), origin, IngestMode::InProcess).await
    }

    /// Ingest a caller-owned file. The file is never deleted.
    pub async fn ingest_path(&self, path: &Path, origin: &str) -> Result<Box<dyn Document>> {
        let size = tokio::fs::metadata(path).await?.len();
        if size == 0 {
            return Err(ExtractdError::ZeroLength);
        }
        let limit = self.ingest.max_file_size_bytes;
        if size > limit {
            return Err(ExtractdError::TooLarge { declared: size, limit });
        }
        self.build(Backing::File(path.to_path_buf()), origin, IngestMode::InProcess)
            .await
    }

    /// Release pooled buffers and any extracted engine library.
    pub fn shutdown(&self) {
        self.pool.free();
        self.backend.cleanup();
    }

    async fn read_known<R>(&self, reader: &mut R, len: usize) -> Result<Backing>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let (mut buffer, pool_error) = self.pool.get();
        if let Some(e) = pool_error {
            tracing::warn!("Buffer pool fell back to heap: {}", e);
        }
        reader.read_exact(&mut buffer[..len]).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ExtractdError::validation_with_source(format!("stream ended before the declared {} bytes", len), e)
            } else {
                ExtractdError::Io(e)
            }
        })?;
        Ok(Backing::Pooled { buffer, len })
    }

    /// Fill a pooled buffer; spill to disk only if the stream is longer than it.
    ///
    /// A stream that ends exactly at the buffer size stays in memory: after the
    /// buffer fills, a one-byte lookahead read decides.
    async fn read_unknown<R>(&self, reader: &mut R, origin: &str) -> Result<Backing>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let (mut buffer, pool_error) = self.pool.get();
        if let Some(e) = pool_error {
            tracing::warn!("Buffer pool fell back to heap: {}", e);
        }

        let filled = fill_buffer(reader, &mut buffer[..]).await?;
        if filled < buffer.len() {
            if filled == 0 {
                return Err(ExtractdError::ZeroLength);
            }
            return Ok(Backing::Pooled { buffer, len: filled });
        }

        let mut lookahead = [0u8; 1];
        if reader.read(&mut lookahead).await? == 0 {
            return Ok(Backing::Pooled { buffer, len: filled });
        }

        tracing::debug!(origin, buffered = filled, "unknown-size stream outgrew its buffer; spilling");
        let path = self.spill(reader, &[&buffer[..filled], &lookahead], None, origin).await?;
        drop(buffer);
        Ok(Backing::TempFile(path))
    }

    /// Write `prefix` and the rest of `reader` to a new temp file.
    async fn spill<R>(&self, reader: &mut R, prefix: &[&[u8]], expected: Option<u64>, origin: &str) -> Result<PathBuf>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let limit = self.ingest.max_file_size_bytes;
        let guard = TempFile::new(temp_file_path(&self.ingest.temp_dir(), "spill"));
        let mut file = tokio::fs::File::create(guard.path()).await?;

        let mut total = 0u64;
        for chunk in prefix {
            file.write_all(chunk).await?;
            total += chunk.len() as u64;
        }

        let mut buf = vec![0u8; SPILL_CHUNK];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            total += n as u64;
            if total > limit {
                return Err(ExtractdError::TooLarge { declared: total, limit });
            }
            file.write_all(&buf[..n]).await?;
        }
        file.flush().await?;
        drop(file);

        if let Some(expected) = expected
            && total != expected
        {
            return Err(ExtractdError::validation(format!(
                "stream carried {} bytes but {} were declared",
                total, expected
            )));
        }

        tracing::debug!(origin, bytes = total, path = %guard.path().display(), "spilled payload to disk");
        Ok(guard.keep())
    }

    /// Turn a backing into a document. A spilled temp file is removed if this fails.
    pub async fn build(&self, backing: Backing, origin: &str, mode: IngestMode) -> Result<Box<dyn Document>> {
        let temp_file = backing.temp_file().map(Path::to_path_buf);
        let result = match mode {
            IngestMode::Fork => self.fork(backing, origin).await,
            IngestMode::InProcess => self.dispatch(backing, origin).await,
        };
        if let Err(e) = &result {
            tracing::debug!(origin, error = %e, "document construction failed");
            if let Some(path) = temp_file {
                remove_temp_file(&path).await;
            }
        }
        result
    }

    async fn fork(&self, backing: Backing, origin: &str) -> Result<Box<dyn Document>> {
        let command = self
            .fork
            .as_ref()
            .ok_or_else(|| ExtractdError::SelfForkUnavailable("worker forking is disabled".to_string()))?;
        let document = ForkedDocument::spawn(command, backing, origin).await?;
        Ok(Box::new(document))
    }

    async fn dispatch(&self, backing: Backing, origin: &str) -> Result<Box<dyn Document>> {
        let head = backing.head().await?;
        let prefix = head[..head.len().min(SNIPPET_LEN)].to_vec();
        let format = detect_format(&head);
        drop(head);

        let Some(format) = format else {
            return Err(ExtractdError::unsupported("could not detect content type", &prefix));
        };
        tracing::debug!(origin, mime_type = format.mime_type(), "detected format");

        match format {
            Format::Pdf => {
                let backend = Arc::clone(&self.backend);
                let loaded = tokio::task::spawn_blocking(move || backend.try_load(backing))
                    .await
                    .map_err(|e| ExtractdError::Other(format!("PDF task failed: {}", e)))??;
                match loaded {
                    PdfLoad::Loaded(document) => Ok(Box::new(document)),
                    PdfLoad::Busy(backing) => {
                        tracing::debug!(origin, "PDF engine busy; delegating to a worker");
                        self.fork(backing, origin).await
                    }
                }
            }
            Format::OfficeContainer => blocking(move || office::load(backing, &prefix)).await,
            Format::Rtf => blocking(move || Ok(Box::new(rtf::load(backing)?) as Box<dyn Document>)).await,
            Format::LegacyWord => {
                let document = legacy_word::load(
                    backing,
                    &self.formats.legacy_word_tool,
                    self.formats.tool_timeout(),
                    &self.ingest.temp_dir(),
                )
                .await?;
                Ok(Box::new(document))
            }
            Format::Image(mime_type) if self.ocr_enabled => {
                blocking(move || Ok(Box::new(image::load(backing, mime_type)?) as Box<dyn Document>)).await
            }
            Format::Image(mime_type) => Err(ExtractdError::unsupported(
                format!("{} needs OCR, which is disabled", mime_type),
                &prefix,
            )),
        }
    }
}

impl std::fmt::Debug for DocumentFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentFactory")
            .field("ingest", &self.ingest)
            .field("backend", &self.backend)
            .field("fork", &self.fork)
            .field("ocr_enabled", &self.ocr_enabled)
            .finish()
    }
}

async fn blocking<F>(load: F) -> Result<Box<dyn Document>>
where
    F: FnOnce() -> Result<Box<dyn Document>> + Send + 'static,
{
    tokio::task::spawn_blocking(load)
        .await
        .map_err(|e| ExtractdError::Other(format!("extraction task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PdfConfig;

    fn factory(max_in_memory: usize, max_file: u64) -> DocumentFactory {
        let mut config = ServiceConfig::default();
        config.ingest.max_in_memory_bytes = max_in_memory;
        config.ingest.max_file_size_bytes = max_file;
        config.pdf = PdfConfig {
            engine: "lopdf".to_string(),
            ..Default::default()
        };
        DocumentFactory::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_ingest_bytes_rtf() {
        let factory = factory(64, 1024);
        let doc = factory
            .ingest_bytes(br"{\rtf1 Hello\par}".to_vec(), "test://rtf")
            .await
            .unwrap();
        assert_eq!(doc.mime_type(), "application/rtf");
        assert!(doc.raw_data().is_some());
    }

    #[tokio::test]
    async fn test_unsupported_error_quotes_prefix_only() {
        let factory = factory(64, 1 << 20);
        let payload = "plain text that no collaborator understands ".repeat(100);
        let err = factory
            .ingest_bytes(payload.into_bytes(), "test://plain")
            .await
            .err().unwrap();
        match err {
            ExtractdError::UnsupportedFormat { snippet, .. } => {
                assert!(snippet.starts_with("plain text"));
                assert!(snippet.len() <= SNIPPET_LEN);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_image_without_ocr_is_unsupported() {
        let factory = factory(64, 1 << 20);
        let png = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR".to_vec();
        assert!(matches!(
            factory.ingest_bytes(png, "test://png").await,
            Err(ExtractdError::UnsupportedFormat { .. })
        ));
    }

    #[tokio::test]
    async fn test_fork_mode_without_command_fails() {
        let factory = factory(64, 1024).without_fork();
        let mut reader = &b"%PDF-1.4"[..];
        assert!(matches!(
            factory.ingest_stream(&mut reader, 8, "test://fork", IngestMode::Fork).await,
            Err(ExtractdError::SelfForkUnavailable(_))
        ));
    }
}
