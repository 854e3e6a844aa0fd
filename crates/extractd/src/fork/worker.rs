//! Child side of the worker protocol.
//!
//! The worker ingests one document with forking disabled, writes the metadata
//! header line and then the fully rendered text. Any error is returned to the
//! binary, which exits nonzero so the parent sees the failure when it waits.

use super::command::WorkerInput;
use super::protocol::write_header;
use crate::core::io::remove_temp_file;
use crate::document::Document;
use crate::extractor::render::render;
use crate::factory::{DocumentFactory, IngestMode, UNKNOWN_SIZE};
use crate::ocr::OcrBackend;
use crate::Result;
use tokio::io::{AsyncRead, AsyncWrite};

/// Run one extraction. `stdin` is only read for [`WorkerInput::Stdin`].
///
/// The factory should be built with [`DocumentFactory::without_fork`] so that a
/// worker never spawns workers of its own.
pub async fn run_worker<R, W>(
    factory: &DocumentFactory,
    ocr: Option<&dyn OcrBackend>,
    input: WorkerInput,
    mut stdin: R,
    out: W,
) -> Result<W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let mut document = match &input {
        WorkerInput::Stdin => {
            factory
                .ingest_stream(&mut stdin, UNKNOWN_SIZE, "stdin", IngestMode::InProcess)
                .await?
        }
        WorkerInput::Path(path) => factory.ingest_path(path, &path.display().to_string()).await?,
    };
    tracing::debug!(mime_type = document.mime_type(), pages = document.page_count(), "worker ingested document");

    let result = emit(document.as_mut(), ocr, out).await;

    let temp_file = document.temp_file().map(|path| path.to_path_buf());
    document.close();
    if let Some(path) = temp_file {
        remove_temp_file(&path).await;
    }
    result
}

async fn emit<W>(document: &mut dyn Document, ocr: Option<&dyn OcrBackend>, mut out: W) -> Result<W>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    write_header(&mut out, document.metadata()).await?;
    render(document, ocr, out).await
}
