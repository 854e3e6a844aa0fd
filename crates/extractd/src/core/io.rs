//! Stream and temp-file helpers shared by ingestion, the worker protocol and the pipeline.
//!
//! Writes to a caller-supplied output are mapped to [`ExtractdError::Output`] so the
//! extractor can tell a disconnected client apart from a failing source.

use crate::{ExtractdError, Result};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Write `bytes` to the request output.
pub async fn write_output<W>(out: &mut W, bytes: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    out.write_all(bytes).await.map_err(ExtractdError::Output)
}

/// Copy `reader` into `out` until end of stream.
///
/// Read failures surface as `Io`, write failures as `Output`.
pub async fn pump<R, W>(reader: &mut R, out: &mut W) -> Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }
        write_output(out, &buf[..n]).await?;
        total += n as u64;
    }
}

/// Read from `reader` until `buf` is full or the stream ends. Returns the filled length.
pub async fn fill_buffer<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Path for a new spill file inside `dir`.
pub fn temp_file_path(dir: &Path, suffix: &str) -> PathBuf {
    dir.join(format!("extractd-{}.{}", uuid::Uuid::new_v4(), suffix))
}

/// RAII guard removing a temporary file unless it is kept.
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Disarm the guard and hand back the path; the caller now owns the file.
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.armed
            && let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::debug!("Failed to remove temp file {}: {}", self.path.display(), e);
        }
    }
}

/// Delete a spilled file, ignoring files that are already gone.
pub async fn remove_temp_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed temp file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove temp file"),
    }
}
