use crate::Result;
use crate::core::mime::SNIFF_LEN;
use crate::utils::pool::PooledBuffer;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

/// The resource a document's payload lives in.
#[derive(Debug)]
pub enum Backing {
    /// First `len` bytes of a pooled buffer. Releasing returns the buffer to its pool.
    Pooled { buffer: PooledBuffer, len: usize },
    Owned(Vec<u8>),
    /// Caller-owned file; never deleted by the pipeline.
    File(PathBuf),
    /// File spilled during ingestion; deleted after the document is closed.
    TempFile(PathBuf),
    Released,
}

impl Backing {
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Backing::Pooled { buffer, len } => Some(&buffer[..*len]),
            Backing::Owned(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Backing::File(path) | Backing::TempFile(path) => Some(path),
            _ => None,
        }
    }

    pub fn temp_file(&self) -> Option<&Path> {
        match self {
            Backing::TempFile(path) => Some(path),
            _ => None,
        }
    }

    /// Drop in-memory payloads. File backings keep their path so the temp file can still be removed.
    pub fn release(&mut self) {
        if matches!(self, Backing::Pooled { .. } | Backing::Owned(_)) {
            *self = Backing::Released;
        }
    }

    /// Leading bytes used for format detection.
    pub async fn head(&self) -> Result<Cow<'_, [u8]>> {
        if let Some(bytes) = self.bytes() {
            return Ok(Cow::Borrowed(&bytes[..bytes.len().min(SNIFF_LEN)]));
        }
        match self.path() {
            Some(path) => {
                let file = tokio::fs::File::open(path).await?;
                let mut head = Vec::with_capacity(SNIFF_LEN);
                file.take(SNIFF_LEN as u64).read_to_end(&mut head).await?;
                Ok(Cow::Owned(head))
            }
            None => Ok(Cow::Borrowed(&[])),
        }
    }

    /// Whole payload; reads the file for file backings. Blocking.
    pub fn load(&self) -> Result<Cow<'_, [u8]>> {
        if let Some(bytes) = self.bytes() {
            return Ok(Cow::Borrowed(bytes));
        }
        match self.path() {
            Some(path) => Ok(Cow::Owned(std::fs::read(path)?)),
            None => Ok(Cow::Borrowed(&[])),
        }
    }
}
