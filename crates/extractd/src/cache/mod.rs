//! Result cache collaborators.
//!
//! The extraction pipeline only needs three operations: look up the metadata
//! saved for a URL (its validators drive conditional fetches), stream the text
//! saved for it, and save a finished extraction. Reads that fail are treated by
//! callers as misses; saves are retried by the post-processing worker.

pub mod fs;
pub mod noop;

pub use fs::{CacheStats, FsCache};
pub use noop::NoopCache;

use crate::Result;
use crate::core::config::{CacheBackend, CacheConfig};
use crate::document::{Document, Metadata};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::io::AsyncWrite;

/// A finished extraction on its way to the cache.
pub struct ExtractedDocument {
    pub url: String,
    pub metadata: Metadata,
    /// Exactly the bytes that were written to the client.
    pub text: Vec<u8>,
    pub document: Box<dyn Document>,
}

impl std::fmt::Debug for ExtractedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractedDocument")
            .field("url", &self.url)
            .field("metadata", &self.metadata)
            .field("text_len", &self.text.len())
            .field("mime_type", &self.document.mime_type())
            .finish()
    }
}

/// What a save stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveInfo {
    pub key: String,
    pub bytes: u64,
}

#[async_trait]
pub trait Cache: Send + Sync {
    fn name(&self) -> &str;

    /// Saved metadata for `url`, or `None` when nothing is cached.
    async fn get_metadata(&self, url: &str) -> Result<Option<Metadata>>;

    /// Copy the saved text for `url` into `out`. Fails when nothing is cached.
    async fn stream_cached_text(&self, url: &str, out: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<()>;

    async fn save(&self, document: &ExtractedDocument) -> Result<SaveInfo>;
}

/// Cache key for a URL: hex SHA-256, identical across processes and builds.
pub fn cache_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Build the configured cache backend.
pub fn from_config(config: &CacheConfig) -> Result<Arc<dyn Cache>> {
    match config.backend {
        CacheBackend::None => Ok(Arc::new(NoopCache)),
        CacheBackend::Filesystem => {
            let cache = FsCache::new(&config.directory)?;
            tracing::info!(directory = %config.directory.display(), "Filesystem cache enabled");
            Ok(Arc::new(cache))
        }
    }
}
