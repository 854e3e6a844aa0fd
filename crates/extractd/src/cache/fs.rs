//! Directory-backed cache.
//!
//! Each URL maps to two files named after its key: `<key>.meta` holds a
//! MessagePack record (URL, metadata, text length, save time) and `<key>.txt`
//! the extracted text. Both are written under a temporary name and renamed, and
//! the text is written first, so a reader that finds the record also finds the
//! complete text it describes.

use super::{Cache, ExtractedDocument, SaveInfo, cache_key};
use crate::core::io::{pump, temp_file_path};
use crate::document::Metadata;
use crate::{ExtractdError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWrite;

const META_EXTENSION: &str = "meta";
const TEXT_EXTENSION: &str = "txt";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryRecord {
    url: String,
    metadata: Metadata,
    text_len: u64,
    saved_at: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct FsCache {
    directory: PathBuf,
}

impl FsCache {
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory).map_err(|e| {
            ExtractdError::cache_with_source(
                format!("Failed to create cache directory {}", directory.display()),
                e,
            )
        })?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn entry_path(&self, key: &str, extension: &str) -> PathBuf {
        self.directory.join(format!("{}.{}", key, extension))
    }

    async fn read_record(&self, url: &str) -> Result<Option<EntryRecord>> {
        let path = self.entry_path(&cache_key(url), META_EXTENSION);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ExtractdError::cache_with_source("Failed to read cache record", e)),
        };
        let record: EntryRecord = rmp_serde::from_slice(&bytes)
            .map_err(|e| ExtractdError::cache_with_source(format!("Corrupt cache record {}", path.display()), e))?;
        if record.url != url {
            tracing::debug!(url, cached = %record.url, "cache key collision");
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// Write `bytes` to `target` through a temporary sibling.
    async fn write_atomic(&self, target: &Path, bytes: &[u8]) -> Result<()> {
        let staging = temp_file_path(&self.directory, "partial");
        if let Err(e) = tokio::fs::write(&staging, bytes).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(ExtractdError::cache_with_source("Failed to write cache file", e));
        }
        tokio::fs::rename(&staging, target).await.map_err(|e| {
            let _ = std::fs::remove_file(&staging);
            ExtractdError::cache_with_source("Failed to publish cache file", e)
        })
    }

    /// Count entries and their on-disk size. Blocking.
    pub fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        for entry in std::fs::read_dir(&self.directory)? {
            let entry = entry?;
            let path = entry.path();
            let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
                continue;
            };
            if extension != META_EXTENSION && extension != TEXT_EXTENSION {
                continue;
            }
            if extension == META_EXTENSION {
                stats.entries += 1;
            }
            stats.total_bytes += entry.metadata()?.len();
        }
        Ok(stats)
    }

    /// Remove every entry. Returns the number of files removed and the bytes freed. Blocking.
    pub fn clear(&self) -> Result<(usize, u64)> {
        let mut removed = 0;
        let mut freed = 0;
        for entry in std::fs::read_dir(&self.directory)? {
            let path = entry?.path();
            let known = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == META_EXTENSION || ext == TEXT_EXTENSION);
            if !known {
                continue;
            }
            let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    removed += 1;
                    freed += size;
                }
                Err(e) => tracing::debug!("Failed to remove cache file {}: {}", path.display(), e),
            }
        }
        Ok((removed, freed))
    }
}

#[async_trait]
impl Cache for FsCache {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn get_metadata(&self, url: &str) -> Result<Option<Metadata>> {
        Ok(self.read_record(url).await?.map(|record| record.metadata))
    }

    async fn stream_cached_text(&self, url: &str, out: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<()> {
        let record = self
            .read_record(url)
            .await?
            .ok_or_else(|| ExtractdError::cache(format!("nothing cached for {}", url)))?;

        let path = self.entry_path(&cache_key(url), TEXT_EXTENSION);
        let mut file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| ExtractdError::cache_with_source(format!("Cached text missing for {}", url), e))?;
        let len = file.metadata().await?.len();
        if len != record.text_len {
            return Err(ExtractdError::cache(format!(
                "Cached text for {} has {} bytes, record says {}",
                url, len, record.text_len
            )));
        }

        pump(&mut file, out).await?;
        Ok(())
    }

    async fn save(&self, document: &ExtractedDocument) -> Result<SaveInfo> {
        let key = cache_key(&document.url);
        let record = EntryRecord {
            url: document.url.clone(),
            metadata: document.metadata.clone(),
            text_len: document.text.len() as u64,
            saved_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        };
        let encoded = rmp_serde::to_vec_named(&record)?;

        self.write_atomic(&self.entry_path(&key, TEXT_EXTENSION), &document.text)
            .await?;
        self.write_atomic(&self.entry_path(&key, META_EXTENSION), &encoded)
            .await?;

        tracing::debug!(url = %document.url, key = %key, bytes = document.text.len(), "saved to cache");
        Ok(SaveInfo {
            bytes: record.text_len,
            key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Backing, TextDocument};

    fn extracted(url: &str, text: &str) -> ExtractedDocument {
        let mut metadata = Metadata::new();
        metadata.insert("etag".to_string(), "\"v1\"".to_string());
        metadata.insert("title".to_string(), "Cached".to_string());
        ExtractedDocument {
            url: url.to_string(),
            metadata,
            text: text.as_bytes().to_vec(),
            document: Box::new(TextDocument::new(
                "application/rtf",
                text.to_string(),
                Metadata::new(),
                Backing::Released,
            )),
        }
    }

    #[tokio::test]
    async fn test_save_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path()).unwrap();
        let url = "https://example.com/doc.pdf";

        let info = cache.save(&extracted(url, "hello cache\n")).await.unwrap();
        assert_eq!(info.bytes, 12);

        let metadata = cache.get_metadata(url).await.unwrap().unwrap();
        assert_eq!(metadata["etag"], "\"v1\"");
        assert_eq!(metadata["title"], "Cached");

        let mut out = Vec::new();
        cache.stream_cached_text(url, &mut out).await.unwrap();
        assert_eq!(out, b"hello cache\n");
    }

    #[tokio::test]
    async fn test_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path()).unwrap();
        assert!(cache.get_metadata("https://nope").await.unwrap().is_none());
        let mut out = Vec::new();
        assert!(cache.stream_cached_text("https://nope", &mut out).await.is_err());
    }

    #[tokio::test]
    async fn test_truncated_text_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path()).unwrap();
        let url = "https://example.com/t";
        cache.save(&extracted(url, "full text")).await.unwrap();
        std::fs::write(cache.entry_path(&cache_key(url), TEXT_EXTENSION), b"full").unwrap();

        let mut out = Vec::new();
        let err = cache.stream_cached_text(url, &mut out).await.unwrap_err();
        assert!(matches!(err, ExtractdError::Cache { .. }));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path()).unwrap();
        let url = "https://example.com/c";
        std::fs::write(cache.entry_path(&cache_key(url), META_EXTENSION), b"\xc1garbage").unwrap();
        assert!(cache.get_metadata(url).await.is_err());
    }

    #[tokio::test]
    async fn test_stats_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path()).unwrap();
        cache.save(&extracted("https://a", "aaa")).await.unwrap();
        cache.save(&extracted("https://b", "bbbb")).await.unwrap();
        std::fs::write(dir.path().join("unrelated.bin"), b"x").unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.entries, 2);
        assert!(stats.total_bytes >= 7);

        let (removed, freed) = cache.clear().unwrap();
        assert_eq!(removed, 4);
        assert!(freed >= 7);
        assert_eq!(cache.stats().unwrap(), CacheStats::default());
        assert!(dir.path().join("unrelated.bin").exists());
    }
}
