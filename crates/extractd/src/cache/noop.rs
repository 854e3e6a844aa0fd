use super::{Cache, ExtractedDocument, SaveInfo, cache_key};
use crate::document::Metadata;
use crate::{ExtractdError, Result};
use async_trait::async_trait;
use tokio::io::AsyncWrite;

/// Cache that stores nothing. Every lookup misses and every save succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

#[async_trait]
impl Cache for NoopCache {
    fn name(&self) -> &str {
        "none"
    }

    async fn get_metadata(&self, _url: &str) -> Result<Option<Metadata>> {
        Ok(None)
    }

    async fn stream_cached_text(&self, url: &str, _out: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<()> {
        Err(ExtractdError::cache(format!("nothing cached for {}", url)))
    }

    async fn save(&self, document: &ExtractedDocument) -> Result<SaveInfo> {
        Ok(SaveInfo {
            key: cache_key(&document.url),
            bytes: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Backing, TextDocument};

    #[tokio::test]
    async fn test_noop_misses_and_accepts() {
        let cache = NoopCache;
        assert!(cache.get_metadata("https://example.com").await.unwrap().is_none());

        let mut out = Vec::new();
        assert!(cache.stream_cached_text("https://example.com", &mut out).await.is_err());
        assert!(out.is_empty());

        let doc = ExtractedDocument {
            url: "https://example.com".to_string(),
            metadata: Metadata::new(),
            text: b"text".to_vec(),
            document: Box::new(TextDocument::new(
                "application/rtf",
                String::new(),
                Metadata::new(),
                Backing::Released,
            )),
        };
        assert_eq!(cache.save(&doc).await.unwrap().bytes, 0);
    }
}
