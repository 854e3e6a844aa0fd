//! Background persistence of finished extractions.
//!
//! A single task drains a bounded channel in arrival order. For every item it
//! closes the document, deletes a spilled temp file and then tries to save to
//! the cache a fixed number of times. The request that produced the item has
//! already succeeded, so a save that never works is only logged.

use crate::cache::{Cache, ExtractedDocument};
use crate::core::io::remove_temp_file;
use crate::document::Document;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::timeout;

pub const SAVE_ATTEMPTS: usize = 5;
pub const SAVE_TIMEOUT: Duration = Duration::from_secs(3);

pub struct PostProcessor {
    tx: Mutex<Option<mpsc::Sender<ExtractedDocument>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PostProcessor {
    /// Start the worker. Must be called inside a Tokio runtime.
    pub fn spawn(cache: Arc<dyn Cache>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<ExtractedDocument>(capacity.max(1));
        let task = tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                process(cache.as_ref(), item).await;
            }
            tracing::debug!("post-processing channel closed");
        });
        Self {
            tx: Mutex::new(Some(tx)),
            task: Mutex::new(Some(task)),
        }
    }

    /// Queue an item without waiting. Returns false when it could not be queued;
    /// the document is then released without being cached.
    pub fn submit(&self, item: ExtractedDocument) -> bool {
        let rejected = match self.tx.lock().as_ref() {
            Some(tx) => match tx.try_send(item) {
                Ok(()) => return true,
                Err(TrySendError::Full(item)) => {
                    tracing::warn!(url = %item.url, "post-processing queue full; result not cached");
                    item
                }
                Err(TrySendError::Closed(item)) => item,
            },
            None => item,
        };
        tokio::spawn(async move {
            let mut document = rejected.document;
            release(document.as_mut()).await;
        });
        false
    }

    /// Stop accepting items and wait for queued ones to finish.
    pub async fn shutdown(&self) {
        self.tx.lock().take();
        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            tracing::warn!("post-processing task failed: {}", e);
        }
    }
}

impl std::fmt::Debug for PostProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostProcessor")
            .field("open", &self.tx.lock().is_some())
            .finish()
    }
}

/// Close `document` and delete its spilled temp file, if any.
pub async fn release(document: &mut dyn Document) {
    let temp_file = document.temp_file().map(|path| path.to_path_buf());
    document.close();
    if let Some(path) = temp_file {
        remove_temp_file(&path).await;
    }
}

/// Handle one item: release the document, then save with bounded retries.
pub async fn process(cache: &dyn Cache, mut item: ExtractedDocument) {
    release(item.document.as_mut()).await;

    for attempt in 1..=SAVE_ATTEMPTS {
        match timeout(SAVE_TIMEOUT, cache.save(&item)).await {
            Ok(Ok(info)) => {
                tracing::debug!(url = %item.url, key = %info.key, bytes = info.bytes, attempt, "cached extraction");
                return;
            }
            Ok(Err(e)) => tracing::warn!(url = %item.url, attempt, "cache save failed: {}", e),
            Err(_) => tracing::warn!(url = %item.url, attempt, "cache save timed out"),
        }
    }
    tracing::debug!(url = %item.url, attempts = SAVE_ATTEMPTS, "giving up on cache save");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SaveInfo;
    use crate::document::{Backing, Metadata, TextDocument};
    use crate::{ExtractdError, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncWrite;

    #[derive(Default)]
    struct FlakyCache {
        failures: usize,
        attempts: AtomicUsize,
        saved: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Cache for FlakyCache {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn get_metadata(&self, _url: &str) -> Result<Option<Metadata>> {
            Ok(None)
        }

        async fn stream_cached_text(&self, _url: &str, _out: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<()> {
            Err(ExtractdError::cache("unused"))
        }

        async fn save(&self, document: &ExtractedDocument) -> Result<SaveInfo> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failures {
                return Err(ExtractdError::cache("backend down"));
            }
            self.saved.lock().push(document.url.clone());
            Ok(SaveInfo {
                key: document.url.clone(),
                bytes: document.text.len() as u64,
            })
        }
    }

    fn item(url: &str, backing: Backing) -> ExtractedDocument {
        ExtractedDocument {
            url: url.to_string(),
            metadata: Metadata::new(),
            text: b"text".to_vec(),
            document: Box::new(TextDocument::new("application/rtf", "text".to_string(), Metadata::new(), backing)),
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let cache = FlakyCache {
            failures: 3,
            ..Default::default()
        };
        process(&cache, item("https://a", Backing::Released)).await;
        assert_eq!(cache.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(*cache.saved.lock(), vec!["https://a".to_string()]);
    }

    #[tokio::test]
    async fn test_gives_up_after_five_attempts() {
        let cache = FlakyCache {
            failures: usize::MAX,
            ..Default::default()
        };
        process(&cache, item("https://a", Backing::Released)).await;
        assert_eq!(cache.attempts.load(Ordering::SeqCst), SAVE_ATTEMPTS);
        assert!(cache.saved.lock().is_empty());
    }

    #[tokio::test]
    async fn test_temp_file_removed_before_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spill.tmp");
        std::fs::write(&path, b"{\\rtf1 x}").unwrap();

        let cache = FlakyCache::default();
        process(&cache, item("https://t", Backing::TempFile(path.clone()))).await;
        assert!(!path.exists());
        assert_eq!(cache.saved.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_worker_preserves_order() {
        let cache = Arc::new(FlakyCache::default());
        let processor = PostProcessor::spawn(cache.clone(), 8);
        for i in 0..5 {
            assert!(processor.submit(item(&format!("https://{i}"), Backing::Released)));
        }
        processor.shutdown().await;
        let expected: Vec<String> = (0..5).map(|i| format!("https://{i}")).collect();
        assert_eq!(*cache.saved.lock(), expected);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_releases_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.tmp");
        std::fs::write(&path, b"x").unwrap();

        let processor = PostProcessor::spawn(Arc::new(FlakyCache::default()), 1);
        processor.shutdown().await;
        assert!(!processor.submit(item("https://late", Backing::TempFile(path.clone()))));

        for _ in 0..50 {
            if !path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!path.exists());
    }
}
