//! Conditional HTTP fetching.

use crate::core::config::FetchConfig;
use crate::document::Metadata;
use crate::{ExtractdError, Result};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Chunks buffered between the network task and the reader.
const BODY_CHANNEL_CAPACITY: usize = 4;

pub const ETAG_KEY: &str = "etag";
pub const LAST_MODIFIED_KEY: &str = "last-modified";
pub const CONTENT_LENGTH_KEY: &str = "content-length";

/// Cache validators sent with a conditional request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Validators {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            etag: metadata.get(ETAG_KEY).cloned(),
            last_modified: metadata.get(LAST_MODIFIED_KEY).cloned(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

#[derive(Debug)]
pub enum FetchOutcome {
    /// The origin confirmed the cached validators.
    NotModified,
    Body(FetchedBody),
}

#[derive(Debug)]
pub struct FetchedBody {
    /// Declared length, when the origin sent one.
    pub content_length: Option<u64>,
    /// Transport metadata: entity tag, last-modified and content-length.
    pub metadata: Metadata,
    pub reader: BodyReader,
}

#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ExtractdError::fetch(None, format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// GET `url`, attaching `validators` as conditional headers.
    ///
    /// Transport failures and non-2xx answers are `Fetch` errors. A 304 is only
    /// accepted when validators were sent.
    pub async fn fetch(&self, url: &str, validators: &Validators) -> Result<FetchOutcome> {
        let mut request = self.client.get(url);
        if let Some(etag) = &validators.etag {
            request = request.header(IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = &validators.last_modified {
            request = request.header(IF_MODIFIED_SINCE, last_modified);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExtractdError::fetch(e.status().map(|s| s.as_u16()), e.to_string()))?;
        let status = response.status();
        tracing::debug!(url, status = status.as_u16(), conditional = !validators.is_empty(), "fetched");

        if status == StatusCode::NOT_MODIFIED && !validators.is_empty() {
            return Ok(FetchOutcome::NotModified);
        }
        if !status.is_success() {
            return Err(ExtractdError::fetch(
                Some(status.as_u16()),
                format!("origin answered {} for {}", status, url),
            ));
        }

        let mut metadata = Metadata::new();
        for (name, key) in [(ETAG, ETAG_KEY), (LAST_MODIFIED, LAST_MODIFIED_KEY), (CONTENT_LENGTH, CONTENT_LENGTH_KEY)] {
            if let Some(value) = response.headers().get(name).and_then(|v| v.to_str().ok()) {
                metadata.insert(key.to_string(), value.to_string());
            }
        }
        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        Ok(FetchOutcome::Body(FetchedBody {
            content_length,
            metadata,
            reader: BodyReader::spawn(response),
        }))
    }
}

/// [`AsyncRead`] over a response body.
///
/// A task pulls chunks off the connection into a small channel; dropping the
/// reader aborts the task and with it the connection.
#[derive(Debug)]
pub struct BodyReader {
    chunks: mpsc::Receiver<std::io::Result<Vec<u8>>>,
    current: Vec<u8>,
    offset: usize,
    task: JoinHandle<()>,
}

impl BodyReader {
    fn spawn(mut response: reqwest::Response) -> Self {
        let (tx, chunks) = mpsc::channel(BODY_CHANNEL_CAPACITY);
        let task = tokio::spawn(async move {
            loop {
                let item = match response.chunk().await {
                    Ok(Some(chunk)) => Ok(chunk.to_vec()),
                    Ok(None) => return,
                    Err(e) => Err(std::io::Error::other(e)),
                };
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    return;
                }
            }
        });
        Self {
            chunks,
            current: Vec::new(),
            offset: 0,
            task,
        }
    }
}

impl AsyncRead for BodyReader {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let this = &mut *self;
        loop {
            if this.offset < this.current.len() {
                let n = buf.remaining().min(this.current.len() - this.offset);
                buf.put_slice(&this.current[this.offset..this.offset + n]);
                this.offset += n;
                return Poll::Ready(Ok(()));
            }
            match ready!(this.chunks.poll_recv(cx)) {
                Some(Ok(chunk)) => {
                    this.current = chunk;
                    this.offset = 0;
                }
                Some(Err(e)) => return Poll::Ready(Err(e)),
                None => return Poll::Ready(Ok(())),
            }
        }
    }
}

impl Drop for BodyReader {
    fn drop(&mut self) {
        self.task.abort();
    }
}
