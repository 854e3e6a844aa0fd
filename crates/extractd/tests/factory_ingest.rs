//! Integration tests for size-routed ingestion.

mod common;

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use common::{files_in, rtf_of_len, test_config};
use extractd::ExtractdError;
use extractd::extractor::postprocess::release;
use extractd::factory::{DocumentFactory, IngestMode, UNKNOWN_SIZE};
use tokio::io::{AsyncRead, ReadBuf};

const BUFFER: usize = 64;

fn factory(dir: &std::path::Path) -> DocumentFactory {
    DocumentFactory::new(&test_config(dir, BUFFER, 4096)).unwrap()
}

/// Reader that counts the bytes handed out.
struct CountingReader<R> {
    inner: R,
    read: Arc<AtomicUsize>,
}

impl<R: AsyncRead + Unpin> AsyncRead for CountingReader<R> {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let result = Pin::new(&mut self.inner).poll_read(cx, buf);
        self.read.fetch_add(buf.filled().len() - before, Ordering::SeqCst);
        result
    }
}

async fn text_of(document: &mut dyn extractd::document::Document) -> String {
    let mut out = Vec::new();
    document.stream_text(&mut out).await.unwrap();
    String::from_utf8(out).unwrap()
}

/// An unknown-size stream that ends exactly at the buffer size stays in memory.
#[tokio::test]
async fn test_unknown_size_at_buffer_size_stays_in_memory() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(dir.path());
    let payload = rtf_of_len(BUFFER);

    let mut reader = &payload[..];
    let mut doc = factory
        .ingest_stream(&mut reader, UNKNOWN_SIZE, "test://exact", IngestMode::InProcess)
        .await
        .unwrap();

    assert!(doc.raw_data().is_some());
    assert!(doc.temp_file().is_none());
    assert!(files_in(dir.path()).is_empty());
    assert!(text_of(doc.as_mut()).await.contains("Hello"));
}

/// One byte past the buffer and the payload is spilled to a temp file.
#[tokio::test]
async fn test_unknown_size_past_buffer_spills() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(dir.path());
    let payload = rtf_of_len(BUFFER + 1);

    let mut reader = &payload[..];
    let mut doc = factory
        .ingest_stream(&mut reader, UNKNOWN_SIZE, "test://over", IngestMode::InProcess)
        .await
        .unwrap();

    let temp = doc.temp_file().expect("spilled payload").to_path_buf();
    assert!(temp.starts_with(dir.path()));
    assert_eq!(std::fs::read(&temp).unwrap(), payload);
    assert!(text_of(doc.as_mut()).await.contains("Hello"));

    release(doc.as_mut()).await;
    assert!(!temp.exists());
}

/// Known sizes above the in-memory limit go straight to disk.
#[tokio::test]
async fn test_declared_size_above_limit_spills() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(dir.path());
    let payload = rtf_of_len(BUFFER * 3);

    let mut reader = &payload[..];
    let mut doc = factory
        .ingest_stream(&mut reader, payload.len() as i64, "test://big", IngestMode::InProcess)
        .await
        .unwrap();

    assert!(doc.raw_data().is_none());
    let temp = doc.temp_file().unwrap().to_path_buf();
    assert_eq!(std::fs::metadata(&temp).unwrap().len(), payload.len() as u64);

    release(doc.as_mut()).await;
    assert!(files_in(dir.path()).is_empty());
}

/// A declared size over the hard limit is rejected before the stream is touched.
#[tokio::test]
async fn test_too_large_reads_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(dir.path());
    let read = Arc::new(AtomicUsize::new(0));
    let payload = rtf_of_len(100);
    let mut reader = CountingReader {
        inner: &payload[..],
        read: Arc::clone(&read),
    };

    let err = factory
        .ingest_stream(&mut reader, 4097, "test://huge", IngestMode::InProcess)
        .await
        .err().unwrap();

    assert!(matches!(err, ExtractdError::TooLarge { declared: 4097, limit: 4096 }));
    assert_eq!(err.status_code(), 413);
    assert_eq!(read.load(Ordering::SeqCst), 0);
}

/// An unknown-size stream that keeps going past the hard limit is cut off and its spill removed.
#[tokio::test]
async fn test_unknown_size_over_limit_removes_spill() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(dir.path());
    let payload = rtf_of_len(5000);

    let mut reader = &payload[..];
    let err = factory
        .ingest_stream(&mut reader, UNKNOWN_SIZE, "test://endless", IngestMode::InProcess)
        .await
        .err().unwrap();

    assert!(matches!(err, ExtractdError::TooLarge { .. }));
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_zero_length() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(dir.path());

    let mut empty = &b""[..];
    assert!(matches!(
        factory
            .ingest_stream(&mut empty, 0, "test://zero", IngestMode::InProcess)
            .await,
        Err(ExtractdError::ZeroLength)
    ));

    let mut empty = &b""[..];
    assert!(matches!(
        factory
            .ingest_stream(&mut empty, UNKNOWN_SIZE, "test://empty", IngestMode::InProcess)
            .await,
        Err(ExtractdError::ZeroLength)
    ));
}

/// Short reads from the transport are reassembled.
#[tokio::test]
async fn test_chunked_stream() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(dir.path());
    let mut reader = tokio_test::io::Builder::new()
        .read(br"{\rtf1 Chun")
        .read(br"ked ")
        .read(br"body\par}")
        .build();

    let mut doc = factory
        .ingest_stream(&mut reader, UNKNOWN_SIZE, "test://chunks", IngestMode::InProcess)
        .await
        .unwrap();
    assert!(text_of(doc.as_mut()).await.contains("Chunked body"));
}

/// A stream shorter than its declared size is a validation failure.
#[tokio::test]
async fn test_truncated_stream() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(dir.path());

    let payload = rtf_of_len(40);
    let mut reader = &payload[..];
    let err = factory
        .ingest_stream(&mut reader, 50, "test://short", IngestMode::InProcess)
        .await
        .err().unwrap();
    assert!(matches!(err, ExtractdError::Validation { .. }));

    let payload = rtf_of_len(100);
    let mut reader = &payload[..];
    let err = factory
        .ingest_stream(&mut reader, 200, "test://short-spill", IngestMode::InProcess)
        .await
        .err().unwrap();
    assert!(matches!(err, ExtractdError::Validation { .. }));
    assert!(files_in(dir.path()).is_empty());
}

/// Unrecognised content fails with a short escaped prefix, and any spill is removed.
#[tokio::test]
async fn test_unsupported_spill_removed() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(dir.path());
    let payload = vec![b'z'; 500];

    let mut reader = &payload[..];
    let err = factory
        .ingest_stream(&mut reader, payload.len() as i64, "test://junk", IngestMode::InProcess)
        .await
        .err().unwrap();

    assert_eq!(err.status_code(), 415);
    assert!(files_in(dir.path()).is_empty());
}

/// Local files are read in place and never copied.
#[tokio::test]
async fn test_ingest_path_keeps_file() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(dir.path());
    let source = dir.path().join("memo.rtf");
    std::fs::write(&source, rtf_of_len(300)).unwrap();

    let mut doc = factory.ingest_path(&source, "memo.rtf").await.unwrap();
    assert_eq!(doc.source_path(), Some(source.as_path()));
    assert!(doc.temp_file().is_none());
    assert!(text_of(doc.as_mut()).await.contains("Hello"));

    release(doc.as_mut()).await;
    assert!(source.exists());
}
