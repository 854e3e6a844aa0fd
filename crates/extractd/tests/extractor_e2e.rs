//! End-to-end pipeline tests against a local origin server.

#![cfg(all(feature = "api", unix))]

mod common;

use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use axum::Router;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use common::{files_in, shell_worker, test_config};
use extractd::ExtractdError;
use extractd::cache::{Cache, FsCache, cache_key};
use extractd::core::ServiceConfig;
use extractd::document::Metadata;
use extractd::extractor::{ExtractParams, Extractor, HeaderSink, status};
use extractd::factory::DocumentFactory;
use tokio::io::AsyncWrite;

const ETAG: &str = "\"v1\"";

fn memo(padding: usize) -> Vec<u8> {
    format!(
        r"{{\rtf1{{\info{{\title Memo}}}}Quarterly report{{\*\pad {}}}\par}}",
        "x".repeat(padding)
    )
    .into_bytes()
}

#[derive(Default)]
struct Origin {
    requests: AtomicUsize,
    conditional: AtomicUsize,
}

/// Serves `/memo.rtf` (small) and `/large.rtf` with an ETag, honouring If-None-Match.
async fn origin() -> (String, Arc<Origin>) {
    let counters = Arc::new(Origin::default());

    async fn serve(counters: Arc<Origin>, headers: HeaderMap, body: Vec<u8>) -> Response {
        counters.requests.fetch_add(1, Ordering::SeqCst);
        if headers.get(header::IF_NONE_MATCH).is_some_and(|v| v == ETAG) {
            counters.conditional.fetch_add(1, Ordering::SeqCst);
            return (StatusCode::NOT_MODIFIED, [(header::ETAG, ETAG)]).into_response();
        }
        (StatusCode::OK, [(header::ETAG, ETAG)], body).into_response()
    }

    let small = Arc::clone(&counters);
    let large = Arc::clone(&counters);
    let app = Router::new()
        .route(
            "/memo.rtf",
            get(move |headers: HeaderMap| serve(Arc::clone(&small), headers, memo(10))),
        )
        .route(
            "/large.rtf",
            get(move |headers: HeaderMap| serve(Arc::clone(&large), headers, memo(4000))),
        )
        .route("/missing", get(|| async { StatusCode::NOT_FOUND }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), counters)
}

#[derive(Default)]
struct Recorder(Vec<(u16, Metadata)>);

impl HeaderSink for Recorder {
    fn send_headers(&mut self, status: u16, metadata: &Metadata) {
        self.0.push((status, metadata.clone()));
    }
}

/// Writer whose peer has gone away.
struct Disconnected;

impl AsyncWrite for Disconnected {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &[u8]) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "client gone")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

struct Harness {
    extractor: Extractor,
    cache: Arc<FsCache>,
}

fn harness(config: &ServiceConfig, cache_dir: &Path, factory: DocumentFactory) -> Harness {
    let cache = Arc::new(FsCache::new(cache_dir).unwrap());
    let extractor = Extractor::from_parts(config, Arc::new(factory), Arc::clone(&cache) as Arc<dyn Cache>, None).unwrap();
    Harness { extractor, cache }
}

fn small_config(temp: &Path) -> ServiceConfig {
    test_config(temp, 1024, 1 << 20)
}

async fn extract(extractor: &Extractor, params: &ExtractParams) -> (extractd::Result<u16>, Recorder, String) {
    let mut recorder = Recorder::default();
    let (writer, mut reader) = tokio::io::duplex(1 << 16);
    let result = extractor.doc_from_url(params, writer, &mut recorder).await;
    let mut text = String::new();
    tokio::io::AsyncReadExt::read_to_string(&mut reader, &mut text).await.unwrap();
    (result, recorder, text)
}

/// A fresh fetch streams text, announces metadata, and is saved in the background.
#[tokio::test]
async fn test_fetch_extract_and_cache() {
    let (base, _) = origin().await;
    let temp = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    let config = small_config(temp.path());
    let h = harness(&config, cache_dir.path(), DocumentFactory::new(&config).unwrap());

    let url = format!("{base}/memo.rtf");
    let (result, recorder, text) = extract(&h.extractor, &ExtractParams::new(&url)).await;

    assert_eq!(result.unwrap(), status::OK);
    assert!(text.contains("Quarterly report"));
    let (code, metadata) = &recorder.0[0];
    assert_eq!(*code, status::OK);
    assert_eq!(metadata["title"], "Memo");
    assert_eq!(metadata["etag"], ETAG);
    assert_eq!(metadata["content-type"], "application/rtf");

    h.extractor.shutdown().await;
    let cached = h.cache.get_metadata(&url).await.unwrap().unwrap();
    assert_eq!(cached["etag"], ETAG);
    let mut cached_text = Vec::new();
    h.cache.stream_cached_text(&url, &mut cached_text).await.unwrap();
    assert_eq!(String::from_utf8(cached_text).unwrap(), text);
}

/// A validated cache entry is served from the cache, or as headers only in silent mode.
#[tokio::test]
async fn test_not_modified_served_from_cache() {
    let (base, counters) = origin().await;
    let temp = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    let config = small_config(temp.path());
    let url = format!("{base}/memo.rtf");

    let first = harness(&config, cache_dir.path(), DocumentFactory::new(&config).unwrap());
    let (_, _, original) = extract(&first.extractor, &ExtractParams::new(&url)).await;
    first.extractor.shutdown().await;

    let second = harness(&config, cache_dir.path(), DocumentFactory::new(&config).unwrap());
    let (result, recorder, text) = extract(&second.extractor, &ExtractParams::new(&url)).await;
    assert_eq!(result.unwrap(), status::OK);
    assert_eq!(text, original);
    assert_eq!(recorder.0[0].1["title"], "Memo");
    assert_eq!(counters.conditional.load(Ordering::SeqCst), 1);

    let mut silent = ExtractParams::new(&url);
    silent.silent = true;
    let (result, recorder, text) = extract(&second.extractor, &silent).await;
    assert_eq!(result.unwrap(), status::NOT_MODIFIED);
    assert_eq!(recorder.0[0].0, status::NOT_MODIFIED);
    assert!(text.is_empty());
    assert_eq!(counters.requests.load(Ordering::SeqCst), 3);
    second.extractor.shutdown().await;
}

/// When the cached text is gone the request falls back to an unconditional fetch.
#[tokio::test]
async fn test_unreadable_cache_refetches() {
    let (base, counters) = origin().await;
    let temp = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    let config = small_config(temp.path());
    let url = format!("{base}/memo.rtf");

    let first = harness(&config, cache_dir.path(), DocumentFactory::new(&config).unwrap());
    extract(&first.extractor, &ExtractParams::new(&url)).await;
    first.extractor.shutdown().await;

    std::fs::remove_file(cache_dir.path().join(format!("{}.txt", cache_key(&url)))).unwrap();

    let second = harness(&config, cache_dir.path(), DocumentFactory::new(&config).unwrap());
    let (result, _, text) = extract(&second.extractor, &ExtractParams::new(&url)).await;
    assert_eq!(result.unwrap(), status::OK);
    assert!(text.contains("Quarterly report"));
    assert_eq!(counters.conditional.load(Ordering::SeqCst), 1);
    assert_eq!(counters.requests.load(Ordering::SeqCst), 3);
    second.extractor.shutdown().await;
}

/// `no_cache` neither consults nor fills the cache.
#[tokio::test]
async fn test_no_cache_skips_save() {
    let (base, _) = origin().await;
    let temp = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    let config = small_config(temp.path());
    let h = harness(&config, cache_dir.path(), DocumentFactory::new(&config).unwrap());

    let mut params = ExtractParams::new(format!("{base}/memo.rtf"));
    params.no_cache = true;
    let (result, _, text) = extract(&h.extractor, &params).await;
    assert_eq!(result.unwrap(), status::OK);
    assert!(text.contains("Quarterly report"));

    h.extractor.shutdown().await;
    assert_eq!(h.cache.stats().unwrap().entries, 0);
}

/// A spilled payload's temp file is gone once the background save has run.
#[tokio::test]
async fn test_spilled_temp_file_removed_after_save() {
    let (base, _) = origin().await;
    let temp = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    let config = small_config(temp.path());
    let h = harness(&config, cache_dir.path(), DocumentFactory::new(&config).unwrap());

    let (result, _, text) = extract(&h.extractor, &ExtractParams::new(format!("{base}/large.rtf"))).await;
    assert_eq!(result.unwrap(), status::OK);
    assert!(text.contains("Quarterly report"));

    h.extractor.shutdown().await;
    assert!(files_in(temp.path()).is_empty());
    assert_eq!(h.cache.stats().unwrap().entries, 1);
}

/// Declared sizes above the fork threshold are parsed by a worker.
#[tokio::test]
async fn test_large_declared_size_forks() {
    let (base, _) = origin().await;
    let temp = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    let mut config = small_config(temp.path());
    config.ingest.fork_threshold_bytes = 10;
    let factory = DocumentFactory::new(&config)
        .unwrap()
        .with_fork_command(shell_worker(r#"cat >/dev/null; printf '{"title":"Forked"}\n'; printf 'from worker'"#));
    let h = harness(&config, cache_dir.path(), factory);

    let (result, recorder, text) = extract(&h.extractor, &ExtractParams::new(format!("{base}/memo.rtf"))).await;
    assert_eq!(result.unwrap(), status::OK);
    assert_eq!(text, "from worker");
    assert_eq!(recorder.0[0].1["title"], "Forked");
    assert_eq!(recorder.0[0].1["etag"], ETAG);
    h.extractor.shutdown().await;
}

/// Origin errors surface before any header is announced.
#[tokio::test]
async fn test_origin_error_sends_no_headers() {
    let (base, _) = origin().await;
    let temp = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    let config = small_config(temp.path());
    let h = harness(&config, cache_dir.path(), DocumentFactory::new(&config).unwrap());

    let (result, recorder, text) = extract(&h.extractor, &ExtractParams::new(format!("{base}/missing"))).await;
    let err = result.unwrap_err();
    assert_eq!(err.status_code(), 404);
    assert!(recorder.0.is_empty());
    assert!(text.is_empty());
    h.extractor.shutdown().await;
}

/// A client that disconnects mid-stream gets nothing cached and no temp file left behind.
#[tokio::test]
async fn test_disconnected_client_not_cached() {
    let (base, _) = origin().await;
    let temp = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    let config = small_config(temp.path());
    let h = harness(&config, cache_dir.path(), DocumentFactory::new(&config).unwrap());

    let mut recorder = Recorder::default();
    let err = h
        .extractor
        .doc_from_url(&ExtractParams::new(format!("{base}/large.rtf")), Disconnected, &mut recorder)
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractdError::Output(_)));
    assert_eq!(err.status_code(), status::CLIENT_GONE);
    assert_eq!(recorder.0.len(), 1);

    h.extractor.shutdown().await;
    assert_eq!(h.cache.stats().unwrap().entries, 0);
    assert!(files_in(temp.path()).is_empty());
}
