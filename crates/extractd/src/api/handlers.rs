//! API request handlers.

use axum::{
    Json,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::ExtractdError;
use crate::document::Metadata;
use crate::extractor::{ExtractParams, HeaderSink, status};

use super::{
    error::ApiError,
    types::{ApiState, ExtractQuery, HealthResponse, InfoResponse, PdfBackendInfo},
};

/// Prefix for metadata keys that collide with transport-level headers.
pub const ORIGIN_HEADER_PREFIX: &str = "x-origin-";

/// Headers whose meaning belongs to this response, not to the extracted document.
const RESERVED_HEADERS: &[&str] = &[
    "connection",
    "content-encoding",
    "content-length",
    "content-type",
    "date",
    "keep-alive",
    "server",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const BODY_PIPE_CAPACITY: usize = 64 * 1024;
const BODY_CHUNK: usize = 16 * 1024;

/// Forwards the pipeline's header announcement to the waiting handler.
struct ChannelSink(Option<oneshot::Sender<(u16, Metadata)>>);

impl HeaderSink for ChannelSink {
    fn send_headers(&mut self, status: u16, metadata: &Metadata) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send((status, metadata.clone()));
        }
    }
}

/// Extract endpoint handler.
///
/// GET /extract?url=...&nocache=...&silent=...
///
/// The extraction runs on its own task. Headers are sent as soon as the
/// document is ingested, and the text streams as it is produced. Errors that
/// happen before the headers become a JSON error response; errors after that
/// abort the body.
pub async fn extract_handler(
    State(state): State<ApiState>,
    Query(query): Query<ExtractQuery>,
) -> Result<Response, ApiError> {
    if query.url.trim().is_empty() {
        return Err(ApiError::validation(ExtractdError::validation("Missing 'url' query parameter")));
    }

    let params = ExtractParams {
        url: query.url,
        no_cache: query.nocache,
        silent: query.silent,
    };
    let (writer, reader) = tokio::io::duplex(BODY_PIPE_CAPACITY);
    let (head_tx, head_rx) = oneshot::channel();
    let extractor = state.extractor.clone();

    let task = tokio::spawn(async move {
        let mut sink = ChannelSink(Some(head_tx));
        let result = extractor.doc_from_url(&params, writer, &mut sink).await;
        if let Err(e) = &result
            && sink.0.is_none()
        {
            if e.is_output_failure() {
                tracing::info!(url = %params.url, status = status::CLIENT_GONE, "client disconnected");
            } else {
                tracing::warn!(url = %params.url, "extraction failed mid-stream: {}", e);
            }
        }
        result
    });

    match head_rx.await {
        Ok((code, metadata)) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::OK);
            let body = if status == StatusCode::NOT_MODIFIED {
                Body::empty()
            } else {
                body_from_pipe(reader, task)
            };
            let mut response = Response::new(body);
            *response.status_mut() = status;
            let headers = response.headers_mut();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
            headers.extend(metadata_headers(&metadata));
            Ok(response)
        }
        Err(_) => match task.await {
            Ok(Err(e)) => Err(ApiError::from(e)),
            Ok(Ok(_)) => Err(ApiError::internal(ExtractdError::Other(
                "extraction finished without a response".to_string(),
            ))),
            Err(e) => Err(ApiError::internal(ExtractdError::Other(format!(
                "extraction task failed: {}",
                e
            )))),
        },
    }
}

/// Stream the pipe as the response body.
///
/// At end of input the extraction task is awaited. If it failed, the body ends
/// with an error instead of a clean EOF and the transfer is aborted.
fn body_from_pipe(reader: DuplexStream, task: JoinHandle<crate::Result<u16>>) -> Body {
    let chunks = futures::stream::unfold(BodyState::Reading(reader, task), |state| async move {
        let BodyState::Reading(mut reader, task) = state else {
            return None;
        };
        let mut buf = vec![0u8; BODY_CHUNK];
        match reader.read(&mut buf).await {
            Ok(0) => match task.await {
                Ok(Ok(_)) => None,
                Ok(Err(e)) => Some((Err(std::io::Error::other(e)), BodyState::Done)),
                Err(e) => Some((Err(std::io::Error::other(e)), BodyState::Done)),
            },
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(buf), BodyState::Reading(reader, task)))
            }
            Err(e) => Some((Err(e), BodyState::Done)),
        }
    });
    Body::from_stream(chunks)
}

enum BodyState {
    Reading(DuplexStream, JoinHandle<crate::Result<u16>>),
    Done,
}

/// Document metadata as response headers.
///
/// Keys are lowercased. Reserved names get [`ORIGIN_HEADER_PREFIX`]; keys or
/// values that are not valid in a header are skipped.
pub fn metadata_headers(metadata: &Metadata) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (key, value) in metadata {
        let key = key.trim().to_ascii_lowercase();
        let name = if RESERVED_HEADERS.contains(&key.as_str()) {
            format!("{}{}", ORIGIN_HEADER_PREFIX, key)
        } else {
            key
        };
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            tracing::debug!(key = %name, "metadata key is not a valid header name");
            continue;
        };
        let Ok(value) = HeaderValue::from_str(value) else {
            tracing::debug!(key = %name, "metadata value is not a valid header value");
            continue;
        };
        headers.insert(name, value);
    }
    headers
}

/// Health check endpoint handler.
///
/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Server info endpoint handler.
///
/// GET /info
pub async fn info_handler(State(state): State<ApiState>) -> Json<InfoResponse> {
    let factory = state.extractor.factory();
    let backend = factory.backend();
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        pdf_backend: PdfBackendInfo::new(backend.descriptor(), backend.is_exclusive()),
        cache_backend: state.extractor.cache().name().to_string(),
        ocr_enabled: factory.ocr_enabled(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_keys_are_prefixed() {
        let mut metadata = Metadata::new();
        metadata.insert("content-type".to_string(), "application/pdf".to_string());
        metadata.insert("Title".to_string(), "Report".to_string());
        metadata.insert("etag".to_string(), "\"v1\"".to_string());

        let headers = metadata_headers(&metadata);
        assert_eq!(headers["x-origin-content-type"], "application/pdf");
        assert_eq!(headers["title"], "Report");
        assert_eq!(headers["etag"], "\"v1\"");
        assert!(headers.get("content-type").is_none());
    }

    #[test]
    fn test_invalid_keys_and_values_are_skipped() {
        let mut metadata = Metadata::new();
        metadata.insert("bad key".to_string(), "x".to_string());
        metadata.insert("multi".to_string(), "line\nvalue".to_string());
        metadata.insert("ok".to_string(), "fine".to_string());

        let headers = metadata_headers(&metadata);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["ok"], "fine");
    }
}
