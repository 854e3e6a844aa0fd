//! API request and response types.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::extractor::Extractor;
use crate::pdf::PdfBackendDescriptor;

/// Request body limit applied to every route.
///
/// The extract route takes its input from the query string, so the default is
/// small. Override with `EXTRACTD_MAX_REQUEST_BODY_BYTES`.
#[derive(Debug, Clone, Copy)]
pub struct ApiSizeLimits {
    pub max_request_body_bytes: usize,
}

impl Default for ApiSizeLimits {
    fn default() -> Self {
        Self {
            max_request_body_bytes: 1024 * 1024,
        }
    }
}

impl ApiSizeLimits {
    pub fn new(max_request_body_bytes: usize) -> Self {
        Self { max_request_body_bytes }
    }
}

/// Query string of `GET /extract`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractQuery {
    pub url: String,
    /// Bypass the cache for lookup and save.
    #[serde(default)]
    pub nocache: bool,
    /// Answer a validated cache hit with headers only (304).
    #[serde(default)]
    pub silent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Server information response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoResponse {
    pub version: String,
    pub pdf_backend: PdfBackendInfo,
    pub cache_backend: String,
    pub ocr_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfBackendInfo {
    pub name: String,
    pub description: String,
    pub library_path: Option<String>,
    pub owns_library_file: bool,
    pub exclusive: bool,
}

impl PdfBackendInfo {
    pub fn new(descriptor: &PdfBackendDescriptor, exclusive: bool) -> Self {
        Self {
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            library_path: descriptor
                .library_path
                .as_ref()
                .map(|path| path.display().to_string()),
            owns_library_file: descriptor.owns_library_file,
            exclusive,
        }
    }
}

/// Error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error class, e.g. `TooLarge` or `Fetch`
    pub error_type: String,
    pub message: String,
    pub status_code: u16,
}

/// Shared state of the router.
#[derive(Debug, Clone)]
pub struct ApiState {
    pub extractor: Arc<Extractor>,
}
