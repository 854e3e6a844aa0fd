//! HTTP API for extractd.
//!
//! # Endpoints
//!
//! - `GET /extract?url=<url>[&nocache=true][&silent=true]` - stream the extracted
//!   text of the document at `url`, with its metadata as response headers
//! - `GET /health` - health check
//! - `GET /info` - version and the loaded PDF backend
//!
//! Metadata keys that clash with transport headers (`content-type`,
//! `content-length`, ...) are sent with an `x-origin-` prefix.
//!
//! # cURL Examples
//!
//! ```bash
//! curl -i 'http://localhost:8000/extract?url=https://example.com/report.pdf'
//! curl -i 'http://localhost:8000/extract?url=https://example.com/report.pdf&silent=true'
//! curl http://localhost:8000/info
//! ```

mod error;
mod handlers;
mod server;
mod types;

pub use error::ApiError;
pub use handlers::{ORIGIN_HEADER_PREFIX, metadata_headers};
pub use server::{create_router, create_router_with_limits, serve};
pub use types::{ApiSizeLimits, ApiState, ErrorResponse, ExtractQuery, HealthResponse, InfoResponse, PdfBackendInfo};
