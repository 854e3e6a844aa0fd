//! API server setup and configuration.

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use axum::{Router, extract::DefaultBodyLimit, routing::get};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::core::ServiceConfig;
use crate::extractor::Extractor;
use crate::{ExtractdError, Result};

use super::{
    handlers::{extract_handler, health_handler, info_handler},
    types::{ApiSizeLimits, ApiState},
};

/// Read the request body limit from `EXTRACTD_MAX_REQUEST_BODY_BYTES`.
///
/// Falls back to the default when unset, unparsable or zero.
fn parse_size_limits_from_env() -> ApiSizeLimits {
    if let Ok(value) = std::env::var("EXTRACTD_MAX_REQUEST_BODY_BYTES") {
        match value.parse::<usize>() {
            Ok(bytes) if bytes > 0 => {
                tracing::info!("Request body limit configured from environment: {} bytes", bytes);
                return ApiSizeLimits::new(bytes);
            }
            _ => tracing::warn!(
                "Failed to parse EXTRACTD_MAX_REQUEST_BODY_BYTES='{}', must be a positive integer",
                value
            ),
        }
    }
    ApiSizeLimits::default()
}

fn cors_layer() -> CorsLayer {
    if let Ok(origins_str) = std::env::var("EXTRACTD_CORS_ORIGINS") {
        let origins: Vec<_> = origins_str
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
            .collect();

        if !origins.is_empty() {
            tracing::info!("CORS configured with {} explicit allowed origin(s)", origins.len());
            return CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any);
        }
        tracing::warn!("EXTRACTD_CORS_ORIGINS set but empty/invalid - falling back to permissive CORS");
    }
    CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
}

/// Create the API router around an existing extractor.
///
/// Public so the routes can be nested into a larger application.
pub fn create_router(extractor: Arc<Extractor>) -> Router {
    create_router_with_limits(extractor, ApiSizeLimits::default())
}

pub fn create_router_with_limits(extractor: Arc<Extractor>, limits: ApiSizeLimits) -> Router {
    let state = ApiState { extractor };

    Router::new()
        .route("/extract", get(extract_handler))
        .route("/health", get(health_handler))
        .route("/info", get(info_handler))
        .layer(DefaultBodyLimit::max(limits.max_request_body_bytes))
        .layer(RequestBodyLimitLayer::new(limits.max_request_body_bytes))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the API server and run until ctrl-c.
///
/// On shutdown the post-processing queue is drained and an extracted engine
/// library is removed.
///
/// ```no_run
/// use extractd::api::serve;
/// use extractd::core::ServiceConfig;
///
/// #[tokio::main]
/// async fn main() -> extractd::Result<()> {
///     let config = ServiceConfig::load(None)?;
///     serve("127.0.0.1", 8000, config).await
/// }
/// ```
pub async fn serve(host: impl AsRef<str>, port: u16, config: ServiceConfig) -> Result<()> {
    let ip: IpAddr = host
        .as_ref()
        .parse()
        .map_err(|e| ExtractdError::validation(format!("Invalid host address: {}", e)))?;
    let addr = SocketAddr::new(ip, port);

    let extractor = Arc::new(Extractor::new(&config)?);
    let app = create_router_with_limits(Arc::clone(&extractor), parse_size_limits_from_env());

    tracing::info!("Starting extractd API server on http://{}:{}", ip, port);
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(ExtractdError::Io)?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ExtractdError::Other(e.to_string()));

    tracing::info!("Shutting down: flushing pending cache saves");
    extractor.shutdown().await;
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
