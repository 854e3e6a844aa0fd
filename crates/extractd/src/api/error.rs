//! Mapping library errors onto HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::ExtractdError;

use super::types::ErrorResponse;

/// An [`ExtractdError`] rendered as a JSON error body with its mapped status.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn validation(error: ExtractdError) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, error)
    }

    pub fn internal(error: ExtractdError) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, error)
    }

    fn with_status(status: StatusCode, error: ExtractdError) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error_type: error_type(&error).to_string(),
                message: error.to_string(),
                status_code: status.as_u16(),
            },
        }
    }
}

impl From<ExtractdError> for ApiError {
    fn from(error: ExtractdError) -> Self {
        let status = StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!("Request failed: {}", error);
        } else {
            tracing::debug!("Request rejected: {}", error);
        }
        Self::with_status(status, error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn error_type(error: &ExtractdError) -> &'static str {
    match error {
        ExtractdError::Io(_) => "Io",
        ExtractdError::Parsing { .. } => "Parsing",
        ExtractdError::Ocr { .. } => "Ocr",
        ExtractdError::Validation { .. } => "Validation",
        ExtractdError::Cache { .. } => "Cache",
        ExtractdError::Serialization { .. } => "Serialization",
        ExtractdError::Subprocess { .. } => "Subprocess",
        ExtractdError::TooLarge { .. } => "TooLarge",
        ExtractdError::ZeroLength => "ZeroLength",
        ExtractdError::UnsupportedFormat { .. } => "UnsupportedFormat",
        ExtractdError::SelfForkUnavailable(_) => "SelfForkUnavailable",
        ExtractdError::StreamConsumed => "StreamConsumed",
        ExtractdError::NotPaginated => "NotPaginated",
        ExtractdError::Fetch { .. } => "Fetch",
        ExtractdError::Output(_) => "Output",
        ExtractdError::MissingDependency(_) => "MissingDependency",
        ExtractdError::Other(_) => "Other",
    }
}
