//! Error types for govcon-api
//!
//! Every error leaves as `{"error": {"code", "message"}}`.

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::rate_limit::headers;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Request rate exceeded (429)
    #[error("{message}")]
    RateLimited {
        message: String,
        limit: u32,
        /// Window reset, Unix seconds
        reset: i64,
        retry_after_secs: u64,
    },

    #[error("Common error: {0}")]
    Common(#[from] govcon_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::RateLimited { message, .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", message.clone())
            }
            ApiError::Common(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, "{}", message);
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        let mut response = (status, body).into_response();

        if let ApiError::RateLimited {
            limit,
            reset,
            retry_after_secs,
            ..
        } = self
        {
            let response_headers = response.headers_mut();
            response_headers.insert(headers::LIMIT, HeaderValue::from(limit));
            response_headers.insert(headers::REMAINING, HeaderValue::from(0u32));
            response_headers.insert(headers::RESET, HeaderValue::from(reset));
            response_headers.insert(headers::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }

        response
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
