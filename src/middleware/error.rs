//! Error response formatting
//!
//! Every handler error leaves the service as the same JSON shape: a
//! machine-readable code, a user-facing message and the request id.

use crate::error::{AppError, AppErrorKind, ErrorCode, ValidationError};
use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Standardized error response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub error: ErrorCode,

    /// Human-readable error message
    pub message: String,

    pub request_id: Option<String>,

    /// ISO 8601 timestamp of the error
    pub timestamp: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ErrorResponse {
    pub fn from_app_error(error: &AppError) -> Self {
        Self {
            error: error.error_code(),
            message: error.user_message(),
            request_id: error.request_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            details: None,
            retryable: Some(error.is_retryable()),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Generic failure that reveals nothing about the cause.
    pub fn internal_error(request_id: Option<String>) -> Self {
        Self {
            error: ErrorCode::InternalError,
            message: "An internal server error occurred. Please try again later.".to_string(),
            request_id,
            timestamp: Utc::now().to_rfc3339(),
            details: None,
            retryable: Some(false),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            tracing::error!(
                error = ?self.kind,
                context = ?self.context,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Server error occurred"
            );
        } else {
            tracing::warn!(
                error = ?self.kind,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Client error occurred"
            );
        }

        let mut error_response = ErrorResponse::from_app_error(&self);
        if let AppErrorKind::Validation(ValidationError::Invalid { field, .. }) = &self.kind {
            error_response = error_response.with_details(serde_json::json!({ "field": field }));
        }

        let mut response = (status_code, Json(error_response)).into_response();
        // Picked up by `error_handling_middleware` to stamp the request id.
        response.extensions_mut().insert(self);
        response
    }
}

/// Re-renders error responses that were built without a request id.
pub async fn error_handling_middleware(request: Request, next: Next) -> Response {
    let request_id = get_request_id_from_headers(request.headers());

    let mut response = next.run(request).await;
    let error = response.extensions_mut().remove::<AppError>();

    match (request_id, error) {
        (Some(request_id), Some(error)) if error.request_id.is_none() => {
            let mut rendered = error.with_request_id(request_id).into_response();
            rendered.extensions_mut().remove::<AppError>();
            for (name, value) in response.headers() {
                if !rendered.headers().contains_key(name) {
                    rendered.headers_mut().insert(name.clone(), value.clone());
                }
            }
            rendered
        }
        _ => response,
    }
}

pub fn get_request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// JSON error body for handlers that answer with a fixed status and message.
pub fn json_error_response(
    status: StatusCode,
    error: ErrorCode,
    message: impl Into<String>,
    request_id: Option<String>,
) -> (StatusCode, Json<ErrorResponse>) {
    let error_response = if status.is_server_error() {
        ErrorResponse::internal_error(request_id)
    } else {
        ErrorResponse {
            error,
            message: message.into(),
            request_id,
            timestamp: Utc::now().to_rfc3339(),
            details: None,
            retryable: Some(false),
        }
    };

    (status, Json(error_response))
}
