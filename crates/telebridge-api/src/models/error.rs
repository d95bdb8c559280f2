//! Error responses and the mapping from bridge errors to HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use telebridge_bridge::BridgeError;

use super::common::{ApiError, ApiResponse, ErrorCode};

/// Result type for handlers that fail with an HTTP error.
pub type ApiResult<T> = Result<T, ErrorResponse>;

/// An error carried back to the HTTP client.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.as_str().to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorCode::ValidationFailed, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorCode::DeviceNotFound, message)
    }

    pub fn request_timeout(message: impl Into<String>) -> Self {
        Self::new(StatusCode::REQUEST_TIMEOUT, ErrorCode::CommandTimeout, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, ErrorCode::CommandRejected, message)
    }

    pub fn service_unavailable(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, code, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::InternalError, message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<BridgeError> for ErrorResponse {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Validation(msg) => Self::bad_request(msg),
            BridgeError::NotFound(device_id) => {
                Self::not_found(format!("Device '{}' not found.", device_id))
            }
            BridgeError::Transport(e) => {
                tracing::error!(error = %e, "Broker transport failed");
                Self::service_unavailable(ErrorCode::BrokerUnavailable, e.to_string())
            }
            BridgeError::StoreUnavailable(reason) => Self::service_unavailable(
                ErrorCode::StorageUnavailable,
                format!("Device state store unavailable: {}", reason),
            ),
            BridgeError::Storage(msg) | BridgeError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                Self::internal(msg)
            }
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let mut error = ApiError::new(self.code, self.message);
        if let Some(details) = self.details {
            error = error.with_details(details);
        }
        (self.status, ApiResponse::<()>::error(error)).into_response()
    }
}
