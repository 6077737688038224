//! Error types for Sahay services
//!
//! Provides the error taxonomy shared by the session engine and the gateway:
//! - Distinct error types for extraction, backend and caller failures
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    EmptyInput,
    PayloadTooLarge,
    UnsupportedMediaType,

    // Session errors (4xxx)
    SessionNotFound,
    NoDocument,
    PreconditionFailed,
    ActionInProgress,

    // Document errors (5xxx)
    ExtractionFailed,

    // Rate limiting (6xxx)
    RateLimited,

    // Backend errors (8xxx)
    BackendError,
    BackendTimeout,
    BackendRateLimited,
    MalformedResponse,
    EmptyResponse,
    ContentBlocked,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,

    // Service unavailable
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::EmptyInput => 1002,
            ErrorCode::PayloadTooLarge => 1003,
            ErrorCode::UnsupportedMediaType => 1004,

            // Session (4xxx)
            ErrorCode::SessionNotFound => 4001,
            ErrorCode::NoDocument => 4002,
            ErrorCode::PreconditionFailed => 4003,
            ErrorCode::ActionInProgress => 4004,

            // Document (5xxx)
            ErrorCode::ExtractionFailed => 5001,

            // Rate limits (6xxx)
            ErrorCode::RateLimited => 6001,

            // Backend (8xxx)
            ErrorCode::BackendError => 8001,
            ErrorCode::BackendTimeout => 8002,
            ErrorCode::BackendRateLimited => 8003,
            ErrorCode::MalformedResponse => 8004,
            ErrorCode::EmptyResponse => 8005,
            ErrorCode::ContentBlocked => 8006,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,

            ErrorCode::ServiceUnavailable => 9999,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("No content submitted for {field}")]
    EmptyInput { field: String },

    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Unsupported media type: {content_type}")]
    UnsupportedMediaType { content_type: String },

    // Session errors
    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    #[error("No document has been processed in this session")]
    NoDocument,

    #[error("Precondition failed: {message}")]
    Precondition { message: String },

    #[error("Another action is still running: {action}")]
    ActionInProgress { action: String },

    // Document errors
    #[error("Could not read document: {message}")]
    Extraction { message: String },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Backend errors
    #[error("Generative backend error: {message}")]
    Backend { message: String },

    #[error("Generative backend returned {status}: {body}")]
    BackendStatus { status: u16, body: String },

    #[error("Generative backend timed out after {timeout_secs}s")]
    BackendTimeout { timeout_secs: u64 },

    #[error("Generative backend rate limit reached")]
    BackendRateLimited,

    #[error("Malformed backend response: {message}")]
    MalformedResponse { message: String },

    #[error("Generative backend returned an empty response")]
    EmptyResponse,

    #[error("Generative backend blocked the request: {reason}")]
    ContentBlocked { reason: String },


    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },


    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::EmptyInput { .. } => ErrorCode::EmptyInput,
            AppError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AppError::UnsupportedMediaType { .. } => ErrorCode::UnsupportedMediaType,
            AppError::SessionNotFound { .. } => ErrorCode::SessionNotFound,
            AppError::NoDocument => ErrorCode::NoDocument,
            AppError::Precondition { .. } => ErrorCode::PreconditionFailed,
            AppError::ActionInProgress { .. } => ErrorCode::ActionInProgress,
            AppError::Extraction { .. } => ErrorCode::ExtractionFailed,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Backend { .. } => ErrorCode::BackendError,
            AppError::BackendStatus { .. } => ErrorCode::BackendError,
            AppError::BackendTimeout { .. } => ErrorCode::BackendTimeout,
            AppError::BackendRateLimited => ErrorCode::BackendRateLimited,
            AppError::MalformedResponse { .. } => ErrorCode::MalformedResponse,
            AppError::EmptyResponse => ErrorCode::EmptyResponse,
            AppError::ContentBlocked { .. } => ErrorCode::ContentBlocked,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 204 No Content: blank submissions are dropped silently
            AppError::EmptyInput { .. } => StatusCode::NO_CONTENT,

            // 400 Bad Request
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,

            // 404 Not Found
            AppError::SessionNotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::Precondition { .. } | AppError::ActionInProgress { .. } => {
                StatusCode::CONFLICT
            }

            // 412 Precondition Failed
            AppError::NoDocument => StatusCode::PRECONDITION_FAILED,

            // 413 Payload Too Large
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,

            // 415 Unsupported Media Type
            AppError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,

            // 422 Unprocessable Entity
            AppError::Extraction { .. } => StatusCode::UNPROCESSABLE_ENTITY,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::Backend { .. }
            | AppError::BackendStatus { .. }
            | AppError::MalformedResponse { .. }
            | AppError::EmptyResponse
            | AppError::ContentBlocked { .. } => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::BackendRateLimited | AppError::ServiceUnavailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            // 504 Gateway Timeout
            AppError::BackendTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Whether the failure came from the generative backend
    pub fn is_backend_error(&self) -> bool {
        matches!(
            self,
            AppError::Backend { .. }
                | AppError::BackendStatus { .. }
                | AppError::BackendTimeout { .. }
                | AppError::BackendRateLimited
                | AppError::MalformedResponse { .. }
                | AppError::EmptyResponse
                | AppError::ContentBlocked { .. }
        )
    }

    /// Whether re-triggering the same action may succeed
    pub fn is_retriable(&self) -> bool {
        self.is_backend_error() || matches!(self, AppError::ActionInProgress { .. })
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub status: u16,
    pub message: String,
    pub retriable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        if let AppError::EmptyInput { field } = &self {
            tracing::debug!(field = %field, "Ignoring blank submission");
            return status.into_response();
        }

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                status: status.as_u16(),
                retriable: self.is_retriable(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal {
            message: format!("Background task failed: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::SessionNotFound { id: "test".into() };
        assert_eq!(err.code(), ErrorCode::SessionNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_backend_errors_are_retriable() {
        let err = AppError::BackendStatus {
            status: 500,
            body: "upstream".into(),
        };
        assert!(err.is_backend_error());
        assert!(err.is_retriable());
        assert!(err.is_server_error());

        assert!(AppError::EmptyResponse.is_backend_error());
        assert!(!AppError::NoDocument.is_retriable());
    }

    #[test]
    fn test_backend_family_statuses() {
        let cases = [
            (AppError::Backend { message: "refused".into() }, StatusCode::BAD_GATEWAY),
            (AppError::MalformedResponse { message: "not json".into() }, StatusCode::BAD_GATEWAY),
            (AppError::ContentBlocked { reason: "SAFETY".into() }, StatusCode::BAD_GATEWAY),
            (AppError::BackendRateLimited, StatusCode::SERVICE_UNAVAILABLE),
            (AppError::BackendTimeout { timeout_secs: 120 }, StatusCode::GATEWAY_TIMEOUT),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status);
            assert!(err.is_backend_error());
            assert!(err.is_retriable());
        }
    }

    #[test]
    fn test_extraction_error() {
        let err = AppError::Extraction {
            message: "not a PDF".into(),
        };
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.is_client_error());
        assert!(!err.is_backend_error());
    }

    #[test]
    fn test_empty_input_is_silent() {
        let err = AppError::EmptyInput {
            field: "question".into(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[test]
    fn test_numeric_codes_are_unique() {
        let codes = [
            ErrorCode::ValidationError,
            ErrorCode::EmptyInput,
            ErrorCode::SessionNotFound,
            ErrorCode::NoDocument,
            ErrorCode::PreconditionFailed,
            ErrorCode::ActionInProgress,
            ErrorCode::ExtractionFailed,
            ErrorCode::BackendError,
            ErrorCode::EmptyResponse,
            ErrorCode::InternalError,
        ];
        let mut seen: Vec<u16> = codes.iter().map(|c| c.as_code()).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), codes.len());
    }
}
