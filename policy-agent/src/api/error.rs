//! API error handling.
//!
//! Provides consistent error responses for the API.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::Error;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error type that can be converted to HTTP responses.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error.
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Add details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Create a 400 Bad Request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// Create a 400 error for a document that failed validation.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    /// Create a 404 Not Found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    /// Create a 409 Conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", message)
    }

    /// Create a 500 Internal Server Error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse {
            code: self.code,
            message: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Conflict(_) => ApiError::conflict(err.to_string()),
            Error::NotFound(_) => ApiError::not_found(err.to_string()),
            Error::Configuration { message, errors } => {
                if errors.is_empty() {
                    ApiError::bad_request(message)
                } else {
                    let details = serde_json::to_value(&errors).unwrap_or_default();
                    ApiError::validation(message).with_details(details)
                }
            }
            Error::InvalidSchedule { .. } | Error::Resolution { .. } => {
                ApiError::bad_request(err.to_string())
            }
            Error::Yaml(e) => ApiError::bad_request(format!("Invalid YAML format: {}", e)),
            _ => {
                tracing::error!("Unexpected error: {}", err);
                ApiError::internal("An unexpected error occurred")
            }
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldError;
    use rstest::rstest;

    #[test]
    fn test_api_error_creation() {
        let err = ApiError::not_found("policy 'a' not found");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.code, "NOT_FOUND");
        assert_eq!(err.message, "policy 'a' not found");
    }

    #[rstest]
    #[case::conflict(Error::Conflict("a".into()), StatusCode::CONFLICT)]
    #[case::not_found(Error::NotFound("a".into()), StatusCode::NOT_FOUND)]
    #[case::empty_request(Error::config("no policies found in request"), StatusCode::BAD_REQUEST)]
    #[case::invalid_schedule(Error::invalid_schedule("x", "bad"), StatusCode::BAD_REQUEST)]
    #[case::unknown_backend(Error::resolution("snmp", "unknown"), StatusCode::BAD_REQUEST)]
    #[case::internal(Error::Other("boom".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn test_from_domain_error(#[case] err: Error, #[case] status: StatusCode) {
        let api_err: ApiError = err.into();
        assert_eq!(api_err.status, status, "{}", api_err.message);
    }

    #[test]
    fn test_field_errors_become_details() {
        let err =
            Error::invalid_fields(vec![FieldError::new("policies.a.scope", "field required")]);
        let api_err: ApiError = err.into();

        assert_eq!(api_err.status, StatusCode::BAD_REQUEST);
        assert_eq!(api_err.code, "VALIDATION_ERROR");
        assert_eq!(
            api_err.details,
            Some(serde_json::json!([{"field": "policies.a.scope", "error": "field required"}]))
        );
    }

    #[test]
    fn test_internal_errors_are_not_leaked() {
        let api_err: ApiError = Error::Other("secret detail".into()).into();
        assert!(!api_err.message.contains("secret"));
    }
}
