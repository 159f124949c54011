//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps domain errors from rsm-state and rsm-core to HTTP status codes and
//! returns `{ "success": false, "error": { code, message, details? } }`.
//! Internal error details are logged, never returned.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rsm_state::TransitionError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Field name → messages, in stable key order.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Always `false`.
    pub success: bool,
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "VALIDATION_ERROR").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Per-field messages for form validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    pub(crate) fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code: code.to_string(),
                message: message.into(),
                details: None,
            },
        }
    }
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// One or more named fields failed validation (422).
    #[error("validation failed for {} field(s)", .0.len())]
    FieldValidation(FieldErrors),

    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient permissions (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Conflict with current resource state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// A single-field validation failure.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        Self::FieldValidation(errors)
    }

    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) | Self::FieldValidation(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR")
            }
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if matches!(&self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal server error");
        }

        let mut body = ErrorBody::new(code, "");
        match self {
            Self::Internal(_) => body.error.message = "An internal error occurred".to_string(),
            Self::FieldValidation(fields) => {
                body.error.message = "The given data was invalid.".to_string();
                body.error.details = serde_json::to_value(fields).ok();
            }
            other => body.error.message = other.to_string(),
        }

        (status, Json(body)).into_response()
    }
}

impl From<rsm_core::ValidationError> for AppError {
    fn from(err: rsm_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<rsm_core::RsmError> for AppError {
    fn from(err: rsm_core::RsmError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Illegal transitions answer 422; a stale `expected_version` answers 409.
impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::VersionMismatch { .. } => Self::Conflict(err.to_string()),
            TransitionError::UnknownState { .. } => Self::Internal(err.to_string()),
            TransitionError::InvalidTransition { .. }
            | TransitionError::Terminal { .. }
            | TransitionError::ReasonRequired { .. }
            | TransitionError::ReasonTooLong { .. } => Self::Validation(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn response_parts(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn status_codes() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (
                AppError::Validation("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
            ),
            (
                AppError::field("email", "required"),
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
            ),
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            (
                AppError::Unauthorized("x".into()),
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
            ),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN, "FORBIDDEN"),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT, "CONFLICT"),
            (
                AppError::Internal("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
            ),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status_and_code(), (status, code), "{err:?}");
        }
    }

    #[tokio::test]
    async fn envelope_has_success_false() {
        let (status, body) = response_parts(AppError::NotFound("order 42".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert!(body["error"]["message"].as_str().unwrap().contains("order 42"));
        assert!(body["error"].get("details").is_none());
    }

    #[tokio::test]
    async fn field_validation_carries_details() {
        let mut fields = FieldErrors::new();
        fields.insert("email".into(), vec!["The email field is required.".into()]);
        fields.insert("phone".into(), vec!["The phone field is required.".into()]);
        let (status, body) = response_parts(AppError::FieldValidation(fields)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body["error"]["details"]["email"][0],
            "The email field is required."
        );
        assert!(body["error"]["details"]["phone"].is_array());
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let (status, body) =
            response_parts(AppError::Internal("db connection failed".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["message"], "An internal error occurred");
    }

    #[test]
    fn transition_errors_map_to_422_or_409() {
        let invalid = AppError::from(TransitionError::Terminal {
            kind: "order",
            state: "delivered".into(),
        });
        assert_eq!(invalid.status_and_code().0, StatusCode::UNPROCESSABLE_ENTITY);

        let stale = AppError::from(TransitionError::VersionMismatch {
            kind: "order",
            expected: 1,
            current: 2,
        });
        assert_eq!(stale.status_and_code().0, StatusCode::CONFLICT);
    }

    #[test]
    fn core_validation_error_is_422() {
        let err = AppError::from(rsm_core::ValidationError::InvalidAmount("abc".into()));
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("abc")));
    }
}
