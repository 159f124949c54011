//! # Custom Extractors & Validation
//!
//! Provides the [`Validate`] trait for request DTOs and helpers to extract
//! and validate JSON or form bodies in handlers.

use axum::body::Bytes;
use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::{Form, Json};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// Trait for request types that can validate their business rules
/// beyond what serde deserialization checks.
pub trait Validate {
    /// Validate business rules. Returns an error message on failure.
    fn validate(&self) -> Result<(), String>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
///
/// ```ignore
/// async fn handler(body: Result<Json<T>, JsonRejection>) -> Result<..., AppError> {
///     let req = extract_json(body)?;
/// }
/// ```
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and validate it using the [`Validate`] trait.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate().map_err(AppError::Validation)?;
    Ok(value)
}

/// Extract a URL-encoded form body.
pub fn extract_form<T>(result: Result<Form<T>, FormRejection>) -> Result<T, AppError> {
    result
        .map(|Form(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Parse an optional JSON body. An empty body yields `T::default()`.
///
/// Used by action endpoints (`/approve`, `/activate`, …) where the body
/// only carries an optional reason or expected version.
pub fn extract_optional_json<T: DeserializeOwned + Default>(body: Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(format!("invalid JSON body: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Action {
        reason: Option<String>,
    }

    #[test]
    fn empty_body_is_default() {
        let action: Action = extract_optional_json(Bytes::new()).unwrap();
        assert_eq!(action, Action::default());
        let action: Action = extract_optional_json(Bytes::from_static(b"  \n")).unwrap();
        assert_eq!(action, Action::default());
    }

    #[test]
    fn body_is_parsed() {
        let action: Action =
            extract_optional_json(Bytes::from_static(br#"{"reason":"duplicate"}"#)).unwrap();
        assert_eq!(action.reason.as_deref(), Some("duplicate"));
    }

    #[test]
    fn malformed_body_is_bad_request() {
        let err = extract_optional_json::<Action>(Bytes::from_static(b"{not json")).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
