//! Success envelope: `{ "success": true, "message": …, "data": … }`.

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

/// Body of every successful JSON response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Always `true`.
    pub success: bool,
    pub message: String,
    pub data: T,
}

/// `200 OK` with the envelope.
pub fn ok<T: Serialize>(message: impl Into<String>, data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        message: message.into(),
        data,
    })
}

/// `201 Created` with the envelope.
pub fn created<T: Serialize>(
    message: impl Into<String>,
    data: T,
) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, ok(message, data))
}
