//! # Public Entry Points
//!
//! Routes (unauthenticated):
//! - GET  / — Service banner
//! - POST /register — Taxpayer self-registration (form-urlencoded), 303 → `/`

use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Serialize;

use super::taxpayers::{build_taxpayer, register, RegisterTaxpayerRequest};
use crate::error::AppError;
use crate::extractors::extract_form;
use crate::response::{ok, ApiResponse};
use crate::state::AppState;

/// Actor recorded for self-registrations.
const SELF_REGISTRATION_ACTOR: &str = "public:register";

#[derive(Debug, Serialize)]
pub struct Banner {
    pub service: &'static str,
    pub version: &'static str,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/register", post(register_form))
}

/// GET / — Home route.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Service banner")),
    security(),
    tag = "public"
)]
pub async fn home() -> Json<ApiResponse<Banner>> {
    ok(
        "Revenue stamp management service.",
        Banner {
            service: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        },
    )
}

/// POST /register — Self-registration form. The taxpayer starts `pending`.
#[utoipa::path(
    post,
    path = "/register",
    request_body(
        content = RegisterTaxpayerRequest,
        content_type = "application/x-www-form-urlencoded"
    ),
    responses(
        (status = 303, description = "Registered; redirect to /"),
        (status = 422, description = "Field validation failed", body = crate::error::ErrorBody),
    ),
    security(),
    tag = "public"
)]
pub async fn register_form(
    State(state): State<AppState>,
    form: Result<Form<RegisterTaxpayerRequest>, FormRejection>,
) -> Result<Redirect, AppError> {
    let req = extract_form(form)?;
    let taxpayer = build_taxpayer(&state, req)?;
    register(&state, taxpayer, SELF_REGISTRATION_ACTOR.to_string()).await?;
    Ok(Redirect::to("/"))
}
