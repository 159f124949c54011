//! # rsm-api — Revenue Stamp Management Service
//!
//! Axum service for a tax administration's revenue stamp programme:
//! taxpayer registration and verification, per-taxpayer product catalogues,
//! stamp orders with fixed-at-creation pricing, payment intents, stamp
//! issuance and public verification, and field-control inspections.
//!
//! ## Routes
//!
//! - `/`, `/register` — public home route and self-registration form
//! - `/v1/stamps/verify/{serial}` — public authenticity check
//! - `/v1/taxpayers/*`, `/v1/products/*`, `/v1/stamp-types/*`
//! - `/v1/orders/*`, `/v1/payments/*`, `/v1/stamps/*`
//! - `/v1/field-controls/*`, `/v1/dashboard`
//! - `/health/*`, `/metrics`, `/openapi.json`
//!
//! ## Middleware Stack (Tower)
//!
//! TraceLayer → CorsLayer → MetricsMiddleware → AuthMiddleware → Handler
//!
//! Lifecycle rules live in `rsm-state`; money arithmetic in `rsm-core`.
//! Handlers validate, apply a transition under the store lock, then persist
//! and audit. A failed write puts the previous record back.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod issuance;
pub mod middleware;
pub mod openapi;
pub mod records;
pub mod response;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use state::AppState;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;

/// Request bodies above this size are refused with 413.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Assemble the application router.
///
/// Public routes (home, registration, stamp verification, health checks,
/// metrics) sit outside the auth middleware.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let metrics_on = state.config.metrics_enabled;

    let api = Router::new()
        .merge(routes::taxpayers::router())
        .merge(routes::catalogue::router())
        .merge(routes::products::router())
        .merge(routes::stamp_types::router())
        .merge(routes::orders::router())
        .merge(routes::payments::router())
        .merge(routes::stamps::router())
        .merge(routes::field_controls::router())
        .merge(routes::dashboard::router())
        .merge(openapi::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(Extension(auth_config));

    let public = Router::new()
        .merge(routes::home::router())
        .merge(routes::stamps::public_router())
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(prometheus_metrics));

    let mut router = Router::new()
        .merge(public)
        .merge(api)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES));

    if metrics_on {
        router = router.layer(from_fn(middleware::metrics::metrics_middleware));
    }

    router
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness check.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness check: stores readable and, when configured, the database
/// answering. 200 "ready" or 503 with the failing dependency.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let _ = state.orders.len();
    if let Some(pool) = &state.db_pool {
        if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
            tracing::warn!("database health check failed: {e}");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response();
        }
    }
    (StatusCode::OK, "ready").into_response()
}

/// GET /metrics — Prometheus text exposition. 404 when no recorder is
/// installed.
async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
