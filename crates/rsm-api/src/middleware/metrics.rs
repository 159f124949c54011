//! # Request Metrics
//!
//! Records HTTP-level metrics through the `metrics` facade. When the
//! Prometheus recorder is installed (see `main.rs`) they are exposed at
//! `/metrics`; without a recorder the macros are no-ops.
//!
//! | Metric                               | Labels                   |
//! |--------------------------------------|--------------------------|
//! | `rsm_http_requests_total`            | method, path, status     |
//! | `rsm_http_errors_total`              | method, path, status     |
//! | `rsm_http_request_duration_seconds`  | method, path             |
//!
//! Domain counters (`rsm_orders_created_total`, `rsm_stamps_generated_total`,
//! ...) are recorded by the handlers themselves.

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, histogram};

/// Label used when no route matched.
const UNMATCHED: &str = "unmatched";

/// The route template (`/v1/orders/{id}`), never the concrete path, so label
/// cardinality stays bounded.
fn route_label(request: &Request) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED.to_string())
}

/// Middleware that records request count, error count and latency.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = route_label(&request);
    let start = Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(
        "rsm_http_requests_total",
        "method" => method.clone(),
        "path" => path.clone(),
        "status" => status.clone()
    )
    .increment(1);

    if response.status().is_client_error() || response.status().is_server_error() {
        counter!(
            "rsm_http_errors_total",
            "method" => method.clone(),
            "path" => path.clone(),
            "status" => status
        )
        .increment(1);
    }

    histogram!(
        "rsm_http_request_duration_seconds",
        "method" => method,
        "path" => path
    )
    .record(duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    #[test]
    fn unmatched_request_gets_fallback_label() {
        let request = Request::builder()
            .uri("/v1/orders/123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(route_label(&request), UNMATCHED);
    }

    #[tokio::test]
    async fn middleware_passes_response_through() {
        let app = Router::new()
            .route("/v1/orders/{id}", get(|| async { "order" }))
            .layer(axum::middleware::from_fn(metrics_middleware));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/orders/abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
