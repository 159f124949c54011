//! # Middleware Stack
//!
//! Tower middleware for the API layer:
//! - [`metrics`]: per-request counters and latency histograms.
//!
//! Tracing uses `tower_http::trace::TraceLayer` directly and
//! authentication lives in [`crate::auth`].

pub mod metrics;
