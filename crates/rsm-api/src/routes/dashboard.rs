//! # Dashboard
//!
//! GET /v1/dashboard (agent) — counts by status, confirmed revenue and the
//! average inspection compliance rate.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use rsm_core::{format_amount, Cents};
use rsm_state::{
    CatalogueStatus, LifecycleState, OrderStatus, PaymentStatus, RegistrationStatus, StampStatus,
};
use serde::Serialize;

use crate::auth::{require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::response::{ok, ApiResponse};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub taxpayers: BTreeMap<&'static str, usize>,
    pub catalogue_entries: BTreeMap<&'static str, usize>,
    pub orders: BTreeMap<&'static str, usize>,
    pub payments: BTreeMap<&'static str, usize>,
    pub stamps: BTreeMap<&'static str, usize>,
    pub products_active: usize,
    /// Sum of confirmed payments, in cents.
    pub confirmed_revenue: Cents,
    pub confirmed_revenue_formatted: String,
    pub field_controls: usize,
    /// Mean of per-inspection compliance rates, `0` with no inspections.
    pub average_compliance_rate: f64,
    pub counterfeit_items_found: i64,
}

/// Count statuses, listing every status even when none is present.
fn count_by_status<S: LifecycleState>(
    statuses: impl IntoIterator<Item = S>,
) -> BTreeMap<&'static str, usize> {
    let mut counts: BTreeMap<&'static str, usize> =
        S::all().iter().map(|s| (s.as_str(), 0)).collect();
    for status in statuses {
        *counts.entry(status.as_str()).or_default() += 1;
    }
    counts
}

/// Mean rounded to two decimals.
fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    (mean * 100.0).round() / 100.0
}

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/dashboard", get(dashboard))
}

#[utoipa::path(
    get,
    path = "/v1/dashboard",
    responses(
        (status = 200, description = "Aggregate counts"),
        (status = 403, description = "Agent role required", body = crate::error::ErrorBody),
    ),
    tag = "dashboard"
)]
pub async fn dashboard(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<ApiResponse<Dashboard>>, AppError> {
    require_role(&caller, Role::Agent)?;

    let payments = state.payments.list();
    let confirmed_revenue = payments
        .iter()
        .filter(|p| p.lifecycle.status == PaymentStatus::Confirmed)
        .try_fold(0 as Cents, |acc, p| acc.checked_add(p.amount))
        .ok_or_else(|| AppError::Internal("confirmed revenue overflows".into()))?;

    let controls = state.field_controls.list();
    let rates: Vec<f64> = controls.iter().map(|c| c.compliance_rate()).collect();

    let dashboard = Dashboard {
        taxpayers: count_by_status::<RegistrationStatus>(
            state.taxpayers.list().iter().map(|t| t.registration.status),
        ),
        catalogue_entries: count_by_status::<CatalogueStatus>(
            state.catalogue.list().iter().map(|e| e.lifecycle.status),
        ),
        orders: count_by_status::<OrderStatus>(
            state.orders.list().iter().map(|o| o.lifecycle.status),
        ),
        payments: count_by_status::<PaymentStatus>(payments.iter().map(|p| p.lifecycle.status)),
        stamps: count_by_status::<StampStatus>(
            state.stamps.list().iter().map(|s| s.lifecycle.status),
        ),
        products_active: state.products.filter(|p| p.is_active).len(),
        confirmed_revenue,
        confirmed_revenue_formatted: format_amount(confirmed_revenue),
        field_controls: controls.len(),
        average_compliance_rate: average(&rates),
        counterfeit_items_found: controls.iter().map(|c| c.counterfeit_items).sum(),
    };
    Ok(ok("Dashboard retrieved.", dashboard))
}
