//! # Payments
//!
//! Routes:
//! - GET    /v1/payments — List payments, `?status=`
//! - GET    /v1/payments/{id} — Payment details
//! - POST   /v1/payments/{id}/confirm — Record the payment (agent)
//!
//! Payment intents are created by `POST /v1/orders/{id}/payment`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use metrics::counter;
use rsm_core::{parse_amount, PaymentId};
use rsm_state::{LifecycleState, PaymentStatus, TransitionEvidence};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{non_blank, record_transition};
use crate::auth::{require_role, require_taxpayer_access, CallerIdentity, Role};
use crate::db;
use crate::db::audit::AuditEvent;
use crate::db::persist_error;
use crate::error::AppError;
use crate::extractors::extract_json;
use crate::records::{Payment, StampOrder};
use crate::response::{ok, ApiResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmPaymentRequest {
    /// Amount received as a decimal string; must equal the payment amount.
    pub amount: String,
    pub payment_method: Option<String>,
    /// Bank or mobile-money transaction reference.
    pub bank_reference: Option<String>,
    pub expected_version: Option<i64>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaymentListQuery {
    /// `pending`, `confirmed` or `cancelled`.
    pub status: Option<String>,
}

/// A confirmed payment and the order it settled.
#[derive(Debug, Serialize)]
pub struct PaymentConfirmation {
    pub payment: Payment,
    pub order: StampOrder,
}

fn not_found(id: PaymentId) -> AppError {
    AppError::NotFound(format!("payment {id} not found"))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/payments", get(list_payments))
        .route("/v1/payments/{id}", get(get_payment))
        .route("/v1/payments/{id}/confirm", post(confirm_payment))
}

#[utoipa::path(
    get,
    path = "/v1/payments",
    params(PaymentListQuery),
    responses(
        (status = 200, description = "Payments, newest first"),
        (status = 422, description = "Unknown status filter", body = crate::error::ErrorBody),
    ),
    tag = "payments"
)]
pub async fn list_payments(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<PaymentListQuery>,
) -> Result<Json<ApiResponse<Vec<Payment>>>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(PaymentStatus::parse)
        .transpose()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let mut payments = state.payments.filter(|p| {
        caller.can_access_taxpayer(p.taxpayer_id)
            && status.map_or(true, |s| p.lifecycle.status == s)
    });
    payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(ok("Payments retrieved.", payments))
}

#[utoipa::path(
    get,
    path = "/v1/payments/{id}",
    params(("id" = Uuid, Path, description = "Payment UUID")),
    responses(
        (status = 200, description = "Payment details"),
        (status = 404, description = "Payment not found", body = crate::error::ErrorBody),
    ),
    tag = "payments"
)]
pub async fn get_payment(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Payment>>, AppError> {
    let id = PaymentId::from_uuid(id);
    let payment = state.payments.get(&id).ok_or_else(|| not_found(id))?;
    require_taxpayer_access(&caller, payment.taxpayer_id)?;
    Ok(ok("Payment retrieved.", payment))
}

/// POST /v1/payments/{id}/confirm — Mark a pending payment as received and
/// move its order to `payment_confirmed`.
#[utoipa::path(
    post,
    path = "/v1/payments/{id}/confirm",
    params(("id" = Uuid, Path, description = "Payment UUID")),
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Payment confirmed"),
        (status = 404, description = "Payment not found", body = crate::error::ErrorBody),
        (status = 409, description = "Version mismatch", body = crate::error::ErrorBody),
        (status = 422, description = "Amount mismatch or payment not pending", body = crate::error::ErrorBody),
    ),
    tag = "payments"
)]
pub async fn confirm_payment(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<ConfirmPaymentRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<PaymentConfirmation>>, AppError> {
    require_role(&caller, Role::Agent)?;
    let id = PaymentId::from_uuid(id);
    let req = extract_json(body)?;
    let amount = parse_amount(req.amount.trim())
        .ok_or_else(|| AppError::field("amount", format!("{:?} is not a valid amount", req.amount)))?;
    let payment_method = non_blank(req.payment_method);
    let bank_reference = non_blank(req.bank_reference);

    let pending = state.payments.get(&id).ok_or_else(|| not_found(id))?;
    let order_evidence = TransitionEvidence::by(caller.actor())
        .with_reason(format!("payment {} confirmed", pending.reference));
    let payments = state.payments.clone();
    let now = Utc::now();

    // Orders before payments, as everywhere both are locked together.
    let (order_before, order, payment_before, payment) = state
        .orders
        .try_update(&pending.order_id, |o| {
            let mut next = o.clone();
            next.lifecycle.confirm_payment(order_evidence)?;
            next.updated_at = now;

            let (payment_before, payment) = payments
                .try_update(&id, |p| {
                    p.lifecycle.check_version(req.expected_version)?;
                    if amount != p.amount {
                        return Err(AppError::field(
                            "amount",
                            format!(
                                "The amount must equal {}.",
                                rsm_core::format_amount(p.amount)
                            ),
                        ));
                    }
                    let mut confirmed = p.clone();
                    confirmed.lifecycle.confirm(caller.evidence())?;
                    confirmed.paid_at = Some(now);
                    confirmed.updated_at = now;
                    if payment_method.is_some() {
                        confirmed.payment_method = payment_method;
                    }
                    confirmed.bank_reference = bank_reference;
                    let before = std::mem::replace(p, confirmed.clone());
                    Ok::<_, AppError>((before, confirmed))
                })
                .ok_or_else(|| not_found(id))??;

            let order_before = std::mem::replace(o, next.clone());
            Ok::<_, AppError>((order_before, next, payment_before, payment))
        })
        .ok_or_else(|| {
            AppError::Internal(format!(
                "order {} of payment {} is missing",
                pending.order_id, pending.id
            ))
        })??;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = db::orders::save_with_payment(pool, &order, &payment).await {
            state.payments.revert(&id, Some(payment_before), &payment);
            state
                .orders
                .revert(&order.id, Some(order_before), &order);
            return Err(persist_error("payment", id, e));
        }
    }
    record_transition(payment.lifecycle.status);
    record_transition(order.lifecycle.status);

    state
        .audit(
            AuditEvent::new("payment.confirmed", "payment", *payment.id.as_uuid(), "transition")
                .by(caller.actor())
                .with_metadata(serde_json::json!({
                    "reference": payment.reference,
                    "amount": payment.amount,
                    "bank_reference": payment.bank_reference,
                })),
        )
        .await;
    state
        .audit(
            AuditEvent::new(
                "order.payment_confirmed",
                "order",
                *order.id.as_uuid(),
                "transition",
            )
            .by(caller.actor())
            .with_metadata(serde_json::json!({
                "order_number": order.order_number,
                "status": order.lifecycle.status.as_str(),
                "version": order.lifecycle.version,
            })),
        )
        .await;

    counter!("rsm_payments_confirmed_total").increment(1);
    counter!("rsm_revenue_confirmed_cents_total").increment(payment.amount.max(0) as u64);
    tracing::info!(
        payment_id = %payment.id,
        order_id = %order.id,
        reference = %payment.reference,
        amount = payment.amount,
        "payment confirmed"
    );

    Ok(ok(
        "Payment confirmed.",
        PaymentConfirmation { payment, order },
    ))
}
