//! # Stamp Orders
//!
//! Routes:
//! - POST   /v1/orders — Create an order (priced at creation)
//! - GET    /v1/orders — List, `?status=` and `?taxpayer_id=`
//! - POST   /v1/orders/quote — Price preview, nothing stored
//! - GET    /v1/orders/{id} — Order with its payment and stamp count
//! - POST   /v1/orders/{id}/submit | cancel — Taxpayer actions
//! - POST   /v1/orders/{id}/verify | approve | reject — Review (agent)
//! - POST   /v1/orders/{id}/payment — Issue the payment intent
//! - POST   /v1/orders/{id}/start-production | ready | deliver — Fulfilment (agent)
//! - GET    /v1/orders/{id}/stamps — Stamps produced for the order
//! - GET    /v1/orders/{id}/audit — Audit trail of the order (agent)
//!
//! Lock order is orders → payments wherever both stores are touched under
//! one closure.

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use metrics::counter;
use rsm_core::{
    format_amount, OrderId, OrderPricing, PaymentId, ProductId, StampId, StampTypeId, TaxpayerId,
};
use rsm_state::{
    Lifecycle, LifecycleState, OrderStatus, PaymentStatus, StampStatus, TransitionEvidence,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{non_blank, persist_or_revert, record_transition, ActionRequest};
use crate::auth::{require_role, require_taxpayer_access, CallerIdentity, Role};
use crate::db;
use crate::db::audit::{AuditEvent, AuditEventRow};
use crate::db::persist_error;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_optional_json};
use crate::issuance;
use crate::records::{Payment, Stamp, StampOrder};
use crate::response::{created, ok, ApiResponse};
use crate::state::AppState;

// -- Request / response types -------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    /// Required for agents and admins; defaults to the caller for taxpayers.
    pub taxpayer_id: Option<Uuid>,
    pub product_id: Uuid,
    pub stamp_type_id: Uuid,
    pub quantity: i64,
    pub notes: Option<String>,
    /// Keep the order as a draft instead of submitting it.
    #[serde(default)]
    pub draft: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct QuoteRequest {
    pub product_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
pub struct Quote {
    pub product_id: ProductId,
    #[serde(flatten)]
    pub pricing: OrderPricing,
    /// `grand_total` as a decimal string.
    pub grand_total_formatted: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct PaymentIntentRequest {
    /// e.g. `bank_transfer`, `mobile_money`.
    pub payment_method: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderListQuery {
    /// Order status filter (`submitted`, `approved`, …).
    pub status: Option<String>,
    pub taxpayer_id: Option<Uuid>,
}

/// An order with its payment intent and the number of stamps produced.
#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: StampOrder,
    pub payment: Option<Payment>,
    pub stamp_count: usize,
}

// -- Helpers ------------------------------------------------------------------

fn not_found(id: OrderId) -> AppError {
    AppError::NotFound(format!("order {id} not found"))
}

/// Fetch an order the caller may see.
fn find_order(state: &AppState, caller: &CallerIdentity, id: OrderId) -> Result<StampOrder, AppError> {
    let order = state.orders.get(&id).ok_or_else(|| not_found(id))?;
    require_taxpayer_access(caller, order.taxpayer_id)?;
    Ok(order)
}

/// Price an order against the current product price and configuration.
fn price(state: &AppState, product_id: ProductId, quantity: i64) -> Result<OrderPricing, AppError> {
    let product = state
        .products
        .get(&product_id)
        .ok_or_else(|| AppError::field("product_id", format!("{product_id} does not exist")))?;
    if !product.is_active {
        return Err(AppError::field("product_id", format!("{product_id} is not active")));
    }
    OrderPricing::compute(
        product.stamp_price,
        quantity,
        state.config.tax_rate_bps,
        state.config.max_order_quantity,
    )
    .map_err(|e| AppError::field("quantity", e.to_string()))
}

fn order_event(order: &StampOrder, event_type: String, action: &str, actor: String) -> AuditEvent {
    AuditEvent::new(event_type, "order", *order.id.as_uuid(), action)
        .by(actor)
        .with_metadata(serde_json::json!({
            "order_number": order.order_number,
            "status": order.lifecycle.status.as_str(),
            "version": order.lifecycle.version,
        }))
}

/// Apply `apply` to a copy of the order and swap the copy in under the store
/// lock. Returns `(before, after)`; on error the stored order is untouched.
fn apply_transition(
    state: &AppState,
    id: OrderId,
    expected_version: Option<i64>,
    apply: impl FnOnce(&mut StampOrder) -> Result<(), AppError>,
) -> Result<(StampOrder, StampOrder), AppError> {
    state
        .orders
        .try_update(&id, |o| {
            o.lifecycle.check_version(expected_version)?;
            let mut next = o.clone();
            apply(&mut next)?;
            next.updated_at = Utc::now();
            let before = std::mem::replace(o, next.clone());
            Ok::<_, AppError>((before, next))
        })
        .ok_or_else(|| not_found(id))?
}

/// Count, audit and log a persisted order transition.
async fn finish_transition(
    state: &AppState,
    caller: &CallerIdentity,
    order: &StampOrder,
    name: &str,
) {
    record_transition(order.lifecycle.status);
    state
        .audit(order_event(
            order,
            format!("order.{name}"),
            "transition",
            caller.actor(),
        ))
        .await;
    tracing::info!(
        order_id = %order.id,
        order_number = %order.order_number,
        status = %order.lifecycle.status,
        actor = %caller.actor(),
        "order {name}"
    );
}

/// One order transition: apply in memory, persist (reverting on failure),
/// then audit.
async fn transition_order(
    state: &AppState,
    caller: &CallerIdentity,
    id: OrderId,
    action: ActionRequest,
    name: &'static str,
    apply: impl FnOnce(&mut StampOrder, TransitionEvidence) -> Result<(), AppError>,
) -> Result<StampOrder, AppError> {
    find_order(state, caller, id)?;
    let evidence = action.evidence(caller);
    let (before, updated) =
        apply_transition(state, id, action.expected_version, |o| apply(o, evidence))?;

    if let Some(pool) = &state.db_pool {
        persist_or_revert(
            &state.orders,
            &id,
            Some(before),
            &updated,
            "order",
            db::orders::save(pool, &updated),
        )
        .await?;
    }
    finish_transition(state, caller, &updated, name).await;
    Ok(updated)
}

// -- Router -------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/orders", post(create_order).get(list_orders))
        .route("/v1/orders/quote", post(quote_order))
        .route("/v1/orders/{id}", get(get_order))
        .route("/v1/orders/{id}/submit", post(submit_order))
        .route("/v1/orders/{id}/verify", post(verify_order))
        .route("/v1/orders/{id}/approve", post(approve_order))
        .route("/v1/orders/{id}/reject", post(reject_order))
        .route("/v1/orders/{id}/cancel", post(cancel_order))
        .route("/v1/orders/{id}/payment", post(create_payment_intent))
        .route("/v1/orders/{id}/start-production", post(start_production))
        .route("/v1/orders/{id}/ready", post(mark_ready))
        .route("/v1/orders/{id}/deliver", post(deliver_order))
        .route("/v1/orders/{id}/stamps", get(list_order_stamps))
        .route("/v1/orders/{id}/audit", get(list_order_audit))
}

// -- Creation -----------------------------------------------------------------

/// POST /v1/orders — Validate, price and store a stamp order.
///
/// The taxpayer must be verified or active, the product and stamp type
/// active, and the product present and active in the taxpayer's catalogue
/// with a valid certificate when the product requires one.
#[utoipa::path(
    post,
    path = "/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created"),
        (status = 403, description = "Order for another taxpayer", body = crate::error::ErrorBody),
        (status = 422, description = "Validation failed", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<StampOrder>>), AppError> {
    let req = extract_json(body)?;

    let taxpayer_id = match (req.taxpayer_id, caller.taxpayer_id) {
        (Some(id), _) => TaxpayerId::from_uuid(id),
        (None, Some(own)) => own,
        (None, None) => {
            return Err(AppError::field(
                "taxpayer_id",
                "The taxpayer id field is required.",
            ))
        }
    };
    require_taxpayer_access(&caller, taxpayer_id)?;

    let taxpayer = state
        .taxpayers
        .get(&taxpayer_id)
        .ok_or_else(|| AppError::field("taxpayer_id", format!("{taxpayer_id} does not exist")))?;
    if !taxpayer.registration.status.can_order() {
        return Err(AppError::Validation(format!(
            "taxpayer is {} and may not order stamps",
            taxpayer.registration.status
        )));
    }

    let product_id = ProductId::from_uuid(req.product_id);
    let pricing = price(&state, product_id, req.quantity)?;

    let stamp_type_id = StampTypeId::from_uuid(req.stamp_type_id);
    match state.stamp_types.get(&stamp_type_id) {
        Some(t) if t.is_active => {}
        Some(_) => {
            return Err(AppError::field(
                "stamp_type_id",
                format!("{stamp_type_id} is not active"),
            ))
        }
        None => {
            return Err(AppError::field(
                "stamp_type_id",
                format!("{stamp_type_id} does not exist"),
            ))
        }
    }

    let entry = state
        .catalogue
        .find(|e| e.taxpayer_id == taxpayer_id && e.product_id == product_id)
        .ok_or_else(|| {
            AppError::field("product_id", "The product is not in the taxpayer's catalogue.")
        })?;
    if !entry.lifecycle.status.is_orderable() {
        return Err(AppError::field(
            "product_id",
            format!(
                "The catalogue entry for this product is {}.",
                entry.lifecycle.status
            ),
        ));
    }
    let requires_certificate = state
        .products
        .get(&product_id)
        .is_some_and(|p| p.requires_certificate);
    if requires_certificate && !entry.has_valid_certificate(Utc::now().date_naive()) {
        return Err(AppError::field(
            "product_id",
            "This product requires a valid, unexpired certificate.",
        ));
    }

    let now = Utc::now();
    let initial = if req.draft {
        OrderStatus::Draft
    } else {
        OrderStatus::Submitted
    };
    let notes = non_blank(req.notes);
    let build = |id: OrderId| StampOrder {
        id,
        order_number: issuance::order_number(id.as_uuid(), now),
        taxpayer_id,
        product_id,
        stamp_type_id,
        quantity: pricing.quantity,
        unit_price: pricing.unit_price,
        total_amount: pricing.total_amount,
        tax_rate_bps: pricing.tax_rate_bps,
        tax_amount: pricing.tax_amount,
        grand_total: pricing.grand_total,
        lifecycle: Lifecycle::new(initial),
        notes: notes.clone(),
        rejection_reason: None,
        cancellation_reason: None,
        approved_at: None,
        delivered_at: None,
        created_at: now,
        updated_at: now,
    };
    let order = (0..issuance::ISSUE_ATTEMPTS)
        .map(|_| build(OrderId::new()))
        .find(|candidate| {
            state.orders.insert_unique(candidate.id, candidate.clone(), |o| {
                o.order_number == candidate.order_number
            })
        })
        .ok_or_else(|| {
            AppError::Conflict("could not allocate a unique order number; retry".into())
        })?;

    let event = order_event(&order, "order.created".into(), "create", caller.actor())
        .with_metadata(serde_json::json!({
            "order_number": order.order_number,
            "status": order.lifecycle.status.as_str(),
            "quantity": order.quantity,
            "grand_total": order.grand_total,
        }));
    if let Some(pool) = &state.db_pool {
        persist_or_revert(
            &state.orders,
            &order.id,
            None,
            &order,
            "order",
            db::orders::insert_with_audit(pool, &order, &event),
        )
        .await?;
    }

    counter!("rsm_orders_created_total", "status" => initial.as_str()).increment(1);
    tracing::info!(
        order_id = %order.id,
        order_number = %order.order_number,
        taxpayer_id = %taxpayer_id,
        quantity = order.quantity,
        grand_total = order.grand_total,
        "order created"
    );
    Ok(created("Order created.", order))
}

/// POST /v1/orders/quote — Price preview using the current configuration.
#[utoipa::path(
    post,
    path = "/v1/orders/quote",
    request_body = QuoteRequest,
    responses(
        (status = 200, description = "Price breakdown"),
        (status = 422, description = "Unknown product or quantity out of range", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub async fn quote_order(
    State(state): State<AppState>,
    body: Result<Json<QuoteRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Quote>>, AppError> {
    let req = extract_json(body)?;
    let product_id = ProductId::from_uuid(req.product_id);
    let pricing = price(&state, product_id, req.quantity)?;
    Ok(ok(
        "Quote computed.",
        Quote {
            product_id,
            pricing,
            grand_total_formatted: format_amount(pricing.grand_total),
        },
    ))
}

// -- Queries ------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/orders",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Orders, newest first"),
        (status = 422, description = "Unknown status filter", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<ApiResponse<Vec<StampOrder>>>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(OrderStatus::parse)
        .transpose()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let taxpayer = query.taxpayer_id.map(TaxpayerId::from_uuid);

    let mut orders = state.orders.filter(|o| {
        caller.can_access_taxpayer(o.taxpayer_id)
            && status.map_or(true, |s| o.lifecycle.status == s)
            && taxpayer.map_or(true, |t| o.taxpayer_id == t)
    });
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(ok("Orders retrieved.", orders))
}

#[utoipa::path(
    get,
    path = "/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Order details"),
        (status = 404, description = "Order not found", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderDetail>>, AppError> {
    let id = OrderId::from_uuid(id);
    let order = find_order(&state, &caller, id)?;
    let payment = state.payments.find(|p| p.order_id == id);
    let stamp_count = state.stamps.filter(|s| s.order_id == id).len();
    Ok(ok(
        "Order retrieved.",
        OrderDetail {
            order,
            payment,
            stamp_count,
        },
    ))
}

#[utoipa::path(
    get,
    path = "/v1/orders/{id}/stamps",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Stamps ordered by serial"),
        (status = 404, description = "Order not found", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub async fn list_order_stamps(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<Stamp>>>, AppError> {
    let id = OrderId::from_uuid(id);
    find_order(&state, &caller, id)?;
    let mut stamps = state.stamps.filter(|s| s.order_id == id);
    stamps.sort_by(|a, b| a.serial_number.cmp(&b.serial_number));
    Ok(ok("Stamps retrieved.", stamps))
}

/// Audit events recorded against the order, oldest first. Empty when the
/// service runs without a database.
#[utoipa::path(
    get,
    path = "/v1/orders/{id}/audit",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Audit events of the order"),
        (status = 403, description = "Agent role required", body = crate::error::ErrorBody),
        (status = 404, description = "Order not found", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub async fn list_order_audit(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<AuditEventRow>>>, AppError> {
    require_role(&caller, Role::Agent)?;
    let id = OrderId::from_uuid(id);
    find_order(&state, &caller, id)?;
    let events = match &state.db_pool {
        Some(pool) => db::audit::events_for_resource(pool, "order", *id.as_uuid())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, order_id = %id, "failed to load audit events");
                AppError::Internal(format!("failed to load audit events: {e}"))
            })?,
        None => Vec::new(),
    };
    Ok(ok("Audit trail retrieved.", events))
}

// -- Taxpayer actions ---------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/orders/{id}/submit",
    params(("id" = Uuid, Path, description = "Order UUID")),
    request_body(content = ActionRequest, description = "Optional expected version"),
    responses(
        (status = 200, description = "Order submitted"),
        (status = 422, description = "Not a draft", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub async fn submit_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<ApiResponse<StampOrder>>, AppError> {
    let action: ActionRequest = extract_optional_json(body)?;
    let order = transition_order(
        &state,
        &caller,
        OrderId::from_uuid(id),
        action,
        "submitted",
        |o, ev| Ok(o.lifecycle.submit(ev)?),
    )
    .await?;
    Ok(ok("Order submitted.", order))
}

/// POST /v1/orders/{id}/cancel — Withdraw an order before payment is
/// confirmed. A pending payment intent is cancelled with it.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order UUID")),
    request_body(content = ActionRequest, description = "Reason is required"),
    responses(
        (status = 200, description = "Order cancelled"),
        (status = 422, description = "Payment already confirmed or reason missing", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<ApiResponse<StampOrder>>, AppError> {
    let id = OrderId::from_uuid(id);
    let action: ActionRequest = extract_optional_json(body)?;
    find_order(&state, &caller, id)?;
    let evidence = action.evidence(&caller);
    let payment_evidence = caller.evidence();
    let payments = state.payments.clone();
    let now = Utc::now();

    let (before, order, payment_change) = state
        .orders
        .try_update(&id, |o| {
            o.lifecycle.check_version(action.expected_version)?;
            let mut next = o.clone();
            next.lifecycle.cancel(evidence)?;
            next.cancellation_reason =
                next.lifecycle.last_transition().and_then(|r| r.reason.clone());
            next.updated_at = now;

            let pending = payments
                .find(|p| p.order_id == id && p.lifecycle.status == PaymentStatus::Pending);
            let payment_change = match pending {
                Some(pending) => {
                    let reason = format!("order {} cancelled", o.order_number);
                    payments
                        .try_update(&pending.id, |p| {
                            let before = p.clone();
                            p.lifecycle.cancel(payment_evidence.with_reason(reason))?;
                            p.updated_at = now;
                            Ok::<_, AppError>((before, p.clone()))
                        })
                        .transpose()?
                }
                None => None,
            };

            let before = std::mem::replace(o, next.clone());
            Ok::<_, AppError>((before, next, payment_change))
        })
        .ok_or_else(|| not_found(id))??;

    if let Some(pool) = &state.db_pool {
        let written = match &payment_change {
            Some((_, payment)) => db::orders::save_with_payment(pool, &order, payment).await,
            None => db::orders::save(pool, &order).await,
        };
        if let Err(e) = written {
            state.orders.revert(&id, Some(before), &order);
            if let Some((payment_before, payment)) = payment_change {
                state
                    .payments
                    .revert(&payment.id, Some(payment_before), &payment);
            }
            return Err(persist_error("order", id, e));
        }
    }

    finish_transition(&state, &caller, &order, "cancelled").await;
    if let Some((_, cancelled)) = payment_change {
        record_transition(cancelled.lifecycle.status);
        state
            .audit(
                AuditEvent::new(
                    "payment.cancelled",
                    "payment",
                    *cancelled.id.as_uuid(),
                    "transition",
                )
                .by(caller.actor())
                .with_metadata(serde_json::json!({ "reference": cancelled.reference })),
            )
            .await;
    }

    Ok(ok("Order cancelled.", order))
}

/// POST /v1/orders/{id}/payment — Issue the single payment intent of an
/// approved order and move it to `payment_pending`.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/payment",
    params(("id" = Uuid, Path, description = "Order UUID")),
    request_body(content = PaymentIntentRequest, description = "Optional payment method"),
    responses(
        (status = 201, description = "Payment intent created"),
        (status = 409, description = "A payment already exists", body = crate::error::ErrorBody),
        (status = 422, description = "Order not approved", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<Payment>>), AppError> {
    let id = OrderId::from_uuid(id);
    let req: PaymentIntentRequest = extract_optional_json(body)?;
    find_order(&state, &caller, id)?;
    let payment_method = non_blank(req.payment_method);
    let evidence = caller.evidence();
    let payments = state.payments.clone();

    let (before, order, payment) = state
        .orders
        .try_update(&id, |o| {
            if payments.any(|p| p.order_id == id) {
                return Err(AppError::Conflict(format!(
                    "order {} already has a payment intent",
                    o.order_number
                )));
            }
            let mut next = o.clone();
            next.lifecycle.await_payment(evidence)?;
            let now = Utc::now();
            next.updated_at = now;

            let payment = (0..issuance::ISSUE_ATTEMPTS)
                .map(|_| {
                    let payment_id = PaymentId::new();
                    Payment {
                        id: payment_id,
                        order_id: next.id,
                        taxpayer_id: next.taxpayer_id,
                        reference: issuance::payment_reference(payment_id.as_uuid(), now),
                        amount: next.grand_total,
                        lifecycle: Lifecycle::new(PaymentStatus::Pending),
                        payment_method: payment_method.clone(),
                        bank_reference: None,
                        paid_at: None,
                        created_at: now,
                        updated_at: now,
                    }
                })
                .find(|candidate| {
                    payments.insert_unique(candidate.id, candidate.clone(), |p| {
                        p.order_id == id || p.reference == candidate.reference
                    })
                })
                .ok_or_else(|| {
                    AppError::Conflict("could not allocate a unique payment reference; retry".into())
                })?;

            let before = std::mem::replace(o, next.clone());
            Ok::<_, AppError>((before, next, payment))
        })
        .ok_or_else(|| not_found(id))??;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = db::orders::save_with_payment(pool, &order, &payment).await {
            state.orders.revert(&id, Some(before), &order);
            state.payments.revert(&payment.id, None, &payment);
            return Err(persist_error("payment", payment.id, e));
        }
    }
    record_transition(order.lifecycle.status);
    state
        .audit(
            AuditEvent::new("payment.created", "payment", *payment.id.as_uuid(), "create")
                .by(caller.actor())
                .with_metadata(serde_json::json!({
                    "order_id": order.id.as_uuid(),
                    "reference": payment.reference,
                    "amount": payment.amount,
                })),
        )
        .await;
    state
        .audit(order_event(
            &order,
            "order.payment_pending".into(),
            "transition",
            caller.actor(),
        ))
        .await;

    tracing::info!(
        order_id = %order.id,
        payment_id = %payment.id,
        reference = %payment.reference,
        amount = payment.amount,
        "payment intent created"
    );
    Ok(created("Payment intent created.", payment))
}

// -- Review (agent) -----------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/orders/{id}/verify",
    params(("id" = Uuid, Path, description = "Order UUID")),
    request_body(content = ActionRequest, description = "Optional expected version"),
    responses(
        (status = 200, description = "Order under verification"),
        (status = 422, description = "Not submitted", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub async fn verify_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<ApiResponse<StampOrder>>, AppError> {
    require_role(&caller, Role::Agent)?;
    let action: ActionRequest = extract_optional_json(body)?;
    let order = transition_order(
        &state,
        &caller,
        OrderId::from_uuid(id),
        action,
        "verification_started",
        |o, ev| Ok(o.lifecycle.begin_verification(ev)?),
    )
    .await?;
    Ok(ok("Order under verification.", order))
}

/// POST /v1/orders/{id}/approve — Legal only from `submitted` or
/// `pending_verification`; anything else answers 422.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/approve",
    params(("id" = Uuid, Path, description = "Order UUID")),
    request_body(content = ActionRequest, description = "Optional expected version"),
    responses(
        (status = 200, description = "Order approved"),
        (status = 409, description = "Version mismatch", body = crate::error::ErrorBody),
        (status = 422, description = "Order not reviewable", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub async fn approve_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<ApiResponse<StampOrder>>, AppError> {
    require_role(&caller, Role::Agent)?;
    let action: ActionRequest = extract_optional_json(body)?;
    let order = transition_order(
        &state,
        &caller,
        OrderId::from_uuid(id),
        action,
        "approved",
        |o, ev| {
            o.lifecycle.approve(ev)?;
            o.approved_at = Some(Utc::now());
            Ok(())
        },
    )
    .await?;
    Ok(ok("Order approved.", order))
}

#[utoipa::path(
    post,
    path = "/v1/orders/{id}/reject",
    params(("id" = Uuid, Path, description = "Order UUID")),
    request_body(content = ActionRequest, description = "Reason is required"),
    responses(
        (status = 200, description = "Order rejected"),
        (status = 422, description = "Order not reviewable or reason missing", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub async fn reject_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<ApiResponse<StampOrder>>, AppError> {
    require_role(&caller, Role::Agent)?;
    let action: ActionRequest = extract_optional_json(body)?;
    let order = transition_order(
        &state,
        &caller,
        OrderId::from_uuid(id),
        action,
        "rejected",
        |o, ev| {
            o.lifecycle.reject(ev)?;
            o.rejection_reason = o.lifecycle.last_transition().and_then(|r| r.reason.clone());
            Ok(())
        },
    )
    .await?;
    Ok(ok("Order rejected.", order))
}

// -- Fulfilment (agent) -------------------------------------------------------

/// POST /v1/orders/{id}/start-production — Move a paid order into
/// production and generate its `quantity` stamps.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/start-production",
    params(("id" = Uuid, Path, description = "Order UUID")),
    request_body(content = ActionRequest, description = "Optional expected version"),
    responses(
        (status = 200, description = "Production started, stamps generated"),
        (status = 422, description = "Payment not confirmed", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub async fn start_production(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<ApiResponse<OrderDetail>>, AppError> {
    require_role(&caller, Role::Agent)?;
    let id = OrderId::from_uuid(id);
    let action: ActionRequest = extract_optional_json(body)?;

    let existing = find_order(&state, &caller, id)?;
    let stamp_type = state.stamp_types.get(&existing.stamp_type_id).ok_or_else(|| {
        AppError::Validation(format!("{} no longer exists", existing.stamp_type_id))
    })?;
    let quantity = u32::try_from(existing.quantity)
        .map_err(|_| AppError::Validation(format!("quantity {} is too large", existing.quantity)))?;

    let evidence = action.evidence(&caller);
    let (before, order) = apply_transition(&state, id, action.expected_version, |o| {
        Ok(o.lifecycle.start_production(evidence)?)
    })?;

    let now = Utc::now();
    let stamps: Vec<Stamp> = (1..=quantity)
        .map(|seq| {
            let serial_number = issuance::stamp_serial(&stamp_type.code, order.id.as_uuid(), seq);
            Stamp {
                id: StampId::new(),
                verification_code: issuance::verification_code(&serial_number, order.id.as_uuid()),
                serial_number,
                order_id: order.id,
                taxpayer_id: order.taxpayer_id,
                product_id: order.product_id,
                stamp_type_id: order.stamp_type_id,
                kind: stamp_type.kind,
                lifecycle: Lifecycle::new(StampStatus::Produced),
                activated_at: None,
                used_at: None,
                created_at: now,
                updated_at: now,
            }
        })
        .collect();

    let batch: Vec<(StampId, Stamp)> = stamps.iter().map(|s| (s.id, s.clone())).collect();
    if let Err(serial) = state
        .stamps
        .insert_all_unique(&batch, |s| s.serial_number.clone())
    {
        state.orders.revert(&id, Some(before), &order);
        return Err(AppError::Conflict(format!(
            "stamp serial {serial} has already been issued"
        )));
    }
    if let Some(pool) = &state.db_pool {
        if let Err(e) = db::orders::save_with_stamps(pool, &order, &stamps).await {
            for stamp in &stamps {
                state.stamps.revert(&stamp.id, None, stamp);
            }
            state.orders.revert(&id, Some(before), &order);
            return Err(persist_error("order", id, e));
        }
    }

    finish_transition(&state, &caller, &order, "production_started").await;
    counter!("rsm_stamps_generated_total").increment(u64::from(quantity));
    tracing::info!(
        order_id = %order.id,
        stamp_type = %stamp_type.code,
        count = quantity,
        "stamps generated"
    );

    let payment = state.payments.find(|p| p.order_id == id);
    Ok(ok(
        format!("Production started; {quantity} stamps generated."),
        OrderDetail {
            order,
            payment,
            stamp_count: stamps.len(),
        },
    ))
}

#[utoipa::path(
    post,
    path = "/v1/orders/{id}/ready",
    params(("id" = Uuid, Path, description = "Order UUID")),
    request_body(content = ActionRequest, description = "Optional expected version"),
    responses(
        (status = 200, description = "Order ready for delivery"),
        (status = 422, description = "Not in production", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub async fn mark_ready(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<ApiResponse<StampOrder>>, AppError> {
    require_role(&caller, Role::Agent)?;
    let action: ActionRequest = extract_optional_json(body)?;
    let order = transition_order(
        &state,
        &caller,
        OrderId::from_uuid(id),
        action,
        "ready",
        |o, ev| Ok(o.lifecycle.mark_ready(ev)?),
    )
    .await?;
    Ok(ok("Order ready for delivery.", order))
}

/// POST /v1/orders/{id}/deliver — Only from `ready_for_delivery`.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/deliver",
    params(("id" = Uuid, Path, description = "Order UUID")),
    request_body(content = ActionRequest, description = "Optional expected version"),
    responses(
        (status = 200, description = "Order delivered"),
        (status = 422, description = "Not ready for delivery", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub async fn deliver_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<ApiResponse<StampOrder>>, AppError> {
    require_role(&caller, Role::Agent)?;
    let action: ActionRequest = extract_optional_json(body)?;
    let order = transition_order(
        &state,
        &caller,
        OrderId::from_uuid(id),
        action,
        "delivered",
        |o, ev| {
            o.lifecycle.deliver(ev)?;
            o.delivered_at = Some(Utc::now());
            Ok(())
        },
    )
    .await?;
    Ok(ok("Order delivered.", order))
}
