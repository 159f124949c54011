//! # Taxpayer Product Catalogue
//!
//! Routes:
//! - GET    /v1/taxpayers/{id}/products — The taxpayer's catalogue
//! - POST   /v1/taxpayers/{id}/products — Attach a product (status `pending`)
//! - PUT    /v1/taxpayers/{id}/products/{product_id} — Update certificate metadata
//! - DELETE /v1/taxpayers/{id}/products/{product_id} — Detach (no open orders)
//! - POST   /v1/taxpayers/{id}/products/{product_id}/status — Review (admin)
//!
//! `(taxpayer_id, product_id)` is unique: attaching a product twice is
//! refused and leaves the catalogue unchanged.

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{post, put};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use rsm_core::{ProductId, TaxpayerId};
use rsm_state::{CatalogueStatus, Lifecycle, LifecycleState, TransitionError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{non_blank, persist_or_revert, record_transition};
use crate::auth::{require_role, require_taxpayer_access, CallerIdentity, Role};
use crate::db;
use crate::db::audit::AuditEvent;
use crate::db::persist_error;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_optional_json};
use crate::records::{CatalogueEntry, Product};
use crate::response::{created, ok, ApiResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AttachProductRequest {
    pub product_id: Uuid,
    pub certificate_path: Option<String>,
    pub certificate_expiry: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct UpdateCatalogueEntryRequest {
    pub certificate_path: Option<String>,
    pub certificate_expiry: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CatalogueStatusRequest {
    /// `pending`, `active`, `rejected`, `suspended` or `expired`.
    pub status: String,
    /// Required for `rejected` and `suspended`.
    pub reason: Option<String>,
    pub expected_version: Option<i64>,
}

/// A catalogue entry with its product embedded.
#[derive(Debug, Serialize)]
pub struct CatalogueItem {
    #[serde(flatten)]
    pub entry: CatalogueEntry,
    pub product: Option<Product>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/taxpayers/{id}/products",
            post(attach_product).get(list_catalogue),
        )
        .route(
            "/v1/taxpayers/{id}/products/{product_id}",
            put(update_catalogue_entry).delete(detach_product),
        )
        .route(
            "/v1/taxpayers/{id}/products/{product_id}/status",
            post(set_catalogue_status),
        )
}

fn require_taxpayer(state: &AppState, id: TaxpayerId) -> Result<(), AppError> {
    if state.taxpayers.get(&id).is_some() {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("taxpayer {id} not found")))
    }
}

fn find_entry(
    state: &AppState,
    taxpayer_id: TaxpayerId,
    product_id: ProductId,
) -> Result<CatalogueEntry, AppError> {
    state
        .catalogue
        .find(|e| e.taxpayer_id == taxpayer_id && e.product_id == product_id)
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "{product_id} is not in the catalogue of {taxpayer_id}"
            ))
        })
}

/// Persist `entry` (undoing the in-memory write back to `previous` on
/// failure), then append the audit event.
async fn persist_entry(
    state: &AppState,
    previous: Option<CatalogueEntry>,
    entry: &CatalogueEntry,
    caller: &CallerIdentity,
    event_type: &str,
    action: &str,
) -> Result<(), AppError> {
    if let Some(pool) = &state.db_pool {
        persist_or_revert(
            &state.catalogue,
            &entry.id,
            previous,
            entry,
            "catalogue entry",
            db::catalogue::save(pool, entry),
        )
        .await?;
    }
    state
        .audit(
            AuditEvent::new(event_type, "catalogue_entry", entry.id, action)
                .by(caller.actor())
                .with_metadata(serde_json::json!({
                    "taxpayer_id": entry.taxpayer_id.as_uuid(),
                    "product_id": entry.product_id.as_uuid(),
                    "status": entry.lifecycle.status.as_str(),
                })),
        )
        .await;
    Ok(())
}

#[utoipa::path(
    get,
    path = "/v1/taxpayers/{id}/products",
    params(("id" = Uuid, Path, description = "Taxpayer UUID")),
    responses(
        (status = 200, description = "Catalogue entries with their products"),
        (status = 404, description = "Taxpayer not found", body = crate::error::ErrorBody),
    ),
    tag = "catalogue"
)]
pub async fn list_catalogue(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<CatalogueItem>>>, AppError> {
    let id = TaxpayerId::from_uuid(id);
    require_taxpayer_access(&caller, id)?;
    require_taxpayer(&state, id)?;

    let mut entries = state.catalogue.filter(|e| e.taxpayer_id == id);
    entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    let items = entries
        .into_iter()
        .map(|entry| CatalogueItem {
            product: state.products.get(&entry.product_id),
            entry,
        })
        .collect();
    Ok(ok("Catalogue retrieved.", items))
}

/// POST /v1/taxpayers/{id}/products — Attach a product to a catalogue.
#[utoipa::path(
    post,
    path = "/v1/taxpayers/{id}/products",
    params(("id" = Uuid, Path, description = "Taxpayer UUID")),
    request_body = AttachProductRequest,
    responses(
        (status = 201, description = "Product attached, pending review"),
        (status = 404, description = "Taxpayer not found", body = crate::error::ErrorBody),
        (status = 409, description = "Product already in the catalogue", body = crate::error::ErrorBody),
        (status = 422, description = "Unknown or inactive product", body = crate::error::ErrorBody),
    ),
    tag = "catalogue"
)]
pub async fn attach_product(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<AttachProductRequest>, JsonRejection>,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<CatalogueEntry>>), AppError> {
    let taxpayer_id = TaxpayerId::from_uuid(id);
    require_taxpayer_access(&caller, taxpayer_id)?;
    let req = extract_json(body)?;
    require_taxpayer(&state, taxpayer_id)?;

    let product_id = ProductId::from_uuid(req.product_id);
    match state.products.get(&product_id) {
        Some(p) if p.is_active => {}
        Some(_) => {
            return Err(AppError::Validation(format!(
                "{product_id} is not active"
            )))
        }
        None => {
            return Err(AppError::Validation(format!(
                "{product_id} does not exist"
            )))
        }
    }

    let now = Utc::now();
    let entry = CatalogueEntry {
        id: Uuid::new_v4(),
        taxpayer_id,
        product_id,
        lifecycle: Lifecycle::new(CatalogueStatus::Pending),
        certificate_path: non_blank(req.certificate_path),
        certificate_expiry: req.certificate_expiry,
        notes: non_blank(req.notes),
        status_reason: None,
        created_at: now,
        updated_at: now,
    };

    if !state.catalogue.insert_unique(entry.id, entry.clone(), |e| {
        e.taxpayer_id == taxpayer_id && e.product_id == product_id
    }) {
        return Err(AppError::Conflict(
            "This product is already in the taxpayer's catalogue.".into(),
        ));
    }

    persist_entry(&state, None, &entry, &caller, "catalogue.attached", "create").await?;
    tracing::info!(taxpayer_id = %taxpayer_id, product_id = %product_id, "product attached");
    Ok(created("Product added to catalogue.", entry))
}

/// PUT — Update certificate metadata. A new certificate on a `rejected` or
/// `expired` entry sends it back to `pending`.
#[utoipa::path(
    put,
    path = "/v1/taxpayers/{id}/products/{product_id}",
    params(
        ("id" = Uuid, Path, description = "Taxpayer UUID"),
        ("product_id" = Uuid, Path, description = "Product UUID"),
    ),
    request_body = UpdateCatalogueEntryRequest,
    responses(
        (status = 200, description = "Catalogue entry updated"),
        (status = 404, description = "Entry not found", body = crate::error::ErrorBody),
    ),
    tag = "catalogue"
)]
pub async fn update_catalogue_entry(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((id, product_id)): Path<(Uuid, Uuid)>,
    body: Result<Json<UpdateCatalogueEntryRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<CatalogueEntry>>, AppError> {
    let taxpayer_id = TaxpayerId::from_uuid(id);
    require_taxpayer_access(&caller, taxpayer_id)?;
    let req = extract_json(body)?;
    let existing = find_entry(&state, taxpayer_id, ProductId::from_uuid(product_id))?;

    let certificate_path = non_blank(req.certificate_path);
    let notes = non_blank(req.notes);
    let evidence = caller.evidence().with_reason("certificate renewed");

    let (before, updated) = state
        .catalogue
        .try_update(&existing.id, |current| {
            let mut e = current.clone();
            let new_certificate = certificate_path.is_some() || req.certificate_expiry.is_some();
            if certificate_path.is_some() {
                e.certificate_path = certificate_path;
            }
            if req.certificate_expiry.is_some() {
                e.certificate_expiry = req.certificate_expiry;
            }
            if notes.is_some() {
                e.notes = notes;
            }
            if new_certificate
                && matches!(
                    e.lifecycle.status,
                    CatalogueStatus::Rejected | CatalogueStatus::Expired
                )
            {
                e.lifecycle.set_status(CatalogueStatus::Pending, evidence)?;
                e.status_reason = None;
            }
            e.updated_at = Utc::now();
            Ok::<_, TransitionError>((std::mem::replace(current, e.clone()), e))
        })
        .ok_or_else(|| AppError::NotFound("catalogue entry not found".into()))??;

    persist_entry(&state, Some(before), &updated, &caller, "catalogue.updated", "update").await?;
    Ok(ok("Catalogue entry updated.", updated))
}

#[utoipa::path(
    delete,
    path = "/v1/taxpayers/{id}/products/{product_id}",
    params(
        ("id" = Uuid, Path, description = "Taxpayer UUID"),
        ("product_id" = Uuid, Path, description = "Product UUID"),
    ),
    responses(
        (status = 200, description = "Product removed from catalogue"),
        (status = 404, description = "Entry not found", body = crate::error::ErrorBody),
        (status = 409, description = "Open orders reference this product", body = crate::error::ErrorBody),
    ),
    tag = "catalogue"
)]
pub async fn detach_product(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((id, product_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<CatalogueEntry>>, AppError> {
    let taxpayer_id = TaxpayerId::from_uuid(id);
    let product_id = ProductId::from_uuid(product_id);
    require_taxpayer_access(&caller, taxpayer_id)?;
    let entry = find_entry(&state, taxpayer_id, product_id)?;

    if state.orders.any(|o| {
        o.taxpayer_id == taxpayer_id && o.product_id == product_id && o.lifecycle.status.is_open()
    }) {
        return Err(AppError::Conflict(
            "open orders reference this product; cancel or complete them first".into(),
        ));
    }

    let removed = state
        .catalogue
        .remove(&entry.id)
        .ok_or_else(|| AppError::NotFound("catalogue entry not found".into()))?;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = db::catalogue::delete(pool, removed.id).await {
            state.catalogue.insert_unique(removed.id, removed.clone(), |other| {
                other.id == removed.id
                    || (other.taxpayer_id == removed.taxpayer_id
                        && other.product_id == removed.product_id)
            });
            return Err(persist_error("catalogue entry", removed.id, e));
        }
    }
    state
        .audit(
            AuditEvent::new("catalogue.detached", "catalogue_entry", removed.id, "delete")
                .by(caller.actor()),
        )
        .await;

    Ok(ok("Product removed from catalogue.", removed))
}

/// POST — Admin review of a catalogue entry.
#[utoipa::path(
    post,
    path = "/v1/taxpayers/{id}/products/{product_id}/status",
    params(
        ("id" = Uuid, Path, description = "Taxpayer UUID"),
        ("product_id" = Uuid, Path, description = "Product UUID"),
    ),
    request_body = CatalogueStatusRequest,
    responses(
        (status = 200, description = "Status changed"),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 409, description = "Version mismatch", body = crate::error::ErrorBody),
        (status = 422, description = "Illegal transition or reason missing", body = crate::error::ErrorBody),
    ),
    tag = "catalogue"
)]
pub async fn set_catalogue_status(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((id, product_id)): Path<(Uuid, Uuid)>,
    body: Bytes,
) -> Result<Json<ApiResponse<CatalogueEntry>>, AppError> {
    require_role(&caller, Role::Admin)?;
    let req: Option<CatalogueStatusRequest> = extract_optional_json(body)?;
    let req = req.ok_or_else(|| AppError::field("status", "The status field is required."))?;
    let to = CatalogueStatus::parse(req.status.trim())
        .map_err(|e| AppError::field("status", e.to_string()))?;

    let entry = find_entry(
        &state,
        TaxpayerId::from_uuid(id),
        ProductId::from_uuid(product_id),
    )?;

    let mut evidence = caller.evidence();
    evidence.reason = req.reason;
    let (before, updated) = state
        .catalogue
        .try_update(&entry.id, |current| {
            current.lifecycle.check_version(req.expected_version)?;
            let mut e = current.clone();
            e.lifecycle.set_status(to, evidence)?;
            e.status_reason = e.lifecycle.last_transition().and_then(|r| r.reason.clone());
            e.updated_at = Utc::now();
            Ok::<_, TransitionError>((std::mem::replace(current, e.clone()), e))
        })
        .ok_or_else(|| AppError::NotFound("catalogue entry not found".into()))??;

    persist_entry(
        &state,
        Some(before),
        &updated,
        &caller,
        "catalogue.status_changed",
        "transition",
    )
    .await?;
    record_transition(to);
    Ok(ok(format!("Catalogue entry is now {to}."), updated))
}
