//! # Taxpayer Registry
//!
//! Routes:
//! - POST   /v1/taxpayers — Register a taxpayer (agent)
//! - GET    /v1/taxpayers — List, optionally filtered by `?status=`
//! - GET    /v1/taxpayers/{id} — Taxpayer details
//! - PUT    /v1/taxpayers/{id} — Update contact fields (non-null fields only)
//! - POST   /v1/taxpayers/{id}/verify | reject — Review (agent)
//! - POST   /v1/taxpayers/{id}/activate | suspend — Standing (admin)
//! - POST   /v1/taxpayers/{id}/resubmit — Back to review after a rejection
//!
//! Public self-registration (`POST /register`) shares [`build_taxpayer`].

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use rsm_core::{TaxIdentificationNumber, TaxpayerId};
use rsm_state::{Lifecycle, LifecycleState, RegistrationStatus, TransitionError, TransitionEvidence};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{
    check_max_len, field_errors_result, is_valid_email, non_blank, persist_or_revert, push_error,
    record_transition, required, ActionRequest,
};
use crate::auth::{require_role, require_taxpayer_access, CallerIdentity, Role};
use crate::db;
use crate::db::audit::AuditEvent;
use crate::error::{AppError, FieldErrors};
use crate::extractors::{extract_json, extract_optional_json};
use crate::records::Taxpayer;
use crate::response::{created, ok, ApiResponse};
use crate::state::AppState;

const MAX_TEXT_LEN: usize = 255;

// -- Request types ------------------------------------------------------------

/// Registration fields. Every field is optional at the serde level so that
/// missing keys surface as per-field validation errors.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct RegisterTaxpayerRequest {
    pub company_name: Option<String>,
    pub tax_identification_number: Option<String>,
    pub trade_register_number: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub activity_sector: Option<String>,
    pub legal_representative_name: Option<String>,
    pub legal_representative_phone: Option<String>,
}

/// Contact-field update. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct UpdateTaxpayerRequest {
    pub company_name: Option<String>,
    pub trade_register_number: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub activity_sector: Option<String>,
    pub legal_representative_name: Option<String>,
    pub legal_representative_phone: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TaxpayerListQuery {
    /// Registration status filter (`pending`, `verified`, …).
    pub status: Option<String>,
}

// -- Validation ---------------------------------------------------------------

/// Validate registration fields and build a `pending` taxpayer.
///
/// Collects every field error before failing. Uniqueness of the tax
/// identification number and email is checked here and again atomically on
/// insert.
pub(crate) fn build_taxpayer(
    state: &AppState,
    req: RegisterTaxpayerRequest,
) -> Result<Taxpayer, AppError> {
    let mut errors = FieldErrors::new();

    let company_name = required(&mut errors, "company_name", req.company_name);
    let nif_raw = required(
        &mut errors,
        "tax_identification_number",
        req.tax_identification_number,
    );
    let email = required(&mut errors, "email", req.email).map(|e| e.to_ascii_lowercase());
    let phone = required(&mut errors, "phone", req.phone);
    let address = required(&mut errors, "address", req.address);
    let legal_representative_name = required(
        &mut errors,
        "legal_representative_name",
        req.legal_representative_name,
    );
    let trade_register_number = non_blank(req.trade_register_number);
    let city = non_blank(req.city);
    let activity_sector = non_blank(req.activity_sector);
    let legal_representative_phone = non_blank(req.legal_representative_phone);

    for (field, value) in [
        ("company_name", company_name.as_deref()),
        ("email", email.as_deref()),
        ("address", address.as_deref()),
        ("legal_representative_name", legal_representative_name.as_deref()),
        ("trade_register_number", trade_register_number.as_deref()),
        ("city", city.as_deref()),
        ("activity_sector", activity_sector.as_deref()),
    ] {
        check_max_len(&mut errors, field, value, MAX_TEXT_LEN);
    }
    check_max_len(&mut errors, "phone", phone.as_deref(), 50);
    check_max_len(
        &mut errors,
        "legal_representative_phone",
        legal_representative_phone.as_deref(),
        50,
    );

    let nif = match nif_raw.map(TaxIdentificationNumber::new) {
        Some(Ok(nif)) => {
            if state
                .taxpayers
                .any(|t| t.tax_identification_number == nif)
            {
                push_error(
                    &mut errors,
                    "tax_identification_number",
                    "The tax identification number has already been taken.",
                );
            }
            Some(nif)
        }
        Some(Err(e)) => {
            push_error(&mut errors, "tax_identification_number", e.to_string());
            None
        }
        None => None,
    };

    if let Some(email) = email.as_deref() {
        if !is_valid_email(email) {
            push_error(&mut errors, "email", "The email must be a valid email address.");
        } else if state.taxpayers.any(|t| t.email == email) {
            push_error(&mut errors, "email", "The email has already been taken.");
        }
    }

    field_errors_result(errors)?;

    match (
        company_name,
        nif,
        email,
        phone,
        address,
        legal_representative_name,
    ) {
        (
            Some(company_name),
            Some(tax_identification_number),
            Some(email),
            Some(phone),
            Some(address),
            Some(legal_representative_name),
        ) => {
            let now = Utc::now();
            Ok(Taxpayer {
                id: TaxpayerId::new(),
                company_name,
                tax_identification_number,
                trade_register_number,
                email,
                phone,
                address,
                city,
                activity_sector,
                legal_representative_name,
                legal_representative_phone,
                registration: Lifecycle::new(RegistrationStatus::Pending),
                rejection_reason: None,
                verified_at: None,
                created_at: now,
                updated_at: now,
            })
        }
        _ => Err(AppError::Internal(
            "registration fields missing after validation".into(),
        )),
    }
}

/// Insert a validated taxpayer, persist it and append the audit event.
pub(crate) async fn register(
    state: &AppState,
    taxpayer: Taxpayer,
    actor: String,
) -> Result<Taxpayer, AppError> {
    let inserted = state.taxpayers.insert_unique(taxpayer.id, taxpayer.clone(), |t| {
        t.tax_identification_number == taxpayer.tax_identification_number
            || t.email == taxpayer.email
    });
    if !inserted {
        return Err(AppError::Conflict(
            "a taxpayer with this tax identification number or email already exists".into(),
        ));
    }

    if let Some(pool) = &state.db_pool {
        persist_or_revert(
            &state.taxpayers,
            &taxpayer.id,
            None,
            &taxpayer,
            "taxpayer",
            db::taxpayers::save(pool, &taxpayer),
        )
        .await?;
    }
    state
        .audit(
            AuditEvent::new(
                "taxpayer.registered",
                "taxpayer",
                *taxpayer.id.as_uuid(),
                "create",
            )
            .by(actor)
            .with_metadata(serde_json::json!({
                "tax_identification_number": taxpayer.tax_identification_number.as_str(),
            })),
        )
        .await;

    metrics::counter!("rsm_taxpayers_registered_total").increment(1);
    tracing::info!(taxpayer_id = %taxpayer.id, "taxpayer registered");
    Ok(taxpayer)
}

fn find_taxpayer(state: &AppState, id: TaxpayerId) -> Result<Taxpayer, AppError> {
    state
        .taxpayers
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("taxpayer {id} not found")))
}

// -- Router -------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/taxpayers", post(create_taxpayer).get(list_taxpayers))
        .route(
            "/v1/taxpayers/{id}",
            get(get_taxpayer).put(update_taxpayer),
        )
        .route("/v1/taxpayers/{id}/verify", post(verify_taxpayer))
        .route("/v1/taxpayers/{id}/reject", post(reject_taxpayer))
        .route("/v1/taxpayers/{id}/activate", post(activate_taxpayer))
        .route("/v1/taxpayers/{id}/suspend", post(suspend_taxpayer))
        .route("/v1/taxpayers/{id}/resubmit", post(resubmit_taxpayer))
}

// -- Handlers -----------------------------------------------------------------

/// POST /v1/taxpayers — Register a taxpayer on behalf of a business.
#[utoipa::path(
    post,
    path = "/v1/taxpayers",
    request_body = RegisterTaxpayerRequest,
    responses(
        (status = 201, description = "Taxpayer registered in pending status"),
        (status = 422, description = "Field validation failed", body = crate::error::ErrorBody),
    ),
    tag = "taxpayers"
)]
pub async fn create_taxpayer(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<RegisterTaxpayerRequest>, JsonRejection>,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<Taxpayer>>), AppError> {
    require_role(&caller, Role::Agent)?;
    let req = extract_json(body)?;
    let taxpayer = build_taxpayer(&state, req)?;
    let taxpayer = register(&state, taxpayer, caller.actor()).await?;
    Ok(created("Taxpayer registered.", taxpayer))
}

/// GET /v1/taxpayers — List taxpayers. Taxpayer callers see only themselves.
#[utoipa::path(
    get,
    path = "/v1/taxpayers",
    params(TaxpayerListQuery),
    responses(
        (status = 200, description = "Taxpayers, newest first"),
        (status = 422, description = "Unknown status filter", body = crate::error::ErrorBody),
    ),
    tag = "taxpayers"
)]
pub async fn list_taxpayers(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<TaxpayerListQuery>,
) -> Result<Json<ApiResponse<Vec<Taxpayer>>>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(RegistrationStatus::parse)
        .transpose()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let mut taxpayers = state.taxpayers.filter(|t| {
        caller.can_access_taxpayer(t.id) && status.map_or(true, |s| t.registration.status == s)
    });
    taxpayers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(ok("Taxpayers retrieved.", taxpayers))
}

#[utoipa::path(
    get,
    path = "/v1/taxpayers/{id}",
    params(("id" = Uuid, Path, description = "Taxpayer UUID")),
    responses(
        (status = 200, description = "Taxpayer details"),
        (status = 404, description = "Taxpayer not found", body = crate::error::ErrorBody),
    ),
    tag = "taxpayers"
)]
pub async fn get_taxpayer(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Taxpayer>>, AppError> {
    let id = TaxpayerId::from_uuid(id);
    require_taxpayer_access(&caller, id)?;
    Ok(ok("Taxpayer retrieved.", find_taxpayer(&state, id)?))
}

/// PUT /v1/taxpayers/{id} — Apply the non-null fields of the body.
#[utoipa::path(
    put,
    path = "/v1/taxpayers/{id}",
    params(("id" = Uuid, Path, description = "Taxpayer UUID")),
    request_body = UpdateTaxpayerRequest,
    responses(
        (status = 200, description = "Taxpayer updated"),
        (status = 404, description = "Taxpayer not found", body = crate::error::ErrorBody),
        (status = 422, description = "Field validation failed", body = crate::error::ErrorBody),
    ),
    tag = "taxpayers"
)]
pub async fn update_taxpayer(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateTaxpayerRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Taxpayer>>, AppError> {
    let id = TaxpayerId::from_uuid(id);
    require_taxpayer_access(&caller, id)?;
    let req = extract_json(body)?;
    find_taxpayer(&state, id)?;

    let mut errors = FieldErrors::new();
    let email = non_blank(req.email).map(|e| e.to_ascii_lowercase());
    if email.as_deref().is_some_and(|e| !is_valid_email(e)) {
        push_error(&mut errors, "email", "The email must be a valid email address.");
    }
    let company_name = non_blank(req.company_name);
    let trade_register_number = non_blank(req.trade_register_number);
    let phone = non_blank(req.phone);
    let address = non_blank(req.address);
    let city = non_blank(req.city);
    let activity_sector = non_blank(req.activity_sector);
    let legal_representative_name = non_blank(req.legal_representative_name);
    let legal_representative_phone = non_blank(req.legal_representative_phone);
    for (field, value) in [
        ("company_name", company_name.as_deref()),
        ("email", email.as_deref()),
        ("address", address.as_deref()),
        ("legal_representative_name", legal_representative_name.as_deref()),
        ("trade_register_number", trade_register_number.as_deref()),
        ("city", city.as_deref()),
        ("activity_sector", activity_sector.as_deref()),
    ] {
        check_max_len(&mut errors, field, value, MAX_TEXT_LEN);
    }
    check_max_len(&mut errors, "phone", phone.as_deref(), 50);
    check_max_len(
        &mut errors,
        "legal_representative_phone",
        legal_representative_phone.as_deref(),
        50,
    );
    field_errors_result(errors)?;

    let (before, updated) = state
        .taxpayers
        .try_update_among(&id, |t, others| {
            if let Some(email) = email.as_deref() {
                if others.values().any(|o| o.email == email) {
                    let mut errors = FieldErrors::new();
                    push_error(&mut errors, "email", "The email has already been taken.");
                    return Err(AppError::FieldValidation(errors));
                }
            }
            let before = t.clone();
            if let Some(v) = company_name {
                t.company_name = v;
            }
            if let Some(v) = email {
                t.email = v;
            }
            if let Some(v) = phone {
                t.phone = v;
            }
            if let Some(v) = address {
                t.address = v;
            }
            if let Some(v) = legal_representative_name {
                t.legal_representative_name = v;
            }
            if trade_register_number.is_some() {
                t.trade_register_number = trade_register_number;
            }
            if city.is_some() {
                t.city = city;
            }
            if activity_sector.is_some() {
                t.activity_sector = activity_sector;
            }
            if legal_representative_phone.is_some() {
                t.legal_representative_phone = legal_representative_phone;
            }
            t.updated_at = Utc::now();
            Ok::<_, AppError>((before, t.clone()))
        })
        .ok_or_else(|| AppError::NotFound(format!("taxpayer {id} not found")))??;

    if let Some(pool) = &state.db_pool {
        persist_or_revert(
            &state.taxpayers,
            &id,
            Some(before),
            &updated,
            "taxpayer",
            db::taxpayers::save(pool, &updated),
        )
        .await?;
    }
    state
        .audit(
            AuditEvent::new("taxpayer.updated", "taxpayer", *id.as_uuid(), "update")
                .by(caller.actor()),
        )
        .await;

    Ok(ok("Taxpayer updated.", updated))
}

/// Apply one registration transition under the store lock, then persist.
async fn transition_taxpayer(
    state: &AppState,
    caller: &CallerIdentity,
    id: TaxpayerId,
    action: ActionRequest,
    name: &'static str,
    apply: impl FnOnce(&mut Taxpayer, TransitionEvidence) -> Result<(), TransitionError>,
) -> Result<Taxpayer, AppError> {
    let evidence = action.evidence(caller);
    let (before, updated) = state
        .taxpayers
        .try_update(&id, |t| {
            t.registration.check_version(action.expected_version)?;
            let mut next = t.clone();
            apply(&mut next, evidence)?;
            next.updated_at = Utc::now();
            Ok::<_, TransitionError>((std::mem::replace(t, next.clone()), next))
        })
        .ok_or_else(|| AppError::NotFound(format!("taxpayer {id} not found")))??;

    if let Some(pool) = &state.db_pool {
        persist_or_revert(
            &state.taxpayers,
            &id,
            Some(before),
            &updated,
            "taxpayer",
            db::taxpayers::save(pool, &updated),
        )
        .await?;
    }
    record_transition(updated.registration.status);
    state
        .audit(
            AuditEvent::new(
                format!("taxpayer.{name}"),
                "taxpayer",
                *id.as_uuid(),
                "transition",
            )
            .by(caller.actor())
            .with_metadata(serde_json::json!({
                "registration_status": updated.registration.status.as_str(),
                "version": updated.registration.version,
            })),
        )
        .await;

    tracing::info!(
        taxpayer_id = %id,
        status = %updated.registration.status,
        actor = %caller.actor(),
        "taxpayer {name}"
    );
    Ok(updated)
}

#[utoipa::path(
    post,
    path = "/v1/taxpayers/{id}/verify",
    params(("id" = Uuid, Path, description = "Taxpayer UUID")),
    request_body(content = ActionRequest, description = "Optional expected version"),
    responses(
        (status = 200, description = "Taxpayer verified"),
        (status = 422, description = "Not pending", body = crate::error::ErrorBody),
    ),
    tag = "taxpayers"
)]
pub async fn verify_taxpayer(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<ApiResponse<Taxpayer>>, AppError> {
    require_role(&caller, Role::Agent)?;
    let action: ActionRequest = extract_optional_json(body)?;
    let taxpayer = transition_taxpayer(
        &state,
        &caller,
        TaxpayerId::from_uuid(id),
        action,
        "verified",
        |t, ev| {
            t.registration.verify(ev)?;
            t.verified_at = Some(Utc::now());
            t.rejection_reason = None;
            Ok(())
        },
    )
    .await?;
    Ok(ok("Taxpayer verified.", taxpayer))
}

#[utoipa::path(
    post,
    path = "/v1/taxpayers/{id}/reject",
    params(("id" = Uuid, Path, description = "Taxpayer UUID")),
    request_body(content = ActionRequest, description = "Reason is required"),
    responses(
        (status = 200, description = "Taxpayer rejected"),
        (status = 422, description = "Not pending or reason missing", body = crate::error::ErrorBody),
    ),
    tag = "taxpayers"
)]
pub async fn reject_taxpayer(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<ApiResponse<Taxpayer>>, AppError> {
    require_role(&caller, Role::Agent)?;
    let action: ActionRequest = extract_optional_json(body)?;
    let taxpayer = transition_taxpayer(
        &state,
        &caller,
        TaxpayerId::from_uuid(id),
        action,
        "rejected",
        |t, ev| {
            t.registration.reject(ev)?;
            t.rejection_reason = t
                .registration
                .last_transition()
                .and_then(|r| r.reason.clone());
            Ok(())
        },
    )
    .await?;
    Ok(ok("Taxpayer rejected.", taxpayer))
}

#[utoipa::path(
    post,
    path = "/v1/taxpayers/{id}/activate",
    params(("id" = Uuid, Path, description = "Taxpayer UUID")),
    request_body(content = ActionRequest, description = "Optional expected version"),
    responses(
        (status = 200, description = "Taxpayer activated"),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 422, description = "Not verified or suspended", body = crate::error::ErrorBody),
    ),
    tag = "taxpayers"
)]
pub async fn activate_taxpayer(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<ApiResponse<Taxpayer>>, AppError> {
    require_role(&caller, Role::Admin)?;
    let action: ActionRequest = extract_optional_json(body)?;
    let taxpayer = transition_taxpayer(
        &state,
        &caller,
        TaxpayerId::from_uuid(id),
        action,
        "activated",
        |t, ev| t.registration.activate(ev),
    )
    .await?;
    Ok(ok("Taxpayer activated.", taxpayer))
}

#[utoipa::path(
    post,
    path = "/v1/taxpayers/{id}/suspend",
    params(("id" = Uuid, Path, description = "Taxpayer UUID")),
    request_body(content = ActionRequest, description = "Reason is required"),
    responses(
        (status = 200, description = "Taxpayer suspended"),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 422, description = "Illegal transition or reason missing", body = crate::error::ErrorBody),
    ),
    tag = "taxpayers"
)]
pub async fn suspend_taxpayer(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<ApiResponse<Taxpayer>>, AppError> {
    require_role(&caller, Role::Admin)?;
    let action: ActionRequest = extract_optional_json(body)?;
    let taxpayer = transition_taxpayer(
        &state,
        &caller,
        TaxpayerId::from_uuid(id),
        action,
        "suspended",
        |t, ev| t.registration.suspend(ev),
    )
    .await?;
    Ok(ok("Taxpayer suspended.", taxpayer))
}

#[utoipa::path(
    post,
    path = "/v1/taxpayers/{id}/resubmit",
    params(("id" = Uuid, Path, description = "Taxpayer UUID")),
    request_body(content = ActionRequest, description = "Optional expected version"),
    responses(
        (status = 200, description = "Registration back in review"),
        (status = 422, description = "Not rejected", body = crate::error::ErrorBody),
    ),
    tag = "taxpayers"
)]
pub async fn resubmit_taxpayer(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<ApiResponse<Taxpayer>>, AppError> {
    let id = TaxpayerId::from_uuid(id);
    require_taxpayer_access(&caller, id)?;
    let action: ActionRequest = extract_optional_json(body)?;
    let taxpayer = transition_taxpayer(&state, &caller, id, action, "resubmitted", |t, ev| {
        t.registration.resubmit(ev)?;
        t.rejection_reason = None;
        Ok(())
    })
    .await?;
    Ok(ok("Registration resubmitted.", taxpayer))
}
