//! # Stamps
//!
//! Routes (authenticated):
//! - GET    /v1/stamps/{id} — Stamp details, including its verification code
//! - POST   /v1/stamps/{id}/activate | use | report-lost — Taxpayer actions
//! - POST   /v1/stamps/{id}/void — Cancel a stamp (agent, reason required)
//!
//! Public:
//! - GET    /v1/stamps/verify/{serial}?code= — Authenticity check

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use metrics::counter;
use rsm_core::StampId;
use rsm_state::{LifecycleState, StampStatus, TransitionEvidence};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::IntoParams;
use uuid::Uuid;

use super::{persist_or_revert, record_transition, ActionRequest};
use crate::auth::{require_role, require_taxpayer_access, CallerIdentity, Role};
use crate::db;
use crate::db::audit::AuditEvent;
use crate::error::AppError;
use crate::extractors::extract_optional_json;
use crate::records::{Stamp, StampKind};
use crate::response::{ok, ApiResponse};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VerifyQuery {
    /// Verification code printed on, or embedded in, the stamp.
    pub code: Option<String>,
}

/// Public answer to an authenticity check. Never carries the code itself.
#[derive(Debug, Serialize)]
pub struct StampVerification {
    pub serial_number: String,
    pub status: StampStatus,
    pub kind: StampKind,
    /// Live stamp, and the supplied code (if any) matches.
    pub genuine: bool,
    /// `None` when no code was supplied.
    pub code_matches: Option<bool>,
    pub product_name: Option<String>,
    pub company_name: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/stamps/{id}", get(get_stamp))
        .route("/v1/stamps/{id}/activate", post(activate_stamp))
        .route("/v1/stamps/{id}/use", post(use_stamp))
        .route("/v1/stamps/{id}/report-lost", post(report_lost_stamp))
        .route("/v1/stamps/{id}/void", post(void_stamp))
}

/// The unauthenticated verification route, mounted outside the auth layer.
pub fn public_router() -> Router<AppState> {
    Router::new().route("/v1/stamps/verify/{serial}", get(verify_stamp))
}

fn not_found(id: StampId) -> AppError {
    AppError::NotFound(format!("stamp {id} not found"))
}

/// Whether `supplied` equals the stored code, ignoring case and surrounding
/// whitespace. Compared in constant time.
fn code_matches(supplied: &str, expected: &str) -> bool {
    let supplied = supplied.trim().to_ascii_lowercase();
    let expected = expected.to_ascii_lowercase();
    supplied.len() == expected.len() && bool::from(supplied.as_bytes().ct_eq(expected.as_bytes()))
}

async fn transition_stamp(
    state: &AppState,
    caller: &CallerIdentity,
    id: StampId,
    action: ActionRequest,
    name: &'static str,
    apply: impl FnOnce(&mut Stamp, TransitionEvidence) -> Result<(), AppError>,
) -> Result<Stamp, AppError> {
    let existing = state.stamps.get(&id).ok_or_else(|| not_found(id))?;
    require_taxpayer_access(caller, existing.taxpayer_id)?;
    let evidence = action.evidence(caller);

    let (before, stamp) = state
        .stamps
        .try_update(&id, |s| {
            s.lifecycle.check_version(action.expected_version)?;
            let mut next = s.clone();
            apply(&mut next, evidence)?;
            next.updated_at = Utc::now();
            Ok::<_, AppError>((std::mem::replace(s, next.clone()), next))
        })
        .ok_or_else(|| not_found(id))??;

    if let Some(pool) = &state.db_pool {
        persist_or_revert(
            &state.stamps,
            &id,
            Some(before),
            &stamp,
            "stamp",
            db::stamps::save(pool, &stamp),
        )
        .await?;
    }
    record_transition(stamp.lifecycle.status);
    state
        .audit(
            AuditEvent::new(
                format!("stamp.{name}"),
                "stamp",
                *stamp.id.as_uuid(),
                "transition",
            )
            .by(caller.actor())
            .with_metadata(serde_json::json!({
                "serial_number": stamp.serial_number,
                "status": stamp.lifecycle.status.as_str(),
            })),
        )
        .await;

    tracing::info!(stamp_id = %id, serial = %stamp.serial_number, "stamp {name}");
    Ok(stamp)
}

#[utoipa::path(
    get,
    path = "/v1/stamps/{id}",
    params(("id" = Uuid, Path, description = "Stamp UUID")),
    responses(
        (status = 200, description = "Stamp details"),
        (status = 404, description = "Stamp not found", body = crate::error::ErrorBody),
    ),
    tag = "stamps"
)]
pub async fn get_stamp(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Stamp>>, AppError> {
    let id = StampId::from_uuid(id);
    let stamp = state.stamps.get(&id).ok_or_else(|| not_found(id))?;
    require_taxpayer_access(&caller, stamp.taxpayer_id)?;
    Ok(ok("Stamp retrieved.", stamp))
}

#[utoipa::path(
    post,
    path = "/v1/stamps/{id}/activate",
    params(("id" = Uuid, Path, description = "Stamp UUID")),
    request_body(content = ActionRequest, description = "Optional expected version"),
    responses(
        (status = 200, description = "Stamp activated"),
        (status = 422, description = "Stamp not in produced state", body = crate::error::ErrorBody),
    ),
    tag = "stamps"
)]
pub async fn activate_stamp(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<ApiResponse<Stamp>>, AppError> {
    let action: ActionRequest = extract_optional_json(body)?;
    let stamp = transition_stamp(
        &state,
        &caller,
        StampId::from_uuid(id),
        action,
        "activated",
        |s, ev| {
            s.lifecycle.activate(ev)?;
            s.activated_at = Some(Utc::now());
            Ok(())
        },
    )
    .await?;
    Ok(ok("Stamp activated.", stamp))
}

#[utoipa::path(
    post,
    path = "/v1/stamps/{id}/use",
    params(("id" = Uuid, Path, description = "Stamp UUID")),
    request_body(content = ActionRequest, description = "Optional expected version"),
    responses(
        (status = 200, description = "Stamp marked used"),
        (status = 422, description = "Stamp not activated", body = crate::error::ErrorBody),
    ),
    tag = "stamps"
)]
pub async fn use_stamp(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<ApiResponse<Stamp>>, AppError> {
    let action: ActionRequest = extract_optional_json(body)?;
    let stamp = transition_stamp(
        &state,
        &caller,
        StampId::from_uuid(id),
        action,
        "used",
        |s, ev| {
            s.lifecycle.mark_used(ev)?;
            s.used_at = Some(Utc::now());
            Ok(())
        },
    )
    .await?;
    Ok(ok("Stamp marked used.", stamp))
}

#[utoipa::path(
    post,
    path = "/v1/stamps/{id}/report-lost",
    params(("id" = Uuid, Path, description = "Stamp UUID")),
    request_body(content = ActionRequest, description = "Optional reason"),
    responses(
        (status = 200, description = "Stamp reported lost"),
        (status = 422, description = "Stamp already used, lost or void", body = crate::error::ErrorBody),
    ),
    tag = "stamps"
)]
pub async fn report_lost_stamp(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<ApiResponse<Stamp>>, AppError> {
    let action: ActionRequest = extract_optional_json(body)?;
    let stamp = transition_stamp(
        &state,
        &caller,
        StampId::from_uuid(id),
        action,
        "lost",
        |s, ev| Ok(s.lifecycle.report_lost(ev)?),
    )
    .await?;
    counter!("rsm_stamps_lost_total").increment(1);
    Ok(ok("Stamp reported lost.", stamp))
}

#[utoipa::path(
    post,
    path = "/v1/stamps/{id}/void",
    params(("id" = Uuid, Path, description = "Stamp UUID")),
    request_body(content = ActionRequest, description = "Reason is required"),
    responses(
        (status = 200, description = "Stamp voided"),
        (status = 403, description = "Agent role required", body = crate::error::ErrorBody),
        (status = 422, description = "Reason missing or stamp terminal", body = crate::error::ErrorBody),
    ),
    tag = "stamps"
)]
pub async fn void_stamp(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<ApiResponse<Stamp>>, AppError> {
    require_role(&caller, Role::Agent)?;
    let action: ActionRequest = extract_optional_json(body)?;
    let stamp = transition_stamp(
        &state,
        &caller,
        StampId::from_uuid(id),
        action,
        "voided",
        |s, ev| Ok(s.lifecycle.void(ev)?),
    )
    .await?;
    Ok(ok("Stamp voided.", stamp))
}

/// GET /v1/stamps/verify/{serial} — Public authenticity check.
///
/// Unknown serials answer 404. A known serial reports `genuine` only while
/// the stamp is live and, when `code` is supplied, the code matches.
#[utoipa::path(
    get,
    path = "/v1/stamps/verify/{serial}",
    params(
        ("serial" = String, Path, description = "Stamp serial number"),
        VerifyQuery
    ),
    responses(
        (status = 200, description = "Verification result"),
        (status = 404, description = "Unknown serial", body = crate::error::ErrorBody),
    ),
    security(),
    tag = "public"
)]
pub async fn verify_stamp(
    State(state): State<AppState>,
    Path(serial): Path<String>,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<ApiResponse<StampVerification>>, AppError> {
    let serial = serial.trim().to_ascii_uppercase();
    let stamp = state
        .stamps
        .find(|s| s.serial_number == serial)
        .ok_or_else(|| AppError::NotFound(format!("no stamp with serial {serial}")))?;

    let code_ok = query
        .code
        .as_deref()
        .map(|c| code_matches(c, &stamp.verification_code));
    let genuine = stamp.lifecycle.status.is_valid() && code_ok.unwrap_or(true);

    counter!("rsm_stamp_verifications_total", "genuine" => if genuine { "true" } else { "false" })
        .increment(1);

    Ok(ok(
        "Stamp verification completed.",
        StampVerification {
            serial_number: stamp.serial_number,
            status: stamp.lifecycle.status,
            kind: stamp.kind,
            genuine,
            code_matches: code_ok,
            product_name: state.products.get(&stamp.product_id).map(|p| p.name),
            company_name: state.taxpayers.get(&stamp.taxpayer_id).map(|t| t.company_name),
        },
    ))
}
