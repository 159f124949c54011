//! # Stamp Types
//!
//! Routes:
//! - POST   /v1/stamp-types — Create a stamp type (admin)
//! - GET    /v1/stamp-types — List stamp types
//! - GET    /v1/stamp-types/{id} — Stamp type details

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use rsm_core::StampTypeId;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{non_blank, persist_or_revert};
use super::products::validate_code;
use crate::auth::{require_role, CallerIdentity, Role};
use crate::db;
use crate::db::audit::AuditEvent;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::records::{StampKind, StampType};
use crate::response::{created, ok, ApiResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateStampTypeRequest {
    /// Prefix of every serial of this type, e.g. `TAB`.
    pub code: String,
    pub name: String,
    pub kind: StampKind,
    pub description: Option<String>,
}

impl Validate for CreateStampTypeRequest {
    fn validate(&self) -> Result<(), String> {
        validate_code(&self.code)?;
        if self.name.trim().is_empty() {
            return Err("name must not be empty".into());
        }
        Ok(())
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/stamp-types",
            post(create_stamp_type).get(list_stamp_types),
        )
        .route("/v1/stamp-types/{id}", get(get_stamp_type))
}

#[utoipa::path(
    post,
    path = "/v1/stamp-types",
    request_body = CreateStampTypeRequest,
    responses(
        (status = 201, description = "Stamp type created"),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 422, description = "Validation failed or code taken", body = crate::error::ErrorBody),
    ),
    tag = "stamp-types"
)]
pub async fn create_stamp_type(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateStampTypeRequest>, JsonRejection>,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<StampType>>), AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_validated_json(body)?;

    let code = req.code.trim().to_ascii_uppercase();
    let now = Utc::now();
    let stamp_type = StampType {
        id: StampTypeId::new(),
        code: code.clone(),
        name: req.name.trim().to_string(),
        kind: req.kind,
        description: non_blank(req.description),
        is_active: true,
        created_at: now,
        updated_at: now,
    };

    if !state
        .stamp_types
        .insert_unique(stamp_type.id, stamp_type.clone(), |t| t.code == code)
    {
        return Err(AppError::field("code", "The code has already been taken."));
    }

    if let Some(pool) = &state.db_pool {
        persist_or_revert(
            &state.stamp_types,
            &stamp_type.id,
            None,
            &stamp_type,
            "stamp type",
            db::stamp_types::save(pool, &stamp_type),
        )
        .await?;
    }
    state
        .audit(
            AuditEvent::new(
                "stamp_type.created",
                "stamp_type",
                *stamp_type.id.as_uuid(),
                "create",
            )
            .by(caller.actor())
            .with_metadata(serde_json::json!({
                "code": stamp_type.code,
                "kind": stamp_type.kind.as_str(),
            })),
        )
        .await;

    Ok(created("Stamp type created.", stamp_type))
}

#[utoipa::path(
    get,
    path = "/v1/stamp-types",
    responses((status = 200, description = "Stamp types ordered by code")),
    tag = "stamp-types"
)]
pub async fn list_stamp_types(State(state): State<AppState>) -> Json<ApiResponse<Vec<StampType>>> {
    let mut types = state.stamp_types.list();
    types.sort_by(|a, b| a.code.cmp(&b.code));
    ok("Stamp types retrieved.", types)
}

#[utoipa::path(
    get,
    path = "/v1/stamp-types/{id}",
    params(("id" = Uuid, Path, description = "Stamp type UUID")),
    responses(
        (status = 200, description = "Stamp type details"),
        (status = 404, description = "Stamp type not found", body = crate::error::ErrorBody),
    ),
    tag = "stamp-types"
)]
pub async fn get_stamp_type(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<StampType>>, AppError> {
    let id = StampTypeId::from_uuid(id);
    let stamp_type = state
        .stamp_types
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("stamp type {id} not found")))?;
    Ok(ok("Stamp type retrieved.", stamp_type))
}
