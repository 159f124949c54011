//! # Field Controls
//!
//! Routes:
//! - POST   /v1/field-controls — Record an inspection (agent)
//! - GET    /v1/field-controls — List inspections, `?taxpayer_id=`
//! - GET    /v1/field-controls/{id} — Inspection with derived rates
//!
//! Rates (`compliance_rate`, `non_compliance_rate`, `counterfeit_rate`) are
//! computed on read and are `0` for an inspection that checked nothing.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use metrics::counter;
use rsm_core::{FieldControlId, TaxpayerId};
use serde::Deserialize;
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{
    check_max_len, field_errors_result, non_blank, persist_or_revert, push_error, required,
};
use crate::auth::{require_role, require_taxpayer_access, CallerIdentity, Role};
use crate::db;
use crate::db::audit::AuditEvent;
use crate::error::{AppError, FieldErrors};
use crate::extractors::extract_json;
use crate::records::FieldControl;
use crate::response::{created, ok, ApiResponse};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct CreateFieldControlRequest {
    pub taxpayer_id: Option<Uuid>,
    pub location: Option<String>,
    /// Defaults to today; may not be in the future.
    pub control_date: Option<NaiveDate>,
    pub total_items_checked: i64,
    pub compliant_items: i64,
    pub non_compliant_items: i64,
    pub counterfeit_items: i64,
    pub observations: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FieldControlListQuery {
    pub taxpayer_id: Option<Uuid>,
}

/// Field errors for the item counts of an inspection.
fn check_counts(errors: &mut FieldErrors, req: &CreateFieldControlRequest) {
    for (field, value) in [
        ("total_items_checked", req.total_items_checked),
        ("compliant_items", req.compliant_items),
        ("non_compliant_items", req.non_compliant_items),
        ("counterfeit_items", req.counterfeit_items),
    ] {
        if value < 0 {
            push_error(
                errors,
                field,
                format!("The {} must be at least 0.", field.replace('_', " ")),
            );
        }
    }
    let classified = req.compliant_items.saturating_add(req.non_compliant_items);
    if classified > req.total_items_checked {
        push_error(
            errors,
            "compliant_items",
            "Compliant and non-compliant items may not exceed the total checked.",
        );
    }
    if req.counterfeit_items > req.total_items_checked {
        push_error(
            errors,
            "counterfeit_items",
            "Counterfeit items may not exceed the total checked.",
        );
    }
}

fn render(control: &FieldControl) -> Result<Value, AppError> {
    serde_json::to_value(control.view())
        .map_err(|e| AppError::Internal(format!("field control serialization: {e}")))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/field-controls",
            post(create_field_control).get(list_field_controls),
        )
        .route("/v1/field-controls/{id}", get(get_field_control))
}

#[utoipa::path(
    post,
    path = "/v1/field-controls",
    request_body = CreateFieldControlRequest,
    responses(
        (status = 201, description = "Inspection recorded"),
        (status = 403, description = "Agent role required", body = crate::error::ErrorBody),
        (status = 422, description = "Field validation failed", body = crate::error::ErrorBody),
    ),
    tag = "field-controls"
)]
pub async fn create_field_control(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateFieldControlRequest>, JsonRejection>,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<Value>>), AppError> {
    require_role(&caller, Role::Agent)?;
    let req = extract_json(body)?;

    let mut errors = FieldErrors::new();
    let taxpayer_id = match req.taxpayer_id.map(TaxpayerId::from_uuid) {
        Some(id) if state.taxpayers.get(&id).is_some() => Some(id),
        Some(id) => {
            push_error(&mut errors, "taxpayer_id", format!("{id} does not exist"));
            None
        }
        None => {
            push_error(&mut errors, "taxpayer_id", "The taxpayer id field is required.");
            None
        }
    };
    let location = required(&mut errors, "location", req.location.clone());
    check_max_len(&mut errors, "location", location.as_deref(), 255);
    let today = Utc::now().date_naive();
    let control_date = req.control_date.unwrap_or(today);
    if control_date > today {
        push_error(
            &mut errors,
            "control_date",
            "The control date may not be in the future.",
        );
    }
    check_counts(&mut errors, &req);
    field_errors_result(errors)?;

    let (Some(taxpayer_id), Some(location)) = (taxpayer_id, location) else {
        return Err(AppError::Internal("field control validation incomplete".into()));
    };

    let control = FieldControl {
        id: FieldControlId::new(),
        agent: caller.actor(),
        taxpayer_id,
        location,
        control_date,
        total_items_checked: req.total_items_checked,
        compliant_items: req.compliant_items,
        non_compliant_items: req.non_compliant_items,
        counterfeit_items: req.counterfeit_items,
        observations: non_blank(req.observations),
        created_at: Utc::now(),
    };
    state.field_controls.insert(control.id, control.clone());

    if let Some(pool) = &state.db_pool {
        persist_or_revert(
            &state.field_controls,
            &control.id,
            None,
            &control,
            "field control",
            db::field_controls::insert(pool, &control),
        )
        .await?;
    }
    state
        .audit(
            AuditEvent::new(
                "field_control.recorded",
                "field_control",
                *control.id.as_uuid(),
                "create",
            )
            .by(caller.actor())
            .with_metadata(serde_json::json!({
                "taxpayer_id": taxpayer_id.as_uuid(),
                "total_items_checked": control.total_items_checked,
                "counterfeit_items": control.counterfeit_items,
            })),
        )
        .await;

    counter!("rsm_field_controls_total").increment(1);
    if control.counterfeit_items > 0 {
        tracing::warn!(
            field_control_id = %control.id,
            taxpayer_id = %taxpayer_id,
            counterfeit = control.counterfeit_items,
            "counterfeit stamps found during inspection"
        );
    }
    Ok(created("Field control recorded.", render(&control)?))
}

#[utoipa::path(
    get,
    path = "/v1/field-controls",
    params(FieldControlListQuery),
    responses((status = 200, description = "Inspections, most recent control date first")),
    tag = "field-controls"
)]
pub async fn list_field_controls(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<FieldControlListQuery>,
) -> Result<Json<ApiResponse<Vec<Value>>>, AppError> {
    let taxpayer = query.taxpayer_id.map(TaxpayerId::from_uuid);
    let mut controls = state.field_controls.filter(|c| {
        caller.can_access_taxpayer(c.taxpayer_id) && taxpayer.map_or(true, |t| c.taxpayer_id == t)
    });
    controls.sort_by(|a, b| {
        b.control_date
            .cmp(&a.control_date)
            .then(b.created_at.cmp(&a.created_at))
    });
    let views = controls.iter().map(render).collect::<Result<Vec<_>, _>>()?;
    Ok(ok("Field controls retrieved.", views))
}

#[utoipa::path(
    get,
    path = "/v1/field-controls/{id}",
    params(("id" = Uuid, Path, description = "Field control UUID")),
    responses(
        (status = 200, description = "Inspection with derived rates"),
        (status = 404, description = "Field control not found", body = crate::error::ErrorBody),
    ),
    tag = "field-controls"
)]
pub async fn get_field_control(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let id = FieldControlId::from_uuid(id);
    let control = state
        .field_controls
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("field control {id} not found")))?;
    require_taxpayer_access(&caller, control.taxpayer_id)?;
    Ok(ok("Field control retrieved.", render(&control)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(total: i64, compliant: i64, non_compliant: i64, counterfeit: i64) -> CreateFieldControlRequest {
        CreateFieldControlRequest {
            total_items_checked: total,
            compliant_items: compliant,
            non_compliant_items: non_compliant,
            counterfeit_items: counterfeit,
            ..Default::default()
        }
    }

    #[test]
    fn consistent_counts_pass() {
        let mut errors = FieldErrors::new();
        check_counts(&mut errors, &request(10, 7, 3, 2));
        assert!(errors.is_empty());
    }

    #[test]
    fn classified_items_cannot_exceed_total() {
        let mut errors = FieldErrors::new();
        check_counts(&mut errors, &request(10, 8, 3, 0));
        assert!(errors.contains_key("compliant_items"));
    }

    #[test]
    fn counterfeit_cannot_exceed_total_and_counts_are_non_negative() {
        let mut errors = FieldErrors::new();
        check_counts(&mut errors, &request(0, 0, -1, 1));
        assert!(errors.contains_key("counterfeit_items"));
        assert!(errors.contains_key("non_compliant_items"));
    }

    #[test]
    fn empty_inspection_is_valid() {
        let mut errors = FieldErrors::new();
        check_counts(&mut errors, &request(0, 0, 0, 0));
        assert!(errors.is_empty());
    }
}
