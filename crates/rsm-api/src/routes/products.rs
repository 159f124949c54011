//! # Product Catalogue Administration
//!
//! Routes:
//! - POST   /v1/products — Create a product (admin)
//! - GET    /v1/products — List products, `?active=true|false`
//! - GET    /v1/products/{id} — Product details
//! - PUT    /v1/products/{id} — Update a product (admin)
//!
//! Prices travel as decimal strings (`"2.50"`) and are stored in cents.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use rsm_core::{parse_amount, Cents, ProductId};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{
    check_max_len, field_errors_result, non_blank, persist_or_revert, push_error, required,
};
use crate::auth::{require_role, CallerIdentity, Role};
use crate::db;
use crate::db::audit::AuditEvent;
use crate::error::{AppError, FieldErrors};
use crate::extractors::{extract_json, extract_validated_json, Validate};
use crate::records::Product;
use crate::response::{created, ok, ApiResponse};
use crate::state::AppState;

const MAX_CODE_LEN: usize = 32;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub code: String,
    pub name: String,
    pub category: String,
    pub unit_type: String,
    /// Decimal amount, e.g. `"2.50"`.
    pub stamp_price: String,
    #[serde(default)]
    pub requires_certificate: bool,
    pub description: Option<String>,
}

impl Validate for CreateProductRequest {
    fn validate(&self) -> Result<(), String> {
        validate_code(&self.code)?;
        if self.name.trim().is_empty() {
            return Err("name must not be empty".into());
        }
        if self.category.trim().is_empty() {
            return Err("category must not be empty".into());
        }
        if self.unit_type.trim().is_empty() {
            return Err("unit_type must not be empty".into());
        }
        parse_price(&self.stamp_price).map(drop)
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub category: Option<String>,
    pub unit_type: Option<String>,
    pub stamp_price: Option<String>,
    pub requires_certificate: Option<bool>,
    pub is_active: Option<bool>,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductListQuery {
    /// Only active (`true`) or inactive (`false`) products.
    pub active: Option<bool>,
}

/// Codes are upper-cased ASCII alphanumerics, `-` and `_`.
pub(crate) fn validate_code(code: &str) -> Result<(), String> {
    let code = code.trim();
    if code.is_empty() || code.len() > MAX_CODE_LEN {
        return Err(format!("code must be 1 to {MAX_CODE_LEN} characters"));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err("code may contain only letters, digits, '-' and '_'".into());
    }
    Ok(())
}

fn parse_price(raw: &str) -> Result<Cents, String> {
    match parse_amount(raw.trim()) {
        Some(cents) if cents >= 0 => Ok(cents),
        Some(_) => Err("stamp_price must not be negative".into()),
        None => Err(format!("stamp_price {raw:?} is not a valid amount")),
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/products", post(create_product).get(list_products))
        .route("/v1/products/{id}", get(get_product).put(update_product))
}

#[utoipa::path(
    post,
    path = "/v1/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created"),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 422, description = "Validation failed or code taken", body = crate::error::ErrorBody),
    ),
    tag = "products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateProductRequest>, JsonRejection>,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<Product>>), AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_validated_json(body)?;

    let code = req.code.trim().to_ascii_uppercase();
    let stamp_price = parse_price(&req.stamp_price).map_err(AppError::Validation)?;
    let now = Utc::now();
    let product = Product {
        id: ProductId::new(),
        code: code.clone(),
        name: req.name.trim().to_string(),
        category: req.category.trim().to_string(),
        unit_type: req.unit_type.trim().to_string(),
        stamp_price,
        requires_certificate: req.requires_certificate,
        is_active: true,
        description: non_blank(req.description),
        created_at: now,
        updated_at: now,
    };

    if !state
        .products
        .insert_unique(product.id, product.clone(), |p| p.code == code)
    {
        return Err(AppError::field("code", "The code has already been taken."));
    }

    if let Some(pool) = &state.db_pool {
        persist_or_revert(
            &state.products,
            &product.id,
            None,
            &product,
            "product",
            db::products::save(pool, &product),
        )
        .await?;
    }
    state
        .audit(
            AuditEvent::new("product.created", "product", *product.id.as_uuid(), "create")
                .by(caller.actor())
                .with_metadata(serde_json::json!({ "code": product.code })),
        )
        .await;

    tracing::info!(product_id = %product.id, code = %product.code, "product created");
    Ok(created("Product created.", product))
}

#[utoipa::path(
    get,
    path = "/v1/products",
    params(ProductListQuery),
    responses((status = 200, description = "Products ordered by code")),
    tag = "products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> Json<ApiResponse<Vec<Product>>> {
    let mut products = state
        .products
        .filter(|p| query.active.map_or(true, |active| p.is_active == active));
    products.sort_by(|a, b| a.code.cmp(&b.code));
    ok("Products retrieved.", products)
}

#[utoipa::path(
    get,
    path = "/v1/products/{id}",
    params(("id" = Uuid, Path, description = "Product UUID")),
    responses(
        (status = 200, description = "Product details"),
        (status = 404, description = "Product not found", body = crate::error::ErrorBody),
    ),
    tag = "products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Product>>, AppError> {
    let id = ProductId::from_uuid(id);
    let product = state
        .products
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("product {id} not found")))?;
    Ok(ok("Product retrieved.", product))
}

#[utoipa::path(
    put,
    path = "/v1/products/{id}",
    params(("id" = Uuid, Path, description = "Product UUID")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated"),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 404, description = "Product not found", body = crate::error::ErrorBody),
        (status = 422, description = "Validation failed", body = crate::error::ErrorBody),
    ),
    tag = "products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateProductRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Product>>, AppError> {
    require_role(&caller, Role::Admin)?;
    let id = ProductId::from_uuid(id);
    let req = extract_json(body)?;

    let mut errors = FieldErrors::new();
    let name = match req.name {
        Some(name) => required(&mut errors, "name", Some(name)),
        None => None,
    };
    let category = non_blank(req.category);
    let unit_type = non_blank(req.unit_type);
    let description = non_blank(req.description);
    check_max_len(&mut errors, "name", name.as_deref(), 255);
    let stamp_price = match req.stamp_price.as_deref().map(parse_price) {
        Some(Ok(price)) => Some(price),
        Some(Err(msg)) => {
            push_error(&mut errors, "stamp_price", msg);
            None
        }
        None => None,
    };
    field_errors_result(errors)?;

    let (before, updated) = state
        .products
        .try_update(&id, |p| {
            let before = p.clone();
            if let Some(v) = name {
                p.name = v;
            }
            if let Some(v) = category {
                p.category = v;
            }
            if let Some(v) = unit_type {
                p.unit_type = v;
            }
            if let Some(v) = stamp_price {
                p.stamp_price = v;
            }
            if let Some(v) = req.requires_certificate {
                p.requires_certificate = v;
            }
            if let Some(v) = req.is_active {
                p.is_active = v;
            }
            if description.is_some() {
                p.description = description;
            }
            p.updated_at = Utc::now();
            Ok::<_, AppError>((before, p.clone()))
        })
        .ok_or_else(|| AppError::NotFound(format!("product {id} not found")))??;

    if let Some(pool) = &state.db_pool {
        persist_or_revert(
            &state.products,
            &id,
            Some(before),
            &updated,
            "product",
            db::products::save(pool, &updated),
        )
        .await?;
    }
    state
        .audit(
            AuditEvent::new("product.updated", "product", *id.as_uuid(), "update")
                .by(caller.actor())
                .with_metadata(serde_json::json!({
                    "stamp_price": updated.stamp_price,
                    "is_active": updated.is_active,
                })),
        )
        .await;

    Ok(ok("Product updated.", updated))
}
