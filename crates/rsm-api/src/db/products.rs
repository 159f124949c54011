//! Product persistence.

use chrono::{DateTime, Utc};
use rsm_core::ProductId;
use sqlx::PgPool;
use uuid::Uuid;

use crate::records::Product;

/// Save a product (upsert).
pub async fn save(pool: &PgPool, record: &Product) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO products (id, code, name, category, unit_type, stamp_price,
            requires_certificate, is_active, description, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            category = EXCLUDED.category,
            unit_type = EXCLUDED.unit_type,
            stamp_price = EXCLUDED.stamp_price,
            requires_certificate = EXCLUDED.requires_certificate,
            is_active = EXCLUDED.is_active,
            description = EXCLUDED.description,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(record.id.as_uuid())
    .bind(&record.code)
    .bind(&record.name)
    .bind(&record.category)
    .bind(&record.unit_type)
    .bind(record.stamp_price)
    .bind(record.requires_certificate)
    .bind(record.is_active)
    .bind(&record.description)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load all products for hydration.
pub async fn load_all(pool: &PgPool) -> Result<Vec<Product>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ProductRow>(
        "SELECT id, code, name, category, unit_type, stamp_price, requires_certificate,
            is_active, description, created_at, updated_at
         FROM products ORDER BY code",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| Product {
            id: ProductId::from_uuid(r.id),
            code: r.code,
            name: r.name,
            category: r.category,
            unit_type: r.unit_type,
            stamp_price: r.stamp_price,
            requires_certificate: r.requires_certificate,
            is_active: r.is_active,
            description: r.description,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
        .collect())
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    code: String,
    name: String,
    category: String,
    unit_type: String,
    stamp_price: i64,
    requires_certificate: bool,
    is_active: bool,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
