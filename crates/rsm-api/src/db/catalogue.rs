//! Catalogue entry (`taxpayer_products`) persistence.

use chrono::{DateTime, NaiveDate, Utc};
use rsm_core::{ProductId, TaxpayerId};
use rsm_state::CatalogueStatus;
use sqlx::PgPool;
use uuid::Uuid;

use super::{restore_lifecycle, transitions_json};
use crate::records::CatalogueEntry;

/// Save a catalogue entry (upsert).
///
/// The `(taxpayer_id, product_id)` unique constraint backs the in-memory
/// duplicate check.
pub async fn save(pool: &PgPool, record: &CatalogueEntry) -> Result<(), sqlx::Error> {
    let transitions = transitions_json(&record.lifecycle.transitions)?;

    sqlx::query(
        "INSERT INTO taxpayer_products (id, taxpayer_id, product_id, status, version, transitions,
            certificate_path, certificate_expiry, notes, status_reason, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            version = EXCLUDED.version,
            transitions = EXCLUDED.transitions,
            certificate_path = EXCLUDED.certificate_path,
            certificate_expiry = EXCLUDED.certificate_expiry,
            notes = EXCLUDED.notes,
            status_reason = EXCLUDED.status_reason,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(record.id)
    .bind(record.taxpayer_id.as_uuid())
    .bind(record.product_id.as_uuid())
    .bind(record.lifecycle.status.to_string())
    .bind(record.lifecycle.version)
    .bind(&transitions)
    .bind(&record.certificate_path)
    .bind(record.certificate_expiry)
    .bind(&record.notes)
    .bind(&record.status_reason)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Delete a catalogue entry.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM taxpayer_products WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Load all catalogue entries for hydration.
pub async fn load_all(pool: &PgPool) -> Result<Vec<CatalogueEntry>, sqlx::Error> {
    let rows = sqlx::query_as::<_, CatalogueRow>(
        "SELECT id, taxpayer_id, product_id, status, version, transitions, certificate_path,
            certificate_expiry, notes, status_reason, created_at, updated_at
         FROM taxpayer_products ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            let lifecycle = restore_lifecycle::<CatalogueStatus>(
                format!("catalogue entry {}", r.id),
                &r.status,
                r.version,
                r.transitions,
            )?;
            Ok(CatalogueEntry {
                id: r.id,
                taxpayer_id: TaxpayerId::from_uuid(r.taxpayer_id),
                product_id: ProductId::from_uuid(r.product_id),
                lifecycle,
                certificate_path: r.certificate_path,
                certificate_expiry: r.certificate_expiry,
                notes: r.notes,
                status_reason: r.status_reason,
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
        })
        .collect()
}

#[derive(sqlx::FromRow)]
struct CatalogueRow {
    id: Uuid,
    taxpayer_id: Uuid,
    product_id: Uuid,
    status: String,
    version: i64,
    transitions: serde_json::Value,
    certificate_path: Option<String>,
    certificate_expiry: Option<NaiveDate>,
    notes: Option<String>,
    status_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
