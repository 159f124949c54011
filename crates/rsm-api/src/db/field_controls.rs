//! Field control persistence. Records are append-only.

use chrono::{DateTime, NaiveDate, Utc};
use rsm_core::{FieldControlId, TaxpayerId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::records::FieldControl;

/// Insert a field control record.
pub async fn insert(pool: &PgPool, record: &FieldControl) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO field_controls (id, agent, taxpayer_id, location, control_date,
            total_items_checked, compliant_items, non_compliant_items, counterfeit_items,
            observations, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(record.id.as_uuid())
    .bind(&record.agent)
    .bind(record.taxpayer_id.as_uuid())
    .bind(&record.location)
    .bind(record.control_date)
    .bind(record.total_items_checked)
    .bind(record.compliant_items)
    .bind(record.non_compliant_items)
    .bind(record.counterfeit_items)
    .bind(&record.observations)
    .bind(record.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load all field controls for hydration.
pub async fn load_all(pool: &PgPool) -> Result<Vec<FieldControl>, sqlx::Error> {
    let rows = sqlx::query_as::<_, FieldControlRow>(
        "SELECT id, agent, taxpayer_id, location, control_date, total_items_checked,
            compliant_items, non_compliant_items, counterfeit_items, observations, created_at
         FROM field_controls ORDER BY control_date, created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| FieldControl {
            id: FieldControlId::from_uuid(r.id),
            agent: r.agent,
            taxpayer_id: TaxpayerId::from_uuid(r.taxpayer_id),
            location: r.location,
            control_date: r.control_date,
            total_items_checked: r.total_items_checked,
            compliant_items: r.compliant_items,
            non_compliant_items: r.non_compliant_items,
            counterfeit_items: r.counterfeit_items,
            observations: r.observations,
            created_at: r.created_at,
        })
        .collect())
}

#[derive(sqlx::FromRow)]
struct FieldControlRow {
    id: Uuid,
    agent: String,
    taxpayer_id: Uuid,
    location: String,
    control_date: NaiveDate,
    total_items_checked: i64,
    compliant_items: i64,
    non_compliant_items: i64,
    counterfeit_items: i64,
    observations: Option<String>,
    created_at: DateTime<Utc>,
}
