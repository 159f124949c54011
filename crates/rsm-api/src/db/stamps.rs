//! Stamp persistence.

use chrono::{DateTime, Utc};
use rsm_core::{OrderId, ProductId, StampId, StampTypeId, TaxpayerId};
use rsm_state::StampStatus;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{restore_lifecycle, transitions_json};
use crate::records::{Stamp, StampKind};

pub(crate) async fn upsert(conn: &mut PgConnection, record: &Stamp) -> Result<(), sqlx::Error> {
    let transitions = transitions_json(&record.lifecycle.transitions)?;

    sqlx::query(
        "INSERT INTO stamps (id, serial_number, order_id, taxpayer_id, product_id, stamp_type_id,
            kind, verification_code, status, version, transitions, activated_at, used_at,
            created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
         ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            version = EXCLUDED.version,
            transitions = EXCLUDED.transitions,
            activated_at = EXCLUDED.activated_at,
            used_at = EXCLUDED.used_at,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(record.id.as_uuid())
    .bind(&record.serial_number)
    .bind(record.order_id.as_uuid())
    .bind(record.taxpayer_id.as_uuid())
    .bind(record.product_id.as_uuid())
    .bind(record.stamp_type_id.as_uuid())
    .bind(record.kind.as_str())
    .bind(&record.verification_code)
    .bind(record.lifecycle.status.to_string())
    .bind(record.lifecycle.version)
    .bind(&transitions)
    .bind(record.activated_at)
    .bind(record.used_at)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Save a stamp (upsert).
pub async fn save(pool: &PgPool, record: &Stamp) -> Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;
    upsert(&mut conn, record).await
}

/// Load all stamps for hydration.
pub async fn load_all(pool: &PgPool) -> Result<Vec<Stamp>, sqlx::Error> {
    let rows = sqlx::query_as::<_, StampRow>(
        "SELECT id, serial_number, order_id, taxpayer_id, product_id, stamp_type_id, kind,
            verification_code, status, version, transitions, activated_at, used_at,
            created_at, updated_at
         FROM stamps ORDER BY serial_number",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            let id = StampId::from_uuid(r.id);
            let kind = StampKind::parse(&r.kind).ok_or_else(|| {
                sqlx::Error::Protocol(format!("corrupt kind {:?} in {id}", r.kind))
            })?;
            let lifecycle =
                restore_lifecycle::<StampStatus>(id, &r.status, r.version, r.transitions)?;
            Ok(Stamp {
                id,
                serial_number: r.serial_number,
                order_id: OrderId::from_uuid(r.order_id),
                taxpayer_id: TaxpayerId::from_uuid(r.taxpayer_id),
                product_id: ProductId::from_uuid(r.product_id),
                stamp_type_id: StampTypeId::from_uuid(r.stamp_type_id),
                kind,
                verification_code: r.verification_code,
                lifecycle,
                activated_at: r.activated_at,
                used_at: r.used_at,
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
        })
        .collect()
}

#[derive(sqlx::FromRow)]
struct StampRow {
    id: Uuid,
    serial_number: String,
    order_id: Uuid,
    taxpayer_id: Uuid,
    product_id: Uuid,
    stamp_type_id: Uuid,
    kind: String,
    verification_code: String,
    status: String,
    version: i64,
    transitions: serde_json::Value,
    activated_at: Option<DateTime<Utc>>,
    used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
