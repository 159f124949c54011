//! Stamp type persistence.

use chrono::{DateTime, Utc};
use rsm_core::StampTypeId;
use sqlx::PgPool;
use uuid::Uuid;

use crate::records::{StampKind, StampType};

/// Save a stamp type (upsert).
pub async fn save(pool: &PgPool, record: &StampType) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO stamp_types (id, code, name, kind, description, is_active, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            kind = EXCLUDED.kind,
            description = EXCLUDED.description,
            is_active = EXCLUDED.is_active,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(record.id.as_uuid())
    .bind(&record.code)
    .bind(&record.name)
    .bind(record.kind.as_str())
    .bind(&record.description)
    .bind(record.is_active)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load all stamp types for hydration.
pub async fn load_all(pool: &PgPool) -> Result<Vec<StampType>, sqlx::Error> {
    let rows = sqlx::query_as::<_, StampTypeRow>(
        "SELECT id, code, name, kind, description, is_active, created_at, updated_at
         FROM stamp_types ORDER BY code",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            let kind = StampKind::parse(&r.kind).ok_or_else(|| {
                sqlx::Error::Protocol(format!("corrupt kind {:?} in stamp type {}", r.kind, r.id))
            })?;
            Ok(StampType {
                id: StampTypeId::from_uuid(r.id),
                code: r.code,
                name: r.name,
                kind,
                description: r.description,
                is_active: r.is_active,
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
        })
        .collect()
}

#[derive(sqlx::FromRow)]
struct StampTypeRow {
    id: Uuid,
    code: String,
    name: String,
    kind: String,
    description: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
