//! Payment persistence.

use chrono::{DateTime, Utc};
use rsm_core::{OrderId, PaymentId, TaxpayerId};
use rsm_state::PaymentStatus;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{restore_lifecycle, transitions_json};
use crate::records::Payment;

pub(crate) async fn upsert(conn: &mut PgConnection, record: &Payment) -> Result<(), sqlx::Error> {
    let transitions = transitions_json(&record.lifecycle.transitions)?;

    sqlx::query(
        "INSERT INTO payments (id, order_id, taxpayer_id, reference, amount, status, version,
            transitions, payment_method, bank_reference, paid_at, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
         ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            version = EXCLUDED.version,
            transitions = EXCLUDED.transitions,
            payment_method = EXCLUDED.payment_method,
            bank_reference = EXCLUDED.bank_reference,
            paid_at = EXCLUDED.paid_at,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(record.id.as_uuid())
    .bind(record.order_id.as_uuid())
    .bind(record.taxpayer_id.as_uuid())
    .bind(&record.reference)
    .bind(record.amount)
    .bind(record.lifecycle.status.to_string())
    .bind(record.lifecycle.version)
    .bind(&transitions)
    .bind(&record.payment_method)
    .bind(&record.bank_reference)
    .bind(record.paid_at)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Save a payment (upsert). `order_id` is unique: one intent per order.
pub async fn save(pool: &PgPool, record: &Payment) -> Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;
    upsert(&mut conn, record).await
}

/// Load all payments for hydration.
pub async fn load_all(pool: &PgPool) -> Result<Vec<Payment>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PaymentRow>(
        "SELECT id, order_id, taxpayer_id, reference, amount, status, version, transitions,
            payment_method, bank_reference, paid_at, created_at, updated_at
         FROM payments ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            let id = PaymentId::from_uuid(r.id);
            let lifecycle =
                restore_lifecycle::<PaymentStatus>(id, &r.status, r.version, r.transitions)?;
            Ok(Payment {
                id,
                order_id: OrderId::from_uuid(r.order_id),
                taxpayer_id: TaxpayerId::from_uuid(r.taxpayer_id),
                reference: r.reference,
                amount: r.amount,
                lifecycle,
                payment_method: r.payment_method,
                bank_reference: r.bank_reference,
                paid_at: r.paid_at,
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
        })
        .collect()
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    order_id: Uuid,
    taxpayer_id: Uuid,
    reference: String,
    amount: i64,
    status: String,
    version: i64,
    transitions: serde_json::Value,
    payment_method: Option<String>,
    bank_reference: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
