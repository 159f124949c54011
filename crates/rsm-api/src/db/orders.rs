//! Stamp order persistence.
//!
//! Order creation writes the row and its audit event in one transaction.
//! Transitions that touch a payment or produce stamps write the order and
//! those rows in one transaction; the rest use [`save`].

use chrono::{DateTime, Utc};
use rsm_core::{OrderId, ProductId, StampTypeId, TaxpayerId};
use rsm_state::OrderStatus;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::audit::{self, AuditEvent};
use super::{restore_lifecycle, transitions_json};
use crate::records::{Payment, Stamp, StampOrder};

async fn upsert(conn: &mut PgConnection, record: &StampOrder) -> Result<(), sqlx::Error> {
    let transitions = transitions_json(&record.lifecycle.transitions)?;

    sqlx::query(
        "INSERT INTO stamp_orders (id, order_number, taxpayer_id, product_id, stamp_type_id,
            quantity, unit_price, total_amount, tax_rate_bps, tax_amount, grand_total,
            status, version, transitions, notes, rejection_reason, cancellation_reason,
            approved_at, delivered_at, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
            $18, $19, $20, $21)
         ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            version = EXCLUDED.version,
            transitions = EXCLUDED.transitions,
            notes = EXCLUDED.notes,
            rejection_reason = EXCLUDED.rejection_reason,
            cancellation_reason = EXCLUDED.cancellation_reason,
            approved_at = EXCLUDED.approved_at,
            delivered_at = EXCLUDED.delivered_at,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(record.id.as_uuid())
    .bind(&record.order_number)
    .bind(record.taxpayer_id.as_uuid())
    .bind(record.product_id.as_uuid())
    .bind(record.stamp_type_id.as_uuid())
    .bind(record.quantity)
    .bind(record.unit_price)
    .bind(record.total_amount)
    .bind(record.tax_rate_bps)
    .bind(record.tax_amount)
    .bind(record.grand_total)
    .bind(record.lifecycle.status.to_string())
    .bind(record.lifecycle.version)
    .bind(&transitions)
    .bind(&record.notes)
    .bind(&record.rejection_reason)
    .bind(&record.cancellation_reason)
    .bind(record.approved_at)
    .bind(record.delivered_at)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Save an order (upsert).
pub async fn save(pool: &PgPool, record: &StampOrder) -> Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;
    upsert(&mut conn, record).await
}

/// Insert a new order and its creation audit event atomically.
pub async fn insert_with_audit(
    pool: &PgPool,
    record: &StampOrder,
    event: &AuditEvent,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    upsert(&mut tx, record).await?;
    audit::append(&mut tx, event).await?;
    tx.commit().await
}

/// Save an order and its payment atomically.
pub async fn save_with_payment(
    pool: &PgPool,
    record: &StampOrder,
    payment: &Payment,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    upsert(&mut tx, record).await?;
    super::payments::upsert(&mut tx, payment).await?;
    tx.commit().await
}

/// Save an order entering production and its stamp batch atomically.
pub async fn save_with_stamps(
    pool: &PgPool,
    record: &StampOrder,
    stamps: &[Stamp],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    upsert(&mut tx, record).await?;
    for stamp in stamps {
        super::stamps::upsert(&mut tx, stamp).await?;
    }
    tx.commit().await
}

/// Load all orders for hydration.
pub async fn load_all(pool: &PgPool) -> Result<Vec<StampOrder>, sqlx::Error> {
    let rows = sqlx::query_as::<_, OrderRow>(
        "SELECT id, order_number, taxpayer_id, product_id, stamp_type_id, quantity, unit_price,
            total_amount, tax_rate_bps, tax_amount, grand_total, status, version, transitions,
            notes, rejection_reason, cancellation_reason, approved_at, delivered_at,
            created_at, updated_at
         FROM stamp_orders ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(OrderRow::into_record).collect()
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    taxpayer_id: Uuid,
    product_id: Uuid,
    stamp_type_id: Uuid,
    quantity: i64,
    unit_price: i64,
    total_amount: i64,
    tax_rate_bps: i64,
    tax_amount: i64,
    grand_total: i64,
    status: String,
    version: i64,
    transitions: serde_json::Value,
    notes: Option<String>,
    rejection_reason: Option<String>,
    cancellation_reason: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_record(self) -> Result<StampOrder, sqlx::Error> {
        let id = OrderId::from_uuid(self.id);
        let lifecycle =
            restore_lifecycle::<OrderStatus>(id, &self.status, self.version, self.transitions)?;
        Ok(StampOrder {
            id,
            order_number: self.order_number,
            taxpayer_id: TaxpayerId::from_uuid(self.taxpayer_id),
            product_id: ProductId::from_uuid(self.product_id),
            stamp_type_id: StampTypeId::from_uuid(self.stamp_type_id),
            quantity: self.quantity,
            unit_price: self.unit_price,
            total_amount: self.total_amount,
            tax_rate_bps: self.tax_rate_bps,
            tax_amount: self.tax_amount,
            grand_total: self.grand_total,
            lifecycle,
            notes: self.notes,
            rejection_reason: self.rejection_reason,
            cancellation_reason: self.cancellation_reason,
            approved_at: self.approved_at,
            delivered_at: self.delivered_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
