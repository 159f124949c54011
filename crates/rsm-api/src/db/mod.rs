//! # Database Persistence Layer
//!
//! Postgres persistence via SQLx.
//!
//! The database layer is **optional**. When `DATABASE_URL` is set, every
//! write is persisted after the in-memory store is updated and the stores
//! are hydrated from Postgres on startup. When absent, the API runs
//! in-memory only (development and tests).
//!
//! Lifecycle transition logs are stored as a JSONB `transitions` column
//! next to the status and `version` columns of the owning row.

pub mod audit;
pub mod catalogue;
pub mod field_controls;
pub mod orders;
pub mod payments;
pub mod products;
pub mod stamp_types;
pub mod stamps;
pub mod taxpayers;

use std::fmt::Display;
use std::time::Duration;

use rsm_state::{Lifecycle, LifecycleState, TransitionRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::AppError;

/// Embedded migrations, shared with the operator CLI.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Connect to Postgres and apply pending migrations.
pub async fn init_pool(url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    MIGRATOR.run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}

/// Map a failed write to a 500, logging the cause.
pub(crate) fn persist_error(what: &str, id: impl Display, err: sqlx::Error) -> AppError {
    tracing::error!(error = %err, id = %id, "failed to persist {what} to database");
    AppError::Internal(format!("failed to persist {what}: {err}"))
}

// ---------------------------------------------------------------------------
// Lifecycle column helpers
// ---------------------------------------------------------------------------

pub(crate) fn transitions_json<S: Serialize>(
    transitions: &[TransitionRecord<S>],
) -> Result<serde_json::Value, sqlx::Error> {
    serde_json::to_value(transitions)
        .map_err(|e| sqlx::Error::Protocol(format!("failed to serialize transitions: {e}")))
}

/// Rebuild a [`Lifecycle`] from its three columns.
pub(crate) fn restore_lifecycle<S>(
    id: impl Display,
    status: &str,
    version: i64,
    transitions: serde_json::Value,
) -> Result<Lifecycle<S>, sqlx::Error>
where
    S: LifecycleState + DeserializeOwned,
{
    let status = S::parse(status)
        .map_err(|e| sqlx::Error::Protocol(format!("corrupt status in {id}: {e}")))?;
    let transitions: Vec<TransitionRecord<S>> = serde_json::from_value(transitions)
        .map_err(|e| sqlx::Error::Protocol(format!("corrupt transitions in {id}: {e}")))?;
    Ok(Lifecycle::restore(status, version, transitions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsm_state::{PaymentStatus, TransitionEvidence};

    #[test]
    fn lifecycle_columns_roundtrip() {
        let mut lc = Lifecycle::new(PaymentStatus::Pending);
        lc.transition(PaymentStatus::Confirmed, TransitionEvidence::by("agent"))
            .unwrap();

        let json = transitions_json(&lc.transitions).unwrap();
        let restored: Lifecycle<PaymentStatus> =
            restore_lifecycle("payment:1", lc.status.as_str(), lc.version, json).unwrap();
        assert_eq!(restored, lc);
    }

    #[test]
    fn unknown_status_is_a_protocol_error() {
        let err = restore_lifecycle::<PaymentStatus>(
            "payment:1",
            "refunded",
            1,
            serde_json::json!([]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("corrupt status"));
    }

    #[test]
    fn persist_error_is_internal() {
        let err = persist_error("order", "order:1", sqlx::Error::RowNotFound);
        assert!(matches!(err, AppError::Internal(ref m) if m.contains("order")));
    }
}
