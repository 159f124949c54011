//! Audit event persistence — immutable hash chain.
//!
//! Every state mutation appends an audit event whose SHA-256 hash chains to
//! the previous event, forming a tamper-evident log. Appends serialize on a
//! transaction-scoped advisory lock so two writers never chain to the same
//! predecessor.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Hash the first event chains to.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Advisory lock key guarding the chain head.
const CHAIN_LOCK_KEY: i64 = 0x5253_4d5f_4155_4454;

/// An audit event to be persisted.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub event_type: String,
    pub actor: Option<String>,
    pub resource_type: String,
    pub resource_id: Uuid,
    pub action: String,
    pub metadata: serde_json::Value,
}

impl AuditEvent {
    pub fn new(
        event_type: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: Uuid,
        action: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            actor: None,
            resource_type: resource_type.into(),
            resource_id,
            action: action.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn by(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// SHA-256 over the previous hash and every field of the event.
///
/// Fields are separated by `0x1F`. A missing actor hashes as `0x00`, and
/// metadata is hashed as its compact JSON with object keys sorted, which is
/// what reading it back from `JSONB` yields.
pub fn compute_event_hash(previous_hash: &str, event: &AuditEvent) -> String {
    let resource_id = event.resource_id.to_string();
    let metadata = event.metadata.to_string();
    let mut hasher = Sha256::new();
    for field in [
        previous_hash.as_bytes(),
        event.event_type.as_bytes(),
        event.actor.as_deref().map_or(b"\0".as_slice(), str::as_bytes),
        event.resource_type.as_bytes(),
        resource_id.as_bytes(),
        event.action.as_bytes(),
        metadata.as_bytes(),
    ] {
        hasher.update(field);
        hasher.update(b"\x1f");
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Append an event inside the caller's transaction.
///
/// Takes the chain advisory lock, which is released when the transaction
/// ends.
pub async fn append(conn: &mut PgConnection, event: &AuditEvent) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(CHAIN_LOCK_KEY)
        .execute(&mut *conn)
        .await?;

    let previous_hash: Option<String> =
        sqlx::query_scalar("SELECT event_hash FROM audit_events ORDER BY seq DESC LIMIT 1")
            .fetch_optional(&mut *conn)
            .await?;
    let prev = previous_hash.as_deref().unwrap_or(GENESIS_HASH);

    let event_hash = compute_event_hash(prev, event);

    sqlx::query(
        "INSERT INTO audit_events (id, event_type, actor, resource_type, resource_id,
         action, metadata, previous_hash, event_hash, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())",
    )
    .bind(id)
    .bind(&event.event_type)
    .bind(&event.actor)
    .bind(&event.resource_type)
    .bind(event.resource_id)
    .bind(&event.action)
    .bind(&event.metadata)
    .bind(prev)
    .bind(&event_hash)
    .execute(&mut *conn)
    .await?;

    Ok(id)
}

/// Append an event in its own transaction.
pub async fn record(pool: &PgPool, event: &AuditEvent) -> Result<Uuid, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let id = append(&mut tx, event).await?;
    tx.commit().await?;
    Ok(id)
}

/// Audit events for one resource, oldest first.
pub async fn events_for_resource(
    pool: &PgPool,
    resource_type: &str,
    resource_id: Uuid,
) -> Result<Vec<AuditEventRow>, sqlx::Error> {
    sqlx::query_as::<_, AuditEventRow>(
        "SELECT seq, id, event_type, actor, resource_type, resource_id,
         action, metadata, previous_hash, event_hash, created_at
         FROM audit_events
         WHERE resource_type = $1 AND resource_id = $2
         ORDER BY seq ASC",
    )
    .bind(resource_type)
    .bind(resource_id)
    .fetch_all(pool)
    .await
}

/// Verify the first `limit` events of the chain.
pub async fn verify_chain_integrity(
    pool: &PgPool,
    limit: i64,
) -> Result<ChainIntegrityResult, sqlx::Error> {
    let events = sqlx::query_as::<_, AuditEventRow>(
        "SELECT seq, id, event_type, actor, resource_type, resource_id,
         action, metadata, previous_hash, event_hash, created_at
         FROM audit_events ORDER BY seq ASC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(verify_events(&events))
}

/// Check hash continuity and recompute every hash.
///
/// A broken link is an event whose `previous_hash` differs from the hash
/// of the event before it (or from [`GENESIS_HASH`] for the first). A
/// mismatch is an event whose stored hash differs from the recomputed one.
pub fn verify_events(events: &[AuditEventRow]) -> ChainIntegrityResult {
    let mut broken_links = 0;
    let mut hash_mismatches = 0;
    let mut expected_prev = GENESIS_HASH;

    for event in events {
        if event.previous_hash != expected_prev {
            broken_links += 1;
        }
        let recomputed = compute_event_hash(&event.previous_hash, &event.event());
        if recomputed != event.event_hash {
            hash_mismatches += 1;
        }
        expected_prev = &event.event_hash;
    }

    ChainIntegrityResult {
        total_events: events.len(),
        broken_links,
        hash_mismatches,
        chain_valid: broken_links == 0 && hash_mismatches == 0,
    }
}

/// Result of chain integrity verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainIntegrityResult {
    pub total_events: usize,
    pub broken_links: usize,
    pub hash_mismatches: usize,
    pub chain_valid: bool,
}

/// Database row for audit events.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuditEventRow {
    pub seq: i64,
    pub id: Uuid,
    pub event_type: String,
    pub actor: Option<String>,
    pub resource_type: String,
    pub resource_id: Uuid,
    pub action: String,
    pub metadata: serde_json::Value,
    pub previous_hash: String,
    pub event_hash: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEventRow {
    /// The hashed fields of the stored event.
    pub fn event(&self) -> AuditEvent {
        AuditEvent {
            event_type: self.event_type.clone(),
            actor: self.actor.clone(),
            resource_type: self.resource_type.clone(),
            resource_id: self.resource_id,
            action: self.action.clone(),
            metadata: self.metadata.clone(),
        }
    }
}
