//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! The in-memory stores are authoritative for reads. When a database pool
//! is configured every write is also persisted to Postgres, and the stores
//! are hydrated from it on startup.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::RwLock;
use rsm_core::{FieldControlId, OrderId, PaymentId, ProductId, StampId, StampTypeId, TaxpayerId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db;
use crate::db::audit::AuditEvent;
use crate::records::{
    CatalogueEntry, FieldControl, Payment, Product, Stamp, StampOrder, StampType, Taxpayer,
};

// -- Generic In-Memory Store --------------------------------------------------

/// Thread-safe, cloneable in-memory key-value store.
///
/// All operations are synchronous (the RwLock is `parking_lot`, not `tokio::sync`)
/// because the lock is never held across `.await` points.
#[derive(Debug)]
pub struct Store<K, V> {
    data: Arc<RwLock<HashMap<K, V>>>,
}

impl<K, V> Clone for Store<K, V> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<K, V> Store<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a record, returning the previous value if the key existed.
    pub fn insert(&self, id: K, value: V) -> Option<V> {
        self.data.write().insert(id, value)
    }

    /// Insert unless an existing record satisfies `conflicts`.
    ///
    /// The check and the insert happen under one write lock, so two
    /// concurrent callers cannot both pass a uniqueness check.
    pub fn insert_unique(&self, id: K, value: V, conflicts: impl Fn(&V) -> bool) -> bool {
        let mut guard = self.data.write();
        if guard.values().any(conflicts) {
            return false;
        }
        guard.insert(id, value);
        true
    }

    /// Insert a batch whose `key`s must be unique across the store and the
    /// batch. Either every record is inserted or none is; on conflict the
    /// first clashing key is returned.
    pub fn insert_all_unique<Q>(&self, batch: &[(K, V)], key: impl Fn(&V) -> Q) -> Result<(), Q>
    where
        Q: Eq + Hash,
    {
        let mut guard = self.data.write();
        let mut seen: HashSet<Q> = guard.values().map(&key).collect();
        for (_, value) in batch {
            let k = key(value);
            if seen.contains(&k) {
                return Err(k);
            }
            seen.insert(k);
        }
        for (id, value) in batch {
            guard.insert(id.clone(), value.clone());
        }
        Ok(())
    }

    /// Retrieve a record by ID.
    pub fn get(&self, id: &K) -> Option<V> {
        self.data.read().get(id).cloned()
    }

    /// List all records.
    pub fn list(&self) -> Vec<V> {
        self.data.read().values().cloned().collect()
    }

    /// Records matching a predicate.
    pub fn filter(&self, pred: impl Fn(&V) -> bool) -> Vec<V> {
        self.data
            .read()
            .values()
            .filter(|v| pred(v))
            .cloned()
            .collect()
    }

    /// First record matching a predicate.
    pub fn find(&self, pred: impl Fn(&V) -> bool) -> Option<V> {
        self.data.read().values().find(|v| pred(v)).cloned()
    }

    /// Whether any record matches a predicate.
    pub fn any(&self, pred: impl Fn(&V) -> bool) -> bool {
        self.data.read().values().any(pred)
    }

    /// Atomically read-validate-update a record.
    ///
    /// The closure runs under a single write lock, so there is no window
    /// between the precondition check and the write. Returns `None` if the
    /// record doesn't exist.
    pub fn try_update<R, E>(
        &self,
        id: &K,
        f: impl FnOnce(&mut V) -> Result<R, E>,
    ) -> Option<Result<R, E>> {
        self.data.write().get_mut(id).map(f)
    }

    /// Like [`try_update`](Self::try_update), but the closure also sees every
    /// other record, so uniqueness checks against them share the write lock.
    pub fn try_update_among<R, E>(
        &self,
        id: &K,
        f: impl FnOnce(&mut V, &HashMap<K, V>) -> Result<R, E>,
    ) -> Option<Result<R, E>> {
        let mut guard = self.data.write();
        let mut value = guard.remove(id)?;
        let result = f(&mut value, &guard);
        guard.insert(id.clone(), value);
        Some(result)
    }

    /// Undo a write whose persistence failed.
    ///
    /// Puts `previous` back (or removes the record when `previous` is `None`)
    /// only if the stored value is still exactly `written`. A record another
    /// writer has already moved on is left alone.
    pub fn revert(&self, id: &K, previous: Option<V>, written: &V) -> bool
    where
        V: PartialEq,
    {
        let mut guard = self.data.write();
        if guard.get(id) != Some(written) {
            return false;
        }
        match previous {
            Some(value) => {
                guard.insert(id.clone(), value);
            }
            None => {
                guard.remove(id);
            }
        }
        true
    }

    /// Remove a record by ID.
    pub fn remove(&self, id: &K) -> Option<V> {
        self.data.write().remove(id)
    }

    /// Return the number of records.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for Store<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

// -- Application State --------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AppState {
    pub taxpayers: Store<TaxpayerId, Taxpayer>,
    pub products: Store<ProductId, Product>,
    pub stamp_types: Store<StampTypeId, StampType>,
    pub catalogue: Store<Uuid, CatalogueEntry>,
    pub orders: Store<OrderId, StampOrder>,
    pub payments: Store<PaymentId, Payment>,
    pub stamps: Store<StampId, Stamp>,
    pub field_controls: Store<FieldControlId, FieldControl>,

    /// PostgreSQL pool. `None` means in-memory only.
    pub db_pool: Option<PgPool>,

    /// Prometheus render handle, present when the recorder is installed.
    pub metrics: Option<PrometheusHandle>,

    pub config: AppConfig,
}

impl AppState {
    /// In-memory state with default configuration.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default(), None)
    }

    /// State with the given configuration and optional database pool.
    pub fn with_config(config: AppConfig, db_pool: Option<PgPool>) -> Self {
        Self {
            taxpayers: Store::new(),
            products: Store::new(),
            stamp_types: Store::new(),
            catalogue: Store::new(),
            orders: Store::new(),
            payments: Store::new(),
            stamps: Store::new(),
            field_controls: Store::new(),
            db_pool,
            metrics: None,
            config,
        }
    }

    /// Attach a Prometheus handle for `/metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Append an audit event when a database is configured.
    ///
    /// Audit failures are logged and do not fail the request; the record
    /// itself has already been persisted.
    pub async fn audit(&self, event: AuditEvent) {
        let Some(pool) = &self.db_pool else {
            return;
        };
        if let Err(e) = db::audit::record(pool, &event).await {
            tracing::warn!(
                error = %e,
                event_type = %event.event_type,
                resource_id = %event.resource_id,
                "failed to append audit event"
            );
        }
    }

    /// Hydrate in-memory stores from the database.
    ///
    /// Called once on startup when a database pool is available.
    pub async fn hydrate_from_db(&self) -> Result<(), String> {
        let Some(pool) = &self.db_pool else {
            return Ok(());
        };

        let taxpayers = db::taxpayers::load_all(pool)
            .await
            .map_err(|e| format!("failed to load taxpayers: {e}"))?;
        let taxpayer_count = taxpayers.len();
        for record in taxpayers {
            self.taxpayers.insert(record.id, record);
        }

        let products = db::products::load_all(pool)
            .await
            .map_err(|e| format!("failed to load products: {e}"))?;
        let product_count = products.len();
        for record in products {
            self.products.insert(record.id, record);
        }

        let stamp_types = db::stamp_types::load_all(pool)
            .await
            .map_err(|e| format!("failed to load stamp types: {e}"))?;
        for record in stamp_types {
            self.stamp_types.insert(record.id, record);
        }

        let entries = db::catalogue::load_all(pool)
            .await
            .map_err(|e| format!("failed to load catalogue entries: {e}"))?;
        for record in entries {
            self.catalogue.insert(record.id, record);
        }

        let orders = db::orders::load_all(pool)
            .await
            .map_err(|e| format!("failed to load orders: {e}"))?;
        let order_count = orders.len();
        for record in orders {
            self.orders.insert(record.id, record);
        }

        let payments = db::payments::load_all(pool)
            .await
            .map_err(|e| format!("failed to load payments: {e}"))?;
        for record in payments {
            self.payments.insert(record.id, record);
        }

        let stamps = db::stamps::load_all(pool)
            .await
            .map_err(|e| format!("failed to load stamps: {e}"))?;
        let stamp_count = stamps.len();
        for record in stamps {
            self.stamps.insert(record.id, record);
        }

        let controls = db::field_controls::load_all(pool)
            .await
            .map_err(|e| format!("failed to load field controls: {e}"))?;
        for record in controls {
            self.field_controls.insert(record.id, record);
        }

        tracing::info!(
            taxpayers = taxpayer_count,
            products = product_count,
            stamp_types = self.stamp_types.len(),
            catalogue_entries = self.catalogue.len(),
            orders = order_count,
            payments = self.payments.len(),
            stamps = stamp_count,
            field_controls = self.field_controls.len(),
            "Hydrated in-memory stores from database"
        );

        Ok(())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_update_remove() {
        let store: Store<u32, String> = Store::new();
        assert!(store.is_empty());
        store.insert(1, "one".into());
        assert_eq!(store.get(&1).as_deref(), Some("one"));

        let result = store.try_update(&1, |v| {
            v.push('!');
            Ok::<_, ()>(v.len())
        });
        assert_eq!(result, Some(Ok(4)));
        assert_eq!(store.get(&1).as_deref(), Some("one!"));

        assert!(store.try_update(&2, |_| Ok::<_, ()>(())).is_none());
        assert_eq!(store.remove(&1).as_deref(), Some("one!"));
        assert!(store.is_empty());
    }

    #[test]
    fn try_update_among_sees_only_the_others() {
        let store: Store<u32, String> = Store::new();
        store.insert(1, "alpha".into());
        store.insert(2, "beta".into());

        let result = store.try_update_among(&1, |v, others| {
            if others.values().any(|o| o == "beta") {
                return Err("taken");
            }
            *v = "beta".into();
            Ok(())
        });
        assert_eq!(result, Some(Err("taken")));
        assert_eq!(store.get(&1).as_deref(), Some("alpha"));

        let result = store.try_update_among(&1, |v, others| {
            assert!(!others.contains_key(&1));
            *v = "gamma".into();
            Ok::<_, ()>(others.len())
        });
        assert_eq!(result, Some(Ok(1)));
        assert_eq!(store.get(&1).as_deref(), Some("gamma"));
        assert!(store.try_update_among(&9, |_, _| Ok::<_, ()>(())).is_none());
    }

    #[test]
    fn try_update_error_leaves_record() {
        let store: Store<u32, i64> = Store::new();
        store.insert(7, 10);
        let result = store.try_update(&7, |v| if *v > 5 { Err("too big") } else { Ok(()) });
        assert_eq!(result, Some(Err("too big")));
        assert_eq!(store.get(&7), Some(10));
    }

    #[test]
    fn insert_unique_refuses_conflicts() {
        let store: Store<u32, &'static str> = Store::new();
        assert!(store.insert_unique(1, "A1234", |v| *v == "A1234"));
        assert!(!store.insert_unique(2, "A1234", |v| *v == "A1234"));
        assert_eq!(store.len(), 1);
        assert!(store.any(|v| *v == "A1234"));
        assert_eq!(store.find(|v| v.starts_with('A')), Some("A1234"));
        assert_eq!(store.filter(|v| v.is_empty()).len(), 0);
    }

    #[test]
    fn insert_all_unique_is_all_or_nothing() {
        let store: Store<u32, String> = Store::new();
        store.insert(1, "TAB-A-000001".into());

        let clash = vec![(2, "TAB-B-000001".to_string()), (3, "TAB-A-000001".to_string())];
        assert_eq!(
            store.insert_all_unique(&clash, |v| v.clone()),
            Err("TAB-A-000001".to_string())
        );
        assert_eq!(store.len(), 1);

        let within = vec![(2, "X".to_string()), (3, "X".to_string())];
        assert!(store.insert_all_unique(&within, |v| v.clone()).is_err());
        assert_eq!(store.len(), 1);

        let fresh = vec![(2, "TAB-B-000001".to_string()), (3, "TAB-B-000002".to_string())];
        assert!(store.insert_all_unique(&fresh, |v| v.clone()).is_ok());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn revert_restores_only_the_written_value() {
        let store: Store<u32, &'static str> = Store::new();
        store.insert(1, "approved");
        assert!(store.revert(&1, Some("submitted"), &"approved"));
        assert_eq!(store.get(&1), Some("submitted"));

        store.insert(1, "cancelled");
        assert!(!store.revert(&1, Some("submitted"), &"approved"));
        assert_eq!(store.get(&1), Some("cancelled"));

        store.insert(2, "new");
        assert!(store.revert(&2, None, &"new"));
        assert!(store.get(&2).is_none());
    }

    #[test]
    fn clones_share_data() {
        let a: Store<u32, u32> = Store::new();
        let b = a.clone();
        a.insert(1, 1);
        assert_eq!(b.get(&1), Some(1));
    }

    #[test]
    fn default_state_is_empty_and_in_memory() {
        let state = AppState::new();
        assert!(state.db_pool.is_none());
        assert!(state.metrics.is_none());
        assert!(state.orders.is_empty());
        assert_eq!(state.config.port, 8080);
    }
}
