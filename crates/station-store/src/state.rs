//! Snapshot owner and mutation serializer.
//!
//! `StateStore` sits between the dispatch layer and a [`CollectionStore`]
//! backend. It owns one in-memory snapshot per entity, applies the four
//! data actions against the backend, reconciles the snapshot from the
//! backend's result, and hands the new snapshot to an [`UpdateFanout`]
//! for broadcast. A per-entity async lock is held across the whole
//! persist + reconcile + fan-out sequence so one entity's mutations are
//! observed in submission order; different entities are unordered
//! relative to each other.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use station_core::ids::ClientId;

use crate::contract::{CollectionStore, QueryOptions};
use crate::errors::{Result, StoreError};

// ─────────────────────────────────────────────────────────────────────────────
// Actions
// ─────────────────────────────────────────────────────────────────────────────

/// The four data actions an `entity:action` event can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Insert a record, assigning an id when none is supplied.
    Create,
    /// Merge a patch into the record matching the payload's `id`.
    Update,
    /// Remove the record matching the payload's `id`.
    Delete,
    /// Reload the snapshot from the backend.
    Fetch,
}

impl Action {
    /// Parse a dispatch action name. Unknown actions are `None` so the
    /// caller can fall through to plain bus delivery.
    #[must_use]
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            "fetch" => Some(Self::Fetch),
            _ => None,
        }
    }

    /// `true` for actions that change backend state and trigger fan-out.
    #[must_use]
    pub fn is_mutation(self) -> bool {
        !matches!(self, Self::Fetch)
    }
}

/// Sink for post-mutation snapshot broadcasts.
///
/// The server wires this to its connection registry; tests wire a
/// recording sink. The implementation must exclude `origin` itself.
#[async_trait]
pub trait UpdateFanout: Send + Sync {
    /// Deliver `snapshot` as `<entity>:update` to everyone except `origin`.
    async fn publish(&self, entity: &str, snapshot: &[Value], origin: &ClientId);
}

// ─────────────────────────────────────────────────────────────────────────────
// StateStore
// ─────────────────────────────────────────────────────────────────────────────

/// Per-entity snapshot owner over a [`CollectionStore`] backend.
pub struct StateStore {
    store: Arc<dyn CollectionStore>,
    fanout: Arc<dyn UpdateFanout>,
    snapshots: parking_lot::RwLock<HashMap<String, Vec<Value>>>,
    entity_locks: parking_lot::Mutex<HashMap<String, Weak<tokio::sync::Mutex<()>>>>,
}

/// Prune dead `Weak` entries once the lock map grows past this.
const LOCK_MAP_PRUNE_THRESHOLD: usize = 128;

impl StateStore {
    /// Create a state store over `store`, broadcasting through `fanout`.
    pub fn new(store: Arc<dyn CollectionStore>, fanout: Arc<dyn UpdateFanout>) -> Self {
        Self {
            store,
            fanout,
            snapshots: parking_lot::RwLock::new(HashMap::new()),
            entity_locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Current snapshot for `entity` (empty when never fetched or mutated).
    #[must_use]
    pub fn snapshot(&self, entity: &str) -> Vec<Value> {
        self.snapshots.read().get(entity).cloned().unwrap_or_default()
    }

    /// Apply one action for `origin` and return the resulting snapshot.
    ///
    /// Mutations fan the new snapshot out to every connection except the
    /// originator before returning. `Fetch` reloads the snapshot from the
    /// backend and returns it without fan-out. On a backend error the
    /// snapshot is left untouched and nothing is broadcast.
    pub async fn apply(
        &self,
        entity: &str,
        action: Action,
        data: Value,
        origin: &ClientId,
    ) -> Result<Vec<Value>> {
        let lock = self.entity_lock(entity);
        let _guard = lock.lock().await;

        let snapshot = match action {
            Action::Create => {
                let record = self.store.create(entity, data).await?;
                self.upsert(entity, record)
            }
            Action::Update => {
                let filter = id_filter(entity, &data)?;
                let record = self.store.update(entity, &filter, &data).await?;
                self.upsert(entity, record)
            }
            Action::Delete => {
                let filter = id_filter(entity, &data)?;
                let removed = self.store.delete(entity, &filter).await?;
                debug!(entity, removed, "records deleted");
                self.remove(entity, &filter)
            }
            Action::Fetch => {
                let records = self
                    .store
                    .find_many(entity, &Value::Null, query_options(&data))
                    .await?;
                let _ = self
                    .snapshots
                    .write()
                    .insert(entity.to_string(), records.clone());
                records
            }
        };

        if action.is_mutation() {
            self.fanout.publish(entity, &snapshot, origin).await;
        }
        Ok(snapshot)
    }

    /// Merge a single mutated record into the snapshot, keyed by `id`.
    fn upsert(&self, entity: &str, record: Value) -> Vec<Value> {
        let mut snapshots = self.snapshots.write();
        let snapshot = snapshots.entry(entity.to_string()).or_default();
        let id = record.get("id").cloned();
        match snapshot
            .iter_mut()
            .find(|r| id.is_some() && r.get("id") == id.as_ref())
        {
            Some(existing) => *existing = record,
            None => snapshot.push(record),
        }
        snapshot.clone()
    }

    /// Drop every snapshot record matching the delete filter.
    fn remove(&self, entity: &str, filter: &Value) -> Vec<Value> {
        let mut snapshots = self.snapshots.write();
        let snapshot = snapshots.entry(entity.to_string()).or_default();
        snapshot.retain(|r| !crate::contract::matches_filter(r, filter));
        snapshot.clone()
    }

    /// Upgrade (or create) the ordering lock for `entity`.
    fn entity_lock(&self, entity: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.entity_locks.lock();
        if let Some(lock) = locks.get(entity).and_then(Weak::upgrade) {
            return lock;
        }
        if locks.len() > LOCK_MAP_PRUNE_THRESHOLD {
            let before = locks.len();
            locks.retain(|_, weak| weak.strong_count() > 0);
            debug!(pruned = before - locks.len(), "entity lock map pruned");
        }
        let lock = Arc::new(tokio::sync::Mutex::new(()));
        let _ = locks.insert(entity.to_string(), Arc::downgrade(&lock));
        lock
    }
}

/// Build the `{ "id": .. }` filter an update or delete targets. A
/// payload without an id is rejected rather than matched against
/// everything.
fn id_filter(entity: &str, data: &Value) -> Result<Value> {
    let id = data.get("id").cloned().ok_or_else(|| {
        warn!(entity, "mutation payload missing id");
        StoreError::InvalidMutation {
            collection: entity.to_string(),
            message: "mutation payload must carry an id".into(),
        }
    })?;
    Ok(serde_json::json!({ "id": id }))
}

/// Pull pagination options out of a fetch payload, when present.
fn query_options(data: &Value) -> QueryOptions {
    serde_json::from_value(data.clone()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use assert_matches::assert_matches;
    use serde_json::json;

    /// Records every fan-out call for later assertions.
    #[derive(Default)]
    struct RecordingFanout {
        calls: parking_lot::Mutex<Vec<(String, Vec<Value>, ClientId)>>,
    }

    #[async_trait]
    impl UpdateFanout for RecordingFanout {
        async fn publish(&self, entity: &str, snapshot: &[Value], origin: &ClientId) {
            self.calls
                .lock()
                .push((entity.to_string(), snapshot.to_vec(), origin.clone()));
        }
    }

    fn fixture() -> (StateStore, Arc<RecordingFanout>) {
        let fanout = Arc::new(RecordingFanout::default());
        let state = StateStore::new(Arc::new(MemoryStore::new()), fanout.clone());
        (state, fanout)
    }

    #[tokio::test]
    async fn create_then_update_upserts_in_place() {
        let (state, fanout) = fixture();
        let origin = ClientId::generate();

        let after_create = state
            .apply("task", Action::Create, json!({"title": "buy milk"}), &origin)
            .await
            .unwrap();
        assert_eq!(after_create, vec![json!({"id": 1, "title": "buy milk"})]);

        let after_update = state
            .apply(
                "task",
                Action::Update,
                json!({"id": 1, "completed": true}),
                &origin,
            )
            .await
            .unwrap();
        assert_eq!(after_update.len(), 1, "update must not append a duplicate");
        assert_eq!(after_update[0]["completed"], true);

        let calls = fanout.calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "task");
        assert_eq!(calls[0].2, origin);
    }

    #[tokio::test]
    async fn delete_removes_from_snapshot() {
        let (state, fanout) = fixture();
        let origin = ClientId::generate();

        let _ = state
            .apply("task", Action::Create, json!({"title": "a"}), &origin)
            .await
            .unwrap();
        let _ = state
            .apply("task", Action::Create, json!({"title": "b"}), &origin)
            .await
            .unwrap();
        let snapshot = state
            .apply("task", Action::Delete, json!({"id": 1}), &origin)
            .await
            .unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0]["title"], "b");
        assert_eq!(fanout.calls.lock().len(), 3);
    }

    #[tokio::test]
    async fn fetch_replaces_snapshot_without_fanout() {
        let (state, fanout) = fixture();
        let origin = ClientId::generate();

        let _ = state
            .apply("task", Action::Create, json!({"title": "a"}), &origin)
            .await
            .unwrap();
        assert_eq!(fanout.calls.lock().len(), 1);

        let snapshot = state
            .apply("task", Action::Fetch, Value::Null, &origin)
            .await
            .unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(fanout.calls.lock().len(), 1, "fetch must not broadcast");
    }

    #[tokio::test]
    async fn failed_mutation_leaves_snapshot_and_skips_fanout() {
        let (state, fanout) = fixture();
        let origin = ClientId::generate();

        let _ = state
            .apply("task", Action::Create, json!({"title": "a"}), &origin)
            .await
            .unwrap();
        let err = state
            .apply(
                "task",
                Action::Update,
                json!({"id": 99, "completed": true}),
                &origin,
            )
            .await
            .unwrap_err();

        assert_matches!(err, StoreError::NotFound { .. });
        assert_eq!(state.snapshot("task"), vec![json!({"id": 1, "title": "a"})]);
        assert_eq!(fanout.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn update_without_id_is_rejected() {
        let (state, _) = fixture();
        let err = state
            .apply(
                "task",
                Action::Update,
                json!({"completed": true}),
                &ClientId::generate(),
            )
            .await
            .unwrap_err();
        assert_matches!(err, StoreError::InvalidMutation { .. });
    }

    #[tokio::test]
    async fn delete_without_id_is_rejected_and_removes_nothing() {
        let (state, fanout) = fixture();
        let origin = ClientId::generate();

        let _ = state
            .apply("task", Action::Create, json!({"title": "a"}), &origin)
            .await
            .unwrap();
        let _ = state
            .apply("task", Action::Create, json!({"title": "b"}), &origin)
            .await
            .unwrap();

        for payload in [Value::Null, json!({}), json!({"title": "a"})] {
            let err = state
                .apply("task", Action::Delete, payload, &origin)
                .await
                .unwrap_err();
            assert_matches!(err, StoreError::InvalidMutation { .. });
        }

        assert_eq!(state.snapshot("task").len(), 2);
        assert_eq!(fanout.calls.lock().len(), 2, "rejected deletes broadcast nothing");
    }

    #[tokio::test]
    async fn mutations_on_one_entity_are_ordered() {
        let (state, fanout) = fixture();
        let state = Arc::new(state);
        let origin = ClientId::generate();

        let _ = state
            .apply("task", Action::Create, json!({"title": "first"}), &origin)
            .await
            .unwrap();
        let mut handles = Vec::new();
        for i in 0..8 {
            let state = state.clone();
            let origin = origin.clone();
            handles.push(tokio::spawn(async move {
                state
                    .apply("task", Action::Update, json!({"id": 1, "seq": i}), &origin)
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        // Every fan-out after the create carries exactly one record; no
        // interleaving ever exposes a half-applied snapshot.
        for (_, snapshot, _) in fanout.calls.lock().iter().skip(1) {
            assert_eq!(snapshot.len(), 1);
            assert_eq!(snapshot[0]["title"], "first");
        }
    }

    #[test]
    fn action_parse_covers_known_actions_only() {
        assert_eq!(Action::parse("create"), Some(Action::Create));
        assert_eq!(Action::parse("fetch"), Some(Action::Fetch));
        assert_eq!(Action::parse("rename"), None);
        assert!(!Action::Fetch.is_mutation());
        assert!(Action::Delete.is_mutation());
    }
}
