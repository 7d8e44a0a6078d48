//! The authoritative server store.

use deltasync_model::ModelRegistry;
use deltasync_protocol::{
    merge_data, now_millis, ActionType, BootstrapResponse, DeltaPacket, DeltaSyncAction,
    SyncRecord, Transaction,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// State guarded by the store's single writer lock.
#[derive(Debug, Default)]
struct StoreInner {
    /// All records (including tombstones), model -> id -> record.
    records: HashMap<String, BTreeMap<String, SyncRecord>>,
    /// Append-only change log, ascending by sync id.
    log: Vec<DeltaSyncAction>,
    /// Global version counter; the last assigned sync id.
    sync_id: u64,
    /// Delta produced per applied transaction id, for idempotent replay.
    applied: HashMap<String, DeltaPacket>,
}

/// Single authoritative holder of all records and the ordered change log.
///
/// Constructed once at process start and passed by handle to every consumer.
/// The store never validates content; validation happens in a
/// [`crate::TransactionValidator`] before [`ServerStore::apply_transaction`]
/// is called, and a rejection there consumes zero sync ids.
///
/// # Conflict policy
///
/// - `create` unconditionally overwrites, resurrecting tombstones
/// - `update` applies only to an existing live record; otherwise it is
///   dropped silently, though the sync id it was assigned stays consumed
/// - `delete` tombstones an existing record; otherwise dropped silently
///
/// Dropped actions emit no log entry; clients never observe them.
pub struct ServerStore {
    registry: Arc<ModelRegistry>,
    inner: RwLock<StoreInner>,
}

impl ServerStore {
    /// Creates an empty store over the given registry.
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            inner: RwLock::new(StoreInner::default()),
        }
    }

    /// Applies a transaction atomically, assigning one sync id per action.
    ///
    /// Replaying a transaction id the store has already applied returns the
    /// originally produced delta without consuming any sync ids.
    ///
    /// Returns the delta of all actions that actually applied; its `sync_id`
    /// is the post-transaction global counter.
    pub fn apply_transaction(&self, transaction: &Transaction) -> DeltaPacket {
        let mut inner = self.inner.write();

        if let Some(delta) = inner.applied.get(&transaction.id) {
            debug!(tx = %transaction.id, "transaction replayed, returning original delta");
            return delta.clone();
        }

        let mut confirmed = Vec::new();
        for action in &transaction.actions {
            inner.sync_id += 1;
            let sync_id = inner.sync_id;
            let now = now_millis();

            let records = inner
                .records
                .entry(action.model_name.clone())
                .or_default();

            let applied = match action.action_type {
                ActionType::Create => {
                    let mut record = SyncRecord::new(
                        action.record_id.clone(),
                        action.model_name.clone(),
                        action.data.clone().unwrap_or_default(),
                    );
                    record.sync_id = sync_id;
                    record.created_at = now;
                    record.updated_at = now;
                    records.insert(action.record_id.clone(), record);
                    true
                }
                ActionType::Update => match records.get_mut(&action.record_id) {
                    Some(record) if record.is_live() => {
                        if let Some(data) = &action.data {
                            merge_data(&mut record.data, data);
                        }
                        record.sync_id = sync_id;
                        record.updated_at = now;
                        true
                    }
                    _ => false,
                },
                ActionType::Delete => match records.get_mut(&action.record_id) {
                    Some(record) => {
                        record.deleted = true;
                        record.sync_id = sync_id;
                        record.updated_at = now;
                        true
                    }
                    None => false,
                },
            };

            if applied {
                confirmed.push(DeltaSyncAction {
                    sync_id,
                    action: action.clone(),
                });
            } else {
                // Conflict-noop: the sync id stays consumed but no log entry
                // is emitted, so clients never see the dropped action.
                warn!(
                    tx = %transaction.id,
                    model = %action.model_name,
                    record = %action.record_id,
                    sync_id,
                    "dropping action against missing or tombstoned record"
                );
            }
        }

        inner.log.extend(confirmed.iter().cloned());

        let delta = DeltaPacket {
            sync_id: inner.sync_id,
            actions: confirmed,
        };
        inner
            .applied
            .insert(transaction.id.clone(), delta.clone());
        delta
    }

    /// Returns all confirmed actions with sync id greater than `since`.
    ///
    /// Pure read: safe to call repeatedly and concurrently with writers.
    /// Actions are in ascending sync id order.
    pub fn delta_since(&self, since: u64) -> DeltaPacket {
        let inner = self.inner.read();
        let start = inner.log.partition_point(|a| a.sync_id <= since);
        DeltaPacket {
            sync_id: inner.sync_id,
            actions: inner.log[start..].to_vec(),
        }
    }

    /// Returns the full bootstrap snapshot: live records, the current
    /// version, and the registered models.
    pub fn bootstrap_data(&self) -> BootstrapResponse {
        let inner = self.inner.read();
        let mut records: Vec<SyncRecord> = inner
            .records
            .values()
            .flat_map(|by_id| by_id.values())
            .filter(|r| r.is_live())
            .cloned()
            .collect();
        records.sort_by(|a, b| a.sync_id.cmp(&b.sync_id));

        BootstrapResponse {
            records,
            sync_id: inner.sync_id,
            models: self.registry.get_all(),
        }
    }

    /// Returns the number of live (non-tombstoned) records for a model.
    ///
    /// Used by external validators to enforce record caps before a
    /// transaction reaches [`ServerStore::apply_transaction`].
    pub fn record_count(&self, model: &str) -> usize {
        self.inner
            .read()
            .records
            .get(model)
            .map(|by_id| by_id.values().filter(|r| r.is_live()).count())
            .unwrap_or(0)
    }

    /// Returns the current global version.
    pub fn current_sync_id(&self) -> u64 {
        self.inner.read().sync_id
    }

    /// Returns the number of logged (applied) actions.
    pub fn log_len(&self) -> usize {
        self.inner.read().log.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltasync_protocol::{DataMap, SyncAction};
    use proptest::prelude::*;
    use serde_json::json;

    fn store() -> ServerStore {
        ServerStore::new(Arc::new(ModelRegistry::new()))
    }

    fn data(pairs: &[(&str, serde_json::Value)]) -> DataMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn create(id: &str, title: &str) -> SyncAction {
        SyncAction::create("Task", id, data(&[("title", json!(title))]))
    }

    #[test]
    fn create_assigns_sync_id_one() {
        let store = store();
        let delta = store.apply_transaction(&Transaction::new(vec![create("t1", "A")]));

        assert_eq!(delta.sync_id, 1);
        assert_eq!(delta.actions.len(), 1);
        assert_eq!(delta.actions[0].sync_id, 1);

        let bootstrap = store.bootstrap_data();
        assert_eq!(bootstrap.records.len(), 1);
        assert_eq!(bootstrap.records[0].id, "t1");
        assert_eq!(bootstrap.records[0].sync_id, 1);
    }

    #[test]
    fn update_of_missing_record_is_conflict_noop() {
        let store = store();
        let delta = store.apply_transaction(&Transaction::new(vec![SyncAction::update(
            "Task",
            "missing",
            data(&[("title", json!("X"))]),
        )]));

        // Sync id consumed, but no log entry
        assert_eq!(delta.sync_id, 1);
        assert!(delta.actions.is_empty());
        assert_eq!(store.log_len(), 0);
    }

    #[test]
    fn sequential_transactions_get_disjoint_sync_ids() {
        let store = store();
        let first = store.apply_transaction(&Transaction::new(vec![
            create("a", "1"),
            create("b", "2"),
            create("c", "3"),
        ]));
        let second = store.apply_transaction(&Transaction::new(vec![
            create("d", "4"),
            create("e", "5"),
            create("f", "6"),
        ]));

        let ids: Vec<u64> = first
            .actions
            .iter()
            .chain(second.actions.iter())
            .map(|a| a.sync_id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(first.sync_id, 3);
        assert_eq!(second.sync_id, 6);
    }

    #[test]
    fn update_shallow_merges() {
        let store = store();
        store.apply_transaction(&Transaction::new(vec![SyncAction::create(
            "Task",
            "t1",
            data(&[("title", json!("A")), ("done", json!(false))]),
        )]));
        store.apply_transaction(&Transaction::new(vec![SyncAction::update(
            "Task",
            "t1",
            data(&[("done", json!(true))]),
        )]));

        let record = &store.bootstrap_data().records[0];
        assert_eq!(record.data["title"], json!("A"));
        assert_eq!(record.data["done"], json!(true));
        assert_eq!(record.sync_id, 2);
    }

    #[test]
    fn delete_tombstones_and_update_never_resurrects() {
        let store = store();
        store.apply_transaction(&Transaction::new(vec![create("t1", "A")]));
        store.apply_transaction(&Transaction::new(vec![SyncAction::delete("Task", "t1")]));
        let delta = store.apply_transaction(&Transaction::new(vec![SyncAction::update(
            "Task",
            "t1",
            data(&[("title", json!("resurrected"))]),
        )]));

        // The update consumed a sync id but produced nothing
        assert_eq!(delta.sync_id, 3);
        assert!(delta.actions.is_empty());

        // Record stays tombstoned and unmodified
        assert!(store.bootstrap_data().records.is_empty());
        let inner = store.inner.read();
        let record = &inner.records["Task"]["t1"];
        assert!(record.deleted);
        assert_eq!(record.data["title"], json!("A"));
    }

    #[test]
    fn create_resurrects_tombstone() {
        let store = store();
        store.apply_transaction(&Transaction::new(vec![create("t1", "old")]));
        store.apply_transaction(&Transaction::new(vec![SyncAction::delete("Task", "t1")]));
        store.apply_transaction(&Transaction::new(vec![create("t1", "new")]));

        let bootstrap = store.bootstrap_data();
        assert_eq!(bootstrap.records.len(), 1);
        assert_eq!(bootstrap.records[0].data["title"], json!("new"));
        assert!(!bootstrap.records[0].deleted);
    }

    #[test]
    fn delete_of_missing_record_is_conflict_noop() {
        let store = store();
        let delta =
            store.apply_transaction(&Transaction::new(vec![SyncAction::delete("Task", "ghost")]));

        assert_eq!(delta.sync_id, 1);
        assert!(delta.actions.is_empty());
    }

    #[test]
    fn delta_since_current_is_empty() {
        let store = store();
        store.apply_transaction(&Transaction::new(vec![create("t1", "A"), create("t2", "B")]));

        let full = store.delta_since(0);
        assert_eq!(full.actions.len(), 2);

        let tail = store.delta_since(full.sync_id);
        assert!(tail.actions.is_empty());
        assert_eq!(tail.sync_id, full.sync_id);
    }

    #[test]
    fn delta_since_is_ascending_and_filtered() {
        let store = store();
        for i in 0..5 {
            store.apply_transaction(&Transaction::new(vec![create(
                &format!("t{i}"),
                &format!("{i}"),
            )]));
        }

        let delta = store.delta_since(2);
        let ids: Vec<u64> = delta.actions.iter().map(|a| a.sync_id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
    }

    #[test]
    fn record_count_excludes_tombstones() {
        let store = store();
        for i in 0..5 {
            store.apply_transaction(&Transaction::new(vec![create(
                &format!("t{i}"),
                &format!("{i}"),
            )]));
        }
        store.apply_transaction(&Transaction::new(vec![
            SyncAction::delete("Task", "t0"),
            SyncAction::delete("Task", "t1"),
        ]));

        assert_eq!(store.record_count("Task"), 3);
        assert_eq!(store.record_count("Other"), 0);
    }

    #[test]
    fn log_replay_reproduces_bootstrap_state() {
        let store = store();
        store.apply_transaction(&Transaction::new(vec![create("t1", "A"), create("t2", "B")]));
        store.apply_transaction(&Transaction::new(vec![SyncAction::update(
            "Task",
            "t1",
            data(&[("done", json!(true))]),
        )]));
        store.apply_transaction(&Transaction::new(vec![SyncAction::delete("Task", "t2")]));

        // Walk the full log into an empty mirror
        let mut mirror: BTreeMap<String, SyncRecord> = BTreeMap::new();
        for confirmed in store.delta_since(0).actions {
            let action = confirmed.action;
            match action.action_type {
                ActionType::Create => {
                    let mut record = SyncRecord::new(
                        action.record_id.clone(),
                        action.model_name,
                        action.data.unwrap_or_default(),
                    );
                    record.sync_id = confirmed.sync_id;
                    mirror.insert(action.record_id, record);
                }
                ActionType::Update => {
                    if let Some(record) = mirror.get_mut(&action.record_id) {
                        if let Some(data) = &action.data {
                            merge_data(&mut record.data, data);
                        }
                        record.sync_id = confirmed.sync_id;
                    }
                }
                ActionType::Delete => {
                    mirror.remove(&action.record_id);
                }
            }
        }

        let bootstrap = store.bootstrap_data();
        assert_eq!(mirror.len(), bootstrap.records.len());
        for record in &bootstrap.records {
            let replayed = &mirror[&record.id];
            assert_eq!(replayed.data, record.data);
            assert_eq!(replayed.sync_id, record.sync_id);
        }
    }

    #[test]
    fn transaction_replay_is_idempotent() {
        let store = store();
        let tx = Transaction::new(vec![create("t1", "A")]);

        let first = store.apply_transaction(&tx);
        let replay = store.apply_transaction(&tx);

        assert_eq!(first, replay);
        assert_eq!(store.current_sync_id(), 1);
        assert_eq!(store.bootstrap_data().records.len(), 1);
    }

    #[test]
    fn bootstrap_includes_registered_models() {
        use deltasync_model::{ModelMeta, PropertyMeta, PropertyType};

        let registry = Arc::new(ModelRegistry::from_models(vec![ModelMeta::new(
            "Task",
            vec![PropertyMeta::new("title", PropertyType::String)],
        )]));
        let store = ServerStore::new(registry);

        let bootstrap = store.bootstrap_data();
        assert_eq!(bootstrap.models.len(), 1);
        assert_eq!(bootstrap.models[0].name, "Task");
    }

    proptest! {
        #[test]
        fn sync_ids_strictly_increase(batches in prop::collection::vec(1usize..4, 1..20)) {
            let store = store();
            let mut seen = Vec::new();

            for (t, batch) in batches.iter().enumerate() {
                let actions = (0..*batch)
                    .map(|i| create(&format!("r{t}_{i}"), "x"))
                    .collect();
                let delta = store.apply_transaction(&Transaction::new(actions));
                seen.extend(delta.actions.iter().map(|a| a.sync_id));
            }

            // Strictly increasing, no repeats, counter matches the last id
            for pair in seen.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
            prop_assert_eq!(seen.last().copied().unwrap_or(0), store.current_sync_id());
        }
    }
}
