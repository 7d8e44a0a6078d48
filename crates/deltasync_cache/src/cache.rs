//! The local cache.

use crate::backend::CacheBackend;
use crate::error::{CacheError, CacheResult};
use deltasync_model::ModelRegistry;
use deltasync_protocol::{SyncRecord, Transaction};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

/// One record collection plus its secondary indexes.
#[derive(Debug, Default)]
struct Collection {
    /// Records keyed by id.
    records: BTreeMap<String, SyncRecord>,
    /// Per-indexed-property index: property -> value key -> record ids.
    property_indexes: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
    /// Mandatory index on sync id.
    sync_index: BTreeMap<u64, BTreeSet<String>>,
}

impl Collection {
    fn with_indexes(indexed: &[String]) -> Self {
        let mut collection = Self::default();
        for prop in indexed {
            collection
                .property_indexes
                .insert(prop.clone(), BTreeMap::new());
        }
        collection
    }

    fn index(&mut self, record: &SyncRecord) {
        for (prop, index) in &mut self.property_indexes {
            if let Some(value) = record.data.get(prop) {
                index
                    .entry(index_key(value))
                    .or_default()
                    .insert(record.id.clone());
            }
        }
        self.sync_index
            .entry(record.sync_id)
            .or_default()
            .insert(record.id.clone());
    }

    fn unindex(&mut self, record: &SyncRecord) {
        for (prop, index) in &mut self.property_indexes {
            if let Some(value) = record.data.get(prop) {
                let key = index_key(value);
                if let Some(ids) = index.get_mut(&key) {
                    ids.remove(&record.id);
                    if ids.is_empty() {
                        index.remove(&key);
                    }
                }
            }
        }
        if let Some(ids) = self.sync_index.get_mut(&record.sync_id) {
            ids.remove(&record.id);
            if ids.is_empty() {
                self.sync_index.remove(&record.sync_id);
            }
        }
    }

    fn upsert(&mut self, record: SyncRecord) {
        if let Some(previous) = self.records.remove(&record.id) {
            self.unindex(&previous);
        }
        self.index(&record);
        self.records.insert(record.id.clone(), record);
    }

    fn remove(&mut self, id: &str) -> Option<SyncRecord> {
        let record = self.records.remove(id)?;
        self.unindex(&record);
        Some(record)
    }
}

/// Renders an index value key.
///
/// JSON rendering keeps distinct values distinct ("1" vs 1) while staying
/// stable across saves.
fn index_key(value: &Value) -> String {
    value.to_string()
}

/// Mutable cache state guarded by one lock.
#[derive(Debug, Default)]
struct CacheState {
    collections: HashMap<String, Collection>,
    last_sync_id: Option<u64>,
    pending: Vec<Transaction>,
    closed: bool,
}

/// The persisted snapshot format. Indexes are rebuilt at open.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    schema_hash: String,
    last_sync_id: Option<u64>,
    records: BTreeMap<String, Vec<SyncRecord>>,
    pending: Vec<Transaction>,
}

/// Durable client-side mirror plus offline queue.
///
/// Holds one record collection per registered model (with a secondary index
/// per indexed property and a mandatory sync-id index), a `last_sync_id`
/// metadata slot and a FIFO queue of pending transactions. Every mutating
/// call persists a full snapshot through the backend before returning, so a
/// crash between calls loses nothing.
pub struct LocalCache {
    backend: Mutex<Box<dyn CacheBackend>>,
    state: RwLock<CacheState>,
    indexed: HashMap<String, Vec<String>>,
    schema_hash: String,
}

impl LocalCache {
    /// Opens the cache, replaying any persisted snapshot.
    ///
    /// A collection is ensured for every registered model. If the persisted
    /// schema hash differs from the registry's current hash the entire cache
    /// (records, metadata, pending queue) is discarded so the orchestrator
    /// can rebuild it from bootstrap. Opening is otherwise non-destructive
    /// and idempotent.
    pub fn open(registry: &ModelRegistry, backend: Box<dyn CacheBackend>) -> CacheResult<Self> {
        let schema_hash = registry.schema_hash();
        let indexed: HashMap<String, Vec<String>> = registry
            .get_all()
            .into_iter()
            .map(|m| (m.name.clone(), m.indexed_properties()))
            .collect();

        let mut state = CacheState::default();
        for (model, props) in &indexed {
            state
                .collections
                .insert(model.clone(), Collection::with_indexes(props));
        }

        let mut backend = backend;
        let mut stale = false;
        if let Some(bytes) = backend.load()? {
            let snapshot: Snapshot = serde_json::from_slice(&bytes)
                .map_err(|e| CacheError::Corrupt(e.to_string()))?;

            if snapshot.schema_hash == schema_hash {
                state.last_sync_id = snapshot.last_sync_id;
                state.pending = snapshot.pending;
                for (model, records) in snapshot.records {
                    let collection = state
                        .collections
                        .entry(model.clone())
                        .or_insert_with(|| Collection::with_indexes(&[]));
                    for record in records {
                        collection.upsert(record);
                    }
                }
                debug!(last_sync_id = ?state.last_sync_id, "cache snapshot loaded");
            } else {
                info!("schema hash changed, discarding cache for rebuild");
                stale = true;
            }
        }

        let cache = Self {
            backend: Mutex::new(backend),
            state: RwLock::new(state),
            indexed,
            schema_hash,
        };

        if stale {
            // Replace the incompatible snapshot so the next open is clean
            // even if no bootstrap happens in between.
            cache.persist()?;
        }

        Ok(cache)
    }

    /// Returns the schema hash the cache was opened with.
    pub fn schema_hash(&self) -> &str {
        &self.schema_hash
    }

    fn ensure_open(state: &CacheState) -> CacheResult<()> {
        if state.closed {
            Err(CacheError::Closed)
        } else {
            Ok(())
        }
    }

    /// Serializes the current state and saves it through the backend.
    fn persist(&self) -> CacheResult<()> {
        let state = self.state.read();
        let snapshot = Snapshot {
            schema_hash: self.schema_hash.clone(),
            last_sync_id: state.last_sync_id,
            records: state
                .collections
                .iter()
                .map(|(model, c)| (model.clone(), c.records.values().cloned().collect()))
                .collect(),
            pending: state.pending.clone(),
        };
        drop(state);

        let bytes =
            serde_json::to_vec(&snapshot).map_err(|e| CacheError::Corrupt(e.to_string()))?;
        self.backend.lock().save(&bytes)
    }

    /// Upserts a single record.
    pub fn put_record(&self, record: SyncRecord) -> CacheResult<()> {
        self.put_records(vec![record])
    }

    /// Upserts a batch of records, grouped by model.
    ///
    /// Last write wins at the storage layer; ordering is caller-guaranteed.
    pub fn put_records(&self, records: Vec<SyncRecord>) -> CacheResult<()> {
        {
            let mut state = self.state.write();
            Self::ensure_open(&state)?;
            for record in records {
                let indexed = self
                    .indexed
                    .get(&record.model_name)
                    .cloned()
                    .unwrap_or_default();
                state
                    .collections
                    .entry(record.model_name.clone())
                    .or_insert_with(|| Collection::with_indexes(&indexed))
                    .upsert(record);
            }
        }
        self.persist()
    }

    /// Returns a record by model and id.
    pub fn get_record(&self, model: &str, id: &str) -> CacheResult<Option<SyncRecord>> {
        let state = self.state.read();
        Self::ensure_open(&state)?;
        Ok(state
            .collections
            .get(model)
            .and_then(|c| c.records.get(id))
            .cloned())
    }

    /// Returns all records of a model.
    pub fn get_all_records(&self, model: &str) -> CacheResult<Vec<SyncRecord>> {
        let state = self.state.read();
        Self::ensure_open(&state)?;
        Ok(state
            .collections
            .get(model)
            .map(|c| c.records.values().cloned().collect())
            .unwrap_or_default())
    }

    /// Physically deletes a record. Returns true if it existed.
    ///
    /// Cache-side deletes are physical; only the server keeps tombstones.
    pub fn delete_record(&self, model: &str, id: &str) -> CacheResult<bool> {
        let existed = {
            let mut state = self.state.write();
            Self::ensure_open(&state)?;
            state
                .collections
                .get_mut(model)
                .and_then(|c| c.remove(id))
                .is_some()
        };
        self.persist()?;
        Ok(existed)
    }

    /// Returns the records of a model whose indexed property equals `value`.
    pub fn find_by_index(
        &self,
        model: &str,
        property: &str,
        value: &Value,
    ) -> CacheResult<Vec<SyncRecord>> {
        let state = self.state.read();
        Self::ensure_open(&state)?;

        let Some(collection) = state.collections.get(model) else {
            return Ok(Vec::new());
        };
        let Some(index) = collection.property_indexes.get(property) else {
            return Ok(Vec::new());
        };

        let ids = index.get(&index_key(value));
        Ok(ids
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| collection.records.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Returns the records of a model with `sync_id` greater than `since`.
    pub fn records_since(&self, model: &str, since: u64) -> CacheResult<Vec<SyncRecord>> {
        let state = self.state.read();
        Self::ensure_open(&state)?;

        let Some(collection) = state.collections.get(model) else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        for ids in collection
            .sync_index
            .range((since + 1)..)
            .map(|(_, ids)| ids)
        {
            for id in ids {
                if let Some(record) = collection.records.get(id) {
                    records.push(record.clone());
                }
            }
        }
        Ok(records)
    }

    /// Returns the last applied sync id, if a pull or bootstrap completed.
    pub fn last_sync_id(&self) -> CacheResult<Option<u64>> {
        let state = self.state.read();
        Self::ensure_open(&state)?;
        Ok(state.last_sync_id)
    }

    /// Sets the last applied sync id.
    pub fn set_last_sync_id(&self, sync_id: u64) -> CacheResult<()> {
        {
            let mut state = self.state.write();
            Self::ensure_open(&state)?;
            state.last_sync_id = Some(sync_id);
        }
        self.persist()
    }

    /// Appends a transaction to the durable offline queue.
    pub fn add_pending_transaction(&self, transaction: Transaction) -> CacheResult<()> {
        {
            let mut state = self.state.write();
            Self::ensure_open(&state)?;
            state.pending.push(transaction);
        }
        self.persist()
    }

    /// Returns the queued transactions in original submission order.
    pub fn get_pending_transactions(&self) -> CacheResult<Vec<Transaction>> {
        let state = self.state.read();
        Self::ensure_open(&state)?;
        Ok(state.pending.clone())
    }

    /// Removes a queued transaction by id. Returns true if it was queued.
    pub fn remove_pending_transaction(&self, id: &str) -> CacheResult<bool> {
        let removed = {
            let mut state = self.state.write();
            Self::ensure_open(&state)?;
            let before = state.pending.len();
            state.pending.retain(|tx| tx.id != id);
            state.pending.len() != before
        };
        self.persist()?;
        Ok(removed)
    }

    /// Replaces all records with a bootstrap snapshot in one atomic write.
    ///
    /// The pending queue is untouched: mutations queued before the snapshot
    /// was fetched still have to reach the server. `last_sync_id` is reset;
    /// the caller sets it once the snapshot version is confirmed, so a crash
    /// in between forces a clean re-bootstrap instead of trusting a
    /// half-adopted snapshot.
    pub fn replace_records(&self, records: Vec<SyncRecord>) -> CacheResult<()> {
        {
            let mut state = self.state.write();
            Self::ensure_open(&state)?;
            state.collections.clear();
            for (model, props) in &self.indexed {
                state
                    .collections
                    .insert(model.clone(), Collection::with_indexes(props));
            }
            state.last_sync_id = None;
            for record in records {
                let indexed = self
                    .indexed
                    .get(&record.model_name)
                    .cloned()
                    .unwrap_or_default();
                state
                    .collections
                    .entry(record.model_name.clone())
                    .or_insert_with(|| Collection::with_indexes(&indexed))
                    .upsert(record);
            }
        }
        self.persist()
    }

    /// Wipes all records, metadata and the pending queue.
    pub fn clear(&self) -> CacheResult<()> {
        {
            let mut state = self.state.write();
            Self::ensure_open(&state)?;
            for (model, collection) in state.collections.iter_mut() {
                let indexed = self.indexed.get(model).cloned().unwrap_or_default();
                *collection = Collection::with_indexes(&indexed);
            }
            state.collections.retain(|model, _| self.indexed.contains_key(model));
            state.last_sync_id = None;
            state.pending.clear();
        }
        self.backend.lock().wipe()?;
        self.persist()
    }

    /// Flushes the final snapshot and rejects all further operations.
    pub fn close(&self) -> CacheResult<()> {
        self.persist()?;
        self.state.write().closed = true;
        Ok(())
    }
}
