//! The sync orchestrator.

use crate::config::ClientConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use deltasync_cache::LocalCache;
use deltasync_model::ModelRegistry;
use deltasync_protocol::{
    merge_data, now_millis, ActionType, DeltaPacket, SyncAction, SyncRecord, Transaction,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handle identifying a change observer.
pub type SubscriptionId = u64;

/// One visible record change, as delivered to observers.
///
/// `record` is the state after the change; `None` means the record is gone
/// from the mirror.
#[derive(Debug, Clone)]
pub struct RecordChange {
    /// Model of the changed record.
    pub model_name: String,
    /// Id of the changed record.
    pub record_id: String,
    /// State after the change.
    pub record: Option<SyncRecord>,
}

type Observer = Box<dyn Fn(&[RecordChange]) + Send + Sync>;
type Mirror = HashMap<String, BTreeMap<String, SyncRecord>>;

/// Resets the pull-in-flight flag when the pull unwinds.
struct PullGuard<'a>(&'a AtomicBool);

impl Drop for PullGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The client-side sync orchestrator.
///
/// Owns an in-memory mirror of the replicated records (confirmed state plus
/// optimistic local changes), the durable [`LocalCache`] beneath it, and the
/// transport to the server. Mutations apply optimistically and queue durably
/// before any network send; the server's verdict then confirms, reverts or
/// leaves them queued for a later flush.
///
/// All methods take `&self`; a client is shared behind an `Arc` between the
/// application and the pull scheduler. Push, pull and flush are mutually
/// exclusive behind one sync mutex: a pull never applies older actions over
/// state a concurrent push just confirmed. Overlapping pulls coalesce
/// instead of queueing.
pub struct SyncClient<T> {
    transport: Arc<T>,
    cache: LocalCache,
    config: ClientConfig,
    registry: Arc<ModelRegistry>,
    mirror: RwLock<Mirror>,
    observers: Mutex<Vec<(SubscriptionId, Observer)>>,
    next_subscription: AtomicU64,
    pull_in_flight: AtomicBool,
    sync_lock: Mutex<()>,
}

impl<T: SyncTransport> SyncClient<T> {
    /// Creates a client over an opened cache, loading the mirror from it.
    pub fn new(
        registry: Arc<ModelRegistry>,
        transport: Arc<T>,
        cache: LocalCache,
        config: ClientConfig,
    ) -> SyncResult<Self> {
        let mut mirror: Mirror = HashMap::new();
        for model in registry.get_all() {
            let records = cache.get_all_records(&model.name)?;
            let collection = mirror.entry(model.name.clone()).or_default();
            for record in records {
                collection.insert(record.id.clone(), record);
            }
        }

        Ok(Self {
            transport,
            cache,
            config,
            registry,
            mirror: RwLock::new(mirror),
            observers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            pull_in_flight: AtomicBool::new(false),
            sync_lock: Mutex::new(()),
        })
    }

    /// Brings the client up to date: bootstraps on first run, pulls after.
    ///
    /// A client whose cache has never completed a bootstrap or pull (no
    /// `last_sync_id`) fetches the full snapshot; an already-seeded client
    /// catches up incrementally and flushes anything queued while offline.
    pub fn start(&self) -> SyncResult<()> {
        if self.cache.last_sync_id()?.is_none() {
            self.bootstrap()?;
            if self.config.flush_after_pull {
                self.flush_pending()?;
            }
            Ok(())
        } else {
            self.pull().map(|_| ())
        }
    }

    /// Replaces all local confirmed state with the server's snapshot.
    pub fn bootstrap(&self) -> SyncResult<()> {
        let _guard = self.sync_lock.lock();
        let response = self.transport.bootstrap()?;
        info!(
            sync_id = response.sync_id,
            records = response.records.len(),
            "bootstrap snapshot received"
        );

        let server_hash = ModelRegistry::from_models(response.models).schema_hash();
        if server_hash != self.registry.schema_hash() {
            warn!("server model schema differs from local registry");
        }

        let mut changes = Vec::with_capacity(response.records.len());
        {
            let mut mirror = self.mirror.write();
            mirror.clear();
            for record in &response.records {
                changes.push(RecordChange {
                    model_name: record.model_name.clone(),
                    record_id: record.id.clone(),
                    record: Some(record.clone()),
                });
                mirror
                    .entry(record.model_name.clone())
                    .or_default()
                    .insert(record.id.clone(), record.clone());
            }
        }

        // One atomic record swap that keeps the pending queue, then the
        // sync id pointer; a crash in between re-bootstraps instead of
        // trusting a half-adopted snapshot.
        self.cache.replace_records(response.records)?;
        self.cache.set_last_sync_id(response.sync_id)?;

        self.notify(&changes);
        Ok(())
    }

    /// Applies `actions` optimistically and submits them as one transaction.
    ///
    /// The transaction is queued durably before the send, so a transport
    /// failure leaves it both visible locally and queued for the next flush.
    /// On acceptance the returned delta carries the confirmed sync ids; on
    /// rejection the optimistic change is reverted, the queue entry dropped,
    /// and [`SyncError::Rejected`] returned.
    pub fn push(&self, actions: Vec<SyncAction>) -> SyncResult<DeltaPacket> {
        if actions.is_empty() {
            return Err(SyncError::Rejected("empty transaction".into()));
        }
        let _guard = self.sync_lock.lock();

        let transaction = Transaction::new(actions);
        let (undo, changes) = self.apply_optimistic(&transaction);
        self.notify(&changes);

        // Queue first: a crash or transport failure between here and the
        // server's verdict must not lose the mutation.
        self.cache.add_pending_transaction(transaction.clone())?;

        match self.transport.push(&transaction) {
            Ok(response) if response.success => {
                let changes = self.apply_delta(&response.delta, false)?;
                self.cache.remove_pending_transaction(&transaction.id)?;
                self.notify(&changes);
                Ok(response.delta)
            }
            Ok(response) => {
                let reason = response
                    .error
                    .unwrap_or_else(|| "rejected without reason".into());
                warn!(tx = %transaction.id, %reason, "push rejected, reverting");
                let changes = self.revert(undo);
                self.cache.remove_pending_transaction(&transaction.id)?;
                self.notify(&changes);
                Err(SyncError::Rejected(reason))
            }
            Err(e) => {
                debug!(tx = %transaction.id, error = %e, "push not delivered, left queued");
                Err(e)
            }
        }
    }

    /// Fetches and applies confirmed actions newer than the local baseline.
    ///
    /// Returns the number of actions applied. Concurrent calls coalesce: a
    /// pull that finds another in flight returns `Ok(0)` immediately. A
    /// pull behind a running push waits for it, so the push's confirmed
    /// state is never overwritten by older actions fetched concurrently.
    /// After a successful pull the offline queue is flushed (when
    /// configured); flush failures are logged, not propagated.
    pub fn pull(&self) -> SyncResult<usize> {
        if self.pull_in_flight.swap(true, Ordering::Acquire) {
            return Ok(0);
        }
        let _flag = PullGuard(&self.pull_in_flight);
        let _guard = self.sync_lock.lock();

        let since = self.cache.last_sync_id()?.unwrap_or(0);
        let response = self.transport.pull(since)?;
        let applied = response.delta.actions.len();
        let changes = self.apply_delta(&response.delta, true)?;
        self.notify(&changes);

        if applied > 0 {
            debug!(since, applied, sync_id = response.delta.sync_id, "pull applied");
        }

        if self.config.flush_after_pull {
            if let Err(e) = self.flush_locked() {
                warn!(error = %e, "post-pull flush failed, queue kept");
            }
        }
        Ok(applied)
    }

    /// Replays the offline queue in original submission order.
    ///
    /// Accepted transactions confirm and dequeue; rejected ones are dropped
    /// with a warning (their optimistic effect was already lost with the
    /// session that created them). A transport failure stops the flush and
    /// keeps the remainder queued. Returns the number of dequeued
    /// transactions.
    pub fn flush_pending(&self) -> SyncResult<usize> {
        let _guard = self.sync_lock.lock();
        self.flush_locked()
    }

    /// Flush body; the caller holds the sync lock.
    fn flush_locked(&self) -> SyncResult<usize> {
        if !self.transport.is_connected() {
            return Ok(0);
        }

        let mut flushed = 0;
        for transaction in self.cache.get_pending_transactions()? {
            match self.transport.push(&transaction) {
                Ok(response) if response.success => {
                    let changes = self.apply_delta(&response.delta, false)?;
                    self.cache.remove_pending_transaction(&transaction.id)?;
                    self.notify(&changes);
                    flushed += 1;
                }
                Ok(response) => {
                    warn!(
                        tx = %transaction.id,
                        reason = response.error.as_deref().unwrap_or("unknown"),
                        "queued transaction rejected, dropping"
                    );
                    self.cache.remove_pending_transaction(&transaction.id)?;
                    flushed += 1;
                }
                Err(e) => {
                    debug!(tx = %transaction.id, error = %e, "flush stopped");
                    return Err(e);
                }
            }
        }
        Ok(flushed)
    }

    /// Returns a record from the mirror.
    pub fn get(&self, model: &str, id: &str) -> Option<SyncRecord> {
        self.mirror.read().get(model)?.get(id).cloned()
    }

    /// Returns all mirrored records of a model.
    pub fn all(&self, model: &str) -> Vec<SyncRecord> {
        self.mirror
            .read()
            .get(model)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns true while a push, pull or flush is in progress.
    pub fn is_syncing(&self) -> bool {
        self.pull_in_flight.load(Ordering::Acquire) || self.sync_lock.is_locked()
    }

    /// Returns the last confirmed sync id, if any pull or bootstrap completed.
    pub fn last_sync_id(&self) -> SyncResult<Option<u64>> {
        Ok(self.cache.last_sync_id()?)
    }

    /// Returns the number of queued transactions.
    pub fn pending_count(&self) -> SyncResult<usize> {
        Ok(self.cache.get_pending_transactions()?.len())
    }

    /// Returns the cache beneath the mirror (confirmed state only).
    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Registers a change observer; fires after every visible mirror change.
    pub fn subscribe(&self, observer: impl Fn(&[RecordChange]) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.observers.lock().push((id, Box::new(observer)));
        id
    }

    /// Removes an observer. Returns true if it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    }

    /// Flushes the cache and rejects further cache-touching operations.
    pub fn close(&self) -> SyncResult<()> {
        Ok(self.cache.close()?)
    }

    fn notify(&self, changes: &[RecordChange]) {
        if changes.is_empty() {
            return;
        }
        for (_, observer) in self.observers.lock().iter() {
            observer(changes);
        }
    }

    /// Applies a transaction to the mirror, returning undo snapshots (first
    /// touch per record) and the visible changes.
    fn apply_optimistic(
        &self,
        transaction: &Transaction,
    ) -> (Vec<(String, String, Option<SyncRecord>)>, Vec<RecordChange>) {
        let mut mirror = self.mirror.write();
        let mut undo = Vec::new();
        let mut changes = Vec::new();

        for action in &transaction.actions {
            let collection = mirror.entry(action.model_name.clone()).or_default();
            let previous = collection.get(&action.record_id).cloned();
            if !undo
                .iter()
                .any(|(m, id, _)| m == &action.model_name && id == &action.record_id)
            {
                undo.push((action.model_name.clone(), action.record_id.clone(), previous.clone()));
            }

            let after = match action.action_type {
                ActionType::Create => {
                    let mut record = SyncRecord::new(
                        action.record_id.clone(),
                        action.model_name.clone(),
                        action.data.clone().unwrap_or_default(),
                    );
                    if let Some(previous) = &previous {
                        record.created_at = previous.created_at;
                    }
                    collection.insert(record.id.clone(), record.clone());
                    Some(record)
                }
                ActionType::Update => match previous {
                    Some(mut record) => {
                        if let Some(data) = &action.data {
                            merge_data(&mut record.data, data);
                        }
                        record.updated_at = now_millis();
                        collection.insert(record.id.clone(), record.clone());
                        Some(record)
                    }
                    // Nothing to update; the server will noop it too.
                    None => continue,
                },
                ActionType::Delete => {
                    if collection.remove(&action.record_id).is_none() {
                        continue;
                    }
                    None
                }
            };

            changes.push(RecordChange {
                model_name: action.model_name.clone(),
                record_id: action.record_id.clone(),
                record: after,
            });
        }
        (undo, changes)
    }

    /// Restores the mirror from undo snapshots.
    fn revert(&self, undo: Vec<(String, String, Option<SyncRecord>)>) -> Vec<RecordChange> {
        let mut mirror = self.mirror.write();
        let mut changes = Vec::new();

        for (model, id, previous) in undo {
            let collection = mirror.entry(model.clone()).or_default();
            match previous {
                Some(record) => {
                    collection.insert(id.clone(), record.clone());
                    changes.push(RecordChange {
                        model_name: model,
                        record_id: id,
                        record: Some(record),
                    });
                }
                None => {
                    if collection.remove(&id).is_some() {
                        changes.push(RecordChange {
                            model_name: model,
                            record_id: id,
                            record: None,
                        });
                    }
                }
            }
        }
        changes
    }

    /// Applies a confirmed delta to mirror and cache, in ascending sync id
    /// order.
    ///
    /// `advance` controls whether the packet's sync id becomes the new local
    /// baseline. Pull packets advance; push and flush deltas do not, because
    /// they carry only this client's own actions and advancing past foreign
    /// actions interleaved between them would skip those forever. The next
    /// pull re-delivers the own actions, which re-apply idempotently.
    fn apply_delta(&self, delta: &DeltaPacket, advance: bool) -> SyncResult<Vec<RecordChange>> {
        let mut changes: Vec<RecordChange> = Vec::new();
        {
            let mut mirror = self.mirror.write();
            for confirmed in &delta.actions {
                let action = &confirmed.action;
                let collection = mirror.entry(action.model_name.clone()).or_default();

                let after = match action.action_type {
                    ActionType::Create => {
                        let mut record = SyncRecord::new(
                            action.record_id.clone(),
                            action.model_name.clone(),
                            action.data.clone().unwrap_or_default(),
                        );
                        record.sync_id = confirmed.sync_id;
                        if let Some(existing) = collection.get(&action.record_id) {
                            record.created_at = existing.created_at;
                        }
                        collection.insert(record.id.clone(), record.clone());
                        Some(record)
                    }
                    ActionType::Update => match collection.get(&action.record_id).cloned() {
                        Some(mut record) => {
                            if let Some(data) = &action.data {
                                merge_data(&mut record.data, data);
                            }
                            record.sync_id = confirmed.sync_id;
                            record.updated_at = now_millis();
                            collection.insert(record.id.clone(), record.clone());
                            Some(record)
                        }
                        None => {
                            debug!(
                                model = %action.model_name,
                                id = %action.record_id,
                                "update for unknown record ignored"
                            );
                            continue;
                        }
                    },
                    ActionType::Delete => {
                        if collection.remove(&action.record_id).is_none() {
                            continue;
                        }
                        None
                    }
                };

                // Keep one change per record: the final state wins.
                changes.retain(|c| {
                    c.model_name != action.model_name || c.record_id != action.record_id
                });
                changes.push(RecordChange {
                    model_name: action.model_name.clone(),
                    record_id: action.record_id.clone(),
                    record: after,
                });
            }
        }

        // The cache holds confirmed state, so confirmed actions reconcile it
        // from the actions themselves, not from whether the mirror still held
        // the record: an optimistic delete already emptied the mirror slot,
        // but the cache copy must still go when the confirmation arrives.
        let mut confirmed_state: BTreeMap<(String, String), Option<SyncRecord>> = BTreeMap::new();
        for confirmed in &delta.actions {
            let action = &confirmed.action;
            let key = (action.model_name.clone(), action.record_id.clone());
            let base = match confirmed_state.get(&key) {
                Some(state) => state.clone(),
                None => self.cache.get_record(&action.model_name, &action.record_id)?,
            };

            let next = match action.action_type {
                ActionType::Create => {
                    let mut record = SyncRecord::new(
                        action.record_id.clone(),
                        action.model_name.clone(),
                        action.data.clone().unwrap_or_default(),
                    );
                    record.sync_id = confirmed.sync_id;
                    if let Some(base) = &base {
                        record.created_at = base.created_at;
                    }
                    Some(record)
                }
                ActionType::Update => match base {
                    Some(mut record) => {
                        if let Some(data) = &action.data {
                            merge_data(&mut record.data, data);
                        }
                        record.sync_id = confirmed.sync_id;
                        record.updated_at = now_millis();
                        Some(record)
                    }
                    None => continue,
                },
                ActionType::Delete => None,
            };
            confirmed_state.insert(key, next);
        }

        let mut puts = Vec::new();
        for ((model, id), state) in confirmed_state {
            match state {
                Some(record) => puts.push(record),
                None => {
                    self.cache.delete_record(&model, &id)?;
                }
            }
        }
        if !puts.is_empty() {
            self.cache.put_records(puts)?;
        }
        if advance {
            self.cache.set_last_sync_id(delta.sync_id)?;
        }
        Ok(changes)
    }
}
