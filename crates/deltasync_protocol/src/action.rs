//! Client-submitted actions, transactions and confirmed deltas.

use crate::record::{now_millis, DataMap};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of mutation an action performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Create (or unconditionally overwrite) a record.
    Create,
    /// Shallow-merge new data onto an existing live record.
    Update,
    /// Tombstone an existing record.
    Delete,
}

/// A single client-submitted mutation intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAction {
    /// Action kind.
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Target model.
    pub model_name: String,
    /// Client-generated target record id.
    pub record_id: String,
    /// Field data for create/update; absent for delete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DataMap>,
}

impl SyncAction {
    /// Creates a `create` action.
    pub fn create(
        model_name: impl Into<String>,
        record_id: impl Into<String>,
        data: DataMap,
    ) -> Self {
        Self {
            action_type: ActionType::Create,
            model_name: model_name.into(),
            record_id: record_id.into(),
            data: Some(data),
        }
    }

    /// Creates an `update` action.
    pub fn update(
        model_name: impl Into<String>,
        record_id: impl Into<String>,
        data: DataMap,
    ) -> Self {
        Self {
            action_type: ActionType::Update,
            model_name: model_name.into(),
            record_id: record_id.into(),
            data: Some(data),
        }
    }

    /// Creates a `delete` action.
    pub fn delete(model_name: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            action_type: ActionType::Delete,
            model_name: model_name.into(),
            record_id: record_id.into(),
            data: None,
        }
    }
}

/// A batch of actions applied atomically at the server boundary.
///
/// The id is client-generated and used for idempotent replay: resubmitting
/// a transaction the server has already applied returns the original delta
/// without consuming new sync ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Client-generated transaction id.
    pub id: String,
    /// Actions, applied in submission order.
    pub actions: Vec<SyncAction>,
    /// Client wall-clock timestamp (unix millis).
    pub timestamp: u64,
}

impl Transaction {
    /// Creates a transaction with a fresh UUID id and current timestamp.
    pub fn new(actions: Vec<SyncAction>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            actions,
            timestamp: now_millis(),
        }
    }

    /// Creates a transaction with an explicit id.
    pub fn with_id(id: impl Into<String>, actions: Vec<SyncAction>) -> Self {
        Self {
            id: id.into(),
            actions,
            timestamp: now_millis(),
        }
    }
}

/// A confirmed action tagged with the sync id it was assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaSyncAction {
    /// The globally ordered version this action received.
    pub sync_id: u64,
    /// The confirmed action.
    #[serde(flatten)]
    pub action: SyncAction,
}

/// The unit of incremental catch-up.
///
/// Returned by bootstrap completion, push and pull. `sync_id` is the global
/// version after this packet; `actions` are in ascending sync id order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaPacket {
    /// Global version after this packet.
    pub sync_id: u64,
    /// Confirmed actions, ascending by sync id.
    pub actions: Vec<DeltaSyncAction>,
}

impl DeltaPacket {
    /// Creates a packet with no actions.
    pub fn empty(sync_id: u64) -> Self {
        Self {
            sync_id,
            actions: Vec::new(),
        }
    }

    /// Returns true if the packet carries no actions.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
