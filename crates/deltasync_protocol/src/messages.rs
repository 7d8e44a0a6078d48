//! Request and response bodies for the sync endpoints.

use crate::action::{DeltaPacket, Transaction};
use crate::record::SyncRecord;
use deltasync_model::ModelMeta;
use serde::{Deserialize, Serialize};

/// Body of `GET /bootstrap`: the full authoritative snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapResponse {
    /// All live (non-tombstoned) records.
    pub records: Vec<SyncRecord>,
    /// Current global version.
    pub sync_id: u64,
    /// Registered model metadata.
    pub models: Vec<ModelMeta>,
}

/// Body of `GET /pull?sinceSyncId=<n>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// Confirmed actions newer than the requested baseline.
    pub delta: DeltaPacket,
}

/// Body of `POST /push`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// The transaction to apply.
    pub transaction: Transaction,
}

/// Response body of `POST /push`.
///
/// On acceptance the delta carries the transaction's confirmed actions; on
/// rejection the delta is empty at the server's current version and `error`
/// carries the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    /// Whether the transaction was accepted.
    pub success: bool,
    /// Confirmed delta (empty on rejection).
    pub delta: DeltaPacket,
    /// Rejection reason, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PushResponse {
    /// Creates an acceptance response.
    pub fn accepted(delta: DeltaPacket) -> Self {
        Self {
            success: true,
            delta,
            error: None,
        }
    }

    /// Creates a rejection response at the server's current version.
    pub fn rejected(current_sync_id: u64, message: impl Into<String>) -> Self {
        Self {
            success: false,
            delta: DeltaPacket::empty(current_sync_id),
            error: Some(message.into()),
        }
    }
}
