//! Record state and the shared merge rule.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// A record's field data: property name to JSON value.
pub type DataMap = BTreeMap<String, Value>;

/// A replicated record.
///
/// Owned exclusively by the server store; clients hold copies, never the
/// authority. A record is never physically removed on delete; `deleted`
/// is a tombstone so the deletion can travel in a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    /// Client-generated record id, stable across optimistic and confirmed state.
    pub id: String,
    /// Name of the model this record belongs to.
    pub model_name: String,
    /// Field data.
    pub data: DataMap,
    /// Version of the last action applied to this record.
    pub sync_id: u64,
    /// Tombstone flag.
    pub deleted: bool,
    /// Creation timestamp (unix millis).
    pub created_at: u64,
    /// Last-update timestamp (unix millis).
    pub updated_at: u64,
}

impl SyncRecord {
    /// Creates a fresh live record.
    pub fn new(id: impl Into<String>, model_name: impl Into<String>, data: DataMap) -> Self {
        let now = now_millis();
        Self {
            id: id.into(),
            model_name: model_name.into(),
            data,
            sync_id: 0,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the record is live (not tombstoned).
    pub fn is_live(&self) -> bool {
        !self.deleted
    }
}

/// Shallow-merges `patch` onto `base`: patch keys overwrite, other keys keep
/// their previous values.
///
/// This is the single whole-record last-write-wins merge rule. The server
/// applies it when committing an `update`, and the client applies the same
/// rule both optimistically and when replaying deltas, so both sides
/// converge on identical state.
pub fn merge_data(base: &mut DataMap, patch: &DataMap) {
    for (key, value) in patch {
        base.insert(key.clone(), value.clone());
    }
}

/// Current wall-clock time in unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(pairs: &[(&str, Value)]) -> DataMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn new_record_is_live() {
        let record = SyncRecord::new("r1", "Task", data(&[("title", json!("A"))]));
        assert!(record.is_live());
        assert_eq!(record.sync_id, 0);
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn merge_overwrites_and_keeps() {
        let mut base = data(&[("title", json!("A")), ("done", json!(false))]);
        let patch = data(&[("done", json!(true)), ("priority", json!(2))]);

        merge_data(&mut base, &patch);

        assert_eq!(base["title"], json!("A"));
        assert_eq!(base["done"], json!(true));
        assert_eq!(base["priority"], json!(2));
    }

    #[test]
    fn merge_is_idempotent() {
        let mut once = data(&[("a", json!(1))]);
        let patch = data(&[("a", json!(2)), ("b", json!(3))]);

        merge_data(&mut once, &patch);
        let mut twice = once.clone();
        merge_data(&mut twice, &patch);

        assert_eq!(once, twice);
    }

    #[test]
    fn record_json_shape() {
        let record = SyncRecord::new("r1", "Task", DataMap::new());
        let json = serde_json::to_value(&record).unwrap();

        assert!(json.get("modelName").is_some());
        assert!(json.get("syncId").is_some());
        assert!(json.get("createdAt").is_some());
    }
}
