//! Snapshot envelope format
//!
//! A snapshot captures one bucket's full contents plus its autoincrement
//! counter, wrapped with provenance metadata. Snapshots are **physical**
//! (materialized state), not history: restoring one rebuilds tables and
//! indexes from scratch.
//!
//! Wire layout (JSON, camelCase):
//!
//! ```text
//! {
//!   "state":    { "records": [[key, record], ...], "autoincrementCounter": n },
//!   "metadata": { "persistedAt": ms, "serverId": "store-name", "schemaVersion": 1 }
//! }
//! ```

use basalt_core::{now_millis, Key, Record};
use serde::{Deserialize, Serialize};

/// Envelope schema version written by this crate.
pub const SCHEMA_VERSION: u32 = 1;

/// Materialized bucket contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotState {
    /// `(key, record)` pairs in the bucket's iteration order
    pub records: Vec<(Key, Record)>,
    /// Autoincrement counter at capture time
    pub autoincrement_counter: i64,
}

/// Provenance attached to a persisted snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    /// Capture wall-clock time in milliseconds
    pub persisted_at: i64,
    /// Name of the store that wrote the snapshot
    pub server_id: String,
    /// Envelope format version
    pub schema_version: u32,
}

/// A bucket snapshot as handed to a persistence adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEnvelope {
    pub state: SnapshotState,
    pub metadata: SnapshotMetadata,
}

impl SnapshotEnvelope {
    /// Wrap captured state with fresh metadata.
    pub fn new(state: SnapshotState, store_name: &str) -> Self {
        Self {
            state,
            metadata: SnapshotMetadata {
                persisted_at: now_millis(),
                server_id: store_name.to_string(),
                schema_version: SCHEMA_VERSION,
            },
        }
    }
}

/// Adapter storage key for a bucket: `<store>:bucket:<bucket>`.
pub fn storage_key(store_name: &str, bucket: &str) -> String {
    format!("{}:bucket:{}", store_name, bucket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        match value {
            serde_json::Value::Object(map) => Record::new(map),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn envelope_wire_shape() {
        let state = SnapshotState {
            records: vec![(Key::from("u1"), record(json!({"id": "u1", "_version": 1})))],
            autoincrement_counter: 4,
        };
        let envelope = SnapshotEnvelope::new(state, "main");
        let wire = serde_json::to_value(&envelope).unwrap();

        assert_eq!(wire["state"]["autoincrementCounter"], json!(4));
        assert_eq!(wire["state"]["records"][0][0], json!("u1"));
        assert_eq!(wire["metadata"]["serverId"], json!("main"));
        assert_eq!(wire["metadata"]["schemaVersion"], json!(1));
        assert!(wire["metadata"]["persistedAt"].as_i64().unwrap() > 0);
    }

    #[test]
    fn envelope_round_trips() {
        let state = SnapshotState {
            records: vec![
                (Key::Int(1), record(json!({"id": 1, "label": "a"}))),
                (Key::Int(2), record(json!({"id": 2, "label": "b"}))),
            ],
            autoincrement_counter: 2,
        };
        let envelope = SnapshotEnvelope::new(state.clone(), "main");
        let text = serde_json::to_string(&envelope).unwrap();
        let back: SnapshotEnvelope = serde_json::from_str(&text).unwrap();
        assert_eq!(back.state, state);
    }

    #[test]
    fn storage_key_convention() {
        assert_eq!(storage_key("main", "users"), "main:bucket:users");
    }
}
