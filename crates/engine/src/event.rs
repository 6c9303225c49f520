//! Store mutation events
//!
//! Every successful insert/update/delete (including TTL purges and capacity
//! evictions, which are deletes) produces exactly one event, published on a
//! three-segment topic: `bucket.<name>.<inserted|updated|deleted>`.

use basalt_core::{Key, Record};
use serde::Serialize;

/// A committed mutation, carrying the precise record(s) involved.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StoreEvent {
    Inserted {
        bucket: String,
        key: Key,
        record: Record,
    },
    Updated {
        bucket: String,
        key: Key,
        old_record: Record,
        new_record: Record,
    },
    Deleted {
        bucket: String,
        key: Key,
        record: Record,
    },
}

impl StoreEvent {
    pub fn bucket(&self) -> &str {
        match self {
            StoreEvent::Inserted { bucket, .. }
            | StoreEvent::Updated { bucket, .. }
            | StoreEvent::Deleted { bucket, .. } => bucket,
        }
    }

    pub fn key(&self) -> &Key {
        match self {
            StoreEvent::Inserted { key, .. }
            | StoreEvent::Updated { key, .. }
            | StoreEvent::Deleted { key, .. } => key,
        }
    }

    /// Third topic segment for this event.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreEvent::Inserted { .. } => "inserted",
            StoreEvent::Updated { .. } => "updated",
            StoreEvent::Deleted { .. } => "deleted",
        }
    }

    /// The full publish topic: `bucket.<name>.<kind>`.
    pub fn topic(&self) -> String {
        format!("bucket.{}.{}", self.bucket(), self.kind())
    }
}
