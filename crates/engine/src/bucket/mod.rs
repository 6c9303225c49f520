//! Bucket actor: serialized owner of one bucket's state
//!
//! All state-touching operations on a bucket travel as messages to a single
//! task that owns the table, indexes, and autoincrement counter, processing
//! one message at a time to completion. That serialization is the bucket's
//! isolation mechanism: no locks, no interleaving within an operation, and
//! `commit_batch` runs its two phases without anything slipping in between.

mod actor;
mod handle;
mod message;

pub use handle::BucketHandle;
pub(crate) use actor::spawn_bucket;
pub(crate) use message::{CommitOp, UndoOp};

use basalt_core::{deep_equal, Fields, Key, Record};
use serde::Serialize;

/// One page of a cursor walk over a bucket.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub records: Vec<Record>,
    /// Whether records remain past this page
    pub has_more: bool,
    /// Pass as `after` to fetch the next page; `None` on an empty page
    pub next_cursor: Option<Key>,
}

/// Strict-equality filter match: every filter field must be present on the
/// record and deeply equal. An absent field never matches, including
/// against a null filter value.
pub(crate) fn matches_filter(record: &Record, filter: &Fields) -> bool {
    filter.iter().all(|(field, expected)| {
        record
            .get(field)
            .map(|actual| deep_equal(actual, expected))
            .unwrap_or(false)
    })
}

/// Coerce a user-supplied JSON value into a field map, rejecting
/// non-objects with a validation issue on the whole payload (`$`).
pub(crate) fn object_fields(bucket: &str, value: serde_json::Value) -> basalt_core::StoreResult<Fields> {
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(basalt_core::StoreError::validation(
            bucket,
            vec![basalt_core::ValidationIssue::new(
                "$",
                format!("expected a JSON object, got {}", json_type_name(&other)),
                basalt_core::IssueCode::Type,
            )],
        )),
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
