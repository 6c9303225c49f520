//! Record representation and system metadata
//!
//! A record is a JSON object augmented with four system fields:
//! `_version` (1 on insert, +1 per update), `_createdAt` / `_updatedAt`
//! (millisecond wall-clock timestamps), and an optional `_expiresAt`
//! (millisecond deadline for TTL purging).

use crate::key::Key;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Version field: monotonically increasing positive integer.
pub const FIELD_VERSION: &str = "_version";
/// Creation timestamp in milliseconds; immutable after insert.
pub const FIELD_CREATED_AT: &str = "_createdAt";
/// Last-update timestamp in milliseconds; advances on every update.
pub const FIELD_UPDATED_AT: &str = "_updatedAt";
/// Optional TTL deadline in milliseconds.
pub const FIELD_EXPIRES_AT: &str = "_expiresAt";

/// Raw field map of a record.
pub type Fields = Map<String, Value>;

/// Get current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A validated bucket record: user fields plus system metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Fields,
}

impl Record {
    pub fn new(fields: Fields) -> Self {
        Self { fields }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn into_fields(self) -> Fields {
        self.fields
    }

    /// `_version`, defaulting to 0 when absent (never the case for a
    /// validated record).
    pub fn version(&self) -> u64 {
        self.fields
            .get(FIELD_VERSION)
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    pub fn created_at(&self) -> i64 {
        self.fields
            .get(FIELD_CREATED_AT)
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }

    pub fn updated_at(&self) -> i64 {
        self.fields
            .get(FIELD_UPDATED_AT)
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }

    /// TTL deadline, if the record carries one.
    pub fn expires_at(&self) -> Option<i64> {
        self.fields.get(FIELD_EXPIRES_AT).and_then(Value::as_i64)
    }

    /// Whether the record is past its TTL deadline at `now`.
    ///
    /// A deadline of exactly `now` counts as expired.
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at(), Some(deadline) if deadline <= now)
    }

    /// Extract the primary key from the named field.
    pub fn key(&self, key_field: &str) -> Option<Key> {
        self.fields.get(key_field).and_then(Key::from_value)
    }

    /// The record as a JSON value (for event payloads and callbacks).
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

impl From<Fields> for Record {
    fn from(fields: Fields) -> Self {
        Record::new(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => Record::new(map),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn metadata_accessors() {
        let r = record(json!({
            "id": "u1",
            "_version": 3,
            "_createdAt": 100,
            "_updatedAt": 250,
        }));
        assert_eq!(r.version(), 3);
        assert_eq!(r.created_at(), 100);
        assert_eq!(r.updated_at(), 250);
        assert_eq!(r.expires_at(), None);
        assert_eq!(r.key("id"), Some(Key::from("u1")));
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let r = record(json!({"id": 1, "_expiresAt": 500}));
        assert!(!r.is_expired(499));
        assert!(r.is_expired(500));
        assert!(r.is_expired(501));
    }

    #[test]
    fn no_deadline_never_expires() {
        let r = record(json!({"id": 1}));
        assert!(!r.is_expired(i64::MAX));
    }

    #[test]
    fn serializes_transparently() {
        let r = record(json!({"id": 7, "name": "a"}));
        assert_eq!(
            serde_json::to_value(&r).unwrap(),
            json!({"id": 7, "name": "a"})
        );
    }

    #[test]
    fn now_millis_is_wall_clock_scale() {
        // 2020-01-01 in ms; sanity bound, not exactness.
        assert!(now_millis() > 1_577_836_800_000);
    }
}
