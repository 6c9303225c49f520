//! Secondary and unique indexes for one bucket
//!
//! [`IndexManager`] maintains equality indexes over record fields:
//! - secondary indexes map a field value to the set of keys holding it
//! - unique indexes map a field value to the single key allowed to hold it
//!
//! Null and absent values are never indexed. A failing add or update leaves
//! every index exactly as it was: all unique fields are checked before any
//! entry is written.

use basalt_core::{Key, Record, StoreError, StoreResult};
use basalt_core::schema::BucketDefinition;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Canonical, hashable form of an indexable field value.
///
/// Numbers canonicalize so `5` and `5.0` land on the same entry (matching
/// the equality used by filters); `-0.0` normalizes to `0.0`. Null, objects,
/// and arrays are not indexable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Bool(bool),
    Int(i64),
    /// Bit pattern of a non-integral float
    Float(u64),
    Str(String),
}

impl IndexKey {
    /// Canonicalize a JSON value into an index key, or `None` when the
    /// value is not indexable.
    pub fn from_value(value: &Value) -> Option<IndexKey> {
        match value {
            Value::Bool(b) => Some(IndexKey::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Some(IndexKey::Int(i));
                }
                let f = n.as_f64()?;
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                    Some(IndexKey::Int(f as i64))
                } else {
                    let normalized = if f == 0.0 { 0.0 } else { f };
                    Some(IndexKey::Float(normalized.to_bits()))
                }
            }
            Value::String(s) => Some(IndexKey::Str(s.clone())),
            _ => None,
        }
    }
}

/// Equality indexes for a single bucket.
#[derive(Debug)]
pub struct IndexManager {
    bucket: String,
    secondary: HashMap<String, HashMap<IndexKey, HashSet<Key>>>,
    unique: HashMap<String, HashMap<IndexKey, Key>>,
}

impl IndexManager {
    /// Build the (empty) index set for a bucket definition.
    ///
    /// Every `unique` field gets a unique index even when not listed under
    /// `indexes`; declared indexes on unique fields are subsumed by the
    /// unique index.
    pub fn new(bucket: &str, definition: &BucketDefinition) -> Self {
        let unique_fields = definition.unique_fields();
        let mut unique = HashMap::new();
        for field in &unique_fields {
            unique.insert(field.clone(), HashMap::new());
        }
        let mut secondary = HashMap::new();
        for field in definition.indexed_fields() {
            if !unique_fields.contains(&field) {
                secondary.insert(field, HashMap::new());
            }
        }
        Self {
            bucket: bucket.to_string(),
            secondary,
            unique,
        }
    }

    /// Whether any index covers this field.
    pub fn is_indexed(&self, field: &str) -> bool {
        self.secondary.contains_key(field) || self.unique.contains_key(field)
    }

    /// Keys whose record holds `value` in `field`. Empty when the field is
    /// not indexed or nothing matches.
    pub fn lookup(&self, field: &str, value: &Value) -> HashSet<Key> {
        let index_key = match IndexKey::from_value(value) {
            Some(k) => k,
            None => return HashSet::new(),
        };
        if let Some(values) = self.unique.get(field) {
            return values
                .get(&index_key)
                .map(|key| {
                    let mut set = HashSet::with_capacity(1);
                    set.insert(key.clone());
                    set
                })
                .unwrap_or_default();
        }
        self.secondary
            .get(field)
            .and_then(|values| values.get(&index_key))
            .cloned()
            .unwrap_or_default()
    }

    /// Dry-run the unique checks an insert of `record` would perform.
    ///
    /// `exclude` skips collisions with a given key (the record being
    /// replaced during an update). Returns the offending field and value on
    /// collision.
    pub fn check_unique(
        &self,
        record: &Record,
        exclude: Option<&Key>,
    ) -> Result<(), (String, Value)> {
        for (field, values) in &self.unique {
            let value = match record.get(field) {
                Some(v) if !v.is_null() => v,
                _ => continue,
            };
            if let Some(index_key) = IndexKey::from_value(value) {
                if let Some(existing) = values.get(&index_key) {
                    if exclude != Some(existing) {
                        return Err((field.clone(), value.clone()));
                    }
                }
            }
        }
        Ok(())
    }

    /// Index a newly inserted record.
    ///
    /// All unique fields are verified before any entry is written, so a
    /// conflict leaves the indexes untouched.
    pub fn add_record(&mut self, key: &Key, record: &Record) -> StoreResult<()> {
        if let Err((field, value)) = self.check_unique(record, None) {
            return Err(StoreError::unique_constraint(&self.bucket, field, value));
        }
        self.write_entries(key, record);
        Ok(())
    }

    /// Remove every index entry belonging to `record`.
    pub fn remove_record(&mut self, key: &Key, record: &Record) {
        for (field, values) in &mut self.unique {
            if let Some(index_key) = indexable(record.get(field)) {
                if values.get(&index_key) == Some(key) {
                    values.remove(&index_key);
                }
            }
        }
        for (field, values) in &mut self.secondary {
            if let Some(index_key) = indexable(record.get(field)) {
                if let Some(keys) = values.get_mut(&index_key) {
                    keys.remove(key);
                    if keys.is_empty() {
                        values.remove(&index_key);
                    }
                }
            }
        }
    }

    /// Re-index a record whose fields changed.
    ///
    /// Unique collisions (excluding `key` itself) are checked across every
    /// changed field before any entry moves; on conflict nothing changes.
    pub fn update_record(&mut self, key: &Key, old: &Record, new: &Record) -> StoreResult<()> {
        if let Err((field, value)) = self.check_unique(new, Some(key)) {
            return Err(StoreError::unique_constraint(&self.bucket, field, value));
        }
        self.remove_record(key, old);
        self.write_entries(key, new);
        Ok(())
    }

    /// Write entries unconditionally, clobbering unique slots.
    ///
    /// Rollback path only: undo operations restore known-good state and must
    /// not re-validate.
    pub fn force_add(&mut self, key: &Key, record: &Record) {
        self.write_entries(key, record);
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        for values in self.secondary.values_mut() {
            values.clear();
        }
        for values in self.unique.values_mut() {
            values.clear();
        }
    }

    fn write_entries(&mut self, key: &Key, record: &Record) {
        for (field, values) in &mut self.unique {
            if let Some(index_key) = indexable(record.get(field)) {
                values.insert(index_key, key.clone());
            }
        }
        for (field, values) in &mut self.secondary {
            if let Some(index_key) = indexable(record.get(field)) {
                values.entry(index_key).or_default().insert(key.clone());
            }
        }
    }
}

fn indexable(value: Option<&Value>) -> Option<IndexKey> {
    value.filter(|v| !v.is_null()).and_then(IndexKey::from_value)
}
