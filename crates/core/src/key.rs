//! Primary-key scalar for bucket records
//!
//! A record's key is the value of its primary-key field: an integer
//! (autoincrement buckets) or a string (uuid/cuid buckets). `Key` keeps both
//! hashable and totally ordered so tables and indexes can use it directly,
//! and serializes untagged so snapshot envelopes round-trip the raw scalar.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Primary-key value of a record.
///
/// Integers order before strings; within a variant, natural ordering applies.
/// That gives `ordered-by-key` buckets a deterministic total order even for
/// mixed key types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl Key {
    /// Extract a key from a JSON value.
    ///
    /// Accepts strings and integral numbers (a float like `7.0` collapses to
    /// `7`). Everything else (null, bool, fractional numbers, objects,
    /// arrays) is not a usable primary key.
    pub fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::String(s) => Some(Key::Str(s.clone())),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Key::Int(i))
                } else {
                    n.as_f64().and_then(|f| {
                        if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                            Some(Key::Int(f as i64))
                        } else {
                            None
                        }
                    })
                }
            }
            _ => None,
        }
    }

    /// The JSON value this key came from.
    pub fn to_value(&self) -> Value {
        match self {
            Key::Int(i) => Value::from(*i),
            Key::Str(s) => Value::from(s.clone()),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Key::Int(i) => Some(*i),
            Key::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::Int(_) => None,
            Key::Str(s) => Some(s),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{}", i),
            Key::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}
