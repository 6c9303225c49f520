//! Error types for the basalt store
//!
//! `StoreError` is the unified error type for all basalt APIs. Every variant
//! carries named contextual fields; callers match on variants and fields,
//! never on message text.
//!
//! ### Error Categories
//!
//! - **Validation**: schema constraint failures, collected per field
//! - **Conflict**: unique-index collisions and transaction version conflicts
//! - **Registry**: bucket/query name collisions and lookups
//! - **Lifecycle**: operations against a closed store or spent transaction
//! - **Persistence**: adapter save/load/close failures

use crate::key::Key;
use serde::Serialize;
use serde_json::Value;
use std::io;
use thiserror::Error;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A single violated constraint discovered during validation.
///
/// Validation collects every violation before failing, so a
/// [`StoreError::Validation`] carries an ordered list of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Field the constraint applies to
    pub field: String,
    /// Human-readable description of the violation
    pub message: String,
    /// Stable machine-readable code
    pub code: IssueCode,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>, code: IssueCode) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code,
        }
    }
}

/// Stable codes identifying which constraint a [`ValidationIssue`] violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueCode {
    Required,
    Type,
    Enum,
    Min,
    Max,
    MinLength,
    MaxLength,
    Pattern,
    Format,
}

impl IssueCode {
    /// Wire name of the code, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::Required => "required",
            IssueCode::Type => "type",
            IssueCode::Enum => "enum",
            IssueCode::Min => "min",
            IssueCode::Max => "max",
            IssueCode::MinLength => "minLength",
            IssueCode::MaxLength => "maxLength",
            IssueCode::Pattern => "pattern",
            IssueCode::Format => "format",
        }
    }
}

/// Unified error type for all basalt operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// One or more schema constraints failed for an insert/update
    #[error("validation failed for bucket '{bucket}': {} issue(s)", issues.len())]
    Validation {
        /// Bucket whose schema was violated
        bucket: String,
        /// Every violated constraint, in schema order
        issues: Vec<ValidationIssue>,
    },

    /// A unique-indexed field already holds this value
    #[error("unique constraint violated on '{bucket}.{field}' for value {value}")]
    UniqueConstraint {
        bucket: String,
        field: String,
        value: Value,
    },

    /// Bucket name already registered
    #[error("bucket '{bucket}' already exists")]
    BucketAlreadyExists { bucket: String },

    /// Bucket name not registered (or its actor has shut down)
    #[error("bucket '{bucket}' is not defined")]
    BucketNotDefined { bucket: String },

    /// Update targeted a key with no record
    #[error("record '{key}' not found in bucket '{bucket}'")]
    RecordNotFound { bucket: String, key: Key },

    /// Query name already registered
    #[error("query '{query}' is already defined")]
    QueryAlreadyDefined { query: String },

    /// Query name not registered
    #[error("query '{query}' is not defined")]
    QueryNotDefined { query: String },

    /// Optimistic commit validation failed: a version mismatch, an update of
    /// a vanished record, or an insert key/unique collision
    #[error("transaction conflict in bucket '{bucket}' on key '{key}'")]
    TransactionConflict {
        bucket: String,
        key: Key,
        /// Set when the conflict is a unique-index collision
        field: Option<String>,
    },

    /// `commit` called more than once on the same transaction
    #[error("transaction already committed")]
    TransactionAlreadyCommitted,

    /// Bucket definition rejected at registration (bad pattern regex, bad TTL)
    #[error("invalid definition for bucket '{bucket}': {reason}")]
    InvalidDefinition { bucket: String, reason: String },

    /// Topic or topic pattern failed to parse (empty segment, empty topic)
    #[error("invalid topic or pattern '{topic}'")]
    InvalidTopic { topic: String },

    /// TTL duration string rejected by the parser
    #[error("invalid duration '{input}'")]
    InvalidDuration { input: String },

    /// Operation arrived after the store stopped
    #[error("store is closed")]
    StoreClosed,

    /// Persistence adapter failure (save/load/close)
    #[error("persistence error: {message}")]
    Persistence {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Snapshot (de)serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O failure from a file-backed adapter
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    pub fn validation(bucket: impl Into<String>, issues: Vec<ValidationIssue>) -> Self {
        StoreError::Validation {
            bucket: bucket.into(),
            issues,
        }
    }

    pub fn unique_constraint(
        bucket: impl Into<String>,
        field: impl Into<String>,
        value: Value,
    ) -> Self {
        StoreError::UniqueConstraint {
            bucket: bucket.into(),
            field: field.into(),
            value,
        }
    }

    pub fn bucket_already_exists(bucket: impl Into<String>) -> Self {
        StoreError::BucketAlreadyExists {
            bucket: bucket.into(),
        }
    }

    pub fn bucket_not_defined(bucket: impl Into<String>) -> Self {
        StoreError::BucketNotDefined {
            bucket: bucket.into(),
        }
    }

    pub fn record_not_found(bucket: impl Into<String>, key: Key) -> Self {
        StoreError::RecordNotFound {
            bucket: bucket.into(),
            key,
        }
    }

    pub fn query_already_defined(query: impl Into<String>) -> Self {
        StoreError::QueryAlreadyDefined {
            query: query.into(),
        }
    }

    pub fn query_not_defined(query: impl Into<String>) -> Self {
        StoreError::QueryNotDefined {
            query: query.into(),
        }
    }

    pub fn transaction_conflict(
        bucket: impl Into<String>,
        key: Key,
        field: Option<String>,
    ) -> Self {
        StoreError::TransactionConflict {
            bucket: bucket.into(),
            key,
            field,
        }
    }

    pub fn invalid_definition(bucket: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::InvalidDefinition {
            bucket: bucket.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_topic(topic: impl Into<String>) -> Self {
        StoreError::InvalidTopic {
            topic: topic.into(),
        }
    }

    pub fn invalid_duration(input: impl Into<String>) -> Self {
        StoreError::InvalidDuration {
            input: input.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        StoreError::Persistence {
            message: message.into(),
            source: None,
        }
    }

    pub fn persistence_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        StoreError::Persistence {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    // =========================================================================
    // Classification
    // =========================================================================

    /// Constraint failure on user input; fix the input, don't retry.
    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation { .. })
    }

    /// Unique collision or optimistic version conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::UniqueConstraint { .. } | StoreError::TransactionConflict { .. }
        )
    }

    /// Missing bucket, query, or record.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::BucketNotDefined { .. }
                | StoreError::QueryNotDefined { .. }
                | StoreError::RecordNotFound { .. }
        )
    }

    /// Retryable after re-reading current state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::TransactionConflict { .. })
    }

    /// Adapter or I/O failure; the store continues in memory.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            StoreError::Persistence { .. } | StoreError::Serialization(_) | StoreError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validation_display_counts_issues() {
        let err = StoreError::validation(
            "users",
            vec![
                ValidationIssue::new("email", "required field missing", IssueCode::Required),
                ValidationIssue::new("age", "expected number", IssueCode::Type),
            ],
        );
        let msg = err.to_string();
        assert!(msg.contains("users"));
        assert!(msg.contains("2 issue(s)"));
        assert!(err.is_validation());
        assert!(!err.is_conflict());
    }

    #[test]
    fn unique_constraint_carries_context() {
        let err = StoreError::unique_constraint("users", "email", json!("a@x"));
        match &err {
            StoreError::UniqueConstraint {
                bucket,
                field,
                value,
            } => {
                assert_eq!(bucket, "users");
                assert_eq!(field, "email");
                assert_eq!(value, &json!("a@x"));
            }
            _ => panic!("wrong variant"),
        }
        assert!(err.is_conflict());
        assert!(!err.is_retryable());
    }

    #[test]
    fn transaction_conflict_is_retryable() {
        let err = StoreError::transaction_conflict("orders", Key::from("o1"), None);
        assert!(err.is_conflict());
        assert!(err.is_retryable());
        assert!(err.to_string().contains("orders"));
    }

    #[test]
    fn not_found_classification() {
        assert!(StoreError::bucket_not_defined("ghost").is_not_found());
        assert!(StoreError::query_not_defined("ghost").is_not_found());
        assert!(StoreError::record_not_found("users", Key::from(7)).is_not_found());
        assert!(!StoreError::bucket_already_exists("users").is_not_found());
    }

    #[test]
    fn issue_codes_have_stable_wire_names() {
        assert_eq!(IssueCode::Required.as_str(), "required");
        assert_eq!(IssueCode::MinLength.as_str(), "minLength");
        assert_eq!(
            serde_json::to_value(IssueCode::MaxLength).unwrap(),
            json!("maxLength")
        );
    }

    #[test]
    fn persistence_errors_classify() {
        let io_err = io::Error::new(io::ErrorKind::Other, "disk full");
        let err = StoreError::persistence_with_source("save failed", io_err);
        assert!(err.is_persistence());
        match err {
            StoreError::Persistence { source, .. } => assert!(source.is_some()),
            _ => panic!("wrong variant"),
        }
    }
}
