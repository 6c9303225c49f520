//! Core types for the basalt store
//!
//! This crate defines the foundational types used throughout the system:
//! - Key: primary-key scalar (integer or string)
//! - Record: JSON-object record with system metadata accessors
//! - BucketDefinition / FieldSpec: immutable bucket schemas
//! - SchemaValidator: record preparation and constraint validation
//! - StoreError: the unified error hierarchy
//! - Helpers: deep equality, id generation, format validators, TTL parsing

#![warn(clippy::all)]

pub mod duration;
pub mod equality;
pub mod error;
pub mod format;
pub mod ids;
pub mod key;
pub mod record;
pub mod schema;
pub mod validate;

pub use duration::parse_duration_ms;
pub use equality::deep_equal;
pub use error::{IssueCode, StoreError, StoreResult, ValidationIssue};
pub use key::Key;
pub use record::{
    now_millis, Fields, Record, FIELD_CREATED_AT, FIELD_EXPIRES_AT, FIELD_UPDATED_AT,
    FIELD_VERSION,
};
pub use schema::{
    BucketDefinition, BucketDefinitionBuilder, DefaultValue, FieldSpec, FieldType,
    GeneratedStrategy, StorageOrder, StringFormat,
};
pub use validate::SchemaValidator;
