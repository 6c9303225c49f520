//! basalt: a reactive, schema-validated embedded store
//!
//! Buckets hold JSON records validated against an immutable schema. Each
//! bucket is owned by a serialized actor, so every operation (including a
//! transaction's two-phase commit batch) runs without interleaving. On top
//! of that sit cross-bucket optimistic transactions, dependency-tracked
//! live queries, debounced snapshot persistence, TTL and capacity eviction,
//! and a wildcard event bus.
//!
//! ```no_run
//! use basalt::{BucketDefinition, FieldSpec, GeneratedStrategy, Store};
//! use serde_json::json;
//!
//! # async fn demo() -> basalt::StoreResult<()> {
//! let store = Store::open()?;
//! store
//!     .define_bucket(
//!         "users",
//!         BucketDefinition::builder("id")
//!             .field("id", FieldSpec::string().generated(GeneratedStrategy::Uuid))
//!             .field("email", FieldSpec::string().required().unique())
//!             .build(),
//!     )
//!     .await?;
//!
//! let users = store.bucket("users")?;
//! let alice = users.insert(json!({"email": "alice@example.com"})).await?;
//! assert_eq!(alice.version(), 1);
//!
//! store.stop().await?;
//! # Ok(())
//! # }
//! ```

pub use basalt_core::{
    deep_equal, now_millis, parse_duration_ms, BucketDefinition, BucketDefinitionBuilder, Fields,
    FieldSpec, FieldType, GeneratedStrategy, IssueCode, Key, Record, SchemaValidator, StorageOrder,
    StoreError, StoreResult, StringFormat, ValidationIssue,
};
pub use basalt_durability::{
    storage_key, DirectoryAdapter, MemoryAdapter, PersistenceAdapter, SnapshotEnvelope,
    SnapshotMetadata, SnapshotState,
};
pub use basalt_engine::{
    BucketHandle, BusSubscription, EventBridge, Page, QueryBucket, QueryContext, Store,
    StoreBuilder, StoreEvent, StoreStats, SubscriptionHandle, TransactionBucket,
    TransactionContext,
};

/// Helpers the collaborator modules expose individually.
pub mod helpers {
    pub use basalt_core::format::{is_email, is_iso_date, is_url};
    pub use basalt_core::ids::{cuid, timestamp_id, uuid_v4};
}
