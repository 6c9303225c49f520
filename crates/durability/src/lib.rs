//! Durability layer for basalt
//!
//! Snapshot-only persistence: buckets are captured as whole-state envelopes
//! and handed to a pluggable adapter. There is no write-ahead log; the
//! loss window is bounded by the persistence coordinator's debounce.
//!
//! - `envelope`: the wire format (records + counter + metadata)
//! - `adapter`: the async `PersistenceAdapter` contract
//! - `memory` / `file`: bundled adapters

#![warn(clippy::all)]

pub mod adapter;
pub mod envelope;
pub mod file;
pub mod memory;

pub use adapter::PersistenceAdapter;
pub use envelope::{storage_key, SnapshotEnvelope, SnapshotMetadata, SnapshotState, SCHEMA_VERSION};
pub use file::DirectoryAdapter;
pub use memory::MemoryAdapter;
