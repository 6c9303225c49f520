//! Engine layer for basalt
//!
//! Everything above the storage primitives: the per-bucket actor, the
//! wildcard event bus, cross-bucket transactions, the reactive query
//! manager, debounced snapshot persistence, the TTL scan loop, the external
//! event bridge, and the store facade that wires them together.

#![warn(clippy::all)]

pub mod bridge;
pub mod bucket;
pub mod bus;
pub mod event;
pub mod query;
pub mod store;
pub mod transaction;

mod persistence;
mod registry;
mod ttl;

pub use bridge::EventBridge;
pub use bucket::{BucketHandle, Page};
pub use bus::BusSubscription;
pub use event::StoreEvent;
pub use query::{QueryBucket, QueryContext, QueryManager, SubscriptionHandle};
pub use store::{Store, StoreBuilder, StoreStats};
pub use transaction::{TransactionBucket, TransactionContext};
