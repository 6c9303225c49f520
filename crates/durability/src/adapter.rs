//! Persistence adapter contract
//!
//! Adapters give the store durable snapshot storage without dictating a
//! backend. The coordinator calls `save`/`load` with opaque string keys; a
//! save must be atomic per key from the caller's perspective (readers see
//! the old envelope or the new one, never a torn write).

use crate::envelope::SnapshotEnvelope;
use async_trait::async_trait;
use basalt_core::StoreResult;

/// Pluggable snapshot storage.
///
/// Used as `Arc<dyn PersistenceAdapter>`; implementations must be safe to
/// call concurrently for distinct keys.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    /// Persist `envelope` under `key`, overwriting any previous value.
    async fn save(&self, key: &str, envelope: SnapshotEnvelope) -> StoreResult<()>;

    /// Load the envelope stored under `key`, or `None` when absent.
    async fn load(&self, key: &str) -> StoreResult<Option<SnapshotEnvelope>>;

    /// Release backend resources. Called once at store shutdown.
    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}
