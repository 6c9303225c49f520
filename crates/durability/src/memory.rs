//! In-memory persistence adapter
//!
//! Keeps envelopes in a mutex-guarded map. Survives store restarts that
//! reuse the same adapter instance, which is what restart tests need.

use crate::adapter::PersistenceAdapter;
use crate::envelope::SnapshotEnvelope;
use async_trait::async_trait;
use basalt_core::StoreResult;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Adapter backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    entries: Mutex<HashMap<String, SnapshotEnvelope>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored envelopes.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Stored keys, for assertions.
    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }
}

#[async_trait]
impl PersistenceAdapter for MemoryAdapter {
    async fn save(&self, key: &str, envelope: SnapshotEnvelope) -> StoreResult<()> {
        self.entries.lock().insert(key.to_string(), envelope);
        Ok(())
    }

    async fn load(&self, key: &str) -> StoreResult<Option<SnapshotEnvelope>> {
        Ok(self.entries.lock().get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::SnapshotState;

    fn envelope(counter: i64) -> SnapshotEnvelope {
        SnapshotEnvelope::new(
            SnapshotState {
                records: Vec::new(),
                autoincrement_counter: counter,
            },
            "test",
        )
    }

    #[tokio::test]
    async fn save_load_round_trip() {
        let adapter = MemoryAdapter::new();
        adapter.save("main:bucket:users", envelope(3)).await.unwrap();

        let loaded = adapter.load("main:bucket:users").await.unwrap().unwrap();
        assert_eq!(loaded.state.autoincrement_counter, 3);
        assert!(adapter.load("main:bucket:ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_overwrites() {
        let adapter = MemoryAdapter::new();
        adapter.save("k", envelope(1)).await.unwrap();
        adapter.save("k", envelope(2)).await.unwrap();

        assert_eq!(adapter.len(), 1);
        let loaded = adapter.load("k").await.unwrap().unwrap();
        assert_eq!(loaded.state.autoincrement_counter, 2);
    }
}
