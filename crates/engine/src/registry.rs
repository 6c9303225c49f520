//! Registry of live buckets
//!
//! Shared by the store facade, the transaction engine (commit walks buckets
//! in registration order), and the query manager (context bucket lookup).
//! Only the store mutates it.

use crate::bucket::BucketHandle;
use basalt_core::schema::BucketDefinition;
use basalt_core::SchemaValidator;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// One registered bucket.
#[derive(Clone)]
pub(crate) struct BucketEntry {
    pub handle: BucketHandle,
    pub definition: Arc<BucketDefinition>,
    pub validator: Arc<SchemaValidator>,
    /// Registration sequence number; transaction commits walk ascending
    pub order: usize,
}

#[derive(Default)]
pub(crate) struct BucketRegistry {
    entries: HashMap<String, BucketEntry>,
    next_order: usize,
}

pub(crate) type SharedRegistry = Arc<RwLock<BucketRegistry>>;

impl BucketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<BucketEntry> {
        self.entries.get(name).cloned()
    }

    pub fn insert(
        &mut self,
        name: &str,
        handle: BucketHandle,
        definition: Arc<BucketDefinition>,
        validator: Arc<SchemaValidator>,
    ) {
        let order = self.next_order;
        self.next_order += 1;
        self.entries.insert(
            name.to_string(),
            BucketEntry {
                handle,
                definition,
                validator,
                order,
            },
        );
    }

    pub fn remove(&mut self, name: &str) -> Option<BucketEntry> {
        self.entries.remove(name)
    }

    /// Bucket names in registration order.
    pub fn names(&self) -> Vec<String> {
        let mut entries: Vec<(&String, &BucketEntry)> = self.entries.iter().collect();
        entries.sort_by_key(|(_, e)| e.order);
        entries.into_iter().map(|(name, _)| name.clone()).collect()
    }

    /// Every entry with its name, in registration order.
    pub fn entries(&self) -> Vec<(String, BucketEntry)> {
        let mut entries: Vec<(String, BucketEntry)> = self
            .entries
            .iter()
            .map(|(n, e)| (n.clone(), e.clone()))
            .collect();
        entries.sort_by_key(|(_, e)| e.order);
        entries
    }
}
