//! Read-only query context with dependency capture
//!
//! Queries read buckets through [`QueryContext::bucket`]; every read records
//! a dependency as a side effect. `get` records a record-level dependency
//! (this bucket, this key); every other read method records a bucket-level
//! dependency. Bucket-level subsumes record-level for the same bucket.

use crate::bucket::{BucketHandle, Page};
use crate::registry::SharedRegistry;
use basalt_core::{Key, Record, StoreError, StoreResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// What a subscription depends on within one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BucketDependency {
    /// Any change to the bucket re-evaluates
    Bucket,
    /// Only changes to these keys re-evaluate
    Records(HashSet<Key>),
}

/// Bucket name → dependency granularity, accumulated over one evaluation.
pub(crate) type DependencySet = HashMap<String, BucketDependency>;

pub(crate) fn record_dependency(deps: &mut DependencySet, bucket: &str, key: &Key) {
    match deps.get_mut(bucket) {
        Some(BucketDependency::Bucket) => {}
        Some(BucketDependency::Records(keys)) => {
            keys.insert(key.clone());
        }
        None => {
            let mut keys = HashSet::new();
            keys.insert(key.clone());
            deps.insert(bucket.to_string(), BucketDependency::Records(keys));
        }
    }
}

pub(crate) fn bucket_dependency(deps: &mut DependencySet, bucket: &str) {
    deps.insert(bucket.to_string(), BucketDependency::Bucket);
}

/// Handed to every query invocation; resolves buckets and records what the
/// query read.
pub struct QueryContext {
    registry: SharedRegistry,
    deps: Arc<Mutex<DependencySet>>,
}

impl QueryContext {
    pub(crate) fn new(registry: SharedRegistry) -> (Self, Arc<Mutex<DependencySet>>) {
        let deps = Arc::new(Mutex::new(DependencySet::new()));
        (
            Self {
                registry,
                deps: Arc::clone(&deps),
            },
            deps,
        )
    }

    /// Read-only view of a bucket that tracks dependencies.
    pub fn bucket(&self, name: &str) -> StoreResult<QueryBucket> {
        let entry = self
            .registry
            .read()
            .get(name)
            .ok_or_else(|| StoreError::bucket_not_defined(name))?;
        Ok(QueryBucket {
            name: name.to_string(),
            handle: entry.handle,
            deps: Arc::clone(&self.deps),
        })
    }
}

/// Dependency-tracking read facade over one bucket.
pub struct QueryBucket {
    name: String,
    handle: BucketHandle,
    deps: Arc<Mutex<DependencySet>>,
}

impl QueryBucket {
    /// Record-level read: only changes to `key` re-trigger the query.
    pub async fn get(&self, key: impl Into<Key>) -> StoreResult<Option<Record>> {
        let key = key.into();
        record_dependency(&mut self.deps.lock(), &self.name, &key);
        self.handle.get(key).await
    }

    pub async fn all(&self) -> StoreResult<Vec<Record>> {
        bucket_dependency(&mut self.deps.lock(), &self.name);
        self.handle.all().await
    }

    pub async fn find(&self, filter: Value) -> StoreResult<Vec<Record>> {
        bucket_dependency(&mut self.deps.lock(), &self.name);
        self.handle.find(filter).await
    }

    pub async fn find_one(&self, filter: Value) -> StoreResult<Option<Record>> {
        bucket_dependency(&mut self.deps.lock(), &self.name);
        self.handle.find_one(filter).await
    }

    pub async fn count(&self, filter: Option<Value>) -> StoreResult<usize> {
        bucket_dependency(&mut self.deps.lock(), &self.name);
        self.handle.count(filter).await
    }

    pub async fn first(&self, n: usize) -> StoreResult<Vec<Record>> {
        bucket_dependency(&mut self.deps.lock(), &self.name);
        self.handle.first(n).await
    }

    pub async fn last(&self, n: usize) -> StoreResult<Vec<Record>> {
        bucket_dependency(&mut self.deps.lock(), &self.name);
        self.handle.last(n).await
    }

    pub async fn paginate(&self, after: Option<Key>, limit: usize) -> StoreResult<Page> {
        bucket_dependency(&mut self.deps.lock(), &self.name);
        self.handle.paginate(after, limit).await
    }

    pub async fn sum(&self, field: &str, filter: Option<Value>) -> StoreResult<f64> {
        bucket_dependency(&mut self.deps.lock(), &self.name);
        self.handle.sum(field, filter).await
    }

    pub async fn avg(&self, field: &str, filter: Option<Value>) -> StoreResult<f64> {
        bucket_dependency(&mut self.deps.lock(), &self.name);
        self.handle.avg(field, filter).await
    }

    pub async fn min(&self, field: &str, filter: Option<Value>) -> StoreResult<Option<f64>> {
        bucket_dependency(&mut self.deps.lock(), &self.name);
        self.handle.min(field, filter).await
    }

    pub async fn max(&self, field: &str, filter: Option<Value>) -> StoreResult<Option<f64>> {
        bucket_dependency(&mut self.deps.lock(), &self.name);
        self.handle.max(field, filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_level_dominates_record_level() {
        let mut deps = DependencySet::new();
        record_dependency(&mut deps, "users", &Key::from("u1"));
        match deps.get("users") {
            Some(BucketDependency::Records(keys)) => assert_eq!(keys.len(), 1),
            other => panic!("unexpected: {:?}", other),
        }

        bucket_dependency(&mut deps, "users");
        assert_eq!(deps.get("users"), Some(&BucketDependency::Bucket));

        // Later record reads do not narrow an established bucket dependency.
        record_dependency(&mut deps, "users", &Key::from("u2"));
        assert_eq!(deps.get("users"), Some(&BucketDependency::Bucket));
    }

    #[test]
    fn record_dependencies_accumulate() {
        let mut deps = DependencySet::new();
        record_dependency(&mut deps, "users", &Key::from("u1"));
        record_dependency(&mut deps, "users", &Key::from("u2"));
        match deps.get("users") {
            Some(BucketDependency::Records(keys)) => {
                assert!(keys.contains(&Key::from("u1")));
                assert!(keys.contains(&Key::from("u2")));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
