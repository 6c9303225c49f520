//! Reactive query manager
//!
//! Named async queries run against dependency-tracking bucket views. A
//! subscription stores its last delivered result and its dependency set;
//! bucket mutations trigger re-evaluation on a fresh task, and the callback
//! fires only when the new result differs under deep equality. A failed
//! re-evaluation leaves the subscription alive and silent.

mod context;

pub use context::{QueryBucket, QueryContext};
pub(crate) use context::{BucketDependency, DependencySet};

use crate::registry::SharedRegistry;
use basalt_core::{deep_equal, Key, StoreError, StoreResult};
use dashmap::DashMap;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

type QueryFn =
    Arc<dyn Fn(QueryContext, Option<Value>) -> BoxFuture<'static, StoreResult<Value>> + Send + Sync>;

/// Subscriber callback, invoked with each changed result.
pub type QueryCallback = Box<dyn Fn(&Value) + Send + Sync>;

struct Subscription {
    id: u64,
    query: String,
    params: Option<Value>,
    callback: QueryCallback,
    last_result: Mutex<Value>,
    cancelled: AtomicBool,
    /// Serializes re-evaluations of this subscription, so concurrent
    /// triggers cannot deliver the same result twice
    eval_lock: tokio::sync::Mutex<()>,
}

/// Per-bucket inverted index of subscriptions.
#[derive(Default)]
struct BucketSubscribers {
    bucket_level: HashSet<u64>,
    record_level: HashMap<Key, HashSet<u64>>,
}

struct PendingWork {
    count: AtomicUsize,
    idle: Notify,
}

struct QueryManagerInner {
    registry: SharedRegistry,
    queries: RwLock<HashMap<String, QueryFn>>,
    subscriptions: DashMap<u64, Arc<Subscription>>,
    index: Mutex<HashMap<String, BucketSubscribers>>,
    next_id: AtomicU64,
    pending: PendingWork,
}

/// Registry and scheduler for named reactive queries.
#[derive(Clone)]
pub struct QueryManager {
    inner: Arc<QueryManagerInner>,
}

impl QueryManager {
    pub(crate) fn new(registry: SharedRegistry) -> Self {
        Self {
            inner: Arc::new(QueryManagerInner {
                registry,
                queries: RwLock::new(HashMap::new()),
                subscriptions: DashMap::new(),
                index: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                pending: PendingWork {
                    count: AtomicUsize::new(0),
                    idle: Notify::new(),
                },
            }),
        }
    }

    /// Register a named query. Duplicate names are rejected.
    pub fn define_query<F, Fut>(&self, name: &str, query: F) -> StoreResult<()>
    where
        F: Fn(QueryContext, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StoreResult<Value>> + Send + 'static,
    {
        let mut queries = self.inner.queries.write();
        if queries.contains_key(name) {
            return Err(StoreError::query_already_defined(name));
        }
        let boxed: QueryFn = Arc::new(move |ctx, params| Box::pin(query(ctx, params)));
        queries.insert(name.to_string(), boxed);
        Ok(())
    }

    /// One-shot execution: no tracking, no subscription.
    pub async fn run_query(&self, name: &str, params: Option<Value>) -> StoreResult<Value> {
        let query = self.lookup(name)?;
        let (ctx, _) = QueryContext::new(Arc::clone(&self.inner.registry));
        query(ctx, params).await
    }

    /// Subscribe to a query's results.
    ///
    /// The query runs once to establish the initial result and dependency
    /// set; that run does NOT invoke the callback. Later mutations touching
    /// the dependencies re-evaluate, and the callback receives each result
    /// that differs from the last delivered one.
    pub async fn subscribe(
        &self,
        name: &str,
        params: Option<Value>,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> StoreResult<SubscriptionHandle> {
        let query = self.lookup(name)?;
        let (ctx, deps) = QueryContext::new(Arc::clone(&self.inner.registry));
        let initial = query(ctx, params.clone()).await?;

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let subscription = Arc::new(Subscription {
            id,
            query: name.to_string(),
            params,
            callback: Box::new(callback),
            last_result: Mutex::new(initial),
            cancelled: AtomicBool::new(false),
            eval_lock: tokio::sync::Mutex::new(()),
        });

        let captured = std::mem::take(&mut *deps.lock());
        self.inner.replace_dependencies(id, captured);
        self.inner.subscriptions.insert(id, subscription);
        Ok(SubscriptionHandle {
            inner: Arc::clone(&self.inner),
            id,
        })
    }

    /// React to a bucket mutation: schedule re-evaluation of every
    /// bucket-level subscriber plus the record-level subscribers of the
    /// changed keys.
    pub(crate) fn on_bucket_change(&self, bucket: &str, keys: &[Key]) {
        let affected: Vec<u64> = {
            let index = self.inner.index.lock();
            let Some(subscribers) = index.get(bucket) else {
                return;
            };
            let mut ids: HashSet<u64> = subscribers.bucket_level.iter().copied().collect();
            for key in keys {
                if let Some(record_ids) = subscribers.record_level.get(key) {
                    ids.extend(record_ids.iter().copied());
                }
            }
            ids.into_iter().collect()
        };

        for id in affected {
            if let Some(subscription) = self.inner.subscriptions.get(&id).map(|s| Arc::clone(s.value())) {
                self.schedule(subscription);
            }
        }
    }

    /// Resolves once no re-evaluations are in flight.
    pub async fn wait_for_pending(&self) {
        let notified = self.inner.pending.idle.notified();
        tokio::pin!(notified);
        loop {
            // Register before checking, so a completion between the check
            // and the await cannot be missed.
            notified.as_mut().enable();
            if self.inner.pending.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.as_mut().await;
            notified.set(self.inner.pending.idle.notified());
        }
    }

    /// Cancel everything and drop all registrations.
    pub fn destroy(&self) {
        for entry in self.inner.subscriptions.iter() {
            entry.value().cancelled.store(true, Ordering::SeqCst);
        }
        self.inner.subscriptions.clear();
        self.inner.index.lock().clear();
        self.inner.queries.write().clear();
    }

    pub fn defined_count(&self) -> usize {
        self.inner.queries.read().len()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.inner.subscriptions.len()
    }

    fn lookup(&self, name: &str) -> StoreResult<QueryFn> {
        self.inner
            .queries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::query_not_defined(name))
    }

    fn schedule(&self, subscription: Arc<Subscription>) {
        let inner = Arc::clone(&self.inner);
        inner.pending.count.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            inner.reevaluate(subscription).await;
            if inner.pending.count.fetch_sub(1, Ordering::SeqCst) == 1 {
                inner.pending.idle.notify_waiters();
            }
        });
    }
}

impl QueryManagerInner {
    async fn reevaluate(&self, subscription: Arc<Subscription>) {
        let _serialized = subscription.eval_lock.lock().await;
        if subscription.cancelled.load(Ordering::SeqCst) {
            return;
        }
        let query = {
            let queries = self.queries.read();
            match queries.get(&subscription.query) {
                Some(q) => Arc::clone(q),
                None => return,
            }
        };

        let (ctx, deps) = QueryContext::new(Arc::clone(&self.registry));
        let result = match query(ctx, subscription.params.clone()).await {
            Ok(result) => result,
            Err(e) => {
                // The subscription stays alive; this evaluation is dropped.
                debug!(query = %subscription.query, "re-evaluation failed: {}", e);
                return;
            }
        };

        if subscription.cancelled.load(Ordering::SeqCst) {
            return;
        }
        {
            let last = subscription.last_result.lock();
            if deep_equal(&last, &result) {
                return;
            }
        }

        let captured = std::mem::take(&mut *deps.lock());
        self.replace_dependencies(subscription.id, captured);
        *subscription.last_result.lock() = result.clone();
        (subscription.callback)(&result);
    }

    /// Swap a subscription's entries in the inverted index for a freshly
    /// captured dependency set.
    fn replace_dependencies(&self, id: u64, deps: DependencySet) {
        let mut index = self.index.lock();
        for subscribers in index.values_mut() {
            subscribers.bucket_level.remove(&id);
            for record_ids in subscribers.record_level.values_mut() {
                record_ids.remove(&id);
            }
            subscribers.record_level.retain(|_, ids| !ids.is_empty());
        }
        index.retain(|_, s| !s.bucket_level.is_empty() || !s.record_level.is_empty());

        for (bucket, dependency) in deps {
            let subscribers = index.entry(bucket).or_default();
            match dependency {
                BucketDependency::Bucket => {
                    subscribers.bucket_level.insert(id);
                }
                BucketDependency::Records(keys) => {
                    for key in keys {
                        subscribers.record_level.entry(key).or_default().insert(id);
                    }
                }
            }
        }
    }

    fn remove_subscription(&self, id: u64) {
        if let Some((_, subscription)) = self.subscriptions.remove(&id) {
            subscription.cancelled.store(true, Ordering::SeqCst);
        }
        self.replace_dependencies(id, DependencySet::new());
    }
}

/// Cancellation handle for a live subscription. `cancel` is idempotent;
/// dropping the handle does NOT cancel.
pub struct SubscriptionHandle {
    inner: Arc<QueryManagerInner>,
    id: u64,
}

impl SubscriptionHandle {
    pub fn cancel(&self) {
        self.inner.remove_subscription(self.id);
    }

    pub fn is_cancelled(&self) -> bool {
        !self.inner.subscriptions.contains_key(&self.id)
    }
}
