//! The store facade
//!
//! Owns the registries and wires the subsystems together: bucket actors,
//! the event bus, the reactive query manager, the TTL scan loop, and the
//! persistence coordinator. Shutdown runs in dependency order: TTL stops
//! first, queries are destroyed, persistence flushes and closes, then the
//! bucket actors terminate and the bus clears.

use crate::bucket::BucketHandle;
use crate::bus::{BusSubscription, EventBus};
use crate::event::StoreEvent;
use crate::persistence::{ErrorHook, PersistenceCoordinator};
use crate::query::{QueryContext, QueryManager, SubscriptionHandle};
use crate::registry::{BucketRegistry, SharedRegistry};
use crate::transaction::TransactionContext;
use crate::ttl::TtlManager;
use basalt_core::schema::BucketDefinition;
use basalt_core::{SchemaValidator, StoreError, StoreResult};
use basalt_durability::PersistenceAdapter;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

static STORE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);
const DEFAULT_TTL_CHECK_INTERVAL: Duration = Duration::from_millis(1000);

/// Builder for [`Store`], mirroring its option set: a name (auto-named
/// `store-N` when omitted), optional persistence (adapter + debounce +
/// error hook), and the TTL check interval (zero disables scans).
pub struct StoreBuilder {
    name: Option<String>,
    adapter: Option<Arc<dyn PersistenceAdapter>>,
    debounce: Duration,
    on_error: Option<ErrorHook>,
    ttl_check_interval: Duration,
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self {
            name: None,
            adapter: None,
            debounce: DEFAULT_DEBOUNCE,
            on_error: None,
            ttl_check_interval: DEFAULT_TTL_CHECK_INTERVAL,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Enable snapshot persistence through the given adapter.
    pub fn persistence(mut self, adapter: Arc<dyn PersistenceAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Delay between a mutation and its snapshot save (default 100 ms).
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Hook receiving isolated persistence failures.
    pub fn persistence_error_hook(
        mut self,
        hook: impl Fn(&StoreError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Cadence of automatic TTL purges (default 1 s; zero disables).
    pub fn ttl_check_interval(mut self, interval: Duration) -> Self {
        self.ttl_check_interval = interval;
        self
    }

    /// Assemble and start the store.
    pub fn open(self) -> StoreResult<Store> {
        let name = self
            .name
            .unwrap_or_else(|| format!("store-{}", STORE_SEQUENCE.fetch_add(1, Ordering::Relaxed)));
        let registry: SharedRegistry = Arc::new(RwLock::new(BucketRegistry::new()));
        let bus = EventBus::new();
        let queries = QueryManager::new(Arc::clone(&registry));
        let ttl = TtlManager::new(self.ttl_check_interval);

        let persistence = match self.adapter {
            Some(adapter) => {
                let coordinator =
                    PersistenceCoordinator::new(adapter, &name, self.debounce, self.on_error);
                coordinator.attach(&bus)?;
                Some(coordinator)
            }
            None => None,
        };

        let query_feed = queries.clone();
        let query_subscription = bus.subscribe("bucket.*.*", move |event, _topic| {
            query_feed.on_bucket_change(event.bucket(), std::slice::from_ref(event.key()));
        })?;

        info!(store = %name, "store opened");

        Ok(Store {
            inner: Arc::new(StoreInner {
                name,
                registry,
                bus,
                queries,
                ttl,
                persistence,
                query_subscription: Mutex::new(Some(query_subscription)),
                stopped: AtomicBool::new(false),
            }),
        })
    }
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct StoreInner {
    name: String,
    registry: SharedRegistry,
    bus: EventBus,
    queries: QueryManager,
    ttl: TtlManager,
    persistence: Option<PersistenceCoordinator>,
    query_subscription: Mutex<Option<BusSubscription>>,
    stopped: AtomicBool,
}

/// An open basalt store. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    /// Open a store with defaults: auto-name, no persistence, 1 s TTL scan.
    pub fn open() -> StoreResult<Store> {
        StoreBuilder::new().open()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub(crate) fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    // =========================================================================
    // Buckets
    // =========================================================================

    /// Register a bucket. When the store has persistence and the bucket is
    /// persistent, its snapshot (if any) is restored silently first.
    pub async fn define_bucket(
        &self,
        name: &str,
        definition: BucketDefinition,
    ) -> StoreResult<BucketHandle> {
        self.guard_open()?;
        validate_definition(name, &definition)?;
        let validator = Arc::new(SchemaValidator::new(name, &definition)?);
        let definition = Arc::new(definition);

        if self.inner.registry.read().contains(name) {
            return Err(StoreError::bucket_already_exists(name));
        }

        let initial = match (&self.inner.persistence, definition.persistent) {
            (Some(coordinator), true) => coordinator.load_bucket(name).await,
            _ => None,
        };

        let handle = {
            let mut registry = self.inner.registry.write();
            if registry.contains(name) {
                return Err(StoreError::bucket_already_exists(name));
            }
            let handle = crate::bucket::spawn_bucket(
                name,
                Arc::clone(&definition),
                Arc::clone(&validator),
                self.inner.bus.clone(),
                initial,
            );
            registry.insert(name, handle.clone(), definition.clone(), validator);
            handle
        };

        if definition.persistent {
            if let Some(coordinator) = &self.inner.persistence {
                coordinator.register_bucket(name, handle.clone());
            }
        }
        if definition.ttl_ms.is_some() {
            self.inner.ttl.register_bucket(name, handle.clone());
            // Idempotent; the scan loop runs once any TTL bucket exists.
            self.inner.ttl.start();
        }
        info!(store = %self.inner.name, bucket = name, "bucket defined");
        Ok(handle)
    }

    /// Remove a bucket and terminate its actor. Its persisted snapshot is
    /// left untouched.
    pub async fn drop_bucket(&self, name: &str) -> StoreResult<()> {
        self.guard_open()?;
        let entry = self
            .inner
            .registry
            .write()
            .remove(name)
            .ok_or_else(|| StoreError::bucket_not_defined(name))?;
        self.inner.ttl.unregister_bucket(name);
        if let Some(coordinator) = &self.inner.persistence {
            coordinator.unregister_bucket(name);
        }
        let _ = entry.handle.stop().await;
        info!(store = %self.inner.name, bucket = name, "bucket dropped");
        Ok(())
    }

    /// Handle to a registered bucket.
    pub fn bucket(&self, name: &str) -> StoreResult<BucketHandle> {
        self.inner
            .registry
            .read()
            .get(name)
            .map(|entry| entry.handle)
            .ok_or_else(|| StoreError::bucket_not_defined(name))
    }

    pub fn bucket_names(&self) -> Vec<String> {
        self.inner.registry.read().names()
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Start a transaction under manual control. Call
    /// [`TransactionContext::commit`] yourself.
    pub fn begin_transaction(&self) -> TransactionContext {
        TransactionContext::new(Arc::clone(&self.inner.registry), self.inner.bus.clone())
    }

    /// Run `f` inside a transaction and commit afterwards. An error from
    /// `f` abandons the buffer: nothing persists, nothing is emitted.
    pub async fn transaction<F, Fut, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(TransactionContext) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        self.guard_open()?;
        let tx = self.begin_transaction();
        let value = f(tx.clone()).await?;
        if !tx.is_committed() {
            tx.commit().await?;
        }
        Ok(value)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Register a named reactive query.
    pub fn define_query<F, Fut>(&self, name: &str, query: F) -> StoreResult<()>
    where
        F: Fn(QueryContext, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StoreResult<Value>> + Send + 'static,
    {
        self.inner.queries.define_query(name, query)
    }

    /// Execute a named query once, without subscribing.
    pub async fn run_query(&self, name: &str, params: Option<Value>) -> StoreResult<Value> {
        self.inner.queries.run_query(name, params).await
    }

    /// Subscribe to a query; the callback fires on every changed result.
    pub async fn subscribe(
        &self,
        name: &str,
        params: Option<Value>,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> StoreResult<SubscriptionHandle> {
        self.inner.queries.subscribe(name, params, callback).await
    }

    /// Wait until no query re-evaluations are in flight.
    pub async fn settle(&self) {
        self.inner.queries.wait_for_pending().await;
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Subscribe to store events by topic pattern
    /// (`bucket.<name>.<inserted|updated|deleted>`, `*` per segment).
    pub fn on(
        &self,
        pattern: &str,
        handler: impl Fn(&StoreEvent, &str) + Send + Sync + 'static,
    ) -> StoreResult<BusSubscription> {
        self.inner
            .bus
            .subscribe(pattern, move |event, topic| handler(event.as_ref(), topic))
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Run one TTL purge pass immediately; returns removed record count.
    pub async fn purge_expired(&self) -> usize {
        self.inner.ttl.purge().await
    }

    /// Persist every dirty bucket now, bypassing the debounce.
    pub async fn flush(&self) -> StoreResult<()> {
        if let Some(coordinator) = &self.inner.persistence {
            coordinator.flush().await;
        }
        Ok(())
    }

    /// A point-in-time statistics snapshot.
    pub async fn stats(&self) -> StoreResult<StoreStats> {
        let entries = self.inner.registry.read().entries();
        let mut per_bucket_records = HashMap::new();
        let mut per_bucket_indexes = HashMap::new();
        let mut names = Vec::new();
        let mut total_records = 0;
        let mut total_indexes = 0;

        for (name, entry) in entries {
            let records = entry.handle.count(None).await.unwrap_or(0);
            let indexes = entry.definition.indexed_fields().len();
            total_records += records;
            total_indexes += indexes;
            per_bucket_records.insert(name.clone(), records);
            per_bucket_indexes.insert(name.clone(), indexes);
            names.push(name);
        }

        Ok(StoreStats {
            name: self.inner.name.clone(),
            buckets: BucketStats {
                count: names.len(),
                names,
            },
            records: RecordStats {
                total: total_records,
                per_bucket: per_bucket_records,
            },
            indexes: IndexStats {
                total: total_indexes,
                per_bucket: per_bucket_indexes,
            },
            queries: QueryStats {
                defined: self.inner.queries.defined_count(),
                active_subscriptions: self.inner.queries.active_subscriptions(),
            },
            persistence: PersistenceStats {
                enabled: self.inner.persistence.is_some(),
            },
            ttl: TtlStats {
                enabled: self.inner.ttl.is_enabled(),
                check_interval_ms: self.inner.ttl.interval().as_millis() as u64,
            },
        })
    }

    /// Stop the store: TTL scans, then queries, then persistence (with a
    /// final flush of every bucket), then the bucket actors, then the bus.
    ///
    /// Idempotent. An adapter `close` failure propagates after the rest of
    /// the shutdown completes.
    pub async fn stop(&self) -> StoreResult<()> {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.ttl.stop();
        self.inner.queries.destroy();

        let mut close_result = Ok(());
        if let Some(coordinator) = &self.inner.persistence {
            close_result = coordinator.stop().await;
        }

        let entries = {
            let mut registry = self.inner.registry.write();
            let entries = registry.entries();
            for (name, _) in &entries {
                registry.remove(name);
            }
            entries
        };
        for (_, entry) in entries {
            let _ = entry.handle.stop().await;
        }

        if let Some(subscription) = self.inner.query_subscription.lock().take() {
            subscription.cancel();
        }
        self.inner.bus.clear();
        info!(store = %self.inner.name, "store stopped");
        close_result
    }

    fn guard_open(&self) -> StoreResult<()> {
        if self.inner.stopped.load(Ordering::SeqCst) {
            Err(StoreError::StoreClosed)
        } else {
            Ok(())
        }
    }
}

fn validate_definition(name: &str, definition: &BucketDefinition) -> StoreResult<()> {
    if name.is_empty() {
        return Err(StoreError::invalid_definition(name, "bucket name is empty"));
    }
    if definition.key_field.is_empty() {
        return Err(StoreError::invalid_definition(
            name,
            "primary-key field name is empty",
        ));
    }
    if let Some(ttl) = definition.ttl_ms {
        if ttl <= 0 {
            return Err(StoreError::invalid_definition(
                name,
                "ttl must be a positive number of milliseconds",
            ));
        }
    }
    if definition.max_size == Some(0) {
        return Err(StoreError::invalid_definition(
            name,
            "maxSize must be positive",
        ));
    }
    Ok(())
}

// =============================================================================
// Statistics
// =============================================================================

/// Point-in-time operational counters for a store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub name: String,
    pub buckets: BucketStats,
    pub records: RecordStats,
    pub indexes: IndexStats,
    pub queries: QueryStats,
    pub persistence: PersistenceStats,
    pub ttl: TtlStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketStats {
    pub count: usize,
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordStats {
    pub total: usize,
    pub per_bucket: HashMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub total: usize,
    pub per_bucket: HashMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStats {
    pub defined: usize,
    pub active_subscriptions: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceStats {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TtlStats {
    pub enabled: bool,
    pub check_interval_ms: u64,
}
