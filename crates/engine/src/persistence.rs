//! Debounced snapshot persistence coordinator
//!
//! Subscribes to `bucket.*.*`, marks the owning bucket dirty on every
//! event, and runs a single debounce timer. When it fires, the dirty set is
//! frozen and each dirty bucket is snapshotted (atomically, via its actor)
//! and saved in parallel. Per-bucket save failures go to the user's error
//! hook and never block other buckets. The loss window on crash equals the
//! debounce interval.
//!
//! Shutdown ordering matters: the coordinator stops BEFORE bucket actors,
//! marking every registered bucket dirty and flushing once, so even
//! buckets that never changed this run get a final write.

use crate::bucket::BucketHandle;
use crate::bus::{BusSubscription, EventBus};
use basalt_core::{StoreError, StoreResult};
use basalt_durability::{storage_key, PersistenceAdapter, SnapshotEnvelope, SnapshotState};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Hook invoked with every isolated persistence failure.
pub type ErrorHook = Arc<dyn Fn(&StoreError) + Send + Sync>;

struct PersistenceState {
    /// Persistent buckets by name
    buckets: HashMap<String, BucketHandle>,
    dirty: HashSet<String>,
    timer: Option<JoinHandle<()>>,
}

struct CoordinatorInner {
    adapter: Arc<dyn PersistenceAdapter>,
    store_name: String,
    debounce: Duration,
    on_error: Option<ErrorHook>,
    state: Mutex<PersistenceState>,
    stopped: AtomicBool,
    subscription: Mutex<Option<BusSubscription>>,
}

/// Wires bucket mutations to the persistence adapter.
#[derive(Clone)]
pub(crate) struct PersistenceCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl PersistenceCoordinator {
    pub(crate) fn new(
        adapter: Arc<dyn PersistenceAdapter>,
        store_name: &str,
        debounce: Duration,
        on_error: Option<ErrorHook>,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                adapter,
                store_name: store_name.to_string(),
                debounce,
                on_error,
                state: Mutex::new(PersistenceState {
                    buckets: HashMap::new(),
                    dirty: HashSet::new(),
                    timer: None,
                }),
                stopped: AtomicBool::new(false),
                subscription: Mutex::new(None),
            }),
        }
    }

    /// Start listening for mutation events.
    pub(crate) fn attach(&self, bus: &EventBus) -> StoreResult<()> {
        let coordinator = self.clone();
        let subscription = bus.subscribe("bucket.*.*", move |event, _topic| {
            coordinator.note_mutation(event.bucket());
        })?;
        *self.inner.subscription.lock() = Some(subscription);
        Ok(())
    }

    /// Load a bucket's snapshot for restore at registration time.
    ///
    /// Adapter failures go to the error hook; the bucket starts empty.
    pub(crate) async fn load_bucket(&self, bucket: &str) -> Option<SnapshotState> {
        let key = storage_key(&self.inner.store_name, bucket);
        match self.inner.adapter.load(&key).await {
            Ok(Some(envelope)) => Some(envelope.state),
            Ok(None) => None,
            Err(e) => {
                self.inner.report(&e);
                None
            }
        }
    }

    /// Track a persistent bucket.
    pub(crate) fn register_bucket(&self, bucket: &str, handle: BucketHandle) {
        self.inner
            .state
            .lock()
            .buckets
            .insert(bucket.to_string(), handle);
    }

    /// Forget a dropped bucket; later events for it are ignored.
    pub(crate) fn unregister_bucket(&self, bucket: &str) {
        let mut state = self.inner.state.lock();
        state.buckets.remove(bucket);
        state.dirty.remove(bucket);
    }

    /// Cancel any pending timer and persist every dirty bucket now.
    pub(crate) async fn flush(&self) -> usize {
        if let Some(timer) = self.inner.state.lock().timer.take() {
            timer.abort();
        }
        self.flush_dirty().await
    }

    /// Final stop: ignore further events, mark every registered bucket
    /// dirty, flush, detach from the bus, and close the adapter.
    ///
    /// Adapter close failures propagate to the caller.
    pub(crate) async fn stop(&self) -> StoreResult<()> {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        {
            let mut state = self.inner.state.lock();
            let names: Vec<String> = state.buckets.keys().cloned().collect();
            state.dirty.extend(names);
        }
        self.flush().await;
        if let Some(subscription) = self.inner.subscription.lock().take() {
            subscription.cancel();
        }
        self.inner.adapter.close().await
    }

    fn note_mutation(&self, bucket: &str) {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return;
        }
        let mut state = self.inner.state.lock();
        if !state.buckets.contains_key(bucket) {
            return;
        }
        state.dirty.insert(bucket.to_string());

        let timer_idle = state
            .timer
            .as_ref()
            .map(|t| t.is_finished())
            .unwrap_or(true);
        if timer_idle {
            let coordinator = self.clone();
            state.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(coordinator.inner.debounce).await;
                coordinator.flush_dirty().await;
            }));
        }
    }

    /// Freeze and clear the dirty set, then snapshot + save every bucket in
    /// parallel. Returns how many buckets were saved successfully.
    async fn flush_dirty(&self) -> usize {
        let batch: Vec<(String, BucketHandle)> = {
            let mut state = self.inner.state.lock();
            state.timer = None;
            let dirty = std::mem::take(&mut state.dirty);
            dirty
                .into_iter()
                .filter_map(|name| {
                    state
                        .buckets
                        .get(&name)
                        .map(|handle| (name, handle.clone()))
                })
                .collect()
        };
        if batch.is_empty() {
            return 0;
        }

        let inner = &self.inner;
        let saves = batch.iter().map(|(name, handle)| async move {
            match inner.save_bucket(name, handle).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(bucket = %name, "snapshot save failed: {}", e);
                    inner.report(&e);
                    false
                }
            }
        });
        let saved = join_all(saves).await.into_iter().filter(|ok| *ok).count();
        debug!(store = %inner.store_name, saved, "persistence flush complete");
        saved
    }
}

impl CoordinatorInner {
    async fn save_bucket(&self, bucket: &str, handle: &BucketHandle) -> StoreResult<()> {
        let state = handle.snapshot().await?;
        let envelope = SnapshotEnvelope::new(state, &self.store_name);
        let key = storage_key(&self.store_name, bucket);
        self.adapter.save(&key, envelope).await
    }

    fn report(&self, error: &StoreError) {
        if let Some(hook) = &self.on_error {
            hook(error);
        }
    }
}
