//! Periodic TTL purge scheduler
//!
//! Asks every TTL-enabled bucket to purge expired records on a fixed
//! cadence. Scheduling chains single-shot sleeps: the next tick is not
//! armed until the previous scan finishes, so a slow scan never overlaps
//! the next one.

use crate::bucket::BucketHandle;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

struct TtlState {
    buckets: HashMap<String, BucketHandle>,
    runner: Option<JoinHandle<()>>,
}

struct TtlInner {
    interval: Duration,
    state: Mutex<TtlState>,
}

/// Store-wide TTL scan loop.
#[derive(Clone)]
pub(crate) struct TtlManager {
    inner: Arc<TtlInner>,
}

impl TtlManager {
    /// `interval` of zero disables automatic scans; `purge` stays callable.
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            inner: Arc::new(TtlInner {
                interval,
                state: Mutex::new(TtlState {
                    buckets: HashMap::new(),
                    runner: None,
                }),
            }),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        !self.inner.interval.is_zero()
    }

    pub(crate) fn interval(&self) -> Duration {
        self.inner.interval
    }

    pub(crate) fn register_bucket(&self, name: &str, handle: BucketHandle) {
        self.inner
            .state
            .lock()
            .buckets
            .insert(name.to_string(), handle);
    }

    pub(crate) fn unregister_bucket(&self, name: &str) {
        self.inner.state.lock().buckets.remove(name);
    }

    /// Start the scan loop. Idempotent; a no-op when the interval is zero.
    pub(crate) fn start(&self) {
        if self.inner.interval.is_zero() {
            return;
        }
        let mut state = self.inner.state.lock();
        let running = state
            .runner
            .as_ref()
            .map(|r| !r.is_finished())
            .unwrap_or(false);
        if running {
            return;
        }
        let inner = Arc::clone(&self.inner);
        state.runner = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(inner.interval).await;
                let purged = TtlManager {
                    inner: Arc::clone(&inner),
                }
                .purge()
                .await;
                if purged > 0 {
                    debug!(purged, "ttl scan removed expired records");
                }
            }
        }));
    }

    /// Stop the scan loop. Idempotent; the manager can be restarted.
    pub(crate) fn stop(&self) {
        if let Some(runner) = self.inner.state.lock().runner.take() {
            runner.abort();
        }
    }

    /// One purge pass over every registered bucket; returns the total
    /// number of records removed. Dead buckets are skipped silently.
    pub(crate) async fn purge(&self) -> usize {
        let handles: Vec<BucketHandle> = self.inner.state.lock().buckets.values().cloned().collect();
        let mut total = 0;
        for handle in handles {
            if let Ok(count) = handle.purge_expired().await {
                total += count;
            }
        }
        total
    }
}
