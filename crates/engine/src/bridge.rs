//! Bridge to an external event receiver
//!
//! Forwards `bucket.*.*` events to a user-supplied `emit` callback, with an
//! optional predicate filter and an optional topic/payload transform. The
//! bridge is fire-and-forget: a panicking receiver is caught and logged and
//! never disturbs the store or other subscribers.

use crate::bus::BusSubscription;
use crate::event::StoreEvent;
use crate::store::Store;
use basalt_core::StoreResult;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

type FilterFn = Arc<dyn Fn(&StoreEvent) -> bool + Send + Sync>;
type TransformFn = Arc<dyn Fn(String, Value) -> (String, Value) + Send + Sync>;
type EmitFn = Arc<dyn Fn(&str, Value) + Send + Sync>;

/// Configurable forwarder from store events to an external receiver.
pub struct EventBridge {
    filter: Option<FilterFn>,
    transform: Option<TransformFn>,
    emit: EmitFn,
}

impl EventBridge {
    /// Bridge every bucket event to `emit(topic, payload)`.
    pub fn new(emit: impl Fn(&str, Value) + Send + Sync + 'static) -> Self {
        Self {
            filter: None,
            transform: None,
            emit: Arc::new(emit),
        }
    }

    /// Only forward events the predicate accepts.
    pub fn with_filter(mut self, filter: impl Fn(&StoreEvent) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Rewrite topic and/or payload before forwarding.
    pub fn with_transform(
        mut self,
        transform: impl Fn(String, Value) -> (String, Value) + Send + Sync + 'static,
    ) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Attach to a store's event flow. Cancel the returned subscription to
    /// detach.
    pub fn attach(self, store: &Store) -> StoreResult<BusSubscription> {
        let EventBridge {
            filter,
            transform,
            emit,
        } = self;
        store.bus().subscribe("bucket.*.*", move |event, topic| {
            if let Some(filter) = &filter {
                if !filter(event.as_ref()) {
                    return;
                }
            }
            let payload = match serde_json::to_value(event.as_ref()) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(topic, "bridge payload serialization failed: {}", e);
                    return;
                }
            };
            let (topic, payload) = match &transform {
                Some(transform) => transform(topic.to_string(), payload),
                None => (topic.to_string(), payload),
            };
            if catch_unwind(AssertUnwindSafe(|| emit(&topic, payload))).is_err() {
                warn!(topic, "bridge receiver panicked; event dropped");
            }
        })
    }
}
