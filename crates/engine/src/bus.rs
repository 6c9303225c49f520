//! Topic publish/subscribe with wildcard patterns
//!
//! Patterns are dot-separated segments; a literal segment matches exactly
//! (case-sensitive) and `*` matches exactly one segment. There is no
//! recursive wildcard. Publishing is synchronous fire-and-forget: handlers
//! run on the publisher's turn, a panicking handler is caught and logged,
//! and invocation order among subscribers is unspecified.

use crate::event::StoreEvent;
use basalt_core::{StoreError, StoreResult};
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Subscriber callback: receives the event and the concrete topic.
pub type EventHandler = Arc<dyn Fn(&Arc<StoreEvent>, &str) + Send + Sync>;

/// A parsed subscription pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TopicPattern {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Wildcard,
}

impl TopicPattern {
    /// Parse a pattern; every segment must be non-empty.
    pub(crate) fn parse(pattern: &str) -> StoreResult<Self> {
        if pattern.is_empty() {
            return Err(StoreError::invalid_topic(pattern));
        }
        let mut segments = Vec::new();
        for part in pattern.split('.') {
            if part.is_empty() {
                return Err(StoreError::invalid_topic(pattern));
            }
            segments.push(if part == "*" {
                Segment::Wildcard
            } else {
                Segment::Literal(part.to_string())
            });
        }
        Ok(Self { segments })
    }

    pub(crate) fn matches(&self, topic: &str) -> bool {
        let mut parts = topic.split('.');
        for segment in &self.segments {
            match (parts.next(), segment) {
                (Some(part), Segment::Literal(lit)) if part == lit => {}
                (Some(part), Segment::Wildcard) if !part.is_empty() => {}
                _ => return false,
            }
        }
        parts.next().is_none()
    }
}

struct Subscriber {
    id: u64,
    pattern: TopicPattern,
    handler: EventHandler,
}

struct BusInner {
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
}

/// The store's event bus. Cheap to clone; clones share subscribers.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a handler for every topic the pattern matches.
    pub fn subscribe(
        &self,
        pattern: &str,
        handler: impl Fn(&Arc<StoreEvent>, &str) + Send + Sync + 'static,
    ) -> StoreResult<BusSubscription> {
        self.subscribe_handler(pattern, Arc::new(handler))
    }

    pub fn subscribe_handler(
        &self,
        pattern: &str,
        handler: EventHandler,
    ) -> StoreResult<BusSubscription> {
        let pattern = TopicPattern::parse(pattern)?;
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.write().push(Subscriber {
            id,
            pattern,
            handler,
        });
        Ok(BusSubscription {
            bus: self.clone(),
            id,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Deliver an event to every matching handler, synchronously.
    ///
    /// The publisher never observes handler failures: panics are caught and
    /// logged, and remaining handlers still run.
    pub fn publish(&self, event: Arc<StoreEvent>) {
        let topic = event.topic();
        let handlers: Vec<EventHandler> = {
            let subscribers = self.inner.subscribers.read();
            subscribers
                .iter()
                .filter(|s| s.pattern.matches(&topic))
                .map(|s| Arc::clone(&s.handler))
                .collect()
        };
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&event, &topic))).is_err() {
                warn!(topic, "event handler panicked; continuing");
            }
        }
    }

    pub(crate) fn unsubscribe(&self, id: u64) {
        self.inner.subscribers.write().retain(|s| s.id != id);
    }

    /// Drop every subscriber (store shutdown).
    pub fn clear(&self) {
        self.inner.subscribers.write().clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }
}

/// Cancellation handle for a bus subscription. `cancel` is idempotent.
pub struct BusSubscription {
    bus: EventBus,
    id: u64,
    cancelled: Arc<AtomicBool>,
}

impl BusSubscription {
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.bus.unsubscribe(self.id);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_core::{Key, Record};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn event(bucket: &str) -> Arc<StoreEvent> {
        let record = match json!({"id": "k"}) {
            serde_json::Value::Object(map) => Record::new(map),
            _ => unreachable!(),
        };
        Arc::new(StoreEvent::Inserted {
            bucket: bucket.to_string(),
            key: Key::from("k"),
            record,
        })
    }

    #[test]
    fn pattern_matching() {
        let p = TopicPattern::parse("bucket.users.inserted").unwrap();
        assert!(p.matches("bucket.users.inserted"));
        assert!(!p.matches("bucket.users.deleted"));
        assert!(!p.matches("bucket.users"));
        assert!(!p.matches("bucket.users.inserted.extra"));

        let wild = TopicPattern::parse("bucket.*.inserted").unwrap();
        assert!(wild.matches("bucket.users.inserted"));
        assert!(wild.matches("bucket.orders.inserted"));
        assert!(!wild.matches("bucket.orders.updated"));

        let all = TopicPattern::parse("bucket.*.*").unwrap();
        assert!(all.matches("bucket.users.deleted"));
        assert!(!all.matches("other.users.deleted"));
    }

    #[test]
    fn wildcard_matches_exactly_one_segment() {
        let p = TopicPattern::parse("bucket.*").unwrap();
        assert!(p.matches("bucket.users"));
        assert!(!p.matches("bucket.users.inserted"));
        assert!(!p.matches("bucket"));
    }

    #[test]
    fn patterns_are_case_sensitive() {
        let p = TopicPattern::parse("bucket.Users.inserted").unwrap();
        assert!(!p.matches("bucket.users.inserted"));
    }

    #[test]
    fn empty_segments_rejected() {
        assert!(TopicPattern::parse("").is_err());
        assert!(TopicPattern::parse("bucket..inserted").is_err());
        assert!(TopicPattern::parse(".users").is_err());
        assert!(TopicPattern::parse("users.").is_err());
    }

    #[test]
    fn publish_reaches_matching_subscribers() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h1 = Arc::clone(&hits);
        let _s1 = bus
            .subscribe("bucket.*.*", move |_, _| {
                h1.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        let h2 = Arc::clone(&hits);
        let _s2 = bus
            .subscribe("bucket.orders.inserted", move |_, _| {
                h2.fetch_add(10, Ordering::SeqCst);
            })
            .unwrap();

        bus.publish(event("users"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        bus.publish(event("orders"));
        assert_eq!(hits.load(Ordering::SeqCst), 12);
    }

    #[test]
    fn handler_receives_topic() {
        let bus = EventBus::new();
        let seen = Arc::new(parking_lot::Mutex::new(String::new()));
        let s = Arc::clone(&seen);
        let _sub = bus
            .subscribe("bucket.*.inserted", move |_, topic| {
                *s.lock() = topic.to_string();
            })
            .unwrap();
        bus.publish(event("users"));
        assert_eq!(*seen.lock(), "bucket.users.inserted");
    }

    #[test]
    fn panicking_handler_does_not_disturb_others() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let _bad = bus
            .subscribe("bucket.*.*", |_, _| panic!("boom"))
            .unwrap();
        let h = Arc::clone(&hits);
        let _good = bus
            .subscribe("bucket.*.*", move |_, _| {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        bus.publish(event("users"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancel_is_idempotent() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let sub = bus
            .subscribe("bucket.*.*", move |_, _| {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        bus.publish(event("users"));
        sub.cancel();
        sub.cancel();
        bus.publish(event("users"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
