//! Thread-safe publish/subscribe event bus.
//!
//! Producers on any number of threads call [`EventBus::publish`]. Each publish:
//!
//! 1. appends to a bounded history (oldest evicted past capacity),
//! 2. records the payload as the latest value for its event type,
//! 3. synchronously invokes subscribers on the event's channel and on `"all"`,
//! 4. queues the event for the scheduler if its priority is `HIGH` or above.
//!
//! History, the urgent queue, the snapshot table, and the subscriber table each
//! have their own lock so unrelated producers do not serialize on one mutex.
//! Subscriber panics are caught and logged; delivery to the remaining
//! subscribers continues.

pub mod event;

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

pub use event::{Event, EventId, EventPayload, Priority};

/// Channel name whose subscribers receive every event.
pub const WILDCARD_CHANNEL: &str = "all";

/// Default number of events retained in history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Bus sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub history_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    callback: Callback,
}

/// Heap entry: higher priority first, then earlier arrival.
struct Queued(Arc<Event>);

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .priority
            .cmp(&other.0.priority)
            .then_with(|| other.0.id.cmp(&self.0.id))
    }
}

/// The in-process event bus.
pub struct EventBus {
    history: Mutex<VecDeque<Arc<Event>>>,
    history_capacity: usize,
    urgent: Mutex<BinaryHeap<Queued>>,
    snapshot: DashMap<String, Arc<Event>>,
    subscribers: RwLock<HashMap<String, Vec<Subscriber>>>,
    next_event_id: AtomicU64,
    next_subscription_id: AtomicU64,
}

impl EventBus {
    /// Create a bus with the default history capacity.
    pub fn new() -> Self {
        Self::with_config(&BusConfig::default())
    }

    pub fn with_config(config: &BusConfig) -> Self {
        let capacity = config.history_capacity.max(1);
        Self {
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            history_capacity: capacity,
            urgent: Mutex::new(BinaryHeap::new()),
            snapshot: DashMap::new(),
            subscribers: RwLock::new(HashMap::new()),
            next_event_id: AtomicU64::new(1),
            next_subscription_id: AtomicU64::new(1),
        }
    }

    /// Publish a typed event. Never blocks on anything but the short internal locks.
    pub fn publish(
        &self,
        channel: impl Into<String>,
        payload: EventPayload,
        priority: Priority,
    ) -> Arc<Event> {
        let event = Arc::new(Event {
            id: self.next_event_id.fetch_add(1, AtomicOrdering::Relaxed),
            channel: channel.into(),
            payload,
            priority,
            timestamp: Utc::now(),
            consumed: false,
        });

        {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            history.push_back(Arc::clone(&event));
            while history.len() > self.history_capacity {
                history.pop_front();
            }
        }

        self.snapshot
            .insert(event.event_type().to_string(), Arc::clone(&event));

        self.dispatch(&event);

        if priority.is_urgent() {
            self.urgent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Queued(Arc::clone(&event)));
        }

        tracing::debug!(
            id = event.id,
            channel = %event.channel,
            event_type = event.event_type(),
            priority = %priority,
            "bus: published"
        );
        event
    }

    /// Publish an untyped `(type, map)` pair, parsing it into a typed payload.
    pub fn publish_raw(
        &self,
        channel: impl Into<String>,
        event_type: &str,
        payload: serde_json::Value,
        priority: Priority,
    ) -> Arc<Event> {
        self.publish(channel, EventPayload::parse(event_type, payload), priority)
    }

    /// Register a callback for `channel` (or [`WILDCARD_CHANNEL`]).
    ///
    /// Callbacks run on the publisher's thread and must not block.
    pub fn subscribe<F>(&self, channel: impl Into<String>, callback: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = SubscriptionId(
            self.next_subscription_id
                .fetch_add(1, AtomicOrdering::Relaxed),
        );
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel.into())
            .or_default()
            .push(Subscriber {
                id,
                callback: Arc::new(callback),
            });
        id
    }

    /// Remove a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut removed = false;
        for list in subscribers.values_mut() {
            let before = list.len();
            list.retain(|s| s.id != id);
            removed |= list.len() != before;
        }
        subscribers.retain(|_, list| !list.is_empty());
        removed
    }

    /// Atomically remove and return every queued urgent event, highest
    /// priority first and arrival order within a priority.
    pub fn drain_high_priority(&self) -> Vec<Event> {
        let heap = std::mem::take(
            &mut *self.urgent.lock().unwrap_or_else(PoisonError::into_inner),
        );
        heap.into_sorted_vec()
            .into_iter()
            .rev()
            .map(|Queued(event)| Event {
                consumed: true,
                ..(*event).clone()
            })
            .collect()
    }

    /// Number of urgent events waiting to be drained.
    pub fn pending_high_priority(&self) -> usize {
        self.urgent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// The most recent `limit` events, oldest first.
    pub fn recent_history(&self, limit: usize) -> Vec<Arc<Event>> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Last payload published for `event_type`.
    pub fn latest(&self, event_type: &str) -> Option<EventPayload> {
        self.snapshot
            .get(event_type)
            .map(|entry| entry.payload.clone())
    }

    /// Time of the most recent publish of any type.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.snapshot.iter().map(|entry| entry.timestamp).max()
    }

    fn dispatch(&self, event: &Event) {
        // Clone the callback list so callbacks may (un)subscribe without deadlocking.
        let targets: Vec<(SubscriptionId, Callback)> = {
            let subscribers = self
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            let mut targets = Vec::new();
            for channel in [event.channel.as_str(), WILDCARD_CHANNEL] {
                if let Some(list) = subscribers.get(channel) {
                    targets.extend(list.iter().map(|s| (s.id, Arc::clone(&s.callback))));
                }
                if event.channel == WILDCARD_CHANNEL {
                    break;
                }
            }
            targets
        };

        for (id, callback) in targets {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::warn!(
                    subscription = id.0,
                    channel = %event.channel,
                    event_type = event.event_type(),
                    "bus: subscriber panicked, continuing delivery"
                );
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("history_len", &self.history_len())
            .field("pending_high_priority", &self.pending_high_priority())
            .field("snapshot_types", &self.snapshot.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn text(s: &str) -> EventPayload {
        EventPayload::TextCopied { text: s.into() }
    }

    #[test]
    fn drain_preserves_arrival_order_within_priority() {
        let bus = EventBus::new();
        let a = bus.publish("test", text("A"), Priority::High);
        let b = bus.publish("test", text("B"), Priority::High);
        let c = bus.publish("test", text("C"), Priority::High);

        let drained: Vec<EventId> = bus.drain_high_priority().iter().map(|e| e.id).collect();
        assert_eq!(drained, vec![a.id, b.id, c.id]);
        assert!(bus.drain_high_priority().is_empty());
    }

    #[test]
    fn drain_orders_by_descending_priority() {
        let bus = EventBus::new();
        let high = bus.publish("system", text("high"), Priority::High);
        let critical = bus.publish("system", text("critical"), Priority::Critical);
        bus.publish("system", text("normal"), Priority::Normal);
        let high2 = bus.publish("system", text("high2"), Priority::High);

        let drained = bus.drain_high_priority();
        let ids: Vec<EventId> = drained.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![critical.id, high.id, high2.id]);
        assert!(drained.iter().all(|e| e.consumed));
    }

    #[test]
    fn low_priority_is_not_queued() {
        let bus = EventBus::new();
        bus.publish("input", EventPayload::UserActive, Priority::Normal);
        bus.publish("input", EventPayload::UserIdle { seconds: 60 }, Priority::Low);
        assert_eq!(bus.pending_high_priority(), 0);
        assert_eq!(bus.history_len(), 2);
    }

    #[test]
    fn history_is_bounded_to_most_recent() {
        let bus = EventBus::new();
        let mut last = 0;
        for i in 0..1500 {
            last = bus
                .publish("test", text(&i.to_string()), Priority::Low)
                .id;
        }
        assert_eq!(bus.history_len(), DEFAULT_HISTORY_CAPACITY);

        let all = bus.recent_history(usize::MAX);
        assert_eq!(all.len(), 1000);
        assert_eq!(all.first().unwrap().id, last - 999);
        assert_eq!(all.last().unwrap().id, last);
    }

    #[test]
    fn recent_history_returns_tail() {
        let bus = EventBus::new();
        for i in 0..5 {
            bus.publish("test", text(&i.to_string()), Priority::Low);
        }
        let tail = bus.recent_history(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[1].payload, text("4"));
    }

    #[test]
    fn snapshot_tracks_latest_per_type() {
        let bus = EventBus::new();
        assert!(bus.latest("BATTERY_LOW").is_none());
        bus.publish("system", EventPayload::BatteryLow { percent: 19.0 }, Priority::Critical);
        bus.publish("system", EventPayload::BatteryLow { percent: 15.0 }, Priority::Critical);
        assert_eq!(
            bus.latest("BATTERY_LOW"),
            Some(EventPayload::BatteryLow { percent: 15.0 })
        );
        assert!(bus.last_updated().is_some());
    }

    #[test]
    fn subscribers_on_channel_and_wildcard_receive() {
        let bus = EventBus::new();
        let on_channel = Arc::new(AtomicUsize::new(0));
        let on_all = Arc::new(AtomicUsize::new(0));
        let on_other = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&on_channel);
        bus.subscribe("vision", move |_| {
            c.fetch_add(1, AtomicOrdering::SeqCst);
        });
        let c = Arc::clone(&on_all);
        bus.subscribe(WILDCARD_CHANNEL, move |_| {
            c.fetch_add(1, AtomicOrdering::SeqCst);
        });
        let c = Arc::clone(&on_other);
        bus.subscribe("audio", move |_| {
            c.fetch_add(1, AtomicOrdering::SeqCst);
        });

        bus.publish("vision", EventPayload::UserSeen { faces: 1 }, Priority::Normal);

        assert_eq!(on_channel.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(on_all.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(on_other.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn panicking_subscriber_does_not_stop_delivery() {
        let bus = EventBus::new();
        let delivered = Arc::new(AtomicUsize::new(0));

        bus.subscribe("system", |_| panic!("bad subscriber"));
        let c = Arc::clone(&delivered);
        bus.subscribe("system", move |_| {
            c.fetch_add(1, AtomicOrdering::SeqCst);
        });

        bus.publish("system", EventPayload::CpuHigh { percent: 95.0 }, Priority::High);
        assert_eq!(delivered.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(bus.pending_high_priority(), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let id = bus.subscribe("clipboard", move |_| {
            c.fetch_add(1, AtomicOrdering::SeqCst);
        });

        bus.publish("clipboard", text("one"), Priority::Normal);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish("clipboard", text("two"), Priority::Normal);

        assert_eq!(count.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn concurrent_publish_loses_nothing() {
        let bus = Arc::new(EventBus::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let bus = Arc::clone(&bus);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        bus.publish(
                            format!("producer-{t}"),
                            text(&i.to_string()),
                            Priority::High,
                        );
                    }
                })
            })
            .collect();

        let mut drained = Vec::new();
        for h in handles {
            drained.extend(bus.drain_high_priority());
            h.join().unwrap();
        }
        drained.extend(bus.drain_high_priority());

        let mut ids: Vec<EventId> = drained.iter().map(|e| e.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 400);
        assert_eq!(drained.len(), 400);
    }
}
