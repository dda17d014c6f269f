//! Append-only log of dispatched events for observability and UI display.

use crate::event::{EventCategory, SessionEvent};
use crate::model::LogEntry;
use crate::router::{EventRouter, Subscription};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Default number of retained entries.
const DEFAULT_CAPACITY: usize = 1000;

/// Ordered, append-only sink of human-readable event summaries.
///
/// Subscribes to every category and records one entry per dispatched event.
/// Capacity is bounded: once full, the oldest entries fall off the front, so
/// the retained suffix always preserves arrival order.
pub struct DebugSink {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl DebugSink {
    /// Attaches a sink with the default capacity.
    pub fn attach(router: &EventRouter) -> Arc<Self> {
        Self::attach_with_capacity(router, DEFAULT_CAPACITY)
    }

    /// Attaches a sink retaining at most `capacity` entries.
    pub fn attach_with_capacity(router: &EventRouter, capacity: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        let sink = Arc::new(Self {
            entries: Mutex::new(VecDeque::new()),
            capacity,
            subscriptions: Mutex::new(Vec::new()),
        });
        let mut subscriptions = Vec::with_capacity(EventCategory::ALL.len());
        for category in EventCategory::ALL {
            let observer = Arc::clone(&sink);
            subscriptions.push(router.subscribe(category, move |event| {
                observer.record(event);
                Ok(())
            }));
        }
        *sink.subscriptions.lock().unwrap() = subscriptions;
        sink
    }

    /// Deregisters the sink from the router it was attached to.
    pub fn detach(&self, router: &EventRouter) {
        for subscription in self.subscriptions.lock().unwrap().drain(..) {
            router.unsubscribe(subscription);
        }
    }

    fn record(&self, event: &SessionEvent) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            message: event.summary(),
            category: event.category(),
        };
        let mut entries = self.entries.lock().unwrap();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Snapshot of the retained entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}
