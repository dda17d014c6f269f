//! Typed publish/subscribe dispatch for session events.

use crate::event::{EventCategory, SessionEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::warn;

/// A registered subscriber callback.
///
/// Callbacks run synchronously on the dispatching task and must not block;
/// long work belongs behind a channel subscription.
pub type Subscriber = Arc<dyn Fn(&SessionEvent) -> anyhow::Result<()> + Send + Sync>;

/// Handle identifying one registration, used to deregister it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

struct Entry {
    id: u64,
    callback: Subscriber,
}

/// Dispatches transport-origin events to per-category subscriber lists.
///
/// Dispatch order equals arrival order and delivery is at-most-once per
/// subscriber, with no buffering or replay: a subscriber registered after an
/// event was emitted never sees it. A failing subscriber is logged and never
/// prevents delivery to the remaining subscribers of the same event.
pub struct EventRouter {
    subscribers: Mutex<HashMap<EventCategory, Vec<Entry>>>,
    next_id: AtomicU64,
}

impl EventRouter {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a callback for one event category.
    pub fn subscribe<F>(&self, category: EventCategory, callback: F) -> Subscription
    where
        F: Fn(&SessionEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap()
            .entry(category)
            .or_default()
            .push(Entry {
                id,
                callback: Arc::new(callback),
            });
        Subscription(id)
    }

    /// Removes a registration. Unknown handles are ignored.
    pub fn unsubscribe(&self, subscription: Subscription) {
        let mut map = self.subscribers.lock().unwrap();
        for entries in map.values_mut() {
            entries.retain(|entry| entry.id != subscription.0);
        }
    }

    /// Bridges one category into an unbounded channel.
    ///
    /// Events dispatched after registration are cloned into the receiver. A
    /// dropped receiver simply stops observing; deregister with the returned
    /// handle to release the sender as well.
    pub fn subscribe_channel(
        &self,
        category: EventCategory,
    ) -> (Subscription, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(category, move |event| {
            let _ = tx.send(event.clone());
            Ok(())
        });
        (subscription, rx)
    }

    /// Number of live registrations for a category.
    pub fn subscriber_count(&self, category: EventCategory) -> usize {
        self.subscribers
            .lock()
            .unwrap()
            .get(&category)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Delivers one event to every subscriber of its category, in
    /// registration order.
    ///
    /// The subscriber list is snapshotted first, so callbacks may register or
    /// deregister subscribers without deadlocking; such changes take effect
    /// from the next event.
    pub(crate) fn dispatch(&self, event: &SessionEvent) {
        let category = event.category();
        let snapshot: Vec<(u64, Subscriber)> = {
            let map = self.subscribers.lock().unwrap();
            map.get(&category)
                .map(|entries| {
                    entries
                        .iter()
                        .map(|entry| (entry.id, Arc::clone(&entry.callback)))
                        .collect()
                })
                .unwrap_or_default()
        };
        for (id, callback) in snapshot {
            if let Err(error) = callback(event) {
                warn!(
                    subscriber = id,
                    category = %category,
                    %error,
                    "subscriber failed; continuing delivery to the rest"
                );
            }
        }
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::model::{SpeakerRole, Transcript};
    use anyhow::anyhow;

    fn transcript_event(text: &str, is_final: bool) -> SessionEvent {
        SessionEvent::UserTranscript(Transcript::now(
            SpeakerRole::User,
            text.to_string(),
            is_final,
        ))
    }

    #[test]
    fn test_delivery_in_arrival_order_exactly_once() {
        let router = EventRouter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        router.subscribe(EventCategory::UserTranscript, move |event| {
            if let SessionEvent::UserTranscript(t) = event {
                sink.lock().unwrap().push(t.text.clone());
            }
            Ok(())
        });

        for text in ["one", "two", "three"] {
            router.dispatch(&transcript_event(text, false));
        }

        assert_eq!(*seen.lock().unwrap(), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_categories_are_independent() {
        let router = EventRouter::new();
        let transcripts = Arc::new(Mutex::new(0usize));
        let errors = Arc::new(Mutex::new(0usize));

        let t = Arc::clone(&transcripts);
        router.subscribe(EventCategory::UserTranscript, move |_| {
            *t.lock().unwrap() += 1;
            Ok(())
        });
        let e = Arc::clone(&errors);
        router.subscribe(EventCategory::Error, move |_| {
            *e.lock().unwrap() += 1;
            Ok(())
        });

        router.dispatch(&transcript_event("hi", true));
        router.dispatch(&SessionEvent::Error(ClientError::Transport(
            "oops".to_string(),
        )));

        assert_eq!(*transcripts.lock().unwrap(), 1);
        assert_eq!(*errors.lock().unwrap(), 1);
    }

    #[test]
    fn test_failing_subscriber_does_not_block_siblings() {
        let router = EventRouter::new();
        let delivered = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&delivered);
        router.subscribe(EventCategory::UserTranscript, move |_| {
            first.lock().unwrap().push("first");
            Err(anyhow!("subscriber exploded"))
        });
        let second = Arc::clone(&delivered);
        router.subscribe(EventCategory::UserTranscript, move |_| {
            second.lock().unwrap().push("second");
            Ok(())
        });

        router.dispatch(&transcript_event("hello", true));

        assert_eq!(*delivered.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_no_replay_for_late_subscribers() {
        let router = EventRouter::new();
        router.dispatch(&transcript_event("early", true));

        let count = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&count);
        router.subscribe(EventCategory::UserTranscript, move |_| {
            *sink.lock().unwrap() += 1;
            Ok(())
        });

        assert_eq!(*count.lock().unwrap(), 0);
        router.dispatch(&transcript_event("late", true));
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let router = EventRouter::new();
        let count = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&count);
        let subscription = router.subscribe(EventCategory::UserTranscript, move |_| {
            *sink.lock().unwrap() += 1;
            Ok(())
        });

        router.dispatch(&transcript_event("a", true));
        router.unsubscribe(subscription);
        router.dispatch(&transcript_event("b", true));

        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(router.subscriber_count(EventCategory::UserTranscript), 0);
    }

    #[test]
    fn test_subscriber_may_unsubscribe_itself_mid_dispatch() {
        let router = Arc::new(EventRouter::new());
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let count = Arc::new(Mutex::new(0usize));

        let router_ref = Arc::clone(&router);
        let slot_ref = Arc::clone(&slot);
        let sink = Arc::clone(&count);
        let subscription = router.subscribe(EventCategory::UserTranscript, move |_| {
            *sink.lock().unwrap() += 1;
            if let Some(own) = slot_ref.lock().unwrap().take() {
                router_ref.unsubscribe(own);
            }
            Ok(())
        });
        *slot.lock().unwrap() = Some(subscription);

        router.dispatch(&transcript_event("a", true));
        router.dispatch(&transcript_event("b", true));

        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_channel_bridge_receives_dispatched_events() {
        let router = EventRouter::new();
        let (subscription, mut rx) = router.subscribe_channel(EventCategory::UserTranscript);

        router.dispatch(&transcript_event("hello world", true));

        let event = rx.try_recv().unwrap();
        assert!(matches!(
            event,
            SessionEvent::UserTranscript(t) if t.text == "hello world" && t.is_final
        ));
        assert!(rx.try_recv().is_err());
        router.unsubscribe(subscription);
    }

    #[test]
    fn test_interim_then_final_yields_one_final_record() {
        let router = EventRouter::new();
        let finals = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&finals);
        router.subscribe(EventCategory::UserTranscript, move |event| {
            if let SessionEvent::UserTranscript(t) = event {
                if t.is_final {
                    sink.lock().unwrap().push(t.clone());
                }
            }
            Ok(())
        });

        router.dispatch(&transcript_event("hello", false));
        router.dispatch(&transcript_event("hello wor", false));
        router.dispatch(&transcript_event("hello world", true));

        let finals = finals.lock().unwrap();
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].text, "hello world");
    }
}
