//! Handler registry for inbound messages and connection-state changes.
//!
//! Handlers are keyed by [`Topic`]; each key holds a set of independent
//! callbacks with no defined firing order. Registration returns a
//! [`Subscription`] that removes exactly that one handler.
//!
//! Dispatch runs handlers synchronously, outside the registry lock, and
//! isolates each call with `catch_unwind` so one panicking subscriber cannot
//! stop delivery to the others.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use jobwire_core::{ServerMessage, Topic};

/// Callback for inbound messages.
pub type MessageHandler = Arc<dyn Fn(&ServerMessage) + Send + Sync>;

/// Callback for connection-state changes (`true` = connected).
pub type ConnectionHandler = Arc<dyn Fn(bool) + Send + Sync>;

type HandlerId = u64;

#[derive(Default)]
struct Slots {
    next_id: HandlerId,
    message: HashMap<Topic, HashMap<HandlerId, MessageHandler>>,
    connection: HashMap<HandlerId, ConnectionHandler>,
}

impl Slots {
    fn allocate(&mut self) -> HandlerId {
        self.next_id += 1;
        self.next_id
    }

    fn remove(&mut self, key: SlotKey) -> bool {
        match key {
            SlotKey::Message(topic, id) => {
                let Some(set) = self.message.get_mut(&topic) else {
                    return false;
                };
                let removed = set.remove(&id).is_some();
                if set.is_empty() {
                    self.message.remove(&topic);
                }
                removed
            }
            SlotKey::Connection(id) => self.connection.remove(&id).is_some(),
        }
    }

    fn contains(&self, key: SlotKey) -> bool {
        match key {
            SlotKey::Message(topic, id) => self
                .message
                .get(&topic)
                .is_some_and(|set| set.contains_key(&id)),
            SlotKey::Connection(id) => self.connection.contains_key(&id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotKey {
    Message(Topic, HandlerId),
    Connection(HandlerId),
}

/// Registry of message and connection handlers.
#[derive(Default)]
pub struct Registry {
    slots: Arc<Mutex<Slots>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for messages matching `topic`.
    pub fn subscribe(&self, topic: Topic, handler: MessageHandler) -> Subscription {
        let mut slots = self.lock();
        let id = slots.allocate();
        slots.message.entry(topic).or_default().insert(id, handler);
        tracing::debug!(topic = %topic, handler_id = id, "Handler subscribed");
        self.subscription(SlotKey::Message(topic, id))
    }

    /// Register `handler` for connection-state changes.
    pub fn on_connection_change(&self, handler: ConnectionHandler) -> Subscription {
        let mut slots = self.lock();
        let id = slots.allocate();
        slots.connection.insert(id, handler);
        self.subscription(SlotKey::Connection(id))
    }

    /// Deliver `message` to every handler for its kind and every wildcard
    /// handler, once each.
    ///
    /// A handler unsubscribed by an earlier handler during the same dispatch
    /// is skipped.
    pub fn dispatch(&self, message: &ServerMessage) {
        let kind = message.kind();
        let slots = self.lock();
        let targets: Vec<(SlotKey, MessageHandler)> = [Topic::Kind(kind), Topic::Any]
            .into_iter()
            .filter_map(|topic| slots.message.get(&topic).map(|set| (topic, set)))
            .flat_map(|(topic, set)| {
                set.iter()
                    .map(move |(id, handler)| (SlotKey::Message(topic, *id), Arc::clone(handler)))
            })
            .collect();
        drop(slots);

        if targets.is_empty() {
            tracing::trace!(kind = %kind, "No handlers for message");
            return;
        }

        for (key, handler) in targets {
            if !self.lock().contains(key) {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| handler(message))).is_err() {
                tracing::error!(
                    kind = %kind,
                    job_id = message.job_id(),
                    "Message handler panicked; continuing dispatch",
                );
            }
        }
    }

    /// Notify every connection handler of the new state.
    pub fn notify_connection(&self, connected: bool) {
        let targets: Vec<(SlotKey, ConnectionHandler)> = self
            .lock()
            .connection
            .iter()
            .map(|(id, handler)| (SlotKey::Connection(*id), Arc::clone(handler)))
            .collect();

        for (key, handler) in targets {
            if !self.lock().contains(key) {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| handler(connected))).is_err() {
                tracing::error!(connected, "Connection handler panicked");
            }
        }
    }

    /// Number of registered message handlers across all topics.
    pub fn handler_count(&self) -> usize {
        self.lock().message.values().map(HashMap::len).sum()
    }

    /// Number of registered connection handlers.
    pub fn connection_handler_count(&self) -> usize {
        self.lock().connection.len()
    }

    /// Drop every registration. Outstanding [`Subscription`]s become inert.
    pub fn clear(&self) {
        let mut slots = self.lock();
        slots.message.clear();
        slots.connection.clear();
    }

    fn subscription(&self, key: SlotKey) -> Subscription {
        Subscription {
            slots: Arc::downgrade(&self.slots),
            key,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        lock_slots(&self.slots)
    }
}

fn lock_slots(slots: &Mutex<Slots>) -> MutexGuard<'_, Slots> {
    // Handlers never run under this lock, so poisoning can only come from a
    // panic inside the registry itself; the map is still consistent.
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle for one registered handler.
///
/// Dropping the handle does not unregister; call
/// [`unsubscribe`](Self::unsubscribe) when the owner goes away.
#[must_use = "dropping a Subscription leaves its handler registered"]
#[derive(Debug)]
pub struct Subscription {
    slots: Weak<Mutex<Slots>>,
    key: SlotKey,
}

impl Subscription {
    /// Remove exactly this handler. Other handlers for the same topic stay.
    ///
    /// Once this returns, no dispatch that *starts* later calls the handler,
    /// and an unsubscribe issued from a handler skips it for the rest of the
    /// current dispatch. A dispatch already running on another thread may
    /// still be about to call it: the registration check and the call are
    /// not atomic with respect to other threads.
    pub fn unsubscribe(self) {
        if let Some(slots) = self.slots.upgrade() {
            if lock_slots(&slots).remove(self.key) {
                tracing::debug!(key = ?self.key, "Handler unsubscribed");
            }
        }
    }

    /// Whether the handler is still registered.
    pub fn is_active(&self) -> bool {
        self.slots
            .upgrade()
            .is_some_and(|slots| lock_slots(&slots).contains(self.key))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use jobwire_core::messages::{ErrorData, JobCompletedData, JobFailedData};
    use jobwire_core::MessageKind;

    use super::*;

    fn completed(job_id: &str) -> ServerMessage {
        ServerMessage::JobCompleted(JobCompletedData {
            job_id: job_id.into(),
            status: None,
            data_count: Some(12),
            results_available: None,
            timestamp: None,
        })
    }

    fn counter() -> (Arc<AtomicUsize>, MessageHandler) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (
            count,
            Arc::new(move |_: &ServerMessage| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn kind_and_wildcard_handlers_each_fire_once() {
        let registry = Registry::new();
        let (kind_count, kind_handler) = counter();
        let (other_kind_count, other_kind_handler) = counter();
        let (any_count, any_handler) = counter();
        let (failed_count, failed_handler) = counter();

        let _a = registry.subscribe(MessageKind::JobCompleted.into(), kind_handler);
        let _b = registry.subscribe(MessageKind::JobCompleted.into(), other_kind_handler);
        let _c = registry.subscribe(Topic::Any, any_handler);
        let _d = registry.subscribe(MessageKind::JobFailed.into(), failed_handler);

        registry.dispatch(&completed("abc"));

        assert_eq!(kind_count.load(Ordering::SeqCst), 1);
        assert_eq!(other_kind_count.load(Ordering::SeqCst), 1);
        assert_eq!(any_count.load(Ordering::SeqCst), 1);
        assert_eq!(failed_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let registry = Registry::new();
        let (first_count, first) = counter();
        let (second_count, second) = counter();

        let first_sub = registry.subscribe(MessageKind::JobCompleted.into(), first);
        let second_sub = registry.subscribe(MessageKind::JobCompleted.into(), second);

        first_sub.unsubscribe();
        registry.dispatch(&completed("abc"));

        assert_eq!(first_count.load(Ordering::SeqCst), 0);
        assert_eq!(second_count.load(Ordering::SeqCst), 1);
        assert!(second_sub.is_active());
        assert_eq!(registry.handler_count(), 1);
    }

    #[test]
    fn handler_unsubscribed_mid_dispatch_is_skipped() {
        let registry = Registry::new();
        let (victim_count, victim) = counter();
        let victim_sub: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        // Whichever handler fires first removes the other; the other must
        // then never run.
        let slot = Arc::clone(&victim_sub);
        let killer: MessageHandler = Arc::new(move |_: &ServerMessage| {
            if let Some(sub) = slot.lock().unwrap().take() {
                sub.unsubscribe();
            }
        });

        let killer_sub = registry.subscribe(Topic::Any, killer);
        *victim_sub.lock().unwrap() = Some(registry.subscribe(Topic::Any, victim));

        registry.dispatch(&completed("abc"));
        registry.dispatch(&completed("abc"));

        assert!(victim_count.load(Ordering::SeqCst) <= 1);
        assert!(victim_sub.lock().unwrap().is_none());
        assert!(killer_sub.is_active());
    }

    #[test]
    fn panicking_handler_does_not_stop_others() {
        let registry = Registry::new();
        let (count, survivor) = counter();

        let _p = registry.subscribe(
            MessageKind::JobFailed.into(),
            Arc::new(|_: &ServerMessage| panic!("subscriber bug")),
        );
        let _s = registry.subscribe(MessageKind::JobFailed.into(), survivor);

        let failed = ServerMessage::JobFailed(JobFailedData {
            job_id: "j".into(),
            status: None,
            error: Some("boom".into()),
            timestamp: None,
        });
        registry.dispatch(&failed);
        registry.dispatch(&failed);

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn connection_handlers_receive_state() {
        let registry = Registry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let sub = registry.on_connection_change(Arc::new(move |up: bool| s.lock().unwrap().push(up)));

        registry.notify_connection(true);
        registry.notify_connection(false);
        sub.unsubscribe();
        registry.notify_connection(true);

        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn clear_makes_subscriptions_inert() {
        let registry = Registry::new();
        let (count, handler) = counter();
        let sub = registry.subscribe(Topic::Any, handler);
        let conn = registry.on_connection_change(Arc::new(|_: bool| {}));

        registry.clear();
        registry.dispatch(&ServerMessage::Error(ErrorData { message: None }));

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!sub.is_active());
        assert_eq!(registry.connection_handler_count(), 0);
        sub.unsubscribe();
        conn.unsubscribe();
    }

    #[test]
    fn subscription_outliving_registry_is_harmless() {
        let registry = Registry::new();
        let sub = registry.subscribe(Topic::Any, Arc::new(|_: &ServerMessage| {}));
        drop(registry);
        assert!(!sub.is_active());
        sub.unsubscribe();
    }
}
