//! # Event Bus System
//!
//! A listener registry for lifecycle notifications.
//!
//! ## Overview
//!
//! Components own an [`EventBus<E>`] for their own event type and publish
//! through [`EventBus::emit`]. Collaborators register callbacks per event
//! name (or for every event) and get a [`SubscriptionId`] back for later
//! removal.
//!
//! Delivery is synchronous and fire-and-forget:
//!
//! - listeners run on the emitting task, in registration order
//! - the registry is snapshotted before delivery, so a listener may
//!   subscribe or unsubscribe without deadlocking
//! - a panicking listener is caught and logged; the emitter and the
//!   remaining listeners are unaffected
//!
//! Listeners must be quick. Anything slow belongs on a channel the listener
//! forwards into.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{Event, EventBus};
//!
//! #[derive(Debug)]
//! enum Ping {
//!     Sent(u32),
//! }
//!
//! impl Event for Ping {
//!     fn name(&self) -> &'static str {
//!         "sent"
//!     }
//! }
//!
//! let bus = EventBus::new();
//! let id = bus.on("sent", |event: &Ping| println!("{:?}", event));
//! assert_eq!(bus.emit(&Ping::Sent(1)), 1);
//! bus.off(id);
//! assert_eq!(bus.emit(&Ping::Sent(2)), 0);
//! ```

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{trace, warn};

/// An event that can be published on an [`EventBus`].
pub trait Event: Send + Sync {
    /// Stable name listeners subscribe to, e.g. `"state-changed"`.
    fn name(&self) -> &'static str;
}

/// Callback invoked with each matching event.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registration<E> {
    id: SubscriptionId,
    /// `None` receives every event.
    name: Option<&'static str>,
    listener: Listener<E>,
}

/// Named-listener registry with synchronous, ordered delivery.
pub struct EventBus<E> {
    registrations: RwLock<Vec<Registration<E>>>,
    next_id: AtomicU64,
}

impl<E: Event> EventBus<E> {
    pub fn new() -> Self {
        Self {
            registrations: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers `listener` for events whose [`Event::name`] equals `name`.
    pub fn on<F>(&self, name: &'static str, listener: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(Some(name), Arc::new(listener))
    }

    /// Registers `listener` for every event.
    pub fn on_any<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(None, Arc::new(listener))
    }

    /// Removes a subscription. Returns `false` if it was already gone.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut registrations = self
            .registrations
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = registrations.len();
        registrations.retain(|registration| registration.id != id);
        registrations.len() != before
    }

    /// Delivers `event` to every matching listener and returns how many
    /// listeners completed without panicking.
    pub fn emit(&self, event: &E) -> usize {
        let name = event.name();
        let listeners: Vec<Listener<E>> = {
            let registrations = self
                .registrations
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            registrations
                .iter()
                .filter(|registration| registration.name.map_or(true, |n| n == name))
                .map(|registration| Arc::clone(&registration.listener))
                .collect()
        };

        trace!(event = name, listeners = listeners.len(), "Emitting event");

        let mut delivered = 0;
        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!(event = name, "Event listener panicked; continuing"),
            }
        }
        delivered
    }

    pub fn listener_count(&self) -> usize {
        self.registrations
            .read()
            .map(|registrations| registrations.len())
            .unwrap_or(0)
    }

    fn register(&self, name: Option<&'static str>, listener: Listener<E>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registrations
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Registration { id, name, listener });
        id
    }
}

impl<E: Event> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum TestEvent {
        Started,
        Finished(u32),
    }

    impl Event for TestEvent {
        fn name(&self) -> &'static str {
            match self {
                TestEvent::Started => "started",
                TestEvent::Finished(_) => "finished",
            }
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (log.clone(), log)
    }

    #[test]
    fn test_emit_without_listeners() {
        let bus = EventBus::<TestEvent>::new();
        assert_eq!(bus.emit(&TestEvent::Started), 0);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_listeners_run_in_registration_order() {
        let bus = EventBus::<TestEvent>::new();
        let (log, writer) = recorder();

        for label in ["first", "second", "third"] {
            let writer = writer.clone();
            bus.on("started", move |_| writer.lock().unwrap().push(label.to_string()));
        }

        assert_eq!(bus.emit(&TestEvent::Started), 3);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_name_filtering_and_catch_all() {
        let bus = EventBus::<TestEvent>::new();
        let (log, writer) = recorder();

        let named = writer.clone();
        bus.on("finished", move |event| {
            named.lock().unwrap().push(format!("named:{:?}", event))
        });
        let any = writer.clone();
        bus.on_any(move |event| any.lock().unwrap().push(format!("any:{}", event.name())));

        bus.emit(&TestEvent::Started);
        bus.emit(&TestEvent::Finished(7));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["any:started", "named:Finished(7)", "any:finished"]
        );
    }

    #[test]
    fn test_off_removes_listener() {
        let bus = EventBus::<TestEvent>::new();
        let id = bus.on("started", |_| {});
        assert_eq!(bus.listener_count(), 1);

        assert!(bus.off(id));
        assert!(!bus.off(id));
        assert_eq!(bus.emit(&TestEvent::Started), 0);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let bus = EventBus::<TestEvent>::new();
        let (log, writer) = recorder();

        bus.on("started", |_| panic!("listener bug"));
        bus.on("started", move |_| writer.lock().unwrap().push("after".to_string()));

        assert_eq!(bus.emit(&TestEvent::Started), 1);
        assert_eq!(*log.lock().unwrap(), vec!["after"]);

        // The bus stays usable after a panic.
        assert_eq!(bus.emit(&TestEvent::Started), 1);
    }

    #[test]
    fn test_listener_may_unsubscribe_during_emit() {
        let bus = Arc::new(EventBus::<TestEvent>::new());
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let bus_clone = Arc::clone(&bus);
        let slot_clone = Arc::clone(&slot);
        let id = bus.on("started", move |_| {
            if let Some(id) = slot_clone.lock().unwrap().take() {
                bus_clone.off(id);
            }
        });
        *slot.lock().unwrap() = Some(id);

        assert_eq!(bus.emit(&TestEvent::Started), 1);
        assert_eq!(bus.listener_count(), 0);
    }
}
