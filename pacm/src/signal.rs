//! Lightweight observer signals.
//!
//! Tasks, monitors and the manager expose their events as [`Signal`]s.
//! Subscribers register a callback and receive a [`Subscription`] disposer;
//! dropping or disposing the subscription detaches the callback, so no
//! component ever holds a back-pointer to its observers.
//!
//! Handlers run on the thread that emits, in subscription order. The slot
//! list is snapshotted before dispatch, so a handler may subscribe or
//! dispose without deadlocking the signal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Slot<T> {
    id: u64,
    handler: Handler<T>,
}

/// A multicast event with explicit subscription lifetimes.
pub struct Signal<T> {
    slots: Arc<Mutex<Vec<Slot<T>>>>,
    next_id: AtomicU64,
}

impl<T: 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Signal<T> {
    /// Create a signal with no subscribers.
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Subscribe to this signal.
    ///
    /// The returned [`Subscription`] detaches the handler when disposed or
    /// dropped. Keep it alive for as long as events should be observed.
    #[must_use = "dropping the subscription detaches the handler"]
    pub fn connect<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut slots = self.slots.lock().unwrap();
        slots.push(Slot {
            id,
            handler: Arc::new(handler),
        });

        let slots = Arc::downgrade(&self.slots);
        Subscription {
            detach: Some(Box::new(move || {
                if let Some(slots) = slots.upgrade() {
                    slots.lock().unwrap().retain(|s| s.id != id);
                }
            })),
        }
    }

    /// Subscribe for the lifetime of the signal, with no disposer.
    pub fn connect_forever<F>(&self, handler: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots.lock().unwrap().push(Slot {
            id,
            handler: Arc::new(handler),
        });
    }

    /// Emit a value to every current subscriber.
    pub fn emit(&self, value: &T) {
        let handlers: Vec<Handler<T>> = {
            let slots = self.slots.lock().unwrap();
            slots.iter().map(|s| Arc::clone(&s.handler)).collect()
        };
        for handler in handlers {
            handler(value);
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.slots.lock().unwrap().len()
    }
}

impl<T: 'static> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Disposer for a signal subscription.
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Detach the handler now instead of waiting for drop.
    pub fn dispose(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.detach.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_emit_reaches_all_subscribers_in_order() {
        let signal: Signal<u32> = Signal::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_a = Arc::clone(&seen);
        let _sub_a = signal.connect(move |v| seen_a.lock().unwrap().push(("a", *v)));
        let seen_b = Arc::clone(&seen);
        let _sub_b = signal.connect(move |v| seen_b.lock().unwrap().push(("b", *v)));

        signal.emit(&7);
        assert_eq!(*seen.lock().unwrap(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn test_disposed_subscription_receives_nothing() {
        let signal: Signal<u32> = Signal::new();
        let count = Arc::new(AtomicUsize::new(0));

        let count_clone = Arc::clone(&count);
        let sub = signal.connect(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        signal.emit(&1);
        sub.dispose();
        signal.emit(&2);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_detaches() {
        let signal: Signal<()> = Signal::new();
        {
            let _sub = signal.connect(|_| {});
            assert_eq!(signal.subscriber_count(), 1);
        }
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn test_handler_may_dispose_during_emit() {
        let signal: Signal<()> = Signal::new();
        let holder: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let holder_clone = Arc::clone(&holder);
        let sub = signal.connect(move |_| {
            // Self-dispose from inside the handler.
            if let Some(sub) = holder_clone.lock().unwrap().take() {
                sub.dispose();
            }
        });
        *holder.lock().unwrap() = Some(sub);

        signal.emit(&());
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn test_connect_forever_outlives_handle() {
        let signal: Signal<u32> = Signal::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        signal.connect_forever(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        signal.emit(&1);
        signal.emit(&2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
