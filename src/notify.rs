//! Change-notification channel.
//!
//! A minimal multi-observer broadcast primitive. Each stateful component owns
//! its own instance; observers carry no payload and pull fresh state through
//! the owning component's snapshot accessor after being notified.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

type Observer = Arc<dyn Fn() + Send + Sync>;
type ObserverList = Mutex<Vec<(u64, Observer)>>;

#[derive(Default)]
pub struct ChangeNotifier {
    observers: Arc<ObserverList>,
    next_id: AtomicU64,
}

/// Disposer handle for one registered observer. Dropping it (or calling
/// `dispose`) unregisters the observer.
#[must_use = "dropping the subscription unregisters the observer"]
pub struct Subscription {
    observers: Weak<ObserverList>,
    id: u64,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: impl Fn() + Send + Sync + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers
            .lock()
            .unwrap()
            .push((id, Arc::new(observer)));
        Subscription {
            observers: Arc::downgrade(&self.observers),
            id,
        }
    }

    /// Invoke every currently-registered observer once, synchronously, in
    /// registration order. A panicking observer must not stop delivery to the
    /// rest, so each call is contained with `catch_unwind`.
    pub fn fire(&self) {
        let snapshot: Vec<Observer> = self
            .observers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in snapshot {
            let _ = catch_unwind(AssertUnwindSafe(|| observer()));
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().unwrap().len()
    }
}

impl Subscription {
    pub fn dispose(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(observers) = self.observers.upgrade() {
            if let Ok(mut observers) = observers.lock() {
                observers.retain(|(id, _)| *id != self.id);
            }
        }
    }
}
