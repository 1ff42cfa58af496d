//! Writable reactive value container.
//!
//! This crate provides [`Writable<T>`], a small observable cell in the style
//! of a Svelte writable store: consumers register observer callbacks with
//! [`Writable::subscribe`], and every [`Writable::set`] or
//! [`Writable::update`] notifies all current observers synchronously before
//! returning. Observers are invoked once immediately at registration with the
//! current value.
//!
//! # Example
//!
//! ```
//! use reactive_store::Writable;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let store = Writable::new(0u32);
//! let seen = Arc::new(AtomicUsize::new(0));
//!
//! let observer_seen = Arc::clone(&seen);
//! let handle = store.subscribe(move |value| {
//!     observer_seen.store(*value as usize, Ordering::SeqCst);
//! });
//!
//! store.set(7);
//! assert_eq!(seen.load(Ordering::SeqCst), 7);
//!
//! handle.unsubscribe();
//! store.set(9);
//! assert_eq!(seen.load(Ordering::SeqCst), 7);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Shared<T> {
    value: Mutex<T>,
    observers: Mutex<Vec<(u64, Observer<T>)>>,
    next_observer_id: AtomicU64,
}

/// An observable value cell.
///
/// Cloning a `Writable` yields another handle to the same underlying cell and
/// observer list.
pub struct Writable<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Writable<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone> Writable<T> {
    /// Create a store holding `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                value: Mutex::new(initial),
                observers: Mutex::new(Vec::new()),
                next_observer_id: AtomicU64::new(0),
            }),
        }
    }

    /// Replace the current value and notify all observers before returning.
    pub fn set(&self, value: T) {
        {
            let mut current = lock(&self.shared.value);
            *current = value;
        }
        self.notify();
    }

    /// Mutate the current value in place and notify all observers.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        {
            let mut current = lock(&self.shared.value);
            f(&mut current);
        }
        self.notify();
    }

    /// Clone out the current value.
    pub fn get(&self) -> T {
        lock(&self.shared.value).clone()
    }

    /// Register an observer.
    ///
    /// The observer runs once immediately with the current value, then again
    /// after every `set`/`update` until the returned handle is dropped via
    /// [`ObserverHandle::unsubscribe`].
    pub fn subscribe(
        &self,
        observer: impl Fn(&T) + Send + Sync + 'static,
    ) -> ObserverHandle<T> {
        let observer: Observer<T> = Arc::new(observer);
        let id = self.shared.next_observer_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.shared.observers).push((id, Arc::clone(&observer)));

        let current = self.get();
        observer(&current);

        ObserverHandle {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Number of currently registered observers.
    pub fn observer_count(&self) -> usize {
        lock(&self.shared.observers).len()
    }

    fn notify(&self) {
        // Snapshot value and observer list first so no lock is held while
        // observer callbacks run (observers may call `get` on this store).
        let value = self.get();
        let observers: Vec<Observer<T>> = lock(&self.shared.observers)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer(&value);
        }
    }
}

/// Handle returned by [`Writable::subscribe`]; consumes itself on unsubscribe.
pub struct ObserverHandle<T> {
    id: u64,
    shared: Weak<Shared<T>>,
}

impl<T> ObserverHandle<T> {
    /// Remove the observer this handle was created for.
    pub fn unsubscribe(self) {
        if let Some(shared) = self.shared.upgrade() {
            lock(&shared.observers).retain(|(id, _)| *id != self.id);
        }
    }
}

// Observer callbacks never poison intentionally; recover the inner value so a
// panicking observer cannot wedge the store for everyone else.
fn lock<G>(mutex: &Mutex<G>) -> std::sync::MutexGuard<'_, G> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
