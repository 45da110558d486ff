//! Listener registries and their disposer handles.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// A callback registered with a host notification source.
pub type Listener<T> = Box<dyn Fn(&T) + Send + Sync>;

type Unsubscribe = Box<dyn FnOnce() + Send + Sync>;

type SharedListener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A handle to a registered listener.
///
/// The listener stays registered for as long as the handle is alive. Dropping the handle or
/// calling [`unsubscribe`](Self::unsubscribe) detaches it. Hosts that bring their own event bus
/// wrap their disposer in [`Subscription::new`].
#[must_use = "dropping a subscription detaches its listener"]
pub struct Subscription {
    unsubscribe: Option<Unsubscribe>,
}

impl Subscription {
    /// Creates a subscription that runs `unsubscribe` exactly once when it is released.
    pub fn new<F>(unsubscribe: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Creates a subscription that does nothing when released.
    pub fn noop() -> Self {
        Self { unsubscribe: None }
    }

    /// Detaches the listener.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

struct Listeners<T> {
    next_id: u64,
    entries: Vec<(u64, SharedListener<T>)>,
}

/// An in-process notification source with explicit listener registration.
///
/// Notifications are delivered synchronously, in registration order, on the thread calling
/// [`emit`](Self::emit). The registry lock is not held while listeners run, so a listener may
/// subscribe or unsubscribe without deadlocking.
pub struct Emitter<T> {
    listeners: Arc<Mutex<Listeners<T>>>,
}

impl<T: 'static> Emitter<T> {
    /// Creates an emitter without listeners.
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Registers a listener and returns the handle that keeps it registered.
    pub fn subscribe(&self, listener: Listener<T>) -> Subscription {
        let id = {
            let mut listeners = self.listeners.lock();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.entries.push((id, Arc::from(listener)));
            id
        };

        let registry: Weak<Mutex<Listeners<T>>> = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.lock().entries.retain(|(entry, _)| *entry != id);
            }
        })
    }

    /// Delivers `value` to every registered listener.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<_> = self
            .listeners
            .lock()
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            listener(value);
        }
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().entries.len()
    }
}

impl<T: 'static> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.listeners.lock().entries.len())
            .finish()
    }
}
