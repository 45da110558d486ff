//! In-memory implementations of the host interfaces.
//!
//! These back hosts without a durable store and drive the command line simulator and tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::emitter::{Emitter, Listener, Subscription};
use crate::host::{
    CapturedEvent, FlagValues, Host, NavigationChange, NavigationSource, PropertyStore,
    SessionIdProvider, StoreError,
};

/// A [`PropertyStore`] backed by a map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `values`, for example loaded from a previous run.
    pub fn from_values(values: BTreeMap<String, Value>) -> Self {
        Self {
            values: Mutex::new(values),
        }
    }

    /// Returns a copy of all stored values.
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.values.lock().clone()
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }
}

impl PropertyStore for MemoryStore {
    fn get_property(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.get(key))
    }

    fn set_property(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.values.lock().insert(key.to_owned(), value);
        Ok(())
    }
}

/// A [`NavigationSource`] whose location is changed programmatically.
#[derive(Debug, Default)]
pub struct MemoryNavigation {
    url: Mutex<Option<String>>,
    changes: Emitter<NavigationChange>,
}

impl MemoryNavigation {
    /// Creates a navigation source starting at `url`.
    pub fn new(url: Option<&str>) -> Self {
        Self {
            url: Mutex::new(url.map(str::to_owned)),
            changes: Emitter::new(),
        }
    }

    /// Pushes a new location and notifies listeners.
    pub fn navigate(&self, url: &str) {
        self.navigate_with(url, NavigationChange::Push);
    }

    /// Changes the location with the given kind of navigation and notifies listeners.
    pub fn navigate_with(&self, url: &str, change: NavigationChange) {
        *self.url.lock() = Some(url.to_owned());
        self.changes.emit(&change);
    }

    /// Returns the number of registered navigation listeners.
    pub fn listener_count(&self) -> usize {
        self.changes.listener_count()
    }
}

impl NavigationSource for MemoryNavigation {
    fn current_url(&self) -> Option<String> {
        self.url.lock().clone()
    }

    fn on_navigation_change(&self, listener: Listener<NavigationChange>) -> Subscription {
        self.changes.subscribe(listener)
    }
}

/// A [`SessionIdProvider`] holding the current session id.
#[derive(Debug, Default)]
pub struct SessionCell {
    id: Mutex<Option<String>>,
}

impl SessionCell {
    /// Creates a provider reporting `id`.
    pub fn new(id: Option<&str>) -> Self {
        Self {
            id: Mutex::new(id.map(str::to_owned)),
        }
    }

    /// Starts a new session.
    pub fn set(&self, id: &str) {
        *self.id.lock() = Some(id.to_owned());
    }

    /// Ends the current session without starting a new one.
    pub fn clear(&self) {
        *self.id.lock() = None;
    }
}

impl SessionIdProvider for SessionCell {
    fn session_id(&self) -> Option<String> {
        self.id.lock().clone()
    }
}

/// A complete in-memory host.
///
/// Keeps typed handles on every collaborator so notifications can be published, while
/// [`host`](Self::host) hands out the type-erased bundle the triggers consume.
#[derive(Debug, Clone)]
pub struct MemoryHost {
    /// The event bus.
    pub events: Arc<Emitter<CapturedEvent>>,
    /// The flag evaluator.
    pub flags: Arc<Emitter<FlagValues>>,
    /// The navigation source.
    pub navigation: Arc<MemoryNavigation>,
    /// The durable store.
    pub store: Arc<MemoryStore>,
    /// The session identity provider.
    pub session: Arc<SessionCell>,
}

impl MemoryHost {
    /// Creates a host at `url` with the given active session.
    pub fn new(url: Option<&str>, session_id: Option<&str>) -> Self {
        Self::with_store(url, session_id, MemoryStore::new())
    }

    /// Creates a host reusing previously persisted values, as after a reload.
    pub fn with_store(url: Option<&str>, session_id: Option<&str>, store: MemoryStore) -> Self {
        Self {
            events: Arc::new(Emitter::new()),
            flags: Arc::new(Emitter::new()),
            navigation: Arc::new(MemoryNavigation::new(url)),
            store: Arc::new(store),
            session: Arc::new(SessionCell::new(session_id)),
        }
    }

    /// Returns the bundle of collaborators for the triggers.
    pub fn host(&self) -> Host {
        Host {
            events: self.events.clone(),
            flags: self.flags.clone(),
            navigation: self.navigation.clone(),
            store: self.store.clone(),
            session: self.session.clone(),
        }
    }

    /// Publishes a captured event.
    pub fn capture(&self, name: &str) {
        self.events.emit(&CapturedEvent::new(name));
    }

    /// Publishes a flag computation.
    pub fn compute_flags(&self, values: &FlagValues) {
        self.flags.emit(values);
    }

    /// Navigates to `url`.
    pub fn navigate(&self, url: &str) {
        self.navigation.navigate(url);
    }

    /// Switches to a new session.
    pub fn start_session(&self, id: &str) {
        self.session.set(id);
    }
}
