//! Interfaces of the host SDK consumed by the triggers.
//!
//! The gate never owns any of these collaborators. A host passes them in once through [`Host`]
//! and keeps publishing notifications while the triggers listen.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::emitter::{Emitter, Listener, Subscription};

/// An event recorded by the host SDK.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedEvent {
    /// The name of the event, for example `$pageview` or `checkout`.
    pub name: String,
}

impl CapturedEvent {
    /// Creates an event with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// The value of a feature flag as reported by the host's flag evaluator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    /// A boolean flag.
    Bool(bool),
    /// A multivariate flag resolved to the named variant.
    Variant(String),
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => fmt::Display::fmt(value, f),
            Self::Variant(variant) => f.write_str(variant),
        }
    }
}

impl From<bool> for FlagValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for FlagValue {
    fn from(value: &str) -> Self {
        Self::Variant(value.to_owned())
    }
}

/// All flag values computed by one evaluation of the host's flag evaluator.
pub type FlagValues = BTreeMap<String, FlagValue>;

/// The kind of navigation that changed the current URL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationChange {
    /// A new history entry was pushed.
    Push,
    /// The current history entry was replaced.
    Replace,
    /// The user went back or forward in the history.
    Pop,
    /// Only the fragment of the URL changed.
    HashChange,
}

/// Errors reported by a [`PropertyStore`].
///
/// The triggers never propagate these. A failed read counts as "no prior decision" and after a
/// failed write the decision only lives in memory until the process ends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store cannot be reached, for example because storage is disabled.
    #[error("property store is unavailable")]
    Unavailable,
    /// A persisted value could not be encoded or decoded.
    #[error("failed to encode or decode a persisted value")]
    Serde(#[from] serde_json::Error),
    /// A host-specific failure.
    #[error("property store failed: {0}")]
    Backend(String),
}

/// The host's event bus.
pub trait EventSource: Send + Sync {
    /// Registers a listener called for every captured event.
    fn on_event_captured(&self, listener: Listener<CapturedEvent>) -> Subscription;
}

/// The host's feature flag evaluator.
pub trait FlagSource: Send + Sync {
    /// Registers a listener called whenever flags are (re)computed.
    fn on_flags_computed(&self, listener: Listener<FlagValues>) -> Subscription;
}

/// The host's view of the current location.
pub trait NavigationSource: Send + Sync {
    /// Returns the current URL, if there is one.
    fn current_url(&self) -> Option<String>;

    /// Registers a listener called after every navigation.
    fn on_navigation_change(&self, listener: Listener<NavigationChange>) -> Subscription;
}

/// A durable key-value store surviving reloads within a session.
pub trait PropertyStore: Send + Sync {
    /// Reads the value stored under `key`.
    fn get_property(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Writes `value` under `key`.
    fn set_property(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

/// Supplies the identifier of the current session.
pub trait SessionIdProvider: Send + Sync {
    /// Returns the current session id, or `None` if no session is active.
    fn session_id(&self) -> Option<String>;
}

/// Returns the session id of `provider`, treating an empty id as no active session.
pub(crate) fn active_session_id(provider: &dyn SessionIdProvider) -> Option<String> {
    provider.session_id().filter(|id| !id.is_empty())
}

impl EventSource for Emitter<CapturedEvent> {
    fn on_event_captured(&self, listener: Listener<CapturedEvent>) -> Subscription {
        self.subscribe(listener)
    }
}

impl FlagSource for Emitter<FlagValues> {
    fn on_flags_computed(&self, listener: Listener<FlagValues>) -> Subscription {
        self.subscribe(listener)
    }
}

/// The bundle of host collaborators shared by all triggers.
#[derive(Clone)]
pub struct Host {
    /// The event bus.
    pub events: Arc<dyn EventSource>,
    /// The flag evaluator.
    pub flags: Arc<dyn FlagSource>,
    /// The navigation source.
    pub navigation: Arc<dyn NavigationSource>,
    /// The durable store for session decisions.
    pub store: Arc<dyn PropertyStore>,
    /// The session identity provider.
    pub session: Arc<dyn SessionIdProvider>,
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("session_id", &self.session.session_id())
            .field("current_url", &self.navigation.current_url())
            .finish_non_exhaustive()
    }
}
