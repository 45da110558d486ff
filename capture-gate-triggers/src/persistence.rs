//! Session-scoped decisions persisted in the host's property store.

use std::sync::Arc;

use capture_gate_log::LogError;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::host::{PropertyStore, StoreError};

/// The key suffix of the decision record under a helper's prefix.
const DECISION_SUFFIX: &str = "session";

/// The persisted state of a trigger for one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriState {
    /// The trigger fired. Terminal for the session.
    Triggered,
    /// Nothing has been decided for the session yet.
    NotTriggeredYet,
    /// The trigger decided not to fire. Terminal for the session.
    ExplicitlyDisabled,
}

/// The persisted record of a trigger's state for a session.
///
/// The record is only authoritative for `session_id`. A record written for any other session is
/// ignored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDecision {
    /// The session the decision was made in.
    pub session_id: String,
    /// The decided state.
    pub state: TriState,
}

impl SessionDecision {
    fn state_for(&self, session_id: &str) -> Option<TriState> {
        (self.session_id == session_id).then_some(self.state)
    }
}

/// Prefixed access to the property store with an in-memory cache of the last decision.
///
/// Helpers are created from a root prefix and narrowed with [`with_prefix`](Self::with_prefix).
/// Every helper caches its own decision record, so each trigger should own exactly one helper.
///
/// Store failures never surface: a failing read is treated as "no prior decision" and a failing
/// write leaves the decision in memory only.
pub struct PersistenceHelper {
    store: Arc<dyn PropertyStore>,
    prefix: String,
    cached: Mutex<Option<SessionDecision>>,
}

impl PersistenceHelper {
    /// Creates a helper for all keys under `prefix`.
    pub fn new(store: Arc<dyn PropertyStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            cached: Mutex::new(None),
        }
    }

    /// Returns a helper for the keys under `{prefix}_{segment}`.
    ///
    /// The new helper starts with an empty cache.
    pub fn with_prefix(&self, segment: &str) -> Self {
        Self::new(Arc::clone(&self.store), format!("{}_{segment}", self.prefix))
    }

    /// Returns the prefix of all keys handled by this helper.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the full storage key for `suffix`.
    pub fn key(&self, suffix: &str) -> String {
        format!("{}_{suffix}", self.prefix)
    }

    /// Reads and decodes the value stored under `suffix`.
    pub fn get<T: DeserializeOwned>(&self, suffix: &str) -> Option<T> {
        let key = self.key(suffix);

        let result = self.store.get_property(&key).and_then(|value| match value {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        });

        match result {
            Ok(value) => value,
            Err(error) => {
                capture_gate_log::warn!(
                    key = %key,
                    "failed to read persisted value: {}",
                    LogError(&error)
                );
                None
            }
        }
    }

    /// Encodes and writes `value` under `suffix`.
    ///
    /// Returns `true` if the store accepted the write.
    pub fn set<T: Serialize>(&self, suffix: &str, value: &T) -> bool {
        let key = self.key(suffix);

        let result = serde_json::to_value(value)
            .map_err(StoreError::from)
            .and_then(|value| self.store.set_property(&key, value));

        match result {
            Ok(()) => true,
            Err(error) => {
                capture_gate_log::warn!(
                    key = %key,
                    "failed to persist value: {}",
                    LogError(&error)
                );
                false
            }
        }
    }

    /// Returns the recorded state for `session_id`, if any.
    ///
    /// The in-memory cache is consulted before the store. A record read from the store is cached
    /// if it belongs to `session_id`.
    pub fn decision(&self, session_id: &str) -> Option<TriState> {
        if let Some(state) = self
            .cached
            .lock()
            .as_ref()
            .and_then(|cached| cached.state_for(session_id))
        {
            return Some(state);
        }

        let stored: SessionDecision = self.get(DECISION_SUFFIX)?;
        let state = stored.state_for(session_id)?;
        *self.cached.lock() = Some(stored);
        Some(state)
    }

    /// Records `state` for `session_id`, replacing any record of another session.
    ///
    /// Nothing is written if the same state is already recorded for this session. The in-memory
    /// cache is updated before the store.
    pub fn set_decision(&self, session_id: &str, state: TriState) {
        if self.decision(session_id) == Some(state) {
            return;
        }

        let decision = SessionDecision {
            session_id: session_id.to_owned(),
            state,
        };

        *self.cached.lock() = Some(decision.clone());
        self.set(DECISION_SUFFIX, &decision);
    }

    /// Returns `true` if a [`TriState::Triggered`] decision is recorded for `session_id`.
    pub fn is_triggered(&self, session_id: &str) -> bool {
        self.decision(session_id) == Some(TriState::Triggered)
    }

    /// Records that the trigger fired for `session_id`.
    pub fn set_triggered(&self, session_id: &str) {
        self.set_decision(session_id, TriState::Triggered);
    }
}

impl std::fmt::Debug for PersistenceHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceHelper")
            .field("prefix", &self.prefix)
            .field("cached", &*self.cached.lock())
            .finish()
    }
}
