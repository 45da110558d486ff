//! Trigger activated by capturing a named event.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::emitter::Subscription;
use crate::host::{self, CapturedEvent, EventSource, Host, SessionIdProvider};
use crate::persistence::PersistenceHelper;
use crate::status::TriggerStatus;
use crate::trigger::{Trigger, TriggerKind, TriggerMatch};

struct EventState {
    session: Arc<dyn SessionIdProvider>,
    persistence: PersistenceHelper,
    names: Mutex<BTreeSet<String>>,
}

impl EventState {
    fn on_event(&self, event: &CapturedEvent) {
        if !self.names.lock().contains(&event.name) {
            return;
        }

        let Some(session_id) = host::active_session_id(&*self.session) else {
            capture_gate_log::debug!(
                event = %event.name,
                "event trigger matched without an active session"
            );
            return;
        };

        capture_gate_log::debug!(
            session_id = %session_id,
            event = %event.name,
            "event trigger matched"
        );
        self.persistence.set_triggered(&session_id);
    }
}

/// Matches once one of the configured events has been captured in the session.
pub struct EventTrigger {
    events: Arc<dyn EventSource>,
    state: Arc<EventState>,
    subscription: Mutex<Option<Subscription>>,
}

impl EventTrigger {
    /// Creates an unconfigured trigger persisting its decisions through `persistence`.
    pub fn new(host: &Host, persistence: PersistenceHelper) -> Self {
        Self {
            events: Arc::clone(&host.events),
            state: Arc::new(EventState {
                session: Arc::clone(&host.session),
                persistence,
                names: Mutex::new(BTreeSet::new()),
            }),
            subscription: Mutex::new(None),
        }
    }

    /// Replaces the set of event names.
    ///
    /// Empty names are ignored. The event listener is registered on the first initialization
    /// with a non-empty set and kept afterwards.
    pub fn init<S: AsRef<str>>(&self, names: &[S]) {
        let names: BTreeSet<String> = names
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect();

        let configured = !names.is_empty();
        *self.state.names.lock() = names;

        if configured {
            self.subscribe();
        }
    }

    fn subscribe(&self) {
        let mut subscription = self.subscription.lock();
        if subscription.is_some() {
            return;
        }

        let state = Arc::clone(&self.state);
        *subscription = Some(
            self.events
                .on_event_captured(Box::new(move |event| state.on_event(event))),
        );
    }

    fn is_configured(&self) -> bool {
        !self.state.names.lock().is_empty()
    }
}

impl Trigger for EventTrigger {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Event
    }

    fn matches(&self, session_id: Option<&str>) -> TriggerMatch {
        if !self.is_configured() {
            return TriggerMatch::Unconfigured;
        }

        match session_id {
            Some(session_id) => self.state.persistence.is_triggered(session_id).into(),
            None => TriggerMatch::NotMatched,
        }
    }

    fn status(&self, session_id: Option<&str>) -> TriggerStatus {
        let result = self.matches(session_id);
        let description = match result {
            TriggerMatch::Unconfigured => return TriggerStatus::unconfigured(self.kind()),
            TriggerMatch::Matched => "captured a matching event in this session".to_owned(),
            TriggerMatch::NotMatched => {
                let names = self.state.names.lock();
                let names: Vec<_> = names.iter().map(String::as_str).collect();
                format!("waiting for one of: {}", names.join(", "))
            }
        };

        TriggerStatus::new(self.kind(), result, description)
    }
}
