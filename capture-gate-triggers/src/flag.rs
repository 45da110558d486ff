//! Trigger following a linked feature flag.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::LinkedFlag;
use crate::emitter::Subscription;
use crate::host::{FlagSource, FlagValue, FlagValues, Host};
use crate::status::TriggerStatus;
use crate::trigger::{Trigger, TriggerKind, TriggerMatch};

/// Returns `true` if `value` satisfies the linked flag.
///
/// Without a variant, any enabled boolean or non-empty variant matches. With a variant, only that
/// exact variant matches.
fn is_enabled(flag: &LinkedFlag, value: &FlagValue) -> bool {
    match (&flag.variant, value) {
        (None, FlagValue::Bool(enabled)) => *enabled,
        (None, FlagValue::Variant(variant)) => !variant.is_empty(),
        (Some(expected), FlagValue::Variant(variant)) => variant == expected,
        (Some(_), FlagValue::Bool(_)) => false,
    }
}

#[derive(Debug, Default)]
struct FlagState {
    flag: Option<LinkedFlag>,
    value: Option<FlagValue>,
}

/// Matches while the linked feature flag is enabled.
///
/// Unlike the other triggers, this one is not sticky and persists nothing: flags can be toggled
/// in the middle of a session and the gate follows the latest computed value. Until the flag
/// evaluator reports the key, the trigger does not match.
pub struct FlagTrigger {
    flags: Arc<dyn FlagSource>,
    state: Arc<Mutex<FlagState>>,
    subscription: Mutex<Option<Subscription>>,
}

impl FlagTrigger {
    /// Creates an unconfigured trigger.
    pub fn new(host: &Host) -> Self {
        Self {
            flags: Arc::clone(&host.flags),
            state: Arc::new(Mutex::new(FlagState::default())),
            subscription: Mutex::new(None),
        }
    }

    /// Links the trigger to `flag`, or unlinks it with `None`.
    ///
    /// Linking the flag that is already linked does nothing. Otherwise the previous listener is
    /// detached and the new flag starts out unmatched.
    pub fn init(&self, flag: Option<&LinkedFlag>) {
        let flag = match flag {
            Some(flag) if flag.key.is_empty() => {
                capture_gate_log::warn!("ignoring linked feature flag without key");
                None
            }
            flag => flag,
        };

        let mut subscription = self.subscription.lock();

        {
            let mut state = self.state.lock();
            if state.flag.as_ref() == flag && (flag.is_none() || subscription.is_some()) {
                return;
            }

            state.flag = flag.cloned();
            state.value = None;
        }

        // Detach before subscribing so at most one listener is registered at any time.
        drop(subscription.take());

        let Some(flag) = flag else {
            return;
        };

        capture_gate_log::debug!(flag = %flag.key, "linking feature flag");

        let state = Arc::clone(&self.state);
        let linked = flag.clone();
        *subscription = Some(self.flags.on_flags_computed(Box::new(
            move |values: &FlagValues| {
                let Some(value) = values.get(&linked.key) else {
                    return;
                };

                let mut state = state.lock();
                // A stale listener may still be dispatched once after re-linking.
                if state.flag.as_ref() != Some(&linked) {
                    return;
                }

                capture_gate_log::trace!(flag = %linked.key, value = %value, "flag computed");
                state.value = Some(value.clone());
            },
        )));
    }
}

impl Trigger for FlagTrigger {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Flag
    }

    fn matches(&self, session_id: Option<&str>) -> TriggerMatch {
        let state = self.state.lock();
        let Some(ref flag) = state.flag else {
            return TriggerMatch::Unconfigured;
        };

        if session_id.is_none() {
            return TriggerMatch::NotMatched;
        }

        state
            .value
            .as_ref()
            .is_some_and(|value| is_enabled(flag, value))
            .into()
    }

    fn status(&self, session_id: Option<&str>) -> TriggerStatus {
        let result = self.matches(session_id);

        let state = self.state.lock();
        let Some(ref flag) = state.flag else {
            return TriggerStatus::unconfigured(self.kind());
        };

        let expected = flag.variant.as_deref().unwrap_or("enabled");
        let description = match (session_id, &state.value) {
            (None, _) => "no active session".to_owned(),
            (Some(_), None) => format!("waiting for flag {} to be computed", flag.key),
            (Some(_), Some(value)) if result == TriggerMatch::Matched => {
                format!("flag {} is {value}", flag.key)
            }
            (Some(_), Some(value)) => {
                format!("flag {} is {value}, expected {expected}", flag.key)
            }
        };

        TriggerStatus::new(self.kind(), result, description)
    }
}
