//! The contract shared by all triggers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::status::TriggerStatus;

/// The outcome of evaluating a single trigger for a session.
///
/// Unlike a plain boolean, this distinguishes a trigger that is not configured, and therefore
/// ignored by the composite gate, from one that is configured but has not matched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMatch {
    /// The trigger has no configuration and does not take part in the decision.
    Unconfigured,
    /// The trigger's condition is satisfied.
    Matched,
    /// The trigger is configured but its condition is not satisfied.
    NotMatched,
}

impl TriggerMatch {
    /// Returns `true` if this result blocks the composite gate.
    pub fn is_blocking(self) -> bool {
        self == Self::NotMatched
    }
}

impl From<bool> for TriggerMatch {
    fn from(matched: bool) -> Self {
        if matched {
            Self::Matched
        } else {
            Self::NotMatched
        }
    }
}

/// Identifies a kind of trigger.
///
/// The declaration order is the order in which the composite gate evaluates triggers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// Matches visited URLs.
    Url,
    /// Matches captured events.
    Event,
    /// Matches a linked feature flag.
    Flag,
    /// Matches a per-session sampling roll.
    Sample,
}

impl TriggerKind {
    /// Returns the string identifier of the trigger kind.
    pub fn name(self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::Event => "event",
            Self::Flag => "flag",
            Self::Sample => "sample",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// A tri-state condition evaluated per session.
///
/// Implementations keep their own state, updated from host notifications, and evaluate
/// synchronously. Evaluation never fails: every error degrades to [`TriggerMatch::NotMatched`] or
/// is logged and ignored.
pub trait Trigger: Send + Sync {
    /// The kind of this trigger.
    fn kind(&self) -> TriggerKind;

    /// Evaluates the trigger for `session_id`.
    ///
    /// A configured trigger evaluated without a session returns [`TriggerMatch::NotMatched`]. This
    /// may record a decision for the session, such as the outcome of a sampling roll.
    fn matches(&self, session_id: Option<&str>) -> TriggerMatch;

    /// Reports the trigger's current result for `session_id` without changing any state.
    fn status(&self, session_id: Option<&str>) -> TriggerStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bool() {
        assert_eq!(TriggerMatch::from(true), TriggerMatch::Matched);
        assert_eq!(TriggerMatch::from(false), TriggerMatch::NotMatched);
    }

    #[test]
    fn test_only_not_matched_blocks() {
        assert!(!TriggerMatch::Unconfigured.is_blocking());
        assert!(!TriggerMatch::Matched.is_blocking());
        assert!(TriggerMatch::NotMatched.is_blocking());
    }

    #[test]
    fn test_kind_order() {
        let mut kinds = vec![
            TriggerKind::Sample,
            TriggerKind::Flag,
            TriggerKind::Url,
            TriggerKind::Event,
        ];
        kinds.sort();
        assert_eq!(
            kinds,
            [
                TriggerKind::Url,
                TriggerKind::Event,
                TriggerKind::Flag,
                TriggerKind::Sample
            ]
        );
    }
}
