//! Diagnostic snapshots of the gate.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::trigger::{TriggerKind, TriggerMatch};

/// The state of a single trigger at the time of a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerStatus {
    /// The trigger this status belongs to.
    pub name: TriggerKind,
    /// The trigger's current result.
    pub result: TriggerMatch,
    /// Human-readable explanation of the result.
    pub description: String,
}

impl TriggerStatus {
    /// Creates a status entry.
    pub fn new(name: TriggerKind, result: TriggerMatch, description: impl Into<String>) -> Self {
        Self {
            name,
            result,
            description: description.into(),
        }
    }

    /// Creates the status of a trigger without configuration.
    pub fn unconfigured(name: TriggerKind) -> Self {
        Self::new(name, TriggerMatch::Unconfigured, "not configured")
    }
}

/// A snapshot of every trigger and the overall decision for one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// The session the snapshot was taken for.
    pub session_id: Option<String>,
    /// Whether the gate is open, meaning no configured trigger blocks.
    pub overall: bool,
    /// Per-trigger results in evaluation order.
    pub triggers: Vec<TriggerStatus>,
}

impl StatusReport {
    /// Builds a report, folding the overall decision from the trigger results.
    pub fn new(session_id: Option<String>, triggers: Vec<TriggerStatus>) -> Self {
        let overall = !triggers.iter().any(|status| status.result.is_blocking());
        Self {
            session_id,
            overall,
            triggers,
        }
    }

    /// Returns the first trigger blocking the gate, if any.
    pub fn blocked_by(&self) -> Option<&TriggerStatus> {
        self.triggers
            .iter()
            .find(|status| status.result.is_blocking())
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.overall { "capture" } else { "skip" };
        match self.session_id {
            Some(ref session_id) => writeln!(f, "session {session_id}: {verdict}")?,
            None => writeln!(f, "no session: {verdict}")?,
        }

        for status in &self.triggers {
            let result = match status.result {
                TriggerMatch::Unconfigured => "-",
                TriggerMatch::Matched => "yes",
                TriggerMatch::NotMatched => "no",
            };
            writeln!(f, "  {:<6} {result:<3} {}", status.name, status.description)?;
        }

        Ok(())
    }
}
