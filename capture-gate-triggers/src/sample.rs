//! Trigger including a random fraction of sessions.

use parking_lot::Mutex;
use rand::Rng;
use rand_pcg::Pcg32;
use uuid::Uuid;

use crate::config::Dice;
use crate::persistence::{PersistenceHelper, TriState};
use crate::status::TriggerStatus;
use crate::trigger::{Trigger, TriggerKind, TriggerMatch};

/// Maps a session id onto a UUID used to seed the generator.
///
/// Session ids that are UUIDs are used as-is, anything else is hashed into a name-based UUID.
fn session_uuid(session_id: &str) -> Uuid {
    Uuid::parse_str(session_id)
        .unwrap_or_else(|_| Uuid::new_v5(&Uuid::NAMESPACE_OID, session_id.as_bytes()))
}

/// Generates a pseudo random number in `[0, 1)` from the session id.
fn pseudo_random_from_session(session_id: &str) -> f64 {
    let big_seed = session_uuid(session_id).as_u128();
    let mut generator = Pcg32::new((big_seed >> 64) as u64, big_seed as u64);
    generator.random::<f64>()
}

/// Draws a number in `[0, 1)` for `session_id`.
fn roll(dice: Dice, session_id: &str) -> f64 {
    match dice {
        Dice::Random => rand::rng().random::<f64>(),
        Dice::SessionSeeded => pseudo_random_from_session(session_id),
    }
}

/// Validates a configured sample rate.
///
/// `NaN` disables sampling. Rates outside of `[0, 1]` are clamped.
fn normalize_rate(rate: Option<f64>) -> Option<f64> {
    let rate = rate?;

    if rate.is_nan() {
        capture_gate_log::warn!("ignoring sample rate that is not a number");
        return None;
    }

    if !(0.0..=1.0).contains(&rate) {
        let clamped = rate.clamp(0.0, 1.0);
        capture_gate_log::warn!(
            sample_rate = rate,
            clamped,
            "sample rate is outside of [0, 1]"
        );
        return Some(clamped);
    }

    Some(rate)
}

/// Includes a configured fraction of sessions.
///
/// The first evaluation for a session rolls the dice and persists the outcome, both inclusion and
/// exclusion. Every later evaluation for the same session returns the persisted outcome, so a
/// session is never re-rolled, even after a reload or a change of the sample rate. Concurrent
/// evaluations of an undecided session roll once and agree on the outcome.
pub struct SampleTrigger {
    dice: Dice,
    persistence: PersistenceHelper,
    rate: Mutex<Option<f64>>,
    deciding: Mutex<()>,
}

impl SampleTrigger {
    /// Creates an unconfigured trigger persisting its decisions through `persistence`.
    pub fn new(persistence: PersistenceHelper, dice: Dice) -> Self {
        Self {
            dice,
            persistence,
            rate: Mutex::new(None),
            deciding: Mutex::new(()),
        }
    }

    /// Sets the sample rate, or disables sampling with `None`.
    pub fn init(&self, rate: Option<f64>) {
        *self.rate.lock() = normalize_rate(rate);
    }

    /// Returns the effective sample rate.
    pub fn rate(&self) -> Option<f64> {
        *self.rate.lock()
    }

    fn decide(&self, session_id: &str, rate: f64) -> bool {
        let random_number = roll(self.dice, session_id);
        let included = random_number < rate;

        capture_gate_log::debug!(
            session_id,
            sample_rate = rate,
            random_number,
            included,
            "rolled sampling decision"
        );

        let state = if included {
            TriState::Triggered
        } else {
            TriState::ExplicitlyDisabled
        };
        self.persistence.set_decision(session_id, state);

        included
    }
}

impl Trigger for SampleTrigger {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Sample
    }

    fn matches(&self, session_id: Option<&str>) -> TriggerMatch {
        let Some(rate) = self.rate() else {
            return TriggerMatch::Unconfigured;
        };

        let Some(session_id) = session_id else {
            return TriggerMatch::NotMatched;
        };

        // A session is looked up and rolled under one lock so it is decided once.
        let _deciding = self.deciding.lock();

        match self.persistence.decision(session_id) {
            Some(TriState::Triggered) => TriggerMatch::Matched,
            Some(TriState::ExplicitlyDisabled) => TriggerMatch::NotMatched,
            Some(TriState::NotTriggeredYet) | None => self.decide(session_id, rate).into(),
        }
    }

    fn status(&self, session_id: Option<&str>) -> TriggerStatus {
        let Some(rate) = self.rate() else {
            return TriggerStatus::unconfigured(self.kind());
        };

        let Some(session_id) = session_id else {
            return TriggerStatus::new(self.kind(), TriggerMatch::NotMatched, "no active session");
        };

        let (result, description) = match self.persistence.decision(session_id) {
            Some(TriState::Triggered) => (TriggerMatch::Matched, "sampled in"),
            Some(TriState::ExplicitlyDisabled) => (TriggerMatch::NotMatched, "sampled out"),
            Some(TriState::NotTriggeredYet) | None => (TriggerMatch::NotMatched, "undecided"),
        };

        TriggerStatus::new(
            self.kind(),
            result,
            format!("{description} at sample rate {rate}"),
        )
    }
}
