//! Scenario files replayed against an in-memory host.

use std::collections::BTreeMap;

use capture_gate_triggers::host::FlagValues;
use capture_gate_triggers::memory::MemoryStore;
use capture_gate_triggers::{CompositeTrigger, GateConfig, GateOptions, MemoryHost, StatusReport};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single interaction with the host.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Navigates to the given URL.
    Navigate(String),
    /// Captures an event with the given name.
    Event(String),
    /// Publishes a flag computation.
    Flags(FlagValues),
    /// Starts a new session, or ends the current one with `null`.
    Session(Option<String>),
    /// Applies a new remote configuration.
    Reinit(GateConfig),
    /// Asks the gate for a decision and records a status report.
    Check,
}

/// A scripted sequence of host interactions.
///
/// ```yaml
/// url: https://example.com/
/// session: s1
/// config:
///   eventTriggers: [my-event]
/// steps:
///   - check
///   - event: my-event
///   - check
/// ```
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// The URL the host starts at.
    pub url: Option<String>,
    /// The session active when the gate is created.
    pub session: Option<String>,
    /// Local options of the gate.
    pub options: GateOptions,
    /// The initial remote configuration.
    pub config: GateConfig,
    /// The interactions to replay.
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Parses a scenario from YAML or JSON.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

/// The outcome of a [`Step::Check`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CheckResult {
    /// The position of the check in the step list, starting at zero.
    pub step: usize,
    /// Whether capture is active.
    pub capture: bool,
    /// The state of every trigger after the decision.
    #[serde(flatten)]
    pub report: StatusReport,
}

/// Replays `scenario` on a host whose store holds `state`.
///
/// Returns one result per check and the store contents after the last step.
pub fn replay(
    scenario: &Scenario,
    state: BTreeMap<String, Value>,
) -> (Vec<CheckResult>, BTreeMap<String, Value>) {
    let host = MemoryHost::with_store(
        scenario.url.as_deref(),
        scenario.session.as_deref(),
        MemoryStore::from_values(state),
    );

    let gate = CompositeTrigger::new(host.host(), scenario.options.clone());
    gate.init(&scenario.config);

    capture_gate_log::info!(steps = scenario.steps.len(), "replaying scenario");

    let mut results = Vec::new();
    for (index, step) in scenario.steps.iter().enumerate() {
        capture_gate_log::debug!(index, ?step, "replaying step");

        match step {
            Step::Navigate(url) => host.navigate(url),
            Step::Event(name) => host.capture(name),
            Step::Flags(values) => host.compute_flags(values),
            Step::Session(Some(id)) => host.start_session(id),
            Step::Session(None) => host.session.clear(),
            Step::Reinit(config) => gate.init(config),
            Step::Check => results.push(CheckResult {
                step: index,
                capture: gate.should_capture(),
                report: gate.status(),
            }),
        }
    }

    (results, host.store.values())
}
