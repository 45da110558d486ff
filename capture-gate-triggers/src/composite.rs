//! The gate combining all triggers.

use std::sync::Arc;

use crate::config::{GateConfig, GateOptions};
use crate::event::EventTrigger;
use crate::flag::FlagTrigger;
use crate::host::{self, Host, SessionIdProvider};
use crate::persistence::PersistenceHelper;
use crate::sample::SampleTrigger;
use crate::status::StatusReport;
use crate::trigger::{Trigger, TriggerMatch};
use crate::url::UrlTrigger;

/// Decides whether capture is active for the current session.
///
/// The gate owns one trigger of every kind and opens if none of the configured triggers blocks.
/// Triggers are evaluated in a fixed order (URL, event, flag, sample) and evaluation stops at the
/// first blocking trigger. In particular, a session blocked by an earlier trigger is never
/// sampled.
///
/// Dropping the gate detaches all of its listeners from the host.
pub struct CompositeTrigger {
    session: Arc<dyn SessionIdProvider>,
    url: UrlTrigger,
    event: EventTrigger,
    flag: FlagTrigger,
    sample: SampleTrigger,
}

impl CompositeTrigger {
    /// Creates a gate without any configured trigger, which is always open.
    pub fn new(host: Host, options: GateOptions) -> Self {
        let persistence =
            PersistenceHelper::new(Arc::clone(&host.store), options.persistence_prefix);

        Self {
            url: UrlTrigger::new(&host, persistence.with_prefix("url")),
            event: EventTrigger::new(&host, persistence.with_prefix("event")),
            flag: FlagTrigger::new(&host),
            sample: SampleTrigger::new(persistence.with_prefix("sample"), options.dice),
            session: host.session,
        }
    }

    /// Applies a trigger configuration.
    ///
    /// This can be called again whenever the remote configuration changes. Triggers missing from
    /// `config` become unconfigured. Decisions already persisted for the current session are kept.
    pub fn init(&self, config: &GateConfig) {
        capture_gate_log::debug!(
            url_triggers = config.url_triggers.len(),
            event_triggers = config.event_triggers.len(),
            linked_flag = config.linked_feature_flag.is_some(),
            sample_rate = ?config.sample_rate,
            "configuring capture gate"
        );

        self.url.init(&config.url_triggers);
        self.event.init(&config.event_triggers);
        self.flag.init(config.linked_feature_flag.as_ref());
        self.sample.init(config.sample_rate);
    }

    /// Returns all triggers in evaluation order.
    pub fn triggers(&self) -> [&dyn Trigger; 4] {
        [&self.url, &self.event, &self.flag, &self.sample]
    }

    /// Returns the current session id reported by the host.
    ///
    /// An empty id reported by the host counts as no active session.
    pub fn session_id(&self) -> Option<String> {
        host::active_session_id(&*self.session)
    }

    /// Returns `true` if capture is active for the current session.
    pub fn matches(&self) -> bool {
        self.matches_session(self.session_id().as_deref())
    }

    /// Returns `true` if capture is active for the current session.
    ///
    /// Alias of [`matches`](Self::matches).
    pub fn should_capture(&self) -> bool {
        self.matches()
    }

    /// Returns `true` if capture is active for `session_id`.
    pub fn matches_session(&self, session_id: Option<&str>) -> bool {
        let session_id = session_id.filter(|id| !id.is_empty());

        for trigger in self.triggers() {
            match trigger.matches(session_id) {
                TriggerMatch::Unconfigured | TriggerMatch::Matched => continue,
                TriggerMatch::NotMatched => {
                    capture_gate_log::debug!(
                        session_id,
                        trigger = %trigger.kind(),
                        "capture blocked by trigger"
                    );
                    return false;
                }
            }
        }

        true
    }

    /// Reports the state of every trigger for the current session.
    ///
    /// Unlike [`matches`](Self::matches), this evaluates every trigger and never changes any
    /// state. A session that has not been sampled yet is reported as undecided.
    pub fn status(&self) -> StatusReport {
        let session_id = self.session_id();
        let triggers = self
            .triggers()
            .iter()
            .map(|trigger| trigger.status(session_id.as_deref()))
            .collect();

        StatusReport::new(session_id, triggers)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use similar_asserts::assert_eq;

    use super::*;
    use crate::config::{Dice, LinkedFlag, UrlTriggerConfig};
    use crate::host::{FlagValue, FlagValues};
    use crate::memory::MemoryHost;
    use crate::trigger::TriggerKind;

    fn gate(host: &MemoryHost) -> CompositeTrigger {
        CompositeTrigger::new(host.host(), GateOptions::default())
    }

    fn flags(key: &str, value: FlagValue) -> FlagValues {
        FlagValues::from([(key.to_owned(), value)])
    }

    #[test]
    fn test_unconfigured_gate_is_open() {
        let host = MemoryHost::new(Some("https://example.com/"), Some("s1"));
        let gate = gate(&host);

        assert!(gate.matches());
        gate.init(&GateConfig::default());
        assert!(gate.should_capture());
        assert!(host.store.values().is_empty());
    }

    #[test]
    fn test_all_triggers_must_match() {
        let host = MemoryHost::new(Some("https://example.com/"), Some("s1"));
        let gate = gate(&host);
        gate.init(&GateConfig {
            url_triggers: vec![UrlTriggerConfig::regex("/checkout")],
            event_triggers: vec!["purchase".to_owned()],
            linked_feature_flag: Some(LinkedFlag::new("capture")),
            sample_rate: Some(1.0),
        });

        assert!(!gate.matches());
        host.navigate("https://example.com/checkout");
        assert!(!gate.matches());
        host.capture("purchase");
        assert!(!gate.matches());
        host.compute_flags(&flags("capture", true.into()));
        assert!(gate.matches());

        host.compute_flags(&flags("capture", false.into()));
        assert!(!gate.matches());
    }

    #[test]
    fn test_blocking_trigger_short_circuits() {
        let host = MemoryHost::new(Some("https://example.com/"), Some("s1"));
        let gate = gate(&host);
        gate.init(&GateConfig {
            event_triggers: vec!["my-event".to_owned()],
            sample_rate: Some(1.0),
            ..Default::default()
        });

        assert!(!gate.matches());
        assert_eq!(host.store.get("$capture_gate_sample_session"), None);

        host.capture("my-event");
        assert!(gate.matches());
        assert_eq!(
            host.store.get("$capture_gate_sample_session"),
            Some(json!({"sessionId": "s1", "state": "triggered"}))
        );
    }

    #[test]
    fn test_persistence_prefix() {
        let host = MemoryHost::new(Some("https://example.com/trigger"), Some("s1"));
        let options = GateOptions {
            persistence_prefix: "$replay".to_owned(),
            dice: Dice::SessionSeeded,
        };
        let gate = CompositeTrigger::new(host.host(), options);
        gate.init(&GateConfig {
            url_triggers: vec![UrlTriggerConfig::regex("/trigger")],
            ..Default::default()
        });

        assert!(gate.matches());
        assert_eq!(
            host.store.values().into_keys().collect::<Vec<_>>(),
            ["$replay_url_session"]
        );
    }

    #[test]
    fn test_without_session() {
        let host = MemoryHost::new(Some("https://example.com/"), None);
        let gate = gate(&host);
        assert!(gate.matches());

        gate.init(&GateConfig {
            sample_rate: Some(1.0),
            ..Default::default()
        });
        assert!(!gate.matches());
        assert!(host.store.values().is_empty());
    }

    #[test]
    fn test_empty_session_id() {
        let host = MemoryHost::new(Some("https://example.com/"), Some(""));
        let gate = gate(&host);
        gate.init(&GateConfig {
            event_triggers: vec!["my-event".to_owned()],
            sample_rate: Some(1.0),
            ..Default::default()
        });

        host.capture("my-event");
        assert_eq!(gate.session_id(), None);
        assert!(!gate.matches());
        assert!(!gate.matches_session(Some("")));
        assert!(host.store.values().is_empty());
    }

    #[test]
    fn test_reinit_drops_triggers() {
        let host = MemoryHost::new(Some("https://example.com/"), Some("s1"));
        let gate = gate(&host);

        gate.init(&GateConfig {
            event_triggers: vec!["my-event".to_owned()],
            ..Default::default()
        });
        assert!(!gate.matches());

        gate.init(&GateConfig::default());
        assert!(gate.matches());
    }

    #[test]
    fn test_status_does_not_sample() {
        let host = MemoryHost::new(Some("https://example.com/"), Some("s1"));
        let gate = gate(&host);
        gate.init(&GateConfig {
            sample_rate: Some(1.0),
            ..Default::default()
        });

        let report = gate.status();
        assert!(!report.overall);
        assert_eq!(report.blocked_by().map(|status| status.name), Some(TriggerKind::Sample));
        assert!(host.store.values().is_empty());

        assert!(gate.matches());
        assert!(gate.status().overall);
    }

    #[test]
    fn test_drop_detaches_listeners() {
        let host = MemoryHost::new(Some("https://example.com/"), Some("s1"));
        let gate = gate(&host);
        gate.init(&GateConfig {
            url_triggers: vec![UrlTriggerConfig::regex("/a")],
            event_triggers: vec!["e".to_owned()],
            linked_feature_flag: Some(LinkedFlag::new("f")),
            sample_rate: None,
        });

        assert_eq!(host.navigation.listener_count(), 1);
        assert_eq!(host.events.listener_count(), 1);
        assert_eq!(host.flags.listener_count(), 1);

        drop(gate);
        assert_eq!(host.navigation.listener_count(), 0);
        assert_eq!(host.events.listener_count(), 0);
        assert_eq!(host.flags.listener_count(), 0);
    }
}
