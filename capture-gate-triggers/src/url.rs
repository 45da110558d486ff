//! Trigger activated by visiting a URL.

use std::sync::Arc;

use capture_gate_log::LogError;
use parking_lot::Mutex;

use crate::config::{UrlMatching, UrlTriggerConfig};
use crate::emitter::Subscription;
use crate::host::{self, Host, NavigationSource, SessionIdProvider};
use crate::pattern::{self, UrlPatterns};
use crate::persistence::PersistenceHelper;
use crate::status::TriggerStatus;
use crate::trigger::{Trigger, TriggerKind, TriggerMatch};

struct UrlState {
    navigation: Arc<dyn NavigationSource>,
    session: Arc<dyn SessionIdProvider>,
    persistence: PersistenceHelper,
    patterns: Mutex<UrlPatterns>,
    last_checked: Mutex<Option<String>>,
}

impl UrlState {
    /// Checks the current URL and records a match for the current session.
    fn check_url(&self) {
        let Some(url) = self.navigation.current_url() else {
            return;
        };

        {
            let mut last_checked = self.last_checked.lock();
            if last_checked.as_deref() == Some(url.as_str()) {
                return;
            }
            *last_checked = Some(url.clone());
        }

        if !self.patterns.lock().is_match(&url) {
            return;
        }

        let Some(session_id) = host::active_session_id(&*self.session) else {
            capture_gate_log::debug!(
                url = %url,
                "url trigger matched without an active session"
            );
            return;
        };

        capture_gate_log::debug!(session_id = %session_id, url = %url, "url trigger matched");
        self.persistence.set_triggered(&session_id);
    }
}

/// Matches once the session has visited a URL matching one of the configured patterns.
///
/// The current URL is checked when the trigger is initialized and after every navigation. A
/// match is recorded for the session active at that moment and stays in effect for the rest of
/// the session, even after navigating away.
pub struct UrlTrigger {
    state: Arc<UrlState>,
    subscription: Mutex<Option<Subscription>>,
}

impl UrlTrigger {
    /// Creates an unconfigured trigger persisting its decisions through `persistence`.
    pub fn new(host: &Host, persistence: PersistenceHelper) -> Self {
        Self {
            state: Arc::new(UrlState {
                navigation: Arc::clone(&host.navigation),
                session: Arc::clone(&host.session),
                persistence,
                patterns: Mutex::new(UrlPatterns::new()),
                last_checked: Mutex::new(None),
            }),
            subscription: Mutex::new(None),
        }
    }

    /// Replaces the configured patterns.
    ///
    /// Invalid patterns and unsupported matching kinds are logged and skipped. The navigation
    /// listener is registered on the first initialization with at least one usable pattern and
    /// kept afterwards.
    pub fn init(&self, triggers: &[UrlTriggerConfig]) {
        let mut patterns = UrlPatterns::new();

        for trigger in triggers {
            if trigger.matching == UrlMatching::Unsupported {
                capture_gate_log::warn!(
                    pattern = %trigger.url,
                    "skipping unsupported url trigger"
                );
                continue;
            }

            match pattern::compile(&trigger.url) {
                Ok(regex) => patterns.push(regex),
                Err(error) => {
                    capture_gate_log::warn!("skipping url trigger: {}", LogError(&error));
                }
            }
        }

        let configured = !patterns.is_empty();
        *self.state.patterns.lock() = patterns;
        *self.state.last_checked.lock() = None;

        if !configured {
            return;
        }

        self.subscribe();
        self.state.check_url();
    }

    fn subscribe(&self) {
        let mut subscription = self.subscription.lock();
        if subscription.is_some() {
            return;
        }

        let state = Arc::clone(&self.state);
        *subscription = Some(self.state.navigation.on_navigation_change(Box::new(
            move |change| {
                capture_gate_log::trace!(?change, "navigation changed");
                state.check_url();
            },
        )));
    }

    fn is_configured(&self) -> bool {
        !self.state.patterns.lock().is_empty()
    }
}

impl Trigger for UrlTrigger {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Url
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
            TriggerMatch::Matched => "visited a matching url in this session".to_owned(),
            TriggerMatch::NotMatched => {
                let patterns = self.state.patterns.lock();
                let sources: Vec<_> = patterns.sources().collect();
                format!("waiting for a url matching: {}", sources.join(", "))
            }
        };

        TriggerStatus::new(self.kind(), result, description)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use similar_asserts::assert_eq;

    use super::*;
    use crate::host::{NavigationChange, PropertyStore};
    use crate::memory::MemoryHost;

    fn trigger(host: &MemoryHost) -> UrlTrigger {
        let persistence = PersistenceHelper::new(host.store.clone(), "$gate_url");
        UrlTrigger::new(&host.host(), persistence)
    }

    #[test]
    fn test_unconfigured() {
        let host = MemoryHost::new(Some("https://example.com/trigger"), Some("s1"));
        let trigger = trigger(&host);

        assert_eq!(trigger.matches(Some("s1")), TriggerMatch::Unconfigured);
        trigger.init(&[]);
        assert_eq!(trigger.matches(Some("s1")), TriggerMatch::Unconfigured);
        assert_eq!(trigger.matches(None), TriggerMatch::Unconfigured);
        assert_eq!(host.navigation.listener_count(), 0);
    }

    #[test]
    fn test_navigation_is_sticky() {
        let host = MemoryHost::new(Some("https://example.com/"), Some("s1"));
        let trigger = trigger(&host);
        trigger.init(&[UrlTriggerConfig::regex("/trigger")]);

        assert_eq!(trigger.matches(Some("s1")), TriggerMatch::NotMatched);

        host.navigate("https://example.com/trigger");
        assert_eq!(trigger.matches(Some("s1")), TriggerMatch::Matched);

        host.navigate("https://example.com/other");
        assert_eq!(trigger.matches(Some("s1")), TriggerMatch::Matched);
    }

    #[test]
    fn test_matches_current_url_on_init() {
        let host = MemoryHost::new(Some("https://example.com/trigger"), Some("s1"));
        let trigger = trigger(&host);
        trigger.init(&[UrlTriggerConfig::regex("/trigger")]);

        assert_eq!(trigger.matches(Some("s1")), TriggerMatch::Matched);
        assert_eq!(
            host.store.get("$gate_url_session"),
            Some(json!({"sessionId": "s1", "state": "triggered"}))
        );
    }

    #[test]
    fn test_records_session_at_navigation_time() {
        let host = MemoryHost::new(Some("https://example.com/"), Some("s1"));
        let trigger = trigger(&host);
        trigger.init(&[UrlTriggerConfig::regex("/trigger")]);

        host.start_session("s2");
        host.navigate("https://example.com/trigger");

        assert_eq!(trigger.matches(Some("s1")), TriggerMatch::NotMatched);
        assert_eq!(trigger.matches(Some("s2")), TriggerMatch::Matched);
    }

    #[test]
    fn test_session_isolation() {
        let host = MemoryHost::new(Some("https://example.com/trigger"), Some("s1"));
        let trigger = trigger(&host);
        trigger.init(&[UrlTriggerConfig::regex("/trigger")]);

        assert_eq!(trigger.matches(Some("s1")), TriggerMatch::Matched);
        assert_eq!(trigger.matches(Some("s2")), TriggerMatch::NotMatched);
        assert_eq!(trigger.matches(None), TriggerMatch::NotMatched);
    }

    #[test]
    fn test_subscribes_once() {
        let host = MemoryHost::new(Some("https://example.com/"), Some("s1"));
        let trigger = trigger(&host);

        trigger.init(&[UrlTriggerConfig::regex("/a")]);
        trigger.init(&[UrlTriggerConfig::regex("/b")]);
        trigger.init(&[]);
        trigger.init(&[UrlTriggerConfig::regex("/c")]);

        assert_eq!(host.navigation.listener_count(), 1);

        drop(trigger);
        assert_eq!(host.navigation.listener_count(), 0);
    }

    #[test]
    fn test_reinit_replaces_patterns() {
        let host = MemoryHost::new(Some("https://example.com/"), Some("s1"));
        let trigger = trigger(&host);

        trigger.init(&[UrlTriggerConfig::regex("/a")]);
        trigger.init(&[UrlTriggerConfig::regex("/b")]);

        host.navigate("https://example.com/a");
        assert_eq!(trigger.matches(Some("s1")), TriggerMatch::NotMatched);

        host.navigate("https://example.com/b");
        assert_eq!(trigger.matches(Some("s1")), TriggerMatch::Matched);
    }

    #[test]
    fn test_invalid_patterns_are_skipped() {
        capture_gate_log::init_test!();

        let host = MemoryHost::new(Some("https://example.com/"), Some("s1"));
        let trigger = trigger(&host);
        trigger.init(&[
            UrlTriggerConfig::regex("/(broken"),
            UrlTriggerConfig {
                url: "/glob/*".to_owned(),
                matching: UrlMatching::Unsupported,
            },
            UrlTriggerConfig::regex("/valid"),
        ]);

        assert_eq!(trigger.matches(Some("s1")), TriggerMatch::NotMatched);
        host.navigate("https://example.com/valid");
        assert_eq!(trigger.matches(Some("s1")), TriggerMatch::Matched);
    }

    #[test]
    fn test_only_invalid_patterns_is_unconfigured() {
        let host = MemoryHost::new(Some("https://example.com/"), Some("s1"));
        let trigger = trigger(&host);
        trigger.init(&[UrlTriggerConfig::regex("[")]);

        assert_eq!(trigger.matches(Some("s1")), TriggerMatch::Unconfigured);
    }

    #[test]
    fn test_same_url_is_checked_once() {
        let host = MemoryHost::new(Some("https://example.com/"), Some("s1"));
        let trigger = trigger(&host);
        trigger.init(&[UrlTriggerConfig::regex("/trigger")]);

        host.navigate("https://example.com/trigger");
        host.store
            .set_property("$gate_url_session", json!({"sessionId": "s0", "state": "triggered"}))
            .unwrap();

        // The URL did not change, so nothing is recorded for the new session.
        host.start_session("s2");
        host.navigation
            .navigate_with("https://example.com/trigger", NavigationChange::Replace);
        assert_eq!(
            host.store.get("$gate_url_session"),
            Some(json!({"sessionId": "s0", "state": "triggered"}))
        );
        assert_eq!(trigger.matches(Some("s2")), TriggerMatch::NotMatched);
    }

    #[test]
    fn test_status() {
        let host = MemoryHost::new(Some("https://example.com/"), Some("s1"));
        let trigger = trigger(&host);
        trigger.init(&[
            UrlTriggerConfig::regex("/trigger"),
            UrlTriggerConfig::regex("/other"),
        ]);

        assert_eq!(
            trigger.status(Some("s1")).description,
            "waiting for a url matching: /trigger, /other"
        );

        host.navigate("https://example.com/trigger");
        assert_eq!(
            trigger.status(Some("s1")).description,
            "visited a matching url in this session"
        );
    }
}
