use std::collections::BTreeMap;

use capture_gate_triggers::host::{FlagValue, FlagValues};
use capture_gate_triggers::memory::MemoryStore;
use capture_gate_triggers::{
    CompositeTrigger, Dice, GateConfig, GateOptions, MemoryHost, StatusReport, TriggerKind,
    TriggerMatch,
};
use insta::assert_json_snapshot;
use serde_json::json;
use similar_asserts::assert_eq;

fn gate(host: &MemoryHost, config: &str) -> CompositeTrigger {
    let gate = CompositeTrigger::new(host.host(), GateOptions::default());
    gate.init(&GateConfig::from_json(config).unwrap());
    gate
}

fn flag(key: &str, value: impl Into<FlagValue>) -> FlagValues {
    FlagValues::from([(key.to_owned(), value.into())])
}

fn result_of(report: &StatusReport, kind: TriggerKind) -> TriggerMatch {
    report
        .triggers
        .iter()
        .find(|status| status.name == kind)
        .map(|status| status.result)
        .unwrap()
}

#[test]
fn test_url_scenario() {
    capture_gate_log::init_test!();

    let host = MemoryHost::new(Some("https://example.com/"), Some("s1"));
    let gate = gate(
        &host,
        r#"{"urlTriggers": [{"url": "/trigger", "matching": "regex"}]}"#,
    );

    assert!(!gate.matches());
    host.navigate("https://example.com/trigger");
    assert!(gate.matches());
    host.navigate("https://example.com/other");
    assert!(gate.matches());
}

#[test]
fn test_event_scenario() {
    let host = MemoryHost::new(Some("https://example.com/"), Some("s1"));
    let gate = gate(&host, r#"{"eventTriggers": ["my-event"]}"#);

    host.capture("other");
    assert!(!gate.matches());
    host.capture("my-event");
    assert!(gate.matches());
}

#[test]
fn test_flag_scenario() {
    let host = MemoryHost::new(Some("https://example.com/"), Some("s1"));
    let gate = gate(
        &host,
        r#"{"linkedFeatureFlag": {"key": "f", "variant": "control"}}"#,
    );

    host.compute_flags(&flag("f", "control"));
    assert!(gate.matches());
    host.compute_flags(&flag("f", "test"));
    assert!(!gate.matches());
}

#[test]
fn test_sample_rate_bounds() {
    let host = MemoryHost::new(Some("https://example.com/"), Some("s1"));
    let always = gate(&host, r#"{"sampleRate": 1}"#);
    let never = CompositeTrigger::new(
        host.host(),
        GateOptions {
            persistence_prefix: "$never".to_owned(),
            dice: Dice::Random,
        },
    );
    never.init(&GateConfig::from_json(r#"{"sampleRate": 0}"#).unwrap());

    for index in 0..100 {
        host.start_session(&format!("session-{index}"));
        assert!(always.matches());
        assert!(!never.matches());
    }
}

#[test]
fn test_sample_is_stable_per_session() {
    let host = MemoryHost::new(Some("https://example.com/"), Some("s1"));
    let gate = gate(&host, r#"{"sampleRate": 0.5}"#);

    let first = gate.matches();
    for _ in 0..10 {
        assert_eq!(gate.matches(), first);
    }
}

#[test]
fn test_session_isolation() {
    let host = MemoryHost::new(Some("https://example.com/trigger"), Some("a"));
    let gate = gate(
        &host,
        r#"{"urlTriggers": [{"url": "/trigger"}], "eventTriggers": ["my-event"]}"#,
    );

    host.capture("my-event");
    assert!(gate.matches());

    host.start_session("b");
    assert!(!gate.matches());
    assert!(gate.matches_session(Some("a")));
}

#[test]
fn test_reload_restores_decisions() {
    let config = r#"{"eventTriggers": ["my-event"], "sampleRate": 1}"#;

    let host = MemoryHost::new(Some("https://example.com/"), Some("s1"));
    let first = gate(&host, config);
    host.capture("my-event");
    assert!(first.matches());

    let persisted: BTreeMap<_, _> = host.store.values();
    drop(first);

    let reloaded = MemoryHost::with_store(
        Some("https://example.com/"),
        Some("s1"),
        MemoryStore::from_values(persisted),
    );
    let second = gate(&reloaded, r#"{"eventTriggers": ["my-event"], "sampleRate": 0}"#);
    assert!(second.matches());

    reloaded.start_session("s2");
    assert!(!second.matches());
}

#[test]
fn test_persisted_layout() {
    let host = MemoryHost::new(Some("https://example.com/trigger"), Some("s1"));
    let gate = gate(
        &host,
        r#"{
            "urlTriggers": [{"url": "/trigger"}],
            "eventTriggers": ["my-event"],
            "linkedFeatureFlag": {"key": "f"},
            "sampleRate": 1
        }"#,
    );

    host.capture("my-event");
    host.compute_flags(&flag("f", true));
    assert!(gate.matches());

    assert_eq!(
        serde_json::to_value(host.store.values()).unwrap(),
        json!({
            "$capture_gate_event_session": {"sessionId": "s1", "state": "triggered"},
            "$capture_gate_sample_session": {"sessionId": "s1", "state": "triggered"},
            "$capture_gate_url_session": {"sessionId": "s1", "state": "triggered"},
        })
    );
}

#[test]
fn test_flag_reinit_registers_once() {
    let host = MemoryHost::new(Some("https://example.com/"), Some("s1"));
    let config = r#"{"linkedFeatureFlag": {"key": "f"}}"#;
    let gate = gate(&host, config);
    gate.init(&GateConfig::from_json(config).unwrap());

    assert_eq!(host.flags.listener_count(), 1);
}

#[test]
fn test_status_report() {
    let host = MemoryHost::new(Some("https://example.com/"), Some("s1"));
    let gate = gate(
        &host,
        r#"{
            "urlTriggers": [{"url": "/checkout"}, {"url": "/cart"}],
            "linkedFeatureFlag": {"key": "f"},
            "sampleRate": 1
        }"#,
    );
    host.compute_flags(&flag("f", true));

    let report = gate.status();
    assert_eq!(result_of(&report, TriggerKind::Event), TriggerMatch::Unconfigured);
    assert_eq!(result_of(&report, TriggerKind::Flag), TriggerMatch::Matched);

    assert_json_snapshot!(report, @r###"
    {
      "sessionId": "s1",
      "overall": false,
      "triggers": [
        {
          "name": "url",
          "result": "not_matched",
          "description": "waiting for a url matching: /checkout, /cart"
        },
        {
          "name": "event",
          "result": "unconfigured",
          "description": "not configured"
        },
        {
          "name": "flag",
          "result": "matched",
          "description": "flag f is true"
        },
        {
          "name": "sample",
          "result": "not_matched",
          "description": "undecided at sample rate 1"
        }
      ]
    }
    "###);
}
