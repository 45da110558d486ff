//! Session-scoped triggers deciding whether a capture feature is active.
//!
//! A host SDK creates one [`CompositeTrigger`] per capture feature (for example session
//! recording), passing in its collaborators through [`Host`]. The remote configuration is applied
//! with [`CompositeTrigger::init`], after which the gate listens to navigations, captured events
//! and flag computations on its own. The host asks [`CompositeTrigger::matches`] whenever it needs
//! to know if capture should run.
//!
//! # Triggers
//!
//! | Trigger           | Matches                                       | Sticky |
//! |-------------------|-----------------------------------------------|--------|
//! | [`UrlTrigger`]    | a visited URL matched a configured regex      | yes    |
//! | [`EventTrigger`]  | one of the configured events was captured     | yes    |
//! | [`FlagTrigger`]   | the linked feature flag is currently enabled  | no     |
//! | [`SampleTrigger`] | the session was included by a random roll     | yes    |
//!
//! Every trigger is tri-state (see [`TriggerMatch`]): unconfigured triggers are ignored and the
//! gate opens if no configured trigger is [`NotMatched`](TriggerMatch::NotMatched). Sticky
//! decisions are persisted per session in the host's [`PropertyStore`](host::PropertyStore), so
//! they survive reloads but never leak into another session.
//!
//! # Example
//!
//! ```
//! use capture_gate_triggers::{CompositeTrigger, GateConfig, GateOptions, MemoryHost};
//!
//! let host = MemoryHost::new(Some("https://example.com/"), Some("session-1"));
//! let gate = CompositeTrigger::new(host.host(), GateOptions::default());
//!
//! let config = GateConfig::from_json(r#"{"eventTriggers": ["checkout"]}"#).unwrap();
//! gate.init(&config);
//! assert!(!gate.should_capture());
//!
//! host.capture("checkout");
//! assert!(gate.should_capture());
//! ```
#![warn(missing_docs)]

mod composite;
mod config;
mod event;
mod flag;
mod sample;
mod status;
mod trigger;
mod url;

pub mod emitter;
pub mod host;
pub mod memory;
pub mod pattern;
pub mod persistence;

pub use self::composite::*;
pub use self::config::*;
pub use self::emitter::{Emitter, Listener, Subscription};
pub use self::event::*;
pub use self::flag::*;
pub use self::host::Host;
pub use self::memory::MemoryHost;
pub use self::persistence::{PersistenceHelper, TriState};
pub use self::sample::*;
pub use self::status::*;
pub use self::trigger::*;
pub use self::url::*;
