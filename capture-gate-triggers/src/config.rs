//! Remote trigger configuration and local engine options.

use serde::{Deserialize, Deserializer, Serialize};

use crate::pattern::{self, PatternError};

/// The default root prefix of all persisted keys.
pub const DEFAULT_PERSISTENCE_PREFIX: &str = "$capture_gate";

/// Errors raised while loading or validating a [`GateConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration is not valid JSON or has the wrong shape.
    #[error("failed to parse gate configuration")]
    Json(#[from] serde_json::Error),

    /// A URL pattern does not compile.
    #[error(transparent)]
    InvalidPattern(#[from] PatternError),

    /// A URL trigger uses a matching kind other than `regex`.
    #[error("unsupported matching kind for url trigger {0:?}")]
    UnsupportedMatching(String),

    /// The sample rate is not a probability.
    #[error("sample rate {0} is outside of [0, 1]")]
    InvalidSampleRate(f64),

    /// The linked feature flag has no key.
    #[error("linked feature flag has an empty key")]
    EmptyFlagKey,
}

/// How the pattern of a [`UrlTriggerConfig`] is interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlMatching {
    /// The pattern is a regular expression searched anywhere in the URL.
    #[default]
    Regex,
    /// A matching kind introduced after this version. Such triggers are skipped.
    #[serde(other)]
    Unsupported,
}

/// A single URL trigger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlTriggerConfig {
    /// The pattern matched against visited URLs.
    pub url: String,
    /// How `url` is interpreted.
    #[serde(default)]
    pub matching: UrlMatching,
}

impl UrlTriggerConfig {
    /// Creates a regex URL trigger.
    pub fn regex(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            matching: UrlMatching::Regex,
        }
    }
}

/// A feature flag the gate is linked to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkedFlag {
    /// The key of the flag.
    pub key: String,
    /// The variant the flag has to resolve to.
    ///
    /// If not set, any enabled boolean or non-empty variant matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl LinkedFlag {
    /// Links to a boolean or multivariate flag, matching any enabled value.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            variant: None,
        }
    }

    /// Links to a multivariate flag, matching only `variant`.
    pub fn with_variant(key: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            variant: Some(variant.into()),
        }
    }
}

/// The trigger configuration delivered by the remote configuration endpoint.
///
/// Every field is optional. A missing or `null` field leaves the corresponding trigger
/// unconfigured.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GateConfig {
    /// URL patterns, any of which activates capture once visited.
    #[serde(deserialize_with = "null_to_default")]
    pub url_triggers: Vec<UrlTriggerConfig>,

    /// Event names, any of which activates capture once captured.
    #[serde(deserialize_with = "null_to_default")]
    pub event_triggers: Vec<String>,

    /// A feature flag that has to be enabled for capture.
    pub linked_feature_flag: Option<LinkedFlag>,

    /// The fraction of sessions in which capture is active.
    pub sample_rate: Option<f64>,
}

impl GateConfig {
    /// Parses the configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Returns `true` if no trigger is configured, in which case the gate is always open.
    pub fn is_empty(&self) -> bool {
        self.url_triggers.is_empty()
            && self.event_triggers.is_empty()
            && self.linked_feature_flag.is_none()
            && self.sample_rate.is_none()
    }

    /// Lists every problem in the configuration.
    ///
    /// None of these are fatal. The triggers skip invalid patterns and unsupported matching kinds,
    /// clamp the sample rate and ignore a flag without key.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut problems = Vec::new();

        for trigger in &self.url_triggers {
            match trigger.matching {
                UrlMatching::Regex => {
                    if let Err(error) = pattern::compile(&trigger.url) {
                        problems.push(error.into());
                    }
                }
                UrlMatching::Unsupported => {
                    problems.push(ConfigError::UnsupportedMatching(trigger.url.clone()));
                }
            }
        }

        if let Some(ref flag) = self.linked_feature_flag
            && flag.key.is_empty()
        {
            problems.push(ConfigError::EmptyFlagKey);
        }

        if let Some(rate) = self.sample_rate
            && !(0.0..=1.0).contains(&rate)
        {
            problems.push(ConfigError::InvalidSampleRate(rate));
        }

        problems
    }
}

fn null_to_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

/// How the sample trigger draws its random value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dice {
    /// Draws from the thread-local random number generator.
    #[default]
    Random,
    /// Derives the value from the session id.
    ///
    /// Every process evaluating the same session with the same sample rate reaches the same
    /// decision, even without access to the persisted one.
    SessionSeeded,
}

/// Local options of the gate, fixed for the lifetime of the process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GateOptions {
    /// The root prefix of all keys the gate writes to the property store.
    pub persistence_prefix: String,
    /// How sampling decisions are drawn.
    pub dice: Dice,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            persistence_prefix: DEFAULT_PERSISTENCE_PREFIX.to_owned(),
            dice: Dice::default(),
        }
    }
}
