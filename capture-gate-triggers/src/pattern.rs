//! Compiled URL patterns shared across triggers.

use std::num::NonZeroUsize;

use lru::LruCache;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;

const REGEX_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(500) {
    Some(size) => size,
    None => unreachable!(),
};

static REGEX_CACHE: Lazy<Mutex<LruCache<String, Regex>>> =
    Lazy::new(|| Mutex::new(LruCache::new(REGEX_CACHE_SIZE)));

/// Raised when a configured URL pattern cannot be compiled.
#[derive(Debug, thiserror::Error)]
#[error("invalid url pattern {pattern:?}")]
pub struct PatternError {
    pattern: String,
    #[source]
    source: regex::Error,
}

impl PatternError {
    /// Returns the pattern that failed to compile.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// Compiles `pattern`, reusing a previous compilation of the same pattern string.
///
/// Only valid patterns are cached, so a broken pattern reports its error every time.
pub fn compile(pattern: &str) -> Result<Regex, PatternError> {
    let mut cache = REGEX_CACHE.lock();

    if let Some(regex) = cache.get(pattern) {
        return Ok(regex.clone());
    }

    let regex = Regex::new(pattern).map_err(|source| PatternError {
        pattern: pattern.to_owned(),
        source,
    })?;

    cache.put(pattern.to_owned(), regex.clone());
    Ok(regex)
}

/// A set of compiled URL patterns.
///
/// A URL matches if any of the patterns is found anywhere in it. Patterns are not anchored, so
/// `/checkout` matches `https://example.com/checkout?step=2`.
#[derive(Clone, Debug, Default)]
pub struct UrlPatterns {
    patterns: Vec<Regex>,
}

impl UrlPatterns {
    /// Creates an empty set, which matches nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a compiled pattern.
    pub fn push(&mut self, regex: Regex) {
        self.patterns.push(regex);
    }

    /// Returns `true` if no patterns are configured.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Returns the number of configured patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Returns the source strings of all patterns.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Regex::as_str)
    }

    /// Returns `true` if any pattern matches `url`.
    pub fn is_match(&self, url: &str) -> bool {
        self.patterns.iter().any(|regex| regex.is_match(url))
    }
}
