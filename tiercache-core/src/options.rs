//! Per-call options for reads, writes and invalidation.

use regex::Regex;
use std::fmt;
use std::time::Duration;

use crate::{CacheResult, ConfigError};

// ============================================================================
// READ / WRITE OPTIONS
// ============================================================================

/// Options for a cache read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Read only this tier instead of scanning all tiers.
    pub tier: Option<String>,
    /// Bump access time and hit counter on the entry found.
    pub touch: bool,
    /// Fire the refresh hook on a global miss.
    pub refresh: bool,
}

impl GetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = Some(tier.into());
        self
    }

    pub fn touch(mut self) -> Self {
        self.touch = true;
        self
    }

    pub fn refresh(mut self) -> Self {
        self.refresh = true;
        self
    }
}

/// Options for a cache write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOptions {
    pub ttl: Option<Duration>,
    /// Write only this tier instead of applying the fan-out strategy.
    pub tier: Option<String>,
    pub tags: Vec<String>,
    /// Keys whose invalidation must also remove this key.
    pub dependencies: Vec<String>,
    /// When false, a write over a live value is a silent no-op.
    pub overwrite: bool,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            ttl: None,
            tier: None,
            tags: Vec::new(),
            dependencies: Vec::new(),
            overwrite: true,
        }
    }
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn in_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = Some(tier.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn no_overwrite(mut self) -> Self {
        self.overwrite = false;
        self
    }
}

// ============================================================================
// KEY MATCHING
// ============================================================================

/// Key-matching expression used by pattern rules.
#[derive(Clone)]
pub enum KeyMatcher {
    /// Matches exactly one key.
    Literal(String),
    Regex(Regex),
}

impl KeyMatcher {
    pub fn literal(key: impl Into<String>) -> Self {
        KeyMatcher::Literal(key.into())
    }

    /// Compile a regular expression matcher.
    pub fn regex(source: &str) -> CacheResult<Self> {
        compile_pattern(source).map(KeyMatcher::Regex)
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyMatcher::Literal(literal) => literal == key,
            KeyMatcher::Regex(regex) => regex.is_match(key),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            KeyMatcher::Literal(literal) => literal,
            KeyMatcher::Regex(regex) => regex.as_str(),
        }
    }
}

impl fmt::Debug for KeyMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMatcher::Literal(literal) => f.debug_tuple("Literal").field(literal).finish(),
            KeyMatcher::Regex(regex) => f.debug_tuple("Regex").field(&regex.as_str()).finish(),
        }
    }
}

impl PartialEq for KeyMatcher {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (KeyMatcher::Literal(a), KeyMatcher::Literal(b)) => a == b,
            (KeyMatcher::Regex(a), KeyMatcher::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl From<Regex> for KeyMatcher {
    fn from(regex: Regex) -> Self {
        KeyMatcher::Regex(regex)
    }
}

fn compile_pattern(source: &str) -> CacheResult<Regex> {
    Regex::new(source).map_err(|e| {
        ConfigError::InvalidValue {
            field: "pattern".to_string(),
            value: source.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

// ============================================================================
// INVALIDATION
// ============================================================================

/// Selector for `invalidate`.
///
/// Exactly one selector is expected. When several are set they are checked
/// in the order `all`, `keys`, `tags`, `pattern` and only the first applies.
#[derive(Debug, Clone, Default)]
pub struct InvalidateRequest {
    pub all: bool,
    pub keys: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub pattern: Option<Regex>,
}

impl InvalidateRequest {
    pub fn all() -> Self {
        Self {
            all: true,
            ..Default::default()
        }
    }

    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: Some(keys.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: Some(tags.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Pattern selector from a regex source string.
    pub fn pattern(source: &str) -> CacheResult<Self> {
        Ok(Self::pattern_regex(compile_pattern(source)?))
    }

    /// Pattern selector from a pre-built expression.
    pub fn pattern_regex(regex: Regex) -> Self {
        Self {
            pattern: Some(regex),
            ..Default::default()
        }
    }

    /// True when no selector is set.
    pub fn is_empty(&self) -> bool {
        !self.all && self.keys.is_none() && self.tags.is_none() && self.pattern.is_none()
    }
}
