//! Pattern rules: key-matching expressions that override TTL/tags and arm
//! refresh scheduling.

use crate::{KeyMatcher, Timestamp};
use std::time::Duration;

/// How far ahead of expiry an on-expire refresh fires.
pub const ON_EXPIRE_LEAD: Duration = Duration::from_secs(60);

/// When the refresh hook fires for keys matched by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStrategy {
    /// Periodic rescan of every tier for matching keys.
    Interval(Duration),
    /// One-shot timer shortly before the entry expires.
    OnExpire,
    /// Caller-driven; no timer.
    OnDemand,
    /// Caller-driven; no timer.
    Predictive,
}

impl RefreshStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshStrategy::Interval(_) => "interval",
            RefreshStrategy::OnExpire => "on-expire",
            RefreshStrategy::OnDemand => "on-demand",
            RefreshStrategy::Predictive => "predictive",
        }
    }

    /// Delay before an on-expire refresh for an entry expiring at `expires_at`.
    ///
    /// Saturates at zero when the entry expires within the lead time.
    pub fn on_expire_delay(expires_at: Timestamp, now: Timestamp) -> Duration {
        let until_expiry = (expires_at - now).to_std().unwrap_or(Duration::ZERO);
        until_expiry.saturating_sub(ON_EXPIRE_LEAD)
    }
}

/// A named key-matching rule.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternRule {
    pub name: String,
    pub matcher: KeyMatcher,
    pub ttl: Option<Duration>,
    pub tags: Vec<String>,
    pub refresh: Option<RefreshStrategy>,
}

impl PatternRule {
    pub fn new(name: impl Into<String>, matcher: KeyMatcher) -> Self {
        Self {
            name: name.into(),
            matcher,
            ttl: None,
            tags: Vec::new(),
            refresh: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
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

    pub fn with_refresh(mut self, refresh: RefreshStrategy) -> Self {
        self.refresh = Some(refresh);
        self
    }

    pub fn matches(&self, key: &str) -> bool {
        self.matcher.matches(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_on_expire_delay_leads_expiry_by_a_minute() {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::minutes(5);
        assert_eq!(
            RefreshStrategy::on_expire_delay(expires_at, now),
            Duration::from_secs(240)
        );
    }

    #[test]
    fn test_on_expire_delay_saturates() {
        let now = Utc::now();
        let soon = now + chrono::Duration::seconds(30);
        assert_eq!(RefreshStrategy::on_expire_delay(soon, now), Duration::ZERO);
        let past = now - chrono::Duration::seconds(30);
        assert_eq!(RefreshStrategy::on_expire_delay(past, now), Duration::ZERO);
    }

    #[test]
    fn test_rule_matching() {
        let rule = PatternRule::new("sessions", KeyMatcher::regex("^session:").unwrap())
            .with_ttl(Duration::from_secs(900))
            .with_tags(["session"])
            .with_refresh(RefreshStrategy::OnExpire);
        assert!(rule.matches("session:abc"));
        assert!(!rule.matches("user:abc"));
        assert_eq!(rule.refresh.map(|r| r.as_str()), Some("on-expire"));
    }
}
