use crate::error::LimiterError;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named rate-limit policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Authentication-like endpoints
    Strict,
    /// Long-running or resource-heavy operations
    Expensive,
    /// Default tier
    Moderate,
    /// Read-only endpoints
    Lenient,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Strict, Tier::Expensive, Tier::Moderate, Tier::Lenient];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Strict => "strict",
            Tier::Expensive => "expensive",
            Tier::Moderate => "moderate",
            Tier::Lenient => "lenient",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = LimiterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(Tier::Strict),
            "expensive" => Ok(Tier::Expensive),
            "moderate" => Ok(Tier::Moderate),
            "lenient" => Ok(Tier::Lenient),
            other => Err(LimiterError::Config(format!("Unknown tier: {}", other))),
        }
    }
}

/// Tier selection for a route: a fixed tier or path-based classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TierSelector {
    #[default]
    Auto,
    Fixed(Tier),
}

impl FromStr for TierSelector {
    type Err = LimiterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "auto" {
            Ok(TierSelector::Auto)
        } else {
            s.parse().map(TierSelector::Fixed)
        }
    }
}

impl From<Tier> for TierSelector {
    fn from(tier: Tier) -> Self {
        TierSelector::Fixed(tier)
    }
}

impl Serialize for TierSelector {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TierSelector::Auto => serializer.serialize_str("auto"),
            TierSelector::Fixed(tier) => serializer.serialize_str(tier.as_str()),
        }
    }
}

impl<'de> Deserialize<'de> for TierSelector {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Longest accepted tier window (ten years)
pub const MAX_WINDOW_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Capacity and window of a tier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierConfig {
    /// Maximum number of requests per window
    pub capacity: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl TierConfig {
    pub const fn new(capacity: u32, window_secs: u64) -> Self {
        Self {
            capacity,
            window_secs,
        }
    }

    /// Window as a chrono delta, clamped to [`MAX_WINDOW_SECS`]
    pub fn window_delta(&self) -> TimeDelta {
        let secs = i64::try_from(self.window_secs.min(MAX_WINDOW_SECS)).unwrap_or(i64::MAX);
        TimeDelta::try_seconds(secs).unwrap_or(TimeDelta::MAX)
    }

    pub fn validate(&self, tier: Tier) -> crate::error::Result<()> {
        if self.capacity == 0 {
            return Err(LimiterError::Config(format!(
                "Capacity must be > 0 for tier: {}",
                tier
            )));
        }
        if self.window_secs == 0 {
            return Err(LimiterError::Config(format!(
                "Window must be > 0 for tier: {}",
                tier
            )));
        }
        if self.window_secs > MAX_WINDOW_SECS {
            return Err(LimiterError::Config(format!(
                "Window must be <= {}s for tier: {}",
                MAX_WINDOW_SECS, tier
            )));
        }
        Ok(())
    }
}

/// Key a limiter bucket is scoped to: `user:<id>`, `addr:<value>` or `unknown`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn user(id: &str) -> Self {
        Self(format!("user:{}", id))
    }

    pub fn addr(value: &str) -> Self {
        Self(format!("addr:{}", value))
    }

    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Counter state observed by a single take
///
/// `count` is the position of the current request in its window, so a
/// request is within capacity iff `count <= capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterEntry {
    pub count: u32,
    pub window_reset_at: DateTime<Utc>,
}

/// Allow/deny result plus metadata for a single request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    /// Seconds until a retry may succeed; set only on denial
    pub retry_after: Option<u64>,
}

impl Decision {
    /// Map a counter observation into a decision
    pub fn from_entry(entry: CounterEntry, capacity: u32, now: DateTime<Utc>) -> Self {
        let allowed = entry.count <= capacity;
        let retry_after = if allowed {
            None
        } else {
            let millis = (entry.window_reset_at - now).num_milliseconds().max(0) as u64;
            Some(millis.div_ceil(1000).max(1))
        };

        Self {
            allowed,
            limit: capacity,
            remaining: capacity.saturating_sub(entry.count),
            reset_at: entry.window_reset_at,
            retry_after,
        }
    }

    /// `X-RateLimit-*` (and `Retry-After` on denial) header pairs, lowercased
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("x-ratelimit-limit", self.limit.to_string()),
            ("x-ratelimit-remaining", self.remaining.to_string()),
            (
                "x-ratelimit-reset",
                self.reset_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            ),
        ];
        if let Some(retry) = self.retry_after {
            headers.push(("retry-after", retry.to_string()));
        }
        headers
    }
}
