//! Provider health record and escalation policy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health record for one provider.
///
/// Transitions are pure: [`with_success`](Self::with_success) and
/// [`with_failure`](Self::with_failure) return the next state instead of
/// mutating in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderStatus {
    pub provider_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_successful_query: Option<DateTime<Utc>>,
    #[serde(default)]
    pub successful_query_count: u64,
    #[serde(default)]
    pub failed_query_count: u64,
    /// Consecutive failures since the last success.
    #[serde(default)]
    pub escalation_level: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_failure: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub most_recent_failure: Option<DateTime<Utc>>,
    /// Provider is excluded from selection while `now < disabled_till`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_till: Option<DateTime<Utc>>,
}

impl ProviderStatus {
    /// A fresh record with no history.
    pub fn new(provider_id: i64) -> Self {
        Self {
            provider_id,
            last_successful_query: None,
            successful_query_count: 0,
            failed_query_count: 0,
            escalation_level: 0,
            initial_failure: None,
            most_recent_failure: None,
            disabled_till: None,
        }
    }

    /// Whether the provider is suspended at the given instant.
    pub fn is_blocked_at(&self, now: DateTime<Utc>) -> bool {
        self.disabled_till.is_some_and(|till| till > now)
    }

    /// Whether the provider has failed since its last success.
    pub fn is_degraded(&self) -> bool {
        self.escalation_level > 0
    }

    /// State after a successful query.
    pub fn with_success(&self, now: DateTime<Utc>) -> Self {
        Self {
            provider_id: self.provider_id,
            last_successful_query: Some(now),
            successful_query_count: self.successful_query_count.saturating_add(1),
            failed_query_count: self.failed_query_count,
            escalation_level: 0,
            initial_failure: None,
            most_recent_failure: None,
            disabled_till: None,
        }
    }

    /// State after a failed query.
    ///
    /// `backoff` is applied from `now`. The resulting `disabled_till` never
    /// moves backwards relative to the current one.
    pub fn with_failure(&self, now: DateTime<Utc>, backoff: Duration) -> Self {
        let till = chrono::Duration::from_std(backoff)
            .ok()
            .and_then(|backoff| now.checked_add_signed(backoff))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let disabled_till = match self.disabled_till {
            Some(current) if current > till => current,
            _ => till,
        };

        Self {
            provider_id: self.provider_id,
            last_successful_query: self.last_successful_query,
            successful_query_count: self.successful_query_count,
            failed_query_count: self.failed_query_count.saturating_add(1),
            escalation_level: self.escalation_level.saturating_add(1),
            initial_failure: self.initial_failure.or(Some(now)),
            most_recent_failure: Some(now),
            disabled_till: Some(disabled_till),
        }
    }
}

/// Exponential backoff: `base * 2^(level - 1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(60),
            max: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Suspension window for an escalation level. Level 0 is never suspended.
    pub fn backoff_for(&self, level: u32) -> Duration {
        if level == 0 {
            return Duration::ZERO;
        }

        // Clamp the exponent to prevent overflow.
        let exponent = (level - 1).min(31);
        let multiplier = 2u32.saturating_pow(exponent);
        self.base
            .checked_mul(multiplier)
            .unwrap_or(self.max)
            .min(self.max)
    }
}
