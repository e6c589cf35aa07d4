//! The status tracker: the sole authority on whether a provider is usable.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{BackoffPolicy, ProviderStatus};
use crate::store::StatusStore;

/// Records provider successes and failures and computes suspension windows.
///
/// Never fails: storage errors are logged and the computed status is still
/// returned. Mutations are serialized by a single lock.
pub struct StatusTracker {
    store: Arc<dyn StatusStore>,
    policy: BackoffPolicy,
    write_lock: Mutex<()>,
}

impl StatusTracker {
    pub fn new(store: Arc<dyn StatusStore>, policy: BackoffPolicy) -> Self {
        Self {
            store,
            policy,
            write_lock: Mutex::new(()),
        }
    }

    pub fn policy(&self) -> BackoffPolicy {
        self.policy
    }

    /// Record a successful query.
    pub fn record_success(&self, provider_id: i64) -> ProviderStatus {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let current = self.load(provider_id);
        let next = current.with_success(Utc::now());
        if current.is_degraded() {
            debug!(
                "Provider {} recovered after {} consecutive failures",
                provider_id, current.escalation_level
            );
        }

        self.persist(&next);
        next
    }

    /// Record a failed query.
    ///
    /// The provider is suspended for at least `minimum_backoff`, or longer if
    /// the escalation policy says so.
    pub fn record_failure(&self, provider_id: i64, minimum_backoff: Duration) -> ProviderStatus {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let current = self.load(provider_id);
        let level = current.escalation_level.saturating_add(1);
        let backoff = self.policy.backoff_for(level).max(minimum_backoff);
        let next = current.with_failure(Utc::now(), backoff);

        warn!(
            "Provider {} failed (escalation level {}), disabled for {:?}",
            provider_id, next.escalation_level, backoff
        );

        self.persist(&next);
        next
    }

    /// Every status row whose suspension has not yet expired.
    pub fn blocked_providers(&self) -> Vec<ProviderStatus> {
        let now = Utc::now();
        self.all()
            .into_iter()
            .filter(|s| s.is_blocked_at(now))
            .collect()
    }

    /// Full status for a provider, or a fresh record if none exists.
    pub fn status(&self, provider_id: i64) -> ProviderStatus {
        self.load(provider_id)
    }

    /// Every recorded status row.
    pub fn all(&self) -> Vec<ProviderStatus> {
        match self.store.all() {
            Ok(statuses) => statuses,
            Err(e) => {
                warn!("Failed to load provider statuses: {}", e);
                Vec::new()
            }
        }
    }

    pub fn successful_query_count(&self, provider_id: i64) -> u64 {
        self.load(provider_id).successful_query_count
    }

    pub fn failed_query_count(&self, provider_id: i64) -> u64 {
        self.load(provider_id).failed_query_count
    }

    pub fn last_successful_query(&self, provider_id: i64) -> Option<DateTime<Utc>> {
        self.load(provider_id).last_successful_query
    }

    fn load(&self, provider_id: i64) -> ProviderStatus {
        match self.store.find_by_provider(provider_id) {
            Ok(Some(status)) => status,
            Ok(None) => ProviderStatus::new(provider_id),
            Err(e) => {
                warn!("Failed to load status for provider {}: {}", provider_id, e);
                ProviderStatus::new(provider_id)
            }
        }
    }

    fn persist(&self, status: &ProviderStatus) {
        if let Err(e) = self.store.upsert(status) {
            warn!(
                "Failed to persist status for provider {}: {}",
                status.provider_id, e
            );
        }
    }
}
