//! Provider Health Tracker
//!
//! Per-provider rolling status used to skip providers that are failing.
//!
//! ## States
//! - **Healthy**: normal operation
//! - **Degraded**: `degraded_threshold` consecutive retryable failures.
//!   Informational; the provider stays eligible
//! - **Unavailable**: `unavailable_threshold` consecutive retryable failures,
//!   or a single auth/fatal failure. A cooldown starts; while it runs the
//!   provider is excluded from every candidate list. Once it expires the
//!   provider is probed again on the next request, and reports Degraded
//!   through [`HealthTracker::effective_status_at`] until that call lands
//!
//! Any success resets the counter, clears the cooldown and restores
//! Healthy immediately.
//!
//! ## Concurrency
//! The provider set is fixed at construction, so the map itself is never
//! mutated. Each entry has its own mutex; updates to different providers
//! never contend and no lock spans two providers.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::HealthConfig;
use crate::provider::ErrorKind;

/// Coarse health status of one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Working normally.
    Healthy,
    /// Repeated retryable failures; still eligible.
    Degraded,
    /// Failing hard; excluded while the cooldown runs.
    Unavailable,
}

impl HealthStatus {
    /// Numeric encoding for the health gauge: 0 healthy, 1 degraded, 2 unavailable.
    pub fn as_gauge(self) -> i64 {
        match self {
            Self::Healthy => 0,
            Self::Degraded => 1,
            Self::Unavailable => 2,
        }
    }
}

/// Health record for a single provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealthState {
    /// Current status.
    pub status: HealthStatus,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Time of the last successful call.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Time of the last failed call.
    pub last_failure_at: Option<DateTime<Utc>>,
    /// While in the future, the provider is not eligible.
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Error kind of the last failure.
    pub last_error: Option<ErrorKind>,
    /// Lifetime successful calls.
    pub total_successes: u64,
    /// Lifetime failed calls.
    pub total_failures: u64,
}

impl Default for ProviderHealthState {
    fn default() -> Self {
        Self {
            status: HealthStatus::Healthy,
            consecutive_failures: 0,
            last_success_at: None,
            last_failure_at: None,
            cooldown_until: None,
            last_error: None,
            total_successes: 0,
            total_failures: 0,
        }
    }
}

impl ProviderHealthState {
    /// Whether the provider may be called at `now`.
    pub fn is_eligible_at(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.map_or(true, |until| now >= until)
    }

    /// Status as seen at `now`: an Unavailable provider whose cooldown has
    /// run out is waiting for its next trial call and reports Degraded.
    pub fn effective_status_at(&self, now: DateTime<Utc>) -> HealthStatus {
        match self.status {
            HealthStatus::Unavailable if self.is_eligible_at(now) => HealthStatus::Degraded,
            status => status,
        }
    }
}

/// Tracks health for a fixed set of providers.
///
/// # Panics
///
/// This type and its methods never panic.
#[derive(Debug)]
pub struct HealthTracker {
    entries: HashMap<String, Mutex<ProviderHealthState>>,
    config: HealthConfig,
}

impl HealthTracker {
    /// Create a tracker with every provider Healthy.
    pub fn new<I, S>(providers: I, config: HealthConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = providers
            .into_iter()
            .map(|name| (name.into(), Mutex::new(ProviderHealthState::default())))
            .collect();
        Self { entries, config }
    }

    /// Record a successful call at the current time.
    pub fn record_success(&self, provider: &str) {
        self.record_success_at(provider, Utc::now());
    }

    /// Record a successful call at `now`.
    ///
    /// Resets the failure counter, clears any cooldown and restores Healthy.
    /// Repeated calls leave the state unchanged apart from the timestamp and
    /// lifetime counter.
    pub fn record_success_at(&self, provider: &str, now: DateTime<Utc>) {
        let Some(entry) = self.entries.get(provider) else {
            warn!(provider, "health: success recorded for unknown provider");
            return;
        };
        let mut state = entry.lock();
        let previous = state.status;

        state.status = HealthStatus::Healthy;
        state.consecutive_failures = 0;
        state.cooldown_until = None;
        state.last_success_at = Some(now);
        state.total_successes += 1;

        if previous != HealthStatus::Healthy {
            info!(provider, ?previous, "health: provider recovered");
        }
    }

    /// Record a failed call at the current time.
    ///
    /// Returns the provider's status after the update, or `None` for an
    /// unknown provider.
    pub fn record_failure(&self, provider: &str, kind: ErrorKind) -> Option<HealthStatus> {
        self.record_failure_at(provider, kind, Utc::now())
    }

    /// Record a failed call at `now`.
    ///
    /// - Auth/fatal failures mark the provider Unavailable immediately with
    ///   the long cooldown.
    /// - `CapabilityUnsupported` is a request/provider mismatch: it is logged
    ///   on the record but moves neither the counter nor the status.
    /// - Other failures count toward the degraded and unavailable thresholds.
    pub fn record_failure_at(
        &self,
        provider: &str,
        kind: ErrorKind,
        now: DateTime<Utc>,
    ) -> Option<HealthStatus> {
        let Some(entry) = self.entries.get(provider) else {
            warn!(provider, %kind, "health: failure recorded for unknown provider");
            return None;
        };
        let mut state = entry.lock();
        let previous = state.status;

        state.last_failure_at = Some(now);
        state.last_error = Some(kind);
        state.total_failures += 1;

        if kind == ErrorKind::CapabilityUnsupported {
            debug!(provider, "health: capability mismatch, status unchanged");
            return Some(state.status);
        }

        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        if kind.is_certain() {
            state.status = HealthStatus::Unavailable;
            state.cooldown_until =
                Some(now + seconds(self.config.certain_failure_cooldown_s));
            warn!(
                provider,
                %kind,
                cooldown_s = self.config.certain_failure_cooldown_s,
                "health: provider unavailable (certain failure)"
            );
        } else if state.consecutive_failures >= self.config.unavailable_threshold {
            state.status = HealthStatus::Unavailable;
            state.cooldown_until = Some(now + seconds(self.config.unavailable_cooldown_s));
            warn!(
                provider,
                %kind,
                failures = state.consecutive_failures,
                cooldown_s = self.config.unavailable_cooldown_s,
                "health: provider unavailable (threshold exceeded)"
            );
        } else if state.consecutive_failures >= self.config.degraded_threshold {
            state.status = HealthStatus::Degraded;
            if previous != HealthStatus::Degraded {
                warn!(
                    provider,
                    %kind,
                    failures = state.consecutive_failures,
                    "health: provider degraded"
                );
            }
        } else {
            debug!(
                provider,
                %kind,
                failures = state.consecutive_failures,
                "health: failure recorded"
            );
        }

        Some(state.status)
    }

    /// Whether `provider` may be called at `now`. Unknown providers are
    /// never eligible.
    pub fn is_eligible(&self, provider: &str, now: DateTime<Utc>) -> bool {
        self.entries
            .get(provider)
            .map_or(false, |entry| entry.lock().is_eligible_at(now))
    }

    /// Effective status of `provider` at `now`, or `None` if unknown.
    pub fn effective_status_at(&self, provider: &str, now: DateTime<Utc>) -> Option<HealthStatus> {
        self.entries
            .get(provider)
            .map(|entry| entry.lock().effective_status_at(now))
    }

    /// Current state of one provider.
    pub fn state(&self, provider: &str) -> Option<ProviderHealthState> {
        self.entries.get(provider).map(|entry| entry.lock().clone())
    }

    /// Operator override: return `provider` to Healthy and clear its
    /// cooldown. Lifetime counters are kept. Returns `false` for an unknown
    /// provider.
    pub fn reset(&self, provider: &str) -> bool {
        let Some(entry) = self.entries.get(provider) else {
            return false;
        };
        let mut state = entry.lock();
        state.status = HealthStatus::Healthy;
        state.consecutive_failures = 0;
        state.cooldown_until = None;
        info!(provider, "health: manually reset to healthy");
        true
    }

    /// Read-only copy of every provider's state, ordered by name.
    ///
    /// Each entry is copied under its own lock; the snapshot is consistent
    /// per provider, not across providers.
    pub fn snapshot(&self) -> BTreeMap<String, ProviderHealthState> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.lock().clone()))
            .collect()
    }
}

/// Upper bound on any cooldown: one year.
const MAX_COOLDOWN_S: u64 = 365 * 24 * 3600;

fn seconds(s: u64) -> ChronoDuration {
    ChronoDuration::seconds(s.min(MAX_COOLDOWN_S) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HealthConfig {
        HealthConfig {
            degraded_threshold: 2,
            unavailable_threshold: 3,
            unavailable_cooldown_s: 30,
            certain_failure_cooldown_s: 300,
        }
    }

    fn tracker() -> HealthTracker {
        HealthTracker::new(["local", "cloud"], config())
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .expect("test: timestamp")
            .with_timezone(&Utc)
    }

    #[test]
    fn test_new_tracker_all_healthy_and_eligible() {
        let t = tracker();
        for (name, state) in t.snapshot() {
            assert_eq!(state.status, HealthStatus::Healthy, "{name}");
            assert!(t.is_eligible(&name, t0()));
        }
    }

    #[test]
    fn test_expired_cooldown_reports_degraded_until_next_call() {
        let t = tracker();
        t.record_failure_at("cloud", ErrorKind::AuthFailure, t0());
        assert_eq!(t.effective_status_at("cloud", t0()), Some(HealthStatus::Unavailable));

        let after = t0() + ChronoDuration::seconds(301);
        assert_eq!(t.effective_status_at("cloud", after), Some(HealthStatus::Degraded));
        assert_eq!(t.state("cloud").expect("test: state").status, HealthStatus::Unavailable);

        t.record_success_at("cloud", after);
        assert_eq!(t.effective_status_at("cloud", after), Some(HealthStatus::Healthy));
        assert_eq!(t.effective_status_at("ghost", after), None);
    }

    #[test]
    fn test_retryable_failures_escalate_through_degraded() {
        let t = tracker();
        assert_eq!(
            t.record_failure_at("local", ErrorKind::TransientUpstream, t0()),
            Some(HealthStatus::Healthy)
        );
        assert_eq!(
            t.record_failure_at("local", ErrorKind::RateLimited, t0()),
            Some(HealthStatus::Degraded)
        );
        assert!(t.is_eligible("local", t0()), "degraded stays eligible");
        assert_eq!(
            t.record_failure_at("local", ErrorKind::Timeout, t0()),
            Some(HealthStatus::Unavailable)
        );
        assert!(!t.is_eligible("local", t0()));
    }

    #[test]
    fn test_threshold_cooldown_expires() {
        let t = tracker();
        for _ in 0..3 {
            t.record_failure_at("local", ErrorKind::TransientUpstream, t0());
        }
        assert!(!t.is_eligible("local", t0() + ChronoDuration::seconds(29)));
        assert!(t.is_eligible("local", t0() + ChronoDuration::seconds(30)));
    }

    #[test]
    fn test_auth_failure_is_immediately_unavailable() {
        let t = tracker();
        assert_eq!(
            t.record_failure_at("cloud", ErrorKind::AuthFailure, t0()),
            Some(HealthStatus::Unavailable)
        );
        let state = t.state("cloud").expect("test: state");
        assert_eq!(state.consecutive_failures, 1);
        assert_eq!(state.cooldown_until, Some(t0() + ChronoDuration::seconds(300)));
        assert!(!t.is_eligible("cloud", t0() + ChronoDuration::seconds(299)));
    }

    #[test]
    fn test_fatal_upstream_is_immediately_unavailable() {
        let t = tracker();
        assert_eq!(
            t.record_failure_at("cloud", ErrorKind::FatalUpstream, t0()),
            Some(HealthStatus::Unavailable)
        );
    }

    #[test]
    fn test_capability_unsupported_leaves_status() {
        let t = tracker();
        t.record_failure_at("local", ErrorKind::CapabilityUnsupported, t0());
        let state = t.state("local").expect("test: state");
        assert_eq!(state.status, HealthStatus::Healthy);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.last_error, Some(ErrorKind::CapabilityUnsupported));
        assert_eq!(state.last_failure_at, Some(t0()));
        assert_eq!(state.total_failures, 1);
    }

    #[test]
    fn test_success_resets_and_is_idempotent() {
        let t = tracker();
        t.record_failure_at("cloud", ErrorKind::AuthFailure, t0());
        t.record_success_at("cloud", t0());

        let once = t.state("cloud").expect("test: state");
        assert_eq!(once.status, HealthStatus::Healthy);
        assert_eq!(once.consecutive_failures, 0);
        assert_eq!(once.cooldown_until, None);
        assert!(t.is_eligible("cloud", t0()));

        t.record_success_at("cloud", t0());
        let twice = t.state("cloud").expect("test: state");
        assert_eq!(twice.status, once.status);
        assert_eq!(twice.consecutive_failures, once.consecutive_failures);
        assert_eq!(twice.cooldown_until, once.cooldown_until);
    }

    #[test]
    fn test_probe_failure_after_cooldown_reopens() {
        let t = tracker();
        for _ in 0..3 {
            t.record_failure_at("local", ErrorKind::TransientUpstream, t0());
        }
        let later = t0() + ChronoDuration::seconds(31);
        assert!(t.is_eligible("local", later));
        t.record_failure_at("local", ErrorKind::TransientUpstream, later);
        assert!(!t.is_eligible("local", later));
    }

    #[test]
    fn test_unknown_provider_is_ignored_and_ineligible() {
        let t = tracker();
        assert_eq!(t.record_failure("ghost", ErrorKind::Timeout), None);
        t.record_success("ghost");
        assert!(!t.is_eligible("ghost", t0()));
        assert!(t.state("ghost").is_none());
        assert!(!t.reset("ghost"));
    }

    #[test]
    fn test_reset_clears_cooldown() {
        let t = tracker();
        t.record_failure_at("cloud", ErrorKind::AuthFailure, t0());
        assert!(t.reset("cloud"));
        assert!(t.is_eligible("cloud", t0()));
        assert_eq!(t.state("cloud").expect("test: state").total_failures, 1);
    }

    #[test]
    fn test_snapshot_is_ordered_and_serializable() {
        let t = tracker();
        t.record_success_at("local", t0());
        let snap = t.snapshot();
        assert_eq!(snap.keys().collect::<Vec<_>>(), vec!["cloud", "local"]);
        let json = serde_json::to_value(&snap).expect("test: serialize");
        assert_eq!(json["local"]["status"], "healthy");
        assert_eq!(json["local"]["total_successes"], 1);
    }

    #[test]
    fn test_concurrent_updates_are_serialized_per_provider() {
        let t = std::sync::Arc::new(HealthTracker::new(
            ["p"],
            HealthConfig {
                degraded_threshold: 1_000_000,
                unavailable_threshold: 1_000_000,
                ..config()
            },
        ));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let t = t.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        t.record_failure("p", ErrorKind::TransientUpstream);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("test: thread join");
        }
        let state = t.state("p").expect("test: state");
        assert_eq!(state.consecutive_failures, 4_000);
        assert_eq!(state.total_failures, 4_000);
    }
}
