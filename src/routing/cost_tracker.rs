//! Cost tracking and savings computation.
//!
//! Tracks per-provider token usage and estimated spend, computes what the
//! all-premium baseline would have cost, and reports savings. This is the
//! numeric cost signal an external budget collaborator consumes; alerting
//! on it is out of scope here.
//!
//! Thread-safe: the provider set is fixed at construction and every counter
//! is atomic, so recording never takes a lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::provider::{NormalizedResponse, ProviderRequest};
use crate::routing::registry::ProviderDescriptor;

/// Counters for one provider.
#[derive(Debug)]
struct ProviderSpend {
    /// Cost-per-1K-tokens rate, in micro-dollars, used for the baseline.
    rate_micro: u64,
    tokens: AtomicU64,
    requests: AtomicU64,
    /// Requests this provider served after an earlier candidate failed.
    fallback_requests: AtomicU64,
    spend_micro: AtomicU64,
}

/// Per-provider cost tracking and savings computation.
///
/// Costs are stored as micro-dollars (1 USD = 1 000 000 micro-dollars) to
/// avoid floating-point drift in long-running aggregations.
///
/// # Panics
///
/// This type and its methods never panic.
#[derive(Debug)]
pub struct CostTracker {
    providers: HashMap<String, ProviderSpend>,
    /// Highest configured rate, the baseline every token is priced at.
    premium_rate_micro: u64,
}

impl CostTracker {
    /// Create a tracker for a fixed set of providers, all counters at zero.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn new<'a>(descriptors: impl IntoIterator<Item = &'a ProviderDescriptor>) -> Self {
        let providers: HashMap<String, ProviderSpend> = descriptors
            .into_iter()
            .map(|d| {
                (
                    d.name.clone(),
                    ProviderSpend {
                        rate_micro: f64_to_micro(d.cost_per_1k_tokens),
                        tokens: AtomicU64::new(0),
                        requests: AtomicU64::new(0),
                        fallback_requests: AtomicU64::new(0),
                        spend_micro: AtomicU64::new(0),
                    },
                )
            })
            .collect();
        let premium_rate_micro = providers.values().map(|p| p.rate_micro).max().unwrap_or(0);

        Self {
            providers,
            premium_rate_micro,
        }
    }

    /// Record one successful call.
    ///
    /// # Arguments
    ///
    /// * `provider`: Provider that served the call. Unknown names are ignored.
    /// * `tokens`: Billed tokens.
    /// * `cost_usd`: Estimated cost from the provider's estimator.
    /// * `after_fallback`: Whether an earlier candidate failed first.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn record(&self, provider: &str, tokens: u64, cost_usd: f64, after_fallback: bool) {
        let Some(spend) = self.providers.get(provider) else {
            tracing::warn!(provider, "cost recorded for unknown provider");
            return;
        };
        spend.tokens.fetch_add(tokens, Ordering::Relaxed);
        spend.requests.fetch_add(1, Ordering::Relaxed);
        spend
            .spend_micro
            .fetch_add(f64_to_micro(cost_usd), Ordering::Relaxed);
        if after_fallback {
            spend.fallback_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Return a snapshot of current cost metrics.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn snapshot(&self) -> CostSnapshot {
        let mut per_provider = BTreeMap::new();
        let mut total_tokens: u64 = 0;
        let mut actual_micro: u128 = 0;

        for (name, spend) in &self.providers {
            let tokens = spend.tokens.load(Ordering::Relaxed);
            let spend_micro = spend.spend_micro.load(Ordering::Relaxed);
            total_tokens = total_tokens.saturating_add(tokens);
            actual_micro += spend_micro as u128;
            per_provider.insert(
                name.clone(),
                ProviderCost {
                    tokens,
                    requests: spend.requests.load(Ordering::Relaxed),
                    fallback_requests: spend.fallback_requests.load(Ordering::Relaxed),
                    cost_usd: micro_to_f64(spend_micro),
                },
            );
        }

        let baseline_micro = (total_tokens as u128 * self.premium_rate_micro as u128) / 1000;
        let savings_micro = baseline_micro.saturating_sub(actual_micro);

        CostSnapshot {
            per_provider,
            total_tokens,
            actual_cost_usd: micro_to_f64(actual_micro as u64),
            baseline_cost_usd: micro_to_f64(baseline_micro as u64),
            savings_usd: micro_to_f64(savings_micro as u64),
            savings_percent: if baseline_micro > 0 {
                (savings_micro as f64 / baseline_micro as f64) * 100.0
            } else {
                0.0
            },
        }
    }

    /// Reset all counters to zero.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn reset(&self) {
        for spend in self.providers.values() {
            spend.tokens.store(0, Ordering::Relaxed);
            spend.requests.store(0, Ordering::Relaxed);
            spend.fallback_requests.store(0, Ordering::Relaxed);
            spend.spend_micro.store(0, Ordering::Relaxed);
        }
    }
}

/// Spend attributed to one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderCost {
    /// Billed tokens.
    pub tokens: u64,
    /// Successful calls served.
    pub requests: u64,
    /// Calls served after an earlier candidate failed.
    pub fallback_requests: u64,
    /// Estimated spend in USD.
    pub cost_usd: f64,
}

/// Point-in-time snapshot of cost tracking metrics.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostSnapshot {
    /// Spend per provider, keyed by name.
    pub per_provider: BTreeMap<String, ProviderCost>,
    /// Billed tokens across all providers.
    pub total_tokens: u64,
    /// Actual total cost in USD.
    pub actual_cost_usd: f64,
    /// Hypothetical cost had every token gone to the most expensive provider.
    pub baseline_cost_usd: f64,
    /// Money saved vs the baseline in USD.
    pub savings_usd: f64,
    /// Savings as a percentage of baseline.
    pub savings_percent: f64,
}

/// Billed tokens for a call: the adapter's count, or the word count of the
/// prompt plus the output when the adapter reports none.
///
/// # Panics
///
/// This function never panics.
pub fn estimate_tokens(request: &ProviderRequest, response: &NormalizedResponse) -> u64 {
    response.tokens_used.unwrap_or_else(|| {
        (request.prompt.split_whitespace().count() + response.text.split_whitespace().count())
            as u64
    })
}

// ── Helpers ────────────────────────────────────────────────────────────

/// Convert USD to micro-dollars. Negative and non-finite inputs become 0.
fn f64_to_micro(usd: f64) -> u64 {
    if usd.is_finite() && usd > 0.0 {
        (usd * 1_000_000.0).round() as u64
    } else {
        0
    }
}

/// Convert micro-dollars to USD.
fn micro_to_f64(micro: u64) -> f64 {
    micro as f64 / 1_000_000.0
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::provider::Capability;
    use crate::routing::registry::ProviderKind;

    fn descriptors() -> Vec<ProviderDescriptor> {
        [
            ProviderConfig::new("local", ProviderKind::Local, vec![Capability::Text]),
            ProviderConfig::new("cloud", ProviderKind::Cloud, vec![Capability::Text]).with_cost(0.02),
        ]
        .iter()
        .map(ProviderDescriptor::from_config)
        .collect()
    }

    fn tracker() -> CostTracker {
        CostTracker::new(&descriptors())
    }

    // -- helpers ---------------------------------------------------------

    #[test]
    fn test_f64_to_micro_fractional() {
        assert_eq!(f64_to_micro(0.015), 15_000);
    }

    #[test]
    fn test_f64_to_micro_rejects_negative_and_nan() {
        assert_eq!(f64_to_micro(-1.0), 0);
        assert_eq!(f64_to_micro(f64::NAN), 0);
    }

    #[test]
    fn test_micro_to_f64_round_trip() {
        let back = micro_to_f64(f64_to_micro(0.015));
        assert!((back - 0.015).abs() < 1e-9);
    }

    #[test]
    fn test_estimate_tokens_uses_reported_count() {
        let request = ProviderRequest {
            request_id: "r".into(),
            prompt: "one two three".into(),
            capability: Capability::Text,
            tier: crate::routing::ComplexityTier::Simple,
            timeout: std::time::Duration::from_secs(1),
        };
        let mut response = NormalizedResponse::text("four five");
        assert_eq!(estimate_tokens(&request, &response), 5);
        response.tokens_used = Some(42);
        assert_eq!(estimate_tokens(&request, &response), 42);
    }

    // -- tracking --------------------------------------------------------

    #[test]
    fn test_new_tracker_all_counters_zero() {
        let s = tracker().snapshot();
        assert_eq!(s.per_provider.len(), 2);
        assert_eq!(s.total_tokens, 0);
        assert!(s.actual_cost_usd.abs() < f64::EPSILON);
        assert!(s.savings_percent.abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_attributes_spend_per_provider() {
        let t = tracker();
        t.record("cloud", 1_000, 0.02, true);
        t.record("local", 4_000, 0.0, false);

        let s = t.snapshot();
        let cloud = &s.per_provider["cloud"];
        assert_eq!(cloud.tokens, 1_000);
        assert_eq!(cloud.requests, 1);
        assert_eq!(cloud.fallback_requests, 1);
        assert!((cloud.cost_usd - 0.02).abs() < 1e-9);
        assert_eq!(s.per_provider["local"].requests, 1);
        assert_eq!(s.total_tokens, 5_000);
    }

    #[test]
    fn test_savings_against_premium_baseline() {
        let t = tracker();
        t.record("local", 3_000, 0.0, false);
        t.record("cloud", 1_000, 0.02, false);

        let s = t.snapshot();
        // baseline: 4 000 tokens at 0.02 / 1K = 0.08
        assert!((s.baseline_cost_usd - 0.08).abs() < 1e-9);
        assert!((s.actual_cost_usd - 0.02).abs() < 1e-9);
        assert!((s.savings_usd - 0.06).abs() < 1e-9);
        assert!((s.savings_percent - 75.0).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_provider_is_ignored() {
        let t = tracker();
        t.record("ghost", 10, 1.0, false);
        assert_eq!(t.snapshot().total_tokens, 0);
    }

    #[test]
    fn test_reset_clears_counters() {
        let t = tracker();
        t.record("cloud", 100, 0.5, false);
        t.reset();
        let s = t.snapshot();
        assert_eq!(s.total_tokens, 0);
        assert_eq!(s.per_provider["cloud"].requests, 0);
    }

    #[test]
    fn test_concurrent_records_are_all_counted() {
        let t = std::sync::Arc::new(tracker());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let t = t.clone();
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        t.record("local", 1, 0.0, false);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("test: thread join");
        }
        assert_eq!(t.snapshot().per_provider["local"].requests, 8_000);
    }
}
