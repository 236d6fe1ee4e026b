//! Request and outcome types for the routing core.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::provider::{Capability, ErrorKind, NormalizedResponse};
use crate::routing::classifier::ComplexityTier;

/// A generation request submitted to the router.
///
/// Owned by the caller and never mutated by the router.
#[derive(Debug, Clone)]
pub struct RoutingRequest {
    /// Unique identifier for trace correlation.
    pub request_id: String,
    /// Prompt text.
    pub prompt: String,
    /// Capability the request requires.
    pub capability: Capability,
    /// Provider to try first, if it is eligible.
    pub provider_hint: Option<String>,
    /// Tier override; bypasses the classifier.
    pub tier_hint: Option<ComplexityTier>,
    /// Absolute deadline for the whole routed call, including fallbacks.
    pub deadline: Option<Instant>,
}

impl RoutingRequest {
    /// New request with a random id and no hints or deadline.
    pub fn new(prompt: impl Into<String>, capability: Capability) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            prompt: prompt.into(),
            capability,
            provider_hint: None,
            tier_hint: None,
            deadline: None,
        }
    }

    /// Set the request id.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Prefer `provider` when it is eligible.
    pub fn with_provider_hint(mut self, provider: impl Into<String>) -> Self {
        self.provider_hint = Some(provider.into());
        self
    }

    /// Force a complexity tier.
    pub fn with_tier_hint(mut self, tier: ComplexityTier) -> Self {
        self.tier_hint = Some(tier);
        self
    }

    /// Set an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline `budget` from now.
    pub fn with_timeout(self, budget: Duration) -> Self {
        self.with_deadline(Instant::now() + budget)
    }
}

/// One failed provider call in the attempt trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    /// Provider that was called.
    pub provider: String,
    /// How it failed.
    pub error: ErrorKind,
    /// Time spent on the call.
    pub elapsed: Duration,
}

/// Why a routed call produced no response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Every eligible candidate was called and failed.
    AllProvidersExhausted,
    /// No provider was eligible, so nothing was called.
    NoEligibleProvider,
    /// The request deadline passed, or the coalesced leader went away.
    Timeout,
}

impl FailureKind {
    /// Stable identifier used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AllProvidersExhausted => "all_providers_exhausted",
            Self::NoEligibleProvider => "no_eligible_provider",
            Self::Timeout => "timeout",
        }
    }
}

/// A successful routed call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingSuccess {
    /// Provider that produced the response.
    pub provider: String,
    /// Normalized provider output.
    pub response: NormalizedResponse,
    /// Latency of the successful call.
    pub latency: Duration,
    /// Estimated cost of the successful call, in USD.
    pub cost_estimate: f64,
    /// Tier the request was routed under.
    pub tier: ComplexityTier,
    /// Failed calls made before the success, in order.
    pub attempts: Vec<Attempt>,
}

/// A routed call that produced no response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingFailure {
    /// Why routing failed.
    pub kind: FailureKind,
    /// Tier the request was routed under.
    pub tier: ComplexityTier,
    /// Every failed call, in order.
    pub attempts: Vec<Attempt>,
}

/// Result of routing one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RoutingOutcome {
    /// A provider answered.
    Success(RoutingSuccess),
    /// No provider answered.
    Failure(RoutingFailure),
}

impl RoutingOutcome {
    pub(crate) fn failure(kind: FailureKind, tier: ComplexityTier, attempts: Vec<Attempt>) -> Self {
        Self::Failure(RoutingFailure {
            kind,
            tier,
            attempts,
        })
    }

    /// Whether a provider answered.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The provider that answered, if any.
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::Success(s) => Some(&s.provider),
            Self::Failure(_) => None,
        }
    }

    /// The response, if any.
    pub fn response(&self) -> Option<&NormalizedResponse> {
        match self {
            Self::Success(s) => Some(&s.response),
            Self::Failure(_) => None,
        }
    }

    /// Why routing failed, if it did.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success(_) => None,
            Self::Failure(f) => Some(f.kind),
        }
    }

    /// Ordered trail of failed calls.
    pub fn attempts(&self) -> &[Attempt] {
        match self {
            Self::Success(s) => &s.attempts,
            Self::Failure(f) => &f.attempts,
        }
    }

    /// Tier the request was routed under.
    pub fn tier(&self) -> ComplexityTier {
        match self {
            Self::Success(s) => s.tier,
            Self::Failure(f) => f.tier,
        }
    }

    /// Label for the `router_requests_total` metric.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Failure(f) => f.kind.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builders() {
        let req = RoutingRequest::new("hi", Capability::Text)
            .with_request_id("req-7")
            .with_provider_hint("cloud_b")
            .with_tier_hint(ComplexityTier::Complex);
        assert_eq!(req.request_id, "req-7");
        assert_eq!(req.provider_hint.as_deref(), Some("cloud_b"));
        assert_eq!(req.tier_hint, Some(ComplexityTier::Complex));
        assert!(req.deadline.is_none());
    }

    #[test]
    fn test_new_requests_get_distinct_ids() {
        let a = RoutingRequest::new("x", Capability::Text);
        let b = RoutingRequest::new("x", Capability::Text);
        assert_ne!(a.request_id, b.request_id);
    }

    #[tokio::test]
    async fn test_with_timeout_sets_future_deadline() {
        let req = RoutingRequest::new("x", Capability::Text).with_timeout(Duration::from_secs(5));
        let deadline = req.deadline.expect("test: deadline set");
        assert!(deadline > Instant::now());
    }

    #[test]
    fn test_outcome_accessors_on_failure() {
        let attempt = Attempt {
            provider: "local".into(),
            error: ErrorKind::Timeout,
            elapsed: Duration::from_millis(5),
        };
        let outcome = RoutingOutcome::failure(
            FailureKind::AllProvidersExhausted,
            ComplexityTier::Simple,
            vec![attempt.clone()],
        );
        assert!(!outcome.is_success());
        assert_eq!(outcome.provider(), None);
        assert_eq!(outcome.failure_kind(), Some(FailureKind::AllProvidersExhausted));
        assert_eq!(outcome.attempts(), &[attempt]);
        assert_eq!(outcome.label(), "all_providers_exhausted");
    }

    #[test]
    fn test_outcome_serializes_with_tag() {
        let outcome = RoutingOutcome::Success(RoutingSuccess {
            provider: "cloud_b".into(),
            response: NormalizedResponse::text("ok"),
            latency: Duration::from_millis(12),
            cost_estimate: 0.001,
            tier: ComplexityTier::Moderate,
            attempts: vec![],
        });
        let json = serde_json::to_value(&outcome).expect("test: serialize");
        assert_eq!(json["outcome"], "success");
        assert_eq!(json["provider"], "cloud_b");
        assert_eq!(json["tier"], "moderate");
    }
}
