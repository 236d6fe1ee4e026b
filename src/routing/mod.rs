//! # Stage: Model Routing and Fallback
//!
//! ## Responsibility
//! Classify each request's complexity, order the provider chain for that
//! tier and the live health state, and call providers one at a time until
//! one answers. Concurrent identical requests share one upstream call.
//!
//! ## Guarantees
//! - Deterministic: identical request attributes, chain and health state
//!   always produce the identical candidate order (stable sorts throughout).
//! - Short-circuit: after the first success no further provider is called.
//! - Bounded: every provider call runs under `min(provider timeout,
//!   remaining deadline)` and is cancelled when it expires.
//! - Failures are values: `route()` always returns a [`RoutingOutcome`],
//!   carrying the ordered trail of failed attempts.
//!
//! ## NOT Responsible For
//! - Vendor wire protocols (adapters implement [`crate::provider::ProviderAdapter`])
//! - Budget alerting (the cost tracker only produces the numeric signal)
//! - Persisting health or cost state across restarts

pub mod candidates;
pub mod classifier;
pub mod cost_tracker;
pub mod registry;
pub mod request;
pub mod router;

// Re-exports for convenience
pub use candidates::{plan_candidates, CandidatePlan};
pub use classifier::{ComplexityClassifier, ComplexityTier, ScoreBreakdown};
pub use cost_tracker::{CostSnapshot, CostTracker, ProviderCost};
pub use registry::{linear_cost, CostEstimator, ProviderDescriptor, ProviderKind, ProviderRegistry};
pub use request::{
    Attempt, FailureKind, RoutingFailure, RoutingOutcome, RoutingRequest, RoutingSuccess,
};
pub use router::{FallbackRouter, RouterBuilder};
