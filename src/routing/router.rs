//! Fallback router.
//!
//! Owns the registry, health tracker, classifier, coalescer and cost
//! tracker, and runs the routing loop:
//!
//! 1. Classify the request into a [`ComplexityTier`].
//! 2. Join an identical in-flight request, or lead a new one.
//! 3. Order candidates for the tier and current health
//!    ([`plan_candidates`]).
//! 4. Call candidates one at a time under `min(provider timeout, remaining
//!    deadline)`. The first success is returned immediately; each failure is
//!    recorded against the provider's health and appended to the trail.
//! 5. Return `AllProvidersExhausted`, `NoEligibleProvider` or `Timeout` with
//!    the full ordered trail when nothing answers.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::coalesce::{CoalescingStats, Coalescer, InFlightKey, Slot, Waiter};
use crate::config::{validation, ConfigError, RouterConfig};
use crate::health::{HealthStatus, HealthTracker, ProviderHealthState};
use crate::metrics;
use crate::provider::{invoke_guarded, ErrorKind, ProviderAdapter, ProviderRequest};
use crate::routing::candidates::{plan_candidates, CandidatePlan};
use crate::routing::classifier::{ComplexityClassifier, ComplexityTier};
use crate::routing::cost_tracker::{estimate_tokens, CostSnapshot, CostTracker};
use crate::routing::registry::{CostEstimator, ProviderRegistry};
use crate::routing::request::{Attempt, FailureKind, RoutingOutcome, RoutingRequest, RoutingSuccess};
use crate::RouterError;

/// Builds a [`FallbackRouter`] from configuration plus one adapter per
/// configured provider.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use tokio_model_router::config::{ProviderConfig, RouterConfig};
/// use tokio_model_router::provider::{Capability, EchoProvider};
/// use tokio_model_router::routing::{FallbackRouter, ProviderKind};
///
/// let config = RouterConfig::with_providers(vec![ProviderConfig::new(
///     "local",
///     ProviderKind::Local,
///     vec![Capability::Text],
/// )]);
/// let router = FallbackRouter::builder(config)
///     .adapter("local", Arc::new(EchoProvider::new("local-echo")))
///     .build()?;
/// # Ok::<(), tokio_model_router::RouterError>(())
/// ```
pub struct RouterBuilder {
    config: RouterConfig,
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    estimators: HashMap<String, CostEstimator>,
}

impl RouterBuilder {
    /// Start from a configuration.
    pub fn from_config(config: RouterConfig) -> Self {
        Self {
            config,
            adapters: HashMap::new(),
            estimators: HashMap::new(),
        }
    }

    /// Attach the adapter for provider `name`.
    pub fn adapter(mut self, name: impl Into<String>, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(name.into(), adapter);
        self
    }

    /// Override the cost estimator for provider `name`.
    pub fn cost_estimator(mut self, name: impl Into<String>, estimator: CostEstimator) -> Self {
        self.estimators.insert(name.into(), estimator);
        self
    }

    /// Validate the configuration and build the router.
    ///
    /// # Errors
    ///
    /// - [`RouterError::Config`] if the configuration fails validation.
    /// - [`RouterError::MissingAdapter`] / [`RouterError::UnknownProvider`]
    ///   if adapters and configured providers do not match one-to-one.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn build(self) -> Result<FallbackRouter, RouterError> {
        validation::validate(&self.config).map_err(|errors| {
            ConfigError::Validation(
                errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("\n"),
            )
        })?;

        let registry =
            ProviderRegistry::build(&self.config.providers, self.adapters, self.estimators)?;
        let health = HealthTracker::new(registry.names(), self.config.health.clone());
        let costs = CostTracker::new(registry.descriptors());
        let coalescer = self.config.coalescing.enabled.then(Coalescer::new);

        for name in registry.names() {
            metrics::set_provider_health(name, HealthStatus::Healthy);
        }

        info!(
            router = %self.config.router.name,
            providers = registry.len(),
            coalescing = coalescer.is_some(),
            "router: built"
        );

        Ok(FallbackRouter {
            name: self.config.router.name,
            registry,
            health,
            classifier: ComplexityClassifier::new(self.config.classifier),
            coalescer,
            costs,
            default_timeout: Duration::from_millis(self.config.router.default_timeout_ms),
        })
    }
}

/// Routes requests across the provider chain with health-aware fallback.
///
/// Share one instance behind an `Arc`; every method takes `&self`.
///
/// # Panics
///
/// This type and its methods never panic.
pub struct FallbackRouter {
    name: String,
    registry: ProviderRegistry,
    health: HealthTracker,
    classifier: ComplexityClassifier,
    coalescer: Option<Coalescer>,
    costs: CostTracker,
    default_timeout: Duration,
}

impl FallbackRouter {
    /// Start building a router from `config`.
    pub fn builder(config: RouterConfig) -> RouterBuilder {
        RouterBuilder::from_config(config)
    }

    /// Route one request.
    ///
    /// Never returns an error: every failure mode is a
    /// [`RoutingOutcome::Failure`] carrying the ordered attempt trail.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub async fn route(&self, request: &RoutingRequest) -> RoutingOutcome {
        let tier = self.classify(request);

        let outcome = match &self.coalescer {
            None => self.execute(request, tier).await,
            Some(coalescer) => {
                let key = InFlightKey::new(request.capability, &request.prompt, tier);
                match coalescer.acquire(key) {
                    Slot::Leader(guard) => {
                        let outcome = self.execute(request, tier).await;
                        guard.complete(&outcome);
                        outcome
                    }
                    Slot::Waiter(waiter) => {
                        metrics::inc_coalesced();
                        self.await_leader(waiter, request, tier).await
                    }
                }
            }
        };

        metrics::inc_request(outcome.label());
        outcome
    }

    /// Tier the request would be routed under.
    pub fn classify(&self, request: &RoutingRequest) -> ComplexityTier {
        self.classifier
            .classify(&request.prompt, request.capability, request.tier_hint)
    }

    /// Candidate order the request would get right now.
    pub fn plan(&self, request: &RoutingRequest) -> CandidatePlan {
        self.plan_for(request, self.classify(request))
    }

    /// Read-only copy of every provider's health, ordered by name.
    pub fn health_snapshot(&self) -> BTreeMap<String, ProviderHealthState> {
        self.refresh_health_gauges(Utc::now());
        self.health.snapshot()
    }

    /// The health tracker, for operator overrides such as
    /// [`HealthTracker::reset`].
    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    /// Spend and savings so far.
    pub fn cost_snapshot(&self) -> CostSnapshot {
        self.costs.snapshot()
    }

    /// Coalescing counters, or `None` when coalescing is disabled.
    pub fn coalescing_stats(&self) -> Option<CoalescingStats> {
        self.coalescer.as_ref().map(Coalescer::stats)
    }

    /// The provider registry.
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Router name from configuration.
    pub fn name(&self) -> &str {
        &self.name
    }

    // ── Internals ──────────────────────────────────────────────────────

    fn plan_for(&self, request: &RoutingRequest, tier: ComplexityTier) -> CandidatePlan {
        let now = Utc::now();
        self.refresh_health_gauges(now);
        plan_candidates(
            self.registry.descriptors(),
            request.capability,
            tier,
            request.provider_hint.as_deref(),
            |name| self.health.is_eligible(name, now),
        )
    }

    /// Publish each provider's effective status, so a provider whose
    /// cooldown has expired stops reading as unavailable.
    fn refresh_health_gauges(&self, now: DateTime<Utc>) {
        for descriptor in self.registry.descriptors() {
            if let Some(status) = self.health.effective_status_at(&descriptor.name, now) {
                metrics::set_provider_health(&descriptor.name, status);
            }
        }
    }

    async fn await_leader(
        &self,
        waiter: Waiter,
        request: &RoutingRequest,
        tier: ComplexityTier,
    ) -> RoutingOutcome {
        let result = match request.deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, waiter.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(request_id = %request.request_id, "router: deadline passed waiting on coalesced request");
                    return RoutingOutcome::failure(FailureKind::Timeout, tier, Vec::new());
                }
            },
            None => waiter.wait().await,
        };

        result.unwrap_or_else(|_| {
            warn!(request_id = %request.request_id, "router: coalesced leader abandoned request");
            RoutingOutcome::failure(FailureKind::Timeout, tier, Vec::new())
        })
    }

    async fn execute(&self, request: &RoutingRequest, tier: ComplexityTier) -> RoutingOutcome {
        let plan = self.plan_for(request, tier);
        if plan.is_empty() {
            warn!(
                request_id = %request.request_id,
                capability = %request.capability,
                %tier,
                skipped = ?plan.skipped,
                "router: no eligible provider"
            );
            return RoutingOutcome::failure(FailureKind::NoEligibleProvider, tier, Vec::new());
        }

        debug!(
            request_id = %request.request_id,
            %tier,
            candidates = ?plan.ordered,
            hint_applied = plan.hint_applied,
            "router: candidates planned"
        );

        let mut attempts: Vec<Attempt> = Vec::new();

        for name in &plan.ordered {
            let Some(entry) = self.registry.get(name) else {
                continue;
            };

            // Another request may have tripped this provider since planning.
            if !self.health.is_eligible(name, Utc::now()) {
                debug!(provider = %name, "router: provider entered cooldown, skipping");
                continue;
            }

            let budget = entry.descriptor.timeout.unwrap_or(self.default_timeout);
            let (timeout, clipped) = match request.deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        warn!(
                            request_id = %request.request_id,
                            attempts = attempts.len(),
                            "router: deadline exceeded"
                        );
                        return RoutingOutcome::failure(FailureKind::Timeout, tier, attempts);
                    }
                    (budget.min(remaining), remaining < budget)
                }
                None => (budget, false),
            };

            let call = ProviderRequest {
                request_id: request.request_id.clone(),
                prompt: request.prompt.clone(),
                capability: request.capability,
                tier,
                timeout,
            };

            debug!(
                request_id = %request.request_id,
                provider = %name,
                timeout_ms = timeout.as_millis() as u64,
                "router: calling provider"
            );

            let started = Instant::now();
            let result = invoke_guarded(entry.adapter.as_ref(), &call).await;
            let elapsed = started.elapsed();

            match result {
                Ok(response) => {
                    self.health.record_success(name);
                    metrics::record_attempt(name, elapsed, None);
                    metrics::set_provider_health(name, HealthStatus::Healthy);

                    let cost_estimate = (entry.cost)(&call, &response);
                    self.costs.record(
                        name,
                        estimate_tokens(&call, &response),
                        cost_estimate,
                        !attempts.is_empty(),
                    );

                    info!(
                        request_id = %request.request_id,
                        provider = %name,
                        %tier,
                        latency_ms = elapsed.as_millis() as u64,
                        failed_attempts = attempts.len(),
                        "router: request served"
                    );

                    return RoutingOutcome::Success(RoutingSuccess {
                        provider: name.clone(),
                        response,
                        latency: elapsed,
                        cost_estimate,
                        tier,
                        attempts,
                    });
                }
                Err(kind) => {
                    metrics::record_attempt(name, elapsed, Some(kind));
                    let deadline_passed =
                        request.deadline.is_some_and(|deadline| Instant::now() >= deadline);
                    let cut_by_deadline = clipped && deadline_passed && kind == ErrorKind::Timeout;

                    // A call cut short by the caller's deadline says nothing
                    // about the provider.
                    if !cut_by_deadline {
                        if let Some(status) = self.health.record_failure(name, kind) {
                            metrics::set_provider_health(name, status);
                        }
                    }

                    warn!(
                        request_id = %request.request_id,
                        provider = %name,
                        %kind,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "router: provider failed"
                    );

                    attempts.push(Attempt {
                        provider: name.clone(),
                        error: kind,
                        elapsed,
                    });

                    if cut_by_deadline {
                        return RoutingOutcome::failure(FailureKind::Timeout, tier, attempts);
                    }
                }
            }
        }

        let outcome = exhausted(tier, attempts);
        warn!(
            request_id = %request.request_id,
            outcome = outcome.label(),
            attempts = outcome.attempts().len(),
            "router: no provider answered"
        );
        outcome
    }
}

/// Outcome once the candidate loop ends without a success. If every
/// candidate was skipped by the pre-call health check, nothing was called.
fn exhausted(tier: ComplexityTier, attempts: Vec<Attempt>) -> RoutingOutcome {
    let kind = if attempts.is_empty() {
        FailureKind::NoEligibleProvider
    } else {
        FailureKind::AllProvidersExhausted
    };
    RoutingOutcome::failure(kind, tier, attempts)
}
