//! Fixed provider registry.
//!
//! Built once at startup from the configured chain plus one adapter per
//! provider. Descriptors are immutable after registration and the set of
//! providers never changes, so lookups need no locking.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::provider::{Capability, NormalizedResponse, ProviderAdapter, ProviderRequest};
use crate::routing::cost_tracker::estimate_tokens;
use crate::RouterError;

/// Where a provider's model runs.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// On-box inference. Cheapest and least capable.
    Local,
    /// A small model on a hosted inference service.
    Hosted,
    /// A frontier model from a cloud vendor.
    Cloud,
}

impl ProviderKind {
    /// Stable identifier used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Hosted => "hosted",
            Self::Cloud => "cloud",
        }
    }
}

/// Static description of one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderDescriptor {
    /// Unique provider name.
    pub name: String,
    /// Where the model runs.
    pub kind: ProviderKind,
    /// Declared capability set.
    pub capabilities: BTreeSet<Capability>,
    /// Relative cost weight in USD per 1 000 tokens.
    pub cost_per_1k_tokens: f64,
    /// Default priority rank; lower is tried first.
    pub priority: u32,
    /// Per-call timeout override.
    pub timeout: Option<Duration>,
}

impl ProviderDescriptor {
    /// Build a descriptor from its configuration entry.
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            name: config.name.clone(),
            kind: config.kind,
            capabilities: config.capabilities.iter().copied().collect(),
            cost_per_1k_tokens: config.cost_per_1k_tokens,
            priority: config.priority,
            timeout: config.timeout_ms.map(Duration::from_millis),
        }
    }

    /// Whether this provider declares `capability`.
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Per-provider cost estimate for one successful call, in USD.
pub type CostEstimator = Arc<dyn Fn(&ProviderRequest, &NormalizedResponse) -> f64 + Send + Sync>;

/// Linear estimator: billed tokens × `cost_per_1k_tokens` / 1000.
///
/// Billed tokens are the adapter-reported count, or the word count of the
/// prompt plus the output when the adapter reports none.
pub fn linear_cost(cost_per_1k_tokens: f64) -> CostEstimator {
    Arc::new(move |request: &ProviderRequest, response: &NormalizedResponse| {
        estimate_tokens(request, response) as f64 * cost_per_1k_tokens / 1000.0
    })
}

/// A registered provider: descriptor, adapter and cost estimator.
pub struct ProviderEntry {
    /// Static description.
    pub descriptor: ProviderDescriptor,
    /// The backend adapter.
    pub adapter: Arc<dyn ProviderAdapter>,
    /// Cost estimator for successful calls.
    pub cost: CostEstimator,
}

impl std::fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Immutable registry of every configured provider, in configured order.
#[derive(Debug)]
pub struct ProviderRegistry {
    entries: Vec<ProviderEntry>,
    index: HashMap<String, usize>,
}

impl ProviderRegistry {
    /// Build the registry from the configured chain.
    ///
    /// Every configured provider must have an adapter, and every adapter and
    /// estimator must name a configured provider. Providers without an
    /// explicit estimator get [`linear_cost`] at their configured rate.
    ///
    /// # Errors
    ///
    /// - [`RouterError::MissingAdapter`] if a configured provider has no adapter.
    /// - [`RouterError::UnknownProvider`] if an adapter or estimator names a
    ///   provider absent from the chain.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn build(
        providers: &[ProviderConfig],
        mut adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
        mut estimators: HashMap<String, CostEstimator>,
    ) -> Result<Self, RouterError> {
        let mut entries = Vec::with_capacity(providers.len());
        let mut index = HashMap::with_capacity(providers.len());

        for config in providers {
            let adapter = adapters
                .remove(&config.name)
                .ok_or_else(|| RouterError::MissingAdapter(config.name.clone()))?;
            let cost = estimators
                .remove(&config.name)
                .unwrap_or_else(|| linear_cost(config.cost_per_1k_tokens));

            index.insert(config.name.clone(), entries.len());
            entries.push(ProviderEntry {
                descriptor: ProviderDescriptor::from_config(config),
                adapter,
                cost,
            });
        }

        if let Some(name) = adapters.into_keys().chain(estimators.into_keys()).next() {
            return Err(RouterError::UnknownProvider(name));
        }

        Ok(Self { entries, index })
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> Option<&ProviderEntry> {
        self.index.get(name).and_then(|&i| self.entries.get(i))
    }

    /// Descriptors in configured order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    /// Provider names in configured order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.descriptor.name.as_str())
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
