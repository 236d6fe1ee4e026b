//! Candidate ordering.
//!
//! Pure function from (chain, capability, tier, hint, eligibility) to the
//! ordered list of providers the router will try. Every sort is stable, so
//! identical inputs always produce identical order and ties keep the
//! configured chain order.
//!
//! ## Steps
//! 1. Stable-sort the chain by priority rank.
//! 2. Drop providers that do not declare the required capability.
//! 3. Re-rank per tier:
//!    - `Simple`: Local → Hosted → Cloud, cheapest first within a kind
//!    - `Moderate`: unchanged
//!    - `Complex`: Cloud → Hosted → Local (small models demoted to the tail)
//! 4. Drop providers that are not eligible (cooldown active).
//! 5. Move an eligible hinted provider to the front. An ineligible or
//!    unknown hint is ignored.

use std::cmp::Ordering;

use serde::Serialize;

use crate::provider::Capability;
use crate::routing::classifier::ComplexityTier;
use crate::routing::registry::{ProviderDescriptor, ProviderKind};

/// The computed order for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidatePlan {
    /// Providers to try, in order.
    pub ordered: Vec<String>,
    /// Capable providers skipped because they were ineligible, in tier order.
    pub skipped: Vec<String>,
    /// Whether the provider hint was honoured.
    pub hint_applied: bool,
}

impl CandidatePlan {
    /// Whether nothing can be tried.
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

/// Compute the candidate order.
///
/// # Arguments
///
/// * `chain`: Descriptors in configured order.
/// * `capability`: Capability the request requires.
/// * `tier`: Tier the request was classified as.
/// * `hint`: Provider the caller prefers.
/// * `is_eligible`: Health check for a provider name.
///
/// # Panics
///
/// This function never panics.
pub fn plan_candidates<'a, F>(
    chain: impl IntoIterator<Item = &'a ProviderDescriptor>,
    capability: Capability,
    tier: ComplexityTier,
    hint: Option<&str>,
    is_eligible: F,
) -> CandidatePlan
where
    F: Fn(&str) -> bool,
{
    let mut capable: Vec<&ProviderDescriptor> = chain
        .into_iter()
        .filter(|d| d.supports(capability))
        .collect();

    capable.sort_by_key(|d| d.priority);
    capable.sort_by(|a, b| tier_order(tier, a, b));

    let (eligible, ineligible): (Vec<_>, Vec<_>) =
        capable.into_iter().partition(|d| is_eligible(&d.name));

    let mut ordered: Vec<String> = eligible.into_iter().map(|d| d.name.clone()).collect();
    let skipped = ineligible.into_iter().map(|d| d.name.clone()).collect();

    let mut hint_applied = false;
    if let Some(hint) = hint {
        if let Some(pos) = ordered.iter().position(|name| name == hint) {
            let hinted = ordered.remove(pos);
            ordered.insert(0, hinted);
            hint_applied = true;
        }
    }

    CandidatePlan {
        ordered,
        skipped,
        hint_applied,
    }
}

fn tier_order(tier: ComplexityTier, a: &ProviderDescriptor, b: &ProviderDescriptor) -> Ordering {
    match tier {
        ComplexityTier::Simple => kind_rank(a.kind)
            .cmp(&kind_rank(b.kind))
            .then_with(|| a.cost_per_1k_tokens.total_cmp(&b.cost_per_1k_tokens)),
        ComplexityTier::Moderate => Ordering::Equal,
        ComplexityTier::Complex => kind_rank(b.kind).cmp(&kind_rank(a.kind)),
    }
}

fn kind_rank(kind: ProviderKind) -> u8 {
    match kind {
        ProviderKind::Local => 0,
        ProviderKind::Hosted => 1,
        ProviderKind::Cloud => 2,
    }
}
