//! In-flight Request Coalescing
//!
//! Concurrent identical requests share one upstream call. The first caller
//! for a key becomes the *leader* and performs the routed call; callers that
//! arrive with the same key before it finishes become *waiters* and receive
//! the leader's outcome verbatim.
//!
//! ## Usage
//!
//! ```rust,ignore
//! match coalescer.acquire(key) {
//!     Slot::Leader(guard) => {
//!         let outcome = route_uncoalesced(&request).await;
//!         guard.complete(&outcome);
//!         outcome
//!     }
//!     Slot::Waiter(waiter) => waiter.wait().await?,
//! }
//! ```
//!
//! ## Guarantees
//! - At most one leader per key at any instant
//! - The key is evicted before the outcome is broadcast, so a caller
//!   arriving after completion starts a fresh call rather than missing the
//!   broadcast
//! - If the leader is dropped without completing, the key is evicted and
//!   every waiter observes [`CoalesceError::LeaderAbandoned`]
//!
//! Nothing is cached: once a key completes it is gone.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::provider::Capability;
use crate::routing::classifier::ComplexityTier;
use crate::routing::request::RoutingOutcome;

/// Identity of an in-flight request: capability, normalized prompt and tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InFlightKey {
    capability: Capability,
    prompt: String,
    tier: ComplexityTier,
}

impl InFlightKey {
    /// Build a key. The prompt is normalized with [`normalize_prompt`].
    pub fn new(capability: Capability, prompt: &str, tier: ComplexityTier) -> Self {
        Self {
            capability,
            prompt: normalize_prompt(prompt),
            tier,
        }
    }

    /// Short hashed form for logs, e.g. `inflight:3f2a…`.
    pub fn fingerprint(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        format!("inflight:{:x}", hasher.finish())
    }
}

impl fmt::Display for InFlightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint())
    }
}

/// Trim and collapse runs of whitespace to a single space.
///
/// Case is preserved; prompts differing only in case are different requests.
pub fn normalize_prompt(prompt: &str) -> String {
    prompt.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Errors a waiter can observe.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoalesceError {
    /// The leader was dropped before it produced an outcome.
    #[error("coalesced leader dropped before completing")]
    LeaderAbandoned,
}

struct InFlight {
    leader_id: Uuid,
    tx: broadcast::Sender<RoutingOutcome>,
}

/// Registry of in-flight keys.
///
/// Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct Coalescer {
    inflight: Arc<DashMap<InFlightKey, InFlight>>,
    coalesced_total: Arc<AtomicU64>,
}

/// Result of [`Coalescer::acquire`].
pub enum Slot {
    /// Caller must perform the call and then [`LeaderGuard::complete`].
    Leader(LeaderGuard),
    /// Caller should [`Waiter::wait`] for the leader's outcome.
    Waiter(Waiter),
}

impl Slot {
    /// Whether this caller is the leader.
    pub fn is_leader(&self) -> bool {
        matches!(self, Self::Leader(_))
    }
}

/// Point-in-time coalescing counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoalescingStats {
    /// Keys with a leader currently running.
    pub in_flight: usize,
    /// Waiters that joined an existing leader since startup.
    pub coalesced_total: u64,
}

impl Coalescer {
    /// Create an empty coalescer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Become the leader for `key`, or join the current leader as a waiter.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn acquire(&self, key: InFlightKey) -> Slot {
        match self.inflight.entry(key.clone()) {
            Entry::Occupied(existing) => {
                let rx = existing.get().tx.subscribe();
                self.coalesced_total.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "coalesce: joined in-flight request");
                Slot::Waiter(Waiter { key, rx })
            }
            Entry::Vacant(vacant) => {
                let (tx, _) = broadcast::channel(1);
                let leader_id = Uuid::new_v4();
                vacant.insert(InFlight {
                    leader_id,
                    tx: tx.clone(),
                });
                debug!(key = %key, "coalesce: leading new request");
                Slot::Leader(LeaderGuard {
                    inflight: self.inflight.clone(),
                    key,
                    leader_id,
                    tx,
                    completed: false,
                })
            }
        }
    }

    /// Current counters.
    pub fn stats(&self) -> CoalescingStats {
        CoalescingStats {
            in_flight: self.inflight.len(),
            coalesced_total: self.coalesced_total.load(Ordering::Relaxed),
        }
    }
}

/// Held by the leader of a key. Evicts the key when completed or dropped.
pub struct LeaderGuard {
    inflight: Arc<DashMap<InFlightKey, InFlight>>,
    key: InFlightKey,
    leader_id: Uuid,
    tx: broadcast::Sender<RoutingOutcome>,
    completed: bool,
}

impl LeaderGuard {
    /// Evict the key, then broadcast `outcome` to every waiter.
    ///
    /// Returns the number of waiters that received it.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn complete(mut self, outcome: &RoutingOutcome) -> usize {
        self.completed = true;
        self.evict();
        let delivered = self.tx.send(outcome.clone()).unwrap_or(0);
        debug!(key = %self.key, waiters = delivered, "coalesce: outcome broadcast");
        delivered
    }

    fn evict(&self) {
        self.inflight
            .remove_if(&self.key, |_, entry| entry.leader_id == self.leader_id);
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        if !self.completed {
            self.evict();
            debug!(key = %self.key, "coalesce: leader dropped before completing");
        }
    }
}

/// Held by a caller waiting on another caller's in-flight request.
pub struct Waiter {
    key: InFlightKey,
    rx: broadcast::Receiver<RoutingOutcome>,
}

impl Waiter {
    /// Wait for the leader's outcome.
    ///
    /// Callers bound this with their own deadline.
    ///
    /// # Errors
    ///
    /// [`CoalesceError::LeaderAbandoned`] if the leader was dropped first.
    pub async fn wait(mut self) -> Result<RoutingOutcome, CoalesceError> {
        match self.rx.recv().await {
            Ok(outcome) => Ok(outcome),
            Err(_) => {
                debug!(key = %self.key, "coalesce: leader abandoned");
                Err(CoalesceError::LeaderAbandoned)
            }
        }
    }
}
