//! # tokio-model-router
//!
//! Model routing and fallback over Tokio: classify each request's
//! complexity, order a chain of local, hosted and cloud model providers for
//! that tier and their live health, and call them one at a time until one
//! answers.
//!
//! ## Architecture
//!
//! ```text
//! RoutingRequest
//!   → ComplexityClassifier (Simple | Moderate | Complex)
//!   → Coalescer            (join identical in-flight request, or lead)
//!   → plan_candidates      (capability → priority → tier → health → hint)
//!   → ProviderAdapter × N  (timeout + cancellation, first success wins)
//!   → HealthTracker / CostTracker / metrics
//!   → RoutingOutcome       (Success | Failure, with attempt trail)
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_model_router::config::{ProviderConfig, RouterConfig};
//! use tokio_model_router::provider::{Capability, EchoProvider};
//! use tokio_model_router::routing::{FallbackRouter, ProviderKind, RoutingRequest};
//!
//! # async fn example() -> Result<(), tokio_model_router::RouterError> {
//! let config = RouterConfig::with_providers(vec![
//!     ProviderConfig::new("local", ProviderKind::Local, vec![Capability::Text]),
//! ]);
//! let router = FallbackRouter::builder(config)
//!     .adapter("local", Arc::new(EchoProvider::new("local-echo")))
//!     .build()?;
//!
//! let outcome = router.route(&RoutingRequest::new("hello", Capability::Text)).await;
//! assert!(outcome.is_success());
//! # Ok(()) }
//! ```

// ── Lint policy ───────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub mod coalesce;
pub mod config;
pub mod health;
pub mod metrics;
pub mod provider;
pub mod routing;

// Re-exports for convenience
pub use config::{ConfigError, LogFormat, RouterConfig};
pub use health::{HealthStatus, HealthTracker, ProviderHealthState};
pub use provider::{
    Capability, EchoProvider, ErrorKind, FailingProvider, NormalizedResponse, ProviderAdapter,
    ProviderRequest,
};
pub use routing::{
    ComplexityTier, FailureKind, FallbackRouter, RouterBuilder, RoutingOutcome, RoutingRequest,
};

/// Initialise the global tracing subscriber.
///
/// Reads the `LOG_FORMAT` environment variable to choose output format:
/// - `"json"`: structured JSON output for log aggregators
/// - anything else (including unset): human-readable pretty output
///
/// Filter level is controlled by `RUST_LOG` (e.g. `RUST_LOG=info`).
///
/// # Errors
///
/// Returns [`RouterError::Other`] if the global subscriber has already
/// been set (e.g. by a previous call or a test harness).
///
/// # Panics
///
/// This function never panics.
///
/// # Example
///
/// ```no_run
/// # use tokio_model_router::{init_tracing, RouterError};
/// # fn example() -> Result<(), RouterError> {
/// init_tracing()?;
/// # Ok(()) }
/// ```
pub fn init_tracing() -> Result<(), RouterError> {
    let format = match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => LogFormat::Json,
        _ => LogFormat::Pretty,
    };
    init_tracing_with(format)
}

/// Initialise the global tracing subscriber with an explicit format,
/// typically `config.observability.log_format`.
///
/// # Errors
///
/// Returns [`RouterError::Other`] if a global subscriber is already set.
pub fn init_tracing_with(format: LogFormat) -> Result<(), RouterError> {
    let result = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_current_span(true)
            .with_span_list(true)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init(),
    };
    result.map_err(|e| RouterError::Other(format!("tracing init failed: {e}")))
}

/// Top-level router errors.
///
/// Only construction can fail; routing itself reports failures as
/// [`RoutingOutcome::Failure`] values.
#[derive(Error, Debug)]
pub enum RouterError {
    /// Configuration failed to load or validate.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// A configured provider has no adapter attached.
    #[error("no adapter registered for provider '{0}'")]
    MissingAdapter(String),
    /// An adapter or cost estimator names a provider that is not configured.
    #[error("provider '{0}' is not in the configured chain")]
    UnknownProvider(String),
    /// Catch-all for errors that do not fit a specific variant.
    #[error("{0}")]
    Other(String),
}
