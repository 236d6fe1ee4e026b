//! Prometheus metrics for the router.
//!
//! ## Usage
//!
//! Call [`init_metrics`] once at process startup. The helper functions
//! (`record_attempt`, `inc_request`, …) are no-ops if `init_metrics` was
//! never called, so routing is always safe to run and observability simply
//! degrades gracefully.
//!
//! ## Metrics Exposed
//!
//! | Name | Type | Labels |
//! |------|------|--------|
//! | `router_requests_total` | Counter | `outcome` |
//! | `router_provider_attempts_total` | Counter | `provider`, `result` |
//! | `router_provider_errors_total` | Counter | `provider`, `kind` |
//! | `router_provider_call_duration_seconds` | Histogram | `provider` |
//! | `router_coalesced_waiters_total` | Counter | |
//! | `router_provider_health` | Gauge | `provider` |
//!
//! The health gauge reports the effective status: a provider whose cooldown
//! has expired reads 1 until its next call succeeds or fails.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use prometheus::{
    core::Collector, CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, IntGaugeVec,
    Opts, Registry, TextEncoder,
};

use crate::config::ObservabilityConfig;
use crate::health::HealthStatus;
use crate::provider::ErrorKind;
use crate::RouterError;

// ── Internal metrics bundle ────────────────────────────────────────────────

/// All Prometheus metrics for the router, bundled together so they can be
/// stored in a single [`OnceLock`] and initialised atomically.
pub struct Metrics {
    /// Prometheus registry that owns all metric descriptors.
    pub registry: Registry,
    /// Routed requests by outcome label.
    pub requests_total: CounterVec,
    /// Provider calls by provider and result (`success` / `failure`).
    pub provider_attempts: CounterVec,
    /// Provider failures by provider and error kind.
    pub provider_errors: CounterVec,
    /// Provider call latency.
    pub provider_call_duration: HistogramVec,
    /// Callers that joined an in-flight request instead of calling upstream.
    pub coalesced_waiters: IntCounter,
    /// Provider health: 0 healthy, 1 degraded, 2 unavailable.
    pub provider_health: IntGaugeVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

fn metrics_err(e: prometheus::Error) -> RouterError {
    RouterError::Other(format!("metrics init failed: {e}"))
}

fn register<C: Collector + Clone + 'static>(registry: &Registry, c: C) -> Result<C, RouterError> {
    registry.register(Box::new(c.clone())).map_err(metrics_err)?;
    Ok(c)
}

impl Metrics {
    /// Build a bundle on a fresh registry, every metric name starting with
    /// `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Other`] if a descriptor is invalid.
    pub fn new(prefix: &str) -> Result<Self, RouterError> {
        let registry = Registry::new();

        let requests_total = register(
            &registry,
            CounterVec::new(
                Opts::new(format!("{prefix}_requests_total"), "Routed requests by outcome"),
                &["outcome"],
            )
            .map_err(metrics_err)?,
        )?;

        let provider_attempts = register(
            &registry,
            CounterVec::new(
                Opts::new(
                    format!("{prefix}_provider_attempts_total"),
                    "Provider calls by result",
                ),
                &["provider", "result"],
            )
            .map_err(metrics_err)?,
        )?;

        let provider_errors = register(
            &registry,
            CounterVec::new(
                Opts::new(
                    format!("{prefix}_provider_errors_total"),
                    "Provider failures by error kind",
                ),
                &["provider", "kind"],
            )
            .map_err(metrics_err)?,
        )?;

        let provider_call_duration = register(
            &registry,
            HistogramVec::new(
                HistogramOpts::new(
                    format!("{prefix}_provider_call_duration_seconds"),
                    "Provider call latency",
                ),
                &["provider"],
            )
            .map_err(metrics_err)?,
        )?;

        let coalesced_waiters = register(
            &registry,
            IntCounter::new(
                format!("{prefix}_coalesced_waiters_total"),
                "Requests served by joining an in-flight call",
            )
            .map_err(metrics_err)?,
        )?;

        let provider_health = register(
            &registry,
            IntGaugeVec::new(
                Opts::new(
                    format!("{prefix}_provider_health"),
                    "Provider health (0 healthy, 1 degraded or cooldown expired, 2 unavailable)",
                ),
                &["provider"],
            )
            .map_err(metrics_err)?,
        )?;

        Ok(Self {
            registry,
            requests_total,
            provider_attempts,
            provider_errors,
            provider_call_duration,
            coalesced_waiters,
            provider_health,
        })
    }
}

// ── Initialisation ─────────────────────────────────────────────────────────

/// Initialise all Prometheus metrics on a private registry.
///
/// Calling it a second time is a no-op (returns `Ok(())`).
///
/// # Errors
///
/// Returns [`RouterError::Other`] if metric construction or registration
/// fails.
///
/// # Panics
///
/// This function never panics.
pub fn init_metrics() -> Result<(), RouterError> {
    if METRICS.get().is_some() {
        return Ok(());
    }
    // A racing initialiser builds identical descriptors; first one wins.
    let _ = METRICS.set(Metrics::new("router")?);
    Ok(())
}

/// Initialise metrics only when `observability.metrics_enabled` is set.
///
/// Returns whether metrics are now live. With metrics disabled every helper
/// below stays a no-op and [`gather_metrics`] stays empty.
///
/// # Errors
///
/// Propagates [`init_metrics`] failures.
pub fn init_from_config(config: &ObservabilityConfig) -> Result<bool, RouterError> {
    if !config.metrics_enabled {
        return Ok(false);
    }
    init_metrics()?;
    Ok(true)
}

fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

// ── Public helper functions ────────────────────────────────────────────────

/// Count one routed request under its outcome label.
///
/// No-op if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn inc_request(outcome: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.requests_total.get_metric_with_label_values(&[outcome]) {
            c.inc();
        }
    }
}

/// Record one provider call: latency, result, and error kind on failure.
///
/// No-op if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn record_attempt(provider: &str, elapsed: Duration, error: Option<ErrorKind>) {
    let Some(m) = metrics() else {
        return;
    };
    if let Ok(h) = m
        .provider_call_duration
        .get_metric_with_label_values(&[provider])
    {
        h.observe(elapsed.as_secs_f64());
    }
    let result = if error.is_some() { "failure" } else { "success" };
    if let Ok(c) = m
        .provider_attempts
        .get_metric_with_label_values(&[provider, result])
    {
        c.inc();
    }
    if let Some(kind) = error {
        if let Ok(c) = m
            .provider_errors
            .get_metric_with_label_values(&[provider, kind.as_str()])
        {
            c.inc();
        }
    }
}

/// Count one caller that joined an in-flight request.
///
/// No-op if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn inc_coalesced() {
    if let Some(m) = metrics() {
        m.coalesced_waiters.inc();
    }
}

/// Publish a provider's health status.
///
/// No-op if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn set_provider_health(provider: &str, status: HealthStatus) {
    if let Some(m) = metrics() {
        if let Ok(g) = m.provider_health.get_metric_with_label_values(&[provider]) {
            g.set(status.as_gauge());
        }
    }
}

/// Gather all registered metrics as a raw list of metric families.
///
/// Returns an empty `Vec` if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    metrics().map_or_else(Vec::new, |m| m.registry.gather())
}

/// Gather and encode all metrics in the Prometheus text exposition format.
///
/// Returns an empty string if metrics have not been initialised or if
/// encoding fails.
///
/// # Panics
///
/// This function never panics.
pub fn gather_metrics() -> String {
    let families = gather();
    if families.is_empty() {
        return String::new();
    }
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// A structured snapshot of key metric counters.
#[derive(Debug, Default)]
pub struct MetricsSummary {
    /// Routed request counts keyed by outcome label.
    pub requests_total: HashMap<String, u64>,
    /// Provider error counts keyed by `"provider:kind"`.
    pub provider_errors: HashMap<String, u64>,
    /// Callers served by coalescing.
    pub coalesced_waiters: u64,
}

fn label<'a>(metric: &'a prometheus::proto::Metric, name: &str) -> &'a str {
    metric
        .get_label()
        .iter()
        .find(|l| l.get_name() == name)
        .map_or("unknown", |l| l.get_value())
}

impl Metrics {
    /// Structured summary of this bundle's counters.
    pub fn summary(&self) -> MetricsSummary {
        let mut summary = MetricsSummary {
            coalesced_waiters: self.coalesced_waiters.get(),
            ..MetricsSummary::default()
        };

        for family in self.requests_total.collect() {
            for metric in family.get_metric() {
                let value = metric.get_counter().get_value() as u64;
                summary
                    .requests_total
                    .insert(label(metric, "outcome").to_string(), value);
            }
        }

        for family in self.provider_errors.collect() {
            for metric in family.get_metric() {
                let key = format!("{}:{}", label(metric, "provider"), label(metric, "kind"));
                let value = metric.get_counter().get_value() as u64;
                summary.provider_errors.insert(key, value);
            }
        }

        summary
    }
}

/// Return a structured summary of current metric counter values.
///
/// Returns a zeroed [`MetricsSummary`] if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn get_metrics_summary() -> MetricsSummary {
    metrics().map_or_else(MetricsSummary::default, Metrics::summary)
}
