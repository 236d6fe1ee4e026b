//! # Declarative Router Configuration
//!
//! ## Responsibility
//! Parse and validate the TOML file describing the provider chain and every
//! routing tunable. A deployment is described declaratively and run with:
//! ```text
//! model-router-demo router.toml
//! ```
//!
//! ## Guarantees
//! - Deterministic: same TOML input always produces the same `RouterConfig`
//! - Validated: all semantic constraints are checked before a config is accepted
//! - Type-safe: unknown provider kinds and capabilities fail at parse time
//! - Schema-exportable: JSON Schema output enables IDE autocomplete
//!
//! ## NOT Responsible For
//! - Attaching adapters to providers (that belongs to `routing::router`)
//! - Reloading at runtime: the provider registry is fixed once built

pub mod loader;
pub mod validation;

pub use loader::{load_from_file, load_from_str};
pub use validation::{validate, ConfigError};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::provider::Capability;
use crate::routing::registry::ProviderKind;

// ── Default value functions ──────────────────────────────────────────────

/// Default router name.
fn default_router_name() -> String {
    "model-router".to_string()
}

/// Default per-call timeout: 30 000ms.
fn default_call_timeout_ms() -> u64 {
    30_000
}

/// Default consecutive retryable failures before a provider is Degraded.
fn default_degraded_threshold() -> u32 {
    3
}

/// Default consecutive retryable failures before a provider is Unavailable.
fn default_unavailable_threshold() -> u32 {
    5
}

/// Default cooldown after reaching the unavailable threshold: 30 seconds.
fn default_unavailable_cooldown_s() -> u64 {
    30
}

/// Default cooldown after an auth or fatal failure: 300 seconds.
fn default_certain_failure_cooldown_s() -> u64 {
    300
}

/// Default score below which a request is Simple.
fn default_simple_below() -> f64 {
    0.3
}

/// Default score at or above which a request is Complex.
fn default_complex_at() -> f64 {
    0.6
}

/// Default word count above which a prompt counts as long.
fn default_long_prompt_tokens() -> usize {
    500
}

/// Default word count above which a prompt counts as medium length.
fn default_medium_prompt_tokens() -> usize {
    120
}

/// Default provider priority rank.
fn default_priority() -> u32 {
    100
}

/// Default enabled state: true.
fn default_true() -> bool {
    true
}

// ── Top-level config ─────────────────────────────────────────────────────

/// Root configuration for a router instance.
///
/// # Example
///
/// ```toml
/// [router]
/// name = "production"
///
/// [[providers]]
/// name = "local"
/// kind = "local"
/// capabilities = ["text", "summarize"]
///
/// [[providers]]
/// name = "cloud_a"
/// kind = "cloud"
/// capabilities = ["text", "summarize", "code", "reasoning"]
/// cost_per_1k_tokens = 0.01
/// ```
///
/// # Panics
///
/// This type never panics during construction or access.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RouterConfig {
    /// Router identity and call defaults.
    #[serde(default)]
    pub router: RouterSection,
    /// Provider health thresholds and cooldowns.
    #[serde(default)]
    pub health: HealthConfig,
    /// Complexity classifier thresholds.
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// In-flight request coalescing.
    #[serde(default)]
    pub coalescing: CoalescingConfig,
    /// Logging and metrics.
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// The provider chain, in configured order.
    pub providers: Vec<ProviderConfig>,
}

impl RouterConfig {
    /// Config with default sections around the given provider chain.
    pub fn with_providers(providers: Vec<ProviderConfig>) -> Self {
        Self {
            router: RouterSection::default(),
            health: HealthConfig::default(),
            classifier: ClassifierConfig::default(),
            coalescing: CoalescingConfig::default(),
            observability: ObservabilityConfig::default(),
            providers,
        }
    }
}

// ── Router identity ──────────────────────────────────────────────────────

/// Router identity and call defaults.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RouterSection {
    /// Human-readable router name, used in logs.
    #[serde(default = "default_router_name")]
    pub name: String,
    /// Optional description for documentation purposes.
    pub description: Option<String>,
    /// Per-call timeout (ms) for providers without their own `timeout_ms`.
    #[serde(default = "default_call_timeout_ms")]
    pub default_timeout_ms: u64,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            name: default_router_name(),
            description: None,
            default_timeout_ms: default_call_timeout_ms(),
        }
    }
}

// ── Health ───────────────────────────────────────────────────────────────

/// Provider health thresholds and cooldowns.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct HealthConfig {
    /// Consecutive retryable failures before a provider is marked Degraded.
    #[serde(default = "default_degraded_threshold")]
    pub degraded_threshold: u32,
    /// Consecutive retryable failures before a provider is marked
    /// Unavailable and put into cooldown. Must be ≥ `degraded_threshold`.
    #[serde(default = "default_unavailable_threshold")]
    pub unavailable_threshold: u32,
    /// Cooldown (s) after the unavailable threshold is reached.
    #[serde(default = "default_unavailable_cooldown_s")]
    pub unavailable_cooldown_s: u64,
    /// Cooldown (s) after an auth failure or fatal upstream error.
    #[serde(default = "default_certain_failure_cooldown_s")]
    pub certain_failure_cooldown_s: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            degraded_threshold: default_degraded_threshold(),
            unavailable_threshold: default_unavailable_threshold(),
            unavailable_cooldown_s: default_unavailable_cooldown_s(),
            certain_failure_cooldown_s: default_certain_failure_cooldown_s(),
        }
    }
}

// ── Classifier ───────────────────────────────────────────────────────────

/// Complexity classifier thresholds.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ClassifierConfig {
    /// Scores below this are Simple.
    #[serde(default = "default_simple_below")]
    pub simple_below: f64,
    /// Scores at or above this are Complex. Must be ≥ `simple_below`.
    #[serde(default = "default_complex_at")]
    pub complex_at: f64,
    /// Word count above which the long-prompt signal fires.
    #[serde(default = "default_long_prompt_tokens")]
    pub long_prompt_tokens: usize,
    /// Word count above which the medium-prompt signal fires.
    #[serde(default = "default_medium_prompt_tokens")]
    pub medium_prompt_tokens: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            simple_below: default_simple_below(),
            complex_at: default_complex_at(),
            long_prompt_tokens: default_long_prompt_tokens(),
            medium_prompt_tokens: default_medium_prompt_tokens(),
        }
    }
}

// ── Coalescing ───────────────────────────────────────────────────────────

/// In-flight request coalescing settings.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CoalescingConfig {
    /// Whether concurrent identical requests share one upstream call.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CoalescingConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// ── Observability ────────────────────────────────────────────────────────

/// Observability configuration: logging and metrics.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ObservabilityConfig {
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
    /// Whether to register Prometheus metrics at startup.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            metrics_enabled: true,
        }
    }
}

/// Log output format.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable, colorized log output.
    #[default]
    Pretty,
    /// Structured JSON log output for machine consumption.
    Json,
}

// ── Providers ────────────────────────────────────────────────────────────

/// One entry of the provider chain.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ProviderConfig {
    /// Unique provider name; adapters are attached by this name.
    pub name: String,
    /// Where the model runs.
    pub kind: ProviderKind,
    /// Capabilities this provider can serve. Must not be empty.
    pub capabilities: Vec<Capability>,
    /// Relative cost weight, in USD per 1 000 tokens.
    #[serde(default)]
    pub cost_per_1k_tokens: f64,
    /// Default priority rank. Lower ranks are tried first; ties keep
    /// configured order.
    #[serde(default = "default_priority")]
    pub priority: u32,
    /// Per-call timeout (ms). `None` uses `router.default_timeout_ms`.
    pub timeout_ms: Option<u64>,
}

impl ProviderConfig {
    /// Provider entry with default cost, priority and timeout.
    pub fn new(name: impl Into<String>, kind: ProviderKind, capabilities: Vec<Capability>) -> Self {
        Self {
            name: name.into(),
            kind,
            capabilities,
            cost_per_1k_tokens: 0.0,
            priority: default_priority(),
            timeout_ms: None,
        }
    }

    /// Set the cost weight.
    pub fn with_cost(mut self, cost_per_1k_tokens: f64) -> Self {
        self.cost_per_1k_tokens = cost_per_1k_tokens;
        self
    }

    /// Set the priority rank.
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Set a per-call timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Export the JSON Schema for `RouterConfig`.
///
/// # Errors
///
/// Returns `serde_json::Error` if schema serialization fails.
///
/// # Panics
///
/// This function never panics.
pub fn export_schema() -> Result<String, serde_json::Error> {
    let schema = schemars::schema_for!(RouterConfig);
    serde_json::to_string_pretty(&schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_call_timeout_ms_returns_30000() {
        assert_eq!(default_call_timeout_ms(), 30_000);
    }

    #[test]
    fn test_default_thresholds_are_ordered() {
        assert!(default_degraded_threshold() <= default_unavailable_threshold());
        assert!(default_simple_below() < default_complex_at());
        assert!(default_medium_prompt_tokens() < default_long_prompt_tokens());
    }

    #[test]
    fn test_default_certain_cooldown_exceeds_threshold_cooldown() {
        assert!(default_certain_failure_cooldown_s() > default_unavailable_cooldown_s());
    }

    #[test]
    fn test_provider_kind_serializes_to_snake_case() {
        let json = serde_json::to_string(&ProviderKind::Hosted).expect("test: serialization");
        assert_eq!(json, "\"hosted\"");
    }

    #[test]
    fn test_log_format_deserializes_from_snake_case() {
        let fmt: LogFormat = serde_json::from_str("\"json\"").expect("test: deserialization");
        assert_eq!(fmt, LogFormat::Json);
    }

    #[test]
    fn test_export_schema_produces_valid_json() {
        let schema = export_schema().expect("test: schema export");
        let parsed: serde_json::Value =
            serde_json::from_str(&schema).expect("test: schema is valid JSON");
        assert!(parsed.get("properties").is_some() || parsed.get("$ref").is_some());
    }

    #[test]
    fn test_minimal_toml_fills_defaults() {
        let toml_str = r#"
[[providers]]
name = "local"
kind = "local"
capabilities = ["text"]
"#;
        let config: RouterConfig = toml::from_str(toml_str).expect("test: minimal toml");
        assert_eq!(config.router.default_timeout_ms, 30_000);
        assert_eq!(config.health, HealthConfig::default());
        assert_eq!(config.classifier, ClassifierConfig::default());
        assert!(config.coalescing.enabled);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
        assert_eq!(config.providers[0].priority, 100);
        assert_eq!(config.providers[0].cost_per_1k_tokens, 0.0);
        assert_eq!(config.providers[0].timeout_ms, None);
    }

    #[test]
    fn test_unknown_capability_fails_to_parse() {
        let toml_str = r#"
[[providers]]
name = "local"
kind = "local"
capabilities = ["telepathy"]
"#;
        assert!(toml::from_str::<RouterConfig>(toml_str).is_err());
    }

    #[test]
    fn test_provider_config_builders() {
        let p = ProviderConfig::new("cloud", ProviderKind::Cloud, vec![Capability::Code])
            .with_cost(0.02)
            .with_priority(5)
            .with_timeout_ms(1_500);
        assert_eq!(p.cost_per_1k_tokens, 0.02);
        assert_eq!(p.priority, 5);
        assert_eq!(p.timeout_ms, Some(1_500));
    }
}
