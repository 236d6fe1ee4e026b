//! Configuration validation engine.
//!
//! ## Responsibility
//! Validate semantic constraints on a parsed [`RouterConfig`] that cannot
//! be expressed through the type system alone (range checks, ordering
//! between thresholds, uniqueness of provider names).
//!
//! ## Guarantees
//! - Every validation rule has at least one test that triggers it
//! - Validation collects *all* errors before returning (no short-circuit)
//! - Error messages include the field path and the invalid value
//!
//! ## NOT Responsible For
//! - Parsing TOML (that belongs to `loader`)
//! - File I/O (that belongs to `loader`)

use std::collections::HashSet;

use super::RouterConfig;

/// Errors arising from configuration parsing, validation, or I/O.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parsing failed.
    #[error("Parse error in {file}: {source}")]
    Parse {
        /// Path of the file that failed to parse.
        file: String,
        /// Underlying TOML deserialization error.
        #[source]
        source: toml::de::Error,
    },

    /// One or more semantic validation rules failed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A specific field has an out-of-range or contradictory value.
    #[error("Field '{field}' has invalid value {value}: {reason}")]
    InvalidField {
        /// Dot-separated field path (e.g., "health.unavailable_threshold").
        field: String,
        /// String representation of the invalid value.
        value: String,
        /// Human-readable explanation of the constraint.
        reason: String,
    },

    /// File I/O error.
    #[error("IO error reading {file}: {source}")]
    Io {
        /// Path of the file that could not be read.
        file: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

fn invalid(field: impl Into<String>, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidField {
        field: field.into(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Validate all semantic constraints on a [`RouterConfig`].
///
/// Collects every violation before returning so the caller sees the full
/// scope of issues at once.
///
/// # Returns
///
/// - `Ok(())` if all constraints pass.
/// - `Err(Vec<ConfigError>)` with every violation found.
///
/// # Panics
///
/// This function never panics.
pub fn validate(config: &RouterConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // ── Router section ───────────────────────────────────────────────
    if config.router.name.trim().is_empty() {
        errors.push(invalid("router.name", "", "router name must not be empty"));
    }

    if config.router.default_timeout_ms == 0 {
        errors.push(invalid(
            "router.default_timeout_ms",
            0,
            "timeout must be at least 1ms",
        ));
    }

    // ── Health thresholds ────────────────────────────────────────────
    let health = &config.health;
    if health.degraded_threshold == 0 {
        errors.push(invalid(
            "health.degraded_threshold",
            0,
            "must be at least 1",
        ));
    }

    if health.unavailable_threshold < health.degraded_threshold {
        errors.push(invalid(
            "health.unavailable_threshold",
            health.unavailable_threshold,
            "must be \u{2265} degraded_threshold",
        ));
    }

    if health.unavailable_cooldown_s == 0 {
        errors.push(invalid(
            "health.unavailable_cooldown_s",
            0,
            "cooldown must be at least 1 second",
        ));
    }

    if health.certain_failure_cooldown_s == 0 {
        errors.push(invalid(
            "health.certain_failure_cooldown_s",
            0,
            "cooldown must be at least 1 second",
        ));
    }

    // ── Classifier thresholds ────────────────────────────────────────
    let classifier = &config.classifier;
    for (field, value) in [
        ("classifier.simple_below", classifier.simple_below),
        ("classifier.complex_at", classifier.complex_at),
    ] {
        if !(0.0..=1.0).contains(&value) {
            errors.push(invalid(field, value, "must be between 0.0 and 1.0"));
        }
    }

    if classifier.simple_below > classifier.complex_at {
        errors.push(invalid(
            "classifier.simple_below",
            classifier.simple_below,
            "must be \u{2264} complex_at",
        ));
    }

    if classifier.medium_prompt_tokens >= classifier.long_prompt_tokens {
        errors.push(invalid(
            "classifier.medium_prompt_tokens",
            classifier.medium_prompt_tokens,
            "must be < long_prompt_tokens",
        ));
    }

    // ── Provider chain ───────────────────────────────────────────────
    if config.providers.is_empty() {
        errors.push(ConfigError::Validation(
            "at least one provider must be configured".into(),
        ));
    }

    let mut seen = HashSet::new();
    for (i, provider) in config.providers.iter().enumerate() {
        let field = |name: &str| format!("providers[{i}].{name}");

        if provider.name.trim().is_empty() {
            errors.push(invalid(field("name"), "", "provider name must not be empty"));
        } else if !seen.insert(provider.name.as_str()) {
            errors.push(invalid(
                field("name"),
                &provider.name,
                "provider names must be unique",
            ));
        }

        if provider.capabilities.is_empty() {
            errors.push(invalid(
                field("capabilities"),
                "[]",
                "at least one capability is required",
            ));
        }

        if !provider.cost_per_1k_tokens.is_finite() || provider.cost_per_1k_tokens < 0.0 {
            errors.push(invalid(
                field("cost_per_1k_tokens"),
                provider.cost_per_1k_tokens,
                "must be a finite, non-negative number",
            ));
        }

        if provider.timeout_ms == Some(0) {
            errors.push(invalid(
                field("timeout_ms"),
                0,
                "timeout must be at least 1ms",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
