//! Configuration file loading.
//!
//! ## Responsibility
//! Read a TOML file from disk, parse it into a [`RouterConfig`], and run
//! validation before returning. This is the primary entry point for loading
//! router configuration at startup.
//!
//! ## Guarantees
//! - A successfully loaded config is always validated
//! - I/O errors and parse errors are distinguished in the error type
//! - File path is included in every error message
//!
//! ## NOT Responsible For
//! - Defining the config schema (that belongs to `mod.rs`)
//! - Building the router from a config (that belongs to `routing::router`)

use std::path::Path;

use super::validation::{self, ConfigError};
use super::RouterConfig;

/// Load a [`RouterConfig`] from a TOML file.
///
/// Reads the file, parses it as TOML, and validates all semantic constraints.
///
/// # Returns
///
/// - `Ok(RouterConfig)` if the file is readable, well-formed, and valid.
/// - `Err(ConfigError::Io)` if the file cannot be read.
/// - `Err(ConfigError::Parse)` if the TOML is malformed.
/// - `Err(ConfigError::Validation)` if semantic constraints are violated.
///
/// # Panics
///
/// This function never panics.
///
/// # Example
///
/// ```rust,ignore
/// use tokio_model_router::config::loader::load_from_file;
/// use std::path::Path;
///
/// let config = load_from_file(Path::new("router.toml"))?;
/// println!("Loaded router: {}", config.router.name);
/// ```
pub fn load_from_file(path: &Path) -> Result<RouterConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        file: path.display().to_string(),
        source: e,
    })?;

    load_from_str(&content, &path.display().to_string())
}

/// Load a [`RouterConfig`] from a TOML string.
///
/// Useful for testing or embedding configs without file I/O.
///
/// # Arguments
///
/// * `content`: TOML content as a string.
/// * `source_name`: Identifier for the source (used in error messages).
///
/// # Panics
///
/// This function never panics.
pub fn load_from_str(content: &str, source_name: &str) -> Result<RouterConfig, ConfigError> {
    let config: RouterConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
        file: source_name.to_string(),
        source: e,
    })?;

    validation::validate(&config).map_err(|errors| {
        ConfigError::Validation(
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("\n"),
        )
    })?;

    tracing::debug!(
        source = source_name,
        router = %config.router.name,
        providers = config.providers.len(),
        "router config loaded"
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Capability;
    use crate::routing::registry::ProviderKind;
    use std::io::Write;

    const VALID_TOML: &str = r#"
[router]
name = "test"
default_timeout_ms = 2000

[health]
degraded_threshold = 2
unavailable_threshold = 4
unavailable_cooldown_s = 10
certain_failure_cooldown_s = 120

[classifier]
simple_below = 0.25
complex_at = 0.7

[coalescing]
enabled = false

[observability]
log_format = "json"

[[providers]]
name = "local"
kind = "local"
capabilities = ["text", "summarize"]

[[providers]]
name = "hosted_small"
kind = "hosted"
capabilities = ["text", "summarize", "code"]
cost_per_1k_tokens = 0.0005
priority = 50

[[providers]]
name = "cloud_a"
kind = "cloud"
capabilities = ["text", "summarize", "code", "long_form", "reasoning", "image_caption"]
cost_per_1k_tokens = 0.01
timeout_ms = 15000
"#;

    #[test]
    fn test_load_from_str_valid_toml_succeeds() {
        let config = load_from_str(VALID_TOML, "test").expect("test: valid config");
        assert_eq!(config.router.name, "test");
        assert_eq!(config.router.default_timeout_ms, 2000);
        assert_eq!(config.health.unavailable_threshold, 4);
        assert!(!config.coalescing.enabled);
        assert_eq!(config.providers.len(), 3);
        assert_eq!(config.providers[1].kind, ProviderKind::Hosted);
        assert_eq!(config.providers[1].priority, 50);
        assert_eq!(config.providers[2].timeout_ms, Some(15_000));
        assert!(config.providers[2]
            .capabilities
            .contains(&Capability::ImageCaption));
    }

    #[test]
    fn test_load_from_str_invalid_toml_returns_parse_error() {
        let result = load_from_str("not valid toml [[[", "bad.toml");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_from_str_validation_failure_returns_validation_error() {
        let toml_str = r#"
[health]
degraded_threshold = 6
unavailable_threshold = 2

[[providers]]
name = "local"
kind = "local"
capabilities = ["text"]
"#;
        let result = load_from_str(toml_str, "inverted.toml");
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("health.unavailable_threshold"));
    }

    #[test]
    fn test_load_from_str_missing_providers_returns_parse_error() {
        let result = load_from_str("[router]\nname = \"x\"\n", "no-providers.toml");
        assert!(matches!(result.unwrap_err(), ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_from_str_empty_provider_list_returns_validation_error() {
        let result = load_from_str("providers = []\n", "empty.toml");
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_load_from_file_valid_toml_succeeds() {
        let dir = tempfile::tempdir().expect("test: create tempdir");
        let path = dir.path().join("router.toml");
        let mut f = std::fs::File::create(&path).expect("test: create file");
        f.write_all(VALID_TOML.as_bytes()).expect("test: write");
        drop(f);

        let config = load_from_file(&path).expect("test: load from file");
        assert_eq!(config.router.name, "test");
    }

    #[test]
    fn test_load_from_file_missing_file_returns_io_error() {
        let result = load_from_file(Path::new("/nonexistent/path/router.toml"));
        assert!(matches!(result.unwrap_err(), ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_from_file_invalid_toml_returns_parse_error() {
        let dir = tempfile::tempdir().expect("test: create tempdir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not valid [[[").expect("test: write");

        let result = load_from_file(&path);
        assert!(matches!(result.unwrap_err(), ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_from_str_source_name_appears_in_error() {
        let err = load_from_str("invalid [[[", "my-source.toml").unwrap_err();
        assert!(err.to_string().contains("my-source.toml"));
    }

    #[test]
    fn test_load_from_str_all_kinds_accepted() {
        for kind in &["local", "hosted", "cloud"] {
            let toml_str = format!(
                r#"
[[providers]]
name = "p"
kind = "{kind}"
capabilities = ["text"]
"#
            );
            let result = load_from_str(&toml_str, "kind-test.toml");
            assert!(result.is_ok(), "kind '{}' should parse", kind);
        }
    }

    #[test]
    fn test_load_from_str_unknown_kind_fails() {
        let toml_str = r#"
[[providers]]
name = "p"
kind = "mainframe"
capabilities = ["text"]
"#;
        let result = load_from_str(toml_str, "unknown-kind.toml");
        assert!(matches!(result.unwrap_err(), ConfigError::Parse { .. }));
    }
}
