//! Demo binary for tokio-model-router
//!
//! Builds a three-provider chain (local echo, a hosted provider that always
//! fails transiently, and a cloud echo) and routes a handful of requests
//! through it, including a burst of identical prompts that coalesce.
//!
//! ## Usage
//!
//! ```text
//! model-router-demo [router.toml]
//! ```
//!
//! Without an argument the embedded demo configuration is used. A supplied
//! file must name the providers `local`, `hosted` and `cloud`.
//!
//! ## Environment Variables
//!
//! - `RUST_LOG=info`: log level filter (default: info)
//!
//! Log format and metrics come from the `[observability]` section of the
//! configuration (`log_format`, `metrics_enabled`).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_model_router::config::{load_from_file, load_from_str};
use tokio_model_router::{
    init_tracing_with, metrics, Capability, EchoProvider, ErrorKind, FailingProvider, FallbackRouter,
    RoutingRequest,
};
use tracing::info;

const DEMO_CONFIG: &str = r#"
[router]
name = "demo-router"
default_timeout_ms = 2000

[health]
degraded_threshold = 2
unavailable_threshold = 3
unavailable_cooldown_s = 30

[[providers]]
name = "local"
kind = "local"
capabilities = ["text", "summarize"]
cost_per_1k_tokens = 0.0

[[providers]]
name = "hosted"
kind = "hosted"
capabilities = ["text", "summarize", "code"]
cost_per_1k_tokens = 0.002

[[providers]]
name = "cloud"
kind = "cloud"
capabilities = ["text", "summarize", "code", "reasoning", "long_form"]
cost_per_1k_tokens = 0.03
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => load_from_file(Path::new(&path))?,
        None => load_from_str(DEMO_CONFIG, "<embedded demo>")?,
    };

    let _ = init_tracing_with(config.observability.log_format);
    let metrics_enabled = metrics::init_from_config(&config.observability)?;

    info!(router = %config.router.name, metrics_enabled, "Starting tokio-model-router demo");

    let router = Arc::new(
        FallbackRouter::builder(config)
            .adapter("local", Arc::new(EchoProvider::new("local-echo").with_delay(5)))
            .adapter(
                "hosted",
                Arc::new(FailingProvider::new(ErrorKind::TransientUpstream)),
            )
            .adapter("cloud", Arc::new(EchoProvider::new("cloud-echo").with_delay(40)))
            .build()?,
    );

    let demo_requests = vec![
        ("What is the capital of France?", Capability::Text),
        ("Summarize the water cycle in two sentences", Capability::Summarize),
        ("```rust\nfn main() {}\n```\nExplain this program", Capability::Code),
        (
            "1. Compare two sorting algorithms\n2. Prove which is faster\n3. Give a counterexample",
            Capability::Reasoning,
        ),
        ("Caption this photo", Capability::ImageCaption),
    ];

    info!(count = demo_requests.len(), "Routing demo requests");

    for (i, (prompt, capability)) in demo_requests.into_iter().enumerate() {
        let request = RoutingRequest::new(prompt, capability)
            .with_request_id(format!("demo-req-{i:03}"))
            .with_timeout(Duration::from_secs(5));
        let outcome = router.route(&request).await;
        info!(
            request_id = %request.request_id,
            outcome = outcome.label(),
            provider = outcome.provider().unwrap_or("-"),
            tier = %outcome.tier(),
            failed_attempts = outcome.attempts().len(),
            "Demo request finished"
        );
    }

    // Identical concurrent prompts share one upstream call.
    let burst: Vec<_> = (0..5)
        .map(|_| {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                let request = RoutingRequest::new("Explain tokio in one line", Capability::Code);
                router.route(&request).await
            })
        })
        .collect();
    for handle in burst {
        handle.await?;
    }
    if let Some(stats) = router.coalescing_stats() {
        info!(coalesced = stats.coalesced_total, "Burst finished");
    }

    println!("\n=== Provider Health ===");
    println!("{}", serde_json::to_string_pretty(&router.health_snapshot())?);

    println!("\n=== Cost ===");
    println!("{}", serde_json::to_string_pretty(&router.cost_snapshot())?);

    if metrics_enabled {
        println!("\n=== Metrics ===");
        println!("{}", metrics::gather_metrics());
    }

    Ok(())
}
