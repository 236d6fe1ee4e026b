//! # Cost Tracking Validation
//!
//! Routes a batch of varied prompts through a local/cloud chain and checks
//! the cost snapshot against a cloud-only baseline:
//! - Simple text prompts land on the free local provider (100% savings)
//! - Reasoning prompts can only be served by the cloud provider
//! - Fallback-served requests are counted separately

use std::sync::Arc;

use tokio_model_router::config::{ProviderConfig, RouterConfig};
use tokio_model_router::routing::ProviderKind;
use tokio_model_router::{
    Capability, EchoProvider, ErrorKind, FailingProvider, FallbackRouter, RoutingRequest,
};

/// Generate 25 varied short prompts.
fn generate_prompts(prefix: &str) -> Vec<String> {
    (0..25)
        .map(|i| match i % 5 {
            0 => format!("{prefix}: what is the capital of France ({i})"),
            1 => format!("{prefix}: write a haiku about Rust ({i})"),
            2 => format!("{prefix}: define latency ({i})"),
            3 => format!("{prefix}: summarize async programming briefly ({i})"),
            _ => format!("{prefix}: what is 42 times 17 ({i})"),
        })
        .collect()
}

fn config() -> RouterConfig {
    RouterConfig::with_providers(vec![
        ProviderConfig::new("local", ProviderKind::Local, vec![Capability::Text]),
        ProviderConfig::new(
            "cloud",
            ProviderKind::Cloud,
            vec![Capability::Text, Capability::Reasoning],
        )
        .with_cost(0.03),
    ])
}

// ── Savings against baseline ──────────────────────────────────────────────

#[tokio::test]
async fn test_local_served_batch_saves_entire_baseline() {
    let router = FallbackRouter::builder(config())
        .adapter("local", Arc::new(EchoProvider::new("local").with_delay(0)))
        .adapter("cloud", Arc::new(EchoProvider::new("cloud").with_delay(0)))
        .build()
        .expect("test: router should build");

    for prompt in generate_prompts("local") {
        let outcome = router
            .route(&RoutingRequest::new(prompt, Capability::Text))
            .await;
        assert_eq!(outcome.provider(), Some("local"));
    }

    let snapshot = router.cost_snapshot();
    assert_eq!(snapshot.per_provider["local"].requests, 25);
    assert_eq!(snapshot.per_provider["cloud"].requests, 0);
    assert!(snapshot.total_tokens > 0);
    assert_eq!(snapshot.actual_cost_usd, 0.0);
    assert!(snapshot.baseline_cost_usd > 0.0);
    assert!((snapshot.savings_percent - 100.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_cloud_only_capability_pays_full_rate() {
    let router = FallbackRouter::builder(config())
        .adapter("local", Arc::new(EchoProvider::new("local").with_delay(0)))
        .adapter("cloud", Arc::new(EchoProvider::new("cloud").with_delay(0)))
        .build()
        .expect("test: router should build");

    for prompt in generate_prompts("reason").into_iter().take(5) {
        let outcome = router
            .route(&RoutingRequest::new(prompt, Capability::Reasoning))
            .await;
        assert_eq!(outcome.provider(), Some("cloud"));
    }

    let snapshot = router.cost_snapshot();
    assert!(snapshot.actual_cost_usd > 0.0);
    assert!(
        (snapshot.actual_cost_usd - snapshot.baseline_cost_usd).abs() < 1e-6,
        "cloud is the premium rate, so there is nothing to save"
    );
    assert!(snapshot.savings_percent.abs() < 1e-6);
}

// ── Fallback accounting ───────────────────────────────────────────────────

#[tokio::test]
async fn test_fallback_served_requests_counted() {
    let mut config = config();
    config.coalescing.enabled = false;
    config.health.degraded_threshold = 100;
    config.health.unavailable_threshold = 100;

    let router = FallbackRouter::builder(config)
        .adapter(
            "local",
            Arc::new(FailingProvider::new(ErrorKind::TransientUpstream)),
        )
        .adapter("cloud", Arc::new(EchoProvider::new("cloud").with_delay(0)))
        .build()
        .expect("test: router should build");

    for prompt in generate_prompts("fallback").into_iter().take(10) {
        let outcome = router
            .route(&RoutingRequest::new(prompt, Capability::Text))
            .await;
        assert_eq!(outcome.provider(), Some("cloud"));
        assert_eq!(outcome.attempts().len(), 1);
    }

    let cloud = &router.cost_snapshot().per_provider["cloud"];
    assert_eq!(cloud.requests, 10);
    assert_eq!(cloud.fallback_requests, 10);
    assert!(cloud.cost_usd > 0.0);
}
