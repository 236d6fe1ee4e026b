//! Provider adapter abstraction and the error taxonomy shared by all backends.
//!
//! ## Responsibility
//! Define the uniform async contract every model backend implements, the
//! normalized response shape, and the fixed error taxonomy the router and
//! health tracker reason about.
//!
//! ## Guarantees
//! - Object-safe: adapters are held as `Arc<dyn ProviderAdapter>`
//! - Panic-contained: [`invoke_guarded`] maps a panicking adapter to
//!   [`ErrorKind::TransientUpstream`] instead of unwinding into the router
//! - Bounded: [`invoke_guarded`] enforces the per-call timeout and cancels
//!   the adapter's token on every exit path
//!
//! ## NOT Responsible For
//! - Vendor wire protocols (adapters built on top of this crate own those)
//! - Choosing which provider to call (that belongs to `routing`)
//! - Health bookkeeping (that belongs to `health`)

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::routing::classifier::ComplexityTier;

// ── Capabilities ─────────────────────────────────────────────────────────

/// A generation capability a provider may declare and a request may require.
///
/// # Panics
///
/// This type never panics.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Short free-form text generation.
    Text,
    /// Condensing supplied content.
    Summarize,
    /// Source code generation or review.
    Code,
    /// Describing an image.
    ImageCaption,
    /// Long-form content such as articles or reports.
    LongForm,
    /// Multi-step analytical reasoning.
    Reasoning,
}

impl Capability {
    /// Stable lowercase identifier used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Summarize => "summarize",
            Self::Code => "code",
            Self::ImageCaption => "image_caption",
            Self::LongForm => "long_form",
            Self::Reasoning => "reasoning",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Error taxonomy ───────────────────────────────────────────────────────

/// Fixed taxonomy every adapter maps its failures into.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The call did not complete within its timeout.
    Timeout,
    /// The provider throttled the request.
    RateLimited,
    /// Credentials were rejected. Never retried against the same provider.
    AuthFailure,
    /// The provider cannot serve the requested capability. Never retried
    /// against the same provider.
    CapabilityUnsupported,
    /// A transient upstream fault (5xx, overload, dropped connection, or a
    /// panic caught at the adapter boundary).
    TransientUpstream,
    /// A non-recoverable upstream fault.
    FatalUpstream,
}

impl ErrorKind {
    /// Whether a later call to the *same* provider could plausibly succeed.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::RateLimited | Self::TransientUpstream
        )
    }

    /// Whether this error proves the provider is unusable right now, as
    /// opposed to a blip that needs repetition before it counts.
    pub fn is_certain(self) -> bool {
        matches!(self, Self::AuthFailure | Self::FatalUpstream)
    }

    /// Stable identifier used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::AuthFailure => "auth_failure",
            Self::CapabilityUnsupported => "capability_unsupported",
            Self::TransientUpstream => "transient_upstream",
            Self::FatalUpstream => "fatal_upstream",
        }
    }

    /// Map an HTTP status code to the taxonomy.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::AuthFailure,
            408 | 504 => Self::Timeout,
            429 => Self::RateLimited,
            415 | 501 => Self::CapabilityUnsupported,
            500..=599 => Self::TransientUpstream,
            _ => Self::FatalUpstream,
        }
    }

    /// Classify a free-form upstream error message.
    ///
    /// Matching is case-insensitive and checks the most specific patterns
    /// first. HTTP status codes only count as whole tokens, so `"4000
    /// tokens"` is not a 400. Unrecognised messages are treated as transient.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn classify_message(message: &str) -> Self {
        let msg = message.to_lowercase();
        let any = |patterns: &[&str]| contains_any(&msg, patterns);
        let code = |codes: &[&str]| has_status_token(&msg, codes);

        if any(&["timed out", "timeout", "deadline exceeded"]) {
            Self::Timeout
        } else if code(&["429"]) || any(&["rate limit", "rate_limit", "too many requests"]) {
            Self::RateLimited
        } else if code(&["401", "403"])
            || any(&[
                "unauthorized",
                "forbidden",
                "invalid api key",
                "invalid_api_key",
                "authentication",
            ])
        {
            Self::AuthFailure
        } else if any(&["not supported", "unsupported", "no vision", "modality"]) {
            Self::CapabilityUnsupported
        } else if code(&["400"]) || any(&["bad request", "invalid_request", "billing", "quota"]) {
            Self::FatalUpstream
        } else {
            Self::TransientUpstream
        }
    }
}

fn contains_any(haystack: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| haystack.contains(p))
}

fn has_status_token(haystack: &str, codes: &[&str]) -> bool {
    haystack
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| codes.contains(&token))
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Request / response ───────────────────────────────────────────────────

/// The generic request handed to an adapter for a single call.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// Caller's request id, for trace correlation.
    pub request_id: String,
    /// Prompt text.
    pub prompt: String,
    /// Capability the caller needs.
    pub capability: Capability,
    /// Complexity tier the router assigned.
    pub tier: ComplexityTier,
    /// Budget for this call. The router enforces it regardless; adapters
    /// should use it to configure their own client timeouts.
    pub timeout: Duration,
}

/// Provider output after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResponse {
    /// Generated text.
    pub text: String,
    /// Tokens consumed, if the provider reports it.
    pub tokens_used: Option<u64>,
    /// Concrete model that served the call, if known.
    pub model: Option<String>,
}

impl NormalizedResponse {
    /// Response with text only.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tokens_used: None,
            model: None,
        }
    }
}

// ── Adapter contract ─────────────────────────────────────────────────────

/// Uniform async interface over one model backend.
///
/// Implementations must be thread-safe (Send + Sync) and object-safe so the
/// registry can hold them as `Arc<dyn ProviderAdapter>`. An adapter must
/// return one of the [`ErrorKind`] variants for every failure; it should
/// stop work promptly once `cancel` fires.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Perform one generation call.
    async fn invoke(
        &self,
        request: &ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<NormalizedResponse, ErrorKind>;
}

/// Call an adapter with timeout, cancellation and panic containment.
///
/// The returned future owns a cancellation token; it is cancelled when the
/// call finishes, times out, or the future itself is dropped.
///
/// # Errors
///
/// - [`ErrorKind::Timeout`] if `request.timeout` elapses first.
/// - [`ErrorKind::TransientUpstream`] if the adapter panics.
/// - Whatever the adapter itself returned.
///
/// # Panics
///
/// This function never panics.
pub async fn invoke_guarded(
    adapter: &dyn ProviderAdapter,
    request: &ProviderRequest,
) -> Result<NormalizedResponse, ErrorKind> {
    let cancel = CancellationToken::new();
    let _cancel_on_exit = cancel.clone().drop_guard();

    let call = AssertUnwindSafe(adapter.invoke(request, cancel.child_token())).catch_unwind();

    match tokio::time::timeout(request.timeout, call).await {
        Ok(Ok(result)) => result,
        Ok(Err(_panic)) => {
            tracing::error!(request_id = %request.request_id, "provider adapter panicked");
            Err(ErrorKind::TransientUpstream)
        }
        Err(_elapsed) => Err(ErrorKind::Timeout),
    }
}

// ============================================================================
// Echo Provider (Testing)
// ============================================================================

/// Echo adapter for demos and smoke tests.
///
/// Returns the prompt as the response after a simulated delay, honouring
/// cancellation.
pub struct EchoProvider {
    /// Simulated call latency.
    pub delay_ms: u64,
    /// Model label reported in responses.
    pub model: String,
}

impl EchoProvider {
    /// Echo provider with a 10ms delay.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            delay_ms: 10,
            model: model.into(),
        }
    }

    /// Override the simulated latency.
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

#[async_trait]
impl ProviderAdapter for EchoProvider {
    async fn invoke(
        &self,
        request: &ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<NormalizedResponse, ErrorKind> {
        tokio::select! {
            _ = cancel.cancelled() => return Err(ErrorKind::Timeout),
            _ = tokio::time::sleep(Duration::from_millis(self.delay_ms)) => {}
        }

        let tokens = request.prompt.split_whitespace().count() as u64;
        Ok(NormalizedResponse {
            text: request.prompt.clone(),
            tokens_used: Some(tokens),
            model: Some(self.model.clone()),
        })
    }
}

// ============================================================================
// Failing Provider (Testing)
// ============================================================================

/// Adapter that always fails with a fixed [`ErrorKind`].
///
/// Used by the demo binary to exercise fallback, and handy for wiring tests.
pub struct FailingProvider {
    /// Error returned on every call.
    pub kind: ErrorKind,
}

impl FailingProvider {
    /// Provider that always returns `kind`.
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl ProviderAdapter for FailingProvider {
    async fn invoke(
        &self,
        _request: &ProviderRequest,
        _cancel: CancellationToken,
    ) -> Result<NormalizedResponse, ErrorKind> {
        Err(self.kind)
    }
}
