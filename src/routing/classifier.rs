//! Task complexity classification.
//!
//! Maps request attributes to a [`ComplexityTier`]. An explicit tier hint
//! always wins; otherwise a score in `0.0..=1.0` is computed and bucketed:
//!
//! | Score                          | Tier       |
//! |--------------------------------|------------|
//! | `< simple_below`               | `Simple`   |
//! | `simple_below ..< complex_at`  | `Moderate` |
//! | `>= complex_at`                | `Complex`  |
//!
//! ## Heuristics
//!
//! 1. **Prompt length**: > `long_prompt_tokens` words → +0.3, else
//!    > `medium_prompt_tokens` words → +0.15
//! 2. **Code blocks**: fenced code block (` ``` `) → +0.2
//! 3. **Multi-step instructions**: two or more numbered lines → +0.2
//! 4. **Capability weight**: fixed per [`Capability`]
//!
//! The raw sum is clamped to `[0.0, 1.0]`. Classification is a pure function
//! of its inputs.

use serde::{Deserialize, Serialize};

use crate::config::ClassifierConfig;
use crate::provider::Capability;

/// Complexity tier assigned to a request. Derived per request, never stored.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityTier {
    /// Cheap and fast providers first.
    Simple,
    /// Configured chain order.
    Moderate,
    /// Most capable providers first.
    Complex,
}

impl ComplexityTier {
    /// Stable identifier used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
        }
    }
}

impl std::fmt::Display for ComplexityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-signal contributions behind a classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    /// Contribution from prompt length.
    pub length: f64,
    /// Contribution from fenced code blocks.
    pub code_blocks: f64,
    /// Contribution from numbered multi-step instructions.
    pub multi_step: f64,
    /// Contribution from the required capability.
    pub capability: f64,
    /// Clamped sum of all signals.
    pub total: f64,
    /// Tier the total maps to.
    pub tier: ComplexityTier,
}

/// Stateless complexity classifier.
///
/// # Panics
///
/// This type and its methods never panic.
#[derive(Debug, Clone)]
pub struct ComplexityClassifier {
    config: ClassifierConfig,
}

impl Default for ComplexityClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

impl ComplexityClassifier {
    /// Create a classifier with the given thresholds.
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Classify a request.
    ///
    /// # Arguments
    ///
    /// * `prompt`: Prompt text.
    /// * `capability`: Capability the request requires.
    /// * `hint`: Caller-supplied tier; returned unchanged when present.
    ///
    /// # Panics
    ///
    /// This function never panics.
    ///
    /// # Example
    ///
    /// ```rust
    /// use tokio_model_router::provider::Capability;
    /// use tokio_model_router::routing::{ComplexityClassifier, ComplexityTier};
    ///
    /// let classifier = ComplexityClassifier::default();
    /// let tier = classifier.classify("Say hello", Capability::Text, None);
    /// assert_eq!(tier, ComplexityTier::Simple);
    /// ```
    pub fn classify(
        &self,
        prompt: &str,
        capability: Capability,
        hint: Option<ComplexityTier>,
    ) -> ComplexityTier {
        if let Some(tier) = hint {
            return tier;
        }
        self.tier_for(self.score(prompt, capability))
    }

    /// Raw complexity score in `[0.0, 1.0]`.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn score(&self, prompt: &str, capability: Capability) -> f64 {
        clamp_score(
            self.length_signal(prompt)
                + code_block_signal(prompt)
                + multi_step_signal(prompt)
                + capability_weight(capability),
        )
    }

    /// Break a score down into its individual signals.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn breakdown(&self, prompt: &str, capability: Capability) -> ScoreBreakdown {
        let length = self.length_signal(prompt);
        let code_blocks = code_block_signal(prompt);
        let multi_step = multi_step_signal(prompt);
        let capability = capability_weight(capability);
        let total = clamp_score(length + code_blocks + multi_step + capability);

        ScoreBreakdown {
            length,
            code_blocks,
            multi_step,
            capability,
            total,
            tier: self.tier_for(total),
        }
    }

    fn tier_for(&self, score: f64) -> ComplexityTier {
        if score >= self.config.complex_at {
            ComplexityTier::Complex
        } else if score < self.config.simple_below {
            ComplexityTier::Simple
        } else {
            ComplexityTier::Moderate
        }
    }

    // ── Individual signals ─────────────────────────────────────────────

    fn length_signal(&self, prompt: &str) -> f64 {
        let words = prompt.split_whitespace().count();
        if words > self.config.long_prompt_tokens {
            0.3
        } else if words > self.config.medium_prompt_tokens {
            0.15
        } else {
            0.0
        }
    }
}

/// Fixed weight each capability adds to the score.
///
/// # Panics
///
/// This function never panics.
pub fn capability_weight(capability: Capability) -> f64 {
    match capability {
        Capability::Text => 0.0,
        Capability::Summarize => 0.1,
        Capability::Code | Capability::ImageCaption => 0.2,
        Capability::LongForm => 0.3,
        Capability::Reasoning => 0.4,
    }
}

fn code_block_signal(prompt: &str) -> f64 {
    if prompt.contains("```") {
        0.2
    } else {
        0.0
    }
}

/// +0.2 when at least two lines start with `N.` or `N)`.
fn multi_step_signal(prompt: &str) -> f64 {
    let numbered = prompt
        .lines()
        .filter(|line| is_numbered_item(line.trim_start()))
        .count();
    if numbered >= 2 {
        0.2
    } else {
        0.0
    }
}

fn is_numbered_item(line: &str) -> bool {
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    digits > 0 && matches!(line[digits..].chars().next(), Some('.') | Some(')'))
}

fn clamp_score(raw: f64) -> f64 {
    raw.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ComplexityClassifier {
        ComplexityClassifier::default()
    }

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[test]
    fn test_short_text_prompt_is_simple() {
        assert_eq!(
            classifier().classify("Write a tagline", Capability::Text, None),
            ComplexityTier::Simple
        );
    }

    #[test]
    fn test_hint_always_wins() {
        let long_code = format!("```rust\nfn main() {{}}\n```\n{}", words(900));
        assert_eq!(
            classifier().classify(&long_code, Capability::Reasoning, Some(ComplexityTier::Simple)),
            ComplexityTier::Simple
        );
        assert_eq!(
            classifier().classify("hi", Capability::Text, Some(ComplexityTier::Complex)),
            ComplexityTier::Complex
        );
    }

    #[test]
    fn test_reasoning_capability_alone_is_moderate() {
        assert_eq!(
            classifier().classify("Why?", Capability::Reasoning, None),
            ComplexityTier::Moderate
        );
    }

    #[test]
    fn test_long_multistep_code_prompt_is_complex() {
        let prompt = format!(
            "1. Parse the file\n2. Refactor it\n```rust\nfn a() {{}}\n```\n{}",
            words(600)
        );
        let breakdown = classifier().breakdown(&prompt, Capability::Code);
        assert_eq!(breakdown.length, 0.3);
        assert_eq!(breakdown.code_blocks, 0.2);
        assert_eq!(breakdown.multi_step, 0.2);
        assert_eq!(breakdown.capability, 0.2);
        assert!((breakdown.total - 0.9).abs() < 1e-9);
        assert_eq!(breakdown.tier, ComplexityTier::Complex);
    }

    #[test]
    fn test_medium_length_signal() {
        let breakdown = classifier().breakdown(&words(200), Capability::Text);
        assert_eq!(breakdown.length, 0.15);
        assert_eq!(breakdown.tier, ComplexityTier::Simple);
    }

    #[test]
    fn test_score_is_clamped() {
        let prompt = format!("1. a\n2. b\n```\nx\n```\n{}", words(600));
        let score = classifier().score(&prompt, Capability::Reasoning);
        assert!((0.0..=1.0).contains(&score));
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_single_numbered_line_is_not_multistep() {
        let breakdown = classifier().breakdown("1. only one step", Capability::Text);
        assert_eq!(breakdown.multi_step, 0.0);
    }

    #[test]
    fn test_numbered_item_accepts_paren_style() {
        assert!(is_numbered_item("12) step"));
        assert!(is_numbered_item("3. step"));
        assert!(!is_numbered_item("v1.2 release"));
        assert!(!is_numbered_item("2024 was a year"));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let c = classifier();
        let prompt = format!("Summarize:\n{}", words(150));
        let first = c.classify(&prompt, Capability::Summarize, None);
        for _ in 0..50 {
            assert_eq!(c.classify(&prompt, Capability::Summarize, None), first);
        }
    }

    #[test]
    fn test_custom_thresholds_shift_buckets() {
        let c = ComplexityClassifier::new(ClassifierConfig {
            simple_below: 0.05,
            complex_at: 0.1,
            ..ClassifierConfig::default()
        });
        assert_eq!(c.classify("x", Capability::Summarize, None), ComplexityTier::Complex);
        assert_eq!(c.classify("x", Capability::Text, None), ComplexityTier::Simple);
    }
}
