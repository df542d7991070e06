//! Detector ports
//!
//! One single-operation trait per detector kind. Implementations are
//! blocking (model inference runs on OS threads); the
//! [`MlFilterService`](crate::MlFilterService) dispatches them on the
//! blocking pool and joins.
//!
//! All traits are `Send + Sync`; instances are shared behind `Arc` via the
//! registry and never mutated after construction.

use semantic_firewall_core::{RequestContext, Result};

/// Flags personal-data patterns; recommended policy block threshold 0.8
pub trait PiiDetector: Send + Sync {
    /// Variant id this detector was registered under (e.g. `presidio`)
    fn name(&self) -> &str;

    /// Score the text for PII content, in [0, 1]
    fn detect(&self, text: &str) -> Result<f32>;
}

/// Scores toxic content; recommended policy block threshold 0.7
pub trait ToxicityDetector: Send + Sync {
    fn name(&self) -> &str;

    /// Score the text for toxicity, in [0, 1]
    fn detect(&self, text: &str) -> Result<f32>;
}

/// Scores prompt-injection attempts; recommended policy block threshold 0.8
///
/// Receives the request context because embedding-based backends condition
/// on session and user metadata.
pub trait PromptInjectionDetector: Send + Sync {
    fn name(&self) -> &str;

    /// Score the text for prompt injection, in [0, 1]
    fn detect(&self, text: &str, context: Option<&RequestContext>) -> Result<f32>;
}

/// Outcome of a heuristic rules pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeuristicVerdict {
    pub blocked: bool,
    pub flags: Vec<String>,
    pub reason: Option<String>,
}

impl HeuristicVerdict {
    /// A pass with no findings
    pub fn clean() -> Self {
        Self::default()
    }

    /// A blocking verdict with a single flag and reason
    pub fn blocked<F: Into<String>, R: Into<String>>(flag: F, reason: R) -> Self {
        Self {
            blocked: true,
            flags: vec![flag.into()],
            reason: Some(reason.into()),
        }
    }
}

/// Rule-driven detector: regex patterns plus a token denylist
pub trait HeuristicDetector: Send + Sync {
    fn name(&self) -> &str;

    fn detect(&self, text: &str) -> Result<HeuristicVerdict>;
}
