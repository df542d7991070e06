//! Analysis pipeline data model
//!
//! Stage outputs flow preprocessor -> ML filter -> policy engine. All types
//! here are immutable after creation and owned by the analyzer for the
//! duration of one request.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lightweight features extracted from normalized text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextFeatures {
    pub length: usize,
    pub word_count: usize,
    pub char_count: usize,
    pub has_numbers: bool,
    pub has_special_chars: bool,
    pub url_count: usize,
    pub email_count: usize,
}

/// Output of the preprocessor stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessedText {
    /// Raw input as received
    pub original: String,

    /// Lowercased, whitespace-collapsed, trimmed text
    pub normalized: String,

    /// Extracted features
    pub features: TextFeatures,

    /// Optional embedding; empty when vectorization is skipped on the
    /// synchronous path
    #[serde(default)]
    pub embedding: Vec<f32>,

    /// Id under which vector and features were (or would be) persisted
    pub vector_id: String,
}

/// Score and wall-clock latency of a single detector call
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorScore {
    /// Score in [0, 1]
    pub score: f32,

    /// Wall-clock latency of the detector call in milliseconds
    pub latency_ms: f64,
}

impl DetectorScore {
    pub fn new(score: f32, latency_ms: f64) -> Self {
        Self { score, latency_ms }
    }
}

/// Outcome of the rule-driven heuristic detector
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeuristicSignal {
    pub blocked: bool,
    pub flags: Vec<String>,
    pub reason: Option<String>,
    /// 1.0 when blocked, 0.0 otherwise
    pub score: f32,
    pub latency_ms: f64,
}

/// Combined output of the parallel ML fan-out
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MlSignals {
    pub pii: DetectorScore,
    pub toxicity: DetectorScore,
    pub prompt_injection: DetectorScore,
    pub heuristic: HeuristicSignal,

    /// Enclosing wall-clock of the fan-out, not the sum of detector
    /// latencies
    pub total_latency_ms: f64,
}

impl MlSignals {
    /// Maximum of the three model scores (heuristic excluded)
    pub fn max_model_score(&self) -> f32 {
        self.pii
            .score
            .max(self.toxicity.score)
            .max(self.prompt_injection.score)
    }
}

/// Decision produced by the policy engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub blocked: bool,
    pub reason: Option<String>,
    /// Confidence in [0, 1]
    pub confidence: f32,
    pub matched_rule: Option<String>,
}

impl PolicyDecision {
    /// Allow with the given confidence and no matched rule
    pub fn allow(confidence: f32) -> Self {
        Self {
            blocked: false,
            reason: None,
            confidence,
            matched_rule: None,
        }
    }

    /// Block with a reason and the rule that fired
    pub fn block<R: Into<String>>(reason: R, confidence: f32, matched_rule: Option<String>) -> Self {
        Self {
            blocked: true,
            reason: Some(reason.into()),
            confidence,
            matched_rule,
        }
    }
}

/// Direction of an analysis pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisDirection {
    /// User-to-backend request
    Ingress,
    /// Backend-to-user reply
    Egress,
}

impl AnalysisDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisDirection::Ingress => "ingress",
            AnalysisDirection::Egress => "egress",
        }
    }
}

impl fmt::Display for AnalysisDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wall-clock of each pipeline stage inside one analysis pass
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StageLatencies {
    pub preprocessing_ms: f64,
    pub ml_ms: f64,
    pub policy_ms: f64,
}

/// Full result of an allowed analysis pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub preprocessed: PreprocessedText,
    pub ml_signals: MlSignals,
    pub decision: PolicyDecision,
    pub direction: AnalysisDirection,
    pub latency_ms: f64,
    pub stages: StageLatencies,
}

/// Details attached to a blocked analysis pass
///
/// `reason` is always present; an empty block reason is a bug in the policy
/// engine, not a representable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedAnalysis {
    pub reason: String,
    pub direction: AnalysisDirection,
    pub preprocessed: PreprocessedText,
    pub ml_signals: MlSignals,
    pub decision: PolicyDecision,
    pub latency_ms: f64,
    pub stages: StageLatencies,
}

/// Tagged allow/block signal produced by the analyzer
///
/// The analyzer is the single component that constructs the `Blocked`
/// variant; transports unify both arms into the response shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ContentDecision {
    Allowed(AnalysisResult),
    Blocked(BlockedAnalysis),
}

impl ContentDecision {
    pub fn is_blocked(&self) -> bool {
        matches!(self, ContentDecision::Blocked(_))
    }

    pub fn ml_signals(&self) -> &MlSignals {
        match self {
            ContentDecision::Allowed(r) => &r.ml_signals,
            ContentDecision::Blocked(b) => &b.ml_signals,
        }
    }

    pub fn preprocessed(&self) -> &PreprocessedText {
        match self {
            ContentDecision::Allowed(r) => &r.preprocessed,
            ContentDecision::Blocked(b) => &b.preprocessed,
        }
    }

    pub fn decision(&self) -> &PolicyDecision {
        match self {
            ContentDecision::Allowed(r) => &r.decision,
            ContentDecision::Blocked(b) => &b.decision,
        }
    }

    pub fn latency_ms(&self) -> f64 {
        match self {
            ContentDecision::Allowed(r) => r.latency_ms,
            ContentDecision::Blocked(b) => b.latency_ms,
        }
    }

    pub fn stages(&self) -> StageLatencies {
        match self {
            ContentDecision::Allowed(r) => r.stages,
            ContentDecision::Blocked(b) => b.stages,
        }
    }
}
