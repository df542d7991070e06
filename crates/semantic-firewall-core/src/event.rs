//! Standardized events
//!
//! Every processed request, allowed or blocked, is flattened into one
//! [`FirewallEvent`]. The same record feeds the in-memory rolling metrics
//! store and the WebSocket dashboard fan-out.

use crate::analysis::{MlSignals, PreprocessedText};
use crate::risk::{risk_category, risk_level, RiskCategory, RiskLabel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Prompts and responses are truncated to this many characters in events
pub const EVENT_TEXT_LIMIT: usize = 500;

/// Final action taken on a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Allow,
    Block,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Allow => "allow",
            EventAction::Block => "block",
        }
    }
}

/// Per-detector scores attached to an event
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EventScores {
    pub prompt_injection: f32,
    pub pii: f32,
    pub toxicity: f32,
    /// 1.0 when the heuristic blocked, 0.0 otherwise
    pub heuristic: f32,
}

/// Policy outcome attached to an event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPolicy {
    pub matched_rule: Option<String>,
    /// `allow` or `block`
    pub decision: EventAction,
}

/// Per-stage latency breakdown in milliseconds
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EventLatency {
    pub preprocessing: f64,
    pub ml: f64,
    pub policy: f64,
    pub backend: f64,
    pub total: f64,
}

/// Preprocessing summary attached to an event
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PreprocessingInfo {
    pub original_length: usize,
    pub normalized_length: usize,
    pub word_count: usize,
}

/// The standardized event record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirewallEvent {
    /// Equals the request id
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Prompt, truncated to [`EVENT_TEXT_LIMIT`] characters
    pub prompt: String,
    /// Response or block reason, truncated to [`EVENT_TEXT_LIMIT`] characters
    pub response: String,
    pub risk_level: RiskLabel,
    pub risk_category: RiskCategory,
    pub scores: EventScores,
    pub heuristics: Vec<String>,
    pub policy: EventPolicy,
    pub action: EventAction,
    pub latency_ms: EventLatency,
    pub session_id: Option<String>,
    pub preprocessing_info: Option<PreprocessingInfo>,
    pub detector_config: Option<HashMap<String, String>>,
}

/// Truncate to a character limit without splitting a code point
fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        text.chars().take(limit).collect()
    }
}

impl FirewallEvent {
    /// Build the standardized event for one processed request
    ///
    /// `response` is the backend reply for allowed requests and the block
    /// reason for blocked ones.
    #[allow(clippy::too_many_arguments)]
    pub fn from_analysis(
        request_id: &str,
        prompt: &str,
        response: &str,
        blocked: bool,
        ml_signals: &MlSignals,
        preprocessed: Option<&PreprocessedText>,
        matched_rule: Option<String>,
        latency_ms: EventLatency,
        session_id: Option<String>,
        detector_config: Option<HashMap<String, String>>,
    ) -> Self {
        let action = if blocked {
            EventAction::Block
        } else {
            EventAction::Allow
        };

        let mut heuristics = Vec::new();
        if ml_signals.heuristic.blocked {
            heuristics.push("heuristic_match".to_string());
        }
        heuristics.extend(ml_signals.heuristic.flags.iter().cloned());

        Self {
            id: request_id.to_string(),
            timestamp: Utc::now(),
            prompt: truncate_chars(prompt, EVENT_TEXT_LIMIT),
            response: truncate_chars(response, EVENT_TEXT_LIMIT),
            risk_level: risk_level(ml_signals).standardized(),
            risk_category: risk_category(ml_signals),
            scores: EventScores {
                prompt_injection: ml_signals.prompt_injection.score,
                pii: ml_signals.pii.score,
                toxicity: ml_signals.toxicity.score,
                heuristic: if ml_signals.heuristic.blocked { 1.0 } else { 0.0 },
            },
            heuristics,
            policy: EventPolicy {
                matched_rule,
                decision: action,
            },
            action,
            latency_ms,
            session_id,
            preprocessing_info: preprocessed.map(|p| PreprocessingInfo {
                original_length: p.original.len(),
                normalized_length: p.normalized.len(),
                word_count: p.features.word_count,
            }),
            detector_config,
        }
    }
}
