//! Risk classification of ML signals
//!
//! Two layers: an internal four-level risk derived from detector scores,
//! and the three standardized labels carried by events. The category is
//! the argmax over the model scores, with a heuristic block always
//! classified as `leak`.

use crate::analysis::MlSignals;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Internal risk level derived from raw scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    /// Map to the standardized event label
    pub fn standardized(&self) -> RiskLabel {
        match self {
            RiskLevel::Low => RiskLabel::Benign,
            RiskLevel::Medium | RiskLevel::High => RiskLabel::Suspicious,
            RiskLevel::Critical => RiskLabel::Malicious,
        }
    }
}

/// Standardized risk label carried by events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLabel {
    Benign,
    Suspicious,
    Malicious,
}

impl RiskLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::Benign => "benign",
            RiskLabel::Suspicious => "suspicious",
            RiskLabel::Malicious => "malicious",
        }
    }

    /// Numeric weight used by the risk-trend calculation
    pub fn trend_score(&self) -> f64 {
        match self {
            RiskLabel::Benign => 0.0,
            RiskLabel::Suspicious => 0.5,
            RiskLabel::Malicious => 1.0,
        }
    }
}

impl fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dominant risk category of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskCategory {
    Injection,
    Pii,
    Toxicity,
    Leak,
    Harmful,
    Clean,
}

impl RiskCategory {
    /// All categories, in the order used by breakdown maps
    pub const ALL: [RiskCategory; 6] = [
        RiskCategory::Injection,
        RiskCategory::Pii,
        RiskCategory::Toxicity,
        RiskCategory::Leak,
        RiskCategory::Harmful,
        RiskCategory::Clean,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::Injection => "injection",
            RiskCategory::Pii => "pii",
            RiskCategory::Toxicity => "toxicity",
            RiskCategory::Leak => "leak",
            RiskCategory::Harmful => "harmful",
            RiskCategory::Clean => "clean",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calculate the global risk level from ML signals
pub fn risk_level(signals: &MlSignals) -> RiskLevel {
    let max_score = signals.max_model_score();
    if max_score >= 0.8 || signals.heuristic.blocked {
        RiskLevel::Critical
    } else if max_score >= 0.6 {
        RiskLevel::High
    } else if max_score >= 0.3 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Determine the dominant risk category from ML signals
///
/// A heuristic block classifies as `leak` regardless of the model scores.
pub fn risk_category(signals: &MlSignals) -> RiskCategory {
    if signals.heuristic.blocked {
        return RiskCategory::Leak;
    }

    let scored = [
        (RiskCategory::Injection, signals.prompt_injection.score),
        (RiskCategory::Pii, signals.pii.score),
        (RiskCategory::Toxicity, signals.toxicity.score),
    ];

    let (category, score) = scored
        .iter()
        .copied()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .unwrap();

    if score > 0.3 {
        category
    } else {
        RiskCategory::Clean
    }
}
