//! Rule-table evaluation
//!
//! Conditions are boolean expressions over a flattened context:
//! `pii_score > 0.8`, `heuristic_blocked == true`,
//! `features.length > 4000`, `tenant.allow_pii == false`. Clauses can be
//! joined with `&&`. A clause over a missing key evaluates to false.

use super::{PolicyDocument, PolicyEvaluator};
use async_trait::async_trait;
use semantic_firewall_core::{MlSignals, PolicyDecision, Result, TextFeatures};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Evaluation input: detector signals, text features and tenant context
#[derive(Debug, Clone, Serialize)]
pub struct PolicyInput {
    pub ml_signals: HashMap<String, Value>,
    pub features: HashMap<String, Value>,
    pub tenant_context: HashMap<String, Value>,
}

impl PolicyInput {
    pub fn new(
        ml_signals: &MlSignals,
        features: &TextFeatures,
        tenant_context: HashMap<String, Value>,
    ) -> Self {
        let mut ml = HashMap::new();
        ml.insert("pii_score".to_string(), json_f64(ml_signals.pii.score));
        ml.insert(
            "toxicity_score".to_string(),
            json_f64(ml_signals.toxicity.score),
        );
        ml.insert(
            "prompt_injection_score".to_string(),
            json_f64(ml_signals.prompt_injection.score),
        );
        ml.insert(
            "heuristic_blocked".to_string(),
            Value::Bool(ml_signals.heuristic.blocked),
        );
        ml.insert(
            "heuristic_flags".to_string(),
            Value::Array(
                ml_signals
                    .heuristic
                    .flags
                    .iter()
                    .map(|f| Value::String(f.clone()))
                    .collect(),
            ),
        );
        ml.insert(
            "heuristic_reason".to_string(),
            ml_signals
                .heuristic
                .reason
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        );

        let mut feature_map = HashMap::new();
        feature_map.insert("length".to_string(), Value::from(features.length));
        feature_map.insert("word_count".to_string(), Value::from(features.word_count));
        feature_map.insert("char_count".to_string(), Value::from(features.char_count));
        feature_map.insert("has_numbers".to_string(), Value::Bool(features.has_numbers));
        feature_map.insert(
            "has_special_chars".to_string(),
            Value::Bool(features.has_special_chars),
        );
        feature_map.insert("url_count".to_string(), Value::from(features.url_count));
        feature_map.insert("email_count".to_string(), Value::from(features.email_count));

        Self {
            ml_signals: ml,
            features: feature_map,
            tenant_context,
        }
    }

    /// Flatten into the namespace conditions are written against
    pub fn flattened(&self) -> HashMap<String, Value> {
        let mut context = self.ml_signals.clone();
        for (key, value) in &self.features {
            context.insert(format!("features.{}", key), value.clone());
        }
        for (key, value) in &self.tenant_context {
            context.insert(format!("tenant.{}", key), value.clone());
        }
        context
    }
}

fn json_f64(value: f32) -> Value {
    // Scores are f32 but thresholds are written as f64 literals; a raw
    // upconversion would make 0.8_f32 compare greater than 0.8. Round at
    // 1e-6 so boundary conditions hold.
    let widened = (f64::from(value) * 1e6).round() / 1e6;
    serde_json::Number::from_f64(widened)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// First-match-wins rule-table evaluator
#[derive(Debug, Default)]
pub struct RuleTableEvaluator;

impl RuleTableEvaluator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PolicyEvaluator for RuleTableEvaluator {
    async fn evaluate(
        &self,
        document: &PolicyDocument,
        input: &PolicyInput,
    ) -> Result<PolicyDecision> {
        let context = input.flattened();

        for rule in &document.rules {
            if evaluate_condition(&rule.condition, &context) {
                let blocked = rule.action == "block";
                return Ok(PolicyDecision {
                    blocked,
                    reason: Some(
                        rule.reason
                            .clone()
                            .unwrap_or_else(|| "Policy rule matched".to_string()),
                    ),
                    confidence: 0.9,
                    matched_rule: Some(rule.name.clone()),
                });
            }
        }

        if document.default_action == "block" {
            return Ok(PolicyDecision::block("Default policy action", 0.5, None));
        }

        Ok(PolicyDecision::allow(0.5))
    }
}

/// Evaluate a condition; clauses joined by `&&` must all hold
pub fn evaluate_condition(condition: &str, context: &HashMap<String, Value>) -> bool {
    condition
        .split("&&")
        .all(|clause| evaluate_clause(clause.trim(), context))
}

fn evaluate_clause(clause: &str, context: &HashMap<String, Value>) -> bool {
    const OPERATORS: [&str; 6] = ["==", "!=", ">=", "<=", ">", "<"];

    for op in OPERATORS {
        if let Some(idx) = clause.find(op) {
            let lhs = clause[..idx].trim();
            let rhs = clause[idx + op.len()..].trim();

            let Some(actual) = context.get(lhs) else {
                return false;
            };
            let Some(expected) = parse_literal(rhs) else {
                return false;
            };

            return compare(actual, op, &expected);
        }
    }

    false
}

/// Parse a literal: booleans (accepting Python casing), quoted strings,
/// numbers
fn parse_literal(raw: &str) -> Option<Value> {
    match raw {
        "true" | "True" => return Some(Value::Bool(true)),
        "false" | "False" => return Some(Value::Bool(false)),
        _ => {}
    }

    if (raw.starts_with('"') && raw.ends_with('"') && raw.len() >= 2)
        || (raw.starts_with('\'') && raw.ends_with('\'') && raw.len() >= 2)
    {
        return Some(Value::String(raw[1..raw.len() - 1].to_string()));
    }

    raw.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

fn compare(actual: &Value, op: &str, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Bool(a), Value::Bool(b)) => match op {
            "==" => a == b,
            "!=" => a != b,
            _ => false,
        },
        (Value::String(a), Value::String(b)) => match op {
            "==" => a == b,
            "!=" => a != b,
            _ => false,
        },
        (Value::Number(a), Value::Number(b)) => {
            let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) else {
                return false;
            };
            match op {
                "==" => a == b,
                "!=" => a != b,
                ">" => a > b,
                ">=" => a >= b,
                "<" => a < b,
                "<=" => a <= b,
                _ => false,
            }
        }
        _ => false,
    }
}
