//! Action orchestrator
//!
//! Executes the side effects of a policy decision: structured logging, an
//! optional alert for high-confidence blocks, and an idempotency record so
//! a replayed request id causes no duplicate emissions. The alerter and
//! idempotency store are optional; the orchestrator degrades gracefully
//! without them.

use chrono::{DateTime, Utc};
use semantic_firewall_core::{AnalysisDirection, PolicyDecision};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Alert severity tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertSeverity {
    Medium,
    High,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
        }
    }
}

/// Alerting port
pub trait Alerter: Send + Sync {
    fn alert(&self, severity: AlertSeverity, message: &str, context: &serde_json::Value);
}

/// Alerter that drops everything
#[derive(Debug, Default)]
pub struct NullAlerter;

impl Alerter for NullAlerter {
    fn alert(&self, _severity: AlertSeverity, _message: &str, _context: &serde_json::Value) {}
}

/// Decision recorded for idempotency
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDecision {
    pub blocked: bool,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Idempotency-store port
pub trait IdempotencyStore: Send + Sync {
    fn get(&self, request_id: &str) -> Option<StoredDecision>;
    fn store(&self, request_id: &str, decision: StoredDecision);
}

/// In-memory idempotency store
#[derive(Default)]
pub struct MemoryIdempotencyStore {
    entries: Mutex<HashMap<String, StoredDecision>>,
}

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IdempotencyStore for MemoryIdempotencyStore {
    fn get(&self, request_id: &str) -> Option<StoredDecision> {
        self.entries.lock().unwrap().get(request_id).cloned()
    }

    fn store(&self, request_id: &str, decision: StoredDecision) {
        self.entries
            .lock()
            .unwrap()
            .insert(request_id.to_string(), decision);
    }
}

/// Context attached to decision logs and alerts
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub direction: AnalysisDirection,
    pub message_length: usize,
    pub latency_ms: f64,
}

impl ActionContext {
    fn to_json(&self, request_id: &str, decision: &PolicyDecision) -> serde_json::Value {
        serde_json::json!({
            "request_id": request_id,
            "blocked": decision.blocked,
            "reason": decision.reason,
            "confidence": decision.confidence,
            "matched_rule": decision.matched_rule,
            "direction": self.direction.as_str(),
            "message_length": self.message_length,
            "latency_ms": self.latency_ms,
        })
    }
}

/// Orchestrates logging, alerting and idempotent recording of decisions
pub struct ActionOrchestrator {
    alerter: Option<Arc<dyn Alerter>>,
    idempotency: Option<Arc<dyn IdempotencyStore>>,
}

impl ActionOrchestrator {
    pub fn new() -> Self {
        Self {
            alerter: None,
            idempotency: None,
        }
    }

    pub fn with_alerter(mut self, alerter: Arc<dyn Alerter>) -> Self {
        self.alerter = Some(alerter);
        self
    }

    pub fn with_idempotency_store(mut self, store: Arc<dyn IdempotencyStore>) -> Self {
        self.idempotency = Some(store);
        self
    }

    /// Execute the actions for one decision
    pub fn execute(&self, decision: &PolicyDecision, request_id: &str, context: &ActionContext) {
        if let Some(store) = &self.idempotency {
            if store.get(request_id).is_some() {
                tracing::debug!(request_id, "Request already processed (idempotent)");
                return;
            }
        }

        let log_data = context.to_json(request_id, decision);

        if decision.blocked {
            tracing::warn!(
                request_id,
                reason = decision.reason.as_deref().unwrap_or(""),
                confidence = decision.confidence as f64,
                matched_rule = decision.matched_rule.as_deref().unwrap_or(""),
                direction = context.direction.as_str(),
                "Request blocked"
            );
            tracing::info!(event = "request_blocked", data = %log_data, "decision event");

            if let Some(alerter) = &self.alerter {
                if decision.confidence > 0.8 {
                    let severity = if decision.confidence > 0.9 {
                        AlertSeverity::High
                    } else {
                        AlertSeverity::Medium
                    };
                    alerter.alert(
                        severity,
                        &format!(
                            "Request blocked: {}",
                            decision.reason.as_deref().unwrap_or("unknown")
                        ),
                        &log_data,
                    );
                }
            }
        } else {
            tracing::info!(
                request_id,
                confidence = decision.confidence as f64,
                direction = context.direction.as_str(),
                latency_ms = context.latency_ms,
                "Request allowed"
            );
            tracing::info!(event = "request_allowed", data = %log_data, "decision event");
        }

        if let Some(store) = &self.idempotency {
            store.store(
                request_id,
                StoredDecision {
                    blocked: decision.blocked,
                    reason: decision.reason.clone(),
                    timestamp: Utc::now(),
                },
            );
        }
    }
}

impl Default for ActionOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}
