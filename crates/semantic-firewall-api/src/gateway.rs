//! Request gateway
//!
//! Per-request orchestration: build the request context from headers,
//! pick the firewall instance (default singleton, or one assembled from
//! cached detectors when the request carries a `detector_config`), run
//! ingress analysis, proxy allowed messages to the backend, optionally
//! analyze the reply, and emit the standardized event.

use crate::config::AppConfig;
use crate::metrics::RollingMetricsStore;
use crate::models::{
    ChatResponse, DetectorReport, LatencyBreakdown, PolicyReport, PreprocessingReport,
};
use crate::proxy::BackendProxy;
use crate::realtime::EventBus;
use axum::http::HeaderMap;
use semantic_firewall_core::{
    risk_level, AnalysisDirection, ContentDecision, EventLatency, FirewallEvent, MlSignals,
    PolicyDecision, PreprocessedText, RequestContext, Result, StageLatencies,
};
use semantic_firewall_detectors::{DetectorRegistry, DetectorSelection, MlFilterService};
use semantic_firewall_pipeline::{ActionContext, ActionOrchestrator, Analyzer, PolicyService, Preprocessor};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Documented fallbacks for requests without identity headers
pub const DEFAULT_USER_ID: &str = "96424373-aa08-44ae-98ff-9d63e2981663";
pub const DEFAULT_SESSION_ID: &str = "a1e423e8-8486-4309-a660-fdf5b3d55ae9";

/// Build a request context from HTTP headers
pub fn extract_context(headers: &HeaderMap, tenant_id: &str) -> RequestContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };

    let mut context = RequestContext::new(Uuid::new_v4().to_string());
    context.user_id = Some(header("X-User-ID").unwrap_or_else(|| DEFAULT_USER_ID.to_string()));
    context.session_id =
        Some(header("X-Session-ID").unwrap_or_else(|| DEFAULT_SESSION_ID.to_string()));
    context.tenant_id = tenant_id.to_string();
    context.endpoint = Some("/api/chat".to_string());
    context.device = Some(header("User-Agent").unwrap_or_else(|| "Unknown".to_string()));
    context.temperature = Some(
        header("X-Temperature")
            .and_then(|value| value.parse().ok())
            .unwrap_or(0.5),
    );
    context.max_tokens = Some(
        header("X-Max-Tokens")
            .and_then(|value| value.parse().ok())
            .unwrap_or(20),
    );
    context.turn_count = Some(
        header("X-Turn-Count")
            .and_then(|value| value.parse().ok())
            .unwrap_or(1),
    );
    context.rate_limit_remaining = Some(
        header("X-Rate-Limit")
            .and_then(|value| value.parse().ok())
            .unwrap_or(0),
    );
    context
}

/// The request gateway
pub struct Gateway {
    config: Arc<AppConfig>,
    registry: Arc<DetectorRegistry>,
    preprocessor: Arc<Preprocessor>,
    policy: Arc<PolicyService>,
    actions: Arc<ActionOrchestrator>,
    proxy: Arc<BackendProxy>,
    metrics: Arc<RollingMetricsStore>,
    events: EventBus,
    default_analyzer: Arc<Analyzer>,
}

impl Gateway {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<AppConfig>,
        registry: Arc<DetectorRegistry>,
        preprocessor: Arc<Preprocessor>,
        policy: Arc<PolicyService>,
        actions: Arc<ActionOrchestrator>,
        proxy: Arc<BackendProxy>,
        metrics: Arc<RollingMetricsStore>,
        events: EventBus,
        default_analyzer: Arc<Analyzer>,
    ) -> Self {
        Self {
            config,
            registry,
            preprocessor,
            policy,
            actions,
            proxy,
            metrics,
            events,
            default_analyzer,
        }
    }

    pub fn default_analyzer(&self) -> Arc<Analyzer> {
        Arc::clone(&self.default_analyzer)
    }

    /// The default singleton, or a per-request analyzer over cached
    /// detector instances
    pub fn analyzer_for(&self, selection: Option<&DetectorSelection>) -> Result<Arc<Analyzer>> {
        match selection {
            None => Ok(Arc::clone(&self.default_analyzer)),
            Some(selection) if selection.is_empty() => Ok(Arc::clone(&self.default_analyzer)),
            Some(selection) => {
                let ml_filter = MlFilterService::from_registry(&self.registry, selection)?;
                Ok(Arc::new(Analyzer::new(
                    Arc::clone(&self.preprocessor),
                    Arc::new(ml_filter),
                    Arc::clone(&self.policy),
                    &self.config.tenant_id,
                )))
            }
        }
    }

    /// Process one chat request end to end
    pub async fn process_chat_request(
        &self,
        message: &str,
        selection: Option<DetectorSelection>,
        context: RequestContext,
    ) -> Result<ChatResponse> {
        let start = Instant::now();
        let request_id = context.request_id.clone();
        let session_id = context.session_id.clone();
        let detector_map = selection
            .as_ref()
            .map(|s| s.as_map())
            .filter(|map| !map.is_empty());

        let preview: String = message.chars().take(50).collect();
        tracing::info!(%request_id, %preview, "New chat request");

        let analyzer = self.analyzer_for(selection.as_ref())?;

        // Ingress analysis
        let ingress = analyzer
            .analyze_content(message, AnalysisDirection::Ingress, Some(&context))
            .await?;
        self.actions.execute(
            ingress.decision(),
            &request_id,
            &ActionContext {
                direction: AnalysisDirection::Ingress,
                message_length: message.len(),
                latency_ms: ingress.latency_ms(),
            },
        );

        let allowed = match ingress {
            ContentDecision::Blocked(blocked) => {
                tracing::warn!(%request_id, reason = %blocked.reason, "Blocked by policies");
                return Ok(self.blocked_response(
                    &request_id,
                    message,
                    &blocked.reason,
                    &blocked.ml_signals,
                    &blocked.preprocessed,
                    &blocked.decision,
                    blocked.stages,
                    start,
                    session_id,
                    detector_map,
                    selection.as_ref(),
                ));
            }
            ContentDecision::Allowed(result) => result,
        };

        // Proxy to the backend
        let backend_start = Instant::now();
        let reply = self.proxy.send_chat_message(message).await?;
        let backend_ms = backend_start.elapsed().as_secs_f64() * 1000.0;

        // Optional egress analysis of the reply
        if self.config.analyze_egress && !reply.is_empty() {
            let egress = analyzer
                .analyze_content(&reply, AnalysisDirection::Egress, Some(&context))
                .await?;
            self.actions.execute(
                egress.decision(),
                &format!("{}_egress", request_id),
                &ActionContext {
                    direction: AnalysisDirection::Egress,
                    message_length: reply.len(),
                    latency_ms: egress.latency_ms(),
                },
            );

            if let ContentDecision::Blocked(blocked) = egress {
                tracing::warn!(%request_id, reason = %blocked.reason, "Reply blocked on egress");
                return Ok(self.blocked_response(
                    &request_id,
                    message,
                    &blocked.reason,
                    &blocked.ml_signals,
                    &blocked.preprocessed,
                    &blocked.decision,
                    blocked.stages,
                    start,
                    session_id,
                    detector_map,
                    selection.as_ref(),
                ));
            }
        }

        let total_ms = start.elapsed().as_secs_f64() * 1000.0;
        let breakdown = LatencyBreakdown {
            preprocessing: allowed.stages.preprocessing_ms,
            ml_analysis: allowed.stages.ml_ms,
            policy_eval: allowed.stages.policy_ms,
            backend: backend_ms,
        };

        self.emit_event(
            &request_id,
            message,
            &reply,
            false,
            &allowed.ml_signals,
            Some(&allowed.preprocessed),
            allowed.decision.matched_rule.clone(),
            breakdown,
            total_ms,
            session_id,
            detector_map,
        );

        Ok(ChatResponse {
            blocked: false,
            reason: None,
            reply: Some(reply),
            ml_detectors: detector_reports(&allowed.ml_signals, selection.as_ref()),
            preprocessing: Some(preprocessing_report(&allowed.preprocessed)),
            policy: Some(PolicyReport {
                matched_rule: allowed.decision.matched_rule.clone(),
                confidence: allowed.decision.confidence,
                risk_level: risk_level(&allowed.ml_signals).as_str().to_string(),
            }),
            latency_breakdown: breakdown,
            total_latency_ms: total_ms,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn blocked_response(
        &self,
        request_id: &str,
        message: &str,
        reason: &str,
        ml_signals: &MlSignals,
        preprocessed: &PreprocessedText,
        decision: &PolicyDecision,
        stages: StageLatencies,
        start: Instant,
        session_id: Option<String>,
        detector_map: Option<HashMap<String, String>>,
        selection: Option<&DetectorSelection>,
    ) -> ChatResponse {
        let total_ms = start.elapsed().as_secs_f64() * 1000.0;
        let breakdown = LatencyBreakdown {
            preprocessing: stages.preprocessing_ms,
            ml_analysis: stages.ml_ms,
            policy_eval: stages.policy_ms,
            backend: 0.0,
        };

        self.emit_event(
            request_id,
            message,
            reason,
            true,
            ml_signals,
            Some(preprocessed),
            decision.matched_rule.clone(),
            breakdown,
            total_ms,
            session_id,
            detector_map,
        );

        ChatResponse {
            blocked: true,
            reason: Some(reason.to_string()),
            reply: None,
            ml_detectors: detector_reports(ml_signals, selection),
            preprocessing: Some(preprocessing_report(preprocessed)),
            policy: Some(PolicyReport {
                matched_rule: decision.matched_rule.clone(),
                confidence: decision.confidence,
                risk_level: risk_level(ml_signals).as_str().to_string(),
            }),
            latency_breakdown: breakdown,
            total_latency_ms: total_ms,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_event(
        &self,
        request_id: &str,
        prompt: &str,
        response: &str,
        blocked: bool,
        ml_signals: &MlSignals,
        preprocessed: Option<&PreprocessedText>,
        matched_rule: Option<String>,
        breakdown: LatencyBreakdown,
        total_ms: f64,
        session_id: Option<String>,
        detector_config: Option<HashMap<String, String>>,
    ) {
        let event = FirewallEvent::from_analysis(
            request_id,
            prompt,
            response,
            blocked,
            ml_signals,
            preprocessed,
            matched_rule,
            EventLatency {
                preprocessing: breakdown.preprocessing,
                ml: breakdown.ml_analysis,
                policy: breakdown.policy_eval,
                backend: breakdown.backend,
                total: total_ms,
            },
            session_id,
            detector_config,
        );

        self.metrics.add(event.clone());
        self.events.publish(event);
    }
}

const PII_THRESHOLD: f32 = 0.8;
const TOXICITY_THRESHOLD: f32 = 0.7;
const INJECTION_THRESHOLD: f32 = 0.8;
const HEURISTIC_THRESHOLD: f32 = 1.0;

fn threshold_status(score: f32, threshold: f32) -> &'static str {
    if score >= threshold {
        "block"
    } else if score >= threshold * 0.7 {
        "warn"
    } else {
        "pass"
    }
}

fn display_name(model: &str) -> String {
    match model {
        "presidio" => "Presidio".to_string(),
        "onnx" => "ONNX".to_string(),
        "mock" => "Mock".to_string(),
        "detoxify" => "Detoxify".to_string(),
        "custom_onnx" => "Custom ONNX".to_string(),
        "deberta" => "DeBERTa".to_string(),
        "llama_guard_86m" => "Llama Guard 86M".to_string(),
        "llama_guard_22m" => "Llama Guard 22M".to_string(),
        other => other.to_string(),
    }
}

/// Per-detector report with thresholds and pass/warn/block status
pub fn detector_reports(
    ml_signals: &MlSignals,
    selection: Option<&DetectorSelection>,
) -> Vec<DetectorReport> {
    let defaults = DetectorSelection::default();
    let selection = selection.unwrap_or(&defaults);

    vec![
        DetectorReport {
            name: "PII Detector".to_string(),
            score: ml_signals.pii.score,
            latency_ms: ml_signals.pii.latency_ms,
            threshold: Some(PII_THRESHOLD),
            status: threshold_status(ml_signals.pii.score, PII_THRESHOLD).to_string(),
            model_name: display_name(selection.pii_or_default()),
        },
        DetectorReport {
            name: "Toxicity Detector".to_string(),
            score: ml_signals.toxicity.score,
            latency_ms: ml_signals.toxicity.latency_ms,
            threshold: Some(TOXICITY_THRESHOLD),
            status: threshold_status(ml_signals.toxicity.score, TOXICITY_THRESHOLD).to_string(),
            model_name: display_name(selection.toxicity_or_default()),
        },
        DetectorReport {
            name: "Prompt Injection Detector".to_string(),
            score: ml_signals.prompt_injection.score,
            latency_ms: ml_signals.prompt_injection.latency_ms,
            threshold: Some(INJECTION_THRESHOLD),
            status: threshold_status(ml_signals.prompt_injection.score, INJECTION_THRESHOLD)
                .to_string(),
            model_name: display_name(selection.prompt_injection_or_default()),
        },
        DetectorReport {
            name: "Heuristic Detector".to_string(),
            score: ml_signals.heuristic.score,
            latency_ms: ml_signals.heuristic.latency_ms,
            threshold: Some(HEURISTIC_THRESHOLD),
            status: if ml_signals.heuristic.score >= HEURISTIC_THRESHOLD {
                "block".to_string()
            } else {
                "pass".to_string()
            },
            model_name: "Regex".to_string(),
        },
    ]
}

fn preprocessing_report(preprocessed: &PreprocessedText) -> PreprocessingReport {
    PreprocessingReport {
        original_length: preprocessed.original.len(),
        normalized_length: preprocessed.normalized.len(),
        word_count: preprocessed.features.word_count,
        char_count: preprocessed.original.len(),
    }
}
