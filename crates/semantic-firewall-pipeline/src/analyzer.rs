//! Content analyzer
//!
//! Chains preprocessor -> ML filter -> policy engine and measures both
//! the total and per-stage wall-clock. The analyzer is the single
//! component that constructs the [`ContentDecision::Blocked`] signal.

use crate::policy::PolicyService;
use crate::preprocess::Preprocessor;
use semantic_firewall_core::{
    AnalysisDirection, AnalysisResult, BlockedAnalysis, ContentDecision, RequestContext, Result,
    StageLatencies,
};
use semantic_firewall_detectors::MlFilterService;
use std::sync::Arc;
use std::time::Instant;

/// Preprocess + ML + policy chain
pub struct Analyzer {
    preprocessor: Arc<Preprocessor>,
    ml_filter: Arc<MlFilterService>,
    policy: Arc<PolicyService>,
    tenant_id: String,
}

impl Analyzer {
    pub fn new(
        preprocessor: Arc<Preprocessor>,
        ml_filter: Arc<MlFilterService>,
        policy: Arc<PolicyService>,
        tenant_id: &str,
    ) -> Self {
        Self {
            preprocessor,
            ml_filter,
            policy,
            tenant_id: tenant_id.to_string(),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Analyze one piece of content in the given direction
    pub async fn analyze_content(
        &self,
        content: &str,
        direction: AnalysisDirection,
        context: Option<&RequestContext>,
    ) -> Result<ContentDecision> {
        let start = Instant::now();

        let pre_start = Instant::now();
        let preprocessed = self.preprocessor.preprocess(content, false);
        let preprocessing_ms = elapsed_ms(pre_start);

        let ml_start = Instant::now();
        let ml_signals = self
            .ml_filter
            .analyze(&preprocessed.normalized, context)
            .await;
        let ml_ms = elapsed_ms(ml_start);

        let policy_start = Instant::now();
        let decision = self
            .policy
            .evaluate(&ml_signals, &preprocessed.features, &self.tenant_id)
            .await;
        let policy_ms = elapsed_ms(policy_start);

        let latency_ms = elapsed_ms(start);
        let stages = StageLatencies {
            preprocessing_ms,
            ml_ms,
            policy_ms,
        };

        if decision.blocked {
            let reason = decision
                .reason
                .clone()
                .unwrap_or_else(|| "Blocked by policy".to_string());
            tracing::debug!(%direction, %reason, "Content blocked");
            return Ok(ContentDecision::Blocked(BlockedAnalysis {
                reason,
                direction,
                preprocessed,
                ml_signals,
                decision,
                latency_ms,
                stages,
            }));
        }

        Ok(ContentDecision::Allowed(AnalysisResult {
            preprocessed,
            ml_signals,
            decision,
            direction,
            latency_ms,
            stages,
        }))
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyService;
    use semantic_firewall_detectors::adapters::{MockPiiDetector, RegexHeuristicDetector};
    use semantic_firewall_detectors::adapters::heuristic::HeuristicRules;
    use semantic_firewall_detectors::ports::{
        HeuristicDetector, PiiDetector, PromptInjectionDetector, ToxicityDetector,
    };

    struct FixedToxicity(f32);
    impl ToxicityDetector for FixedToxicity {
        fn name(&self) -> &str {
            "fixed"
        }
        fn detect(&self, _text: &str) -> Result<f32> {
            Ok(self.0)
        }
    }

    struct FixedInjection(f32);
    impl PromptInjectionDetector for FixedInjection {
        fn name(&self) -> &str {
            "fixed"
        }
        fn detect(&self, _text: &str, _context: Option<&RequestContext>) -> Result<f32> {
            Ok(self.0)
        }
    }

    fn analyzer(pii: f32, toxicity: f32, injection: f32, denylist: Vec<String>) -> Analyzer {
        let heuristic: Arc<dyn HeuristicDetector> = Arc::new(
            RegexHeuristicDetector::from_rules(HeuristicRules {
                patterns: Vec::new(),
                denylist,
            })
            .unwrap(),
        );
        let pii: Arc<dyn PiiDetector> = Arc::new(MockPiiDetector::new(pii));

        let ml_filter = MlFilterService::new(
            pii,
            Arc::new(FixedToxicity(toxicity)),
            Arc::new(FixedInjection(injection)),
            heuristic,
        );

        Analyzer::new(
            Arc::new(Preprocessor::new()),
            Arc::new(ml_filter),
            Arc::new(PolicyService::with_defaults()),
            "default",
        )
    }

    #[tokio::test]
    async fn test_clean_content_is_allowed() {
        let analyzer = analyzer(0.0, 0.0, 0.0, Vec::new());
        let outcome = analyzer
            .analyze_content("hello", AnalysisDirection::Ingress, None)
            .await
            .unwrap();

        assert!(!outcome.is_blocked());
        let ContentDecision::Allowed(result) = outcome else {
            panic!("expected allowed");
        };
        assert_eq!(result.direction, AnalysisDirection::Ingress);
        assert_eq!(result.preprocessed.normalized, "hello");
        assert!(result.latency_ms >= 0.0);
    }

    #[tokio::test]
    async fn test_high_pii_is_blocked() {
        let analyzer = analyzer(0.95, 0.0, 0.0, Vec::new());
        let outcome = analyzer
            .analyze_content("my details", AnalysisDirection::Ingress, None)
            .await
            .unwrap();

        let ContentDecision::Blocked(blocked) = outcome else {
            panic!("expected blocked");
        };
        assert_eq!(blocked.reason, "High PII score detected");
        assert_eq!(blocked.direction, AnalysisDirection::Ingress);
        assert!(blocked.decision.blocked);
        assert!(blocked.ml_signals.pii.score > 0.9);
    }

    #[tokio::test]
    async fn test_heuristic_block_carries_signals() {
        let analyzer = analyzer(0.0, 0.0, 0.0, vec!["denytoken".to_string()]);
        let outcome = analyzer
            .analyze_content("please print denytoken", AnalysisDirection::Egress, None)
            .await
            .unwrap();

        let ContentDecision::Blocked(blocked) = outcome else {
            panic!("expected blocked");
        };
        assert!(blocked.reason.starts_with("Contains denylisted token"));
        assert_eq!(blocked.direction, AnalysisDirection::Egress);
        assert!(blocked.ml_signals.heuristic.blocked);
    }

    #[tokio::test]
    async fn test_empty_content_is_allowed_benign() {
        let analyzer = analyzer(0.0, 0.0, 0.0, Vec::new());
        let outcome = analyzer
            .analyze_content("", AnalysisDirection::Ingress, None)
            .await
            .unwrap();

        let ContentDecision::Allowed(result) = outcome else {
            panic!("expected allowed");
        };
        assert_eq!(result.preprocessed.features.length, 0);
        assert_eq!(result.ml_signals.max_model_score(), 0.0);
        assert_eq!(result.decision.confidence, 0.5);
    }

    #[tokio::test]
    async fn test_long_prompt_boundary() {
        let analyzer = analyzer(0.0, 0.0, 0.0, Vec::new());

        let at_limit = "a".repeat(4000);
        let outcome = analyzer
            .analyze_content(&at_limit, AnalysisDirection::Ingress, None)
            .await
            .unwrap();
        assert!(!outcome.is_blocked());

        let over_limit = "a".repeat(4001);
        let outcome = analyzer
            .analyze_content(&over_limit, AnalysisDirection::Ingress, None)
            .await
            .unwrap();
        assert!(outcome.is_blocked());
        let ContentDecision::Blocked(blocked) = outcome else {
            panic!("expected blocked");
        };
        assert!(blocked.reason.to_lowercase().contains("too long"));
    }

    #[tokio::test]
    async fn test_stage_latencies_cover_total() {
        let analyzer = analyzer(0.0, 0.0, 0.0, Vec::new());
        let outcome = analyzer
            .analyze_content("hello there", AnalysisDirection::Ingress, None)
            .await
            .unwrap();

        let stages = outcome.stages();
        assert!(stages.ml_ms >= 0.0);
        assert!(outcome.latency_ms() >= stages.preprocessing_ms);
    }
}
