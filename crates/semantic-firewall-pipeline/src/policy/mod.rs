//! Policy engine
//!
//! Converts detector scores and text features into an allow/block
//! decision. The policy document is loaded lazily, exactly once per
//! process, and can be invalidated at runtime.
//!
//! Two evaluator backends:
//!
//! - [`RuleTableEvaluator`] - ordered first-match-wins rule table with
//!   boolean comparison conditions over a flattened context
//! - [`RemotePolicyEvaluator`] - ships the policy document to an external
//!   decision service; re-uploads only when the document hash changes,
//!   and fails open (configurable) on evaluator errors

pub mod eval;
pub mod loader;
pub mod remote;
pub mod tenant;

pub use eval::{PolicyInput, RuleTableEvaluator};
pub use loader::{PolicyDocument, PolicyLoader, PolicyRule, YamlPolicyLoader};
pub use remote::RemotePolicyEvaluator;
pub use tenant::{MemoryTenantContext, TenantContextProvider};

use async_trait::async_trait;
use semantic_firewall_core::{MlSignals, PolicyDecision, Result, TextFeatures};
use std::sync::{Arc, Mutex};

/// Evaluator port
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        document: &PolicyDocument,
        input: &PolicyInput,
    ) -> Result<PolicyDecision>;
}

/// Policy evaluation service
pub struct PolicyService {
    loader: Box<dyn PolicyLoader>,
    evaluator: Box<dyn PolicyEvaluator>,
    tenants: Box<dyn TenantContextProvider>,
    cached: Mutex<Option<Arc<PolicyDocument>>>,
}

impl PolicyService {
    pub fn new(
        loader: Box<dyn PolicyLoader>,
        evaluator: Box<dyn PolicyEvaluator>,
        tenants: Box<dyn TenantContextProvider>,
    ) -> Self {
        Self {
            loader,
            evaluator,
            tenants,
            cached: Mutex::new(None),
        }
    }

    /// Baseline rule table, in-memory tenant contexts
    pub fn with_defaults() -> Self {
        Self::new(
            Box::new(YamlPolicyLoader::baseline()),
            Box::new(RuleTableEvaluator::new()),
            Box::new(MemoryTenantContext::new()),
        )
    }

    /// Lazily load the policy document; concurrent callers share one parse
    fn document(&self) -> Result<Arc<PolicyDocument>> {
        let mut cached = self.cached.lock().unwrap();
        if let Some(document) = cached.as_ref() {
            return Ok(Arc::clone(document));
        }

        let document = Arc::new(self.loader.load()?);
        tracing::info!(rules = document.rules.len(), "Policy document loaded");
        *cached = Some(Arc::clone(&document));
        Ok(document)
    }

    /// Drop the cached document so the next evaluation reloads it
    pub fn invalidate(&self) {
        *self.cached.lock().unwrap() = None;
    }

    /// Evaluate the policy for one request
    ///
    /// Never fails: loader or evaluator errors fail open with confidence
    /// 0.0 and an error log. (The remote evaluator applies its own
    /// fail-open/fail-closed toggle before an error ever reaches here.)
    pub async fn evaluate(
        &self,
        ml_signals: &MlSignals,
        features: &TextFeatures,
        tenant_id: &str,
    ) -> PolicyDecision {
        let document = match self.document() {
            Ok(document) => document,
            Err(e) => {
                tracing::error!(error = %e, "Policy load failed, failing open");
                return PolicyDecision {
                    blocked: false,
                    reason: None,
                    confidence: 0.0,
                    matched_rule: None,
                };
            }
        };

        let input = PolicyInput::new(ml_signals, features, self.tenants.context(tenant_id));

        match self.evaluator.evaluate(&document, &input).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::error!(error = %e, "Policy evaluation failed, failing open");
                PolicyDecision {
                    blocked: false,
                    reason: None,
                    confidence: 0.0,
                    matched_rule: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semantic_firewall_core::{DetectorScore, HeuristicSignal};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn signals(pii: f32, toxicity: f32, injection: f32, heuristic_blocked: bool) -> MlSignals {
        MlSignals {
            pii: DetectorScore::new(pii, 1.0),
            toxicity: DetectorScore::new(toxicity, 1.0),
            prompt_injection: DetectorScore::new(injection, 1.0),
            heuristic: HeuristicSignal {
                blocked: heuristic_blocked,
                score: if heuristic_blocked { 1.0 } else { 0.0 },
                reason: heuristic_blocked.then(|| "Pattern match: x".to_string()),
                ..Default::default()
            },
            total_latency_ms: 1.0,
        }
    }

    fn features(length: usize) -> TextFeatures {
        TextFeatures {
            length,
            word_count: length / 5,
            char_count: length,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_baseline_heuristic_block() {
        let service = PolicyService::with_defaults();
        let decision = service
            .evaluate(&signals(0.0, 0.0, 0.0, true), &features(10), "default")
            .await;
        assert!(decision.blocked);
        assert_eq!(decision.reason.as_deref(), Some("Heuristic detection blocked"));
        assert!(decision.confidence >= 0.9);
        assert_eq!(decision.matched_rule.as_deref(), Some("heuristic_block"));
    }

    #[tokio::test]
    async fn test_baseline_pii_threshold() {
        let service = PolicyService::with_defaults();
        let decision = service
            .evaluate(&signals(0.9, 0.0, 0.0, false), &features(10), "default")
            .await;
        assert!(decision.blocked);
        assert_eq!(decision.reason.as_deref(), Some("High PII score detected"));
        assert_eq!(decision.matched_rule.as_deref(), Some("pii_threshold"));

        // Exactly at the threshold does not block
        let decision = service
            .evaluate(&signals(0.8, 0.0, 0.0, false), &features(10), "default")
            .await;
        assert!(!decision.blocked);
    }

    #[tokio::test]
    async fn test_baseline_toxicity_threshold() {
        let service = PolicyService::with_defaults();
        let decision = service
            .evaluate(&signals(0.0, 0.75, 0.0, false), &features(10), "default")
            .await;
        assert!(decision.blocked);
        assert_eq!(decision.matched_rule.as_deref(), Some("toxicity_threshold"));
    }

    #[tokio::test]
    async fn test_baseline_prompt_injection_threshold() {
        let service = PolicyService::with_defaults();
        let decision = service
            .evaluate(&signals(0.0, 0.0, 0.85, false), &features(10), "default")
            .await;
        assert!(decision.blocked);
        assert_eq!(
            decision.matched_rule.as_deref(),
            Some("prompt_injection_threshold")
        );

        // 0.6 from the keyword fallback stays under the 0.8 threshold
        let decision = service
            .evaluate(&signals(0.0, 0.0, 0.6, false), &features(10), "default")
            .await;
        assert!(!decision.blocked);
    }

    #[tokio::test]
    async fn test_baseline_length_boundary() {
        let service = PolicyService::with_defaults();

        let decision = service
            .evaluate(&signals(0.0, 0.0, 0.0, false), &features(4000), "default")
            .await;
        assert!(!decision.blocked, "length 4000 must pass");

        let decision = service
            .evaluate(&signals(0.0, 0.0, 0.0, false), &features(4001), "default")
            .await;
        assert!(decision.blocked, "length 4001 must block");
        assert!(decision.reason.unwrap().to_lowercase().contains("too long"));
        assert_eq!(decision.matched_rule.as_deref(), Some("max_length"));
    }

    #[tokio::test]
    async fn test_baseline_default_allow() {
        let service = PolicyService::with_defaults();
        let decision = service
            .evaluate(&signals(0.1, 0.1, 0.1, false), &features(20), "default")
            .await;
        assert!(!decision.blocked);
        assert_eq!(decision.confidence, 0.5);
        assert!(decision.matched_rule.is_none());
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        // Heuristic block outranks the later PII rule
        let service = PolicyService::with_defaults();
        let decision = service
            .evaluate(&signals(0.99, 0.0, 0.0, true), &features(10), "default")
            .await;
        assert_eq!(decision.matched_rule.as_deref(), Some("heuristic_block"));
    }

    struct CountingLoader(Arc<AtomicUsize>);
    impl PolicyLoader for CountingLoader {
        fn load(&self) -> Result<PolicyDocument> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(PolicyDocument::baseline())
        }
    }

    #[tokio::test]
    async fn test_policy_loaded_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let service = PolicyService::new(
            Box::new(CountingLoader(loads.clone())),
            Box::new(RuleTableEvaluator::new()),
            Box::new(MemoryTenantContext::new()),
        );

        for _ in 0..5 {
            service
                .evaluate(&signals(0.0, 0.0, 0.0, false), &features(10), "default")
                .await;
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        service.invalidate();
        service
            .evaluate(&signals(0.0, 0.0, 0.0, false), &features(10), "default")
            .await;
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    struct FailingLoader;
    impl PolicyLoader for FailingLoader {
        fn load(&self) -> Result<PolicyDocument> {
            Err(semantic_firewall_core::Error::policy("disk on fire"))
        }
    }

    #[tokio::test]
    async fn test_loader_failure_fails_open() {
        let service = PolicyService::new(
            Box::new(FailingLoader),
            Box::new(RuleTableEvaluator::new()),
            Box::new(MemoryTenantContext::new()),
        );
        let decision = service
            .evaluate(&signals(0.99, 0.99, 0.99, true), &features(9000), "default")
            .await;
        assert!(!decision.blocked);
        assert_eq!(decision.confidence, 0.0);
    }
}
