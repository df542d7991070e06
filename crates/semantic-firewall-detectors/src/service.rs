//! ML filter service
//!
//! Fans one text out to all four detectors in parallel on the blocking
//! pool and joins. Per-detector wall-clock is measured inside each task;
//! `total_latency_ms` is the enclosing wall-clock of the fan-out.
//!
//! A detector error or panic is recovered as a zero/neutral score; the
//! service itself never fails.

use crate::ports::{HeuristicDetector, PiiDetector, PromptInjectionDetector, ToxicityDetector};
use crate::registry::{DetectorRegistry, DetectorSelection};
use semantic_firewall_core::{
    DetectorScore, HeuristicSignal, MlSignals, RequestContext, Result,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

/// Parallel four-detector fan-out
pub struct MlFilterService {
    pii: Arc<dyn PiiDetector>,
    toxicity: Arc<dyn ToxicityDetector>,
    prompt_injection: Arc<dyn PromptInjectionDetector>,
    heuristic: Arc<dyn HeuristicDetector>,
}

impl MlFilterService {
    pub fn new(
        pii: Arc<dyn PiiDetector>,
        toxicity: Arc<dyn ToxicityDetector>,
        prompt_injection: Arc<dyn PromptInjectionDetector>,
        heuristic: Arc<dyn HeuristicDetector>,
    ) -> Self {
        Self {
            pii,
            toxicity,
            prompt_injection,
            heuristic,
        }
    }

    /// Build a service from the shared registry, honoring a per-request
    /// detector selection
    pub fn from_registry(
        registry: &DetectorRegistry,
        selection: &DetectorSelection,
    ) -> Result<Self> {
        Ok(Self::new(
            registry.pii(selection.pii.as_deref())?,
            registry.toxicity(selection.toxicity.as_deref())?,
            registry.prompt_injection(selection.prompt_injection.as_deref())?,
            registry.heuristic(),
        ))
    }

    /// Run all four detectors in parallel and collect their signals
    pub async fn analyze(&self, text: &str, context: Option<&RequestContext>) -> MlSignals {
        let start = Instant::now();

        let pii_task = {
            let detector = Arc::clone(&self.pii);
            let text = text.to_string();
            spawn_scored("pii", move || detector.detect(&text))
        };
        let toxicity_task = {
            let detector = Arc::clone(&self.toxicity);
            let text = text.to_string();
            spawn_scored("toxicity", move || detector.detect(&text))
        };
        let injection_task = {
            let detector = Arc::clone(&self.prompt_injection);
            let text = text.to_string();
            let context = context.cloned();
            spawn_scored("prompt_injection", move || {
                detector.detect(&text, context.as_ref())
            })
        };
        let heuristic_task = {
            let detector = Arc::clone(&self.heuristic);
            let text = text.to_string();
            tokio::task::spawn_blocking(move || {
                let started = Instant::now();
                let verdict = detector.detect(&text).unwrap_or_else(|e| {
                    tracing::warn!(detector = "heuristic", error = %e, "Detector failed, passing");
                    Default::default()
                });
                let latency_ms = elapsed_ms(started);
                HeuristicSignal {
                    score: if verdict.blocked { 1.0 } else { 0.0 },
                    blocked: verdict.blocked,
                    flags: verdict.flags,
                    reason: verdict.reason,
                    latency_ms,
                }
            })
        };

        let (pii, toxicity, prompt_injection, heuristic) =
            tokio::join!(pii_task, toxicity_task, injection_task, heuristic_task);

        MlSignals {
            pii: recover_score("pii", pii),
            toxicity: recover_score("toxicity", toxicity),
            prompt_injection: recover_score("prompt_injection", prompt_injection),
            heuristic: heuristic.unwrap_or_else(|e| {
                tracing::error!(detector = "heuristic", error = %e, "Detector task panicked");
                HeuristicSignal::default()
            }),
            total_latency_ms: elapsed_ms(start),
        }
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Dispatch one scoring call on the blocking pool, timing it and
/// recovering errors as a zero score
fn spawn_scored<F>(name: &'static str, detect: F) -> JoinHandle<DetectorScore>
where
    F: FnOnce() -> Result<f32> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let started = Instant::now();
        let score = detect().unwrap_or_else(|e| {
            tracing::warn!(detector = name, error = %e, "Detector failed, scoring 0.0");
            0.0
        });
        DetectorScore::new(score, elapsed_ms(started))
    })
}

/// Flatten a join result, treating a panicked task as a zero score
fn recover_score(
    name: &'static str,
    joined: std::result::Result<DetectorScore, tokio::task::JoinError>,
) -> DetectorScore {
    joined.unwrap_or_else(|e| {
        tracing::error!(detector = name, error = %e, "Detector task panicked");
        DetectorScore::new(0.0, 0.0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::HeuristicVerdict;
    use semantic_firewall_core::Error;
    use std::time::Duration;

    struct FixedPii(f32, Duration);
    impl PiiDetector for FixedPii {
        fn name(&self) -> &str {
            "fixed"
        }
        fn detect(&self, _text: &str) -> Result<f32> {
            std::thread::sleep(self.1);
            Ok(self.0)
        }
    }

    struct FixedToxicity(f32, Duration);
    impl ToxicityDetector for FixedToxicity {
        fn name(&self) -> &str {
            "fixed"
        }
        fn detect(&self, _text: &str) -> Result<f32> {
            std::thread::sleep(self.1);
            Ok(self.0)
        }
    }

    struct FixedInjection(f32, Duration);
    impl PromptInjectionDetector for FixedInjection {
        fn name(&self) -> &str {
            "fixed"
        }
        fn detect(&self, _text: &str, _context: Option<&RequestContext>) -> Result<f32> {
            std::thread::sleep(self.1);
            Ok(self.0)
        }
    }

    struct FixedHeuristic(bool);
    impl HeuristicDetector for FixedHeuristic {
        fn name(&self) -> &str {
            "fixed"
        }
        fn detect(&self, _text: &str) -> Result<HeuristicVerdict> {
            if self.0 {
                Ok(HeuristicVerdict::blocked("match", "blocked"))
            } else {
                Ok(HeuristicVerdict::clean())
            }
        }
    }

    struct FailingToxicity;
    impl ToxicityDetector for FailingToxicity {
        fn name(&self) -> &str {
            "failing"
        }
        fn detect(&self, _text: &str) -> Result<f32> {
            Err(Error::detector("toxicity", "model exploded"))
        }
    }

    struct PanickingInjection;
    impl PromptInjectionDetector for PanickingInjection {
        fn name(&self) -> &str {
            "panicking"
        }
        fn detect(&self, _text: &str, _context: Option<&RequestContext>) -> Result<f32> {
            panic!("detector bug");
        }
    }

    fn service(delay: Duration) -> MlFilterService {
        MlFilterService::new(
            Arc::new(FixedPii(0.1, delay)),
            Arc::new(FixedToxicity(0.2, delay)),
            Arc::new(FixedInjection(0.3, delay)),
            Arc::new(FixedHeuristic(false)),
        )
    }

    #[tokio::test]
    async fn test_collects_all_scores() {
        let signals = service(Duration::ZERO).analyze("hello", None).await;
        assert_eq!(signals.pii.score, 0.1);
        assert_eq!(signals.toxicity.score, 0.2);
        assert_eq!(signals.prompt_injection.score, 0.3);
        assert!(!signals.heuristic.blocked);
    }

    #[tokio::test]
    async fn test_total_latency_at_least_max_detector_latency() {
        let signals = service(Duration::from_millis(30)).analyze("hi", None).await;
        let max = signals
            .pii
            .latency_ms
            .max(signals.toxicity.latency_ms)
            .max(signals.prompt_injection.latency_ms)
            .max(signals.heuristic.latency_ms);
        assert!(
            signals.total_latency_ms >= max,
            "total {} < max {}",
            signals.total_latency_ms,
            max
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_detectors_run_in_parallel() {
        let signals = service(Duration::from_millis(60)).analyze("hi", None).await;
        let sum = signals.pii.latency_ms
            + signals.toxicity.latency_ms
            + signals.prompt_injection.latency_ms;
        // Serial execution would take the sum (>= 180 ms); parallel runs
        // finish close to one detector's latency.
        assert!(
            signals.total_latency_ms < sum,
            "total {} not faster than serial {}",
            signals.total_latency_ms,
            sum
        );
    }

    #[tokio::test]
    async fn test_detector_error_scores_zero() {
        let service = MlFilterService::new(
            Arc::new(FixedPii(0.5, Duration::ZERO)),
            Arc::new(FailingToxicity),
            Arc::new(FixedInjection(0.4, Duration::ZERO)),
            Arc::new(FixedHeuristic(false)),
        );

        let signals = service.analyze("hello", None).await;
        assert_eq!(signals.toxicity.score, 0.0);
        // The other detectors still report
        assert_eq!(signals.pii.score, 0.5);
        assert_eq!(signals.prompt_injection.score, 0.4);
    }

    #[tokio::test]
    async fn test_detector_panic_scores_zero() {
        let service = MlFilterService::new(
            Arc::new(FixedPii(0.5, Duration::ZERO)),
            Arc::new(FixedToxicity(0.2, Duration::ZERO)),
            Arc::new(PanickingInjection),
            Arc::new(FixedHeuristic(false)),
        );

        let signals = service.analyze("hello", None).await;
        assert_eq!(signals.prompt_injection.score, 0.0);
        assert_eq!(signals.pii.score, 0.5);
    }

    #[tokio::test]
    async fn test_heuristic_block_reported() {
        let service = MlFilterService::new(
            Arc::new(FixedPii(0.0, Duration::ZERO)),
            Arc::new(FixedToxicity(0.0, Duration::ZERO)),
            Arc::new(FixedInjection(0.0, Duration::ZERO)),
            Arc::new(FixedHeuristic(true)),
        );

        let signals = service.analyze("hello", None).await;
        assert!(signals.heuristic.blocked);
        assert_eq!(signals.heuristic.score, 1.0);
        assert_eq!(signals.heuristic.flags, vec!["match".to_string()]);
    }

    #[tokio::test]
    async fn test_from_registry_rejects_unknown_model() {
        let registry = DetectorRegistry::default();
        let selection = DetectorSelection {
            pii: Some("bogus".to_string()),
            ..Default::default()
        };
        assert!(MlFilterService::from_registry(&registry, &selection).is_err());
    }

    #[tokio::test]
    async fn test_empty_prompt_scores_zero() {
        let registry = DetectorRegistry::default();
        let service =
            MlFilterService::from_registry(&registry, &DetectorSelection::default()).unwrap();
        let signals = service.analyze("", None).await;
        assert_eq!(signals.pii.score, 0.0);
        assert_eq!(signals.prompt_injection.score, 0.0);
        assert!(!signals.heuristic.blocked);
    }
}
