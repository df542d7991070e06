//! Benchmark runner
//!
//! Replays samples through an analyzer with bounded concurrency:
//! samples are processed in batches, each batch fanning out up to
//! `max_concurrent_samples` tasks behind a semaphore. Results are
//! persisted per batch in one transaction, the progress counter is
//! bumped by the batch count, and a cooperative cancel flag is checked
//! before every batch. In-flight samples of the current batch always
//! finish.

use crate::dataset::DatasetSample;
use crate::metrics::{MetricsCalculator, ResultType, SampleOutcome};
use crate::store::{BenchmarkStore, NewResult, RunStatus};
use async_trait::async_trait;
use futures::future::join_all;
use semantic_firewall_core::{
    AnalysisDirection, ContentDecision, Error, RequestContext, Result,
};
use semantic_firewall_pipeline::Analyzer;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Analyzer port the runner drives; lets the engine run against the real
/// pipeline or a stub
#[async_trait]
pub trait SampleAnalyzer: Send + Sync {
    async fn analyze(&self, prompt: &str, context: &RequestContext) -> Result<ContentDecision>;
}

#[async_trait]
impl SampleAnalyzer for Analyzer {
    async fn analyze(&self, prompt: &str, context: &RequestContext) -> Result<ContentDecision> {
        self.analyze_content(prompt, AnalysisDirection::Ingress, Some(context))
            .await
    }
}

/// Runner concurrency knobs
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub max_concurrent_samples: usize,
    pub batch_size: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_samples: 10,
            batch_size: 50,
        }
    }
}

/// Descriptor of a run to start
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub dataset_name: String,
    pub dataset_source: String,
    pub dataset_split: String,
    pub tenant_id: String,
    pub max_samples: Option<usize>,
    pub detector_config: Option<HashMap<String, String>>,
}

struct RunProgress {
    status: RunStatus,
    total_samples: usize,
    processed_samples: usize,
    started: Instant,
}

/// In-memory status report for a tracked run
#[derive(Debug, Clone, Serialize)]
pub struct RunStatusReport {
    pub run_id: String,
    pub status: RunStatus,
    pub total_samples: usize,
    pub processed_samples: usize,
    pub progress_percent: f64,
    pub elapsed_time_seconds: f64,
    pub estimated_remaining_seconds: Option<f64>,
}

/// Bounded-concurrency benchmark runner
pub struct BenchmarkRunner {
    store: BenchmarkStore,
    config: RunnerConfig,
    active: Mutex<HashMap<String, RunProgress>>,
    cancel_flags: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl BenchmarkRunner {
    pub fn new(store: BenchmarkStore, config: RunnerConfig) -> Self {
        Self {
            store,
            config,
            active: Mutex::new(HashMap::new()),
            cancel_flags: Mutex::new(HashMap::new()),
        }
    }

    /// Persist a new run and spawn its background execution
    pub async fn start(
        self: Arc<Self>,
        analyzer: Arc<dyn SampleAnalyzer>,
        samples: Vec<DatasetSample>,
        spec: RunSpec,
    ) -> Result<String> {
        if samples.is_empty() {
            return Err(Error::invalid_input("No samples loaded from dataset"));
        }

        let run_id = Uuid::new_v4().to_string();
        tracing::info!(
            %run_id,
            dataset = %spec.dataset_name,
            samples = samples.len(),
            "Starting benchmark"
        );

        let config_snapshot = serde_json::json!({
            "dataset_name": &spec.dataset_name,
            "dataset_split": &spec.dataset_split,
            "max_samples": spec.max_samples,
            "tenant_id": &spec.tenant_id,
            "detector_config": &spec.detector_config,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        self.store
            .create_run(
                &run_id,
                &spec.dataset_name,
                &spec.dataset_source,
                &spec.dataset_split,
                &config_snapshot,
                samples.len() as i64,
            )
            .await?;

        let cancel = Arc::new(AtomicBool::new(false));
        self.cancel_flags
            .lock()
            .unwrap()
            .insert(run_id.clone(), Arc::clone(&cancel));
        self.active.lock().unwrap().insert(
            run_id.clone(),
            RunProgress {
                status: RunStatus::Running,
                total_samples: samples.len(),
                processed_samples: 0,
                started: Instant::now(),
            },
        );

        let runner = Arc::clone(&self);
        let task_run_id = run_id.clone();
        tokio::spawn(async move {
            runner
                .execute(task_run_id, analyzer, samples, spec.tenant_id, cancel)
                .await;
        });

        Ok(run_id)
    }

    async fn execute(
        self: Arc<Self>,
        run_id: String,
        analyzer: Arc<dyn SampleAnalyzer>,
        samples: Vec<DatasetSample>,
        tenant_id: String,
        cancel: Arc<AtomicBool>,
    ) {
        let outcome = self
            .execute_inner(&run_id, analyzer, samples, &tenant_id, &cancel)
            .await;

        if let Err(e) = outcome {
            tracing::error!(%run_id, error = %e, "Benchmark failed");
            let _ = self
                .store
                .update_run_status(&run_id, RunStatus::Failed, Some(&e.to_string()))
                .await;
            self.set_status(&run_id, RunStatus::Failed);
        }

        self.cancel_flags.lock().unwrap().remove(&run_id);
    }

    async fn execute_inner(
        &self,
        run_id: &str,
        analyzer: Arc<dyn SampleAnalyzer>,
        samples: Vec<DatasetSample>,
        tenant_id: &str,
        cancel: &AtomicBool,
    ) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_samples));
        let mut outcomes: Vec<SampleOutcome> = Vec::with_capacity(samples.len());

        for batch in samples.chunks(self.config.batch_size) {
            if cancel.load(Ordering::SeqCst) {
                tracing::info!(run_id, "Benchmark cancelled");
                self.store
                    .update_run_status(run_id, RunStatus::Cancelled, None)
                    .await?;
                self.set_status(run_id, RunStatus::Cancelled);
                return Ok(());
            }

            let tasks = batch.iter().map(|sample| {
                let semaphore = Arc::clone(&semaphore);
                let analyzer = Arc::clone(&analyzer);
                let sample = sample.clone();
                let run_id = run_id.to_string();
                let tenant_id = tenant_id.to_string();
                async move {
                    // Semaphore is never closed while the run is alive
                    let _permit = semaphore.acquire().await.expect("semaphore closed");
                    process_sample(analyzer.as_ref(), &run_id, &sample, &tenant_id).await
                }
            });

            let batch_results = join_all(tasks).await;

            let mut db_batch = Vec::with_capacity(batch_results.len());
            for (record, outcome) in batch_results {
                db_batch.push(record);
                outcomes.push(outcome);
            }

            self.store.save_results_batch(&db_batch).await?;
            self.store
                .add_processed_samples(run_id, db_batch.len() as i64)
                .await?;
            self.add_progress(run_id, db_batch.len());

            tracing::debug!(
                run_id,
                processed = outcomes.len(),
                total = samples.len(),
                "Batch persisted"
            );
        }

        let metrics = MetricsCalculator::calculate(&outcomes);
        self.store.save_metrics(run_id, &metrics).await?;
        self.store
            .update_run_status(run_id, RunStatus::Completed, None)
            .await?;
        self.set_status(run_id, RunStatus::Completed);

        tracing::info!(run_id, f1 = metrics.f1_score, "Benchmark completed");
        Ok(())
    }

    fn add_progress(&self, run_id: &str, count: usize) {
        if let Some(progress) = self.active.lock().unwrap().get_mut(run_id) {
            progress.processed_samples += count;
        }
    }

    fn set_status(&self, run_id: &str, status: RunStatus) {
        if let Some(progress) = self.active.lock().unwrap().get_mut(run_id) {
            progress.status = status;
        }
    }

    /// Request cancellation; idempotent, true while the run is cancelable
    pub fn cancel(&self, run_id: &str) -> bool {
        let active = self.active.lock().unwrap();
        let Some(progress) = active.get(run_id) else {
            return false;
        };
        if progress.status != RunStatus::Running {
            return false;
        }

        if let Some(flag) = self.cancel_flags.lock().unwrap().get(run_id) {
            tracing::info!(run_id, "Cancelling benchmark");
            flag.store(true, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// In-memory progress of a tracked run
    pub fn status(&self, run_id: &str) -> Option<RunStatusReport> {
        let active = self.active.lock().unwrap();
        let progress = active.get(run_id)?;

        let elapsed = progress.started.elapsed().as_secs_f64();
        let estimated_remaining = if progress.processed_samples > 0
            && progress.status == RunStatus::Running
        {
            let per_sample = elapsed / progress.processed_samples as f64;
            Some(per_sample * (progress.total_samples - progress.processed_samples) as f64)
        } else {
            None
        };

        Some(RunStatusReport {
            run_id: run_id.to_string(),
            status: progress.status,
            total_samples: progress.total_samples,
            processed_samples: progress.processed_samples,
            progress_percent: if progress.total_samples > 0 {
                progress.processed_samples as f64 / progress.total_samples as f64 * 100.0
            } else {
                0.0
            },
            elapsed_time_seconds: elapsed,
            estimated_remaining_seconds: estimated_remaining,
        })
    }

    pub fn store(&self) -> &BenchmarkStore {
        &self.store
    }
}

/// Run one sample through the analyzer and classify the outcome
async fn process_sample(
    analyzer: &dyn SampleAnalyzer,
    run_id: &str,
    sample: &DatasetSample,
    tenant_id: &str,
) -> (NewResult, SampleOutcome) {
    let started = Instant::now();

    let mut context = RequestContext::new(format!("benchmark-{}-{}", run_id, sample.index));
    context.user_id = Some(format!("benchmark-user-{}", run_id));
    context.session_id = Some(format!("benchmark-session-{}", run_id));
    context.tenant_id = tenant_id.to_string();
    context.device = Some("benchmark".to_string());
    context.custom.insert(
        "benchmark_run".to_string(),
        serde_json::Value::String(run_id.to_string()),
    );
    context.custom.insert(
        "sample_index".to_string(),
        serde_json::Value::from(sample.index),
    );

    match analyzer.analyze(&sample.prompt, &context).await {
        Ok(decision) => {
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
            let blocked = decision.is_blocked();
            let result_type = MetricsCalculator::classify(sample.expected_label, blocked);
            let policy = decision.decision();
            let ml_signals = decision.ml_signals();

            let analysis_details = serde_json::json!({
                "blocked": blocked,
                "reason": policy.reason,
                "ml_signals": {
                    "prompt_injection_score": ml_signals.prompt_injection.score,
                    "toxicity_score": ml_signals.toxicity.score,
                    "pii_score": ml_signals.pii.score,
                    "heuristic_blocked": ml_signals.heuristic.blocked,
                },
                "policy_decision": {
                    "blocked": policy.blocked,
                    "reason": policy.reason,
                    "confidence": policy.confidence,
                    "matched_rule": policy.matched_rule,
                },
                "latency_ms": latency_ms,
            });

            (
                NewResult {
                    run_id: run_id.to_string(),
                    sample_index: sample.index as i64,
                    input_text: sample.prompt.clone(),
                    expected_label: sample.expected_label.as_str().to_string(),
                    predicted_label: if blocked { "blocked" } else { "allowed" }.to_string(),
                    is_correct: result_type.is_correct(),
                    result_type: result_type.as_str().to_string(),
                    analysis_details,
                    latency_ms,
                },
                SampleOutcome {
                    result_type,
                    latency_ms,
                },
            )
        }
        Err(e) => {
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
            tracing::error!(run_id, sample = sample.index, error = %e, "Sample failed");

            (
                NewResult {
                    run_id: run_id.to_string(),
                    sample_index: sample.index as i64,
                    input_text: sample.prompt.clone(),
                    expected_label: sample.expected_label.as_str().to_string(),
                    predicted_label: "error".to_string(),
                    is_correct: false,
                    result_type: ResultType::Error.as_str().to_string(),
                    analysis_details: serde_json::json!({"error": e.to_string()}),
                    latency_ms,
                },
                SampleOutcome {
                    result_type: ResultType::Error,
                    latency_ms,
                },
            )
        }
    }
}
