//! Baseline-vs-candidate comparison
//!
//! Guardrails: every run must exist and be completed, all runs must share
//! the baseline's dataset name and split, candidates must differ from the
//! baseline, and metrics must exist for each run.
//!
//! Metric deltas carry a polarity; for latency and error counts the
//! polarity is inverted because lower is better. Aligned samples are
//! classified by their result-type transition; unchanged samples are
//! dropped.

use crate::store::{BenchmarkMetricsRow, BenchmarkResultRow, BenchmarkStore};
use semantic_firewall_core::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// Delta of one metric between baseline and candidate
#[derive(Debug, Clone, Serialize)]
pub struct MetricDelta {
    pub value: Option<f64>,
    pub percent: Option<f64>,
    /// `positive`, `negative` or `neutral`
    pub polarity: &'static str,
}

/// Compute a delta with polarity semantics
///
/// `positive_when_increases` is true for quality metrics (F1) and false
/// for lower-is-better metrics (latency, error counts).
pub fn compute_delta(
    baseline: Option<f64>,
    candidate: Option<f64>,
    positive_when_increases: bool,
) -> MetricDelta {
    let (Some(baseline), Some(candidate)) = (baseline, candidate) else {
        return MetricDelta {
            value: None,
            percent: None,
            polarity: "neutral",
        };
    };

    let delta = candidate - baseline;
    let percent = (baseline != 0.0).then(|| delta / baseline * 100.0);

    let polarity = if delta == 0.0 || percent.is_none() {
        "neutral"
    } else if (delta > 0.0) == positive_when_increases {
        "positive"
    } else {
        "negative"
    };

    MetricDelta {
        value: Some((delta * 10_000.0).round() / 10_000.0),
        percent: percent.map(|p| (p * 100.0).round() / 100.0),
        polarity,
    }
}

/// Transition of one sample between two runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleChangeType {
    /// Correctly blocked before, now allowed
    RegressionTpToFn,
    /// Correctly allowed before, now blocked
    RegressionTnToFp,
    /// Missed attack before, now detected
    ImprovementFnToTp,
    /// False positive before, now correctly allowed
    ImprovementFpToTn,
    Unchanged,
}

/// Classify how a sample's result changed between baseline and candidate
pub fn classify_sample_change(baseline: &str, candidate: &str) -> SampleChangeType {
    match (baseline, candidate) {
        ("TRUE_POSITIVE", "FALSE_NEGATIVE") => SampleChangeType::RegressionTpToFn,
        ("TRUE_NEGATIVE", "FALSE_POSITIVE") => SampleChangeType::RegressionTnToFp,
        ("FALSE_NEGATIVE", "TRUE_POSITIVE") => SampleChangeType::ImprovementFnToTp,
        ("FALSE_POSITIVE", "TRUE_NEGATIVE") => SampleChangeType::ImprovementFpToTn,
        _ => SampleChangeType::Unchanged,
    }
}

/// Per-sample change payload
#[derive(Debug, Clone, Serialize)]
pub struct SampleChange {
    pub sample_index: i64,
    pub input_text: String,
    pub expected_label: String,
    pub baseline_result_type: String,
    pub candidate_result_type: String,
    pub baseline_analysis: Option<serde_json::Value>,
    pub candidate_analysis: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SampleRegressions {
    pub critical: Vec<SampleChange>,
    pub new_false_positives: Vec<SampleChange>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SampleImprovements {
    pub new_detections: Vec<SampleChange>,
    pub fixed_false_positives: Vec<SampleChange>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SampleChangeSummary {
    pub total_regressions: usize,
    pub total_improvements: usize,
    pub net_change: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SampleChanges {
    pub regressions: SampleRegressions,
    pub improvements: SampleImprovements,
    pub summary: SampleChangeSummary,
}

/// Comparison details for one candidate run
#[derive(Debug, Clone, Serialize)]
pub struct CandidateComparison {
    pub run_id: String,
    pub start_time: String,
    pub detector_config: Option<serde_json::Value>,
    pub metrics: BenchmarkMetricsRow,
    pub deltas: BTreeMap<String, MetricDelta>,
    pub sample_changes: SampleChanges,
}

#[derive(Debug, Clone, Serialize)]
pub struct BaselineInfo {
    pub run_id: String,
    pub start_time: String,
    pub detector_config: Option<serde_json::Value>,
    pub metrics: BenchmarkMetricsRow,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetInfo {
    pub dataset_name: String,
    pub dataset_split: Option<String>,
}

/// Full comparison report
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub dataset_info: DatasetInfo,
    pub baseline: BaselineInfo,
    pub candidates: Vec<CandidateComparison>,
}

fn build_deltas(
    baseline: &BenchmarkMetricsRow,
    candidate: &BenchmarkMetricsRow,
) -> BTreeMap<String, MetricDelta> {
    let mut deltas = BTreeMap::new();

    // Quality metrics: higher is better
    deltas.insert(
        "precision".to_string(),
        compute_delta(Some(baseline.precision), Some(candidate.precision), true),
    );
    deltas.insert(
        "recall".to_string(),
        compute_delta(Some(baseline.recall), Some(candidate.recall), true),
    );
    deltas.insert(
        "f1_score".to_string(),
        compute_delta(Some(baseline.f1_score), Some(candidate.f1_score), true),
    );
    deltas.insert(
        "accuracy".to_string(),
        compute_delta(Some(baseline.accuracy), Some(candidate.accuracy), true),
    );

    // Error counts: lower is better
    deltas.insert(
        "false_positives".to_string(),
        compute_delta(
            Some(baseline.false_positives as f64),
            Some(candidate.false_positives as f64),
            false,
        ),
    );
    deltas.insert(
        "false_negatives".to_string(),
        compute_delta(
            Some(baseline.false_negatives as f64),
            Some(candidate.false_negatives as f64),
            false,
        ),
    );

    // Latency: lower is better
    deltas.insert(
        "avg_latency_ms".to_string(),
        compute_delta(baseline.avg_latency_ms, candidate.avg_latency_ms, false),
    );
    deltas.insert(
        "p50_latency_ms".to_string(),
        compute_delta(baseline.p50_latency_ms, candidate.p50_latency_ms, false),
    );
    deltas.insert(
        "p95_latency_ms".to_string(),
        compute_delta(baseline.p95_latency_ms, candidate.p95_latency_ms, false),
    );
    deltas.insert(
        "p99_latency_ms".to_string(),
        compute_delta(baseline.p99_latency_ms, candidate.p99_latency_ms, false),
    );

    deltas
}

fn sample_payload(
    index: i64,
    baseline: &BenchmarkResultRow,
    candidate: &BenchmarkResultRow,
) -> SampleChange {
    let parse = |raw: &Option<String>| {
        raw.as_deref()
            .and_then(|text| serde_json::from_str(text).ok())
    };

    SampleChange {
        sample_index: index,
        input_text: candidate.input_text.clone(),
        expected_label: candidate.expected_label.clone(),
        baseline_result_type: baseline.result_type.clone(),
        candidate_result_type: candidate.result_type.clone(),
        baseline_analysis: parse(&baseline.analysis_details),
        candidate_analysis: parse(&candidate.analysis_details),
    }
}

/// Compare a completed baseline run against one or more candidate runs
pub async fn compare_benchmarks(
    store: &BenchmarkStore,
    baseline_run_id: &str,
    candidate_run_ids: &[String],
) -> Result<ComparisonReport> {
    let candidate_run_ids: Vec<&String> = candidate_run_ids
        .iter()
        .filter(|id| !id.is_empty() && id.as_str() != baseline_run_id)
        .collect();
    if candidate_run_ids.is_empty() {
        return Err(Error::invalid_input(
            "At least one candidate_run_id distinct from the baseline is required",
        ));
    }

    // Load run metadata and enforce guardrails
    let baseline_run = store
        .get_run(baseline_run_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Benchmark run not found: {}", baseline_run_id)))?;

    let mut candidate_runs = Vec::new();
    for run_id in &candidate_run_ids {
        let run = store
            .get_run(run_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Benchmark run not found: {}", run_id)))?;
        candidate_runs.push(run);
    }

    let incomplete: Vec<&str> = std::iter::once(&baseline_run)
        .chain(candidate_runs.iter())
        .filter(|run| run.status != "completed")
        .map(|run| run.id.as_str())
        .collect();
    if !incomplete.is_empty() {
        return Err(Error::invalid_input(format!(
            "All benchmarks must be completed before comparison. Non-completed runs: {}",
            incomplete.join(", ")
        )));
    }

    let mismatched: Vec<&str> = candidate_runs
        .iter()
        .filter(|run| {
            run.dataset_name != baseline_run.dataset_name
                || run.dataset_split != baseline_run.dataset_split
        })
        .map(|run| run.id.as_str())
        .collect();
    if !mismatched.is_empty() {
        return Err(Error::invalid_input(
            "Cannot compare benchmarks from different datasets or splits",
        ));
    }

    // Metrics must exist for every run
    let baseline_metrics = store.get_metrics(baseline_run_id).await?.ok_or_else(|| {
        Error::invalid_input(format!("Metrics not found for run {}", baseline_run_id))
    })?;

    let baseline_results = store.get_results_by_sample_index(baseline_run_id).await?;

    let mut candidates = Vec::new();
    for run in &candidate_runs {
        let metrics = store
            .get_metrics(&run.id)
            .await?
            .ok_or_else(|| Error::invalid_input(format!("Metrics not found for run {}", run.id)))?;
        let candidate_results = store.get_results_by_sample_index(&run.id).await?;

        let mut common_indices: Vec<i64> = baseline_results
            .keys()
            .filter(|index| candidate_results.contains_key(index))
            .copied()
            .collect();
        common_indices.sort_unstable();

        let mut changes = SampleChanges::default();
        for index in common_indices {
            let baseline_sample = &baseline_results[&index];
            let candidate_sample = &candidate_results[&index];

            let change =
                classify_sample_change(&baseline_sample.result_type, &candidate_sample.result_type);
            if change == SampleChangeType::Unchanged {
                continue;
            }

            let payload = sample_payload(index, baseline_sample, candidate_sample);
            match change {
                SampleChangeType::RegressionTpToFn => changes.regressions.critical.push(payload),
                SampleChangeType::RegressionTnToFp => {
                    changes.regressions.new_false_positives.push(payload)
                }
                SampleChangeType::ImprovementFnToTp => {
                    changes.improvements.new_detections.push(payload)
                }
                SampleChangeType::ImprovementFpToTn => {
                    changes.improvements.fixed_false_positives.push(payload)
                }
                SampleChangeType::Unchanged => unreachable!(),
            }
        }

        let total_regressions =
            changes.regressions.critical.len() + changes.regressions.new_false_positives.len();
        let total_improvements = changes.improvements.new_detections.len()
            + changes.improvements.fixed_false_positives.len();
        changes.summary = SampleChangeSummary {
            total_regressions,
            total_improvements,
            net_change: total_improvements as i64 - total_regressions as i64,
        };

        candidates.push(CandidateComparison {
            run_id: run.id.clone(),
            start_time: run.start_time.clone(),
            detector_config: run.detector_config(),
            deltas: build_deltas(&baseline_metrics, &metrics),
            metrics,
            sample_changes: changes,
        });
    }

    Ok(ComparisonReport {
        dataset_info: DatasetInfo {
            dataset_name: baseline_run.dataset_name.clone(),
            dataset_split: baseline_run.dataset_split.clone(),
        },
        baseline: BaselineInfo {
            run_id: baseline_run.id.clone(),
            start_time: baseline_run.start_time.clone(),
            detector_config: baseline_run.detector_config(),
            metrics: baseline_metrics,
        },
        candidates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::BenchmarkMetrics;
    use crate::store::{NewResult, RunStatus};

    #[test]
    fn test_compute_delta_polarity() {
        let delta = compute_delta(Some(0.8), Some(0.9), true);
        assert_eq!(delta.value, Some(0.1));
        assert_eq!(delta.polarity, "positive");

        let delta = compute_delta(Some(0.9), Some(0.8), true);
        assert_eq!(delta.polarity, "negative");

        // Lower-is-better inverts
        let delta = compute_delta(Some(100.0), Some(80.0), false);
        assert_eq!(delta.polarity, "positive");
        assert_eq!(delta.percent, Some(-20.0));

        let delta = compute_delta(Some(0.5), Some(0.5), true);
        assert_eq!(delta.polarity, "neutral");

        let delta = compute_delta(None, Some(1.0), true);
        assert_eq!(delta.polarity, "neutral");
        assert!(delta.value.is_none());

        // Zero baseline has no meaningful percent
        let delta = compute_delta(Some(0.0), Some(1.0), true);
        assert_eq!(delta.polarity, "neutral");
        assert!(delta.percent.is_none());
    }

    #[test]
    fn test_classify_sample_change() {
        assert_eq!(
            classify_sample_change("TRUE_POSITIVE", "FALSE_NEGATIVE"),
            SampleChangeType::RegressionTpToFn
        );
        assert_eq!(
            classify_sample_change("FALSE_NEGATIVE", "TRUE_POSITIVE"),
            SampleChangeType::ImprovementFnToTp
        );
        assert_eq!(
            classify_sample_change("TRUE_POSITIVE", "TRUE_POSITIVE"),
            SampleChangeType::Unchanged
        );
        assert_eq!(
            classify_sample_change("ERROR", "TRUE_POSITIVE"),
            SampleChangeType::Unchanged
        );
    }

    async fn seeded_store() -> BenchmarkStore {
        let store = BenchmarkStore::in_memory().await.unwrap();
        store.initialize().await.unwrap();
        store
    }

    async fn seed_run(
        store: &BenchmarkStore,
        run_id: &str,
        result_types: &[&str],
        metrics: BenchmarkMetrics,
    ) {
        store
            .create_run(
                run_id,
                "jackhhao/jailbreak-classification",
                "local",
                "test",
                &serde_json::json!({"detector_config": null}),
                result_types.len() as i64,
            )
            .await
            .unwrap();

        let results: Vec<NewResult> = result_types
            .iter()
            .enumerate()
            .map(|(index, result_type)| NewResult {
                run_id: run_id.to_string(),
                sample_index: index as i64,
                input_text: format!("sample {}", index),
                expected_label: "jailbreak".to_string(),
                predicted_label: "blocked".to_string(),
                is_correct: *result_type == "TRUE_POSITIVE" || *result_type == "TRUE_NEGATIVE",
                result_type: result_type.to_string(),
                analysis_details: serde_json::json!({}),
                latency_ms: 1.0,
            })
            .collect();
        store.save_results_batch(&results).await.unwrap();
        store.save_metrics(run_id, &metrics).await.unwrap();
        store
            .update_run_status(run_id, RunStatus::Completed, None)
            .await
            .unwrap();
    }

    fn metrics(tp: u64, fn_: u64) -> BenchmarkMetrics {
        let recall = tp as f64 / (tp + fn_) as f64;
        BenchmarkMetrics {
            true_positives: tp,
            false_negatives: fn_,
            precision: 1.0,
            recall,
            f1_score: 2.0 * recall / (1.0 + recall),
            accuracy: recall,
            total_samples: tp + fn_,
            avg_latency_ms: Some(5.0),
            ..Default::default()
        }
    }

    /// Baseline (TP=10, FN=2) vs candidate (TP=11, FN=1): one new
    /// detection, net change +1, recall improves.
    #[tokio::test]
    async fn test_comparison_improvement() {
        let store = seeded_store().await;

        let mut baseline_types = vec!["TRUE_POSITIVE"; 10];
        baseline_types.extend(["FALSE_NEGATIVE", "FALSE_NEGATIVE"]);
        seed_run(&store, "r0", &baseline_types, metrics(10, 2)).await;

        let mut candidate_types = vec!["TRUE_POSITIVE"; 10];
        candidate_types.extend(["TRUE_POSITIVE", "FALSE_NEGATIVE"]);
        seed_run(&store, "r1", &candidate_types, metrics(11, 1)).await;

        let report = compare_benchmarks(&store, "r0", &["r1".to_string()])
            .await
            .unwrap();

        assert_eq!(report.baseline.run_id, "r0");
        assert_eq!(report.candidates.len(), 1);

        let candidate = &report.candidates[0];
        assert_eq!(candidate.sample_changes.improvements.new_detections.len(), 1);
        assert_eq!(candidate.sample_changes.summary.total_regressions, 0);
        assert_eq!(candidate.sample_changes.summary.net_change, 1);

        let recall = &candidate.deltas["recall"];
        assert!(recall.value.unwrap() > 0.0);
        assert_eq!(recall.polarity, "positive");
    }

    #[tokio::test]
    async fn test_comparison_guardrails() {
        let store = seeded_store().await;
        seed_run(&store, "r0", &["TRUE_POSITIVE"], metrics(1, 0)).await;

        // Unknown candidate
        let err = compare_benchmarks(&store, "r0", &["ghost".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        // Candidate equal to baseline filters down to nothing
        let err = compare_benchmarks(&store, "r0", &["r0".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        // Incomplete run
        store
            .create_run("r2", "jackhhao/jailbreak-classification", "local", "test",
                &serde_json::json!({}), 1)
            .await
            .unwrap();
        let err = compare_benchmarks(&store, "r0", &["r2".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_comparison_dataset_mismatch() {
        let store = seeded_store().await;
        seed_run(&store, "r0", &["TRUE_POSITIVE"], metrics(1, 0)).await;

        store
            .create_run("other", "different/set", "local", "test", &serde_json::json!({}), 1)
            .await
            .unwrap();
        store
            .save_metrics("other", &metrics(1, 0))
            .await
            .unwrap();
        store
            .update_run_status("other", RunStatus::Completed, None)
            .await
            .unwrap();

        let err = compare_benchmarks(&store, "r0", &["other".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
