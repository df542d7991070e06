//! Benchmark metrics
//!
//! "Positive" means "predicted blocked"; ground truth `jailbreak` is the
//! positive class. Latency percentiles use linear interpolation between
//! ranks.

use crate::dataset::ExpectedLabel;
use serde::{Deserialize, Serialize};

/// Confusion-matrix classification of one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultType {
    #[serde(rename = "TRUE_POSITIVE")]
    TruePositive,
    #[serde(rename = "FALSE_POSITIVE")]
    FalsePositive,
    #[serde(rename = "TRUE_NEGATIVE")]
    TrueNegative,
    #[serde(rename = "FALSE_NEGATIVE")]
    FalseNegative,
    #[serde(rename = "ERROR")]
    Error,
}

impl ResultType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultType::TruePositive => "TRUE_POSITIVE",
            ResultType::FalsePositive => "FALSE_POSITIVE",
            ResultType::TrueNegative => "TRUE_NEGATIVE",
            ResultType::FalseNegative => "FALSE_NEGATIVE",
            ResultType::Error => "ERROR",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "TRUE_POSITIVE" => Some(ResultType::TruePositive),
            "FALSE_POSITIVE" => Some(ResultType::FalsePositive),
            "TRUE_NEGATIVE" => Some(ResultType::TrueNegative),
            "FALSE_NEGATIVE" => Some(ResultType::FalseNegative),
            "ERROR" => Some(ResultType::Error),
            _ => None,
        }
    }

    /// Correct iff a true positive or true negative
    pub fn is_correct(&self) -> bool {
        matches!(self, ResultType::TruePositive | ResultType::TrueNegative)
    }
}

/// Outcome of one processed sample, the unit metrics are computed over
#[derive(Debug, Clone, Copy)]
pub struct SampleOutcome {
    pub result_type: ResultType,
    pub latency_ms: f64,
}

/// Aggregate metrics of a completed run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchmarkMetrics {
    pub true_positives: u64,
    pub false_positives: u64,
    pub true_negatives: u64,
    pub false_negatives: u64,
    pub error_count: u64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub accuracy: f64,
    pub total_samples: u64,
    pub avg_latency_ms: Option<f64>,
    pub p50_latency_ms: Option<f64>,
    pub p95_latency_ms: Option<f64>,
    pub p99_latency_ms: Option<f64>,
}

/// Confusion-matrix and latency aggregation
#[derive(Debug, Default)]
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Classify a sample outcome from ground truth and prediction
    pub fn classify(expected: ExpectedLabel, predicted_blocked: bool) -> ResultType {
        match (expected, predicted_blocked) {
            (ExpectedLabel::Jailbreak, true) => ResultType::TruePositive,
            (ExpectedLabel::Jailbreak, false) => ResultType::FalseNegative,
            (ExpectedLabel::Benign, true) => ResultType::FalsePositive,
            (ExpectedLabel::Benign, false) => ResultType::TrueNegative,
        }
    }

    /// Aggregate per-sample outcomes into run metrics
    pub fn calculate(outcomes: &[SampleOutcome]) -> BenchmarkMetrics {
        let mut metrics = BenchmarkMetrics::default();

        for outcome in outcomes {
            match outcome.result_type {
                ResultType::TruePositive => metrics.true_positives += 1,
                ResultType::FalsePositive => metrics.false_positives += 1,
                ResultType::TrueNegative => metrics.true_negatives += 1,
                ResultType::FalseNegative => metrics.false_negatives += 1,
                ResultType::Error => metrics.error_count += 1,
            }
        }

        let tp = metrics.true_positives as f64;
        let fp = metrics.false_positives as f64;
        let tn = metrics.true_negatives as f64;
        let fn_ = metrics.false_negatives as f64;
        let classified = tp + fp + tn + fn_;

        metrics.total_samples = classified as u64;
        metrics.precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
        metrics.recall = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };
        metrics.f1_score = if metrics.precision + metrics.recall > 0.0 {
            2.0 * metrics.precision * metrics.recall / (metrics.precision + metrics.recall)
        } else {
            0.0
        };
        metrics.accuracy = if classified > 0.0 {
            (tp + tn) / classified
        } else {
            0.0
        };

        let mut latencies: Vec<f64> = outcomes
            .iter()
            .filter(|o| o.result_type != ResultType::Error)
            .map(|o| o.latency_ms)
            .collect();

        if !latencies.is_empty() {
            latencies.sort_by(|a, b| a.total_cmp(b));
            let avg = latencies.iter().sum::<f64>() / latencies.len() as f64;
            metrics.avg_latency_ms = Some(avg);
            metrics.p50_latency_ms = Some(percentile(&latencies, 50.0));
            metrics.p95_latency_ms = Some(percentile(&latencies, 95.0));
            metrics.p99_latency_ms = Some(percentile(&latencies, 99.0));
        }

        metrics
    }
}

/// Linear-interpolated percentile over a sorted slice
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }

    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let weight = rank - lo as f64;
        sorted[lo] * (1.0 - weight) + sorted[hi] * weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(result_type: ResultType, latency_ms: f64) -> SampleOutcome {
        SampleOutcome {
            result_type,
            latency_ms,
        }
    }

    #[test]
    fn test_classification_matrix() {
        assert_eq!(
            MetricsCalculator::classify(ExpectedLabel::Jailbreak, true),
            ResultType::TruePositive
        );
        assert_eq!(
            MetricsCalculator::classify(ExpectedLabel::Jailbreak, false),
            ResultType::FalseNegative
        );
        assert_eq!(
            MetricsCalculator::classify(ExpectedLabel::Benign, true),
            ResultType::FalsePositive
        );
        assert_eq!(
            MetricsCalculator::classify(ExpectedLabel::Benign, false),
            ResultType::TrueNegative
        );
    }

    #[test]
    fn test_is_correct() {
        assert!(ResultType::TruePositive.is_correct());
        assert!(ResultType::TrueNegative.is_correct());
        assert!(!ResultType::FalsePositive.is_correct());
        assert!(!ResultType::FalseNegative.is_correct());
        assert!(!ResultType::Error.is_correct());
    }

    #[test]
    fn test_metrics_calculation() {
        let outcomes = vec![
            outcome(ResultType::TruePositive, 10.0),
            outcome(ResultType::TruePositive, 20.0),
            outcome(ResultType::FalsePositive, 30.0),
            outcome(ResultType::TrueNegative, 40.0),
            outcome(ResultType::FalseNegative, 50.0),
        ];

        let metrics = MetricsCalculator::calculate(&outcomes);
        assert_eq!(metrics.true_positives, 2);
        assert_eq!(metrics.false_positives, 1);
        assert_eq!(metrics.true_negatives, 1);
        assert_eq!(metrics.false_negatives, 1);
        assert_eq!(metrics.total_samples, 5);

        assert!((metrics.precision - 2.0 / 3.0).abs() < 1e-9);
        assert!((metrics.recall - 2.0 / 3.0).abs() < 1e-9);
        assert!((metrics.f1_score - 2.0 / 3.0).abs() < 1e-9);
        assert!((metrics.accuracy - 0.6).abs() < 1e-9);
        assert_eq!(metrics.avg_latency_ms, Some(30.0));
        assert_eq!(metrics.p50_latency_ms, Some(30.0));
    }

    #[test]
    fn test_empty_outcomes() {
        let metrics = MetricsCalculator::calculate(&[]);
        assert_eq!(metrics.precision, 0.0);
        assert_eq!(metrics.recall, 0.0);
        assert_eq!(metrics.accuracy, 0.0);
        assert!(metrics.avg_latency_ms.is_none());
    }

    #[test]
    fn test_errors_counted_separately() {
        let outcomes = vec![
            outcome(ResultType::TruePositive, 10.0),
            outcome(ResultType::Error, 0.0),
            outcome(ResultType::Error, 0.0),
        ];
        let metrics = MetricsCalculator::calculate(&outcomes);
        assert_eq!(metrics.error_count, 2);
        assert_eq!(metrics.total_samples, 1);
        // Error latencies do not pollute the percentiles
        assert_eq!(metrics.avg_latency_ms, Some(10.0));
    }

    #[test]
    fn test_all_blocked_none_expected() {
        let outcomes = vec![
            outcome(ResultType::FalsePositive, 5.0),
            outcome(ResultType::FalsePositive, 5.0),
        ];
        let metrics = MetricsCalculator::calculate(&outcomes);
        assert_eq!(metrics.precision, 0.0);
        assert_eq!(metrics.recall, 0.0);
        assert_eq!(metrics.f1_score, 0.0);
    }

    #[test]
    fn test_percentiles() {
        let sorted: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        assert!((percentile(&sorted, 50.0) - 50.5).abs() < 1e-9);
        assert!((percentile(&sorted, 99.0) - 99.01).abs() < 1e-9);
        assert_eq!(percentile(&[42.0], 95.0), 42.0);
    }

    #[test]
    fn test_result_type_roundtrip() {
        for result_type in [
            ResultType::TruePositive,
            ResultType::FalsePositive,
            ResultType::TrueNegative,
            ResultType::FalseNegative,
            ResultType::Error,
        ] {
            assert_eq!(ResultType::parse(result_type.as_str()), Some(result_type));
        }
        assert_eq!(ResultType::parse("BOGUS"), None);
    }
}
