//! Request and response bodies for the HTTP surface

use semantic_firewall_detectors::DetectorSelection;
use serde::{Deserialize, Serialize};

/// POST /api/chat request body
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub detector_config: Option<DetectorSelection>,
}

/// Per-detector report: score, threshold, pass/warn/block status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorReport {
    pub name: String,
    pub score: f32,
    pub latency_ms: f64,
    pub threshold: Option<f32>,
    /// `pass`, `warn` or `block`
    pub status: String,
    pub model_name: String,
}

/// Preprocessing summary
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PreprocessingReport {
    pub original_length: usize,
    pub normalized_length: usize,
    pub word_count: usize,
    pub char_count: usize,
}

/// Policy summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyReport {
    pub matched_rule: Option<String>,
    pub confidence: f32,
    /// `low`, `medium`, `high` or `critical`
    pub risk_level: String,
}

/// Per-stage latency breakdown
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LatencyBreakdown {
    pub preprocessing: f64,
    pub ml_analysis: f64,
    pub policy_eval: f64,
    pub backend: f64,
}

/// POST /api/chat response body (200 for both allow and block)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    pub ml_detectors: Vec<DetectorReport>,
    pub preprocessing: Option<PreprocessingReport>,
    pub policy: Option<PolicyReport>,
    pub latency_breakdown: LatencyBreakdown,
    pub total_latency_ms: f64,
}

/// POST /api/benchmarks/start request body
#[derive(Debug, Clone, Deserialize)]
pub struct StartBenchmarkRequest {
    #[serde(default)]
    pub dataset_name: Option<String>,
    #[serde(default = "default_split")]
    pub dataset_split: String,
    #[serde(default)]
    pub max_samples: Option<usize>,
    #[serde(default = "default_benchmark_tenant")]
    pub tenant_id: String,
    #[serde(default)]
    pub detector_config: Option<DetectorSelection>,
    #[serde(default)]
    pub custom_dataset_id: Option<String>,
}

fn default_split() -> String {
    "test".to_string()
}

fn default_benchmark_tenant() -> String {
    "benchmark".to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct StartBenchmarkResponse {
    pub run_id: String,
}

/// GET /api/benchmarks/status/{id} response body
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkStatusResponse {
    pub run_id: String,
    pub status: String,
    pub total_samples: i64,
    pub processed_samples: i64,
    pub progress_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_time_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_remaining_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detector_config: Option<serde_json::Value>,
}

/// POST /api/benchmarks/datasets/upload response body
#[derive(Debug, Clone, Serialize)]
pub struct DatasetUploadResponse {
    pub dataset_id: String,
    pub name: String,
    pub description: Option<String>,
    pub file_type: String,
    pub total_samples: i64,
    pub created_at: String,
}

/// Pagination for list endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PageQuery {
    pub limit: i64,
    pub offset: i64,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

/// Query for GET /api/benchmarks/results/{id}
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResultsQuery {
    pub result_type: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ResultsQuery {
    fn default() -> Self {
        Self {
            result_type: None,
            limit: 100,
            offset: 0,
        }
    }
}

/// Query for GET /api/benchmarks/compare
#[derive(Debug, Clone, Deserialize)]
pub struct CompareQuery {
    pub baseline_run_id: String,
    /// Comma-separated candidate run ids
    pub candidate_run_ids: String,
}

impl CompareQuery {
    pub fn candidates(&self) -> Vec<String> {
        self.candidate_run_ids
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Query for GET /api/recent-requests
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecentQuery {
    pub limit: usize,
}

impl Default for RecentQuery {
    fn default() -> Self {
        Self { limit: 50 }
    }
}

/// Query for GET /api/session-analytics
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionsQuery {
    pub top: usize,
}

impl Default for SessionsQuery {
    fn default() -> Self {
        Self { top: 5 }
    }
}

/// Query for GET /api/temporal-breakdown
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TemporalQuery {
    pub minutes: i64,
}

impl Default for TemporalQuery {
    fn default() -> Self {
        Self { minutes: 10 }
    }
}
