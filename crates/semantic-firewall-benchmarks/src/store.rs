//! Benchmark store
//!
//! SQLite persistence of benchmark runs, per-sample results, aggregated
//! metrics and custom-dataset metadata. One writer per run; readers may
//! be concurrent. `save_results_batch` is a single transaction.

use crate::metrics::BenchmarkMetrics;
use semantic_firewall_core::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Lifecycle of a benchmark run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl FromStr for RunStatus {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" => Ok(RunStatus::Cancelled),
            other => Err(Error::database(format!("Unknown run status: {}", other))),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A benchmark run row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BenchmarkRunRow {
    pub id: String,
    pub dataset_name: String,
    pub dataset_source: String,
    pub dataset_split: Option<String>,
    pub config_snapshot: Option<String>,
    pub start_time: String,
    pub end_time: Option<String>,
    pub status: String,
    pub total_samples: i64,
    pub processed_samples: i64,
    pub error_message: Option<String>,
}

impl BenchmarkRunRow {
    /// Parse the `detector_config` field out of the config snapshot
    pub fn detector_config(&self) -> Option<serde_json::Value> {
        let snapshot: serde_json::Value =
            serde_json::from_str(self.config_snapshot.as_deref()?).ok()?;
        let config = snapshot.get("detector_config")?.clone();
        (!config.is_null()).then_some(config)
    }
}

/// A per-sample result row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BenchmarkResultRow {
    pub id: i64,
    pub run_id: String,
    pub sample_index: i64,
    pub input_text: String,
    pub expected_label: String,
    pub predicted_label: String,
    pub is_correct: bool,
    pub result_type: String,
    pub analysis_details: Option<String>,
    pub latency_ms: f64,
    pub created_at: String,
}

/// A result ready to persist
#[derive(Debug, Clone)]
pub struct NewResult {
    pub run_id: String,
    pub sample_index: i64,
    pub input_text: String,
    pub expected_label: String,
    pub predicted_label: String,
    pub is_correct: bool,
    pub result_type: String,
    pub analysis_details: serde_json::Value,
    pub latency_ms: f64,
}

/// Aggregated metrics row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BenchmarkMetricsRow {
    pub run_id: String,
    pub true_positives: i64,
    pub false_positives: i64,
    pub true_negatives: i64,
    pub false_negatives: i64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub accuracy: f64,
    pub avg_latency_ms: Option<f64>,
    pub p50_latency_ms: Option<f64>,
    pub p95_latency_ms: Option<f64>,
    pub p99_latency_ms: Option<f64>,
}

/// Custom dataset metadata row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DatasetMetadataRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub file_key: String,
    pub file_type: String,
    pub total_samples: i64,
    pub created_at: String,
}

/// False-positive / false-negative drill-down
#[derive(Debug, Clone, Serialize)]
pub struct ErrorAnalysis {
    pub false_positives: Vec<BenchmarkResultRow>,
    pub false_negatives: Vec<BenchmarkResultRow>,
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn db_err(e: sqlx::Error) -> Error {
    Error::database(e.to_string())
}

/// SQLite-backed benchmark store
#[derive(Clone)]
pub struct BenchmarkStore {
    pool: SqlitePool,
}

impl BenchmarkStore {
    /// Open (creating if needed) the store at the given path
    pub async fn connect(db_path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(db_err)?;

        Ok(Self { pool })
    }

    /// In-memory store for tests
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;
        Ok(Self { pool })
    }

    /// Create tables and indices if they do not exist
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS benchmark_runs (
                id TEXT PRIMARY KEY,
                dataset_name TEXT NOT NULL,
                dataset_source TEXT NOT NULL,
                dataset_split TEXT,
                config_snapshot TEXT,
                start_time TEXT NOT NULL,
                end_time TEXT,
                status TEXT NOT NULL,
                total_samples INTEGER,
                processed_samples INTEGER DEFAULT 0,
                error_message TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS benchmark_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                sample_index INTEGER NOT NULL,
                input_text TEXT NOT NULL,
                expected_label TEXT NOT NULL,
                predicted_label TEXT NOT NULL,
                is_correct INTEGER NOT NULL,
                result_type TEXT NOT NULL,
                analysis_details TEXT,
                latency_ms REAL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (run_id) REFERENCES benchmark_runs(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS benchmark_metrics (
                run_id TEXT PRIMARY KEY,
                true_positives INTEGER NOT NULL,
                false_positives INTEGER NOT NULL,
                true_negatives INTEGER NOT NULL,
                false_negatives INTEGER NOT NULL,
                precision REAL NOT NULL,
                recall REAL NOT NULL,
                f1_score REAL NOT NULL,
                accuracy REAL NOT NULL,
                avg_latency_ms REAL,
                p50_latency_ms REAL,
                p95_latency_ms REAL,
                p99_latency_ms REAL,
                FOREIGN KEY (run_id) REFERENCES benchmark_runs(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dataset_metadata (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                file_key TEXT NOT NULL,
                file_type TEXT NOT NULL,
                total_samples INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_results_run_id ON benchmark_results(run_id)",
            "CREATE INDEX IF NOT EXISTS idx_results_type ON benchmark_results(result_type)",
            "CREATE INDEX IF NOT EXISTS idx_runs_status ON benchmark_runs(status)",
        ] {
            sqlx::query(index).execute(&self.pool).await.map_err(db_err)?;
        }

        Ok(())
    }

    /// Insert a new run in `running` state
    pub async fn create_run(
        &self,
        run_id: &str,
        dataset_name: &str,
        dataset_source: &str,
        dataset_split: &str,
        config_snapshot: &serde_json::Value,
        total_samples: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO benchmark_runs
            (id, dataset_name, dataset_source, dataset_split, config_snapshot,
             start_time, status, total_samples, processed_samples)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(run_id)
        .bind(dataset_name)
        .bind(dataset_source)
        .bind(dataset_split)
        .bind(config_snapshot.to_string())
        .bind(now_iso())
        .bind(RunStatus::Running.as_str())
        .bind(total_samples)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Update a run's status; terminal statuses also stamp `end_time`
    pub async fn update_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        if status.is_terminal() {
            sqlx::query(
                "UPDATE benchmark_runs SET status = ?, end_time = ?, error_message = ? WHERE id = ?",
            )
            .bind(status.as_str())
            .bind(now_iso())
            .bind(error_message)
            .bind(run_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        } else {
            sqlx::query("UPDATE benchmark_runs SET status = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(run_id)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }

    /// Bump the processed-samples counter by a batch count
    pub async fn add_processed_samples(&self, run_id: &str, count: i64) -> Result<()> {
        sqlx::query(
            "UPDATE benchmark_runs SET processed_samples = processed_samples + ? WHERE id = ?",
        )
        .bind(count)
        .bind(run_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Persist a batch of results in one transaction
    pub async fn save_results_batch(&self, results: &[NewResult]) -> Result<()> {
        if results.is_empty() {
            return Ok(());
        }

        let created_at = now_iso();
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        for result in results {
            sqlx::query(
                r#"
                INSERT INTO benchmark_results
                (run_id, sample_index, input_text, expected_label, predicted_label,
                 is_correct, result_type, analysis_details, latency_ms, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&result.run_id)
            .bind(result.sample_index)
            .bind(&result.input_text)
            .bind(&result.expected_label)
            .bind(&result.predicted_label)
            .bind(result.is_correct)
            .bind(&result.result_type)
            .bind(result.analysis_details.to_string())
            .bind(result.latency_ms)
            .bind(&created_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    /// Persist (or replace) the aggregated metrics of a run
    pub async fn save_metrics(&self, run_id: &str, metrics: &BenchmarkMetrics) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO benchmark_metrics
            (run_id, true_positives, false_positives, true_negatives, false_negatives,
             precision, recall, f1_score, accuracy,
             avg_latency_ms, p50_latency_ms, p95_latency_ms, p99_latency_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run_id)
        .bind(metrics.true_positives as i64)
        .bind(metrics.false_positives as i64)
        .bind(metrics.true_negatives as i64)
        .bind(metrics.false_negatives as i64)
        .bind(metrics.precision)
        .bind(metrics.recall)
        .bind(metrics.f1_score)
        .bind(metrics.accuracy)
        .bind(metrics.avg_latency_ms)
        .bind(metrics.p50_latency_ms)
        .bind(metrics.p95_latency_ms)
        .bind(metrics.p99_latency_ms)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Option<BenchmarkRunRow>> {
        sqlx::query_as::<_, BenchmarkRunRow>("SELECT * FROM benchmark_runs WHERE id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    pub async fn get_all_runs(&self, limit: i64, offset: i64) -> Result<Vec<BenchmarkRunRow>> {
        sqlx::query_as::<_, BenchmarkRunRow>(
            "SELECT * FROM benchmark_runs ORDER BY start_time DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    pub async fn get_results(
        &self,
        run_id: &str,
        result_type: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BenchmarkResultRow>> {
        match result_type {
            Some(result_type) => sqlx::query_as::<_, BenchmarkResultRow>(
                r#"
                SELECT * FROM benchmark_results
                WHERE run_id = ? AND result_type = ?
                ORDER BY sample_index LIMIT ? OFFSET ?
                "#,
            )
            .bind(run_id)
            .bind(result_type)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err),
            None => sqlx::query_as::<_, BenchmarkResultRow>(
                r#"
                SELECT * FROM benchmark_results
                WHERE run_id = ?
                ORDER BY sample_index LIMIT ? OFFSET ?
                "#,
            )
            .bind(run_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err),
        }
    }

    pub async fn get_metrics(&self, run_id: &str) -> Result<Option<BenchmarkMetricsRow>> {
        sqlx::query_as::<_, BenchmarkMetricsRow>(
            "SELECT * FROM benchmark_metrics WHERE run_id = ?",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)
    }

    /// False positives and false negatives of a run, ordered by sample
    pub async fn get_error_analysis(&self, run_id: &str) -> Result<ErrorAnalysis> {
        let false_positives = sqlx::query_as::<_, BenchmarkResultRow>(
            r#"
            SELECT * FROM benchmark_results
            WHERE run_id = ? AND result_type = 'FALSE_POSITIVE'
            ORDER BY sample_index
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let false_negatives = sqlx::query_as::<_, BenchmarkResultRow>(
            r#"
            SELECT * FROM benchmark_results
            WHERE run_id = ? AND result_type = 'FALSE_NEGATIVE'
            ORDER BY sample_index
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(ErrorAnalysis {
            false_positives,
            false_negatives,
        })
    }

    /// All results of a run keyed by sample index, for comparison joins
    pub async fn get_results_by_sample_index(
        &self,
        run_id: &str,
    ) -> Result<HashMap<i64, BenchmarkResultRow>> {
        let rows = sqlx::query_as::<_, BenchmarkResultRow>(
            "SELECT * FROM benchmark_results WHERE run_id = ?",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(|row| (row.sample_index, row)).collect())
    }

    pub async fn save_dataset_metadata(
        &self,
        dataset_id: &str,
        name: &str,
        description: Option<&str>,
        file_key: &str,
        file_type: &str,
        total_samples: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dataset_metadata
            (id, name, description, file_key, file_type, total_samples, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(dataset_id)
        .bind(name)
        .bind(description)
        .bind(file_key)
        .bind(file_type)
        .bind(total_samples)
        .bind(now_iso())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn get_dataset_metadata(
        &self,
        dataset_id: &str,
    ) -> Result<Option<DatasetMetadataRow>> {
        sqlx::query_as::<_, DatasetMetadataRow>("SELECT * FROM dataset_metadata WHERE id = ?")
            .bind(dataset_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    pub async fn list_datasets(&self, limit: i64, offset: i64) -> Result<Vec<DatasetMetadataRow>> {
        sqlx::query_as::<_, DatasetMetadataRow>(
            "SELECT * FROM dataset_metadata ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    pub async fn delete_dataset_metadata(&self, dataset_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM dataset_metadata WHERE id = ?")
            .bind(dataset_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> BenchmarkStore {
        let store = BenchmarkStore::in_memory().await.unwrap();
        store.initialize().await.unwrap();
        store
    }

    fn result(run_id: &str, index: i64, result_type: &str) -> NewResult {
        NewResult {
            run_id: run_id.to_string(),
            sample_index: index,
            input_text: format!("sample {}", index),
            expected_label: "benign".to_string(),
            predicted_label: "allowed".to_string(),
            is_correct: result_type == "TRUE_NEGATIVE" || result_type == "TRUE_POSITIVE",
            result_type: result_type.to_string(),
            analysis_details: serde_json::json!({"blocked": false}),
            latency_ms: 2.5,
        }
    }

    #[tokio::test]
    async fn test_run_lifecycle() {
        let store = store().await;
        store
            .create_run("r1", "ds", "local", "test", &serde_json::json!({}), 10)
            .await
            .unwrap();

        let run = store.get_run("r1").await.unwrap().unwrap();
        assert_eq!(run.status, "running");
        assert_eq!(run.total_samples, 10);
        assert_eq!(run.processed_samples, 0);
        assert!(run.end_time.is_none());

        store.add_processed_samples("r1", 4).await.unwrap();
        store
            .update_run_status("r1", RunStatus::Completed, None)
            .await
            .unwrap();

        let run = store.get_run("r1").await.unwrap().unwrap();
        assert_eq!(run.status, "completed");
        assert_eq!(run.processed_samples, 4);
        assert!(run.end_time.is_some());
    }

    #[tokio::test]
    async fn test_failed_run_records_message() {
        let store = store().await;
        store
            .create_run("r1", "ds", "local", "test", &serde_json::json!({}), 1)
            .await
            .unwrap();
        store
            .update_run_status("r1", RunStatus::Failed, Some("dataset vanished"))
            .await
            .unwrap();

        let run = store.get_run("r1").await.unwrap().unwrap();
        assert_eq!(run.status, "failed");
        assert_eq!(run.error_message.as_deref(), Some("dataset vanished"));
    }

    #[tokio::test]
    async fn test_batch_save_and_filters() {
        let store = store().await;
        store
            .create_run("r1", "ds", "local", "test", &serde_json::json!({}), 3)
            .await
            .unwrap();

        store
            .save_results_batch(&[
                result("r1", 0, "TRUE_NEGATIVE"),
                result("r1", 1, "FALSE_POSITIVE"),
                result("r1", 2, "FALSE_NEGATIVE"),
            ])
            .await
            .unwrap();

        let all = store.get_results("r1", None, 100, 0).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].sample_index, 0);
        assert!(all[0].is_correct);

        let fps = store
            .get_results("r1", Some("FALSE_POSITIVE"), 100, 0)
            .await
            .unwrap();
        assert_eq!(fps.len(), 1);
        assert_eq!(fps[0].sample_index, 1);

        let analysis = store.get_error_analysis("r1").await.unwrap();
        assert_eq!(analysis.false_positives.len(), 1);
        assert_eq!(analysis.false_negatives.len(), 1);
    }

    #[tokio::test]
    async fn test_results_by_sample_index() {
        let store = store().await;
        store
            .create_run("r1", "ds", "local", "test", &serde_json::json!({}), 2)
            .await
            .unwrap();
        store
            .save_results_batch(&[
                result("r1", 5, "TRUE_NEGATIVE"),
                result("r1", 9, "TRUE_POSITIVE"),
            ])
            .await
            .unwrap();

        let by_index = store.get_results_by_sample_index("r1").await.unwrap();
        assert_eq!(by_index.len(), 2);
        assert_eq!(by_index[&9].result_type, "TRUE_POSITIVE");
    }

    #[tokio::test]
    async fn test_metrics_roundtrip() {
        let store = store().await;
        store
            .create_run("r1", "ds", "local", "test", &serde_json::json!({}), 2)
            .await
            .unwrap();

        let metrics = BenchmarkMetrics {
            true_positives: 10,
            false_negatives: 2,
            precision: 1.0,
            recall: 10.0 / 12.0,
            f1_score: 0.9091,
            accuracy: 10.0 / 12.0,
            avg_latency_ms: Some(3.5),
            ..Default::default()
        };
        store.save_metrics("r1", &metrics).await.unwrap();

        let row = store.get_metrics("r1").await.unwrap().unwrap();
        assert_eq!(row.true_positives, 10);
        assert_eq!(row.false_negatives, 2);
        assert_eq!(row.avg_latency_ms, Some(3.5));
        assert!(store.get_metrics("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dataset_metadata() {
        let store = store().await;
        store
            .save_dataset_metadata("d1", "my set", Some("desc"), "datasets/d1.csv", "text/csv", 7)
            .await
            .unwrap();

        let meta = store.get_dataset_metadata("d1").await.unwrap().unwrap();
        assert_eq!(meta.name, "my set");
        assert_eq!(meta.total_samples, 7);

        let all = store.list_datasets(10, 0).await.unwrap();
        assert_eq!(all.len(), 1);

        store.delete_dataset_metadata("d1").await.unwrap();
        assert!(store.get_dataset_metadata("d1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_detector_config_extraction() {
        let store = store().await;
        let snapshot = serde_json::json!({
            "dataset_name": "ds",
            "detector_config": {"pii": "mock"},
        });
        store
            .create_run("r1", "ds", "local", "test", &snapshot, 1)
            .await
            .unwrap();

        let run = store.get_run("r1").await.unwrap().unwrap();
        assert_eq!(
            run.detector_config().unwrap()["pii"],
            serde_json::json!("mock")
        );
    }
}
