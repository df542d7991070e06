//! Benchmark service facade
//!
//! Ties the dataset loader, object storage, SQLite store and runner
//! together behind the operations the HTTP surface exposes. When
//! initialization fails at startup the gateway keeps serving traffic and
//! the benchmark endpoints answer 503.

use crate::config::BenchmarkConfig;
use crate::gateway::Gateway;
use crate::models::{BenchmarkStatusResponse, DatasetUploadResponse, StartBenchmarkRequest};
use semantic_firewall_benchmarks::compare::{compare_benchmarks, ComparisonReport};
use semantic_firewall_benchmarks::dataset::{count_samples, load_bytes, DatasetLoader};
use semantic_firewall_benchmarks::runner::{BenchmarkRunner, RunSpec, RunnerConfig, SampleAnalyzer};
use semantic_firewall_benchmarks::storage::{dataset_key, DatasetStorage, LocalDatasetStorage};
use semantic_firewall_benchmarks::store::{
    BenchmarkMetricsRow, BenchmarkResultRow, BenchmarkRunRow, BenchmarkStore, ErrorAnalysis,
};
use semantic_firewall_core::{Error, Result};
use std::sync::Arc;
use uuid::Uuid;

/// Benchmark subsystem
pub struct BenchmarkService {
    store: BenchmarkStore,
    runner: Arc<BenchmarkRunner>,
    loader: DatasetLoader,
    storage: Arc<dyn DatasetStorage>,
}

impl BenchmarkService {
    /// Open the store, run migrations and build the runner
    pub async fn initialize(config: &BenchmarkConfig) -> Result<Self> {
        let store = BenchmarkStore::connect(&config.db_path).await?;
        store.initialize().await?;

        let runner = Arc::new(BenchmarkRunner::new(
            store.clone(),
            RunnerConfig {
                max_concurrent_samples: config.max_concurrent_samples,
                batch_size: config.batch_size,
            },
        ));

        tracing::info!(db = %config.db_path.display(), "Benchmark service initialized");

        Ok(Self {
            store,
            runner,
            loader: DatasetLoader::new(config.data_dir.clone()),
            storage: Arc::new(LocalDatasetStorage::new(config.storage_dir.clone())),
        })
    }

    /// Load samples and start a background run
    pub async fn start(&self, gateway: &Gateway, request: StartBenchmarkRequest) -> Result<String> {
        let analyzer: Arc<dyn SampleAnalyzer> =
            gateway.analyzer_for(request.detector_config.as_ref())?;

        let (samples, dataset_name, dataset_source) =
            if let Some(dataset_id) = &request.custom_dataset_id {
                let meta = self
                    .store
                    .get_dataset_metadata(dataset_id)
                    .await?
                    .ok_or_else(|| Error::not_found(format!("Dataset not found: {}", dataset_id)))?;
                let bytes = self.storage.download(&meta.file_key)?;
                let samples = load_bytes(&bytes, &meta.file_type, None, request.max_samples)?;
                (samples, meta.name, "custom".to_string())
            } else if let Some(dataset_name) = &request.dataset_name {
                let samples = self.loader.load_named(
                    dataset_name,
                    &request.dataset_split,
                    request.max_samples,
                )?;
                (samples, dataset_name.clone(), "local".to_string())
            } else {
                return Err(Error::invalid_input(
                    "Either dataset_name or custom_dataset_id must be provided",
                ));
            };

        Arc::clone(&self.runner)
            .start(
                analyzer,
                samples,
                RunSpec {
                    dataset_name,
                    dataset_source,
                    dataset_split: request.dataset_split,
                    tenant_id: request.tenant_id,
                    max_samples: request.max_samples,
                    detector_config: request.detector_config.map(|s| s.as_map()),
                },
            )
            .await
    }

    /// In-memory progress, falling back to the persisted row for runs
    /// finished before a restart
    pub async fn status(&self, run_id: &str) -> Result<BenchmarkStatusResponse> {
        let run_row = self.store.get_run(run_id).await?;
        let detector_config = run_row.as_ref().and_then(|run| run.detector_config());

        if let Some(report) = self.runner.status(run_id) {
            return Ok(BenchmarkStatusResponse {
                run_id: report.run_id,
                status: report.status.as_str().to_string(),
                total_samples: report.total_samples as i64,
                processed_samples: report.processed_samples as i64,
                progress_percent: report.progress_percent,
                elapsed_time_seconds: Some(report.elapsed_time_seconds),
                estimated_remaining_seconds: report.estimated_remaining_seconds,
                detector_config,
            });
        }

        let run = run_row
            .ok_or_else(|| Error::not_found(format!("Benchmark run not found: {}", run_id)))?;
        let progress_percent = if run.total_samples > 0 {
            run.processed_samples as f64 / run.total_samples as f64 * 100.0
        } else {
            0.0
        };

        Ok(BenchmarkStatusResponse {
            run_id: run.id,
            status: run.status,
            total_samples: run.total_samples,
            processed_samples: run.processed_samples,
            progress_percent,
            elapsed_time_seconds: None,
            estimated_remaining_seconds: None,
            detector_config,
        })
    }

    /// Request cancellation; idempotent
    pub fn cancel(&self, run_id: &str) -> bool {
        self.runner.cancel(run_id)
    }

    pub async fn runs(&self, limit: i64, offset: i64) -> Result<Vec<BenchmarkRunRow>> {
        self.store.get_all_runs(limit, offset).await
    }

    pub async fn results(
        &self,
        run_id: &str,
        result_type: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BenchmarkResultRow>> {
        self.ensure_run_exists(run_id).await?;
        self.store
            .get_results(run_id, result_type, limit, offset)
            .await
    }

    /// Aggregated metrics plus the run's detector config
    pub async fn metrics_for(&self, run_id: &str) -> Result<serde_json::Value> {
        let run = self
            .store
            .get_run(run_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Benchmark run not found: {}", run_id)))?;

        let metrics: BenchmarkMetricsRow = self.store.get_metrics(run_id).await?.ok_or_else(|| {
            Error::not_found(format!(
                "Metrics not found for run {} (may still be processing)",
                run_id
            ))
        })?;

        let mut value = serde_json::to_value(metrics)?;
        if let Some(config) = run.detector_config() {
            value["detector_config"] = config;
        }
        Ok(value)
    }

    pub async fn errors(&self, run_id: &str) -> Result<ErrorAnalysis> {
        self.ensure_run_exists(run_id).await?;
        self.store.get_error_analysis(run_id).await
    }

    pub async fn compare(
        &self,
        baseline_run_id: &str,
        candidate_run_ids: &[String],
    ) -> Result<ComparisonReport> {
        compare_benchmarks(&self.store, baseline_run_id, candidate_run_ids).await
    }

    /// Upload a dataset object and persist its metadata
    pub async fn register_dataset(
        &self,
        name: &str,
        description: Option<&str>,
        bytes: &[u8],
        file_type: &str,
    ) -> Result<DatasetUploadResponse> {
        if file_type != "text/csv" && file_type != "application/json" {
            return Err(Error::invalid_input(format!(
                "Unsupported dataset file type: {} (expected text/csv or application/json)",
                file_type
            )));
        }

        let total_samples = count_samples(bytes, file_type)? as i64;
        let dataset_id = Uuid::new_v4().to_string();
        let file_key = dataset_key(&dataset_id, file_type);

        self.storage.upload(&file_key, bytes)?;
        self.store
            .save_dataset_metadata(
                &dataset_id,
                name,
                description,
                &file_key,
                file_type,
                total_samples,
            )
            .await?;

        let meta = self
            .store
            .get_dataset_metadata(&dataset_id)
            .await?
            .ok_or_else(|| Error::internal("Dataset metadata vanished after insert"))?;

        Ok(DatasetUploadResponse {
            dataset_id: meta.id,
            name: meta.name,
            description: meta.description,
            file_type: meta.file_type,
            total_samples: meta.total_samples,
            created_at: meta.created_at,
        })
    }

    pub async fn list_datasets(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<semantic_firewall_benchmarks::store::DatasetMetadataRow>> {
        self.store.list_datasets(limit, offset).await
    }

    /// Delete a dataset object and its metadata; completed runs that used
    /// it are untouched
    pub async fn delete_dataset(&self, dataset_id: &str) -> Result<()> {
        let meta = self
            .store
            .get_dataset_metadata(dataset_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Dataset not found: {}", dataset_id)))?;

        if self.storage.exists(&meta.file_key) {
            self.storage.delete(&meta.file_key)?;
        }
        self.store.delete_dataset_metadata(dataset_id).await
    }

    async fn ensure_run_exists(&self, run_id: &str) -> Result<()> {
        self.store
            .get_run(run_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("Benchmark run not found: {}", run_id)))
    }
}
