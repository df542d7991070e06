//! Benchmark endpoints

use crate::error::ApiError;
use crate::models::{
    CompareQuery, PageQuery, ResultsQuery, StartBenchmarkRequest, StartBenchmarkResponse,
};
use crate::state::AppState;
use axum::extract::{Multipart, Path, Query, State};
use axum::Json;

/// POST /api/benchmarks/start
pub async fn start_benchmark(
    State(state): State<AppState>,
    Json(request): Json<StartBenchmarkRequest>,
) -> Result<Json<StartBenchmarkResponse>, ApiError> {
    let service = state.benchmarks()?;
    let run_id = service.start(&state.gateway, request).await?;
    Ok(Json(StartBenchmarkResponse { run_id }))
}

/// GET /api/benchmarks/status/{run_id}
pub async fn benchmark_status(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<crate::models::BenchmarkStatusResponse>, ApiError> {
    let service = state.benchmarks()?;
    Ok(Json(service.status(&run_id).await?))
}

/// POST /api/benchmarks/cancel/{run_id}
pub async fn cancel_benchmark(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let service = state.benchmarks()?;
    let cancelled = service.cancel(&run_id);
    Ok(Json(serde_json::json!({
        "run_id": run_id,
        "cancelled": cancelled,
    })))
}

/// GET /api/benchmarks/runs?limit=50&offset=0
pub async fn benchmark_runs(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<semantic_firewall_benchmarks::store::BenchmarkRunRow>>, ApiError> {
    let service = state.benchmarks()?;
    Ok(Json(service.runs(page.limit, page.offset).await?))
}

/// GET /api/benchmarks/results/{run_id}?result_type=&limit=&offset=
pub async fn benchmark_results(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(query): Query<ResultsQuery>,
) -> Result<Json<Vec<semantic_firewall_benchmarks::store::BenchmarkResultRow>>, ApiError> {
    let service = state.benchmarks()?;
    Ok(Json(
        service
            .results(
                &run_id,
                query.result_type.as_deref(),
                query.limit,
                query.offset,
            )
            .await?,
    ))
}

/// GET /api/benchmarks/metrics/{run_id}
pub async fn benchmark_metrics(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let service = state.benchmarks()?;
    Ok(Json(service.metrics_for(&run_id).await?))
}

/// GET /api/benchmarks/errors/{run_id}
pub async fn benchmark_errors(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<semantic_firewall_benchmarks::store::ErrorAnalysis>, ApiError> {
    let service = state.benchmarks()?;
    Ok(Json(service.errors(&run_id).await?))
}

/// GET /api/benchmarks/compare?baseline_run_id=..&candidate_run_ids=a,b
pub async fn compare_benchmarks(
    State(state): State<AppState>,
    Query(query): Query<CompareQuery>,
) -> Result<Json<semantic_firewall_benchmarks::compare::ComparisonReport>, ApiError> {
    let service = state.benchmarks()?;
    Ok(Json(
        service
            .compare(&query.baseline_run_id, &query.candidates())
            .await?,
    ))
}

/// POST /api/benchmarks/datasets/upload (multipart: name, description?, file)
pub async fn upload_dataset(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<crate::models::DatasetUploadResponse>, ApiError> {
    let service = state.benchmarks()?;

    let mut name: Option<String> = None;
    let mut description: Option<String> = None;
    let mut file: Option<(Vec<u8>, String)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Invalid multipart body: {}", e)))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "name" => {
                name = Some(field.text().await.map_err(|e| {
                    ApiError::Validation(format!("Invalid name field: {}", e))
                })?);
            }
            "description" => {
                description = Some(field.text().await.map_err(|e| {
                    ApiError::Validation(format!("Invalid description field: {}", e))
                })?);
            }
            "file" => {
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .or_else(|| {
                        field.file_name().map(|file_name| {
                            if file_name.ends_with(".json") {
                                "application/json".to_string()
                            } else {
                                "text/csv".to_string()
                            }
                        })
                    })
                    .unwrap_or_else(|| "text/csv".to_string());
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::Validation(format!("Invalid file field: {}", e))
                })?;
                file = Some((bytes.to_vec(), content_type));
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown multipart field");
            }
        }
    }

    let name = name.ok_or_else(|| ApiError::Validation("Missing 'name' field".to_string()))?;
    let (bytes, file_type) =
        file.ok_or_else(|| ApiError::Validation("Missing 'file' field".to_string()))?;

    Ok(Json(
        service
            .register_dataset(&name, description.as_deref(), &bytes, &file_type)
            .await?,
    ))
}

/// GET /api/benchmarks/datasets
pub async fn list_datasets(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let service = state.benchmarks()?;
    let datasets = service.list_datasets(page.limit, page.offset).await?;
    Ok(Json(serde_json::json!({ "datasets": datasets })))
}

/// DELETE /api/benchmarks/datasets/{dataset_id}
pub async fn delete_dataset(
    State(state): State<AppState>,
    Path(dataset_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let service = state.benchmarks()?;
    service.delete_dataset(&dataset_id).await?;
    Ok(Json(serde_json::json!({ "deleted": dataset_id })))
}
