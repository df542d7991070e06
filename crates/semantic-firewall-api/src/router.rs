//! Route configuration

use crate::handlers;
use crate::state::AppState;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/chat", post(handlers::chat))
        // Rolling metrics surface
        .route("/api/stats", get(handlers::stats))
        .route("/api/recent-requests", get(handlers::recent_requests))
        .route("/api/session-analytics", get(handlers::session_analytics))
        .route("/api/temporal-breakdown", get(handlers::temporal_breakdown))
        // Detector model surface
        .route("/api/models/available", get(handlers::available_models))
        .route("/api/models/cache", get(handlers::model_cache))
        .route("/api/models/cache/clear", post(handlers::clear_model_cache))
        // Benchmark surface
        .route("/api/benchmarks/start", post(handlers::start_benchmark))
        .route("/api/benchmarks/status/:run_id", get(handlers::benchmark_status))
        .route("/api/benchmarks/cancel/:run_id", post(handlers::cancel_benchmark))
        .route("/api/benchmarks/runs", get(handlers::benchmark_runs))
        .route("/api/benchmarks/results/:run_id", get(handlers::benchmark_results))
        .route("/api/benchmarks/metrics/:run_id", get(handlers::benchmark_metrics))
        .route("/api/benchmarks/errors/:run_id", get(handlers::benchmark_errors))
        .route("/api/benchmarks/compare", get(handlers::compare_benchmarks))
        .route("/api/benchmarks/datasets/upload", post(handlers::upload_dataset))
        .route("/api/benchmarks/datasets", get(handlers::list_datasets))
        .route("/api/benchmarks/datasets/:dataset_id", delete(handlers::delete_dataset))
        // Dashboard fan-out
        .route("/ws/dashboard", get(handlers::ws_dashboard))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
