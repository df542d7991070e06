//! Detector model endpoints

use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use semantic_firewall_detectors::DetectorRegistry;

/// GET /api/models/available
pub async fn available_models() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "available": DetectorRegistry::available_models(),
        "defaults": DetectorRegistry::default_models(),
    }))
}

/// GET /api/models/cache
pub async fn model_cache(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "cached_detectors": state.registry.cached_keys(),
        "cache_size": state.registry.cache_size(),
    }))
}

/// POST /api/models/cache/clear
pub async fn clear_model_cache(State(state): State<AppState>) -> Json<serde_json::Value> {
    let removed = state.registry.clear_cache();
    Json(serde_json::json!({ "removed": removed }))
}
