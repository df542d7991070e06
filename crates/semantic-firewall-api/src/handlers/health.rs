//! Health check

use axum::Json;

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "semantic-firewall",
    }))
}
