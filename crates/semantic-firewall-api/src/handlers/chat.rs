//! Chat proxy handler

use crate::error::ApiError;
use crate::gateway::extract_context;
use crate::models::{ChatRequest, ChatResponse};
use crate::state::AppState;
use axum::{extract::State, http::HeaderMap, Json};

/// POST /api/chat
///
/// Returns 200 for both allowed and blocked requests; 502 when the
/// backend is unreachable; 500 on internal pipeline failure.
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let context = extract_context(&headers, &state.config.tenant_id);

    let response = state
        .gateway
        .process_chat_request(&request.message, request.detector_config, context)
        .await?;

    Ok(Json(response))
}
