//! Rolling-metrics endpoints

use crate::models::{RecentQuery, SessionsQuery, TemporalQuery};
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;

/// GET /api/stats
pub async fn stats(State(state): State<AppState>) -> Json<crate::metrics::StatsSnapshot> {
    Json(state.metrics.stats())
}

/// GET /api/recent-requests?limit=50
pub async fn recent_requests(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Json<Vec<semantic_firewall_core::FirewallEvent>> {
    Json(state.metrics.recent(query.limit))
}

/// GET /api/session-analytics?top=5
pub async fn session_analytics(
    State(state): State<AppState>,
    Query(query): Query<SessionsQuery>,
) -> Json<Vec<crate::metrics::SessionStats>> {
    Json(state.metrics.session_analytics(query.top))
}

/// GET /api/temporal-breakdown?minutes=10
pub async fn temporal_breakdown(
    State(state): State<AppState>,
    Query(query): Query<TemporalQuery>,
) -> Json<crate::metrics::TemporalBreakdown> {
    Json(state.metrics.temporal_breakdown(query.minutes))
}
