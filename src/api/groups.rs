//! Group statistics endpoint

use axum::{Router, extract::State, response::Json, routing::post};
use serde::Deserialize;

use crate::AppState;
use crate::error::AppError;
use crate::service::{GroupStats, group_stats};

pub fn groups_router() -> Router<AppState> {
    Router::new().route("/api/groups/stats", post(stats))
}

/// Group stats request
#[derive(Debug, Deserialize)]
pub struct GroupStatsRequest {
    pub handles: Vec<String>,
}

/// POST /api/groups/stats
///
/// Aggregates stored data only; never triggers a fetch.
async fn stats(
    State(state): State<AppState>,
    Json(req): Json<GroupStatsRequest>,
) -> Result<Json<GroupStats>, AppError> {
    let stats = group_stats(&state.db, state.synchronizer.sanitizer(), &req.handles).await?;
    Ok(Json(stats))
}
