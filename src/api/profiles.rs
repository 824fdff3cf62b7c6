//! Profile endpoints
//!
//! Thin wrappers around [`ProfileSynchronizer`](crate::service::ProfileSynchronizer).

use axum::{
    Router,
    extract::{Path, State},
    response::Json,
    routing::{get, post},
};
use serde::Serialize;

use crate::AppState;
use crate::data::ProfileRecord;
use crate::error::AppError;
use crate::metrics::{HTTP_REQUEST_DURATION_SECONDS, HTTP_REQUESTS_TOTAL};

/// Create profile router
///
/// Routes:
/// - GET /api/profiles/:handle - Stored profile, refreshed when stale
/// - POST /api/profiles/:handle/refresh - Refresh regardless of freshness
/// - GET /api/profiles/:handle/freshness - Whether a refresh is due
/// - POST /api/profiles/:handle/track - Queue a handle without fetching
pub fn profiles_router() -> Router<AppState> {
    Router::new()
        .route("/api/profiles/:handle", get(get_profile))
        .route("/api/profiles/:handle/refresh", post(refresh_profile))
        .route("/api/profiles/:handle/freshness", get(freshness))
        .route("/api/profiles/:handle/track", post(track_profile))
}

/// GET /api/profiles/:handle
async fn get_profile(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<Json<ProfileRecord>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", "/api/profiles/:handle"])
        .start_timer();

    let profile = state.synchronizer.get_or_refresh(&handle).await?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/api/profiles/:handle", "200"])
        .inc();
    Ok(Json(profile))
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    /// Whether fresh data was fetched and stored
    pub refreshed: bool,
    pub profile: ProfileRecord,
}

/// POST /api/profiles/:handle/refresh
///
/// A failed refresh is not an error: the stored record (or a
/// placeholder) is returned with `refreshed: false`.
async fn refresh_profile(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<Json<RefreshResponse>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/api/profiles/:handle/refresh"])
        .start_timer();

    let response = match state.synchronizer.force_refresh(&handle).await? {
        Some(profile) => RefreshResponse {
            refreshed: true,
            profile,
        },
        None => RefreshResponse {
            refreshed: false,
            profile: state.synchronizer.track(&handle).await?,
        },
    };

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["POST", "/api/profiles/:handle/refresh", "200"])
        .inc();
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FreshnessResponse {
    pub handle: String,
    pub needs_refresh: bool,
}

/// GET /api/profiles/:handle/freshness
async fn freshness(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<Json<FreshnessResponse>, AppError> {
    let handle = crate::data::normalize_handle(&handle)?;
    let needs_refresh = state.synchronizer.needs_refresh(&handle).await?;

    Ok(Json(FreshnessResponse {
        handle,
        needs_refresh,
    }))
}

/// POST /api/profiles/:handle/track
async fn track_profile(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<Json<ProfileRecord>, AppError> {
    Ok(Json(state.synchronizer.track(&handle).await?))
}
