//! External refresh trigger
//!
//! Lets an outside timer run one batch refresh cycle.

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, header::AUTHORIZATION},
    response::Json,
    routing::post,
};

use crate::AppState;
use crate::error::AppError;
use crate::service::RefreshSummary;

pub fn cron_router() -> Router<AppState> {
    Router::new().route(
        "/api/cron/refresh-profiles",
        post(refresh_profiles).get(refresh_profiles),
    )
}

/// POST /api/cron/refresh-profiles
///
/// Requires `Authorization: Bearer <scheduler.trigger_secret>` when a
/// secret is configured.
async fn refresh_profiles(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RefreshSummary>, AppError> {
    if let Some(secret) = state.config.scheduler.trigger_secret.as_deref() {
        authorize(&headers, secret)?;
    }

    Ok(Json(state.scheduler.run_cycle().await))
}

fn authorize(headers: &HeaderMap, secret: &str) -> Result<(), AppError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    if token.trim() == secret {
        Ok(())
    } else {
        tracing::warn!("Rejected refresh trigger with invalid secret");
        Err(AppError::Unauthorized)
    }
}
