//! API layer
//!
//! HTTP handlers for:
//! - Profiles (read, refresh, freshness, tracking)
//! - Group statistics
//! - The external refresh trigger
//! - The image proxy
//! - Health and metrics

mod cron;
mod groups;
mod images;
mod profiles;
mod system;

pub use cron::cron_router;
pub use groups::{GroupStatsRequest, groups_router};
pub use images::{ImageProxyQuery, image_proxy_router};
pub use profiles::{FreshnessResponse, RefreshResponse, profiles_router};
pub use system::system_router;

use axum::Router;

use crate::AppState;

/// All stateful routes
///
/// Routes carry their full paths so that the image proxy can live at
/// any configured path, including one under `/api`.
pub fn api_router(image_proxy_path: &str) -> Router<AppState> {
    Router::new()
        .merge(profiles_router())
        .merge(groups_router())
        .merge(cron_router())
        .merge(image_proxy_router(image_proxy_path))
}
