//! ProfileSync - Profile resolution and synchronization engine
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Profile, group stats and refresh trigger endpoints       │
//! │  - Image proxy                                              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Freshness-gated synchronizer (sole writer)               │
//! │  - Batch refresh scheduler with backoff                     │
//! └─────────────────────────────────────────────────────────────┘
//!            │                                   │
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │  Source                  │   │  Data Layer                  │
//! │  - Strategy runner       │   │  - SQLite (sqlx)             │
//! │  - Extractor             │   │                              │
//! └──────────────────────────┘   └──────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `service`: Synchronizer, scheduler and group statistics
//! - `source`: Retrieval strategies and document extraction
//! - `image`: Image reference sanitation and placeholders
//! - `data`: Database layer
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod image;
pub mod metrics;
pub mod service;
pub mod source;

use std::sync::Arc;
use std::time::Duration;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// Freshness-gated synchronizer
    pub synchronizer: Arc<service::ProfileSynchronizer>,

    /// Batch refresh scheduler
    pub scheduler: Arc<service::RefreshScheduler>,

    /// HTTP client used by the image proxy
    pub image_client: Arc<reqwest::Client>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database
    /// 2. Build HTTP clients
    /// 3. Wire strategy runner, sanitizer, synchronizer and scheduler
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        Self::with_clock(config, Arc::new(service::SystemClock)).await
    }

    /// Initialize application state with an explicit time source
    pub async fn with_clock(
        config: config::AppConfig,
        clock: Arc<dyn service::Clock>,
    ) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Connect to SQLite database
        let db = Arc::new(data::Database::connect(&config.database.path).await?);
        tracing::info!("Database connected");

        // 2. Initialize HTTP clients
        let source_client = reqwest::Client::builder()
            .timeout(config.source.fetch_timeout())
            .build()?;
        let image_client = reqwest::Client::builder()
            .user_agent(concat!("ProfileSync/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.images.fetch_timeout_seconds))
            .build()?;

        // 3. Wire the engine
        let runner = Arc::new(source::StrategyRunner::from_config(
            &config.source,
            Arc::new(source_client),
        ));
        tracing::info!(
            strategies = ?runner.strategy_names(),
            "Strategy runner initialized"
        );

        let sanitizer = image::ImageSanitizer::new(
            &config.images.proxy_path,
            Arc::new(image::GeneratedAvatar::new(
                &config.images.placeholder_base_url,
            )),
        );
        let synchronizer = Arc::new(service::ProfileSynchronizer::new(
            db.clone(),
            runner,
            sanitizer,
            clock,
            &config.sync,
        ));
        let scheduler = Arc::new(service::RefreshScheduler::new(
            synchronizer.clone(),
            &config.scheduler,
        ));

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            db,
            synchronizer,
            scheduler,
            image_client: Arc::new(image_client),
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

    Router::new()
        .merge(api::api_router(&state.config.images.proxy_path))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(api::system_router())
}
