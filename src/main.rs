//! ProfileSync binary entry point

use profilesync::{AppState, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Load configuration from file and environment
/// 2. Initialize tracing/logging from the `logging` section
/// 3. Initialize metrics
/// 4. Initialize AppState
/// 5. Start the in-process refresh loop (if enabled)
/// 6. Start HTTP server
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration
    let config = config::AppConfig::load()?;

    // 2. Initialize tracing/logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.default_filter().into());

    if config.logging.is_json() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!("Starting ProfileSync...");
    tracing::info!(
        source = %config.source.base_url,
        strategies = config.source.strategies.len(),
        ttl_seconds = config.sync.ttl_seconds,
        "Configuration loaded"
    );

    // 3. Initialize metrics
    profilesync::metrics::init_metrics();

    // 4. Initialize application state
    let state = AppState::new(config.clone()).await?;

    // 5. Start background tasks
    if config.scheduler.enabled {
        spawn_refresh_task(state.clone());
    }

    // 6. Start HTTP server
    let app = profilesync::build_router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Spawn the in-process batch refresh loop
fn spawn_refresh_task(state: AppState) {
    tokio::spawn(async move {
        let interval_secs = state.config.scheduler.interval_seconds.max(1);
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            tracing::info!("Running scheduled profile refresh...");
            let summary = state.scheduler.run_cycle().await;
            match summary.error {
                Some(error) => tracing::error!(%error, "Scheduled refresh failed"),
                None => tracing::info!(
                    updated = summary.updated,
                    skipped = summary.skipped,
                    "Scheduled refresh completed"
                ),
            }
        }
    });

    tracing::info!("Refresh task spawned");
}
