//! Common test utilities for E2E tests
//!
//! Every [`TestServer`] owns a private mock profile source, so request
//! counters never leak between tests.

#![allow(dead_code)]

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use profilesync::{AppState, config};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Trigger secret configured on every test server
pub const CRON_SECRET: &str = "cron-secret";

/// Smallest byte sequence served as a PNG by the mock source
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// One byte more than the proxy accepts
pub const OVERSIZED_IMAGE_BYTES: usize = 5 * 1024 * 1024 + 1;

// =============================================================================
// Mock profile source
// =============================================================================

/// Fake external source
///
/// Known handles:
/// - `alice`: full JSON profile from the web endpoint
/// - `bob`: web endpoint rate limited, HTML profile page works
/// - `walled`: every request bounces to a login page
/// - anything else: rate limited / not found
#[derive(Clone)]
pub struct MockSource {
    pub base_url: String,
    hits: Arc<AtomicUsize>,
}

impl MockSource {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let source = Self {
            base_url,
            hits: Arc::new(AtomicUsize::new(0)),
        };

        let app = Router::new()
            .route("/api/v1/users/web_profile_info/", get(web_profile))
            .route("/profiles/:handle/", get(profile_page))
            .route("/accounts/login/", get(login_page))
            .route("/img/:name", get(image))
            .route("/avatar/", get(avatar))
            .with_state(source.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        source
    }

    /// Profile document requests received so far
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn web_profile(
    State(source): State<MockSource>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    source.hits.fetch_add(1, Ordering::SeqCst);

    match query.get("username").map(String::as_str) {
        Some("alice") => Json(serde_json::json!({
            "data": {
                "user": {
                    "username": "alice",
                    "full_name": "Alice Example",
                    "biography": "hello\nworld",
                    "profile_pic_url_hd": source.url("/img/alice.png"),
                    "edge_followed_by": {"count": 1234},
                    "edge_follow": {"count": 56},
                    "edge_owner_to_timeline_media": {"count": 7},
                    "is_private": false,
                    "is_verified": true
                }
            },
            "status": "ok"
        }))
        .into_response(),
        Some("walled") => Redirect::temporary("/accounts/login/?next=walled").into_response(),
        _ => StatusCode::TOO_MANY_REQUESTS.into_response(),
    }
}

async fn profile_page(State(source): State<MockSource>, Path(handle): Path<String>) -> Response {
    source.hits.fetch_add(1, Ordering::SeqCst);

    match handle.as_str() {
        "bob" => {
            let html = format!(
                r#"<!DOCTYPE html><html><head>
                <meta property="og:title" content="Bob Builder (@bob) &#8226; Photos">
                <meta name="description" content="2.5K Followers, 80 Following, 12 Posts - See photos from Bob Builder (@bob)">
                <meta property="og:image" content="{}">
                </head><body></body></html>"#,
                source.url("/img/broken.png")
            );
            ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], html).into_response()
        }
        "walled" => Redirect::temporary("/accounts/login/?next=walled").into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn login_page() -> Response {
    (
        [(header::CONTENT_TYPE, "text/html")],
        "<html><body><form>Log in to continue</form></body></html>",
    )
        .into_response()
}

async fn image(Path(name): Path<String>) -> Response {
    match name.as_str() {
        "alice.png" => ([(header::CONTENT_TYPE, "image/png")], PNG_BYTES).into_response(),
        "text.png" => ([(header::CONTENT_TYPE, "text/plain")], "not an image").into_response(),
        "empty.png" => ([(header::CONTENT_TYPE, "image/png")], "").into_response(),
        "huge.png" => (
            [(header::CONTENT_TYPE, "image/png")],
            vec![0u8; OVERSIZED_IMAGE_BYTES],
        )
            .into_response(),
        _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn avatar() -> Response {
    StatusCode::SERVICE_UNAVAILABLE.into_response()
}

// =============================================================================
// Test server
// =============================================================================

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub source: MockSource,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server after adjusting the default test configuration
    pub async fn with_config(adjust: impl FnOnce(&mut config::AppConfig)) -> Self {
        let source = MockSource::start().await;

        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let mut config = test_config(&source, db_path);
        adjust(&mut config);
        config.validate().unwrap();

        // Initialize app state
        let state = AppState::new(config).await.unwrap();

        // Redirects are asserted on, never followed
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = profilesync::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            state,
            source,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// GET a JSON endpoint and return status plus body
    pub async fn get_json(&self, path: &str) -> (u16, serde_json::Value) {
        let response = self.client.get(self.url(path)).send().await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    /// POST a JSON endpoint and return status plus body
    pub async fn post_json(&self, path: &str, body: serde_json::Value) -> (u16, serde_json::Value) {
        let response = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }
}

fn test_config(source: &MockSource, db_path: std::path::PathBuf) -> config::AppConfig {
    config::AppConfig {
        server: config::ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Let OS assign port
        },
        database: config::DatabaseConfig { path: db_path },
        source: config::SourceConfig {
            base_url: source.base_url.clone(),
            fetch_timeout_seconds: 2,
            strategy_delay: config::DelayRange::NONE,
            strategies: vec![
                config::StrategyConfig {
                    name: "web-profile".to_string(),
                    url_template: "{base_url}/api/v1/users/web_profile_info/?username={handle}"
                        .to_string(),
                    user_agent: "Mozilla/5.0 (test)".to_string(),
                    headers: BTreeMap::from([(
                        "Accept".to_string(),
                        "application/json".to_string(),
                    )]),
                },
                config::StrategyConfig {
                    name: "profile-page".to_string(),
                    url_template: "{base_url}/profiles/{handle}/".to_string(),
                    user_agent: "Mozilla/5.0 (test; html)".to_string(),
                    headers: BTreeMap::new(),
                },
            ],
        },
        sync: config::SyncConfig {
            ttl_seconds: 86_400,
            biography_max_chars: 500,
        },
        scheduler: config::SchedulerConfig {
            enabled: false,
            interval_seconds: 900,
            batch_size: 2,
            jitter: config::DelayRange::NONE,
            trigger_secret: Some(CRON_SECRET.to_string()),
        },
        images: config::ImageConfig {
            proxy_path: "/api/image-proxy".to_string(),
            placeholder_base_url: source.url("/avatar"),
            fetch_timeout_seconds: 2,
            success_cache_seconds: 86_400,
            fallback_cache_seconds: 300,
        },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}
