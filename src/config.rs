//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub source: SourceConfig,
    pub sync: SyncConfig,
    pub scheduler: SchedulerConfig,
    pub images: ImageConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Inclusive range for randomized pauses, in milliseconds
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    /// No pause at all
    pub const NONE: DelayRange = DelayRange {
        min_ms: 0,
        max_ms: 0,
    };

    /// Pick a duration uniformly from the range
    pub fn sample(&self) -> Duration {
        use rand::Rng;

        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.min_ms..=self.max_ms))
    }

    /// Sleep for a sampled duration (no-op for an all-zero range)
    pub async fn pause(&self) {
        let delay = self.sample();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// External profile source configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Base URL substituted into `{base_url}` of each strategy template
    pub base_url: String,
    /// Hard ceiling for a single profile document fetch
    pub fetch_timeout_seconds: u64,
    /// Randomized pause inserted between two strategies
    pub strategy_delay: DelayRange,
    /// Ordered retrieval strategies; the first one to yield data wins
    #[serde(default = "default_strategies")]
    pub strategies: Vec<StrategyConfig>,
}

impl SourceConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }
}

/// One request recipe against the profile source
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Name used in logs and metrics
    pub name: String,
    /// URL template, e.g. "{base_url}/{handle}/"
    pub url_template: String,
    /// User-Agent presented by this client identity
    pub user_agent: String,
    /// Extra request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_strategies() -> Vec<StrategyConfig> {
    vec![
        StrategyConfig {
            name: "web-profile".to_string(),
            url_template: "{base_url}/api/v1/users/web_profile_info/?username={handle}"
                .to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
            headers: BTreeMap::from([
                ("Accept".to_string(), "application/json".to_string()),
                ("X-IG-App-ID".to_string(), "936619743392459".to_string()),
                ("X-Requested-With".to_string(), "XMLHttpRequest".to_string()),
            ]),
        },
        StrategyConfig {
            name: "mobile-app".to_string(),
            url_template: "{base_url}/api/v1/users/web_profile_info/?username={handle}"
                .to_string(),
            user_agent: "Instagram 219.0.0.12.117 Android (31/12; 420dpi; 1080x2400; samsung; SM-G991B; o1s; exynos2100; en_US; 346138365)".to_string(),
            headers: BTreeMap::from([
                ("Accept".to_string(), "*/*".to_string()),
                ("X-IG-App-ID".to_string(), "567067343352427".to_string()),
            ]),
        },
        StrategyConfig {
            name: "profile-page".to_string(),
            url_template: "{base_url}/{handle}/".to_string(),
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15".to_string(),
            headers: BTreeMap::from([
                ("Accept".to_string(), "text/html,application/xhtml+xml".to_string()),
                ("Accept-Language".to_string(), "en-US,en;q=0.9".to_string()),
            ]),
        },
    ]
}

/// Freshness gate configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Freshness window in seconds (default: 86400)
    pub ttl_seconds: u64,
    /// Maximum biography length in characters (default: 500)
    pub biography_max_chars: usize,
}

impl SyncConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_seconds as i64)
    }
}

/// Batch refresh scheduler configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Run the in-process refresh loop
    pub enabled: bool,
    /// Interval between in-process cycles in seconds
    pub interval_seconds: u64,
    /// Maximum candidates per cycle (default: 2)
    pub batch_size: u32,
    /// Randomized pause before each candidate
    pub jitter: DelayRange,
    /// Bearer secret required by the external trigger endpoint, if set
    pub trigger_secret: Option<String>,
}

/// Image proxy and placeholder configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfig {
    /// Path of the proxy route, e.g. "/api/image-proxy"
    pub proxy_path: String,
    /// Base URL of the generated avatar service
    pub placeholder_base_url: String,
    /// Ceiling for a single image fetch
    pub fetch_timeout_seconds: u64,
    /// Cache lifetime for successfully proxied images
    pub success_cache_seconds: u64,
    /// Cache lifetime for placeholder substitutions
    pub fallback_cache_seconds: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub fn default_filter(&self) -> String {
        format!("profilesync={},tower_http=debug", self.level)
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (PROFILESYNC_*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.path", "data/profilesync.db")?
            .set_default("source.base_url", "https://www.instagram.com")?
            .set_default("source.fetch_timeout_seconds", 9)?
            .set_default("source.strategy_delay.min_ms", 300)?
            .set_default("source.strategy_delay.max_ms", 900)?
            .set_default("sync.ttl_seconds", 86400)?
            .set_default("sync.biography_max_chars", 500)?
            .set_default("scheduler.enabled", false)?
            .set_default("scheduler.interval_seconds", 900)?
            .set_default("scheduler.batch_size", 2)?
            .set_default("scheduler.jitter.min_ms", 1000)?
            .set_default("scheduler.jitter.max_ms", 3000)?
            .set_default("images.proxy_path", "/api/image-proxy")?
            .set_default("images.placeholder_base_url", "https://ui-avatars.com/api")?
            .set_default("images.fetch_timeout_seconds", 5)?
            .set_default("images.success_cache_seconds", 86400)?
            .set_default("images.fallback_cache_seconds", 300)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("PROFILESYNC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        if self.source.strategies.is_empty() {
            return Err(AppError::Config(
                "source.strategies must contain at least one strategy".to_string(),
            ));
        }

        if let Some(strategy) = self
            .source
            .strategies
            .iter()
            .find(|s| !s.url_template.contains("{handle}"))
        {
            return Err(AppError::Config(format!(
                "source.strategies[{}].url_template must contain {{handle}}",
                strategy.name
            )));
        }

        if self.sync.ttl_seconds == 0 {
            return Err(AppError::Config(
                "sync.ttl_seconds must be greater than 0".to_string(),
            ));
        }

        if self.scheduler.batch_size == 0 {
            return Err(AppError::Config(
                "scheduler.batch_size must be greater than 0".to_string(),
            ));
        }

        for (name, range) in [
            ("source.strategy_delay", self.source.strategy_delay),
            ("scheduler.jitter", self.scheduler.jitter),
        ] {
            if range.min_ms > range.max_ms {
                return Err(AppError::Config(format!(
                    "{name}.min_ms must not exceed {name}.max_ms"
                )));
            }
        }

        if !self.images.proxy_path.starts_with('/') {
            return Err(AppError::Config(
                "images.proxy_path must start with '/'".to_string(),
            ));
        }

        if !matches!(
            self.logging.level.to_ascii_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(AppError::Config(format!(
                "logging.level must be one of trace, debug, info, warn, error (got {:?})",
                self.logging.level
            )));
        }

        if !matches!(self.logging.format.to_ascii_lowercase().as_str(), "pretty" | "json") {
            return Err(AppError::Config(format!(
                "logging.format must be \"pretty\" or \"json\" (got {:?})",
                self.logging.format
            )));
        }

        Ok(())
    }
}
