//! Ordered strategy execution
//!
//! Strategies run strictly one after another, never in parallel, with a
//! randomized pause between them. The first strategy whose document
//! yields usable data wins; every failure just moves to the next one.

use std::sync::Arc;
use std::time::Duration;

use super::extract::{Extractor, ProfileFields};
use super::strategy::{HttpStrategy, RetrievalStrategy};
use super::FetchError;
use crate::config::{DelayRange, SourceConfig};
use crate::metrics::{SOURCE_FETCH_DURATION_SECONDS, STRATEGY_ATTEMPTS_TOTAL};

/// Why a single attempt did not produce a profile
#[derive(Debug, thiserror::Error)]
enum AttemptError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("document yielded no usable profile data")]
    Extraction,
}

impl AttemptError {
    fn outcome(&self) -> &'static str {
        match self {
            AttemptError::Fetch(error) => error.outcome(),
            AttemptError::Extraction => "extraction",
        }
    }
}

/// First-success-wins reducer over an ordered strategy list
pub struct StrategyRunner {
    strategies: Vec<Arc<dyn RetrievalStrategy>>,
    extractor: Extractor,
    delay: DelayRange,
    fetch_timeout: Duration,
}

impl StrategyRunner {
    /// Create a runner
    ///
    /// # Arguments
    /// * `strategies` - Ordered strategies, tried first to last
    /// * `extractor` - Parser applied to every fetched document
    /// * `delay` - Pause inserted between two consecutive strategies
    /// * `fetch_timeout` - Hard ceiling for a single fetch
    pub fn new(
        strategies: Vec<Arc<dyn RetrievalStrategy>>,
        extractor: Extractor,
        delay: DelayRange,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            strategies,
            extractor,
            delay,
            fetch_timeout,
        }
    }

    /// Build the HTTP strategies listed in configuration
    pub fn from_config(config: &SourceConfig, http_client: Arc<reqwest::Client>) -> Self {
        let strategies = config
            .strategies
            .iter()
            .map(|strategy| {
                Arc::new(HttpStrategy::new(
                    strategy,
                    &config.base_url,
                    http_client.clone(),
                )) as Arc<dyn RetrievalStrategy>
            })
            .collect();

        Self::new(
            strategies,
            Extractor::default(),
            config.strategy_delay,
            config.fetch_timeout(),
        )
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Resolve a handle to profile fields
    ///
    /// # Returns
    /// Fields from the first successful strategy, or `None` when every
    /// strategy failed. Failures are logged, never returned.
    pub async fn resolve(&self, handle: &str) -> Option<ProfileFields> {
        for (index, strategy) in self.strategies.iter().enumerate() {
            if index > 0 {
                self.delay.pause().await;
            }

            match self.attempt(strategy.as_ref(), handle).await {
                Ok(fields) => {
                    STRATEGY_ATTEMPTS_TOTAL
                        .with_label_values(&[strategy.name(), "success"])
                        .inc();
                    tracing::info!(
                        handle = %handle,
                        strategy = %strategy.name(),
                        followers = fields.followers(),
                        "Profile resolved"
                    );
                    return Some(fields);
                }
                Err(error) => {
                    STRATEGY_ATTEMPTS_TOTAL
                        .with_label_values(&[strategy.name(), error.outcome()])
                        .inc();
                    tracing::warn!(
                        handle = %handle,
                        strategy = %strategy.name(),
                        error = %error,
                        "Strategy failed, trying next"
                    );
                }
            }
        }

        tracing::warn!(
            handle = %handle,
            strategies = self.strategies.len(),
            "All strategies exhausted"
        );
        None
    }

    async fn attempt(
        &self,
        strategy: &dyn RetrievalStrategy,
        handle: &str,
    ) -> Result<ProfileFields, AttemptError> {
        let timer = SOURCE_FETCH_DURATION_SECONDS
            .with_label_values(&[strategy.name()])
            .start_timer();
        let fetched = tokio::time::timeout(self.fetch_timeout, strategy.fetch(handle)).await;
        timer.observe_duration();

        let document = fetched.map_err(|_| FetchError::Timeout)??;

        if document.is_login_wall(handle) {
            return Err(FetchError::LoginWall.into());
        }

        self.extractor
            .extract(&document.body, handle)
            .ok_or(AttemptError::Extraction)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::source::FetchedDocument;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Canned strategy that counts its invocations
    pub(crate) struct StubStrategy {
        name: String,
        response: Result<FetchedDocument, u16>,
        hang: bool,
        pub(crate) calls: AtomicUsize,
    }

    impl StubStrategy {
        pub(crate) fn body(name: &str, body: &str) -> Arc<Self> {
            Self::at_url(name, &format!("https://source.example/{name}"), body)
        }

        pub(crate) fn at_url(name: &str, final_url: &str, body: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                response: Ok(FetchedDocument {
                    status: 200,
                    final_url: final_url.to_string(),
                    body: body.to_string(),
                }),
                hang: false,
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn status(name: &str, status: u16) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                response: Err(status),
                hang: false,
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn hanging(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                response: Err(599),
                hang: true,
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RetrievalStrategy for StubStrategy {
        fn name(&self) -> &str {
            &self.name
        }

        async fn fetch(&self, _handle: &str) -> Result<FetchedDocument, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            self.response.clone().map_err(FetchError::Status)
        }
    }

    pub(crate) fn runner(strategies: Vec<Arc<StubStrategy>>) -> StrategyRunner {
        StrategyRunner::new(
            strategies
                .into_iter()
                .map(|s| s as Arc<dyn RetrievalStrategy>)
                .collect(),
            Extractor::default(),
            DelayRange::NONE,
            Duration::from_millis(200),
        )
    }

    #[tokio::test]
    async fn first_successful_strategy_wins() {
        let a = StubStrategy::body("a", "100 Followers, 1 Following, 2 Posts");
        let b = StubStrategy::body("b", "999 Followers, 9 Following, 9 Posts");

        let fields = runner(vec![a.clone(), b.clone()])
            .resolve("alice")
            .await
            .unwrap();

        assert_eq!(fields.follower_count, Some(100));
        assert_eq!(a.call_count(), 1);
        assert_eq!(b.call_count(), 0);
    }

    #[tokio::test]
    async fn failures_fall_through_in_order() {
        let status = StubStrategy::status("rate-limited", 429);
        let empty = StubStrategy::body("empty", "<html><body>nothing</body></html>");
        let good = StubStrategy::body("good", "42 Followers");

        let fields = runner(vec![status.clone(), empty.clone(), good.clone()])
            .resolve("alice")
            .await
            .unwrap();

        assert_eq!(fields.follower_count, Some(42));
        assert_eq!(status.call_count(), 1);
        assert_eq!(empty.call_count(), 1);
        assert_eq!(good.call_count(), 1);
    }

    #[tokio::test]
    async fn all_failures_yield_none() {
        let a = StubStrategy::status("a", 500);
        let b = StubStrategy::body("b", "");

        assert!(runner(vec![a.clone(), b.clone()]).resolve("alice").await.is_none());
        assert_eq!(a.call_count(), 1);
        assert_eq!(b.call_count(), 1);
    }

    #[tokio::test]
    async fn login_wall_is_skipped() {
        let wall = StubStrategy::at_url(
            "wall",
            "https://source.example/accounts/login/",
            r#"<meta property="og:image" content="https://cdn.example.com/login-banner.png">"#,
        );
        let good = StubStrategy::body("good", "7 Followers");

        let fields = runner(vec![wall.clone(), good.clone()])
            .resolve("alice")
            .await
            .unwrap();

        assert_eq!(fields.follower_count, Some(7));
        assert_eq!(wall.call_count(), 1);
    }

    #[tokio::test]
    async fn slow_strategy_times_out() {
        let slow = StubStrategy::hanging("slow");
        let good = StubStrategy::body("good", "5 Followers");

        let started = std::time::Instant::now();
        let fields = runner(vec![slow.clone(), good.clone()])
            .resolve("alice")
            .await
            .unwrap();

        assert_eq!(fields.follower_count, Some(5));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn from_config_keeps_strategy_order() {
        let config = crate::config::tests::valid_config();
        let runner = StrategyRunner::from_config(&config.source, Arc::new(reqwest::Client::new()));
        assert_eq!(
            runner.strategy_names(),
            vec!["web-profile", "mobile-app", "profile-page"]
        );
    }
}
