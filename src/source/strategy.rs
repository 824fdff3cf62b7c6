//! Retrieval strategies
//!
//! A strategy is one request shape against the source: its own URL,
//! user agent and headers, imitating a distinct client.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use std::sync::Arc;

use super::{FetchError, FetchedDocument};
use crate::config::StrategyConfig;

/// One way of fetching a profile document
#[async_trait]
pub trait RetrievalStrategy: Send + Sync {
    /// Name used in logs and metrics
    fn name(&self) -> &str;

    /// Fetch the raw profile document for `handle`
    ///
    /// Implementations perform exactly one request and never retry.
    async fn fetch(&self, handle: &str) -> Result<FetchedDocument, FetchError>;
}

/// Strategy backed by a plain HTTP GET
pub struct HttpStrategy {
    name: String,
    base_url: String,
    url_template: String,
    headers: HeaderMap,
    http_client: Arc<reqwest::Client>,
}

impl HttpStrategy {
    /// Build a strategy from configuration
    ///
    /// Headers that are not valid HTTP header names or values are
    /// dropped with a warning.
    pub fn new(config: &StrategyConfig, base_url: &str, http_client: Arc<reqwest::Client>) -> Self {
        let mut headers = HeaderMap::new();

        match HeaderValue::from_str(&config.user_agent) {
            Ok(value) => {
                headers.insert(USER_AGENT, value);
            }
            Err(_) => {
                tracing::warn!(strategy = %config.name, "Ignoring invalid user agent");
            }
        }

        for (name, value) in &config.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => {
                    tracing::warn!(strategy = %config.name, header = %name, "Ignoring invalid header");
                }
            }
        }

        Self {
            name: config.name.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            url_template: config.url_template.clone(),
            headers,
            http_client,
        }
    }

    /// Expand the URL template for `handle`
    pub fn url_for(&self, handle: &str) -> String {
        self.url_template
            .replace("{base_url}", &self.base_url)
            .replace("{handle}", &urlencoding::encode(handle))
    }
}

#[async_trait]
impl RetrievalStrategy for HttpStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, handle: &str) -> Result<FetchedDocument, FetchError> {
        let url = self.url_for(handle);

        let response = self
            .http_client
            .get(&url)
            .headers(self.headers.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let final_url = response.url().to_string();
        let body = response.text().await?;

        Ok(FetchedDocument {
            status: status.as_u16(),
            final_url,
            body,
        })
    }
}
