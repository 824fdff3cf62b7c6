//! External profile source
//!
//! Everything that talks to the untrusted profile source lives here:
//! - `extract`: document parsing into [`ProfileFields`]
//! - `strategy`: one request recipe against the source
//! - `runner`: ordered, first-success-wins strategy execution
//!
//! Nothing in this module writes to storage.

mod extract;
mod runner;
mod strategy;

pub use extract::{
    ExtractionRules, Extractor, FallbackPatterns, ProfileFields, parse_count,
    parse_summary_counts, unescape_json_fragment,
};
pub use runner::StrategyRunner;
pub use strategy::{HttpStrategy, RetrievalStrategy};

#[cfg(test)]
pub(crate) use runner::tests as test_support;

/// Paths the source redirects anonymous clients to
const LOGIN_PATHS: &[&str] = &["/accounts/login", "/login"];

/// Transient failure of a single strategy attempt
///
/// Never leaves the strategy runner; every variant means
/// "move on to the next strategy".
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("source returned HTTP {0}")]
    Status(u16),

    #[error("fetch timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("redirected to login wall")]
    LoginWall,
}

impl FetchError {
    /// Metric label for this failure
    pub fn outcome(&self) -> &'static str {
        match self {
            FetchError::Status(_) => "status",
            FetchError::Timeout => "timeout",
            FetchError::Network(_) => "network",
            FetchError::LoginWall => "login_wall",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(error.to_string())
        }
    }
}

/// Raw response of a successful fetch
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub status: u16,
    /// URL after redirects
    pub final_url: String,
    pub body: String,
}

impl FetchedDocument {
    /// Whether the source bounced us to a login page without profile data
    ///
    /// A login URL alone is not enough: some login pages still embed the
    /// requested profile, and those remain extractable.
    pub fn is_login_wall(&self, handle: &str) -> bool {
        let path = url::Url::parse(&self.final_url)
            .map(|url| url.path().to_ascii_lowercase())
            .unwrap_or_else(|_| self.final_url.to_ascii_lowercase());
        let on_login_path = LOGIN_PATHS
            .iter()
            .any(|login| path.trim_end_matches('/').ends_with(login) || path.contains(&format!("{login}/")));

        on_login_path && !self.has_identity_marker(handle)
    }

    fn has_identity_marker(&self, handle: &str) -> bool {
        let body = self.body.to_ascii_lowercase();
        body.contains(&format!("\"{handle}\"")) || body.contains(&format!("@{handle}"))
    }
}
