//! Image reference sanitation
//!
//! Rewrites raw external image URLs into references served by the local
//! image proxy. Sanitizing is total and idempotent: any input yields a
//! usable reference, and sanitizing a sanitized reference is a no-op.

use std::sync::Arc;

use super::placeholder::PlaceholderAvatar;

/// Values some sources emit instead of leaving the field out
const EMPTY_SENTINELS: &[&str] = &["undefined", "null", "none", "nan"];

/// References shorter than this cannot be real URLs
const MIN_REFERENCE_LEN: usize = 5;

#[derive(Clone)]
pub struct ImageSanitizer {
    proxy_path: String,
    placeholder: Arc<dyn PlaceholderAvatar>,
}

impl ImageSanitizer {
    /// Create a sanitizer
    ///
    /// # Arguments
    /// * `proxy_path` - Local proxy route, e.g. `/api/image-proxy`
    /// * `placeholder` - Generator used when no usable image exists
    pub fn new(proxy_path: &str, placeholder: Arc<dyn PlaceholderAvatar>) -> Self {
        Self {
            proxy_path: proxy_path.trim_end_matches('/').to_string(),
            placeholder,
        }
    }

    /// Produce a usable image reference for `handle`
    ///
    /// 1. Missing, tiny or sentinel values become the handle's placeholder
    /// 2. Proxied, local and placeholder references pass through untouched
    /// 3. External http(s) URLs are wrapped into a proxy reference
    ///
    /// Anything that cannot be wrapped degrades to the placeholder.
    pub fn sanitize(&self, raw: Option<&str>, handle: &str) -> String {
        let Some(raw) = raw.map(str::trim) else {
            return self.placeholder_for(handle);
        };

        if raw.len() < MIN_REFERENCE_LEN
            || EMPTY_SENTINELS
                .iter()
                .any(|sentinel| raw.eq_ignore_ascii_case(sentinel))
        {
            return self.placeholder_for(handle);
        }

        if self.is_proxied(raw) || is_local(raw) || self.placeholder.is_placeholder(raw) {
            return raw.to_string();
        }

        let absolute = if raw.starts_with("//") {
            format!("https:{raw}")
        } else {
            raw.to_string()
        };

        match url::Url::parse(&absolute) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => self.proxy_reference(&absolute, handle),
            _ => {
                tracing::debug!(handle = %handle, reference = %raw, "Unusable image reference, using placeholder");
                self.placeholder_for(handle)
            }
        }
    }

    pub fn placeholder_for(&self, handle: &str) -> String {
        self.placeholder.placeholder_for(handle)
    }

    pub fn is_placeholder(&self, reference: &str) -> bool {
        self.placeholder.is_placeholder(reference)
    }

    /// Whether `reference` already points at the local proxy
    pub fn is_proxied(&self, reference: &str) -> bool {
        reference
            .strip_prefix(&self.proxy_path)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('?'))
    }

    fn proxy_reference(&self, url: &str, handle: &str) -> String {
        format!(
            "{}?url={}&handle={}",
            self.proxy_path,
            urlencoding::encode(url),
            urlencoding::encode(&handle.to_ascii_lowercase())
        )
    }
}

/// Root-relative paths and inline data are already served locally
fn is_local(reference: &str) -> bool {
    (reference.starts_with('/') && !reference.starts_with("//"))
        || reference.starts_with("data:image/")
}
