//! Image proxy
//!
//! Dereferences sanitized image references. Upstream images are served
//! with a long cache lifetime; any failure redirects to the handle's
//! placeholder with a short one. A failing placeholder is never
//! substituted again, which would loop.

use axum::{
    Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;

use crate::AppState;
use crate::data::normalize_handle;
use crate::metrics::IMAGE_PROXY_TOTAL;

/// Largest upstream image accepted
const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

/// Placeholder name used when the request carries no valid handle
const ANONYMOUS_HANDLE: &str = "profile";

/// Create image proxy router mounted at `proxy_path`
pub fn image_proxy_router(proxy_path: &str) -> Router<AppState> {
    Router::new().route(proxy_path, get(image_proxy))
}

#[derive(Debug, Deserialize)]
pub struct ImageProxyQuery {
    pub url: Option<String>,
    pub handle: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum ImageFetchError {
    #[error("not an absolute http(s) URL")]
    InvalidUrl,

    #[error("upstream returned HTTP {0}")]
    Status(u16),

    #[error("upstream content type {0:?} is not an image")]
    NotImage(String),

    #[error("upstream image is empty")]
    Empty,

    #[error("upstream image exceeds {} bytes", MAX_IMAGE_BYTES)]
    TooLarge,

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// GET {proxy_path}?url=..&handle=..
async fn image_proxy(
    State(state): State<AppState>,
    Query(query): Query<ImageProxyQuery>,
) -> Response {
    let images = &state.config.images;
    let sanitizer = state.synchronizer.sanitizer();
    let url = query.url.unwrap_or_default();
    let handle = query
        .handle
        .as_deref()
        .and_then(|handle| normalize_handle(handle).ok())
        .unwrap_or_else(|| ANONYMOUS_HANDLE.to_string());

    let error = match fetch_image(&state.image_client, &url).await {
        Ok((content_type, body)) => {
            IMAGE_PROXY_TOTAL.with_label_values(&["success"]).inc();
            return (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type),
                    (
                        header::CACHE_CONTROL,
                        format!("public, max-age={}", images.success_cache_seconds),
                    ),
                ],
                body,
            )
                .into_response();
        }
        Err(error) => error,
    };

    if sanitizer.is_placeholder(&url) {
        IMAGE_PROXY_TOTAL.with_label_values(&["loop_guard"]).inc();
        tracing::warn!(handle = %handle, error = %error, "Placeholder fetch failed");
        return (StatusCode::BAD_GATEWAY, "placeholder unavailable").into_response();
    }

    IMAGE_PROXY_TOTAL.with_label_values(&["fallback"]).inc();
    tracing::info!(handle = %handle, error = %error, "Image fetch failed, redirecting to placeholder");

    (
        StatusCode::FOUND,
        [
            (header::LOCATION, sanitizer.placeholder_for(&handle)),
            (
                header::CACHE_CONTROL,
                format!("public, max-age={}", images.fallback_cache_seconds),
            ),
        ],
    )
        .into_response()
}

/// Fetch an upstream image, returning its content type and body
async fn fetch_image(
    client: &reqwest::Client,
    raw_url: &str,
) -> Result<(String, Vec<u8>), ImageFetchError> {
    let url = url::Url::parse(raw_url).map_err(|_| ImageFetchError::InvalidUrl)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ImageFetchError::InvalidUrl);
    }

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ImageFetchError::Status(status.as_u16()));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if !content_type.to_ascii_lowercase().starts_with("image/") {
        return Err(ImageFetchError::NotImage(content_type));
    }

    if response
        .content_length()
        .is_some_and(|length| length > MAX_IMAGE_BYTES)
    {
        return Err(ImageFetchError::TooLarge);
    }

    // Content-Length is optional, so the cap also applies while streaming
    let mut response = response;
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if (body.len() + chunk.len()) as u64 > MAX_IMAGE_BYTES {
            return Err(ImageFetchError::TooLarge);
        }
        body.extend_from_slice(&chunk);
    }
    if body.is_empty() {
        return Err(ImageFetchError::Empty);
    }

    Ok((content_type, body))
}
