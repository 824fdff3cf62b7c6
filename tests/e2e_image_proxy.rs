//! E2E tests for the image proxy

mod common;

use common::{PNG_BYTES, TestServer};

fn proxy_path(image_url: &str, handle: &str) -> String {
    format!(
        "/api/image-proxy?url={}&handle={}",
        urlencoding::encode(image_url),
        handle
    )
}

#[tokio::test]
async fn test_upstream_image_is_served_with_long_cache() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url(&proxy_path(&server.source.url("/img/alice.png"), "alice")))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "image/png");
    assert_eq!(
        response.headers()["cache-control"],
        "public, max-age=86400"
    );
    assert_eq!(response.bytes().await.unwrap().as_ref(), PNG_BYTES);
}

#[tokio::test]
async fn test_sanitized_profile_image_round_trips_through_proxy() {
    let server = TestServer::new().await;

    let (_, profile) = server.get_json("/api/profiles/alice").await;
    let image_ref = profile["imageRef"].as_str().unwrap();

    let response = server.client.get(server.url(image_ref)).send().await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "image/png");
}

#[tokio::test]
async fn test_failed_fetch_redirects_to_placeholder() {
    let server = TestServer::new().await;
    let expected = server.state.synchronizer.sanitizer().placeholder_for("bob");

    for image in ["/img/broken.png", "/img/text.png", "/img/empty.png"] {
        let response = server
            .client
            .get(server.url(&proxy_path(&server.source.url(image), "Bob")))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 302, "image = {image}");
        assert_eq!(response.headers()["location"], expected.as_str());
        assert_eq!(response.headers()["cache-control"], "public, max-age=300");
    }
}

#[tokio::test]
async fn test_oversized_image_redirects_to_placeholder() {
    let server = TestServer::new().await;
    let expected = server.state.synchronizer.sanitizer().placeholder_for("kai");

    let response = server
        .client
        .get(server.url(&proxy_path(&server.source.url("/img/huge.png"), "kai")))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 302);
    assert_eq!(response.headers()["location"], expected.as_str());
    assert_eq!(response.headers()["cache-control"], "public, max-age=300");
}

#[tokio::test]
async fn test_malformed_url_redirects_to_placeholder() {
    let server = TestServer::new().await;

    for url in ["not-a-url", "ftp://files.example/x.png", ""] {
        let response = server
            .client
            .get(server.url(&proxy_path(url, "dana")))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 302, "url = {url:?}");
    }
}

#[tokio::test]
async fn test_failing_placeholder_is_not_substituted_again() {
    let server = TestServer::new().await;
    let placeholder = server.state.synchronizer.sanitizer().placeholder_for("erin");

    let response = server
        .client
        .get(server.url(&proxy_path(&placeholder, "erin")))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 502);
}
