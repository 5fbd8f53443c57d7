//! Domain rewrite filter integration tests over a static site root.
//!
//! Run with: `cargo test -p imgshift-api --test rewrite_test`

mod helpers;

use axum::http::StatusCode;
use helpers::fixtures::{create_test_png, write_agent_assets, AGENT_MODULE};
use helpers::{create_test_config, setup_test_app_with, TestApp};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

const AGENT_TAG: &str = r#"<script src="/vendor/image-domain-replace/js/script.js"></script>"#;

fn write_site(root: &Path) {
    std::fs::create_dir_all(root.join("admin")).unwrap();
    std::fs::write(
        root.join("index.html"),
        r#"<html><body><img src="http://old.cdn/foo.png"><img src="http://old.cdn/bar.png"><a href="http://other.site/x">x</a></body></html>"#,
    )
    .unwrap();
    std::fs::write(
        root.join("admin/index.html"),
        r#"<html><body><img src="http://old.cdn/foo.png"></body></html>"#,
    )
    .unwrap();
    std::fs::write(
        root.join("data.json"),
        r#"{"gallery":[{"src":"https://old.cdn/2025/09/a.jpg"}],"title":"old.cdn is gone"}"#,
    )
    .unwrap();
    std::fs::write(
        root.join("lazy.html"),
        r#"<html><body><img data-src="http://old.cdn/2025/09/w100/photo.png"></body></html>"#,
    )
    .unwrap();
}

async fn setup_site(queue: bool) -> (TestApp, TempDir) {
    let site = tempfile::tempdir().expect("Failed to create temp directory");
    write_site(site.path());
    let agent_dir = site.path().join("agent-build");
    std::fs::create_dir_all(&agent_dir).unwrap();
    write_agent_assets(&agent_dir);

    let mut config = create_test_config();
    config.site_root = Some(site.path().to_string_lossy().into_owned());
    config.agent_asset_dir = Some(agent_dir.to_string_lossy().into_owned());
    config.queue_bucket_check = queue;
    (setup_test_app_with(config).await, site)
}

#[tokio::test]
async fn test_html_urls_rewritten_and_agent_injected() {
    let (app, _site) = setup_site(false).await;

    let response = app.client().get("/index.html").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let html = response.text();
    assert!(html.contains(r#"<img src="https://img.example.com/foo.png">"#));
    assert!(html.contains(r#"<img src="https://img.example.com/bar.png">"#));
    assert!(html.contains(r#"<a href="http://other.site/x">"#));
    assert!(!html.contains("old.cdn"));
    assert!(html.contains(&format!("{}\n</body>", AGENT_TAG)));
}

#[tokio::test]
async fn test_injected_agent_script_is_served() {
    let (app, _site) = setup_site(false).await;

    let script = app
        .client()
        .get("/vendor/image-domain-replace/js/script.js")
        .await;
    assert_eq!(script.status_code(), StatusCode::OK);
    assert!(script.header("content-type").to_str().unwrap().starts_with("application/javascript"));
    let body = script.text();
    assert!(body.starts_with("let wasm_bindgen;"));
    assert!(body.contains(r#"wasm_bindgen({ module_or_path: "/vendor/image-domain-replace/js/imgshift_agent_web_bg.wasm" });"#));

    let module = app
        .client()
        .get("/vendor/image-domain-replace/js/imgshift_agent_web_bg.wasm")
        .await;
    assert_eq!(module.status_code(), StatusCode::OK);
    assert_eq!(module.header("content-type"), "application/wasm");
    assert_eq!(module.as_bytes().as_ref(), AGENT_MODULE);
}

#[tokio::test]
async fn test_no_agent_tag_without_agent_build() {
    let site = tempfile::tempdir().unwrap();
    write_site(site.path());
    let mut config = create_test_config();
    config.site_root = Some(site.path().to_string_lossy().into_owned());
    let app = setup_test_app_with(config).await;

    let html = app.client().get("/index.html").await.text();
    assert!(html.contains("https://img.example.com/foo.png"));
    assert!(!html.contains("<script"));

    let script = app
        .client()
        .get("/vendor/image-domain-replace/js/script.js")
        .await;
    assert_eq!(script.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_agent_tag_kept_when_site_ships_script() {
    let site = tempfile::tempdir().unwrap();
    write_site(site.path());
    let vendored = site.path().join("vendor/image-domain-replace/js");
    std::fs::create_dir_all(&vendored).unwrap();
    std::fs::write(vendored.join("script.js"), "/* agent */").unwrap();
    let mut config = create_test_config();
    config.site_root = Some(site.path().to_string_lossy().into_owned());
    let app = setup_test_app_with(config).await;

    let html = app.client().get("/index.html").await.text();
    assert!(html.contains(AGENT_TAG));
    let script = app
        .client()
        .get("/vendor/image-domain-replace/js/script.js")
        .await;
    assert_eq!(script.text(), "/* agent */");
}

#[tokio::test]
async fn test_admin_pages_rewritten_without_agent() {
    let (app, _site) = setup_site(false).await;

    let html = app.client().get("/admin/index.html").await.text();

    assert!(html.contains("https://img.example.com/foo.png"));
    assert!(!html.contains("<script"));
}

#[tokio::test]
async fn test_json_strings_rewritten() {
    let (app, _site) = setup_site(false).await;

    let response = app.client().get("/data.json").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(
        body["gallery"][0]["src"],
        "https://img.example.com/2025/09/a.jpg"
    );
    // Bare domain mentions are not URLs.
    assert_eq!(body["title"], "old.cdn is gone");
}

#[tokio::test]
async fn test_rewritten_urls_resolved_in_background() {
    let (app, _site) = setup_site(true).await;
    app.storage
        .set_file("2025/09/photo.png", create_test_png(400, 200), "image/png");

    let html = app.client().get("/lazy.html").await.text();
    assert!(html.contains("https://img.example.com/2025/09/w100/photo.png"));

    let mut generated = false;
    for _ in 0..50 {
        if app.storage.has_file("2025/09/w100/photo.png") {
            generated = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(generated, "queued variant was never generated");
}

#[tokio::test]
async fn test_api_responses_carry_request_id_and_security_headers() {
    let (app, _site) = setup_site(false).await;

    let response = app.client().get("/health/live").await;

    assert_eq!(response.header("x-content-type-options"), "nosniff");
    assert!(!response.header("x-request-id").is_empty());
}
