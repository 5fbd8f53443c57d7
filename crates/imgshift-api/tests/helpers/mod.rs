#![allow(dead_code)]

//! Test helpers: build AppState and router over an in-memory bucket.
//!
//! Run from workspace root: `cargo test -p imgshift-api`.

pub mod fixtures;

use axum::Router;
use axum_test::TestServer;
use imgshift_api::setup::{routes, services};
use imgshift_api::state::AppState;
use imgshift_core::{Config, ImageShiftConfig, StorageBackend};
use imgshift_services::{MemoryStorage, Storage};
use std::sync::Arc;

pub const BUCKET_DOMAIN: &str = "https://img.example.com";
pub const OLD_DOMAIN: &str = "old.cdn";
pub const CSRF_SECRET: &str = "test-csrf-secret-test-csrf-secret";
pub const PLACEHOLDER: &str = "/vendor/core/core/base/img/placeholder.png";

/// Test application: server plus the bucket behind it.
pub struct TestApp {
    pub server: TestServer,
    pub storage: MemoryStorage,
    pub state: Arc<AppState>,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    pub fn csrf_token(&self) -> String {
        self.state.csrf.issue()
    }
}

pub fn create_test_config() -> ImageShiftConfig {
    ImageShiftConfig {
        storage_backend: StorageBackend::Memory,
        bucket_domain: BUCKET_DOMAIN.to_string(),
        new_domain: BUCKET_DOMAIN.to_string(),
        old_domains: vec![OLD_DOMAIN.to_string()],
        fallback_image: PLACEHOLDER.to_string(),
        csrf_secret: Some(CSRF_SECRET.to_string()),
        ..ImageShiftConfig::default()
    }
}

pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(create_test_config()).await
}

pub async fn setup_test_app_with(config: ImageShiftConfig) -> TestApp {
    let (app, storage, state) = build_router(config).await;
    let server = TestServer::new(app.into_make_service()).expect("Failed to create test server");

    TestApp {
        server,
        storage,
        state,
    }
}

/// Router, bucket and state without a test server, for tests that bind a real socket.
pub async fn build_router(config: ImageShiftConfig) -> (Router, MemoryStorage, Arc<AppState>) {
    let config = Config::new(config);
    let storage = MemoryStorage::new(BUCKET_DOMAIN);
    let shared: Arc<dyn Storage> = Arc::new(storage.clone());

    let state = services::initialize_services(&config, shared)
        .await
        .expect("Failed to initialize services");
    let app = routes::setup_routes(&config, state.clone()).expect("Failed to build routes");
    (app, storage, state)
}

/// Bucket and state behind a server bound to a real socket.
pub struct TestBucket {
    pub storage: MemoryStorage,
    pub state: Arc<AppState>,
}
