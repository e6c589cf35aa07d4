//! Common test utilities for API testing with mock providers.
//!
//! This module provides a test fixture that creates an in-process server
//! with mock metadata sources injected, so every endpoint can be exercised
//! without network access.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use bookshelf_core::{
    open_library,
    provider::CacheSettings,
    testing::{mock_factory, MockMetadataSource, MOCK_IMPLEMENTATION},
    BackoffPolicy, Config, OpenLibraryConfig, ProviderDefinition, ProviderRegistry,
    SqliteMetadataStore, StatusTracker,
};

/// Re-export fixtures for test convenience
pub use bookshelf_core::testing::fixtures;

/// Test fixture for API testing with mock metadata sources.
///
/// Two mock sources are available to the factory under the `"Mock"`
/// implementation: `primary` and `secondary`. Definitions for them are only
/// stored when the fixture is built with [`TestConfig::seeded`].
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_author_lookup() {
///     let fixture = TestFixture::seeded().await;
///     fixture.primary.add_author(fixtures::author("OL1A", "Ursula K. Le Guin")).await;
///
///     let response = fixture.get("/api/v1/metadata/author/OL1A").await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Registry behind the router
    pub registry: Arc<ProviderRegistry>,
    /// Mock source named `primary`
    pub primary: Arc<MockMetadataSource>,
    /// Mock source named `secondary`
    pub secondary: Arc<MockMetadataSource>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a fixture with no stored provider definitions.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a fixture with `primary` (priority 80) and `secondary`
    /// (priority 50) stored and enabled for every category.
    pub async fn seeded() -> Self {
        Self::with_config(TestConfig::seeded()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let primary = Arc::new(MockMetadataSource::new("primary"));
        let secondary = Arc::new(MockMetadataSource::new("secondary"));

        let store = Arc::new(SqliteMetadataStore::in_memory().expect("Failed to create store"));
        let tracker = Arc::new(StatusTracker::new(store.clone(), BackoffPolicy::default()));

        let mut factory = mock_factory([Arc::clone(&primary), Arc::clone(&secondary)]);
        open_library::register(&mut factory, OpenLibraryConfig::default());

        let registry = Arc::new(ProviderRegistry::new(
            store,
            tracker,
            factory,
            CacheSettings::default(),
            test_config.request_timeout,
        ));

        if test_config.seed_providers {
            registry
                .seed(vec![
                    ProviderDefinition::new("primary", MOCK_IMPLEMENTATION).with_priority(80),
                    ProviderDefinition::new("secondary", MOCK_IMPLEMENTATION).with_priority(50),
                ])
                .expect("Failed to seed providers");
        }

        let state = Arc::new(bookshelf_server::state::AppState::new(
            Config::default(),
            Arc::clone(&registry),
        ));

        // Create router
        let router = bookshelf_server::api::create_router(state);

        Self {
            router,
            registry,
            primary,
            secondary,
        }
    }

    /// Id of the stored definition with the given name.
    pub fn provider_id(&self, name: &str) -> i64 {
        self.registry
            .find(name)
            .expect("Failed to query registry")
            .unwrap_or_else(|| panic!("no provider named '{}'", name))
            .id
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Fetch a non-JSON endpoint and return its status and text body.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Store definitions for the two mock sources
    pub seed_providers: bool,
    /// Per-call provider timeout
    pub request_timeout: Duration,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            seed_providers: false,
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl TestConfig {
    /// Create config with both mock providers stored.
    pub fn seeded() -> Self {
        Self {
            seed_providers: true,
            ..Default::default()
        }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
