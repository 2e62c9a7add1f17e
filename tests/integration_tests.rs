//! End-to-end tests against a real server on an ephemeral port.
//!
//! Each test starts its own application instance backed by the in-memory
//! store and static bearer tokens, so no external services are needed.
//!
//! Run with: `cargo test --test integration_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::sleep;

use watch_catalog::auth::StaticTokenValidator;
use watch_catalog::config::StaticToken;
use watch_catalog::store::MemoryWatchStore;
use watch_catalog::{AppState, Config, build_router};

const ADMIN_TOKEN: &str = "admin-token";
const READER_TOKEN: &str = "reader-token";
const NOBODY_TOKEN: &str = "nobody-token";

/// Test fixture that owns a running app server.
struct TestServer {
    base_url: String,
    client: Client,
    state: AppState,
}

impl TestServer {
    /// Start a server with rate limiting disabled.
    async fn start() -> Self {
        Self::start_with(Config {
            rate_limit_enabled: false,
            ..test_config()
        })
        .await
    }

    async fn start_with(config: Config) -> Self {
        let tokens = Arc::new(StaticTokenValidator::new(&config.static_tokens));
        let state = AppState::new(Arc::new(MemoryWatchStore::new()), tokens, config)
            .expect("Failed to build application state");
        let app = build_router(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to ephemeral port");
        let addr = listener.local_addr().expect("Failed to get local address");

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("Server failed");
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: format!("http://{addr}"),
            client,
            state,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn create(&self, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url("/v1/watches"))
            .bearer_auth(ADMIN_TOKEN)
            .json(body)
            .send()
            .await
            .expect("Failed to send request")
    }

    async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to send request")
    }
}

fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        static_tokens: vec![
            StaticToken {
                token: ADMIN_TOKEN.to_string(),
                permissions: vec!["watches:read".to_string(), "watches:write".to_string()],
            },
            StaticToken {
                token: READER_TOKEN.to_string(),
                permissions: vec!["watches:read".to_string()],
            },
            StaticToken {
                token: NOBODY_TOKEN.to_string(),
                permissions: vec![],
            },
        ],
        metrics_port: 0,
        log_level: "warn".to_string(),
        ..Config::default()
    }
}

fn omega() -> Value {
    json!({
        "brand": "Omega",
        "model": "Seamaster",
        "dial_color": "Blue",
        "strap_type": "Metal",
        "price": 1200.0,
        "image_url": "http://x/y.jpg",
        "gender": "male"
    })
}

fn watch(brand: &str, dial_color: &str, price: f64) -> Value {
    json!({
        "brand": brand,
        "model": "Model",
        "dial_color": dial_color,
        "strap_type": "Leather",
        "price": price,
        "image_url": "http://x/y.jpg",
        "gender": "female"
    })
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_healthcheck_needs_no_token() {
    let server = TestServer::start().await;

    let response = server
        .client
        .get(server.url("/v1/healthcheck"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "available");
    assert_eq!(body["system_info"]["environment"], "development");
    assert_eq!(body["store"], "memory");
}

// ============================================================================
// Watch lifecycle
// ============================================================================

#[tokio::test]
async fn test_omega_versioned_update_flow() {
    let server = TestServer::start().await;

    let response = server.create(&omega()).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let location = response
        .headers()
        .get("location")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let body: Value = response.json().await.unwrap();
    let id = body["watch"]["id"].as_i64().unwrap();
    assert_eq!(body["watch"]["version"], 1);
    assert_eq!(location, format!("/v1/watches/{id}"));

    // Stale precondition
    let response = server
        .client
        .patch(server.url(&location))
        .bearer_auth(ADMIN_TOKEN)
        .header("X-Expected-Version", "0")
        .json(&json!({"price": 1300.0}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "edit_conflict");

    // Current precondition
    let response = server
        .client
        .patch(server.url(&location))
        .bearer_auth(ADMIN_TOKEN)
        .header("X-Expected-Version", "1")
        .json(&json!({"price": 1300.0}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["watch"]["version"], 2);
    assert_eq!(body["watch"]["price"], 1300.0);
    assert_eq!(body["watch"]["model"], "Seamaster");

    let body: Value = server
        .get(&location, READER_TOKEN)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["watch"]["version"], 2);
}

#[tokio::test]
async fn test_create_reports_every_invalid_field() {
    let server = TestServer::start().await;

    let response = server
        .create(&json!({"brand": "", "price": -5.0, "gender": "unknown"}))
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "failed_validation");
    assert_eq!(body["fields"]["brand"], "must be provided");
    assert_eq!(body["fields"]["price"], "must be greater than zero");
    assert_eq!(body["fields"]["gender"], "must be either male or female");
    assert_eq!(body["fields"]["model"], "must be provided");
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let server = TestServer::start().await;

    let response = server
        .client
        .post(server.url("/v1/watches"))
        .bearer_auth(ADMIN_TOKEN)
        .header("content-type", "application/json")
        .body("{\"brand\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = server
        .create(&json!({"brand": "Omega", "unexpected": true}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_and_invalid_ids_are_not_found() {
    let server = TestServer::start().await;

    for path in ["/v1/watches/999", "/v1/watches/0", "/v1/watches/abc"] {
        let response = server.get(path, READER_TOKEN).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
    }

    let response = server
        .client
        .delete(server.url("/v1/watches/999"))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_then_get_is_not_found() {
    let server = TestServer::start().await;

    let body: Value = server.create(&omega()).await.json().await.unwrap();
    let path = format!("/v1/watches/{}", body["watch"]["id"]);

    let response = server
        .client
        .delete(server.url(&path))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "watch successfully deleted");

    let response = server.get(&path, READER_TOKEN).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bad_expected_version_header_is_bad_request() {
    let server = TestServer::start().await;

    let body: Value = server.create(&omega()).await.json().await.unwrap();
    let path = format!("/v1/watches/{}", body["watch"]["id"]);

    let response = server
        .client
        .patch(server.url(&path))
        .bearer_auth(ADMIN_TOKEN)
        .header("X-Expected-Version", "latest")
        .json(&json!({"price": 1300.0}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_patch_missing_id_is_not_found_before_body_is_read() {
    let server = TestServer::start().await;

    let response = server
        .client
        .patch(server.url("/v1/watches/999"))
        .bearer_auth(ADMIN_TOKEN)
        .header("content-type", "application/json")
        .body("{\"price\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body: Value = server.create(&omega()).await.json().await.unwrap();
    let response = server
        .client
        .patch(server.url(&format!("/v1/watches/{}", body["watch"]["id"])))
        .bearer_auth(ADMIN_TOKEN)
        .header("content-type", "application/json")
        .body("{\"price\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unstorable_prices_are_validation_errors() {
    let server = TestServer::start().await;

    for (price, message) in [
        (json!(0.004), "must have at most 2 decimal places"),
        (json!(1200.129), "must have at most 2 decimal places"),
        (json!(1e10), "must be less than 10000000000"),
    ] {
        let mut watch = omega();
        watch["price"] = price.clone();

        let response = server.create(&watch).await;
        assert_eq!(
            response.status(),
            StatusCode::UNPROCESSABLE_ENTITY,
            "{price}"
        );
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["fields"]["price"], message, "{price}");
    }

    let mut watch = omega();
    watch["price"] = json!(1200.13);
    let body: Value = server.create(&watch).await.json().await.unwrap();
    assert_eq!(body["watch"]["price"], 1200.13);
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_list_filters_sorts_and_paginates() {
    let server = TestServer::start().await;

    server.create(&watch("Omega", "Blue", 500.0)).await;
    server.create(&watch("Rolex", "Black", 900.0)).await;
    server.create(&watch("Omega", "Black", 700.0)).await;

    let body: Value = server
        .get("/v1/watches?brand=Omega&sort=-price", READER_TOKEN)
        .await
        .json()
        .await
        .unwrap();
    let prices: Vec<f64> = body["watches"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["price"].as_f64().unwrap())
        .collect();
    assert_eq!(prices, vec![700.0, 500.0]);
    assert_eq!(body["metadata"]["total_records"], 2);

    let body: Value = server
        .get("/v1/watches?page=2&page_size=2", READER_TOKEN)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["watches"].as_array().unwrap().len(), 1);
    assert_eq!(body["metadata"]["current_page"], 2);
    assert_eq!(body["metadata"]["last_page"], 2);
    assert_eq!(body["metadata"]["total_records"], 3);
}

#[tokio::test]
async fn test_list_rejects_bad_query_parameters() {
    let server = TestServer::start().await;

    let response = server
        .get("/v1/watches?sort=password&page=0&page_size=abc", READER_TOKEN)
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["fields"]["sort"], "invalid sort value");
    assert_eq!(body["fields"]["page"], "must be greater than zero");
    assert_eq!(body["fields"]["page_size"], "must be an integer value");
}

#[tokio::test]
async fn test_empty_catalog_has_zero_metadata() {
    let server = TestServer::start().await;

    let body: Value = server
        .get("/v1/watches", READER_TOKEN)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["watches"], json!([]));
    assert_eq!(body["metadata"]["total_records"], 0);
    assert_eq!(body["metadata"]["last_page"], 0);
}

// ============================================================================
// Authentication & permissions
// ============================================================================

#[tokio::test]
async fn test_permission_gates() {
    let server = TestServer::start().await;

    // Anonymous
    let response = server
        .client
        .get(server.url("/v1/watches"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Unknown token
    let response = server.get("/v1/watches", "not-a-real-token").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key("www-authenticate"));

    // Authenticated without permissions
    let response = server.get("/v1/watches", NOBODY_TOKEN).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Reader cannot write
    let response = server
        .client
        .post(server.url("/v1/watches"))
        .bearer_auth(READER_TOKEN)
        .json(&omega())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Malformed header
    let response = server
        .client
        .get(server.url("/v1/watches"))
        .header("authorization", "Basic abc")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Rate limiting
// ============================================================================

#[tokio::test]
async fn test_rate_limit_burst_then_refill() {
    let server = TestServer::start_with(Config {
        rate_limit_enabled: true,
        rate_limit_rps: 2,
        rate_limit_burst: 4,
        ..test_config()
    })
    .await;

    for i in 0..4 {
        let response = server.get("/v1/healthcheck", READER_TOKEN).await;
        assert_eq!(response.status(), StatusCode::OK, "request {i}");
    }

    let response = server.get("/v1/healthcheck", READER_TOKEN).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "rate_limit_exceeded");

    sleep(Duration::from_millis(1100)).await;

    let response = server.get("/v1/healthcheck", READER_TOKEN).await;
    assert_eq!(response.status(), StatusCode::OK);

    let registry = server.state.rate_limiter.clone().unwrap();
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_disabled_limiter_never_rejects() {
    let server = TestServer::start().await;
    assert!(server.state.rate_limiter.is_none());

    for _ in 0..20 {
        let response = server.get("/v1/healthcheck", READER_TOKEN).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
