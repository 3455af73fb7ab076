mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use common::{closed_port, spawn_minecraft, status_packet, Reply, STATUS_JSON};
use gamestatus_rs::{
    config::Config,
    server::{router, AppState},
    store::{ContentStore, MemoryStore},
};
use serde_json::{json, Value};
use tower::ServiceExt;

struct BrokenStore;

#[async_trait]
impl ContentStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<Value>> {
        Err(anyhow!("database offline"))
    }
}

struct PanickingStore;

#[async_trait]
impl ContentStore for PanickingStore {
    async fn get(&self, _key: &str) -> Result<Option<Value>> {
        panic!("store exploded")
    }
}

#[derive(Clone)]
struct CountingStore {
    inner: MemoryStore,
    reads: Arc<AtomicUsize>,
    keys: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ContentStore for CountingStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.keys.lock().unwrap().push(key.to_string());
        self.inner.get(key).await
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.probe.timeout_ms = 1000;
    config
}

fn app(config: &Config, store: impl ContentStore + 'static) -> Router {
    router(AppState::new(config, Arc::new(store)))
}

async fn call(app: Router, method: Method, uri: &str) -> (StatusCode, Option<String>, Value) {
    let res = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = res.status();
    let cache = res
        .headers()
        .get(header::CACHE_CONTROL)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, cache, body)
}

#[tokio::test]
async fn minecraft_endpoint_reports_configured_server() {
    let mock = spawn_minecraft(Reply::Chunks(
        vec![status_packet(STATUS_JSON)],
        Duration::ZERO,
    ))
    .await;
    let store = MemoryStore::new(json!({
        "servers": { "minecraft": { "serverIP": "127.0.0.1", "port": mock.addr.port().to_string() } }
    }));

    let (status, cache, body) = call(
        app(&test_config(), store),
        Method::GET,
        "/api/status/minecraft",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache.as_deref(), Some("no-store"));
    assert_eq!(
        body["server"],
        json!({ "host": "127.0.0.1", "port": mock.addr.port() })
    );
    assert_eq!(body["online"], true);
    assert_eq!(body["version"], "1.20.4");
    assert_eq!(body["protocol"], 765);
    assert_eq!(body["players"], json!({ "online": 5, "max": 20 }));
    assert_eq!(body["description"], "A Server");
    assert!(body["latency"].is_u64());
    assert!(body["favicon"].is_null());
    assert!(body.get("error").is_none());
    assert!(body["timestamp"].as_str().unwrap().contains('T'));
}

#[tokio::test]
async fn offline_server_still_answers_200() {
    let port = closed_port().await;
    let store = MemoryStore::new(json!({
        "servers": { "fivem": { "serverIP": format!("127.0.0.1:{port}") } }
    }));

    let (status, _, body) = call(app(&test_config(), store), Method::GET, "/api/status/fivem").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["online"], false);
    assert_eq!(body["error"], "No response from server endpoints");
    assert_eq!(body["server"]["address"], format!("127.0.0.1:{port}"));
    assert!(body.get("players").is_none());
}

#[tokio::test]
async fn broken_store_falls_back_to_defaults() {
    let mut config = test_config();
    config.fallback.minecraft_host = "127.0.0.1".into();
    config.fallback.minecraft_port = closed_port().await;

    let (status, _, body) = call(app(&config, BrokenStore), Method::GET, "/api/status/minecraft").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["server"],
        json!({ "host": "127.0.0.1", "port": config.fallback.minecraft_port })
    );
    assert_eq!(body["online"], false);

    let (status, _, body) = call(app(&config, BrokenStore), Method::GET, "/api/status/fivem").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["server"]["address"], "localhost:30120");
}

#[tokio::test]
async fn missing_and_invalid_fields_fall_back_per_field() {
    let mut config = test_config();
    config.fallback.minecraft_port = closed_port().await;
    let store = MemoryStore::new(json!({
        "servers": { "minecraft": { "serverIP": "127.0.0.1", "port": "not a port" } }
    }));

    let (_, _, body) = call(app(&config, store), Method::GET, "/api/status/minecraft").await;
    assert_eq!(body["server"]["host"], "127.0.0.1");
    assert_eq!(body["server"]["port"], config.fallback.minecraft_port);
}

#[tokio::test]
async fn minecraft_target_is_one_store_read() {
    let port = closed_port().await;
    let store = CountingStore {
        inner: MemoryStore::new(json!({
            "servers": { "minecraft": { "serverIP": "127.0.0.1", "port": port } }
        })),
        reads: Arc::new(AtomicUsize::new(0)),
        keys: Arc::new(Mutex::new(Vec::new())),
    };

    let (status, _, body) = call(
        app(&test_config(), store.clone()),
        Method::GET,
        "/api/status/minecraft",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["server"], json!({ "host": "127.0.0.1", "port": port }));
    assert_eq!(store.reads.load(Ordering::SeqCst), 1);
    assert_eq!(*store.keys.lock().unwrap(), vec!["servers.minecraft".to_string()]);
}

#[tokio::test]
async fn wrong_method_is_405() {
    let (status, _, _) = call(
        app(&test_config(), MemoryStore::default()),
        Method::POST,
        "/api/status/minecraft",
    )
    .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _, _) = call(
        app(&test_config(), MemoryStore::default()),
        Method::DELETE,
        "/api/status/fivem",
    )
    .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn handler_panic_is_generic_500() {
    let (status, _, body) = call(
        app(&test_config(), PanickingStore),
        Method::GET,
        "/api/status/fivem",
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Internal server error" }));
}

#[tokio::test]
async fn health_is_ok() {
    let (status, _, body) = call(
        app(&test_config(), MemoryStore::default()),
        Method::GET,
        "/api/health",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}
