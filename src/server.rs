use std::{any::Any, sync::Arc};

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Map, Value};
use time::{format_description::well_known, OffsetDateTime};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::{debug, info, warn};

use crate::{
    config::{Config, FallbackConfig, ProbeConfig},
    fivem::FivemProber,
    minecraft,
    store::{self, ContentStore},
    types::{FivemQuery, FivemTarget, MinecraftQuery, MinecraftTarget, StatusEnvelope},
};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn ContentStore>,
    fivem: FivemProber,
    probe: ProbeConfig,
    fallback: FallbackConfig,
}

impl AppState {
    pub fn new(config: &Config, store: Arc<dyn ContentStore>) -> Self {
        let fivem = FivemProber::new()
            .with_directory_url(config.probe.fivem_directory_url.clone())
            .with_default_max_players(config.probe.fivem_default_max_players);
        Self {
            inner: Arc::new(Inner {
                store,
                fivem,
                probe: config.probe.clone(),
                fallback: config.fallback.clone(),
            }),
        }
    }

    /// Host and port from a single content store read, falling back per field.
    pub async fn minecraft_target(&self) -> MinecraftTarget {
        let fallback = &self.inner.fallback;
        let section = self
            .setting(store::MINECRAFT_KEY, |v| v.as_object().cloned())
            .await
            .unwrap_or_default();
        let host = section_field(&section, store::MINECRAFT_HOST_FIELD, store::as_text)
            .unwrap_or_else(|| fallback.minecraft_host.clone());
        let port = section_field(&section, store::MINECRAFT_PORT_FIELD, store::as_port)
            .unwrap_or(fallback.minecraft_port);
        MinecraftTarget { host, port }
    }

    pub async fn fivem_target(&self) -> FivemTarget {
        let address = self
            .setting(store::FIVEM_ADDRESS_KEY, store::as_text)
            .await
            .unwrap_or_else(|| self.inner.fallback.fivem_address.clone());
        FivemTarget { address }
    }

    // A broken or incomplete store never fails the request.
    async fn setting<T>(&self, key: &str, convert: fn(&Value) -> Option<T>) -> Option<T> {
        match self.inner.store.get(key).await {
            Ok(Some(value)) => {
                let parsed = convert(&value);
                if parsed.is_none() {
                    warn!(key, %value, "invalid value in content store, using fallback");
                }
                parsed
            }
            Ok(None) => {
                debug!(key, "not set in content store, using fallback");
                None
            }
            Err(err) => {
                warn!(key, error = %format!("{err:#}"), "content store unavailable, using fallback");
                None
            }
        }
    }
}

fn section_field<T>(
    section: &Map<String, Value>,
    field: &str,
    convert: fn(&Value) -> Option<T>,
) -> Option<T> {
    let value = section.get(field).filter(|v| !v.is_null())?;
    let parsed = convert(value);
    if parsed.is_none() {
        warn!(field, %value, "invalid value in content store, using fallback");
    }
    parsed
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(get_health))
        .route("/status/minecraft", get(get_minecraft_status))
        .route("/status/fivem", get(get_fivem_status))
        .with_state(state);

    Router::new().nest("/api", api).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(SetResponseHeaderLayer::overriding(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-store"),
            ))
            .layer(CatchPanicLayer::custom(panic_response)),
    )
}

/// Serve the API on `bind` until `shutdown` is cancelled.
pub async fn spawn_server(bind: &str, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Serving status API on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

async fn get_health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

async fn get_minecraft_status(State(app): State<AppState>) -> impl IntoResponse {
    let target = app.minecraft_target().await;
    let probe = &app.inner.probe;
    let query = MinecraftQuery::new(target.host.clone(), target.port)
        .with_timeout(probe.timeout())
        .with_protocol_version(probe.minecraft_protocol_version);

    let status = minecraft::probe(&query).await;
    debug!(host = %target.host, port = target.port, online = status.is_online(), "minecraft status");

    let envelope = StatusEnvelope {
        timestamp: now_rfc3339(),
        server: target,
        status,
    };
    (StatusCode::OK, Json(envelope))
}

async fn get_fivem_status(State(app): State<AppState>) -> impl IntoResponse {
    let target = app.fivem_target().await;
    let query = FivemQuery::new(target.address.clone()).with_timeout(app.inner.probe.timeout());

    let status = app.inner.fivem.probe(&query).await;
    debug!(address = %target.address, online = status.is_online(), "fivem status");

    let envelope = StatusEnvelope {
        timestamp: now_rfc3339(),
        server: target,
        status,
    };
    (StatusCode::OK, Json(envelope))
}

fn panic_response(_err: Box<dyn Any + Send + 'static>) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error" })),
    )
        .into_response()
}

pub fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
