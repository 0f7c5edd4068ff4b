//! Router assembly and server lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use vox_broker::{BrokerConnector, GatewayConfig};
use vox_settings::{SessionSettings, VoxSettings};

use crate::audio::AudioStore;
use crate::auth::{AuthError, TriggerAuth};
use crate::dispatch::{self, RetryPolicy};
use crate::hub::{Hub, HubHandle};
use crate::lookup::ProfileLookup;
use crate::ws;

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub connector: Arc<dyn BrokerConnector>,
    pub gateway_config: GatewayConfig,
    pub session_settings: SessionSettings,
    pub auth: Arc<TriggerAuth>,
    pub retry: RetryPolicy,
    pub profiles: Arc<dyn ProfileLookup>,
    pub audio: Arc<dyn AudioStore>,
    pub metrics_handle: PrometheusHandle,
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("bind failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/{channel}", get(ws::ws_handler))
        .route("/tts/{channel}", post(dispatch::trigger_handler))
        .route("/play/{audio_id}", get(play_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Create and start the server. Returns a handle that keeps the background
/// tasks alive.
pub async fn start(
    settings: &VoxSettings,
    connector: Arc<dyn BrokerConnector>,
    profiles: Arc<dyn ProfileLookup>,
    audio: Arc<dyn AudioStore>,
    metrics_handle: PrometheusHandle,
) -> Result<ServerHandle, ServerError> {
    let auth = Arc::new(TriggerAuth::from_base64_secret(&settings.auth.jwt_secret)?);
    let (hub, hub_task) = Hub::spawn();

    let gateway_config = GatewayConfig {
        routing_key: settings.broker.routing_key.clone(),
        request_expiration_ms: settings.broker.request_expiration_ms,
        call_timeout: Duration::from_secs(settings.broker.call_timeout_secs),
        playback_base_url: settings.server.public_url.clone(),
    };

    let state = AppState {
        hub,
        connector,
        gateway_config,
        session_settings: settings.session.clone(),
        auth,
        retry: RetryPolicy::from_settings(&settings.dispatch),
        profiles,
        audio,
        metrics_handle,
    };

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&settings.server.bind).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "vox server started");

    let server_task = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        addr,
        _server: server_task,
        _hub: hub_task,
    })
}

/// Handle returned by [`start`] — keeps background tasks alive.
pub struct ServerHandle {
    pub addr: SocketAddr,
    _server: tokio::task::JoinHandle<()>,
    _hub: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

/// `GET /health` — liveness only; hub state is in-memory and needs no probe.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({"status": "healthy"}))
}

/// `GET /metrics` — Prometheus text exposition.
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics_handle)
}

/// `GET /play/{audio_id}` — serve synthesized audio bytes.
async fn play_handler(State(state): State<AppState>, Path(audio_id): Path<String>) -> Response {
    match state.audio.fetch(&audio_id).await {
        Some(bytes) => ([(header::CONTENT_TYPE, "audio/wav")], bytes).into_response(),
        None => {
            debug!(audio_id, "audio not found");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}
