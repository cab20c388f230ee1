//! HTTP surface and connection upgrader
//!
//! Three plain HTTP endpoints (`/pair`, `/health`, `/`) plus the
//! `/connect` WebSocket upgrade. Credential failures never complete the
//! upgrade and leave registry state untouched.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router, ServiceExt};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower::Layer;
use tower_http::normalize_path::NormalizePathLayer;
use tracing::{debug, info};

use crate::protocol::{self, Role};
use crate::relay::{connection, reaper};
use crate::session::registry::SessionRegistry;
use crate::session::Session;
use crate::{Config, Result};

/// Shared state handed to every handler and background sweep.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub config: Arc<Config>,
    started_at: Instant,
    conn_ids: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            config: Arc::new(config),
            started_at: Instant::now(),
            conn_ids: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub(crate) fn next_conn_id(&self) -> u64 {
        self.conn_ids.fetch_add(1, Ordering::Relaxed)
    }
}

/// Build the relay router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/pair", get(mint_pair))
        .route("/health", get(health))
        .route("/connect", get(connect))
        .fallback(not_found)
        .with_state(state)
}

/// Bind the configured port and serve until `shutdown` resolves.
pub async fn serve(config: Config, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(port = config.port, "relay listening");
    serve_on(listener, config, shutdown).await
}

/// Serve on an already-bound listener (lets tests use an ephemeral port).
pub async fn serve_on(
    listener: TcpListener,
    config: Config,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let state = AppState::new(config);
    reaper::spawn_heartbeat(state.clone());
    reaper::spawn_cleanup(state.clone());

    let app = NormalizePathLayer::trim_trailing_slash().layer(router(state));
    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn index() -> &'static str {
    "ClipSync relay running"
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({"ok": true, "uptime": state.uptime_secs()}))
}

/// `GET /pair` — mint a pair identifier and one-time token, seed an
/// empty session and arm its mint TTL.
async fn mint_pair(State(state): State<AppState>) -> impl IntoResponse {
    let credentials = loop {
        let candidate = protocol::mint();
        if !state.registry.contains(&candidate.pair_id).await {
            break candidate;
        }
    };

    state
        .registry
        .insert(Session::new(
            credentials.pair_id.clone(),
            credentials.token.clone(),
        ))
        .await;
    reaper::spawn_mint_ttl(state.clone(), credentials.pair_id.clone());
    info!(pair_id = %credentials.pair_id, "minted pair");

    (
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        Json(credentials),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectParams {
    pair_id: Option<String>,
    token: Option<String>,
    #[serde(rename = "type")]
    role: Option<String>,
    device_name: Option<String>,
}

/// `GET /connect?pairId=..&token=..&type=..&deviceName=..` — WebSocket
/// upgrade. Anything short of matching credentials and a valid role is
/// answered without an upgrade.
async fn connect(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let (Some(pair_id), Some(token), Some(role)) = (params.pair_id, params.token, params.role)
    else {
        debug!("upgrade rejected: missing parameters");
        return StatusCode::BAD_REQUEST.into_response();
    };
    let Ok(role) = role.parse::<Role>() else {
        debug!("upgrade rejected: invalid role");
        return StatusCode::BAD_REQUEST.into_response();
    };
    let Some(session) = state.registry.get(&pair_id).await else {
        debug!(%pair_id, "upgrade rejected: unknown pair");
        return StatusCode::FORBIDDEN.into_response();
    };
    if session.lock().await.token != token {
        debug!(%pair_id, "upgrade rejected: token mismatch");
        return StatusCode::FORBIDDEN.into_response();
    }

    let device_name = params.device_name.unwrap_or_else(|| "Unknown".to_string());
    ws.on_upgrade(move |socket| {
        connection::run_connection(socket, state, pair_id, role, device_name)
    })
}
