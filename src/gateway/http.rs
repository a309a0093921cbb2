//! Thin HTTP/JSON front end over the [`Gateway`].
//!
//! Serves:
//! - `GET  /api/status`          `{ "status": "ok", ... }`
//! - `GET  /api/tools`           `[{ "name", "description" }]`
//! - `POST /api/tools/:name`     body: JSON object of keyword arguments;
//!   returns `{ "result": ... }` or `{ "error": ErrorBody }`
//! - `GET  /api/prompts`         prompt catalogue
//! - `GET  /api/prompts/:name`   one prompt

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::{auth, Gateway, GatewayError};
use crate::error::{ErrorBody, OpError};
use crate::exec::ExecError;

/// Shared state injected into axum handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) gateway: Arc<Gateway>,
    pub(crate) api_token: Option<String>,
    pub(crate) started: Instant,
}

/// Handle returned by [`start_http`].
pub struct HttpServer {
    /// The address the server is actually listening on.
    pub addr: SocketAddr,
    /// Server task handle.
    pub handle: JoinHandle<()>,
}

/// Build the router without binding a socket.
pub fn router(gateway: Arc<Gateway>, api_token: Option<String>) -> Router {
    let state = AppState {
        gateway,
        api_token,
        started: Instant::now(),
    };

    let api = Router::new()
        .route("/status", get(status_handler))
        .route("/tools", get(list_tools))
        .route("/tools/:name", post(invoke_tool))
        .route("/prompts", get(list_prompts))
        .route("/prompts/:name", get(get_prompt))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_middleware));

    Router::new()
        .nest("/api", api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind `addr` and serve until `shutdown` is cancelled.
pub async fn start_http(
    addr: SocketAddr,
    gateway: Arc<Gateway>,
    api_token: Option<String>,
    shutdown: CancellationToken,
) -> std::io::Result<HttpServer> {
    if api_token.is_some() {
        info!("API authentication enabled");
    } else {
        warn!("API authentication disabled (gateway.api_token not set)");
    }

    let app = router(gateway, api_token);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = served {
            error!("http server error: {e}");
        }
    });

    info!(%bound_addr, "http front end started");
    Ok(HttpServer {
        addr: bound_addr,
        handle,
    })
}

// ── Handlers ────────────────────────────────────────────────

/// `GET /api/status`
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started.elapsed().as_secs(),
        "operations": state.gateway.len(),
    }))
}

/// `GET /api/tools`
async fn list_tools(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.gateway.operations())
}

/// `POST /api/tools/:name`
async fn invoke_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    let args = match parse_args(&body) {
        Ok(args) => args,
        Err(message) => {
            let body = ErrorBody::new("InvalidArgument", message);
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": body }))).into_response();
        }
    };

    match state.gateway.invoke(&name, args).await {
        Ok(result) => Json(json!({ "result": result })).into_response(),
        Err(e) => (status_for(&e), Json(json!({ "error": e.to_body() }))).into_response(),
    }
}

/// Keyword arguments from a request body.  Only an empty body (or JSON
/// `null`) means "no arguments"; anything unparseable is rejected.
fn parse_args(body: &[u8]) -> Result<serde_json::Map<String, Value>, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::Map::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Null) => Ok(serde_json::Map::new()),
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("request body must be a JSON object of arguments".into()),
        Err(e) => Err(format!("request body is not valid JSON: {e}")),
    }
}

/// `GET /api/prompts`
async fn list_prompts(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.gateway.prompts().cloned().collect::<Vec<_>>())
}

/// `GET /api/prompts/:name`
async fn get_prompt(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.gateway.prompt(&name) {
        Some(p) => Json(p.clone()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": ErrorBody::new("UnknownPrompt", format!("unknown prompt `{name}`")) })),
        )
            .into_response(),
    }
}

fn status_for(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::UnknownOperation(_) => StatusCode::NOT_FOUND,
        GatewayError::Operation { source, .. } => match source {
            OpError::MissingArgument(_) | OpError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
            OpError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            OpError::Exec(ExecError::CommandFailed { .. }) => StatusCode::BAD_GATEWAY,
            OpError::Exec(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}
