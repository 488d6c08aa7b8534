//! Development HTTP server.
//!
//! Serves the output tree through the route table, answering from the
//! orchestrator's output cache first and the disk second, and hosts the HMR
//! websocket. Handlers never wait on a build: they serve whatever last
//! succeeded.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use kiln_graph::ModuleId;
use kiln_pipeline::{content_type_for, hot_update_script};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};

use crate::dev::hmr::channel::warn_session_error;
use crate::dev::hmr::{ClientMessage, HmrChannel};
use crate::dev::job::StatusEvent;
use crate::dev::orchestrator::Orchestrator;
use crate::dev::routes::{Resolution, RouteTable};
use crate::error::{CliError, Result};

pub const HMR_ENDPOINT: &str = "/__kiln/hmr";
pub const CLIENT_SCRIPT_PATH: &str = "/__kiln/hmr-client.js";
pub const CLIENT_SCRIPT_TAG: &str = r#"<script src="/__kiln/hmr-client.js"></script>"#;

const CLIENT_SCRIPT: &str = include_str!("../../assets/dev/hmr-client.js");

#[derive(Clone)]
struct ServerState {
    orchestrator: Orchestrator,
    routes: Arc<RouteTable>,
}

impl ServerState {
    fn hmr(&self) -> Option<&HmrChannel> {
        self.orchestrator.hmr()
    }
}

/// Development server.
pub struct DevServer {
    hostname: String,
    port: u16,
    state: ServerState,
}

impl DevServer {
    pub fn new(hostname: impl Into<String>, port: u16, routes: RouteTable, orchestrator: Orchestrator) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            state: ServerState {
                orchestrator,
                routes: Arc::new(routes),
            },
        }
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = format!("{}:{}", self.hostname, self.port);
        let listener = TcpListener::bind((self.hostname.as_str(), self.port))
            .await
            .map_err(|e| {
                CliError::Server(format!(
                    "failed to bind {addr}: {e}\n\nHint: Is another server using port {}? Pass --port to pick another",
                    self.port
                ))
            })?;
        info!(%addr, "dev server listening");
        Ok(listener)
    }

    /// Serve on an already bound listener.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| CliError::Server(e.to_string()))
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(HMR_ENDPOINT, get(handle_hmr_socket))
            .route(CLIENT_SCRIPT_PATH, get(handle_client_script))
            .route("/__kiln/hmr/module", get(handle_hot_module))
            .route("/__kiln/status", get(handle_status))
            .fallback(handle_request)
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(self.state.clone())
    }
}

fn respond(content_type: &'static str, body: impl Into<Body>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body.into(),
    )
        .into_response()
}

fn not_found(path: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!("Not found: {path}"),
    )
        .into_response()
}

async fn handle_hmr_socket(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    let Some(channel) = state.hmr().cloned() else {
        return not_found(HMR_ENDPOINT);
    };
    ws.on_upgrade(move |socket| hmr_session(socket, channel))
}

async fn hmr_session(mut socket: WebSocket, channel: HmrChannel) {
    let (id, mut outgoing) = channel.connect();

    loop {
        tokio::select! {
            message = outgoing.recv() => {
                let Some(message) = message else { break };
                if socket.send(Message::Text(message.to_json().into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let result = ClientMessage::parse(text.as_str())
                            .and_then(|ClientMessage::Ack { revision }| channel.ack(id, revision));
                        if let Err(err) = result {
                            warn_session_error(id, &err);
                            let _ = socket.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    channel.disconnect(id);
}

async fn handle_client_script() -> Response {
    respond("text/javascript; charset=utf-8", CLIENT_SCRIPT)
}

#[derive(Deserialize)]
struct ModuleQuery {
    id: String,
}

async fn handle_hot_module(State(state): State<ServerState>, Query(query): Query<ModuleQuery>) -> Response {
    let code = state.hmr().and_then(|channel| channel.module_code(&query.id));
    match code {
        Some(code) => respond(
            "text/javascript; charset=utf-8",
            hot_update_script(&ModuleId::new(query.id), &code),
        ),
        None => not_found(&query.id),
    }
}

#[derive(Serialize)]
struct StatusReport {
    pipelines: Vec<StatusEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    revision: Option<u64>,
}

async fn handle_status(State(state): State<ServerState>) -> Json<StatusReport> {
    Json(StatusReport {
        pipelines: state.orchestrator.jobs().iter().map(|job| job.event()).collect(),
        revision: state.hmr().map(HmrChannel::revision),
    })
}

async fn handle_request(State(state): State<ServerState>, uri: Uri) -> Response {
    let path = uri.path();
    let file = match state.routes.resolve(path) {
        Resolution::Asset(file) | Resolution::Route(file) => file,
        Resolution::NotFound => return not_found(path),
    };

    match load(&state, &file).await {
        Some((contents, content_type)) => {
            let contents = if state.hmr().is_some() && content_type.starts_with("text/html") {
                inject_client_script(&contents)
            } else {
                contents
            };
            respond(content_type, contents)
        }
        None => not_found(path),
    }
}

/// Last successful artifact for `file`, else the file on disk.
async fn load(state: &ServerState, file: &Path) -> Option<(Vec<u8>, &'static str)> {
    if let Some(cached) = state.orchestrator.cached_file(file) {
        return Some((cached.contents.to_vec(), cached.content_type));
    }

    match tokio::fs::read(file).await {
        Ok(contents) => Some((contents, content_type_for(file))),
        Err(err) => {
            debug!(path = %file.display(), error = %err, "not served");
            None
        }
    }
}

/// Add the HMR client script before `</body>`, or at the end.
pub fn inject_client_script(html: &[u8]) -> Vec<u8> {
    let html = String::from_utf8_lossy(html);
    if html.contains(CLIENT_SCRIPT_TAG) {
        return html.into_owned().into_bytes();
    }

    let mut result = String::with_capacity(html.len() + CLIENT_SCRIPT_TAG.len() + 4);
    match html.rfind("</body>") {
        Some(pos) => {
            result.push_str(&html[..pos]);
            result.push_str(CLIENT_SCRIPT_TAG);
            result.push('\n');
            result.push_str(&html[pos..]);
        }
        None => {
            result.push_str(&html);
            result.push('\n');
            result.push_str(CLIENT_SCRIPT_TAG);
        }
    }
    result.into_bytes()
}
