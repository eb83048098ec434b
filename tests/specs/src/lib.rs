// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process fake helpdesk backend for end-to-end tests.
//!
//! Serves the agent push endpoint, the streaming scrape, index and AI builder
//! endpoints, the link listing and selection endpoints, and the REST chat
//! fallback on an ephemeral port.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{stream, SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use deskwire::connection::{Endpoint, MuxOptions, ReconnectPolicy};
use deskwire::store::{MemoryStore, AUTH_TOKEN, PROJECT_ID, TENANT_ID, USER_NAME};

pub const TOKEN: &str = "tok-e2e";
pub const TENANT: &str = "t1";
pub const PROJECT: &str = "p1";
pub const AGENT: &str = "alice";

/// Something the server pushes to every connected client.
#[derive(Debug, Clone)]
pub enum Push {
    Text(String),
    Close(u16),
}

/// A request the backend recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub path: String,
    pub body: Value,
}

struct BackendState {
    token: String,
    push: broadcast::Sender<Push>,
    connections: AtomicUsize,
    from_clients: Mutex<Vec<Value>>,
    requests: Mutex<Vec<Recorded>>,
    links: Value,
    scrape_frames: Vec<String>,
    index_frames: Vec<String>,
    build_frames: Vec<String>,
}

impl BackendState {
    fn authorized(&self, headers: &HeaderMap) -> bool {
        let expected = format!("Bearer {}", self.token);
        headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) == Some(expected.as_str())
    }

    fn record(&self, path: String, body: Value) {
        self.requests.lock().push(Recorded { path, body });
    }
}

/// Builder for a [`FakeBackend`].
pub struct BackendBuilder {
    links: Value,
    scrape_frames: Vec<String>,
    index_frames: Vec<String>,
    build_frames: Vec<String>,
}

impl Default for BackendBuilder {
    fn default() -> Self {
        Self {
            links: json!({ "links": [] }),
            scrape_frames: Vec::new(),
            index_frames: Vec::new(),
            build_frames: Vec::new(),
        }
    }
}

impl BackendBuilder {
    /// Body served by the discovered-links endpoint.
    pub fn links(mut self, links: Value) -> Self {
        self.links = links;
        self
    }

    /// Frames served by the scrape stream endpoint, as `(event, data)`.
    pub fn scrape(mut self, frames: &[(&str, Value)]) -> Self {
        self.scrape_frames = frames.iter().map(|(e, d)| sse(e, d)).collect();
        self
    }

    /// Frames served by the index stream endpoint, as `(event, data)`.
    pub fn index(mut self, frames: &[(&str, Value)]) -> Self {
        self.index_frames = frames.iter().map(|(e, d)| sse(e, d)).collect();
        self
    }

    /// Frames served by the AI builder endpoint. They carry no `event:` line;
    /// the kind is the payload's `type`.
    pub fn build(mut self, frames: &[Value]) -> Self {
        self.build_frames = frames.iter().map(|d| format!("data: {d}\n\n")).collect();
        self
    }

    pub async fn spawn(self) -> anyhow::Result<FakeBackend> {
        let (push, _) = broadcast::channel(64);
        let state = Arc::new(BackendState {
            token: TOKEN.to_owned(),
            push,
            connections: AtomicUsize::new(0),
            from_clients: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            links: self.links,
            scrape_frames: self.scrape_frames,
            index_frames: self.index_frames,
            build_frames: self.build_frames,
        });

        let knowledge = "/v1/tenants/{tenant}/projects/{project}/knowledge";
        let router = Router::new()
            .route("/v1/tenants/{tenant}/chat/agent/ws", get(ws_handler))
            .route("/v1/chat/sessions/{session}/messages", post(chat_fallback))
            .route(&format!("{knowledge}/scrape/stream"), post(scrape_stream))
            .route(&format!("{knowledge}/scraping-jobs/{{job}}/links"), get(job_links))
            .route(&format!("{knowledge}/scraping-jobs/{{job}}/select-links"), post(select_links))
            .route(&format!("{knowledge}/scraping-jobs/{{job}}/index/stream"), get(index_stream))
            .route("/v1/tenants/{tenant}/projects/{project}/ai/build", get(build_stream))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await;
        });

        Ok(FakeBackend { addr, state, shutdown })
    }
}

/// A running fake backend, stopped on drop.
pub struct FakeBackend {
    addr: SocketAddr,
    state: Arc<BackendState>,
    shutdown: CancellationToken,
}

impl FakeBackend {
    pub fn builder() -> BackendBuilder {
        BackendBuilder::default()
    }

    pub fn api_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/v1", self.addr)
    }

    /// Store holding the credentials this backend accepts.
    pub fn agent_store(&self) -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with([
            (AUTH_TOKEN, TOKEN),
            (TENANT_ID, TENANT),
            (PROJECT_ID, PROJECT),
            (USER_NAME, AGENT),
        ]))
    }

    /// Agent push options with short timers.
    pub fn mux_options(&self, max_attempts: u32) -> MuxOptions {
        MuxOptions {
            endpoint: Endpoint::Agent,
            ws_base: self.ws_url(),
            policy: ReconnectPolicy::new(
                Duration::from_millis(20),
                Duration::from_millis(100),
                max_attempts,
            ),
            ping_interval: Duration::from_secs(30),
            manual_retry_delay: Duration::from_millis(20),
        }
    }

    /// Push-channel connections accepted so far.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn push_json(&self, value: Value) {
        let _ = self.state.push.send(Push::Text(value.to_string()));
    }

    pub fn close_clients(&self, code: u16) {
        let _ = self.state.push.send(Push::Close(code));
    }

    /// JSON commands clients wrote on the push channel, pings excluded.
    pub fn from_clients(&self) -> Vec<Value> {
        self.state.from_clients.lock().clone()
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().clone()
    }

    /// Poll `cond` against the backend until it holds or `timeout` passes.
    pub async fn wait_until(
        &self,
        timeout: Duration,
        cond: impl Fn(&FakeBackend) -> bool,
    ) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        while !cond(self) {
            anyhow::ensure!(tokio::time::Instant::now() < deadline, "condition not met in {timeout:?}");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(())
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Render one event-stream frame.
pub fn sse(event: &str, data: &Value) -> String {
    format!("event: {event}\ndata: {data}\n\n")
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "invalid token" }))).into_response()
}

/// Stream `frames` split mid-frame so clients see partial chunks.
fn event_stream(frames: Vec<String>) -> Response {
    let chunks: Vec<String> = frames
        .into_iter()
        .flat_map(|frame| {
            let mid = frame.len() / 2;
            let (head, tail) =
                if frame.is_char_boundary(mid) { frame.split_at(mid) } else { (frame.as_str(), "") };
            [head.to_owned(), tail.to_owned()]
        })
        .filter(|c| !c.is_empty())
        .collect();
    let body = stream::iter(chunks).then(|chunk| async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok::<_, Infallible>(chunk)
    });
    ([(header::CONTENT_TYPE, "text/event-stream")], Body::from_stream(body)).into_response()
}

// -- Push channel ------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

async fn ws_handler(
    State(state): State<Arc<BackendState>>,
    Path(tenant): Path<String>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if query.token.as_deref() != Some(state.token.as_str()) || tenant != TENANT {
        return unauthorized();
    }
    ws.on_upgrade(move |socket| handle_ws(socket, state)).into_response()
}

async fn handle_ws(socket: WebSocket, state: Arc<BackendState>) {
    let mut push = state.push.subscribe();
    state.connections.fetch_add(1, Ordering::SeqCst);
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            msg = push.recv() => {
                let out = match msg {
                    Ok(Push::Text(text)) => Message::Text(text.into()),
                    Ok(Push::Close(code)) => {
                        let frame = CloseFrame { code, reason: "closed by backend".into() };
                        let _ = ws_tx.send(Message::Close(Some(frame))).await;
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if ws_tx.send(out).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(value) = serde_json::from_str::<Value>(text.as_str()) else {
                            continue;
                        };
                        if value.get("type").and_then(Value::as_str) == Some("ping") {
                            let pong = json!({ "type": "pong" }).to_string();
                            if ws_tx.send(Message::Text(pong.into())).await.is_err() {
                                break;
                            }
                            continue;
                        }
                        state.from_clients.lock().push(value);
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}

// -- REST --------------------------------------------------------------------

async fn chat_fallback(
    State(state): State<Arc<BackendState>>,
    Path(session): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    let reply = json!({ "id": "m-1", "session_id": session, "content": body["content"] });
    state.record(format!("/chat/sessions/{session}/messages"), body);
    (StatusCode::CREATED, Json(reply)).into_response()
}

async fn scrape_stream(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    state.record("/scrape/stream".to_owned(), body);
    event_stream(state.scrape_frames.clone())
}

async fn job_links(
    State(state): State<Arc<BackendState>>,
    Path((_tenant, _project, _job)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    Json(state.links.clone()).into_response()
}

async fn select_links(
    State(state): State<Arc<BackendState>>,
    Path((_tenant, _project, job)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    let count = body["urls"].as_array().map(Vec::len).unwrap_or_default();
    state.record(format!("/scraping-jobs/{job}/select-links"), body);
    Json(json!({
        "selected_count": count,
        "message": format!("{count} links selected"),
        "max_selectable_links": state.links.get("max_selectable_links").cloned().unwrap_or(Value::Null),
    }))
    .into_response()
}

async fn index_stream(
    State(state): State<Arc<BackendState>>,
    Path((_tenant, _project, job)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    state.record(format!("/scraping-jobs/{job}/index/stream"), Value::Null);
    event_stream(state.index_frames.clone())
}

#[derive(Debug, Deserialize)]
struct BuildQuery {
    url: String,
    max_depth: Option<u8>,
}

async fn build_stream(
    State(state): State<Arc<BackendState>>,
    Query(query): Query<BuildQuery>,
    headers: HeaderMap,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    state.record("/ai/build".to_owned(), json!({ "url": query.url, "max_depth": query.max_depth }));
    event_stream(state.build_frames.clone())
}
