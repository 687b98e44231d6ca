//! HTTP + WebSocket front end.
//!
//! A deliberately small HTTP/1.1 server on a raw `TcpListener`: one request per
//! connection, JSON in and out, `Connection: close`. A request carrying
//! `Upgrade: websocket` for `/ws` is handed to `tokio-tungstenite` and then
//! receives every [`SinkEvent`] as a JSON text frame.

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::detection::DetectionConfigPatch;
use crate::error::{MonitorError, Result};
use crate::generator::{self, DEFAULT_GENERATE_COUNT};
use crate::ingest::{BroadcastSink, EngineHandle, SinkEvent};
use crate::telemetry::TelemetryEntry;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Request bodies above this size are answered with 413.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;
/// Request line plus headers.
pub const MAX_HEAD_BYTES: usize = 16 * 1024;
/// Upper bound for `POST /api/test/generate`.
pub const MAX_GENERATE_COUNT: usize = 10_000;

const MAX_HEADERS: usize = 64;
const READ_CHUNK: usize = 8 * 1024;
const API_VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// What every connection needs: the engine and the event feed for `/ws`.
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub sink: BroadcastSink,
}

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    /// Path without the query string.
    pub path: String,
    pub body: Vec<u8>,
}

/// Result of reading one request off a connection.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Request(Request),
    /// `Content-Length` exceeded [`MAX_BODY_BYTES`]; the body was not read.
    TooLarge,
    /// The peer closed the connection before sending anything.
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn error(status: u16, error: &str) -> Self {
        Self { status, body: json!({ "error": error }) }
    }

    pub fn error_with_details(status: u16, error: &str, details: impl std::fmt::Display) -> Self {
        Self { status, body: json!({ "error": error, "details": details.to_string() }) }
    }

    /// Full HTTP/1.1 response bytes.
    pub fn to_http(&self) -> Vec<u8> {
        let body = self.body.to_string();
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nAccess-Control-Allow-Origin: *\r\nConnection: close\r\n\r\n{}",
            self.status,
            reason_phrase(self.status),
            body.len(),
            body,
        )
        .into_bytes()
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

struct Head {
    method: String,
    path: String,
    content_length: usize,
    len: usize,
}

fn parse_head(buf: &[u8]) -> Result<Option<Head>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    let status = req.parse(buf).map_err(|e| MonitorError::Http(e.to_string()))?;

    let httparse::Status::Complete(len) = status else {
        return Ok(None);
    };

    let method = req.method.unwrap_or_default().to_string();
    let target = req.path.unwrap_or("/");
    let path = target.split('?').next().unwrap_or(target).to_string();

    let content_length = match req
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("content-length"))
    {
        Some(h) => std::str::from_utf8(h.value)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .ok_or_else(|| MonitorError::Http("invalid Content-Length".to_string()))?,
        None => 0,
    };

    Ok(Some(Head { method, path, content_length, len }))
}

/// Read one request (head and body) from `stream`.
pub async fn read_request<S>(stream: &mut S) -> Result<ReadOutcome>
where
    S: AsyncRead + Unpin,
{
    let mut buf: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    let head = loop {
        if let Some(head) = parse_head(&buf)? {
            break head;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(MonitorError::Http("request head too large".to_string()));
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(ReadOutcome::Closed);
            }
            return Err(MonitorError::Http("connection closed mid-request".to_string()));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    if head.content_length > MAX_BODY_BYTES {
        return Ok(ReadOutcome::TooLarge);
    }

    let wanted = head.len + head.content_length;
    while buf.len() < wanted {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(MonitorError::Http("connection closed mid-body".to_string()));
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Ok(ReadOutcome::Request(Request {
        method: head.method,
        path: head.path,
        body: buf[head.len..wanted].to_vec(),
    }))
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct GenerateRequest {
    count: Option<usize>,
}

fn engine_error(e: MonitorError) -> Response {
    warn!(error = %e, "engine unavailable");
    Response::error_with_details(503, "Engine unavailable", e)
}

fn api_listing() -> Value {
    json!({
        "version": API_VERSION,
        "endpoints": [
            { "path": "/health", "method": "GET", "description": "Health check endpoint" },
            { "path": "/api", "method": "GET", "description": "API documentation" },
            { "path": "/api/logs", "method": "POST", "description": "Submit CMCD logs for analysis" },
            { "path": "/api/config", "method": "GET", "description": "Get current anomaly detection configuration" },
            { "path": "/api/config", "method": "PUT", "description": "Update anomaly detection configuration" },
            { "path": "/api/test/generate", "method": "POST", "description": "Generate test data" },
            { "path": "/api/evaluate", "method": "POST", "description": "Evaluate the rolling window now" },
            { "path": "/api/stats", "method": "GET", "description": "Engine counters" },
            { "path": "/ws", "method": "GET", "description": "WebSocket feed of anomalies and active sessions" },
        ]
    })
}

/// Decode one entry or an array of entries. All or nothing.
pub fn decode_entries(body: &[u8]) -> Result<Vec<TelemetryEntry>> {
    let value: Value = serde_json::from_slice(body)?;
    let entries = match value {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<TelemetryEntry>, _>>()?,
        single => vec![serde_json::from_value(single)?],
    };
    Ok(entries)
}

async fn submit_all(state: &AppState, entries: Vec<TelemetryEntry>) -> Result<usize> {
    let n = entries.len();
    for entry in entries {
        state.engine.submit(entry).await?;
    }
    Ok(n)
}

async fn post_logs(state: &AppState, body: &[u8]) -> Response {
    let entries = match decode_entries(body) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "rejected log submission");
            return Response::error_with_details(400, "Invalid log format", e);
        }
    };
    match submit_all(state, entries).await {
        Ok(n) => {
            info!(processed = n, "processed log entries");
            Response::ok(json!({ "status": "ok", "processed": n }))
        }
        Err(e) => engine_error(e),
    }
}

async fn put_config(state: &AppState, body: &[u8]) -> Response {
    let patch: DetectionConfigPatch = match serde_json::from_slice(body) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "rejected configuration update");
            return Response::error_with_details(400, "Invalid configuration", e);
        }
    };
    match state.engine.update_config(patch).await {
        Ok(config) => Response::ok(json!({
            "status": "ok",
            "message": "Configuration updated",
            "config": &*config,
        })),
        Err(e) => engine_error(e),
    }
}

async fn post_generate(state: &AppState, body: &[u8]) -> Response {
    let request: GenerateRequest = if body.iter().all(u8::is_ascii_whitespace) {
        GenerateRequest::default()
    } else {
        match serde_json::from_slice(body) {
            Ok(r) => r,
            Err(e) => return Response::error_with_details(400, "Invalid generate request", e),
        }
    };
    let count = request
        .count
        .filter(|&c| c > 0)
        .unwrap_or(DEFAULT_GENERATE_COUNT)
        .min(MAX_GENERATE_COUNT);

    let entries = {
        let mut rng = rand::thread_rng();
        generator::generate(&mut rng, count)
    };
    match submit_all(state, entries).await {
        Ok(n) => {
            info!(generated = n, "generated test log entries");
            Response::ok(json!({
                "status": "ok",
                "generated": n,
                "message": format!("Generated {n} test log entries"),
            }))
        }
        Err(e) => engine_error(e),
    }
}

/// Dispatch one request. Never fails; every outcome is a [`Response`].
pub async fn route(state: &AppState, request: &Request) -> Response {
    debug!(method = %request.method, path = %request.path, "request");

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => Response::ok(json!({ "status": "ok" })),
        ("GET", "/api") => Response::ok(api_listing()),
        ("POST", "/api/logs") => post_logs(state, &request.body).await,
        ("GET", "/api/config") => match state.engine.config().await {
            Ok(config) => Response::ok(json!(&*config)),
            Err(e) => engine_error(e),
        },
        ("PUT", "/api/config") => put_config(state, &request.body).await,
        ("POST", "/api/test/generate") => post_generate(state, &request.body).await,
        ("POST", "/api/evaluate") => match state.engine.evaluate_now().await {
            Ok(anomalies) => Response::ok(json!({ "status": "ok", "anomalies": anomalies })),
            Err(e) => engine_error(e),
        },
        ("GET", "/api/stats") => match state.engine.stats().await {
            Ok(stats) => Response::ok(json!(stats)),
            Err(e) => engine_error(e),
        },
        _ => Response::error(404, "Not found"),
    }
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// If `head` is a WebSocket upgrade, return its request path.
pub fn websocket_path(head: &str) -> Option<&str> {
    let is_upgrade = head.lines().any(|line| {
        let mut parts = line.splitn(2, ':');
        let name = parts.next().unwrap_or("").trim();
        let value = parts.next().unwrap_or("").trim();
        name.eq_ignore_ascii_case("upgrade") && value.eq_ignore_ascii_case("websocket")
    });
    if !is_upgrade {
        return None;
    }
    head.lines().next()?.split_whitespace().nth(1)
}

async fn handle_ws(
    ws_stream: tokio_tungstenite::WebSocketStream<TcpStream>,
    mut events: broadcast::Receiver<SinkEvent>,
) {
    let (mut ws_sink, mut ws_source) = ws_stream.split();
    info!("websocket client connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else { continue };
                    if ws_sink.send(WsMessage::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket client lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            msg = ws_source.next() => match msg {
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    info!("websocket client disconnected");
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

async fn handle_connection(mut stream: TcpStream, state: AppState) -> Result<()> {
    // Peek at the first bytes to detect WebSocket upgrade requests.
    let mut peek_buf = [0u8; 1024];
    let peek_n = stream.peek(&mut peek_buf).await?;
    let peek_str = String::from_utf8_lossy(&peek_buf[..peek_n]);

    if let Some(path) = websocket_path(&peek_str) {
        if path == "/ws" {
            let events = state.sink.subscribe();
            match tokio_tungstenite::accept_async(stream).await {
                Ok(ws_stream) => handle_ws(ws_stream, events).await,
                Err(e) => warn!(error = %e, "websocket handshake failed"),
            }
            return Ok(());
        }
    }

    let response = match read_request(&mut stream).await? {
        ReadOutcome::Request(request) => route(&state, &request).await,
        ReadOutcome::TooLarge => {
            warn!(limit = MAX_BODY_BYTES, "rejected oversized request body");
            Response::error(413, "Payload too large")
        }
        ReadOutcome::Closed => return Ok(()),
    };
    stream.write_all(&response.to_http()).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Accept connections forever.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "HTTP / WebSocket server listening");
    }
    loop {
        let (stream, peer) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state).await {
                debug!(%peer, error = %e, "connection error");
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
