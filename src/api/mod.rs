//! HTTP control surface.
//!
//! A blocking `TcpListener` polled from its own thread; every accepted
//! connection is served on a short-lived thread so a long-running MJPEG
//! stream never blocks status readers. One request per connection.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::capture::SessionController;
use crate::error::{SessionError, StreakError};
use crate::session::{SessionConfig, SessionView};
use crate::streak::StreakLedger;

const MAX_REQUEST_BYTES: usize = 8192;
const ACCEPT_POLL: Duration = Duration::from_millis(50);
const STREAM_POLL: Duration = Duration::from_millis(30);
const MJPEG_BOUNDARY: &str = "frame";

/// Paths and the single method each accepts.
const ROUTES: &[(&str, &str)] = &[
    ("/health", "GET"),
    ("/api/status", "GET"),
    ("/api/detections", "GET"),
    ("/api/stream", "GET"),
    ("/api/streak", "GET"),
    ("/api/start", "POST"),
    ("/api/stop", "POST"),
    ("/api/claim", "POST"),
];

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    /// Fills fields a `/api/start` body leaves out.
    pub session_defaults: SessionConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:5001".to_string(),
            session_defaults: SessionConfig::default(),
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

/// State every connection thread works against.
#[derive(Clone)]
struct ApiContext {
    controller: Arc<SessionController>,
    ledger: Arc<Mutex<StreakLedger>>,
    session_defaults: SessionConfig,
    shutdown: Arc<AtomicBool>,
}

pub struct ApiServer {
    cfg: ApiConfig,
    controller: Arc<SessionController>,
    ledger: Arc<Mutex<StreakLedger>>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, controller: Arc<SessionController>) -> Self {
        Self {
            cfg,
            controller,
            ledger: Arc::new(Mutex::new(StreakLedger::new())),
        }
    }

    /// Share an existing ledger instead of starting from an empty one.
    pub fn with_ledger(mut self, ledger: Arc<Mutex<StreakLedger>>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .with_context(|| format!("invalid api address '{}'", self.cfg.addr))?;
        let listener = TcpListener::bind(configured_addr)
            .with_context(|| format!("failed to bind api listener on {}", configured_addr))?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let ctx = ApiContext {
            controller: self.controller,
            ledger: self.ledger,
            session_defaults: self.cfg.session_defaults,
            shutdown: shutdown.clone(),
        };
        let join = std::thread::Builder::new()
            .name("api".to_string())
            .spawn(move || {
                if let Err(err) = run_api(listener, ctx) {
                    log::error!("api server stopped: {:#}", err);
                }
            })
            .context("spawn api thread")?;

        log::info!("api listening on http://{}", addr);
        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(listener: TcpListener, ctx: ApiContext) -> Result<()> {
    loop {
        if ctx.shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                let ctx = ctx.clone();
                let spawned = std::thread::Builder::new()
                    .name("api-conn".to_string())
                    .spawn(move || {
                        if let Err(err) = handle_connection(stream, &ctx) {
                            log::debug!("api connection ended: {:#}", err);
                        }
                    });
                if let Err(err) = spawned {
                    log::warn!("failed to spawn api connection thread: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, ctx: &ApiContext) -> Result<()> {
    stream.set_nonblocking(false)?;
    let peer = stream.peer_addr()?;

    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(RequestError::TooLarge) => {
            write_json(
                &mut stream,
                413,
                &json!({"ok": false, "error": "request too large"}),
            )?;
            discard_pending(&mut stream);
            return Ok(());
        }
        Err(RequestError::Malformed(reason)) => {
            return write_json(&mut stream, 400, &json!({"ok": false, "error": reason}));
        }
        Err(RequestError::Io(err)) => return Err(err.into()),
    };

    if request.method == "OPTIONS" {
        return write_response(&mut stream, 204, "text/plain", &[]);
    }

    let route = ROUTES.iter().find(|(path, _)| *path == request.path);
    match route {
        None => {
            return write_json(&mut stream, 404, &json!({"ok": false, "error": "not found"}));
        }
        Some((_, method)) if *method != request.method => {
            return write_json(
                &mut stream,
                405,
                &json!({"ok": false, "error": "method not allowed"}),
            );
        }
        Some(_) => {}
    }

    log::debug!("{} {} from {}", request.method, request.path, peer);
    match request.path.as_str() {
        "/health" => write_json(&mut stream, 200, &json!({"status": "ok"})),
        "/api/start" => handle_start(&mut stream, &request, ctx),
        "/api/stop" => {
            ctx.controller.stop()?;
            write_json(&mut stream, 200, &json!({"ok": true, "running": false}))
        }
        "/api/status" => {
            let status = StatusResponse::new(ctx.controller.session().snapshot()?, ctx);
            write_json(&mut stream, 200, &status)
        }
        "/api/detections" => {
            let view = ctx.controller.session().snapshot()?;
            write_json(&mut stream, 200, &view.latest_frame)
        }
        "/api/streak" => {
            let ledger = *ctx
                .ledger
                .lock()
                .map_err(|_| anyhow!("streak ledger lock poisoned"))?;
            write_json(&mut stream, 200, &ledger)
        }
        "/api/claim" => handle_claim(&mut stream, &request, ctx),
        "/api/stream" => handle_stream(&mut stream, ctx),
        _ => write_json(&mut stream, 404, &json!({"ok": false, "error": "not found"})),
    }
}

/// `/api/start` body. Accepts both the long and the short field names.
#[derive(Debug, Default, Deserialize)]
struct StartRequest {
    #[serde(alias = "required_sec")]
    required_duration: Option<f64>,
    #[serde(alias = "grace_sec")]
    grace_duration: Option<f64>,
    #[serde(alias = "conf_thres")]
    confidence_floor: Option<f32>,
}

impl StartRequest {
    fn into_config(self, defaults: SessionConfig) -> SessionConfig {
        SessionConfig {
            required_duration: self.required_duration.unwrap_or(defaults.required_duration),
            grace_duration: self.grace_duration.unwrap_or(defaults.grace_duration),
            confidence_floor: self.confidence_floor.unwrap_or(defaults.confidence_floor),
        }
    }
}

fn handle_start(stream: &mut TcpStream, request: &HttpRequest, ctx: &ApiContext) -> Result<()> {
    let body: StartRequest = match request.json_body() {
        Ok(body) => body,
        Err(err) => {
            return write_json(stream, 400, &json!({"ok": false, "error": err.to_string()}));
        }
    };
    let config = body.into_config(ctx.session_defaults);
    match ctx.controller.start(config) {
        Ok(epoch) => write_json(
            stream,
            200,
            &json!({"ok": true, "running": true, "epoch": epoch}),
        ),
        Err(err) => match err.downcast_ref::<SessionError>() {
            Some(session_err @ SessionError::InvalidConfiguration(_)) => {
                log::warn!("rejected session start: {}", session_err);
                write_json(
                    stream,
                    400,
                    &json!({"ok": false, "error": session_err.to_string()}),
                )
            }
            _ => {
                log::error!("session start failed: {:#}", err);
                write_json(stream, 500, &json!({"ok": false, "error": "start failed"}))
            }
        },
    }
}

#[derive(Debug, Default, Deserialize)]
struct ClaimRequest {
    day: Option<i64>,
}

fn handle_claim(stream: &mut TcpStream, request: &HttpRequest, ctx: &ApiContext) -> Result<()> {
    let body: ClaimRequest = match request.json_body() {
        Ok(body) => body,
        Err(err) => {
            return write_json(stream, 400, &json!({"ok": false, "error": err.to_string()}));
        }
    };
    let Some(proof) = ctx.controller.session().proof()? else {
        return write_json(
            stream,
            409,
            &json!({"ok": false, "error": StreakError::NoProof.to_string()}),
        );
    };
    let day = body.day.unwrap_or_else(|| proof.issued_day());

    let mut ledger = ctx
        .ledger
        .lock()
        .map_err(|_| anyhow!("streak ledger lock poisoned"))?;
    match ledger.claim(day) {
        Ok(()) => {
            log::info!(
                "streak claimed for day {} (streak {}, proof {})",
                day,
                ledger.streak,
                proof.digest
            );
            let state = *ledger;
            drop(ledger);
            write_json(
                stream,
                200,
                &json!({"ok": true, "day": day, "ledger": state, "proof": proof}),
            )
        }
        Err(err) => {
            drop(ledger);
            let status = match err {
                StreakError::InvalidDay { .. } => 400,
                StreakError::AlreadyClaimedToday(_) | StreakError::NoProof => 409,
            };
            write_json(stream, status, &json!({"ok": false, "error": err.to_string()}))
        }
    }
}

fn handle_stream(stream: &mut TcpStream, ctx: &ApiContext) -> Result<()> {
    if !ctx.controller.preview_enabled() {
        return write_json(
            stream,
            503,
            &json!({"ok": false, "error": "preview encoding not available"}),
        );
    }
    ctx.controller.resume()?;

    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary={MJPEG_BOUNDARY}\r\n{cors}Cache-Control: no-store\r\nConnection: close\r\n\r\n",
        cors = CORS_HEADERS,
    );
    stream.write_all(header.as_bytes())?;

    let mut last_sent: Option<Arc<Vec<u8>>> = None;
    while !ctx.shutdown.load(Ordering::SeqCst) {
        let latest = ctx.controller.preview().latest();
        let fresh = match (&latest, &last_sent) {
            (Some(jpeg), Some(sent)) => !Arc::ptr_eq(jpeg, sent),
            (Some(_), None) => true,
            _ => false,
        };
        if let (true, Some(jpeg)) = (fresh, latest) {
            let part = format!(
                "--{MJPEG_BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                jpeg.len()
            );
            let written = stream
                .write_all(part.as_bytes())
                .and_then(|_| stream.write_all(&jpeg))
                .and_then(|_| stream.write_all(b"\r\n"))
                .and_then(|_| stream.flush());
            if written.is_err() {
                log::debug!("stream client disconnected");
                break;
            }
            last_sent = Some(jpeg);
        }
        std::thread::sleep(STREAM_POLL);
    }
    Ok(())
}

/// `/api/status` payload: the session view plus the latest perception fields.
#[derive(Debug, Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    view: SessionView,
    candidate: bool,
    confidence: f32,
    preview_available: bool,
    worker_active: bool,
}

impl StatusResponse {
    fn new(view: SessionView, ctx: &ApiContext) -> Self {
        Self {
            candidate: view.latest_frame.candidate,
            confidence: view.latest_frame.confidence,
            preview_available: ctx.controller.preview().latest().is_some(),
            worker_active: ctx.controller.worker_active(),
            view,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum RequestError {
    #[error("request too large")]
    TooLarge,
    #[error("{0}")]
    Malformed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}

impl HttpRequest {
    /// Deserialize the body; an empty body is treated as `{}`.
    fn json_body<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        let body = if self.body.iter().all(|b| b.is_ascii_whitespace()) {
            b"{}".as_slice()
        } else {
            self.body.as_slice()
        };
        serde_json::from_slice(body).map_err(|e| anyhow!("invalid json body: {}", e))
    }
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest, RequestError> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    let header_end = loop {
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(RequestError::Malformed("incomplete request".to_string()));
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(RequestError::TooLarge);
        }
    };

    let text = String::from_utf8_lossy(&data[..header_end]);
    let mut lines = text.split("\r\n");
    let request_line = lines
        .next()
        .ok_or_else(|| RequestError::Malformed("empty request".to_string()))?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| RequestError::Malformed("missing method".to_string()))?;
    let raw_path = parts
        .next()
        .ok_or_else(|| RequestError::Malformed("missing path".to_string()))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| RequestError::Malformed("invalid content-length".to_string()))?,
        None => 0,
    };
    if header_end + content_length > MAX_REQUEST_BYTES {
        return Err(RequestError::TooLarge);
    }
    let mut body = data[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(RequestError::Malformed("truncated body".to_string()));
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        body,
    })
}

/// Swallow unread request bytes so closing the socket does not reset the
/// connection before the client reads our response.
fn discard_pending(stream: &mut TcpStream) {
    let _ = stream.shutdown(std::net::Shutdown::Write);
    let _ = stream.set_read_timeout(Some(Duration::from_millis(200)));
    let mut buf = [0u8; 4096];
    let mut drained = 0usize;
    while drained < 16 * MAX_REQUEST_BYTES {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => drained += n,
        }
    }
}

const CORS_HEADERS: &str = "Access-Control-Allow-Origin: *\r\nAccess-Control-Allow-Methods: GET, POST, OPTIONS\r\nAccess-Control-Allow-Headers: Content-Type\r\n";

fn write_json<T: Serialize + ?Sized>(stream: &mut TcpStream, status: u16, body: &T) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    write_response(stream, status, "application/json", &payload)
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        204 => "HTTP/1.1 204 No Content",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        409 => "HTTP/1.1 409 Conflict",
        413 => "HTTP/1.1 413 Payload Too Large",
        503 => "HTTP/1.1 503 Service Unavailable",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\n{CORS_HEADERS}Cache-Control: no-store\r\nConnection: close\r\n\r\n",
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(())
}
