//! Loopback control API.
//!
//! A minimal HTTP/1.1 server on its own thread. One request per connection; the
//! accept loop is non-blocking so `ApiHandle::stop()` is honored promptly.

use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_json::json;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::session::{DetectionSession, SessionError, SessionState};
use crate::sink::LatestFrameSink;
use crate::stats::StatsSnapshot;

const MAX_REQUEST_BYTES: usize = 8192;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:5000".to_string(),
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

pub struct ApiServer {
    cfg: ApiConfig,
    session: Arc<DetectionSession>,
    latest: Arc<LatestFrameSink>,
}

impl ApiServer {
    pub fn new(
        cfg: ApiConfig,
        session: Arc<DetectionSession>,
        latest: Arc<LatestFrameSink>,
    ) -> Self {
        Self {
            cfg,
            session,
            latest,
        }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let routes = Routes {
            session: self.session,
            latest: self.latest,
        };
        let join = std::thread::Builder::new()
            .name("firewatch-api".to_string())
            .spawn(move || {
                if let Err(err) = run_api(listener, &routes, shutdown_thread) {
                    log::error!("ControlApi: stopped: {}", err);
                }
            })?;

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

struct Routes {
    session: Arc<DetectionSession>,
    latest: Arc<LatestFrameSink>,
}

#[derive(Serialize)]
struct StatsResponse {
    state: SessionState,
    #[serde(flatten)]
    stats: StatsSnapshot,
}

fn run_api(listener: TcpListener, routes: &Routes, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, routes) {
                    log::warn!("ControlApi: request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, routes: &Routes) -> Result<()> {
    // Accepted sockets may inherit non-blocking mode from the listener.
    stream.set_nonblocking(false)?;
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        write_json_response(&mut stream, 403, &json!({"error": "forbidden"}))?;
        return Ok(());
    }

    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            write_json_response(&mut stream, 400, &json!({"error": "bad_request"}))?;
            return Err(err);
        }
    };

    let expected_method = match request.path.as_str() {
        "/api/start_detection" | "/api/stop_detection" => "POST",
        "/api/stats" | "/api/latest_frame" | "/health" => "GET",
        _ => {
            write_json_response(&mut stream, 404, &json!({"error": "not_found"}))?;
            return Ok(());
        }
    };
    if request.method != expected_method {
        write_json_response(&mut stream, 405, &json!({"error": "method_not_allowed"}))?;
        return Ok(());
    }

    match request.path.as_str() {
        "/api/start_detection" => {
            let body = match routes.session.start() {
                Ok(()) => json!({"status": "success", "message": "Detection started"}),
                Err(SessionError::AlreadyActive) => {
                    json!({"status": "error", "message": "Detection already active"})
                }
                Err(SessionError::SourceUnavailable(err)) => json!({
                    "status": "error",
                    "message": format!("Could not access camera: {:#}", err),
                }),
                Err(err @ SessionError::WorkerSpawn(_)) => {
                    log::error!("ControlApi: start failed: {}", err);
                    json!({"status": "error", "message": err.to_string()})
                }
            };
            write_json_response(&mut stream, 200, &body)
        }
        "/api/stop_detection" => match routes.session.stop() {
            Ok(()) => write_json_response(
                &mut stream,
                200,
                &json!({"status": "success", "message": "Detection stopped"}),
            ),
            Err(err) => {
                write_json_response(
                    &mut stream,
                    500,
                    &json!({"status": "error", "message": err.to_string()}),
                )?;
                Err(err)
            }
        },
        "/api/stats" => {
            let body = StatsResponse {
                state: routes.session.state(),
                stats: routes.session.stats(),
            };
            let payload = serde_json::to_vec(&body)?;
            write_response(&mut stream, 200, "application/json", &payload)
        }
        "/api/latest_frame" => match routes.latest.latest() {
            Some(report) if !report.annotated_image.is_empty() => {
                write_response(&mut stream, 200, "image/jpeg", &report.annotated_image)
            }
            _ => write_json_response(&mut stream, 404, &json!({"error": "no_frame"})),
        },
        _ => write_json_response(&mut stream, 200, &json!({"status": "ok"})),
    }
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let request_line = text
        .split("\r\n")
        .next()
        .filter(|line| !line.is_empty())
        .ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &serde_json::Value) -> Result<()> {
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
        400 => "HTTP/1.1 400 Bad Request",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
}
