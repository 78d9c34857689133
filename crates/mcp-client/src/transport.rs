//! Provider transport layer.
//!
//! Each provider is reached over exactly one transport:
//! - **Stdio**: spawn a child process, exchange newline-delimited JSON-RPC
//!   over stdin/stdout.
//! - **Http**: POST each JSON-RPC message to the provider URL; responses
//!   arrive as a JSON body or as a short SSE stream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;

use mb_domain::config::ProviderConfig;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse};

/// Trait for provider transports.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a JSON-RPC request and wait for the corresponding response.
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError>;

    /// Send a JSON-RPC notification (no response expected).
    async fn send_notification(&self, method: &str) -> Result<(), TransportError>;

    /// Check if the transport is still alive.
    fn is_alive(&self) -> bool;

    /// Shut down the transport gracefully. Safe to call more than once.
    async fn shutdown(&self);
}

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("provider process has exited")]
    ProcessExited,

    #[error("transport is closed")]
    Closed,

    #[error("timeout waiting for response to {0}")]
    Timeout(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("invalid transport config: {0}")]
    InvalidConfig(String),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stdio transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Maximum number of non-JSON lines to skip before declaring the server broken.
const MAX_SKIP_LINES: usize = 1000;

/// How long a child process gets to exit after stdin is closed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Stdio transport: communicates with a child process over stdin/stdout.
///
/// The `request_lock` serializes entire request/response cycles so that
/// concurrent callers cannot read each other's responses.
pub struct StdioTransport {
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    child: Mutex<Child>,
    request_lock: Mutex<()>,
    next_id: AtomicU64,
    alive: AtomicBool,
    request_timeout: Duration,
}

impl StdioTransport {
    /// Spawn the child process described by a stdio provider config.
    pub fn spawn(config: &ProviderConfig, request_timeout: Duration) -> Result<Self, TransportError> {
        if config.command.trim().is_empty() {
            return Err(TransportError::InvalidConfig("stdio server requires a command".into()));
        }

        let mut cmd = tokio::process::Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;

        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "failed to capture child stdin",
            ))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "failed to capture child stdout",
            ))
        })?;

        tracing::debug!(command = %config.command, pid = ?child.id(), "spawned provider process");

        Ok(Self {
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            child: Mutex::new(child),
            request_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(true),
            request_timeout,
        })
    }

    async fn write_line(&self, json: &str) -> Result<(), TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::ProcessExited);
        }
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Read the next JSON-looking line from stdout.
    ///
    /// Gives up after [`MAX_SKIP_LINES`] non-JSON lines so a provider that
    /// logs to stdout cannot keep us spinning.
    async fn read_line(&self) -> Result<String, TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::ProcessExited);
        }

        let mut stdout = self.stdout.lock().await;
        let mut skipped = 0usize;
        loop {
            let mut line = String::new();
            if stdout.read_line(&mut line).await? == 0 {
                self.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::ProcessExited);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('{') {
                return Ok(trimmed.to_string());
            }
            skipped += 1;
            if skipped >= MAX_SKIP_LINES {
                self.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "provider produced too many non-JSON lines on stdout",
                )));
            }
            tracing::trace!(line = %trimmed, "skipping non-JSON stdout line");
        }
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError> {
        let _guard = self.request_lock.lock().await;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let json = serde_json::to_string(&JsonRpcRequest::call(id, method, params))?;

        tracing::debug!(id, method, "sending stdio request");
        self.write_line(&json).await?;

        // Providers may interleave notifications and requests of their own;
        // skip anything that is not the response to this id.
        let wait = async {
            loop {
                let line = self.read_line().await?;
                match JsonRpcResponse::from_message(&line) {
                    Some(resp) if resp.id == id => return Ok(resp),
                    Some(resp) => {
                        tracing::debug!(expected_id = id, got_id = resp.id, "response for another request");
                    }
                    None => tracing::trace!(line = %line, "skipping non-response message"),
                }
            }
        };

        tokio::time::timeout(self.request_timeout, wait)
            .await
            .map_err(|_| TransportError::Timeout(method.to_string()))?
    }

    async fn send_notification(&self, method: &str) -> Result<(), TransportError> {
        let json = serde_json::to_string(&JsonRpcRequest::notification(method))?;
        tracing::debug!(method, "sending stdio notification");
        self.write_line(&json).await
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let mut child = self.child.lock().await;
        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = stdin.shutdown().await {
                tracing::debug!(error = %e, "error closing provider stdin");
            }
        }
        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => tracing::debug!(?status, "provider process exited"),
            Ok(Err(e)) => tracing::warn!(error = %e, "error waiting for provider process"),
            Err(_) => {
                tracing::warn!("provider process did not exit within grace period, killing");
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "failed to kill provider process");
                }
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Header carrying the provider-assigned session id.
const SESSION_HEADER: &str = "mcp-session-id";

/// HTTP transport: one POST per JSON-RPC message.
///
/// The underlying `reqwest::Client` pools connections, so concurrent
/// requests are not serialized here.
pub struct HttpTransport {
    http: reqwest::Client,
    url: String,
    session_id: parking_lot::Mutex<Option<String>>,
    next_id: AtomicU64,
    alive: AtomicBool,
}

impl HttpTransport {
    /// Build a client for an http provider config.
    pub fn connect(config: &ProviderConfig, request_timeout: Duration) -> Result<Self, TransportError> {
        let url = config
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| TransportError::InvalidConfig("http server requires a url".into()))?
            .to_owned();

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .default_headers(header_map(&config.headers)?)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;

        Ok(Self {
            http,
            url,
            session_id: parking_lot::Mutex::new(None),
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(true),
        })
    }

    async fn post(&self, body: String, label: &str) -> Result<reqwest::Response, TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let mut rb = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/event-stream")
            .body(body);
        if let Some(ref sid) = *self.session_id.lock() {
            rb = rb.header(SESSION_HEADER, sid);
        }

        let resp = rb.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(label.to_string())
            } else {
                TransportError::Http(format!("{label}: {e}"))
            }
        })?;

        if let Some(sid) = resp.headers().get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
            *self.session_id.lock() = Some(sid.to_owned());
        }

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("{label} HTTP {status}: {body}")));
        }
        Ok(resp)
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let json = serde_json::to_string(&JsonRpcRequest::call(id, method, params))?;

        tracing::debug!(id, method, url = %self.url, "sending http request");
        let resp = self.post(json, method).await?;

        let is_sse = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let body = resp
            .text()
            .await
            .map_err(|e| TransportError::Http(format!("{method}: {e}")))?;

        if is_sse {
            parse_sse_response(&body, id)
        } else {
            Ok(serde_json::from_str(&body)?)
        }
    }

    async fn send_notification(&self, method: &str) -> Result<(), TransportError> {
        let json = serde_json::to_string(&JsonRpcRequest::notification(method))?;
        tracing::debug!(method, "sending http notification");
        self.post(json, method).await.map(|_| ())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        let sid = self.session_id.lock().take();
        if let Some(sid) = sid {
            // Session termination is advisory; the provider may not support it.
            if let Err(e) = self.http.delete(&self.url).header(SESSION_HEADER, sid).send().await {
                tracing::debug!(error = %e, "failed to terminate http session");
            }
        }
    }
}

fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::InvalidConfig(format!("header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::InvalidConfig(format!("header value for {name}: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Pick the response for `id` out of an SSE body (`data:` lines).
fn parse_sse_response(body: &str, id: u64) -> Result<JsonRpcResponse, TransportError> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| JsonRpcResponse::from_message(data.trim()))
        .find(|resp| resp.id == id)
        .ok_or_else(|| TransportError::Http(format!("no response for request {id} in event stream")))
}
