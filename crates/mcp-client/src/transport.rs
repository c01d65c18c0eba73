//! MCP transport layer.
//!
//! [`HttpTransport`] sends every JSON-RPC message as an HTTP POST to the
//! server endpoint. A request is answered either with a single JSON body or
//! with an event stream whose `data:` payloads carry JSON-RPC messages; the
//! first payload whose id matches the request is the response.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::Value;

use crate::config::RemoteEndpoint;
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// Header carrying the server-assigned session id.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Trait for MCP server transports.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a JSON-RPC request and wait for the corresponding response.
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError>;

    /// Send a JSON-RPC notification (no response expected).
    async fn send_notification(&self, method: &str) -> Result<(), TransportError>;

    fn is_alive(&self) -> bool;

    /// Shut down the transport. Safe to call more than once.
    async fn shutdown(&self);
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid URL {0}")]
    InvalidUrl(String),

    #[error("invalid header {0}")]
    InvalidHeader(String),

    #[error("timeout waiting for response")]
    Timeout,

    #[error("no response for request {0} in event stream")]
    MissingResponse(u64),

    #[error("transport is closed")]
    Closed,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: RemoteEndpoint,
    session_id: Mutex<Option<String>>,
    next_id: AtomicU64,
    alive: AtomicBool,
}

impl HttpTransport {
    pub fn new(endpoint: RemoteEndpoint) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &endpoint.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::InvalidHeader(format!("{name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::InvalidHeader(format!("{name}: {e}")))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(endpoint.timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            session_id: Mutex::new(None),
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(true),
        })
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// POST one JSON-RPC message and return the raw response.
    async fn post(&self, body: &impl serde::Serialize) -> Result<reqwest::Response, TransportError> {
        if !self.is_alive() {
            return Err(TransportError::Closed);
        }

        let mut req = self
            .client
            .post(self.endpoint.url.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(sid) = self.session_id.lock().clone() {
            req = req.header(SESSION_HEADER, sid);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Http(e)
            }
        })?;

        if let Some(sid) = resp.headers().get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
            *self.session_id.lock() = Some(sid.to_owned());
        }

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError> {
        let id = self.next_request_id();
        let req = JsonRpcRequest::new(id, method, params);
        tracing::debug!(id, method, url = %self.endpoint.url, "sending MCP request");

        let resp = self.post(&req).await?;
        let is_stream = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("text/event-stream"))
            .unwrap_or(false);
        let body = resp.text().await?;

        if is_stream {
            find_response(&body, id)
        } else {
            Ok(serde_json::from_str(&body)?)
        }
    }

    async fn send_notification(&self, method: &str) -> Result<(), TransportError> {
        tracing::debug!(method, "sending MCP notification");
        self.post(&JsonRpcNotification::new(method)).await?;
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        // Servers that issued a session expect it to be ended explicitly.
        let Some(sid) = self.session_id.lock().take() else {
            return;
        };
        let result = self
            .client
            .delete(self.endpoint.url.clone())
            .header(SESSION_HEADER, sid)
            .send()
            .await;
        if let Err(e) = result {
            tracing::debug!(error = %e, "error ending MCP session");
        }
    }
}

/// Extract complete `data:` payloads from an event-stream body.
fn data_payloads(body: &str) -> Vec<String> {
    let normalized = body.replace("\r\n", "\n");
    normalized
        .split("\n\n")
        .filter_map(|block| {
            let data: Vec<&str> = block
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(str::trim)
                .collect();
            (!data.is_empty()).then(|| data.join("\n"))
        })
        .filter(|payload| !payload.is_empty())
        .collect()
}

fn find_response(body: &str, id: u64) -> Result<JsonRpcResponse, TransportError> {
    for payload in data_payloads(body) {
        match serde_json::from_str::<JsonRpcResponse>(&payload) {
            Ok(resp) if resp.id == Some(id) => return Ok(resp),
            Ok(_) => tracing::debug!(expected_id = id, "skipping unrelated MCP stream message"),
            Err(e) => tracing::debug!(error = %e, "skipping non-response MCP stream payload"),
        }
    }
    Err(TransportError::MissingResponse(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_payloads_joins_multiline_events() {
        let body = "event: message\ndata: {\"a\":\ndata: 1}\n\nid: 2\ndata: second\n\n";
        assert_eq!(data_payloads(body), vec!["{\"a\":\n1}", "second"]);
    }

    #[test]
    fn find_response_skips_notifications() {
        let body = concat!(
            "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"ok\":true}}\n\n",
        );
        let resp = find_response(body, 1).unwrap();
        assert_eq!(resp.into_result().unwrap()["ok"], true);
    }

    #[test]
    fn find_response_reports_missing_id() {
        let body = "data: {\"jsonrpc\":\"2.0\",\"id\":9,\"result\":{}}\r\n\r\n";
        assert!(matches!(find_response(body, 1), Err(TransportError::MissingResponse(1))));
    }
}
