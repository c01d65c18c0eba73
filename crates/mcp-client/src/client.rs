//! A connected remote tool server: handshake, tool discovery and dispatch.

use serde_json::Value;

use crate::config::RemoteEndpoint;
use crate::protocol::{
    CallToolParams, InitializeParams, InitializeResult, McpToolDef, ToolCallResult, ToolsListResult,
};
use crate::transport::{HttpTransport, McpTransport, TransportError};

/// Upper bound on `tools/list` pages followed during discovery.
const MAX_TOOL_PAGES: usize = 20;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// McpClient
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct McpClient {
    /// Label used in logs and errors.
    pub name: String,
    tools: Vec<McpToolDef>,
    transport: Box<dyn McpTransport>,
}

impl McpClient {
    /// Open an HTTP transport to `endpoint` and run the handshake.
    pub async fn connect(name: impl Into<String>, endpoint: RemoteEndpoint) -> Result<Self, McpError> {
        let transport = HttpTransport::new(endpoint)?;
        Self::initialize(name.into(), Box::new(transport)).await
    }

    /// Perform `initialize`, `notifications/initialized` and `tools/list`
    /// over an already open transport.
    pub async fn initialize(name: String, transport: Box<dyn McpTransport>) -> Result<Self, McpError> {
        let params = serde_json::to_value(InitializeParams::palaver())?;
        let init = transport
            .send_request("initialize", Some(params))
            .await?
            .into_result()
            .map_err(|e| McpError::Protocol(format!("initialize failed: {e}")))?;
        let init: InitializeResult = serde_json::from_value(init).unwrap_or_default();

        tracing::debug!(
            server = %name,
            protocol_version = %init.protocol_version,
            server_name = init.server_info.as_ref().map(|s| s.name.as_str()).unwrap_or(""),
            "MCP initialize response received"
        );

        transport.send_notification("notifications/initialized").await?;

        let tools = list_tools(transport.as_ref(), &name).await?;
        tracing::info!(server = %name, tool_count = tools.len(), "MCP server connected");

        Ok(Self {
            name,
            tools,
            transport,
        })
    }

    /// Tools discovered during the handshake.
    pub fn tools(&self) -> &[McpToolDef] {
        &self.tools
    }

    pub fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    /// Call a tool. A result flagged `isError` by the server is returned as
    /// [`McpError::ToolFailed`].
    pub async fn call_tool(&self, tool_name: &str, arguments: &Value) -> Result<ToolCallResult, McpError> {
        if !self.transport.is_alive() {
            return Err(McpError::ServerDown(self.name.clone()));
        }

        let params = serde_json::to_value(CallToolParams {
            name: tool_name,
            arguments,
        })?;
        let value = self
            .transport
            .send_request("tools/call", Some(params))
            .await?
            .into_result()
            .map_err(|e| McpError::Protocol(format!("tools/call {tool_name} failed: {e}")))?;

        let result: ToolCallResult = serde_json::from_value(value)
            .map_err(|e| McpError::Protocol(format!("failed to parse tools/call result: {e}")))?;
        if result.is_error {
            return Err(McpError::ToolFailed(result.text()));
        }
        Ok(result)
    }

    pub async fn shutdown(&self) {
        tracing::debug!(server = %self.name, "closing MCP connection");
        self.transport.shutdown().await;
    }
}

async fn list_tools(transport: &dyn McpTransport, name: &str) -> Result<Vec<McpToolDef>, McpError> {
    let mut tools = Vec::new();
    let mut cursor: Option<String> = None;

    for _ in 0..MAX_TOOL_PAGES {
        let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
        let value = transport
            .send_request("tools/list", params)
            .await?
            .into_result()
            .map_err(|e| McpError::Protocol(format!("tools/list failed: {e}")))?;
        let page: ToolsListResult = serde_json::from_value(value)
            .map_err(|e| McpError::Protocol(format!("failed to parse tools/list result: {e}")))?;

        tools.extend(page.tools);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => return Ok(tools),
        }
    }

    tracing::warn!(server = %name, pages = MAX_TOOL_PAGES, "tools/list pagination truncated");
    Ok(tools)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("MCP transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("{0}")]
    ToolFailed(String),

    #[error("MCP server is down: {0}")]
    ServerDown(String),
}

impl From<serde_json::Error> for McpError {
    fn from(e: serde_json::Error) -> Self {
        McpError::Transport(TransportError::Json(e))
    }
}

impl From<McpError> for pv_domain::error::Error {
    fn from(e: McpError) -> Self {
        pv_domain::error::Error::Other(e.to_string())
    }
}
