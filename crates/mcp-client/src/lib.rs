//! `pv-mcp-client`: client for remote tool servers speaking MCP (Model
//! Context Protocol) over HTTP.
//!
//! This crate provides:
//! - JSON-RPC 2.0 protocol types for the MCP handshake and tool calls.
//! - An HTTP transport that POSTs each message and accepts either a JSON or
//!   an event-stream response.
//! - An [`McpClient`] that performs the handshake, lists the server's tools
//!   and dispatches calls.
//!
//! # Usage
//!
//! ```rust,ignore
//! use pv_mcp_client::{McpClient, RemoteEndpoint};
//!
//! let endpoint = RemoteEndpoint::from_config(&remote_cfg, Duration::from_secs(30))?;
//! let client = McpClient::connect("search", endpoint).await?;
//!
//! for tool in client.tools() {
//!     println!("{}", tool.name);
//! }
//!
//! let result = client.call_tool("query", json!({ "q": "rust" })).await?;
//! client.shutdown().await;
//! ```

pub mod client;
pub mod config;
pub mod protocol;
pub mod transport;

// Re-exports for convenience.
pub use client::{McpClient, McpError};
pub use config::RemoteEndpoint;
pub use protocol::{McpToolDef, ToolCallResult};
pub use transport::{HttpTransport, McpTransport, TransportError};
