//! Tool group over a connected remote tool server.

use async_trait::async_trait;
use serde_json::{Map, Value};

use pv_mcp_client::{McpClient, McpError};

use crate::group::{ReturnKind, ToolError, ToolGroup, ToolOperation};
use crate::scope::Release;

pub struct RemoteToolGroup {
    client: McpClient,
}

impl RemoteToolGroup {
    pub fn new(client: McpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolGroup for RemoteToolGroup {
    fn operations(&self) -> Vec<ToolOperation> {
        self.client
            .tools()
            .iter()
            .map(|t| ToolOperation::new(t.name.clone(), t.description.clone(), t.input_schema.clone(), ReturnKind::Scalar))
            .collect()
    }

    async fn invoke(&self, operation: &str, arguments: &Map<String, Value>) -> Result<Value, ToolError> {
        let args = Value::Object(arguments.clone());
        let result = self.client.call_tool(operation, &args).await.map_err(|e| match e {
            McpError::ToolFailed(msg) => ToolError::Failed(msg),
            McpError::ServerDown(name) => ToolError::Unavailable(name),
            other => ToolError::Http(other.to_string()),
        })?;

        // Prefer the text blocks; fall back to structured output.
        let text = result.text();
        match result.structured_content {
            Some(structured) if text.is_empty() => Ok(Value::String(structured.to_string())),
            _ => Ok(Value::String(text)),
        }
    }
}

#[async_trait]
impl Release for RemoteToolGroup {
    fn label(&self) -> String {
        format!("remote:{}", self.client.name)
    }

    async fn release(&self) {
        self.client.shutdown().await;
    }
}
