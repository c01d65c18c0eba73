use std::collections::BTreeMap;

use pv_domain::capability::LlmCapabilities;
use pv_domain::error::Result;
use pv_domain::stream::Usage;
use pv_domain::stream::{BoxStream, StreamEvent};
use pv_domain::tool::{Message, ToolCall, ToolDefinition};
use serde_json::Value;

/// One completion request, independent of the backend serving it.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    /// Tools the model may call. Empty disables tool calling.
    pub tools: Vec<ToolDefinition>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Model name with the provider prefix stripped.
    pub model: Option<String>,
    /// Session settings the runtime does not interpret.
    pub extra: BTreeMap<String, Value>,
}

/// A complete (non-streamed) completion.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    pub model: String,
    pub finish_reason: Option<String>,
}

/// A completion backend. The turn loop uses `chat_stream`; compaction
/// uses the blocking `chat`.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse>;

    /// Dropping the returned stream must abort the request.
    async fn chat_stream(
        &self,
        req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// Capabilities of models without a registry override.
    fn capabilities(&self) -> &LlmCapabilities;

    /// Registry key, also the `provider/` prefix of model specs.
    fn provider_id(&self) -> &str;
}
