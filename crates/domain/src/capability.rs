use serde::{Deserialize, Serialize};

/// What a model can do. Providers advertise defaults; the registry can
/// override them per model spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCapabilities {
    /// Whether the model accepts chat-style (message list) completions.
    pub supports_chat: bool,
    pub supports_tools: ToolSupport,
    pub supports_streaming: bool,
    pub supports_vision: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl Default for LlmCapabilities {
    fn default() -> Self {
        Self {
            supports_chat: false,
            supports_tools: ToolSupport::None,
            supports_streaming: false,
            supports_vision: false,
            context_window_tokens: None,
            max_output_tokens: None,
        }
    }
}

impl LlmCapabilities {
    /// A chat model with streaming and basic tool calling.
    pub fn chat() -> Self {
        Self {
            supports_chat: true,
            supports_tools: ToolSupport::Basic,
            supports_streaming: true,
            ..Self::default()
        }
    }
}

/// Tool support level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSupport {
    /// No tool calling support.
    None,
    /// Basic tool calling (function calling).
    Basic,
    /// Strict JSON schema-validated tool calling.
    StrictJson,
}
