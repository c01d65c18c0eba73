//! Chat sessions and the tool descriptors they enable.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::stream::Usage;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A chat session owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub user_id: String,
    /// Model identifier used for completions (e.g. `"openai/gpt-4o"`).
    pub model: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Enabled tool identifiers: descriptor ids or `catalog:<key>`.
    #[serde(default)]
    pub tool_ids: Vec<String>,
    #[serde(default)]
    pub knowledge_base_ids: Vec<String>,
    #[serde(default)]
    pub settings: ExecutionSettings,
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(id: impl Into<String>, user_id: impl Into<String>, model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            user_id: user_id.into(),
            model: model.into(),
            system_prompt: None,
            tool_ids: Vec::new(),
            knowledge_base_ids: Vec::new(),
            settings: ExecutionSettings::default(),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a completed turn's usage to the running counters.
    pub fn add_usage(&mut self, usage: &Usage) {
        self.prompt_tokens += u64::from(usage.prompt_tokens);
        self.completion_tokens += u64::from(usage.completion_tokens);
        self.total_tokens += u64::from(usage.total_tokens);
        self.updated_at = Utc::now();
    }
}

/// Model execution settings. Everything the core does not interpret lives
/// in `extra` and is passed through to the provider untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSettings {
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool descriptors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The backend family a tool is resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    RemoteToolServer,
    RestDescribedApi,
    NativeInProcess,
    Knowledge,
}

/// A configured tool as stored by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub id: String,
    pub title: String,
    pub kind: ToolKind,
    /// Backend-specific configuration, see the `*Config` types below.
    #[serde(default)]
    pub config: Value,
}

/// Config blob of a [`ToolKind::RemoteToolServer`] descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteServerConfig {
    pub url: String,
    /// Query parameters merged into `url` when connecting.
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Config blob of a [`ToolKind::RestDescribedApi`] descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestApiConfig {
    /// Storage key of the OpenAPI document.
    pub spec_file_key: String,
    /// Base URL every operation is sent to.
    pub server_url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Operation ids or paths to expose. Empty exposes everything.
    #[serde(default)]
    pub allow: Vec<String>,
}

/// Config blob of a [`ToolKind::NativeInProcess`] descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NativeToolConfig {
    pub template: String,
    #[serde(default)]
    pub config: Value,
}
