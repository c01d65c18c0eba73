use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool resolution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Settings shared by all tool backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Reserved group-name prefix that marks knowledge tools.
    #[serde(default = "d_knowledge_prefix")]
    pub knowledge_prefix: String,
    /// Timeout for remote tool servers and REST API calls.
    #[serde(default = "d_30")]
    pub request_timeout_secs: u64,
    /// File extensions (lowercase, no dot) attached to the model as images.
    #[serde(default = "d_image_extensions")]
    pub image_extensions: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            knowledge_prefix: d_knowledge_prefix(),
            request_timeout_secs: 30,
            image_extensions: d_image_extensions(),
        }
    }
}

fn d_knowledge_prefix() -> String {
    "kb_".into()
}
fn d_30() -> u64 {
    30
}
fn d_image_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "gif", "webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
