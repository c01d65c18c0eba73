use serde::{Deserialize, Serialize};

/// Turn loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Maximum number of tool-call loops before the turn is failed.
    #[serde(default = "d_25")]
    pub max_tool_loops: usize,
    /// Capacity of the per-turn event channel.
    #[serde(default = "d_64")]
    pub channel_capacity: usize,
    /// Model assigned to sessions created on their first turn.
    #[serde(default = "d_default_model")]
    pub default_model: String,
    /// Temperature used when the session does not set one.
    #[serde(default = "d_temperature")]
    pub default_temperature: f32,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_tool_loops: 25,
            channel_capacity: 64,
            default_model: d_default_model(),
            default_temperature: d_temperature(),
        }
    }
}

fn d_25() -> usize {
    25
}
fn d_64() -> usize {
    64
}
fn d_default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn d_temperature() -> f32 {
    0.2
}
