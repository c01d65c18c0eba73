use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Compaction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compaction collapses old history records into a single summary record
/// so the context window stays bounded after many turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Minimum record count before compaction does anything.
    #[serde(default = "d_30")]
    pub threshold: usize,
    /// Number of most recent records kept verbatim.
    #[serde(default = "d_4")]
    pub keep_recent: usize,
    /// Token cap for the summary response.
    #[serde(default = "d_1024")]
    pub summary_max_tokens: u32,
    #[serde(default = "d_summary_temperature")]
    pub summary_temperature: f32,
    /// Model used for summaries. `None` uses the session's own model.
    #[serde(default)]
    pub summarizer_model: Option<String>,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            threshold: 30,
            keep_recent: 4,
            summary_max_tokens: 1024,
            summary_temperature: d_summary_temperature(),
            summarizer_model: None,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_30() -> usize {
    30
}
fn d_4() -> usize {
    4
}
fn d_1024() -> u32 {
    1024
}
fn d_summary_temperature() -> f32 {
    0.1
}
