use serde::Serialize;

/// Structured trace events emitted across all Palaver crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionCreated {
        session_id: String,
        user_id: String,
    },
    HistoryAppend {
        session_id: String,
        records: usize,
    },
    HistoryReplaced {
        session_id: String,
        removed: usize,
        inserted: usize,
    },
    HistoryRecordSkipped {
        record_id: String,
        reason: String,
    },
    ToolsResolved {
        session_id: String,
        groups: usize,
        tools: usize,
        scoped_resources: usize,
    },
    ToolSkipped {
        tool_id: String,
        reason: String,
    },
    ToolEventSynthesized {
        call_id: String,
        tool_key: String,
    },
    LlmRequest {
        provider: String,
        model: String,
        streaming: bool,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    TurnCompleted {
        session_id: String,
        events: usize,
        total_tokens: u32,
    },
    Compacted {
        session_id: String,
        records_compacted: usize,
        records_kept: usize,
        summary_chars: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "pv_event");
    }
}
