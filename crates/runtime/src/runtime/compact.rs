//! History compaction: collapses the oldest records of a session into one
//! summary record so the restored context stays bounded.
//!
//! The summary replaces the compacted window in a single store operation,
//! so a failed compaction leaves history exactly as it was.

use chrono::Utc;

use pv_domain::config::CompactionConfig;
use pv_domain::history::{Event, HistoryRecord};
use pv_domain::session::ChatSession;
use pv_domain::tool::{Message, Role};
use pv_domain::trace::TraceEvent;
use pv_providers::ChatRequest;
use pv_sessions::{encode, record_text};

use crate::state::RuntimeState;

use super::session_lock::SessionBusy;

/// Prefix of the summary record's text.
pub const SUMMARY_HEADER: &str = "Summary of the earlier conversation:";

const SUMMARY_PROMPT: &str = "You are a conversation summarizer. Summarize the conversation \
     you are given in 5 to 8 plain-language sentences. Preserve names, concrete facts, \
     decisions that were made and open action items. Write in present tense and omit \
     greetings and pleasantries.";

/// Records longer than this are shortened in the summarizer prompt.
const MAX_LINE_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// Nothing to do.
    Skipped { records: usize },
    Compacted { compacted: usize, kept: usize },
    /// Summarizing or storing failed; history is unchanged.
    Aborted { reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum CompactError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Busy(#[from] SessionBusy),

    #[error(transparent)]
    Store(#[from] pv_domain::error::Error),
}

/// Whether a history of `count` records is due for compaction.
pub fn should_compact(count: usize, config: &CompactionConfig) -> bool {
    count >= config.threshold && count > config.keep_recent
}

/// Compact a session's history if it has reached the threshold.
///
/// Runs under the session lock, so it never interleaves with a turn.
pub async fn compact(
    state: &RuntimeState,
    session_id: &str,
    user_id: &str,
) -> Result<CompactionOutcome, CompactError> {
    let _permit = state.session_locks.acquire(session_id).await?;

    let session = match state.store.load_session(session_id).await? {
        Some(session) if session.user_id == user_id => session,
        _ => return Err(CompactError::NotFound(format!("session {session_id}"))),
    };

    let config = &state.config.compaction;
    let records = state.store.list_history(session_id).await?;
    let count = records.len();
    if count < config.threshold {
        tracing::debug!(session_id, count, threshold = config.threshold, "history below compaction threshold");
        return Ok(CompactionOutcome::Skipped { records: count });
    }
    let to_compact = count.saturating_sub(config.keep_recent);
    if to_compact == 0 {
        tracing::debug!(session_id, count, keep = config.keep_recent, "nothing to compact");
        return Ok(CompactionOutcome::Skipped { records: count });
    }

    let (old, kept) = records.split_at(to_compact);
    match summarize_and_replace(state, &session, old).await {
        Ok(summary_chars) => {
            TraceEvent::Compacted {
                session_id: session_id.to_owned(),
                records_compacted: old.len(),
                records_kept: kept.len(),
                summary_chars,
            }
            .emit();
            tracing::info!(session_id, compacted = old.len(), kept = kept.len(), "history compacted");
            Ok(CompactionOutcome::Compacted {
                compacted: old.len(),
                kept: kept.len(),
            })
        }
        Err(reason) => {
            tracing::warn!(session_id, reason = %reason, "compaction aborted, history unchanged");
            Ok(CompactionOutcome::Aborted { reason })
        }
    }
}

/// Summarize `old` and swap it for the summary record. Returns the
/// summary length in characters.
async fn summarize_and_replace(
    state: &RuntimeState,
    session: &ChatSession,
    old: &[HistoryRecord],
) -> Result<usize, String> {
    let config = &state.config.compaction;
    let Some(oldest) = old.first() else {
        return Err("no records to compact".into());
    };

    let model_spec = config.summarizer_model.as_deref().unwrap_or(&session.model);
    let model = state
        .providers
        .resolve(model_spec)
        .ok_or_else(|| format!("summarizer model {model_spec} is not available"))?;

    let req = ChatRequest {
        messages: vec![Message::system(SUMMARY_PROMPT), Message::user(build_transcript(old))],
        temperature: Some(config.summary_temperature),
        max_tokens: Some(config.summary_max_tokens),
        model: Some(model.model.clone()),
        ..ChatRequest::default()
    };

    let started = std::time::Instant::now();
    let resp = model
        .provider
        .chat(req)
        .await
        .map_err(|e| format!("summarizer failed: {e}"))?;
    TraceEvent::LlmRequest {
        provider: model.provider.provider_id().to_owned(),
        model: model.model.clone(),
        streaming: false,
        duration_ms: started.elapsed().as_millis() as u64,
        prompt_tokens: resp.usage.map(|u| u.prompt_tokens),
        completion_tokens: resp.usage.map(|u| u.completion_tokens),
    }
    .emit();

    let summary = resp.content.trim();
    if summary.is_empty() {
        return Err("summarizer returned an empty summary".into());
    }

    let content = encode(&[Event::text(format!("{SUMMARY_HEADER}\n{summary}"))]).map_err(|e| e.to_string())?;
    let mut record = HistoryRecord::new(&session.id, Role::User, content);
    record.created_at = oldest.created_at;
    record.updated_at = Utc::now();

    let remove: Vec<String> = old.iter().map(|r| r.id.clone()).collect();
    state
        .store
        .replace_history(&session.id, &remove, vec![record])
        .await
        .map_err(|e| format!("replacing history failed: {e}"))?;

    Ok(summary.chars().count())
}

/// Flatten records into `Role: text` lines.
fn build_transcript(records: &[HistoryRecord]) -> String {
    let mut buf = String::new();
    for record in records {
        let label = record.role().map(|r| r.label()).unwrap_or(record.role.as_str());
        buf.push_str(label);
        buf.push_str(": ");
        buf.push_str(&shorten(&record_text(record), MAX_LINE_CHARS));
        buf.push('\n');
    }
    buf
}

/// Keep the head and tail of overly long text.
fn shorten(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_owned();
    }
    let head: String = text.chars().take(max_chars / 2).collect();
    let tail: String = text.chars().skip(total - max_chars / 4).collect();
    format!("{head} [...] {tail}")
}
