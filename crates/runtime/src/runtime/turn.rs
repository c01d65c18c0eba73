//! Turn execution: restores history, resolves tools, streams the model
//! response with tool calls driven through the tracker, and persists the
//! finished turn.
//!
//! Entry point: [`run_turn`] validates the input, spawns the turn and
//! returns a channel of [`TurnEvent`]s.

use std::collections::HashMap;
use std::time::Instant;

use futures_util::StreamExt;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::Instrument;

use pv_domain::history::{Event, HistoryRecord, ToolCallEvent};
use pv_domain::session::{ChatSession, ExecutionSettings};
use pv_domain::stream::{StreamEvent, Usage};
use pv_domain::tool::{ContentPart, Message, MessageContent, Role};
use pv_domain::trace::TraceEvent;
use pv_providers::{ChatRequest, ResolvedModel};
use pv_sessions::{encode, restore};
use pv_tools::ToolSet;

use crate::state::RuntimeState;

use super::attachments;
use super::cancel::CancelToken;
use super::cursor::{ToolCallStillOpen, TurnCursor};
use super::session_lock::SessionBusy;
use super::tools::{resolve_tools, ResolveError};
use super::tracker::{InvocationTracker, ToolInvocation};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnEvent: what the caller sees
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events emitted during a single turn, in production order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TurnEvent {
    /// Incremental text from the assistant.
    #[serde(rename = "assistant_delta")]
    AssistantDelta { text: String },

    /// A tool call started processing.
    #[serde(rename = "tool_call")]
    ToolCall { event: Event },

    /// A tool call reached `End` or `Error`.
    #[serde(rename = "tool_result")]
    ToolResult { event: Event },

    /// The full assistant text of the turn.
    #[serde(rename = "final")]
    Final { content: String },

    /// Token usage for the turn.
    #[serde(rename = "usage")]
    Usage {
        input_tokens: u32,
        output_tokens: u32,
        total_tokens: u32,
    },

    /// The turn was cancelled.
    #[serde(rename = "stopped")]
    Stopped {
        /// Text streamed before the stop.
        content: String,
    },

    /// The turn failed. `phase` is the last state the turn reached.
    #[serde(rename = "error")]
    Error { phase: TurnState, message: String },
}

/// Progress of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    InputValidated,
    HistoryRestored,
    ToolsResolved,
    Streaming,
    Completed,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("{0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Busy(#[from] SessionBusy),

    #[error("tool resolution failed: {0}")]
    Resolution(ResolveError),

    #[error("provider: {0}")]
    Provider(String),

    #[error("tool {tool} failed: {message}")]
    Tool { tool: String, message: String },

    #[error("tool loop limit reached ({0} iterations)")]
    ToolLoopLimit(usize),

    #[error(transparent)]
    ToolCallOpen(#[from] ToolCallStillOpen),

    #[error(transparent)]
    Store(#[from] pv_domain::error::Error),

    #[error("cancelled")]
    Cancelled,
}

impl From<ResolveError> for TurnError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::Cancelled => TurnError::Cancelled,
            other => TurnError::Resolution(other),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run parameters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Input to a single turn.
#[derive(Debug, Clone, Default)]
pub struct TurnInput {
    pub session_id: String,
    pub user_id: String,
    pub text: Option<String>,
    /// Storage key of an attached file.
    pub file_key: Option<String>,
    /// Settings for the session if this turn creates it.
    pub new_session: Option<SessionSeed>,
}

impl TurnInput {
    pub fn text(session_id: impl Into<String>, user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    fn text_content(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }

    fn file_content(&self) -> Option<&str> {
        self.file_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    /// The events stored verbatim in the user's history record.
    fn events(&self) -> Vec<Event> {
        let mut events = Vec::with_capacity(2);
        if let Some(text) = self.text_content() {
            events.push(Event::text(text));
        }
        if let Some(key) = self.file_content() {
            events.push(Event::file(key));
        }
        events
    }
}

/// Initial settings of a session created by its first turn.
#[derive(Debug, Clone, Default)]
pub struct SessionSeed {
    /// Defaults to the configured default model.
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub tool_ids: Vec<String>,
    pub knowledge_base_ids: Vec<String>,
    pub settings: ExecutionSettings,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run_turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run one turn.
///
/// Input is validated before anything else is touched; a rejected input
/// returns `Err` and no task is spawned. Otherwise the turn runs in its own
/// task and reports through the returned channel, which always ends with
/// `Final` + `Usage`, `Stopped` or `Error`.
pub fn run_turn(
    state: RuntimeState,
    input: TurnInput,
    cancel: CancelToken,
) -> Result<mpsc::Receiver<TurnEvent>, TurnError> {
    validate_input(&input)?;

    let (tx, rx) = mpsc::channel::<TurnEvent>(state.config.turn.channel_capacity.max(1));
    let turn_id = uuid::Uuid::new_v4();
    let turn_span = tracing::info_span!(
        "turn",
        %turn_id,
        session_id = %input.session_id,
    );

    tokio::spawn(
        async move {
            tracing::debug!("turn started");
            let session_id = input.session_id.clone();
            let mut phase = TurnState::InputValidated;
            let result = run_turn_inner(&state, input, &tx, &cancel, &mut phase).await;

            state.cancel_map.finish(&session_id, &cancel);

            match result {
                Ok(()) => {}
                Err(TurnError::Cancelled) => {
                    tracing::info!(?phase, "turn stopped before streaming");
                    let _ = tx.send(TurnEvent::Stopped { content: String::new() }).await;
                }
                Err(e) => {
                    let message = e.to_string();
                    tracing::warn!(?phase, error = %message, "turn failed");
                    let _ = tx.send(TurnEvent::Error { phase, message }).await;
                }
            }
        }
        .instrument(turn_span),
    );

    Ok(rx)
}

fn validate_input(input: &TurnInput) -> Result<(), TurnError> {
    if input.session_id.trim().is_empty() {
        return Err(TurnError::Validation("session id is required".into()));
    }
    if input.user_id.trim().is_empty() {
        return Err(TurnError::Validation("user id is required".into()));
    }
    if input.text_content().is_none() && input.file_content().is_none() {
        return Err(TurnError::Validation("no input provided".into()));
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run_turn_inner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_turn_inner(
    state: &RuntimeState,
    input: TurnInput,
    tx: &mpsc::Sender<TurnEvent>,
    cancel: &CancelToken,
    phase: &mut TurnState,
) -> Result<(), TurnError> {
    let _permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(TurnError::Cancelled),
        permit = state.session_locks.acquire(&input.session_id) => permit?,
    };

    // ── Phase 1: session, history, user message ─────────────────────────
    let (session, is_new) = load_or_create_session(state, &input).await?;
    let records = state.store.list_history(&session.id).await?;

    let mut messages = Vec::with_capacity(records.len() + 2);
    if let Some(prompt) = session.system_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
        messages.push(Message::system(prompt));
    }
    messages.extend(restore(&records));
    if let Some(user) = attachments::user_message(
        state.storage.as_ref(),
        input.text_content(),
        input.file_content(),
        &state.config.tools.image_extensions,
    )
    .await?
    {
        messages.push(user);
    }
    *phase = TurnState::HistoryRestored;
    tracing::debug!(history = records.len(), messages = messages.len(), "history restored");

    // ── Phase 2: model and tools ─────────────────────────────────────────
    let model = state
        .providers
        .resolve(&session.model)
        .ok_or_else(|| TurnError::Validation(format!("model {} is not available", session.model)))?;
    if !model.supports_chat() {
        return Err(TurnError::Validation(format!(
            "model {} does not support chat completion",
            session.model
        )));
    }

    let mut resolved = resolve_tools(
        state,
        &session.id,
        &session.tool_ids,
        &session.knowledge_base_ids,
        &session.model,
        cancel,
    )
    .await?;
    *phase = TurnState::ToolsResolved;

    // ── Phase 3: streaming tool loop ─────────────────────────────────────
    *phase = TurnState::Streaming;
    let mut cursor = TurnCursor::new();
    let streamed = stream_turn(
        StreamContext {
            state,
            tx,
            cancel,
            model: &model,
            settings: &session.settings,
            tools: &resolved.tools,
            display_names: &resolved.display_names,
            tracker: InvocationTracker::new(&state.config.tools.knowledge_prefix, tx, cancel),
        },
        messages,
        &mut cursor,
    )
    .await;
    resolved.scope.release().await;

    let streamed = match streamed {
        Ok(_) if cancel.is_cancelled() => {
            tracing::info!("turn stopped while releasing tools");
            let _ = tx.send(TurnEvent::Stopped { content: cursor.text() }).await;
            return Ok(());
        }
        Ok(streamed) => streamed,
        Err(TurnError::Cancelled) => {
            tracing::info!("turn stopped during streaming");
            let _ = tx.send(TurnEvent::Stopped { content: cursor.text() }).await;
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    // ── Phase 4: persist ─────────────────────────────────────────────────
    let content = cursor.text();
    let events = cursor.finish();
    let user_record = HistoryRecord::new(&session.id, Role::User, encode(&input.events())?);
    let mut assistant_record = HistoryRecord::new(&session.id, Role::Assistant, encode(&events)?);
    assistant_record.completion_id = streamed.completion_id;

    if is_new {
        state.store.save_session(&session).await?;
        TraceEvent::SessionCreated {
            session_id: session.id.clone(),
            user_id: session.user_id.clone(),
        }
        .emit();
    }
    state
        .store
        .commit_turn(&session.id, &streamed.usage, vec![user_record, assistant_record])
        .await?;
    *phase = TurnState::Completed;

    TraceEvent::TurnCompleted {
        session_id: session.id.clone(),
        events: events.len(),
        total_tokens: streamed.usage.total_tokens,
    }
    .emit();

    let _ = tx.send(TurnEvent::Final { content }).await;
    let _ = tx
        .send(TurnEvent::Usage {
            input_tokens: streamed.usage.prompt_tokens,
            output_tokens: streamed.usage.completion_tokens,
            total_tokens: streamed.usage.total_tokens,
        })
        .await;
    Ok(())
}

/// The session for this turn and whether it still has to be saved.
async fn load_or_create_session(state: &RuntimeState, input: &TurnInput) -> Result<(ChatSession, bool), TurnError> {
    match state.store.load_session(&input.session_id).await? {
        Some(session) if session.user_id == input.user_id => Ok((session, false)),
        Some(_) => {
            tracing::warn!(user_id = %input.user_id, "session belongs to another user");
            Err(TurnError::NotFound(format!("session {}", input.session_id)))
        }
        None => {
            let seed = input.new_session.clone().unwrap_or_default();
            let model = seed
                .model
                .unwrap_or_else(|| state.config.turn.default_model.clone());
            let mut session = ChatSession::new(&input.session_id, &input.user_id, model);
            session.system_prompt = seed.system_prompt;
            session.tool_ids = seed.tool_ids;
            session.knowledge_base_ids = seed.knowledge_base_ids;
            session.settings = seed.settings;
            Ok((session, true))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct StreamContext<'a> {
    state: &'a RuntimeState,
    tx: &'a mpsc::Sender<TurnEvent>,
    cancel: &'a CancelToken,
    model: &'a ResolvedModel,
    settings: &'a ExecutionSettings,
    tools: &'a ToolSet,
    display_names: &'a HashMap<String, String>,
    tracker: InvocationTracker<'a>,
}

struct StreamedTurn {
    usage: Usage,
    completion_id: Option<String>,
}

/// One provider response: the assistant parts in arrival order and the
/// results of the tool calls it made.
#[derive(Default)]
struct LlmResponse {
    parts: Vec<ContentPart>,
    tool_results: Vec<(String, String)>,
    usage: Option<Usage>,
    completion_id: Option<String>,
    completed: bool,
}

impl LlmResponse {
    fn push_text(&mut self, delta: &str) {
        if let Some(ContentPart::Text { text }) = self.parts.last_mut() {
            text.push_str(delta);
        } else {
            self.parts.push(ContentPart::Text { text: delta.to_owned() });
        }
    }
}

/// A call announced by `ToolCallStarted` whose arguments are still streaming.
struct AnnouncedCall {
    call_id: String,
    tool_name: String,
    arguments: String,
}

async fn stream_turn(
    ctx: StreamContext<'_>,
    mut messages: Vec<Message>,
    cursor: &mut TurnCursor,
) -> Result<StreamedTurn, TurnError> {
    let config = &ctx.state.config;
    let tool_defs = ctx.tools.definitions();
    let max_loops = config.turn.max_tool_loops;

    let mut total = Usage::default();
    let mut completion_id = None;

    for loop_idx in 0..max_loops {
        tracing::debug!(loop_idx, "tool loop iteration");
        if ctx.cancel.is_cancelled() {
            return Err(TurnError::Cancelled);
        }

        let req = ChatRequest {
            messages: messages.clone(),
            tools: tool_defs.clone(),
            temperature: Some(ctx.settings.temperature.unwrap_or(config.turn.default_temperature)),
            max_tokens: ctx.settings.max_tokens,
            model: Some(ctx.model.model.clone()),
            extra: ctx.settings.extra.clone(),
        };

        let llm_span = tracing::info_span!(
            "llm.call",
            provider = %ctx.model.provider.provider_id(),
            model = %ctx.model.model,
            loop_idx,
            input_tokens = tracing::field::Empty,
            output_tokens = tracing::field::Empty,
        );
        let started = Instant::now();
        let response = consume_stream(&ctx, req, cursor)
            .instrument(llm_span.clone())
            .await?;

        if let Some(u) = &response.usage {
            llm_span.record("input_tokens", u.prompt_tokens);
            llm_span.record("output_tokens", u.completion_tokens);
            total.accumulate(u);
        }
        TraceEvent::LlmRequest {
            provider: ctx.model.provider.provider_id().to_owned(),
            model: ctx.model.model.clone(),
            streaming: true,
            duration_ms: started.elapsed().as_millis() as u64,
            prompt_tokens: response.usage.map(|u| u.prompt_tokens),
            completion_tokens: response.usage.map(|u| u.completion_tokens),
        }
        .emit();
        if response.completion_id.is_some() {
            completion_id = response.completion_id;
        }

        // No tool calls: this was the final answer.
        if response.tool_results.is_empty() {
            return Ok(StreamedTurn {
                usage: total,
                completion_id,
            });
        }

        messages.push(Message {
            role: Role::Assistant,
            content: MessageContent::Parts(response.parts),
        });
        for (call_id, result) in response.tool_results {
            messages.push(Message::tool_result(&call_id, result));
        }
    }

    Err(TurnError::ToolLoopLimit(max_loops))
}

/// Read one provider stream to its end.
///
/// Events reach the cursor and the caller in arrival order. An announced
/// tool call opens its event immediately and runs as soon as its arguments
/// are complete, which is the first event that is not one of its own
/// argument deltas.
async fn consume_stream(
    ctx: &StreamContext<'_>,
    req: ChatRequest,
    cursor: &mut TurnCursor,
) -> Result<LlmResponse, TurnError> {
    tracing::debug!(messages = req.messages.len(), tools = req.tools.len(), "calling provider");
    let mut stream = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return Err(TurnError::Cancelled),
        opened = ctx.model.provider.chat_stream(req) => opened.map_err(|e| TurnError::Provider(e.to_string()))?,
    };

    let mut response = LlmResponse::default();
    let mut announced: Option<AnnouncedCall> = None;

    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(TurnError::Cancelled),
            next = stream.next() => next,
        };
        let Some(item) = next else { break };
        let event = item.map_err(|e| TurnError::Provider(e.to_string()))?;

        let continues_announced = match (&event, &announced) {
            (StreamEvent::ToolCallDelta { call_id, .. }, Some(open))
            | (StreamEvent::ToolCallFinished { call_id, .. }, Some(open)) => *call_id == open.call_id,
            _ => false,
        };
        if !continues_announced {
            if let Some(open) = announced.take() {
                let arguments = streamed_arguments(open.arguments);
                dispatch(ctx, cursor, &mut response, open.call_id, open.tool_name, arguments).await?;
            }
        }

        match event {
            StreamEvent::Token { text } => {
                cursor.append_text(&text);
                response.push_text(&text);
                let _ = ctx.tx.send(TurnEvent::AssistantDelta { text }).await;
            }
            StreamEvent::ToolCallStarted { call_id, tool_name } => {
                open_call(ctx, cursor, &call_id, &tool_name)?;
                announced = Some(AnnouncedCall {
                    call_id,
                    tool_name,
                    arguments: String::new(),
                });
            }
            StreamEvent::ToolCallDelta { call_id, delta } => match announced.as_mut() {
                Some(open) if open.call_id == call_id => open.arguments.push_str(&delta),
                _ => tracing::warn!(call_id = %call_id, "argument delta for a call that is not open; dropped"),
            },
            StreamEvent::ToolCallFinished {
                call_id,
                tool_name,
                arguments,
            } => {
                let arguments = match announced.take() {
                    Some(open) if arguments.is_null() => streamed_arguments(open.arguments),
                    Some(_) => arguments,
                    None => {
                        open_call(ctx, cursor, &call_id, &tool_name)?;
                        arguments
                    }
                };
                dispatch(ctx, cursor, &mut response, call_id, tool_name, arguments).await?;
            }
            StreamEvent::Done {
                usage, completion_id, ..
            } => {
                response.completed = true;
                response.usage = usage;
                response.completion_id = completion_id;
            }
            StreamEvent::Error { message } => return Err(TurnError::Provider(message)),
        }
    }

    if !response.completed {
        return Err(TurnError::Provider("stream ended before completion".into()));
    }
    if let Some(open) = announced.take() {
        let arguments = streamed_arguments(open.arguments);
        dispatch(ctx, cursor, &mut response, open.call_id, open.tool_name, arguments).await?;
    }

    Ok(response)
}

/// Open the ToolCall event for an announced call. Any open text block ends.
fn open_call(ctx: &StreamContext<'_>, cursor: &mut TurnCursor, call_id: &str, tool_name: &str) -> Result<(), TurnError> {
    let kind = ctx.tracker.classify(tool_name, ctx.tools.get(tool_name).map(|e| e.kind));
    let display_name = ctx
        .display_names
        .get(tool_name)
        .cloned()
        .unwrap_or_else(|| tool_name.to_owned());
    cursor.start_tool_call(ToolCallEvent::new(call_id, tool_name, display_name, kind))?;
    Ok(())
}

/// Run a call against its open event and record it in the response.
async fn dispatch(
    ctx: &StreamContext<'_>,
    cursor: &mut TurnCursor,
    response: &mut LlmResponse,
    call_id: String,
    tool_name: String,
    arguments: Value,
) -> Result<(), TurnError> {
    if ctx.cancel.is_cancelled() {
        return Err(TurnError::Cancelled);
    }
    let arguments = argument_map(&call_id, &tool_name, arguments);
    response.parts.push(ContentPart::ToolUse {
        id: call_id.clone(),
        name: tool_name.clone(),
        input: Value::Object(arguments.clone()),
    });

    let result = ctx
        .tracker
        .invoke(
            cursor,
            ToolInvocation {
                call_id: &call_id,
                tool_name: &tool_name,
                arguments,
                entry: ctx.tools.get(&tool_name),
            },
        )
        .await?;
    response.tool_results.push((call_id, result));
    Ok(())
}

/// Arguments accumulated from deltas; nothing streamed means `{}`.
fn streamed_arguments(raw: String) -> Value {
    if raw.trim().is_empty() {
        Value::Object(Map::new())
    } else {
        Value::String(raw)
    }
}

/// Tool arguments as an object. Providers may send them as a JSON string;
/// anything that is not an object becomes `{}`.
fn argument_map(call_id: &str, tool_name: &str, arguments: Value) -> Map<String, Value> {
    match arguments {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        Value::String(raw) if raw.trim().is_empty() => Map::new(),
        Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            _ => {
                tracing::warn!(call_id = %call_id, tool = %tool_name, "tool call arguments are not a JSON object; using {{}}");
                Map::new()
            }
        },
        _ => {
            tracing::warn!(call_id = %call_id, tool = %tool_name, "tool call arguments are not a JSON object; using {{}}");
            Map::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_input_is_rejected() {
        let mut input = TurnInput::text("s1", "u1", "   ");
        assert!(matches!(validate_input(&input), Err(TurnError::Validation(m)) if m == "no input provided"));

        input.file_key = Some("uploads/a.png".into());
        assert!(validate_input(&input).is_ok());
    }

    #[test]
    fn user_events_keep_text_and_file() {
        let mut input = TurnInput::text("s1", "u1", "look");
        input.file_key = Some("a.pdf".into());
        assert_eq!(input.events(), vec![Event::text("look"), Event::file("a.pdf")]);
    }

    #[test]
    fn string_arguments_are_parsed() {
        let map = argument_map("c1", "t", json!("{\"city\":\"Oslo\"}"));
        assert_eq!(map["city"], "Oslo");
        assert!(argument_map("c1", "t", json!("not json")).is_empty());
        assert!(argument_map("c1", "t", json!([1, 2])).is_empty());
        assert!(argument_map("c1", "t", Value::Null).is_empty());
    }

    #[test]
    fn turn_event_wire_shape() {
        let ev = TurnEvent::Error {
            phase: TurnState::ToolsResolved,
            message: "x".into(),
        };
        assert_eq!(
            serde_json::to_value(&ev).unwrap(),
            json!({ "type": "error", "phase": "tools_resolved", "message": "x" })
        );
        let usage = TurnEvent::Usage {
            input_tokens: 1,
            output_tokens: 2,
            total_tokens: 3,
        };
        assert_eq!(serde_json::to_value(&usage).unwrap()["type"], "usage");
    }

    #[test]
    fn text_parts_merge_until_a_tool_use() {
        let mut response = LlmResponse::default();
        response.push_text("thin");
        response.push_text("king");
        response.parts.push(ContentPart::ToolUse {
            id: "c1".into(),
            name: "calc-add".into(),
            input: json!({}),
        });
        response.push_text("after");
        assert_eq!(response.parts.len(), 3);
        assert!(matches!(&response.parts[0], ContentPart::Text { text } if text == "thinking"));
        assert!(matches!(&response.parts[1], ContentPart::ToolUse { id, .. } if id == "c1"));
        assert!(matches!(&response.parts[2], ContentPart::Text { text } if text == "after"));
    }

    #[test]
    fn empty_streamed_arguments_become_an_object() {
        assert_eq!(streamed_arguments("  ".into()), json!({}));
        assert_eq!(streamed_arguments("{\"a\":1}".into()), json!("{\"a\":1}"));
    }
}
