//! Wraps every tool invocation of a turn and keeps the matching ToolCall
//! event in step with it.

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::Instrument;

use pv_domain::history::{EventState, ToolCallEvent};
use pv_domain::session::ToolKind;
use pv_domain::trace::TraceEvent;
use pv_tools::{render_result, ToolEntry, ToolError};

use super::cancel::CancelToken;
use super::cursor::TurnCursor;
use super::turn::{TurnError, TurnEvent};

/// One tool call requested by the model.
pub struct ToolInvocation<'a> {
    pub call_id: &'a str,
    pub tool_name: &'a str,
    pub arguments: Map<String, Value>,
    /// The resolved tool, or `None` when the model named an unknown tool.
    pub entry: Option<&'a ToolEntry>,
}

pub struct InvocationTracker<'a> {
    knowledge_prefix: &'a str,
    events: &'a mpsc::Sender<TurnEvent>,
    cancel: &'a CancelToken,
}

impl<'a> InvocationTracker<'a> {
    pub fn new(knowledge_prefix: &'a str, events: &'a mpsc::Sender<TurnEvent>, cancel: &'a CancelToken) -> Self {
        Self {
            knowledge_prefix,
            events,
            cancel,
        }
    }

    /// Knowledge tools are recognised by their reserved prefix; anything
    /// else keeps the kind the resolver tagged it with.
    pub fn classify(&self, tool_name: &str, resolved: Option<ToolKind>) -> ToolKind {
        if tool_name.starts_with(self.knowledge_prefix) {
            ToolKind::Knowledge
        } else {
            resolved.unwrap_or(ToolKind::NativeInProcess)
        }
    }

    /// Run one invocation against the cursor's open ToolCall event.
    ///
    /// Returns the rendered result. A failing tool leaves its event in
    /// `Error` and the failure is returned so the turn fails with it.
    pub async fn invoke(&self, cursor: &mut TurnCursor, call: ToolInvocation<'_>) -> Result<String, TurnError> {
        let kind = self.classify(call.tool_name, call.entry.map(|e| e.kind));
        let display_name = call
            .entry
            .map(|e| e.display_name.clone())
            .unwrap_or_else(|| call.tool_name.to_owned());

        let (event, synthesized) = cursor.open_or_insert_tool_call(|| {
            let mut synth = ToolCallEvent::new(call.call_id, call.tool_name, display_name.clone(), kind);
            synth.synthesized = true;
            synth
        });
        if synthesized {
            tracing::warn!(call_id = %call.call_id, tool = %call.tool_name, "no open tool call event, synthesized one");
            TraceEvent::ToolEventSynthesized {
                call_id: call.call_id.to_owned(),
                tool_key: call.tool_name.to_owned(),
            }
            .emit();
        }

        event.state = EventState::Processing;
        if let Some(open) = event.as_tool_mut() {
            if open.call_id != call.call_id {
                tracing::warn!(open = %open.call_id, call_id = %call.call_id, "open tool call id differs from invocation");
            }
            open.arguments = call.arguments.clone();
            open.tool_kind = kind;
        }
        self.forward(TurnEvent::ToolCall { event: event.clone() }).await;

        let span = tracing::info_span!(
            "tool.call",
            tool = %call.tool_name,
            call_id = %call.call_id,
            kind = ?kind,
            is_error = tracing::field::Empty,
        );
        let outcome = async {
            let Some(entry) = call.entry else {
                return Some(Err(ToolError::UnknownOperation(call.tool_name.to_owned())));
            };
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                result = entry.invoke(&call.arguments) => {
                    Some(result.map(|value| render_result(entry.operation.returns, &value)))
                }
            }
        }
        .instrument(span.clone())
        .await;

        match outcome {
            None => {
                event.state = EventState::Error;
                if let Some(open) = event.as_tool_mut() {
                    open.error_message = Some("cancelled".into());
                }
                Err(TurnError::Cancelled)
            }
            Some(Ok(result)) => {
                span.record("is_error", false);
                event.state = EventState::End;
                if let Some(done) = event.as_tool_mut() {
                    done.result = result.clone();
                }
                self.forward(TurnEvent::ToolResult { event: event.clone() }).await;
                Ok(result)
            }
            Some(Err(e)) => {
                span.record("is_error", true);
                let message = e.to_string();
                tracing::warn!(tool = %call.tool_name, call_id = %call.call_id, error = %message, "tool call failed");
                event.state = EventState::Error;
                if let Some(failed) = event.as_tool_mut() {
                    failed.error_message = Some(message.clone());
                }
                self.forward(TurnEvent::ToolResult { event: event.clone() }).await;
                Err(TurnError::Tool {
                    tool: call.tool_name.to_owned(),
                    message,
                })
            }
        }
    }

    async fn forward(&self, event: TurnEvent) {
        let _ = self.events.send(event).await;
    }
}
