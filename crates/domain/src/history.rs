//! Persisted conversation history: the [`Event`] blocks that make up a turn
//! and the [`HistoryRecord`] rows that store them.
//!
//! An event carries a lifecycle [`EventState`] that only moves during live
//! streaming. Persisted records only ever contain terminal states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::session::ToolKind;
use crate::tool::Role;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Text,
    File,
    Tool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventState {
    Start,
    Processing,
    End,
    Error,
}

impl EventState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventState::End | EventState::Error)
    }
}

/// A single unit of conversational content with its lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub state: EventState,
    #[serde(flatten)]
    pub body: EventBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventBody {
    Text { content: String },
    File { file_key: String },
    Tool(ToolCallEvent),
}

/// One tool invocation as seen by the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallEvent {
    pub call_id: String,
    /// The name the model used to call the tool.
    pub tool_key: String,
    pub tool_display_name: String,
    pub tool_kind: ToolKind,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    #[serde(default)]
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Set when the tracker had to fabricate this event because no open
    /// tool call was found for an invocation.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub synthesized: bool,
}

impl ToolCallEvent {
    pub fn new(
        call_id: impl Into<String>,
        tool_key: impl Into<String>,
        tool_display_name: impl Into<String>,
        tool_kind: ToolKind,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_key: tool_key.into(),
            tool_display_name: tool_display_name.into(),
            tool_kind,
            arguments: Map::new(),
            result: String::new(),
            error_message: None,
            synthesized: false,
        }
    }
}

impl Event {
    /// A finished text block.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            state: EventState::End,
            body: EventBody::Text { content: content.into() },
        }
    }

    /// A finished file reference.
    pub fn file(file_key: impl Into<String>) -> Self {
        Self {
            state: EventState::End,
            body: EventBody::File { file_key: file_key.into() },
        }
    }

    pub fn tool(call: ToolCallEvent, state: EventState) -> Self {
        Self { state, body: EventBody::Tool(call) }
    }

    pub fn kind(&self) -> EventKind {
        match self.body {
            EventBody::Text { .. } => EventKind::Text,
            EventBody::File { .. } => EventKind::File,
            EventBody::Tool(_) => EventKind::Tool,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.body {
            EventBody::Text { content } => Some(content),
            _ => None,
        }
    }

    pub fn as_tool(&self) -> Option<&ToolCallEvent> {
        match &self.body {
            EventBody::Tool(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_tool_mut(&mut self) -> Option<&mut ToolCallEvent> {
        match &mut self.body {
            EventBody::Tool(call) => Some(call),
            _ => None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// History records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A persisted history row. `content` holds the encoded event list and
/// `role` the lowercase role name, both as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub session_id: String,
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(session_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            role: role.as_str().to_owned(),
            content: content.into(),
            completion_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The parsed role, or `None` when the stored role is unrecognized.
    pub fn role(&self) -> Option<Role> {
        Role::parse(&self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_event_wire_shape() {
        let json = serde_json::to_value(Event::text("hi")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "state": "end", "kind": "text", "content": "hi" })
        );
    }

    #[test]
    fn tool_event_roundtrips_through_json() {
        let mut call = ToolCallEvent::new("c1", "weather-lookup", "Weather", ToolKind::NativeInProcess);
        call.arguments.insert("city".into(), Value::String("Oslo".into()));
        call.result = "rainy".into();
        let event = Event::tool(call, EventState::End);

        let raw = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, event);
        assert_eq!(parsed.kind(), EventKind::Tool);
        assert!(!raw.contains("synthesized"));
    }

    #[test]
    fn terminal_states() {
        assert!(EventState::End.is_terminal());
        assert!(EventState::Error.is_terminal());
        assert!(!EventState::Start.is_terminal());
        assert!(!EventState::Processing.is_terminal());
    }

    #[test]
    fn unknown_role_is_none() {
        let mut rec = HistoryRecord::new("s1", Role::User, "[]");
        rec.role = "narrator".into();
        assert!(rec.role().is_none());
    }
}
