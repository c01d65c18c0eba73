//! The per-turn event list under construction.
//!
//! The orchestrator appends text and opens tool calls here; the tracker
//! drives the open tool call to a terminal state. At most one tool call is
//! open at a time.

use pv_domain::history::{Event, EventBody, EventState, ToolCallEvent};

#[derive(Debug, thiserror::Error)]
#[error("tool call {open} is still open, cannot start {requested}")]
pub struct ToolCallStillOpen {
    pub open: String,
    pub requested: String,
}

#[derive(Debug, Default)]
pub struct TurnCursor {
    events: Vec<Event>,
}

impl TurnCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Extend the current text block, or open a new one when the last
    /// event is not an open text block.
    pub fn append_text(&mut self, delta: &str) {
        if let Some(Event { state, body: EventBody::Text { content } }) = self.events.last_mut() {
            if !state.is_terminal() {
                content.push_str(delta);
                return;
            }
        }
        self.events.push(Event {
            state: EventState::Processing,
            body: EventBody::Text { content: delta.to_owned() },
        });
    }

    /// Open a tool call. Any open text block ends first.
    pub fn start_tool_call(&mut self, call: ToolCallEvent) -> Result<(), ToolCallStillOpen> {
        if let Some(open) = self.open_tool_call() {
            return Err(ToolCallStillOpen {
                open: open.call_id.clone(),
                requested: call.call_id,
            });
        }
        self.close_text();
        self.events.push(Event::tool(call, EventState::Start));
        Ok(())
    }

    /// The most recent event, if it is a tool call in Start or Processing.
    pub fn open_tool_call(&self) -> Option<&ToolCallEvent> {
        self.events
            .last()
            .filter(|e| !e.is_terminal())
            .and_then(Event::as_tool)
    }

    /// The open tool call event, or a new one built by `make` when none is
    /// open. The flag reports whether the event had to be inserted.
    pub fn open_or_insert_tool_call(&mut self, make: impl FnOnce() -> ToolCallEvent) -> (&mut Event, bool) {
        let inserted = self.open_tool_call().is_none();
        if inserted {
            self.close_text();
            self.events.push(Event::tool(make(), EventState::Start));
        }
        let last = self.events.len() - 1;
        (&mut self.events[last], inserted)
    }

    /// All text produced so far, concatenated.
    pub fn text(&self) -> String {
        self.events.iter().filter_map(Event::as_text).collect()
    }

    fn close_text(&mut self) {
        if let Some(last) = self.events.last_mut() {
            if last.as_text().is_some() && !last.is_terminal() {
                last.state = EventState::End;
            }
        }
    }

    /// End the turn's events. Text blocks are closed; a tool call that never
    /// finished is marked failed so only terminal states leave the cursor.
    pub fn finish(mut self) -> Vec<Event> {
        for event in &mut self.events {
            if event.is_terminal() {
                continue;
            }
            if let Some(call) = event.as_tool_mut() {
                call.error_message = Some("tool call did not complete".into());
                event.state = EventState::Error;
            } else {
                event.state = EventState::End;
            }
        }
        self.events
    }
}
