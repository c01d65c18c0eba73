//! History codec: stored event lists to provider messages and back.
//!
//! A record's `content` is the JSON array form of its [`Event`] list.
//! Decoding never fails: records with an unknown role or content that does
//! not parse are skipped with a warning so one bad row cannot break a
//! session.

use pv_domain::error::Result;
use pv_domain::history::{Event, EventBody, EventState, HistoryRecord, ToolCallEvent};
use pv_domain::tool::{Message, Role};
use pv_domain::trace::TraceEvent;
use serde_json::Value;

/// Serialize an event list into the stored content form.
pub fn encode(events: &[Event]) -> Result<String> {
    Ok(serde_json::to_string(events)?)
}

/// Expand an event list into the messages a record of `role` contributes
/// to a model request.
///
/// User and system records contribute their first text event only.
/// Assistant and tool records contribute every text event as an assistant
/// message and every tool event as a tool-use/tool-result pair.
pub fn expand_events(role: Role, events: &[Event]) -> Vec<Message> {
    match role {
        Role::User | Role::System => events
            .iter()
            .find_map(Event::as_text)
            .map(|text| vec![Message::text(role, text)])
            .unwrap_or_default(),
        Role::Assistant | Role::Tool => {
            let mut out = Vec::with_capacity(events.len());
            for event in events {
                match &event.body {
                    EventBody::Text { content } => out.push(Message::assistant(content.clone())),
                    EventBody::Tool(call) => {
                        let (use_msg, result_msg) = tool_messages(call, event.state);
                        out.push(use_msg);
                        out.push(result_msg);
                    }
                    EventBody::File { .. } => {}
                }
            }
            out
        }
    }
}

fn tool_messages(call: &ToolCallEvent, state: EventState) -> (Message, Message) {
    let use_msg = Message::tool_use(
        call.call_id.clone(),
        call.tool_key.clone(),
        Value::Object(call.arguments.clone()),
    );
    let result_msg = if state == EventState::Error {
        let message = call
            .error_message
            .clone()
            .unwrap_or_else(|| call.result.clone());
        Message::tool_outcome(call.call_id.clone(), message, true)
    } else {
        Message::tool_result(call.call_id.clone(), call.result.clone())
    };
    (use_msg, result_msg)
}

/// Parse a record's role and event list.
fn parse_record(record: &HistoryRecord) -> std::result::Result<(Role, Vec<Event>), String> {
    let role = record
        .role()
        .ok_or_else(|| format!("unknown role {:?}", record.role))?;
    let events: Vec<Event> =
        serde_json::from_str(&record.content).map_err(|e| format!("undecodable content: {e}"))?;
    Ok((role, events))
}

fn skip(record: &HistoryRecord, reason: String) {
    tracing::warn!(
        record_id = %record.id,
        session_id = %record.session_id,
        reason = %reason,
        "skipping history record"
    );
    TraceEvent::HistoryRecordSkipped {
        record_id: record.id.clone(),
        reason,
    }
    .emit();
}

/// Decode one stored record into messages. Bad records yield nothing.
pub fn decode(record: &HistoryRecord) -> Vec<Message> {
    match parse_record(record) {
        Ok((role, events)) => expand_events(role, &events),
        Err(reason) => {
            skip(record, reason);
            Vec::new()
        }
    }
}

/// Decode a whole history, in the order given.
pub fn restore(records: &[HistoryRecord]) -> Vec<Message> {
    records.iter().flat_map(decode).collect()
}

/// Plain text of a record for transcript flattening.
///
/// Text events are joined by newlines and tool events are summarized on
/// their own line. Content that cannot be decoded is returned as stored.
pub fn record_text(record: &HistoryRecord) -> String {
    let events: Vec<Event> = match serde_json::from_str(&record.content) {
        Ok(events) => events,
        Err(_) => return record.content.clone(),
    };

    let mut lines = Vec::new();
    for event in &events {
        match &event.body {
            EventBody::Text { content } => lines.push(content.clone()),
            EventBody::File { file_key } => lines.push(format!("[file {file_key}]")),
            EventBody::Tool(call) => {
                let outcome = match (&event.state, &call.error_message) {
                    (EventState::Error, Some(msg)) => format!("failed: {msg}"),
                    _ => call.result.clone(),
                };
                lines.push(format!("[tool {}] {}", call.tool_display_name, outcome));
            }
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pv_domain::session::ToolKind;
    use pv_domain::tool::{ContentPart, MessageContent};

    fn record(role: &str, content: &str) -> HistoryRecord {
        let mut rec = HistoryRecord::new("s1", Role::User, content);
        rec.role = role.to_owned();
        rec
    }

    fn tool_event(state: EventState, result: &str, error: Option<&str>) -> Event {
        let mut call = ToolCallEvent::new("call_1", "weather-lookup", "Weather", ToolKind::NativeInProcess);
        call.arguments.insert("city".into(), Value::String("Oslo".into()));
        call.result = result.into();
        call.error_message = error.map(str::to_owned);
        Event::tool(call, state)
    }

    #[test]
    fn user_record_uses_first_text_only() {
        let events = vec![Event::file("uploads/a.pdf"), Event::text("hello"), Event::text("ignored")];
        let rec = record("user", &encode(&events).unwrap());
        let msgs = decode(&rec);
        assert_eq!(msgs, vec![Message::user("hello")]);
    }

    #[test]
    fn user_record_without_text_contributes_nothing() {
        let rec = record("user", &encode(&[Event::file("a.png")]).unwrap());
        assert!(decode(&rec).is_empty());
    }

    #[test]
    fn assistant_record_expands_tool_calls() {
        let events = vec![
            Event::text("let me check"),
            tool_event(EventState::End, "rainy", None),
            Event::text("it is rainy"),
        ];
        let rec = record("assistant", &encode(&events).unwrap());
        let msgs = decode(&rec);
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0], Message::assistant("let me check"));
        match &msgs[1].content {
            MessageContent::Parts(parts) => match &parts[0] {
                ContentPart::ToolUse { id, name, input } => {
                    assert_eq!(id, "call_1");
                    assert_eq!(name, "weather-lookup");
                    assert_eq!(input["city"], "Oslo");
                }
                other => panic!("expected tool_use, got {other:?}"),
            },
            other => panic!("expected parts, got {other:?}"),
        }
        assert_eq!(msgs[2], Message::tool_result("call_1", "rainy"));
        assert_eq!(msgs[3], Message::assistant("it is rainy"));
    }

    #[test]
    fn errored_tool_call_becomes_error_result() {
        let events = vec![tool_event(EventState::Error, "", Some("boom"))];
        let rec = record("assistant", &encode(&events).unwrap());
        let msgs = decode(&rec);
        assert_eq!(msgs[1], Message::tool_outcome("call_1", "boom", true));
    }

    #[test]
    fn corrupt_and_unknown_records_are_skipped() {
        let good = record("user", &encode(&[Event::text("hi")]).unwrap());
        let corrupt = record("assistant", "{not json");
        let unknown = record("narrator", &encode(&[Event::text("once upon")]).unwrap());
        let msgs = restore(&[corrupt, good, unknown]);
        assert_eq!(msgs, vec![Message::user("hi")]);
    }

    #[test]
    fn record_text_flattens_events() {
        let events = vec![Event::text("checking"), tool_event(EventState::Error, "", Some("boom"))];
        let rec = record("assistant", &encode(&events).unwrap());
        assert_eq!(record_text(&rec), "checking\n[tool Weather] failed: boom");
    }

    #[test]
    fn record_text_falls_back_to_raw_content() {
        let rec = record("user", "plain legacy text");
        assert_eq!(record_text(&rec), "plain legacy text");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use pv_domain::session::ToolKind;
    use serde_json::Map;

    fn arb_kind() -> impl Strategy<Value = ToolKind> {
        prop_oneof![
            Just(ToolKind::RemoteToolServer),
            Just(ToolKind::RestDescribedApi),
            Just(ToolKind::NativeInProcess),
            Just(ToolKind::Knowledge),
        ]
    }

    fn arb_tool_event() -> impl Strategy<Value = Event> {
        (
            "[a-z0-9_]{1,12}",
            "[a-z_-]{1,20}",
            ".{0,20}",
            arb_kind(),
            prop::collection::btree_map("[a-z]{1,6}", ".{0,12}", 0..4),
            ".{0,40}",
            proptest::option::of(".{1,20}"),
            any::<bool>(),
        )
            .prop_map(|(call_id, key, display, kind, args, result, error, failed)| {
                let mut call = ToolCallEvent::new(call_id, key, display, kind);
                call.arguments = args
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect::<Map<String, Value>>();
                call.result = result;
                call.error_message = error;
                let state = if failed { EventState::Error } else { EventState::End };
                Event::tool(call, state)
            })
    }

    fn arb_event() -> impl Strategy<Value = Event> {
        prop_oneof![
            ".{0,60}".prop_map(Event::text),
            "[a-z/]{1,20}\\.(png|pdf)".prop_map(Event::file),
            arb_tool_event(),
        ]
    }

    fn arb_role() -> impl Strategy<Value = Role> {
        prop_oneof![
            Just(Role::User),
            Just(Role::System),
            Just(Role::Assistant),
            Just(Role::Tool),
        ]
    }

    proptest! {
        #[test]
        fn decode_of_encode_matches_direct_expansion(
            role in arb_role(),
            events in prop::collection::vec(arb_event(), 0..8),
        ) {
            let content = encode(&events).unwrap();
            let rec = HistoryRecord::new("s1", role, content);
            prop_assert_eq!(decode(&rec), expand_events(role, &events));
        }
    }
}
