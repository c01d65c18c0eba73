mod common;

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;
use pv_domain::config::Config;
use pv_domain::history::EventState;
use pv_domain::session::{ToolDescriptor, ToolKind};
use pv_runtime::{run_turn, CancelToken, SessionSeed, TurnEvent, TurnInput, TurnState};
use pv_sessions::ChatStore;

async fn mount_server(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "initialize" })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("mcp-session-id", "sess-9")
                .set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": {} })),
        )
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "notifications/initialized" })))
        .respond_with(ResponseTemplate::new(202))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "tools/list" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "result": { "tools": [{ "name": "search", "description": "Search the docs" }] }
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "tools/call", "params": { "name": "search" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "result": { "content": [{ "type": "text", "text": "3 matches" }] }
        })))
        .mount(server)
        .await;
}

fn docs_descriptor(url: String) -> ToolDescriptor {
    ToolDescriptor {
        id: "docs-server".into(),
        title: "Docs".into(),
        kind: ToolKind::RemoteToolServer,
        config: json!({ "url": url }),
    }
}

fn input() -> TurnInput {
    TurnInput {
        new_session: Some(SessionSeed {
            model: Some(MODEL.into()),
            tool_ids: vec!["docs-server".into()],
            ..SessionSeed::default()
        }),
        ..TurnInput::text("s1", "u1", "find the install guide")
    }
}

#[tokio::test]
async fn remote_tool_is_called_and_session_closed() {
    let server = MockServer::start().await;
    mount_server(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let provider = ScriptedProvider::new(vec![
        Step::new(vec![tool_call("c1", "docs-search", json!({ "q": "install" })), done(6, 2)]),
        Step::new(vec![token("Found it."), done(9, 3)]),
    ]);
    let (state, store) = runtime(provider.clone(), Config::default(), Arc::default());
    store.put_tool_descriptor(docs_descriptor(format!("{}/mcp", server.uri()))).unwrap();

    let events = collect(run_turn(state, input(), CancelToken::new()).unwrap()).await;

    let result = events
        .iter()
        .find_map(|e| match e {
            TurnEvent::ToolResult { event } => Some(event),
            _ => None,
        })
        .unwrap();
    assert_eq!(result.state, EventState::End);
    let call = result.as_tool().unwrap();
    assert_eq!(call.result, "3 matches");
    assert_eq!(call.tool_display_name, "Docs");
    assert_eq!(call.tool_kind, ToolKind::RemoteToolServer);

    assert!(events.iter().any(|e| matches!(e, TurnEvent::Final { content } if content == "Found it.")));
    assert_eq!(provider.stream_requests.lock()[0].tools[0].name, "docs-search");
    assert_eq!(store.list_history("s1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn unreachable_server_fails_resolution() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let provider = ScriptedProvider::new(Vec::new());
    let (state, store) = runtime(provider.clone(), Config::default(), Arc::default());
    store.put_tool_descriptor(docs_descriptor(format!("{}/mcp", server.uri()))).unwrap();

    let events = collect(run_turn(state, input(), CancelToken::new()).unwrap()).await;

    match events.last() {
        Some(TurnEvent::Error { phase, message }) => {
            assert_eq!(*phase, TurnState::HistoryRestored);
            assert!(message.contains("docs-server"), "{message}");
        }
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(provider.calls(), 0);
    assert!(store.load_session("s1").await.unwrap().is_none());
}
