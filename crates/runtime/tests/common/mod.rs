#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

use pv_domain::capability::LlmCapabilities;
use pv_domain::config::Config;
use pv_domain::error::{Error, Result};
use pv_domain::stream::{BoxStream, StreamEvent, Usage};
use pv_providers::{ChatRequest, ChatResponse, LlmProvider, ProviderRegistry};
use pv_runtime::{CancelToken, RuntimeState, RuntimeStateBuilder, TurnEvent};
use pv_sessions::FileStore;
use pv_tools::{NativeTool, NativeToolRegistry, ReturnKind, ToolOperation};

pub const MODEL: &str = "fake/model";

// ── Scripted provider ───────────────────────────────────────────────

/// One `chat_stream` response. With `hang`, the stream stays open after
/// its events until dropped.
pub struct Step {
    pub events: Vec<StreamEvent>,
    pub hang: bool,
}

impl Step {
    pub fn new(events: Vec<StreamEvent>) -> Self {
        Self { events, hang: false }
    }

    pub fn hanging(events: Vec<StreamEvent>) -> Self {
        Self { events, hang: true }
    }
}

pub struct ScriptedProvider {
    caps: LlmCapabilities,
    steps: Mutex<VecDeque<Step>>,
    summary: Mutex<std::result::Result<String, String>>,
    pub stream_requests: Mutex<Vec<ChatRequest>>,
    pub chat_requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            caps: LlmCapabilities::chat(),
            steps: Mutex::new(steps.into()),
            summary: Mutex::new(Ok("The user and assistant discussed the project plan.".into())),
            stream_requests: Mutex::new(Vec::new()),
            chat_requests: Mutex::new(Vec::new()),
        })
    }

    pub fn set_summary(&self, reply: std::result::Result<String, String>) {
        *self.summary.lock() = reply;
    }

    pub fn calls(&self) -> usize {
        self.stream_requests.lock().len() + self.chat_requests.lock().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        self.chat_requests.lock().push(req);
        match self.summary.lock().clone() {
            Ok(content) => Ok(ChatResponse {
                content,
                tool_calls: Vec::new(),
                usage: Some(usage(40, 12)),
                model: "model".into(),
                finish_reason: Some("stop".into()),
            }),
            Err(message) => Err(Error::Provider {
                provider: "fake".into(),
                message,
            }),
        }
    }

    async fn chat_stream(&self, req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        self.stream_requests.lock().push(req);
        let step = self.steps.lock().pop_front().ok_or_else(|| Error::Provider {
            provider: "fake".into(),
            message: "script exhausted".into(),
        })?;
        let events = futures_util::stream::iter(step.events.into_iter().map(Ok));
        if step.hang {
            Ok(Box::pin(events.chain(futures_util::stream::pending())))
        } else {
            Ok(Box::pin(events))
        }
    }

    fn capabilities(&self) -> &LlmCapabilities {
        &self.caps
    }

    fn provider_id(&self) -> &str {
        "fake"
    }
}

// ── Stream event helpers ────────────────────────────────────────────

pub fn usage(prompt: u32, completion: u32) -> Usage {
    Usage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: prompt + completion,
    }
}

pub fn token(text: &str) -> StreamEvent {
    StreamEvent::Token { text: text.into() }
}

pub fn tool_call(call_id: &str, tool_name: &str, arguments: Value) -> StreamEvent {
    StreamEvent::ToolCallFinished {
        call_id: call_id.into(),
        tool_name: tool_name.into(),
        arguments,
    }
}

pub fn done(prompt: u32, completion: u32) -> StreamEvent {
    StreamEvent::Done {
        usage: Some(usage(prompt, completion)),
        finish_reason: Some("stop".into()),
        completion_id: None,
    }
}

// ── Native test tools ───────────────────────────────────────────────

/// `calc-add`: sums `a` and `b`.
pub struct Calc;

#[async_trait]
impl NativeTool for Calc {
    fn configure(&mut self, _config: &Value) -> anyhow::Result<()> {
        Ok(())
    }

    fn operations(&self) -> Vec<ToolOperation> {
        vec![ToolOperation::new(
            "add",
            "Add two integers",
            json!({ "type": "object", "properties": { "a": { "type": "integer" }, "b": { "type": "integer" } } }),
            ReturnKind::Scalar,
        )]
    }

    async fn invoke(&self, _operation: &str, arguments: &Map<String, Value>) -> anyhow::Result<Value> {
        let a = arguments.get("a").and_then(Value::as_i64).unwrap_or(0);
        let b = arguments.get("b").and_then(Value::as_i64).unwrap_or(0);
        Ok(json!(a + b))
    }
}

/// `boom-run`: always fails with "boom". Disposable, counting disposals.
pub struct Boom {
    pub disposed: Arc<AtomicUsize>,
}

#[async_trait]
impl NativeTool for Boom {
    fn configure(&mut self, _config: &Value) -> anyhow::Result<()> {
        Ok(())
    }

    fn operations(&self) -> Vec<ToolOperation> {
        vec![ToolOperation::new("run", "Explode", json!({ "type": "object" }), ReturnKind::Void)]
    }

    async fn invoke(&self, _operation: &str, _arguments: &Map<String, Value>) -> anyhow::Result<Value> {
        anyhow::bail!("boom")
    }

    fn is_disposable(&self) -> bool {
        true
    }

    async fn dispose(&self) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

/// `latch-hold`: disposing it cancels `token`, like a stop that lands
/// while the turn releases its tools.
pub struct Latch {
    pub token: CancelToken,
}

#[async_trait]
impl NativeTool for Latch {
    fn configure(&mut self, _config: &Value) -> anyhow::Result<()> {
        Ok(())
    }

    fn operations(&self) -> Vec<ToolOperation> {
        vec![ToolOperation::new("hold", "Hold the latch", json!({ "type": "object" }), ReturnKind::Void)]
    }

    async fn invoke(&self, _operation: &str, _arguments: &Map<String, Value>) -> anyhow::Result<Value> {
        Ok(Value::Null)
    }

    fn is_disposable(&self) -> bool {
        true
    }

    async fn dispose(&self) {
        self.token.cancel();
    }
}

pub fn natives(disposed: Arc<AtomicUsize>) -> NativeToolRegistry {
    let mut registry = NativeToolRegistry::new();
    registry.register("calc", || Ok(Box::new(Calc) as Box<dyn NativeTool>));
    registry.register("boom", move || {
        Ok(Box::new(Boom {
            disposed: disposed.clone(),
        }) as Box<dyn NativeTool>)
    });
    registry
}

// ── Runtime wiring ──────────────────────────────────────────────────

pub fn builder(provider: Arc<ScriptedProvider>, config: Config) -> (RuntimeStateBuilder, Arc<FileStore>) {
    let store = Arc::new(FileStore::in_memory());
    let mut providers = ProviderRegistry::new();
    providers.register(provider);
    (RuntimeState::builder(config, store.clone(), providers), store)
}

pub fn runtime(provider: Arc<ScriptedProvider>, config: Config, disposed: Arc<AtomicUsize>) -> (RuntimeState, Arc<FileStore>) {
    let (builder, store) = builder(provider, config);
    (builder.native_tools(natives(disposed)).build(), store)
}

/// Drain a turn's events until the channel closes.
pub async fn collect(mut rx: mpsc::Receiver<TurnEvent>) -> Vec<TurnEvent> {
    let mut events = Vec::new();
    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
    })
    .await;
    assert!(drained.is_ok(), "turn did not finish; got {events:?}");
    events
}
