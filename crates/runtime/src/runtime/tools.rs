//! Tool resolution: turns a session's enabled tool ids and knowledge bases
//! into one flat callable [`ToolSet`] for the turn.
//!
//! Each [`ToolKind`] has its own resolver function. Remote tool servers
//! and REST APIs must resolve or the turn fails; native tools with a bad
//! config and unknown tool ids are skipped with a warning.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use pv_domain::session::{NativeToolConfig, RemoteServerConfig, RestApiConfig, ToolDescriptor, ToolKind};
use pv_domain::trace::TraceEvent;
use pv_mcp_client::{McpClient, RemoteEndpoint};
use pv_tools::{group_slug, RemoteToolGroup, RestApiGroup, ScopedResources, ToolSet};

use crate::state::RuntimeState;

use super::cancel::CancelToken;

/// Enabled-tool id prefix addressing a native template directly.
pub const CATALOG_PREFIX: &str = "catalog:";

/// The callable tool set of one turn. `scope` owns every backend that
/// holds a connection and must be released when the turn ends.
#[derive(Default)]
pub struct ResolvedTools {
    pub tools: ToolSet,
    /// Tool name → display name.
    pub display_names: HashMap<String, String>,
    pub scope: ScopedResources,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("tool {tool_id}: {message}")]
    Backend { tool_id: String, message: String },

    #[error("knowledge tools: {0}")]
    Knowledge(String),

    #[error("tool store: {0}")]
    Store(#[from] pv_domain::error::Error),

    #[error("cancelled")]
    Cancelled,
}

struct Resolver<'a> {
    state: &'a RuntimeState,
    cancel: &'a CancelToken,
    timeout: Duration,
    out: ResolvedTools,
    groups: usize,
}

/// Build the tool set for `tool_ids` plus knowledge bases `kb_ids`.
///
/// On failure every resource acquired so far is released before the
/// error is returned.
pub async fn resolve_tools(
    state: &RuntimeState,
    session_id: &str,
    tool_ids: &[String],
    kb_ids: &[String],
    model: &str,
    cancel: &CancelToken,
) -> Result<ResolvedTools, ResolveError> {
    let mut resolver = Resolver {
        state,
        cancel,
        timeout: Duration::from_secs(state.config.tools.request_timeout_secs),
        out: ResolvedTools::default(),
        groups: 0,
    };

    if let Err(e) = resolver.resolve_all(tool_ids, kb_ids, model).await {
        resolver.out.scope.release().await;
        return Err(e);
    }

    let Resolver { mut out, groups, .. } = resolver;
    out.display_names = out.tools.display_names();
    TraceEvent::ToolsResolved {
        session_id: session_id.to_owned(),
        groups,
        tools: out.tools.len(),
        scoped_resources: out.scope.len(),
    }
    .emit();
    Ok(out)
}

impl Resolver<'_> {
    async fn resolve_all(&mut self, tool_ids: &[String], kb_ids: &[String], model: &str) -> Result<(), ResolveError> {
        for tool_id in tool_ids {
            if self.cancel.is_cancelled() {
                return Err(ResolveError::Cancelled);
            }

            if let Some(template) = tool_id.strip_prefix(CATALOG_PREFIX) {
                let config = NativeToolConfig {
                    template: template.to_owned(),
                    config: serde_json::Value::Null,
                };
                self.resolve_native(tool_id, template, &config);
                continue;
            }

            let Some(descriptor) = self.state.store.get_tool_descriptor(tool_id).await? else {
                skip(tool_id, "unknown tool id");
                continue;
            };

            match descriptor.kind {
                ToolKind::RemoteToolServer => self.resolve_remote(&descriptor).await?,
                ToolKind::RestDescribedApi => self.resolve_rest(&descriptor).await?,
                ToolKind::NativeInProcess => match parse_config::<NativeToolConfig>(&descriptor) {
                    Ok(config) => self.resolve_native(&descriptor.id, &descriptor.title, &config),
                    Err(ResolveError::Backend { message, .. }) => skip(tool_id, &message),
                    Err(e) => return Err(e),
                },
                ToolKind::Knowledge => skip(tool_id, "knowledge tools are enabled through knowledge bases"),
            }
        }

        if !kb_ids.is_empty() {
            self.resolve_knowledge(model, kb_ids).await?;
        }
        Ok(())
    }

    /// Group name for a non-knowledge tool. Titles that would collide with
    /// the knowledge prefix are moved out of its namespace.
    fn group_name(&self, title: &str) -> String {
        let slug = group_slug(title);
        if slug.starts_with(&self.state.config.tools.knowledge_prefix) {
            format!("tool_{slug}")
        } else {
            slug
        }
    }

    async fn resolve_remote(&mut self, descriptor: &ToolDescriptor) -> Result<(), ResolveError> {
        let config: RemoteServerConfig = parse_config(descriptor)?;
        let endpoint = RemoteEndpoint::from_config(&config, self.timeout).map_err(|e| backend(descriptor, e))?;
        let name = self.group_name(&descriptor.title);

        let client = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ResolveError::Cancelled),
            connected = McpClient::connect(name.clone(), endpoint) => connected.map_err(|e| backend(descriptor, e))?,
        };
        tracing::debug!(tool_id = %descriptor.id, group = %name, tools = client.tools().len(), "connected remote tool server");

        let group = Arc::new(RemoteToolGroup::new(client));
        self.out.scope.register(group.clone());
        self.out
            .tools
            .add_group(&name, ToolKind::RemoteToolServer, &descriptor.title, group);
        self.groups += 1;
        Ok(())
    }

    async fn resolve_rest(&mut self, descriptor: &ToolDescriptor) -> Result<(), ResolveError> {
        let config: RestApiConfig = parse_config(descriptor)?;
        let bytes = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ResolveError::Cancelled),
            fetched = self.state.storage.fetch_bytes(&config.spec_file_key) => {
                fetched.map_err(|e| backend(descriptor, format!("API description {}: {e}", config.spec_file_key)))?
            }
        };
        let operations = self
            .state
            .spec_parser
            .parse_openapi(&bytes)
            .map_err(|e| backend(descriptor, e))?;
        let name = self.group_name(&descriptor.title);
        let group = Arc::new(
            RestApiGroup::new(name.clone(), &config, operations, self.timeout).map_err(|e| backend(descriptor, e))?,
        );

        self.out.scope.register(group.clone());
        self.out
            .tools
            .add_group(&name, ToolKind::RestDescribedApi, &descriptor.title, group);
        self.groups += 1;
        Ok(())
    }

    fn resolve_native(&mut self, tool_id: &str, title: &str, config: &NativeToolConfig) {
        let group = match self.state.native_tools.instantiate(&config.template, &config.config) {
            Ok(group) => Arc::new(group),
            Err(e) => {
                skip(tool_id, &e.to_string());
                return;
            }
        };
        if group.is_disposable() {
            self.out.scope.register(group.clone());
        }
        let name = self.group_name(title);
        self.out.tools.add_group(&name, ToolKind::NativeInProcess, title, group);
        self.groups += 1;
    }

    async fn resolve_knowledge(&mut self, model: &str, kb_ids: &[String]) -> Result<(), ResolveError> {
        let knowledge = self
            .state
            .knowledge
            .build_knowledge_tools(model, kb_ids)
            .await
            .map_err(|e| ResolveError::Knowledge(e.to_string()))?;

        let prefix = &self.state.config.tools.knowledge_prefix;
        for kb in knowledge.groups {
            let name = format!("{prefix}{}", group_slug(&kb.name));
            let display = knowledge
                .display_names
                .get(&kb.name)
                .cloned()
                .unwrap_or_else(|| kb.name.clone());
            self.out.tools.add_group(&name, ToolKind::Knowledge, &display, kb.group);
            self.groups += 1;
        }
        Ok(())
    }
}

fn parse_config<T: DeserializeOwned>(descriptor: &ToolDescriptor) -> Result<T, ResolveError> {
    serde_json::from_value(descriptor.config.clone())
        .map_err(|e| backend(descriptor, format!("invalid {:?} config: {e}", descriptor.kind)))
}

fn backend(descriptor: &ToolDescriptor, message: impl ToString) -> ResolveError {
    ResolveError::Backend {
        tool_id: descriptor.id.clone(),
        message: message.to_string(),
    }
}

fn skip(tool_id: &str, reason: &str) {
    tracing::warn!(tool_id = %tool_id, reason = %reason, "skipping tool");
    TraceEvent::ToolSkipped {
        tool_id: tool_id.to_owned(),
        reason: reason.to_owned(),
    }
    .emit();
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pv_domain::config::Config;
    use pv_providers::ProviderRegistry;
    use pv_sessions::FileStore;
    use pv_tools::{NativeTool, NativeToolRegistry, ReturnKind, ToolGroup, ToolOperation};
    use serde_json::{json, Map, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::collab::{KnowledgeBuilder, KnowledgeGroup, KnowledgeTools};

    struct Echo {
        disposed: Arc<AtomicUsize>,
        disposable: bool,
    }

    #[async_trait]
    impl NativeTool for Echo {
        fn configure(&mut self, config: &Value) -> anyhow::Result<()> {
            if config.get("broken").is_some() {
                anyhow::bail!("broken config");
            }
            self.disposable = config.get("disposable").and_then(Value::as_bool).unwrap_or(false);
            Ok(())
        }
        fn operations(&self) -> Vec<ToolOperation> {
            vec![ToolOperation::new("say", "Echo", json!({}), ReturnKind::Scalar)]
        }
        async fn invoke(&self, _op: &str, args: &Map<String, Value>) -> anyhow::Result<Value> {
            Ok(args.get("text").cloned().unwrap_or(Value::Null))
        }
        fn is_disposable(&self) -> bool {
            self.disposable
        }
        async fn dispose(&self) {
            self.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Docs;

    #[async_trait]
    impl ToolGroup for Docs {
        fn operations(&self) -> Vec<ToolOperation> {
            vec![ToolOperation::new("search", "Search", json!({}), ReturnKind::Scalar)]
        }
        async fn invoke(&self, _op: &str, _args: &Map<String, Value>) -> Result<Value, pv_tools::ToolError> {
            Ok(json!("hit"))
        }
    }

    struct FixedKnowledge;

    #[async_trait]
    impl KnowledgeBuilder for FixedKnowledge {
        async fn build_knowledge_tools(&self, _model: &str, kb_ids: &[String]) -> pv_domain::error::Result<KnowledgeTools> {
            let mut tools = KnowledgeTools::default();
            for id in kb_ids {
                tools.groups.push(KnowledgeGroup {
                    name: id.clone(),
                    group: Arc::new(Docs),
                });
                tools.display_names.insert(id.clone(), format!("Knowledge {id}"));
            }
            Ok(tools)
        }
    }

    fn state(disposed: Arc<AtomicUsize>) -> (RuntimeState, Arc<FileStore>) {
        let store = Arc::new(FileStore::in_memory());
        let mut natives = NativeToolRegistry::new();
        natives.register("echo", move || {
            Ok(Box::new(Echo {
                disposed: disposed.clone(),
                disposable: false,
            }) as Box<dyn NativeTool>)
        });
        let state = RuntimeState::builder(Config::default(), store.clone(), ProviderRegistry::new())
            .native_tools(natives)
            .knowledge(Arc::new(FixedKnowledge))
            .build();
        (state, store)
    }

    fn descriptor(id: &str, title: &str, kind: ToolKind, config: Value) -> ToolDescriptor {
        ToolDescriptor {
            id: id.into(),
            title: title.into(),
            kind,
            config,
        }
    }

    #[tokio::test]
    async fn native_catalog_and_knowledge_merge_into_one_set() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let (state, store) = state(disposed.clone());
        store
            .put_tool_descriptor(descriptor(
                "t1",
                "Echo Box",
                ToolKind::NativeInProcess,
                json!({ "template": "echo", "config": { "disposable": true } }),
            ))
            .unwrap();

        let ids = vec!["t1".to_string(), "catalog:echo".to_string(), "missing".to_string()];
        let mut resolved = resolve_tools(&state, "s1", &ids, &["handbook".into()], "m", &CancelToken::new())
            .await
            .unwrap();

        let mut names: Vec<&str> = resolved.tools.names().collect();
        names.sort();
        assert_eq!(names, vec!["echo-say", "echo_box-say", "kb_handbook-search"]);
        assert_eq!(resolved.display_names["echo_box-say"], "Echo Box");
        assert_eq!(resolved.display_names["kb_handbook-search"], "Knowledge handbook");
        assert_eq!(resolved.tools.get("kb_handbook-search").unwrap().kind, ToolKind::Knowledge);

        assert_eq!(resolved.scope.len(), 1);
        resolved.scope.release().await;
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bad_native_config_skips_only_that_tool() {
        let (state, store) = state(Arc::new(AtomicUsize::new(0)));
        store
            .put_tool_descriptor(descriptor(
                "bad",
                "Broken",
                ToolKind::NativeInProcess,
                json!({ "template": "echo", "config": { "broken": true } }),
            ))
            .unwrap();
        store
            .put_tool_descriptor(descriptor(
                "good",
                "Echo",
                ToolKind::NativeInProcess,
                json!({ "template": "echo" }),
            ))
            .unwrap();

        let ids = vec!["bad".to_string(), "good".to_string()];
        let resolved = resolve_tools(&state, "s1", &ids, &[], "m", &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(resolved.tools.names().collect::<Vec<_>>(), vec!["echo-say"]);
    }

    #[tokio::test]
    async fn knowledge_prefix_is_reserved() {
        let (state, store) = state(Arc::new(AtomicUsize::new(0)));
        store
            .put_tool_descriptor(descriptor(
                "t1",
                "KB Search",
                ToolKind::NativeInProcess,
                json!({ "template": "echo" }),
            ))
            .unwrap();
        let resolved = resolve_tools(&state, "s1", &["t1".into()], &[], "m", &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(resolved.tools.names().collect::<Vec<_>>(), vec!["tool_kb_search-say"]);
    }

    #[tokio::test]
    async fn missing_api_description_fails_and_releases() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let (state, store) = state(disposed.clone());
        store
            .put_tool_descriptor(descriptor(
                "echo",
                "Echo",
                ToolKind::NativeInProcess,
                json!({ "template": "echo", "config": { "disposable": true } }),
            ))
            .unwrap();
        store
            .put_tool_descriptor(descriptor(
                "api",
                "Pets",
                ToolKind::RestDescribedApi,
                json!({ "spec_file_key": "specs/pets.json", "server_url": "http://127.0.0.1:9" }),
            ))
            .unwrap();

        let err = resolve_tools(&state, "s1", &["echo".into(), "api".into()], &[], "m", &CancelToken::new())
            .await
            .err()
            .unwrap();
        match err {
            ResolveError::Backend { tool_id, message } => {
                assert_eq!(tool_id, "api");
                assert!(message.contains("specs/pets.json"), "{message}");
            }
            other => panic!("expected backend error, got {other:?}"),
        }
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let (state, _store) = state(Arc::new(AtomicUsize::new(0)));
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = resolve_tools(&state, "s1", &["catalog:echo".into()], &[], "m", &cancel)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ResolveError::Cancelled));
    }

    #[tokio::test]
    async fn default_registry_offers_web_fetch_from_the_catalog() {
        let store = Arc::new(FileStore::in_memory());
        let state = RuntimeState::builder(Config::default(), store, ProviderRegistry::new()).build();

        let resolved = resolve_tools(&state, "s1", &["catalog:web_fetch".into()], &[], "m", &CancelToken::new())
            .await
            .unwrap();

        let names: Vec<&str> = resolved.tools.names().collect();
        assert_eq!(names, vec!["web_fetch-fetch"]);
        assert_eq!(resolved.tools.get("web_fetch-fetch").unwrap().kind, ToolKind::NativeInProcess);
        assert!(resolved.scope.is_empty());
    }
}
