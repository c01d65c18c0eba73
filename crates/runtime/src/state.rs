use std::sync::Arc;

use pv_domain::config::Config;
use pv_providers::ProviderRegistry;
use pv_sessions::ChatStore;
use pv_tools::{NativeToolRegistry, SpecParser};

use crate::collab::{KnowledgeBuilder, NoKnowledge, NoSpecParser, NoStorage, Storage};
use crate::runtime::cancel::CancelMap;
use crate::runtime::session_lock::SessionLockMap;

/// Shared runtime state passed to every turn and compaction.
///
/// Fields are grouped by concern:
/// - **Core services**: config, persistence, completion providers
/// - **Collaborators**: storage, API description parser, knowledge builder
/// - **Tools**: native template registry
/// - **Coordination**: per-session locks and cancel tokens
#[derive(Clone)]
pub struct RuntimeState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub store: Arc<dyn ChatStore>,
    pub providers: Arc<ProviderRegistry>,

    // ── Collaborators ─────────────────────────────────────────────────
    pub storage: Arc<dyn Storage>,
    pub spec_parser: Arc<dyn SpecParser>,
    pub knowledge: Arc<dyn KnowledgeBuilder>,

    // ── Tools ─────────────────────────────────────────────────────────
    pub native_tools: Arc<NativeToolRegistry>,

    // ── Coordination ──────────────────────────────────────────────────
    pub session_locks: Arc<SessionLockMap>,
    pub cancel_map: Arc<CancelMap>,
}

impl RuntimeState {
    pub fn builder(
        config: Config,
        store: Arc<dyn ChatStore>,
        providers: ProviderRegistry,
    ) -> RuntimeStateBuilder {
        RuntimeStateBuilder {
            config,
            store,
            providers,
            storage: Arc::new(NoStorage),
            spec_parser: Arc::new(NoSpecParser),
            knowledge: Arc::new(NoKnowledge),
            native_tools: NativeToolRegistry::with_builtins(),
        }
    }
}

pub struct RuntimeStateBuilder {
    config: Config,
    store: Arc<dyn ChatStore>,
    providers: ProviderRegistry,
    storage: Arc<dyn Storage>,
    spec_parser: Arc<dyn SpecParser>,
    knowledge: Arc<dyn KnowledgeBuilder>,
    native_tools: NativeToolRegistry,
}

impl RuntimeStateBuilder {
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn spec_parser(mut self, parser: Arc<dyn SpecParser>) -> Self {
        self.spec_parser = parser;
        self
    }

    pub fn knowledge(mut self, builder: Arc<dyn KnowledgeBuilder>) -> Self {
        self.knowledge = builder;
        self
    }

    /// Replace the native template registry (defaults to the built-ins).
    pub fn native_tools(mut self, registry: NativeToolRegistry) -> Self {
        self.native_tools = registry;
        self
    }

    pub fn build(self) -> RuntimeState {
        for issue in self.config.validate() {
            tracing::warn!(%issue, "config issue");
        }
        RuntimeState {
            config: Arc::new(self.config),
            store: self.store,
            providers: Arc::new(self.providers),
            storage: self.storage,
            spec_parser: self.spec_parser,
            knowledge: self.knowledge,
            native_tools: Arc::new(self.native_tools),
            session_locks: Arc::new(SessionLockMap::new()),
            cancel_map: Arc::new(CancelMap::new()),
        }
    }
}
