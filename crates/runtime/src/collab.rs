//! Collaborators the runtime consumes but does not implement: object
//! storage and the knowledge subsystem. The defaults here are what a
//! runtime gets when the embedding application does not wire its own.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use pv_domain::error::{Error, Result};
use pv_tools::{ApiOperation, SpecParser, ToolError, ToolGroup};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Storage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// File/object storage addressed by key.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn fetch_bytes(&self, key: &str) -> Result<Vec<u8>>;

    /// Local filesystem path backing `key`.
    async fn resolve_local_path(&self, key: &str) -> Result<PathBuf>;
}

/// Storage over a local directory. Keys are relative paths; anything that
/// would escape the root is rejected.
pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if key.is_empty() || escapes {
            return Err(Error::Storage(format!("invalid storage key: {key}")));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl Storage for DirStorage {
    async fn fetch_bytes(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("file {key}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn resolve_local_path(&self, key: &str) -> Result<PathBuf> {
        self.path_for(key)
    }
}

/// Storage that holds nothing.
pub struct NoStorage;

#[async_trait]
impl Storage for NoStorage {
    async fn fetch_bytes(&self, key: &str) -> Result<Vec<u8>> {
        Err(Error::NotFound(format!("file {key}")))
    }

    async fn resolve_local_path(&self, key: &str) -> Result<PathBuf> {
        Err(Error::NotFound(format!("file {key}")))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Knowledge
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One knowledge tool group. `name` is the group name without the
/// reserved knowledge prefix; the resolver adds it.
#[derive(Clone)]
pub struct KnowledgeGroup {
    pub name: String,
    pub group: Arc<dyn ToolGroup>,
}

/// Groups built for a set of knowledge bases, plus display names keyed by
/// group name.
#[derive(Clone, Default)]
pub struct KnowledgeTools {
    pub groups: Vec<KnowledgeGroup>,
    pub display_names: HashMap<String, String>,
}

#[async_trait]
pub trait KnowledgeBuilder: Send + Sync {
    async fn build_knowledge_tools(&self, model: &str, kb_ids: &[String]) -> Result<KnowledgeTools>;
}

/// Knowledge builder for deployments without a knowledge subsystem.
pub struct NoKnowledge;

#[async_trait]
impl KnowledgeBuilder for NoKnowledge {
    async fn build_knowledge_tools(&self, _model: &str, kb_ids: &[String]) -> Result<KnowledgeTools> {
        if !kb_ids.is_empty() {
            tracing::warn!(count = kb_ids.len(), "knowledge bases enabled but no knowledge builder configured");
        }
        Ok(KnowledgeTools::default())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Spec parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parser used when none is configured: every REST tool fails to resolve.
pub struct NoSpecParser;

impl SpecParser for NoSpecParser {
    fn parse_openapi(&self, _bytes: &[u8]) -> std::result::Result<Vec<ApiOperation>, ToolError> {
        Err(ToolError::Config("no API description parser configured".into()))
    }
}
