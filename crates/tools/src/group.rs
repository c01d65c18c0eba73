//! Tool groups and the flat per-turn tool set.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pv_domain::session::ToolKind;
use pv_domain::tool::ToolDefinition;
use serde_json::{Map, Value};

/// Longest tool name most providers accept.
pub const MAX_TOOL_NAME_LEN: usize = 64;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Operations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How an operation's return value is shown to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    /// Nothing meaningful is returned; the result is always empty.
    Void,
    /// A single value, stringified directly.
    Scalar,
    /// An object or array, serialized as JSON.
    Structured,
}

/// One callable operation of a group.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOperation {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: Value,
    pub returns: ReturnKind,
}

impl ToolOperation {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value, returns: ReturnKind) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            returns,
        }
    }
}

/// Render an invocation result according to the declared return kind.
pub fn render_result(kind: ReturnKind, value: &Value) -> String {
    match (kind, value) {
        (ReturnKind::Void, _) | (_, Value::Null) => String::new(),
        (ReturnKind::Scalar, Value::String(s)) => s.clone(),
        (ReturnKind::Scalar, other) => other.to_string(),
        (ReturnKind::Structured, other) => serde_json::to_string(other).unwrap_or_default(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The tool ran and reported a failure. Displayed verbatim.
    #[error("{0}")]
    Failed(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("tool configuration: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("tool unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for ToolError {
    fn from(e: reqwest::Error) -> Self {
        ToolError::Http(e.to_string())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolGroup trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A named collection of operations served by one backend.
#[async_trait]
pub trait ToolGroup: Send + Sync {
    fn operations(&self) -> Vec<ToolOperation>;

    async fn invoke(&self, operation: &str, arguments: &Map<String, Value>) -> Result<Value, ToolError>;
}

/// Exposed name of `operation` in `group`: `<group>-<operation>`,
/// restricted to `[A-Za-z0-9_-]` and capped in length.
pub fn tool_name(group: &str, operation: &str) -> String {
    let mut name: String = format!("{group}-{operation}")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    name.truncate(MAX_TOOL_NAME_LEN);
    name
}

/// Group name derived from a display title: lowercase with separators
/// collapsed to underscores.
pub fn group_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_').to_owned();
    if slug.is_empty() {
        "tool".into()
    } else {
        slug
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolSet
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One callable tool in a [`ToolSet`].
#[derive(Clone)]
pub struct ToolEntry {
    pub name: String,
    pub kind: ToolKind,
    pub display_name: String,
    pub operation: ToolOperation,
    pub group: Arc<dyn ToolGroup>,
}

impl ToolEntry {
    pub async fn invoke(&self, arguments: &Map<String, Value>) -> Result<Value, ToolError> {
        self.group.invoke(&self.operation.name, arguments).await
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.operation.description.clone(),
            parameters: self.operation.parameters.clone(),
        }
    }
}

/// Flat name → tool mapping for one turn. Registration order is kept.
#[derive(Default, Clone)]
pub struct ToolSet {
    entries: Vec<ToolEntry>,
    index: HashMap<String, usize>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every operation of `group` under `group_name`. Names already in
    /// the set keep their first registration. Returns how many were added.
    pub fn add_group(
        &mut self,
        group_name: &str,
        kind: ToolKind,
        display_name: &str,
        group: Arc<dyn ToolGroup>,
    ) -> usize {
        let mut added = 0;
        for operation in group.operations() {
            let name = tool_name(group_name, &operation.name);
            if self.index.contains_key(&name) {
                tracing::warn!(tool = %name, group = %group_name, "duplicate tool name, keeping first");
                continue;
            }
            self.index.insert(name.clone(), self.entries.len());
            self.entries.push(ToolEntry {
                name,
                kind,
                display_name: display_name.to_owned(),
                operation,
                group: group.clone(),
            });
            added += 1;
        }
        added
    }

    pub fn get(&self, name: &str) -> Option<&ToolEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.entries.iter().map(ToolEntry::definition).collect()
    }

    /// Tool name → display name.
    pub fn display_names(&self) -> HashMap<String, String> {
        self.entries
            .iter()
            .map(|e| (e.name.clone(), e.display_name.clone()))
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed(Vec<&'static str>);

    #[async_trait]
    impl ToolGroup for Fixed {
        fn operations(&self) -> Vec<ToolOperation> {
            self.0
                .iter()
                .map(|n| ToolOperation::new(*n, "test op", json!({ "type": "object" }), ReturnKind::Scalar))
                .collect()
        }
        async fn invoke(&self, operation: &str, _arguments: &Map<String, Value>) -> Result<Value, ToolError> {
            Ok(Value::String(operation.to_owned()))
        }
    }

    #[test]
    fn render_by_declared_kind() {
        assert_eq!(render_result(ReturnKind::Scalar, &json!("plain")), "plain");
        assert_eq!(render_result(ReturnKind::Scalar, &json!(42)), "42");
        assert_eq!(render_result(ReturnKind::Scalar, &json!(true)), "true");
        assert_eq!(render_result(ReturnKind::Structured, &json!({ "a": 1 })), r#"{"a":1}"#);
        // A structured operation returning a bare string still gets JSON.
        assert_eq!(render_result(ReturnKind::Structured, &json!("x")), "\"x\"");
        assert_eq!(render_result(ReturnKind::Void, &json!({ "ignored": true })), "");
        assert_eq!(render_result(ReturnKind::Structured, &Value::Null), "");
    }

    #[test]
    fn tool_name_is_sanitized_and_capped() {
        assert_eq!(tool_name("weather", "get forecast"), "weather-get_forecast");
        assert_eq!(tool_name("api", "pets.list/v2"), "api-pets_list_v2");
        let long = tool_name(&"g".repeat(50), &"o".repeat(50));
        assert_eq!(long.len(), MAX_TOOL_NAME_LEN);
    }

    #[test]
    fn group_slug_from_title() {
        assert_eq!(group_slug("  Pet Store API (v2) "), "pet_store_api_v2");
        assert_eq!(group_slug("***"), "tool");
    }

    #[tokio::test]
    async fn duplicate_names_keep_first() {
        let mut set = ToolSet::new();
        let first: Arc<dyn ToolGroup> = Arc::new(Fixed(vec!["ping", "echo"]));
        let second: Arc<dyn ToolGroup> = Arc::new(Fixed(vec!["ping"]));
        assert_eq!(set.add_group("net", ToolKind::NativeInProcess, "Net", first), 2);
        assert_eq!(set.add_group("net", ToolKind::RemoteToolServer, "Other", second), 0);

        let entry = set.get("net-ping").unwrap();
        assert_eq!(entry.kind, ToolKind::NativeInProcess);
        assert_eq!(entry.display_name, "Net");
        assert_eq!(entry.invoke(&Map::new()).await.unwrap(), json!("ping"));
        assert_eq!(set.definitions().len(), 2);
        assert_eq!(set.display_names()["net-echo"], "Net");
    }
}
