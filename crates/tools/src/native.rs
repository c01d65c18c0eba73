//! In-process tools instantiated from registered templates.
//!
//! A template is a factory keyed by name. Each turn that enables a native
//! tool gets a fresh instance, configured from the descriptor's stored JSON.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::group::{ToolError, ToolGroup, ToolOperation};
use crate::scope::Release;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// NativeTool trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
pub trait NativeTool: Send + Sync {
    /// Apply the stored configuration. Called once, before any operation.
    fn configure(&mut self, config: &Value) -> anyhow::Result<()>;

    fn operations(&self) -> Vec<ToolOperation>;

    async fn invoke(&self, operation: &str, arguments: &Map<String, Value>) -> anyhow::Result<Value>;

    /// Whether the instance holds resources that [`dispose`](Self::dispose)
    /// must free at the end of the turn.
    fn is_disposable(&self) -> bool {
        false
    }

    async fn dispose(&self) {}
}

pub type NativeToolFactory = Arc<dyn Fn() -> anyhow::Result<Box<dyn NativeTool>> + Send + Sync>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Template key → factory.
#[derive(Default, Clone)]
pub struct NativeToolRegistry {
    factories: HashMap<String, NativeToolFactory>,
}

impl NativeToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in templates.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(crate::web_fetch::TEMPLATE, || {
            Ok(Box::new(crate::web_fetch::WebFetchTool::new()?) as Box<dyn NativeTool>)
        });
        registry
    }

    /// Register a template. Returns self for chaining.
    pub fn register<F>(&mut self, template: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> anyhow::Result<Box<dyn NativeTool>> + Send + Sync + 'static,
    {
        self.factories.insert(template.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, template: &str) -> bool {
        self.factories.contains_key(template)
    }

    /// Template keys, sorted.
    pub fn templates(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.factories.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Build and configure a new instance of `template`.
    pub fn instantiate(&self, template: &str, config: &Value) -> Result<NativeToolGroup, ToolError> {
        let factory = self
            .factories
            .get(template)
            .ok_or_else(|| ToolError::Config(format!("unknown native template: {template}")))?;
        let mut tool = factory().map_err(|e| ToolError::Config(format!("{template}: {e:#}")))?;
        tool.configure(config)
            .map_err(|e| ToolError::Config(format!("{template}: {e:#}")))?;
        Ok(NativeToolGroup {
            template: template.to_owned(),
            tool: Arc::from(tool),
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Group adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A configured native instance exposed as a [`ToolGroup`].
pub struct NativeToolGroup {
    template: String,
    tool: Arc<dyn NativeTool>,
}

impl NativeToolGroup {
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn is_disposable(&self) -> bool {
        self.tool.is_disposable()
    }
}

#[async_trait]
impl ToolGroup for NativeToolGroup {
    fn operations(&self) -> Vec<ToolOperation> {
        self.tool.operations()
    }

    async fn invoke(&self, operation: &str, arguments: &Map<String, Value>) -> Result<Value, ToolError> {
        if !self.tool.operations().iter().any(|op| op.name == operation) {
            return Err(ToolError::UnknownOperation(format!("{}.{operation}", self.template)));
        }
        self.tool
            .invoke(operation, arguments)
            .await
            .map_err(|e| ToolError::Failed(e.to_string()))
    }
}

#[async_trait]
impl Release for NativeToolGroup {
    fn label(&self) -> String {
        format!("native:{}", self.template)
    }

    async fn release(&self) {
        self.tool.dispose().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::ReturnKind;
    use serde_json::json;

    #[derive(Default)]
    struct Greeter {
        greeting: String,
    }

    #[async_trait]
    impl NativeTool for Greeter {
        fn configure(&mut self, config: &Value) -> anyhow::Result<()> {
            self.greeting = match config.get("greeting") {
                None => "hello".into(),
                Some(Value::String(s)) => s.clone(),
                Some(_) => anyhow::bail!("greeting must be a string"),
            };
            Ok(())
        }
        fn operations(&self) -> Vec<ToolOperation> {
            vec![ToolOperation::new(
                "greet",
                "Greet someone",
                json!({ "type": "object", "properties": { "name": { "type": "string" } } }),
                ReturnKind::Scalar,
            )]
        }
        async fn invoke(&self, _operation: &str, arguments: &Map<String, Value>) -> anyhow::Result<Value> {
            let name = arguments
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow::anyhow!("name is required"))?;
            Ok(json!(format!("{}, {name}", self.greeting)))
        }
    }

    fn registry() -> NativeToolRegistry {
        let mut reg = NativeToolRegistry::new();
        reg.register("greeter", || Ok(Box::new(Greeter::default()) as Box<dyn NativeTool>));
        reg
    }

    #[tokio::test]
    async fn instantiate_applies_config() {
        let group = registry().instantiate("greeter", &json!({ "greeting": "hej" })).unwrap();
        let mut args = Map::new();
        args.insert("name".into(), json!("Ada"));
        assert_eq!(group.invoke("greet", &args).await.unwrap(), json!("hej, Ada"));
        assert!(!group.is_disposable());
    }

    #[test]
    fn bad_config_is_config_error() {
        let err = registry().instantiate("greeter", &json!({ "greeting": 5 })).err().unwrap();
        match err {
            ToolError::Config(msg) => assert!(msg.contains("greeting must be a string")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_template_is_config_error() {
        assert!(matches!(
            registry().instantiate("nope", &Value::Null),
            Err(ToolError::Config(_))
        ));
    }

    #[tokio::test]
    async fn failure_message_is_kept_verbatim() {
        let group = registry().instantiate("greeter", &Value::Null).unwrap();
        let err = group.invoke("greet", &Map::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "name is required");
    }

    #[tokio::test]
    async fn unknown_operation_is_rejected() {
        let group = registry().instantiate("greeter", &Value::Null).unwrap();
        let err = group.invoke("shout", &Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::UnknownOperation(_)));
    }

    #[test]
    fn builtins_include_web_fetch() {
        assert_eq!(NativeToolRegistry::with_builtins().templates(), vec!["web_fetch".to_string()]);
    }
}
