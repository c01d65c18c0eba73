//! Provider registry.
//!
//! Holds the registered completion providers and routes a model spec of the
//! form `"provider_id/model_name"` to the provider that serves it. A bare
//! model name goes to the default provider.

use std::collections::HashMap;
use std::sync::Arc;

use pv_domain::capability::LlmCapabilities;

use crate::traits::LlmProvider;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProviderRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    /// Per-model overrides of the provider's advertised capabilities,
    /// keyed by the full model spec.
    model_capabilities: HashMap<String, LlmCapabilities>,
    default_provider: Option<String>,
}

/// A model spec resolved to its provider.
#[derive(Clone)]
pub struct ResolvedModel {
    pub provider: Arc<dyn LlmProvider>,
    /// Model name with the provider prefix stripped.
    pub model: String,
    pub capabilities: LlmCapabilities,
}

impl ResolvedModel {
    pub fn supports_chat(&self) -> bool {
        self.capabilities.supports_chat
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own id. The first provider registered
    /// becomes the default.
    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        let id = provider.provider_id().to_owned();
        tracing::info!(provider_id = %id, "registered LLM provider");
        if self.default_provider.is_none() {
            self.default_provider = Some(id.clone());
        }
        self.providers.insert(id, provider);
    }

    pub fn set_default(&mut self, provider_id: impl Into<String>) {
        self.default_provider = Some(provider_id.into());
    }

    /// Override the capabilities of one model spec.
    pub fn set_model_capabilities(&mut self, model_spec: impl Into<String>, caps: LlmCapabilities) {
        self.model_capabilities.insert(model_spec.into(), caps);
    }

    /// Look up a provider by its id.
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// Resolve a model spec to its provider, or `None` if no provider
    /// serves it.
    pub fn resolve(&self, model_spec: &str) -> Option<ResolvedModel> {
        let (provider, model) = match model_spec.split_once('/') {
            Some((provider_id, model)) if self.providers.contains_key(provider_id) => {
                (self.providers.get(provider_id)?, model)
            }
            _ => {
                let default = self.default_provider.as_deref()?;
                (self.providers.get(default)?, model_spec)
            }
        };

        let capabilities = self
            .model_capabilities
            .get(model_spec)
            .cloned()
            .unwrap_or_else(|| provider.capabilities().clone());

        Some(ResolvedModel {
            provider: provider.clone(),
            model: model.to_owned(),
            capabilities,
        })
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// List all registered provider IDs (sorted).
    pub fn list_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }
}
