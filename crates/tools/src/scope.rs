//! Per-turn ownership of tool backends that hold connections.
//!
//! The resolver registers every remote client, REST client and disposable
//! native instance here. The turn releases the scope on every exit path;
//! if the owning task is aborted first, `Drop` hands the pending releases
//! to the runtime instead.

use std::sync::Arc;

use async_trait::async_trait;

/// A resource that must be let go of when the turn ends.
#[async_trait]
pub trait Release: Send + Sync {
    /// Short label for logs.
    fn label(&self) -> String;

    async fn release(&self);
}

#[derive(Default)]
pub struct ScopedResources {
    items: Vec<Arc<dyn Release>>,
}

impl ScopedResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, resource: Arc<dyn Release>) {
        self.items.push(resource);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Release everything, most recently registered first. Later calls are
    /// no-ops.
    pub async fn release(&mut self) {
        let items = std::mem::take(&mut self.items);
        release_all(items).await;
    }
}

async fn release_all(items: Vec<Arc<dyn Release>>) {
    for item in items.into_iter().rev() {
        tracing::debug!(resource = %item.label(), "releasing turn resource");
        item.release().await;
    }
}

impl Drop for ScopedResources {
    fn drop(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let items = std::mem::take(&mut self.items);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!(count = items.len(), "turn resources dropped unreleased, releasing in background");
                handle.spawn(release_all(items));
            }
            Err(_) => {
                tracing::warn!(count = items.len(), "turn resources dropped outside a runtime, not released");
            }
        }
    }
}
