//! Completion provider boundary for Palaver.
//!
//! Concrete model adapters live outside this workspace. They implement
//! [`LlmProvider`] and are registered with a [`ProviderRegistry`], which the
//! runtime uses to route a session's model id to a provider.

pub mod registry;
pub mod traits;

pub use registry::{ProviderRegistry, ResolvedModel};
pub use traits::{ChatRequest, ChatResponse, LlmProvider};
