//! Callable tool backends for Palaver.
//!
//! Every backend exposes its operations through the [`ToolGroup`] trait:
//! - [`remote`]: operations listed by a remote tool server.
//! - [`rest`]: operations described by an OpenAPI document.
//! - [`native`]: in-process tools instantiated from registered templates.
//!
//! Groups are merged into one flat [`ToolSet`] per turn, and anything that
//! holds a connection is tracked by [`ScopedResources`] until the turn ends.

pub mod group;
pub mod native;
pub mod remote;
pub mod rest;
pub mod scope;
pub mod web_fetch;

pub use group::{group_slug, render_result, tool_name, ReturnKind, ToolEntry, ToolError, ToolGroup, ToolOperation, ToolSet};
pub use native::{NativeTool, NativeToolGroup, NativeToolRegistry};
pub use remote::RemoteToolGroup;
pub use rest::{ApiOperation, ApiParameter, ParamLocation, RestApiGroup, SpecParser};
pub use scope::{Release, ScopedResources};
