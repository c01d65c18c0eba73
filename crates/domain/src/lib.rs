//! Shared domain types for Palaver: chat sessions, history events, provider
//! messages, stream events, configuration and the common error type.

pub mod capability;
pub mod config;
pub mod error;
pub mod history;
pub mod session;
pub mod stream;
pub mod tool;
pub mod trace;
