//! Conversation history persistence for Palaver.
//!
//! The [`codec`] turns stored [`HistoryRecord`](pv_domain::history::HistoryRecord)
//! rows back into provider messages, and the [`store`] defines the
//! persistence boundary the runtime talks to, with a file-backed default.

pub mod codec;
pub mod store;

pub use codec::{decode, encode, expand_events, record_text, restore};
pub use store::{ChatStore, FileStore};
