//! Conversational turn runtime for Palaver.
//!
//! Ties the history codec, tool backends and completion providers into
//! one turn loop, plus out-of-band history compaction. The embedding
//! application builds a [`RuntimeState`] and calls [`run_turn`] or
//! [`compact`].

pub mod collab;
pub mod runtime;
pub mod state;
pub mod telemetry;

pub use collab::{DirStorage, KnowledgeBuilder, KnowledgeGroup, KnowledgeTools, Storage};
pub use runtime::{
    compact, run_turn, should_compact, CancelToken, CompactError, CompactionOutcome, SessionSeed, TurnError,
    TurnEvent, TurnInput, TurnState,
};
pub use state::{RuntimeState, RuntimeStateBuilder};
