//! Core runtime: the turn orchestrator and the history compactor, with the
//! per-turn machinery they share.
//!
//! Entry points: [`run_turn`] streams one turn as [`TurnEvent`]s and
//! [`compact`] collapses old history into a summary record.

pub mod attachments;
pub mod cancel;
pub mod compact;
pub mod cursor;
pub mod session_lock;
pub mod tools;
pub mod tracker;
pub mod turn;

pub use cancel::{CancelMap, CancelToken};
pub use compact::{compact, should_compact, CompactError, CompactionOutcome};
pub use cursor::TurnCursor;
pub use session_lock::{SessionBusy, SessionLockMap};
pub use tools::{resolve_tools, ResolveError, ResolvedTools};
pub use tracker::InvocationTracker;
pub use turn::{run_turn, SessionSeed, TurnError, TurnEvent, TurnInput, TurnState};
