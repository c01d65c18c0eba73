//! Cancellation tokens for running turns.
//!
//! A `CancelToken` wraps a `CancellationToken` so the turn can both poll
//! it between steps and `select!` on it while awaiting the provider or a
//! tool. `CancelMap` lets an outside caller stop a session's turn.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Debug)]
pub struct CancelToken {
    id: u64,
    inner: CancellationToken,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            id: NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed),
            inner: CancellationToken::new(),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await
    }

    /// Whether `other` is a clone of this token.
    pub fn same_as(&self, other: &CancelToken) -> bool {
        self.id == other.id
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Session id → token of the turn currently running in it.
pub struct CancelMap {
    tokens: Mutex<HashMap<String, CancelToken>>,
}

impl Default for CancelMap {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelMap {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Create and register a token for a session, replacing any previous one.
    pub fn register(&self, session_id: &str) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(session_id.to_owned(), token.clone());
        token
    }

    /// Cancel the session's running turn. Returns true if one was registered.
    pub fn cancel(&self, session_id: &str) -> bool {
        match self.tokens.lock().get(session_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop the session's token if it is still `token`. A turn that
    /// finishes late must not unregister its successor.
    pub fn finish(&self, session_id: &str, token: &CancelToken) {
        let mut tokens = self.tokens.lock();
        if tokens.get(session_id).is_some_and(|t| t.same_as(token)) {
            tokens.remove(session_id);
        }
    }

    pub fn is_running(&self, session_id: &str) -> bool {
        self.tokens.lock().contains_key(session_id)
    }
}
