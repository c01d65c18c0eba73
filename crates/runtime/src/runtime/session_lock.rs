//! Per-session mutual exclusion.
//!
//! Turns and compactions of one session never overlap: each takes the
//! session's permit for its whole duration. A second caller waits until
//! the permit is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Session id → `Semaphore(1)`.
pub struct SessionLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for SessionLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn semaphore(&self, session_id: &str) -> Arc<Semaphore> {
        self.locks
            .lock()
            .entry(session_id.to_owned())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone()
    }

    /// Wait for the session's permit. Hold it for the duration of the
    /// work; it is released on drop.
    pub async fn acquire(&self, session_id: &str) -> Result<OwnedSemaphorePermit, SessionBusy> {
        self.semaphore(session_id)
            .acquire_owned()
            .await
            .map_err(|_| SessionBusy(session_id.to_owned()))
    }

    /// Take the permit only if nobody holds it.
    pub fn try_acquire(&self, session_id: &str) -> Result<OwnedSemaphorePermit, SessionBusy> {
        self.semaphore(session_id)
            .try_acquire_owned()
            .map_err(|_| SessionBusy(session_id.to_owned()))
    }

    pub fn is_busy(&self, session_id: &str) -> bool {
        self.locks
            .lock()
            .get(session_id)
            .is_some_and(|sem| sem.available_permits() == 0)
    }

    /// Number of tracked sessions.
    pub fn session_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Forget sessions whose permit is free and that nobody is waiting on.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0 || Arc::strong_count(sem) > 1);
    }
}

/// The session's lock could not be taken.
#[derive(Debug, thiserror::Error)]
#[error("session {0} is busy")]
pub struct SessionBusy(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequential_access() {
        let map = SessionLockMap::new();
        let p1 = map.acquire("s1").await.unwrap();
        assert!(map.is_busy("s1"));
        drop(p1);
        assert!(!map.is_busy("s1"));
        let _p2 = map.acquire("s1").await.unwrap();
    }

    #[tokio::test]
    async fn different_sessions_do_not_block() {
        let map = SessionLockMap::new();
        let _p1 = map.acquire("s1").await.unwrap();
        let _p2 = map.acquire("s2").await.unwrap();
        assert_eq!(map.session_count(), 2);
    }

    #[tokio::test]
    async fn try_acquire_fails_while_held() {
        let map = SessionLockMap::new();
        let p1 = map.try_acquire("s1").unwrap();
        assert!(map.try_acquire("s1").is_err());
        drop(p1);
        assert!(map.try_acquire("s1").is_ok());
    }

    #[tokio::test]
    async fn waiter_proceeds_after_release() {
        let map = Arc::new(SessionLockMap::new());
        let map2 = map.clone();

        let p1 = map.acquire("s1").await.unwrap();
        let handle = tokio::spawn(async move {
            let _p2 = map2.acquire("s1").await.unwrap();
            42
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        drop(p1);
        assert_eq!(handle.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn prune_keeps_held_locks() {
        let map = SessionLockMap::new();
        let _held = map.acquire("busy").await.unwrap();
        drop(map.acquire("idle").await.unwrap());
        map.prune_idle();
        assert_eq!(map.session_count(), 1);
        assert!(map.is_busy("busy"));
    }
}
