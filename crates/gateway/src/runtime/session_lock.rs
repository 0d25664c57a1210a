//! Per-session concurrency control: one turn per user at a time.
//!
//! Requests run in parallel across users on independent states; within one
//! user, a second message waits for the in-flight turn to finish.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Maps each session key to a `Semaphore(1)` run lock.
#[derive(Default)]
pub struct SessionLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl SessionLockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the run lock for a session; held for the duration of the
    /// turn, auto-released on drop.
    pub async fn acquire(&self, session_key: &str) -> Result<OwnedSemaphorePermit, SessionBusy> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(session_key.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        sem.acquire_owned().await.map_err(|_| SessionBusy)
    }

    pub fn session_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop lock entries no session currently holds.
    pub fn prune_idle(&self) {
        self.locks.lock().retain(|_, sem| sem.available_permits() == 0);
    }
}

#[derive(Debug)]
pub struct SessionBusy;

impl std::fmt::Display for SessionBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session is busy, a turn is already in progress")
    }
}

impl std::error::Error for SessionBusy {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequential_access_same_session() {
        let map = SessionLockMap::new();
        let permit = map.acquire("u1").await.unwrap();
        drop(permit);
        let permit = map.acquire("u1").await.unwrap();
        drop(permit);
    }

    #[tokio::test]
    async fn different_sessions_run_concurrently() {
        let map = SessionLockMap::new();
        let p1 = map.acquire("u1").await.unwrap();
        let p2 = map.acquire("u2").await.unwrap();
        assert_eq!(map.session_count(), 2);
        drop(p1);
        drop(p2);
        map.prune_idle();
        assert_eq!(map.session_count(), 0);
    }

    #[tokio::test]
    async fn second_turn_waits_for_the_first() {
        let map = Arc::new(SessionLockMap::new());
        let p1 = map.acquire("u1").await.unwrap();

        let map2 = map.clone();
        let waiter = tokio::spawn(async move {
            let _p2 = map2.acquire("u1").await.unwrap();
            7
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        drop(p1);
        assert_eq!(waiter.await.unwrap(), 7);
    }
}
