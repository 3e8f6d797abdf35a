//! Name → session map.
//!
//! Each name maps to a once-cell, so concurrent opens of one name run a single
//! creation while lookups and opens for other names proceed untouched.

use super::session::StreamSession;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

type Slot = Arc<OnceCell<Arc<StreamSession>>>;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Slot>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fully created session, if one exists under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<StreamSession>> {
        self.sessions
            .get(name)
            .and_then(|slot| slot.get().cloned())
    }

    /// Return the session registered under `name`, running `create` if there is none.
    ///
    /// Concurrent callers for the same name wait on the first creation. A failed
    /// creation keeps the slot but leaves it empty, so the next waiter (or the next
    /// caller) runs its own creation into the same slot.
    pub async fn get_or_create<F, Fut, E>(&self, name: &str, create: F) -> Result<Arc<StreamSession>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<StreamSession>, E>>,
    {
        let slot: Slot = Arc::clone(&self.sessions.entry(name.to_string()).or_default());
        slot.get_or_try_init(create).await.cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
