//! In-memory session store with per-user serialization.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::session::model::{Session, Turn, UserId};

/// Shared handle to one user's session. Holding the lock serializes every
/// read-modify-write for that user; other users are unaffected.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Holds every user's session for the lifetime of the process.
///
/// The outer map lock is only held long enough to find or insert a handle,
/// never across a session operation.
pub struct SessionStore {
    sessions: RwLock<HashMap<UserId, SessionHandle>>,
    window: usize,
}

impl SessionStore {
    pub fn new(window: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            window,
        }
    }

    /// Get the user's session, creating a fresh one on first contact.
    pub async fn get_or_create(&self, user_id: &UserId) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(user_id) {
            return Arc::clone(handle);
        }

        let mut sessions = self.sessions.write().await;
        let handle = sessions.entry(user_id.clone()).or_insert_with(|| {
            tracing::debug!(user_id = %user_id, "Creating session");
            Arc::new(Mutex::new(Session::new(user_id.clone(), self.window)))
        });
        Arc::clone(handle)
    }

    pub async fn get(&self, user_id: &UserId) -> Option<SessionHandle> {
        self.sessions.read().await.get(user_id).cloned()
    }

    /// Clear all state for the user. Unknown users are a no-op.
    ///
    /// The session is reset in place so tasks already holding its handle
    /// observe the reset instead of writing to a detached copy.
    pub async fn reset(&self, user_id: &UserId) {
        let Some(handle) = self.get(user_id).await else {
            return;
        };
        handle.lock().await.reset();
        tracing::info!(user_id = %user_id, "Session reset");
    }

    /// Append a turn under the user's lock. Unknown users are a no-op.
    pub async fn append_turn(&self, user_id: &UserId, turn: Turn) {
        if let Some(handle) = self.get(user_id).await {
            handle.lock().await.append_turn(turn);
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::onboarding::Stage;

    #[tokio::test]
    async fn get_or_create_returns_same_session() {
        let store = SessionStore::new(10);
        let id = UserId::from(1);
        let a = store.get_or_create(&id).await;
        let b = store.get_or_create(&id).await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn reset_and_append_on_unknown_user_are_noops() {
        let store = SessionStore::new(10);
        let id = UserId::from(99);
        store.reset(&id).await;
        store.append_turn(&id, Turn::user_text("hello")).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn reset_is_visible_through_existing_handles() {
        let store = SessionStore::new(10);
        let id = UserId::from(5);
        let handle = store.get_or_create(&id).await;
        handle.lock().await.stage = Stage::Ready;

        store.reset(&id).await;
        assert_eq!(handle.lock().await.stage, Stage::New);
    }

    #[tokio::test]
    async fn concurrent_appends_for_one_user_respect_window() {
        let store = Arc::new(SessionStore::new(8));
        let id = UserId::from(3);
        store.get_or_create(&id).await;

        let mut tasks = Vec::new();
        for n in 0..50 {
            let store = Arc::clone(&store);
            let id = id.clone();
            tasks.push(tokio::spawn(async move {
                store.append_turn(&id, Turn::user_text(format!("m{n}"))).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let handle = store.get(&id).await.unwrap();
        assert_eq!(handle.lock().await.history().len(), 8);
    }

    #[tokio::test]
    async fn users_do_not_block_each_other() {
        let store = Arc::new(SessionStore::new(10));
        let alice = UserId::from(1);
        let bob = UserId::from(2);

        let alice_handle = store.get_or_create(&alice).await;
        let _held = alice_handle.lock().await;

        // Bob's session is reachable while Alice's lock is held.
        let bob_result = tokio::time::timeout(Duration::from_millis(200), async {
            let handle = store.get_or_create(&bob).await;
            handle.lock().await.append_turn(Turn::user_text("hi"));
        })
        .await;
        assert!(bob_result.is_ok());
    }
}
