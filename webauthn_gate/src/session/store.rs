use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::config::SESSION_ID_BYTES;
use super::errors::SessionError;
use super::types::SessionState;
use crate::utils::gen_random_string;

/// In-memory session table with a fixed lifetime per session.
///
/// Expired sessions behave as if they did not exist and are dropped when touched.
#[derive(Debug)]
pub struct SessionStore {
    entry: RwLock<HashMap<String, SessionState>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        tracing::info!("Creating new in-memory session store (ttl {}s)", ttl.as_secs());
        Self {
            entry: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn fresh_state(&self) -> SessionState {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        SessionState::new(expires_at)
    }

    /// Create an empty session and return its id.
    #[tracing::instrument(skip(self))]
    pub async fn create(&self) -> Result<String, SessionError> {
        let session_id = gen_random_string(SESSION_ID_BYTES)?;
        self.entry
            .write()
            .await
            .insert(session_id.clone(), self.fresh_state());
        tracing::debug!("Created session");
        Ok(session_id)
    }

    /// Whether `session_id` names a live session.
    pub async fn contains(&self, session_id: &str) -> bool {
        self.get(session_id).await.is_some()
    }

    /// Snapshot of a live session.
    pub async fn get(&self, session_id: &str) -> Option<SessionState> {
        {
            let guard = self.entry.read().await;
            match guard.get(session_id) {
                Some(state) if !state.is_expired() => return Some(state.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        tracing::debug!("Dropping expired session");
        self.entry.write().await.remove(session_id);
        None
    }

    /// Run `f` against a live session under the write lock.
    pub async fn update<F, R>(&self, session_id: &str, f: F) -> Result<R, SessionError>
    where
        F: FnOnce(&mut SessionState) -> R,
    {
        let mut guard = self.entry.write().await;
        let expired = guard
            .get(session_id)
            .ok_or(SessionError::NotFound)?
            .is_expired();
        if expired {
            guard.remove(session_id);
            return Err(SessionError::NotFound);
        }
        let state = guard.get_mut(session_id).ok_or(SessionError::NotFound)?;
        Ok(f(state))
    }

    /// Move a live session to a new id with a renewed lifetime; the old id stops working.
    #[tracing::instrument(skip(self, session_id))]
    pub async fn rotate(&self, session_id: &str) -> Result<String, SessionError> {
        let new_id = gen_random_string(SESSION_ID_BYTES)?;
        let renewed = self.fresh_state();

        let mut guard = self.entry.write().await;
        let mut state = guard.remove(session_id).ok_or(SessionError::NotFound)?;
        if state.is_expired() {
            return Err(SessionError::NotFound);
        }
        state.expires_at = renewed.expires_at;
        guard.insert(new_id.clone(), state);

        tracing::debug!("Rotated session id");
        Ok(new_id)
    }

    pub async fn remove(&self, session_id: &str) {
        self.entry.write().await.remove(session_id);
    }

    /// Drop every expired session. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut guard = self.entry.write().await;
        let before = guard.len();
        guard.retain(|_, state| !state.is_expired());
        let purged = before - guard.len();
        if purged > 0 {
            tracing::debug!("Purged {purged} expired sessions");
        }
        purged
    }

    pub async fn len(&self) -> usize {
        self.entry.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entry.read().await.is_empty()
    }
}
