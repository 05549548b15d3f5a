use crate::session::{SessionKey, SessionState};
use crate::store::{KeyedLocks, SessionLease, SessionStore};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory SessionStore for tests, the story harness and single-process
/// deployments.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionKey, SessionState>>,
    locks: KeyedLocks,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions that have been saved at least once.
    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn lock(&self, key: &SessionKey) -> Result<SessionLease> {
        self.locks.acquire(key).await
    }

    async fn load(&self, key: &SessionKey) -> Result<SessionState> {
        let sessions = self.sessions.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(sessions.get(key).cloned().unwrap_or_default())
    }

    async fn save(&self, key: &SessionKey, state: &SessionState) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(|e| anyhow!("Lock: {}", e))?;
        sessions.insert(key.clone(), state.clone());
        Ok(())
    }
}
