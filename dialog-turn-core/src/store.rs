use crate::session::{SessionKey, SessionState};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

type LockMap = Mutex<HashMap<SessionKey, Arc<tokio::sync::Mutex<()>>>>;

/// Exclusive right to run a turn for one session key. Released on drop.
#[derive(Debug)]
pub struct SessionLease {
    guard: Option<OwnedMutexGuard<()>>,
    key: SessionKey,
    lock: Arc<tokio::sync::Mutex<()>>,
    locks: Arc<LockMap>,
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.guard.take();
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        // Only the map and this lease still hold the mutex: nobody is waiting.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.key);
        }
    }
}

/// Persistence trait for session state.
///
/// The engine calls `lock` → `load` → `save` once per turn and never holds
/// two leases at once. Implementations must guarantee that `lock` grants at
/// most one lease per key at a time.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn lock(&self, key: &SessionKey) -> Result<SessionLease>;

    /// Returns the default (empty) state on first contact.
    async fn load(&self, key: &SessionKey) -> Result<SessionState>;

    async fn save(&self, key: &SessionKey, state: &SessionState) -> Result<()>;
}

/// Per-key async mutexes, shared by store implementations. An entry lives
/// only while some lease holds or waits for its key.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    inner: Arc<LockMap>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &SessionKey) -> Result<SessionLease> {
        let lock = {
            let mut locks = self.inner.lock().map_err(|e| anyhow!("Lock: {}", e))?;
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        let guard = lock.clone().lock_owned().await;
        Ok(SessionLease {
            guard: Some(guard),
            key: key.clone(),
            lock,
            locks: self.inner.clone(),
        })
    }

    /// Keys currently held or awaited.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
