//! In-memory session registry
//!
//! Every session owns its own [`SessionState`] behind a `tokio` mutex. Mutating
//! actions take the lock with `try_lock`, so a second action submitted while
//! one is pending is rejected instead of queued.

use chrono::{DateTime, Utc};
use sahay_common::errors::{AppError, Result};
use sahay_common::{metrics, SessionState};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// One live session
#[derive(Debug)]
pub struct SessionEntry {
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    last_seen: Instant,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            state: SessionState::new(),
            created_at: Utc::now(),
            last_active_at: Utc::now(),
            last_seen: Instant::now(),
        }
    }

    /// Mark the session as used now
    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
        self.last_seen = Instant::now();
    }

    fn is_idle(&self, idle_timeout: Duration) -> bool {
        self.last_seen.elapsed() >= idle_timeout
    }
}

pub type SharedSession = Arc<Mutex<SessionEntry>>;

/// Registry of independent sessions
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SharedSession>>,
    idle_timeout: Duration,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(idle_timeout: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
            max_sessions,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn capacity(&self) -> usize {
        self.max_sessions
    }

    /// Open a new, empty session
    pub async fn create(&self) -> Result<(Uuid, DateTime<Utc>)> {
        let mut sessions = self.sessions.write().await;

        if sessions.len() >= self.max_sessions {
            return Err(AppError::ServiceUnavailable {
                message: format!("session limit of {} reached", self.max_sessions),
            });
        }

        let id = Uuid::new_v4();
        let entry = SessionEntry::new();
        let created_at = entry.created_at;
        sessions.insert(id, Arc::new(Mutex::new(entry)));

        metrics::record_active_sessions(sessions.len());
        debug!(session_id = %id, "Session registered");

        Ok((id, created_at))
    }

    pub async fn get(&self, id: Uuid) -> Result<SharedSession> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::SessionNotFound { id: id.to_string() })
    }

    /// Lock a session for a mutating action, failing fast when another
    /// action holds it
    pub async fn begin_action(&self, id: Uuid, action: &str) -> Result<OwnedMutexGuard<SessionEntry>> {
        let session = self.get(id).await?;

        let mut entry = session
            .try_lock_owned()
            .map_err(|_| AppError::ActionInProgress {
                action: action.to_string(),
            })?;

        entry.touch();
        Ok(entry)
    }

    pub async fn remove(&self, id: Uuid) -> Result<()> {
        let mut sessions = self.sessions.write().await;

        sessions
            .remove(&id)
            .ok_or_else(|| AppError::SessionNotFound { id: id.to_string() })?;

        metrics::record_active_sessions(sessions.len());
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions idle for longer than the timeout. Sessions with an
    /// action in flight are kept.
    pub async fn sweep_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        let idle_timeout = self.idle_timeout;

        sessions.retain(|_, session| match session.try_lock() {
            Ok(entry) => !entry.is_idle(idle_timeout),
            Err(_) => true,
        });

        metrics::record_active_sessions(sessions.len());
        before - sessions.len()
    }

    /// Periodically sweep idle sessions for the lifetime of the process
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = registry.sweep_expired().await;
                if removed > 0 {
                    info!(removed, "Expired idle sessions");
                }
            }
        })
    }
}
