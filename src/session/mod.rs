//! Session persistence layer
//!
//! Maps opaque session ids to dialogue sessions.
//! Currently in-memory; the trait is the seam for an external cache.

use crate::clock::Clock;
use crate::models::Session;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// Shared handle to one session. Holding its lock serialises turns.
pub type SessionHandle = Arc<Mutex<Session>>;

pub struct ResolvedSession {
    pub session_id: String,
    pub handle: SessionHandle,
    /// True when a fresh session was created for this call
    pub created: bool,
}

/// Trait for session persistence
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the session for `session_id`, or a new one under a fresh id
    /// when the id is absent or unknown.
    async fn resolve(&self, session_id: Option<&str>, now: DateTime<Utc>)
        -> Result<ResolvedSession>;

    async fn get(&self, session_id: &str) -> Result<Option<SessionHandle>>;

    /// Drops sessions created before `cutoff`. Sessions with a turn in
    /// flight are kept.
    async fn evict_created_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    async fn len(&self) -> usize;
}

/// In-memory session store
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {

    async fn resolve(
        &self,
        session_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ResolvedSession> {

        if let Some(id) = session_id.map(str::trim).filter(|id| !id.is_empty()) {
            let sessions = self.sessions.read().await;
            if let Some(handle) = sessions.get(id) {
                return Ok(ResolvedSession {
                    session_id: id.to_string(),
                    handle: handle.clone(),
                    created: false,
                });
            }
        }

        let mut sessions = self.sessions.write().await;

        // Another turn may have created it between the two locks
        if let Some(id) = session_id.map(str::trim) {
            if let Some(handle) = sessions.get(id) {
                return Ok(ResolvedSession {
                    session_id: id.to_string(),
                    handle: handle.clone(),
                    created: false,
                });
            }
        }

        let new_id = Uuid::new_v4().to_string();
        let handle = Arc::new(Mutex::new(Session::new(new_id.clone(), now)));
        sessions.insert(new_id.clone(), handle.clone());

        debug!(
            session_id = %new_id,
            requested = ?session_id,
            "Created new session"
        );

        Ok(ResolvedSession {
            session_id: new_id,
            handle,
            created: true,
        })
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionHandle>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned())
    }

    async fn evict_created_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|_, handle| match handle.try_lock() {
            Ok(session) => session.created_at() >= cutoff,
            Err(_) => true,
        });

        Ok(before - sessions.len())
    }

    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Periodically evicts sessions older than `ttl` (keyed on creation time).
pub fn spawn_ttl_sweeper(
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    every: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let cutoff = clock.now() - ttl;
            match store.evict_created_before(cutoff).await {
                Ok(0) => {}
                Ok(evicted) => info!(evicted, "Evicted expired sessions"),
                Err(e) => tracing::warn!("Session sweep failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::DialogueState;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-07-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn test_absent_id_creates_session() {
        let store = InMemorySessionStore::new();
        let resolved = store.resolve(None, ts()).await.unwrap();

        assert!(resolved.created);
        assert_eq!(store.len().await, 1);
        let session = resolved.handle.lock().await;
        assert_eq!(session.state(), DialogueState::Greeting);
        assert_eq!(session.session_id(), resolved.session_id);
        assert_eq!(session.created_at(), ts());
    }

    #[tokio::test]
    async fn test_known_id_returns_same_session() {
        let store = InMemorySessionStore::new();
        let first = store.resolve(None, ts()).await.unwrap();
        let second = store
            .resolve(Some(&first.session_id), ts())
            .await
            .unwrap();

        assert!(!second.created);
        assert_eq!(first.session_id, second.session_id);
        assert!(Arc::ptr_eq(&first.handle, &second.handle));
    }

    #[tokio::test]
    async fn test_unknown_id_starts_fresh_with_new_id() {
        let store = InMemorySessionStore::new();
        let resolved = store.resolve(Some("not-a-session"), ts()).await.unwrap();

        assert!(resolved.created);
        assert_ne!(resolved.session_id, "not-a-session");
        assert!(store.get("not-a-session").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_creation_keeps_every_session() {
        let store = Arc::new(InMemorySessionStore::new());
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.resolve(None, ts()).await.unwrap().session_id
            }));
        }
        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap());
        }
        ids.sort();
        ids.dedup();

        assert_eq!(ids.len(), 32);
        assert_eq!(store.len().await, 32);
    }

    #[tokio::test]
    async fn test_eviction_skips_busy_sessions() {
        let store = InMemorySessionStore::new();
        let old = store.resolve(None, ts()).await.unwrap();
        let busy = store.resolve(None, ts()).await.unwrap();
        let fresh = store
            .resolve(None, ts() + Duration::hours(2))
            .await
            .unwrap();

        let _guard = busy.handle.lock().await;
        let evicted = store
            .evict_created_before(ts() + Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(evicted, 1);
        assert!(store.get(&old.session_id).await.unwrap().is_none());
        assert!(store.get(&busy.session_id).await.unwrap().is_some());
        assert!(store.get(&fresh.session_id).await.unwrap().is_some());
    }

    #[test]
    fn test_len_counts_resolved_sessions() {
        let store = InMemorySessionStore::default();
        tokio_test::block_on(async {
            assert_eq!(store.len().await, 0);
            let first = store.resolve(None, ts()).await.unwrap();
            store.resolve(Some(&first.session_id), ts()).await.unwrap();
            store.resolve(Some(""), ts()).await.unwrap();
            assert_eq!(store.len().await, 2);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_sessions_past_ttl() {
        let store = Arc::new(InMemorySessionStore::new());
        let stale = store.resolve(None, ts()).await.unwrap();
        let recent = store
            .resolve(None, ts() + Duration::minutes(90))
            .await
            .unwrap();

        let clock = Arc::new(ManualClock::new(ts() + Duration::hours(2)));
        let sweeper = spawn_ttl_sweeper(
            store.clone(),
            clock.clone(),
            Duration::hours(1),
            std::time::Duration::from_secs(60),
        );

        // First tick fires immediately
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        assert!(store.get(&stale.session_id).await.unwrap().is_none());
        assert!(store.get(&recent.session_id).await.unwrap().is_some());

        clock.advance(Duration::minutes(45));
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        assert_eq!(store.len().await, 0);

        sweeper.abort();
    }
}
