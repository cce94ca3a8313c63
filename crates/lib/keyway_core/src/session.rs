//! Browser sessions held by the broker.
//!
//! A session correlates one browser (via the `keyway_sid` cookie) with its
//! pending login and, after authentication, with the issued token and the
//! IdP logout hint. Storage is behind [`SessionStore`]; the in-memory
//! implementation suits single-instance and development deployments only.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::RngCore;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Session store errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session store unavailable: {0}")]
    Unavailable(String),
}

/// Login in flight, created by the login initiator and consumed once by the
/// callback processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLogin {
    pub product_id: Option<String>,
    /// Validated absolute URL; `None` when the caller did not ask for one.
    pub return_to: Option<Url>,
    /// OAuth `state` sent to the IdP.
    pub state: String,
    pub pkce_verifier: String,
    pub created_at: DateTime<Utc>,
}

/// Server-held session state.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub id: String,
    pub pending: Option<PendingLogin>,
    /// Token issued at the last successful callback.
    pub token: Option<String>,
    pub subject: Option<String>,
    /// IdP ID token, kept as the federated logout hint.
    pub id_token_hint: Option<String>,
}

impl Session {
    /// New empty session with a random 256-bit identifier.
    pub fn new() -> Self {
        Self {
            id: generate_session_id(),
            ..Self::default()
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

fn generate_session_id() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Key-value session persistence with TTL.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a live session. Expired sessions are reported as absent.
    async fn get(&self, id: &str) -> Result<Option<Session>, SessionError>;

    /// Insert or replace a session, restarting its idle TTL.
    async fn set(&self, session: Session) -> Result<(), SessionError>;

    /// Remove a session. Removing an unknown id is not an error.
    async fn destroy(&self, id: &str) -> Result<(), SessionError>;
}

/// Default idle lifetime for in-memory sessions: 24 hours.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

struct StoredSession {
    session: Session,
    touched_at: Instant,
}

/// In-memory session store. All state is lost on restart.
pub struct MemorySessionStore {
    sessions: DashMap<String, StoredSession>,
    ttl: Duration,
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove `id` only if it is still expired when the shard lock is held,
    /// so a concurrent `set` survives.
    fn evict_if_stale(&self, id: &str) {
        let ttl = self.ttl;
        self.sessions.remove_if(id, |_, v| v.touched_at.elapsed() > ttl);
    }

    /// Evict expired entries.
    pub fn cleanup(&self) {
        let ttl = self.ttl;
        self.sessions.retain(|_, v| v.touched_at.elapsed() <= ttl);
    }

    /// Spawn a periodic cleanup task.
    pub fn spawn_cleanup_task(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                store.cleanup();
                debug!(sessions = store.len(), "session cleanup tick");
            }
        })
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, id: &str) -> Result<Option<Session>, SessionError> {
        if let Some(entry) = self.sessions.get(id)
            && entry.touched_at.elapsed() <= self.ttl
        {
            return Ok(Some(entry.session.clone()));
        }
        self.evict_if_stale(id);
        Ok(None)
    }

    async fn set(&self, session: Session) -> Result<(), SessionError> {
        self.sessions.insert(
            session.id.clone(),
            StoredSession {
                session,
                touched_at: Instant::now(),
            },
        );
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<(), SessionError> {
        self.sessions.remove(id);
        Ok(())
    }
}
