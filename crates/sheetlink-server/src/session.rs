//! Browser sessions.
//!
//! A session is identified by a random cookie value and owns its own token
//! store, so tokens obtained by one browser are never visible to another.
//!
//! Sessions idle for longer than the TTL are dropped, lazily when a new
//! session is created and by [`SessionStore::evict_idle`], which the server
//! runs periodically. The store never holds more than its session cap; the
//! least recently used session goes first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use sheetlink_google::{CacheTokenStore, PendingAuthorization};
use tracing::{debug, warn};

/// Per-browser state.
#[derive(Debug)]
pub struct Session {
    id: String,
    tokens: CacheTokenStore,
    pending: Mutex<Option<PendingAuthorization>>,
    last_seen: Mutex<Instant>,
}

impl Session {
    fn new(id: String, ttl: Duration) -> Self {
        Self {
            id,
            tokens: CacheTokenStore::new(ttl),
            pending: Mutex::new(None),
            last_seen: Mutex::new(Instant::now()),
        }
    }

    fn last_seen(&self) -> Instant {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn is_idle(&self, ttl: Duration) -> bool {
        self.last_seen().elapsed() >= ttl
    }

    /// Returns the session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the session's token store.
    pub fn tokens(&self) -> &CacheTokenStore {
        &self.tokens
    }

    /// Remembers an authorization in progress, replacing any earlier one.
    pub fn set_pending(&self, pending: PendingAuthorization) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(pending);
    }

    /// Removes and returns the authorization in progress.
    pub fn take_pending(&self) -> Option<PendingAuthorization> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Default cap on concurrent sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// All live sessions.
#[derive(Debug)]
pub struct SessionStore {
    cookie_name: String,
    ttl: Duration,
    max_sessions: usize,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionStore {
    /// Creates an empty store.
    ///
    /// `ttl` is both the idle timeout of a session and the lifetime of its
    /// tokens after their last write.
    pub fn new(cookie_name: impl Into<String>, ttl: Duration) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            ttl,
            max_sessions: DEFAULT_MAX_SESSIONS,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Builder: cap the number of sessions kept at once (at least one).
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max.max(1);
        self
    }

    /// Returns the cookie name.
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Returns the number of sessions, idle ones not yet evicted included.
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up the session named by the request cookie.
    ///
    /// An idle session is not returned. A returned session counts as used.
    pub fn find(&self, headers: &HeaderMap) -> Option<Arc<Session>> {
        let id = session_id(headers, &self.cookie_name)?;
        let session = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()?;
        if session.is_idle(self.ttl) {
            debug!(session = %id, "session idle, ignoring");
            return None;
        }
        session.touch();
        Some(session)
    }

    /// Drops idle sessions and expired tokens of the remaining ones.
    ///
    /// Returns how many sessions were removed.
    pub fn evict_idle(&self) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let evicted = self.evict_idle_locked(&mut sessions);
        for session in sessions.values() {
            session.tokens.evict_expired();
        }
        evicted
    }

    fn evict_idle_locked(&self, sessions: &mut HashMap<String, Arc<Session>>) -> usize {
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_idle(self.ttl));
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "evicted idle sessions");
        }
        evicted
    }

    /// Makes room for one more session under the cap.
    fn make_room_locked(&self, sessions: &mut HashMap<String, Arc<Session>>) {
        self.evict_idle_locked(sessions);
        while sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, session)| session.last_seen())
                .map(|(id, _)| id.clone());
            let Some(oldest) = oldest else { break };
            sessions.remove(&oldest);
            warn!(
                session = %oldest,
                max = self.max_sessions,
                "session cap reached, dropped least recently used"
            );
        }
    }

    /// Returns the request's session, creating one if needed.
    ///
    /// The second value is the `Set-Cookie` header to send when a new
    /// session was created.
    pub fn get_or_create(&self, headers: &HeaderMap) -> (Arc<Session>, Option<String>) {
        if let Some(session) = self.find(headers) {
            return (session, None);
        }

        let id = uuid::Uuid::new_v4().simple().to_string();
        let session = Arc::new(Session::new(id.clone(), self.ttl));
        {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            self.make_room_locked(&mut sessions);
            sessions.insert(id.clone(), session.clone());
        }
        debug!(session = %id, "created session");

        let cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            self.cookie_name, id
        );
        (session, Some(cookie))
    }
}

fn session_id(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}
