//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use sheetlink_core::DEFAULT_BATCH_SIZE;
use sheetlink_google::CacheTokenStore;

use crate::session::DEFAULT_MAX_SESSIONS;

/// Default listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub listen_addr: SocketAddr,

    /// How long an idle session and its tokens are kept.
    ///
    /// A session expires this long after its last request, a token this
    /// long after its last write (a refresh writes it again). Unrelated to
    /// the access-token lifetime: an expired access token is refreshed as
    /// long as its refresh token is still cached, so this should be days,
    /// not an hour.
    pub cache_ttl: Duration,

    /// Most sessions kept at once; the least recently used is dropped.
    pub max_sessions: usize,

    /// Rows per `appendCells` call.
    pub batch_size: usize,

    /// Largest accepted `/export` body.
    pub max_body_bytes: usize,

    /// Name of the session cookie.
    pub session_cookie: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            cache_ttl: Duration::from_secs(CacheTokenStore::DEFAULT_TTL_SECS),
            max_sessions: DEFAULT_MAX_SESSIONS,
            batch_size: DEFAULT_BATCH_SIZE,
            max_body_bytes: 16 * 1024 * 1024,
            session_cookie: "sheetlink_session".to_string(),
        }
    }
}

impl ServerConfig {
    /// Creates a configuration listening on `listen_addr`.
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    /// Builder: set session and token TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Builder: set the session cap.
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// How often idle sessions are swept: the TTL, between 1s and 60s.
    pub fn sweep_interval(&self) -> Duration {
        self.cache_ttl
            .clamp(Duration::from_secs(1), Duration::from_secs(60))
    }

    /// Builder: set export batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Builder: set maximum request body size.
    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }
}
