//! Token persistence.
//!
//! A [`TokenStore`] maps a key (see [`GoogleConfig::token_key`]) to the last
//! token written under it. Stores are passed explicitly to whoever needs
//! them: the HTTP service gives each browser session its own
//! [`CacheTokenStore`], the CLI uses a [`FileTokenStore`].
//!
//! Writes are last-write-wins. Reads never return a token carrying an
//! `error`; such records are dropped from the store when encountered.
//!
//! [`GoogleConfig::token_key`]: crate::GoogleConfig::token_key

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{ApiError, ApiResult};
use crate::token::Token;

/// Key/value persistence for tokens.
///
/// Implementations provide `read`, `write` and [`delete`](Self::delete). Callers use [`get`](Self::get) and
/// [`put`](Self::put), which never hand out an errored record.
pub trait TokenStore: Send + Sync + fmt::Debug {
    /// Storage hook: reads the raw record under `key`, errored or not.
    ///
    /// Not meant to be called directly; use [`get`](Self::get).
    #[doc(hidden)]
    fn read(&self, key: &str) -> Option<Token>;

    /// Storage hook: writes `token` under `key`, replacing any previous
    /// record.
    ///
    /// Not meant to be called directly; use [`put`](Self::put).
    #[doc(hidden)]
    fn write(&self, key: &str, token: &Token) -> ApiResult<()>;

    /// Removes the record under `key`. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> ApiResult<()>;

    /// Returns the usable token under `key`.
    ///
    /// Returns `None` when nothing is stored or when the stored record is
    /// an error, which is discarded.
    fn get(&self, key: &str) -> Option<Token> {
        let token = self.read(key)?;
        if let Some(message) = token.error_message() {
            warn!(key, error = %message, "discarding errored token");
            if let Err(e) = self.delete(key) {
                warn!(key, error = %e, "failed to remove errored token");
            }
            return None;
        }
        Some(token)
    }

    /// Stores `token` under `key`.
    fn put(&self, key: &str, token: Token) -> ApiResult<()> {
        self.write(key, &token)
    }
}

// ---------------------------------------------------------------------------
// CacheTokenStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct CacheEntry {
    token: Token,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-process store whose entries expire a fixed TTL after their last write.
///
/// The TTL bounds how long an idle refresh token is kept, so it should be
/// much longer than an access token's lifetime: a refresh writes the entry
/// again and restarts the clock.
#[derive(Debug)]
pub struct CacheTokenStore {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl Default for CacheTokenStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(Self::DEFAULT_TTL_SECS))
    }
}

impl CacheTokenStore {
    /// Default entry lifetime in seconds (seven days).
    pub const DEFAULT_TTL_SECS: u64 = 7 * 24 * 3600;

    /// Creates a cache with the given entry lifetime.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the entry lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Drops expired entries, returning how many were removed.
    pub fn evict_expired(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, "evicted expired cache entries");
        }
        evicted
    }

    /// Returns the number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TokenStore for CacheTokenStore {
    fn read(&self, key: &str) -> Option<Token> {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.token.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Lazily drop the expired entry.
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        debug!(key, "cache entry expired");
        None
    }

    fn write(&self, key: &str, token: &Token) -> ApiResult<()> {
        let entry = CacheEntry {
            token: token.clone(),
            expires_at: Instant::now().checked_add(self.ttl),
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), entry);
        debug!(key, ttl_secs = self.ttl.as_secs(), "cached token");
        Ok(())
    }

    fn delete(&self, key: &str) -> ApiResult<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileTokenStore
// ---------------------------------------------------------------------------

/// Directory of JSON files, one per key.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    dir: PathBuf,
}

impl FileTokenStore {
    /// Creates a store rooted at `dir`. The directory is created on first
    /// write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the default token directory,
    /// `~/.local/share/sheetlink/tokens` on Linux.
    pub fn default_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sheetlink")
            .join("tokens")
    }

    /// Returns the store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file holding the token for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl TokenStore for FileTokenStore {
    fn read(&self, key: &str) -> Option<Token> {
        let path = self.path_for(key);
        if !path.exists() {
            debug!(path = %path.display(), "no token file");
            return None;
        }

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read token file");
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to parse token file");
                None
            }
        }
    }

    fn write(&self, key: &str, token: &Token) -> ApiResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            ApiError::storage(format!("failed to create token directory: {}", e)).with_source(e)
        })?;

        let path = self.path_for(key);
        let temp_path = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(token)
            .map_err(|e| ApiError::internal(format!("failed to serialize token: {}", e)))?;

        fs::write(&temp_path, &content).map_err(|e| {
            ApiError::storage(format!("failed to write token file: {}", e)).with_source(e)
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600));
        }

        fs::rename(&temp_path, &path).map_err(|e| {
            ApiError::storage(format!("failed to rename token file: {}", e)).with_source(e)
        })?;

        info!(path = %path.display(), "saved token");
        Ok(())
    }

    fn delete(&self, key: &str) -> ApiResult<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "removed token");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(
                ApiError::storage(format!("failed to remove token file: {}", e)).with_source(e),
            ),
        }
    }
}
