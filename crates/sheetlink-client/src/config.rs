//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/sheetlink/config.toml` by default. The same file configures
//! the CLI and the HTTP service started with `sheetlink server`.
//!
//! Credential values (`client_id`, `client_secret`) support secret
//! references, see [`crate::secret`].

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sheetlink_core::DEFAULT_BATCH_SIZE;
use sheetlink_google::{
    AccessType, CacheTokenStore, FileTokenStore, GoogleConfig, GoogleConfigOverrides, OAuthCredentials,
};
use sheetlink_server::{DEFAULT_LISTEN_ADDR, DEFAULT_MAX_SESSIONS, ServerConfig};

// ---------------------------------------------------------------------------
// ClientConfig (config.toml)
// ---------------------------------------------------------------------------

/// Configuration for sheetlink.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Google settings.
    pub google: Option<GoogleSettings>,

    /// Export settings.
    pub export: ExportSettings,

    /// HTTP service settings.
    pub server: ServerSettings,
}

/// Export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Rows per `appendCells` call.
    pub batch_size: usize,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// HTTP service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Listen address, `host:port`.
    pub listen_addr: String,

    /// Seconds an idle browser session and its tokens are kept.
    ///
    /// Counted from the session's last request and the token's last write,
    /// not from the access token's issue time. Expired access tokens are
    /// refreshed for as long as the refresh token stays cached, so keep
    /// this in days. Defaults to seven.
    pub cache_ttl_secs: u64,

    /// Most browser sessions kept at once.
    pub max_sessions: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            cache_ttl_secs: CacheTokenStore::DEFAULT_TTL_SECS,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from the default path.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config {}: {}", path.display(), e))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse config: {}", e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sheetlink")
    }

    /// Builds the HTTP service configuration.
    pub fn server_config(&self, listen_override: Option<&str>) -> Result<ServerConfig, String> {
        let raw = listen_override.unwrap_or(&self.server.listen_addr);
        let listen_addr: SocketAddr = raw
            .parse()
            .map_err(|e| format!("invalid listen address `{}`: {}", raw, e))?;
        if self.export.batch_size == 0 {
            return Err("export batch_size must be at least 1".to_string());
        }
        if self.server.cache_ttl_secs == 0 {
            return Err("server cache_ttl_secs must be at least 1".to_string());
        }
        if self.server.max_sessions == 0 {
            return Err("server max_sessions must be at least 1".to_string());
        }

        Ok(ServerConfig::new(listen_addr)
            .with_cache_ttl(Duration::from_secs(self.server.cache_ttl_secs))
            .with_max_sessions(self.server.max_sessions)
            .with_batch_size(self.export.batch_size))
    }
}

// ---------------------------------------------------------------------------
// GoogleSettings (in config.toml, including credentials)
// ---------------------------------------------------------------------------

/// Google settings.
///
/// Credentials come either inline (`client_id` + `client_secret`, with
/// secret references) or from a Cloud Console `credentials_file`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GoogleSettings {
    /// OAuth client ID (supports secret references).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// OAuth client secret (supports secret references).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Google Cloud Console credentials JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_file: Option<PathBuf>,

    /// OAuth scopes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,

    /// Redirect URI of the web flow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,

    /// `online` or `offline`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_type: Option<AccessType>,

    /// Consent prompt; empty to omit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    /// Ask for previously granted scopes too.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_granted_scopes: Option<bool>,

    /// HTTP timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Directory of stored tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_dir: Option<PathBuf>,
}

impl GoogleSettings {
    /// Resolves OAuth credentials.
    ///
    /// Inline values win over `credentials_file`. Each inline value is
    /// passed through [`crate::secret::resolve`].
    pub fn resolve_credentials(&self) -> Result<OAuthCredentials, String> {
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => {
                let id = crate::secret::resolve(id)
                    .map_err(|e| format!("failed to resolve client_id: {}", e))?;
                let secret = crate::secret::resolve(secret)
                    .map_err(|e| format!("failed to resolve client_secret: {}", e))?;
                Ok(OAuthCredentials::new(id, secret))
            }
            (Some(_), None) => {
                Err("client_secret is missing from [google] section in config.toml".to_string())
            }
            (None, Some(_)) => {
                Err("client_id is missing from [google] section in config.toml".to_string())
            }
            (None, None) => match self.credentials_file {
                Some(ref path) => OAuthCredentials::from_file(path).map_err(|e| e.to_string()),
                None => Err(format!(
                    "Google credentials not found. Add to {}:\n  \
                     [google]\n  \
                     client_id = \"YOUR_ID.apps.googleusercontent.com\"\n  \
                     client_secret = \"YOUR_SECRET\"\n\n  \
                     Or run: sheetlink auth google --credentials-file <path>",
                    ClientConfig::default_path().display()
                )),
            },
        }
    }

    /// Returns the settings as overrides, without credentials.
    pub fn overrides(&self) -> GoogleConfigOverrides {
        GoogleConfigOverrides {
            scopes: self.scopes.clone(),
            redirect_uri: self.redirect_uri.clone(),
            access_type: self.access_type,
            prompt: self.prompt.clone(),
            include_granted_scopes: self.include_granted_scopes,
            timeout_secs: self.timeout_secs,
            ..Default::default()
        }
    }

    /// Builds a validated Google configuration with `credentials`.
    pub fn to_google_config(&self, credentials: OAuthCredentials) -> Result<GoogleConfig, String> {
        let config = GoogleConfig::new(credentials).merge(&self.overrides());
        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }

    /// Returns the token store of the CLI.
    pub fn token_store(&self) -> FileTokenStore {
        FileTokenStore::new(
            self.token_dir
                .clone()
                .unwrap_or_else(FileTokenStore::default_dir),
        )
    }
}
