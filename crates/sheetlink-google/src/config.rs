//! Google client configuration.
//!
//! A [`GoogleConfig`] is built once from defaults and then specialised per
//! call with [`GoogleConfigOverrides`]; the merged value is never mutated
//! afterwards. Its identity (client, scopes, redirect, access type) decides
//! the key under which tokens are stored, see [`GoogleConfig::token_key`].

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ApiError, ApiResult};

/// Prefix of every token store key.
pub const TOKEN_KEY_PREFIX: &str = "google-token-";

/// OAuth 2.0 client credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    /// The OAuth 2.0 client ID from Google Cloud Console.
    pub client_id: String,
    /// The OAuth 2.0 client secret from Google Cloud Console.
    pub client_secret: String,
}

impl fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Structure of a Google credentials JSON payload.
///
/// Accepts the Cloud Console download (`installed` or `web` section), the
/// flat layout written by gcloud, and recognises service-account keys so
/// they can be rejected with a clear message.
#[derive(Debug, Deserialize)]
struct CredentialsPayload {
    #[serde(rename = "type")]
    kind: Option<String>,
    installed: Option<NestedCredentials>,
    web: Option<NestedCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedCredentials {
    client_id: String,
    client_secret: String,
}

impl OAuthCredentials {
    /// Creates new OAuth credentials.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Loads credentials from a Google credentials JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> ApiResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ApiError::missing_configuration(format!(
                "failed to read credentials file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    /// Parses credentials from a Google credentials JSON payload.
    pub fn from_json(json: &str) -> ApiResult<Self> {
        let payload: CredentialsPayload = serde_json::from_str(json).map_err(|e| {
            ApiError::missing_configuration(format!("failed to parse credentials JSON: {}", e))
        })?;

        if payload.kind.as_deref() == Some("service_account") {
            return Err(ApiError::missing_configuration(
                "service account credentials are not supported, use an OAuth client",
            ));
        }

        if let Some(creds) = payload.installed.or(payload.web) {
            return Ok(Self::new(creds.client_id, creds.client_secret));
        }

        if let (Some(client_id), Some(client_secret)) = (payload.client_id, payload.client_secret)
        {
            return Ok(Self::new(client_id, client_secret));
        }

        Err(ApiError::missing_configuration(
            "credentials must contain an 'installed'/'web' section or 'client_id'/'client_secret' at root level",
        ))
    }

    /// Checks that the credentials look like a Google OAuth client.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.is_empty() {
            return Err("client_id is required");
        }
        if !self.client_id.ends_with(".apps.googleusercontent.com") {
            return Err("client_id should end with .apps.googleusercontent.com");
        }
        if self.client_secret.is_empty() {
            return Err("client_secret is required");
        }
        Ok(())
    }
}

/// Whether Google should issue a refresh token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    /// Access token only.
    Online,
    /// Access token plus refresh token.
    #[default]
    Offline,
}

impl AccessType {
    /// Returns the query parameter value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// Google endpoint URLs.
///
/// Only tests and proxies need to change these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleEndpoints {
    /// Consent page.
    pub auth_url: String,
    /// Token endpoint for code exchange and refresh.
    pub token_url: String,
    /// Base URL of the Sheets API.
    pub sheets_url: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            sheets_url: "https://sheets.googleapis.com".to_string(),
        }
    }
}

impl GoogleEndpoints {
    /// Points every endpoint at a single base URL (`/auth`, `/token`, `/`).
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            auth_url: format!("{base}/auth"),
            token_url: format!("{base}/token"),
            sheets_url: base.to_string(),
        }
    }
}

/// Configuration of a Google API client.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// OAuth client credentials. `None` until configured.
    pub credentials: Option<OAuthCredentials>,

    /// Application name, sent as the user agent.
    pub application_name: String,

    /// OAuth scopes to request.
    pub scopes: Vec<String>,

    /// Redirect URI registered for the web flow.
    pub redirect_uri: Option<String>,

    /// Online or offline access.
    pub access_type: AccessType,

    /// Consent prompt behaviour (`consent`, `select_account`, `none`).
    pub prompt: Option<String>,

    /// Ask Google to include previously granted scopes.
    pub include_granted_scopes: bool,

    /// Request timeout for every HTTP call.
    pub timeout: Duration,

    /// Endpoint URLs.
    pub endpoints: GoogleEndpoints,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            application_name: format!("sheetlink/{}", env!("CARGO_PKG_VERSION")),
            scopes: vec![Self::DEFAULT_SCOPE.to_string()],
            redirect_uri: None,
            access_type: AccessType::Offline,
            prompt: Some("consent".to_string()),
            include_granted_scopes: false,
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            endpoints: GoogleEndpoints::default(),
        }
    }
}

impl GoogleConfig {
    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Default scope: read/write access to spreadsheets.
    pub const DEFAULT_SCOPE: &'static str = "https://www.googleapis.com/auth/spreadsheets";

    /// Creates a configuration with the given credentials and defaults
    /// for everything else.
    pub fn new(credentials: OAuthCredentials) -> Self {
        Self {
            credentials: Some(credentials),
            ..Default::default()
        }
    }

    /// Sets the redirect URI.
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    /// Sets the OAuth scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Sets the access type.
    pub fn with_access_type(mut self, access_type: AccessType) -> Self {
        self.access_type = access_type;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the endpoint URLs.
    pub fn with_endpoints(mut self, endpoints: GoogleEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Returns a copy with every `Some` override applied.
    pub fn merge(&self, overrides: &GoogleConfigOverrides) -> Self {
        let mut merged = self.clone();
        if let Some(ref credentials) = overrides.credentials {
            merged.credentials = Some(credentials.clone());
        }
        if let Some(ref name) = overrides.application_name {
            merged.application_name = name.clone();
        }
        if let Some(ref scopes) = overrides.scopes {
            merged.scopes = scopes.clone();
        }
        if let Some(ref uri) = overrides.redirect_uri {
            merged.redirect_uri = Some(uri.clone());
        }
        if let Some(access_type) = overrides.access_type {
            merged.access_type = access_type;
        }
        if let Some(ref prompt) = overrides.prompt {
            merged.prompt = Some(prompt.clone()).filter(|p| !p.is_empty());
        }
        if let Some(include) = overrides.include_granted_scopes {
            merged.include_granted_scopes = include;
        }
        if let Some(secs) = overrides.timeout_secs {
            merged.timeout = Duration::from_secs(secs);
        }
        merged
    }

    /// Returns the credentials or a missing configuration error.
    pub fn require_credentials(&self) -> ApiResult<&OAuthCredentials> {
        self.credentials.as_ref().ok_or_else(|| {
            ApiError::missing_configuration("no client credentials configured")
        })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ApiResult<()> {
        self.require_credentials()?
            .validate()
            .map_err(|e| ApiError::missing_configuration(format!("invalid credentials: {}", e)))?;

        if self.scopes.is_empty() {
            return Err(ApiError::missing_configuration(
                "at least one OAuth scope is required",
            ));
        }

        if self.timeout.is_zero() {
            return Err(ApiError::missing_configuration("timeout must be positive"));
        }

        Ok(())
    }

    /// Returns the token store key for this configuration.
    ///
    /// Two configurations share tokens exactly when they use the same
    /// client, the same set of scopes, the same redirect URI and the same
    /// access type.
    pub fn token_key(&self) -> String {
        let mut scopes: Vec<&str> = self.scopes.iter().map(String::as_str).collect();
        scopes.sort_unstable();
        scopes.dedup();

        let mut hasher = Sha256::new();
        hasher.update(
            self.credentials
                .as_ref()
                .map(|c| c.client_id.as_str())
                .unwrap_or_default()
                .as_bytes(),
        );
        hasher.update(b"\n");
        hasher.update(scopes.join(" ").as_bytes());
        hasher.update(b"\n");
        hasher.update(self.redirect_uri.as_deref().unwrap_or_default().as_bytes());
        hasher.update(b"\n");
        hasher.update(self.access_type.as_str().as_bytes());

        let digest = hex::encode(hasher.finalize());
        format!("{TOKEN_KEY_PREFIX}{}", &digest[..16])
    }
}

/// Per-call configuration overrides; every `Some` field wins over the
/// defaults it is merged into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GoogleConfigOverrides {
    /// Client credentials.
    #[serde(skip)]
    pub credentials: Option<OAuthCredentials>,
    /// Application name.
    pub application_name: Option<String>,
    /// OAuth scopes.
    pub scopes: Option<Vec<String>>,
    /// Redirect URI.
    pub redirect_uri: Option<String>,
    /// Access type.
    pub access_type: Option<AccessType>,
    /// Consent prompt; an empty string removes the prompt.
    pub prompt: Option<String>,
    /// Include previously granted scopes.
    pub include_granted_scopes: Option<bool>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
}

impl GoogleConfigOverrides {
    /// Creates empty overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the credentials.
    pub fn with_credentials(mut self, credentials: OAuthCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Overrides the scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = Some(scopes);
        self
    }

    /// Overrides the redirect URI.
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_credentials() -> OAuthCredentials {
        OAuthCredentials::new("test-client.apps.googleusercontent.com", "test-secret")
    }

    #[test]
    fn credentials_validation() {
        assert!(test_credentials().validate().is_ok());
        assert!(OAuthCredentials::new("", "secret").validate().is_err());
        assert!(OAuthCredentials::new("bad-id", "secret").validate().is_err());
        assert!(
            OAuthCredentials::new("test.apps.googleusercontent.com", "")
                .validate()
                .is_err()
        );
    }

    #[test]
    fn credentials_debug_redacts_secret() {
        let debug = format!("{:?}", test_credentials());
        assert!(debug.contains("test-client"));
        assert!(!debug.contains("test-secret"));
    }

    #[test]
    fn credentials_from_json_layouts() {
        let installed = r#"{"installed": {"client_id": "a.apps.googleusercontent.com", "client_secret": "s1", "project_id": "p"}}"#;
        let web = r#"{"web": {"client_id": "b.apps.googleusercontent.com", "client_secret": "s2"}}"#;
        let flat = r#"{"client_id": "c.apps.googleusercontent.com", "client_secret": "s3", "refresh_token": "r"}"#;

        assert_eq!(
            OAuthCredentials::from_json(installed).unwrap().client_secret,
            "s1"
        );
        assert_eq!(OAuthCredentials::from_json(web).unwrap().client_secret, "s2");
        assert_eq!(OAuthCredentials::from_json(flat).unwrap().client_secret, "s3");
    }

    #[test]
    fn credentials_from_json_rejects_service_account() {
        let json = r#"{"type": "service_account", "client_id": "123", "private_key": "k"}"#;
        let err = OAuthCredentials::from_json(json).unwrap_err();
        assert_eq!(err.code(), crate::ApiErrorCode::MissingConfiguration);
        assert!(err.message().contains("service account"));
    }

    #[test]
    fn credentials_from_json_invalid() {
        let err = OAuthCredentials::from_json(r#"{"other": {}}"#).unwrap_err();
        assert!(err.message().contains("client_id"));

        let err = OAuthCredentials::from_json("not json").unwrap_err();
        assert!(err.message().contains("parse"));
    }

    #[test]
    fn default_config() {
        let config = GoogleConfig::default();
        assert!(config.credentials.is_none());
        assert_eq!(config.scopes, vec![GoogleConfig::DEFAULT_SCOPE.to_string()]);
        assert_eq!(config.access_type, AccessType::Offline);
        assert_eq!(config.prompt.as_deref(), Some("consent"));
        assert!(!config.include_granted_scopes);
        assert!(config.application_name.starts_with("sheetlink/"));
    }

    #[test]
    fn missing_credentials_fail_validation() {
        let err = GoogleConfig::default().validate().unwrap_err();
        assert_eq!(err.code(), crate::ApiErrorCode::MissingConfiguration);
        assert!(GoogleConfig::new(test_credentials()).validate().is_ok());
    }

    #[test]
    fn empty_scopes_fail_validation() {
        let config = GoogleConfig::new(test_credentials()).with_scopes(vec![]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn merge_applies_only_set_fields() {
        let defaults = GoogleConfig::new(test_credentials()).with_redirect_uri("https://a/cb");
        let overrides = GoogleConfigOverrides {
            scopes: Some(vec!["s1".to_string(), "s2".to_string()]),
            prompt: Some(String::new()),
            timeout_secs: Some(5),
            ..Default::default()
        };

        let merged = defaults.merge(&overrides);
        assert_eq!(merged.scopes, vec!["s1".to_string(), "s2".to_string()]);
        assert_eq!(merged.redirect_uri.as_deref(), Some("https://a/cb"));
        assert_eq!(merged.prompt, None);
        assert_eq!(merged.timeout, Duration::from_secs(5));
        assert_eq!(merged.credentials, defaults.credentials);
        // Defaults are untouched.
        assert_eq!(defaults.prompt.as_deref(), Some("consent"));
    }

    #[test]
    fn merge_overrides_credentials() {
        let other = OAuthCredentials::new("other.apps.googleusercontent.com", "x");
        let merged = GoogleConfig::default()
            .merge(&GoogleConfigOverrides::new().with_credentials(other.clone()));
        assert_eq!(merged.credentials, Some(other));
    }

    #[test]
    fn overrides_deserialize() {
        let overrides: GoogleConfigOverrides = serde_json::from_str(
            r#"{"access_type": "online", "include_granted_scopes": true}"#,
        )
        .unwrap();
        assert_eq!(overrides.access_type, Some(AccessType::Online));
        assert_eq!(overrides.include_granted_scopes, Some(true));
        assert!(overrides.scopes.is_none());
    }

    #[test]
    fn token_key_ignores_scope_order() {
        let a = GoogleConfig::new(test_credentials())
            .with_scopes(vec!["x".to_string(), "y".to_string()]);
        let b = GoogleConfig::new(test_credentials())
            .with_scopes(vec!["y".to_string(), "x".to_string()]);
        assert_eq!(a.token_key(), b.token_key());
        assert!(a.token_key().starts_with(TOKEN_KEY_PREFIX));
        assert_eq!(a.token_key().len(), TOKEN_KEY_PREFIX.len() + 16);
    }

    #[test]
    fn token_key_depends_on_identity() {
        let base = GoogleConfig::new(test_credentials());
        let online = base.clone().with_access_type(AccessType::Online);
        let redirected = base.clone().with_redirect_uri("https://x/cb");
        let other_client = GoogleConfig::new(OAuthCredentials::new(
            "other.apps.googleusercontent.com",
            "test-secret",
        ));

        assert_ne!(base.token_key(), online.token_key());
        assert_ne!(base.token_key(), redirected.token_key());
        assert_ne!(base.token_key(), other_client.token_key());
        // Timeout is not part of the identity.
        assert_eq!(
            base.token_key(),
            base.clone().with_timeout(Duration::from_secs(1)).token_key()
        );
    }

    #[test]
    fn endpoints_with_base() {
        let endpoints = GoogleEndpoints::with_base("http://127.0.0.1:9000/");
        assert_eq!(endpoints.auth_url, "http://127.0.0.1:9000/auth");
        assert_eq!(endpoints.token_url, "http://127.0.0.1:9000/token");
        assert_eq!(endpoints.sheets_url, "http://127.0.0.1:9000");
    }
}
