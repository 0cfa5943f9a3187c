//! Client factory.
//!
//! [`ClientFactory`] holds the default configuration. Each call to
//! [`ClientFactory::build`] merges per-call overrides, looks up the token
//! stored for the resulting configuration and refreshes it when it has
//! expired. The returned [`GoogleClient`] is ready for API calls when
//! [`GoogleClient::is_authorized`] is true.

use tracing::{debug, info, warn};

use crate::config::{GoogleConfig, GoogleConfigOverrides};
use crate::error::{ApiError, ApiErrorCode, ApiResult};
use crate::oauth::OAuthClient;
use crate::sheets::SheetsClient;
use crate::store::TokenStore;
use crate::token::Token;

/// Builds configured Google clients.
#[derive(Debug, Clone, Default)]
pub struct ClientFactory {
    defaults: GoogleConfig,
}

impl ClientFactory {
    /// Creates a factory with the given defaults.
    pub fn new(defaults: GoogleConfig) -> Self {
        Self { defaults }
    }

    /// Returns the default configuration.
    pub fn defaults(&self) -> &GoogleConfig {
        &self.defaults
    }

    /// Merges `overrides` into the defaults and validates the result.
    pub fn config(&self, overrides: &GoogleConfigOverrides) -> ApiResult<GoogleConfig> {
        let config = self.defaults.merge(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Builds a client, refreshing the stored token if it has expired.
    ///
    /// A refreshed token is written back to `store`. A missing token is
    /// not an error; the client is returned unauthorized.
    pub async fn build(
        &self,
        store: &dyn TokenStore,
        overrides: &GoogleConfigOverrides,
    ) -> ApiResult<GoogleClient> {
        let config = self.config(overrides)?;
        let oauth = OAuthClient::new(&config)?;
        let token_key = config.token_key();
        let token = load_token(&oauth, store, &token_key).await?;

        Ok(GoogleClient {
            config,
            oauth,
            token_key,
            token,
        })
    }

    /// Builds a client for starting an authorization.
    ///
    /// Same as [`build`](Self::build), except that a refresh token Google
    /// rejects (`invalid_grant`, revoked consent) is deleted from `store`
    /// and the client comes back unauthorized, so the caller can send the
    /// user through consent again. Transport errors and 5xx replies still
    /// propagate.
    pub async fn build_for_authorization(
        &self,
        store: &dyn TokenStore,
        overrides: &GoogleConfigOverrides,
    ) -> ApiResult<GoogleClient> {
        let config = self.config(overrides)?;
        let oauth = OAuthClient::new(&config)?;
        let token_key = config.token_key();

        let token = match load_token(&oauth, store, &token_key).await {
            Ok(token) => token,
            Err(e) if is_rejected_grant(&e) => {
                warn!(key = %token_key, error = %e, "refresh rejected, dropping stored token");
                store.delete(&token_key)?;
                None
            }
            Err(e) => return Err(e),
        };

        Ok(GoogleClient {
            config,
            oauth,
            token_key,
            token,
        })
    }
}

/// Loads the token under `key`, refreshing and storing it when expired.
async fn load_token(
    oauth: &OAuthClient,
    store: &dyn TokenStore,
    key: &str,
) -> ApiResult<Option<Token>> {
    match store.get(key) {
        Some(token) if token.is_expired() && token.refresh_token.is_some() => {
            debug!(key, "stored token expired, refreshing");
            let refreshed = oauth.refresh(&token).await?;
            store.put(key, refreshed.clone())?;
            info!(key, "stored refreshed token");
            Ok(Some(refreshed))
        }
        other => Ok(other),
    }
}

/// True when the token endpoint refused the grant itself.
fn is_rejected_grant(err: &ApiError) -> bool {
    err.code() == ApiErrorCode::ExternalApiFailure
        && err.status().is_some_and(|s| (400..500).contains(&s))
}

/// A configured Google client.
#[derive(Debug, Clone)]
pub struct GoogleClient {
    config: GoogleConfig,
    oauth: OAuthClient,
    token_key: String,
    token: Option<Token>,
}

impl GoogleClient {
    /// Returns the merged configuration.
    pub fn config(&self) -> &GoogleConfig {
        &self.config
    }

    /// Returns the OAuth client for this configuration.
    pub fn oauth(&self) -> &OAuthClient {
        &self.oauth
    }

    /// Returns the key the token is stored under.
    pub fn token_key(&self) -> &str {
        &self.token_key
    }

    /// Returns the current token, if any.
    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    /// Returns true if the client holds an unexpired access token that was
    /// granted every configured scope.
    pub fn is_authorized(&self) -> bool {
        self.usable_token().is_some()
    }

    /// Returns the access token of an authorized client.
    pub fn access_token(&self) -> Option<&str> {
        self.usable_token().map(|t| t.access_token.as_str())
    }

    fn usable_token(&self) -> Option<&Token> {
        self.token
            .as_ref()
            .filter(|t| !t.is_expired() && t.has_scopes(&self.config.scopes))
    }

    /// Returns a Sheets API client using the current access token.
    pub fn sheets(&self) -> ApiResult<SheetsClient> {
        let access_token = self.access_token().ok_or_else(|| {
            ApiError::not_authorized("no valid access token, authorization required")
        })?;
        Ok(SheetsClient::new(
            self.oauth.http_client().clone(),
            self.config.endpoints.sheets_url.clone(),
            access_token,
        ))
    }
}
