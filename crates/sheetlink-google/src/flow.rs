//! OAuth redirect flow for web sessions.
//!
//! The flow is split into the two requests a browser makes:
//!
//! 1. [`RedirectFlow::authorize`] either confirms the session already holds
//!    a usable token or returns the consent URL together with a
//!    [`PendingAuthorization`] the caller keeps in the session.
//! 2. [`RedirectFlow::callback`] checks the returned `state` against the
//!    pending authorization, exchanges the code, stores the token and
//!    hands back the URL to redirect to.
//!
//! The flow itself keeps no per-session state.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::GoogleConfigOverrides;
use crate::error::{ApiError, ApiResult};
use crate::factory::ClientFactory;
use crate::oauth::{AuthorizationRequest, OAuthClient, generate_state};
use crate::store::TokenStore;

/// Where to send the browser when no return URL was requested.
pub const DEFAULT_RETURN_URL: &str = "/";

/// State remembered between the consent redirect and the callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    /// CSRF token sent to Google.
    pub state: String,
    /// Where to go once authorized.
    pub return_url: String,
}

/// Result of [`RedirectFlow::authorize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizeOutcome {
    /// The session already holds a usable token.
    Authorized {
        /// Where to send the browser.
        return_url: String,
    },
    /// The browser must visit the consent page.
    Redirect {
        /// Consent page URL.
        url: String,
        /// State to keep until the callback.
        pending: PendingAuthorization,
    },
}

/// Query parameters Google appends to the redirect URI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackParams {
    /// Authorization code.
    pub code: Option<String>,
    /// Echoed `state`.
    pub state: Option<String>,
    /// Error reported instead of a code, e.g. `access_denied`.
    pub error: Option<String>,
}

/// Drives the authorize/callback redirect pair.
#[derive(Debug, Clone)]
pub struct RedirectFlow {
    factory: ClientFactory,
}

impl RedirectFlow {
    /// Creates a flow over `factory`.
    pub fn new(factory: ClientFactory) -> Self {
        Self { factory }
    }

    /// Returns the client factory.
    pub fn factory(&self) -> &ClientFactory {
        &self.factory
    }

    /// Starts authorization.
    ///
    /// Building the client refreshes an expired token, so a session with
    /// a working refresh token never sees the consent page. A refresh token
    /// Google rejects is dropped and the user is sent to consent again.
    pub async fn authorize(
        &self,
        store: &dyn TokenStore,
        overrides: &GoogleConfigOverrides,
        return_url: Option<&str>,
    ) -> ApiResult<AuthorizeOutcome> {
        let return_url = return_url
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_RETURN_URL)
            .to_string();

        let client = self
            .factory
            .build_for_authorization(store, overrides)
            .await?;
        if client.is_authorized() {
            debug!(key = %client.token_key(), "session already authorized");
            return Ok(AuthorizeOutcome::Authorized { return_url });
        }

        let redirect_uri = client.config().redirect_uri.as_deref().ok_or_else(|| {
            ApiError::missing_configuration("redirect_uri is required for the web flow")
        })?;
        let state = generate_state();
        let url = client.oauth().authorization_url(
            client.config(),
            &AuthorizationRequest {
                redirect_uri,
                state: &state,
                code_challenge: None,
            },
        )?;

        info!("redirecting to consent page");
        Ok(AuthorizeOutcome::Redirect {
            url,
            pending: PendingAuthorization { state, return_url },
        })
    }

    /// Completes authorization and returns the URL to redirect to.
    ///
    /// `pending` is what [`RedirectFlow::authorize`] returned for this
    /// session; the caller discards it whatever the outcome.
    pub async fn callback(
        &self,
        store: &dyn TokenStore,
        overrides: &GoogleConfigOverrides,
        pending: Option<&PendingAuthorization>,
        params: &CallbackParams,
    ) -> ApiResult<String> {
        if let Some(ref error) = params.error {
            warn!(error = %error, "authorization refused");
            return Err(ApiError::authentication(format!(
                "authorization failed: {}",
                error
            )));
        }

        let pending = pending
            .ok_or_else(|| ApiError::authentication("no authorization in progress"))?;
        match params.state.as_deref() {
            Some(state) if state == pending.state => {}
            Some(_) => return Err(ApiError::authentication("OAuth state mismatch")),
            None => return Err(ApiError::authentication("missing state parameter")),
        }

        let code = params
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ApiError::authentication("missing authorization code"))?;

        let config = self.factory.config(overrides)?;
        let redirect_uri = config.redirect_uri.as_deref().ok_or_else(|| {
            ApiError::missing_configuration("redirect_uri is required for the web flow")
        })?;
        let token = OAuthClient::new(&config)?
            .exchange_code(code, redirect_uri, None)
            .await?;

        let key = config.token_key();
        store.put(&key, token)?;
        info!(key = %key, "authorization complete");
        Ok(pending.return_url.clone())
    }
}
