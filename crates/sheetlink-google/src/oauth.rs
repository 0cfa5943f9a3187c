//! OAuth 2.0 client for Google's authorization and token endpoints.
//!
//! [`OAuthClient`] builds consent URLs, exchanges authorization codes and
//! refreshes access tokens. The web flow in [`crate::flow`] drives it
//! through browser redirects; the CLI uses [`OAuthClient::authorize_loopback`],
//! which receives the redirect on a local port and adds PKCE.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use url::Url;

use crate::config::{GoogleConfig, GoogleEndpoints, OAuthCredentials};
use crate::error::{ApiError, ApiResult};
use crate::token::Token;

/// Random bytes behind a PKCE verifier.
const CODE_VERIFIER_LENGTH: usize = 32;

/// Length of the random `state` value (in bytes, before base64 encoding).
const STATE_LENGTH: usize = 16;

/// Generates a random URL-safe `state` value for CSRF protection.
pub fn generate_state() -> String {
    random_urlsafe(STATE_LENGTH)
}

fn random_urlsafe(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

/// Parameters of a consent page URL.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest<'a> {
    /// Where Google sends the browser back.
    pub redirect_uri: &'a str,
    /// CSRF token echoed back on the callback.
    pub state: &'a str,
    /// PKCE challenge, for public clients.
    pub code_challenge: Option<&'a str>,
}

/// OAuth client bound to one set of credentials.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    credentials: OAuthCredentials,
    endpoints: GoogleEndpoints,
    http_client: reqwest::Client,
}

impl OAuthClient {
    /// Creates an OAuth client from a validated configuration.
    pub fn new(config: &GoogleConfig) -> ApiResult<Self> {
        let credentials = config.require_credentials()?.clone();
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.application_name.as_str())
            .build()
            .map_err(|e| ApiError::internal(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self::with_http_client(
            credentials,
            config.endpoints.clone(),
            http_client,
        ))
    }

    /// Creates an OAuth client sharing an existing HTTP client.
    pub fn with_http_client(
        credentials: OAuthCredentials,
        endpoints: GoogleEndpoints,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            credentials,
            endpoints,
            http_client,
        }
    }

    /// Returns the client credentials.
    pub fn credentials(&self) -> &OAuthCredentials {
        &self.credentials
    }

    pub(crate) fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    /// Builds the Google consent page URL.
    pub fn authorization_url(
        &self,
        config: &GoogleConfig,
        request: &AuthorizationRequest<'_>,
    ) -> ApiResult<String> {
        let mut url = Url::parse(&self.endpoints.auth_url).map_err(|e| {
            ApiError::missing_configuration(format!("invalid authorization endpoint: {}", e))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.credentials.client_id)
                .append_pair("redirect_uri", request.redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("scope", &config.scopes.join(" "))
                .append_pair("access_type", config.access_type.as_str())
                .append_pair("state", request.state);
            if let Some(ref prompt) = config.prompt {
                query.append_pair("prompt", prompt);
            }
            if config.include_granted_scopes {
                query.append_pair("include_granted_scopes", "true");
            }
            if let Some(challenge) = request.code_challenge {
                query
                    .append_pair("code_challenge", challenge)
                    .append_pair("code_challenge_method", "S256");
            }
        }

        Ok(url.into())
    }

    /// Exchanges an authorization code for a token.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> ApiResult<Token> {
        let mut params = vec![
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];
        if let Some(verifier) = code_verifier {
            params.push(("code_verifier", verifier));
        }

        let token = self.token_request("token exchange", &params).await?;
        info!("obtained tokens from authorization code");
        Ok(token.normalized(None))
    }

    /// Refreshes an access token.
    ///
    /// The returned token keeps the previous refresh token unless Google
    /// rotated it.
    pub async fn refresh(&self, token: &Token) -> ApiResult<Token> {
        let refresh_token = token.refresh_token.as_deref().ok_or_else(|| {
            ApiError::not_authorized("no refresh token, authorization required")
        })?;

        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let refreshed = self.token_request("token refresh", &params).await?;
        info!("refreshed access token");
        Ok(refreshed.normalized(Some(refresh_token)))
    }

    async fn token_request(&self, context: &str, params: &[(&str, &str)]) -> ApiResult<Token> {
        debug!(endpoint = %self.endpoints.token_url, "{} request", context);

        let response = self
            .http_client
            .post(&self.endpoints.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| ApiError::from_transport(context, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::from_transport(context, e))?;

        if !status.is_success() {
            return Err(ApiError::external(status.as_u16(), body));
        }

        let token: Token = serde_json::from_str(&body).map_err(|e| {
            ApiError::invalid_response(format!("invalid token response: {}", e))
        })?;

        if token.is_error() {
            return Err(ApiError::external(status.as_u16(), body));
        }
        if token.access_token.is_empty() {
            return Err(ApiError::invalid_response(
                "token response has no access_token",
            ));
        }

        Ok(token)
    }
}

/// PKCE verifier, challenge and state for one authorization attempt.
///
/// RFC 7636 verifier/challenge pair, plus the `state` sent with it.
#[derive(Debug)]
pub struct PkceFlow {
    /// Sent with the code exchange.
    pub verifier: String,
    /// `S256` of the verifier, sent on the consent URL.
    pub challenge: String,
    /// Echoed back on the redirect.
    pub state: String,
}

impl PkceFlow {
    /// Draws a fresh verifier and state.
    pub fn new() -> Self {
        let verifier = random_urlsafe(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: generate_state(),
        }
    }

    /// Computes the S256 challenge for a verifier.
    pub fn compute_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "loopback")]
mod loopback {
    use std::io::{BufRead, BufReader, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use tracing::{debug, error, info, warn};

    use super::{AuthorizationRequest, OAuthClient, PkceFlow};
    use crate::config::GoogleConfig;
    use crate::error::{ApiError, ApiResult};
    use crate::token::Token;

    /// How long the loopback listener waits for the browser.
    const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

    /// Query parameters received on the loopback callback.
    type CallbackResult = ApiResult<(String, String)>;

    impl OAuthClient {
        /// Runs the installed-app flow: opens the consent page in a browser,
        /// waits for the redirect on `127.0.0.1` and exchanges the code.
        pub async fn authorize_loopback(
            &self,
            config: &GoogleConfig,
            port_range: (u16, u16),
        ) -> ApiResult<Token> {
            let pkce = PkceFlow::new();
            let (listener, port) = bind_loopback_server(port_range)?;
            let redirect_uri = format!("http://127.0.0.1:{}/callback", port);

            let auth_url = self.authorization_url(
                config,
                &AuthorizationRequest {
                    redirect_uri: &redirect_uri,
                    state: &pkce.state,
                    code_challenge: Some(&pkce.challenge),
                },
            )?;

            info!("starting OAuth flow, opening browser");
            debug!(url = %auth_url, "authorization URL");
            if let Err(e) = open::that(&auth_url) {
                warn!("failed to open browser: {}", e);
                eprintln!("\nPlease open this URL in your browser:\n\n{}\n", auth_url);
            }

            let (code, received_state) =
                tokio::task::spawn_blocking(move || wait_for_callback(listener))
                    .await
                    .map_err(|e| ApiError::internal(format!("callback task failed: {}", e)))??;

            if received_state != pkce.state {
                return Err(ApiError::authentication(
                    "OAuth state mismatch - possible CSRF attack",
                ));
            }

            info!("received authorization code, exchanging for tokens");
            self.exchange_code(&code, &redirect_uri, Some(&pkce.verifier))
                .await
        }
    }

    fn bind_loopback_server(port_range: (u16, u16)) -> ApiResult<(TcpListener, u16)> {
        for port in port_range.0..=port_range.1 {
            if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)) {
                debug!(port, "bound loopback server");
                return Ok((listener, port));
            }
        }
        Err(ApiError::missing_configuration(format!(
            "no available port in range {}-{}",
            port_range.0, port_range.1
        )))
    }

    fn wait_for_callback(listener: TcpListener) -> CallbackResult {
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        if let Some(result) = handle_callback(stream) {
                            let _ = tx.send(result);
                            return;
                        }
                    }
                    Err(e) => error!("failed to accept connection: {}", e),
                }
            }
        });

        match rx.recv_timeout(CALLBACK_TIMEOUT) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                Err(ApiError::authentication("OAuth callback timeout"))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(ApiError::internal("callback channel disconnected"))
            }
        }
    }

    /// Handles one request on the loopback server; `None` means the request
    /// was not the callback and the server keeps listening.
    fn handle_callback(mut stream: TcpStream) -> Option<CallbackResult> {
        let mut request_line = String::new();
        BufReader::new(&stream).read_line(&mut request_line).ok()?;

        let mut parts = request_line.split_whitespace();
        if parts.next() != Some("GET") {
            return None;
        }
        let target = parts.next()?;
        let url = url::Url::parse(&format!("http://127.0.0.1{}", target)).ok()?;
        if url.path() != "/callback" {
            return None;
        }

        let mut code = None;
        let mut state = None;
        let mut denied = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => denied = Some(value.into_owned()),
                _ => {}
            }
        }

        let page = if denied.is_some() || code.is_none() {
            "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\n\r\n\
            <html><body><h1>sheetlink: authorization failed</h1>\
            <p>Return to the terminal for details.</p></body></html>"
        } else {
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n\
            <html><body><h1>sheetlink is authorized</h1>\
            <p>This tab can be closed.</p></body></html>"
        };
        let _ = stream.write_all(page.as_bytes());
        let _ = stream.flush();

        if let Some(denied) = denied {
            return Some(Err(ApiError::authentication(format!(
                "authorization denied: {}",
                denied
            ))));
        }

        Some(match code {
            Some(code) => Ok((code, state.unwrap_or_default())),
            None => Err(ApiError::authentication(
                "missing authorization code in callback",
            )),
        })
    }

}
