//! OAuth access token record.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Seconds before the real expiry at which a token counts as expired.
pub const EXPIRY_LEEWAY_SECS: i64 = 30;

/// An OAuth token as returned by Google's token endpoint.
///
/// The same JSON shape is persisted by every token store. A record with
/// `error` set is what Google returns for a refused exchange or refresh;
/// stores never hand such a record back.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Bearer token for API calls.
    #[serde(default)]
    pub access_token: String,

    /// Lifetime in seconds, counted from `created`.
    #[serde(default)]
    pub expires_in: i64,

    /// Space-separated granted scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Token type, normally `Bearer`.
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Unix timestamp (seconds) at which the token was issued.
    #[serde(default)]
    pub created: i64,

    /// Long-lived token used to obtain new access tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Error code reported instead of a token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Human readable error detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .field("created", &self.created)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("error", &self.error)
            .finish()
    }
}

impl Token {
    /// Creates a token issued now.
    pub fn new(access_token: impl Into<String>, expires_in: i64) -> Self {
        Self {
            access_token: access_token.into(),
            expires_in,
            scope: None,
            token_type: default_token_type(),
            created: Utc::now().timestamp(),
            refresh_token: None,
            error: None,
            error_description: None,
        }
    }

    /// Sets the refresh token.
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Sets the granted scopes.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Sets the issue timestamp.
    pub fn with_created(mut self, created: i64) -> Self {
        self.created = created;
        self
    }

    /// Returns true if Google reported an error instead of a token.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Returns true if the token is expired at `now` (unix seconds).
    ///
    /// A token without an access token is always expired.
    pub fn is_expired_at(&self, now: i64) -> bool {
        if self.access_token.is_empty() {
            return true;
        }
        self.created
            .saturating_add(self.expires_in)
            .saturating_sub(EXPIRY_LEEWAY_SECS)
            <= now
    }

    /// Returns true if the token is expired now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }

    /// Returns the granted scopes.
    pub fn scopes(&self) -> Vec<&str> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Returns true if every required scope was granted.
    ///
    /// Tokens that do not report scopes are assumed to cover them.
    pub fn has_scopes(&self, required: &[String]) -> bool {
        if self.scope.is_none() {
            return true;
        }
        let granted = self.scopes();
        required.iter().all(|s| granted.contains(&s.as_str()))
    }

    /// Fills the fields the token endpoint may omit.
    ///
    /// Sets `created` to now when missing and keeps the previous refresh
    /// token when a refresh response does not rotate it.
    pub(crate) fn normalized(mut self, previous_refresh: Option<&str>) -> Self {
        if self.created == 0 {
            self.created = Utc::now().timestamp();
        }
        if self.refresh_token.is_none() {
            self.refresh_token = previous_refresh.map(str::to_string);
        }
        self
    }

    /// Returns the error description for an error record.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|code| match self.error_description {
            Some(ref description) => format!("{code}: {description}"),
            None => code.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_google_token_response() {
        let json = r#"{
            "access_token": "ya29.abc",
            "expires_in": 3599,
            "scope": "https://www.googleapis.com/auth/spreadsheets openid",
            "token_type": "Bearer",
            "refresh_token": "1//refresh"
        }"#;
        let token: Token = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "ya29.abc");
        assert_eq!(token.expires_in, 3599);
        assert_eq!(token.created, 0);
        assert!(!token.is_error());
        assert_eq!(token.scopes().len(), 2);
    }

    #[test]
    fn parses_error_response() {
        let json = r#"{"error": "invalid_grant", "error_description": "Bad Request"}"#;
        let token: Token = serde_json::from_str(json).unwrap();
        assert!(token.is_error());
        assert!(token.access_token.is_empty());
        assert_eq!(
            token.error_message().as_deref(),
            Some("invalid_grant: Bad Request")
        );
    }

    #[test]
    fn expiry_uses_leeway() {
        let token = Token::new("a", 3600).with_created(1_000);
        assert!(!token.is_expired_at(1_000));
        assert!(!token.is_expired_at(1_000 + 3600 - EXPIRY_LEEWAY_SECS - 1));
        assert!(token.is_expired_at(1_000 + 3600 - EXPIRY_LEEWAY_SECS));
        assert!(token.is_expired_at(10_000));
    }

    #[test]
    fn extreme_lifetimes_do_not_overflow() {
        let token = Token::new("a", i64::MAX).with_created(i64::MAX - 100);
        assert!(!token.is_expired_at(i64::MAX - 100));

        let token = Token::new("a", i64::MIN).with_created(-10);
        assert!(token.is_expired_at(0));
    }

    #[test]
    fn fresh_token_is_not_expired() {
        assert!(!Token::new("a", 3600).is_expired());
        assert!(Token::new("", 3600).is_expired());
    }

    #[test]
    fn normalized_keeps_previous_refresh_token() {
        let refreshed: Token =
            serde_json::from_str(r#"{"access_token": "new", "expires_in": 3600}"#).unwrap();
        let token = refreshed.normalized(Some("old-refresh"));
        assert_eq!(token.refresh_token.as_deref(), Some("old-refresh"));
        assert!(token.created > 0);

        let rotated = Token::new("new", 3600)
            .with_refresh_token("rotated")
            .normalized(Some("old-refresh"));
        assert_eq!(rotated.refresh_token.as_deref(), Some("rotated"));
    }

    #[test]
    fn scope_check() {
        let token = Token::new("a", 3600).with_scope("s1 s2");
        assert!(token.has_scopes(&["s1".to_string()]));
        assert!(!token.has_scopes(&["s3".to_string()]));
        assert!(Token::new("a", 3600).has_scopes(&["anything".to_string()]));
    }

    #[test]
    fn serialization_skips_empty_optionals() {
        let token = Token::new("a", 10).with_created(5);
        let value = serde_json::to_value(&token).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "access_token": "a",
                "expires_in": 10,
                "token_type": "Bearer",
                "created": 5
            })
        );
    }

    #[test]
    fn debug_redacts_secrets() {
        let token = Token::new("secret-access", 10).with_refresh_token("secret-refresh");
        let debug = format!("{:?}", token);
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
    }
}
