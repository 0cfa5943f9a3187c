//! Error types for Google API operations.
//!
//! Configuration errors surface when a client is built, data-shape errors
//! per export call, and failures reported by Google are carried through with
//! their HTTP status and body, without retry.

use std::fmt;

use sheetlink_core::CoreError;
use thiserror::Error;

/// The category of an API error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorCode {
    /// No credentials or an unusable client configuration.
    MissingConfiguration,
    /// An input row or collection cannot be converted to cells.
    UnknownDataShape,
    /// Google rejected a request; status and body are kept verbatim.
    ExternalApiFailure,
    /// The access token is invalid or the token exchange was refused.
    AuthenticationFailed,
    /// No usable token is available and the user must authorize first.
    NotAuthorized,
    /// Connection failed, timed out or the body could not be read.
    Network,
    /// Google answered with something that does not parse.
    InvalidResponse,
    /// A token store could not persist or remove a token.
    Storage,
    /// Unexpected internal state.
    Internal,
}

impl ApiErrorCode {
    /// Returns a stable snake_case name for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingConfiguration => "missing_configuration",
            Self::UnknownDataShape => "unknown_data_shape",
            Self::ExternalApiFailure => "external_api_failure",
            Self::AuthenticationFailed => "authentication_failed",
            Self::NotAuthorized => "not_authorized",
            Self::Network => "network_error",
            Self::InvalidResponse => "invalid_response",
            Self::Storage => "storage_error",
            Self::Internal => "internal_error",
        }
    }
}

impl fmt::Display for ApiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error raised while talking to Google or preparing a request.
#[derive(Debug, Error)]
pub struct ApiError {
    code: ApiErrorCode,
    message: String,
    /// HTTP status returned by Google, for external failures.
    status: Option<u16>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ApiError {
    /// Creates a new error with the given code and message.
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            source: None,
        }
    }

    /// Creates a missing configuration error.
    pub fn missing_configuration(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::MissingConfiguration, message)
    }

    /// Creates an unknown data shape error.
    pub fn unknown_data_shape(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::UnknownDataShape, message)
    }

    /// Creates an external API failure carrying the HTTP status and body.
    pub fn external(status: u16, body: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::ExternalApiFailure, body).with_status(status)
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::AuthenticationFailed, message)
    }

    /// Creates a not-authorized error.
    pub fn not_authorized(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::NotAuthorized, message)
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::Network, message)
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::InvalidResponse, message)
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::Storage, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::Internal, message)
    }

    /// Sets the HTTP status Google answered with.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> ApiErrorCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the HTTP status reported by Google, if any.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Maps a reqwest transport error to a network error.
    pub(crate) fn from_transport(context: &str, err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("{context}: request timeout")
        } else if err.is_connect() {
            format!("{context}: connection failed: {err}")
        } else {
            format!("{context}: {err}")
        };
        Self::network(message).with_source(err)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({}): {}", self.code, status, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UnknownDataShape(ref message) => {
                Self::unknown_data_shape(message.clone()).with_source(err)
            }
            CoreError::InvalidBatchSize(_) | CoreError::InvalidFieldMapping(_) => {
                Self::missing_configuration(err.to_string()).with_source(err)
            }
        }
    }
}

/// A specialized Result type for Google API operations.
pub type ApiResult<T> = Result<T, ApiError>;
