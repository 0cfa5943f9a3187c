//! Client error types.

use std::fmt;

use sheetlink_google::{ApiError, ApiErrorCode};
use sheetlink_server::ServerError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration error.
    Config(String),
    /// Google API error.
    Api(ApiError),
    /// Authorization required before the command can run.
    AuthRequired(String),
    /// Unreadable or malformed input file.
    Input(String),
    /// HTTP service error.
    Server(ServerError),
    /// IO error.
    Io(std::io::Error),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Api(err) => write!(f, "google error: {}", err),
            Self::AuthRequired(msg) => write!(f, "authorization required: {}", msg),
            Self::Input(msg) => write!(f, "input error: {}", msg),
            Self::Server(err) => write!(f, "server error: {}", err),
            Self::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Api(err) => Some(err),
            Self::Server(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ApiError> for ClientError {
    fn from(err: ApiError) -> Self {
        match err.code() {
            ApiErrorCode::NotAuthorized => Self::AuthRequired(format!(
                "{}; run `sheetlink auth google`",
                err.message()
            )),
            _ => Self::Api(err),
        }
    }
}

impl From<ServerError> for ClientError {
    fn from(err: ServerError) -> Self {
        Self::Server(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_authorized_suggests_auth_command() {
        let err = ClientError::from(ApiError::not_authorized("no token"));
        assert!(matches!(err, ClientError::AuthRequired(_)));
        assert!(err.to_string().contains("sheetlink auth google"));
    }

    #[test]
    fn api_errors_keep_their_code() {
        let err = ClientError::from(ApiError::external(500, "boom"));
        match err {
            ClientError::Api(ref api) => assert_eq!(api.status(), Some(500)),
            ref other => panic!("unexpected: {other:?}"),
        }
        assert!(err.to_string().starts_with("google error:"));
    }
}
