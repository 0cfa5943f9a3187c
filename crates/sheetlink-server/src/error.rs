//! Server error types.

use std::io;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use sheetlink_google::{ApiError, ApiErrorCode};
use thiserror::Error;
use tracing::{error, warn};

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error (listener, accept loop).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Google client error.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Malformed request.
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ServerError {
    /// Creates a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns the HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Io(_) | Self::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Api(err) => match err.code() {
                ApiErrorCode::UnknownDataShape => StatusCode::UNPROCESSABLE_ENTITY,
                ApiErrorCode::AuthenticationFailed | ApiErrorCode::NotAuthorized => {
                    StatusCode::UNAUTHORIZED
                }
                ApiErrorCode::ExternalApiFailure
                | ApiErrorCode::Network
                | ApiErrorCode::InvalidResponse => StatusCode::BAD_GATEWAY,
                ApiErrorCode::MissingConfiguration
                | ApiErrorCode::Storage
                | ApiErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Returns the machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "io_error",
            Self::Api(err) => err.code().as_str(),
            Self::BadRequest { .. } => "bad_request",
            Self::Config { .. } => "configuration_error",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code(), error = %self, "request failed");
        } else {
            warn!(code = self.code(), error = %self, "request rejected");
        }

        let body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
