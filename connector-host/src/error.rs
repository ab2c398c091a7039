//! Error taxonomy and HTTP / wire response conversion.
//!
//! Every variant here corresponds to exactly one row of the error table
//! in the uniform operation protocol: recoverable backend conditions are
//! distinguished from caller mistakes so the Facade, Registry, Loader
//! and Session layers can each apply their own recovery policy without
//! inspecting error strings.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the connector host.
#[derive(Debug, Error)]
pub enum Error {
    /// A connector's `validate()` hook failed, or a required config property is missing.
    #[error("configuration invalid: {0}")]
    ConfigInvalid(String),

    /// `(type, version)` is not registered with the Registry.
    #[error("unknown connector type: {connector_type}@{version}")]
    UnknownConnectorType { connector_type: String, version: String },

    /// A connector instance id was not found in the Registry.
    #[error("connector instance not found: {0}")]
    ConnectorNotFound(String),

    /// The connector implementation lacks the requested capability.
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// Input failed schema validation (filter AST, payload, options).
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// The circuit breaker is open for this connector instance.
    #[error("circuit open")]
    CircuitOpen,

    /// The breaker's concurrency cap was reached.
    #[error("too many requests")]
    TooManyRequests,

    /// A call exceeded its per-call timeout.
    #[error("breaker timeout after {0}ms")]
    BreakerTimeout(u64),

    /// The connector implementation itself failed.
    #[error("backend error: {0}")]
    BackendError(String),

    /// The OAuth token endpoint returned a non-2xx response or malformed body.
    #[error("token request failed: status {status}, body: {body}")]
    TokenRequestFailed { status: u16, body: String },

    /// The HTTP front end rejected a request's bearer token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A malformed WebSocket frame or missing required field.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// Configuration-layer failure (figment extraction, missing file, etc).
    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// I/O failure (manifest file reads, module discovery).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON decode/encode failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JWT decode/validation failure (expired, wrong issuer, bad signature).
    #[error("token validation failed: {0}")]
    TokenInvalid(#[from] jsonwebtoken::errors::Error),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

/// Structured `{message, name}` error shape used on the WebSocket wire (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub message: String,
    pub name: String,
}

impl From<&Error> for WireError {
    fn from(err: &Error) -> Self {
        WireError {
            message: err.to_string(),
            name: err.name().to_string(),
        }
    }
}

impl Error {
    /// The taxonomy name used both in `WireError.name` and tracing fields.
    pub fn name(&self) -> &'static str {
        match self {
            Error::ConfigInvalid(_) => "ConfigInvalid",
            Error::UnknownConnectorType { .. } => "UnknownConnectorType",
            Error::ConnectorNotFound(_) => "ConnectorNotFound",
            Error::NotSupported(_) => "NotSupported",
            Error::ValidationFailed(_) => "ValidationFailed",
            Error::CircuitOpen => "CircuitOpen",
            Error::TooManyRequests => "TooManyRequests",
            Error::BreakerTimeout(_) => "BreakerTimeout",
            Error::BackendError(_) => "BackendError",
            Error::TokenRequestFailed { .. } => "TokenRequestFailed",
            Error::Unauthorized(_) => "Unauthorized",
            Error::ProtocolError(_) => "ProtocolError",
            Error::Config(_) => "ConfigInvalid",
            Error::Io(_) => "BackendError",
            Error::Json(_) => "ProtocolError",
            Error::TokenInvalid(_) => "Unauthorized",
        }
    }

    /// Whether this error should be counted as a circuit breaker failure.
    ///
    /// `CircuitOpen` and `TooManyRequests` are synthetic fail-fast results
    /// that never reach the underlying call, so they must not be recorded
    /// as breaker failures themselves.
    pub fn counts_as_breaker_failure(&self) -> bool {
        !matches!(self, Error::CircuitOpen | Error::TooManyRequests)
    }
}

/// Error response body returned by the thin HTTP front end.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::ConfigInvalid(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::UnknownConnectorType { .. } => StatusCode::BAD_REQUEST,
            Error::ConnectorNotFound(_) => StatusCode::NOT_FOUND,
            Error::NotSupported(_) => StatusCode::NOT_IMPLEMENTED,
            Error::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            Error::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
            Error::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Error::BreakerTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::BackendError(_) => StatusCode::BAD_GATEWAY,
            Error::TokenRequestFailed { .. } => StatusCode::BAD_GATEWAY,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::ProtocolError(_) => StatusCode::BAD_REQUEST,
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::TokenInvalid(_) => StatusCode::UNAUTHORIZED,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, name = self.name(), "request failed");
        } else {
            tracing::warn!(error = %self, name = self.name(), "request rejected");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: self.name().to_string(),
        };

        (status, Json(body)).into_response()
    }
}
