//! Error types for the gateway crate.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use scriptgate_core::ConfigError;
use scriptgate_executor::ExecutorError;

/// Errors that end a single request.
///
/// Only the fixed-script variant echoes its cause to the caller; everything
/// else answers with a generic message and leaves detail to the server log.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// The endpoint only accepts `POST`.
    #[error("Only POST method is allowed")]
    MethodNotAllowed,

    /// The body exceeded the configured size bound while being read.
    #[error("Request body too large")]
    BodyTooLarge,

    /// The body could not be read or decoded.
    #[error("Invalid request body")]
    InvalidBody,

    /// A script-backed endpoint's process failed, exited non-zero or timed out.
    #[error("Script execution failed")]
    ScriptFailed,

    /// A fixed, argument-free script failed.
    #[error("Error running script: {0}")]
    FixedScriptFailed(#[source] ExecutorError),
}

impl GatewayError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::InvalidBody => StatusCode::BAD_REQUEST,
            GatewayError::ScriptFailed | GatewayError::FixedScriptFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({"error": self.to_string()}))).into_response()
    }
}

/// Errors that stop the gateway before or while serving.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StartupError {
    /// Configuration could not be loaded or is incomplete.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A certificate or key file does not exist.
    #[error("TLS file not found: {}", .path.display())]
    TlsMaterialMissing { path: PathBuf },

    /// Certificate or key material could not be used.
    #[error("invalid TLS material: {0}")]
    Tls(String),

    /// The configured origin cannot be sent as a header value.
    #[error("cors_allowed_domains is not a valid header value: {value:?}")]
    InvalidCorsOrigin { value: String },

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Any other I/O failure, including a fatal listener error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
