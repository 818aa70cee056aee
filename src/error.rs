//! Error types for the orbit-link client library.

use std::collections::HashMap;
use thiserror::Error;

/// Result type for orbit-link operations
pub type Result<T> = std::result::Result<T, OrbitLinkError>;

/// Errors surfaced by the orbit-link client.
///
/// `ServerError` carries the backend-declared error code and message along
/// with every additional diagnostic field the backend attached, so callers
/// can inspect backend-specific data without the client dropping it.
#[derive(Error, Debug, Clone)]
pub enum OrbitLinkError {
    /// Transport-level failure: no usable response was received.
    /// Never clears session state; safe to retry.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Authentication or session problem detected client-side
    /// (missing session, invalid auth response, rejected credentials).
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// Invalid client configuration (missing base URL, bad header values).
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Failed to encode a request or decode a response body.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A key-value or cookie store operation failed.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Non-2xx response from the backend, parsed into the typed error shape.
    #[error("Server error ({status_code}): {message}")]
    ServerError {
        /// HTTP status of the response.
        status_code: u16,
        /// Backend-declared machine-readable error code, if present.
        error_code: Option<String>,
        /// Human-readable message from the backend (or a fallback).
        message: String,
        /// All additional fields the backend attached to the error body.
        extra: HashMap<String, serde_json::Value>,
    },

    /// Invariant violation inside the client itself.
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl OrbitLinkError {
    /// HTTP status carried by this error, if it originated from a response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ServerError { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// `true` for authorization failures (401/403 responses or client-side
    /// authentication errors). These clear session state when they occur on
    /// the refresh path.
    pub fn is_auth_error(&self) -> bool {
        match self {
            Self::AuthenticationError(_) => true,
            Self::ServerError { status_code, .. } => *status_code == 401 || *status_code == 403,
            _ => false,
        }
    }

    /// `true` when the backend reported 404 for the requested resource.
    /// On the refresh endpoint this signals a legacy backend, not a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ServerError { status_code: 404, .. })
    }

    /// `true` for transport failures with no response. These must never
    /// clear session state.
    pub fn is_network_error(&self) -> bool {
        matches!(self, Self::NetworkError(_))
    }
}

impl From<reqwest::Error> for OrbitLinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::SerializationError(err.to_string())
        } else {
            Self::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for OrbitLinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
