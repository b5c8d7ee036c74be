//! Error types for the session layer

use std::time::Duration;
use thiserror::Error;

/// Result type alias for session layer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the session layer
#[derive(Error, Debug)]
pub enum Error {
    /// Authorization failure (401) returned to the caller
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Authorization failed (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Malformed request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflicting state, e.g. an email already registered (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Validation error (422)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Rate limit exceeded (429)
    #[error("Rate limit exceeded: retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Server error (5xx)
    #[error("Server error: {0}")]
    Server(String),

    /// Any other non-success status
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// HTTP request failed before a response was received
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Login or registration was rejected; carries the user-facing message
    #[error("{0}")]
    Credentials(String),

    /// The session was terminated because the refresh exchange failed
    #[error("You have been signed out")]
    SessionExpired,

    /// The operation requires an authenticated session
    #[error("Not signed in")]
    NotAuthenticated,

    /// A response arrived after the session it belonged to was replaced
    #[error("Response discarded: session changed while the request was in flight")]
    Superseded,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create an error from an HTTP status code and message
    pub fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status.as_u16() {
            400 => Error::BadRequest(message),
            401 => Error::Authentication(message),
            403 => Error::Forbidden(message),
            404 => Error::NotFound(message),
            409 => Error::Conflict(message),
            422 => Error::Validation(message),
            429 => Error::RateLimited { retry_after: None },
            500..=599 => Error::Server(message),
            code => Error::Status {
                status: code,
                message,
            },
        }
    }

    /// HTTP status carried by this error, if it came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::BadRequest(_) => Some(400),
            Error::Authentication(_) => Some(401),
            Error::Forbidden(_) => Some(403),
            Error::NotFound(_) => Some(404),
            Error::Conflict(_) => Some(409),
            Error::Validation(_) => Some(422),
            Error::RateLimited { .. } => Some(429),
            Error::Status { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Check if this is an authorization failure (401)
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Message supplied by the API, if any
    pub fn api_message(&self) -> Option<&str> {
        let message = match self {
            Error::BadRequest(m)
            | Error::Authentication(m)
            | Error::Forbidden(m)
            | Error::NotFound(m)
            | Error::Conflict(m)
            | Error::Validation(m)
            | Error::Server(m)
            | Error::Credentials(m) => m.as_str(),
            Error::Status { message, .. } => message.as_str(),
            _ => return None,
        };
        let message = message.trim();
        if message.is_empty() {
            None
        } else {
            Some(message)
        }
    }
}

/// Extract the `message` field from an API error body.
///
/// The API sends either a single string or a list of validation messages.
pub fn message_from_body(body: &serde_json::Value) -> Option<String> {
    match body.get("message")? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        serde_json::Value::Array(items) => {
            let parts: Vec<&str> = items.iter().filter_map(|v| v.as_str()).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        _ => None,
    }
}
