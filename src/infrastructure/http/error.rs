//! Error taxonomy for server-client transport operations.
//!
//! Grounded on the teacher's `infrastructure/claude/error.rs`
//! (`ClaudeApiError::from_status` + `is_transient`/`is_permanent`
//! predicates), collapsed to the two categories the core actually
//! distinguishes: auth rejection vs. everything else.

use reqwest::StatusCode;
use thiserror::Error;

/// Either an auth rejection or a retriable transport
/// failure. One enum, not two error types,
/// because every fallible `ServerClient` call wants a single `Result`
/// error type; `is_auth` recovers the distinction where callers need it.
#[derive(Debug, Error, Clone)]
pub enum HttpError {
    /// The server rejected the request's credentials (e.g. HTTP 401).
    #[error("authentication rejected by server")]
    Auth,
    /// Any non-auth network or 5xx response.
    #[error("server returned {status}: {body}")]
    Server { status: StatusCode, body: String },
    /// A transport-level failure: connection refused, DNS, timeout, etc.
    #[error("transport error: {0}")]
    Transport(String),
    /// The response body could not be decoded as the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl HttpError {
    /// Build from an HTTP status code and response body.
    #[must_use]
    pub fn from_status(status: StatusCode, body: String) -> Self {
        if status == StatusCode::UNAUTHORIZED {
            Self::Auth
        } else {
            Self::Server { status, body }
        }
    }

    /// True for responses that should trip the runner's auth backoff.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth)
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_401_classifies_as_auth() {
        let err = HttpError::from_status(StatusCode::UNAUTHORIZED, String::new());
        assert!(err.is_auth());
    }

    #[test]
    fn status_500_classifies_as_server_not_auth() {
        let err = HttpError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "boom".into());
        assert!(!err.is_auth());
        assert!(matches!(err, HttpError::Server { .. }));
    }
}
