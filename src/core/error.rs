use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Message the index sends when a request needs a bearer token.
pub const AUTH_REQUIRED_MESSAGE: &str = "You need to be authenticated to perform this action";
/// Message the index sends when a login challenge timed out.
pub const LOGIN_EXPIRED_MESSAGE: &str = "Login attempt expired";
/// Prefix of the message sent when polling an unknown login challenge.
pub const NO_ATTEMPT_PREFIX: &str = "No attempt made";

/// Central error type for the index client.
/// Every module returns `Result<T, IndexError>`.
#[derive(Debug, Error)]
pub enum IndexError {
    // ── Index API ───────────────────────────────────────
    #[error("{0}")]
    AuthRequired(String),

    #[error("{0}")]
    LoginExpired(String),

    #[error("{0}")]
    NoAttempt(String),

    #[error("{message} (HTTP {status})")]
    Api { status: u16, message: String },

    #[error("Invalid response from index: {0}")]
    InvalidResponse(String),

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-256 mismatch for {mod_id}@{version}: expected {expected}, got {actual}")]
    HashMismatch {
        mod_id: String,
        version: String,
        expected: String,
        actual: String,
    },

    // ── Session ─────────────────────────────────────────
    #[error("No login attempt is in progress")]
    NoActiveLogin,

    // ── Generic ─────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid {kind}: {value}")]
    InvalidValue { kind: &'static str, value: String },
}

/// Convenience alias used throughout the crate.
pub type IndexResult<T> = Result<T, IndexError>;

impl IndexError {
    /// Classify a failure reported by the index.
    ///
    /// This is the only place that inspects server messages; everything
    /// downstream matches on the variant.
    pub fn from_api(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();

        if message == AUTH_REQUIRED_MESSAGE || status == StatusCode::UNAUTHORIZED {
            return IndexError::AuthRequired(message);
        }
        if message == LOGIN_EXPIRED_MESSAGE {
            return IndexError::LoginExpired(message);
        }
        if message.starts_with(NO_ATTEMPT_PREFIX) {
            return IndexError::NoAttempt(message);
        }

        IndexError::Api {
            status: status.as_u16(),
            message,
        }
    }

    /// Whether the error was reported by the index itself, as opposed to
    /// transport, decoding or local failures.
    pub fn is_api(&self) -> bool {
        matches!(
            self,
            IndexError::AuthRequired(_)
                | IndexError::LoginExpired(_)
                | IndexError::NoAttempt(_)
                | IndexError::Api { .. }
        )
    }

    /// Human-readable message, without the HTTP status decoration.
    pub fn message(&self) -> String {
        match self {
            IndexError::AuthRequired(m) | IndexError::LoginExpired(m) | IndexError::NoAttempt(m) => {
                m.clone()
            }
            IndexError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_messages() {
        let auth = IndexError::from_api(StatusCode::FORBIDDEN, AUTH_REQUIRED_MESSAGE);
        assert!(matches!(auth, IndexError::AuthRequired(_)));

        let expired = IndexError::from_api(StatusCode::BAD_REQUEST, LOGIN_EXPIRED_MESSAGE);
        assert!(matches!(expired, IndexError::LoginExpired(_)));

        let none = IndexError::from_api(
            StatusCode::BAD_REQUEST,
            "No attempt made for uuid 7b0c3a1e-0000-0000-0000-000000000000",
        );
        assert!(matches!(none, IndexError::NoAttempt(_)));
    }

    #[test]
    fn unauthorized_status_is_auth_required() {
        let err = IndexError::from_api(StatusCode::UNAUTHORIZED, "token is invalid");
        assert!(matches!(err, IndexError::AuthRequired(_)));
        assert_eq!(err.message(), "token is invalid");
    }

    #[test]
    fn other_messages_stay_generic() {
        let err = IndexError::from_api(StatusCode::BAD_REQUEST, "Request is not yet authorized");
        match &err {
            IndexError::Api { status, message } => {
                assert_eq!(*status, 400);
                assert_eq!(message, "Request is not yet authorized");
            }
            other => panic!("unexpected variant {other:?}"),
        }
        assert!(err.is_api());
        assert_eq!(err.to_string(), "Request is not yet authorized (HTTP 400)");
    }

    #[test]
    fn local_errors_are_not_api_errors() {
        assert!(!IndexError::NoActiveLogin.is_api());
        assert!(!IndexError::Config("bad".into()).is_api());
    }
}
